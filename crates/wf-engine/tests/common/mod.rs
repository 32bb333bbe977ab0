//! Shared test doubles for engine integration tests
//!
//! [`MockBackend`] is a fully scripted [`AudioBackend`]: tests register fake
//! audio files up front, then assert on the exact call patterns the engine
//! produced (pause toggles, seeks, attribute pushes, handle lifecycles).
//! [`MockBackend::advance`] stands in for the device callback, moving the
//! cursors of unpaused channels the way a real output stream would.

#![allow(dead_code)]

use parking_lot::{Mutex, MutexGuard};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use wf_backend::{
    AudioBackend, BackendConfig, BackendError, BackendResult, ChannelHandle, ChannelInfo,
    DeviceEvent, DeviceInitMode, MixerHandle, MixerKind, Spatial3dMode,
};
use wf_core::{ListenerPose, Vec3};
use wf_engine::{AudioEngine, EngineConfig, EngineContext, PathResolver};

// ═══════════════════════════════════════════════════════════════════════════
// SCRIPTED STATE
// ═══════════════════════════════════════════════════════════════════════════

/// A fake audio file the mock will "decode".
#[derive(Debug, Clone, Copy)]
pub struct ScriptedFile {
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_secs: f64,
    /// Constant sample value produced by decode pulls; doubles as the
    /// reported meter level.
    pub fill: f32,
}

#[derive(Debug, Clone)]
pub struct ChannelRecord {
    pub path: PathBuf,
    pub file: ScriptedFile,
    pub paused: bool,
    pub volume: f32,
    pub pan: f32,
    pub frequency: f32,
    pub position: f64,
    pub mixer: Option<MixerHandle>,
    pub freed: bool,
    pub pause_calls: u32,
    pub unpause_calls: u32,
    pub volume_sets: Vec<f32>,
    pub frequency_sets: Vec<f32>,
    pub seeks: Vec<f64>,
    pub positions_3d: Vec<Vec3>,
    pub orientations_3d: Vec<Vec3>,
    pub modes_3d: Vec<Spatial3dMode>,
    pub raw_reads: u32,
}

impl ChannelRecord {
    fn new(path: PathBuf, file: ScriptedFile) -> Self {
        Self {
            path,
            file,
            paused: true,
            volume: 1.0,
            pan: 0.0,
            frequency: file.sample_rate as f32,
            position: 0.0,
            mixer: None,
            freed: false,
            pause_calls: 0,
            unpause_calls: 0,
            volume_sets: Vec::new(),
            frequency_sets: Vec::new(),
            seeks: Vec::new(),
            positions_3d: Vec::new(),
            orientations_3d: Vec::new(),
            modes_3d: Vec::new(),
            raw_reads: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MixerRecord {
    pub sample_rate: u32,
    pub channels: u16,
    pub kind: MixerKind,
    pub volume: f32,
    pub freed: bool,
    pub child_mixers: Vec<MixerHandle>,
    pub child_channels: Vec<ChannelHandle>,
}

pub struct MockState {
    pub files: HashMap<PathBuf, ScriptedFile>,
    pub channels: HashMap<u64, ChannelRecord>,
    pub mixers: HashMap<u64, MixerRecord>,
    pub next_handle: u64,
    pub configured: Option<BackendConfig>,
    pub device_open: bool,
    pub init_calls: Vec<DeviceInitMode>,
    pub fail_modes: Vec<DeviceInitMode>,
    pub fail_channel_attaches: bool,
    pub device_paused_sets: Vec<bool>,
    pub listener_sets: Vec<ListenerPose>,
    pub events: VecDeque<DeviceEvent>,
    pub detach_calls: u32,
    pub free_channel_calls: u32,
    /// Every `create_decode_channel` call, including failed ones.
    pub open_attempts: u32,
    /// Constant sample value `render_mixer` writes for live mixers.
    pub render_fill: f32,
}

impl MockState {
    fn new() -> Self {
        Self {
            files: HashMap::new(),
            channels: HashMap::new(),
            mixers: HashMap::new(),
            next_handle: 1,
            configured: None,
            device_open: false,
            init_calls: Vec::new(),
            fail_modes: Vec::new(),
            fail_channel_attaches: false,
            device_paused_sets: Vec::new(),
            listener_sets: Vec::new(),
            events: VecDeque::new(),
            detach_calls: 0,
            free_channel_calls: 0,
            open_attempts: 0,
            render_fill: 0.0,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// MOCK BACKEND
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::new())),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock()
    }

    /// Register a 48 kHz stereo fake file.
    pub fn add_file(&self, path: &str, duration_secs: f64) {
        self.add_file_with(path, 48000, 2, duration_secs, 0.5);
    }

    pub fn add_file_with(
        &self,
        path: &str,
        sample_rate: u32,
        channels: u16,
        duration_secs: f64,
        fill: f32,
    ) {
        self.state.lock().files.insert(
            PathBuf::from(path),
            ScriptedFile {
                sample_rate,
                channels,
                duration_secs,
                fill,
            },
        );
    }

    /// Make the listed device init modes fail.
    pub fn fail_device(&self, modes: &[DeviceInitMode]) {
        self.state.lock().fail_modes = modes.to_vec();
    }

    pub fn push_device_event(&self, event: DeviceEvent) {
        self.state.lock().events.push_back(event);
    }

    /// Simulate the device callback pulling `dt` seconds of audio: every
    /// live unpaused channel advances by `dt x frequency / native_rate`
    /// source seconds, pinned at its duration.
    pub fn advance(&self, dt: f64) {
        let mut st = self.state.lock();
        for rec in st.channels.values_mut() {
            if rec.freed || rec.paused {
                continue;
            }
            let step = dt * f64::from(rec.frequency) / f64::from(rec.file.sample_rate);
            rec.position = (rec.position + step).min(rec.file.duration_secs);
        }
    }

    /// Most recently created live channel for `path`.
    pub fn channel_for(&self, path: &str) -> Option<u64> {
        let st = self.state.lock();
        st.channels
            .iter()
            .filter(|(_, rec)| !rec.freed && rec.path == Path::new(path))
            .map(|(id, _)| *id)
            .max()
    }

    pub fn channel(&self, id: u64) -> ChannelRecord {
        self.state.lock().channels[&id].clone()
    }

    pub fn live_channel_count(&self) -> usize {
        self.state
            .lock()
            .channels
            .values()
            .filter(|rec| !rec.freed)
            .count()
    }

    pub fn live_mixer_count(&self) -> usize {
        self.state
            .lock()
            .mixers
            .values()
            .filter(|rec| !rec.freed)
            .count()
    }

    pub fn mixer_volume(&self, id: u64) -> f32 {
        self.state.lock().mixers[&id].volume
    }

    pub fn init_calls(&self) -> Vec<DeviceInitMode> {
        self.state.lock().init_calls.clone()
    }

    pub fn device_open(&self) -> bool {
        self.state.lock().device_open
    }

    pub fn open_attempts(&self) -> u32 {
        self.state.lock().open_attempts
    }

    pub fn device_paused_sets(&self) -> Vec<bool> {
        self.state.lock().device_paused_sets.clone()
    }

    pub fn detach_calls(&self) -> u32 {
        self.state.lock().detach_calls
    }

    pub fn listener_sets(&self) -> Vec<ListenerPose> {
        self.state.lock().listener_sets.clone()
    }

    pub fn set_render_fill(&self, fill: f32) {
        self.state.lock().render_fill = fill;
    }

    fn alloc(st: &mut MockState) -> u64 {
        let id = st.next_handle;
        st.next_handle += 1;
        id
    }
}

impl AudioBackend for MockBackend {
    fn configure(&self, config: &BackendConfig) -> BackendResult<()> {
        self.state.lock().configured = Some(*config);
        Ok(())
    }

    fn init_device(&self, mode: DeviceInitMode) -> BackendResult<()> {
        let mut st = self.state.lock();
        st.init_calls.push(mode);
        if st.fail_modes.contains(&mode) {
            return Err(BackendError::DeviceInit(format!("scripted failure ({mode:?})")));
        }
        st.device_open = true;
        Ok(())
    }

    fn close_device(&self) {
        self.state.lock().device_open = false;
    }

    fn set_device_paused(&self, paused: bool) {
        self.state.lock().device_paused_sets.push(paused);
    }

    fn poll_device_event(&self) -> Option<DeviceEvent> {
        self.state.lock().events.pop_front()
    }

    fn create_mixer(
        &self,
        sample_rate: u32,
        channels: u16,
        kind: MixerKind,
    ) -> BackendResult<MixerHandle> {
        let mut st = self.state.lock();
        let id = Self::alloc(&mut st);
        st.mixers.insert(
            id,
            MixerRecord {
                sample_rate,
                channels,
                kind,
                volume: 1.0,
                freed: false,
                child_mixers: Vec::new(),
                child_channels: Vec::new(),
            },
        );
        Ok(MixerHandle(id))
    }

    fn free_mixer(&self, mixer: MixerHandle) {
        if let Some(rec) = self.state.lock().mixers.get_mut(&mixer.raw()) {
            rec.freed = true;
        }
    }

    fn attach_mixer(
        &self,
        parent: MixerHandle,
        child: MixerHandle,
        _buffered: bool,
    ) -> BackendResult<()> {
        let mut st = self.state.lock();
        match st.mixers.get_mut(&parent.raw()) {
            Some(rec) if !rec.freed => {
                rec.child_mixers.push(child);
                Ok(())
            }
            _ => Err(BackendError::InvalidHandle),
        }
    }

    fn set_mixer_volume(&self, mixer: MixerHandle, volume: f32) {
        if let Some(rec) = self.state.lock().mixers.get_mut(&mixer.raw()) {
            if !rec.freed {
                rec.volume = volume;
            }
        }
    }

    fn mixer_sample_rate(&self, mixer: MixerHandle) -> u32 {
        let st = self.state.lock();
        match st.mixers.get(&mixer.raw()) {
            Some(rec) if !rec.freed => rec.sample_rate,
            _ => 0,
        }
    }

    fn render_mixer(&self, mixer: MixerHandle, out: &mut [f32]) {
        let st = self.state.lock();
        match st.mixers.get(&mixer.raw()) {
            Some(rec) if !rec.freed => out.fill(st.render_fill),
            _ => out.fill(0.0),
        }
    }

    fn create_decode_channel(&self, path: &Path) -> BackendResult<ChannelHandle> {
        let mut st = self.state.lock();
        st.open_attempts += 1;
        let Some(file) = st.files.get(path).copied() else {
            return Err(BackendError::FileOpen {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not scripted"),
            });
        };
        let id = Self::alloc(&mut st);
        st.channels
            .insert(id, ChannelRecord::new(path.to_path_buf(), file));
        Ok(ChannelHandle(id))
    }

    fn free_channel(&self, channel: ChannelHandle) {
        let mut st = self.state.lock();
        st.free_channel_calls += 1;
        if let Some(rec) = st.channels.get_mut(&channel.raw()) {
            rec.freed = true;
        }
    }

    fn channel_info(&self, channel: ChannelHandle) -> BackendResult<ChannelInfo> {
        let st = self.state.lock();
        match st.channels.get(&channel.raw()) {
            Some(rec) if !rec.freed => Ok(ChannelInfo {
                sample_rate: rec.file.sample_rate,
                channels: rec.file.channels,
                duration_secs: rec.file.duration_secs,
            }),
            _ => Err(BackendError::InvalidHandle),
        }
    }

    fn attach_channel(
        &self,
        mixer: MixerHandle,
        channel: ChannelHandle,
        _buffered: bool,
    ) -> BackendResult<()> {
        let mut st = self.state.lock();
        if st.fail_channel_attaches {
            return Err(BackendError::Attach("scripted failure".into()));
        }
        if let Some(rec) = st.mixers.get_mut(&mixer.raw()) {
            if !rec.freed {
                rec.child_channels.push(channel);
            }
        }
        match st.channels.get_mut(&channel.raw()) {
            Some(rec) if !rec.freed => {
                rec.mixer = Some(mixer);
                Ok(())
            }
            _ => Err(BackendError::InvalidHandle),
        }
    }

    fn detach_channel(&self, mixer: MixerHandle, channel: ChannelHandle) {
        let mut st = self.state.lock();
        st.detach_calls += 1;
        if let Some(rec) = st.mixers.get_mut(&mixer.raw()) {
            rec.child_channels.retain(|c| *c != channel);
        }
        if let Some(rec) = st.channels.get_mut(&channel.raw()) {
            rec.mixer = None;
        }
    }

    fn set_channel_paused(&self, channel: ChannelHandle, paused: bool) {
        let mut st = self.state.lock();
        if let Some(rec) = st.channels.get_mut(&channel.raw()) {
            if rec.freed {
                return;
            }
            rec.paused = paused;
            if paused {
                rec.pause_calls += 1;
            } else {
                rec.unpause_calls += 1;
            }
        }
    }

    fn set_channel_volume(&self, channel: ChannelHandle, volume: f32) {
        let mut st = self.state.lock();
        if let Some(rec) = st.channels.get_mut(&channel.raw()) {
            if !rec.freed {
                rec.volume = volume;
                rec.volume_sets.push(volume);
            }
        }
    }

    fn set_channel_pan(&self, channel: ChannelHandle, pan: f32) {
        let mut st = self.state.lock();
        if let Some(rec) = st.channels.get_mut(&channel.raw()) {
            if !rec.freed {
                rec.pan = pan;
            }
        }
    }

    fn set_channel_frequency(&self, channel: ChannelHandle, hz: f32) {
        let mut st = self.state.lock();
        if let Some(rec) = st.channels.get_mut(&channel.raw()) {
            if !rec.freed {
                rec.frequency = hz;
                rec.frequency_sets.push(hz);
            }
        }
    }

    fn channel_position(&self, channel: ChannelHandle) -> f64 {
        let st = self.state.lock();
        st.channels
            .get(&channel.raw())
            .filter(|rec| !rec.freed)
            .map_or(0.0, |rec| rec.position)
    }

    fn set_channel_position(&self, channel: ChannelHandle, seconds: f64) {
        let mut st = self.state.lock();
        if let Some(rec) = st.channels.get_mut(&channel.raw()) {
            if !rec.freed {
                rec.position = seconds.clamp(0.0, rec.file.duration_secs);
                rec.seeks.push(seconds);
            }
        }
    }

    fn read_channel_block(&self, channel: ChannelHandle, out: &mut [f32]) {
        let mut st = self.state.lock();
        let Some(rec) = st.channels.get_mut(&channel.raw()) else {
            out.fill(0.0);
            return;
        };
        if rec.freed {
            out.fill(0.0);
            return;
        }
        rec.raw_reads += 1;
        let ch = rec.file.channels.max(1) as usize;
        let frames = out.len() / ch;
        let rate = f64::from(rec.file.sample_rate);
        let remaining = ((rec.file.duration_secs - rec.position) * rate).max(0.0) as usize;
        let audible = frames.min(remaining);
        out[..audible * ch].fill(rec.file.fill);
        out[audible * ch..].fill(0.0);
        rec.position = (rec.position + frames as f64 / rate).min(rec.file.duration_secs);
    }

    fn channel_level(&self, channel: ChannelHandle) -> f32 {
        let st = self.state.lock();
        st.channels
            .get(&channel.raw())
            .filter(|rec| !rec.freed)
            .map_or(0.0, |rec| rec.file.fill)
    }

    fn channel_pcm(&self, channel: ChannelHandle, out: &mut [f32]) {
        out.fill(self.channel_level(channel));
    }

    fn channel_spectrum(&self, channel: ChannelHandle, out: &mut [f32]) {
        out.fill(self.channel_level(channel));
    }

    fn set_channel_3d_mode(&self, channel: ChannelHandle, mode: Spatial3dMode) {
        let mut st = self.state.lock();
        if let Some(rec) = st.channels.get_mut(&channel.raw()) {
            if !rec.freed {
                rec.modes_3d.push(mode);
            }
        }
    }

    fn set_channel_3d_distance(&self, _channel: ChannelHandle, _min_dist: f32, _max_dist: f32) {}

    fn set_channel_3d_cone(
        &self,
        _channel: ChannelHandle,
        _inner_deg: f32,
        _outer_deg: f32,
        _outer_volume: f32,
    ) {
    }

    fn set_channel_3d_position(&self, channel: ChannelHandle, position: Vec3) {
        let mut st = self.state.lock();
        if let Some(rec) = st.channels.get_mut(&channel.raw()) {
            if !rec.freed {
                rec.positions_3d.push(position);
            }
        }
    }

    fn set_channel_3d_orientation(&self, channel: ChannelHandle, orientation: Vec3) {
        let mut st = self.state.lock();
        if let Some(rec) = st.channels.get_mut(&channel.raw()) {
            if !rec.freed {
                rec.orientations_3d.push(orientation);
            }
        }
    }

    fn set_listener(&self, pose: &ListenerPose) {
        self.state.lock().listener_sets.push(*pose);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ENGINE WIRING
// ═══════════════════════════════════════════════════════════════════════════

/// Resolver that trusts the raw path; scripted files never touch the disk.
pub struct PassthroughResolver;

impl PathResolver for PassthroughResolver {
    fn resolve(&self, raw: &str) -> Option<PathBuf> {
        if raw.is_empty() {
            None
        } else {
            Some(PathBuf::from(raw))
        }
    }
}

/// Opt-in log capture for debugging failures (`RUST_LOG=wf_engine=debug`).
pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// An engine wired to a fresh mock backend, plus a handle to the mock.
pub fn engine_with_mock() -> (AudioEngine, MockBackend) {
    let mock = MockBackend::new();
    let backend: Arc<dyn AudioBackend> = Arc::new(mock.clone());
    let engine = AudioEngine::new(EngineContext::new(
        backend,
        Box::new(PassthroughResolver),
        EngineConfig::default(),
    ));
    (engine, mock)
}
