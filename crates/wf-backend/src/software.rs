//! Software mixing backend
//!
//! Implements [`AudioBackend`] entirely in process: decode channels stream
//! out of fully decoded in-memory buffers, mixers sum their sources
//! recursively, and the device-facing mixer is rendered by the cpal output
//! callback (or pulled directly in offline mode).
//!
//! Threading: the update thread mutates attributes through atomics, the
//! render side reads them per block. Registries are mutexed; the render path
//! never touches the registries, only per-object state reached through `Arc`s
//! snapshotted from a mixer's source list.

use crate::api::{
    AudioBackend, BackendConfig, ChannelHandle, ChannelInfo, DeviceEvent, DeviceInitMode,
    MixerHandle, MixerKind, Spatial3dMode,
};
use crate::decode::{DecodedAudio, decode_file};
use crate::device::DeviceStream;
use crate::error::{BackendError, BackendResult};
use crate::spatial::{Spatial3d, spatial_gain};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use wf_core::{AtomicF32, AtomicF64, FFT_SIZE, ListenerPose, Vec3};
use wf_dsp::SpectrumAnalyzer;

/// Samples covered by a level readback (~20 ms at 48 kHz).
const LEVEL_WINDOW: usize = 960;

// ═══════════════════════════════════════════════════════════════════════════
// METER TAP
// ═══════════════════════════════════════════════════════════════════════════

/// Ring of recent post-gain mono samples, fed by the render path and drained
/// by PCM/level/spectrum pulls.
struct MeterTap {
    buf: Vec<f32>,
    write: usize,
    filled: usize,
}

impl MeterTap {
    fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0.0; capacity.max(FFT_SIZE)],
            write: 0,
            filled: 0,
        }
    }

    #[inline]
    fn push(&mut self, sample: f32) {
        self.buf[self.write] = sample;
        self.write = (self.write + 1) % self.buf.len();
        self.filled = (self.filled + 1).min(self.buf.len());
    }

    /// Most recent `out.len()` samples in chronological order; zero-padded
    /// when fewer have been rendered.
    fn copy_recent(&self, out: &mut [f32]) {
        out.fill(0.0);
        let n = out.len().min(self.filled);
        if n == 0 {
            return;
        }
        let start = (self.write + self.buf.len() - n) % self.buf.len();
        for (i, slot) in out[..n].iter_mut().enumerate() {
            *slot = self.buf[(start + i) % self.buf.len()];
        }
    }

    fn recent_peak(&self, window: usize) -> f32 {
        let n = window.min(self.filled);
        if n == 0 {
            return 0.0;
        }
        let start = (self.write + self.buf.len() - n) % self.buf.len();
        let mut peak = 0.0f32;
        for i in 0..n {
            let v = self.buf[(start + i) % self.buf.len()].abs();
            if v > peak {
                peak = v;
            }
        }
        peak.min(1.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CHANNEL / MIXER STATE
// ═══════════════════════════════════════════════════════════════════════════

struct ChannelState {
    source: Arc<DecodedAudio>,
    paused: AtomicBool,
    volume: AtomicF32,
    pan: AtomicF32,
    /// Output frequency in Hz; native rate at creation.
    frequency: AtomicF32,
    /// Playback position in fractional source frames.
    cursor: AtomicF64,
    spatial: Mutex<Spatial3d>,
    tap: Mutex<MeterTap>,
    analyzer: Mutex<SpectrumAnalyzer>,
}

impl ChannelState {
    fn new(source: DecodedAudio, tap_capacity: usize) -> Self {
        let native_rate = source.sample_rate as f32;
        Self {
            source: Arc::new(source),
            paused: AtomicBool::new(true),
            volume: AtomicF32::new(1.0),
            pan: AtomicF32::new(0.0),
            frequency: AtomicF32::new(native_rate),
            cursor: AtomicF64::new(0.0),
            spatial: Mutex::new(Spatial3d::default()),
            tap: Mutex::new(MeterTap::new(tap_capacity)),
            analyzer: Mutex::new(SpectrumAnalyzer::new()),
        }
    }
}

struct MixerState {
    sample_rate: u32,
    channels: u16,
    kind: MixerKind,
    volume: AtomicF32,
    sources: Mutex<Vec<Source>>,
}

#[derive(Clone)]
enum Source {
    Channel(u64, Arc<ChannelState>),
    Mixer(u64, Arc<MixerState>),
}

impl Source {
    fn handle(&self) -> u64 {
        match self {
            Source::Channel(h, _) | Source::Mixer(h, _) => *h,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// BACKEND
// ═══════════════════════════════════════════════════════════════════════════

pub(crate) struct Inner {
    config: Mutex<BackendConfig>,
    channels: Mutex<HashMap<u64, Arc<ChannelState>>>,
    mixers: Mutex<HashMap<u64, Arc<MixerState>>>,
    next_handle: AtomicU64,
    device: Mutex<Option<DeviceStream>>,
    device_mixer: Mutex<Option<Arc<MixerState>>>,
    device_paused: AtomicBool,
    listener: Mutex<ListenerPose>,
    event_tx: Sender<DeviceEvent>,
    event_rx: Receiver<DeviceEvent>,
    offline: bool,
}

impl Inner {
    pub(crate) fn event_sender(&self) -> Sender<DeviceEvent> {
        self.event_tx.clone()
    }

    /// Entry point for the output callback.
    pub(crate) fn render_device_block(&self, out: &mut [f32], rate: u32, channels: u16) {
        if self.device_paused.load(Ordering::Relaxed) {
            out.fill(0.0);
            return;
        }
        let mixer = self.device_mixer.lock().clone();
        match mixer {
            Some(m) => self.render_mixer_block(&m, out, rate, channels),
            None => out.fill(0.0),
        }
    }

    fn render_mixer_block(&self, mixer: &Arc<MixerState>, out: &mut [f32], rate: u32, channels: u16) {
        out.fill(0.0);
        if out.is_empty() || channels == 0 {
            return;
        }
        let sources: Vec<Source> = mixer.sources.lock().clone();
        if !sources.is_empty() {
            let listener = *self.listener.lock();
            let mut scratch = vec![0.0f32; out.len()];
            for source in &sources {
                scratch.fill(0.0);
                match source {
                    Source::Channel(_, ch) => {
                        render_channel_block(ch, &mut scratch, rate, channels, &listener);
                    }
                    Source::Mixer(_, sub) => {
                        self.render_mixer_block(sub, &mut scratch, rate, channels);
                    }
                }
                for (o, &s) in out.iter_mut().zip(scratch.iter()) {
                    *o += s;
                }
            }
        }
        let volume = mixer.volume.load();
        if volume != 1.0 {
            for o in out.iter_mut() {
                *o *= volume;
            }
        }
    }

    fn channel(&self, handle: ChannelHandle) -> Option<Arc<ChannelState>> {
        self.channels.lock().get(&handle.raw()).cloned()
    }

    fn mixer(&self, handle: MixerHandle) -> Option<Arc<MixerState>> {
        self.mixers.lock().get(&handle.raw()).cloned()
    }
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

fn render_channel_block(
    ch: &ChannelState,
    out: &mut [f32],
    rate: u32,
    channels: u16,
    listener: &ListenerPose,
) {
    if ch.paused.load(Ordering::Relaxed) {
        return;
    }
    let src = &ch.source;
    let src_channels = src.channels.max(1) as usize;
    let total_frames = src.frame_count();
    if total_frames == 0 {
        return;
    }

    let out_channels = channels as usize;
    let frames = out.len() / out_channels;
    let step = ch.frequency.load().max(1.0) as f64 / rate.max(1) as f64;
    let mut cursor = ch.cursor.load();
    if cursor >= total_frames as f64 {
        return;
    }

    // Balance law: center leaves both sides at unity.
    let pan = ch.pan.load().clamp(-1.0, 1.0);
    let (bal_l, bal_r) = if pan >= 0.0 {
        (1.0 - pan, 1.0)
    } else {
        (1.0, 1.0 + pan)
    };

    let spatial = ch.spatial.lock().clone();
    let gain = ch.volume.load() * spatial_gain(&spatial, listener);
    let gain_l = gain * bal_l;
    let gain_r = gain * bal_r;

    let mut tap = ch.tap.lock();
    for frame in 0..frames {
        if cursor >= total_frames as f64 {
            break;
        }
        let idx = cursor as usize;
        let frac = (cursor - idx as f64) as f32;
        let next = (idx + 1).min(total_frames - 1);

        let src_l = lerp(
            src.samples[idx * src_channels],
            src.samples[next * src_channels],
            frac,
        );
        let src_r = if src_channels > 1 {
            lerp(
                src.samples[idx * src_channels + 1],
                src.samples[next * src_channels + 1],
                frac,
            )
        } else {
            src_l
        };

        let l = src_l * gain_l;
        let r = src_r * gain_r;
        if out_channels == 1 {
            out[frame] = (l + r) * 0.5;
        } else {
            out[frame * out_channels] = l;
            out[frame * out_channels + 1] = r;
        }
        tap.push((l + r) * 0.5);

        cursor += step;
    }
    ch.cursor.store(cursor.min(total_frames as f64));
}

/// In-process [`AudioBackend`].
pub struct SoftwareBackend {
    inner: Arc<Inner>,
}

impl SoftwareBackend {
    /// Device-backed instance; `init_device` opens a cpal output stream.
    pub fn new() -> Self {
        Self::build(false)
    }

    /// Offline instance: `init_device` succeeds without opening a device and
    /// audio only moves when mixers are pulled. Used for export and tests.
    pub fn offline() -> Self {
        Self::build(true)
    }

    fn build(offline: bool) -> Self {
        let (event_tx, event_rx) = unbounded();
        Self {
            inner: Arc::new(Inner {
                config: Mutex::new(BackendConfig::default()),
                channels: Mutex::new(HashMap::new()),
                mixers: Mutex::new(HashMap::new()),
                next_handle: AtomicU64::new(1),
                device: Mutex::new(None),
                device_mixer: Mutex::new(None),
                device_paused: AtomicBool::new(false),
                listener: Mutex::new(ListenerPose::identity()),
                event_tx,
                event_rx,
                offline,
            }),
        }
    }

    fn next_handle(&self) -> u64 {
        self.inner.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    fn tap_capacity(&self) -> usize {
        let config = *self.inner.config.lock();
        let buffer_frames = config.sample_rate as usize * config.buffer_ms as usize / 1000;
        (buffer_frames * 2).max(FFT_SIZE)
    }
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for SoftwareBackend {
    fn configure(&self, config: &BackendConfig) -> BackendResult<()> {
        *self.inner.config.lock() = *config;
        log::debug!(
            "[SoftwareBackend] configured: {} Hz, {} ch, update {} ms, buffer {} ms",
            config.sample_rate,
            config.channels,
            config.update_period_ms,
            config.buffer_ms
        );
        Ok(())
    }

    fn init_device(&self, mode: DeviceInitMode) -> BackendResult<()> {
        if self.inner.offline {
            log::debug!("[SoftwareBackend] offline device init ({mode:?})");
            return Ok(());
        }
        let config = *self.inner.config.lock();
        let stream = DeviceStream::open(mode, &config, Arc::clone(&self.inner))?;
        log::info!(
            "[SoftwareBackend] device up: {} Hz, {} ch ({mode:?})",
            stream.sample_rate(),
            stream.channels()
        );
        *self.inner.device.lock() = Some(stream);
        Ok(())
    }

    fn close_device(&self) {
        // Dropping the stream joins the output thread.
        self.inner.device.lock().take();
        self.inner.device_paused.store(false, Ordering::Relaxed);
        log::debug!("[SoftwareBackend] device closed");
    }

    fn set_device_paused(&self, paused: bool) {
        self.inner.device_paused.store(paused, Ordering::Relaxed);
    }

    fn poll_device_event(&self) -> Option<DeviceEvent> {
        self.inner.event_rx.try_recv().ok()
    }

    fn create_mixer(
        &self,
        sample_rate: u32,
        channels: u16,
        kind: MixerKind,
    ) -> BackendResult<MixerHandle> {
        let handle = self.next_handle();
        let mixer = Arc::new(MixerState {
            sample_rate,
            channels: channels.max(1),
            kind,
            volume: AtomicF32::new(1.0),
            sources: Mutex::new(Vec::new()),
        });
        if kind == MixerKind::DeviceOutput {
            *self.inner.device_mixer.lock() = Some(Arc::clone(&mixer));
        }
        self.inner.mixers.lock().insert(handle, mixer);
        log::debug!("[SoftwareBackend] mixer {handle} created ({sample_rate} Hz, {channels} ch, {kind:?})");
        Ok(MixerHandle(handle))
    }

    fn free_mixer(&self, mixer: MixerHandle) {
        let Some(freed) = self.inner.mixers.lock().remove(&mixer.raw()) else {
            return;
        };
        if freed.kind == MixerKind::DeviceOutput {
            let mut device_mixer = self.inner.device_mixer.lock();
            if device_mixer
                .as_ref()
                .is_some_and(|m| Arc::ptr_eq(m, &freed))
            {
                *device_mixer = None;
            }
        }
        for parent in self.inner.mixers.lock().values() {
            parent.sources.lock().retain(|s| s.handle() != mixer.raw());
        }
        log::debug!("[SoftwareBackend] mixer {mixer} freed");
    }

    fn attach_mixer(
        &self,
        parent: MixerHandle,
        child: MixerHandle,
        buffered: bool,
    ) -> BackendResult<()> {
        let parent_state = self.inner.mixer(parent).ok_or(BackendError::InvalidHandle)?;
        let child_state = self.inner.mixer(child).ok_or(BackendError::InvalidHandle)?;
        parent_state
            .sources
            .lock()
            .push(Source::Mixer(child.raw(), child_state));
        log::debug!("[SoftwareBackend] {child} -> {parent} (buffered: {buffered})");
        Ok(())
    }

    fn set_mixer_volume(&self, mixer: MixerHandle, volume: f32) {
        if let Some(m) = self.inner.mixer(mixer) {
            m.volume.store(volume.max(0.0));
        }
    }

    fn mixer_sample_rate(&self, mixer: MixerHandle) -> u32 {
        self.inner.mixer(mixer).map_or(0, |m| m.sample_rate)
    }

    fn render_mixer(&self, mixer: MixerHandle, out: &mut [f32]) {
        match self.inner.mixer(mixer) {
            Some(m) => {
                let rate = m.sample_rate;
                let channels = m.channels;
                self.inner.render_mixer_block(&m, out, rate, channels);
            }
            None => out.fill(0.0),
        }
    }

    fn create_decode_channel(&self, path: &Path) -> BackendResult<ChannelHandle> {
        let audio = decode_file(path)?;
        log::debug!(
            "[SoftwareBackend] decoded {}: {} Hz, {} ch, {:.2}s",
            path.display(),
            audio.sample_rate,
            audio.channels,
            audio.duration_secs
        );
        let handle = self.next_handle();
        let channel = Arc::new(ChannelState::new(audio, self.tap_capacity()));
        self.inner.channels.lock().insert(handle, channel);
        Ok(ChannelHandle(handle))
    }

    fn free_channel(&self, channel: ChannelHandle) {
        if self.inner.channels.lock().remove(&channel.raw()).is_none() {
            return;
        }
        for mixer in self.inner.mixers.lock().values() {
            mixer.sources.lock().retain(|s| s.handle() != channel.raw());
        }
        log::debug!("[SoftwareBackend] channel {channel} freed");
    }

    fn channel_info(&self, channel: ChannelHandle) -> BackendResult<ChannelInfo> {
        let ch = self.inner.channel(channel).ok_or(BackendError::InvalidHandle)?;
        Ok(ChannelInfo {
            sample_rate: ch.source.sample_rate,
            channels: ch.source.channels,
            duration_secs: ch.source.duration_secs,
        })
    }

    fn attach_channel(
        &self,
        mixer: MixerHandle,
        channel: ChannelHandle,
        buffered: bool,
    ) -> BackendResult<()> {
        let mixer_state = self.inner.mixer(mixer).ok_or(BackendError::InvalidHandle)?;
        let channel_state = self.inner.channel(channel).ok_or(BackendError::InvalidHandle)?;
        mixer_state
            .sources
            .lock()
            .push(Source::Channel(channel.raw(), channel_state));
        log::debug!("[SoftwareBackend] {channel} -> {mixer} (buffered: {buffered})");
        Ok(())
    }

    fn detach_channel(&self, mixer: MixerHandle, channel: ChannelHandle) {
        if let Some(m) = self.inner.mixer(mixer) {
            m.sources.lock().retain(|s| s.handle() != channel.raw());
        }
    }

    fn set_channel_paused(&self, channel: ChannelHandle, paused: bool) {
        if let Some(ch) = self.inner.channel(channel) {
            ch.paused.store(paused, Ordering::Relaxed);
        }
    }

    fn set_channel_volume(&self, channel: ChannelHandle, volume: f32) {
        if let Some(ch) = self.inner.channel(channel) {
            ch.volume.store(volume.max(0.0));
        }
    }

    fn set_channel_pan(&self, channel: ChannelHandle, pan: f32) {
        if let Some(ch) = self.inner.channel(channel) {
            ch.pan.store(pan.clamp(-1.0, 1.0));
        }
    }

    fn set_channel_frequency(&self, channel: ChannelHandle, hz: f32) {
        if let Some(ch) = self.inner.channel(channel) {
            ch.frequency.store(hz.max(1.0));
        }
    }

    fn channel_position(&self, channel: ChannelHandle) -> f64 {
        self.inner
            .channel(channel)
            .map_or(0.0, |ch| ch.cursor.load() / ch.source.sample_rate.max(1) as f64)
    }

    fn set_channel_position(&self, channel: ChannelHandle, seconds: f64) {
        if let Some(ch) = self.inner.channel(channel) {
            let frames = seconds.max(0.0) * ch.source.sample_rate as f64;
            ch.cursor.store(frames.min(ch.source.frame_count() as f64));
        }
    }

    fn read_channel_block(&self, channel: ChannelHandle, out: &mut [f32]) {
        out.fill(0.0);
        let Some(ch) = self.inner.channel(channel) else {
            return;
        };
        let src = &ch.source;
        let channels = src.channels.max(1) as usize;
        let total_frames = src.frame_count();
        let mut cursor = ch.cursor.load();
        for frame in out.chunks_exact_mut(channels) {
            let idx = cursor as usize;
            if idx >= total_frames {
                break;
            }
            frame.copy_from_slice(&src.samples[idx * channels..(idx + 1) * channels]);
            cursor += 1.0;
        }
        ch.cursor.store(cursor.min(total_frames as f64));
    }

    fn channel_level(&self, channel: ChannelHandle) -> f32 {
        self.inner
            .channel(channel)
            .map_or(0.0, |ch| ch.tap.lock().recent_peak(LEVEL_WINDOW))
    }

    fn channel_pcm(&self, channel: ChannelHandle, out: &mut [f32]) {
        match self.inner.channel(channel) {
            Some(ch) => ch.tap.lock().copy_recent(out),
            None => out.fill(0.0),
        }
    }

    fn channel_spectrum(&self, channel: ChannelHandle, out: &mut [f32]) {
        let Some(ch) = self.inner.channel(channel) else {
            out.fill(0.0);
            return;
        };
        let mut recent = vec![0.0f32; FFT_SIZE];
        ch.tap.lock().copy_recent(&mut recent);
        let mut analyzer = ch.analyzer.lock();
        analyzer.push_samples(&recent);
        analyzer.analyze();
        analyzer.write_magnitudes(out);
    }

    fn set_channel_3d_mode(&self, channel: ChannelHandle, mode: Spatial3dMode) {
        if let Some(ch) = self.inner.channel(channel) {
            ch.spatial.lock().mode = mode;
        }
    }

    fn set_channel_3d_distance(&self, channel: ChannelHandle, min_dist: f32, max_dist: f32) {
        if let Some(ch) = self.inner.channel(channel) {
            let mut spatial = ch.spatial.lock();
            spatial.min_distance = min_dist.max(1e-3);
            spatial.max_distance = max_dist.max(spatial.min_distance);
        }
    }

    fn set_channel_3d_cone(
        &self,
        channel: ChannelHandle,
        inner_deg: f32,
        outer_deg: f32,
        outer_volume: f32,
    ) {
        if let Some(ch) = self.inner.channel(channel) {
            let mut spatial = ch.spatial.lock();
            spatial.cone_inner_deg = inner_deg.clamp(0.0, 360.0);
            spatial.cone_outer_deg = outer_deg.clamp(0.0, 360.0);
            spatial.cone_outer_volume = outer_volume.clamp(0.0, 1.0);
        }
    }

    fn set_channel_3d_position(&self, channel: ChannelHandle, position: Vec3) {
        if let Some(ch) = self.inner.channel(channel) {
            ch.spatial.lock().position = position;
        }
    }

    fn set_channel_3d_orientation(&self, channel: ChannelHandle, orientation: Vec3) {
        if let Some(ch) = self.inner.channel(channel) {
            ch.spatial.lock().orientation = Some(orientation);
        }
    }

    fn set_listener(&self, pose: &ListenerPose) {
        *self.inner.listener.lock() = *pose;
    }
}
