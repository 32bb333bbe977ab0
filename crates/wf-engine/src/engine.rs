//! Audio engine orchestrator
//!
//! The single entry point the graph framework drives: per-frame operator
//! updates, the frame-end stale sweep, soundtrack clips, export mixdown, and
//! metering readback. One logical update thread calls everything here, so
//! the engine keeps no internal locks; cross-thread safety is the backend's
//! concern.

use crate::config::EngineConfig;
use crate::context::EngineContext;
use crate::error::EngineError;
use crate::export::{ExportSession, ExportSpec, SavedPlayback, convert_block, mix_into, target_frame_len};
use crate::resolve::PathResolver;
use crate::soundtrack::{SoundtrackClip, SoundtrackUpdate};
use crate::stream::{OperatorStream, SpatialParams, StereoParams, StreamKind};
use crate::topology::MixerTopology;
use std::collections::HashMap;
use std::sync::Arc;
use wf_backend::{AudioBackend, DeviceEvent, Spatial3dMode};
use wf_core::{ClipId, ListenerPose, OperatorId, SPECTRUM_LEN, SlotArena, SlotKey, Vec3, WAVEFORM_LEN};

// ═══════════════════════════════════════════════════════════════════════════
// PER-FRAME UPDATE PAYLOADS
// ═══════════════════════════════════════════════════════════════════════════

/// Per-frame parameters for a stereo operator.
#[derive(Debug, Clone)]
pub struct StereoUpdate {
    /// The operator's local evaluation time in seconds.
    pub local_time: f64,
    pub file_path: String,
    /// Level signal; playback starts on its false-to-true edge.
    pub should_play: bool,
    /// Level signal; playback stops on its false-to-true edge.
    pub should_stop: bool,
    pub volume: f32,
    pub muted: bool,
    pub pan: f32,
    pub speed: f32,
    /// Normalized 0..1 against the stream duration; `None` leaves the cursor
    /// alone.
    pub seek: Option<f32>,
}

impl Default for StereoUpdate {
    fn default() -> Self {
        Self {
            local_time: 0.0,
            file_path: String::new(),
            should_play: false,
            should_stop: false,
            volume: 1.0,
            muted: false,
            pan: 0.0,
            speed: 1.0,
            seek: None,
        }
    }
}

/// Per-frame parameters for a spatial operator.
#[derive(Debug, Clone)]
pub struct SpatialUpdate {
    pub local_time: f64,
    pub file_path: String,
    pub should_play: bool,
    pub should_stop: bool,
    pub volume: f32,
    pub muted: bool,
    pub position: Vec3,
    /// Near-zero means "unset" and is skipped.
    pub orientation: Vec3,
    pub min_distance: f32,
    pub max_distance: f32,
    pub cone_inner_deg: f32,
    pub cone_outer_deg: f32,
    pub cone_outer_volume: f32,
    pub mode: Spatial3dMode,
    pub speed: f32,
    pub seek: Option<f32>,
}

impl Default for SpatialUpdate {
    fn default() -> Self {
        Self {
            local_time: 0.0,
            file_path: String::new(),
            should_play: false,
            should_stop: false,
            volume: 1.0,
            muted: false,
            position: Vec3::ZERO,
            orientation: Vec3::ZERO,
            min_distance: 1.0,
            max_distance: 10_000.0,
            cone_inner_deg: 360.0,
            cone_outer_deg: 360.0,
            cone_outer_volume: 1.0,
            mode: Spatial3dMode::Normal,
            speed: 1.0,
            seek: None,
        }
    }
}

/// Arena slot per registered operator id: edge-trigger memory, the last
/// requested path, staleness, and the stream itself (`None` after a failed
/// load; the entry survives so a missing file is not re-probed every frame).
struct OperatorEntry {
    id: OperatorId,
    prev_should_play: bool,
    prev_should_stop: bool,
    raw_path: String,
    updated_this_frame: bool,
    stale: bool,
    last_update_time: f64,
    stream: Option<OperatorStream>,
}

impl OperatorEntry {
    fn new(id: OperatorId) -> Self {
        Self {
            id,
            prev_should_play: false,
            prev_should_stop: false,
            raw_path: String::new(),
            updated_this_frame: false,
            stale: false,
            last_update_time: 0.0,
            stream: None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ENGINE
// ═══════════════════════════════════════════════════════════════════════════

pub struct AudioEngine {
    backend: Arc<dyn AudioBackend>,
    resolver: Box<dyn PathResolver>,
    config: EngineConfig,
    topology: MixerTopology,
    operators: SlotArena<OperatorEntry>,
    index: HashMap<OperatorId, SlotKey>,
    clips: HashMap<ClipId, SoundtrackClip>,
    /// Clip paths that failed to load; retried only when the path changes.
    clip_failures: HashMap<ClipId, String>,
    listener: Option<ListenerPose>,
    export: Option<ExportSession>,
    init_failed: bool,
    frame_time: f64,
}

impl AudioEngine {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            backend: ctx.backend,
            resolver: ctx.resolver,
            config: ctx.config,
            topology: MixerTopology::new(),
            operators: SlotArena::new(),
            index: HashMap::new(),
            clips: HashMap::new(),
            clip_failures: HashMap::new(),
            listener: None,
            export: None,
            init_failed: false,
            frame_time: 0.0,
        }
    }

    /// Bring the device and mixer graph up. Returns `false` when every
    /// device init mode failed; until the next explicit call, all engine
    /// entry points no-op.
    pub fn initialize(&mut self) -> bool {
        self.init_failed = false;
        self.ensure_initialized()
    }

    pub fn is_initialized(&self) -> bool {
        self.topology.is_initialized()
    }

    fn ensure_initialized(&mut self) -> bool {
        if self.topology.is_initialized() {
            return true;
        }
        if self.init_failed {
            return false;
        }
        match self.topology.initialize(self.backend.as_ref(), &self.config) {
            Ok(()) => true,
            Err(_) => {
                self.init_failed = true;
                false
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // PER-FRAME OPERATOR UPDATES
    // ═══════════════════════════════════════════════════════════════════════

    pub fn update_stereo_operator(&mut self, id: OperatorId, update: &StereoUpdate) {
        if !self.ensure_initialized() {
            return;
        }
        let kind = StreamKind::Stereo(StereoParams { pan: update.pan });
        let Some(key) = self.drive_operator(
            id,
            &update.file_path,
            update.local_time,
            update.should_play,
            update.should_stop,
            kind,
        ) else {
            return;
        };

        let backend = Arc::clone(&self.backend);
        let Some(entry) = self.operators.get_mut(key) else {
            return;
        };
        let Some(stream) = entry.stream.as_mut() else {
            return;
        };
        // Continuous parameters only apply to a playing stream.
        if !stream.is_playing() {
            return;
        }
        stream.set_volume(backend.as_ref(), update.volume, update.muted);
        stream.set_pan(backend.as_ref(), update.pan);
        stream.set_speed(backend.as_ref(), update.speed);
        if let Some(normalized) = update.seek {
            let target = f64::from(normalized.clamp(0.0, 1.0)) * stream.duration_secs();
            stream.seek(backend.as_ref(), target);
        }
    }

    pub fn update_spatial_operator(&mut self, id: OperatorId, update: &SpatialUpdate) {
        if !self.ensure_initialized() {
            return;
        }
        // Listener state defaults to the identity pose on first spatial use.
        if self.listener.is_none() {
            let pose = ListenerPose::identity();
            self.backend.set_listener(&pose);
            self.listener = Some(pose);
        }

        let min_distance = update.min_distance.max(1e-3);
        let kind = StreamKind::Spatial(SpatialParams {
            position: update.position,
            orientation: (!update.orientation.is_near_zero()).then_some(update.orientation),
            min_distance,
            max_distance: update.max_distance.max(min_distance),
            cone_inner_deg: update.cone_inner_deg,
            cone_outer_deg: update.cone_outer_deg,
            cone_outer_volume: update.cone_outer_volume,
            mode: update.mode,
        });
        let Some(key) = self.drive_operator(
            id,
            &update.file_path,
            update.local_time,
            update.should_play,
            update.should_stop,
            kind,
        ) else {
            return;
        };

        let backend = Arc::clone(&self.backend);
        let Some(entry) = self.operators.get_mut(key) else {
            return;
        };
        let Some(stream) = entry.stream.as_mut() else {
            return;
        };
        if !stream.is_playing() {
            return;
        }
        stream.set_volume(backend.as_ref(), update.volume, update.muted);
        stream.update_3d_position(
            backend.as_ref(),
            update.position,
            update.min_distance,
            update.max_distance,
        );
        stream.set_3d_orientation(backend.as_ref(), update.orientation);
        stream.set_3d_cone(
            backend.as_ref(),
            update.cone_inner_deg,
            update.cone_outer_deg,
            update.cone_outer_volume,
        );
        stream.set_3d_mode(backend.as_ref(), update.mode);
        stream.set_speed(backend.as_ref(), update.speed);
        if let Some(normalized) = update.seek {
            let target = f64::from(normalized.clamp(0.0, 1.0)) * stream.duration_secs();
            stream.seek(backend.as_ref(), target);
        }
    }

    /// Shared update path: entry bookkeeping, reload on path change, and the
    /// edge-triggered play/stop transitions.
    fn drive_operator(
        &mut self,
        id: OperatorId,
        raw_path: &str,
        local_time: f64,
        should_play: bool,
        should_stop: bool,
        kind: StreamKind,
    ) -> Option<SlotKey> {
        let mixers = *self.topology.mixers()?;
        let backend = Arc::clone(&self.backend);

        // Entries are created lazily, on the first update carrying a path.
        let key = match self.index.get(&id) {
            Some(&key) if self.operators.contains(key) => key,
            _ => {
                if raw_path.is_empty() {
                    return None;
                }
                let key = self.operators.insert(OperatorEntry::new(id));
                self.index.insert(id, key);
                key
            }
        };

        let during_export = self.export.is_some();
        let entry = self.operators.get_mut(key)?;
        entry.updated_this_frame = true;
        entry.last_update_time = local_time;

        if entry.raw_path != raw_path {
            entry.raw_path = raw_path.to_string();
            if let Some(stream) = entry.stream.take() {
                stream.dispose(backend.as_ref());
            }
            if !raw_path.is_empty() {
                match self.resolver.resolve(raw_path) {
                    Some(path) => {
                        match OperatorStream::try_load(backend.as_ref(), path, mixers.operator, kind)
                        {
                            Ok(mut stream) => {
                                if during_export {
                                    // Streams born mid-export stay silent
                                    // until their first play trigger.
                                    stream.set_stale_muted(backend.as_ref(), true);
                                    stream.begin_meter_override();
                                }
                                entry.stream = Some(stream);
                            }
                            Err(e) => {
                                log::warn!("[AudioEngine] {id}: {e}");
                            }
                        }
                    }
                    None => {
                        log::warn!("[AudioEngine] {id}: could not resolve '{raw_path}'");
                    }
                }
            }
        }

        let play_edge = should_play && !entry.prev_should_play;
        let stop_edge = should_stop && !entry.prev_should_stop;
        entry.prev_should_play = should_play;
        entry.prev_should_stop = should_stop;

        if let Some(stream) = entry.stream.as_mut() {
            if stop_edge {
                stream.stop(backend.as_ref());
            }
            if play_edge {
                stream.play(backend.as_ref());
            }
        }

        Some(key)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // FRAME COMPLETION
    // ═══════════════════════════════════════════════════════════════════════

    /// Must be called exactly once after all per-operator updates for the
    /// frame: runs the stale sweep, evicts unreferenced discard-after-use
    /// clips, clears the updated set, and services device events.
    pub fn complete_frame(&mut self, frame_time_secs: f64) {
        self.frame_time = frame_time_secs;
        let backend = Arc::clone(&self.backend);

        // Stale sweep. Toggles a volume attribute only; no format queries,
        // no pause, no seek.
        for (_, entry) in self.operators.iter_mut() {
            if entry.updated_this_frame {
                if entry.stale {
                    entry.stale = false;
                    if let Some(stream) = entry.stream.as_mut() {
                        stream.set_stale_muted(backend.as_ref(), false);
                    }
                }
            } else if !entry.stale {
                entry.stale = true;
                if let Some(stream) = entry.stream.as_mut() {
                    stream.set_stale_muted(backend.as_ref(), true);
                }
            }
            entry.updated_this_frame = false;
        }

        // Discard-after-use clips vanish once nothing references them.
        let evicted: Vec<ClipId> = self
            .clips
            .iter()
            .filter(|(_, clip)| clip.discard_after_use() && !clip.updated_this_frame())
            .map(|(id, _)| *id)
            .collect();
        for clip_id in evicted {
            if let Some(clip) = self.clips.remove(&clip_id) {
                log::debug!("[AudioEngine] evicting clip {clip_id}");
                clip.dispose(backend.as_ref());
            }
        }
        for clip in self.clips.values_mut() {
            clip.clear_updated();
        }

        while let Some(event) = backend.poll_device_event() {
            match event {
                DeviceEvent::Invalidated => {
                    log::warn!("[AudioEngine] output device invalidated; rebuilding topology");
                    self.handle_device_change();
                }
            }
        }
    }

    /// Dispose every live stream and clip, tear the topology down, and bring
    /// it back up. Streams reload on their next update; nothing retriggers
    /// until the graph sends a fresh play edge.
    pub fn handle_device_change(&mut self) {
        let backend = Arc::clone(&self.backend);
        for (_, entry) in self.operators.iter_mut() {
            if let Some(stream) = entry.stream.take() {
                stream.dispose(backend.as_ref());
            }
            // Force a reload on the next update for this id.
            entry.raw_path.clear();
        }
        for (_, clip) in self.clips.drain() {
            clip.dispose(backend.as_ref());
        }
        self.clip_failures.clear();
        self.topology.shutdown(backend.as_ref());
        self.init_failed = false;
        self.ensure_initialized();
    }

    /// Dispose and remove the operator permanently. A later update for the
    /// same id behaves like a first-time load.
    pub fn unregister_operator(&mut self, id: OperatorId) {
        let Some(key) = self.index.remove(&id) else {
            return;
        };
        if let Some(entry) = self.operators.remove(key) {
            if let Some(stream) = entry.stream {
                stream.dispose(self.backend.as_ref());
            }
        }
        if let Some(session) = self.export.as_mut() {
            session.saved.remove(&id);
        }
        log::debug!("[AudioEngine] unregistered {id}");
    }

    // ═══════════════════════════════════════════════════════════════════════
    // LISTENER
    // ═══════════════════════════════════════════════════════════════════════

    /// Update the 3D listener pose. Near-zero forward/up vectors are skipped,
    /// keeping the previous basis.
    pub fn set_listener_pose(&mut self, position: Vec3, forward: Vec3, up: Vec3) {
        let mut pose = self.listener.unwrap_or_else(ListenerPose::identity);
        pose.position = position;
        if !forward.is_near_zero() {
            pose.forward = forward.normalized();
        }
        if !up.is_near_zero() {
            pose.up = up.normalized();
        }
        self.listener = Some(pose);
        self.backend.set_listener(&pose);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // SOUNDTRACK CLIPS
    // ═══════════════════════════════════════════════════════════════════════

    pub fn update_soundtrack_clip(&mut self, id: ClipId, update: &SoundtrackUpdate) {
        if !self.ensure_initialized() {
            return;
        }
        let Some(mixers) = self.topology.mixers().copied() else {
            return;
        };
        let backend = Arc::clone(&self.backend);

        // Designation is exclusive; the last writer wins.
        if update.is_soundtrack {
            for (other, clip) in self.clips.iter_mut() {
                if *other != id {
                    clip.clear_soundtrack_designation();
                }
            }
        }

        if let Some(clip) = self.clips.get_mut(&id) {
            if clip.path_matches(&update.file_path) {
                clip.apply(backend.as_ref(), update);
                return;
            }
            if let Some(old) = self.clips.remove(&id) {
                old.dispose(backend.as_ref());
            }
        }

        if update.file_path.is_empty() {
            self.clip_failures.remove(&id);
            return;
        }
        // A path that already failed is retried only when it changes.
        if self
            .clip_failures
            .get(&id)
            .is_some_and(|failed| failed == &update.file_path)
        {
            return;
        }

        let Some(path) = self.resolver.resolve(&update.file_path) else {
            log::warn!("[AudioEngine] {id}: could not resolve '{}'", update.file_path);
            self.clip_failures.insert(id, update.file_path.clone());
            return;
        };
        match SoundtrackClip::try_load(backend.as_ref(), update.file_path.clone(), path, mixers.soundtrack)
        {
            Ok(mut clip) => {
                if self.export.is_some() {
                    clip.detach_for_export(backend.as_ref());
                    clip.begin_meter_override();
                }
                clip.apply(backend.as_ref(), update);
                self.clips.insert(id, clip);
                self.clip_failures.remove(&id);
            }
            Err(e) => {
                log::warn!("[AudioEngine] {id}: {e}");
                self.clip_failures.insert(id, update.file_path.clone());
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // EXPORT LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════

    /// Start an export session: pause device output, cut soundtrack clips
    /// out of live routing, save playback flags, and activate metering
    /// overrides on every registered stream.
    pub fn begin_export(&mut self, spec: &ExportSpec) {
        if self.export.is_some() {
            log::warn!("[AudioEngine] begin_export while a session is already active");
            return;
        }
        let backend = Arc::clone(&self.backend);
        backend.set_device_paused(true);

        for clip in self.clips.values_mut() {
            clip.detach_for_export(backend.as_ref());
            clip.begin_meter_override();
        }

        let mut saved = HashMap::new();
        for (_, entry) in self.operators.iter_mut() {
            if let Some(stream) = entry.stream.as_mut() {
                saved.insert(
                    entry.id,
                    SavedPlayback {
                        playing: stream.is_playing(),
                        paused: stream.is_paused(),
                    },
                );
                stream.begin_meter_override();
            }
        }

        self.export = Some(ExportSession {
            spec: *spec,
            time_secs: 0.0,
            saved,
        });
        log::info!(
            "[AudioEngine] export started ({} Hz, {} ch)",
            spec.sample_rate,
            spec.channels
        );
    }

    /// Mix one export frame. The returned buffer always holds exactly
    /// `round(frame_duration x target_rate) x target_channels` floats;
    /// missing audio zero-fills rather than shortening it.
    pub fn full_mixdown_buffer(&mut self, frame_duration: f64) -> Vec<f32> {
        let Some(session) = self.export.as_ref() else {
            log::warn!("[AudioEngine] full_mixdown_buffer without an active export session");
            return Vec::new();
        };
        let spec = session.spec;
        let export_time = session.time_secs;

        let (target_frames, target_len) = target_frame_len(&spec, frame_duration);
        let mut out = vec![0.0f32; target_len];
        if target_frames == 0 {
            return out;
        }
        let backend = Arc::clone(&self.backend);

        // Soundtrack block: the designated clip, seeked to the export time.
        let mut soundtrack_block: Option<Vec<f32>> = None;
        for clip in self.clips.values_mut() {
            if !clip.is_soundtrack() {
                continue;
            }
            let expected = (frame_duration * clip.native_rate() as f64).round() as usize;
            let (native, read) =
                clip.read_export_block(backend.as_ref(), export_time, frame_duration);
            if read < expected {
                log::warn!(
                    "[AudioEngine] {}",
                    EngineError::ExportBufferUnderrun {
                        wanted: expected,
                        got: read,
                    }
                );
            }
            let converted =
                convert_block(&native, clip.native_rate(), clip.channels(), &spec, target_frames);
            mix_into(&mut out, &converted, clip.effective_volume());
            soundtrack_block = Some(converted);
            break;
        }

        // Operator block: the aggregator's already-mixed decode output,
        // resampled only when its internal rate differs from the target.
        let mut operator_block: Option<Vec<f32>> = None;
        if let Some(mixers) = self.topology.mixers() {
            let mixer_rate = backend.mixer_sample_rate(mixers.operator);
            if mixer_rate > 0 {
                let native_frames = (frame_duration * mixer_rate as f64).round() as usize;
                let mixer_channels = self.config.channels.max(1);
                let mut block = vec![0.0f32; native_frames * mixer_channels as usize];
                backend.render_mixer(mixers.operator, &mut block);
                let converted =
                    convert_block(&block, mixer_rate, mixer_channels, &spec, target_frames);
                mix_into(&mut out, &converted, 1.0);
                operator_block = Some(converted);
            }
        }

        // Metering overrides track the block attributable to each source: the
        // designated clip reads the soundtrack block, operator streams the
        // operator block. Muted or non-playing sources read as silence.
        for (_, entry) in self.operators.iter_mut() {
            let Some(stream) = entry.stream.as_mut() else {
                continue;
            };
            let audible =
                stream.is_playing() && !stream.is_paused() && stream.effective_volume() > 0.0;
            if let Some(ov) = stream.meter_override_mut() {
                match (&operator_block, audible) {
                    (Some(block), true) => ov.update_from_buffer(block, spec.channels),
                    _ => ov.zero(),
                }
            }
        }
        for clip in self.clips.values_mut() {
            let audible =
                clip.is_soundtrack() && clip.is_playing() && clip.effective_volume() > 0.0;
            if let Some(ov) = clip.meter_override_mut() {
                match (&soundtrack_block, audible) {
                    (Some(block), true) => ov.update_from_buffer(block, spec.channels),
                    _ => ov.zero(),
                }
            }
        }

        if let Some(session) = self.export.as_mut() {
            session.time_secs += frame_duration;
        }
        out
    }

    /// Recompute every active metering override from a caller-supplied
    /// interleaved buffer (e.g. a post-processed master).
    pub fn evaluate_metering_outputs(&mut self, time: f64, buffer: &[f32]) {
        let Some(session) = self.export.as_ref() else {
            return;
        };
        let channels = session.spec.channels;
        for (_, entry) in self.operators.iter_mut() {
            let Some(stream) = entry.stream.as_mut() else {
                continue;
            };
            let audible =
                stream.is_playing() && !stream.is_paused() && stream.effective_volume() > 0.0;
            if let Some(ov) = stream.meter_override_mut() {
                if audible && !buffer.is_empty() {
                    ov.update_from_buffer(buffer, channels);
                } else {
                    ov.zero();
                }
            }
        }
        for clip in self.clips.values_mut() {
            let audible =
                clip.is_soundtrack() && clip.is_playing() && clip.effective_volume() > 0.0;
            if let Some(ov) = clip.meter_override_mut() {
                if audible && !buffer.is_empty() {
                    ov.update_from_buffer(buffer, channels);
                } else {
                    ov.zero();
                }
            }
        }
        log::trace!("[AudioEngine] metering evaluated at {time:.3}s");
    }

    /// End the export session: clear overrides, restore saved playback
    /// state, re-attach soundtrack routing, resume device output.
    pub fn end_export(&mut self) {
        let Some(session) = self.export.take() else {
            return;
        };
        let backend = Arc::clone(&self.backend);

        for (_, entry) in self.operators.iter_mut() {
            if let Some(stream) = entry.stream.as_mut() {
                stream.end_meter_override();
                if let Some(saved) = session.saved.get(&entry.id) {
                    stream.restore_playback(backend.as_ref(), saved.playing, saved.paused);
                }
            }
        }
        for clip in self.clips.values_mut() {
            clip.end_meter_override();
            clip.reattach_after_export(backend.as_ref());
        }
        backend.set_device_paused(false);
        log::info!("[AudioEngine] export ended at {:.3}s", session.time_secs);
    }

    pub fn is_exporting(&self) -> bool {
        self.export.is_some()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // METERING READBACK
    // ═══════════════════════════════════════════════════════════════════════

    /// Peak level in [0, 1]; zero for unknown ids and silent streams.
    pub fn level(&self, id: OperatorId) -> f32 {
        self.stream_for(id)
            .map_or(0.0, |stream| stream.level(self.backend.as_ref()))
    }

    pub fn waveform(&self, id: OperatorId) -> [f32; WAVEFORM_LEN] {
        let mut out = [0.0f32; WAVEFORM_LEN];
        if let Some(stream) = self.stream_for(id) {
            stream.waveform(self.backend.as_ref(), &mut out);
        }
        out
    }

    pub fn spectrum(&self, id: OperatorId) -> [f32; SPECTRUM_LEN] {
        let mut out = [0.0f32; SPECTRUM_LEN];
        if let Some(stream) = self.stream_for(id) {
            stream.spectrum(self.backend.as_ref(), &mut out);
        }
        out
    }

    /// Soundtrack-wide metering, driven by the designated clip. Zeroed when
    /// no clip holds the designation.
    pub fn soundtrack_level(&self) -> f32 {
        self.designated_clip()
            .map_or(0.0, |clip| clip.level(self.backend.as_ref()))
    }

    pub fn soundtrack_waveform(&self) -> [f32; WAVEFORM_LEN] {
        let mut out = [0.0f32; WAVEFORM_LEN];
        if let Some(clip) = self.designated_clip() {
            clip.waveform(self.backend.as_ref(), &mut out);
        }
        out
    }

    pub fn soundtrack_spectrum(&self) -> [f32; SPECTRUM_LEN] {
        let mut out = [0.0f32; SPECTRUM_LEN];
        if let Some(clip) = self.designated_clip() {
            clip.spectrum(self.backend.as_ref(), &mut out);
        }
        out
    }

    fn designated_clip(&self) -> Option<&SoundtrackClip> {
        self.clips.values().find(|clip| clip.is_soundtrack())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // GLOBAL CONTROLS
    // ═══════════════════════════════════════════════════════════════════════

    pub fn set_global_volume(&mut self, volume: f32) {
        self.topology.set_global_volume(self.backend.as_ref(), volume);
    }

    pub fn set_global_mute(&mut self, muted: bool) {
        self.topology.set_global_mute(self.backend.as_ref(), muted);
    }

    pub fn set_operator_volume(&mut self, volume: f32) {
        self.topology.set_operator_volume(self.backend.as_ref(), volume);
    }

    pub fn set_operator_mute(&mut self, muted: bool) {
        self.topology.set_operator_mute(self.backend.as_ref(), muted);
    }

    pub fn set_soundtrack_volume(&mut self, volume: f32) {
        self.topology.set_soundtrack_volume(self.backend.as_ref(), volume);
    }

    pub fn set_soundtrack_mute(&mut self, muted: bool) {
        self.topology.set_soundtrack_mute(self.backend.as_ref(), muted);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // INTROSPECTION
    // ═══════════════════════════════════════════════════════════════════════

    /// Whether the operator currently has a stream that is playing and not
    /// paused.
    pub fn operator_is_playing(&self, id: OperatorId) -> bool {
        self.stream_for(id)
            .is_some_and(|stream| stream.is_playing() && !stream.is_paused())
    }

    /// Local time of the operator's most recent update.
    pub fn operator_last_update_time(&self, id: OperatorId) -> Option<f64> {
        let key = *self.index.get(&id)?;
        self.operators.get(key).map(|entry| entry.last_update_time)
    }

    pub fn frame_time(&self) -> f64 {
        self.frame_time
    }

    fn stream_for(&self, id: OperatorId) -> Option<&OperatorStream> {
        let key = *self.index.get(&id)?;
        self.operators.get(key)?.stream.as_ref()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // SHUTDOWN
    // ═══════════════════════════════════════════════════════════════════════

    /// Dispose every stream and clip and tear the topology down.
    pub fn shutdown(&mut self) {
        if self.export.is_some() {
            self.end_export();
        }
        let backend = Arc::clone(&self.backend);
        for entry in self.operators.take_all() {
            if let Some(stream) = entry.stream {
                stream.dispose(backend.as_ref());
            }
        }
        self.index.clear();
        for (_, clip) in self.clips.drain() {
            clip.dispose(backend.as_ref());
        }
        self.clip_failures.clear();
        self.topology.shutdown(backend.as_ref());
        self.listener = None;
        log::info!("[AudioEngine] shut down");
    }
}
