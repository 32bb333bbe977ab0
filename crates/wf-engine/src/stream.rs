//! Operator stream state machine
//!
//! One stream per graph operator: a backend decode channel plus the playback
//! flags the per-frame update calls drive. Stereo and spatial variants share
//! the struct and dispatch on a [`StreamKind`] tag.
//!
//! Format info is cached once at load. Querying format on a channel already
//! attached to a mixer can stall on the backend's mixing-thread lock, so
//! nothing on the per-frame path is allowed to re-query it.

use crate::error::{EngineError, EngineResult};
use crate::metering::MeterOverride;
use std::path::PathBuf;
use wf_backend::{AudioBackend, ChannelHandle, MixerHandle, Spatial3dMode};

/// Seeks closer than this to the last applied seek are skipped.
pub const SEEK_EPSILON_SECS: f64 = 0.05;

/// Plausibility cap on stream duration (10 hours).
pub const MAX_STREAM_DURATION_SECS: f64 = 36_000.0;

/// Playback speed multiplier bounds.
pub const MIN_SPEED: f32 = 0.1;
pub const MAX_SPEED: f32 = 4.0;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StereoParams {
    pub pan: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialParams {
    pub position: wf_core::Vec3,
    /// `None` while no valid (non-zero) orientation has been supplied.
    pub orientation: Option<wf_core::Vec3>,
    pub min_distance: f32,
    pub max_distance: f32,
    pub cone_inner_deg: f32,
    pub cone_outer_deg: f32,
    pub cone_outer_volume: f32,
    pub mode: Spatial3dMode,
}

impl Default for SpatialParams {
    fn default() -> Self {
        Self {
            position: wf_core::Vec3::ZERO,
            orientation: None,
            min_distance: 1.0,
            max_distance: 10_000.0,
            cone_inner_deg: 360.0,
            cone_outer_deg: 360.0,
            cone_outer_volume: 1.0,
            mode: Spatial3dMode::Normal,
        }
    }
}

/// Variant tag; the hot loop dispatches on this instead of virtual calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StreamKind {
    Stereo(StereoParams),
    Spatial(SpatialParams),
}

pub struct OperatorStream {
    channel: ChannelHandle,
    mixer: MixerHandle,
    path: PathBuf,
    kind: StreamKind,
    // Cached at load, never re-queried.
    native_rate: u32,
    channels: u16,
    duration_secs: f64,
    is_playing: bool,
    is_paused: bool,
    is_stale_muted: bool,
    is_user_muted: bool,
    volume: f32,
    speed: f32,
    last_seek_secs: f64,
    meter_override: Option<MeterOverride>,
}

impl OperatorStream {
    /// Open a decode channel for `path` and attach it to `mixer`.
    ///
    /// Rejects open failures, non-positive or implausible durations, and
    /// attach failures; in the attach case the just-created channel is freed
    /// before the error is returned. On success the channel is paused and
    /// silent until the first play trigger.
    pub fn try_load(
        backend: &dyn AudioBackend,
        path: PathBuf,
        mixer: MixerHandle,
        kind: StreamKind,
    ) -> EngineResult<Self> {
        let channel =
            backend
                .create_decode_channel(&path)
                .map_err(|e| EngineError::StreamLoadFailure {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;

        let info = match backend.channel_info(channel) {
            Ok(info) => info,
            Err(e) => {
                backend.free_channel(channel);
                return Err(EngineError::StreamLoadFailure {
                    path,
                    reason: e.to_string(),
                });
            }
        };

        if !info.duration_secs.is_finite()
            || info.duration_secs <= 0.0
            || info.duration_secs > MAX_STREAM_DURATION_SECS
        {
            backend.free_channel(channel);
            return Err(EngineError::StreamLoadFailure {
                path,
                reason: format!("implausible duration {:.1}s", info.duration_secs),
            });
        }

        if let Err(e) = backend.attach_channel(mixer, channel, true) {
            backend.free_channel(channel);
            return Err(EngineError::MixerAttachFailure(e.to_string()));
        }

        if let StreamKind::Spatial(params) = &kind {
            if info.channels > 1 {
                log::debug!(
                    "[OperatorStream] {} has {} channels; spatialization expects mono",
                    path.display(),
                    info.channels
                );
            }
            backend.set_channel_3d_mode(channel, params.mode);
        }

        log::debug!(
            "[OperatorStream] loaded {} ({} Hz, {} ch, {:.2}s)",
            path.display(),
            info.sample_rate,
            info.channels,
            info.duration_secs
        );

        Ok(Self {
            channel,
            mixer,
            path,
            kind,
            native_rate: info.sample_rate,
            channels: info.channels,
            duration_secs: info.duration_secs,
            is_playing: false,
            is_paused: false,
            is_stale_muted: false,
            is_user_muted: false,
            volume: 1.0,
            speed: 1.0,
            last_seek_secs: 0.0,
            meter_override: None,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // TRANSPORT
    // ═══════════════════════════════════════════════════════════════════════

    /// Start or restart playback: clears pause and stale-mute, then unpauses
    /// the channel.
    pub fn play(&mut self, backend: &dyn AudioBackend) {
        self.is_playing = true;
        self.is_paused = false;
        self.is_stale_muted = false;
        self.push_volume(backend);
        backend.set_channel_paused(self.channel, false);
        log::debug!("[OperatorStream] play {}", self.path.display());
    }

    pub fn pause(&mut self, backend: &dyn AudioBackend) {
        if !self.is_playing || self.is_paused {
            return;
        }
        self.is_paused = true;
        backend.set_channel_paused(self.channel, true);
    }

    pub fn resume(&mut self, backend: &dyn AudioBackend) {
        if !self.is_playing || !self.is_paused {
            return;
        }
        self.is_paused = false;
        backend.set_channel_paused(self.channel, false);
    }

    /// Stop: pause the channel and reset its cursor to zero. The channel is
    /// never detached for a stop; short retriggered sounds would churn the
    /// mixer otherwise.
    pub fn stop(&mut self, backend: &dyn AudioBackend) {
        self.is_playing = false;
        self.is_paused = false;
        self.is_stale_muted = false;
        self.last_seek_secs = 0.0;
        backend.set_channel_paused(self.channel, true);
        backend.set_channel_position(self.channel, 0.0);
        log::debug!("[OperatorStream] stop {}", self.path.display());
    }

    // ═══════════════════════════════════════════════════════════════════════
    // CONTINUOUS PARAMETERS
    // ═══════════════════════════════════════════════════════════════════════

    /// Store volume and user mute; push the effective value while playing.
    pub fn set_volume(&mut self, backend: &dyn AudioBackend, volume: f32, user_muted: bool) {
        self.volume = volume.max(0.0);
        self.is_user_muted = user_muted;
        if self.is_playing {
            self.push_volume(backend);
        }
    }

    /// Zero when user-muted or stale-muted, else the stored volume.
    pub fn effective_volume(&self) -> f32 {
        if self.is_user_muted || self.is_stale_muted {
            0.0
        } else {
            self.volume
        }
    }

    fn push_volume(&self, backend: &dyn AudioBackend) {
        backend.set_channel_volume(self.channel, self.effective_volume());
    }

    /// Stereo balance; ignored for spatial streams.
    pub fn set_pan(&mut self, backend: &dyn AudioBackend, pan: f32) {
        if let StreamKind::Stereo(params) = &mut self.kind {
            params.pan = pan.clamp(-1.0, 1.0);
            backend.set_channel_pan(self.channel, params.pan);
        }
    }

    /// Pitch-following speed change: output frequency scales with the
    /// multiplier, clamped to `[0.1, 4.0]`.
    pub fn set_speed(&mut self, backend: &dyn AudioBackend, multiplier: f32) {
        self.speed = multiplier.clamp(MIN_SPEED, MAX_SPEED);
        backend.set_channel_frequency(self.channel, self.native_rate as f32 * self.speed);
    }

    /// Absolute seek in seconds, skipped while within the epsilon window of
    /// the last applied seek so held scrub inputs do not hammer the backend.
    pub fn seek(&mut self, backend: &dyn AudioBackend, seconds: f64) {
        if (seconds - self.last_seek_secs).abs() < SEEK_EPSILON_SECS {
            return;
        }
        self.last_seek_secs = seconds;
        backend.set_channel_position(self.channel, seconds.clamp(0.0, self.duration_secs));
    }

    /// Stale mute is a volume toggle only: the decode cursor keeps advancing
    /// and nothing is paused or repositioned. Unmuting defers to an explicit
    /// user mute.
    pub fn set_stale_muted(&mut self, backend: &dyn AudioBackend, muted: bool) {
        if self.is_stale_muted == muted {
            return;
        }
        self.is_stale_muted = muted;
        if self.is_playing {
            self.push_volume(backend);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // SPATIAL
    // ═══════════════════════════════════════════════════════════════════════

    pub fn update_3d_position(
        &mut self,
        backend: &dyn AudioBackend,
        position: wf_core::Vec3,
        min_distance: f32,
        max_distance: f32,
    ) {
        if let StreamKind::Spatial(params) = &mut self.kind {
            params.position = position;
            params.min_distance = min_distance.max(1e-3);
            params.max_distance = max_distance.max(params.min_distance);
            backend.set_channel_3d_position(self.channel, position);
            backend.set_channel_3d_distance(self.channel, params.min_distance, params.max_distance);
        }
    }

    /// Near-zero vectors mean "unset" and are skipped.
    pub fn set_3d_orientation(&mut self, backend: &dyn AudioBackend, orientation: wf_core::Vec3) {
        if orientation.is_near_zero() {
            return;
        }
        if let StreamKind::Spatial(params) = &mut self.kind {
            params.orientation = Some(orientation);
            backend.set_channel_3d_orientation(self.channel, orientation);
        }
    }

    pub fn set_3d_cone(
        &mut self,
        backend: &dyn AudioBackend,
        inner_deg: f32,
        outer_deg: f32,
        outer_volume: f32,
    ) {
        if let StreamKind::Spatial(params) = &mut self.kind {
            params.cone_inner_deg = inner_deg;
            params.cone_outer_deg = outer_deg;
            params.cone_outer_volume = outer_volume;
            backend.set_channel_3d_cone(self.channel, inner_deg, outer_deg, outer_volume);
        }
    }

    pub fn set_3d_mode(&mut self, backend: &dyn AudioBackend, mode: Spatial3dMode) {
        if let StreamKind::Spatial(params) = &mut self.kind {
            if params.mode != mode {
                params.mode = mode;
                backend.set_channel_3d_mode(self.channel, mode);
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // METERING
    // ═══════════════════════════════════════════════════════════════════════

    pub fn level(&self, backend: &dyn AudioBackend) -> f32 {
        if let Some(ov) = &self.meter_override {
            return ov.snapshot().level;
        }
        if !self.audible() {
            return 0.0;
        }
        backend.channel_level(self.channel)
    }

    pub fn waveform(&self, backend: &dyn AudioBackend, out: &mut [f32]) {
        if let Some(ov) = &self.meter_override {
            copy_into(&ov.snapshot().waveform, out);
            return;
        }
        if !self.audible() {
            out.fill(0.0);
            return;
        }
        backend.channel_pcm(self.channel, out);
    }

    pub fn spectrum(&self, backend: &dyn AudioBackend, out: &mut [f32]) {
        if let Some(ov) = &self.meter_override {
            copy_into(&ov.snapshot().spectrum, out);
            return;
        }
        if !self.audible() {
            out.fill(0.0);
            return;
        }
        backend.channel_spectrum(self.channel, out);
    }

    pub fn begin_meter_override(&mut self) {
        self.meter_override = Some(MeterOverride::new());
    }

    pub fn end_meter_override(&mut self) {
        self.meter_override = None;
    }

    pub fn meter_override_mut(&mut self) -> Option<&mut MeterOverride> {
        self.meter_override.as_mut()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════

    /// Restore playback flags saved before an export session.
    pub fn restore_playback(&mut self, backend: &dyn AudioBackend, playing: bool, paused: bool) {
        self.is_playing = playing;
        self.is_paused = paused;
        if playing && !paused {
            self.push_volume(backend);
            backend.set_channel_paused(self.channel, false);
        } else {
            backend.set_channel_paused(self.channel, true);
        }
    }

    /// Stop, detach from the mixer, free the channel. Consumes the stream so
    /// the handle cannot be reused afterwards.
    pub fn dispose(self, backend: &dyn AudioBackend) {
        backend.set_channel_paused(self.channel, true);
        backend.detach_channel(self.mixer, self.channel);
        backend.free_channel(self.channel);
        log::debug!("[OperatorStream] disposed {}", self.path.display());
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ACCESSORS
    // ═══════════════════════════════════════════════════════════════════════

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    pub fn is_stale_muted(&self) -> bool {
        self.is_stale_muted
    }

    pub fn is_user_muted(&self) -> bool {
        self.is_user_muted
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn native_rate(&self) -> u32 {
        self.native_rate
    }

    pub fn source_channels(&self) -> u16 {
        self.channels
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn kind(&self) -> &StreamKind {
        &self.kind
    }

    fn audible(&self) -> bool {
        self.is_playing && !self.is_paused
    }
}

pub(crate) fn copy_into(src: &[f32], out: &mut [f32]) {
    let n = src.len().min(out.len());
    out[..n].copy_from_slice(&src[..n]);
    out[n..].fill(0.0);
}
