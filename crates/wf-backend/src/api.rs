//! Backend capability interface
//!
//! The engine core drives playback exclusively through [`AudioBackend`]:
//! decode-channel creation, per-channel attribute get/set, mixer add/remove,
//! pause-flag toggling, raw PCM/FFT pulls, and 3D positioning primitives.
//! Handles are opaque; implementations own all cross-thread safety. Attribute
//! pushes on freed handles are ignored rather than errored so a disposed
//! stream can never fault the frame loop.

use crate::error::BackendResult;
use std::fmt;
use std::path::Path;
use wf_core::{ListenerPose, Vec3};

/// Opaque handle to a decode channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelHandle(pub u64);

impl ChannelHandle {
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch#{}", self.0)
    }
}

/// Opaque handle to a mixer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MixerHandle(pub u64);

impl MixerHandle {
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MixerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mix#{}", self.0)
    }
}

/// Device init fallback modes, tried in descending order by the topology
/// manager: `LowLatency`, then `Stereo`, then `Default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceInitMode {
    /// Configured rate/channels with a short callback buffer.
    LowLatency,
    /// Device default rate, forced to two output channels.
    Stereo,
    /// Whatever the device offers.
    Default,
}

/// What a mixer feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixerKind {
    /// Device-facing: rendered by the output callback.
    DeviceOutput,
    /// Decode-only aggregator: produces samples only when pulled.
    DecodeOnly,
}

/// 3D processing mode for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Spatial3dMode {
    /// Position is absolute in world space.
    Normal,
    /// Position is relative to the listener.
    Relative,
    /// No 3D processing.
    #[default]
    Off,
}

/// Immutable stream format, queried exactly once at load time.
#[derive(Debug, Clone, Copy)]
pub struct ChannelInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_secs: f64,
}

/// Latency configuration pushed before device init.
#[derive(Debug, Clone, Copy)]
pub struct BackendConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Mixing quantum; drives the callback buffer request in low-latency mode.
    pub update_period_ms: u32,
    /// Playback buffer length; sizes the per-channel meter taps.
    pub buffer_ms: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            update_period_ms: 5,
            buffer_ms: 30,
        }
    }
}

/// Out-of-band device notifications, polled by the engine each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    /// The output device vanished or errored; live handles must be rebuilt.
    Invalidated,
}

/// Capability interface over the native/software mixing layer.
///
/// All methods take `&self`; implementations handle interior mutability. The
/// caller must treat `channel_info` as load-time-only: format queries on a
/// mixer-attached channel may block on the implementation's mixing thread.
pub trait AudioBackend: Send + Sync {
    // ── Device lifecycle ────────────────────────────────────────────────────

    /// Push latency configuration. Must precede [`AudioBackend::init_device`].
    fn configure(&self, config: &BackendConfig) -> BackendResult<()>;

    /// Open the output device in the given mode.
    fn init_device(&self, mode: DeviceInitMode) -> BackendResult<()>;

    /// Close the output device and release codec resources.
    fn close_device(&self);

    /// Pause or resume device output without touching mixer state.
    fn set_device_paused(&self, paused: bool);

    /// Non-blocking poll for device notifications.
    fn poll_device_event(&self) -> Option<DeviceEvent>;

    // ── Mixers ──────────────────────────────────────────────────────────────

    fn create_mixer(&self, sample_rate: u32, channels: u16, kind: MixerKind)
    -> BackendResult<MixerHandle>;

    fn free_mixer(&self, mixer: MixerHandle);

    /// Route `child`'s output into `parent`. `buffered` is a scheduling hint.
    fn attach_mixer(&self, parent: MixerHandle, child: MixerHandle, buffered: bool)
    -> BackendResult<()>;

    fn set_mixer_volume(&self, mixer: MixerHandle, volume: f32);

    fn mixer_sample_rate(&self, mixer: MixerHandle) -> u32;

    /// Pull one block of mixed output at the mixer's nominal rate/layout.
    /// Decode-only mixers advance their sources; `out` is fully written.
    fn render_mixer(&self, mixer: MixerHandle, out: &mut [f32]);

    // ── Decode channels ─────────────────────────────────────────────────────

    fn create_decode_channel(&self, path: &Path) -> BackendResult<ChannelHandle>;

    fn free_channel(&self, channel: ChannelHandle);

    /// Format info captured at load time. Never call on the per-frame path.
    fn channel_info(&self, channel: ChannelHandle) -> BackendResult<ChannelInfo>;

    fn attach_channel(&self, mixer: MixerHandle, channel: ChannelHandle, buffered: bool)
    -> BackendResult<()>;

    fn detach_channel(&self, mixer: MixerHandle, channel: ChannelHandle);

    fn set_channel_paused(&self, channel: ChannelHandle, paused: bool);

    fn set_channel_volume(&self, channel: ChannelHandle, volume: f32);

    /// Stereo balance in [-1, 1].
    fn set_channel_pan(&self, channel: ChannelHandle, pan: f32);

    /// Output frequency in Hz; speed changes scale the native rate.
    fn set_channel_frequency(&self, channel: ChannelHandle, hz: f32);

    /// Playback position in source seconds.
    fn channel_position(&self, channel: ChannelHandle) -> f64;

    fn set_channel_position(&self, channel: ChannelHandle, seconds: f64);

    /// Raw decode pull at the channel's native rate and channel layout.
    /// Ignores pause and gain attributes, advances the cursor, zero-fills
    /// past the end of the source. Used by export mixdown.
    fn read_channel_block(&self, channel: ChannelHandle, out: &mut [f32]);

    /// Peak of recent output in [0, 1].
    fn channel_level(&self, channel: ChannelHandle) -> f32;

    /// Most recent post-gain samples (mono), oldest first.
    fn channel_pcm(&self, channel: ChannelHandle, out: &mut [f32]);

    /// Spectrum magnitudes of recent output, [`wf_core::SPECTRUM_LEN`] bins.
    fn channel_spectrum(&self, channel: ChannelHandle, out: &mut [f32]);

    // ── 3D primitives ───────────────────────────────────────────────────────

    fn set_channel_3d_mode(&self, channel: ChannelHandle, mode: Spatial3dMode);

    fn set_channel_3d_distance(&self, channel: ChannelHandle, min_dist: f32, max_dist: f32);

    fn set_channel_3d_cone(
        &self,
        channel: ChannelHandle,
        inner_deg: f32,
        outer_deg: f32,
        outer_volume: f32,
    );

    fn set_channel_3d_position(&self, channel: ChannelHandle, position: Vec3);

    /// Source facing direction; callers skip near-zero vectors.
    fn set_channel_3d_orientation(&self, channel: ChannelHandle, orientation: Vec3);

    fn set_listener(&self, pose: &ListenerPose);
}
