//! Soundtrack clips
//!
//! Clips bound to project timeline time instead of per-frame triggers: the
//! update chases the timeline by seeking only when the decode cursor has
//! drifted past the epsilon window. At most one clip is designated as *the*
//! soundtrack; that clip drives the soundtrack block of the export mixdown
//! and the soundtrack-wide metering readback.

use crate::error::{EngineError, EngineResult};
use crate::metering::MeterOverride;
use crate::stream::{SEEK_EPSILON_SECS, copy_into};
use std::path::PathBuf;
use wf_backend::{AudioBackend, ChannelHandle, MixerHandle};

/// Per-frame update payload for a timeline clip.
#[derive(Debug, Clone)]
pub struct SoundtrackUpdate {
    pub file_path: String,
    /// Project timeline time the clip should be at, in seconds.
    pub target_time: f64,
    pub playing: bool,
    pub volume: f32,
    pub muted: bool,
    /// Designates this clip as the soundtrack (last writer wins).
    pub is_soundtrack: bool,
    /// Evict the clip at frame end once it stops being referenced.
    pub discard_after_use: bool,
}

impl Default for SoundtrackUpdate {
    fn default() -> Self {
        Self {
            file_path: String::new(),
            target_time: 0.0,
            playing: false,
            volume: 1.0,
            muted: false,
            is_soundtrack: false,
            discard_after_use: false,
        }
    }
}

pub struct SoundtrackClip {
    channel: ChannelHandle,
    mixer: MixerHandle,
    raw_path: String,
    path: PathBuf,
    // Cached at load, never re-queried.
    native_rate: u32,
    channels: u16,
    duration_secs: f64,
    is_playing: bool,
    is_soundtrack: bool,
    discard_after_use: bool,
    updated_this_frame: bool,
    detached_for_export: bool,
    volume: f32,
    muted: bool,
    meter_override: Option<MeterOverride>,
}

impl SoundtrackClip {
    pub fn try_load(
        backend: &dyn AudioBackend,
        raw_path: String,
        path: PathBuf,
        mixer: MixerHandle,
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

        if let Err(e) = backend.attach_channel(mixer, channel, true) {
            backend.free_channel(channel);
            return Err(EngineError::MixerAttachFailure(e.to_string()));
        }

        log::debug!(
            "[SoundtrackClip] loaded {} ({} Hz, {} ch, {:.2}s)",
            path.display(),
            info.sample_rate,
            info.channels,
            info.duration_secs
        );

        Ok(Self {
            channel,
            mixer,
            raw_path,
            path,
            native_rate: info.sample_rate,
            channels: info.channels,
            duration_secs: info.duration_secs,
            is_playing: false,
            is_soundtrack: false,
            discard_after_use: false,
            updated_this_frame: true,
            detached_for_export: false,
            volume: 1.0,
            muted: false,
            meter_override: None,
        })
    }

    /// Apply one frame's update: designation, gain, transport, timeline chase.
    pub fn apply(&mut self, backend: &dyn AudioBackend, update: &SoundtrackUpdate) {
        self.updated_this_frame = true;
        self.is_soundtrack = update.is_soundtrack;
        self.discard_after_use = update.discard_after_use;
        self.volume = update.volume.max(0.0);
        self.muted = update.muted;
        backend.set_channel_volume(self.channel, self.effective_volume());

        if update.playing != self.is_playing {
            self.is_playing = update.playing;
            backend.set_channel_paused(self.channel, !update.playing);
        }

        // Chase the timeline: seek only once the cursor has drifted.
        let target = update.target_time.clamp(0.0, self.duration_secs);
        let drift = (backend.channel_position(self.channel) - target).abs();
        if drift > SEEK_EPSILON_SECS {
            backend.set_channel_position(self.channel, target);
        }
    }

    pub fn effective_volume(&self) -> f32 {
        if self.muted { 0.0 } else { self.volume }
    }

    /// Seek to the export time and pull one frame of raw native-rate samples.
    /// Returns the zero-filled block and the frame count actually read.
    pub fn read_export_block(
        &mut self,
        backend: &dyn AudioBackend,
        export_time: f64,
        frame_duration: f64,
    ) -> (Vec<f32>, usize) {
        let frames = (frame_duration * self.native_rate as f64).round() as usize;
        let mut block = vec![0.0f32; frames * self.channels.max(1) as usize];

        backend.set_channel_position(self.channel, export_time.min(self.duration_secs));
        backend.read_channel_block(self.channel, &mut block);

        let remaining = ((self.duration_secs - export_time.min(self.duration_secs))
            * self.native_rate as f64)
            .max(0.0) as usize;
        (block, frames.min(remaining))
    }

    // Export sessions pull soundtrack audio straight from the decode channel,
    // so live routing is cut to avoid double-rendering.

    pub fn detach_for_export(&mut self, backend: &dyn AudioBackend) {
        if self.detached_for_export {
            return;
        }
        backend.detach_channel(self.mixer, self.channel);
        self.detached_for_export = true;
    }

    pub fn reattach_after_export(&mut self, backend: &dyn AudioBackend) {
        if !self.detached_for_export {
            return;
        }
        if let Err(e) = backend.attach_channel(self.mixer, self.channel, true) {
            log::warn!(
                "[SoundtrackClip] reattach failed for {}: {e}",
                self.path.display()
            );
        }
        self.detached_for_export = false;
    }

    // ═══════════════════════════════════════════════════════════════════════
    // METERING
    // ═══════════════════════════════════════════════════════════════════════

    pub fn level(&self, backend: &dyn AudioBackend) -> f32 {
        if let Some(ov) = &self.meter_override {
            return ov.snapshot().level;
        }
        if !self.is_playing {
            return 0.0;
        }
        backend.channel_level(self.channel)
    }

    pub fn waveform(&self, backend: &dyn AudioBackend, out: &mut [f32]) {
        if let Some(ov) = &self.meter_override {
            copy_into(&ov.snapshot().waveform, out);
            return;
        }
        if !self.is_playing {
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
        if !self.is_playing {
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

    pub fn dispose(self, backend: &dyn AudioBackend) {
        backend.set_channel_paused(self.channel, true);
        if !self.detached_for_export {
            backend.detach_channel(self.mixer, self.channel);
        }
        backend.free_channel(self.channel);
        log::debug!("[SoundtrackClip] disposed {}", self.path.display());
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ACCESSORS
    // ═══════════════════════════════════════════════════════════════════════

    pub fn path_matches(&self, raw: &str) -> bool {
        self.raw_path == raw
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn is_soundtrack(&self) -> bool {
        self.is_soundtrack
    }

    pub fn clear_soundtrack_designation(&mut self) {
        self.is_soundtrack = false;
    }

    pub fn discard_after_use(&self) -> bool {
        self.discard_after_use
    }

    pub fn updated_this_frame(&self) -> bool {
        self.updated_this_frame
    }

    pub fn clear_updated(&mut self) {
        self.updated_this_frame = false;
    }

    pub fn native_rate(&self) -> u32 {
        self.native_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }
}
