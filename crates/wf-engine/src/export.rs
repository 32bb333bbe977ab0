//! Export mixdown support
//!
//! Session bookkeeping plus the block-format conversion the mixdown needs.
//! The orchestration itself (pausing the device, detaching soundtrack
//! routing, walking the streams) lives on [`crate::engine::AudioEngine`];
//! everything here is engine-internal state and pure buffer math.

use std::collections::HashMap;
use wf_core::OperatorId;

/// Target output format for an export session.
#[derive(Debug, Clone, Copy)]
pub struct ExportSpec {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for ExportSpec {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
        }
    }
}

/// Play/pause flags captured at `begin_export`, restored at `end_export`.
pub(crate) struct SavedPlayback {
    pub playing: bool,
    pub paused: bool,
}

/// Engine-internal state while an export session is active.
pub(crate) struct ExportSession {
    pub spec: ExportSpec,
    /// Accumulated export time; each mixdown frame advances it.
    pub time_secs: f64,
    pub saved: HashMap<OperatorId, SavedPlayback>,
}

/// Frame and float counts for one export frame of `frame_duration` seconds.
pub(crate) fn target_frame_len(spec: &ExportSpec, frame_duration: f64) -> (usize, usize) {
    let frames = (frame_duration * spec.sample_rate as f64).round().max(0.0) as usize;
    (frames, frames * spec.channels.max(1) as usize)
}

/// Convert a native-format block to the export target format, producing
/// exactly `target_frames` frames (zero-filled past short input).
pub(crate) fn convert_block(
    block: &[f32],
    from_rate: u32,
    from_channels: u16,
    spec: &ExportSpec,
    target_frames: usize,
) -> Vec<f32> {
    let channels = spec.channels.max(1) as usize;
    let remapped = wf_dsp::remap_channels(block, from_channels.max(1) as usize, channels);
    if from_rate == spec.sample_rate {
        let mut out = remapped;
        out.resize(target_frames * channels, 0.0);
        return out;
    }
    wf_dsp::resample_linear_exact(&remapped, from_rate, spec.sample_rate, channels, target_frames)
}

/// Sum `add` into `out`, scaled by `gain`.
pub(crate) fn mix_into(out: &mut [f32], add: &[f32], gain: f32) {
    for (o, &s) in out.iter_mut().zip(add.iter()) {
        *o += s * gain;
    }
}
