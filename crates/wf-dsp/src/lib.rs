//! wf-dsp: Analysis and rate-conversion primitives for the WaveFrame audio engine
//!
//! Provides:
//! - spectrum analysis for the canonical metering readback (realfft + Hann window)
//! - block peak measurement plus peak/RMS meters with release and hold
//! - waveform peak-bucket downsampling
//! - linear sample-rate conversion and channel remapping for export mixdown

mod analysis;
mod resample;
mod waveform;

pub use analysis::*;
pub use resample::*;
pub use waveform::*;
