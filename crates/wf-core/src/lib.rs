//! wf-core: Shared types and utilities for the WaveFrame audio engine
//!
//! This crate provides the foundational pieces used across the audio crates:
//! - stable operator/clip identities and the slot arena holding per-operator state
//! - 3D vector and listener pose math for spatial playback
//! - lock-free float cells for cross-thread parameter sharing
//! - canonical metering buffer sizes

mod arena;
mod atomic;
mod ids;
mod math;

pub use arena::*;
pub use atomic::*;
pub use ids::*;
pub use math::*;

/// Length of a canonical waveform readback buffer.
pub const WAVEFORM_LEN: usize = 512;

/// Number of bins in a canonical spectrum readback buffer.
pub const SPECTRUM_LEN: usize = 512;

/// FFT size backing the canonical spectrum (`FFT_SIZE / 2` bins).
pub const FFT_SIZE: usize = 1024;
