//! Engine error taxonomy
//!
//! Expected failures (device fallback exhaustion, bad files, attach failures,
//! export underruns) are values, not panics. The engine answers every one of
//! them with silence plus a logged diagnostic; nothing here crosses the public
//! boundary as a panic.

use std::path::PathBuf;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Every device init mode in the fallback chain failed. The engine stays
    /// uninitialized and all entry points no-op until the next explicit
    /// initialize call.
    #[error("audio device initialization failed: {0}")]
    DeviceInitFailure(String),

    /// Missing file, unsupported or corrupt codec, or implausible duration.
    /// The operator stays registered but silent; no stream object is kept.
    #[error("failed to load '{path}': {reason}")]
    StreamLoadFailure { path: PathBuf, reason: String },

    /// Decode channel was created but could not join its mixer. The channel
    /// is freed before this is returned.
    #[error("mixer attach failed: {0}")]
    MixerAttachFailure(String),

    /// Mixdown produced fewer frames than the export frame needs. The buffer
    /// is zero-filled to the exact expected length, never shortened.
    #[error("export mixdown underrun: wanted {wanted} frames, got {got}")]
    ExportBufferUnderrun { wanted: usize, got: usize },
}
