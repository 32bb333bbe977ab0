//! Backend error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by an audio backend.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("device init failed: {0}")]
    DeviceInit(String),

    #[error("no output device available")]
    NoDevice,

    #[error("failed to open {path}: {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("invalid handle")]
    InvalidHandle,

    #[error("attach failed: {0}")]
    Attach(String),
}

/// Result type alias
pub type BackendResult<T> = Result<T, BackendError>;
