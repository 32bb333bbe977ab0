//! Engine configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use wf_backend::BackendConfig;

/// Latency and format settings pushed to the backend at initialization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Mixer and device sample rate in Hz.
    pub sample_rate: u32,
    /// Output channel count for the mixer tiers.
    pub channels: u16,
    /// Backend update period in milliseconds.
    pub update_period_ms: u32,
    /// Device buffer length in milliseconds.
    pub device_buffer_ms: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            update_period_ms: 5,
            device_buffer_ms: 30,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file. Missing fields fall back to defaults.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            sample_rate: self.sample_rate,
            channels: self.channels,
            update_period_ms: self.update_period_ms,
            buffer_ms: self.device_buffer_ms,
        }
    }
}
