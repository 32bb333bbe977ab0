//! Metering snapshots and export-time overrides
//!
//! While playing live, level/waveform/spectrum come straight from the decode
//! channel. During export nothing renders through the device, so every stream
//! carries a [`MeterOverride`] recomputed from mixdown buffers instead; the
//! graph keeps reading populated metering outputs either way.

use wf_core::{SPECTRUM_LEN, WAVEFORM_LEN};
use wf_dsp::{SpectrumAnalyzer, peak_level, waveform_peaks};

/// One frame of metering readback.
#[derive(Debug, Clone)]
pub struct MeterSnapshot {
    /// Peak level in [0, 1].
    pub level: f32,
    pub waveform: [f32; WAVEFORM_LEN],
    pub spectrum: [f32; SPECTRUM_LEN],
}

impl MeterSnapshot {
    pub fn zeroed() -> Self {
        Self {
            level: 0.0,
            waveform: [0.0; WAVEFORM_LEN],
            spectrum: [0.0; SPECTRUM_LEN],
        }
    }
}

impl Default for MeterSnapshot {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Export-time metering state for one stream. Owns its analyzer so spectrum
/// smoothing stays per-stream across mixdown frames.
pub struct MeterOverride {
    snapshot: MeterSnapshot,
    analyzer: SpectrumAnalyzer,
}

impl MeterOverride {
    pub fn new() -> Self {
        Self {
            snapshot: MeterSnapshot::zeroed(),
            analyzer: SpectrumAnalyzer::new(),
        }
    }

    pub fn snapshot(&self) -> &MeterSnapshot {
        &self.snapshot
    }

    /// Zero the snapshot; used for streams that are muted or not playing.
    pub fn zero(&mut self) {
        self.snapshot = MeterSnapshot::zeroed();
        self.analyzer.reset();
    }

    /// Recompute the snapshot from an interleaved mixdown buffer.
    pub fn update_from_buffer(&mut self, buffer: &[f32], channels: u16) {
        let channels = channels.max(1) as usize;
        let mut mono = Vec::with_capacity(buffer.len() / channels);
        for frame in buffer.chunks_exact(channels) {
            mono.push(frame.iter().sum::<f32>() / channels as f32);
        }

        self.snapshot.level = peak_level(&mono);
        waveform_peaks(&mono, &mut self.snapshot.waveform);
        self.analyzer.push_samples(&mono);
        self.analyzer.analyze();
        self.analyzer.write_magnitudes(&mut self.snapshot.spectrum);
    }
}

impl Default for MeterOverride {
    fn default() -> Self {
        Self::new()
    }
}
