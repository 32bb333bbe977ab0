//! Spectrum analysis and level measurement

use realfft::{RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;
use std::sync::Arc;
use wf_core::{FFT_SIZE, SPECTRUM_LEN};

/// Smoothing factor between successive spectra: `old * SMOOTH + new * (1 - SMOOTH)`.
const SPECTRUM_SMOOTH: f32 = 0.8;

/// Spectrum analyzer producing the canonical [`SPECTRUM_LEN`]-bin readback.
///
/// Fixed FFT size of [`FFT_SIZE`] with a Hann window over a rolling input
/// ring. Output magnitudes are linear, normalized so a full-scale sine lands
/// near 1.0, and smoothed against the previous analysis to keep frame-rate
/// readback stable. The Nyquist bin is dropped so the output is exactly
/// `FFT_SIZE / 2` bins.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn RealToComplex<f32>>,
    input_ring: Vec<f32>,
    windowed: Vec<f32>,
    output: Vec<Complex<f32>>,
    window: Vec<f32>,
    magnitudes: Vec<f32>,
    write_pos: usize,
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        let mut planner = RealFftPlanner::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);

        // Hann window
        let window: Vec<f32> = (0..FFT_SIZE)
            .map(|i| {
                0.5 * (1.0
                    - (2.0 * std::f32::consts::PI * i as f32 / (FFT_SIZE - 1) as f32).cos())
            })
            .collect();

        Self {
            fft,
            input_ring: vec![0.0; FFT_SIZE],
            windowed: vec![0.0; FFT_SIZE],
            output: vec![Complex::new(0.0, 0.0); FFT_SIZE / 2 + 1],
            window,
            magnitudes: vec![0.0; SPECTRUM_LEN],
            write_pos: 0,
        }
    }

    /// Feed mono samples into the rolling input ring.
    pub fn push_samples(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.input_ring[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % FFT_SIZE;
        }
    }

    /// Run the FFT over the current ring contents and update the smoothed
    /// magnitudes.
    pub fn analyze(&mut self) {
        for (i, (&input, &win)) in self.input_ring.iter().zip(&self.window).enumerate() {
            self.windowed[i] = input * win;
        }
        // Rotate so the oldest sample leads, keeping phase consistent.
        self.windowed.rotate_left(self.write_pos);

        if self.fft.process(&mut self.windowed, &mut self.output).is_err() {
            self.magnitudes.fill(0.0);
            return;
        }

        let scale = 2.0 / FFT_SIZE as f32;
        for (i, mag) in self.magnitudes.iter_mut().enumerate() {
            let c = self.output[i];
            let magnitude = ((c.re * c.re + c.im * c.im).sqrt() * scale).clamp(0.0, 1.0);
            *mag = *mag * SPECTRUM_SMOOTH + magnitude * (1.0 - SPECTRUM_SMOOTH);
        }
    }

    /// Copy the current magnitudes into `out` (expected [`SPECTRUM_LEN`] long).
    pub fn write_magnitudes(&self, out: &mut [f32]) {
        let n = out.len().min(self.magnitudes.len());
        out[..n].copy_from_slice(&self.magnitudes[..n]);
        for v in &mut out[n..] {
            *v = 0.0;
        }
    }

    /// Bin index covering `freq` at the given sample rate.
    pub fn freq_to_bin(freq: f32, sample_rate: f32) -> usize {
        ((freq * FFT_SIZE as f32) / sample_rate).round() as usize
    }

    pub fn reset(&mut self) {
        self.input_ring.fill(0.0);
        self.magnitudes.fill(0.0);
        self.write_pos = 0;
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Peak of a sample block, clamped to [0, 1].
pub fn peak_level(samples: &[f32]) -> f32 {
    samples
        .iter()
        .fold(0.0f32, |peak, &s| peak.max(s.abs()))
        .clamp(0.0, 1.0)
}

/// Fallback rate when a meter is constructed with a degenerate sample rate.
const DEFAULT_SAMPLE_RATE: f32 = 48000.0;

/// Peak meter with hold and exponential release.
#[derive(Debug, Clone)]
pub struct PeakMeter {
    current_peak: f32,
    held_peak: f32,
    hold_samples: usize,
    hold_counter: usize,
    release_coeff: f32,
}

impl PeakMeter {
    pub fn new(sample_rate: f32) -> Self {
        let sr = if sample_rate > 0.0 && sample_rate.is_finite() {
            sample_rate
        } else {
            DEFAULT_SAMPLE_RATE
        };
        Self {
            current_peak: 0.0,
            held_peak: 0.0,
            hold_samples: (sr * 2.0) as usize, // 2 second hold
            hold_counter: 0,
            release_coeff: (-1.0 / (0.3 * sr)).exp(), // 300ms release
        }
    }

    pub fn process(&mut self, sample: f32) {
        let abs = sample.abs();

        if abs > self.current_peak {
            self.current_peak = abs;
        } else {
            self.current_peak *= self.release_coeff;
        }

        if abs > self.held_peak {
            self.held_peak = abs;
            self.hold_counter = 0;
        } else {
            self.hold_counter += 1;
            if self.hold_counter >= self.hold_samples {
                self.held_peak *= self.release_coeff;
            }
        }
    }

    pub fn process_block(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.process(sample);
        }
    }

    /// Decaying peak, linear.
    pub fn current(&self) -> f32 {
        self.current_peak
    }

    /// Held peak, linear. Starts releasing 2 s after the last new maximum.
    pub fn held(&self) -> f32 {
        self.held_peak
    }

    pub fn current_db(&self) -> f32 {
        20.0 * self.current_peak.max(1e-10).log10()
    }

    pub fn held_db(&self) -> f32 {
        20.0 * self.held_peak.max(1e-10).log10()
    }

    pub fn reset(&mut self) {
        self.current_peak = 0.0;
        self.held_peak = 0.0;
        self.hold_counter = 0;
    }

    pub fn reset_held(&mut self) {
        self.held_peak = self.current_peak;
        self.hold_counter = 0;
    }
}

/// Windowed RMS meter over a rolling ring of squared samples.
#[derive(Debug, Clone)]
pub struct RmsMeter {
    sum_squares: f32,
    window_samples: usize,
    buffer: Vec<f32>,
    write_pos: usize,
}

impl RmsMeter {
    /// `window_ms` is clamped to 1..=1000 ms.
    pub fn new(sample_rate: f32, window_ms: f32) -> Self {
        let sr = if sample_rate > 0.0 && sample_rate.is_finite() {
            sample_rate
        } else {
            DEFAULT_SAMPLE_RATE
        };
        let window = if window_ms.is_finite() {
            window_ms.clamp(1.0, 1000.0)
        } else {
            300.0
        };
        let window_samples = ((window * 0.001 * sr) as usize).max(1);
        Self {
            sum_squares: 0.0,
            window_samples,
            buffer: vec![0.0; window_samples],
            write_pos: 0,
        }
    }

    pub fn process(&mut self, sample: f32) {
        let squared = sample * sample;

        self.sum_squares -= self.buffer[self.write_pos];
        self.sum_squares += squared;
        self.buffer[self.write_pos] = squared;

        self.write_pos = (self.write_pos + 1) % self.window_samples;
    }

    pub fn process_block(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.process(sample);
        }
    }

    pub fn rms(&self) -> f32 {
        (self.sum_squares.max(0.0) / self.window_samples as f32).sqrt()
    }

    pub fn rms_db(&self) -> f32 {
        20.0 * self.rms().max(1e-10).log10()
    }

    pub fn reset(&mut self) {
        self.sum_squares = 0.0;
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_peaks_at_its_bin() {
        let mut analyzer = SpectrumAnalyzer::new();
        let freq = 1000.0;
        let sample_rate = 48000.0;
        let samples: Vec<f32> = (0..FFT_SIZE)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate).sin())
            .collect();
        analyzer.push_samples(&samples);

        // Several passes let the smoothing converge.
        for _ in 0..8 {
            analyzer.analyze();
        }

        let mut out = vec![0.0; SPECTRUM_LEN];
        analyzer.write_magnitudes(&mut out);

        let peak_bin = SpectrumAnalyzer::freq_to_bin(freq, sample_rate);
        assert!(
            out[peak_bin] > out[peak_bin + 20],
            "expected energy concentrated near {} Hz bin",
            freq
        );
        assert!(out[peak_bin] > 0.1, "peak bin should carry visible energy");
    }

    #[test]
    fn silence_analyzes_to_zero() {
        let mut analyzer = SpectrumAnalyzer::new();
        analyzer.analyze();

        let mut out = vec![0.0; SPECTRUM_LEN];
        analyzer.write_magnitudes(&mut out);
        assert!(out.iter().all(|&v| v.abs() < 1e-3));
    }

    #[test]
    fn peak_level_clamps() {
        assert_eq!(peak_level(&[]), 0.0);
        assert_eq!(peak_level(&[0.25, -0.5, 0.1]), 0.5);
        assert_eq!(peak_level(&[2.0, -3.0]), 1.0);
    }

    #[test]
    fn peak_meter_tracks_and_releases() {
        let mut meter = PeakMeter::new(48000.0);

        meter.process(0.5);
        assert!((meter.current() - 0.5).abs() < 1e-6);
        assert!(meter.current_db() > -7.0); // ~-6 dB

        meter.process(1.0);
        assert!(meter.current_db() > -0.1); // ~0 dB

        // One 300 ms release constant of silence drops the peak to ~1/e.
        meter.process_block(&vec![0.0; 14400]);
        assert!(meter.current() < 0.40 && meter.current() > 0.30);

        // Held peak is still inside its 2 s hold window.
        assert!((meter.held() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn peak_meter_hold_expires() {
        let mut meter = PeakMeter::new(1000.0);
        meter.process(0.8);

        // 2 s hold at 1 kHz = 2000 samples, then release kicks in.
        meter.process_block(&vec![0.0; 1500]);
        assert!((meter.held() - 0.8).abs() < 1e-6);
        meter.process_block(&vec![0.0; 1000]);
        assert!(meter.held() < 0.8);

        meter.reset_held();
        assert!(meter.held() <= meter.current() + 1e-6);
    }

    #[test]
    fn rms_meter_converges_on_constant_input() {
        let mut meter = RmsMeter::new(48000.0, 100.0);
        meter.process_block(&vec![0.5; 4800]);
        assert!((meter.rms() - 0.5).abs() < 1e-3);
        assert!((meter.rms_db() - -6.02).abs() < 0.1);

        meter.reset();
        assert!(meter.rms() < 1e-6);
    }

    #[test]
    fn rms_meter_clamps_degenerate_window() {
        // 0 ms clamps to 1 ms; a full window of ones reads 1.0.
        let mut meter = RmsMeter::new(48000.0, 0.0);
        meter.process_block(&vec![1.0; 48]);
        assert!((meter.rms() - 1.0).abs() < 1e-6);
    }
}
