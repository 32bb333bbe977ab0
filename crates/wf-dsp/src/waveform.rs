//! Waveform peak-bucket downsampling

/// Downsample mono samples into `out` using max-abs buckets, preserving the
/// sign of the dominant excursion per bucket.
///
/// When the input has fewer samples than `out`, samples are copied and the
/// tail is zero-filled.
pub fn waveform_peaks(samples: &[f32], out: &mut [f32]) {
    out.fill(0.0);
    if samples.is_empty() || out.is_empty() {
        return;
    }

    if samples.len() <= out.len() {
        out[..samples.len()].copy_from_slice(samples);
        return;
    }

    let bucket_len = samples.len() as f64 / out.len() as f64;
    for (i, slot) in out.iter_mut().enumerate() {
        let start = (i as f64 * bucket_len) as usize;
        let end = (((i + 1) as f64 * bucket_len) as usize).min(samples.len());
        let mut peak = 0.0f32;
        for &s in &samples[start..end.max(start + 1)] {
            if s.abs() > peak.abs() {
                peak = s;
            }
        }
        *slot = peak;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_input_copies_and_pads() {
        let mut out = [1.0f32; 8];
        waveform_peaks(&[0.5, -0.5], &mut out);
        assert_eq!(out[0], 0.5);
        assert_eq!(out[1], -0.5);
        assert!(out[2..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn buckets_keep_signed_peaks() {
        // 4 buckets of 4 samples; dominant excursion is negative in bucket 1.
        let samples = [
            0.1, 0.2, 0.1, 0.0, //
            0.1, -0.9, 0.2, 0.0, //
            0.5, 0.4, 0.3, 0.2, //
            0.0, 0.0, 0.7, 0.1,
        ];
        let mut out = [0.0f32; 4];
        waveform_peaks(&samples, &mut out);
        assert_eq!(out[0], 0.2);
        assert_eq!(out[1], -0.9);
        assert_eq!(out[2], 0.5);
        assert_eq!(out[3], 0.7);
    }
}
