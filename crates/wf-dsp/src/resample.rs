//! Linear sample-rate conversion and channel remapping
//!
//! Export mixdown works in whole display frames, so conversion here is
//! buffer-in/buffer-out linear interpolation rather than a streaming
//! resampler. Quality is adequate for mixdown blocks; playback-rate changes
//! on live channels are handled by the backend's cursor stepping instead.

/// Resample interleaved samples from `from_rate` to `to_rate`.
///
/// Output length follows the rate ratio. Returns the input unchanged when the
/// rates already match.
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32, channels: usize) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || channels == 0 {
        return samples.to_vec();
    }
    let in_frames = samples.len() / channels;
    let ratio = to_rate as f64 / from_rate as f64;
    let out_frames = (in_frames as f64 * ratio).round() as usize;
    resample_linear_exact(samples, from_rate, to_rate, channels, out_frames)
}

/// Resample interleaved samples producing exactly `out_frames` frames.
///
/// Output positions past the end of the input are zero-filled, never
/// truncated, so fixed-size mixdown blocks keep their length on short reads.
pub fn resample_linear_exact(
    samples: &[f32],
    from_rate: u32,
    to_rate: u32,
    channels: usize,
    out_frames: usize,
) -> Vec<f32> {
    let mut out = vec![0.0f32; out_frames * channels];
    if samples.is_empty() || channels == 0 || from_rate == 0 || to_rate == 0 {
        return out;
    }

    let in_frames = samples.len() / channels;
    let step = from_rate as f64 / to_rate as f64;

    for frame in 0..out_frames {
        let src_pos = frame as f64 * step;
        let idx = src_pos as usize;
        if idx >= in_frames {
            break;
        }
        let frac = (src_pos - idx as f64) as f32;
        let next = (idx + 1).min(in_frames - 1);
        for ch in 0..channels {
            let a = samples[idx * channels + ch];
            let b = samples[next * channels + ch];
            out[frame * channels + ch] = a + (b - a) * frac;
        }
    }
    out
}

/// Remap interleaved samples between channel layouts.
///
/// Mono to stereo duplicates, stereo to mono averages; other layouts copy
/// matching channels and duplicate the last source channel into any extras.
pub fn remap_channels(samples: &[f32], from: usize, to: usize) -> Vec<f32> {
    if from == to || from == 0 || to == 0 {
        return samples.to_vec();
    }
    let frames = samples.len() / from;
    let mut out = Vec::with_capacity(frames * to);

    if from == 2 && to == 1 {
        for frame in 0..frames {
            let l = samples[frame * 2];
            let r = samples[frame * 2 + 1];
            out.push((l + r) * 0.5);
        }
        return out;
    }

    for frame in 0..frames {
        let src = &samples[frame * from..(frame + 1) * from];
        for ch in 0..to {
            out.push(src[ch.min(from - 1)]);
        }
    }
    out
}
