use ndarray::{Array2, Array3, ArrayView2};
use num_complex::Complex32;
use rayon::prelude::*;
use rustfft::{num_traits::Zero, FftPlanner};

fn compute_hann(n_fft: usize) -> Vec<f32> {
    if n_fft <= 1 {
        return vec![1.0];
    }
    let denom = (n_fft - 1) as f32;
    (0..n_fft)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * (i as f32) / denom).cos())
        .collect()
}

pub fn num_bins(n_fft: usize) -> usize {
    n_fft / 2 + 1
}

pub fn num_frames(len: usize, hop: usize) -> usize {
    1 + len / hop
}

/// Centred Hann STFT of a planar `(channels, samples)` waveform.
/// Returns `(frames, channels, bins)` with `bins = n_fft / 2 + 1`.
pub fn stft(wave: ArrayView2<f32>, n_fft: usize, hop: usize) -> Array3<Complex32> {
    let (channels, t) = wave.dim();
    let pad = n_fft / 2;
    // Odd sizes need one extra sample on the right for the last frame.
    let pad_right = n_fft - pad;
    let frames = num_frames(t, hop);
    let f_bins = num_bins(n_fft);

    let fft = FftPlanner::new().plan_fft_forward(n_fft);
    let window = compute_hann(n_fft);

    let mut out = Array3::<Complex32>::zeros((frames, channels, f_bins));
    let mut padded = vec![0.0f32; pad + t + pad_right];
    let mut buf = vec![Complex32::zero(); n_fft];

    for ch in 0..channels {
        padded.fill(0.0);
        for (dst, src) in padded[pad..pad + t].iter_mut().zip(wave.row(ch)) {
            *dst = *src;
        }

        for fr in 0..frames {
            let start = fr * hop;
            let frame = &padded[start..start + n_fft];
            for i in 0..n_fft {
                buf[i] = Complex32::new(frame[i] * window[i], 0.0);
            }
            fft.process(&mut buf);
            for fi in 0..f_bins {
                out[(fr, ch, fi)] = buf[fi];
            }
        }
    }

    out
}

/// Overlap-add inverse of [`stft`], trimmed to `target_length` samples.
pub fn istft(spec: &Array3<Complex32>, n_fft: usize, hop: usize, target_length: usize) -> Array2<f32> {
    let (frames, channels, f_bins) = spec.dim();
    let pad = n_fft / 2;
    let padded_length = target_length + 2 * pad;

    let ifft = FftPlanner::new().plan_fft_inverse(n_fft);
    let window = compute_hann(n_fft);
    let scale = 1.0 / (n_fft as f32);

    let mut out = Array2::<f32>::zeros((channels, target_length));
    let mut acc = vec![0.0f32; padded_length];
    let mut window_sum = vec![0.0f32; padded_length];
    let mut buf = vec![Complex32::zero(); n_fft];

    for ch in 0..channels {
        acc.fill(0.0);
        window_sum.fill(0.0);

        for fr in 0..frames {
            buf.fill(Complex32::zero());
            for fi in 0..f_bins.min(n_fft / 2 + 1) {
                buf[fi] = spec[(fr, ch, fi)];
            }
            // Hermitian mirror so the inverse is real.
            for fi in 1..n_fft.div_ceil(2) {
                buf[n_fft - fi] = buf[fi].conj();
            }
            buf[0].im = 0.0;
            if n_fft % 2 == 0 {
                buf[n_fft / 2].im = 0.0;
            }

            ifft.process(&mut buf);

            let start = fr * hop;
            for i in 0..n_fft {
                let pos = start + i;
                if pos >= padded_length {
                    break;
                }
                let w = window[i];
                acc[pos] += buf[i].re * w * scale;
                window_sum[pos] += w * w;
            }
        }

        for i in 0..target_length {
            let sum = window_sum[pad + i];
            out[(ch, i)] = if sum > 1e-10 { acc[pad + i] / sum } else { 0.0 };
        }
    }

    out
}

/// [`istft`] over several spectrograms at once.
pub fn istft_parallel(
    specs: &[&Array3<Complex32>],
    n_fft: usize,
    hop: usize,
    target_length: usize,
) -> Vec<Array2<f32>> {
    specs
        .par_iter()
        .map(|spec| istft(spec, n_fft, hop, target_length))
        .collect()
}
