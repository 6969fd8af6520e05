//! Multichannel Wiener filtering of per-source spectrogram estimates.
//!
//! Sources start from a soft mask of the mixture and are then refined by
//! expectation-maximisation of a local Gaussian model: every source has a
//! time-frequency power `v_j(t, f)` and a frequency-dependent spatial
//! covariance `R_j(f)`, and each source is re-estimated as
//! `v_j R_j (sum_k v_k R_k)^-1 x`.

use ndarray::{Array2, Array3, Zip};
use num_complex::Complex32;

use crate::error::{Result, StemError};

const EPS: f32 = f32::EPSILON;

/// Spatial covariance of one source at one frequency, row-major `c x c`.
type Cov = Vec<Complex32>;

/// Filters `sources` (complex estimates, `(frames, channels, bins)`) against
/// the mixture `x`. Magnitudes of the inputs seed the soft mask.
pub fn apply_mwf(
    sources: &[Array3<Complex32>],
    x: &Array3<Complex32>,
    iterations: usize,
) -> Result<Vec<Array3<Complex32>>> {
    let channels = x.dim().1;
    if channels == 0 || channels > 2 {
        return Err(StemError::Filter(format!(
            "{channels} channels; only mono and stereo are supported"
        )));
    }
    if let Some(bad) = sources.iter().find(|s| s.dim() != x.dim()) {
        return Err(StemError::Filter(format!(
            "source shape {:?} does not match mixture {:?}",
            bad.dim(),
            x.dim()
        )));
    }
    if sources.is_empty() {
        return Ok(Vec::new());
    }

    let v: Vec<Array3<f32>> = sources.iter().map(|s| s.mapv(|c| c.norm())).collect();
    let mut y = softmask(&v, x);

    if iterations == 0 {
        return Ok(y);
    }

    let max_abs = (x.iter().fold(0.0f32, |m, c| m.max(c.norm())) / 10.0).max(1.0);
    let x_scaled = x.mapv(|c| c / max_abs);
    for yj in y.iter_mut() {
        yj.mapv_inplace(|c| c / max_abs);
    }

    for _ in 0..iterations {
        y = em_step(&y, &x_scaled);
    }

    for yj in y.iter_mut() {
        yj.mapv_inplace(|c| c * max_abs);
    }
    Ok(y)
}

/// `y_j = v_j / sum_k v_k * x`.
pub fn softmask(v: &[Array3<f32>], x: &Array3<Complex32>) -> Vec<Array3<Complex32>> {
    let mut total = Array3::<f32>::zeros(x.dim());
    for vj in v {
        total += vj;
    }
    v.iter()
        .map(|vj| {
            let mut yj = Array3::<Complex32>::zeros(x.dim());
            Zip::from(&mut yj)
                .and(vj)
                .and(&total)
                .and(x)
                .for_each(|y, &vj, &tot, &xv| *y = xv * (vj / (EPS + tot)));
            yj
        })
        .collect()
}

fn em_step(y: &[Array3<Complex32>], x: &Array3<Complex32>) -> Vec<Array3<Complex32>> {
    let (frames, channels, bins) = x.dim();
    let models: Vec<(Array2<f32>, Vec<Cov>)> = y.iter().map(local_gaussian_model).collect();
    let reg = EPS.sqrt();

    let mut out: Vec<Array3<Complex32>> = y.iter().map(|_| Array3::zeros(x.dim())).collect();
    let mut cxx: Cov = vec![Complex32::new(0.0, 0.0); channels * channels];
    let mut xv = vec![Complex32::new(0.0, 0.0); channels];

    for t in 0..frames {
        for f in 0..bins {
            cxx.fill(Complex32::new(0.0, 0.0));
            for (v, r) in &models {
                let vtf = v[(t, f)];
                for (c, rv) in cxx.iter_mut().zip(&r[f]) {
                    *c += *rv * vtf;
                }
            }
            for i in 0..channels {
                cxx[i * channels + i] += reg;
            }
            let inv = invert(&cxx, channels);

            for (i, xi) in xv.iter_mut().enumerate() {
                *xi = x[(t, i, f)];
            }

            for (j, (v, r)) in models.iter().enumerate() {
                let gain = matmul(&r[f], &inv, channels);
                let vtf = v[(t, f)];
                for i in 0..channels {
                    let mut acc = Complex32::new(0.0, 0.0);
                    for k in 0..channels {
                        acc += gain[i * channels + k] * xv[k];
                    }
                    out[j][(t, i, f)] = acc * vtf;
                }
            }
        }
    }

    out
}

/// Power `v(t, f)` (channel mean of `|y|^2`) and normalised spatial
/// covariance `R(f)` of one source.
fn local_gaussian_model(y: &Array3<Complex32>) -> (Array2<f32>, Vec<Cov>) {
    let (frames, channels, bins) = y.dim();

    let mut v = Array2::<f32>::zeros((frames, bins));
    for t in 0..frames {
        for f in 0..bins {
            let mut p = 0.0;
            for c in 0..channels {
                p += y[(t, c, f)].norm_sqr();
            }
            v[(t, f)] = p / channels as f32;
        }
    }

    let r = (0..bins)
        .map(|f| {
            let mut cov: Cov = vec![Complex32::new(0.0, 0.0); channels * channels];
            let mut weight = EPS;
            for t in 0..frames {
                weight += v[(t, f)];
                for i in 0..channels {
                    for k in 0..channels {
                        cov[i * channels + k] += y[(t, i, f)] * y[(t, k, f)].conj();
                    }
                }
            }
            for c in cov.iter_mut() {
                *c /= weight;
            }
            cov
        })
        .collect();

    (v, r)
}

fn matmul(a: &[Complex32], b: &[Complex32], n: usize) -> Cov {
    let mut out = vec![Complex32::new(0.0, 0.0); n * n];
    for i in 0..n {
        for k in 0..n {
            let aik = a[i * n + k];
            for j in 0..n {
                out[i * n + j] += aik * b[k * n + j];
            }
        }
    }
    out
}

fn invert(m: &[Complex32], n: usize) -> Cov {
    match n {
        1 => vec![Complex32::new(1.0, 0.0) / (m[0] + EPS)],
        _ => {
            let det = m[0] * m[3] - m[1] * m[2];
            let inv_det = Complex32::new(1.0, 0.0) / (det + EPS);
            vec![m[3] * inv_det, -m[1] * inv_det, -m[2] * inv_det, m[0] * inv_det]
        }
    }
}
