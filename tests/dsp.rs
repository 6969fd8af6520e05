use approx::assert_abs_diff_eq;
use ndarray::{Array2, Array3};
use num_complex::Complex32;

use d3net_separator::{
    core::{
        dsp::{istft, num_bins, num_frames, stft},
        filter::{apply_mwf, softmask},
    },
    AudioData, StemError,
};

fn test_signal(t: usize) -> Array2<f32> {
    let mut wave = Array2::<f32>::zeros((2, t));
    wave[(0, 100)] = 1.0;
    wave[(1, 200)] = -1.0;
    for i in 0..t {
        wave[(0, i)] += (i as f32 * 0.01).cos() * 0.1;
        wave[(1, i)] += (i as f32 * 0.02).sin() * 0.1;
    }
    wave
}

#[test]
fn to_planar_duplicates_mono() {
    let mono = AudioData {
        samples: vec![0.1, -0.2, 0.3, -0.4],
        sample_rate: 44_100,
        channels: 1,
    };
    let planar = mono.to_planar(2);
    assert_eq!(planar.dim(), (2, 4));
    for i in 0..4 {
        assert_abs_diff_eq!(planar[(0, i)], mono.samples[i], epsilon = 1e-7);
        assert_abs_diff_eq!(planar[(1, i)], mono.samples[i], epsilon = 1e-7);
    }
}

#[test]
fn to_planar_drops_extra_channels() {
    let surround = AudioData {
        samples: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        sample_rate: 44_100,
        channels: 3,
    };
    let planar = surround.to_planar(2);
    assert_eq!(planar.dim(), (2, 2));
    assert_eq!(planar[(0, 1)], 4.0);
    assert_eq!(planar[(1, 1)], 5.0);

    let back = AudioData::from_planar(&planar, 44_100);
    assert_eq!(back.samples, vec![1.0, 2.0, 4.0, 5.0]);
}

#[test]
fn stft_istft_roundtrip() {
    let n_fft = 1024usize;
    let hop = 256usize;
    let t = 4096usize;
    let wave = test_signal(t);

    let spec = stft(wave.view(), n_fft, hop);
    let back = istft(&spec, n_fft, hop, t);
    assert_eq!(back.dim(), (2, t));

    let margin = n_fft;
    for ch in 0..2 {
        for i in margin..(t - margin) {
            assert_abs_diff_eq!(back[(ch, i)], wave[(ch, i)], epsilon = 1e-3);
        }
    }
}

#[test]
fn stft_default_dims() {
    let t = 44_100usize;
    let wave = Array2::<f32>::zeros((2, t));
    let spec = stft(wave.view(), 4096, 1024);
    assert_eq!(spec.dim(), (num_frames(t, 1024), 2, num_bins(4096)));
    assert_eq!(num_bins(4096), 2049);
    assert_eq!(num_frames(t, 1024), 44);
}

#[test]
fn softmask_partitions_the_mixture() {
    let x = Array3::from_shape_fn((3, 2, 5), |(t, c, f)| {
        Complex32::new(1.0 + t as f32, c as f32 - f as f32)
    });
    let v = vec![
        Array3::<f32>::from_elem((3, 2, 5), 3.0),
        Array3::<f32>::from_elem((3, 2, 5), 1.0),
    ];
    let y = softmask(&v, &x);
    for ((a, b), m) in y[0].iter().zip(y[1].iter()).zip(x.iter()) {
        assert_abs_diff_eq!((a + b).re, m.re, epsilon = 1e-4);
        assert_abs_diff_eq!((a + b).im, m.im, epsilon = 1e-4);
        assert_abs_diff_eq!(a.re, m.re * 0.75, epsilon = 1e-4);
    }
}

#[test]
fn mwf_keeps_identical_sources_balanced() {
    let x = Array3::from_shape_fn((16, 2, 9), |(t, c, f)| {
        Complex32::from_polar(0.5 + (t + f) as f32 * 0.1, (c * 3 + f) as f32 * 0.7)
    });
    let quarter = x.mapv(|c| c * 0.25);
    let sources = vec![quarter.clone(), quarter.clone(), quarter.clone(), quarter];

    let y = apply_mwf(&sources, &x, 1).unwrap();
    assert_eq!(y.len(), 4);
    for yj in &y {
        for (a, m) in yj.iter().zip(x.iter()) {
            assert_abs_diff_eq!(a.re, m.re * 0.25, epsilon = 1e-2);
            assert_abs_diff_eq!(a.im, m.im * 0.25, epsilon = 1e-2);
        }
    }
}

#[test]
fn mwf_rejects_more_than_two_channels() {
    let x = Array3::<Complex32>::zeros((4, 3, 5));
    let err = apply_mwf(&[x.clone()], &x, 1).unwrap_err();
    assert!(matches!(err, StemError::Filter(_)), "got {err:?}");
}

#[test]
fn odd_fft_size_covers_the_last_frame() {
    let wave = test_signal(257);
    let spec = stft(wave.view(), 5, 2);
    assert_eq!(spec.dim(), (num_frames(257, 2), 2, num_bins(5)));

    let short = Array2::<f32>::ones((2, 4));
    let spec = stft(short.view(), 5, 2);
    assert_eq!(spec.dim(), (3, 2, 3));
    assert!(spec.iter().all(|c| c.re.is_finite() && c.im.is_finite()));
}
