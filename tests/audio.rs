use d3net_separator::{core::audio::resample, AudioData};

fn impulse(sample_rate: u32, frames: usize, at: usize) -> AudioData {
    let mut samples = vec![0.0f32; frames];
    samples[at] = 1.0;
    AudioData {
        samples,
        sample_rate,
        channels: 1,
    }
}

fn peak_index(samples: &[f32]) -> usize {
    samples
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
        .map(|(i, _)| i)
        .unwrap()
}

#[test]
fn upsampling_keeps_impulse_in_place() {
    let out = resample(&impulse(22_050, 22_050, 5_000), 44_100).unwrap();
    assert_eq!(out.sample_rate, 44_100);
    assert_eq!(out.frames(), 44_100);

    let peak = peak_index(&out.samples);
    assert!(peak.abs_diff(10_000) <= 2, "impulse moved to {peak}");
}

#[test]
fn downsampling_keeps_impulse_in_place() {
    let out = resample(&impulse(48_000, 48_000, 12_000), 44_100).unwrap();
    assert_eq!(out.frames(), 44_100);

    let peak = peak_index(&out.samples);
    assert!(peak.abs_diff(11_025) <= 2, "impulse moved to {peak}");
}

#[test]
fn stereo_channels_stay_interleaved() {
    let frames = 22_050;
    let mut samples = vec![0.0f32; frames * 2];
    samples[2 * 1_000] = 1.0;
    samples[2 * 3_000 + 1] = -1.0;
    let audio = AudioData {
        samples,
        sample_rate: 22_050,
        channels: 2,
    };

    let out = resample(&audio, 44_100).unwrap();
    assert_eq!(out.channels, 2);
    let left: Vec<f32> = out.samples.iter().step_by(2).copied().collect();
    let right: Vec<f32> = out.samples.iter().skip(1).step_by(2).copied().collect();
    assert!(peak_index(&left).abs_diff(2_000) <= 2);
    assert!(peak_index(&right).abs_diff(6_000) <= 2);
    assert!(right[peak_index(&right)] < 0.0);
}

#[test]
fn same_rate_is_untouched() {
    let audio = impulse(44_100, 1_000, 10);
    let out = resample(&audio, 44_100).unwrap();
    assert_eq!(out.samples, audio.samples);
}
