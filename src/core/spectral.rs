use std::collections::BTreeMap;

use ndarray::{s, Array3, Zip};
use num_complex::Complex32;
use tracing::{debug, info};

use crate::{
    core::{
        dsp::{istft_parallel, stft},
        filter::apply_mwf,
    },
    error::{Result, StemError},
    io::progress::{emit_split_progress, SplitProgress},
    model::{engine::StemModel, hparams::StemHparams},
    types::{AudioData, Estimates, PartSelection, SpectralOptions, Stem},
};

/// Runs `model` over a `(frames, channels, bins)` magnitude spectrogram in
/// patches of `hp.patch_length` frames.
///
/// The last patch is zero-padded. Bins at or above `valid_signal_idx` are
/// not fed to the network and stay zero in the estimate. With
/// `ch_flip_average` the estimate is averaged with the one obtained from the
/// channel-swapped input.
pub fn model_separate(
    model: &dyn StemModel,
    stem: Stem,
    mag: &Array3<f32>,
    hp: &StemHparams,
    ch_flip_average: bool,
) -> Result<Array3<f32>> {
    let (frames, channels, bins) = mag.dim();
    let valid = hp.valid_signal_idx.unwrap_or(bins).min(bins);
    let patch = hp.patch_length;

    let mut out = Array3::<f32>::zeros((frames, channels, bins));
    let mut start = 0;
    while start < frames {
        let end = (start + patch).min(frames);
        let len = end - start;

        let mut input = Array3::<f32>::zeros((patch, channels, valid));
        input
            .slice_mut(s![..len, .., ..])
            .assign(&mag.slice(s![start..end, .., ..valid]));

        let mut est = infer_checked(model, stem, &input)?;
        if ch_flip_average && channels > 1 {
            let flipped = input.slice(s![.., ..;-1, ..]).to_owned();
            let est_flipped = infer_checked(model, stem, &flipped)?;
            est = (est + &est_flipped.slice(s![.., ..;-1, ..])) * 0.5;
        }

        out.slice_mut(s![start..end, .., ..valid])
            .assign(&est.slice(s![..len, .., ..]));
        start = end;
    }

    Ok(out)
}

fn infer_checked(model: &dyn StemModel, stem: Stem, input: &Array3<f32>) -> Result<Array3<f32>> {
    let est = model.infer(stem, input)?;
    if est.dim() != input.dim() {
        return Err(StemError::Inference {
            stem,
            reason: format!(
                "model returned shape {:?} for input {:?}",
                est.dim(),
                input.dim()
            ),
        });
    }
    Ok(est)
}

/// Spectral estimates of every requested stem, back in the time domain.
///
/// All four stems are inferred regardless of `parts`: the Wiener filter
/// needs the full set. Unrequested stems are dropped before the inverse
/// transform.
pub fn compute_estimates(
    model: &dyn StemModel,
    audio: &AudioData,
    parts: &PartSelection,
    hparams: &BTreeMap<Stem, StemHparams>,
    opts: &SpectralOptions,
) -> Result<Estimates> {
    if opts.fft_size < 2
        || opts.fft_size % 2 != 0
        || opts.hop_size == 0
        || opts.hop_size > opts.fft_size / 2
    {
        return Err(anyhow::anyhow!(
            "bad STFT parameters: fft_size={}, hop_size={}",
            opts.fft_size,
            opts.hop_size
        )
        .into());
    }
    if opts.n_channels == 0 {
        return Err(anyhow::anyhow!("n_channels must be positive").into());
    }

    let wave = audio.to_planar(opts.n_channels);
    let length = wave.dim().1;
    if length == 0 {
        return Err(anyhow::anyhow!("empty audio").into());
    }

    let mix = stft(wave.view(), opts.fft_size, opts.hop_size);
    let mag = mix.mapv(|c| c.norm());
    let phase = mix.mapv(|c| Complex32::from_polar(1.0, c.arg()));
    debug!(dims = ?mix.dim(), "mixture spectrogram");

    let total = Stem::ALL.len();
    let mut specs: Vec<Array3<Complex32>> = Vec::with_capacity(total);
    for (i, stem) in Stem::ALL.into_iter().enumerate() {
        info!("Processing {stem}...");
        emit_split_progress(SplitProgress::Stem {
            stem,
            done: i,
            total,
        });

        let hp = hparams.get(&stem).ok_or_else(|| StemError::Hparams {
            stem,
            path: String::new(),
            reason: "not loaded".into(),
        })?;
        let est = model_separate(model, stem, &mag, hp, opts.ch_flip_average)?;
        specs.push(
            Zip::from(&est)
                .and(&phase)
                .map_collect(|&m, &p| p * m),
        );
    }

    if opts.apply_mwf {
        emit_split_progress(SplitProgress::Stage("filter"));
        specs = apply_mwf(&specs, &mix, opts.mwf_iterations)?;
    }

    let kept: Vec<(Stem, &Array3<Complex32>)> = Stem::ALL
        .into_iter()
        .zip(specs.iter())
        .filter(|(stem, _)| parts.is_selected(*stem))
        .collect();
    let refs: Vec<&Array3<Complex32>> = kept.iter().map(|(_, s)| *s).collect();
    let waves = istft_parallel(&refs, opts.fft_size, opts.hop_size, length);

    Ok(kept
        .into_iter()
        .map(|(stem, _)| stem)
        .zip(waves)
        .collect())
}
