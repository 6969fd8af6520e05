#![allow(dead_code)]

use std::{
    f32::consts::PI,
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use ndarray::{Array2, Array3};
use rand::{rngs::StdRng, RngCore, SeedableRng};

use d3net_separator::{
    core::audio::write_wav, AudioData, AudioEncoder, ExecutionContext, ModelBackend, Result,
    Stem, StemError, StemModel,
};

pub const HDF5_MAGIC: &[u8] = b"\x89HDF\r\n\x1a\n";

/// Deterministic fake weights that sniff as HDF5.
pub fn fake_weights(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    StdRng::seed_from_u64(42).fill_bytes(&mut data);
    data[..HDF5_MAGIC.len()].copy_from_slice(HDF5_MAGIC);
    data
}

pub fn sine_audio(sample_rate: u32, channels: u16, frames: usize) -> AudioData {
    let mut samples = Vec::with_capacity(frames * channels as usize);
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        for ch in 0..channels {
            let freq = 440.0 + 220.0 * ch as f32;
            samples.push((2.0 * PI * freq * t).sin() * 0.3);
        }
    }
    AudioData {
        samples,
        sample_rate,
        channels,
    }
}

pub fn write_sine_wav(path: &Path, sample_rate: u32, channels: u16, frames: usize) {
    write_wav(path, &sine_audio(sample_rate, channels, frames)).unwrap();
}

pub fn write_hparams(dir: &Path, patch_len: usize, valid_signal_idx: usize) {
    fs::create_dir_all(dir).unwrap();
    for stem in Stem::ALL {
        fs::write(
            dir.join(format!("{}.yaml", stem.name())),
            format!(
                "fft_size: 4096\nhop_size: 1024\npatch_len: {patch_len}\nvalid_signal_idx: {valid_signal_idx}\ndens_k: [16, 16]\n"
            ),
        )
        .unwrap();
    }
}

/// Splits the mixture evenly: every stem is a quarter of the input.
pub struct QuarterModel {
    pub calls: Arc<AtomicUsize>,
}

impl StemModel for QuarterModel {
    fn infer(&self, _stem: Stem, patch: &Array3<f32>) -> Result<Array3<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(patch * 0.25)
    }
}

#[derive(Clone, Default)]
pub struct QuarterBackend {
    pub loads: Arc<AtomicUsize>,
    pub calls: Arc<AtomicUsize>,
}

impl ModelBackend for QuarterBackend {
    fn load(&self, weights: &Path, _ctx: &ExecutionContext) -> Result<Box<dyn StemModel>> {
        assert!(weights.is_file(), "weights must be provisioned before loading");
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(QuarterModel {
            calls: self.calls.clone(),
        }))
    }
}

/// Writes 16-bit WAV data instead of MP3; optionally refuses one stem.
#[derive(Clone, Default)]
pub struct WavEncoder {
    pub fail_on: Option<String>,
    pub encoded: Arc<AtomicUsize>,
}

impl AudioEncoder for WavEncoder {
    fn encode(&self, path: &Path, wave: &Array2<f32>, sample_rate: u32, bitrate: &str) -> Result<()> {
        assert!(bitrate.ends_with('k'), "bitrate should look like 256k, got {bitrate}");
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if self.fail_on.as_deref() == Some(name) {
            return Err(StemError::Encode {
                path: path.display().to_string(),
                reason: "refused by test".into(),
            });
        }
        write_wav(path, &AudioData::from_planar(wave, sample_rate))?;
        self.encoded.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn dir_entries(dir: &Path) -> Vec<PathBuf> {
    match fs::read_dir(dir) {
        Ok(rd) => rd.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    }
}
