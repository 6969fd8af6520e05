use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Sample rate every input is decoded to and every output is encoded at.
pub const SAMPLE_RATE: u32 = 44_100;

/// The four canonical stems, in model order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stem {
    Vocals,
    Drums,
    Bass,
    Other,
}

impl Stem {
    pub const ALL: [Stem; 4] = [Stem::Vocals, Stem::Drums, Stem::Bass, Stem::Other];

    pub fn name(self) -> &'static str {
        match self {
            Stem::Vocals => "vocals",
            Stem::Drums => "drums",
            Stem::Bass => "bass",
            Stem::Other => "other",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.mp3", self.name())
    }
}

impl fmt::Display for Stem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stem::ALL
            .into_iter()
            .find(|stem| stem.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown stem `{s}` (expected vocals, drums, bass or other)"))
    }
}

/// Which stems to keep. A stem with no entry counts as not selected.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartSelection(BTreeMap<Stem, bool>);

impl PartSelection {
    pub fn all() -> Self {
        Stem::ALL.into_iter().map(|s| (s, true)).collect()
    }

    pub fn none() -> Self {
        Stem::ALL.into_iter().map(|s| (s, false)).collect()
    }

    pub fn only(stems: &[Stem]) -> Self {
        Stem::ALL
            .into_iter()
            .map(|s| (s, stems.contains(&s)))
            .collect()
    }

    pub fn set(&mut self, stem: Stem, include: bool) -> &mut Self {
        self.0.insert(stem, include);
        self
    }

    pub fn is_selected(&self, stem: Stem) -> bool {
        self.0.get(&stem).copied().unwrap_or(false)
    }

    pub fn selected(&self) -> impl Iterator<Item = Stem> + '_ {
        Stem::ALL.into_iter().filter(|s| self.is_selected(*s))
    }

    pub fn is_empty(&self) -> bool {
        self.selected().next().is_none()
    }
}

impl FromIterator<(Stem, bool)> for PartSelection {
    fn from_iter<I: IntoIterator<Item = (Stem, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Clone, Debug)]
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioData {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    /// Planar `(channels, frames)` view with exactly `channels` rows.
    /// Mono sources are duplicated, extra channels are dropped.
    pub fn to_planar(&self, channels: usize) -> Array2<f32> {
        let src = self.channels.max(1) as usize;
        let frames = self.frames();
        Array2::from_shape_fn((channels, frames), |(ch, i)| {
            self.samples[i * src + ch.min(src - 1)]
        })
    }

    pub fn from_planar(wave: &Array2<f32>, sample_rate: u32) -> Self {
        let (channels, frames) = wave.dim();
        let mut samples = Vec::with_capacity(channels * frames);
        for i in 0..frames {
            for ch in 0..channels {
                samples.push(wave[(ch, i)]);
            }
        }
        Self {
            samples,
            sample_rate,
            channels: channels as u16,
        }
    }
}

/// Compute device the model runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Cuda,
}

/// Explicit compute context handed to the inference backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionContext {
    pub device: Device,
    pub intra_threads: Option<usize>,
}

impl ExecutionContext {
    pub fn cpu() -> Self {
        Self {
            device: Device::Cpu,
            intra_threads: None,
        }
    }

    pub fn cuda() -> Self {
        Self {
            device: Device::Cuda,
            intra_threads: None,
        }
    }
}

/// Immutable per-instance separator settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeparatorConfig {
    pub cpu_separation: bool,
    pub bitrate_kbps: u32,
    /// Intra-op threads for inference; the runtime picks when unset.
    #[serde(default)]
    pub intra_threads: Option<usize>,
}

impl Default for SeparatorConfig {
    fn default() -> Self {
        Self {
            cpu_separation: true,
            bitrate_kbps: 256,
            intra_threads: None,
        }
    }
}

impl SeparatorConfig {
    /// Bitrate in the `<n>k` form the encoder expects.
    pub fn bitrate(&self) -> String {
        format!("{}k", self.bitrate_kbps)
    }

    pub fn execution_context(&self) -> ExecutionContext {
        let ctx = if self.cpu_separation {
            ExecutionContext::cpu()
        } else {
            ExecutionContext::cuda()
        };
        ExecutionContext {
            intra_threads: self.intra_threads,
            ..ctx
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpectralOptions {
    pub fft_size: usize,
    pub hop_size: usize,
    pub n_channels: usize,
    pub apply_mwf: bool,
    pub mwf_iterations: usize,
    pub ch_flip_average: bool,
}

impl Default for SpectralOptions {
    fn default() -> Self {
        Self {
            fft_size: 4096,
            hop_size: 1024,
            n_channels: 2,
            apply_mwf: true,
            mwf_iterations: 1,
            ch_flip_average: true,
        }
    }
}

/// Time-domain `(channels, frames)` waveform per retained stem.
pub type Estimates = BTreeMap<Stem, Array2<f32>>;

#[derive(Clone, Debug)]
pub struct SplitResult {
    pub vocals_path: PathBuf,
    pub drums_path: PathBuf,
    pub bass_path: PathBuf,
    pub other_path: PathBuf,
}

impl SplitResult {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            vocals_path: dir.join(Stem::Vocals.file_name()),
            drums_path: dir.join(Stem::Drums.file_name()),
            bass_path: dir.join(Stem::Bass.file_name()),
            other_path: dir.join(Stem::Other.file_name()),
        }
    }

    pub fn path(&self, stem: Stem) -> &Path {
        match stem {
            Stem::Vocals => &self.vocals_path,
            Stem::Drums => &self.drums_path,
            Stem::Bass => &self.bass_path,
            Stem::Other => &self.other_path,
        }
    }
}
