use std::{
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    thread,
};

use ndarray::Array2;
use rayon::prelude::*;
use tracing::{error, info};

use crate::{
    error::{ExportFailure, Result, StemError},
    io::progress::{emit_split_progress, SplitProgress},
    types::{Estimates, PartSelection, Stem},
};

/// Writes one `(channels, frames)` waveform to `path`.
pub trait AudioEncoder: Send + Sync {
    fn encode(&self, path: &Path, wave: &Array2<f32>, sample_rate: u32, bitrate: &str) -> Result<()>;
}

/// MP3 encoder that pipes raw f32 PCM into an `ffmpeg` child process.
#[derive(Clone, Debug)]
pub struct FfmpegEncoder {
    program: PathBuf,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self {
            program: std::env::var("D3NET_FFMPEG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("ffmpeg")),
        }
    }
}

impl FfmpegEncoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl AudioEncoder for FfmpegEncoder {
    fn encode(&self, path: &Path, wave: &Array2<f32>, sample_rate: u32, bitrate: &str) -> Result<()> {
        let fail = |reason: String| StemError::Encode {
            path: path.display().to_string(),
            reason,
        };
        let (channels, frames) = wave.dim();

        let mut pcm = Vec::with_capacity(channels * frames * 4);
        for i in 0..frames {
            for ch in 0..channels {
                pcm.extend_from_slice(&wave[(ch, i)].to_le_bytes());
            }
        }

        let mut child = Command::new(&self.program)
            .args(["-v", "error", "-y", "-f", "f32le"])
            .args(["-ar", &sample_rate.to_string()])
            .args(["-ac", &channels.to_string()])
            .args(["-i", "pipe:0", "-vn", "-codec:a", "libmp3lame"])
            .args(["-b:a", bitrate, "-f", "mp3"])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| fail(format!("failed to start {}: {e}", self.program.display())))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| fail("encoder stdin unavailable".into()))?;
        // Feed stdin from a helper thread so a chatty stderr cannot stall the pipe.
        let writer = thread::spawn(move || stdin.write_all(&pcm));

        let output = child.wait_with_output();
        let written = writer
            .join()
            .map_err(|_| fail("stdin writer panicked".into()))?;
        let output = output.map_err(|e| fail(format!("waiting for encoder: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(fail(format!("{} ({})", output.status, stderr.trim())));
        }
        written.map_err(|e| fail(format!("writing PCM: {e}")))?;
        Ok(())
    }
}

/// Sums the selected stems into one waveform.
pub fn mix_selected(estimates: &Estimates, parts: &PartSelection) -> Result<Array2<f32>> {
    let mut mix: Option<Array2<f32>> = None;
    for (stem, wave) in estimates {
        if !parts.is_selected(*stem) {
            continue;
        }
        match mix.as_mut() {
            None => mix = Some(wave.clone()),
            Some(acc) => *acc += wave,
        }
    }
    mix.ok_or(StemError::EmptySelection)
}

/// Encodes every estimate to `<dir>/<stem>.mp3` on a worker pool sized to
/// the available parallelism.
///
/// Every stem is attempted; failures are collected and reported together
/// once all workers are done. Stems that were written stay on disk.
pub fn export_stems(
    encoder: &dyn AudioEncoder,
    estimates: &Estimates,
    dir: &Path,
    sample_rate: u32,
    bitrate: &str,
) -> Result<Vec<(Stem, PathBuf)>> {
    std::fs::create_dir_all(dir)?;

    let workers = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(estimates.len().max(1));
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("stem-export-{i}"))
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build export pool: {e}"))?;

    let jobs: Vec<(Stem, &Array2<f32>)> = estimates.iter().map(|(s, w)| (*s, w)).collect();
    let results: Vec<(Stem, PathBuf, Result<()>)> = pool.install(|| {
        jobs.par_iter()
            .map(|(stem, wave)| {
                let path = dir.join(stem.file_name());
                info!("Exporting {stem} MP3...");
                let res = encoder.encode(&path, wave, sample_rate, bitrate);
                if res.is_ok() {
                    emit_split_progress(SplitProgress::Exported(*stem));
                }
                (*stem, path, res)
            })
            .collect()
    });

    let mut written = Vec::new();
    let mut failures = Vec::new();
    for (stem, path, res) in results {
        match res {
            Ok(()) => written.push((stem, path)),
            Err(e) => {
                error!(%stem, error = %e, "stem export failed");
                failures.push(ExportFailure {
                    stem,
                    reason: e.to_string(),
                });
            }
        }
    }

    if failures.is_empty() {
        Ok(written)
    } else {
        Err(StemError::Export { failures })
    }
}
