use thiserror::Error;

use crate::types::Stem;

/// One stem that could not be written during a parallel export.
#[derive(Debug, Clone)]
pub struct ExportFailure {
    pub stem: Stem,
    pub reason: String,
}

/// Central error type for the d3net-separator crate.
#[derive(Debug, Error)]
pub enum StemError {
    // Generic fallback (wraps anyhow)
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Inference runtime error: {0}")]
    Runtime(#[from] ort::Error),

    // Provisioning
    #[error("Checksum mismatch for {path}")]
    Checksum { path: String },

    #[error("Model artifact {path} looks like {mime}, not model weights")]
    InvalidArtifact { path: String, mime: &'static str },

    // Input resolution
    #[error("Failed to decode audio from {input}: {reason}")]
    Decode { input: String, reason: String },

    // Inference
    #[error("Model {path} cannot be loaded: {reason}")]
    UnsupportedModel { path: String, reason: String },

    #[error("Execution provider unavailable: {0}")]
    ExecutionProvider(String),

    #[error("Hyperparameters for {stem} unavailable at {path}: {reason}")]
    Hparams {
        stem: Stem,
        path: String,
        reason: String,
    },

    #[error("Inference failed for {stem}: {reason}")]
    Inference { stem: Stem, reason: String },

    #[error("Spectral filtering failed: {0}")]
    Filter(String),

    // Export
    #[error("No parts selected for the static mix")]
    EmptySelection,

    #[error("Encoding {path} failed: {reason}")]
    Encode { path: String, reason: String },

    #[error("Export failed for {}", summarize(.failures))]
    Export { failures: Vec<ExportFailure> },
}

fn summarize(failures: &[ExportFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.stem, f.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<symphonia::core::errors::Error> for StemError {
    fn from(e: symphonia::core::errors::Error) -> Self {
        StemError::Anyhow(e.into())
    }
}

impl From<hound::Error> for StemError {
    fn from(e: hound::Error) -> Self {
        StemError::Anyhow(e.into())
    }
}

pub type Result<T> = std::result::Result<T, StemError>;
