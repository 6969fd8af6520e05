//! # d3net-separator
//!
//! Music source separation with pretrained D3Net weights: provisions the
//! model, decodes local or remote audio, estimates the vocals, drums, bass
//! and other stems in the STFT domain, and exports them (or a remix of a
//! subset of them) as MP3.

pub mod core;
pub mod error;
pub mod io;
pub mod model;
pub mod types;

pub use crate::{
    core::{
        export::{AudioEncoder, FfmpegEncoder},
        loader::InputStorage,
        separator::Separator,
    },
    error::{ExportFailure, Result, StemError},
    io::progress::{set_download_progress_callback, set_split_progress_callback, SplitProgress},
    model::{
        engine::{ModelBackend, OrtBackend, StemModel},
        hparams::StemHparams,
        provision::{ensure_model, ModelHandle, ModelSource},
    },
    types::{
        AudioData, Device, Estimates, ExecutionContext, PartSelection, SeparatorConfig,
        SpectralOptions, SplitResult, Stem, SAMPLE_RATE,
    },
};
