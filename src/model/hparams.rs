use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{
    error::{Result, StemError},
    types::Stem,
};

/// Inference hyperparameters of one stem's network.
///
/// Only the keys the patching logic needs are typed; the architecture keys
/// that ship in the same files are accepted and ignored.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct StemHparams {
    /// Frames per inference patch.
    #[serde(alias = "patch_len")]
    pub patch_length: usize,
    /// Number of low-frequency bins the network sees; bins above stay zero.
    #[serde(default)]
    pub valid_signal_idx: Option<usize>,
}

pub fn hparams_path(dir: &Path, stem: Stem) -> PathBuf {
    dir.join(format!("{}.yaml", stem.name()))
}

pub fn load_hparams(dir: &Path, stem: Stem) -> Result<StemHparams> {
    let path = hparams_path(dir, stem);
    let fail = |reason: String| StemError::Hparams {
        stem,
        path: path.display().to_string(),
        reason,
    };

    let text = fs::read_to_string(&path).map_err(|e| fail(e.to_string()))?;
    let hp: StemHparams = serde_yaml::from_str(&text).map_err(|e| fail(e.to_string()))?;
    if hp.patch_length == 0 {
        return Err(fail("patch_length must be positive".into()));
    }
    if hp.valid_signal_idx == Some(0) {
        return Err(fail("valid_signal_idx must be positive".into()));
    }
    Ok(hp)
}

/// Loads every canonical stem's hyperparameters; all stems are always
/// inferred, so any missing file fails the request.
pub fn load_all(dir: &Path) -> Result<BTreeMap<Stem, StemHparams>> {
    Stem::ALL
        .into_iter()
        .map(|stem| load_hparams(dir, stem).map(|hp| (stem, hp)))
        .collect()
}
