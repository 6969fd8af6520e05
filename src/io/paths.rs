use std::{env, path::PathBuf};

/// Directory the model weights live in, relative to the working directory
/// unless `D3NET_MODEL_DIR` says otherwise.
pub fn model_dir() -> PathBuf {
    env::var("D3NET_MODEL_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("pretrained_models"))
}

pub fn model_url_override() -> Option<String> {
    env::var("D3NET_MODEL_URL").ok().filter(|s| !s.is_empty())
}

pub fn hparams_dir() -> PathBuf {
    env::var("D3NET_HPARAMS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config").join("d3net"))
}

pub fn tmp_dir() -> PathBuf {
    env::var("D3NET_TMP_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir())
}
