use crate::{
    error::{Result, StemError},
    io::{
        crypto::verify_sha256,
        net::{download_with_progress, http_client},
        paths,
        sniff::{sniff_file, ContentKind},
    },
};

use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

pub const MODEL_URL: &str =
    "https://github.com/JeffreyCA/spleeterweb-d3net/releases/download/d3net-mss/d3net-mss.h5";
pub const MODEL_FILE: &str = "d3net-mss.h5";

/// Where the weights come from and where they are kept.
#[derive(Clone, Debug)]
pub struct ModelSource {
    pub url: String,
    pub dir: PathBuf,
    pub file_name: String,
    /// Pinned digest; when set, a cached file that does not match is replaced.
    pub sha256: Option<String>,
}

impl Default for ModelSource {
    fn default() -> Self {
        Self {
            url: paths::model_url_override().unwrap_or_else(|| MODEL_URL.to_string()),
            dir: paths::model_dir(),
            file_name: MODEL_FILE.to_string(),
            sha256: None,
        }
    }
}

impl ModelSource {
    pub fn new(url: impl Into<String>, dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            dir: dir.into(),
            file_name: file_name.into(),
            sha256: None,
        }
    }

    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = Some(sha256.into());
        self
    }

    pub fn local_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }
}

#[derive(Clone, Debug)]
pub struct ModelHandle {
    pub local_path: PathBuf,
    /// Whether this call fetched the artifact.
    pub downloaded: bool,
}

/// Makes sure a usable weights file sits at `source.local_path()`.
///
/// A missing file is downloaded. An existing file is kept unless it sniffs
/// as an HTML page or misses the pinned digest, in which case it is fetched
/// again. Concurrent callers are not synchronised against each other.
pub fn ensure_model(source: &ModelSource) -> Result<ModelHandle> {
    let local_path = source.local_path();

    match stale_reason(source, &local_path)? {
        None => {
            return Ok(ModelHandle {
                local_path,
                downloaded: false,
            })
        }
        Some(reason) => {
            if local_path.exists() {
                warn!(path = %local_path.display(), reason, "replacing cached model");
            } else {
                info!(url = %source.url, "downloading model weights");
            }
        }
    }

    fs::create_dir_all(&source.dir)?;
    let client = http_client()?;
    download_with_progress(&client, &source.url, &local_path)?;

    let kind = sniff_file(&local_path)?;
    if kind == ContentKind::Html {
        fs::remove_file(&local_path).ok();
        return Err(StemError::InvalidArtifact {
            path: local_path.display().to_string(),
            mime: kind.mime(),
        });
    }

    if let Some(expected) = &source.sha256 {
        if !verify_sha256(&local_path, expected)? {
            return Err(StemError::Checksum {
                path: local_path.display().to_string(),
            });
        }
    }

    Ok(ModelHandle {
        local_path,
        downloaded: true,
    })
}

fn stale_reason(source: &ModelSource, path: &Path) -> Result<Option<&'static str>> {
    if !path.is_file() {
        return Ok(Some("missing"));
    }
    if sniff_file(path)? == ContentKind::Html {
        return Ok(Some("cached file is an HTML page"));
    }
    if let Some(expected) = &source.sha256 {
        if !verify_sha256(path, expected)? {
            return Ok(Some("checksum mismatch"));
        }
    }
    Ok(None)
}
