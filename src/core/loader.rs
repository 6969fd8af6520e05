use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::{
    core::audio::{read_audio, resample},
    error::{Result, StemError},
    io::{
        net::{fetch_to_tempfile, http_client},
        paths,
    },
    types::{AudioData, SAMPLE_RATE},
};

/// How an input reference is resolved to bytes.
#[derive(Clone, Debug, Default)]
pub enum InputStorage {
    /// The reference is a local filesystem path.
    #[default]
    Local,
    /// The reference is a URL; it is fetched into `tmp_dir` for decoding.
    Remote { tmp_dir: PathBuf },
}

impl InputStorage {
    pub fn remote() -> Self {
        InputStorage::Remote {
            tmp_dir: paths::tmp_dir(),
        }
    }
}

/// Resolves `reference` and decodes it at 44.1 kHz.
///
/// Remote inputs live in a temporary file for the duration of the call only;
/// the file is removed whether decoding succeeds or not.
pub fn load_input(reference: &str, storage: &InputStorage) -> Result<AudioData> {
    let audio = match storage {
        InputStorage::Local => {
            let path = Path::new(reference);
            if !path.is_file() {
                return Err(StemError::Decode {
                    input: reference.to_string(),
                    reason: "file does not exist".into(),
                });
            }
            read_audio(path)?
        }
        InputStorage::Remote { tmp_dir } => {
            info!(url = reference, "fetching remote input");
            let client = http_client()?;
            let tmp = fetch_to_tempfile(&client, reference, tmp_dir)?;
            let decoded = read_audio(tmp.path()).map_err(|e| match e {
                StemError::Decode { reason, .. } => StemError::Decode {
                    input: reference.to_string(),
                    reason,
                },
                other => other,
            });
            tmp.close()?;
            decoded?
        }
    };

    let audio = resample(&audio, SAMPLE_RATE)?;
    debug!(frames = audio.frames(), channels = audio.channels, "input ready");
    Ok(audio)
}
