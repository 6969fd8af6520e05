use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::info;

use crate::{
    core::{
        export::{export_stems, mix_selected, AudioEncoder, FfmpegEncoder},
        loader::{load_input, InputStorage},
        spectral::compute_estimates,
    },
    error::{Result, StemError},
    io::{
        paths,
        progress::{emit_split_progress, SplitProgress},
    },
    model::{
        engine::{ModelBackend, OrtBackend},
        hparams::load_all,
        provision::{ensure_model, ModelHandle, ModelSource},
    },
    types::{Estimates, PartSelection, SeparatorConfig, SpectralOptions, SplitResult, SAMPLE_RATE},
};

/// D3Net separator.
///
/// One instance handles one request at a time. The weights file is shared
/// state on disk and is not guarded against concurrent provisioning.
pub struct Separator {
    config: SeparatorConfig,
    spectral: SpectralOptions,
    storage: InputStorage,
    model_source: ModelSource,
    hparams_dir: PathBuf,
    backend: Arc<dyn ModelBackend>,
    encoder: Arc<dyn AudioEncoder>,
}

impl Separator {
    pub fn new(config: SeparatorConfig) -> Self {
        Self {
            config,
            spectral: SpectralOptions::default(),
            storage: InputStorage::default(),
            model_source: ModelSource::default(),
            hparams_dir: paths::hparams_dir(),
            backend: Arc::new(OrtBackend),
            encoder: Arc::new(FfmpegEncoder::default()),
        }
    }

    pub fn with_storage(mut self, storage: InputStorage) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_model_source(mut self, source: ModelSource) -> Self {
        self.model_source = source;
        self
    }

    pub fn with_hparams_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.hparams_dir = dir.into();
        self
    }

    pub fn with_spectral_options(mut self, opts: SpectralOptions) -> Self {
        self.spectral = opts;
        self
    }

    pub fn with_backend(mut self, backend: impl ModelBackend + 'static) -> Self {
        self.backend = Arc::new(backend);
        self
    }

    pub fn with_encoder(mut self, encoder: impl AudioEncoder + 'static) -> Self {
        self.encoder = Arc::new(encoder);
        self
    }

    pub fn config(&self) -> &SeparatorConfig {
        &self.config
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_source.local_path()
    }

    /// Fetches or repairs the weights file without separating anything.
    pub fn prepare_model(&self) -> Result<ModelHandle> {
        emit_split_progress(SplitProgress::Stage("resolve_model"));
        ensure_model(&self.model_source)
    }

    /// Time-domain estimates of the stems selected in `parts`.
    ///
    /// Expects the weights to be provisioned already. Hyperparameters of all
    /// stems are read before any audio is touched.
    pub fn get_estimates(&self, input: &str, parts: &PartSelection) -> Result<Estimates> {
        let hparams = load_all(&self.hparams_dir)?;

        emit_split_progress(SplitProgress::Stage("engine_preload"));
        let ctx = self.config.execution_context();
        // Loaded once per request so every stem sees the same weights.
        let model = self.backend.load(&self.model_path(), &ctx)?;

        emit_split_progress(SplitProgress::Stage("read_audio"));
        let audio = load_input(input, &self.storage)?;

        emit_split_progress(SplitProgress::Stage("infer"));
        compute_estimates(model.as_ref(), &audio, parts, &hparams, &self.spectral)
    }

    /// Sums the selected stems and writes them as one MP3 at `output_path`.
    pub fn create_static_mix(
        &self,
        parts: &PartSelection,
        input: &str,
        output_path: &Path,
    ) -> Result<PathBuf> {
        if parts.is_empty() {
            return Err(StemError::EmptySelection);
        }

        self.prepare_model()?;
        let estimates = self.get_estimates(input, parts)?;
        let mix = mix_selected(&estimates, parts)?;

        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        emit_split_progress(SplitProgress::Stage("write_stems"));
        info!("Writing to MP3...");
        self.encoder
            .encode(output_path, &mix, SAMPLE_RATE, &self.config.bitrate())?;

        emit_split_progress(SplitProgress::Finished);
        Ok(output_path.to_path_buf())
    }

    /// Writes `vocals.mp3`, `drums.mp3`, `bass.mp3` and `other.mp3` into
    /// `output_dir`, encoding them in parallel.
    pub fn separate_into_parts(&self, input: &str, output_dir: &Path) -> Result<SplitResult> {
        self.prepare_model()?;

        let parts = PartSelection::all();
        let estimates = self.get_estimates(input, &parts)?;

        emit_split_progress(SplitProgress::Stage("write_stems"));
        export_stems(
            self.encoder.as_ref(),
            &estimates,
            output_dir,
            SAMPLE_RATE,
            &self.config.bitrate(),
        )?;

        emit_split_progress(SplitProgress::Finished);
        Ok(SplitResult::in_dir(output_dir))
    }
}
