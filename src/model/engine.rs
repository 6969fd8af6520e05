use crate::{
    error::{Result, StemError},
    io::sniff::{sniff_file, ContentKind},
    types::{Device, ExecutionContext, Stem},
};

use ndarray::Array3;
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use std::{path::Path, sync::Mutex};
use tracing::info;

/// Name of the magnitude input of the exported graph.
pub const INPUT_NAME: &str = "x";

/// A loaded set of D3Net weights.
///
/// Patches are magnitude spectrograms laid out `(frames, channels, bins)`;
/// the estimate for `stem` comes back in the same shape.
pub trait StemModel: Send + Sync {
    fn infer(&self, stem: Stem, patch: &Array3<f32>) -> Result<Array3<f32>>;
}

/// Turns a provisioned weights file into a runnable model.
pub trait ModelBackend: Send + Sync {
    fn load(&self, weights: &Path, ctx: &ExecutionContext) -> Result<Box<dyn StemModel>>;
}

/// ONNX Runtime backend. The graph takes one input `x` of shape
/// `[1, frames, channels, bins]` and has one output per stem scope, named
/// after the stem.
#[derive(Clone, Copy, Debug, Default)]
pub struct OrtBackend;

impl ModelBackend for OrtBackend {
    fn load(&self, weights: &Path, ctx: &ExecutionContext) -> Result<Box<dyn StemModel>> {
        ensure_onnx_candidate(weights)?;
        if ctx.device == Device::Cuda && !cfg!(feature = "cuda") {
            return Err(StemError::ExecutionProvider(
                "CUDA requested but this build lacks the `cuda` feature; run on the CPU or rebuild with `--features cuda`".into(),
            ));
        }

        let mut builder =
            Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;

        if let Some(n) = ctx.intra_threads {
            builder = builder.with_intra_threads(n)?;
        }
        if ctx.device == Device::Cuda {
            builder = builder.with_execution_providers([CUDAExecutionProvider::default()
                .build()
                .error_on_failure()])?;
        }

        let session = builder.commit_from_file(weights)?;
        info!(path = %weights.display(), device = ?ctx.device, "model loaded");

        Ok(Box::new(OrtModel {
            session: Mutex::new(session),
        }))
    }
}

/// The release weights are nnabla HDF5, which ONNX Runtime cannot parse.
fn ensure_onnx_candidate(weights: &Path) -> Result<()> {
    let kind = sniff_file(weights)?;
    match kind {
        ContentKind::Hdf5 | ContentKind::Html => Err(StemError::UnsupportedModel {
            path: weights.display().to_string(),
            reason: format!(
                "{} is not an ONNX graph; point --model-url or D3NET_MODEL_URL at an ONNX export of the weights",
                kind.mime()
            ),
        }),
        ContentKind::Text | ContentKind::Binary => Ok(()),
    }
}

pub struct OrtModel {
    session: Mutex<Session>,
}

impl StemModel for OrtModel {
    fn infer(&self, stem: Stem, patch: &Array3<f32>) -> Result<Array3<f32>> {
        let fail = |reason: String| StemError::Inference { stem, reason };

        let (frames, channels, bins) = patch.dim();
        let data: Vec<f32> = patch.iter().copied().collect();
        let input = Tensor::from_array((vec![1usize, frames, channels, bins], data))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| fail("session lock poisoned".into()))?;
        let outputs = session.run(ort::inputs![INPUT_NAME => input])?;

        let value = outputs
            .get(stem.name())
            .ok_or_else(|| fail(format!("model has no output `{}`", stem.name())))?;
        let (_shape, out) = value.try_extract_tensor::<f32>()?;

        let expected = frames * channels * bins;
        if out.len() != expected {
            return Err(fail(format!(
                "unexpected output length {} (expected {})",
                out.len(),
                expected
            )));
        }

        Array3::from_shape_vec((frames, channels, bins), out.to_vec())
            .map_err(|e| fail(e.to_string()))
    }
}
