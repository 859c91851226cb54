//! ONNX Runtime utilities for optimized model loading
//!
//! All three studio models go through the same session construction: maximum
//! graph optimizations, intra-op parallelism sized to physical cores, and
//! hardware execution providers with a CPU fallback.

use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, CoreMLExecutionProvider,
};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use std::path::Path;
use tracing::{debug, warn};

/// Error type for ONNX operations
#[derive(Debug, thiserror::Error)]
pub enum OnnxError {
    #[error("Failed to create session builder: {0}")]
    SessionBuilderError(String),

    #[error("Failed to load ONNX model from {path}: {error}")]
    ModelLoadError { path: String, error: String },

    #[error("Model file not found: {0}")]
    ModelNotFound(String),
}

/// Intra-op thread count: physical cores, overridable via `IMAGE_STUDIO_THREADS`
fn intra_threads() -> usize {
    std::env::var("IMAGE_STUDIO_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or_else(num_cpus::get_physical)
}

/// Create an optimized ONNX Runtime session
///
/// Configures ONNX Runtime with:
/// - Maximum graph optimizations (`GraphOptimizationLevel::Level3`)
/// - Intra-op parallelism sized to physical CPU cores
/// - Execution providers tried in order: CoreML (macOS), CUDA (NVIDIA), CPU
///
/// If the accelerated providers fail to take the model (unsupported
/// operations are common with encoder-decoder graphs), the session is
/// rebuilt CPU-only before giving up.
///
/// # Arguments
/// * `model_path` - Path to the ONNX model file
///
/// # Errors
/// Returns `OnnxError` if the file is missing or no provider can load it.
pub fn create_optimized_session(model_path: &Path) -> Result<Session, OnnxError> {
    if !model_path.exists() {
        return Err(OnnxError::ModelNotFound(model_path.display().to_string()));
    }

    let num_threads = intra_threads();
    debug!(
        "Creating ONNX session for {} ({} intra-op threads)",
        model_path.display(),
        num_threads
    );

    let session = Session::builder()
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .with_intra_threads(num_threads)
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .with_memory_pattern(true)
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .with_execution_providers([
            CoreMLExecutionProvider::default().build(),
            CUDAExecutionProvider::default().build(),
            CPUExecutionProvider::default().build(),
        ])
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .commit_from_file(model_path);

    match session {
        Ok(s) => Ok(s),
        Err(e) => {
            warn!(
                "Accelerated providers failed for {}: {}. Retrying CPU-only.",
                model_path.display(),
                e
            );
            create_cpu_only_session(model_path)
        }
    }
}

/// Create a CPU-only ONNX Runtime session
///
/// Used as the fallback when hardware providers cannot compile the graph.
pub fn create_cpu_only_session(model_path: &Path) -> Result<Session, OnnxError> {
    if !model_path.exists() {
        return Err(OnnxError::ModelNotFound(model_path.display().to_string()));
    }

    Session::builder()
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .with_intra_threads(intra_threads())
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .with_memory_pattern(true)
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .with_execution_providers([CPUExecutionProvider::default().build()])
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .commit_from_file(model_path)
        .map_err(|e| OnnxError::ModelLoadError {
            path: model_path.display().to_string(),
            error: e.to_string(),
        })
}
