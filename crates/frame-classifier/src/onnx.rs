//! ONNX Runtime session construction
//!
//! Sessions are built with full graph optimization, physical-core intra-op
//! parallelism and the best available execution provider. If the accelerated
//! providers refuse the model, the session is rebuilt on CPU only.

use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use std::path::Path;
use tracing::{debug, warn};

/// Error type for ONNX session creation
#[derive(Debug, thiserror::Error)]
pub enum OnnxError {
    #[error("Failed to create session builder: {0}")]
    SessionBuilderError(String),

    #[error("Failed to load ONNX model from {path}: {error}")]
    ModelLoadError { path: String, error: String },

    #[error("Model file not found: {0}")]
    ModelNotFound(String),
}

/// Intra-op thread count: `DEEPFAKE_THREADS` if set, otherwise physical cores
fn intra_op_threads() -> usize {
    std::env::var("DEEPFAKE_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or_else(num_cpus::get_physical)
}

/// Create an optimized ONNX Runtime session
///
/// Execution providers are tried in order: CoreML (macOS), CUDA, CPU.
///
/// # Errors
///
/// Returns [`OnnxError::ModelNotFound`] if the file does not exist, or a
/// load error if neither the accelerated nor the CPU-only session can be built.
pub fn create_optimized_session(model_path: &Path) -> Result<Session, OnnxError> {
    if !model_path.exists() {
        return Err(OnnxError::ModelNotFound(model_path.display().to_string()));
    }

    let num_threads = intra_op_threads();
    debug!(
        "Creating ONNX session for {} with {} intra-op threads",
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
            #[cfg(target_os = "macos")]
            ort::execution_providers::CoreMLExecutionProvider::default()
                .with_subgraphs(true)
                .build(),
            CUDAExecutionProvider::default().build(),
            CPUExecutionProvider::default().build(),
        ])
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .commit_from_file(model_path);

    match session {
        Ok(session) => Ok(session),
        Err(e) => {
            warn!(
                "Accelerated session for {} failed ({}), retrying on CPU only",
                model_path.display(),
                e
            );
            create_cpu_only_session(model_path)
        }
    }
}

/// Create an ONNX Runtime session restricted to the CPU execution provider
///
/// # Errors
///
/// Returns an error if the model file is missing or cannot be loaded.
pub fn create_cpu_only_session(model_path: &Path) -> Result<Session, OnnxError> {
    if !model_path.exists() {
        return Err(OnnxError::ModelNotFound(model_path.display().to_string()));
    }

    Session::builder()
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .with_intra_threads(intra_op_threads())
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .with_execution_providers([CPUExecutionProvider::default().build()])
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .commit_from_file(model_path)
        .map_err(|e| OnnxError::ModelLoadError {
            path: model_path.display().to_string(),
            error: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_not_found() {
        let result = create_optimized_session(Path::new("nonexistent_model.onnx"));
        assert!(matches!(result, Err(OnnxError::ModelNotFound(_))));

        let result = create_cpu_only_session(Path::new("nonexistent_model.onnx"));
        assert!(matches!(result, Err(OnnxError::ModelNotFound(_))));
    }

    #[test]
    fn test_error_display() {
        let err = OnnxError::ModelLoadError {
            path: "model.onnx".to_string(),
            error: "invalid format".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to load ONNX model from model.onnx: invalid format"
        );
    }
}
