use crate::common::{Config, FaceBlurError, Result};
use ort::{Environment, ExecutionProvider, GraphOptimizationLevel, Session, SessionBuilder};
use std::path::Path;
use std::sync::Arc;

/// Builds an ONNX Runtime session for one of the face models, honouring the
/// optimisation level and GPU switch from the config.
pub(crate) fn build_session(
    name: &str,
    model_path: &Path,
    config: &Config,
) -> Result<(Session, Arc<Environment>)> {
    if !model_path.exists() {
        return Err(FaceBlurError::Model(format!(
            "{} model not found at: {:?}",
            name, model_path
        )));
    }

    let environment = Arc::new(
        Environment::builder()
            .with_name(name)
            .build()
            .map_err(|e| FaceBlurError::Model(format!("Failed to create environment: {}", e)))?,
    );

    let mut session_builder = SessionBuilder::new(&environment)?;

    let opt_level = match config.performance.optimization_level {
        0 => GraphOptimizationLevel::Disable,
        1 => GraphOptimizationLevel::Level1,
        2 => GraphOptimizationLevel::Level2,
        _ => GraphOptimizationLevel::Level3,
    };
    session_builder = session_builder.with_optimization_level(opt_level)?;

    if config.performance.use_gpu {
        // ORT falls through to the next provider when CUDA is unavailable
        session_builder = session_builder.with_execution_providers([
            ExecutionProvider::CUDA(Default::default()),
            ExecutionProvider::CPU(Default::default()),
        ])?;
        tracing::info!("{}: requested CUDA execution provider", name);
    }

    let session = session_builder.with_model_from_file(model_path)?;
    tracing::debug!("{}: loaded {:?}", name, model_path);

    Ok((session, environment))
}

/// Whether this ONNX Runtime build can run on CUDA.
pub fn cuda_available() -> bool {
    ExecutionProvider::CUDA(Default::default()).is_available()
}
