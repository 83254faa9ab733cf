//! ONNX Runtime backed tensor-graph runtime
//!
//! The ONNX Runtime environment is created on the first model load and reused
//! for the rest of the process. Nothing touches it before a tensor-graph model
//! is actually requested.

use digitd_core::{ServeError, ServeResult};
use ndarray::ArrayView4;
use once_cell::sync::OnceCell;
use ort::logging::LogLevel;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::traits::{TensorModel, TensorRuntime};

static ENVIRONMENT: OnceCell<()> = OnceCell::new();
/// Successful environment commits; stays at most 1
static ENVIRONMENT_INITS: AtomicUsize = AtomicUsize::new(0);

/// Initialize the ONNX Runtime environment once per process
fn ensure_environment() -> ServeResult<()> {
    ENVIRONMENT.get_or_try_init(|| {
        info!("Initializing ONNX Runtime environment");
        ort::init()
            .with_name("digitd")
            .commit()
            .map(|_| {
                ENVIRONMENT_INITS.fetch_add(1, Ordering::SeqCst);
            })
            .map_err(|e| ServeError::Deserialization(format!("runtime init failed: {}", e)))
    })?;
    Ok(())
}

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct OrtRuntimeConfig {
    /// Intra-op thread count per session
    pub intra_threads: usize,
}

impl Default for OrtRuntimeConfig {
    fn default() -> Self {
        Self { intra_threads: 1 }
    }
}

/// Tensor runtime loading ONNX graphs
#[derive(Debug, Default)]
pub struct OrtRuntime {
    config: OrtRuntimeConfig,
}

impl OrtRuntime {
    /// Create a new runtime
    pub fn new(config: OrtRuntimeConfig) -> Self {
        Self { config }
    }

    /// Whether the process-wide environment has been created
    pub fn is_initialized() -> bool {
        ENVIRONMENT.get().is_some()
    }
}

impl TensorRuntime for OrtRuntime {
    fn load(&self, path: &Path) -> ServeResult<Arc<dyn TensorModel>> {
        ensure_environment()?;

        let load_err =
            |e: ort::Error| ServeError::Deserialization(format!("{}: {}", path.display(), e));
        let session = Session::builder()
            .map_err(load_err)?
            .with_log_level(LogLevel::Error)
            .map_err(load_err)?
            .with_intra_threads(self.config.intra_threads)
            .map_err(load_err)?
            .commit_from_file(path)
            .map_err(load_err)?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| ServeError::Deserialization("model declares no inputs".to_string()))?;
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| ServeError::Deserialization("model declares no outputs".to_string()))?;

        debug!(
            path = %path.display(),
            input = %input_name,
            output = %output_name,
            "Loaded ONNX session"
        );

        Ok(Arc::new(OrtModel {
            session: Mutex::new(session),
            input_name,
            output_name,
            source: path.to_path_buf(),
        }))
    }

    fn name(&self) -> &'static str {
        "onnxruntime"
    }
}

/// A loaded ONNX session
pub struct OrtModel {
    /// Running a session needs exclusive access
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    source: PathBuf,
}

impl std::fmt::Debug for OrtModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrtModel")
            .field("input_name", &self.input_name)
            .field("output_name", &self.output_name)
            .field("source", &self.source)
            .finish()
    }
}

impl TensorModel for OrtModel {
    fn run(&self, input: ArrayView4<'_, f32>) -> ServeResult<Vec<f32>> {
        let dims: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let contiguous = input.as_standard_layout();
        let data = contiguous
            .as_slice()
            .ok_or_else(|| ServeError::Inference("input tensor is not contiguous".to_string()))?;
        let tensor = TensorRef::from_array_view((dims, data))
            .map_err(|e| ServeError::Inference(format!("tensor conversion failed: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ServeError::Inference("session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(|e| ServeError::Inference(format!("forward pass failed: {}", e)))?;

        let (shape, values) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| {
                ServeError::Inference(format!(
                    "failed to extract output '{}' as f32: {}",
                    self.output_name, e
                ))
            })?;

        // First row of a (batch, classes) output
        let classes = shape
            .last()
            .map(|&d| d as usize)
            .filter(|&d| d > 0 && d <= values.len())
            .unwrap_or(values.len());
        Ok(values[..classes].to_vec())
    }
}
