//! Predictor and runtime trait definitions

use digitd_core::ServeResult;
use ndarray::{Array2, ArrayView2, ArrayView4};
use std::path::Path;
use std::sync::Arc;

/// Classifier over flat feature vectors, one row per sample
pub trait TabularPredictor {
    /// Per-class probabilities, or `None` when the model has no probability output
    fn predict_proba(&self, x: ArrayView2<'_, f32>) -> ServeResult<Option<Array2<f32>>>;

    /// Predicted label for each row
    fn predict(&self, x: ArrayView2<'_, f32>) -> ServeResult<Vec<u8>>;
}

/// A loaded tensor-graph model
pub trait TensorModel: Send + Sync {
    /// Run the graph on an NHWC batch and return the first output row
    fn run(&self, input: ArrayView4<'_, f32>) -> ServeResult<Vec<f32>>;
}

/// Numeric runtime able to materialize tensor-graph models from disk
pub trait TensorRuntime: Send + Sync {
    /// Load a model from a file path
    fn load(&self, path: &Path) -> ServeResult<Arc<dyn TensorModel>>;

    /// Get the runtime name
    fn name(&self) -> &'static str;
}
