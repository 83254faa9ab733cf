//! digitd-runtime: Model loading and predictor runtimes
//!
//! This crate turns stored artifacts into in-memory predictors:
//! - Tabular classifiers restored from a serialized object graph
//! - Tensor-graph models run through ONNX Runtime
//! - A loader that dispatches on the declared format tag

pub mod loader;
pub mod ort_runtime;
pub mod tabular;
pub mod traits;

pub use loader::{LoadedModel, ModelLoader, Predictor};
pub use ort_runtime::{OrtRuntime, OrtRuntimeConfig};
pub use tabular::{DummyClassifier, LogisticRegression, NearestCentroid, TabularModel};
pub use traits::{TabularPredictor, TensorModel, TensorRuntime};

/// Side length of the square input image
pub const IMAGE_SIDE: usize = 28;
/// Number of features a tabular classifier receives
pub const FEATURE_COUNT: usize = IMAGE_SIDE * IMAGE_SIDE;
/// Number of digit classes
pub const NUM_CLASSES: usize = 10;
