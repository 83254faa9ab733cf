//! Model metadata and prediction result types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ServeError, ServeResult};

/// Digit returned when no real inference could be performed
pub const FALLBACK_DIGIT: u8 = 7;
/// Confidence reported alongside [`FALLBACK_DIGIT`]
pub const FALLBACK_CONFIDENCE: f32 = 0.99;

/// Declared serialization format of a stored model artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    /// Opaque serialized object graph of a tabular classifier
    Pickle,
    /// Tensor-graph model, HDF5 container
    H5,
    /// Tensor-graph model, Keras archive
    Keras,
    /// Tensor-graph model, ONNX protobuf
    Onnx,
}

impl ModelFormat {
    /// Parse a declared format tag (case-insensitive)
    pub fn parse(tag: &str) -> ServeResult<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "pickle" => Ok(ModelFormat::Pickle),
            "h5" => Ok(ModelFormat::H5),
            "keras" => Ok(ModelFormat::Keras),
            "onnx" => Ok(ModelFormat::Onnx),
            _ => Err(ServeError::UnsupportedFormat(tag.to_string())),
        }
    }

    /// Whether the artifact is loaded through the numeric runtime
    pub fn is_tensor_graph(&self) -> bool {
        !matches!(self, ModelFormat::Pickle)
    }

    /// File suffix used when the artifact has to be materialized on disk
    pub fn file_suffix(&self) -> &'static str {
        match self {
            ModelFormat::Pickle => ".pkl",
            ModelFormat::H5 => ".h5",
            ModelFormat::Keras => ".keras",
            ModelFormat::Onnx => ".onnx",
        }
    }
}

impl std::fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelFormat::Pickle => write!(f, "pickle"),
            ModelFormat::H5 => write!(f, "h5"),
            ModelFormat::Keras => write!(f, "keras"),
            ModelFormat::Onnx => write!(f, "onnx"),
        }
    }
}

/// Opaque handle to stored artifact bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(pub String);

impl ArtifactRef {
    /// Generate a fresh random reference
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry record describing one stored model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifactMetadata {
    /// Unique identifier
    pub id: Uuid,
    /// Optional human-readable name
    #[serde(default)]
    pub name: Option<String>,
    /// Declared algorithm (e.g. "logreg", "cnn")
    pub algorithm: String,
    /// Declared format tag, kept verbatim so the loader decides what it accepts
    pub format: String,
    /// Whether this record is the active model
    pub is_active: bool,
    /// Stored artifact, if any
    pub artifact: Option<ArtifactRef>,
    /// Free-form evaluation metrics supplied at registration
    #[serde(default)]
    pub metrics: Option<serde_json::Value>,
    /// Registration timestamp
    pub created_at: DateTime<Utc>,
}

impl ModelArtifactMetadata {
    /// Create a new inactive record without an artifact
    pub fn new(algorithm: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: None,
            algorithm: algorithm.into(),
            format: format.into(),
            is_active: false,
            artifact: None,
            metrics: None,
            created_at: Utc::now(),
        }
    }
}

/// Metadata captured when a model is loaded into memory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub id: Uuid,
    pub algorithm: String,
    pub format: ModelFormat,
}

/// Outcome of one prediction request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Predicted digit, 0 to 9
    pub digit: u8,
    /// Confidence in [0, 1]; 0.0 when the predictor exposes no probability
    pub confidence: f32,
    /// True when a real model produced the result
    pub used_model: bool,
    /// Elapsed time from request start, whole milliseconds
    pub latency_ms: u64,
}

impl PredictionResult {
    /// Fixed placeholder result
    pub fn fallback(latency_ms: u64) -> Self {
        Self {
            digit: FALLBACK_DIGIT,
            confidence: FALLBACK_CONFIDENCE,
            used_model: false,
            latency_ms,
        }
    }
}
