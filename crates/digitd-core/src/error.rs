//! Error types for digitd

use thiserror::Error;

/// Main error type for digitd
#[derive(Error, Debug)]
pub enum ServeError {
    /// No active model is registered, or it has no stored artifact
    ///
    /// Returned by an explicit reload; predictions treat this state as the
    /// no-model outcome and serve the fallback.
    #[error("No active model configured")]
    ConfigurationAbsent,

    /// Format tag not known to the loader
    #[error("Unsupported model format: {0}")]
    UnsupportedFormat(String),

    /// Artifact bytes could not be fetched from storage
    #[error("Artifact fetch failed: {0}")]
    ArtifactFetch(String),

    /// Stored artifact could not be turned into a predictor
    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    /// Prediction payload is not a decodable image
    #[error("Image decode failed: {0}")]
    ImageDecode(String),

    /// Predictor failed while running
    #[error("Inference error: {0}")]
    Inference(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ServeError {
    /// Short label for the failure class, used as a log field
    pub fn kind(&self) -> &'static str {
        match self {
            ServeError::ConfigurationAbsent => "configuration_absent",
            ServeError::UnsupportedFormat(_) => "unsupported_format",
            ServeError::ArtifactFetch(_) => "artifact_fetch",
            ServeError::Deserialization(_) => "deserialization",
            ServeError::ImageDecode(_) => "image_decode",
            ServeError::Inference(_) => "inference",
            ServeError::Config(_) => "config",
            ServeError::Storage(_) => "storage",
            ServeError::Io(_) => "io",
            ServeError::Serialization(_) => "serialization",
        }
    }
}

/// Result type for digitd operations
pub type ServeResult<T> = Result<T, ServeError>;

impl From<serde_json::Error> for ServeError {
    fn from(err: serde_json::Error) -> Self {
        ServeError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for ServeError {
    fn from(err: toml::de::Error) -> Self {
        ServeError::Config(err.to_string())
    }
}

impl From<bincode::Error> for ServeError {
    fn from(err: bincode::Error) -> Self {
        ServeError::Deserialization(err.to_string())
    }
}

impl From<base64::DecodeError> for ServeError {
    fn from(err: base64::DecodeError) -> Self {
        ServeError::ImageDecode(err.to_string())
    }
}

impl From<image::ImageError> for ServeError {
    fn from(err: image::ImageError) -> Self {
        ServeError::ImageDecode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ServeError::UnsupportedFormat("joblib".to_string());
        assert_eq!(err.to_string(), "Unsupported model format: joblib");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ServeError = io_err.into();
        assert!(matches!(err, ServeError::Io(_)));
    }

    #[test]
    fn test_base64_error_is_image_decode() {
        use base64::Engine;
        let err: ServeError = base64::engine::general_purpose::STANDARD
            .decode("!!not base64!!")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), "image_decode");
    }
}
