//! Registry trait definitions

use async_trait::async_trait;
use digitd_core::{ArtifactRef, ModelArtifactMetadata, ServeResult};

/// A model submitted for registration
#[derive(Debug, Clone)]
pub struct NewModel {
    /// Optional human-readable name
    pub name: Option<String>,
    /// Declared algorithm
    pub algorithm: String,
    /// Declared format tag
    pub format: String,
    /// Serialized model bytes; `None` registers metadata only
    pub artifact: Option<Vec<u8>>,
    /// Make this the active model, clearing the flag on every other record
    pub make_active: bool,
    /// Evaluation metrics supplied by the trainer
    pub metrics: Option<serde_json::Value>,
}

impl NewModel {
    pub fn new(algorithm: impl Into<String>, format: impl Into<String>, artifact: Vec<u8>) -> Self {
        Self {
            name: None,
            algorithm: algorithm.into(),
            format: format.into(),
            artifact: Some(artifact),
            make_active: false,
            metrics: None,
        }
    }

    /// A record with no stored artifact
    pub fn metadata_only(algorithm: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            artifact: None,
            ..Self::new(algorithm, format, Vec::new())
        }
    }

    pub fn active(mut self) -> Self {
        self.make_active = true;
        self
    }

    /// Build the metadata record stored for this model
    pub(crate) fn to_metadata(&self, artifact: Option<ArtifactRef>) -> ModelArtifactMetadata {
        let mut meta = ModelArtifactMetadata::new(self.algorithm.clone(), self.format.clone());
        meta.name = self.name.clone();
        meta.is_active = self.make_active;
        meta.artifact = artifact;
        meta.metrics = self.metrics.clone();
        meta
    }
}

/// Storage collaborator for model metadata and artifact bytes
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// The record currently flagged active, if any
    async fn active_model(&self) -> ServeResult<Option<ModelArtifactMetadata>>;

    /// Raw bytes of a stored artifact; a missing artifact is `ArtifactFetch`
    async fn fetch_artifact(&self, artifact: &ArtifactRef) -> ServeResult<Vec<u8>>;

    /// Store a model and its metadata
    async fn register(&self, model: NewModel) -> ServeResult<ModelArtifactMetadata>;

    /// All records, newest first
    async fn list(&self) -> ServeResult<Vec<ModelArtifactMetadata>>;

    /// Get the registry name
    fn name(&self) -> &'static str;
}

/// Clear the active flag everywhere, then append `record`
pub(crate) fn insert_exclusive(
    records: &mut Vec<ModelArtifactMetadata>,
    record: ModelArtifactMetadata,
) {
    if record.is_active {
        for existing in records.iter_mut() {
            existing.is_active = false;
        }
    }
    records.push(record);
}

/// Newest first
pub(crate) fn sorted_newest_first(records: &[ModelArtifactMetadata]) -> Vec<ModelArtifactMetadata> {
    let mut out = records.to_vec();
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    out
}
