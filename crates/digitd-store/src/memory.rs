//! Process-local model registry

use async_trait::async_trait;
use digitd_core::{ArtifactRef, ModelArtifactMetadata, ServeError, ServeResult};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::registry::{insert_exclusive, sorted_newest_first, ModelRegistry, NewModel};

/// Registry that keeps records and artifacts in memory
#[derive(Default)]
pub struct MemoryRegistry {
    records: RwLock<Vec<ModelArtifactMetadata>>,
    artifacts: RwLock<HashMap<ArtifactRef, Vec<u8>>>,
}

impl MemoryRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record as-is, bypassing artifact storage
    ///
    /// Lets callers model registries holding dangling or absent artifact references.
    pub async fn insert_record(&self, record: ModelArtifactMetadata) {
        let mut records = self.records.write().await;
        insert_exclusive(&mut records, record);
    }

    /// Drop stored artifact bytes while keeping the metadata
    pub async fn remove_artifact(&self, artifact: &ArtifactRef) -> bool {
        self.artifacts.write().await.remove(artifact).is_some()
    }
}

#[async_trait]
impl ModelRegistry for MemoryRegistry {
    async fn active_model(&self) -> ServeResult<Option<ModelArtifactMetadata>> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.is_active).cloned())
    }

    async fn fetch_artifact(&self, artifact: &ArtifactRef) -> ServeResult<Vec<u8>> {
        let artifacts = self.artifacts.read().await;
        artifacts
            .get(artifact)
            .cloned()
            .ok_or_else(|| ServeError::ArtifactFetch(format!("artifact not found: {}", artifact)))
    }

    async fn register(&self, model: NewModel) -> ServeResult<ModelArtifactMetadata> {
        let artifact = match &model.artifact {
            Some(bytes) => {
                let artifact = ArtifactRef::generate();
                self.artifacts
                    .write()
                    .await
                    .insert(artifact.clone(), bytes.clone());
                debug!(artifact = %artifact, size = bytes.len(), "Stored artifact");
                Some(artifact)
            }
            None => None,
        };
        let record = model.to_metadata(artifact);

        let mut records = self.records.write().await;
        insert_exclusive(&mut records, record.clone());

        Ok(record)
    }

    async fn list(&self) -> ServeResult<Vec<ModelArtifactMetadata>> {
        let records = self.records.read().await;
        Ok(sorted_newest_first(&records))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
