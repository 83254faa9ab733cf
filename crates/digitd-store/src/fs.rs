//! Filesystem-backed model registry
//!
//! Layout under the base path:
//! - `models.json`: array of metadata records
//! - `artifacts/<ref>.bin`: raw artifact bytes

use async_trait::async_trait;
use digitd_core::{ArtifactRef, ModelArtifactMetadata, ServeError, ServeResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::registry::{insert_exclusive, sorted_newest_first, ModelRegistry, NewModel};

const INDEX_FILE: &str = "models.json";
const ARTIFACT_DIR: &str = "artifacts";

/// Registry persisted as plain files in a directory
pub struct FsRegistry {
    /// Base path for registry storage
    base_path: PathBuf,
    /// Serializes read-modify-write of the index
    index_lock: Mutex<()>,
}

impl FsRegistry {
    /// Create a registry rooted at `base_path`
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            base_path,
            index_lock: Mutex::new(()),
        }
    }

    /// Create the directory layout if it does not exist yet
    pub async fn init(&self) -> ServeResult<()> {
        let artifacts = self.base_path.join(ARTIFACT_DIR);
        if !artifacts.exists() {
            tokio::fs::create_dir_all(&artifacts).await?;
            info!(path = %self.base_path.display(), "Created model registry directory");
        }
        Ok(())
    }

    /// Get the local path for an artifact
    pub fn artifact_path(&self, artifact: &ArtifactRef) -> PathBuf {
        // Keep references from escaping the artifact directory
        let safe_name: String = artifact
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.base_path
            .join(ARTIFACT_DIR)
            .join(format!("{}.bin", safe_name))
    }

    fn index_path(&self) -> PathBuf {
        self.base_path.join(INDEX_FILE)
    }

    async fn read_index(&self) -> ServeResult<Vec<ModelArtifactMetadata>> {
        match tokio::fs::read(self.index_path()).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(ServeError::Storage(format!(
                "failed to read model index: {}",
                e
            ))),
        }
    }

    async fn write_index(&self, records: &[ModelArtifactMetadata]) -> ServeResult<()> {
        let bytes = serde_json::to_vec_pretty(records)?;
        write_atomic(&self.index_path(), &bytes).await
    }
}

/// Write to a sibling temp file, then rename over the target
async fn write_atomic(path: &Path, bytes: &[u8]) -> ServeResult<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl ModelRegistry for FsRegistry {
    async fn active_model(&self) -> ServeResult<Option<ModelArtifactMetadata>> {
        let records = self.read_index().await?;
        Ok(records.into_iter().find(|r| r.is_active))
    }

    async fn fetch_artifact(&self, artifact: &ArtifactRef) -> ServeResult<Vec<u8>> {
        let path = self.artifact_path(artifact);
        tokio::fs::read(&path).await.map_err(|e| {
            ServeError::ArtifactFetch(format!("{}: {}", path.display(), e))
        })
    }

    async fn register(&self, model: NewModel) -> ServeResult<ModelArtifactMetadata> {
        self.init().await?;

        let artifact = match &model.artifact {
            Some(bytes) => {
                let artifact = ArtifactRef::generate();
                write_atomic(&self.artifact_path(&artifact), bytes).await?;
                debug!(artifact = %artifact, size = bytes.len(), "Stored artifact");
                Some(artifact)
            }
            None => None,
        };
        let record = model.to_metadata(artifact);

        let _guard = self.index_lock.lock().await;
        let mut records = self.read_index().await?;
        insert_exclusive(&mut records, record.clone());
        self.write_index(&records).await?;

        Ok(record)
    }

    async fn list(&self) -> ServeResult<Vec<ModelArtifactMetadata>> {
        let records = self.read_index().await?;
        Ok(sorted_newest_first(&records))
    }

    fn name(&self) -> &'static str {
        "fs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_path_is_sanitized() {
        let registry = FsRegistry::new(PathBuf::from("/var/lib/digitd"));
        let path = registry.artifact_path(&ArtifactRef("../../etc/passwd".to_string()));
        assert_eq!(
            path.to_str().unwrap(),
            "/var/lib/digitd/artifacts/______etc_passwd.bin"
        );
    }

    #[tokio::test]
    async fn test_register_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FsRegistry::new(dir.path().to_path_buf());
        registry.init().await.unwrap();

        let meta = registry
            .register(NewModel::new("logreg", "pickle", vec![9, 9]).active())
            .await
            .unwrap();

        let reopened = FsRegistry::new(dir.path().to_path_buf());
        let active = reopened.active_model().await.unwrap().unwrap();
        assert_eq!(active.id, meta.id);
        let bytes = reopened
            .fetch_artifact(active.artifact.as_ref().unwrap())
            .await
            .unwrap();
        assert_eq!(bytes, vec![9, 9]);
    }

    #[tokio::test]
    async fn test_activation_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FsRegistry::new(dir.path().to_path_buf());

        registry
            .register(NewModel::new("logreg", "pickle", vec![1]).active())
            .await
            .unwrap();
        registry
            .register(NewModel::new("knn", "pickle", vec![2]))
            .await
            .unwrap();
        let third = registry
            .register(NewModel::new("cnn", "keras", vec![3]).active())
            .await
            .unwrap();

        let all = registry.list().await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all.iter().filter(|m| m.is_active).count(), 1);
        assert_eq!(registry.active_model().await.unwrap().unwrap().id, third.id);
    }

    #[tokio::test]
    async fn test_missing_index_and_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FsRegistry::new(dir.path().join("empty"));
        assert!(registry.active_model().await.unwrap().is_none());

        let result = registry
            .fetch_artifact(&ArtifactRef("nope".to_string()))
            .await;
        assert!(matches!(result, Err(ServeError::ArtifactFetch(_))));
    }

    #[tokio::test]
    async fn test_metadata_only_registration_writes_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FsRegistry::new(dir.path().to_path_buf());

        let meta = registry
            .register(NewModel::metadata_only("logreg", "pickle").active())
            .await
            .unwrap();
        assert!(meta.artifact.is_none());

        let stored = std::fs::read_dir(dir.path().join(ARTIFACT_DIR)).unwrap().count();
        assert_eq!(stored, 0);

        let active = registry.active_model().await.unwrap().unwrap();
        assert_eq!(active.id, meta.id);
        assert!(active.artifact.is_none());
    }
}
