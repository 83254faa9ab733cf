//! Model registration and listing
//!
//! Every write that can change which model is active goes through
//! [`ModelService`] so the cache never keeps serving a replaced model.

use digitd_core::{ModelArtifactMetadata, ModelFormat, ModelSnapshot, ServeError, ServeResult};
use digitd_store::{ModelRegistry, NewModel};
use std::sync::Arc;
use tracing::info;

use crate::cache::ModelCache;

/// Registry front end that keeps the model cache coherent
pub struct ModelService {
    registry: Arc<dyn ModelRegistry>,
    cache: Arc<ModelCache>,
}

impl ModelService {
    pub fn new(registry: Arc<dyn ModelRegistry>, cache: Arc<ModelCache>) -> Self {
        Self { registry, cache }
    }

    /// Store a new model; invalidates the cache when it becomes active
    ///
    /// Unknown format tags are rejected before anything is written.
    pub async fn register(&self, model: NewModel) -> ServeResult<ModelArtifactMetadata> {
        ModelFormat::parse(&model.format)?;

        let meta = self.registry.register(model).await?;
        info!(
            model_id = %meta.id,
            algorithm = %meta.algorithm,
            format = %meta.format,
            active = meta.is_active,
            has_binary = meta.artifact.is_some(),
            "Registered model"
        );

        if meta.is_active {
            self.cache.invalidate().await;
        }
        Ok(meta)
    }

    /// All registered models, newest first
    pub async fn list(&self) -> ServeResult<Vec<ModelArtifactMetadata>> {
        self.registry.list().await
    }

    /// Metadata of the active model, if any
    pub async fn active(&self) -> ServeResult<Option<ModelArtifactMetadata>> {
        self.registry.active_model().await
    }

    /// Drop the cached model and load the active one now
    ///
    /// Fails with `ConfigurationAbsent` when no active model has an artifact.
    pub async fn refresh(&self) -> ServeResult<ModelSnapshot> {
        self.cache.invalidate().await;
        self.cache
            .ensure_loaded()
            .await?
            .map(|m| m.snapshot.clone())
            .ok_or(ServeError::ConfigurationAbsent)
    }

    /// Name of the backing registry
    pub fn registry_name(&self) -> &'static str {
        self.registry.name()
    }
}
