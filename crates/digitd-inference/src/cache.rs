//! Single-slot cache for the active model

use digitd_core::{ModelSnapshot, ServeError, ServeResult};
use digitd_runtime::{LoadedModel, ModelLoader};
use digitd_store::ModelRegistry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Holds at most one loaded model, fetched lazily from the registry
pub struct ModelCache {
    /// Where metadata and artifact bytes come from
    registry: Arc<dyn ModelRegistry>,
    /// Turns artifact bytes into predictors
    loader: Arc<ModelLoader>,
    /// The cached model, if any
    slot: RwLock<Option<Arc<LoadedModel>>>,
    /// Held while a load is in flight so concurrent misses wait instead of reloading
    load_gate: Mutex<()>,
    /// Bumped on every invalidation
    generation: AtomicU64,
    /// Completed loads
    loads: AtomicU64,
}

impl ModelCache {
    /// Create an empty cache
    pub fn new(registry: Arc<dyn ModelRegistry>, loader: Arc<ModelLoader>) -> Self {
        Self {
            registry,
            loader,
            slot: RwLock::new(None),
            load_gate: Mutex::new(()),
            generation: AtomicU64::new(0),
            loads: AtomicU64::new(0),
        }
    }

    /// Return the cached model, loading the active one on a miss
    ///
    /// `Ok(None)` means no usable active model is registered; nothing is
    /// remembered in that case so the next call looks again. Fetch and load
    /// errors propagate and leave the slot empty.
    pub async fn ensure_loaded(&self) -> ServeResult<Option<Arc<LoadedModel>>> {
        if let Some(model) = self.cached().await {
            return Ok(Some(model));
        }

        let _gate = self.load_gate.lock().await;
        if let Some(model) = self.cached().await {
            return Ok(Some(model));
        }

        let generation = self.generation.load(Ordering::SeqCst);

        let Some(meta) = self.registry.active_model().await? else {
            debug!("No active model registered");
            return Ok(None);
        };
        let Some(artifact) = meta.artifact.as_ref() else {
            warn!(model_id = %meta.id, "Active model has no artifact");
            return Ok(None);
        };

        let raw = self.registry.fetch_artifact(artifact).await?;

        // Session building and deserialization are blocking work
        let loader = self.loader.clone();
        let record = meta.clone();
        let loaded = tokio::task::spawn_blocking(move || loader.load_model(&raw, &record))
            .await
            .map_err(|e| ServeError::Deserialization(format!("model load task failed: {}", e)))??;
        let loaded = Arc::new(loaded);
        self.loads.fetch_add(1, Ordering::SeqCst);

        let mut slot = self.slot.write().await;
        if self.generation.load(Ordering::SeqCst) == generation {
            *slot = Some(loaded.clone());
            info!(
                model_id = %meta.id,
                algorithm = %meta.algorithm,
                format = %loaded.snapshot.format,
                "Cached active model"
            );
        } else {
            // The active model changed while this one was loading
            debug!(model_id = %meta.id, "Cache invalidated during load; result not cached");
        }

        Ok(Some(loaded))
    }

    /// Drop the cached model; the next prediction reloads
    pub async fn invalidate(&self) {
        let mut slot = self.slot.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(previous) = slot.take() {
            info!(model_id = %previous.snapshot.id, "Invalidated cached model");
        }
    }

    /// Metadata of the cached model, without triggering a load
    pub async fn current(&self) -> Option<ModelSnapshot> {
        self.cached().await.map(|m| m.snapshot.clone())
    }

    /// Number of successful loads since creation
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }

    /// Name of the tensor runtime behind the loader
    pub fn runtime_name(&self) -> &'static str {
        self.loader.runtime_name()
    }

    async fn cached(&self) -> Option<Arc<LoadedModel>> {
        self.slot.read().await.clone()
    }
}
