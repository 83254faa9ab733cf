//! digitd daemon
//!
//! Serves digit predictions over REST from the active registered model.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use digitd_api::{create_router, AppState};
use digitd_core::{ServeConfig, ServeError, StorageBackend};
use digitd_inference::{Dispatcher, ModelCache, ModelService};
use digitd_runtime::{ModelLoader, OrtRuntime, OrtRuntimeConfig};
use digitd_store::{FsRegistry, MemoryRegistry, ModelRegistry};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    Memory,
    Fs,
}

impl From<Backend> for StorageBackend {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Memory => StorageBackend::Memory,
            Backend::Fs => StorageBackend::Fs,
        }
    }
}

/// digitd - handwritten digit prediction server
#[derive(Parser, Debug)]
#[command(name = "digitd")]
#[command(version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind the API server
    #[arg(long)]
    address: Option<String>,

    /// Port for the REST API server
    #[arg(long)]
    port: Option<u16>,

    /// Model registry backend
    #[arg(long, value_enum)]
    storage: Option<Backend>,

    /// Root directory of the filesystem registry
    #[arg(long)]
    storage_path: Option<PathBuf>,

    /// Load the active model before accepting requests
    #[arg(long)]
    preload: bool,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<ServeConfig> {
        let mut config = match &self.config {
            Some(path) => ServeConfig::from_file(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?,
            None => ServeConfig::default(),
        };

        if let Some(address) = self.address {
            config.api.address = address;
        }
        if let Some(port) = self.port {
            config.api.port = port;
        }
        if let Some(backend) = self.storage {
            config.storage.backend = backend.into();
        }
        if let Some(path) = self.storage_path {
            config.storage.path = path;
        }
        if self.preload {
            config.inference.preload = true;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        Ok(config)
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

async fn build_registry(config: &ServeConfig) -> anyhow::Result<Arc<dyn ModelRegistry>> {
    match config.storage.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryRegistry::new())),
        StorageBackend::Fs => {
            let registry = FsRegistry::new(config.storage.path.clone());
            registry.init().await.with_context(|| {
                format!(
                    "Failed to initialize registry at {}",
                    config.storage.path.display()
                )
            })?;
            Ok(Arc::new(registry))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config()?;

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(&config.logging.level))
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")?;

    info!("Starting digitd v{}", env!("CARGO_PKG_VERSION"));

    let registry = build_registry(&config).await?;
    let runtime = Arc::new(OrtRuntime::new(OrtRuntimeConfig {
        intra_threads: config.inference.intra_threads,
    }));
    let loader = Arc::new(ModelLoader::new(runtime));
    let cache = Arc::new(ModelCache::new(registry.clone(), loader));

    info!(
        registry = registry.name(),
        runtime = cache.runtime_name(),
        "Prediction core ready"
    );

    let service = ModelService::new(registry, cache.clone());

    if config.inference.preload {
        match service.refresh().await {
            Ok(snapshot) => info!(model_id = %snapshot.id, "Preloaded active model"),
            Err(ServeError::ConfigurationAbsent) => info!("No active model to preload"),
            Err(e) => warn!(
                kind = e.kind(),
                error = %e,
                "Preload failed; predictions will fall back"
            ),
        }
    }

    let state = Arc::new(AppState {
        dispatcher: Dispatcher::new(cache.clone()),
        service,
        cache,
    });
    let router = create_router(state, &config.api);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", config.api.address, config.api.port)
        .parse()
        .context("Invalid address")?;

    info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, router).await.context("Server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let args = Args::parse_from([
            "digitd",
            "--port",
            "9000",
            "--storage",
            "memory",
            "--preload",
            "--log-level",
            "debug",
        ]);
        let config = args.into_config().unwrap();
        assert_eq!(config.api.port, 9000);
        assert_eq!(config.api.address, "0.0.0.0");
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert!(config.inference.preload);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("bogus"), Level::INFO);
    }
}
