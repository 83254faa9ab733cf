//! CLI commands implementation

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use digitd_core::{ModelArtifactMetadata, ModelSnapshot};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

/// API client for communicating with the daemon
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Prediction response from API
#[derive(Debug, Deserialize)]
pub struct PredictResponse {
    pub digit: u8,
    pub confidence: f32,
    #[allow(dead_code)]
    pub using_model: bool,
    pub stub: bool,
    pub latency_ms: u64,
    pub model_id: Option<String>,
}

/// Health response from API
#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
}

/// Status response from API
#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub registry: String,
    pub runtime: String,
    pub active_model_id: Option<Uuid>,
    pub cached_model: Option<ModelSnapshot>,
    pub loads: u64,
}

/// Encode an image file as a `data:` URL
pub fn image_data_url(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mime = ImageFormat::from_path(path)
        .map(|f| f.to_mime_type())
        .unwrap_or("image/png");
    Ok(format!("data:{};base64,{}", mime, STANDARD.encode(bytes)))
}

/// Classify an image file
pub async fn predict(client: &ApiClient, image: &Path, model_id: Option<String>) -> Result<()> {
    #[derive(Serialize)]
    struct PredictRequest {
        image: String,
        model_id: Option<String>,
    }

    let req = PredictRequest {
        image: image_data_url(image)?,
        model_id,
    };
    debug!(path = %image.display(), size = req.image.len(), "Sending prediction request");

    let response = client
        .client
        .post(client.url("/api/v1/predict"))
        .json(&req)
        .send()
        .await?;

    if response.status().is_success() {
        let prediction: PredictResponse = response.json().await?;
        println!("Digit: {}", prediction.digit);
        println!("  Confidence: {:.2}", prediction.confidence);
        println!(
            "  Source: {}",
            if prediction.stub { "fallback" } else { "model" }
        );
        println!("  Latency: {}ms", prediction.latency_ms);
        if let Some(id) = prediction.model_id {
            println!("  Model ID: {}", id);
        }
    } else {
        let error = response.text().await?;
        eprintln!("Prediction failed: {}", error);
    }

    Ok(())
}

/// List registered models
pub async fn models(client: &ApiClient) -> Result<()> {
    let response = client.client.get(client.url("/api/v1/models")).send().await?;

    if response.status().is_success() {
        let models: Vec<ModelArtifactMetadata> = response.json().await?;

        if models.is_empty() {
            println!("No models registered");
            return Ok(());
        }

        println!(
            "{:<38} {:<20} {:<8} {:<7} {}",
            "ID", "ALGORITHM", "FORMAT", "ACTIVE", "CREATED"
        );
        for model in models {
            println!(
                "{:<38} {:<20} {:<8} {:<7} {}",
                model.id,
                model.algorithm,
                model.format,
                if model.is_active { "*" } else { "" },
                model.created_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
    } else {
        let error = response.text().await?;
        eprintln!("Failed to list models: {}", error);
    }

    Ok(())
}

/// Register a model artifact
pub async fn register(
    client: &ApiClient,
    artifact: Option<&Path>,
    algorithm: String,
    format: String,
    active: bool,
    name: Option<String>,
) -> Result<()> {
    #[derive(Serialize)]
    struct RegisterRequest {
        algorithm: String,
        format: String,
        artifact_base64: Option<String>,
        is_active: bool,
        name: Option<String>,
    }

    let artifact_base64 = match artifact {
        Some(path) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Some(STANDARD.encode(bytes))
        }
        None => None,
    };

    let req = RegisterRequest {
        algorithm,
        format,
        artifact_base64,
        is_active: active,
        name,
    };

    let response = client
        .client
        .post(client.url("/api/v1/models"))
        .json(&req)
        .send()
        .await?;

    if response.status().is_success() {
        let model: ModelArtifactMetadata = response.json().await?;
        println!("Model registered successfully");
        println!("  ID: {}", model.id);
        println!("  Algorithm: {}", model.algorithm);
        println!("  Format: {}", model.format);
        println!("  Active: {}", model.is_active);
        println!(
            "  Artifact: {}",
            if model.artifact.is_some() { "stored" } else { "none" }
        );
    } else {
        let error = response.text().await?;
        eprintln!("Failed to register model: {}", error);
    }

    Ok(())
}

/// Show server health
pub async fn health(client: &ApiClient) -> Result<()> {
    let response = client.client.get(client.url("/api/v1/health")).send().await?;

    if response.status().is_success() {
        let health: HealthResponse = response.json().await?;
        println!("Status: {}", health.status);
        println!("Model loaded: {}", health.model_loaded);
    } else {
        let error = response.text().await?;
        eprintln!("Failed to get health: {}", error);
    }

    Ok(())
}

/// Show system status
pub async fn status(client: &ApiClient) -> Result<()> {
    let response = client
        .client
        .get(client.url("/api/v1/status"))
        .send()
        .await?;

    if response.status().is_success() {
        let status: StatusResponse = response.json().await?;

        println!("digitd v{}", status.version);
        println!();
        println!("Registry: {}", status.registry);
        println!("Runtime: {}", status.runtime);
        match status.active_model_id {
            Some(id) => println!("Active model: {}", id),
            None => println!("Active model: none"),
        }
        match status.cached_model {
            Some(snapshot) => println!(
                "Cached model: {} ({}, {})",
                snapshot.id, snapshot.algorithm, snapshot.format
            ),
            None => println!("Cached model: none"),
        }
        println!("Loads: {}", status.loads);
    } else {
        let error = response.text().await?;
        eprintln!("Failed to get status: {}", error);
    }

    Ok(())
}
