//! Shared test doubles

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use digitd_core::{ArtifactRef, ModelArtifactMetadata, ServeError, ServeResult};
use digitd_runtime::{
    DummyClassifier, ModelLoader, TabularModel, TensorModel, TensorRuntime,
};
use digitd_store::{MemoryRegistry, ModelRegistry, NewModel};
use image::{DynamicImage, ImageBuffer, ImageFormat, Luma};
use ndarray::ArrayView4;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// PNG bytes of a uniform grayscale image
pub fn solid_png(width: u32, height: u32, value: u8) -> Vec<u8> {
    let img = DynamicImage::ImageLuma8(ImageBuffer::from_pixel(width, height, Luma([value])));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

pub fn data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

/// A typical canvas drawing: white background
pub fn canvas_payload() -> String {
    data_url(&solid_png(280, 280, 255))
}

/// Artifact for a classifier that always answers `digit` with probability 1
pub fn certain_pickle(digit: usize) -> Vec<u8> {
    let mut class_prior = vec![0.0; 10];
    class_prior[digit] = 1.0;
    TabularModel::DummyClassifier(DummyClassifier { class_prior })
        .to_bytes()
        .unwrap()
}

/// Tensor model returning a fixed output vector
pub struct FixedOutput(pub Vec<f32>);

impl TensorModel for FixedOutput {
    fn run(&self, input: ArrayView4<'_, f32>) -> ServeResult<Vec<f32>> {
        assert_eq!(input.shape(), &[1, 28, 28, 1]);
        Ok(self.0.clone())
    }
}

/// Tensor runtime whose models always return `output`
pub struct FixedRuntime {
    pub output: Vec<f32>,
}

impl TensorRuntime for FixedRuntime {
    fn load(&self, path: &Path) -> ServeResult<Arc<dyn TensorModel>> {
        std::fs::metadata(path)?;
        Ok(Arc::new(FixedOutput(self.output.clone())))
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Tensor runtime that blocks its thread on every load and run
pub struct SlowRuntime {
    delay: Duration,
    digit: usize,
}

impl SlowRuntime {
    pub fn new(delay: Duration, digit: usize) -> Self {
        Self { delay, digit }
    }
}

struct SlowModel {
    delay: Duration,
    digit: usize,
}

impl TensorModel for SlowModel {
    fn run(&self, _input: ArrayView4<'_, f32>) -> ServeResult<Vec<f32>> {
        std::thread::sleep(self.delay);
        let mut output = vec![0.0; 10];
        output[self.digit] = 0.9;
        Ok(output)
    }
}

impl TensorRuntime for SlowRuntime {
    fn load(&self, _path: &Path) -> ServeResult<Arc<dyn TensorModel>> {
        std::thread::sleep(self.delay);
        Ok(Arc::new(SlowModel {
            delay: self.delay,
            digit: self.digit,
        }))
    }

    fn name(&self) -> &'static str {
        "slow"
    }
}

pub fn loader_with_output(output: Vec<f32>) -> Arc<ModelLoader> {
    Arc::new(ModelLoader::new(Arc::new(FixedRuntime { output })))
}

pub fn loader() -> Arc<ModelLoader> {
    let mut output = vec![0.0; 10];
    output[4] = 0.8;
    loader_with_output(output)
}

/// Registry wrapper counting calls and optionally failing artifact fetches
#[derive(Default)]
pub struct CountingRegistry {
    pub inner: MemoryRegistry,
    pub lookups: AtomicUsize,
    pub fetches: AtomicUsize,
    pub fail_fetch: bool,
}

impl CountingRegistry {
    pub fn failing_fetch() -> Self {
        Self {
            fail_fetch: true,
            ..Default::default()
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelRegistry for CountingRegistry {
    async fn active_model(&self) -> ServeResult<Option<ModelArtifactMetadata>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.active_model().await
    }

    async fn fetch_artifact(&self, artifact: &ArtifactRef) -> ServeResult<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch {
            return Err(ServeError::ArtifactFetch(format!(
                "artifact not found: {}",
                artifact
            )));
        }
        self.inner.fetch_artifact(artifact).await
    }

    async fn register(&self, model: NewModel) -> ServeResult<ModelArtifactMetadata> {
        self.inner.register(model).await
    }

    async fn list(&self) -> ServeResult<Vec<ModelArtifactMetadata>> {
        self.inner.list().await
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}
