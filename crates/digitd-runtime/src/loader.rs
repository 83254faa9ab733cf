//! Format-polymorphic model loading

use digitd_core::{ModelArtifactMetadata, ModelFormat, ModelSnapshot, ServeResult};
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, info};

use crate::tabular::TabularModel;
use crate::traits::{TensorModel, TensorRuntime};

/// In-memory predictor, one variant per model family
#[derive(Clone)]
pub enum Predictor {
    /// Flat-vector classifier restored from a serialized object graph
    TabularClassifier(TabularModel),
    /// Tensor-graph classifier run by the numeric runtime
    TensorClassifier(Arc<dyn TensorModel>),
}

impl std::fmt::Debug for Predictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Predictor::TabularClassifier(m) => f
                .debug_tuple("TabularClassifier")
                .field(&m.algorithm())
                .finish(),
            Predictor::TensorClassifier(_) => f.write_str("TensorClassifier"),
        }
    }
}

/// A predictor together with the metadata it was loaded from
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub predictor: Predictor,
    pub snapshot: ModelSnapshot,
}

/// Turns raw artifact bytes into predictors
pub struct ModelLoader {
    tensor_runtime: Arc<dyn TensorRuntime>,
}

impl ModelLoader {
    /// Create a loader backed by the given tensor runtime
    pub fn new(tensor_runtime: Arc<dyn TensorRuntime>) -> Self {
        Self { tensor_runtime }
    }

    /// Materialize a predictor from artifact bytes and a declared format tag
    ///
    /// An unknown tag fails with `UnsupportedFormat` before anything else happens.
    pub fn load(&self, raw: &[u8], format_tag: &str) -> ServeResult<Predictor> {
        let format = ModelFormat::parse(format_tag)?;

        debug!(format = %format, size = raw.len(), "Loading model artifact");

        let predictor = match format {
            ModelFormat::Pickle => Predictor::TabularClassifier(TabularModel::from_bytes(raw)?),
            ModelFormat::H5 | ModelFormat::Keras | ModelFormat::Onnx => {
                Predictor::TensorClassifier(self.load_tensor_graph(raw, format)?)
            }
        };

        info!(format = %format, predictor = ?predictor, "Model artifact loaded");
        Ok(predictor)
    }

    /// Load the artifact described by `meta` and snapshot its metadata
    pub fn load_model(&self, raw: &[u8], meta: &ModelArtifactMetadata) -> ServeResult<LoadedModel> {
        let predictor = self.load(raw, &meta.format)?;
        Ok(LoadedModel {
            predictor,
            snapshot: ModelSnapshot {
                id: meta.id,
                algorithm: meta.algorithm.clone(),
                format: ModelFormat::parse(&meta.format)?,
            },
        })
    }

    /// Stage the bytes in a temp file for the runtime; the file is removed when
    /// `staged` drops, whether or not the load succeeded
    fn load_tensor_graph(&self, raw: &[u8], format: ModelFormat) -> ServeResult<Arc<dyn TensorModel>> {
        let mut staged = tempfile::Builder::new()
            .prefix("digitd-model-")
            .suffix(format.file_suffix())
            .tempfile()?;
        staged.write_all(raw)?;
        staged.flush()?;

        debug!(
            runtime = self.tensor_runtime.name(),
            path = %staged.path().display(),
            "Loading tensor-graph model"
        );

        self.tensor_runtime.load(staged.path())
    }

    /// Name of the tensor runtime in use
    pub fn runtime_name(&self) -> &'static str {
        self.tensor_runtime.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tabular::DummyClassifier;
    use digitd_core::ServeError;
    use ndarray::ArrayView4;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ConstantModel;

    impl TensorModel for ConstantModel {
        fn run(&self, _input: ArrayView4<'_, f32>) -> ServeResult<Vec<f32>> {
            Ok(vec![0.1; 10])
        }
    }

    /// Records what the loader staged on disk
    #[derive(Default)]
    struct RecordingRuntime {
        fail: bool,
        loads: AtomicUsize,
        seen: Mutex<Vec<(PathBuf, Vec<u8>)>>,
    }

    impl TensorRuntime for RecordingRuntime {
        fn load(&self, path: &Path) -> ServeResult<Arc<dyn TensorModel>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let bytes = std::fs::read(path)?;
            self.seen.lock().unwrap().push((path.to_path_buf(), bytes));
            if self.fail {
                return Err(ServeError::Deserialization("bad graph".to_string()));
            }
            Ok(Arc::new(ConstantModel))
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    fn pickle_bytes() -> Vec<u8> {
        TabularModel::DummyClassifier(DummyClassifier {
            class_prior: vec![0.5, 0.5],
        })
        .to_bytes()
        .unwrap()
    }

    #[test]
    fn test_load_pickle() {
        let runtime = Arc::new(RecordingRuntime::default());
        let loader = ModelLoader::new(runtime.clone());

        let predictor = loader.load(&pickle_bytes(), "pickle").unwrap();
        assert!(matches!(predictor, Predictor::TabularClassifier(_)));
        assert_eq!(runtime.loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_load_tensor_graph_stages_and_removes_file() {
        let runtime = Arc::new(RecordingRuntime::default());
        let loader = ModelLoader::new(runtime.clone());

        for (tag, suffix) in [("h5", ".h5"), ("keras", ".keras"), ("onnx", ".onnx")] {
            let predictor = loader.load(b"graph-bytes", tag).unwrap();
            assert!(matches!(predictor, Predictor::TensorClassifier(_)));

            let seen = runtime.seen.lock().unwrap();
            let (path, bytes) = seen.last().unwrap();
            assert!(path.to_string_lossy().ends_with(suffix));
            assert_eq!(bytes.as_slice(), b"graph-bytes");
            assert!(!path.exists());
        }
        assert_eq!(runtime.loads.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_failed_tensor_load_still_removes_file() {
        let runtime = Arc::new(RecordingRuntime {
            fail: true,
            ..Default::default()
        });
        let loader = ModelLoader::new(runtime.clone());

        let result = loader.load(b"broken", "keras");
        assert!(matches!(result, Err(ServeError::Deserialization(_))));

        let seen = runtime.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].0.exists());
    }

    #[test]
    fn test_unsupported_format_has_no_side_effects() {
        let runtime = Arc::new(RecordingRuntime::default());
        let loader = ModelLoader::new(runtime.clone());

        let result = loader.load(b"whatever", "joblib");
        assert!(matches!(result, Err(ServeError::UnsupportedFormat(tag)) if tag == "joblib"));
        assert_eq!(runtime.loads.load(Ordering::SeqCst), 0);
        assert!(runtime.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_pickle_is_deserialization_error() {
        let loader = ModelLoader::new(Arc::new(RecordingRuntime::default()));
        let result = loader.load(&[0xff; 3], "pickle");
        assert!(matches!(result, Err(ServeError::Deserialization(_))));
    }

    #[test]
    fn test_load_model_snapshots_metadata() {
        let loader = ModelLoader::new(Arc::new(RecordingRuntime::default()));
        let meta = ModelArtifactMetadata::new("cnn", "Keras");

        let loaded = loader.load_model(b"graph", &meta).unwrap();
        assert_eq!(loaded.snapshot.id, meta.id);
        assert_eq!(loaded.snapshot.algorithm, "cnn");
        assert_eq!(loaded.snapshot.format, ModelFormat::Keras);
    }
}
