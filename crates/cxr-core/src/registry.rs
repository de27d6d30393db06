//! Model registry - resolves model ids to cached inference sessions.
//!
//! Sessions load lazily on first use and live for the process lifetime.
//! Each id gets its own memoization cell, inserted into the cache before
//! the load begins, so concurrent first-use requests perform exactly one
//! artifact load. A failed load leaves the cell empty and is retried on
//! the next request, so weights deployed after startup are picked up.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::ModelConfig;
use crate::error::{CxrError, Result};
use cxr_inference::{InferenceBackend, OrtBackend};

/// A registered model: id, display name, and ordered artifact candidates.
#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    /// Stable identifier requests refer to.
    pub id: String,
    /// Human-readable name for discovery listings.
    pub display_name: String,
    /// Candidate artifact paths, probed in declared order.
    pub candidate_paths: Vec<PathBuf>,
}

/// Discovery listing entry for a model whose artifact is present on disk.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub id: String,
    pub display_name: String,
}

type Loader<B> = dyn Fn(&Path) -> Result<B> + Send + Sync;

/// Registry mapping model ids to lazily loaded, cached sessions.
pub struct ModelRegistry<B> {
    descriptors: Vec<ModelDescriptor>,
    loader: Arc<Loader<B>>,
    sessions: Mutex<HashMap<String, Arc<OnceCell<Arc<B>>>>>,
}

impl ModelRegistry<OrtBackend> {
    /// Create a registry with the deployed chest radiograph models,
    /// loading artifacts through ONNX Runtime on the CPU.
    pub fn with_deployed_models(config: &ModelConfig) -> Self {
        let model_dir = &config.model_dir;
        let descriptors = vec![
            ModelDescriptor {
                id: "efficientnet".to_string(),
                display_name: "EfficientNet".to_string(),
                candidate_paths: vec![
                    model_dir.join("model.onnx"),
                    PathBuf::from("model.onnx"),
                    PathBuf::from("server/model.onnx"),
                ],
            },
            ModelDescriptor {
                id: "densenet121".to_string(),
                display_name: "DenseNet121".to_string(),
                candidate_paths: vec![
                    model_dir.join("densenet121.onnx"),
                    PathBuf::from("densenet121.onnx"),
                    PathBuf::from("server/densenet121.onnx"),
                ],
            },
        ];

        Self::new(descriptors, |path: &Path| {
            OrtBackend::from_file(path).map_err(CxrError::Inference)
        })
    }
}

impl<B: InferenceBackend> ModelRegistry<B> {
    /// Create a registry with the given descriptors and artifact loader.
    pub fn new<F>(descriptors: Vec<ModelDescriptor>, loader: F) -> Self
    where
        F: Fn(&Path) -> Result<B> + Send + Sync + 'static,
    {
        Self {
            descriptors,
            loader: Arc::new(loader),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `model_id` is registered (regardless of artifact presence).
    pub fn contains(&self, model_id: &str) -> bool {
        self.descriptors.iter().any(|d| d.id == model_id)
    }

    /// The registered descriptors.
    pub fn descriptors(&self) -> &[ModelDescriptor] {
        &self.descriptors
    }

    /// Resolve a model id to its loaded session.
    ///
    /// Cache hits return the cached handle without touching storage.
    /// On a miss, the first existing candidate path is loaded; fails with
    /// [`CxrError::ModelNotFound`] when no candidate exists and
    /// [`CxrError::ModelLoad`] when initialization fails.
    pub fn resolve(&self, model_id: &str) -> Result<Arc<B>> {
        let descriptor = self
            .descriptors
            .iter()
            .find(|d| d.id == model_id)
            .ok_or_else(|| CxrError::ModelNotFound {
                model_id: model_id.to_string(),
            })?;

        // The cell is inserted before any load starts; OnceCell serializes
        // initializers, so concurrent first-use performs one load.
        let cell = {
            let mut sessions = self.sessions.lock().map_err(|_| CxrError::ModelLoad {
                model_id: model_id.to_string(),
                reason: "session cache lock poisoned".to_string(),
            })?;
            Arc::clone(
                sessions
                    .entry(model_id.to_string())
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };

        let session = cell.get_or_try_init(|| {
            let path = Self::first_existing(descriptor).ok_or_else(|| CxrError::ModelNotFound {
                model_id: model_id.to_string(),
            })?;

            info!(
                "Loading model {} from: {}",
                descriptor.display_name,
                path.display()
            );

            (self.loader)(&path)
                .map(Arc::new)
                .map_err(|e| match e {
                    err @ CxrError::ModelNotFound { .. } => err,
                    err => CxrError::ModelLoad {
                        model_id: model_id.to_string(),
                        reason: err.to_string(),
                    },
                })
        })?;

        Ok(Arc::clone(session))
    }

    /// Models whose artifact currently exists on disk.
    ///
    /// Advisory and re-evaluated on every call: artifacts may be deployed
    /// or removed after process start.
    pub fn available_models(&self) -> Vec<ModelInfo> {
        self.descriptors
            .iter()
            .filter(|d| Self::first_existing(d).is_some())
            .map(|d| ModelInfo {
                id: d.id.clone(),
                display_name: d.display_name.clone(),
            })
            .collect()
    }

    fn first_existing(descriptor: &ModelDescriptor) -> Option<PathBuf> {
        let found = descriptor
            .candidate_paths
            .iter()
            .find(|p| p.exists())
            .cloned();
        if found.is_none() {
            debug!(
                "No artifact for '{}' among {} candidate paths",
                descriptor.id,
                descriptor.candidate_paths.len()
            );
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::ArrayD;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct StubBackend;

    impl InferenceBackend for StubBackend {
        fn run(
            &self,
            _inputs: &[(&str, ArrayD<f32>)],
        ) -> cxr_inference::Result<Vec<(String, ArrayD<f32>)>> {
            Ok(vec![])
        }

        fn input_names(&self) -> &[String] {
            &[]
        }

        fn output_names(&self) -> &[String] {
            &[]
        }
    }

    fn descriptor(id: &str, paths: Vec<PathBuf>) -> ModelDescriptor {
        ModelDescriptor {
            id: id.to_string(),
            display_name: id.to_string(),
            candidate_paths: paths,
        }
    }

    fn touch(path: &Path) {
        std::fs::write(path, b"onnx").unwrap();
    }

    #[test]
    fn resolve_unknown_id_is_not_found() {
        let registry: ModelRegistry<StubBackend> = ModelRegistry::new(vec![], |_: &Path| Ok(StubBackend));
        let err = registry.resolve("efficientnet").unwrap_err();
        assert!(matches!(err, CxrError::ModelNotFound { .. }));
    }

    #[test]
    fn resolve_missing_artifact_is_not_found() {
        let registry = ModelRegistry::new(
            vec![descriptor(
                "efficientnet",
                vec![PathBuf::from("/nonexistent/model.onnx")],
            )],
            |_: &Path| Ok(StubBackend),
        );
        let err = registry.resolve("efficientnet").unwrap_err();
        assert!(matches!(
            err,
            CxrError::ModelNotFound { ref model_id } if model_id == "efficientnet"
        ));
    }

    #[test]
    fn resolve_is_idempotent_and_cached() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("model.onnx");
        touch(&model_path);

        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let registry = ModelRegistry::new(
            vec![descriptor("efficientnet", vec![model_path])],
            move |_: &Path| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(StubBackend)
            },
        );

        let first = registry.resolve("efficientnet").unwrap();
        let second = registry.resolve("efficientnet").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_first_use_loads_once() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("model.onnx");
        touch(&model_path);

        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let registry = Arc::new(ModelRegistry::new(
            vec![descriptor("efficientnet", vec![model_path])],
            move |_: &Path| {
                counter.fetch_add(1, Ordering::SeqCst);
                // Widen the race window.
                std::thread::sleep(std::time::Duration::from_millis(20));
                Ok(StubBackend)
            },
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.resolve("efficientnet").map(|_| ()))
            })
            .collect();

        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_load_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("model.onnx");
        touch(&model_path);

        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let registry = ModelRegistry::new(
            vec![descriptor("efficientnet", vec![model_path])],
            move |_: &Path| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(CxrError::Config("corrupt artifact".to_string()))
                } else {
                    Ok(StubBackend)
                }
            },
        );

        let err = registry.resolve("efficientnet").unwrap_err();
        assert!(matches!(err, CxrError::ModelLoad { .. }));

        // The second request retries and succeeds.
        registry.resolve("efficientnet").unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn available_models_tracks_disk_state() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("model.onnx");

        let registry = ModelRegistry::new(
            vec![
                descriptor("efficientnet", vec![model_path.clone()]),
                descriptor("densenet121", vec![dir.path().join("densenet121.onnx")]),
            ],
            |_: &Path| Ok(StubBackend),
        );

        assert!(registry.available_models().is_empty());

        // Artifact deployed after process start shows up without a restart.
        touch(&model_path);
        let available = registry.available_models();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].id, "efficientnet");
    }

    #[test]
    fn first_candidate_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let primary = dir.path().join("primary.onnx");
        let secondary = dir.path().join("secondary.onnx");
        touch(&primary);
        touch(&secondary);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let paths = Arc::clone(&seen);
        let registry = ModelRegistry::new(
            vec![descriptor("efficientnet", vec![primary.clone(), secondary])],
            move |path: &Path| {
                paths.lock().unwrap().push(path.to_path_buf());
                Ok(StubBackend)
            },
        );

        registry.resolve("efficientnet").unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![primary]);
    }
}
