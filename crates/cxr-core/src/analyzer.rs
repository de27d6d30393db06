//! End-to-end analysis orchestration.
//!
//! One request flows resolve -> preprocess -> infer -> synthesize. The
//! CPU-bound stages run on the blocking pool so an async caller's scheduler
//! is never stalled; stages within a request are strictly sequential.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::classes::placeholder_prediction;
use crate::config::CxrConfig;
use crate::error::{CxrError, Result};
use crate::executor::{ConditionScore, InferenceExecutor, PredictionResult};
use crate::heatmap::HeatmapSynthesizer;
use crate::preprocess::ImagePreprocessor;
use crate::registry::ModelRegistry;
use cxr_inference::{InferenceBackend, InferenceError, OrtBackend};

/// The record handed to the persistence collaborator after one analysis.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    /// All condition scores, sorted descending by probability.
    pub results: Vec<ConditionScore>,
    pub predicted_class: String,
    pub predicted_class_en: String,
    pub confidence: f32,
    /// Base64-encoded PNG overlay, or `None` when synthesis failed.
    pub heatmap: Option<String>,
    /// Id of the model that produced the prediction.
    pub model_type: String,
    pub analysis_date: DateTime<Utc>,
}

/// Orchestrates the analysis pipeline against a model registry.
pub struct Analyzer<B> {
    registry: Arc<ModelRegistry<B>>,
    preprocessor: ImagePreprocessor,
    synthesizer: HeatmapSynthesizer,
    default_model: String,
}

impl Analyzer<OrtBackend> {
    /// Create an analyzer over the deployed models.
    pub fn new(config: &CxrConfig) -> Self {
        let registry = Arc::new(ModelRegistry::with_deployed_models(&config.models));
        Self::with_registry(config, registry)
    }
}

impl<B: InferenceBackend + 'static> Analyzer<B> {
    /// Create an analyzer over an explicit registry.
    pub fn with_registry(config: &CxrConfig, registry: Arc<ModelRegistry<B>>) -> Self {
        Self {
            registry,
            preprocessor: ImagePreprocessor::new(config.models.input_size),
            synthesizer: HeatmapSynthesizer::new(
                config.models.input_size,
                config.heatmap.max_size,
            ),
            default_model: config.models.default_model.clone(),
        }
    }

    /// The underlying registry (for discovery listings).
    pub fn registry(&self) -> &ModelRegistry<B> {
        &self.registry
    }

    /// Analyze the radiograph at `image_path` with the requested model.
    ///
    /// Unspecified or unknown model ids fall back to the default model.
    /// A missing model artifact yields the placeholder prediction instead
    /// of an error; heatmap synthesis failures yield `heatmap: None` on an
    /// otherwise successful record.
    ///
    /// Each CPU-bound stage runs as its own blocking task; dropping the
    /// returned future abandons the request at the next stage boundary.
    pub async fn analyze(
        &self,
        image_path: impl AsRef<Path>,
        model_id: Option<&str>,
    ) -> Result<AnalysisRecord> {
        let image_path = image_path.as_ref().to_path_buf();
        let model_id = self.effective_model_id(model_id);
        info!("Analyzing {} with model '{}'", image_path.display(), model_id);

        // Stage 1: resolve the session (first use pays the artifact load).
        let session = {
            let registry = Arc::clone(&self.registry);
            let id = model_id.clone();
            run_stage(move || match registry.resolve(&id) {
                Ok(session) => Ok(Some(session)),
                Err(CxrError::ModelNotFound { .. }) => Ok(None),
                Err(e) => Err(e),
            })
            .await?
        };

        let Some(session) = session else {
            // Missing weights are an expected deployment state; serve the
            // fixed placeholder distribution instead of failing.
            warn!(
                "No artifact for model '{}', using placeholder prediction",
                model_id
            );
            return Ok(build_record(placeholder_prediction(), None, &model_id));
        };

        // Stage 2: preprocess into the model input tensor.
        let (tensor, (width, height)) = {
            let preprocessor = self.preprocessor.clone();
            let path = image_path.clone();
            run_stage(move || preprocessor.preprocess(&path)).await?
        };

        // Stage 3: inference.
        let prediction =
            run_stage(move || InferenceExecutor::infer(session.as_ref(), tensor)).await?;

        // Stage 4: heatmap. Failures surface as a missing overlay only.
        let heatmap = {
            let synthesizer = self.synthesizer.clone();
            let prediction = prediction.clone();
            run_stage(move || {
                Ok(synthesizer
                    .synthesize(width, height, &prediction)
                    .map(|asset| asset.base64))
            })
            .await?
        };

        info!(
            "Prediction: {} ({:.2}%)",
            prediction.predicted_class,
            prediction.confidence * 100.0
        );

        Ok(build_record(prediction, heatmap, &model_id))
    }

    fn effective_model_id(&self, requested: Option<&str>) -> String {
        match requested {
            Some(id) if self.registry.contains(id) => id.to_string(),
            Some(id) => {
                warn!("Unknown model '{}', using '{}'", id, self.default_model);
                self.default_model.clone()
            }
            None => self.default_model.clone(),
        }
    }
}

/// Run one pipeline stage on the blocking pool.
async fn run_stage<T, F>(stage: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(stage).await.map_err(|e| {
        CxrError::Inference(InferenceError::InferenceFailed(format!(
            "analysis task join error: {}",
            e
        )))
    })?
}

fn build_record(
    prediction: PredictionResult,
    heatmap: Option<String>,
    model_id: &str,
) -> AnalysisRecord {
    AnalysisRecord {
        results: prediction.results,
        predicted_class: prediction.predicted_class,
        predicted_class_en: prediction.predicted_class_en,
        confidence: prediction.confidence,
        heatmap,
        model_type: model_id.to_string(),
        analysis_date: Utc::now(),
    }
}
