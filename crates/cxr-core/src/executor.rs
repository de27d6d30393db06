//! Inference execution - runs the session and ranks condition scores.

use ndarray::Array4;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::classes::condition_classes;
use crate::error::Result;
use cxr_inference::{InferenceBackend, InferenceError};

/// Probability assigned to one condition class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionScore {
    /// Localized label.
    pub condition: String,
    /// Canonical label.
    pub condition_en: String,
    /// Softmax probability in [0, 1].
    pub probability: f32,
}

/// Ranked prediction for one radiograph.
///
/// `predicted_class`, `predicted_class_en` and `confidence` are always
/// copies of `results[0]`'s fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    /// All condition scores, sorted descending by probability.
    pub results: Vec<ConditionScore>,
    pub predicted_class: String,
    pub predicted_class_en: String,
    pub confidence: f32,
}

impl PredictionResult {
    /// Build a result from an already ranked score list, copying the head
    /// fields from the top entry.
    pub fn from_ranked(results: Vec<ConditionScore>) -> Self {
        let (predicted_class, predicted_class_en, confidence) = match results.first() {
            Some(top) => (top.condition.clone(), top.condition_en.clone(), top.probability),
            None => (String::new(), String::new(), 0.0),
        };

        Self {
            results,
            predicted_class,
            predicted_class_en,
            confidence,
        }
    }
}

/// Executes one inference call and ranks the output.
pub struct InferenceExecutor;

impl InferenceExecutor {
    /// Run the tensor through the session and produce ranked scores.
    pub fn infer<B: InferenceBackend>(
        backend: &B,
        tensor: Array4<f32>,
    ) -> Result<PredictionResult> {
        let input_name = backend
            .input_names()
            .first()
            .map(String::as_str)
            .unwrap_or("input");
        debug!("Running inference with input: {}", input_name);

        let outputs = backend.run(&[(input_name, tensor.into_dyn())])?;

        // Prefer the first declared output name, fall back to the first
        // tensor the engine returned.
        let declared = backend.output_names().first();
        let logits_arr = outputs
            .iter()
            .find(|(name, _)| Some(name) == declared)
            .or_else(|| outputs.first())
            .map(|(_, arr)| arr)
            .ok_or_else(|| {
                InferenceError::OutputExtraction("model produced no outputs".to_string())
            })?;

        let logits: Vec<f32> = logits_arr.iter().cloned().collect();
        if logits.is_empty() {
            return Err(InferenceError::OutputExtraction(
                "model output tensor is empty".to_string(),
            )
            .into());
        }

        let probabilities = softmax(&logits);

        let classes = condition_classes();
        if probabilities.len() != classes.len() {
            warn!(
                "Model returned {} scores but {} classes are known; pairing up to the shorter",
                probabilities.len(),
                classes.len()
            );
        }

        let mut results: Vec<ConditionScore> = classes
            .iter()
            .zip(probabilities.iter())
            .map(|(class, &probability)| ConditionScore {
                condition: class.localized.to_string(),
                condition_en: class.canonical.to_string(),
                probability,
            })
            .collect();

        // Stable sort keeps the fixed class order on exact ties.
        results.sort_by(|a, b| {
            b.probability
                .partial_cmp(&a.probability)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let prediction = PredictionResult::from_ranked(results);
        debug!(
            "Prediction: {} ({:.2}%)",
            prediction.predicted_class,
            prediction.confidence * 100.0
        );

        Ok(prediction)
    }
}

/// Numerically stable softmax.
///
/// Scores are clamped to [-50, 50] before exponentiating so pathological
/// logits cannot overflow.
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let exp_scores: Vec<f32> = scores.iter().map(|&s| s.clamp(-50.0, 50.0).exp()).collect();
    let sum: f32 = exp_scores.iter().sum();
    exp_scores.iter().map(|&e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::ArrayD;
    use pretty_assertions::assert_eq;

    /// Backend returning a scripted logits vector.
    struct ScriptedBackend {
        logits: Vec<f32>,
        input_names: Vec<String>,
        output_names: Vec<String>,
    }

    impl ScriptedBackend {
        fn new(logits: Vec<f32>) -> Self {
            Self {
                logits,
                input_names: vec!["input".to_string()],
                output_names: vec!["output".to_string()],
            }
        }
    }

    impl InferenceBackend for ScriptedBackend {
        fn run(
            &self,
            inputs: &[(&str, ArrayD<f32>)],
        ) -> cxr_inference::Result<Vec<(String, ArrayD<f32>)>> {
            assert_eq!(inputs[0].0, "input");
            assert_eq!(inputs[0].1.shape(), &[1, 3, 224, 224]);
            let arr = ArrayD::from_shape_vec(
                ndarray::IxDyn(&[1, self.logits.len()]),
                self.logits.clone(),
            )
            .unwrap();
            Ok(vec![("output".to_string(), arr)])
        }

        fn input_names(&self) -> &[String] {
            &self.input_names
        }

        fn output_names(&self) -> &[String] {
            &self.output_names
        }
    }

    fn tensor() -> Array4<f32> {
        Array4::zeros((1, 3, 224, 224))
    }

    #[test]
    fn softmax_sums_to_one() {
        for scores in [
            vec![0.0; 8],
            vec![1.0, 2.0, 3.0, -1.0],
            vec![-100.0, 0.0, 100.0],
            vec![f32::MAX, f32::MIN],
        ] {
            let probs = softmax(&scores);
            let sum: f32 = probs.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5, "sum was {sum} for {scores:?}");
            assert!(probs.iter().all(|&p| (0.0..=1.0).contains(&p) && p.is_finite()));
        }
    }

    #[test]
    fn results_sorted_descending_with_head_invariant() {
        let backend = ScriptedBackend::new(vec![0.1, 0.2, 0.3, 0.4, 0.5, 3.0, 1.5, 0.6]);
        let prediction = InferenceExecutor::infer(&backend, tensor()).unwrap();

        for pair in prediction.results.windows(2) {
            assert!(pair[0].probability >= pair[1].probability);
        }

        assert_eq!(prediction.predicted_class_en, "Normal");
        assert_eq!(prediction.predicted_class, "Normal");
        assert_eq!(prediction.predicted_class, prediction.results[0].condition);
        assert_eq!(prediction.confidence, prediction.results[0].probability);
        assert_eq!(prediction.results[1].condition_en, "Pneumonia");
    }

    #[test]
    fn exact_ties_keep_class_order() {
        let backend = ScriptedBackend::new(vec![0.0; 8]);
        let prediction = InferenceExecutor::infer(&backend, tensor()).unwrap();

        let canonical: Vec<&str> = prediction
            .results
            .iter()
            .map(|s| s.condition_en.as_str())
            .collect();
        assert_eq!(
            canonical,
            vec![
                "Atelectasis",
                "COVID-19",
                "Edema",
                "Mass",
                "Nodule",
                "Normal",
                "Pneumonia",
                "Tuberculosis"
            ]
        );
    }

    #[test]
    fn pathological_logits_stay_finite() {
        let backend = ScriptedBackend::new(vec![1e30, -1e30, 500.0, -500.0, 0.0, 0.0, 0.0, 0.0]);
        let prediction = InferenceExecutor::infer(&backend, tensor()).unwrap();

        let sum: f32 = prediction.results.iter().map(|s| s.probability).sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(prediction.confidence.is_finite());
    }

    #[test]
    fn shorter_output_pairs_up_to_shorter_length() {
        let backend = ScriptedBackend::new(vec![2.0, 1.0, 0.5]);
        let prediction = InferenceExecutor::infer(&backend, tensor()).unwrap();

        assert_eq!(prediction.results.len(), 3);
        assert_eq!(prediction.predicted_class_en, "Atelectasis");
    }

    #[test]
    fn scores_serialize_camel_case() {
        let score = ConditionScore {
            condition: "Neumonía".to_string(),
            condition_en: "Pneumonia".to_string(),
            probability: 0.75,
        };
        let json = serde_json::to_value(&score).unwrap();
        assert_eq!(json["conditionEn"], "Pneumonia");
        assert!(json.get("condition_en").is_none());
    }
}
