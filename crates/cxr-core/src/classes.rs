//! Condition class table for chest radiograph classification.
//!
//! The order matches the output head of the trained models and must not be
//! reordered. Localized labels are Spanish, matching the product UI.

use crate::executor::{ConditionScore, PredictionResult};

/// Number of condition classes the models are trained on.
pub const CLASS_COUNT: usize = 8;

/// A canonical class name paired with its localized label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionClass {
    /// Canonical (English) label, as exported by the model.
    pub canonical: &'static str,
    /// Localized label shown to end users.
    pub localized: &'static str,
}

/// Model output order: index i of the logits vector scores `CLASSES[i]`.
const CLASSES: [ConditionClass; CLASS_COUNT] = [
    ConditionClass { canonical: "Atelectasis", localized: "Atelectasia" },
    ConditionClass { canonical: "COVID-19", localized: "COVID-19" },
    ConditionClass { canonical: "Edema", localized: "Edema" },
    ConditionClass { canonical: "Mass", localized: "Masa" },
    ConditionClass { canonical: "Nodule", localized: "Nódulo" },
    ConditionClass { canonical: "Normal", localized: "Normal" },
    ConditionClass { canonical: "Pneumonia", localized: "Neumonía" },
    ConditionClass { canonical: "Tuberculosis", localized: "Tuberculosis" },
];

/// The ordered class table.
pub fn condition_classes() -> &'static [ConditionClass] {
    &CLASSES
}

/// Fixed placeholder distribution used when no model artifact is deployed.
///
/// Returned verbatim so environments without weights behave predictably;
/// values are part of the external contract and must not change.
pub fn placeholder_prediction() -> PredictionResult {
    let scores = [
        ("Normal", 0.75),
        ("Pneumonia", 0.15),
        ("Atelectasis", 0.05),
        ("Nodule", 0.03),
        ("Mass", 0.01),
        ("Edema", 0.01),
        ("COVID-19", 0.00),
        ("Tuberculosis", 0.00),
    ];

    let results: Vec<ConditionScore> = scores
        .iter()
        .map(|&(canonical, probability)| ConditionScore {
            condition: localized_label(canonical).to_string(),
            condition_en: canonical.to_string(),
            probability,
        })
        .collect();

    PredictionResult::from_ranked(results)
}

fn localized_label(canonical: &str) -> &'static str {
    CLASSES
        .iter()
        .find(|c| c.canonical == canonical)
        .map(|c| c.localized)
        .unwrap_or("Desconocido")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_table_is_complete() {
        assert_eq!(condition_classes().len(), CLASS_COUNT);
        assert_eq!(condition_classes()[5].canonical, "Normal");
        assert_eq!(condition_classes()[6].localized, "Neumonía");
    }

    #[test]
    fn placeholder_is_normal_at_075() {
        let p = placeholder_prediction();
        assert_eq!(p.predicted_class_en, "Normal");
        assert_eq!(p.predicted_class, "Normal");
        assert_eq!(p.confidence, 0.75);
        assert_eq!(p.results.len(), CLASS_COUNT);
        assert_eq!(p.results[1].condition_en, "Pneumonia");
        assert_eq!(p.results[1].condition, "Neumonía");
        assert_eq!(p.results[1].probability, 0.15);
    }
}
