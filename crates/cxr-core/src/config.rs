//! Configuration structures for the analysis pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Main configuration for the cxr pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CxrConfig {
    /// Model lookup configuration.
    pub models: ModelConfig,

    /// Heatmap synthesis configuration.
    pub heatmap: HeatmapConfig,
}

/// Model file lookup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Directory searched first for model artifacts.
    pub model_dir: PathBuf,

    /// Id of the model used when the caller specifies none, or an unknown one.
    pub default_model: String,

    /// Model input size (side of the square tensor).
    pub input_size: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            default_model: "efficientnet".to_string(),
            input_size: 224,
        }
    }
}

/// Heatmap synthesis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapConfig {
    /// Cap on the longer side of the encoded overlay, in pixels.
    pub max_size: u32,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self { max_size: 512 }
    }
}

impl CxrConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployed_models() {
        let config = CxrConfig::default();
        assert_eq!(config.models.default_model, "efficientnet");
        assert_eq!(config.models.input_size, 224);
        assert_eq!(config.heatmap.max_size, 512);
    }

    #[test]
    fn round_trips_through_json() {
        let config = CxrConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: CxrConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.models.model_dir, config.models.model_dir);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let parsed: CxrConfig = serde_json::from_str(r#"{"heatmap":{"max_size":256}}"#).unwrap();
        assert_eq!(parsed.heatmap.max_size, 256);
        assert_eq!(parsed.models.default_model, "efficientnet");
    }
}
