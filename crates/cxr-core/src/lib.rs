//! Core library for chest radiograph analysis.
//!
//! This crate provides:
//! - A model registry resolving model ids to cached ONNX sessions
//! - Image preprocessing into normalized NCHW tensors
//! - Inference execution with softmax-ranked condition scores
//! - Synthetic attention heatmap generation (PNG overlay, base64)
//! - The `Analyzer` orchestrating one request end to end

pub mod analyzer;
pub mod classes;
pub mod config;
pub mod error;
pub mod executor;
pub mod heatmap;
pub mod preprocess;
pub mod registry;

pub use analyzer::{AnalysisRecord, Analyzer};
pub use classes::{CLASS_COUNT, ConditionClass, condition_classes};
pub use config::{CxrConfig, HeatmapConfig, ModelConfig};
pub use error::{CxrError, Result};
pub use executor::{ConditionScore, InferenceExecutor, PredictionResult};
pub use heatmap::{HeatmapAsset, HeatmapSynthesizer};
pub use preprocess::ImagePreprocessor;
pub use registry::{ModelDescriptor, ModelInfo, ModelRegistry};

/// Re-export inference types.
pub use cxr_inference::{InferenceBackend, InferenceError, OrtBackend};
