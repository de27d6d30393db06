//! Error types for the cxr-core library.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the radiograph analysis pipeline.
#[derive(Error, Debug)]
pub enum CxrError {
    /// No candidate artifact path exists for the requested model id.
    ///
    /// This is an expected deployment state (weights not shipped yet) and
    /// triggers the placeholder prediction in [`crate::Analyzer`] rather
    /// than a hard failure.
    #[error("model '{model_id}' not found on disk")]
    ModelNotFound { model_id: String },

    /// The artifact exists but the session failed to initialize.
    #[error("failed to load model '{model_id}': {reason}")]
    ModelLoad { model_id: String, reason: String },

    /// The image path does not resolve to a file.
    #[error("image file not found: {0}")]
    ImageNotFound(PathBuf),

    /// The byte stream could not be decoded as a raster image.
    #[error("failed to decode image: {0}")]
    ImageDecode(String),

    /// The pixel buffer does not expose exactly 3 channels after alpha removal.
    #[error("image must have 3 channels (RGB), got {channels}")]
    ChannelCount { channels: u8 },

    /// Inference execution failed.
    #[error("inference error: {0}")]
    Inference(#[from] cxr_inference::InferenceError),

    /// Heatmap synthesis failed.
    ///
    /// Never crosses the analyzer boundary: [`crate::HeatmapSynthesizer`]
    /// absorbs it and reports a missing heatmap instead.
    #[error("heatmap synthesis failed: {0}")]
    Heatmap(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for the cxr library.
pub type Result<T> = std::result::Result<T, CxrError>;
