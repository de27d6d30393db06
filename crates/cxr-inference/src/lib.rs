//! ONNX inference abstraction for cxr.
//!
//! Wraps ONNX Runtime behind a small trait so the classification pipeline
//! can run against a loaded session in production and against a scripted
//! backend in tests. Radiograph classifiers take and produce f32 tensors,
//! so the interface is f32-only.

mod backend;
mod error;
mod ort_backend;

pub use backend::InferenceBackend;
pub use error::InferenceError;
pub use ort_backend::OrtBackend;

/// Result type for inference operations.
pub type Result<T> = std::result::Result<T, InferenceError>;
