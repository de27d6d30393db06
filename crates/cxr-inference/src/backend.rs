//! Inference backend trait.

use ndarray::ArrayD;

use crate::Result;

/// Trait for ONNX inference backends.
///
/// Abstracts over the runtime so the pipeline can bind tensors by the
/// model's declared names without knowing which engine executes them.
/// Implementations must be shareable across requests.
pub trait InferenceBackend: Send + Sync {
    /// Run inference with the given named f32 inputs.
    ///
    /// Returns the model's named f32 output tensors in declaration order.
    fn run(&self, inputs: &[(&str, ArrayD<f32>)]) -> Result<Vec<(String, ArrayD<f32>)>>;

    /// Input names declared by the model.
    fn input_names(&self) -> &[String];

    /// Output names declared by the model.
    fn output_names(&self) -> &[String];
}
