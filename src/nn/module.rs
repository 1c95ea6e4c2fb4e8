//! Module defining the core `Module` trait for dense layers.

use crate::error::Result;
use ndarray::{Array2, ArrayD};

/// Common interface of layers applied to dense `[batch, features]` activations.
pub trait Module {
    /// Runs the forward pass on `inputs`.
    fn forward(&self, inputs: &Array2<f32>) -> Result<Array2<f32>>;

    /// Returns the trainable parameters as `(name, value)` pairs.
    ///
    /// Names are prefixed with the layer name, e.g. `"logits.weights"`.
    fn parameters(&self) -> Vec<(String, ArrayD<f32>)>;
}
