//! Activations applied by the prediction head.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Activation of a dense layer's output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// Identity.
    #[default]
    Linear,
    /// `max(0, x)`, used when predictions must be non-negative.
    Relu,
}

impl Activation {
    pub fn apply_inplace(&self, values: &mut Array2<f32>) {
        match self {
            Activation::Linear => {}
            Activation::Relu => values.mapv_inplace(relu),
        }
    }
}

/// `max(0, x)`; NaN stays NaN.
pub fn relu(x: f32) -> f32 {
    if x < 0.0 {
        0.0
    } else {
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_relu_activation() {
        let mut values = arr2(&[[-1.0f32, 0.0, 2.5]]);
        Activation::Relu.apply_inplace(&mut values);
        assert_eq!(values, arr2(&[[0.0, 0.0, 2.5]]));
        assert!(relu(f32::NAN).is_nan());
    }

    #[test]
    fn test_linear_activation_is_identity() {
        let mut values = arr2(&[[-1.0f32, 3.0]]);
        Activation::Linear.apply_inplace(&mut values);
        assert_eq!(values, arr2(&[[-1.0, 3.0]]));
    }
}
