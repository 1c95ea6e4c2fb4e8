//! Fully connected (dense) layer used as the prediction head.

use crate::error::{GnnError, Result};
use crate::nn::activations::Activation;
use crate::nn::module::Module;
use ndarray::{Array1, Array2, ArrayD};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Fully connected layer computing `activation(x · W + b)`.
///
/// The layer name prefixes its parameter names (`"<name>.weights"`,
/// `"<name>.bias"`) so the output can be found by introspection.
#[derive(Debug, Clone, PartialEq)]
pub struct Linear {
    name: String,
    /// Weight matrix of shape `[in_features, units]`.
    weights: Array2<f32>,
    /// Bias of shape `[units]`.
    bias: Array1<f32>,
    activation: Activation,
}

impl Linear {
    /// Creates a layer with Glorot-uniform weights and zero bias.
    ///
    /// # Arguments
    ///
    /// * `name` - Layer name, used as parameter prefix.
    /// * `in_features` - Width of the incoming activations.
    /// * `units` - Number of outputs; must be positive.
    /// * `activation` - Output activation.
    /// * `seed` - Seed of the weight initializer.
    pub fn new(
        name: &str,
        in_features: usize,
        units: usize,
        activation: Activation,
        seed: u64,
    ) -> Result<Self> {
        if units == 0 {
            return Err(GnnError::InvalidConfig(format!(
                "layer '{}' needs at least one unit",
                name
            )));
        }
        let limit = (6.0 / (in_features + units) as f32).sqrt();
        let mut rng = StdRng::seed_from_u64(seed);
        let weights = Array2::random_using((in_features, units), Uniform::new(-limit, limit), &mut rng);
        let bias = Array1::zeros(units);
        Ok(Self {
            name: name.to_string(),
            weights,
            bias,
            activation,
        })
    }

    /// Creates a layer from explicit parameters.
    pub fn from_weights(
        name: &str,
        weights: Array2<f32>,
        bias: Array1<f32>,
        activation: Activation,
    ) -> Result<Self> {
        if weights.ncols() == 0 || bias.len() != weights.ncols() {
            return Err(GnnError::ShapeMismatch(format!(
                "layer '{}': weights {:?} do not match bias {:?}",
                name,
                weights.shape(),
                bias.shape()
            )));
        }
        Ok(Self {
            name: name.to_string(),
            weights,
            bias,
            activation,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn in_features(&self) -> usize {
        self.weights.nrows()
    }

    pub fn units(&self) -> usize {
        self.weights.ncols()
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn weights(&self) -> &Array2<f32> {
        &self.weights
    }

    pub fn bias(&self) -> &Array1<f32> {
        &self.bias
    }
}

impl Module for Linear {
    fn forward(&self, inputs: &Array2<f32>) -> Result<Array2<f32>> {
        if inputs.ncols() != self.in_features() {
            return Err(GnnError::ShapeMismatch(format!(
                "layer '{}' expects {} input features, got {}",
                self.name,
                self.in_features(),
                inputs.ncols()
            )));
        }
        let mut outputs = inputs.dot(&self.weights) + &self.bias;
        self.activation.apply_inplace(&mut outputs);
        Ok(outputs)
    }

    fn parameters(&self) -> Vec<(String, ArrayD<f32>)> {
        vec![
            (format!("{}.weights", self.name), self.weights.clone().into_dyn()),
            (format!("{}.bias", self.name), self.bias.clone().into_dyn()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    #[test]
    fn test_forward_linear() {
        let layer = Linear::from_weights(
            "logits",
            arr2(&[[1.0, 2.0], [3.0, 4.0]]),
            arr1(&[0.5, -0.5]),
            Activation::Linear,
        )
        .unwrap();
        let out = layer.forward(&arr2(&[[1.0, 1.0], [-1.0, 0.0]])).unwrap();
        assert_eq!(out, arr2(&[[4.5, 5.5], [-0.5, -2.5]]));
    }

    #[test]
    fn test_forward_relu() {
        let layer =
            Linear::from_weights("logits", arr2(&[[1.0], [3.0]]), arr1(&[0.0]), Activation::Relu)
                .unwrap();
        let out = layer.forward(&arr2(&[[1.0, 1.0], [-1.0, 0.0]])).unwrap();
        assert_eq!(out, arr2(&[[4.0], [0.0]]));
    }

    #[test]
    fn test_parameter_names() {
        let layer = Linear::new("logits", 4, 1, Activation::Linear, 0).unwrap();
        let names: Vec<String> = layer.parameters().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["logits.weights", "logits.bias"]);
        assert_eq!(layer.weights().dim(), (4, 1));
    }

    #[test]
    fn test_seeded_init_is_deterministic_and_bounded() {
        let a = Linear::new("logits", 8, 2, Activation::Linear, 42).unwrap();
        let b = Linear::new("logits", 8, 2, Activation::Linear, 42).unwrap();
        assert_eq!(a, b);
        let limit = (6.0f32 / 10.0).sqrt();
        assert!(a.weights().iter().all(|w| w.abs() <= limit));
    }

    #[test]
    fn test_shape_checks() {
        assert!(matches!(
            Linear::new("logits", 4, 0, Activation::Linear, 0),
            Err(GnnError::InvalidConfig(_))
        ));
        assert!(Linear::from_weights("logits", arr2(&[[1.0]]), arr1(&[0.0, 1.0]), Activation::Linear)
            .is_err());

        let layer = Linear::new("logits", 3, 1, Activation::Linear, 0).unwrap();
        assert!(matches!(
            layer.forward(&arr2(&[[1.0, 2.0]])),
            Err(GnnError::ShapeMismatch(_))
        ));
    }
}
