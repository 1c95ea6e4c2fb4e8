//! # Tasks
//!
//! A task connects a trained graph representation to a training objective.
//! An external trainer drives it in this order:
//!
//! 1. [`Task::preprocess`] splits the label off the raw graph input,
//! 2. [`Task::predict`] gathers activations and applies the prediction head,
//! 3. [`Task::losses`] and [`Task::metrics`] are evaluated on labels and predictions.

pub mod regression;

pub use regression::{Gatherer, LabelFn, LossSpec, RegressionTask, RegressionTaskBuilder, RegressionTaskConfig};

use crate::error::Result;
use crate::graph::{Field, GraphTensor};
use crate::losses::Loss;
use crate::metrics::Metric;
use crate::nn::Linear;
use ndarray::Array2;

/// Interface between a model and an external trainer.
pub trait Task: Send + Sync {
    /// Returns the (possibly transformed) input and its label.
    fn preprocess(&self, inputs: &GraphTensor) -> Result<(GraphTensor, Field)>;

    /// Computes the task's logits with `head`.
    fn predict(&self, inputs: &GraphTensor, head: &Linear) -> Result<Array2<f32>>;

    /// Losses to apply, in order; a trainer sums them.
    fn losses(&self) -> Vec<Box<dyn Loss>>;

    /// Fresh metric instances.
    fn metrics(&self) -> Vec<Box<dyn Metric>>;
}
