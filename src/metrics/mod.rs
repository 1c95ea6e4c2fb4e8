// --- File: src/metrics/mod.rs ---

//! Streaming metrics for evaluating regression models.
//!
//! A metric accumulates per-example values over any number of batches and
//! reports their mean.
//!
//! # Example
//!
//! ```rust,ignore
//! use rustygnn::metrics::{MeanSquaredError, Metric};
//!
//! let mut mse = MeanSquaredError::new();
//! mse.update(&labels, &predictions)?;
//! println!("{}: {:.4}", mse.name(), mse.compute());
//! mse.reset();
//! ```

pub mod regression;

pub use regression::{
    MeanAbsoluteError, MeanAbsolutePercentageError, MeanSquaredError,
    MeanSquaredLogarithmicError,
};

use crate::error::Result;
use ndarray::ArrayD;

/// Base trait for all metrics.
pub trait Metric: Send + Sync {
    /// Accumulates a batch of labels and predictions of identical shape.
    fn update(&mut self, y_true: &ArrayD<f32>, y_pred: &ArrayD<f32>) -> Result<()>;

    /// Current value of the metric; 0 before any update.
    fn compute(&self) -> f64;

    /// Clears the accumulated state.
    fn reset(&mut self);

    fn name(&self) -> &str;
}

/// The fixed battery reported by every regression task:
/// MSE, MAE, MSLE and MAPE, in that order.
pub fn regression_metrics() -> Vec<Box<dyn Metric>> {
    vec![
        Box::new(MeanSquaredError::new()),
        Box::new(MeanAbsoluteError::new()),
        Box::new(MeanSquaredLogarithmicError::new()),
        Box::new(MeanAbsolutePercentageError::new()),
    ]
}
