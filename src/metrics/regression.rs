// --- File: src/metrics/regression.rs ---

//! Metrics for regression tasks.
//!
//! Each metric is the running mean of the matching per-example loss in
//! [`crate::losses`], so a metric and a loss of the same name agree.

use super::Metric;
use crate::error::Result;
use crate::losses;
use ndarray::ArrayD;

/// Mean Squared Error (MSE).
///
/// MSE = (1/n) * Σ(y_pred - y_true)²
#[derive(Debug, Clone, Default)]
pub struct MeanSquaredError {
    total: f64,
    count: usize,
}

impl MeanSquaredError {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Metric for MeanSquaredError {
    fn update(&mut self, y_true: &ArrayD<f32>, y_pred: &ArrayD<f32>) -> Result<()> {
        let values = losses::mean_squared_error(y_true, y_pred)?;
        self.total += values.sum();
        self.count += values.len();
        Ok(())
    }

    fn compute(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }

    fn reset(&mut self) {
        self.total = 0.0;
        self.count = 0;
    }

    fn name(&self) -> &str {
        "mean_squared_error"
    }
}

/// Mean Absolute Error (MAE).
///
/// MAE = (1/n) * Σ|y_pred - y_true|
#[derive(Debug, Clone, Default)]
pub struct MeanAbsoluteError {
    total: f64,
    count: usize,
}

impl MeanAbsoluteError {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Metric for MeanAbsoluteError {
    fn update(&mut self, y_true: &ArrayD<f32>, y_pred: &ArrayD<f32>) -> Result<()> {
        let values = losses::mean_absolute_error(y_true, y_pred)?;
        self.total += values.sum();
        self.count += values.len();
        Ok(())
    }

    fn compute(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }

    fn reset(&mut self) {
        self.total = 0.0;
        self.count = 0;
    }

    fn name(&self) -> &str {
        "mean_absolute_error"
    }
}

/// Mean Squared Logarithmic Error (MSLE).
///
/// MSLE = (1/n) * Σ(ln(y_pred + 1) - ln(y_true + 1))², with values clipped at a small epsilon
#[derive(Debug, Clone, Default)]
pub struct MeanSquaredLogarithmicError {
    total: f64,
    count: usize,
}

impl MeanSquaredLogarithmicError {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Metric for MeanSquaredLogarithmicError {
    fn update(&mut self, y_true: &ArrayD<f32>, y_pred: &ArrayD<f32>) -> Result<()> {
        let values = losses::mean_squared_logarithmic_error(y_true, y_pred)?;
        self.total += values.sum();
        self.count += values.len();
        Ok(())
    }

    fn compute(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }

    fn reset(&mut self) {
        self.total = 0.0;
        self.count = 0;
    }

    fn name(&self) -> &str {
        "mean_squared_logarithmic_error"
    }
}

/// Mean Absolute Percentage Error (MAPE).
///
/// MAPE = (1/n) * Σ|((y_true - y_pred) / max(|y_true|, eps))| * 100
#[derive(Debug, Clone, Default)]
pub struct MeanAbsolutePercentageError {
    total: f64,
    count: usize,
}

impl MeanAbsolutePercentageError {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Metric for MeanAbsolutePercentageError {
    fn update(&mut self, y_true: &ArrayD<f32>, y_pred: &ArrayD<f32>) -> Result<()> {
        let values = losses::mean_absolute_percentage_error(y_true, y_pred)?;
        self.total += values.sum();
        self.count += values.len();
        Ok(())
    }

    fn compute(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }

    fn reset(&mut self) {
        self.total = 0.0;
        self.count = 0;
    }

    fn name(&self) -> &str {
        "mean_absolute_percentage_error"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::regression_metrics;

    fn column(values: Vec<f32>) -> ArrayD<f32> {
        let n = values.len();
        ArrayD::from_shape_vec(ndarray::IxDyn(&[n, 1]), values).unwrap()
    }

    #[test]
    fn test_mse() {
        let mut mse = MeanSquaredError::new();
        let targets = column(vec![1.0, 2.0, 3.0, 4.0]);
        mse.update(&targets, &targets).unwrap();
        assert!((mse.compute() - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_mae_accumulates_over_batches() {
        let mut mae = MeanAbsoluteError::new();
        mae.update(&column(vec![2.0, 3.0]), &column(vec![1.0, 2.0])).unwrap();
        mae.update(&column(vec![4.0, 5.0]), &column(vec![1.0, 2.0])).unwrap();
        // |1| + |1| + |3| + |3| over 4 examples
        assert!((mae.compute() - 2.0).abs() < 1e-6);

        mae.reset();
        assert_eq!(mae.compute(), 0.0);
    }

    #[test]
    fn test_mape() {
        let mut mape = MeanAbsolutePercentageError::new();
        mape.update(&column(vec![2.0, 4.0]), &column(vec![1.0, 5.0])).unwrap();
        assert!((mape.compute() - 37.5).abs() < 1e-4);
    }

    #[test]
    fn test_msle_zero_on_identical() {
        let mut msle = MeanSquaredLogarithmicError::new();
        let targets = column(vec![0.0, 1.0, 100.0]);
        msle.update(&targets, &targets).unwrap();
        assert_eq!(msle.compute(), 0.0);
    }

    #[test]
    fn test_update_rejects_mismatched_shapes() {
        let mut mse = MeanSquaredError::new();
        assert!(mse.update(&column(vec![1.0]), &column(vec![1.0, 2.0])).is_err());
    }

    #[test]
    fn test_regression_battery() {
        let names: Vec<String> = regression_metrics()
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "mean_squared_error",
                "mean_absolute_error",
                "mean_squared_logarithmic_error",
                "mean_absolute_percentage_error",
            ]
        );
    }
}
