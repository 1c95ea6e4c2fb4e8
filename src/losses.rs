// --- File: src/losses.rs ---

//! Regression loss functions.
//!
//! Every loss maps `(y_true, y_pred)` of identical shape `[batch, d0, .., dN]`
//! to per-example values of shape `[batch, d0, .., dN-1]` (the last axis is
//! averaged away). Values are computed in `f64`. The `Loss` trait adds a
//! `Reduction` on top so a trainer can get a single scalar.
//!
//! # Available losses
//!
//! - [`MeanAbsoluteError`]: `mean(|t - p|)`
//! - [`MeanAbsolutePercentageError`]: `100 * mean(|t - p| / max(|t|, eps))`
//! - [`MeanSquaredError`]: `mean((t - p)^2)`
//! - [`MeanSquaredLogarithmicError`]: `mean((ln(max(p, eps) + 1) - ln(max(t, eps) + 1))^2)`
//! - [`MeanSquaredLogScaledError`]: `MSE(t, relu(p)) + alpha * mean_all((ln(relu(p) + eps) - ln(t + eps))^2)`
//! - [`MeanAbsoluteLogarithmicError`]: `mean(|log1p(p) - log1p(t)|)`

use crate::error::{GnnError, Result};
use ndarray::{ArrayD, Axis, Zip};
use serde::{Deserialize, Serialize};

/// Fuzz factor used by MAPE and MSLE.
pub const EPSILON: f64 = 1e-7;

/// Default weight of the log term of [`MeanSquaredLogScaledError`].
pub const DEFAULT_ALPHA_LOSS_PARAM: f64 = 5.0;
/// Default offset inside the logarithms of [`MeanSquaredLogScaledError`].
pub const DEFAULT_EPSILON_LOSS_PARAM: f64 = 1e-8;

/// How per-example losses are combined into one scalar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    /// Same as `SumOverBatchSize`.
    #[default]
    Auto,
    /// Mean over all per-example values.
    SumOverBatchSize,
    /// Sum over all per-example values.
    Sum,
}

impl Reduction {
    pub fn reduce(&self, values: &ArrayD<f64>) -> f64 {
        match self {
            Reduction::Sum => values.sum(),
            Reduction::Auto | Reduction::SumOverBatchSize => {
                if values.is_empty() {
                    0.0
                } else {
                    values.sum() / values.len() as f64
                }
            }
        }
    }
}

/// Serializable description of a loss instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossConfig {
    pub name: String,
    pub reduction: Reduction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha_loss_param: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epsilon_loss_param: Option<f64>,
}

/// A stateless loss callable.
pub trait Loss: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    fn reduction(&self) -> Reduction;

    /// Per-example loss values.
    fn call(&self, y_true: &ArrayD<f32>, y_pred: &ArrayD<f32>) -> Result<ArrayD<f64>>;

    /// Reduced loss value.
    fn compute(&self, y_true: &ArrayD<f32>, y_pred: &ArrayD<f32>) -> Result<f64> {
        let values = self.call(y_true, y_pred)?;
        Ok(self.reduction().reduce(&values))
    }

    fn config(&self) -> LossConfig {
        LossConfig {
            name: self.name().to_string(),
            reduction: self.reduction(),
            alpha_loss_param: None,
            epsilon_loss_param: None,
        }
    }
}

// ============================================================================
// Per-example functions
// ============================================================================

/// Checks shapes and promotes both tensors to `f64`.
fn promote(y_true: &ArrayD<f32>, y_pred: &ArrayD<f32>) -> Result<(ArrayD<f64>, ArrayD<f64>)> {
    if y_true.shape() != y_pred.shape() {
        return Err(GnnError::ShapeMismatch(format!(
            "y_true has shape {:?} but y_pred has shape {:?}",
            y_true.shape(),
            y_pred.shape()
        )));
    }
    if y_true.ndim() == 0 || y_true.shape()[y_true.ndim() - 1] == 0 {
        return Err(GnnError::ShapeMismatch(format!(
            "cannot reduce the last axis of shape {:?}",
            y_true.shape()
        )));
    }
    Ok((y_true.mapv(f64::from), y_pred.mapv(f64::from)))
}

fn mean_last_axis(values: ArrayD<f64>) -> Result<ArrayD<f64>> {
    let axis = Axis(values.ndim() - 1);
    values
        .mean_axis(axis)
        .ok_or_else(|| GnnError::ShapeMismatch("cannot average an empty axis".to_string()))
}

fn elementwise(
    y_true: &ArrayD<f32>,
    y_pred: &ArrayD<f32>,
    f: impl Fn(f64, f64) -> f64,
) -> Result<ArrayD<f64>> {
    let (y_true, y_pred) = promote(y_true, y_pred)?;
    let values = Zip::from(&y_true).and(&y_pred).map_collect(|&t, &p| f(t, p));
    mean_last_axis(values)
}

/// Per-example mean absolute error.
pub fn mean_absolute_error(y_true: &ArrayD<f32>, y_pred: &ArrayD<f32>) -> Result<ArrayD<f64>> {
    elementwise(y_true, y_pred, |t, p| (t - p).abs())
}

/// Per-example mean absolute percentage error, in percent.
pub fn mean_absolute_percentage_error(
    y_true: &ArrayD<f32>,
    y_pred: &ArrayD<f32>,
) -> Result<ArrayD<f64>> {
    elementwise(y_true, y_pred, |t, p| 100.0 * ((t - p) / t.abs().max(EPSILON)).abs())
}

/// Per-example mean squared error.
pub fn mean_squared_error(y_true: &ArrayD<f32>, y_pred: &ArrayD<f32>) -> Result<ArrayD<f64>> {
    elementwise(y_true, y_pred, |t, p| (t - p).powi(2))
}

/// Per-example mean squared logarithmic error.
pub fn mean_squared_logarithmic_error(
    y_true: &ArrayD<f32>,
    y_pred: &ArrayD<f32>,
) -> Result<ArrayD<f64>> {
    elementwise(y_true, y_pred, |t, p| {
        ((p.max(EPSILON) + 1.0).ln() - (t.max(EPSILON) + 1.0).ln()).powi(2)
    })
}

/// Per-example mean absolute logarithmic error.
///
/// Only defined for `y_true, y_pred > -1`; outside that domain the result is
/// whatever `ln_1p` yields.
pub fn mean_absolute_logarithmic_error(
    y_true: &ArrayD<f32>,
    y_pred: &ArrayD<f32>,
) -> Result<ArrayD<f64>> {
    elementwise(y_true, y_pred, |t, p| (p.ln_1p() - t.ln_1p()).abs())
}

/// Fails if any value is NaN or infinite.
fn check_numerics<'a>(values: impl IntoIterator<Item = &'a f64>, tensor: &str) -> Result<()> {
    if values.into_iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        log::warn!("numeric check failed for '{}'", tensor);
        Err(GnnError::NumericCheck {
            tensor: tensor.to_string(),
        })
    }
}

// ============================================================================
// Loss objects
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct MeanAbsoluteError {
    reduction: Reduction,
}

impl MeanAbsoluteError {
    pub fn new() -> Self {
        Self {
            reduction: Reduction::Auto,
        }
    }
}

impl Default for MeanAbsoluteError {
    fn default() -> Self {
        Self::new()
    }
}

impl Loss for MeanAbsoluteError {
    fn name(&self) -> &str {
        "mean_absolute_error"
    }

    fn reduction(&self) -> Reduction {
        self.reduction
    }

    fn call(&self, y_true: &ArrayD<f32>, y_pred: &ArrayD<f32>) -> Result<ArrayD<f64>> {
        mean_absolute_error(y_true, y_pred)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeanAbsolutePercentageError {
    reduction: Reduction,
}

impl MeanAbsolutePercentageError {
    pub fn new() -> Self {
        Self {
            reduction: Reduction::Auto,
        }
    }
}

impl Default for MeanAbsolutePercentageError {
    fn default() -> Self {
        Self::new()
    }
}

impl Loss for MeanAbsolutePercentageError {
    fn name(&self) -> &str {
        "mean_absolute_percentage_error"
    }

    fn reduction(&self) -> Reduction {
        self.reduction
    }

    fn call(&self, y_true: &ArrayD<f32>, y_pred: &ArrayD<f32>) -> Result<ArrayD<f64>> {
        mean_absolute_percentage_error(y_true, y_pred)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeanSquaredError {
    reduction: Reduction,
}

impl MeanSquaredError {
    pub fn new() -> Self {
        Self {
            reduction: Reduction::Auto,
        }
    }
}

impl Default for MeanSquaredError {
    fn default() -> Self {
        Self::new()
    }
}

impl Loss for MeanSquaredError {
    fn name(&self) -> &str {
        "mean_squared_error"
    }

    fn reduction(&self) -> Reduction {
        self.reduction
    }

    fn call(&self, y_true: &ArrayD<f32>, y_pred: &ArrayD<f32>) -> Result<ArrayD<f64>> {
        mean_squared_error(y_true, y_pred)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeanSquaredLogarithmicError {
    reduction: Reduction,
}

impl MeanSquaredLogarithmicError {
    pub fn new() -> Self {
        Self {
            reduction: Reduction::Auto,
        }
    }
}

impl Default for MeanSquaredLogarithmicError {
    fn default() -> Self {
        Self::new()
    }
}

impl Loss for MeanSquaredLogarithmicError {
    fn name(&self) -> &str {
        "mean_squared_logarithmic_error"
    }

    fn reduction(&self) -> Reduction {
        self.reduction
    }

    fn call(&self, y_true: &ArrayD<f32>, y_pred: &ArrayD<f32>) -> Result<ArrayD<f64>> {
        mean_squared_logarithmic_error(y_true, y_pred)
    }
}

/// Hyperparameters of [`MeanSquaredLogScaledError`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LossParams {
    /// Weight of the log term.
    pub alpha_loss_param: f64,
    /// Offset that keeps `ln(0)` out of the log term.
    pub epsilon_loss_param: f64,
}

impl Default for LossParams {
    fn default() -> Self {
        Self {
            alpha_loss_param: DEFAULT_ALPHA_LOSS_PARAM,
            epsilon_loss_param: DEFAULT_EPSILON_LOSS_PARAM,
        }
    }
}

/// Squared error plus a weighted squared log error, for non-negative targets.
///
/// Predictions go through ReLU first. Both terms are checked: a NaN or
/// infinite term is an error, never a silently propagated value.
///
/// Inputs are `f32` and only promoted to `f64` here, so a target of
/// `-epsilon` rounds before the shift. With the default `epsilon` of 1e-8,
/// `-1e-8f32` lands just above `-epsilon` and yields a large finite loss
/// rather than an error. Targets clearly below `-epsilon` always fail.
#[derive(Debug, Clone, PartialEq)]
pub struct MeanSquaredLogScaledError {
    params: LossParams,
    reduction: Reduction,
    name: String,
}

impl MeanSquaredLogScaledError {
    pub fn new(params: LossParams) -> Self {
        Self {
            params,
            reduction: Reduction::Auto,
            name: "mean_squared_log_scaled_error".to_string(),
        }
    }

    pub fn with_reduction(mut self, reduction: Reduction) -> Self {
        self.reduction = reduction;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn params(&self) -> LossParams {
        self.params
    }
}

impl Loss for MeanSquaredLogScaledError {
    fn name(&self) -> &str {
        &self.name
    }

    fn reduction(&self) -> Reduction {
        self.reduction
    }

    fn call(&self, y_true: &ArrayD<f32>, y_pred: &ArrayD<f32>) -> Result<ArrayD<f64>> {
        let (y_true, y_pred) = promote(y_true, y_pred)?;
        let y_pred = y_pred.mapv(|p| if p < 0.0 { 0.0 } else { p });
        let eps = self.params.epsilon_loss_param;

        let squared = Zip::from(&y_true)
            .and(&y_pred)
            .map_collect(|&t, &p| (t - p).powi(2));
        let mse = mean_last_axis(squared)?;

        let log_squared = Zip::from(&y_true)
            .and(&y_pred)
            .map_collect(|&t, &p| ((p + eps).ln() - (t + eps).ln()).powi(2));
        let msle = log_squared.mean().unwrap_or(0.0);

        check_numerics(mse.iter(), "mse")?;
        check_numerics([msle].iter(), "msle")?;

        let alpha = self.params.alpha_loss_param;
        Ok(mse.mapv(|m| m + alpha * msle))
    }

    fn config(&self) -> LossConfig {
        LossConfig {
            name: self.name.clone(),
            reduction: self.reduction,
            alpha_loss_param: Some(self.params.alpha_loss_param),
            epsilon_loss_param: Some(self.params.epsilon_loss_param),
        }
    }
}

/// Mean absolute error between `log1p` of predictions and targets.
#[derive(Debug, Clone, PartialEq)]
pub struct MeanAbsoluteLogarithmicError {
    reduction: Reduction,
    name: String,
}

impl MeanAbsoluteLogarithmicError {
    pub fn new() -> Self {
        Self {
            reduction: Reduction::Auto,
            name: "mean_absolute_logarithmic_error".to_string(),
        }
    }

    pub fn with_reduction(mut self, reduction: Reduction) -> Self {
        self.reduction = reduction;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }
}

impl Default for MeanAbsoluteLogarithmicError {
    fn default() -> Self {
        Self::new()
    }
}

impl Loss for MeanAbsoluteLogarithmicError {
    fn name(&self) -> &str {
        &self.name
    }

    fn reduction(&self) -> Reduction {
        self.reduction
    }

    fn call(&self, y_true: &ArrayD<f32>, y_pred: &ArrayD<f32>) -> Result<ArrayD<f64>> {
        mean_absolute_logarithmic_error(y_true, y_pred)
    }
}
