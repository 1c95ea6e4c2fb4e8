//! Regression tasks.
//!
//! A [`RegressionTask`] is composed of exactly one [`Gatherer`] (how node
//! states become one row per graph) and one [`LossSpec`] (what the trainer
//! minimises), plus logic shared by all combinations: scalar-input
//! validation, the `"logits"` head and the fixed metric battery.
//!
//! ```rust,ignore
//! use rustygnn::tasks::{RegressionTask, Task};
//!
//! let task = RegressionTask::root_node_mean_squared_error("papers", |graph| {
//!     graph.pop_context_feature("citations")
//! })?;
//! let (graph, labels) = task.preprocess(&raw)?;
//! let head = task.build_head(128, 0)?;
//! let logits = task.predict(&graph, &head)?;
//! ```

use super::Task;
use crate::error::{GnnError, Result};
use crate::graph::{
    check_scalar_graph_tensor, Field, GraphTensor, Pool, ReadoutFirstNode, ReduceType, CONTEXT,
    HIDDEN_STATE,
};
use crate::losses::{self, Loss, LossParams, Reduction};
use crate::metrics::{regression_metrics, Metric};
use crate::nn::{Activation, Linear, Module};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Name of the prediction head.
pub const LOGITS: &str = "logits";

/// Maps raw graph input to the model input and its label.
pub type LabelFn = Arc<dyn Fn(&GraphTensor) -> Result<(GraphTensor, Field)> + Send + Sync>;

fn default_state_name() -> String {
    HIDDEN_STATE.to_string()
}

fn default_units() -> usize {
    1
}

/// Strategy turning a scalar graph into a `[num_components, dim]` activation matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Gatherer {
    /// Pools a node set's state into the context.
    GraphContext {
        node_set_name: String,
        #[serde(default = "default_state_name")]
        state_name: String,
        #[serde(default)]
        reduce_type: ReduceType,
    },
    /// Reads the state of the first node of every component.
    RootNode {
        node_set_name: String,
        #[serde(default = "default_state_name")]
        state_name: String,
    },
}

impl Gatherer {
    /// Mean-pools `hidden_state` of `node_set_name` into the context.
    pub fn graph_context(node_set_name: &str) -> Self {
        Gatherer::GraphContext {
            node_set_name: node_set_name.to_string(),
            state_name: default_state_name(),
            reduce_type: ReduceType::default(),
        }
    }

    /// Reads `hidden_state` of the first node of `node_set_name`.
    pub fn root_node(node_set_name: &str) -> Self {
        Gatherer::RootNode {
            node_set_name: node_set_name.to_string(),
            state_name: default_state_name(),
        }
    }

    pub fn with_state_name(self, state_name: &str) -> Self {
        match self {
            Gatherer::GraphContext {
                node_set_name,
                reduce_type,
                ..
            } => Gatherer::GraphContext {
                node_set_name,
                state_name: state_name.to_string(),
                reduce_type,
            },
            Gatherer::RootNode { node_set_name, .. } => Gatherer::RootNode {
                node_set_name,
                state_name: state_name.to_string(),
            },
        }
    }

    /// Sets the pooling reduction. Only valid for graph-context gathering.
    pub fn with_reduce_type(self, reduce_type: ReduceType) -> Result<Self> {
        match self {
            Gatherer::GraphContext {
                node_set_name,
                state_name,
                ..
            } => Ok(Gatherer::GraphContext {
                node_set_name,
                state_name,
                reduce_type,
            }),
            Gatherer::RootNode { .. } => Err(GnnError::InvalidConfig(
                "reduce_type only applies to graph-context gathering".to_string(),
            )),
        }
    }

    pub fn node_set_name(&self) -> &str {
        match self {
            Gatherer::GraphContext { node_set_name, .. } | Gatherer::RootNode { node_set_name, .. } => {
                node_set_name
            }
        }
    }

    pub fn state_name(&self) -> &str {
        match self {
            Gatherer::GraphContext { state_name, .. } | Gatherer::RootNode { state_name, .. } => {
                state_name
            }
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Gatherer::GraphContext { .. } => "Graph",
            Gatherer::RootNode { .. } => "RootNode",
        }
    }

    pub fn gather_activations(&self, inputs: &GraphTensor) -> Result<Array2<f32>> {
        match self {
            Gatherer::GraphContext {
                node_set_name,
                state_name,
                reduce_type,
            } => Pool::new(CONTEXT, reduce_type.clone(), node_set_name, state_name)?.forward(inputs),
            Gatherer::RootNode {
                node_set_name,
                state_name,
            } => ReadoutFirstNode::new(node_set_name, state_name).forward(inputs),
        }
    }
}

/// The loss a regression task hands to the trainer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LossSpec {
    MeanAbsoluteError,
    MeanAbsolutePercentageError,
    MeanSquaredError,
    MeanSquaredLogarithmicError,
    MeanSquaredLogScaledError {
        #[serde(default)]
        params: LossParams,
        #[serde(default)]
        reduction: Reduction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// Needs non-negative predictions, so tasks using it get a ReLU head.
    MeanAbsoluteLogarithmicError {
        #[serde(default)]
        reduction: Reduction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

impl LossSpec {
    pub fn mean_squared_log_scaled_error(params: LossParams) -> Self {
        LossSpec::MeanSquaredLogScaledError {
            params,
            reduction: Reduction::Auto,
            name: None,
        }
    }

    pub fn mean_absolute_logarithmic_error() -> Self {
        LossSpec::MeanAbsoluteLogarithmicError {
            reduction: Reduction::Auto,
            name: None,
        }
    }

    /// Instantiates the loss callables.
    pub fn losses(&self) -> Vec<Box<dyn Loss>> {
        let loss: Box<dyn Loss> = match self {
            LossSpec::MeanAbsoluteError => Box::new(losses::MeanAbsoluteError::new()),
            LossSpec::MeanAbsolutePercentageError => {
                Box::new(losses::MeanAbsolutePercentageError::new())
            }
            LossSpec::MeanSquaredError => Box::new(losses::MeanSquaredError::new()),
            LossSpec::MeanSquaredLogarithmicError => {
                Box::new(losses::MeanSquaredLogarithmicError::new())
            }
            LossSpec::MeanSquaredLogScaledError {
                params,
                reduction,
                name,
            } => {
                let loss = losses::MeanSquaredLogScaledError::new(*params).with_reduction(*reduction);
                match name {
                    Some(name) => Box::new(loss.with_name(name)),
                    None => Box::new(loss),
                }
            }
            LossSpec::MeanAbsoluteLogarithmicError { reduction, name } => {
                let loss = losses::MeanAbsoluteLogarithmicError::new().with_reduction(*reduction);
                match name {
                    Some(name) => Box::new(loss.with_name(name)),
                    None => Box::new(loss),
                }
            }
        };
        vec![loss]
    }

    pub fn requires_nonnegative_predictions(&self) -> bool {
        matches!(self, LossSpec::MeanAbsoluteLogarithmicError { .. })
    }

    fn kind_name(&self) -> &'static str {
        match self {
            LossSpec::MeanAbsoluteError => "MeanAbsoluteError",
            LossSpec::MeanAbsolutePercentageError => "MeanAbsolutePercentageError",
            LossSpec::MeanSquaredError => "MeanSquaredError",
            LossSpec::MeanSquaredLogarithmicError => "MeanSquaredLogarithmicError",
            LossSpec::MeanSquaredLogScaledError { .. } => "MeanSquaredLogScaledError",
            LossSpec::MeanAbsoluteLogarithmicError { .. } => "MeanAbsoluteLogarithmicError",
        }
    }

    fn validate(&self) -> Result<()> {
        if let LossSpec::MeanSquaredLogScaledError { params, .. } = self {
            if !params.alpha_loss_param.is_finite() || !params.epsilon_loss_param.is_finite() {
                return Err(GnnError::InvalidConfig(format!(
                    "loss parameters must be finite, got {:?}",
                    params
                )));
            }
        }
        Ok(())
    }
}

/// Serializable part of a regression task (everything but the label function).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTaskConfig {
    #[serde(default = "default_units")]
    pub units: usize,
    pub gatherer: Gatherer,
    pub loss: LossSpec,
}

impl RegressionTaskConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Regression task: gatherer + loss + shared head and metrics.
#[derive(Clone)]
pub struct RegressionTask {
    config: RegressionTaskConfig,
    label_fn: LabelFn,
}

impl fmt::Debug for RegressionTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegressionTask")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RegressionTask {
    pub fn builder() -> RegressionTaskBuilder {
        RegressionTaskBuilder::default()
    }

    fn compose<F>(gatherer: Gatherer, loss: LossSpec, label_fn: F) -> Result<Self>
    where
        F: Fn(&GraphTensor) -> Result<(GraphTensor, Field)> + Send + Sync + 'static,
    {
        Self::builder()
            .gatherer(gatherer)
            .loss(loss)
            .label_fn(label_fn)
            .build()
    }

    pub fn graph_mean_absolute_error<F>(node_set_name: &str, label_fn: F) -> Result<Self>
    where
        F: Fn(&GraphTensor) -> Result<(GraphTensor, Field)> + Send + Sync + 'static,
    {
        Self::compose(Gatherer::graph_context(node_set_name), LossSpec::MeanAbsoluteError, label_fn)
    }

    pub fn graph_mean_absolute_percentage_error<F>(node_set_name: &str, label_fn: F) -> Result<Self>
    where
        F: Fn(&GraphTensor) -> Result<(GraphTensor, Field)> + Send + Sync + 'static,
    {
        Self::compose(
            Gatherer::graph_context(node_set_name),
            LossSpec::MeanAbsolutePercentageError,
            label_fn,
        )
    }

    pub fn graph_mean_squared_error<F>(node_set_name: &str, label_fn: F) -> Result<Self>
    where
        F: Fn(&GraphTensor) -> Result<(GraphTensor, Field)> + Send + Sync + 'static,
    {
        Self::compose(Gatherer::graph_context(node_set_name), LossSpec::MeanSquaredError, label_fn)
    }

    pub fn graph_mean_squared_logarithmic_error<F>(node_set_name: &str, label_fn: F) -> Result<Self>
    where
        F: Fn(&GraphTensor) -> Result<(GraphTensor, Field)> + Send + Sync + 'static,
    {
        Self::compose(
            Gatherer::graph_context(node_set_name),
            LossSpec::MeanSquaredLogarithmicError,
            label_fn,
        )
    }

    pub fn graph_mean_squared_log_scaled_error<F>(
        node_set_name: &str,
        params: LossParams,
        label_fn: F,
    ) -> Result<Self>
    where
        F: Fn(&GraphTensor) -> Result<(GraphTensor, Field)> + Send + Sync + 'static,
    {
        Self::compose(
            Gatherer::graph_context(node_set_name),
            LossSpec::mean_squared_log_scaled_error(params),
            label_fn,
        )
    }

    pub fn root_node_mean_absolute_error<F>(node_set_name: &str, label_fn: F) -> Result<Self>
    where
        F: Fn(&GraphTensor) -> Result<(GraphTensor, Field)> + Send + Sync + 'static,
    {
        Self::compose(Gatherer::root_node(node_set_name), LossSpec::MeanAbsoluteError, label_fn)
    }

    pub fn root_node_mean_absolute_percentage_error<F>(
        node_set_name: &str,
        label_fn: F,
    ) -> Result<Self>
    where
        F: Fn(&GraphTensor) -> Result<(GraphTensor, Field)> + Send + Sync + 'static,
    {
        Self::compose(
            Gatherer::root_node(node_set_name),
            LossSpec::MeanAbsolutePercentageError,
            label_fn,
        )
    }

    pub fn root_node_mean_squared_error<F>(node_set_name: &str, label_fn: F) -> Result<Self>
    where
        F: Fn(&GraphTensor) -> Result<(GraphTensor, Field)> + Send + Sync + 'static,
    {
        Self::compose(Gatherer::root_node(node_set_name), LossSpec::MeanSquaredError, label_fn)
    }

    pub fn root_node_mean_squared_logarithmic_error<F>(
        node_set_name: &str,
        label_fn: F,
    ) -> Result<Self>
    where
        F: Fn(&GraphTensor) -> Result<(GraphTensor, Field)> + Send + Sync + 'static,
    {
        Self::compose(
            Gatherer::root_node(node_set_name),
            LossSpec::MeanSquaredLogarithmicError,
            label_fn,
        )
    }

    pub fn root_node_mean_squared_log_scaled_error<F>(
        node_set_name: &str,
        params: LossParams,
        label_fn: F,
    ) -> Result<Self>
    where
        F: Fn(&GraphTensor) -> Result<(GraphTensor, Field)> + Send + Sync + 'static,
    {
        Self::compose(
            Gatherer::root_node(node_set_name),
            LossSpec::mean_squared_log_scaled_error(params),
            label_fn,
        )
    }

    /// Root-node task for non-negative targets; its head uses ReLU.
    pub fn root_node_mean_absolute_logarithmic_error<F>(
        node_set_name: &str,
        label_fn: F,
    ) -> Result<Self>
    where
        F: Fn(&GraphTensor) -> Result<(GraphTensor, Field)> + Send + Sync + 'static,
    {
        Self::compose(
            Gatherer::root_node(node_set_name),
            LossSpec::mean_absolute_logarithmic_error(),
            label_fn,
        )
    }

    /// Task name, e.g. `"RootNodeMeanSquaredError"`.
    pub fn name(&self) -> String {
        format!(
            "{}{}",
            self.config.gatherer.kind_name(),
            self.config.loss.kind_name()
        )
    }

    pub fn config(&self) -> &RegressionTaskConfig {
        &self.config
    }

    pub fn units(&self) -> usize {
        self.config.units
    }

    pub fn gatherer(&self) -> &Gatherer {
        &self.config.gatherer
    }

    pub fn loss_spec(&self) -> &LossSpec {
        &self.config.loss
    }

    pub fn head_activation(&self) -> Activation {
        if self.config.loss.requires_nonnegative_predictions() {
            Activation::Relu
        } else {
            Activation::Linear
        }
    }

    /// Creates the `"logits"` head for activations of width `in_features`.
    pub fn build_head(&self, in_features: usize, seed: u64) -> Result<Linear> {
        Linear::new(LOGITS, in_features, self.config.units, self.head_activation(), seed)
    }

    /// Validates that `inputs` is scalar, then gathers its activations.
    pub fn gather_activations(&self, inputs: &GraphTensor) -> Result<Array2<f32>> {
        check_scalar_graph_tensor(inputs, &self.name())?;
        self.config.gatherer.gather_activations(inputs)
    }
}

impl Task for RegressionTask {
    fn preprocess(&self, inputs: &GraphTensor) -> Result<(GraphTensor, Field)> {
        (self.label_fn)(inputs)
    }

    fn predict(&self, inputs: &GraphTensor, head: &Linear) -> Result<Array2<f32>> {
        let activations = self.gather_activations(inputs)?;
        if head.units() != self.config.units || head.activation() != self.head_activation() {
            return Err(GnnError::InvalidConfig(format!(
                "{} expects a head with {} unit(s) and {:?} activation, got {} unit(s) and {:?}",
                self.name(),
                self.config.units,
                self.head_activation(),
                head.units(),
                head.activation()
            )));
        }
        log::trace!(
            "{}: predicting {} component(s) from {} feature(s)",
            self.name(),
            activations.nrows(),
            activations.ncols()
        );
        head.forward(&activations)
    }

    fn losses(&self) -> Vec<Box<dyn Loss>> {
        self.config.loss.losses()
    }

    fn metrics(&self) -> Vec<Box<dyn Metric>> {
        regression_metrics()
    }
}

/// Builder validating that a regression task is complete.
#[derive(Default)]
pub struct RegressionTaskBuilder {
    units: Option<usize>,
    gatherer: Option<Gatherer>,
    loss: Option<LossSpec>,
    label_fn: Option<LabelFn>,
}

impl RegressionTaskBuilder {
    /// Copies units, gatherer and loss from a config.
    pub fn config(mut self, config: RegressionTaskConfig) -> Self {
        self.units = Some(config.units);
        self.gatherer = Some(config.gatherer);
        self.loss = Some(config.loss);
        self
    }

    pub fn units(mut self, units: usize) -> Self {
        self.units = Some(units);
        self
    }

    pub fn gatherer(mut self, gatherer: Gatherer) -> Self {
        self.gatherer = Some(gatherer);
        self
    }

    pub fn loss(mut self, loss: LossSpec) -> Self {
        self.loss = Some(loss);
        self
    }

    pub fn label_fn<F>(mut self, label_fn: F) -> Self
    where
        F: Fn(&GraphTensor) -> Result<(GraphTensor, Field)> + Send + Sync + 'static,
    {
        self.label_fn = Some(Arc::new(label_fn));
        self
    }

    pub fn shared_label_fn(mut self, label_fn: LabelFn) -> Self {
        self.label_fn = Some(label_fn);
        self
    }

    pub fn build(self) -> Result<RegressionTask> {
        let label_fn = self.label_fn.ok_or(GnnError::MissingLabelFn)?;
        let gatherer = self.gatherer.ok_or_else(|| {
            GnnError::InvalidConfig("a regression task needs an activation gatherer".to_string())
        })?;
        let loss = self
            .loss
            .ok_or_else(|| GnnError::InvalidConfig("a regression task needs a loss".to_string()))?;
        let units = self.units.unwrap_or_else(default_units);
        if units == 0 {
            return Err(GnnError::InvalidConfig(
                "a regression task needs at least one unit".to_string(),
            ));
        }
        loss.validate()?;

        let task = RegressionTask {
            config: RegressionTaskConfig {
                units,
                gatherer,
                loss,
            },
            label_fn,
        };
        log::debug!(
            "built {} on node set '{}' with {} unit(s)",
            task.name(),
            task.gatherer().node_set_name(),
            units
        );
        Ok(task)
    }
}
