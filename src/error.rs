//! Crate-wide error type.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GnnError>;

/// Errors raised while validating graphs, building tasks or evaluating losses.
#[derive(Error, Debug)]
pub enum GnnError {
    #[error("{name}: expected a scalar GraphTensor, got rank {rank}. Call merge_batch_to_components() first.")]
    NotScalar { name: String, rank: usize },

    #[error("Regression task requires a label function")]
    MissingLabelFn,

    #[error("Numeric check failed for '{tensor}': tensor contains NaN or Inf")]
    NumericCheck { tensor: String },

    #[error("Node set '{0}' not found in GraphTensor")]
    NodeSetNotFound(String),

    #[error("Feature '{feature}' not found in '{piece}'")]
    FeatureNotFound { piece: String, feature: String },

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Unknown reduce type '{0}'")]
    InvalidReduceType(String),

    #[error("Component {component} of node set '{node_set}' has no nodes to read out")]
    EmptyComponent { node_set: String, component: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
