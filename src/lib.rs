//! # rustygnn: Regression Tasks for Graph Neural Networks
//!
//! **rustygnn** connects a trained graph representation to a regression
//! objective. A task gathers one activation row per graph, projects it with a
//! `"logits"` head and hands losses and metrics to an external trainer.
//!
//! ## Usage Example
//!
//! ```no_run
//! use ndarray::{arr2, Array2};
//! use rustygnn::graph::{Context, GraphTensor, NodeSet, HIDDEN_STATE};
//! use rustygnn::tasks::{RegressionTask, Task};
//!
//! # fn main() -> rustygnn::Result<()> {
//! // 1. Two graphs with 2 and 1 nodes, a label per graph in the context.
//! let nodes = NodeSet::from_fields(
//!     vec![2, 1],
//!     [(HIDDEN_STATE, arr2(&[[0.5f32, 1.0], [1.5, 0.0], [2.0, 2.0]]).into_dyn())],
//! )?;
//! let context = Context::from_fields([("label", arr2(&[[1.0f32], [3.0]]).into_dyn())]);
//! let raw = GraphTensor::from_pieces(context, [("atoms", nodes)])?;
//!
//! // 2. Mean-pool atom states and regress with mean squared error.
//! let task = RegressionTask::graph_mean_squared_error("atoms", |graph| {
//!     graph.pop_context_feature("label")
//! })?;
//!
//! // 3. What a trainer does each step.
//! let (graph, labels) = task.preprocess(&raw)?;
//! let head = task.build_head(2, 0)?;
//! let logits: Array2<f32> = task.predict(&graph, &head)?;
//! let loss = task.losses()[0].compute(&labels, &logits.into_dyn())?;
//! # let _ = loss;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod graph;
pub mod losses;
pub mod metrics;
pub mod nn;
pub mod strategies;
pub mod tasks;

pub use error::{GnnError, Result};
