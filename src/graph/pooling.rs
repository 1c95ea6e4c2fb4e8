//! Readout layers that turn node states into one row per graph component.

use super::{check_scalar_graph_tensor, feature_matrix, GraphTensor, CONTEXT};
use crate::error::{GnnError, Result};
use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single reduction over the nodes of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Mean,
    /// Empty components yield `-inf`.
    Max,
    /// Empty components yield `+inf`.
    Min,
    /// Like `Max`, with infinities replaced by 0.
    MaxNoInf,
    /// Like `Min`, with infinities replaced by 0.
    MinNoInf,
}

impl ReduceOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReduceOp::Sum => "sum",
            ReduceOp::Mean => "mean",
            ReduceOp::Max => "max",
            ReduceOp::Min => "min",
            ReduceOp::MaxNoInf => "max_no_inf",
            ReduceOp::MinNoInf => "min_no_inf",
        }
    }

    /// Reduces `rows` (`[nodes, dim]`) to a `[dim]` vector.
    pub fn reduce(&self, rows: ArrayView2<f32>) -> Array1<f32> {
        let n = rows.nrows();
        match self {
            ReduceOp::Sum => rows.sum_axis(Axis(0)),
            ReduceOp::Mean => {
                if n == 0 {
                    Array1::zeros(rows.ncols())
                } else {
                    rows.sum_axis(Axis(0)) / n as f32
                }
            }
            ReduceOp::Max => rows.fold_axis(Axis(0), f32::NEG_INFINITY, |&acc, &x| acc.max(x)),
            ReduceOp::Min => rows.fold_axis(Axis(0), f32::INFINITY, |&acc, &x| acc.min(x)),
            ReduceOp::MaxNoInf => ReduceOp::Max.reduce(rows).mapv(zero_if_infinite),
            ReduceOp::MinNoInf => ReduceOp::Min.reduce(rows).mapv(zero_if_infinite),
        }
    }
}

fn zero_if_infinite(x: f32) -> f32 {
    if x.is_infinite() {
        0.0
    } else {
        x
    }
}

impl FromStr for ReduceOp {
    type Err = GnnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "sum" => Ok(ReduceOp::Sum),
            "mean" => Ok(ReduceOp::Mean),
            "max" => Ok(ReduceOp::Max),
            "min" => Ok(ReduceOp::Min),
            "max_no_inf" => Ok(ReduceOp::MaxNoInf),
            "min_no_inf" => Ok(ReduceOp::MinNoInf),
            other => Err(GnnError::InvalidReduceType(other.to_string())),
        }
    }
}

/// One or more reductions joined with `|`, e.g. `"mean"` or `"sum|max"`.
///
/// Multiple reductions are concatenated along the feature axis in the order given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReduceType(Vec<ReduceOp>);

impl ReduceType {
    pub fn ops(&self) -> &[ReduceOp] {
        &self.0
    }
}

impl Default for ReduceType {
    fn default() -> Self {
        ReduceType(vec![ReduceOp::Mean])
    }
}

impl From<ReduceOp> for ReduceType {
    fn from(op: ReduceOp) -> Self {
        ReduceType(vec![op])
    }
}

impl FromStr for ReduceType {
    type Err = GnnError;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Err(GnnError::InvalidReduceType(s.to_string()));
        }
        let ops = s.split('|').map(str::parse).collect::<Result<Vec<_>>>()?;
        Ok(ReduceType(ops))
    }
}

impl TryFrom<String> for ReduceType {
    type Error = GnnError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ReduceType> for String {
    fn from(value: ReduceType) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ReduceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(ReduceOp::as_str).collect();
        write!(f, "{}", names.join("|"))
    }
}

/// Pools a node feature into the graph context.
///
/// Output shape: `[num_components, k * dim]` for `k` reductions.
#[derive(Debug, Clone, PartialEq)]
pub struct Pool {
    reduce_type: ReduceType,
    node_set_name: String,
    feature_name: String,
}

impl Pool {
    /// Creates a pooling layer. Only the context is supported as receiver `tag`.
    pub fn new(
        tag: &str,
        reduce_type: ReduceType,
        node_set_name: &str,
        feature_name: &str,
    ) -> Result<Self> {
        if tag != CONTEXT {
            return Err(GnnError::InvalidConfig(format!(
                "pooling to '{}' is not supported, only to '{}'",
                tag, CONTEXT
            )));
        }
        Ok(Self {
            reduce_type,
            node_set_name: node_set_name.to_string(),
            feature_name: feature_name.to_string(),
        })
    }

    pub fn forward(&self, graph: &GraphTensor) -> Result<Array2<f32>> {
        check_scalar_graph_tensor(graph, "Pool")?;
        let node_set = graph.node_set(&self.node_set_name)?;
        let feature = graph.node_feature(&self.node_set_name, &self.feature_name)?;
        let values = feature_matrix(feature, &self.node_set_name, &self.feature_name)?;

        let dim = values.ncols();
        let ops = self.reduce_type.ops();
        let mut pooled = Array2::zeros((node_set.num_components(), dim * ops.len()));

        for (component, (&start, &size)) in node_set
            .row_offsets()
            .iter()
            .zip(node_set.sizes())
            .enumerate()
        {
            let rows = values.slice(s![start..start + size, ..]);
            for (k, op) in ops.iter().enumerate() {
                pooled
                    .slice_mut(s![component, k * dim..(k + 1) * dim])
                    .assign(&op.reduce(rows));
            }
        }
        Ok(pooled)
    }
}

/// Reads the feature of the first node of every component.
///
/// Output shape: `[num_components, dim]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadoutFirstNode {
    node_set_name: String,
    feature_name: String,
}

impl ReadoutFirstNode {
    pub fn new(node_set_name: &str, feature_name: &str) -> Self {
        Self {
            node_set_name: node_set_name.to_string(),
            feature_name: feature_name.to_string(),
        }
    }

    pub fn forward(&self, graph: &GraphTensor) -> Result<Array2<f32>> {
        check_scalar_graph_tensor(graph, "ReadoutFirstNode")?;
        let node_set = graph.node_set(&self.node_set_name)?;
        let feature = graph.node_feature(&self.node_set_name, &self.feature_name)?;
        let values = feature_matrix(feature, &self.node_set_name, &self.feature_name)?;

        if let Some(component) = node_set.sizes().iter().position(|&size| size == 0) {
            return Err(GnnError::EmptyComponent {
                node_set: self.node_set_name.clone(),
                component,
            });
        }
        Ok(values.select(Axis(0), &node_set.row_offsets()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Context, NodeSet, HIDDEN_STATE};
    use ndarray::arr2;

    fn graph() -> GraphTensor {
        // Component 0: nodes 0..2, component 1: empty, component 2: nodes 2..5.
        let states = arr2(&[
            [1.0f32, -1.0],
            [3.0, -3.0],
            [2.0, 0.0],
            [4.0, 1.0],
            [6.0, 2.0],
        ])
        .into_dyn();
        let nodes = NodeSet::from_fields(vec![2, 0, 3], [(HIDDEN_STATE, states)]).unwrap();
        GraphTensor::from_pieces(Context::new(), [("nodes", nodes)]).unwrap()
    }

    #[test]
    fn test_reduce_type_parsing() {
        assert_eq!("mean".parse::<ReduceType>().unwrap(), ReduceType::default());
        let rt: ReduceType = "sum|max_no_inf".parse().unwrap();
        assert_eq!(rt.ops(), &[ReduceOp::Sum, ReduceOp::MaxNoInf]);
        assert_eq!(rt.to_string(), "sum|max_no_inf");
        assert!(matches!("avg".parse::<ReduceType>(), Err(GnnError::InvalidReduceType(_))));
        assert!("".parse::<ReduceType>().is_err());
    }

    #[test]
    fn test_mean_pool() {
        let pool = Pool::new(CONTEXT, ReduceType::default(), "nodes", HIDDEN_STATE).unwrap();
        let pooled = pool.forward(&graph()).unwrap();
        assert_eq!(pooled, arr2(&[[2.0, -2.0], [0.0, 0.0], [4.0, 1.0]]));
    }

    #[test]
    fn test_max_pool_and_no_inf() {
        let max = Pool::new(CONTEXT, ReduceOp::Max.into(), "nodes", HIDDEN_STATE).unwrap();
        let pooled = max.forward(&graph()).unwrap();
        assert_eq!(pooled[[0, 0]], 3.0);
        assert_eq!(pooled[[1, 0]], f32::NEG_INFINITY);

        let no_inf = Pool::new(CONTEXT, ReduceOp::MaxNoInf.into(), "nodes", HIDDEN_STATE).unwrap();
        assert_eq!(no_inf.forward(&graph()).unwrap()[[1, 1]], 0.0);
    }

    #[test]
    fn test_concatenated_reduce_types() {
        let pool = Pool::new(CONTEXT, "sum|min".parse().unwrap(), "nodes", HIDDEN_STATE).unwrap();
        let pooled = pool.forward(&graph()).unwrap();
        assert_eq!(pooled.dim(), (3, 4));
        assert_eq!(pooled.row(2).to_vec(), vec![12.0, 3.0, 2.0, 0.0]);
    }

    #[test]
    fn test_pool_only_to_context() {
        assert!(matches!(
            Pool::new("nodes", ReduceType::default(), "nodes", HIDDEN_STATE),
            Err(GnnError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_readout_first_node_rejects_empty_component() {
        let readout = ReadoutFirstNode::new("nodes", HIDDEN_STATE);
        assert!(matches!(
            readout.forward(&graph()),
            Err(GnnError::EmptyComponent { component: 1, .. })
        ));
    }

    #[test]
    fn test_readout_first_node() {
        let states = arr2(&[[1.0f32], [2.0], [3.0]]).into_dyn();
        let nodes = NodeSet::from_fields(vec![2, 1], [(HIDDEN_STATE, states)]).unwrap();
        let g = GraphTensor::from_pieces(Context::new(), [("nodes", nodes)]).unwrap();
        let readout = ReadoutFirstNode::new("nodes", HIDDEN_STATE);
        assert_eq!(readout.forward(&g).unwrap(), arr2(&[[1.0], [3.0]]));
    }
}
