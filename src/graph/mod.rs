//! # Graph tensors
//!
//! A minimal in-memory `GraphTensor`: a context plus named node sets, each
//! holding dense features. Storage is always component-merged: a node set
//! keeps the number of nodes in every graph component (`sizes`) and its
//! features carry the total node count as their leading dimension.
//!
//! A *scalar* graph tensor (empty `shape`) with `C` components is how a batch
//! of `C` graphs reaches a task. `GraphTensor::stack` produces a rank-1 tensor
//! that tasks reject until `merge_batch_to_components` is called.

pub mod pooling;

use crate::error::{GnnError, Result};
use ndarray::{concatenate, ArrayD, ArrayView2, Axis, Ix2};
use std::collections::BTreeMap;

pub use pooling::{Pool, ReadoutFirstNode, ReduceOp, ReduceType};

/// Default name of the node state feature.
pub const HIDDEN_STATE: &str = "hidden_state";
/// Tag of the graph context, the target of context pooling.
pub const CONTEXT: &str = "context";

/// A named tensor-valued feature.
pub type Field = ArrayD<f32>;

/// Graph-level features, one row per component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    features: BTreeMap<String, Field>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a context from `(name, feature)` pairs.
    pub fn from_fields<S: Into<String>>(features: impl IntoIterator<Item = (S, Field)>) -> Self {
        Self {
            features: features.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn feature(&self, name: &str) -> Option<&Field> {
        self.features.get(name)
    }

    pub fn features(&self) -> &BTreeMap<String, Field> {
        &self.features
    }
}

/// A set of nodes split into graph components.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSet {
    sizes: Vec<usize>,
    features: BTreeMap<String, Field>,
}

impl NodeSet {
    /// Builds a node set, checking that every feature has one row per node.
    pub fn from_fields<S: Into<String>>(
        sizes: Vec<usize>,
        features: impl IntoIterator<Item = (S, Field)>,
    ) -> Result<Self> {
        let total: usize = sizes.iter().sum();
        let features: BTreeMap<String, Field> =
            features.into_iter().map(|(k, v)| (k.into(), v)).collect();
        for (name, feature) in &features {
            if feature.ndim() == 0 || feature.shape()[0] != total {
                return Err(GnnError::ShapeMismatch(format!(
                    "node feature '{}' has shape {:?}, expected leading dimension {}",
                    name,
                    feature.shape(),
                    total
                )));
            }
        }
        Ok(Self { sizes, features })
    }

    /// Number of nodes in each component.
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn num_components(&self) -> usize {
        self.sizes.len()
    }

    pub fn total_size(&self) -> usize {
        self.sizes.iter().sum()
    }

    /// Index of the first node of every component.
    pub fn row_offsets(&self) -> Vec<usize> {
        self.sizes
            .iter()
            .scan(0, |offset, &size| {
                let start = *offset;
                *offset += size;
                Some(start)
            })
            .collect()
    }

    pub fn feature(&self, name: &str) -> Option<&Field> {
        self.features.get(name)
    }

    pub fn features(&self) -> &BTreeMap<String, Field> {
        &self.features
    }
}

/// Graph-structured input of a task.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphTensor {
    shape: Vec<usize>,
    num_components: usize,
    context: Context,
    node_sets: BTreeMap<String, NodeSet>,
}

impl GraphTensor {
    /// Builds a scalar graph tensor.
    ///
    /// All node sets must agree on the number of components and every
    /// context feature must have one row per component.
    pub fn from_pieces<S: Into<String>>(
        context: Context,
        node_sets: impl IntoIterator<Item = (S, NodeSet)>,
    ) -> Result<Self> {
        let node_sets: BTreeMap<String, NodeSet> =
            node_sets.into_iter().map(|(k, v)| (k.into(), v)).collect();

        let num_components = match node_sets.values().next() {
            Some(node_set) => node_set.num_components(),
            None => context
                .features
                .values()
                .next()
                .and_then(|f| f.shape().first().copied())
                .unwrap_or(0),
        };

        for (name, node_set) in &node_sets {
            if node_set.num_components() != num_components {
                return Err(GnnError::ShapeMismatch(format!(
                    "node set '{}' has {} components, expected {}",
                    name,
                    node_set.num_components(),
                    num_components
                )));
            }
        }
        for (name, feature) in &context.features {
            if feature.ndim() == 0 || feature.shape()[0] != num_components {
                return Err(GnnError::ShapeMismatch(format!(
                    "context feature '{}' has shape {:?}, expected leading dimension {}",
                    name,
                    feature.shape(),
                    num_components
                )));
            }
        }

        Ok(Self {
            shape: Vec::new(),
            num_components,
            context,
            node_sets,
        })
    }

    /// Stacks scalar graph tensors into a rank-1 graph tensor of shape `[graphs.len()]`.
    pub fn stack(graphs: &[GraphTensor]) -> Result<Self> {
        let first = graphs
            .first()
            .ok_or_else(|| GnnError::ShapeMismatch("cannot stack zero graphs".to_string()))?;
        for graph in graphs {
            check_scalar_graph_tensor(graph, "GraphTensor::stack")?;
            if !graph.node_sets.keys().eq(first.node_sets.keys()) {
                return Err(GnnError::ShapeMismatch(format!(
                    "stacked graphs must have the same node sets, got {:?} and {:?}",
                    first.node_sets.keys().collect::<Vec<_>>(),
                    graph.node_sets.keys().collect::<Vec<_>>()
                )));
            }
        }

        let context = Context {
            features: concat_features(graphs.iter().map(|g| &g.context.features), CONTEXT)?,
        };

        let mut node_sets = BTreeMap::new();
        for name in first.node_sets.keys() {
            let pieces = graphs
                .iter()
                .map(|g| g.node_set(name))
                .collect::<Result<Vec<_>>>()?;
            let sizes = pieces.iter().flat_map(|p| p.sizes.iter().copied()).collect();
            let features = concat_features(pieces.iter().map(|p| &p.features), name)?;
            node_sets.insert(name.clone(), NodeSet { sizes, features });
        }

        Ok(Self {
            shape: vec![graphs.len()],
            num_components: graphs.iter().map(|g| g.num_components).sum(),
            context,
            node_sets,
        })
    }

    /// Returns the scalar graph tensor whose components are all the graphs of this batch.
    pub fn merge_batch_to_components(&self) -> Self {
        Self {
            shape: Vec::new(),
            ..self.clone()
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }

    pub fn num_components(&self) -> usize {
        self.num_components
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn node_sets(&self) -> &BTreeMap<String, NodeSet> {
        &self.node_sets
    }

    pub fn node_set(&self, name: &str) -> Result<&NodeSet> {
        self.node_sets
            .get(name)
            .ok_or_else(|| GnnError::NodeSetNotFound(name.to_string()))
    }

    /// Looks up `feature_name` on the node set `node_set_name`.
    pub fn node_feature(&self, node_set_name: &str, feature_name: &str) -> Result<&Field> {
        self.node_set(node_set_name)?
            .feature(feature_name)
            .ok_or_else(|| GnnError::FeatureNotFound {
                piece: node_set_name.to_string(),
                feature: feature_name.to_string(),
            })
    }

    /// Splits a context feature off the graph, e.g. to use it as a label.
    pub fn pop_context_feature(&self, name: &str) -> Result<(GraphTensor, Field)> {
        let mut graph = self.clone();
        let field = graph
            .context
            .features
            .remove(name)
            .ok_or_else(|| GnnError::FeatureNotFound {
                piece: CONTEXT.to_string(),
                feature: name.to_string(),
            })?;
        Ok((graph, field))
    }
}

/// Fails unless `graph` is scalar (its batch dimensions merged into components).
pub fn check_scalar_graph_tensor(graph: &GraphTensor, name: &str) -> Result<()> {
    if graph.is_scalar() {
        Ok(())
    } else {
        Err(GnnError::NotScalar {
            name: name.to_string(),
            rank: graph.rank(),
        })
    }
}

/// Views a node feature as a `[nodes, dim]` matrix.
pub(crate) fn feature_matrix<'a>(
    feature: &'a Field,
    node_set_name: &str,
    feature_name: &str,
) -> Result<ArrayView2<'a, f32>> {
    feature.view().into_dimensionality::<Ix2>().map_err(|_| {
        GnnError::ShapeMismatch(format!(
            "feature '{}' of node set '{}' must be rank 2, got shape {:?}",
            feature_name,
            node_set_name,
            feature.shape()
        ))
    })
}

fn concat_features<'a>(
    pieces: impl Iterator<Item = &'a BTreeMap<String, Field>>,
    piece_name: &str,
) -> Result<BTreeMap<String, Field>> {
    let pieces: Vec<_> = pieces.collect();
    let mut merged = BTreeMap::new();
    let Some(first) = pieces.first() else {
        return Ok(merged);
    };
    // Every piece must carry exactly the same features.
    for piece in &pieces[1..] {
        if let Some(name) = piece.keys().find(|k| !first.contains_key(*k)) {
            return Err(GnnError::FeatureNotFound {
                piece: piece_name.to_string(),
                feature: name.clone(),
            });
        }
    }
    for name in first.keys() {
        let views = pieces
            .iter()
            .map(|p| {
                p.get(name)
                    .map(|f| f.view())
                    .ok_or_else(|| GnnError::FeatureNotFound {
                        piece: piece_name.to_string(),
                        feature: name.clone(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        let feature = concatenate(Axis(0), &views).map_err(|e| {
            GnnError::ShapeMismatch(format!("feature '{}' of '{}': {}", name, piece_name, e))
        })?;
        merged.insert(name.clone(), feature);
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array1};

    fn graph(sizes: Vec<usize>) -> GraphTensor {
        let total: usize = sizes.iter().sum();
        let states = Array1::range(0.0, total as f32, 1.0)
            .into_shape_with_order((total, 1))
            .unwrap()
            .into_dyn();
        let nodes = NodeSet::from_fields(sizes, [(HIDDEN_STATE, states)]).unwrap();
        GraphTensor::from_pieces(Context::new(), [("nodes", nodes)]).unwrap()
    }

    #[test]
    fn test_row_offsets() {
        let g = graph(vec![2, 0, 3]);
        assert_eq!(g.node_set("nodes").unwrap().row_offsets(), vec![0, 2, 2]);
        assert_eq!(g.num_components(), 3);
    }

    #[test]
    fn test_node_feature_leading_dim_is_checked() {
        let states = arr2(&[[1.0f32], [2.0]]).into_dyn();
        let err = NodeSet::from_fields(vec![3], [(HIDDEN_STATE, states)]).unwrap_err();
        assert!(matches!(err, GnnError::ShapeMismatch(_)));
    }

    #[test]
    fn test_stack_and_merge() {
        let batched = GraphTensor::stack(&[graph(vec![2]), graph(vec![1, 1])]).unwrap();
        assert_eq!(batched.shape(), &[2]);
        assert!(check_scalar_graph_tensor(&batched, "test").is_err());

        let merged = batched.merge_batch_to_components();
        assert!(check_scalar_graph_tensor(&merged, "test").is_ok());
        assert_eq!(merged.num_components(), 3);
        assert_eq!(merged.node_set("nodes").unwrap().sizes(), &[2, 1, 1]);
        assert_eq!(merged.node_feature("nodes", HIDDEN_STATE).unwrap().shape(), &[4, 1]);
    }

    #[test]
    fn test_stack_rejects_mismatched_features() {
        let unlabeled = graph(vec![1]);
        let nodes = unlabeled.node_set("nodes").unwrap().clone();
        let labeled = GraphTensor::from_pieces(
            Context::from_fields([("label", arr2(&[[2.0f32]]).into_dyn())]),
            [("nodes", nodes.clone())],
        )
        .unwrap();

        for graphs in [
            [unlabeled.clone(), labeled.clone()],
            [labeled.clone(), unlabeled.clone()],
        ] {
            let err = GraphTensor::stack(&graphs).unwrap_err();
            assert!(
                matches!(err, GnnError::FeatureNotFound { ref piece, ref feature } if piece == CONTEXT && feature == "label")
            );
        }

        let renamed = GraphTensor::from_pieces(Context::new(), [("atoms", nodes)]).unwrap();
        assert!(matches!(
            GraphTensor::stack(&[unlabeled, renamed]),
            Err(GnnError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_pop_context_feature() {
        let label = arr2(&[[3.5f32]]).into_dyn();
        let nodes = NodeSet::from_fields(vec![1], [(HIDDEN_STATE, arr2(&[[1.0f32]]).into_dyn())])
            .unwrap();
        let g = GraphTensor::from_pieces(Context::from_fields([("label", label.clone())]), [("nodes", nodes)])
            .unwrap();

        let (rest, popped) = g.pop_context_feature("label").unwrap();
        assert_eq!(popped, label);
        assert!(rest.context().feature("label").is_none());
        assert!(matches!(
            rest.pop_context_feature("label"),
            Err(GnnError::FeatureNotFound { .. })
        ));
    }

    #[test]
    fn test_missing_node_set() {
        let g = graph(vec![1]);
        assert!(matches!(g.node_set("edges"), Err(GnnError::NodeSetNotFound(_))));
    }
}
