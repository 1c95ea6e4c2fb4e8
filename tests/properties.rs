//! Property tests for heads, gatherers and losses.

use ndarray::{Array1, Array2, ArrayD, IxDyn};
use proptest::prelude::*;
use rustygnn::graph::{Context, GraphTensor, NodeSet, HIDDEN_STATE};
use rustygnn::losses::{mean_absolute_logarithmic_error, Loss, MeanAbsoluteLogarithmicError};
use rustygnn::nn::{Activation, Linear, Module};
use rustygnn::tasks::Gatherer;

const IN_FEATURES: usize = 4;
const UNITS: usize = 3;
const BATCH: usize = 5;

fn graph_with_sizes(sizes: &[usize], dim: usize, values: &[f32]) -> GraphTensor {
    let total: usize = sizes.iter().sum();
    let states = Array2::from_shape_vec((total, dim), values[..total * dim].to_vec())
        .unwrap()
        .into_dyn();
    let nodes = NodeSet::from_fields(sizes.to_vec(), [(HIDDEN_STATE, states)]).unwrap();
    GraphTensor::from_pieces(Context::new(), [("nodes", nodes)]).unwrap()
}

proptest! {
    #[test]
    fn relu_head_never_emits_negative_logits(
        weights in prop::collection::vec(-10.0f32..10.0, IN_FEATURES * UNITS),
        bias in prop::collection::vec(-10.0f32..10.0, UNITS),
        inputs in prop::collection::vec(-100.0f32..100.0, BATCH * IN_FEATURES),
    ) {
        let head = Linear::from_weights(
            "logits",
            Array2::from_shape_vec((IN_FEATURES, UNITS), weights).unwrap(),
            Array1::from_vec(bias),
            Activation::Relu,
        ).unwrap();
        let inputs = Array2::from_shape_vec((BATCH, IN_FEATURES), inputs).unwrap();
        let logits = head.forward(&inputs).unwrap();
        prop_assert!(logits.iter().all(|&x| x >= 0.0));
    }

    #[test]
    fn seeded_relu_head_never_emits_negative_logits(
        seed in any::<u64>(),
        inputs in prop::collection::vec(-1.0e3f32..1.0e3, BATCH * IN_FEATURES),
    ) {
        let head = Linear::new("logits", IN_FEATURES, UNITS, Activation::Relu, seed).unwrap();
        let inputs = Array2::from_shape_vec((BATCH, IN_FEATURES), inputs).unwrap();
        prop_assert!(head.forward(&inputs).unwrap().iter().all(|&x| x >= 0.0));
    }

    #[test]
    fn male_of_identical_inputs_is_zero(values in prop::collection::vec(0.0f32..1.0e6, 1..32)) {
        let n = values.len();
        let y = ArrayD::from_shape_vec(IxDyn(&[n, 1]), values).unwrap();
        let per_example = mean_absolute_logarithmic_error(&y, &y).unwrap();
        prop_assert!(per_example.iter().all(|&v| v == 0.0));
        prop_assert_eq!(MeanAbsoluteLogarithmicError::new().compute(&y, &y).unwrap(), 0.0);
    }

    #[test]
    fn gatherers_return_one_row_per_component(
        sizes in prop::collection::vec(1usize..5, 1..6),
        dim in 1usize..4,
        values in prop::collection::vec(-10.0f32..10.0, 4 * 5 * 3),
    ) {
        let graph = graph_with_sizes(&sizes, dim, &values);
        for gatherer in [Gatherer::graph_context("nodes"), Gatherer::root_node("nodes")] {
            let activations = gatherer.gather_activations(&graph).unwrap();
            prop_assert_eq!(activations.dim(), (sizes.len(), dim));
        }
    }

    #[test]
    fn root_readout_equals_mean_pool_for_single_node_components(
        components in 1usize..8,
        values in prop::collection::vec(-10.0f32..10.0, 8 * 3),
    ) {
        let graph = graph_with_sizes(&vec![1; components], 3, &values);
        let root = Gatherer::root_node("nodes").gather_activations(&graph).unwrap();
        let pooled = Gatherer::graph_context("nodes").gather_activations(&graph).unwrap();
        prop_assert_eq!(root, pooled);
    }
}
