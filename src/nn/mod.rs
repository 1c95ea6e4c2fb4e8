//! # Neural Network Layers Module
//!
//! Dense building blocks used by task heads.
//!
//! ## Available Layers
//!
//! - [`Linear`]: Fully connected / dense layer with an output [`Activation`]
//!
//! ## Example
//!
//! ```ignore
//! use rustygnn::nn::{Activation, Linear, Module};
//!
//! let head = Linear::new("logits", 128, 1, Activation::Linear, 0)?;
//! let logits = head.forward(&activations)?;
//! ```

pub mod activations;
pub mod linear;
pub mod module;

pub use activations::{relu, Activation};
pub use linear::Linear;
pub use module::Module;
