//! Shared utilities: random number generation and activation functions.

pub mod activations;
pub mod rng;

pub use activations::{softmax_rows, Activation};
pub use rng::SimpleRng;
