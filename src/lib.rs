//! Multilayer perceptron training engine
//!
//! A minimal feed-forward/convolutional network library built around an
//! ordered chain of layers. The `Network` orchestrator validates and
//! links the chain at build time, then drives three passes per training
//! step: forward (inference), backward (gradients) and update (SGD).
//!
//! # Modules
//!
//! - `layers`: the `Layer` trait and the concrete layer kinds
//! - `network`: the orchestrator (build, fit, predict, test)
//! - `data`: paired datasets and the minibatch generator
//! - `architecture`: JSON architecture configs
//! - `error`: the `NetworkError` type
//! - `utils`: RNG and activation functions

pub mod architecture;
pub mod data;
pub mod error;
pub mod layers;
pub mod network;
pub mod utils;

pub use data::Dataset;
pub use error::NetworkError;
pub use network::{Network, StopHandle};
