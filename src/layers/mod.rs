//! Layer abstractions and concrete layer kinds.
//!
//! `trait.rs` defines the capability contract; the other modules provide
//! the concrete layers an ordered chain is assembled from.

mod r#trait;
pub mod conv2d;
pub mod dense;
pub mod flatten;
pub mod input;
pub mod maxpool;
pub mod output;

pub use conv2d::ConvolutionalLayer;
pub use dense::DenseLayer;
pub use flatten::FlattenLayer;
pub use input::InputLayer;
pub use maxpool::MaxPoolingLayer;
pub use output::OutputLayer;
pub use r#trait::{Layer, LayerKind};
