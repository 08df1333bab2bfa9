//! Error types for network construction, training and configuration.
//!
//! Structural problems (bad layer ordering, incompatible shapes) and state
//! problems (using the network before `build`) are reported through the
//! same [`NetworkError`] enum so callers can match on the exact failure.

use thiserror::Error;

/// Errors produced by the network orchestrator and the config loader.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The network was built with fewer than two layers.
    #[error("network needs at least two layers (input and output), found {0}")]
    TooFewLayers(usize),

    /// The first layer of the sequence is not an input layer.
    #[error("first layer must be an input layer, found {0}")]
    FirstLayerNotInput(&'static str),

    /// The last layer of the sequence is not an output layer.
    #[error("last layer must be an output layer, found {0}")]
    LastLayerNotOutput(&'static str),

    /// An input or output layer appears in the middle of the sequence.
    #[error("layer {index} ({name}) cannot appear in the middle of the network")]
    MisplacedLayer { index: usize, name: &'static str },

    /// A layer's setup rejected the shape produced by its predecessor.
    #[error("layer {index} ({name}) cannot accept input shape {shape:?}: {reason}")]
    IncompatibleShape {
        index: usize,
        name: &'static str,
        shape: Vec<usize>,
        reason: String,
    },

    /// `fit`, `predict` or `test` was called before `build`.
    #[error("network must be built before calling {0}")]
    NotBuilt(&'static str),

    /// `add` or `build` was called after the network was already built.
    #[error("network is already built")]
    AlreadyBuilt,

    /// A batch whose length is not a multiple of the expected sample size.
    #[error("batch of {len} values is not a whole number of samples of size {sample_size}")]
    RaggedBatch { len: usize, sample_size: usize },

    /// A hyperparameter or dataset argument outside its valid range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Architecture config file could not be read.
    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),

    /// Architecture config file is not valid JSON.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// Architecture config is well-formed JSON but semantically invalid.
    #[error("invalid architecture config: {0}")]
    ConfigInvalid(String),
}
