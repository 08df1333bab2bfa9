//! Architecture configuration: assemble a network from a JSON file.
//!
//! Lets the layer stack be changed without touching code. A config is a
//! list of layer specs applied in order; the endpoint rules (input
//! first, output last) are still enforced by `Network::build`.
//!
//! # Example
//!
//! ```json
//! {
//!   "layers": [
//!     { "layer_type": "input", "shape": [1, 28, 28] },
//!     { "layer_type": "conv2d", "filters": 8, "kernel_size": 3, "padding": 1 },
//!     { "layer_type": "max_pooling", "pool": 2 },
//!     { "layer_type": "flatten" },
//!     { "layer_type": "dense", "units": 128, "activation": "relu" },
//!     { "layer_type": "output", "units": 10 }
//!   ]
//! }
//! ```

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::NetworkError;
use crate::layers::{
    ConvolutionalLayer, DenseLayer, FlattenLayer, InputLayer, MaxPoolingLayer, OutputLayer,
};
use crate::network::Network;
use crate::utils::Activation;

/// Configuration for a single layer of the chain.
///
/// Required fields per `layer_type`:
/// - **input**: `shape`
/// - **dense**: `units`, optional `activation` (default "sigmoid")
/// - **conv2d**: `filters`, `kernel_size`, optional `padding` (default 0),
///   `stride` (default 1), `activation` (default "relu")
/// - **max_pooling**: `pool`
/// - **flatten**: no fields
/// - **output**: `units`
#[derive(Debug, Clone, Deserialize)]
pub struct LayerSpec {
    /// One of "input", "dense", "conv2d", "max_pooling", "flatten", "output".
    pub layer_type: String,

    /// Per-sample shape for the input layer.
    pub shape: Option<Vec<usize>>,

    /// Unit count for dense and output layers.
    pub units: Option<usize>,

    /// Activation name for dense and conv2d layers.
    pub activation: Option<String>,

    /// Filter count for conv2d layers.
    pub filters: Option<usize>,

    /// Square kernel size for conv2d layers.
    pub kernel_size: Option<usize>,

    /// Zero padding for conv2d layers (default 0).
    pub padding: Option<isize>,

    /// Stride for conv2d layers (default 1).
    pub stride: Option<usize>,

    /// Window size for max pooling layers.
    pub pool: Option<usize>,
}

/// Whole-network architecture: layer specs in chain order.
#[derive(Debug, Clone, Deserialize)]
pub struct ArchitectureConfig {
    pub layers: Vec<LayerSpec>,
}

/// Load and validate an architecture config from a JSON file.
pub fn load_architecture<P: AsRef<Path>>(path: P) -> Result<ArchitectureConfig, NetworkError> {
    let contents = fs::read_to_string(path)?;
    let config: ArchitectureConfig = serde_json::from_str(&contents)?;
    validate_architecture(&config)?;
    Ok(config)
}

/// Assemble an unbuilt-then-built [`Network`] from a validated config.
pub fn build_network(config: &ArchitectureConfig, seed: u64) -> Result<Network, NetworkError> {
    validate_architecture(config)?;

    let mut network = Network::with_seed(seed);
    for spec in &config.layers {
        add_layer(&mut network, spec)?;
    }
    network.build()?;
    Ok(network)
}

fn add_layer(network: &mut Network, spec: &LayerSpec) -> Result<(), NetworkError> {
    match spec.layer_type.to_lowercase().as_str() {
        "input" => {
            let shape = spec
                .shape
                .clone()
                .ok_or_else(|| missing(&spec.layer_type, "shape"))?;
            network.add(InputLayer::new(shape))
        }
        "dense" => {
            let units = spec.units.ok_or_else(|| missing(&spec.layer_type, "units"))?;
            let activation = parse_activation(spec.activation.as_deref(), Activation::Sigmoid)?;
            network.add(DenseLayer::new(units, activation))
        }
        "conv2d" => {
            let filters = spec
                .filters
                .ok_or_else(|| missing(&spec.layer_type, "filters"))?;
            let kernel_size = spec
                .kernel_size
                .ok_or_else(|| missing(&spec.layer_type, "kernel_size"))?;
            let activation = parse_activation(spec.activation.as_deref(), Activation::Relu)?;
            network.add(ConvolutionalLayer::new(
                filters,
                kernel_size,
                spec.padding.unwrap_or(0),
                spec.stride.unwrap_or(1),
                activation,
            ))
        }
        "max_pooling" => {
            let pool = spec.pool.ok_or_else(|| missing(&spec.layer_type, "pool"))?;
            network.add(MaxPoolingLayer::new(pool))
        }
        "flatten" => network.add(FlattenLayer::new()),
        "output" => {
            let units = spec.units.ok_or_else(|| missing(&spec.layer_type, "units"))?;
            network.add(OutputLayer::new(units))
        }
        other => Err(NetworkError::ConfigInvalid(format!(
            "unknown layer type: {other}"
        ))),
    }
}

fn parse_activation(name: Option<&str>, default: Activation) -> Result<Activation, NetworkError> {
    match name {
        None => Ok(default),
        Some(name) => Activation::from_name(name).ok_or_else(|| {
            NetworkError::ConfigInvalid(format!(
                "unknown activation '{name}', expected sigmoid, relu or tanh"
            ))
        }),
    }
}

fn missing(layer_type: &str, field: &str) -> NetworkError {
    NetworkError::ConfigInvalid(format!("{layer_type} layer requires '{field}'"))
}

fn validate_architecture(config: &ArchitectureConfig) -> Result<(), NetworkError> {
    if config.layers.len() < 2 {
        return Err(NetworkError::ConfigInvalid(
            "architecture needs at least an input and an output layer".into(),
        ));
    }

    for (index, spec) in config.layers.iter().enumerate() {
        validate_layer(spec, index)?;
    }
    Ok(())
}

fn validate_layer(spec: &LayerSpec, index: usize) -> Result<(), NetworkError> {
    let fail = |message: String| Err(NetworkError::ConfigInvalid(message));

    match spec.layer_type.to_lowercase().as_str() {
        "input" => match &spec.shape {
            None => fail(format!("layer {index}: input layer requires 'shape'")),
            Some(shape) if shape.is_empty() || shape.iter().any(|&d| d == 0) => fail(format!(
                "layer {index}: input shape dims must all be greater than 0"
            )),
            Some(_) => Ok(()),
        },
        "dense" | "output" => match spec.units {
            None => fail(format!(
                "layer {index}: {} layer requires 'units'",
                spec.layer_type
            )),
            Some(0) => fail(format!("layer {index}: units must be greater than 0")),
            Some(_) => Ok(()),
        },
        "conv2d" => {
            if spec.filters.is_none() {
                return fail(format!("layer {index}: conv2d layer requires 'filters'"));
            }
            if spec.kernel_size.is_none() {
                return fail(format!(
                    "layer {index}: conv2d layer requires 'kernel_size'"
                ));
            }
            if spec.filters == Some(0) || spec.kernel_size == Some(0) {
                return fail(format!(
                    "layer {index}: filters and kernel_size must be greater than 0"
                ));
            }
            if spec.stride == Some(0) {
                return fail(format!("layer {index}: stride must be greater than 0"));
            }
            Ok(())
        }
        "max_pooling" => match spec.pool {
            None => fail(format!("layer {index}: max_pooling layer requires 'pool'")),
            Some(0) => fail(format!("layer {index}: pool must be greater than 0")),
            Some(_) => Ok(()),
        },
        "flatten" => Ok(()),
        other => fail(format!("layer {index}: unknown layer type: {other}")),
    }
}
