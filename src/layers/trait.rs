//! Layer trait definition for the network chain.
//!
//! Every node of the chain implements [`Layer`]. Roles are explicit
//! through [`LayerKind`], and the orchestrator dispatches on the role
//! rather than on the concrete layer type: the input layer receives the
//! external batch, the output layer receives the target batch, and only
//! trainable layers participate in the update pass.

use crate::error::NetworkError;
use crate::utils::SimpleRng;

/// Role of a layer inside the chain.
///
/// The role decides where a layer may appear: `Input` only at index 0,
/// `Output` only at the last index, the other two anywhere in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// Chain head; injects the external input batch.
    Input,
    /// Chain tail; computes loss and accuracy against a target.
    Output,
    /// Interior layer holding trainable weights.
    Parametric,
    /// Interior layer that only reshapes or reduces data, no weights.
    Structural,
}

impl LayerKind {
    /// Whether the role is allowed at an interior position.
    pub fn is_interior(self) -> bool {
        matches!(self, LayerKind::Parametric | LayerKind::Structural)
    }
}

/// A node in the linear computation chain.
///
/// The `Network` owns all layers in a single `Vec` and links neighbours
/// by index, so layers never hold references to each other. Data moves
/// between neighbours through the stored `output` (forward) and
/// `gradient` (backward) buffers, both flat row-major `f32` slices in
/// batch-major order and both overwritten on every pass.
pub trait Layer: std::fmt::Debug {
    /// Role of this layer; fixed for the layer's lifetime.
    fn kind(&self) -> LayerKind;

    /// Human-readable layer name used in error messages.
    fn name(&self) -> &'static str;

    /// One-time shape-dependent setup, called during `Network::build`
    /// with the previous layer's per-sample output shape. Trainable
    /// layers allocate and initialize their weights here.
    ///
    /// Never called for the layer at index 0 (there is no previous
    /// shape to derive from).
    fn setup(
        &mut self,
        index: usize,
        input_shape: &[usize],
        rng: &mut SimpleRng,
    ) -> Result<(), NetworkError>;

    /// Per-sample output shape. Valid once `setup` has run (the input
    /// layer knows its shape from construction).
    fn output_shape(&self) -> &[usize];

    /// Forward pass. `input` is the external batch for the input layer
    /// and the previous layer's stored output for everything else.
    /// Stores this layer's output; no other side effect.
    fn forward(&mut self, input: &[f32], batch_size: usize);

    /// Backward pass. `upstream` is the target batch for the output
    /// layer and the next layer's stored gradient for interior layers.
    /// Stores this layer's gradient with respect to its own input.
    ///
    /// Never called for the input layer (propagation stops before it).
    fn backward(&mut self, upstream: &[f32], batch_size: usize);

    /// Adjust weights from the gradient of the most recent backward
    /// pass. Only invoked by the orchestrator when `trainable()` is
    /// true; layers without weights leave the default empty body.
    fn update_weights(&mut self, learning_rate: f32) {
        let _ = learning_rate;
    }

    /// Whether this layer participates in the update pass.
    fn trainable(&self) -> bool {
        false
    }

    /// Output stored by the most recent forward pass.
    fn output(&self) -> &[f32];

    /// Gradient (with respect to this layer's input) stored by the most
    /// recent backward pass; read by the previous layer.
    fn gradient(&self) -> &[f32];

    /// Number of trainable parameters (0 for structural layers).
    fn parameter_count(&self) -> usize {
        0
    }

    /// Loss of the stored output against a target batch. `Some` only
    /// for the output layer; pure, no mutation.
    fn calculate_loss(&self, target: &[f32]) -> Option<f32> {
        let _ = target;
        None
    }

    /// Accuracy of the stored output against a target batch. `Some`
    /// only for the output layer; pure, no mutation.
    fn calculate_accuracy(&self, target: &[f32]) -> Option<f32> {
        let _ = target;
        None
    }
}
