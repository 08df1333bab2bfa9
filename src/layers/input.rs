//! Input layer: chain head that injects the external batch.

use crate::error::NetworkError;
use crate::layers::{Layer, LayerKind};
use crate::utils::SimpleRng;

/// Source layer holding the declared per-sample input shape.
///
/// Its forward pass just stores the external batch so the next layer can
/// read it; it has no weights and never receives a backward call.
#[derive(Debug)]
pub struct InputLayer {
    shape: Vec<usize>,
    output: Vec<f32>,
}

impl InputLayer {
    /// Create an input layer for samples of the given shape, e.g.
    /// `[784]` for flat vectors or `[1, 28, 28]` for image data.
    pub fn new(shape: Vec<usize>) -> Self {
        Self {
            shape,
            output: Vec::new(),
        }
    }

    /// Number of values in one sample.
    pub fn sample_size(&self) -> usize {
        self.shape.iter().product()
    }
}

impl Layer for InputLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Input
    }

    fn name(&self) -> &'static str {
        "input"
    }

    fn setup(
        &mut self,
        _index: usize,
        _input_shape: &[usize],
        _rng: &mut SimpleRng,
    ) -> Result<(), NetworkError> {
        // Never reached: the orchestrator skips setup for index 0.
        Ok(())
    }

    fn output_shape(&self) -> &[usize] {
        &self.shape
    }

    fn forward(&mut self, input: &[f32], batch_size: usize) {
        debug_assert_eq!(input.len(), batch_size * self.sample_size());
        self.output.clear();
        self.output.extend_from_slice(input);
    }

    fn backward(&mut self, _upstream: &[f32], _batch_size: usize) {
        // Never reached: backpropagation stops before the input layer.
    }

    fn output(&self) -> &[f32] {
        &self.output
    }

    fn gradient(&self) -> &[f32] {
        &[]
    }
}
