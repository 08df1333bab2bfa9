//! Flatten layer: reshapes `[C, H, W]` (or any rank) feature maps into
//! flat vectors. Structural; forward and backward are plain copies since
//! the underlying buffers are already flat and row-major.

use crate::error::NetworkError;
use crate::layers::{Layer, LayerKind};
use crate::utils::SimpleRng;

/// Shape-only layer collapsing a multi-dimensional sample to rank 1.
#[derive(Debug)]
pub struct FlattenLayer {
    output_shape: Vec<usize>,
    output: Vec<f32>,
    gradient: Vec<f32>,
}

impl FlattenLayer {
    pub fn new() -> Self {
        Self {
            output_shape: Vec::new(),
            output: Vec::new(),
            gradient: Vec::new(),
        }
    }
}

impl Default for FlattenLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Layer for FlattenLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Structural
    }

    fn name(&self) -> &'static str {
        "flatten"
    }

    fn setup(
        &mut self,
        index: usize,
        input_shape: &[usize],
        _rng: &mut SimpleRng,
    ) -> Result<(), NetworkError> {
        if input_shape.is_empty() {
            return Err(NetworkError::IncompatibleShape {
                index,
                name: self.name(),
                shape: input_shape.to_vec(),
                reason: "cannot flatten an empty shape".into(),
            });
        }
        self.output_shape = vec![input_shape.iter().product()];
        Ok(())
    }

    fn output_shape(&self) -> &[usize] {
        &self.output_shape
    }

    fn forward(&mut self, input: &[f32], _batch_size: usize) {
        self.output.clear();
        self.output.extend_from_slice(input);
    }

    fn backward(&mut self, upstream: &[f32], _batch_size: usize) {
        self.gradient.clear();
        self.gradient.extend_from_slice(upstream);
    }

    fn output(&self) -> &[f32] {
        &self.output
    }

    fn gradient(&self) -> &[f32] {
        &self.gradient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_collapses_shape() {
        let mut rng = SimpleRng::new(42);
        let mut layer = FlattenLayer::new();
        layer.setup(2, &[4, 7, 7], &mut rng).unwrap();
        assert_eq!(layer.output_shape(), &[196]);
    }

    #[test]
    fn test_flatten_forward_and_backward_are_copies() {
        let mut rng = SimpleRng::new(42);
        let mut layer = FlattenLayer::new();
        layer.setup(2, &[1, 2, 2], &mut rng).unwrap();

        let data = vec![1.0f32, 2.0, 3.0, 4.0];
        layer.forward(&data, 1);
        assert_eq!(layer.output(), data.as_slice());

        let grad = vec![0.5f32, -0.5, 0.25, 0.0];
        layer.backward(&grad, 1);
        assert_eq!(layer.gradient(), grad.as_slice());
    }

    #[test]
    fn test_flatten_is_structural() {
        let layer = FlattenLayer::new();
        assert_eq!(layer.kind(), LayerKind::Structural);
        assert!(!layer.trainable());
        assert_eq!(layer.parameter_count(), 0);
    }
}
