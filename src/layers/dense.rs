//! Dense (fully connected) layer.
//!
//! Performs `y = act(x W + b)` over batch-major flat buffers. Weights are
//! allocated during `setup` once the previous layer's output shape is
//! known, using Xavier initialization.

use crate::error::NetworkError;
use crate::layers::{Layer, LayerKind};
use crate::utils::{Activation, SimpleRng};

/// Xavier/Glorot uniform initialization over a flat weight buffer.
pub(crate) fn xavier_init(weights: &mut [f32], fan_in: usize, fan_out: usize, rng: &mut SimpleRng) {
    let limit = (6.0f32 / (fan_in + fan_out) as f32).sqrt();
    for value in weights.iter_mut() {
        *value = rng.gen_range_f32(-limit, limit);
    }
}

/// logits = x W + b, row-major W of shape (input_size x output_size).
pub(crate) fn linear_forward(
    input: &[f32],
    weights: &[f32],
    biases: &[f32],
    output: &mut [f32],
    batch_size: usize,
    input_size: usize,
    output_size: usize,
) {
    for b in 0..batch_size {
        let in_offset = b * input_size;
        let out_offset = b * output_size;

        for j in 0..output_size {
            let mut sum = biases[j];
            for i in 0..input_size {
                sum += input[in_offset + i] * weights[i * output_size + j];
            }
            output[out_offset + j] = sum;
        }
    }
}

/// Backward through the linear map: fills weight/bias gradients (averaged
/// over the batch) and the gradient with respect to the input.
#[allow(clippy::too_many_arguments)]
pub(crate) fn linear_backward(
    input: &[f32],
    grad_z: &[f32],
    weights: &[f32],
    grad_weights: &mut [f32],
    grad_biases: &mut [f32],
    grad_input: &mut [f32],
    batch_size: usize,
    input_size: usize,
    output_size: usize,
) {
    let scale = 1.0 / batch_size as f32;

    for g in grad_weights.iter_mut() {
        *g = 0.0;
    }
    for g in grad_biases.iter_mut() {
        *g = 0.0;
    }
    for g in grad_input.iter_mut() {
        *g = 0.0;
    }

    for b in 0..batch_size {
        let in_offset = b * input_size;
        let out_offset = b * output_size;

        for j in 0..output_size {
            let g = grad_z[out_offset + j];
            grad_biases[j] += g * scale;

            for i in 0..input_size {
                grad_weights[i * output_size + j] += input[in_offset + i] * g * scale;
                grad_input[in_offset + i] += g * weights[i * output_size + j];
            }
        }
    }
}

/// Plain SGD step, then zero the gradient accumulators.
pub(crate) fn sgd_step(
    weights: &mut [f32],
    biases: &mut [f32],
    grad_weights: &mut [f32],
    grad_biases: &mut [f32],
    learning_rate: f32,
) {
    for (w, g) in weights.iter_mut().zip(grad_weights.iter()) {
        *w -= learning_rate * g;
    }
    for (b, g) in biases.iter_mut().zip(grad_biases.iter()) {
        *b -= learning_rate * g;
    }
    for g in grad_weights.iter_mut() {
        *g = 0.0;
    }
    for g in grad_biases.iter_mut() {
        *g = 0.0;
    }
}

/// Fully connected trainable layer.
#[derive(Debug)]
pub struct DenseLayer {
    units: usize,
    activation: Activation,
    input_size: usize,
    output_shape: Vec<usize>,
    weights: Vec<f32>,
    biases: Vec<f32>,
    grad_weights: Vec<f32>,
    grad_biases: Vec<f32>,
    // Stored input (copied) and post-activation output of the last
    // forward pass, needed by backward.
    last_input: Vec<f32>,
    output: Vec<f32>,
    gradient: Vec<f32>,
}

impl DenseLayer {
    /// Create a dense layer with the given number of units. The input
    /// size is derived from the previous layer during `setup`.
    pub fn new(units: usize, activation: Activation) -> Self {
        Self {
            units,
            activation,
            input_size: 0,
            output_shape: vec![units],
            weights: Vec::new(),
            biases: Vec::new(),
            grad_weights: Vec::new(),
            grad_biases: Vec::new(),
            last_input: Vec::new(),
            output: Vec::new(),
            gradient: Vec::new(),
        }
    }

    pub fn units(&self) -> usize {
        self.units
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }
}

impl Layer for DenseLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Parametric
    }

    fn name(&self) -> &'static str {
        "dense"
    }

    fn setup(
        &mut self,
        index: usize,
        input_shape: &[usize],
        rng: &mut SimpleRng,
    ) -> Result<(), NetworkError> {
        if input_shape.len() != 1 {
            return Err(NetworkError::IncompatibleShape {
                index,
                name: self.name(),
                shape: input_shape.to_vec(),
                reason: "dense layers need flat (rank-1) input; add a flatten layer first".into(),
            });
        }
        self.input_size = input_shape[0];
        if self.input_size == 0 || self.units == 0 {
            return Err(NetworkError::IncompatibleShape {
                index,
                name: self.name(),
                shape: input_shape.to_vec(),
                reason: "layer sizes must be greater than zero".into(),
            });
        }

        self.weights = vec![0.0f32; self.input_size * self.units];
        xavier_init(&mut self.weights, self.input_size, self.units, rng);
        self.biases = vec![0.0f32; self.units];
        self.grad_weights = vec![0.0f32; self.input_size * self.units];
        self.grad_biases = vec![0.0f32; self.units];
        Ok(())
    }

    fn output_shape(&self) -> &[usize] {
        &self.output_shape
    }

    fn forward(&mut self, input: &[f32], batch_size: usize) {
        self.last_input.clear();
        self.last_input.extend_from_slice(input);

        self.output.resize(batch_size * self.units, 0.0);
        linear_forward(
            input,
            &self.weights,
            &self.biases,
            &mut self.output,
            batch_size,
            self.input_size,
            self.units,
        );
        self.activation.apply_inplace(&mut self.output);
    }

    fn backward(&mut self, upstream: &[f32], batch_size: usize) {
        // Gradient through the activation, using the stored outputs.
        let mut grad_z = vec![0.0f32; batch_size * self.units];
        for (g, (&up, &out)) in grad_z
            .iter_mut()
            .zip(upstream.iter().zip(self.output.iter()))
        {
            *g = up * self.activation.derivative_from_output(out);
        }

        self.gradient.resize(batch_size * self.input_size, 0.0);
        linear_backward(
            &self.last_input,
            &grad_z,
            &self.weights,
            &mut self.grad_weights,
            &mut self.grad_biases,
            &mut self.gradient,
            batch_size,
            self.input_size,
            self.units,
        );
    }

    fn update_weights(&mut self, learning_rate: f32) {
        sgd_step(
            &mut self.weights,
            &mut self.biases,
            &mut self.grad_weights,
            &mut self.grad_biases,
            learning_rate,
        );
    }

    fn trainable(&self) -> bool {
        true
    }

    fn output(&self) -> &[f32] {
        &self.output
    }

    fn gradient(&self) -> &[f32] {
        &self.gradient
    }

    fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_layer(units: usize, input_size: usize, seed: u64) -> DenseLayer {
        let mut rng = SimpleRng::new(seed);
        let mut layer = DenseLayer::new(units, Activation::Sigmoid);
        layer.setup(1, &[input_size], &mut rng).unwrap();
        layer
    }

    #[test]
    fn test_dense_setup_allocates_parameters() {
        let layer = setup_layer(5, 10, 42);
        assert_eq!(layer.input_size(), 10);
        assert_eq!(layer.parameter_count(), 10 * 5 + 5);
    }

    #[test]
    fn test_dense_setup_rejects_rank3_input() {
        let mut rng = SimpleRng::new(42);
        let mut layer = DenseLayer::new(5, Activation::Relu);
        let err = layer.setup(1, &[1, 28, 28], &mut rng).unwrap_err();
        assert!(matches!(err, NetworkError::IncompatibleShape { .. }));
    }

    #[test]
    fn test_dense_xavier_bounds() {
        let layer = setup_layer(50, 100, 42);
        let limit = (6.0f32 / 150.0).sqrt();
        for &w in &layer.weights {
            assert!(w >= -limit && w <= limit);
        }
        assert!(layer.biases.iter().all(|&b| b == 0.0));
    }

    #[test]
    fn test_dense_deterministic_initialization() {
        let layer1 = setup_layer(5, 10, 7);
        let layer2 = setup_layer(5, 10, 7);
        assert_eq!(layer1.weights, layer2.weights);
    }

    #[test]
    fn test_dense_forward_known_values() {
        // Fixed weights: identity-ish single unit, sigmoid(1*2 + 0) at x=2.
        let mut layer = setup_layer(1, 1, 42);
        layer.weights = vec![1.0];
        layer.biases = vec![0.0];
        layer.forward(&[2.0], 1);
        let expected = 1.0 / (1.0 + (-2.0f32).exp());
        assert!((layer.output()[0] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_dense_backward_gradient_shape() {
        let mut layer = setup_layer(3, 4, 42);
        layer.forward(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8], 2);
        layer.backward(&[1.0; 6], 2);
        assert_eq!(layer.gradient().len(), 2 * 4);
    }

    #[test]
    fn test_dense_update_changes_weights() {
        let mut layer = setup_layer(2, 2, 42);
        let before = layer.weights.clone();
        layer.forward(&[1.0, -1.0], 1);
        layer.backward(&[1.0, 1.0], 1);
        layer.update_weights(0.5);
        assert_ne!(layer.weights, before);
        // Gradients are cleared after the step.
        assert!(layer.grad_weights.iter().all(|&g| g == 0.0));
    }
}
