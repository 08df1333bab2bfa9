//! Output layer: chain tail computing softmax probabilities, loss and
//! accuracy against one-hot targets.
//!
//! The layer is itself fully connected, so it is a trainable sink: its
//! weights participate in the update pass like any dense layer.

use crate::error::NetworkError;
use crate::layers::dense::{linear_backward, linear_forward, sgd_step, xavier_init};
use crate::layers::{Layer, LayerKind};
use crate::utils::{softmax_rows, SimpleRng};

const LOG_EPSILON: f32 = 1e-9;

/// Trainable sink layer: linear map + row softmax, cross-entropy loss.
#[derive(Debug)]
pub struct OutputLayer {
    units: usize,
    input_size: usize,
    output_shape: Vec<usize>,
    weights: Vec<f32>,
    biases: Vec<f32>,
    grad_weights: Vec<f32>,
    grad_biases: Vec<f32>,
    last_input: Vec<f32>,
    output: Vec<f32>,
    gradient: Vec<f32>,
}

impl OutputLayer {
    /// Create an output layer producing `units` class probabilities.
    pub fn new(units: usize) -> Self {
        Self {
            units,
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

    fn batch_rows(&self, target: &[f32]) -> usize {
        debug_assert_eq!(target.len(), self.output.len());
        self.output.len() / self.units
    }
}

impl Layer for OutputLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Output
    }

    fn name(&self) -> &'static str {
        "output"
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
                reason: "output layers need flat (rank-1) input; add a flatten layer first".into(),
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
        softmax_rows(&mut self.output, batch_size, self.units);
    }

    /// `upstream` is the one-hot target batch. Softmax plus cross-entropy
    /// collapse to `probs - target` as the gradient at the logits.
    fn backward(&mut self, upstream: &[f32], batch_size: usize) {
        let mut grad_z = vec![0.0f32; batch_size * self.units];
        for (g, (&p, &y)) in grad_z
            .iter_mut()
            .zip(self.output.iter().zip(upstream.iter()))
        {
            *g = p - y;
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

    /// Mean cross-entropy of the stored probabilities against a one-hot
    /// target batch.
    fn calculate_loss(&self, target: &[f32]) -> Option<f32> {
        let rows = self.batch_rows(target);
        if rows == 0 {
            return Some(0.0);
        }

        let mut total = 0.0f32;
        for (probs, onehot) in self
            .output
            .chunks_exact(self.units)
            .zip(target.chunks_exact(self.units))
        {
            for (&p, &y) in probs.iter().zip(onehot.iter()) {
                if y > 0.0 {
                    total -= y * p.max(LOG_EPSILON).ln();
                }
            }
        }
        Some(total / rows as f32)
    }

    /// Fraction of rows whose argmax matches the target's argmax.
    fn calculate_accuracy(&self, target: &[f32]) -> Option<f32> {
        let rows = self.batch_rows(target);
        if rows == 0 {
            return Some(0.0);
        }

        let argmax = |row: &[f32]| {
            let mut best = 0usize;
            for (i, &v) in row.iter().enumerate() {
                if v > row[best] {
                    best = i;
                }
            }
            best
        };

        let mut correct = 0usize;
        for (probs, onehot) in self
            .output
            .chunks_exact(self.units)
            .zip(target.chunks_exact(self.units))
        {
            if argmax(probs) == argmax(onehot) {
                correct += 1;
            }
        }
        Some(correct as f32 / rows as f32)
    }
}
