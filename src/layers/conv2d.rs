//! 2D convolutional layer.
//!
//! Slides square filters over `[C, H, W]` feature maps with zero padding
//! and configurable stride, followed by an elementwise activation.
//! Buffers are flat row-major, batch-major, like every other layer.

use crate::error::NetworkError;
use crate::layers::{Layer, LayerKind};
use crate::utils::{Activation, SimpleRng};

/// Trainable convolutional layer with square kernels.
#[derive(Debug)]
pub struct ConvolutionalLayer {
    filters: usize,
    kernel_size: usize,
    padding: isize,
    stride: usize,
    activation: Activation,
    // Derived from the previous layer's shape during setup.
    in_channels: usize,
    input_height: usize,
    input_width: usize,
    output_shape: Vec<usize>,
    weights: Vec<f32>, // [filters * in_channels * k * k]
    biases: Vec<f32>,  // [filters]
    grad_weights: Vec<f32>,
    grad_biases: Vec<f32>,
    last_input: Vec<f32>,
    output: Vec<f32>,
    gradient: Vec<f32>,
}

impl ConvolutionalLayer {
    /// Create a convolutional layer; channel count and spatial dims are
    /// derived from the previous layer during `setup`.
    pub fn new(
        filters: usize,
        kernel_size: usize,
        padding: isize,
        stride: usize,
        activation: Activation,
    ) -> Self {
        Self {
            filters,
            kernel_size,
            padding,
            stride,
            activation,
            in_channels: 0,
            input_height: 0,
            input_width: 0,
            output_shape: Vec::new(),
            weights: Vec::new(),
            biases: Vec::new(),
            grad_weights: Vec::new(),
            grad_biases: Vec::new(),
            last_input: Vec::new(),
            output: Vec::new(),
            gradient: Vec::new(),
        }
    }

    pub fn filters(&self) -> usize {
        self.filters
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    /// (input + 2*padding - kernel) / stride + 1
    pub fn output_height(&self) -> usize {
        ((self.input_height as isize + 2 * self.padding - self.kernel_size as isize)
            / self.stride as isize
            + 1) as usize
    }

    pub fn output_width(&self) -> usize {
        ((self.input_width as isize + 2 * self.padding - self.kernel_size as isize)
            / self.stride as isize
            + 1) as usize
    }
}

impl Layer for ConvolutionalLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Parametric
    }

    fn name(&self) -> &'static str {
        "conv2d"
    }

    fn setup(
        &mut self,
        index: usize,
        input_shape: &[usize],
        rng: &mut SimpleRng,
    ) -> Result<(), NetworkError> {
        let [channels, height, width] = match *input_shape {
            [c, h, w] => [c, h, w],
            _ => {
                return Err(NetworkError::IncompatibleShape {
                    index,
                    name: self.name(),
                    shape: input_shape.to_vec(),
                    reason: "convolution needs [channels, height, width] input".into(),
                })
            }
        };
        if self.filters == 0 || self.kernel_size == 0 || self.stride == 0 {
            return Err(NetworkError::IncompatibleShape {
                index,
                name: self.name(),
                shape: input_shape.to_vec(),
                reason: "filters, kernel_size and stride must be greater than zero".into(),
            });
        }

        self.in_channels = channels;
        self.input_height = height;
        self.input_width = width;

        let span = self.kernel_size as isize - 2 * self.padding;
        if (height as isize) < span || (width as isize) < span {
            return Err(NetworkError::IncompatibleShape {
                index,
                name: self.name(),
                shape: input_shape.to_vec(),
                reason: format!(
                    "kernel {}x{} with padding {} does not fit a {}x{} input",
                    self.kernel_size, self.kernel_size, self.padding, height, width
                ),
            });
        }
        self.output_shape = vec![self.filters, self.output_height(), self.output_width()];

        // Xavier limits from the kernel fan-in/fan-out.
        let k2 = self.kernel_size * self.kernel_size;
        let fan_in = (self.in_channels * k2) as f32;
        let fan_out = (self.filters * k2) as f32;
        let limit = (6.0f32 / (fan_in + fan_out)).sqrt();

        let weight_count = self.filters * self.in_channels * k2;
        self.weights = vec![0.0f32; weight_count];
        for value in &mut self.weights {
            *value = rng.gen_range_f32(-limit, limit);
        }
        self.biases = vec![0.0f32; self.filters];
        self.grad_weights = vec![0.0f32; weight_count];
        self.grad_biases = vec![0.0f32; self.filters];
        Ok(())
    }

    fn output_shape(&self) -> &[usize] {
        &self.output_shape
    }

    fn forward(&mut self, input: &[f32], batch_size: usize) {
        self.last_input.clear();
        self.last_input.extend_from_slice(input);

        let out_h = self.output_height();
        let out_w = self.output_width();
        let out_spatial = out_h * out_w;
        let in_spatial = self.input_height * self.input_width;
        self.output.resize(batch_size * self.filters * out_spatial, 0.0);

        for b in 0..batch_size {
            let in_base = b * (self.in_channels * in_spatial);
            let out_base_b = b * (self.filters * out_spatial);

            for oc in 0..self.filters {
                let bias = self.biases[oc];
                let out_base = out_base_b + oc * out_spatial;

                for oy in 0..out_h {
                    for ox in 0..out_w {
                        let mut sum = bias;

                        for ic in 0..self.in_channels {
                            let w_base =
                                (oc * self.in_channels + ic) * self.kernel_size * self.kernel_size;
                            let in_base_c = in_base + ic * in_spatial;

                            for ky in 0..self.kernel_size {
                                for kx in 0..self.kernel_size {
                                    let iy = oy as isize * self.stride as isize + ky as isize
                                        - self.padding;
                                    let ix = ox as isize * self.stride as isize + kx as isize
                                        - self.padding;

                                    if iy >= 0
                                        && iy < self.input_height as isize
                                        && ix >= 0
                                        && ix < self.input_width as isize
                                    {
                                        let in_idx = in_base_c
                                            + iy as usize * self.input_width
                                            + ix as usize;
                                        let w_idx = w_base + ky * self.kernel_size + kx;
                                        sum += input[in_idx] * self.weights[w_idx];
                                    }
                                }
                            }
                        }

                        self.output[out_base + oy * out_w + ox] = sum;
                    }
                }
            }
        }

        self.activation.apply_inplace(&mut self.output);
    }

    fn backward(&mut self, upstream: &[f32], batch_size: usize) {
        let out_h = self.output_height();
        let out_w = self.output_width();
        let out_spatial = out_h * out_w;
        let in_spatial = self.input_height * self.input_width;
        let scale = 1.0 / batch_size as f32;

        // Gradient through the activation at the stored outputs.
        let mut grad_act = vec![0.0f32; upstream.len()];
        for (g, (&up, &out)) in grad_act
            .iter_mut()
            .zip(upstream.iter().zip(self.output.iter()))
        {
            *g = up * self.activation.derivative_from_output(out);
        }

        for g in self.grad_weights.iter_mut() {
            *g = 0.0;
        }
        for g in self.grad_biases.iter_mut() {
            *g = 0.0;
        }
        self.gradient.clear();
        self.gradient
            .resize(batch_size * self.in_channels * in_spatial, 0.0);

        for b in 0..batch_size {
            let in_base = b * (self.in_channels * in_spatial);
            let out_base_b = b * (self.filters * out_spatial);

            for oc in 0..self.filters {
                let g_base = out_base_b + oc * out_spatial;

                for ic in 0..self.in_channels {
                    let w_base = (oc * self.in_channels + ic) * self.kernel_size * self.kernel_size;
                    let in_base_c = in_base + ic * in_spatial;

                    for oy in 0..out_h {
                        for ox in 0..out_w {
                            let g = grad_act[g_base + oy * out_w + ox];

                            for ky in 0..self.kernel_size {
                                for kx in 0..self.kernel_size {
                                    let iy = oy as isize * self.stride as isize + ky as isize
                                        - self.padding;
                                    let ix = ox as isize * self.stride as isize + kx as isize
                                        - self.padding;

                                    if iy >= 0
                                        && iy < self.input_height as isize
                                        && ix >= 0
                                        && ix < self.input_width as isize
                                    {
                                        let in_idx = in_base_c
                                            + iy as usize * self.input_width
                                            + ix as usize;
                                        let w_idx = w_base + ky * self.kernel_size + kx;

                                        self.grad_weights[w_idx] +=
                                            g * self.last_input[in_idx] * scale;
                                        self.gradient[in_idx] += g * self.weights[w_idx];
                                    }
                                }
                            }
                        }
                    }
                }

                for oy in 0..out_h {
                    for ox in 0..out_w {
                        self.grad_biases[oc] += grad_act[g_base + oy * out_w + ox] * scale;
                    }
                }
            }
        }
    }

    fn update_weights(&mut self, learning_rate: f32) {
        for (w, g) in self.weights.iter_mut().zip(self.grad_weights.iter()) {
            *w -= learning_rate * g;
        }
        for (b, g) in self.biases.iter_mut().zip(self.grad_biases.iter()) {
            *b -= learning_rate * g;
        }
        for g in self.grad_weights.iter_mut() {
            *g = 0.0;
        }
        for g in self.grad_biases.iter_mut() {
            *g = 0.0;
        }
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

    fn setup_layer(filters: usize, kernel: usize, padding: isize) -> ConvolutionalLayer {
        let mut rng = SimpleRng::new(42);
        let mut layer = ConvolutionalLayer::new(filters, kernel, padding, 1, Activation::Relu);
        layer.setup(1, &[1, 8, 8], &mut rng).unwrap();
        layer
    }

    #[test]
    fn test_conv_output_dimensions_with_padding() {
        // padding=1 with a 3x3 kernel keeps spatial dims.
        let layer = setup_layer(4, 3, 1);
        assert_eq!(layer.output_shape(), &[4, 8, 8]);
    }

    #[test]
    fn test_conv_output_dimensions_no_padding() {
        let layer = setup_layer(4, 3, 0);
        assert_eq!(layer.output_shape(), &[4, 6, 6]);
    }

    #[test]
    fn test_conv_parameter_count() {
        let layer = setup_layer(8, 3, 1);
        // 8 filters * 1 channel * 3 * 3 weights + 8 biases
        assert_eq!(layer.parameter_count(), 8 * 9 + 8);
    }

    #[test]
    fn test_conv_setup_rejects_flat_input() {
        let mut rng = SimpleRng::new(42);
        let mut layer = ConvolutionalLayer::new(4, 3, 0, 1, Activation::Relu);
        let err = layer.setup(1, &[64], &mut rng).unwrap_err();
        assert!(matches!(err, NetworkError::IncompatibleShape { .. }));
    }

    #[test]
    fn test_conv_setup_rejects_oversized_kernel() {
        let mut rng = SimpleRng::new(42);
        let mut layer = ConvolutionalLayer::new(4, 9, 0, 1, Activation::Relu);
        let err = layer.setup(1, &[1, 8, 8], &mut rng).unwrap_err();
        assert!(matches!(err, NetworkError::IncompatibleShape { .. }));
    }

    #[test]
    fn test_conv_forward_constant_filter() {
        let mut layer = setup_layer(1, 2, 0);
        // All-ones 2x2 filter, zero bias: each output = sum of a 2x2 patch.
        layer.weights = vec![1.0; 4];
        layer.biases = vec![0.0];
        let input = vec![1.0f32; 64];
        layer.forward(&input, 1);
        assert_eq!(layer.output().len(), 7 * 7);
        assert!(layer.output().iter().all(|&v| (v - 4.0).abs() < 1e-6));
    }

    #[test]
    fn test_conv_backward_shapes_and_update() {
        let mut layer = setup_layer(2, 3, 1);
        let input = vec![0.5f32; 64];
        layer.forward(&input, 1);
        let upstream = vec![1.0f32; layer.output().len()];
        layer.backward(&upstream, 1);
        assert_eq!(layer.gradient().len(), 64);

        let before = layer.weights.clone();
        layer.update_weights(0.1);
        assert_ne!(layer.weights, before);
    }
}
