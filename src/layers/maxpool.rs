//! Max-pooling layer: square window reduction with argmax gradient
//! routing. Structural, so it never takes part in the update pass.

use crate::error::NetworkError;
use crate::layers::{Layer, LayerKind};
use crate::utils::SimpleRng;

/// Non-overlapping square max pooling (stride equals the window size).
#[derive(Debug)]
pub struct MaxPoolingLayer {
    pool: usize,
    channels: usize,
    input_height: usize,
    input_width: usize,
    output_shape: Vec<usize>,
    // Flat argmax offsets (dy * pool + dx) recorded per output cell so
    // backward can scatter gradients to the winning inputs.
    argmax: Vec<u8>,
    output: Vec<f32>,
    gradient: Vec<f32>,
}

impl MaxPoolingLayer {
    pub fn new(pool: usize) -> Self {
        Self {
            pool,
            channels: 0,
            input_height: 0,
            input_width: 0,
            output_shape: Vec::new(),
            argmax: Vec::new(),
            output: Vec::new(),
            gradient: Vec::new(),
        }
    }

    pub fn pool(&self) -> usize {
        self.pool
    }

    fn out_height(&self) -> usize {
        self.input_height / self.pool
    }

    fn out_width(&self) -> usize {
        self.input_width / self.pool
    }
}

impl Layer for MaxPoolingLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Structural
    }

    fn name(&self) -> &'static str {
        "max_pooling"
    }

    fn setup(
        &mut self,
        index: usize,
        input_shape: &[usize],
        _rng: &mut SimpleRng,
    ) -> Result<(), NetworkError> {
        let [channels, height, width] = match *input_shape {
            [c, h, w] => [c, h, w],
            _ => {
                return Err(NetworkError::IncompatibleShape {
                    index,
                    name: self.name(),
                    shape: input_shape.to_vec(),
                    reason: "max pooling needs [channels, height, width] input".into(),
                })
            }
        };
        if self.pool == 0 || height % self.pool != 0 || width % self.pool != 0 {
            return Err(NetworkError::IncompatibleShape {
                index,
                name: self.name(),
                shape: input_shape.to_vec(),
                reason: format!("spatial dims must be divisible by the pool size {}", self.pool),
            });
        }

        self.channels = channels;
        self.input_height = height;
        self.input_width = width;
        self.output_shape = vec![channels, height / self.pool, width / self.pool];
        Ok(())
    }

    fn output_shape(&self) -> &[usize] {
        &self.output_shape
    }

    fn forward(&mut self, input: &[f32], batch_size: usize) {
        let in_spatial = self.input_height * self.input_width;
        let out_h = self.out_height();
        let out_w = self.out_width();
        let out_spatial = out_h * out_w;

        self.output.resize(batch_size * self.channels * out_spatial, 0.0);
        self.argmax.resize(batch_size * self.channels * out_spatial, 0);

        for b in 0..batch_size {
            let in_base_b = b * (self.channels * in_spatial);
            let out_base_b = b * (self.channels * out_spatial);

            for c in 0..self.channels {
                let in_base = in_base_b + c * in_spatial;
                let out_base = out_base_b + c * out_spatial;

                for py in 0..out_h {
                    for px in 0..out_w {
                        let iy0 = py * self.pool;
                        let ix0 = px * self.pool;

                        let mut best = f32::NEG_INFINITY;
                        let mut best_idx = 0u8;
                        for dy in 0..self.pool {
                            for dx in 0..self.pool {
                                let v =
                                    input[in_base + (iy0 + dy) * self.input_width + (ix0 + dx)];
                                if v > best {
                                    best = v;
                                    best_idx = (dy * self.pool + dx) as u8;
                                }
                            }
                        }

                        let out_i = out_base + py * out_w + px;
                        self.output[out_i] = best;
                        self.argmax[out_i] = best_idx;
                    }
                }
            }
        }
    }

    fn backward(&mut self, upstream: &[f32], batch_size: usize) {
        let in_spatial = self.input_height * self.input_width;
        let out_h = self.out_height();
        let out_w = self.out_width();
        let out_spatial = out_h * out_w;

        self.gradient.clear();
        self.gradient
            .resize(batch_size * self.channels * in_spatial, 0.0);

        for b in 0..batch_size {
            let in_base_b = b * (self.channels * in_spatial);
            let out_base_b = b * (self.channels * out_spatial);

            for c in 0..self.channels {
                let in_base = in_base_b + c * in_spatial;
                let out_base = out_base_b + c * out_spatial;

                for py in 0..out_h {
                    for px in 0..out_w {
                        let out_i = out_base + py * out_w + px;
                        let a = self.argmax[out_i] as usize;
                        let dy = a / self.pool;
                        let dx = a % self.pool;

                        let iy = py * self.pool + dy;
                        let ix = px * self.pool + dx;
                        self.gradient[in_base + iy * self.input_width + ix] += upstream[out_i];
                    }
                }
            }
        }
    }

    fn output(&self) -> &[f32] {
        &self.output
    }

    fn gradient(&self) -> &[f32] {
        &self.gradient
    }
}
