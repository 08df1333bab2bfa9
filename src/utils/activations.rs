//! Activation functions shared by the trainable layers.
//!
//! Derivatives are expressed in terms of the activated output, so layers
//! only need to keep their post-activation values around for backprop.

/// Activation applied elementwise by dense and convolutional layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Sigmoid,
    Relu,
    Tanh,
}

impl Activation {
    /// Apply the activation in place over a flat buffer.
    pub fn apply_inplace(self, data: &mut [f32]) {
        match self {
            Activation::Sigmoid => {
                for v in data.iter_mut() {
                    *v = 1.0 / (1.0 + (-*v).exp());
                }
            }
            Activation::Relu => {
                for v in data.iter_mut() {
                    if *v < 0.0 {
                        *v = 0.0;
                    }
                }
            }
            Activation::Tanh => {
                for v in data.iter_mut() {
                    *v = v.tanh();
                }
            }
        }
    }

    /// Derivative at a point, given the activated output at that point.
    ///
    /// For ReLU the derivative at exactly zero is taken as zero.
    pub fn derivative_from_output(self, output: f32) -> f32 {
        match self {
            Activation::Sigmoid => output * (1.0 - output),
            Activation::Relu => {
                if output > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Tanh => 1.0 - output * output,
        }
    }

    /// Parse a config-file name ("sigmoid", "relu" or "tanh").
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "sigmoid" => Some(Activation::Sigmoid),
            "relu" => Some(Activation::Relu),
            "tanh" => Some(Activation::Tanh),
            _ => None,
        }
    }
}

/// Row-wise softmax over a flat row-major buffer.
///
/// Uses the max-subtraction trick for numerical stability.
pub fn softmax_rows(outputs: &mut [f32], rows: usize, cols: usize) {
    if cols == 0 {
        return;
    }
    assert_eq!(
        outputs.len(),
        rows * cols,
        "outputs length mismatch in softmax_rows"
    );

    for row in outputs.chunks_exact_mut(cols).take(rows) {
        let mut max_value = row[0];
        for &value in row.iter().skip(1) {
            if value > max_value {
                max_value = value;
            }
        }

        let mut sum = 0.0f32;
        for value in row.iter_mut() {
            *value = (*value - max_value).exp();
            sum += *value;
        }

        let inv_sum = 1.0f32 / sum;
        for value in row.iter_mut() {
            *value *= inv_sum;
        }
    }
}
