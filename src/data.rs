//! Paired datasets and the minibatch generator.
//!
//! Inputs and targets live in flat row-major buffers with fixed
//! per-sample strides. Shuffling draws one index permutation and gathers
//! both buffers through it, so input/target pairing can never drift.

use crate::error::NetworkError;
use crate::utils::SimpleRng;

/// Paired input/target collection with equal sample counts.
#[derive(Debug)]
pub struct Dataset {
    inputs: Vec<f32>,
    targets: Vec<f32>,
    input_stride: usize,
    target_stride: usize,
    len: usize,
}

impl Dataset {
    /// Build a dataset from flat buffers and per-sample strides. Fails if
    /// either buffer is not a whole number of samples or the two sides
    /// disagree on the sample count.
    pub fn new(
        inputs: Vec<f32>,
        input_stride: usize,
        targets: Vec<f32>,
        target_stride: usize,
    ) -> Result<Self, NetworkError> {
        if input_stride == 0 || target_stride == 0 {
            return Err(NetworkError::InvalidArgument(
                "sample strides must be greater than zero".into(),
            ));
        }
        if inputs.len() % input_stride != 0 {
            return Err(NetworkError::RaggedBatch {
                len: inputs.len(),
                sample_size: input_stride,
            });
        }
        if targets.len() % target_stride != 0 {
            return Err(NetworkError::RaggedBatch {
                len: targets.len(),
                sample_size: target_stride,
            });
        }

        let len = inputs.len() / input_stride;
        if targets.len() / target_stride != len {
            return Err(NetworkError::InvalidArgument(format!(
                "inputs hold {} samples but targets hold {}",
                len,
                targets.len() / target_stride
            )));
        }

        Ok(Self {
            inputs,
            targets,
            input_stride,
            target_stride,
            len,
        })
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Values per input sample.
    pub fn input_stride(&self) -> usize {
        self.input_stride
    }

    /// Values per target sample.
    pub fn target_stride(&self) -> usize {
        self.target_stride
    }

    /// The whole input buffer, batch-major.
    pub fn inputs(&self) -> &[f32] {
        &self.inputs
    }

    /// The whole target buffer, batch-major.
    pub fn targets(&self) -> &[f32] {
        &self.targets
    }

    /// Lazy minibatch sequence covering the dataset exactly once. The
    /// last batch may be smaller. With `shuffle`, a single permutation is
    /// drawn up front and applied to inputs and targets identically.
    pub fn batches(&self, batch_size: usize, shuffle: bool, rng: &mut SimpleRng) -> Batches<'_> {
        let mut order: Vec<usize> = (0..self.len).collect();
        if shuffle {
            rng.shuffle_usize(&mut order);
        }
        Batches {
            dataset: self,
            order,
            batch_size,
            cursor: 0,
        }
    }
}

/// Iterator over `(inputs, targets)` minibatch pairs.
pub struct Batches<'a> {
    dataset: &'a Dataset,
    order: Vec<usize>,
    batch_size: usize,
    cursor: usize,
}

impl Iterator for Batches<'_> {
    type Item = (Vec<f32>, Vec<f32>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() || self.batch_size == 0 {
            return None;
        }

        let end = (self.cursor + self.batch_size).min(self.order.len());
        let picked = &self.order[self.cursor..end];

        let in_stride = self.dataset.input_stride;
        let tgt_stride = self.dataset.target_stride;
        let mut inputs = Vec::with_capacity(picked.len() * in_stride);
        let mut targets = Vec::with_capacity(picked.len() * tgt_stride);

        for &i in picked {
            let in_start = i * in_stride;
            inputs.extend_from_slice(&self.dataset.inputs[in_start..in_start + in_stride]);
            let tgt_start = i * tgt_stride;
            targets.extend_from_slice(&self.dataset.targets[tgt_start..tgt_start + tgt_stride]);
        }

        self.cursor = end;
        Some((inputs, targets))
    }
}
