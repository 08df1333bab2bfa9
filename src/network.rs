//! Network orchestrator: owns the ordered layer chain, validates it at
//! build time and drives the three training passes.
//!
//! Every training step runs forward (left to right), backward (right to
//! left, stopping before the input layer) and update (left to right,
//! trainable layers only) over the same batch, in that order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::data::Dataset;
use crate::error::NetworkError;
use crate::layers::{Layer, LayerKind};
use crate::utils::SimpleRng;

/// Cloneable cooperative-stop handle for [`Network::fit`].
///
/// Raising the flag (for example from a Ctrl-C handler) makes the
/// training loop return cleanly at the next batch boundary, leaving the
/// network built and usable. The flag stays raised until `reset`.
#[derive(Debug, Clone)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request that the current (or next) `fit` call stop early.
    pub fn stop(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Clear the flag so training can be resumed with a new `fit` call.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Relaxed);
    }
}

/// Ordered chain of layers plus the training loop state.
///
/// Layers are appended with [`add`](Network::add), frozen by
/// [`build`](Network::build) (a one-way transition) and then driven by
/// [`fit`](Network::fit), [`predict`](Network::predict) and
/// [`test`](Network::test).
#[derive(Debug)]
pub struct Network {
    layers: Vec<Box<dyn Layer>>,
    built: bool,
    rng: SimpleRng,
    shuffle: bool,
    stop: StopHandle,
    last_batch: usize,
    train_loss_per_iter: Vec<f32>,
    train_accu_per_iter: Vec<f32>,
    valid_loss_per_epoch: Vec<f32>,
    valid_accu_per_epoch: Vec<f32>,
}

impl Network {
    /// Empty network with a fixed default seed.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Empty network whose weight initialization and batch shuffling are
    /// driven by the given seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            layers: Vec::new(),
            built: false,
            rng: SimpleRng::new(seed),
            shuffle: false,
            stop: StopHandle::new(),
            last_batch: 0,
            train_loss_per_iter: Vec::new(),
            train_accu_per_iter: Vec::new(),
            valid_loss_per_epoch: Vec::new(),
            valid_accu_per_epoch: Vec::new(),
        }
    }

    /// Append a layer to the chain. Only allowed before `build`.
    pub fn add<L: Layer + 'static>(&mut self, layer: L) -> Result<(), NetworkError> {
        if self.built {
            return Err(NetworkError::AlreadyBuilt);
        }
        self.layers.push(Box::new(layer));
        Ok(())
    }

    /// Validate the chain and freeze its topology.
    ///
    /// Checks, failing fast on the first violation: at least two layers;
    /// an input layer at index 0; an output layer at the last index; no
    /// input/output layer in between. Then runs per-layer `setup` left to
    /// right, handing each layer its predecessor's output shape (the
    /// input layer at index 0 needs no setup).
    pub fn build(&mut self) -> Result<(), NetworkError> {
        if self.built {
            return Err(NetworkError::AlreadyBuilt);
        }
        if self.layers.len() < 2 {
            return Err(NetworkError::TooFewLayers(self.layers.len()));
        }

        let last = self.layers.len() - 1;
        if self.layers[0].kind() != LayerKind::Input {
            return Err(NetworkError::FirstLayerNotInput(self.layers[0].name()));
        }
        if self.layers[last].kind() != LayerKind::Output {
            return Err(NetworkError::LastLayerNotOutput(self.layers[last].name()));
        }
        for (index, layer) in self.layers.iter().enumerate().take(last).skip(1) {
            if !layer.kind().is_interior() {
                return Err(NetworkError::MisplacedLayer {
                    index,
                    name: layer.name(),
                });
            }
        }

        // Setup depends on the predecessor's shape being final, hence the
        // strict left-to-right order.
        for i in 1..self.layers.len() {
            let (left, right) = self.layers.split_at_mut(i);
            right[0].setup(i, left[i - 1].output_shape(), &mut self.rng)?;
        }

        self.built = true;
        Ok(())
    }

    /// Whether `build` has completed successfully.
    pub fn built(&self) -> bool {
        self.built
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Total trainable parameters across all layers.
    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(|l| l.parameter_count()).sum()
    }

    /// Shuffle training batches each epoch (off by default).
    pub fn set_shuffle(&mut self, shuffle: bool) {
        self.shuffle = shuffle;
    }

    /// Handle for stopping a running or upcoming `fit` early.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn train_loss_per_iter(&self) -> &[f32] {
        &self.train_loss_per_iter
    }

    pub fn train_accu_per_iter(&self) -> &[f32] {
        &self.train_accu_per_iter
    }

    pub fn valid_loss_per_epoch(&self) -> &[f32] {
        &self.valid_loss_per_epoch
    }

    pub fn valid_accu_per_epoch(&self) -> &[f32] {
        &self.valid_accu_per_epoch
    }

    fn input_stride(&self) -> usize {
        self.layers[0].output_shape().iter().product()
    }

    fn output_stride(&self) -> usize {
        self.layers[self.layers.len() - 1]
            .output_shape()
            .iter()
            .product()
    }

    /// Forward pass over the whole chain. Pure in the weights: only the
    /// per-layer output slots change.
    fn feedforward(&mut self, input: &[f32]) -> Result<(), NetworkError> {
        let stride = self.input_stride();
        if input.len() % stride != 0 {
            return Err(NetworkError::RaggedBatch {
                len: input.len(),
                sample_size: stride,
            });
        }
        let batch = input.len() / stride;
        self.last_batch = batch;

        self.layers[0].forward(input, batch);
        for i in 1..self.layers.len() {
            let (left, right) = self.layers.split_at_mut(i);
            right[0].forward(left[i - 1].output(), batch);
        }
        Ok(())
    }

    /// Backward pass in reverse order; the output layer turns the target
    /// into the initial gradient, and traversal stops before the input
    /// layer. Requires a preceding forward pass with a matching batch.
    fn backpropagation(&mut self, target: &[f32]) -> Result<(), NetworkError> {
        let stride = self.output_stride();
        if target.len() != self.last_batch * stride {
            return Err(NetworkError::RaggedBatch {
                len: target.len(),
                sample_size: stride,
            });
        }

        let last = self.layers.len() - 1;
        self.layers[last].backward(target, self.last_batch);
        for i in (1..last).rev() {
            let (left, right) = self.layers.split_at_mut(i + 1);
            left[i].backward(right[0].gradient(), self.last_batch);
        }
        Ok(())
    }

    /// Update pass: trainable layers only; input, flatten and pooling
    /// layers are skipped outright rather than called as no-ops.
    fn update_pass(&mut self, learning_rate: f32) {
        for layer in &mut self.layers {
            if layer.trainable() {
                layer.update_weights(learning_rate);
            }
        }
    }

    /// Loss and accuracy of the sink's stored output against a target.
    fn sink_metrics(&self, target: &[f32]) -> Option<(f32, f32)> {
        let sink = self.layers.last()?;
        Some((
            sink.calculate_loss(target)?,
            sink.calculate_accuracy(target)?,
        ))
    }

    fn check_dataset(&self, dataset: &Dataset, role: &str) -> Result<(), NetworkError> {
        if dataset.is_empty() {
            return Err(NetworkError::InvalidArgument(format!(
                "{role} dataset is empty"
            )));
        }
        if dataset.input_stride() != self.input_stride() {
            return Err(NetworkError::InvalidArgument(format!(
                "{role} inputs have {} values per sample, the input layer expects {}",
                dataset.input_stride(),
                self.input_stride()
            )));
        }
        if dataset.target_stride() != self.output_stride() {
            return Err(NetworkError::InvalidArgument(format!(
                "{role} targets have {} values per sample, the output layer expects {}",
                dataset.target_stride(),
                self.output_stride()
            )));
        }
        Ok(())
    }

    /// Train for `epochs` passes over `train`, drawing non-overlapping
    /// batches of `batch_size` (the last batch of an epoch may be
    /// smaller). Each batch runs forward, backward and update in order
    /// and appends train loss/accuracy to the per-step histories. With
    /// validation data, one forward-only evaluation runs per epoch and
    /// feeds the per-epoch histories.
    ///
    /// A raised [`StopHandle`] is honoured only between batches, so an
    /// interrupted call never leaves a batch half-applied; the network
    /// stays built and usable.
    pub fn fit(
        &mut self,
        train: &Dataset,
        epochs: usize,
        learning_rate: f32,
        batch_size: usize,
        validation: Option<&Dataset>,
    ) -> Result<(), NetworkError> {
        if !self.built {
            return Err(NetworkError::NotBuilt("fit"));
        }
        if epochs == 0 {
            return Err(NetworkError::InvalidArgument(
                "epochs must be greater than zero".into(),
            ));
        }
        if !(learning_rate > 0.0 && learning_rate.is_finite()) {
            return Err(NetworkError::InvalidArgument(
                "learning_rate must be a positive finite number".into(),
            ));
        }
        self.check_dataset(train, "training")?;
        if batch_size == 0 || batch_size > train.len() {
            return Err(NetworkError::InvalidArgument(format!(
                "batch_size must be in 1..={}, got {}",
                train.len(),
                batch_size
            )));
        }
        if let Some(valid) = validation {
            self.check_dataset(valid, "validation")?;
        }

        let mut stopped = false;

        'epochs: for epoch in 0..epochs {
            let epoch_start = Instant::now();

            for (inputs, targets) in train.batches(batch_size, self.shuffle, &mut self.rng) {
                if self.stop.is_stopped() {
                    stopped = true;
                    break 'epochs;
                }

                self.feedforward(&inputs)?;
                self.backpropagation(&targets)?;
                self.update_pass(learning_rate);

                if let Some((loss, accu)) = self.sink_metrics(&targets) {
                    self.train_loss_per_iter.push(loss);
                    self.train_accu_per_iter.push(accu);
                }
            }

            let train_loss = self.train_loss_per_iter.last().copied().unwrap_or(0.0);
            let train_accu = self.train_accu_per_iter.last().copied().unwrap_or(0.0);
            let mut progress = format!(
                "Epoch: {}/{}\tTrain: {:.3} | {:.3}\tTime: {:.2?}",
                epoch + 1,
                epochs,
                train_loss,
                train_accu,
                epoch_start.elapsed()
            );

            if let Some(valid) = validation {
                // Evaluation only: no backward pass, no update.
                self.feedforward(valid.inputs())?;
                if let Some((loss, accu)) = self.sink_metrics(valid.targets()) {
                    self.valid_loss_per_epoch.push(loss);
                    self.valid_accu_per_epoch.push(accu);
                    progress.push_str(&format!("\tValid: {loss:.3} | {accu:.3}"));
                }
            }

            println!("{progress}");
        }

        if stopped {
            println!("Stopped!");
        } else {
            println!("Done.");
        }
        Ok(())
    }

    /// One forward pass; returns the output layer's stored output. Does
    /// not touch weights or metric histories.
    pub fn predict(&mut self, input: &[f32]) -> Result<Vec<f32>, NetworkError> {
        if !self.built {
            return Err(NetworkError::NotBuilt("predict"));
        }
        self.feedforward(input)?;
        Ok(self.layers[self.layers.len() - 1].output().to_vec())
    }

    /// One forward pass, then `(accuracy, loss)` against the target. Does
    /// not touch weights or metric histories.
    pub fn test(&mut self, input: &[f32], target: &[f32]) -> Result<(f32, f32), NetworkError> {
        if !self.built {
            return Err(NetworkError::NotBuilt("test"));
        }
        self.feedforward(input)?;

        let stride = self.output_stride();
        if target.len() != self.last_batch * stride {
            return Err(NetworkError::RaggedBatch {
                len: target.len(),
                sample_size: stride,
            });
        }
        match self.sink_metrics(target) {
            Some((loss, accuracy)) => Ok((accuracy, loss)),
            // Unreachable once built: the last layer is a sink.
            None => Err(NetworkError::NotBuilt("test")),
        }
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}
