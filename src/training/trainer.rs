//! Training loop and evaluation

use burn::data::dataloader::DataLoaderBuilder;
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Tensor};

use crate::data::dataset::{WindowBatch, WindowBatcher, WindowDataset};
use crate::features::SequenceSet;
use crate::model::{PointsLstm, PointsLstmConfig};
use crate::training::metrics::{Metrics, TrainingHistory};
use crate::{FplError, Result, TrainingConfig};

/// Mean squared error over a batch
pub fn mse_loss<B: Backend>(predictions: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
    (predictions - targets).powf_scalar(2.0).mean()
}

/// Trainer for the LSTM model
pub struct Trainer<B: AutodiffBackend> {
    model: PointsLstm<B>,
    optimizer: burn::optim::adaptor::OptimizerAdaptor<burn::optim::Adam, PointsLstm<B>, B>,
    config: TrainingConfig,
    device: B::Device,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// Create a trainer around a freshly initialized model
    pub fn new(device: B::Device, model_config: &PointsLstmConfig, config: TrainingConfig) -> Self {
        let model = PointsLstm::new(&device, model_config);
        let optimizer = AdamConfig::new().init();

        Trainer {
            model,
            optimizer,
            config,
            device,
        }
    }

    /// Train the model
    ///
    /// With a validation set, the loop stops after `early_stopping_patience`
    /// epochs without improvement and the best-scoring weights are returned.
    /// Without one, every epoch runs and the final weights are returned.
    pub fn train(
        mut self,
        train_set: &SequenceSet,
        val_set: Option<&SequenceSet>,
    ) -> Result<(PointsLstm<B>, TrainingHistory)> {
        if train_set.is_empty() {
            return Err(FplError::Model("no training windows".to_string()));
        }
        let val_set = val_set.filter(|v| !v.is_empty());

        let batcher = WindowBatcher::<B>::new(self.device.clone(), train_set.feature_count);
        let train_loader = DataLoaderBuilder::new(batcher)
            .batch_size(self.config.batch_size.max(1))
            .shuffle(self.config.seed)
            .build(WindowDataset::from_sequences(train_set));

        let mut history = TrainingHistory::new();
        let mut best_model = self.model.clone();

        log::info!(
            "Starting training for {} epochs ({} train windows, {} validation windows)",
            self.config.epochs,
            train_set.len(),
            val_set.map(|v| v.len()).unwrap_or(0)
        );

        for epoch in 0..self.config.epochs {
            let train_metrics = self.train_epoch(train_loader.iter());

            let val_metrics = match val_set {
                Some(val) => evaluate(&self.model.valid(), val, self.config.batch_size, &self.device),
                None => train_metrics.clone(),
            };

            let improved = history.record_epoch(epoch, &train_metrics, &val_metrics);

            log::info!(
                "Epoch {}/{}: Train: {} | Val: {}",
                epoch + 1,
                self.config.epochs,
                train_metrics,
                val_metrics
            );

            if val_set.is_none() {
                continue;
            }

            if improved {
                best_model = self.model.clone();
                log::debug!("  New best model (val_loss: {:.4})", val_metrics.avg_loss());
            }

            if history.should_early_stop(self.config.early_stopping_patience) {
                log::info!(
                    "Early stopping at epoch {} (best was epoch {})",
                    epoch + 1,
                    history.best_epoch + 1
                );
                break;
            }
        }

        if val_set.is_some() {
            Ok((best_model, history))
        } else {
            Ok((self.model, history))
        }
    }

    /// Train one epoch
    fn train_epoch(&mut self, loader: impl Iterator<Item = WindowBatch<B>>) -> Metrics {
        let mut metrics = Metrics::new();

        for batch in loader {
            let predictions = self.model.forward(batch.sequences.clone());
            let loss = mse_loss(predictions.clone(), batch.targets.clone());

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &self.model);

            self.model = self
                .optimizer
                .step(self.config.learning_rate, self.model.clone(), grads);

            metrics.update(&tensor_values(predictions), &tensor_values(batch.targets));
        }

        metrics
    }
}

/// Evaluate a model on a set of windows (no gradient updates)
pub fn evaluate<B: Backend>(
    model: &PointsLstm<B>,
    set: &SequenceSet,
    batch_size: usize,
    device: &B::Device,
) -> Metrics {
    let mut metrics = Metrics::new();
    if set.is_empty() {
        return metrics;
    }

    let batcher = WindowBatcher::<B>::new(device.clone(), set.feature_count);
    let loader = DataLoaderBuilder::new(batcher)
        .batch_size(batch_size.max(1))
        .build(WindowDataset::from_sequences(set));

    for batch in loader.iter() {
        let predictions = model.forward(batch.sequences);
        metrics.update(&tensor_values(predictions), &tensor_values(batch.targets));
    }

    metrics
}

/// Per-window predictions, in the order of the set
pub fn predict_windows<B: Backend>(
    model: &PointsLstm<B>,
    set: &SequenceSet,
    batch_size: usize,
    device: &B::Device,
) -> Vec<f32> {
    if set.is_empty() {
        return Vec::new();
    }

    let batcher = WindowBatcher::<B>::new(device.clone(), set.feature_count);
    let loader = DataLoaderBuilder::new(batcher)
        .batch_size(batch_size.max(1))
        .build(WindowDataset::from_sequences(set));

    loader
        .iter()
        .flat_map(|batch| tensor_values(model.forward(batch.sequences)))
        .collect()
}

/// Flatten a tensor into host values
pub(crate) fn tensor_values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor
        .into_data()
        .iter::<B::FloatElem>()
        .map(|v| v.elem::<f32>())
        .collect()
}
