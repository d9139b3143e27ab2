//! Training metrics and evaluation

use std::fmt;

/// Metrics accumulated during training/evaluation
///
/// Loss is mean squared error, both averaged per window.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    /// Sum of squared errors over all windows
    pub squared_error_sum: f64,
    /// Sum of absolute errors over all windows
    pub absolute_error_sum: f64,
    /// Number of windows seen
    pub total_predictions: usize,
    /// Number of batches accumulated
    pub batch_count: usize,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update metrics with a batch of predictions and targets
    pub fn update(&mut self, predictions: &[f32], targets: &[f32]) {
        for (p, t) in predictions.iter().zip(targets.iter()) {
            let err = (*p - *t) as f64;
            self.squared_error_sum += err * err;
            self.absolute_error_sum += err.abs();
        }
        self.total_predictions += predictions.len().min(targets.len());
        self.batch_count += 1;
    }

    /// Mean squared error
    pub fn avg_loss(&self) -> f64 {
        if self.total_predictions == 0 {
            0.0
        } else {
            self.squared_error_sum / self.total_predictions as f64
        }
    }

    /// Mean absolute error
    pub fn mae(&self) -> f64 {
        if self.total_predictions == 0 {
            0.0
        } else {
            self.absolute_error_sum / self.total_predictions as f64
        }
    }

    /// Merge another metrics instance
    pub fn merge(&mut self, other: &Metrics) {
        self.squared_error_sum += other.squared_error_sum;
        self.absolute_error_sum += other.absolute_error_sum;
        self.total_predictions += other.total_predictions;
        self.batch_count += other.batch_count;
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Loss: {:.4} | MAE: {:.4}", self.avg_loss(), self.mae())
    }
}

/// Training history for tracking progress
#[derive(Debug, Clone, Default)]
pub struct TrainingHistory {
    pub train_losses: Vec<f64>,
    pub val_losses: Vec<f64>,
    pub train_maes: Vec<f64>,
    pub val_maes: Vec<f64>,
    pub best_val_loss: f64,
    pub best_epoch: usize,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self {
            best_val_loss: f64::INFINITY,
            ..Default::default()
        }
    }

    /// Record metrics for an epoch; returns true when this epoch is the new best
    pub fn record_epoch(&mut self, epoch: usize, train: &Metrics, val: &Metrics) -> bool {
        self.train_losses.push(train.avg_loss());
        self.val_losses.push(val.avg_loss());
        self.train_maes.push(train.mae());
        self.val_maes.push(val.mae());

        if val.avg_loss() < self.best_val_loss {
            self.best_val_loss = val.avg_loss();
            self.best_epoch = epoch;
            true
        } else {
            false
        }
    }

    /// Number of epochs recorded
    pub fn epochs_run(&self) -> usize {
        self.val_losses.len()
    }

    /// Check if we should early stop
    ///
    /// True once `patience` consecutive epochs have passed without a new best
    /// validation loss.
    pub fn should_early_stop(&self, patience: usize) -> bool {
        if patience == 0 || self.val_losses.is_empty() {
            return false;
        }
        let current_epoch = self.val_losses.len() - 1;
        current_epoch - self.best_epoch >= patience
    }
}

/// Mean and population standard deviation
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}
