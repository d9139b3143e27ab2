//! K-fold cross-validation of the LSTM model

use std::fmt;

use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::data::dataset::validation_split;
use crate::features::SequenceSet;
use crate::model::PointsLstmConfig;
use crate::training::metrics::mean_std;
use crate::training::trainer::{evaluate, Trainer};
use crate::{FplError, Result, TrainingConfig};

/// Cross-validation split
#[derive(Debug, Clone)]
pub struct CvSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

/// Shuffled k-fold splits
///
/// Folds are contiguous runs of the shuffled indices; the first `n % k`
/// folds get one extra window.
pub fn k_fold(n_samples: usize, n_folds: usize, seed: u64) -> Result<Vec<CvSplit>> {
    if n_folds < 2 {
        return Err(FplError::Config(format!("k_folds must be at least 2, got {}", n_folds)));
    }
    if n_samples < n_folds {
        return Err(FplError::Model(format!(
            "cannot split {} windows into {} folds",
            n_samples, n_folds
        )));
    }

    let mut indices: Vec<usize> = (0..n_samples).collect();
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let base = n_samples / n_folds;
    let extra = n_samples % n_folds;

    let mut splits = Vec::with_capacity(n_folds);
    let mut start = 0;
    for i in 0..n_folds {
        let size = base + usize::from(i < extra);
        let end = start + size;

        let test_indices = indices[start..end].to_vec();
        let train_indices = indices[..start]
            .iter()
            .chain(indices[end..].iter())
            .copied()
            .collect();

        splits.push(CvSplit {
            train_indices,
            test_indices,
        });
        start = end;
    }

    Ok(splits)
}

/// Training windows of a fold, minus the validation tail held back from fitting
///
/// Returns `(fit, held_back)`.
pub fn fold_training_part(set: &SequenceSet, split: &CvSplit, validation_fraction: f32) -> (SequenceSet, SequenceSet) {
    validation_split(&set.select(&split.train_indices), validation_fraction)
}

/// Held-out scores of one fold
#[derive(Debug, Clone, Copy)]
pub struct FoldScore {
    pub loss: f64,
    pub mae: f64,
}

/// Per-fold scores with their mean and population standard deviation
#[derive(Debug, Clone)]
pub struct CvSummary {
    pub folds: Vec<FoldScore>,
}

impl CvSummary {
    pub fn loss(&self) -> (f64, f64) {
        mean_std(&self.folds.iter().map(|f| f.loss).collect::<Vec<_>>())
    }

    pub fn mae(&self) -> (f64, f64) {
        mean_std(&self.folds.iter().map(|f| f.mae).collect::<Vec<_>>())
    }
}

impl fmt::Display for CvSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (loss, loss_std) = self.loss();
        let (mae, mae_std) = self.mae();
        write!(
            f,
            "{}-fold CV: Loss {:.4} ± {:.4} | MAE {:.4} ± {:.4}",
            self.folds.len(),
            loss,
            loss_std,
            mae,
            mae_std
        )
    }
}

/// Train a fresh model per fold and score it on the held-out fold
///
/// Every fold fits on the first `1 - validation_split` of its training part
/// and runs the configured number of epochs without early stopping.
pub fn cross_validate<B: AutodiffBackend>(
    device: &B::Device,
    set: &SequenceSet,
    model_config: &PointsLstmConfig,
    config: &TrainingConfig,
) -> Result<CvSummary> {
    let splits = k_fold(set.len(), config.k_folds, config.seed)?;
    let mut folds = Vec::with_capacity(splits.len());

    for (i, split) in splits.iter().enumerate() {
        let (train, _) = fold_training_part(set, split, config.validation_split);
        let test = set.select(&split.test_indices);

        let trainer = Trainer::<B>::new(device.clone(), model_config, config.clone());
        let (model, _) = trainer.train(&train, None)?;

        let metrics = evaluate(&model.valid(), &test, config.batch_size, device);
        log::info!("Fold {}/{}: {}", i + 1, splits.len(), metrics);

        folds.push(FoldScore {
            loss: metrics.avg_loss(),
            mae: metrics.mae(),
        });
    }

    let summary = CvSummary { folds };
    log::info!("{}", summary);
    Ok(summary)
}
