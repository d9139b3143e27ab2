//! Model inference for next-gameweek predictions

use std::collections::BTreeMap;
use std::path::Path;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::store::RowStore;
use crate::features::{latest_windows, FeatureNormalization};
use crate::model::{PointsLstm, PointsLstmConfig};
use crate::training::trainer::tensor_values;
use crate::{Column, Config, FplError, PlayerId, Result};

/// Anything that maps one window of feature tuples to a predicted value
pub trait WindowPredictor {
    fn predict(&self, sequence: &[Vec<f32>]) -> f32;

    /// Predict several windows at once, in order
    fn predict_batch(&self, sequences: &[&[Vec<f32>]]) -> Vec<f32> {
        sequences.iter().map(|s| self.predict(s)).collect()
    }
}

impl<F> WindowPredictor for F
where
    F: Fn(&[Vec<f32>]) -> f32,
{
    fn predict(&self, sequence: &[Vec<f32>]) -> f32 {
        self(sequence)
    }
}

/// Predict the next gameweek for every player with enough history
///
/// Players with fewer than `window_length` rows get no entry; every other
/// player gets exactly one.
pub fn predict_next_gameweek<P: WindowPredictor + ?Sized>(
    store: &RowStore,
    window_length: usize,
    features: &[Column],
    predictor: &P,
) -> Result<BTreeMap<PlayerId, f32>> {
    let windows = latest_windows(store, window_length, features)?;
    let sequences: Vec<&[Vec<f32>]> = windows.iter().map(|w| w.sequence.as_slice()).collect();
    let predictions = predictor.predict_batch(&sequences);

    Ok(windows
        .iter()
        .zip(predictions)
        .map(|(w, p)| (w.player_id, p))
        .collect())
}

/// Everything besides the weights needed to reuse a trained model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMeta {
    pub model: PointsLstmConfig,
    pub normalization: FeatureNormalization,
    pub window_length: usize,
    pub features: Vec<Column>,
    pub target: Column,
    pub season: String,
    pub trained_at: DateTime<Utc>,
    pub train_windows: usize,
    pub test_loss: Option<f64>,
    pub test_mae: Option<f64>,
}

impl ModelMeta {
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Predictor backed by a trained LSTM
pub struct Predictor<B: Backend> {
    model: PointsLstm<B>,
    meta: ModelMeta,
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    pub fn new(model: PointsLstm<B>, meta: ModelMeta, device: B::Device) -> Self {
        Predictor { model, meta, device }
    }

    /// Load the saved model and its metadata
    pub fn load(config: &Config, device: B::Device) -> Result<Self>
    where
        B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
        B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
    {
        let model_file = config.data.model_file();
        let meta_file = config.data.model_meta_file();
        if !model_file.exists() || !meta_file.exists() {
            return Err(FplError::NoModel);
        }

        let meta = ModelMeta::load(&meta_file)?;
        let model_path = config.data.model_path.to_str().ok_or_else(|| {
            FplError::Config(format!("model path is not valid UTF-8: {}", config.data.model_path.display()))
        })?;
        let model = PointsLstm::load(&device, model_path, &meta.model)?;

        log::info!(
            "Loaded model from {} (trained {}, {} windows)",
            model_file.display(),
            meta.trained_at.format("%Y-%m-%d %H:%M"),
            meta.train_windows
        );

        Ok(Self::new(model, meta, device))
    }

    pub fn meta(&self) -> &ModelMeta {
        &self.meta
    }

    /// Predict for every player in a store that has not been normalized yet
    pub fn predict_store(&self, store: &mut RowStore) -> Result<BTreeMap<PlayerId, f32>> {
        self.meta.normalization.apply(store);
        predict_next_gameweek(store, self.meta.window_length, &self.meta.features, self)
    }
}

impl<B: Backend> WindowPredictor for Predictor<B> {
    fn predict(&self, sequence: &[Vec<f32>]) -> f32 {
        self.predict_batch(&[sequence]).first().copied().unwrap_or(0.0)
    }

    fn predict_batch(&self, sequences: &[&[Vec<f32>]]) -> Vec<f32> {
        let batch_size = sequences.len();
        if batch_size == 0 {
            return Vec::new();
        }
        let window_length = sequences[0].len();
        let feature_count = self.meta.model.input_dim;

        let data: Vec<f32> = sequences
            .iter()
            .flat_map(|s| s.iter().flatten().copied())
            .collect();
        let input = Tensor::<B, 1>::from_floats(data.as_slice(), &self.device)
            .reshape([batch_size, window_length, feature_count]);

        tensor_values(self.model.forward(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GameweekRow;
    use burn::backend::NdArray;

    fn store() -> RowStore {
        let mut rows = Vec::new();
        for (pid, gws) in [(7, 6), (3, 2), (1, 4)] {
            for gw in 1..=gws {
                let mut row = GameweekRow::new(PlayerId(pid), gw);
                row.minutes = gw as f32;
                row.points = Some(1.0);
                rows.push(row);
            }
        }
        RowStore::from_rows(rows, Column::ALL)
    }

    #[test]
    fn test_one_prediction_per_eligible_player() {
        let last_minutes = |s: &[Vec<f32>]| s.last().map(|f| f[0]).unwrap_or(-1.0);
        let predictions = predict_next_gameweek(&store(), 3, &[Column::Minutes], &last_minutes).unwrap();

        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions.keys().copied().collect::<Vec<_>>(), vec![PlayerId(1), PlayerId(7)]);
        assert_eq!(predictions[&PlayerId(7)], 6.0);
        assert_eq!(predictions[&PlayerId(1)], 4.0);
    }

    #[test]
    fn test_no_eligible_players_is_empty_not_error() {
        let predictions = predict_next_gameweek(&store(), 10, &[Column::Minutes], &|_: &[Vec<f32>]| 0.0_f32).unwrap();
        assert!(predictions.is_empty());
    }

    #[test]
    fn test_missing_feature_column_is_error() {
        let rows = vec![GameweekRow::new(PlayerId(1), 1)];
        let store = RowStore::from_rows(rows, [Column::Minutes]);
        let result = predict_next_gameweek(&store, 1, &[Column::Goals], &|_: &[Vec<f32>]| 0.0_f32);
        assert!(matches!(result, Err(FplError::MissingColumn { .. })));
    }

    fn meta(input_dim: usize) -> ModelMeta {
        ModelMeta {
            model: PointsLstmConfig {
                input_dim,
                hidden_size: 4,
                dense_size: 2,
                dropout: 0.2,
            },
            normalization: FeatureNormalization::default(),
            window_length: 3,
            features: vec![Column::Minutes],
            target: Column::Points,
            season: "2024-25".to_string(),
            trained_at: Utc::now(),
            train_windows: 10,
            test_loss: Some(1.5),
            test_mae: None,
        }
    }

    #[test]
    fn test_burn_predictor_batches() {
        let device = Default::default();
        let meta = meta(1);
        let model = PointsLstm::<NdArray<f32>>::new(&device, &meta.model);
        let predictor = Predictor::new(model, meta, device);

        let predictions = predict_next_gameweek(&store(), 3, &[Column::Minutes], &predictor).unwrap();
        assert_eq!(predictions.len(), 2);

        let window: Vec<Vec<f32>> = vec![vec![5.0], vec![6.0], vec![4.0]];
        let single = predictor.predict(&window);
        let batched = predictor.predict_batch(&[window.as_slice()]);
        assert!((single - batched[0]).abs() < 1e-6);
    }

    #[test]
    fn test_meta_roundtrip_and_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model").join("fpl_lstm.meta.json");
        meta(3).save(&path).unwrap();
        let loaded = ModelMeta::load(&path).unwrap();
        assert_eq!(loaded.window_length, 3);
        assert_eq!(loaded.model.input_dim, 3);
        assert_eq!(loaded.test_loss, Some(1.5));

        let mut config = Config::default();
        config.data.model_path = dir.path().join("absent");
        let result = Predictor::<NdArray<f32>>::load(&config, Default::default());
        assert!(matches!(result, Err(FplError::NoModel)));
    }
}
