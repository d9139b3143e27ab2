//! LSTM model for next-gameweek points
//!
//! Reads a window of gameweek features and regresses a single value.

use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig, Lstm, LstmConfig};
use burn::record::{FullPrecisionSettings, Recorder};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use crate::{FplError, ModelConfig, Result};

/// Configuration for the LSTM model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsLstmConfig {
    /// Features per gameweek
    pub input_dim: usize,
    /// LSTM hidden size
    pub hidden_size: usize,
    /// Width of the dense layer after the LSTM
    pub dense_size: usize,
    pub dropout: f64,
}

impl PointsLstmConfig {
    pub fn from_model_config(config: &ModelConfig, input_dim: usize) -> Self {
        PointsLstmConfig {
            input_dim,
            hidden_size: config.hidden_size,
            dense_size: config.dense_size,
            dropout: config.dropout,
        }
    }
}

impl Default for PointsLstmConfig {
    fn default() -> Self {
        PointsLstmConfig::from_model_config(&ModelConfig::default(), 3)
    }
}

/// LSTM regressor
///
/// Architecture:
/// 1. LSTM over the window -> final hidden state
/// 2. Dropout -> Linear + ReLU -> Dropout
/// 3. Linear -> predicted points
#[derive(Module, Debug)]
pub struct PointsLstm<B: Backend> {
    lstm: Lstm<B>,
    dropout: Dropout,
    dense: Linear<B>,
    output: Linear<B>,
    hidden_size: usize,
}

impl<B: Backend> PointsLstm<B> {
    pub fn new(device: &B::Device, config: &PointsLstmConfig) -> Self {
        let lstm = LstmConfig::new(config.input_dim, config.hidden_size, true).init(device);
        let dropout = DropoutConfig::new(config.dropout).init();
        let dense = LinearConfig::new(config.hidden_size, config.dense_size).init(device);
        let output = LinearConfig::new(config.dense_size, 1).init(device);

        PointsLstm {
            lstm,
            dropout,
            dense,
            output,
            hidden_size: config.hidden_size,
        }
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `sequences` - Windows [batch, window_length, features]
    ///
    /// # Returns
    /// Predicted points [batch, 1]
    pub fn forward(&self, sequences: Tensor<B, 3>) -> Tensor<B, 2> {
        let batch_size = sequences.dims()[0];

        let (_, state) = self.lstm.forward(sequences, None);
        let x = state.hidden.reshape([batch_size, self.hidden_size]);

        let x = self.dropout.forward(x);
        let x = relu(self.dense.forward(x));
        let x = self.dropout.forward(x);
        self.output.forward(x)
    }

    /// Save model to `path` (the recorder appends `.mpk`)
    pub fn save(&self, path: &str) -> Result<()>
    where
        B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
        B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
    {
        let recorder = burn::record::NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        recorder
            .record(self.clone().into_record(), path.into())
            .map_err(|e| FplError::Model(e.to_string()))
    }

    /// Load model from `path`
    pub fn load(device: &B::Device, path: &str, config: &PointsLstmConfig) -> Result<Self>
    where
        B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
        B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
    {
        let recorder = burn::record::NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let record = recorder
            .load(path.into(), device)
            .map_err(|e| FplError::Model(e.to_string()))?;

        Ok(Self::new(device, config).load_record(record))
    }
}
