//! Prediction and inference
//!
//! Load trained models and generate next-gameweek predictions.

pub mod inference;

pub use inference::{predict_next_gameweek, ModelMeta, Predictor, WindowPredictor};
