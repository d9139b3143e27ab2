//! Neural network architecture
//!
//! A single LSTM regressor over gameweek windows.

pub mod lstm;

pub use lstm::{PointsLstm, PointsLstmConfig};
