//! Model training
//!
//! Training loop, hold-out evaluation, k-fold cross-validation, and metrics tracking.

pub mod cross_validation;
pub mod metrics;
pub mod trainer;

pub use cross_validation::{cross_validate, CvSummary};
pub use metrics::{Metrics, TrainingHistory};
pub use trainer::{evaluate, predict_windows, Trainer};
