//! Feature preparation
//!
//! Normalizes the row store and cuts it into model-ready windows.

pub mod normalize;
pub mod sequence;

pub use normalize::FeatureNormalization;
pub use sequence::{build_sequences, latest_window, latest_windows, LatestWindow, SequenceSet, Window};
