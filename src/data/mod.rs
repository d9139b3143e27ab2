//! Data ingestion and storage
//!
//! HTTP ingestion from the FPL data mirror, the local CSV row store, and the
//! burn dataset over gameweek windows.

pub mod dataset;
pub mod fetch;
pub mod fixtures;
pub mod store;

pub use dataset::WindowDataset;
pub use fetch::{FetchOutcome, FetchReport, Fetcher};
pub use store::{Lookups, RowStore};
