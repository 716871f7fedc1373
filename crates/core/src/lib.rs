//! Core library: archive intake, spreadsheet scanning, client matching and
//! the prediction-driven listing pipeline.

pub mod archive;
pub mod config;
pub mod error;
pub mod matcher;
pub mod pipeline;
pub mod sheets;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{IngestError, Result};
pub use providers::FilterCriteria;
pub use storage::models::Client;
