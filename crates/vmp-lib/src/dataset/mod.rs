//! Dataset provider
//!
//! Loads VM resource-usage samples from CSV or synthesizes them from fixed
//! distributions with an explicit seed.

mod provider;
mod summary;

pub use provider::{
    assign_host, generate, load, load_or_generate, save, DatasetConfig, DatasetSource,
    DATASET_COLUMNS, DEFAULT_SEED, DEFAULT_SYNTHETIC_SAMPLES,
};
pub use summary::{ColumnStats, DatasetSummary};
