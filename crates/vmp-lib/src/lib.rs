//! VM placement library
//!
//! This crate provides the core functionality for:
//! - Loading or synthesizing VM resource-usage datasets
//! - Feature engineering, encoding and scaling
//! - Training, evaluating and tuning a family of regressors
//! - Versioned model snapshots with on-disk persistence
//! - Host placement prediction and proxy objective scoring
//! - Health checks and observability

pub mod dataset;
pub mod engine;
pub mod error;
pub mod estimators;
pub mod features;
pub mod health;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod registry;
pub mod snapshot;
pub mod trainer;

pub use engine::{
    FeatureImportance, InitializeOutcome, PerformanceReport, PerformanceRow, PipelineConfig,
    PlacementEngine, TuneOutcome,
};
pub use error::{PlacementError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{PlacementMetrics, StructuredLogger};
