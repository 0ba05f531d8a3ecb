//! Subcommand implementations

pub mod models;
pub mod placement;
pub mod status;
