//! VM placement server: HTTP API and configuration

pub mod api;
pub mod config;
