//! VM placement server
//!
//! Trains the placement models on demand and serves host recommendations
//! over HTTP.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vmp_lib::{
    health::{components, HealthRegistry},
    observability::{PlacementMetrics, StructuredLogger},
    PlacementEngine,
};
use vmp_server::{api, config};

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting vmp-server");

    let config = config::ServerConfig::load()?;
    info!(
        port = config.api_port,
        dataset = %config.dataset_path.display(),
        model_dir = %config.model_dir.display(),
        "Server configured"
    );

    let health_registry = HealthRegistry::new();
    for name in components::ALL {
        health_registry.register(name).await;
    }

    let metrics = PlacementMetrics::new();
    let logger = StructuredLogger::new(format!("vmp-server:{}", config.api_port));

    let engine = match PlacementEngine::new(config.pipeline()) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            health_registry
                .set_unhealthy(components::SNAPSHOT_STORE, e.to_string())
                .await;
            return Err(e.into());
        }
    };

    if config.restore_on_start {
        let restore = Arc::clone(&engine);
        match tokio::task::spawn_blocking(move || restore.restore_from_disk()).await? {
            Ok(Some(version)) => info!(version = version, "Restored model snapshot"),
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Failed to restore snapshot, models must be retrained");
                health_registry
                    .set_degraded(components::SNAPSHOT_STORE, e.to_string())
                    .await;
            }
        }
    }

    if config.train_on_start && !engine.is_initialized() {
        let trainer = Arc::clone(&engine);
        match tokio::task::spawn_blocking(move || trainer.initialize()).await? {
            Ok(outcome) => info!(
                models_trained = outcome.summary.models_trained,
                version = outcome.snapshot_version,
                "Initial training completed"
            ),
            Err(e) => {
                warn!(error = %e, "Initial training failed");
                health_registry
                    .set_degraded(components::TRAINER, e.to_string())
                    .await;
            }
        }
    }

    let app_state = Arc::new(api::AppState::new(
        engine,
        health_registry.clone(),
        metrics,
    ));

    health_registry.set_ready(true).await;
    logger.log_startup(SERVER_VERSION, config.api_port);

    tokio::select! {
        result = api::serve(config.api_port, app_state) => result?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
            info!("Shutting down");
        }
    }

    Ok(())
}
