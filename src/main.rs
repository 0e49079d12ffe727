//! jenkins-sync-operator - syncs PipelineConfig resources to Jenkins jobs.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Loads the typed configuration from the environment
//! - Creates the Kubernetes client
//! - Starts the controller manager and health server
//! - Handles graceful shutdown on SIGTERM/SIGINT

use std::sync::Arc;

use kube::Client;
use tokio::signal;
use tracing::{error, info};

use jenkins_sync_operator::config::SyncConfig;
use jenkins_sync_operator::health::{HealthState, run_health_server};
use jenkins_sync_operator::build_controller_manager;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jenkins_sync_operator=info".parse()?)
                .add_directive("kube=info".parse()?),
        )
        .json()
        .init();

    info!("Starting jenkins-sync-operator");

    let config = SyncConfig::from_env()?;
    if !config.enabled {
        info!("Sync is disabled by configuration, exiting");
        return Ok(());
    }

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    // Create shared health state and start the health server immediately
    // (probes should work even before the controller is up)
    let health = Arc::new(HealthState::new());
    let health_handle = {
        let health = Arc::clone(&health);
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health).await {
                error!("Health server error: {}", e);
            }
        })
    };

    let mut manager = build_controller_manager(config, client, Arc::clone(&health)).await?;
    manager.start();

    // Wait for the health server to fail or a shutdown signal
    tokio::select! {
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");
        }
    }

    manager.stop().await;
    info!("Operator stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - the operator cannot shut
/// down gracefully without them. Using expect() here is intentional.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
