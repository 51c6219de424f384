//! Claim Watch Controller
//!
//! Watches PersistentVolumeClaims, keeps a running total of requested
//! storage, and takes action when the total crosses a configured ceiling.
//!
//! The controller lists all matching claims, opens its cache-sync barrier,
//! then follows the watch feed, applying every add/update/delete to an
//! in-memory store and an incrementally maintained aggregate.

mod classifier;
mod config;
mod controller;
mod error;
mod reconciler;
mod store;
mod tracker;
mod watcher;
#[cfg(test)]
mod test_utils;

use crate::config::Config;
use crate::error::ControllerError;
use claim_source::ClaimSource;
use controller::{Controller, ControllerState};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // kube and rustls may both pull in a crypto backend; pin ring
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("rustls crypto provider already installed");
    }

    info!("Starting Claim Watch Controller");

    let config = Config::from_env()?;

    info!("Configuration:");
    info!("  Namespace: {}", config.selector.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Label selector: {}", config.selector.label_selector.as_deref().unwrap_or("<none>"));
    info!("  Field selector: {}", config.selector.field_selector.as_deref().unwrap_or("<none>"));
    info!("  Max claims: {}", config.ceiling);
    info!("  Resync interval: {:?}", config.resync_interval);
    info!("  Sync timeout: {:?}", config.sync_timeout);

    let source = ClaimSource::try_default().await?;
    let mut controller = Controller::new(Arc::new(source), &config);
    controller.register_overage_callback(|entering, total, ceiling| {
        if entering {
            warn!("*** Taking action ***: claimed {} exceeds max {}", total, ceiling);
        } else {
            info!("*** Overage cleared ***: claimed {} within max {}", total, ceiling);
        }
    });

    let stop = CancellationToken::new();
    let signal_stop = stop.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                signal_stop.cancel();
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    let handle = controller.utilization_handle();
    let ready = handle.clone();
    tokio::spawn(async move {
        if ready.wait_for_state(ControllerState::Serving).await {
            let snapshot = ready.snapshot();
            info!(
                "Controller ready: {} claims, {} of {} claimed",
                snapshot.claims, snapshot.total, snapshot.ceiling
            );
        }
    });

    let result = controller.run(stop).await;
    let (total, ceiling) = handle.current_utilization();
    info!(
        "Controller {}: claimed total {} of {}",
        handle.state(),
        total,
        ceiling
    );
    result
}
