//! Main controller implementation.
//!
//! This module contains the `Controller` struct that owns the lifecycle
//! `Created → Listing → Synced → Serving → Stopped`: it performs the initial
//! listing, opens the cache-sync barrier, hands the feed to the `Watcher`, and
//! reports its state and utilization to other tasks through watch channels.

use crate::config::Config;
use crate::error::ControllerError;
use crate::classifier::Notification;
use crate::reconciler::{OverageCallback, Reconciler};
use crate::watcher::Watcher;
use chrono::{DateTime, Utc};
use claim_source::{ClaimSelector, ClaimSourceTrait, Quantity};
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Controller lifecycle states. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Constructed, not yet running
    Created,
    /// Initial listing in progress
    Listing,
    /// Listing applied; cache-sync barrier open
    Synced,
    /// Consuming the live feed
    Serving,
    /// Finished
    Stopped,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Published view of the aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Total requested storage
    pub total: Quantity,
    /// Configured ceiling
    pub ceiling: Quantity,
    /// `total > ceiling`
    pub overage: bool,
    /// Number of cached claims
    pub claims: usize,
    /// Consistency warnings raised so far
    pub inconsistencies: u64,
    /// Time of the last published change
    pub updated_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    fn initial(ceiling: Quantity) -> Self {
        Self {
            total: Quantity::ZERO,
            ceiling,
            overage: false,
            claims: 0,
            inconsistencies: 0,
            updated_at: None,
        }
    }
}

/// Read-only handle for observing the controller from other tasks.
#[derive(Debug, Clone)]
pub struct UtilizationHandle {
    snapshot: watch::Receiver<Snapshot>,
    state: watch::Receiver<ControllerState>,
}

impl UtilizationHandle {
    /// Point-in-time `(total, ceiling)`
    #[must_use]
    pub fn current_utilization(&self) -> (Quantity, Quantity) {
        let snapshot = self.snapshot.borrow();
        (snapshot.total, snapshot.ceiling)
    }

    /// Latest published snapshot
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ControllerState {
        *self.state.borrow()
    }

    /// Waits until the controller reaches `state` (or any later state).
    ///
    /// Returns `false` if the controller was dropped first.
    pub async fn wait_for_state(&self, state: ControllerState) -> bool {
        let mut receiver = self.state.clone();
        let rank = |s: &ControllerState| *s as u8;
        receiver
            .wait_for(|current| rank(current) >= rank(&state))
            .await
            .is_ok()
    }
}

/// Cache-sync barrier.
#[derive(Debug, Clone)]
pub struct CacheSync {
    synced: watch::Receiver<bool>,
}

impl CacheSync {
    /// Blocks until the initial listing is reflected in the store, or `stop` fires.
    ///
    /// Returns `true` once synced, `false` if stopped first.
    pub async fn wait_for_cache_sync(&self, stop: &CancellationToken) -> bool {
        let mut synced = self.synced.clone();
        tokio::select! {
            biased;
            () = stop.cancelled() => false,
            result = synced.wait_for(|synced| *synced) => result.is_ok(),
        }
    }
}

/// Claim watch controller.
pub struct Controller {
    source: Arc<dyn ClaimSourceTrait>,
    selector: ClaimSelector,
    resync_interval: Option<Duration>,
    sync_timeout: Option<Duration>,
    reconciler: Reconciler,
    state: watch::Sender<ControllerState>,
    synced: watch::Sender<bool>,
    snapshot: watch::Receiver<Snapshot>,
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("selector", &self.selector)
            .field("state", &*self.state.borrow())
            .field("reconciler", &self.reconciler)
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Creates a new controller instance.
    #[must_use]
    pub fn new(source: Arc<dyn ClaimSourceTrait>, config: &Config) -> Self {
        let (publisher, snapshot) = watch::channel(Snapshot::initial(config.ceiling));
        Self {
            source,
            selector: config.selector.clone(),
            resync_interval: config.resync_interval,
            sync_timeout: config.sync_timeout,
            reconciler: Reconciler::new(config.ceiling, publisher),
            state: watch::Sender::new(ControllerState::Created),
            synced: watch::Sender::new(false),
            snapshot,
        }
    }

    /// Registers a callback invoked on every overage edge with
    /// `(entering, total, ceiling)`.
    pub fn register_overage_callback<F>(&mut self, callback: F)
    where
        F: Fn(bool, Quantity, Quantity) + Send + Sync + 'static,
    {
        let callback: OverageCallback = Box::new(callback);
        self.reconciler.register_callback(callback);
    }

    /// Handle for reading utilization and state from other tasks
    #[must_use]
    pub fn utilization_handle(&self) -> UtilizationHandle {
        UtilizationHandle {
            snapshot: self.snapshot.clone(),
            state: self.state.subscribe(),
        }
    }

    /// Handle on the cache-sync barrier
    #[must_use]
    pub fn cache_sync(&self) -> CacheSync {
        CacheSync {
            synced: self.synced.subscribe(),
        }
    }

    fn transition(&self, next: ControllerState) {
        let previous = self.state.send_replace(next);
        info!("Controller state {} -> {}", previous, next);
    }

    /// Runs the controller until `stop` fires or a fatal error occurs.
    ///
    /// Always ends in `Stopped`; a requested stop returns `Ok(())`.
    pub async fn run(mut self, stop: CancellationToken) -> Result<(), ControllerError> {
        info!("Starting claim watch controller ({})", self.selector);
        let result = self.run_until_stopped(&stop).await;
        if let Err(e) = &result {
            error!("Claim watch controller failed: {}", e);
        }
        self.transition(ControllerState::Stopped);
        info!("Shutting down claim watch controller");
        result
    }

    async fn run_until_stopped(&mut self, stop: &CancellationToken) -> Result<(), ControllerError> {
        self.transition(ControllerState::Listing);
        let listed = tokio::select! {
            biased;
            () = stop.cancelled() => {
                info!("Stop requested during initial listing");
                return Ok(());
            }
            listed = self.list() => listed?,
        };

        for pvc in listed {
            self.reconciler.reconcile(Notification::ListItem(pvc));
        }
        self.reconciler.log_listing();
        self.reconciler.mark_synced();
        self.synced.send_replace(true);
        self.transition(ControllerState::Synced);

        let feed = self.source.watch_claims(&self.selector).await?;

        let cache_sync = self.cache_sync();
        if !cache_sync.wait_for_cache_sync(stop).await {
            info!("Stop requested before serving");
            return Ok(());
        }
        self.transition(ControllerState::Serving);

        Watcher::new(&mut self.reconciler, self.resync_interval)
            .serve(feed, stop)
            .await
    }

    async fn list(&self) -> Result<Vec<PersistentVolumeClaim>, ControllerError> {
        let listing = self.source.list_claims(&self.selector);
        match self.sync_timeout {
            Some(timeout) => tokio::time::timeout(timeout, listing)
                .await
                .map_err(|_elapsed| ControllerError::SyncTimeout(timeout))?
                .map_err(ControllerError::from),
            None => listing.await.map_err(ControllerError::from),
        }
    }
}
