//! Controller-specific error types.
//!
//! Every variant here is fatal to the controller. Per-event problems (decode
//! failures, consistency warnings) are recovered locally and only logged.

use claim_source::ClaimSourceError;
use std::time::Duration;
use thiserror::Error;

/// Errors that stop the Claim Watch Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Cluster connection or initial listing failed; no partial store is served
    #[error("Startup failed: {0}")]
    StartupFailure(#[from] ClaimSourceError),

    /// The cache-sync barrier did not complete in time
    #[error("Cache sync did not complete within {0:?}")]
    SyncTimeout(Duration),

    /// The claim feed ended without a stop request
    #[error("Claim feed terminated: {0}")]
    FeedTerminated(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
