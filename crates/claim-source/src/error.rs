//! Claim source errors

use thiserror::Error;

/// Errors that can occur when reading claims from the cluster
#[derive(Debug, Error)]
pub enum ClaimSourceError {
    /// Kubernetes API error (transport, authentication, list failure)
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Transport failure not raised by the Kubernetes client itself
    #[error("Transport error: {0}")]
    Transport(String),

    /// A quantity string could not be parsed
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// A claim object could not be interpreted
    #[error("Decode failure: {0}")]
    Decode(String),

    /// The watch feed could not be established
    #[error("Watch error: {0}")]
    Watch(String),
}
