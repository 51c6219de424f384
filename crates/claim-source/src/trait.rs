//! ClaimSource trait for mocking
//!
//! This trait abstracts the cluster API so the controller can be driven by an
//! in-memory source in unit tests. The concrete `ClaimSource` implements it
//! against the Kubernetes API.

use crate::error::ClaimSourceError;
use crate::models::{ClaimEvent, ClaimSelector};
use futures::stream::BoxStream;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;

/// Ordered, unbounded claim feed. The end of the stream is feed termination.
pub type ClaimEventStream = BoxStream<'static, ClaimEvent>;

/// Trait for claim list/watch operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ClaimSourceTrait: Send + Sync {
    /// One-shot listing of every claim matching `selector`.
    async fn list_claims(
        &self,
        selector: &ClaimSelector,
    ) -> Result<Vec<PersistentVolumeClaim>, ClaimSourceError>;

    /// Opens the long-lived event feed for claims matching `selector`.
    async fn watch_claims(
        &self,
        selector: &ClaimSelector,
    ) -> Result<ClaimEventStream, ClaimSourceError>;
}
