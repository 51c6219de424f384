//! Claim Source
//!
//! List/watch access to PersistentVolumeClaims and the claim model the
//! claim watch controller aggregates over.
//!
//! # Example
//!
//! ```no_run
//! use claim_source::{ClaimSelector, ClaimSource, ClaimSourceTrait};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = ClaimSource::try_default().await?;
//! let selector = ClaimSelector::namespaced("default").with_labels("app=db");
//!
//! let claims = source.list_claims(&selector).await?;
//! println!("{} claims", claims.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Claim model**: `Claim`, `ClaimId` and `ClaimPhase` decoded from raw objects
//! - **Quantities**: Kubernetes quantity strings (`10Mi`, `1.5G`, `500m`) as whole bytes
//! - **Feed**: `kube_runtime::watcher` backed event stream with relist markers
//! - **Mocking**: `MockClaimSource` behind the `test-util` feature

pub mod client;
pub mod error;
pub mod models;
pub mod quantity;
#[path = "trait.rs"]
pub mod source_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::ClaimSource;
pub use error::ClaimSourceError;
pub use models::*;
pub use quantity::Quantity;
pub use source_trait::{ClaimEventStream, ClaimSourceTrait};
#[cfg(feature = "test-util")]
pub use mock::MockClaimSource;
