//! Integration tests against a live cluster
//!
//! These tests require a reachable cluster (kubeconfig or in-cluster config)
//! and are ignored by default. Run with:
//!
//! ```sh
//! WATCH_NAMESPACE=default cargo test -p claim-source --test integration_test -- --ignored
//! ```

use claim_source::{Claim, ClaimEvent, ClaimSelector, ClaimSource, ClaimSourceTrait};
use futures::StreamExt;
use std::time::Duration;

fn selector() -> ClaimSelector {
    std::env::var("WATCH_NAMESPACE")
        .map(ClaimSelector::namespaced)
        .unwrap_or_else(|_| ClaimSelector::all())
}

#[tokio::test]
#[ignore]
async fn test_list_claims() -> anyhow::Result<()> {
    let source = ClaimSource::try_default().await?;

    let pvcs = source.list_claims(&selector()).await?;
    for pvc in &pvcs {
        let claim = Claim::try_from(pvc)?;
        println!("{} {} {}", claim.id, claim.phase, claim.requested);
    }
    println!("Found {} claims", pvcs.len());
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_watch_starts_with_relist() -> anyhow::Result<()> {
    let source = ClaimSource::try_default().await?;

    let mut feed = source.watch_claims(&selector()).await?;
    let first = tokio::time::timeout(Duration::from_secs(30), feed.next()).await?;
    assert!(matches!(first, Some(ClaimEvent::RelistStarted)));
    Ok(())
}
