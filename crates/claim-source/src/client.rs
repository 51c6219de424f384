//! Kubernetes claim source
//!
//! Lists PersistentVolumeClaims through `Api::list` and follows them with
//! `kube_runtime::watcher`, which re-lists on desync and reconnects with
//! backoff. Watcher events are mapped onto `ClaimEvent`s; a relist is framed
//! by `RelistStarted` / `RelistDone` so the consumer can prune vanished claims.

use crate::error::ClaimSourceError;
use crate::models::{ClaimEvent, ClaimSelector};
use crate::source_trait::{ClaimEventStream, ClaimSourceTrait};
use futures::StreamExt;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::api::ListParams;
use kube::{Api, Client};
use kube_runtime::{WatchStreamExt, watcher};
use tracing::{debug, info};

/// Claim source backed by the Kubernetes API
#[derive(Clone)]
pub struct ClaimSource {
    client: Client,
}

impl std::fmt::Debug for ClaimSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimSource").finish_non_exhaustive()
    }
}

impl ClaimSource {
    /// Create a claim source from an existing client
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Create a claim source using the inferred kubeconfig / in-cluster config
    pub async fn try_default() -> Result<Self, ClaimSourceError> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    fn api(&self, selector: &ClaimSelector) -> Api<PersistentVolumeClaim> {
        match selector.namespace.as_deref() {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }
}

/// Maps one watcher step onto the claim feed.
fn to_claim_event(
    result: Result<watcher::Event<PersistentVolumeClaim>, watcher::Error>,
) -> ClaimEvent {
    match result {
        Ok(watcher::Event::Init) => ClaimEvent::RelistStarted,
        Ok(watcher::Event::InitApply(pvc)) => ClaimEvent::Added(pvc),
        Ok(watcher::Event::InitDone) => ClaimEvent::RelistDone,
        Ok(watcher::Event::Apply(pvc)) => ClaimEvent::Modified(pvc),
        Ok(watcher::Event::Delete(pvc)) => ClaimEvent::Deleted(pvc),
        Err(e) => ClaimEvent::Error(e.to_string()),
    }
}

#[async_trait::async_trait]
impl ClaimSourceTrait for ClaimSource {
    async fn list_claims(
        &self,
        selector: &ClaimSelector,
    ) -> Result<Vec<PersistentVolumeClaim>, ClaimSourceError> {
        let mut params = ListParams::default();
        if let Some(labels) = selector.label_selector.as_deref() {
            params = params.labels(labels);
        }
        if let Some(fields) = selector.field_selector.as_deref() {
            params = params.fields(fields);
        }

        debug!("Listing PersistentVolumeClaims ({})", selector);
        let list = self.api(selector).list(&params).await?;
        info!("Listed {} PersistentVolumeClaims", list.items.len());
        Ok(list.items)
    }

    async fn watch_claims(
        &self,
        selector: &ClaimSelector,
    ) -> Result<ClaimEventStream, ClaimSourceError> {
        let mut config = watcher::Config::default();
        if let Some(labels) = selector.label_selector.as_deref() {
            config = config.labels(labels);
        }
        if let Some(fields) = selector.field_selector.as_deref() {
            config = config.fields(fields);
        }

        info!("Starting PersistentVolumeClaim watcher ({})", selector);
        let stream = watcher(self.api(selector), config)
            .default_backoff()
            .map(to_claim_event)
            .boxed();
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn named(name: &str) -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_watcher_events_map_to_claim_events() {
        assert!(matches!(
            to_claim_event(Ok(watcher::Event::Init)),
            ClaimEvent::RelistStarted
        ));
        assert!(matches!(
            to_claim_event(Ok(watcher::Event::InitDone)),
            ClaimEvent::RelistDone
        ));
        assert!(matches!(
            to_claim_event(Ok(watcher::Event::InitApply(named("a")))),
            ClaimEvent::Added(pvc) if pvc.metadata.name.as_deref() == Some("a")
        ));
        assert!(matches!(
            to_claim_event(Ok(watcher::Event::Apply(named("b")))),
            ClaimEvent::Modified(_)
        ));
        assert!(matches!(
            to_claim_event(Ok(watcher::Event::Delete(named("c")))),
            ClaimEvent::Deleted(_)
        ));
    }
}
