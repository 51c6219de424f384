//! Mock ClaimSource for unit testing
//!
//! Stores the listing in memory and delivers feed events pushed by the test
//! through an unbounded channel, so tests control exactly what the controller
//! sees and when the feed terminates.

use crate::error::ClaimSourceError;
use crate::models::{ClaimEvent, ClaimSelector};
use crate::source_trait::{ClaimEventStream, ClaimSourceTrait};
use futures::StreamExt;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

/// Mock claim source for testing
///
/// Clones share state: keep one clone in the test and hand another to the
/// controller.
#[derive(Clone, Debug)]
pub struct MockClaimSource {
    listed: Arc<Mutex<Vec<PersistentVolumeClaim>>>,
    list_error: Arc<Mutex<Option<String>>>,
    list_delay: Arc<Mutex<Option<Duration>>>,
    sender: Arc<Mutex<Option<mpsc::UnboundedSender<ClaimEvent>>>>,
    receiver: Arc<Mutex<Option<mpsc::UnboundedReceiver<ClaimEvent>>>>,
    list_calls: Arc<AtomicUsize>,
    selectors: Arc<Mutex<Vec<ClaimSelector>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for MockClaimSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClaimSource {
    /// Create a new mock source with an empty listing and an open feed
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            listed: Arc::new(Mutex::new(Vec::new())),
            list_error: Arc::new(Mutex::new(None)),
            list_delay: Arc::new(Mutex::new(None)),
            sender: Arc::new(Mutex::new(Some(sender))),
            receiver: Arc::new(Mutex::new(Some(receiver))),
            list_calls: Arc::new(AtomicUsize::new(0)),
            selectors: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add an object to the initial listing (for test setup)
    pub fn add_listed(&self, pvc: PersistentVolumeClaim) {
        lock(&self.listed).push(pvc);
    }

    /// Make `list_claims` fail with a transport-style error
    pub fn fail_list(&self, message: impl Into<String>) {
        *lock(&self.list_error) = Some(message.into());
    }

    /// Delay `list_claims` by `delay`
    pub fn delay_list(&self, delay: Duration) {
        *lock(&self.list_delay) = Some(delay);
    }

    /// Queue an event on the feed. Events pushed before the controller
    /// starts are buffered and delivered in order.
    ///
    /// Returns `false` if the feed has been closed.
    pub fn push_event(&self, event: ClaimEvent) -> bool {
        lock(&self.sender)
            .as_ref()
            .is_some_and(|sender| sender.send(event).is_ok())
    }

    /// Close the feed: the stream ends once buffered events are drained
    pub fn close_feed(&self) {
        lock(&self.sender).take();
    }

    /// Number of `list_claims` calls made so far
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Selectors passed to `list_claims` and `watch_claims`, in call order
    #[must_use]
    pub fn selectors(&self) -> Vec<ClaimSelector> {
        lock(&self.selectors).clone()
    }
}

#[async_trait::async_trait]
impl ClaimSourceTrait for MockClaimSource {
    async fn list_claims(
        &self,
        selector: &ClaimSelector,
    ) -> Result<Vec<PersistentVolumeClaim>, ClaimSourceError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.selectors).push(selector.clone());

        let delay = *lock(&self.list_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let list_error = lock(&self.list_error).clone();
        if let Some(message) = list_error {
            return Err(ClaimSourceError::Transport(message));
        }
        Ok(lock(&self.listed).clone())
    }

    async fn watch_claims(
        &self,
        selector: &ClaimSelector,
    ) -> Result<ClaimEventStream, ClaimSourceError> {
        lock(&self.selectors).push(selector.clone());

        let receiver = lock(&self.receiver)
            .take()
            .ok_or_else(|| ClaimSourceError::Watch("mock feed already taken".to_string()))?;

        let stream = futures::stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|event| (event, receiver))
        });
        Ok(stream.boxed())
    }
}
