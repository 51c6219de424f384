//! Event classification.
//!
//! Normalizes every kind of incoming notification (list items, feed events,
//! resync replays, relist pruning) into at most one canonical `Transition`,
//! using the store's current knowledge of the identity.

use crate::store::ClaimStore;
use claim_source::{Claim, ClaimEvent, ClaimId, ClaimSourceError};
use k8s_openapi::api::core::v1::PersistentVolumeClaim;

/// Canonical state change applied to store and tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// A claim appears
    Insert(Claim),

    /// A stored claim is superseded by a newer version
    Replace {
        /// Stored version
        old: Claim,
        /// Incoming version
        new: Claim,
    },

    /// A stored claim disappears (holds the stored copy)
    Remove(Claim),
}

impl Transition {
    /// Identity the transition applies to
    #[must_use]
    pub fn id(&self) -> &ClaimId {
        match self {
            Self::Insert(claim) | Self::Remove(claim) => &claim.id,
            Self::Replace { new, .. } => &new.id,
        }
    }
}

/// Raw input to the classifier.
#[derive(Debug, Clone)]
pub enum Notification {
    /// Item of the initial listing or of a relist
    ListItem(PersistentVolumeClaim),

    /// Object added
    Added(PersistentVolumeClaim),

    /// Object changed
    Updated(PersistentVolumeClaim),

    /// Object deleted
    Deleted(PersistentVolumeClaim),

    /// Periodic replay of a cached claim
    Resync(Claim),

    /// Identity found missing after a relist
    Vanished(ClaimId),

    /// Error reported in-band by the feed
    FeedError(String),
}

impl Notification {
    /// Maps a feed event; relist markers carry no payload and map to `None`.
    #[must_use]
    pub fn from_event(event: ClaimEvent) -> Option<Self> {
        match event {
            ClaimEvent::Added(pvc) => Some(Self::Added(pvc)),
            ClaimEvent::Modified(pvc) => Some(Self::Updated(pvc)),
            ClaimEvent::Deleted(pvc) => Some(Self::Deleted(pvc)),
            ClaimEvent::Error(message) => Some(Self::FeedError(message)),
            ClaimEvent::RelistStarted | ClaimEvent::RelistDone => None,
        }
    }
}

/// Why a notification produced no transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suppression {
    /// Stored claim already has the incoming resource version
    DuplicateVersion(ClaimId),

    /// Delete for an identity that is not stored
    AlreadyRemoved(ClaimId),
}

impl Suppression {
    /// Identity the suppressed notification referred to
    #[must_use]
    pub fn id(&self) -> &ClaimId {
        match self {
            Self::DuplicateVersion(id) | Self::AlreadyRemoved(id) => id,
        }
    }
}

/// Classifier verdict.
#[derive(Debug)]
pub enum Classification {
    /// Apply this transition
    Transition(Transition),

    /// Nothing to apply
    Suppressed(Suppression),

    /// Payload could not be interpreted
    DecodeFailure(ClaimSourceError),

    /// Feed reported an error; nothing to apply
    FeedError(String),
}

/// Upsert-style classification shared by list items, adds, updates and resyncs.
fn classify_upsert(incoming: Claim, store: &ClaimStore) -> Classification {
    match store.get(&incoming.id) {
        None => Classification::Transition(Transition::Insert(incoming)),
        Some(stored) if stored.resource_version == incoming.resource_version => {
            Classification::Suppressed(Suppression::DuplicateVersion(incoming.id))
        }
        Some(stored) => Classification::Transition(Transition::Replace {
            old: stored.clone(),
            new: incoming,
        }),
    }
}

fn classify_remove(id: ClaimId, store: &ClaimStore) -> Classification {
    match store.get(&id) {
        Some(stored) => Classification::Transition(Transition::Remove(stored.clone())),
        None => Classification::Suppressed(Suppression::AlreadyRemoved(id)),
    }
}

/// Decides the transition for `notification` given the current `store`.
pub fn classify(notification: Notification, store: &ClaimStore) -> Classification {
    match notification {
        Notification::ListItem(pvc) | Notification::Added(pvc) | Notification::Updated(pvc) => {
            match Claim::try_from(&pvc) {
                Ok(incoming) => classify_upsert(incoming, store),
                Err(e) => Classification::DecodeFailure(e),
            }
        }
        Notification::Resync(claim) => classify_upsert(claim, store),
        // Only the identity is needed to remove; the stored copy is authoritative
        Notification::Deleted(pvc) => match ClaimId::of(&pvc) {
            Some(id) => classify_remove(id, store),
            None => Classification::DecodeFailure(ClaimSourceError::Decode(
                "deleted PersistentVolumeClaim missing name".to_string(),
            )),
        },
        Notification::Vanished(id) => classify_remove(id, store),
        Notification::FeedError(message) => Classification::FeedError(message),
    }
}
