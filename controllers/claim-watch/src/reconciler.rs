//! Reconciliation of notifications into store and aggregate.
//!
//! The `Reconciler` is the single owner of the claim store and the aggregate
//! tracker. Each notification is classified against the store, and the
//! resulting transition is applied to both in one step, so the total always
//! equals the sum of stored requests between calls. Once synced, overage is
//! re-evaluated after every aggregate-moving transition and the registered
//! callbacks fire on edges only.

use crate::classifier::{Classification, Notification, Suppression, Transition, classify};
use crate::controller::Snapshot;
use crate::store::{ClaimStore, UpsertOutcome};
use crate::tracker::{AggregateTracker, Utilization};
use chrono::Utc;
use claim_source::{Claim, ClaimId, Quantity};
use std::collections::HashSet;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Overage callback: `(entering, total, ceiling)`.
pub type OverageCallback = Box<dyn Fn(bool, Quantity, Quantity) + Send + Sync>;

/// Direction of an overage edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverageEdge {
    /// Total rose above the ceiling
    Entered,
    /// Total fell back to or below the ceiling
    Exited,
}

/// Kind of transition that was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// Claim inserted
    Insert,
    /// Claim replaced; records whether the requested quantity changed
    Replace {
        /// `true` if old and new requests differ
        quantity_changed: bool,
    },
    /// Claim removed
    Remove,
}

impl TransitionKind {
    fn of(transition: &Transition) -> Self {
        match transition {
            Transition::Insert(_) => Self::Insert,
            Transition::Replace { old, new } => Self::Replace {
                quantity_changed: old.requested != new.requested,
            },
            Transition::Remove(_) => Self::Remove,
        }
    }

    /// Whether overage must be re-evaluated after this transition
    #[must_use]
    pub fn moves_aggregate(self) -> bool {
        match self {
            Self::Insert | Self::Remove => true,
            Self::Replace { quantity_changed } => quantity_changed,
        }
    }
}

/// Outcome of reconciling one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    /// A transition was applied
    Applied {
        /// What was applied
        kind: TransitionKind,
        /// Overage edge crossed by this transition, if any
        edge: Option<OverageEdge>,
    },
    /// Classifier suppressed the notification
    Suppressed(Suppression),
    /// Notification was unusable (decode failure or feed error) and skipped
    Skipped,
}

/// Single owner of claim store, aggregate and overage state.
pub struct Reconciler {
    store: ClaimStore,
    tracker: AggregateTracker,
    synced: bool,
    overage: bool,
    callbacks: Vec<OverageCallback>,
    publisher: watch::Sender<Snapshot>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("claims", &self.store.len())
            .field("tracker", &self.tracker)
            .field("synced", &self.synced)
            .field("overage", &self.overage)
            .field("callbacks", &self.callbacks.len())
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a reconciler with an empty store.
    ///
    /// Snapshots are published on `publisher` after every applied transition.
    #[must_use]
    pub fn new(ceiling: Quantity, publisher: watch::Sender<Snapshot>) -> Self {
        Self {
            store: ClaimStore::new(),
            tracker: AggregateTracker::new(ceiling),
            synced: false,
            overage: false,
            callbacks: Vec::new(),
            publisher,
        }
    }

    /// Registers a callback invoked on every overage edge.
    pub fn register_callback(&mut self, callback: OverageCallback) {
        self.callbacks.push(callback);
    }

    /// Read access to the store
    #[cfg(test)]
    pub fn store(&self) -> &ClaimStore {
        &self.store
    }

    /// Read access to the aggregate
    #[cfg(test)]
    pub fn tracker(&self) -> &AggregateTracker {
        &self.tracker
    }

    /// Classifies `notification` and applies the resulting transition, if any.
    pub fn reconcile(&mut self, notification: Notification) -> Reconciled {
        match classify(notification, &self.store) {
            Classification::Transition(transition) => {
                let kind = self.apply(transition);
                let edge = if self.synced && kind.moves_aggregate() {
                    self.evaluate_overage()
                } else {
                    None
                };
                self.publish();
                Reconciled::Applied { kind, edge }
            }
            Classification::Suppressed(suppression) => {
                debug!("Suppressed notification for {}: {:?}", suppression.id(), suppression);
                Reconciled::Suppressed(suppression)
            }
            Classification::DecodeFailure(e) => {
                warn!("Skipping undecodable claim notification: {}", e);
                Reconciled::Skipped
            }
            Classification::FeedError(message) => {
                warn!("Claim watch error: {}", message);
                Reconciled::Skipped
            }
        }
    }

    /// Marks the initial listing as applied, enabling edge evaluation.
    ///
    /// Evaluates overage once so a listing that already exceeds the ceiling
    /// reports an `Entered` edge.
    pub fn mark_synced(&mut self) -> Option<OverageEdge> {
        self.synced = true;
        let edge = self.evaluate_overage();
        self.publish();
        edge
    }

    /// Replays every cached claim as an update notification.
    ///
    /// Each replay carries the stored resource version, so the classifier
    /// suppresses it as a duplicate and the aggregate never moves. Returns
    /// the number of replays that were applied, which is always zero.
    pub fn resync(&mut self) -> usize {
        let cached: Vec<Claim> = self.store.list().cloned().collect();
        let replayed = cached.len();
        let applied = cached
            .into_iter()
            .filter(|claim| {
                matches!(
                    self.reconcile(Notification::Resync(claim.clone())),
                    Reconciled::Applied { .. }
                )
            })
            .count();
        debug!(
            "Resync replayed {} claims ({} applied); {}",
            replayed,
            applied,
            self.tracker.utilization()
        );
        applied
    }

    /// Removes every stored claim whose identity is not in `seen`.
    ///
    /// Returns the identities removed.
    pub fn prune_unseen(&mut self, seen: &HashSet<ClaimId>) -> Vec<ClaimId> {
        let mut vanished: Vec<ClaimId> = self
            .store
            .ids()
            .into_iter()
            .filter(|id| !seen.contains(id))
            .collect();
        vanished.sort();
        for id in &vanished {
            info!("Claim {} vanished during relist", id);
            self.reconcile(Notification::Vanished(id.clone()));
        }
        vanished
    }

    /// Logs the listing table and total, once the store is synced.
    pub fn log_listing(&self) {
        if self.store.is_empty() {
            info!("No claims found");
            return;
        }
        let mut claims: Vec<&Claim> = self.store.list().collect();
        claims.sort_by(|a, b| a.id.cmp(&b.id));

        info!("{:<32}{:<8}{:<8}", "NAME", "STATUS", "CAPACITY");
        for claim in claims {
            info!(
                "{:<32}{:<8}{:<8}",
                claim.id.to_string(),
                claim.phase,
                claim.requested.to_string()
            );
        }
        info!("Total capacity claimed: {}", self.tracker.total());
    }

    /// Current snapshot of the aggregate.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let Utilization { total, ceiling } = self.tracker.utilization();
        Snapshot {
            total,
            ceiling,
            overage: self.tracker.is_overage(),
            claims: self.store.len(),
            inconsistencies: self.tracker.inconsistencies(),
            updated_at: Some(Utc::now()),
        }
    }

    fn publish(&self) {
        self.publisher.send_replace(self.snapshot());
    }

    fn log_transition(&self, message: &str) {
        if self.synced {
            info!("{}", message);
        } else {
            debug!("{}", message);
        }
    }

    fn apply(&mut self, transition: Transition) -> TransitionKind {
        let kind = TransitionKind::of(&transition);
        match &transition {
            Transition::Insert(claim) => self.log_transition(&format!(
                "ADD: claim {} added, claim size {}",
                claim.id, claim.requested
            )),
            Transition::Replace { old, new } => self.log_transition(&format!(
                "UPDATE: claim {} updated, claim size {} -> {}",
                new.id, old.requested, new.requested
            )),
            Transition::Remove(claim) => self.log_transition(&format!(
                "DELETED: claim {} removed, claim size {}",
                claim.id, claim.requested
            )),
        }

        self.tracker.apply(&transition);
        match transition {
            Transition::Insert(claim) | Transition::Replace { new: claim, .. } => {
                if self.store.upsert(claim) == UpsertOutcome::Duplicate {
                    error!("Store reported a duplicate for a classified transition");
                }
            }
            Transition::Remove(claim) => {
                if let Err(e) = self.store.remove(&claim.id) {
                    error!("Store out of step with classified removal: {}", e);
                }
            }
        }

        debug_assert_eq!(
            self.store.requested_sum(),
            self.tracker.total().bytes(),
            "aggregate diverged from store"
        );
        self.log_transition(&self.tracker.utilization().to_string());
        kind
    }

    fn evaluate_overage(&mut self) -> Option<OverageEdge> {
        let Utilization { total, ceiling } = self.tracker.utilization();
        let overage = self.tracker.is_overage();
        if overage == self.overage {
            return None;
        }
        self.overage = overage;

        let edge = if overage {
            warn!(
                "Claim overage reached: max {} at {} ({:.1}%)",
                ceiling,
                total,
                self.tracker.utilization_ratio() * 100.0
            );
            OverageEdge::Entered
        } else {
            info!("Claim usage normal: max {} at {}", ceiling, total);
            OverageEdge::Exited
        };
        for callback in &self.callbacks {
            callback(overage, total, ceiling);
        }
        Some(edge)
    }
}
