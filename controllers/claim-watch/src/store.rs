//! Claim store.
//!
//! In-memory cache of the last-known state of every claim, keyed by
//! namespace and name. The store never touches the aggregate itself; the
//! reconciler mutates store and tracker together.

use claim_source::{Claim, ClaimId};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use thiserror::Error;

/// Result of `ClaimStore::upsert`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The identity was absent and is now stored
    Inserted,

    /// The stored claim had another version and was replaced; holds the old claim
    Replaced(Claim),

    /// The stored claim already has this version; nothing changed
    Duplicate,
}

/// Store lookup errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No claim with this identity is stored
    #[error("claim {0} not found")]
    NotFound(ClaimId),
}

/// Indexed cache of claims.
#[derive(Debug, Default)]
pub struct ClaimStore {
    claims: HashMap<ClaimId, Claim>,
}

impl ClaimStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored claim for `id`.
    #[must_use]
    pub fn get(&self, id: &ClaimId) -> Option<&Claim> {
        self.claims.get(id)
    }

    /// Inserts `claim`, or replaces the stored claim if its resource version differs.
    pub fn upsert(&mut self, claim: Claim) -> UpsertOutcome {
        match self.claims.entry(claim.id.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(claim);
                UpsertOutcome::Inserted
            }
            Entry::Occupied(entry) if entry.get().resource_version == claim.resource_version => {
                UpsertOutcome::Duplicate
            }
            Entry::Occupied(mut entry) => UpsertOutcome::Replaced(entry.insert(claim)),
        }
    }

    /// Removes and returns the claim stored for `id`.
    pub fn remove(&mut self, id: &ClaimId) -> Result<Claim, StoreError> {
        self.claims
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    /// Snapshot sequence of every stored claim, in no particular order.
    ///
    /// The iterator is lazy and `Clone`, so it can be restarted.
    pub fn list(&self) -> impl Iterator<Item = &Claim> + Clone + '_ {
        self.claims.values()
    }

    /// Identities of every stored claim.
    #[must_use]
    pub fn ids(&self) -> Vec<ClaimId> {
        self.claims.keys().cloned().collect()
    }

    /// Number of stored claims.
    #[must_use]
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// Returns `true` if no claims are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    /// Full sum of requested bytes. O(n); used to check the aggregate invariant.
    #[must_use]
    pub fn requested_sum(&self) -> u128 {
        self.claims
            .values()
            .map(|claim| claim.requested.bytes())
            .sum()
    }
}
