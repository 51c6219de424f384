//! Aggregate tracker.
//!
//! Keeps the running total of requested storage across all stored claims.
//! Every transition applies a signed delta in O(1); the total is never
//! recomputed from the store.

use crate::classifier::Transition;
use claim_source::{ClaimId, Quantity};
use std::fmt;
use thiserror::Error;
use tracing::warn;

/// The store and the tracker disagree about a claim; the total was clamped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyWarning {
    /// The total would have gone negative and was clamped to zero
    #[error("aggregate underflow of {shortfall} bytes applying {claim}; clamped to zero")]
    Underflow {
        /// Claim whose transition underflowed
        claim: ClaimId,
        /// Bytes that could not be subtracted
        shortfall: u128,
    },

    /// The total would have exceeded `u128::MAX` and was clamped there
    #[error("aggregate overflow of {excess} bytes applying {claim}; clamped to maximum")]
    Overflow {
        /// Claim whose transition overflowed
        claim: ClaimId,
        /// Bytes that could not be added
        excess: u128,
    },
}

/// Point-in-time view of the aggregate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Utilization {
    /// Total requested storage
    pub total: Quantity,
    /// Configured ceiling
    pub ceiling: Quantity,
}

impl Utilization {
    /// `total / ceiling`
    #[must_use]
    pub fn ratio(&self) -> f64 {
        self.total.ratio_of(self.ceiling)
    }

    /// Strict ceiling breach
    #[must_use]
    pub fn is_overage(&self) -> bool {
        self.total > self.ceiling
    }
}

impl fmt::Display for Utilization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "At {:.1}% claim capacity ({}/{})",
            self.ratio() * 100.0,
            self.total,
            self.ceiling
        )
    }
}

/// Running total against a fixed ceiling.
///
/// Each claim is at most `u64::MAX` bytes, so the `u128` total is exact for
/// any realistic number of claims.
#[derive(Debug)]
pub struct AggregateTracker {
    total: u128,
    ceiling: Quantity,
    inconsistencies: u64,
}

impl AggregateTracker {
    /// Creates a tracker with a zero total.
    #[must_use]
    pub fn new(ceiling: Quantity) -> Self {
        Self {
            total: 0,
            ceiling,
            inconsistencies: 0,
        }
    }

    fn add(&mut self, claim: &ClaimId, bytes: u128) -> Option<ConsistencyWarning> {
        match self.total.checked_add(bytes) {
            Some(total) => {
                self.total = total;
                None
            }
            None => {
                let warning = ConsistencyWarning::Overflow {
                    claim: claim.clone(),
                    excess: bytes - (u128::MAX - self.total),
                };
                self.total = u128::MAX;
                self.inconsistencies += 1;
                warn!("{}", warning);
                Some(warning)
            }
        }
    }

    fn subtract(&mut self, claim: &ClaimId, bytes: u128) -> Option<ConsistencyWarning> {
        match self.total.checked_sub(bytes) {
            Some(total) => {
                self.total = total;
                None
            }
            None => {
                let warning = ConsistencyWarning::Underflow {
                    claim: claim.clone(),
                    shortfall: bytes - self.total,
                };
                self.total = 0;
                self.inconsistencies += 1;
                warn!("{}", warning);
                Some(warning)
            }
        }
    }

    /// Applies the signed delta of `transition`.
    pub fn apply(&mut self, transition: &Transition) -> Option<ConsistencyWarning> {
        match transition {
            Transition::Insert(claim) => self.add(&claim.id, claim.requested.bytes()),
            Transition::Replace { old, new } => {
                let (old, new) = (old.requested.bytes(), new.requested.bytes());
                if new >= old {
                    self.add(transition.id(), new - old)
                } else {
                    self.subtract(transition.id(), old - new)
                }
            }
            Transition::Remove(claim) => self.subtract(&claim.id, claim.requested.bytes()),
        }
    }

    /// Current total
    #[must_use]
    pub fn total(&self) -> Quantity {
        Quantity::from_bytes(self.total)
    }

    /// `total > ceiling`
    #[must_use]
    pub fn is_overage(&self) -> bool {
        self.utilization().is_overage()
    }

    /// `total / ceiling`
    #[must_use]
    pub fn utilization_ratio(&self) -> f64 {
        self.utilization().ratio()
    }

    /// Total and ceiling together
    #[must_use]
    pub fn utilization(&self) -> Utilization {
        Utilization {
            total: self.total(),
            ceiling: self.ceiling,
        }
    }

    /// Number of consistency warnings raised so far
    #[must_use]
    pub fn inconsistencies(&self) -> u64 {
        self.inconsistencies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::claim;

    fn tracker(ceiling: u128) -> AggregateTracker {
        AggregateTracker::new(Quantity::from_bytes(ceiling))
    }

    #[test]
    fn test_insert_replace_remove_deltas() {
        let mut tracker = tracker(100);

        assert_eq!(tracker.apply(&Transition::Insert(claim("a", 60, "1"))), None);
        assert_eq!(tracker.apply(&Transition::Insert(claim("b", 30, "1"))), None);
        assert_eq!(tracker.total().bytes(), 90);

        let grow = Transition::Replace {
            old: claim("a", 60, "1"),
            new: claim("a", 80, "2"),
        };
        assert_eq!(tracker.apply(&grow), None);
        assert_eq!(tracker.total().bytes(), 110);

        let shrink = Transition::Replace {
            old: claim("a", 80, "2"),
            new: claim("a", 50, "3"),
        };
        assert_eq!(tracker.apply(&shrink), None);
        assert_eq!(tracker.total().bytes(), 80);

        assert_eq!(tracker.apply(&Transition::Remove(claim("b", 30, "1"))), None);
        assert_eq!(tracker.total().bytes(), 50);
        assert_eq!(tracker.inconsistencies(), 0);
    }

    #[test]
    fn test_overage_is_strict() {
        let mut tracker = tracker(100);
        tracker.apply(&Transition::Insert(claim("a", 100, "1")));
        assert!(!tracker.is_overage());
        assert!((tracker.utilization_ratio() - 1.0).abs() < f64::EPSILON);

        tracker.apply(&Transition::Insert(claim("b", 1, "1")));
        assert!(tracker.is_overage());
    }

    #[test]
    fn test_underflow_clamps_and_warns() {
        let mut tracker = tracker(100);
        tracker.apply(&Transition::Insert(claim("a", 10, "1")));

        let warning = tracker.apply(&Transition::Remove(claim("b", 25, "1")));
        assert_eq!(
            warning,
            Some(ConsistencyWarning::Underflow {
                claim: claim("b", 25, "1").id,
                shortfall: 15,
            })
        );
        assert_eq!(tracker.total(), Quantity::ZERO);
        assert_eq!(tracker.inconsistencies(), 1);
    }

    #[test]
    fn test_total_beyond_u64_is_exact() {
        let huge = 10u128 << 60;
        let mut tracker = tracker(100);

        assert_eq!(tracker.apply(&Transition::Insert(claim("a", 10 << 60, "1"))), None);
        assert_eq!(tracker.apply(&Transition::Insert(claim("b", 10 << 60, "1"))), None);
        assert_eq!(tracker.total().bytes(), 2 * huge);
        assert!(tracker.total().bytes() > u128::from(u64::MAX));

        assert_eq!(tracker.apply(&Transition::Remove(claim("a", 10 << 60, "1"))), None);
        assert_eq!(tracker.total().bytes(), huge);
        assert_eq!(tracker.inconsistencies(), 0);
    }

    #[test]
    fn test_utilization_report() {
        let mut tracker = tracker(100);
        tracker.apply(&Transition::Insert(claim("a", 90, "1")));
        assert_eq!(tracker.utilization().to_string(), "At 90.0% claim capacity (90/100)");
    }
}
