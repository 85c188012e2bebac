//! Fault-tolerance thresholds derived from the pool size.
//!
//! With `n` nodes the pool tolerates `f = (n - 1) / 3` faulty ones. Every
//! threshold in the consensus core comes from here; comparisons are always
//! inclusive (`>=`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single vote-count threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quorum(usize);

impl Quorum {
    /// Creates a quorum with the given threshold.
    pub fn new(value: usize) -> Self {
        Self(value)
    }

    /// Gets the threshold value.
    pub fn value(&self) -> usize {
        self.0
    }

    /// Checks whether `count` votes satisfy the quorum.
    pub fn reached(&self, count: usize) -> bool {
        count >= self.0
    }
}

impl fmt::Display for Quorum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The full set of thresholds for a pool of `n` nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quorums {
    /// Number of tolerated faulty nodes.
    pub f: usize,
    /// `n - f` matching ViewChangeDone messages complete an election.
    pub view_change_done: Quorum,
    /// `f + 1` matching CurrentState messages convince a late joiner.
    pub current_state: Quorum,
    /// `f + 1`, enough to include at least one honest sender.
    pub weak: Quorum,
    /// `2f + 1`, a majority of honest senders.
    pub strong: Quorum,
}

impl Quorums {
    /// Computes the thresholds for a pool of `n` nodes.
    pub fn new(n: usize) -> Self {
        let f = faults(n);
        Self {
            f,
            view_change_done: Quorum::new(n - f),
            current_state: Quorum::new(f + 1),
            weak: Quorum::new(f + 1),
            strong: Quorum::new(2 * f + 1),
        }
    }
}

impl fmt::Display for Quorums {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "f: {}, view_change_done: {}, current_state: {}, weak: {}, strong: {}",
            self.f, self.view_change_done, self.current_state, self.weak, self.strong
        )
    }
}

/// Number of faulty nodes a pool of `n` tolerates.
pub fn faults(n: usize) -> usize {
    n.saturating_sub(1) / 3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_for_minimal_pool() {
        let quorums = Quorums::new(4);
        assert_eq!(quorums.f, 1);
        assert_eq!(quorums.view_change_done.value(), 3);
        assert_eq!(quorums.current_state.value(), 2);
        assert_eq!(quorums.weak.value(), 2);
        assert_eq!(quorums.strong.value(), 3);
    }

    #[test]
    fn thresholds_for_larger_pools() {
        let seven = Quorums::new(7);
        assert_eq!(seven.f, 2);
        assert_eq!(seven.view_change_done.value(), 5);
        assert_eq!(seven.strong.value(), 5);

        let ten = Quorums::new(10);
        assert_eq!(ten.f, 3);
        assert_eq!(ten.view_change_done.value(), 7);
        assert_eq!(ten.current_state.value(), 4);
    }

    #[test]
    fn quorum_comparison_is_inclusive() {
        let quorum = Quorum::new(3);
        assert!(!quorum.reached(2));
        assert!(quorum.reached(3));
        assert!(quorum.reached(4));
    }

    #[test]
    fn degenerate_pool_sizes() {
        assert_eq!(faults(0), 0);
        assert_eq!(faults(1), 0);
        assert_eq!(faults(3), 0);
        assert_eq!(faults(4), 1);
    }
}
