//! Registry of in-flight and accepted PrePrepares for a single replica.
//!
//! Entries are keyed by their 3PC key `(view, seq)` in a `BTreeMap`, so the
//! map's iteration order is the canonical 3PC order and range operations stay
//! logarithmic.

use crate::{messages::PrePrepare, Error, Result, SeqNumber, ThreePhaseKey, ViewNumber};
use std::collections::{BTreeMap, BTreeSet};
use std::mem;

/// Ordered index of PrePrepare messages.
#[derive(Debug, Default)]
pub struct PrePrepares {
    pre_prepares: BTreeMap<ThreePhaseKey, PrePrepare>,
}

impl PrePrepares {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a PrePrepare, overwriting any prior entry at the same key.
    pub fn register(&mut self, pre_prepare: PrePrepare) {
        self.pre_prepares.insert(pre_prepare.key(), pre_prepare);
    }

    /// Checks whether a PrePrepare is registered at `(view_no, seq_no)`.
    pub fn registered(&self, view_no: ViewNumber, seq_no: SeqNumber) -> bool {
        self.pre_prepares
            .contains_key(&ThreePhaseKey::new(view_no, seq_no))
    }

    /// Gets the PrePrepare registered at `(view_no, seq_no)`, if any.
    pub fn get(&self, view_no: ViewNumber, seq_no: SeqNumber) -> Option<&PrePrepare> {
        self.pre_prepares.get(&ThreePhaseKey::new(view_no, seq_no))
    }

    /// Gets the PrePrepare registered at `(view_no, seq_no)`, failing when it
    /// is absent.
    ///
    /// Looking up a key that was never registered is a programmer error:
    /// debug builds assert, release builds surface the distinguished failure.
    pub fn require(&self, view_no: ViewNumber, seq_no: SeqNumber) -> Result<&PrePrepare> {
        let entry = self.get(view_no, seq_no);
        debug_assert!(
            entry.is_some(),
            "no PrePrepare registered at ({view_no}, {seq_no})"
        );
        entry.ok_or(Error::PrePrepareNotRegistered { view_no, seq_no })
    }

    /// Removes every entry whose key is `<= (view_no, seq_no)` in the 3PC
    /// order and returns them, in that order.
    pub fn unregister_all_up_to(
        &mut self,
        view_no: ViewNumber,
        seq_no: SeqNumber,
    ) -> Vec<(ThreePhaseKey, PrePrepare)> {
        let first_kept = ThreePhaseKey::new(view_no, seq_no.next());
        let kept = self.pre_prepares.split_off(&first_kept);
        let removed = mem::replace(&mut self.pre_prepares, kept);
        removed.into_iter().collect()
    }

    /// The registered entry with the largest 3PC key, if any.
    pub fn latest_received(&self) -> Option<(&ThreePhaseKey, &PrePrepare)> {
        self.pre_prepares.iter().next_back()
    }

    /// The set of keys of all registered PrePrepares.
    pub fn all_registered_keys(&self) -> BTreeSet<ThreePhaseKey> {
        self.pre_prepares.keys().copied().collect()
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.pre_prepares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pre_prepares.is_empty()
    }
}
