//! Shared change ledger for tracked containers.
//!
//! Every externally observable mutation of a tracked container bumps the
//! owning record's counter here and adds the record to the changed set.
//! The changed set accumulates until [`VersionStorage::reset_changed`];
//! the caretaker drains it once per update tick.

use std::cell::RefCell;
use std::rc::Rc;

use ahash::{AHashMap, AHashSet};

use crate::types::Identifier;

/// Per-record version counters plus the changed-set accumulated since the
/// last reset.
///
/// Cheap to clone: all clones share one ledger. Single-writer by design;
/// no internal locking.
#[derive(Clone, Debug, Default)]
pub struct VersionStorage {
    inner: Rc<RefCell<Ledger>>,
}

#[derive(Debug, Default)]
struct Ledger {
    versions: AHashMap<Identifier, u64>,
    changed: AHashSet<Identifier>,
    // First-marked order, so change events fire deterministically
    changed_order: Vec<Identifier>,
}

impl VersionStorage {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a mutation against `id`: bump its counter and mark it
    /// changed for the current tick
    pub fn mark_changed(&self, id: Identifier) {
        if id.is_empty() {
            return;
        }
        let mut inner = self.inner.borrow_mut();
        *inner.versions.entry(id).or_insert(0) += 1;
        if inner.changed.insert(id) {
            inner.changed_order.push(id);
        }
    }

    /// Current version counter for `id` (0 if never mutated)
    pub fn version_of(&self, id: Identifier) -> u64 {
        self.inner.borrow().versions.get(&id).copied().unwrap_or(0)
    }

    /// Overwrite the counter for `id` without marking it changed.
    ///
    /// Used by memento restore to rewind a record to the snapshot's
    /// recorded version.
    pub fn set_version(&self, id: Identifier, version: u64) {
        self.inner.borrow_mut().versions.insert(id, version);
    }

    /// Records marked changed since the last reset, in first-marked order
    pub fn changed(&self) -> Vec<Identifier> {
        self.inner.borrow().changed_order.clone()
    }

    /// Whether `id` is in the current changed set
    pub fn is_changed(&self, id: Identifier) -> bool {
        self.inner.borrow().changed.contains(&id)
    }

    /// Clear the changed set (counters are kept)
    pub fn reset_changed(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.changed.clear();
        inner.changed_order.clear();
    }

    /// Remove one record from the current changed set
    pub fn clear_changed(&self, id: Identifier) {
        let mut inner = self.inner.borrow_mut();
        if inner.changed.remove(&id) {
            inner.changed_order.retain(|c| *c != id);
        }
    }

    /// Drop all state for an evicted record
    pub fn forget(&self, id: Identifier) {
        let mut inner = self.inner.borrow_mut();
        inner.versions.remove(&id);
        if inner.changed.remove(&id) {
            inner.changed_order.retain(|c| *c != id);
        }
    }
}

/// Handle embedded in tracked containers tying their mutations back to
/// the owning record's ledger entry.
///
/// Mutations on nested containers roll up: the handle carries the owning
/// record's id, not the sub-container's, so a single top-level record is
/// the unit of change detection.
#[derive(Clone, Debug, Default)]
pub struct Tracking {
    storage: Option<VersionStorage>,
    owner: Identifier,
}

impl Tracking {
    /// An untracked handle (detached containers, decode scratch)
    pub fn detached() -> Self {
        Self::default()
    }

    /// A handle reporting against `owner` in `storage`
    pub fn attached(storage: VersionStorage, owner: Identifier) -> Self {
        Tracking {
            storage: Some(storage),
            owner,
        }
    }

    /// The owning record id (EMPTY when detached)
    pub fn owner(&self) -> Identifier {
        self.owner
    }

    /// Report one observable mutation against the owning record
    pub fn note(&self) {
        if let Some(storage) = &self.storage {
            storage.mark_changed(self.owner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_changed_bumps_and_accumulates() {
        // Goal: counters are monotonic and the changed set holds marks in
        // first-marked order until reset
        let storage = VersionStorage::new();
        let a = Identifier::random();
        let b = Identifier::random();

        storage.mark_changed(a);
        storage.mark_changed(b);
        storage.mark_changed(a);

        assert_eq!(storage.version_of(a), 2);
        assert_eq!(storage.version_of(b), 1);
        assert_eq!(storage.changed(), vec![a, b]);

        storage.reset_changed();
        assert!(storage.changed().is_empty());
        // Counters survive the reset
        assert_eq!(storage.version_of(a), 2);
    }

    #[test]
    fn empty_identifier_is_never_tracked() {
        let storage = VersionStorage::new();
        storage.mark_changed(Identifier::EMPTY);
        assert!(storage.changed().is_empty());
    }

    #[test]
    fn tracking_rolls_up_to_owner() {
        // Goal: a nested container's mutations surface against the owning
        // record id
        let storage = VersionStorage::new();
        let owner = Identifier::random();
        let tracking = Tracking::attached(storage.clone(), owner);

        tracking.note();
        tracking.note();
        assert_eq!(storage.version_of(owner), 2);
        assert_eq!(storage.changed(), vec![owner]);
    }

    #[test]
    fn forget_drops_all_state() {
        let storage = VersionStorage::new();
        let id = Identifier::random();
        storage.mark_changed(id);
        storage.forget(id);
        assert_eq!(storage.version_of(id), 0);
        assert!(storage.changed().is_empty());
    }
}
