//! Change detection and memento capture.
//!
//! The [`Caretaker`] polls the registry's change ledger once per editor
//! tick. Every record that observably changed since the last tick is
//! serialized into a [`Memento`] - a self-contained command frame in the
//! stream format - and reported as a [`ChangeEvent`] carrying both the
//! new snapshot and the previous one, so a caller-maintained history
//! stack gets undo and redo from the same machinery.

use ahash::AHashMap;
use bytes::Bytes;

use crate::core::LoadConfig;
use crate::registry::{RecordKind, Registry};
use crate::stream::{self, MigrationRegistry};
use crate::types::{Identifier, Result};

/// A self-contained snapshot of one record: a single stream frame plus
/// the record's ledger version at capture time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memento {
    /// The snapshotted record
    pub record: Identifier,
    /// Record kind at capture time
    pub kind: RecordKind,
    /// Ledger version at capture time
    pub version: u64,
    /// One complete stream frame recreating the record
    pub data: Bytes,
}

/// How a record changed between two caretaker ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// The record appeared since the last tick
    Created,
    /// The record changed observably since the last tick
    Modified,
    /// The record left the registry since the last tick
    Removed,
}

/// One record's transition, with the snapshots needed to walk it in
/// either direction
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// The record that changed
    pub record: Identifier,
    /// The direction of the change
    pub kind: ChangeKind,
    /// Snapshot after the change (`None` for removals)
    pub memento: Option<Memento>,
    /// Snapshot before the change (`None` for creations)
    pub previous: Option<Memento>,
}

/// Polls the change ledger and captures mementos.
#[derive(Default)]
pub struct Caretaker {
    last_seen: AHashMap<Identifier, Memento>,
    // Snapshot order, so removal events fire deterministically
    order: Vec<Identifier>,
}

impl Caretaker {
    /// A caretaker with no history
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot every currently registered record without emitting
    /// events, and clear the pending changed set. Call after a load to
    /// make the loaded state the undo baseline.
    pub fn rebase(&mut self, registry: &mut Registry) -> Result<()> {
        self.last_seen.clear();
        self.order.clear();
        let ids: Vec<Identifier> = registry.records().map(|r| r.id()).collect();
        for id in ids {
            if let Some(memento) = capture(registry, id)? {
                self.remember(memento);
            }
        }
        registry.versions().reset_changed();
        Ok(())
    }

    /// One tick: drain the changed set, detect evictions, and report
    /// every observable transition since the previous tick.
    ///
    /// A record that was marked changed but whose serialized form and
    /// ledger version match the last snapshot produces no event.
    pub fn update(&mut self, registry: &mut Registry) -> Result<Vec<ChangeEvent>> {
        let mut events = Vec::new();

        // Evictions: snapshots whose record is gone
        let removed: Vec<Identifier> = self
            .order
            .iter()
            .filter(|id| registry.find_by_id(**id).is_none())
            .copied()
            .collect();
        for id in removed {
            self.order.retain(|o| *o != id);
            let previous = self.last_seen.remove(&id);
            events.push(ChangeEvent {
                record: id,
                kind: ChangeKind::Removed,
                memento: None,
                previous,
            });
        }

        let changed = registry.versions().changed();
        registry.versions().reset_changed();
        for id in changed {
            let Some(memento) = capture(registry, id)? else {
                continue;
            };
            match self.last_seen.get(&id) {
                Some(prev) if prev.version == memento.version && prev.data == memento.data => {}
                Some(prev) => {
                    let previous = prev.clone();
                    self.remember(memento.clone());
                    events.push(ChangeEvent {
                        record: id,
                        kind: ChangeKind::Modified,
                        memento: Some(memento),
                        previous: Some(previous),
                    });
                }
                None => {
                    self.remember(memento.clone());
                    events.push(ChangeEvent {
                        record: id,
                        kind: ChangeKind::Created,
                        memento: Some(memento),
                        previous: None,
                    });
                }
            }
        }
        Ok(events)
    }

    /// Re-impose a snapshot on the registry.
    ///
    /// The memento's frame is applied through the regular load path, so an
    /// existing record instance is overwritten in place and live handles
    /// keep pointing at the restored state. The record's ledger version
    /// rewinds to the snapshot's, and the restore itself does not land in
    /// the changed set.
    pub fn restore(&mut self, registry: &mut Registry, memento: &Memento) -> Result<()> {
        stream::accept(
            &memento.data,
            registry,
            &MigrationRegistry::new(),
            &LoadConfig::default(),
        )?;
        registry.versions().set_version(memento.record, memento.version);
        registry.versions().clear_changed(memento.record);
        self.remember(memento.clone());
        Ok(())
    }

    fn remember(&mut self, memento: Memento) {
        if self.last_seen.insert(memento.record, memento.clone()).is_none() {
            self.order.push(memento.record);
        }
    }
}

fn capture(registry: &Registry, id: Identifier) -> Result<Option<Memento>> {
    let Some(record) = registry.find_by_id(id) else {
        return Ok(None);
    };
    let data = stream::encode_record(record)?;
    Ok(Some(Memento {
        record: id,
        kind: record.kind(),
        version: registry.versions().version_of(id),
        data,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::DynamicObject;
    use crate::schema::{builtins, TypeKind};
    use crate::types::Value;

    fn tracked_registry() -> Registry {
        let mut registry = Registry::new();
        registry.register_builtins();
        registry
    }

    #[test]
    fn created_then_modified_then_removed() {
        // Goal: one record walks through all three transition kinds
        // across ticks, with matching snapshots
        let mut registry = tracked_registry();
        let mut caretaker = Caretaker::new();

        let script = registry.create_script("boot");
        let id = script.borrow().id();
        let events = caretaker.update(&mut registry).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::Created);
        assert!(events[0].previous.is_none());

        script.borrow_mut().set_source("print('hi')");
        let events = caretaker.update(&mut registry).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::Modified);
        assert!(events[0].previous.is_some());

        registry.unregister(id);
        let events = caretaker.update(&mut registry).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::Removed);
        assert!(events[0].memento.is_none());
        assert!(events[0].previous.is_some());

        // Quiet tick
        assert!(caretaker.update(&mut registry).unwrap().is_empty());
    }

    #[test]
    fn restore_preserves_record_identity() {
        // Goal: undoing an edit rewinds the record's content and version
        // while live handles keep observing the same instance
        let mut registry = tracked_registry();
        let mut caretaker = Caretaker::new();

        let script = registry.create_script("boot");
        let id = script.borrow().id();
        script.borrow_mut().set_source("v1");
        let events = caretaker.update(&mut registry).unwrap();
        let before = events[0].memento.clone().unwrap();

        script.borrow_mut().set_source("v2");
        caretaker.update(&mut registry).unwrap();

        caretaker.restore(&mut registry, &before).unwrap();
        assert_eq!(script.borrow().source, "v1");
        assert_eq!(registry.versions().version_of(id), before.version);
        // The restore itself is not a pending change
        assert!(caretaker.update(&mut registry).unwrap().is_empty());
    }

    #[test]
    fn removal_undo_reregisters_from_snapshot() {
        let mut registry = tracked_registry();
        let mut caretaker = Caretaker::new();

        let entity = registry.create_entity("Player");
        let id = entity.borrow().id();
        caretaker.update(&mut registry).unwrap();

        registry.unregister(id);
        let events = caretaker.update(&mut registry).unwrap();
        let snapshot = events[0].previous.clone().unwrap();

        caretaker.restore(&mut registry, &snapshot).unwrap();
        let restored: std::rc::Rc<std::cell::RefCell<crate::registry::Entity>> =
            registry.find_by_name("Player").unwrap();
        assert_eq!(restored.borrow().id(), id);
    }

    #[test]
    fn component_edits_surface_as_entity_changes() {
        // Goal: a nested component write shows up as a Modified event on
        // the owning entity, and the memento round-trips the new value
        let mut registry = tracked_registry();
        let mut caretaker = Caretaker::new();

        let position = registry.create_type("Position", TypeKind::Component);
        position
            .borrow_mut()
            .add_field("x", builtins::float_type(), false);
        let type_id = position.borrow().id();
        registry.resolve_default(type_id);

        let entity = registry.create_entity("Player");
        let mut component = DynamicObject::new(position.borrow().reference());
        component.refresh(&registry, None, false);
        entity.borrow_mut().add_component(component);
        caretaker.update(&mut registry).unwrap();

        entity
            .borrow_mut()
            .component_mut(type_id)
            .unwrap()
            .set("x", Value::Float(9.5))
            .unwrap();
        let events = caretaker.update(&mut registry).unwrap();
        let entity_id = entity.borrow().id();
        assert!(events
            .iter()
            .any(|e| e.record == entity_id && e.kind == ChangeKind::Modified));
    }
}
