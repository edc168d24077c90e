//! The record registry: the single root owner of every authored record.
//!
//! Records are keyed by identifier and held behind `Rc<RefCell<..>>`
//! handles, so the registry and any number of live handles observe the
//! same instance. The registry also owns the change ledger, a per-record
//! source attribution map with nestable source scopes, and a pull-based
//! event log of registrations and evictions.

pub mod records;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use ahash::AHashMap;
use tracing::debug;

pub use records::{
    Entity, EntityGroup, ModuleDef, Project, ProjectSettings, Record, RecordKind, Script,
    SystemDef,
};

use crate::object::DynamicObject;
use crate::schema::{builtins, FieldDef, TypeDef, TypeKind};
use crate::types::{FieldKind, Identifier, RecordClass, Ref};
use crate::version::{Tracking, VersionStorage};

/// A registration or eviction, recorded for pull-based consumption
#[derive(Clone, Debug)]
pub enum RegistryEvent {
    /// A record entered the registry (or replaced a previous instance)
    Registered(Record),
    /// A record left the registry
    Unregistered(Record),
}

/// The single root owner of every authored record.
#[derive(Default)]
pub struct Registry {
    objects: AHashMap<Identifier, Record>,
    // Registration order, for deterministic iteration and persistence
    order: Vec<Identifier>,
    // Per-kind identifier lists in registration order, kept in step with
    // register/unregister so kind-filtered lookups skip the full scan
    kinds: AHashMap<RecordKind, Vec<Identifier>>,
    source_of: AHashMap<Identifier, String>,
    scope_stack: Vec<String>,
    events: VecDeque<RegistryEvent>,
    versions: VersionStorage,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared change ledger all registered records report into
    pub fn versions(&self) -> &VersionStorage {
        &self.versions
    }

    /// Number of registered records
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the registry holds no records
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    // ---- registration ------------------------------------------------

    /// Register a record under its identifier.
    ///
    /// Registering the same instance again is a no-op. Registering a
    /// different instance under an occupied identifier evicts the old one
    /// first (an `Unregistered` event precedes the `Registered` event),
    /// preserving its position in registration order. Registration wires
    /// the record's change tracking to the ledger and marks it changed.
    pub fn register(&mut self, record: Record) {
        let id = record.id();
        if id.is_empty() {
            debug!("refusing to register a record with the null identifier");
            return;
        }
        if let Some(existing) = self.objects.get(&id) {
            if existing.ptr_eq(&record) {
                return;
            }
            let old = existing.clone();
            old.attach_tracking(Tracking::detached());
            if old.kind() != record.kind() {
                if let Some(ids) = self.kinds.get_mut(&old.kind()) {
                    ids.retain(|k| *k != id);
                }
                self.kinds.entry(record.kind()).or_default().push(id);
            }
            self.events.push_back(RegistryEvent::Unregistered(old));
        } else {
            self.order.push(id);
            self.kinds.entry(record.kind()).or_default().push(id);
        }

        record.attach_tracking(Tracking::attached(self.versions.clone(), id));
        if let Some(source) = self.scope_stack.last() {
            self.source_of.insert(id, source.clone());
        }
        self.versions.mark_changed(id);
        self.events.push_back(RegistryEvent::Registered(record.clone()));
        self.objects.insert(id, record);
    }

    /// Evict a record by identifier. Returns the evicted record.
    ///
    /// Live handles to the record keep working; it simply stops being
    /// findable, tracked, or persisted.
    pub fn unregister(&mut self, id: Identifier) -> Option<Record> {
        let record = self.objects.remove(&id)?;
        self.order.retain(|o| *o != id);
        if let Some(ids) = self.kinds.get_mut(&record.kind()) {
            ids.retain(|k| *k != id);
        }
        self.source_of.remove(&id);
        self.versions.forget(id);
        record.attach_tracking(Tracking::detached());
        self.events.push_back(RegistryEvent::Unregistered(record.clone()));
        Some(record)
    }

    /// Drain the accumulated registration/eviction events
    pub fn take_events(&mut self) -> Vec<RegistryEvent> {
        self.events.drain(..).collect()
    }

    /// All records in registration order (the persistence order)
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.order.iter().filter_map(|id| self.objects.get(id))
    }

    // ---- lookup ------------------------------------------------------

    /// Untyped lookup by identifier
    pub fn find_by_id(&self, id: Identifier) -> Option<&Record> {
        self.objects.get(&id)
    }

    /// Resolve a typed reference to a live record handle.
    ///
    /// `None` for the null reference, a missing record, or a kind
    /// mismatch - a dangling reference is routine, not an error.
    pub fn dereference<T: RecordClass>(&self, reference: &Ref<T>) -> Option<Rc<RefCell<T>>> {
        if reference.is_none() {
            return None;
        }
        T::from_record(self.objects.get(&reference.id())?)
    }

    /// Copy of a reference with its cached display name refreshed from
    /// the live record. A dangling reference comes back unchanged.
    pub fn repair<T: RecordClass>(&self, reference: &Ref<T>) -> Ref<T> {
        if reference.is_none() {
            return reference.clone();
        }
        match self.objects.get(&reference.id()).and_then(Record::try_name) {
            Some(name) if name != reference.name() => reference.with_name(name),
            _ => reference.clone(),
        }
    }

    /// Typed lookup by display name, in registration order
    pub fn find_by_name<T: RecordClass>(&self, name: &str) -> Option<Rc<RefCell<T>>> {
        self.kinds.get(&T::KIND)?.iter().find_map(|id| {
            let record = self.objects.get(id)?;
            (record.try_name()? == name).then(|| T::from_record(record))?
        })
    }

    /// All records of one class, in registration order
    pub fn find_all<T: RecordClass>(&self) -> Vec<Rc<RefCell<T>>> {
        self.kinds
            .get(&T::KIND)
            .into_iter()
            .flatten()
            .filter_map(|id| T::from_record(self.objects.get(id)?))
            .collect()
    }

    /// All records of one kind, untyped, in registration order
    pub fn find_all_by_kind(&self, kind: RecordKind) -> Vec<Record> {
        self.kinds
            .get(&kind)
            .into_iter()
            .flatten()
            .filter_map(|id| self.objects.get(id))
            .cloned()
            .collect()
    }

    /// Type-definition lookup by identifier
    pub fn find_type(&self, id: Identifier) -> Option<Rc<RefCell<TypeDef>>> {
        TypeDef::from_record(self.objects.get(&id)?)
    }

    /// The value kind instances of the referenced type store in a field
    pub fn instance_kind(&self, type_ref: &Ref<TypeDef>) -> Option<FieldKind> {
        let cell = self.find_type(type_ref.id())?;
        let kind = cell.try_borrow().ok()?.kind();
        Some(kind.instance_kind())
    }

    /// The value kind a field declaration stores in instances
    pub fn field_kind(&self, field: &FieldDef) -> Option<FieldKind> {
        if field.is_array {
            return Some(FieldKind::List);
        }
        self.instance_kind(&field.field_type)
    }

    // ---- factories ---------------------------------------------------

    /// Create and register a project record
    pub fn create_project(&mut self, name: impl Into<String>) -> Rc<RefCell<Project>> {
        let cell = Rc::new(RefCell::new(Project::new(Identifier::random(), name)));
        self.register(Record::Project(Rc::clone(&cell)));
        cell
    }

    /// Create and register a module record
    pub fn create_module(&mut self, name: impl Into<String>) -> Rc<RefCell<ModuleDef>> {
        let cell = Rc::new(RefCell::new(ModuleDef::new(Identifier::random(), name)));
        self.register(Record::Module(Rc::clone(&cell)));
        cell
    }

    /// Create and register a type definition
    pub fn create_type(&mut self, name: impl Into<String>, kind: TypeKind) -> Rc<RefCell<TypeDef>> {
        let cell = Rc::new(RefCell::new(TypeDef::new(Identifier::random(), name, kind)));
        self.register(Record::Type(Rc::clone(&cell)));
        cell
    }

    /// Create and register an entity group
    pub fn create_entity_group(&mut self, name: impl Into<String>) -> Rc<RefCell<EntityGroup>> {
        let cell = Rc::new(RefCell::new(EntityGroup::new(Identifier::random(), name)));
        self.register(Record::EntityGroup(Rc::clone(&cell)));
        cell
    }

    /// Create and register an entity
    pub fn create_entity(&mut self, name: impl Into<String>) -> Rc<RefCell<Entity>> {
        let cell = Rc::new(RefCell::new(Entity::new(Identifier::random(), name)));
        self.register(Record::Entity(Rc::clone(&cell)));
        cell
    }

    /// Create and register a script record
    pub fn create_script(&mut self, name: impl Into<String>) -> Rc<RefCell<Script>> {
        let cell = Rc::new(RefCell::new(Script::new(Identifier::random(), name)));
        self.register(Record::Script(Rc::clone(&cell)));
        cell
    }

    /// Create and register a system record
    pub fn create_system(&mut self, name: impl Into<String>) -> Rc<RefCell<SystemDef>> {
        let cell = Rc::new(RefCell::new(SystemDef::new(Identifier::random(), name)));
        self.register(Record::System(Rc::clone(&cell)));
        cell
    }

    /// Register the built-in primitive types under their content-derived
    /// identifiers. Idempotent; safe to call on a loaded registry.
    ///
    /// Builtins are attributed to the reserved `builtin` source and start
    /// out clean in the change ledger - they are ambient, not authored.
    pub fn register_builtins(&mut self) {
        let mut added: Vec<Identifier> = Vec::new();
        for (name, kind) in builtins::PRIMITIVES {
            let id = Identifier::from_name(name);
            if self.objects.contains_key(&id) {
                continue;
            }
            let cell = Rc::new(RefCell::new(TypeDef::new(
                id,
                *name,
                TypeKind::Primitive(*kind),
            )));
            self.push_source(BUILTIN_SOURCE);
            self.register(Record::Type(cell));
            self.pop_source();
            self.versions.clear_changed(id);
            added.push(id);
        }
        // Builtins registering is ambient noise, not an editor event
        self.events
            .retain(|e| !matches!(e, RegistryEvent::Registered(r) if added.contains(&r.id())));
    }

    // ---- source attribution ------------------------------------------

    /// Enter a source scope: records registered until the matching pop
    /// are attributed to `source`
    pub fn push_source(&mut self, source: impl Into<String>) {
        self.scope_stack.push(source.into());
    }

    /// Leave the innermost source scope
    pub fn pop_source(&mut self) -> Option<String> {
        self.scope_stack.pop()
    }

    /// The innermost active source scope
    pub fn current_source(&self) -> Option<&str> {
        self.scope_stack.last().map(String::as_str)
    }

    /// Enter a source scope released automatically when the guard drops
    pub fn source_scope(&mut self, source: impl Into<String>) -> SourceScope<'_> {
        self.push_source(source);
        SourceScope { registry: self }
    }

    /// The source a record was attributed to at registration
    pub fn source_of(&self, id: Identifier) -> Option<&str> {
        self.source_of.get(&id).map(String::as_str)
    }

    /// All records attributed to a source, in registration order
    pub fn find_all_by_source(&self, source: &str) -> Vec<Record> {
        self.order
            .iter()
            .filter(|id| self.source_of.get(id).map(String::as_str) == Some(source))
            .filter_map(|id| self.objects.get(id))
            .cloned()
            .collect()
    }

    /// Evict every record attributed to a source. Returns how many left.
    pub fn unregister_all_by_source(&mut self, source: &str) -> usize {
        let ids: Vec<Identifier> = self
            .order
            .iter()
            .filter(|id| self.source_of.get(id).map(String::as_str) == Some(source))
            .copied()
            .collect();
        let count = ids.len();
        for id in ids {
            self.unregister(id);
        }
        if count > 0 {
            debug!(source, count, "evicted records by source");
        }
        count
    }

    // ---- maintenance -------------------------------------------------

    /// Materialize the cached default instance of a struct-like type.
    ///
    /// The default is detached from the type record while it refreshes,
    /// so field types may reference the type being resolved without a
    /// borrow conflict. Resolution is not an edit: the default version is
    /// left alone.
    ///
    /// A caller may still hold a borrow of the type record across the
    /// call (an argument temporary does exactly that); resolution backs
    /// off quietly and can run again later.
    pub fn resolve_default(&self, type_id: Identifier) {
        let Some(cell) = self.find_type(type_id) else {
            return;
        };
        let (reference, kind) = match cell.try_borrow() {
            Ok(type_def) => (type_def.reference(), type_def.kind()),
            Err(_) => return,
        };
        if !matches!(
            kind,
            TypeKind::Struct | TypeKind::Component | TypeKind::Configuration
        ) {
            return;
        }
        let mut default = match cell.try_borrow_mut() {
            Ok(mut type_def) => type_def
                .take_default_value()
                .unwrap_or_else(|| DynamicObject::new(reference)),
            Err(_) => return,
        };
        default.refresh(self, None, true);
        if let Ok(mut type_def) = cell.try_borrow_mut() {
            type_def.put_default_value(default);
        };
    }

    /// Re-resolve every record's owned references against the freshest
    /// registered instances, repairing cached names
    pub fn refresh_all(&self) {
        for id in &self.order {
            if let Some(record) = self.objects.get(id) {
                record.refresh(self);
            }
        }
    }
}

/// Reserved source name for the built-in primitive types
pub const BUILTIN_SOURCE: &str = "builtin";

/// RAII guard holding a source scope open. Dereferences to the registry.
pub struct SourceScope<'a> {
    registry: &'a mut Registry,
}

impl Deref for SourceScope<'_> {
    type Target = Registry;

    fn deref(&self) -> &Registry {
        self.registry
    }
}

impl DerefMut for SourceScope<'_> {
    fn deref_mut(&mut self) -> &mut Registry {
        self.registry
    }
}

impl Drop for SourceScope<'_> {
    fn drop(&mut self) {
        self.registry.pop_source();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    #[test]
    fn register_find_dereference() {
        // Goal: a registered record is findable by id and by name, and a
        // reference to it resolves to the same instance
        let mut registry = Registry::new();
        let entity = registry.create_entity("Player");
        let reference = entity.borrow().reference();

        assert_eq!(registry.len(), 1);
        let found = registry.dereference(&reference).unwrap();
        assert!(Rc::ptr_eq(&found, &entity));
        let by_name: Rc<RefCell<Entity>> = registry.find_by_name("Player").unwrap();
        assert!(Rc::ptr_eq(&by_name, &entity));
    }

    #[test]
    fn dangling_reference_resolves_to_none() {
        // Goal: unregistering makes references dangle quietly; live
        // handles keep working
        let mut registry = Registry::new();
        let entity = registry.create_entity("Ghost");
        let reference = entity.borrow().reference();

        registry.unregister(reference.id());
        assert!(registry.dereference(&reference).is_none());
        // The handle is still usable even though the record is evicted
        assert_eq!(entity.borrow().name(), "Ghost");
    }

    #[test]
    fn repair_refreshes_cached_name() {
        // Goal: repair returns a copy carrying the live display name and
        // leaves dangling references untouched
        let mut registry = Registry::new();
        let entity = registry.create_entity("Old");
        let reference = entity.borrow().reference();
        entity.borrow_mut().set_name("New");

        let repaired = registry.repair(&reference);
        assert_eq!(repaired.name(), "New");
        assert_eq!(repaired, reference);

        let dangling: Ref<Entity> = Ref::new(Identifier::random(), "Nobody");
        assert_eq!(registry.repair(&dangling).name(), "Nobody");
    }

    #[test]
    fn reregistering_same_id_replaces() {
        // Goal: a second instance under an occupied id evicts the first,
        // and both transitions show up in the event log in order
        let mut registry = Registry::new();
        let first = registry.create_script("boot");
        let id = first.borrow().id();
        registry.take_events();

        let second = Rc::new(RefCell::new(Script::new(id, "boot")));
        registry.register(Record::Script(Rc::clone(&second)));

        let found: Rc<RefCell<Script>> = registry.find_by_name("boot").unwrap();
        assert!(Rc::ptr_eq(&found, &second));
        assert_eq!(registry.len(), 1);

        let events = registry.take_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], RegistryEvent::Unregistered(r) if r.id() == id));
        assert!(matches!(&events[1], RegistryEvent::Registered(r) if r.id() == id));
    }

    #[test]
    fn registering_same_instance_is_a_noop() {
        let mut registry = Registry::new();
        let entity = registry.create_entity("Player");
        registry.take_events();
        registry.versions().reset_changed();

        registry.register(Record::Entity(Rc::clone(&entity)));
        assert!(registry.take_events().is_empty());
        assert!(registry.versions().changed().is_empty());
    }

    #[test]
    fn mutations_on_registered_records_mark_the_ledger() {
        // Goal: renames and component writes roll up to the owning
        // record's ledger entry
        let mut registry = Registry::new();
        registry.register_builtins();
        let position = registry.create_type("Position", TypeKind::Component);
        position
            .borrow_mut()
            .add_field("x", builtins::float_type(), false);
        let type_id = position.borrow().id();
        registry.resolve_default(type_id);

        let entity = registry.create_entity("Player");
        let entity_id = entity.borrow().id();
        registry.versions().reset_changed();

        let mut component = DynamicObject::new(position.borrow().reference());
        component.refresh(&registry, None, false);
        entity.borrow_mut().add_component(component);
        assert!(registry.versions().is_changed(entity_id));

        registry.versions().reset_changed();
        entity
            .borrow_mut()
            .component_mut(type_id)
            .unwrap()
            .set("x", Value::Float(4.0))
            .unwrap();
        assert_eq!(registry.versions().changed(), vec![entity_id]);
    }

    #[test]
    fn kind_lookups_track_register_and_unregister() {
        // Goal: per-kind lookups stay in registration order and follow
        // evictions
        let mut registry = Registry::new();
        let first = registry.create_entity("a");
        registry.create_script("boot");
        let second = registry.create_entity("b");

        assert_eq!(registry.find_all::<Entity>().len(), 2);
        assert_eq!(registry.find_all_by_kind(RecordKind::Script).len(), 1);
        assert!(registry.find_all_by_kind(RecordKind::Project).is_empty());

        registry.unregister(first.borrow().id());
        let remaining = registry.find_all::<Entity>();
        assert_eq!(remaining.len(), 1);
        assert!(Rc::ptr_eq(&remaining[0], &second));
    }

    #[test]
    fn resolve_default_backs_off_while_the_type_is_borrowed() {
        // Goal: resolving with a borrow of the type record outstanding is
        // a quiet no-op; an unencumbered retry completes the resolution
        let mut registry = Registry::new();
        registry.register_builtins();
        let position = registry.create_type("Position", TypeKind::Component);
        position
            .borrow_mut()
            .add_field("x", builtins::int_type(), false);

        // The argument temporary keeps a shared borrow alive for the call
        registry.resolve_default(position.borrow().id());
        assert!(position.borrow().default_value().is_none());

        let type_id = position.borrow().id();
        registry.resolve_default(type_id);
        assert!(position.borrow().default_value().is_some());
    }

    #[test]
    fn source_scope_attributes_and_evicts() {
        // Goal: records registered inside a scope carry its source and
        // can be evicted together; the guard pops on drop
        let mut registry = Registry::new();
        let kept = registry.create_entity("kept");
        {
            let mut scope = registry.source_scope("module:physics");
            scope.create_entity("a");
            scope.create_entity("b");
        }
        assert!(registry.current_source().is_none());
        assert_eq!(registry.find_all_by_source("module:physics").len(), 2);

        assert_eq!(registry.unregister_all_by_source("module:physics"), 2);
        assert_eq!(registry.len(), 1);
        assert!(registry.dereference(&kept.borrow().reference()).is_some());
    }

    #[test]
    fn builtins_are_idempotent_and_clean() {
        // Goal: builtin registration is repeatable, content-addressed,
        // and leaves no marks in the change ledger or event log
        let mut registry = Registry::new();
        registry.register_builtins();
        let count = registry.len();
        registry.register_builtins();
        assert_eq!(registry.len(), count);

        assert!(registry.versions().changed().is_empty());
        assert!(registry.take_events().is_empty());

        let int_ref = builtins::int_type();
        assert_eq!(registry.instance_kind(&int_ref), Some(FieldKind::Int));
        assert_eq!(registry.source_of(int_ref.id()), Some(BUILTIN_SOURCE));
    }
}

