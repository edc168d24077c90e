//! Registry record types.
//!
//! Every authored entity - project, module, type definition, entity,
//! entity group, script, system - is a record: it carries a stable
//! identifier and a display name, participates in exactly one registry at
//! a time, and can re-resolve the references it owns against the
//! freshest record instances.

use std::cell::RefCell;
use std::rc::Rc;

use crate::object::DynamicObject;
use crate::registry::Registry;
use crate::schema::TypeDef;
use crate::types::{Identifier, RecordClass, Ref};
use crate::version::Tracking;

/// Discriminates record classes for kind-filtered registry lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Top-level project record
    Project,
    /// A module: the unit of loading and dependency
    Module,
    /// A type definition
    Type,
    /// A group of entities loaded together (a scene)
    EntityGroup,
    /// An authored entity with attached components
    Entity,
    /// A source script
    Script,
    /// A system participating in the execution graph
    System,
}

/// The top-level record tying modules and settings together
#[derive(Debug)]
pub struct Project {
    id: Identifier,
    name: String,
    /// Modules included in the project, in load order
    pub modules: Vec<Ref<ModuleDef>>,
    /// Authored project settings
    pub settings: ProjectSettings,
    tracking: Tracking,
}

/// Project-wide authored settings
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectSettings {
    /// Output canvas width in pixels
    pub canvas_width: u32,
    /// Output canvas height in pixels
    pub canvas_height: u32,
    /// Whether the canvas tracks the embedding surface size
    pub auto_resize: bool,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        ProjectSettings {
            canvas_width: 1920,
            canvas_height: 1080,
            auto_resize: true,
        }
    }
}

/// The unit of loading: groups types, entity groups, scripts, and
/// systems, and names the modules it depends on
#[derive(Debug, Default)]
pub struct ModuleDef {
    id: Identifier,
    name: String,
    /// Modules this module depends on
    pub dependencies: Vec<Ref<ModuleDef>>,
    /// Type definitions declared by this module
    pub types: Vec<Ref<TypeDef>>,
    /// Entity groups declared by this module
    pub entity_groups: Vec<Ref<EntityGroup>>,
    /// Scripts declared by this module
    pub scripts: Vec<Ref<Script>>,
    /// Systems declared by this module
    pub systems: Vec<Ref<SystemDef>>,
    tracking: Tracking,
}

/// An authored entity: a named carrier of components
#[derive(Debug)]
pub struct Entity {
    id: Identifier,
    name: String,
    /// Whether the entity participates at runtime
    pub enabled: bool,
    components: Vec<DynamicObject>,
    tracking: Tracking,
}

/// A group of entities loaded and unloaded together
#[derive(Debug, Default)]
pub struct EntityGroup {
    id: Identifier,
    name: String,
    /// Entities in the group, in authored order
    pub entities: Vec<Ref<Entity>>,
    tracking: Tracking,
}

/// A source script carried verbatim
#[derive(Debug, Default)]
pub struct Script {
    id: Identifier,
    name: String,
    /// Script source text
    pub source: String,
    tracking: Tracking,
}

/// A system participating in the execution ordering graph
#[derive(Debug, Default)]
pub struct SystemDef {
    id: Identifier,
    name: String,
    /// Systems that must run before this one
    pub execute_after: Vec<Ref<SystemDef>>,
    /// Systems that must run after this one
    pub execute_before: Vec<Ref<SystemDef>>,
    /// Component types this system operates on
    pub components: Vec<Ref<TypeDef>>,
    /// Script implementing the system, if any
    pub script: Ref<Script>,
    tracking: Tracking,
}

macro_rules! record_common {
    ($ty:ty) => {
        impl $ty {
            /// Record identifier; never changes after creation
            pub fn id(&self) -> Identifier {
                self.id
            }

            /// Display name
            pub fn name(&self) -> &str {
                &self.name
            }

            /// Rename the record
            pub fn set_name(&mut self, name: impl Into<String>) {
                let name = name.into();
                if self.name != name {
                    self.name = name;
                    self.tracking.note();
                }
            }

            /// Reference handle to this record
            pub fn reference(&self) -> Ref<$ty> {
                Ref::new(self.id, self.name.clone())
            }

            /// Report one observable mutation of this record
            pub fn touch(&self) {
                self.tracking.note();
            }
        }
    };
}

record_common!(Project);
record_common!(ModuleDef);
record_common!(Entity);
record_common!(EntityGroup);
record_common!(Script);
record_common!(SystemDef);

impl Project {
    /// Create a project record (normally through the registry factory)
    pub fn new(id: Identifier, name: impl Into<String>) -> Self {
        Project {
            id,
            name: name.into(),
            modules: Vec::new(),
            settings: ProjectSettings::default(),
            tracking: Tracking::detached(),
        }
    }

    /// Re-resolve owned references, repairing cached names
    pub fn refresh(&mut self, registry: &Registry) {
        for module in &mut self.modules {
            *module = registry.repair(module);
        }
    }

    pub(crate) fn attach_tracking(&mut self, tracking: Tracking) {
        self.tracking = tracking;
    }
}

impl ModuleDef {
    /// Create a module record (normally through the registry factory)
    pub fn new(id: Identifier, name: impl Into<String>) -> Self {
        ModuleDef {
            id,
            name: name.into(),
            ..ModuleDef::default()
        }
    }

    /// Re-resolve owned references, repairing cached names
    pub fn refresh(&mut self, registry: &Registry) {
        for dep in &mut self.dependencies {
            *dep = registry.repair(dep);
        }
        for t in &mut self.types {
            *t = registry.repair(t);
        }
        for group in &mut self.entity_groups {
            *group = registry.repair(group);
        }
        for script in &mut self.scripts {
            *script = registry.repair(script);
        }
        for system in &mut self.systems {
            *system = registry.repair(system);
        }
    }

    pub(crate) fn attach_tracking(&mut self, tracking: Tracking) {
        self.tracking = tracking;
    }
}

impl Entity {
    /// Create an entity record (normally through the registry factory)
    pub fn new(id: Identifier, name: impl Into<String>) -> Self {
        Entity {
            id,
            name: name.into(),
            enabled: true,
            components: Vec::new(),
            tracking: Tracking::detached(),
        }
    }

    /// Components attached to this entity, in attach order
    pub fn components(&self) -> &[DynamicObject] {
        &self.components
    }

    /// Attach a component instance. The component's mutations are
    /// attributed to this entity from here on.
    pub fn add_component(&mut self, mut component: DynamicObject) {
        component.attach_tracking(self.tracking.clone());
        self.components.push(component);
        self.tracking.note();
    }

    /// The component bound to the given type, if attached
    pub fn component(&self, type_id: Identifier) -> Option<&DynamicObject> {
        self.components.iter().find(|c| c.type_ref().id() == type_id)
    }

    /// Mutable access to the component bound to the given type
    pub fn component_mut(&mut self, type_id: Identifier) -> Option<&mut DynamicObject> {
        self.components
            .iter_mut()
            .find(|c| c.type_ref().id() == type_id)
    }

    /// Component by index, mutable (inspector surface)
    pub fn component_at_mut(&mut self, index: usize) -> Option<&mut DynamicObject> {
        self.components.get_mut(index)
    }

    /// Detach the component bound to the given type
    pub fn remove_component(&mut self, type_id: Identifier) -> Option<DynamicObject> {
        let index = self
            .components
            .iter()
            .position(|c| c.type_ref().id() == type_id)?;
        let removed = self.components.remove(index);
        self.tracking.note();
        Some(removed)
    }

    /// Replace all components (deserialization path)
    pub(crate) fn set_components(&mut self, components: Vec<DynamicObject>) {
        self.components = components;
        let tracking = self.tracking.clone();
        for component in &mut self.components {
            component.attach_tracking(tracking.clone());
        }
        self.tracking.note();
    }

    /// Re-resolve owned references and re-synchronize every component's
    /// slots against its type definition
    pub fn refresh(&mut self, registry: &Registry) {
        for component in &mut self.components {
            component.refresh(registry, None, false);
        }
    }

    pub(crate) fn attach_tracking(&mut self, tracking: Tracking) {
        for component in &mut self.components {
            component.attach_tracking(tracking.clone());
        }
        self.tracking = tracking;
    }
}

impl EntityGroup {
    /// Create an entity group record (normally through the registry
    /// factory)
    pub fn new(id: Identifier, name: impl Into<String>) -> Self {
        EntityGroup {
            id,
            name: name.into(),
            ..EntityGroup::default()
        }
    }

    /// Re-resolve owned references, repairing cached names
    pub fn refresh(&mut self, registry: &Registry) {
        for entity in &mut self.entities {
            *entity = registry.repair(entity);
        }
    }

    pub(crate) fn attach_tracking(&mut self, tracking: Tracking) {
        self.tracking = tracking;
    }
}

impl Script {
    /// Create a script record (normally through the registry factory)
    pub fn new(id: Identifier, name: impl Into<String>) -> Self {
        Script {
            id,
            name: name.into(),
            ..Script::default()
        }
    }

    /// Replace the source text
    pub fn set_source(&mut self, source: impl Into<String>) {
        let source = source.into();
        if self.source != source {
            self.source = source;
            self.tracking.note();
        }
    }

    /// References owned by scripts are plain text; nothing to repair
    pub fn refresh(&mut self, _registry: &Registry) {}

    pub(crate) fn attach_tracking(&mut self, tracking: Tracking) {
        self.tracking = tracking;
    }
}

impl SystemDef {
    /// Create a system record (normally through the registry factory)
    pub fn new(id: Identifier, name: impl Into<String>) -> Self {
        SystemDef {
            id,
            name: name.into(),
            ..SystemDef::default()
        }
    }

    /// Re-resolve owned references, repairing cached names
    pub fn refresh(&mut self, registry: &Registry) {
        for system in &mut self.execute_after {
            *system = registry.repair(system);
        }
        for system in &mut self.execute_before {
            *system = registry.repair(system);
        }
        for component in &mut self.components {
            *component = registry.repair(component);
        }
        self.script = registry.repair(&self.script);
    }

    pub(crate) fn attach_tracking(&mut self, tracking: Tracking) {
        self.tracking = tracking;
    }
}

/// An untyped handle to any registry record.
///
/// Cheap to clone; clones share the record instance.
#[derive(Clone, Debug)]
pub enum Record {
    /// A project record
    Project(Rc<RefCell<Project>>),
    /// A module record
    Module(Rc<RefCell<ModuleDef>>),
    /// A type definition record
    Type(Rc<RefCell<TypeDef>>),
    /// An entity group record
    EntityGroup(Rc<RefCell<EntityGroup>>),
    /// An entity record
    Entity(Rc<RefCell<Entity>>),
    /// A script record
    Script(Rc<RefCell<Script>>),
    /// A system record
    System(Rc<RefCell<SystemDef>>),
}

impl Record {
    /// Record identifier
    pub fn id(&self) -> Identifier {
        match self {
            Record::Project(r) => r.borrow().id(),
            Record::Module(r) => r.borrow().id(),
            Record::Type(r) => r.borrow().id(),
            Record::EntityGroup(r) => r.borrow().id(),
            Record::Entity(r) => r.borrow().id(),
            Record::Script(r) => r.borrow().id(),
            Record::System(r) => r.borrow().id(),
        }
    }

    /// Display name (cloned out of the cell)
    pub fn name(&self) -> String {
        match self {
            Record::Project(r) => r.borrow().name().to_string(),
            Record::Module(r) => r.borrow().name().to_string(),
            Record::Type(r) => r.borrow().name().to_string(),
            Record::EntityGroup(r) => r.borrow().name().to_string(),
            Record::Entity(r) => r.borrow().name().to_string(),
            Record::Script(r) => r.borrow().name().to_string(),
            Record::System(r) => r.borrow().name().to_string(),
        }
    }

    /// Display name, or `None` while the record cell is mid-mutation
    /// (reference repair runs inside record refreshes)
    pub fn try_name(&self) -> Option<String> {
        match self {
            Record::Project(r) => r.try_borrow().ok().map(|b| b.name().to_string()),
            Record::Module(r) => r.try_borrow().ok().map(|b| b.name().to_string()),
            Record::Type(r) => r.try_borrow().ok().map(|b| b.name().to_string()),
            Record::EntityGroup(r) => r.try_borrow().ok().map(|b| b.name().to_string()),
            Record::Entity(r) => r.try_borrow().ok().map(|b| b.name().to_string()),
            Record::Script(r) => r.try_borrow().ok().map(|b| b.name().to_string()),
            Record::System(r) => r.try_borrow().ok().map(|b| b.name().to_string()),
        }
    }

    /// Record kind
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Project(_) => RecordKind::Project,
            Record::Module(_) => RecordKind::Module,
            Record::Type(_) => RecordKind::Type,
            Record::EntityGroup(_) => RecordKind::EntityGroup,
            Record::Entity(_) => RecordKind::Entity,
            Record::Script(_) => RecordKind::Script,
            Record::System(_) => RecordKind::System,
        }
    }

    /// Re-resolve every reference the record owns against the freshest
    /// record instances, repairing cached names
    pub fn refresh(&self, registry: &Registry) {
        match self {
            Record::Project(r) => r.borrow_mut().refresh(registry),
            Record::Module(r) => r.borrow_mut().refresh(registry),
            Record::Type(r) => r.borrow_mut().refresh(registry),
            Record::EntityGroup(r) => r.borrow_mut().refresh(registry),
            Record::Entity(r) => r.borrow_mut().refresh(registry),
            Record::Script(r) => r.borrow_mut().refresh(registry),
            Record::System(r) => r.borrow_mut().refresh(registry),
        }
    }

    /// Whether two handles point at the same record instance
    pub fn ptr_eq(&self, other: &Record) -> bool {
        match (self, other) {
            (Record::Project(a), Record::Project(b)) => Rc::ptr_eq(a, b),
            (Record::Module(a), Record::Module(b)) => Rc::ptr_eq(a, b),
            (Record::Type(a), Record::Type(b)) => Rc::ptr_eq(a, b),
            (Record::EntityGroup(a), Record::EntityGroup(b)) => Rc::ptr_eq(a, b),
            (Record::Entity(a), Record::Entity(b)) => Rc::ptr_eq(a, b),
            (Record::Script(a), Record::Script(b)) => Rc::ptr_eq(a, b),
            (Record::System(a), Record::System(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub(crate) fn attach_tracking(&self, tracking: Tracking) {
        match self {
            Record::Project(r) => r.borrow_mut().attach_tracking(tracking),
            Record::Module(r) => r.borrow_mut().attach_tracking(tracking),
            Record::Type(r) => r.borrow_mut().attach_tracking(tracking),
            Record::EntityGroup(r) => r.borrow_mut().attach_tracking(tracking),
            Record::Entity(r) => r.borrow_mut().attach_tracking(tracking),
            Record::Script(r) => r.borrow_mut().attach_tracking(tracking),
            Record::System(r) => r.borrow_mut().attach_tracking(tracking),
        }
    }
}

macro_rules! record_class {
    ($ty:ty, $variant:ident) => {
        impl RecordClass for $ty {
            const KIND: RecordKind = RecordKind::$variant;

            fn from_record(record: &Record) -> Option<Rc<RefCell<Self>>> {
                match record {
                    Record::$variant(r) => Some(Rc::clone(r)),
                    _ => None,
                }
            }
        }
    };
}

record_class!(Project, Project);
record_class!(ModuleDef, Module);
record_class!(TypeDef, Type);
record_class!(EntityGroup, EntityGroup);
record_class!(Entity, Entity);
record_class!(Script, Script);
record_class!(SystemDef, System);
