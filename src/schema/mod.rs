//! Schema types: type definitions and their identified fields.
//!
//! A [`TypeDef`] describes a record shape: its kind, an ordered list of
//! named, identified fields, an optional base type, and a cached
//! default-value instance. Field identifiers - not positions or names -
//! are the durable key used to reconcile stored values against an edited
//! schema, so fields may be renamed or reordered without invalidating
//! instance data.

use ahash::AHashSet;

use crate::constants::MAX_SCHEMA_DEPTH;
use crate::object::DynamicObject;
use crate::registry::Registry;
use crate::types::{EnumValue, FieldKind, Identifier, Ref, Value};
use crate::version::Tracking;

/// Built-in primitive type identities.
///
/// Identifiers are content-derived from well-known names so that
/// independently loaded modules agree on them.
pub mod builtins {
    use super::*;

    /// Well-known names of the built-in primitive types, paired with the
    /// scalar kind each one carries
    pub const PRIMITIVES: &[(&str, FieldKind)] = &[
        ("mosaic.types.bool", FieldKind::Bool),
        ("mosaic.types.int", FieldKind::Int),
        ("mosaic.types.float", FieldKind::Float),
        ("mosaic.types.string", FieldKind::String),
        ("mosaic.types.id", FieldKind::Id),
        ("mosaic.types.entityref", FieldKind::EntityRef),
        ("mosaic.types.assetref", FieldKind::AssetRef),
    ];

    fn by_name(name: &str) -> Ref<TypeDef> {
        Ref::new(Identifier::from_name(name), name)
    }

    /// Reference to the built-in bool type
    pub fn bool_type() -> Ref<TypeDef> {
        by_name("mosaic.types.bool")
    }

    /// Reference to the built-in int type
    pub fn int_type() -> Ref<TypeDef> {
        by_name("mosaic.types.int")
    }

    /// Reference to the built-in float type
    pub fn float_type() -> Ref<TypeDef> {
        by_name("mosaic.types.float")
    }

    /// Reference to the built-in string type
    pub fn string_type() -> Ref<TypeDef> {
        by_name("mosaic.types.string")
    }

    /// Reference to the built-in raw identifier type
    pub fn id_type() -> Ref<TypeDef> {
        by_name("mosaic.types.id")
    }

    /// Reference to the built-in entity reference type
    pub fn entity_ref_type() -> Ref<TypeDef> {
        by_name("mosaic.types.entityref")
    }

    /// Reference to the built-in asset handle type
    pub fn asset_ref_type() -> Ref<TypeDef> {
        by_name("mosaic.types.assetref")
    }
}

/// The shape category of a type definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// Scalar leaf carrying the given value kind
    Primitive(FieldKind),
    /// Plain value aggregate
    Struct,
    /// Closed set of named cases with numeric values
    Enum,
    /// Aggregate attachable to entities
    Component,
    /// Singleton aggregate attached to a project
    Configuration,
}

impl TypeKind {
    /// The value kind an instance field of this type stores
    pub fn instance_kind(&self) -> FieldKind {
        match self {
            TypeKind::Primitive(kind) => *kind,
            TypeKind::Enum => FieldKind::EnumValue,
            TypeKind::Struct | TypeKind::Component | TypeKind::Configuration => FieldKind::Object,
        }
    }
}

/// A named, identified, typed slot declared by a type definition
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Durable field identifier; survives renames and reorders
    pub id: Identifier,
    /// Display name, unique within the declaring type
    pub name: String,
    /// The field's value type
    pub field_type: Ref<TypeDef>,
    /// Whether the field stores a homogeneous list of its value type
    pub is_array: bool,
}

/// A schema record: the shape instances of it are reconciled against.
#[derive(Debug)]
pub struct TypeDef {
    id: Identifier,
    name: String,
    kind: TypeKind,
    base: Ref<TypeDef>,
    fields: Vec<FieldDef>,
    default_value: Option<DynamicObject>,
    version: u64,
    default_version: u64,
    tracking: Tracking,
}

impl TypeDef {
    /// Create a type definition. Records are normally created through the
    /// registry factories, which register them and wire change tracking.
    pub fn new(id: Identifier, name: impl Into<String>, kind: TypeKind) -> Self {
        TypeDef {
            id,
            name: name.into(),
            kind,
            base: Ref::none(),
            fields: Vec::new(),
            default_value: None,
            version: 0,
            default_version: 0,
            tracking: Tracking::detached(),
        }
    }

    /// Record identifier; never changes after creation
    pub fn id(&self) -> Identifier {
        self.id
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the type. Bumps the schema version so instances repair
    /// their cached type names on next refresh.
    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if self.name != name {
            self.name = name;
            self.bump();
        }
    }

    /// Shape category
    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// Reference handle to this record
    pub fn reference(&self) -> Ref<TypeDef> {
        Ref::new(self.id, self.name.clone())
    }

    /// Base type reference (none for most types)
    pub fn base(&self) -> &Ref<TypeDef> {
        &self.base
    }

    /// Set the base type
    pub fn set_base(&mut self, base: Ref<TypeDef>) {
        if self.base != base {
            self.base = base;
            self.bump();
        }
    }

    /// Fields declared directly by this type (base fields excluded)
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Schema version; bumps on any field/base/name edit
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Default-value version; bumps when the default instance is edited
    pub fn default_version(&self) -> u64 {
        self.default_version
    }

    /// Declare a new field. Returns its durable identifier.
    pub fn add_field(
        &mut self,
        name: impl Into<String>,
        field_type: Ref<TypeDef>,
        is_array: bool,
    ) -> Identifier {
        let id = Identifier::random();
        self.fields.push(FieldDef {
            id,
            name: name.into(),
            field_type,
            is_array,
        });
        self.bump();
        id
    }

    /// Restore a field under a known identifier (deserialization path)
    pub fn add_field_with_id(&mut self, field: FieldDef) {
        self.fields.push(field);
        self.bump();
    }

    /// Remove a field by identifier. Instance slots for it disappear on
    /// next refresh.
    pub fn remove_field(&mut self, id: Identifier) -> bool {
        let before = self.fields.len();
        self.fields.retain(|f| f.id != id);
        let removed = self.fields.len() != before;
        if removed {
            self.bump();
        }
        removed
    }

    /// Rename a field. Same identifier, so stored values are preserved.
    pub fn rename_field(&mut self, id: Identifier, name: impl Into<String>) -> bool {
        let name = name.into();
        match self.fields.iter_mut().find(|f| f.id == id) {
            Some(field) if field.name != name => {
                field.name = name;
                self.bump();
                true
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Move a field to a new position. Slot order follows on refresh;
    /// values are keyed by identifier and unaffected.
    pub fn move_field(&mut self, id: Identifier, index: usize) -> bool {
        let Some(from) = self.fields.iter().position(|f| f.id == id) else {
            return false;
        };
        let field = self.fields.remove(from);
        let index = index.min(self.fields.len());
        self.fields.insert(index, field);
        self.bump();
        true
    }

    /// Look up a declared field by identifier
    pub fn field(&self, id: Identifier) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Look up a declared field by name
    pub fn field_by_name(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Declare an enum case. Cases are fields typed as the built-in int;
    /// the case's numeric value lives in the default instance keyed by
    /// the case's durable identifier.
    pub fn add_enum_case(&mut self, name: impl Into<String>, value: i32) -> Identifier {
        let case_id = self.add_field(name, builtins::int_type(), false);
        let default = self
            .default_value
            .get_or_insert_with(|| DynamicObject::new(Ref::new(self.id, self.name.clone())));
        default.insert_slot_raw(case_id, Value::Int(value as i64), true);
        self.default_version += 1;
        self.tracking.note();
        case_id
    }

    /// Numeric value of an enum case, by durable case identifier
    pub fn case_value(&self, case_id: Identifier) -> Option<i32> {
        let default = self.default_value.as_ref()?;
        match default.slot_value_by_id(case_id) {
            Some(Value::Int(v)) => Some(*v as i32),
            _ => None,
        }
    }

    /// The default case selection for an enum type (its first case)
    pub fn default_case(&self) -> Option<EnumValue> {
        let first = self.fields.first()?;
        let value = self.case_value(first.id)?;
        Some(EnumValue::new(
            self.reference(),
            first.id,
            first.name.clone(),
            value,
        ))
    }

    /// The cached default-value instance, if resolved
    pub fn default_value(&self) -> Option<&DynamicObject> {
        self.default_value.as_ref()
    }

    /// Edit the default-value instance in place. Any edit bumps the
    /// default version so instances re-mirror on next refresh.
    pub fn default_value_mut(&mut self) -> Option<&mut DynamicObject> {
        self.default_version += 1;
        self.tracking.note();
        self.default_value.as_mut()
    }

    /// Replace the default-value instance wholesale
    pub fn set_default_value(&mut self, default: DynamicObject) {
        self.default_value = Some(default);
        self.default_version += 1;
        self.tracking.note();
    }

    /// Detach the default instance (default resolution re-synthesizes it
    /// without borrowing this record)
    pub(crate) fn take_default_value(&mut self) -> Option<DynamicObject> {
        self.default_value.take()
    }

    /// Reattach a resolved default instance without bumping the default
    /// version (resolution is not an edit)
    pub(crate) fn put_default_value(&mut self, default: DynamicObject) {
        self.default_value = Some(default);
    }

    /// Overwrite the whole definition from a decoded payload, preserving
    /// the record instance. One schema bump regardless of how much
    /// changed; live instances reconcile on their next refresh.
    pub(crate) fn restore(
        &mut self,
        name: String,
        kind: TypeKind,
        base: Ref<TypeDef>,
        fields: Vec<FieldDef>,
        default: Option<DynamicObject>,
    ) {
        self.name = name;
        self.kind = kind;
        self.base = base;
        self.fields = fields;
        self.default_value = default;
        if let Some(value) = &mut self.default_value {
            value.attach_tracking(self.tracking.clone());
        }
        self.version += 1;
        self.default_version += 1;
        self.tracking.note();
    }

    /// Re-resolve owned references against the freshest records,
    /// repairing cached names
    pub fn refresh(&mut self, registry: &Registry) {
        self.base = registry.repair(&self.base);
        for field in &mut self.fields {
            field.field_type = registry.repair(&field.field_type);
        }
    }

    /// Wire change tracking to the ledger (registration path)
    pub(crate) fn attach_tracking(&mut self, tracking: Tracking) {
        if let Some(default) = &mut self.default_value {
            default.attach_tracking(tracking.clone());
        }
        self.tracking = tracking;
    }

    fn bump(&mut self) {
        self.version += 1;
        self.tracking.note();
    }
}

/// Fields of a type including its base-type chain, base-most first.
///
/// The chain is cycle-guarded and depth-capped; a malformed base graph
/// yields the fields reachable before the guard trips.
pub fn collect_fields(type_def: &TypeDef, registry: &Registry) -> Vec<FieldDef> {
    let mut chain: Vec<Vec<FieldDef>> = vec![type_def.fields().to_vec()];
    let mut visited: AHashSet<Identifier> = AHashSet::new();
    visited.insert(type_def.id());

    let mut base = type_def.base().clone();
    for _ in 0..MAX_SCHEMA_DEPTH {
        if base.is_none() || !visited.insert(base.id()) {
            break;
        }
        match registry.find_type(base.id()) {
            Some(cell) => match cell.try_borrow() {
                Ok(borrowed) => {
                    chain.push(borrowed.fields().to_vec());
                    base = borrowed.base().clone();
                }
                Err(_) => break,
            },
            None => break,
        }
    }

    chain.reverse();
    chain.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_edits_bump_schema_version() {
        // Goal: add/rename/remove/move each register as a schema change
        let mut t = TypeDef::new(Identifier::random(), "Position", TypeKind::Component);
        let v0 = t.version();
        let x = t.add_field("x", builtins::float_type(), false);
        assert!(t.version() > v0);

        let v1 = t.version();
        assert!(t.rename_field(x, "horizontal"));
        assert!(t.version() > v1);
        // Renaming to the current name is a no-op
        let v2 = t.version();
        assert!(t.rename_field(x, "horizontal"));
        assert_eq!(t.version(), v2);

        let y = t.add_field("y", builtins::float_type(), false);
        let v3 = t.version();
        assert!(t.move_field(y, 0));
        assert!(t.version() > v3);
        assert_eq!(t.fields()[0].id, y);

        let v4 = t.version();
        assert!(t.remove_field(x));
        assert!(t.version() > v4);
        assert!(t.field(x).is_none());
    }

    #[test]
    fn enum_cases_keep_values_by_identifier() {
        // Goal: case values are keyed by durable case id, so renames do
        // not corrupt stored selections
        let mut t = TypeDef::new(Identifier::random(), "BlendMode", TypeKind::Enum);
        let normal = t.add_enum_case("Normal", 0);
        let add = t.add_enum_case("Add", 10);

        assert_eq!(t.case_value(normal), Some(0));
        assert_eq!(t.case_value(add), Some(10));

        assert!(t.rename_field(add, "Additive"));
        assert_eq!(t.case_value(add), Some(10));

        let default = t.default_case().unwrap();
        assert_eq!(default.case_id, normal);
        assert_eq!(default.value, 0);
    }

    #[test]
    fn builtin_identity_is_content_derived() {
        // Goal: builtin references agree across independent computations
        assert_eq!(builtins::int_type().id(), builtins::int_type().id());
        assert_ne!(builtins::int_type().id(), builtins::float_type().id());
        assert_eq!(
            builtins::int_type().id(),
            Identifier::from_name("mosaic.types.int")
        );
    }
}
