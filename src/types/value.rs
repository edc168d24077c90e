//! Dynamic value representation for schema-bound records.
//!
//! Every field slot of a dynamic object holds a [`Value`]; its kind tag is
//! also the wire tag used by the command-stream codec. The kind enum is
//! closed by design: field accessors are synthesized from an explicit
//! switch over it rather than runtime type inspection.

use serde::{Deserialize, Serialize};

use crate::object::{DynamicList, DynamicObject};
use crate::registry::records::Entity;
use crate::schema::TypeDef;
use crate::types::{Identifier, Ref};

/// Wire format kind identifiers - one-to-one with [`Value`] variants
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    // Fixed-size primitives
    /// Absent value
    None = 0,
    /// Boolean value
    Bool = 1,
    /// i64 standard integer
    Int = 2,
    /// f64 standard float
    Float = 3,

    // Variable length primitives
    /// String value
    String = 16,
    /// Raw identifier
    Id = 17,

    // Structured values
    /// Enum case selection
    EnumValue = 32,
    /// Schema-bound nested object
    Object = 33,
    /// Homogeneous list
    List = 34,

    // References (id + cached name on the wire)
    /// Reference to a type definition
    TypeRef = 128,
    /// Reference to an entity
    EntityRef = 129,
    /// Handle to an external asset
    AssetRef = 130,
}

impl FieldKind {
    /// Convert a wire tag byte to a kind. Tags come from disk; an unknown
    /// byte is corruption, not a variant.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(FieldKind::None),
            1 => Some(FieldKind::Bool),
            2 => Some(FieldKind::Int),
            3 => Some(FieldKind::Float),
            16 => Some(FieldKind::String),
            17 => Some(FieldKind::Id),
            32 => Some(FieldKind::EnumValue),
            33 => Some(FieldKind::Object),
            34 => Some(FieldKind::List),
            128 => Some(FieldKind::TypeRef),
            129 => Some(FieldKind::EntityRef),
            130 => Some(FieldKind::AssetRef),
            _ => None,
        }
    }

    /// Whether values of this kind read through to the type-level default
    /// when not overridden
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            FieldKind::Bool | FieldKind::Int | FieldKind::Float | FieldKind::String | FieldKind::Id
        )
    }

    /// Whether values of this kind own nested storage that refreshes
    /// recursively against the schema
    pub fn is_structured(&self) -> bool {
        matches!(
            self,
            FieldKind::EnumValue | FieldKind::Object | FieldKind::List
        )
    }
}

/// A dynamically-typed value held by a field slot or list element
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value (unresolved slot)
    None,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit floating point
    Float(f64),
    /// String value
    String(String),
    /// Raw identifier
    Id(Identifier),
    /// Enum case selection
    EnumValue(EnumValue),
    /// Nested schema-bound object
    Object(DynamicObject),
    /// Homogeneous list
    List(DynamicList),
    /// Reference to a type definition
    TypeRef(Ref<TypeDef>),
    /// Reference to an entity
    EntityRef(Ref<Entity>),
    /// Handle to an external asset
    AssetRef(AssetHandle),
}

impl Value {
    /// The wire kind of this value
    pub fn kind(&self) -> FieldKind {
        match self {
            Value::None => FieldKind::None,
            Value::Bool(_) => FieldKind::Bool,
            Value::Int(_) => FieldKind::Int,
            Value::Float(_) => FieldKind::Float,
            Value::String(_) => FieldKind::String,
            Value::Id(_) => FieldKind::Id,
            Value::EnumValue(_) => FieldKind::EnumValue,
            Value::Object(_) => FieldKind::Object,
            Value::List(_) => FieldKind::List,
            Value::TypeRef(_) => FieldKind::TypeRef,
            Value::EntityRef(_) => FieldKind::EntityRef,
            Value::AssetRef(_) => FieldKind::AssetRef,
        }
    }

    /// Zero value for a kind, used for slots with no resolvable default
    pub fn zero_of(kind: FieldKind) -> Value {
        match kind {
            FieldKind::None => Value::None,
            FieldKind::Bool => Value::Bool(false),
            FieldKind::Int => Value::Int(0),
            FieldKind::Float => Value::Float(0.0),
            FieldKind::String => Value::String(String::new()),
            FieldKind::Id => Value::Id(Identifier::EMPTY),
            FieldKind::EnumValue => Value::None,
            FieldKind::Object => Value::None,
            FieldKind::List => Value::None,
            FieldKind::TypeRef => Value::TypeRef(Ref::none()),
            FieldKind::EntityRef => Value::EntityRef(Ref::none()),
            FieldKind::AssetRef => Value::AssetRef(AssetHandle::default()),
        }
    }

    /// Borrow the nested object, if this value is one
    pub fn as_object(&self) -> Option<&DynamicObject> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Mutably borrow the nested object, if this value is one
    pub fn as_object_mut(&mut self) -> Option<&mut DynamicObject> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Borrow the nested list, if this value is one
    pub fn as_list(&self) -> Option<&DynamicList> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    /// Mutably borrow the nested list, if this value is one
    pub fn as_list_mut(&mut self) -> Option<&mut DynamicList> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }
}

/// An enum case selection: the case reference plus its resolved numeric
/// value, decoupled from ordinal position so case reordering does not
/// corrupt stored selections.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumValue {
    /// The enum type this selection belongs to
    pub enum_type: Ref<TypeDef>,
    /// Durable identifier of the selected case
    pub case_id: Identifier,
    /// Last known case name
    pub name: String,
    /// Resolved numeric value of the case
    pub value: i32,
}

impl EnumValue {
    /// Create a case selection
    pub fn new(
        enum_type: Ref<TypeDef>,
        case_id: Identifier,
        name: impl Into<String>,
        value: i32,
    ) -> Self {
        EnumValue {
            enum_type,
            case_id,
            name: name.into(),
            value,
        }
    }
}

/// Handle to an external asset managed outside the store.
///
/// Round-tripped opaquely; conversion to a live asset instance belongs to
/// the surrounding editor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetHandle {
    /// Guid-like string naming the containing asset file
    pub guid: String,
    /// Local file id within the asset file
    pub file_id: i64,
    /// Application-specific type tag
    pub type_tag: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_round_trip() {
        // Goal: every kind survives its own wire tag
        for kind in [
            FieldKind::None,
            FieldKind::Bool,
            FieldKind::Int,
            FieldKind::Float,
            FieldKind::String,
            FieldKind::Id,
            FieldKind::EnumValue,
            FieldKind::Object,
            FieldKind::List,
            FieldKind::TypeRef,
            FieldKind::EntityRef,
            FieldKind::AssetRef,
        ] {
            assert_eq!(FieldKind::from_u8(kind as u8), Some(kind));
        }
        assert_eq!(FieldKind::from_u8(0x7f), None);
    }

    #[test]
    fn primitive_and_structured_partitions() {
        assert!(FieldKind::Int.is_primitive());
        assert!(!FieldKind::Int.is_structured());
        assert!(FieldKind::Object.is_structured());
        assert!(!FieldKind::Object.is_primitive());
        // References are neither: they neither default-track nor recurse
        assert!(!FieldKind::EntityRef.is_primitive());
        assert!(!FieldKind::EntityRef.is_structured());
    }
}
