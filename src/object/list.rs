//! Homogeneous dynamic lists.
//!
//! A [`DynamicList`] is an ordered sequence whose element type is a type
//! definition reference. Override/default machinery applies at the list
//! granularity, not per element - lists are leaf containers, added
//! wholesale. Element storage is re-synthesized against the element type
//! whenever that type changes structurally.

use crate::registry::Registry;
use crate::schema::TypeDef;
use crate::types::{FieldKind, Identifier, Ref, Result, StoreError, Value};
use crate::version::Tracking;

/// Ordered homogeneous sequence of values of one element type.
#[derive(Clone)]
pub struct DynamicList {
    element_type: Ref<TypeDef>,
    element_kind: FieldKind,
    items: Vec<Value>,
    counter: u64,
    tracking: Tracking,
}

impl DynamicList {
    /// Create an empty list. The element kind is resolved on the first
    /// refresh (or push) against a registry.
    pub fn new(element_type: Ref<TypeDef>) -> Self {
        DynamicList {
            element_type,
            element_kind: FieldKind::None,
            items: Vec::new(),
            counter: 0,
            tracking: Tracking::detached(),
        }
    }

    /// Create an empty list with a known element kind (decode path and
    /// registry-aware construction)
    pub fn with_kind(element_type: Ref<TypeDef>, element_kind: FieldKind) -> Self {
        DynamicList {
            element_kind,
            ..DynamicList::new(element_type)
        }
    }

    /// The element type reference
    pub fn element_type(&self) -> &Ref<TypeDef> {
        &self.element_type
    }

    /// Resolved element kind (None until first resolved)
    pub fn element_kind(&self) -> FieldKind {
        self.element_kind
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list has no elements
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Borrow an element
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    /// Iterate the elements in order
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.items.iter()
    }

    /// Append an element. Fails loudly when the element kind does not
    /// match the list's resolved element kind.
    pub fn push(&mut self, value: Value) -> Result<()> {
        self.check_kind(&value)?;
        if self.element_kind == FieldKind::None {
            self.element_kind = value.kind();
        }
        self.items.push(value);
        self.reattach_nested();
        self.bump();
        Ok(())
    }

    /// Append an element without the kind check (decode path; the list
    /// refreshes against the schema afterwards)
    pub(crate) fn push_raw(&mut self, value: Value) {
        if self.element_kind == FieldKind::None {
            self.element_kind = value.kind();
        }
        self.items.push(value);
    }

    /// Replace an element in place. A write of the current value is a
    /// no-op.
    pub fn set(&mut self, index: usize, value: Value) -> Result<()> {
        self.check_kind(&value)?;
        let length = self.items.len();
        let Some(stored) = self.items.get_mut(index) else {
            return Err(StoreError::IndexOutOfBounds { index, length });
        };
        if *stored == value {
            return Ok(());
        }
        let mut folded = 0;
        match (stored, value) {
            (Value::Object(existing), Value::Object(incoming)) => existing.copy_from(&incoming),
            (Value::List(existing), Value::List(incoming)) => existing.copy_from(&incoming),
            (stored, incoming) => {
                folded = super::dynamic::nested_version(stored);
                *stored = incoming;
            }
        }
        self.counter += folded;
        self.reattach_nested();
        self.bump();
        Ok(())
    }

    /// Remove and return an element
    pub fn remove(&mut self, index: usize) -> Option<Value> {
        if index >= self.items.len() {
            return None;
        }
        let value = self.items.remove(index);
        self.counter += super::dynamic::nested_version(&value);
        self.bump();
        Some(value)
    }

    /// Remove every element
    pub fn clear(&mut self) {
        if !self.items.is_empty() {
            self.counter += self
                .items
                .iter()
                .map(super::dynamic::nested_version)
                .sum::<u64>();
            self.items.clear();
            self.bump();
        }
    }

    /// Observable version: own counter plus nested container rollup.
    /// Elements that leave the list fold their accumulated versions into
    /// the counter first, so the version never moves backwards.
    pub fn version(&self) -> u64 {
        let nested: u64 = self
            .items
            .iter()
            .map(|v| match v {
                Value::Object(obj) => obj.version(),
                Value::List(list) => list.version(),
                _ => 0,
            })
            .sum();
        self.counter + nested
    }

    /// Re-synthesize element storage against the current element type:
    /// re-resolve the element kind, drop elements that no longer fit,
    /// and refresh nested objects against the element type's schema.
    pub fn refresh(&mut self, registry: &Registry) {
        self.element_type = registry.repair(&self.element_type);
        if let Some(kind) = registry.instance_kind(&self.element_type) {
            if kind != self.element_kind {
                self.element_kind = kind;
                let before = self.items.len();
                let mut folded = 0u64;
                self.items.retain(|v| {
                    if v.kind() == kind {
                        true
                    } else {
                        folded += super::dynamic::nested_version(v);
                        false
                    }
                });
                if self.items.len() != before {
                    self.counter += folded;
                    tracing::debug!(
                        dropped = before - self.items.len(),
                        element_type = %self.element_type.id(),
                        "List elements dropped after element type changed shape"
                    );
                    self.bump();
                }
            }
        }
        for value in &mut self.items {
            if let Value::Object(nested) = value {
                nested.refresh(registry, None, true);
            }
        }
    }

    /// Replace this list's contents with a deep copy of `other`,
    /// preserving this list's identity for existing handles
    pub fn copy_from(&mut self, other: &DynamicList) {
        if *self == *other {
            return;
        }
        self.element_type = other.element_type.clone();
        self.element_kind = other.element_kind;
        self.counter += self
            .items
            .iter()
            .map(super::dynamic::nested_version)
            .sum::<u64>();
        self.items = other.items.clone();
        self.reattach_nested();
        self.bump();
    }

    /// Rewrite the element type and every element's type identifiers
    /// through `remap` (load-time migration path)
    pub(crate) fn remap_types(&mut self, remap: &dyn Fn(Identifier) -> Identifier) {
        let mapped = remap(self.element_type.id());
        if mapped != self.element_type.id() {
            self.element_type = Ref::new(mapped, self.element_type.name());
        }
        for item in &mut self.items {
            super::dynamic::remap_value(item, remap);
        }
    }

    /// Wire change tracking through the list and its nested containers
    pub(crate) fn attach_tracking(&mut self, tracking: Tracking) {
        self.tracking = tracking;
        self.reattach_nested();
    }

    fn check_kind(&self, value: &Value) -> Result<()> {
        let incoming = value.kind();
        if self.element_kind != FieldKind::None && incoming != self.element_kind {
            return Err(StoreError::ElementMismatch {
                expected: self.element_kind,
                actual: incoming,
            });
        }
        Ok(())
    }

    fn reattach_nested(&mut self) {
        let tracking = self.tracking.clone();
        for value in &mut self.items {
            match value {
                Value::Object(nested) => nested.attach_tracking(tracking.clone()),
                Value::List(list) => list.attach_tracking(tracking.clone()),
                _ => {}
            }
        }
    }

    fn bump(&mut self) {
        self.counter += 1;
        self.tracking.note();
    }
}

impl PartialEq for DynamicList {
    fn eq(&self, other: &Self) -> bool {
        self.element_type == other.element_type && self.items == other.items
    }
}

impl std::fmt::Debug for DynamicList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicList")
            .field("element_type", &self.element_type)
            .field("items", &self.items)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::schema::{builtins, TypeKind};

    #[test]
    fn element_kind_is_enforced_once_resolved() {
        // Goal: the first push fixes the element kind; later mismatches
        // fail loudly
        let mut list = DynamicList::new(builtins::int_type());
        list.push(Value::Int(1)).unwrap();
        list.push(Value::Int(2)).unwrap();
        let err = list.push(Value::String("three".into())).unwrap_err();
        assert!(matches!(err, StoreError::ElementMismatch { .. }));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn set_and_remove_bump_noop_set_does_not() {
        let mut list = DynamicList::new(builtins::int_type());
        list.push(Value::Int(1)).unwrap();
        let v0 = list.version();
        list.set(0, Value::Int(1)).unwrap();
        assert_eq!(list.version(), v0);
        list.set(0, Value::Int(9)).unwrap();
        assert!(list.version() > v0);
        assert!(list.remove(0).is_some());
        assert!(list.is_empty());
        assert!(matches!(
            list.set(0, Value::Int(1)),
            Err(StoreError::IndexOutOfBounds { index: 0, length: 0 })
        ));
    }

    #[test]
    fn element_removal_never_rewinds_the_version() {
        // Goal: removing or clearing edited nested elements keeps the
        // version strictly increasing
        let mut registry = Registry::new();
        registry.register_builtins();
        let extent = registry.create_type("Extent", TypeKind::Struct);
        extent
            .borrow_mut()
            .add_field("width", builtins::int_type(), false);
        let extent_id = extent.borrow().id();
        registry.resolve_default(extent_id);

        let mut element = crate::object::DynamicObject::new(extent.borrow().reference());
        element.refresh(&registry, None, false);
        element.set("width", Value::Int(8)).unwrap();

        let mut list = DynamicList::new(extent.borrow().reference());
        list.push(Value::Object(element.clone())).unwrap();
        list.push(Value::Object(element)).unwrap();

        let v0 = list.version();
        list.remove(0);
        let v1 = list.version();
        assert!(v1 > v0);
        list.clear();
        assert!(list.version() > v1);
    }

    #[test]
    fn refresh_drops_elements_when_the_type_changes_shape() {
        // Goal: swapping the element type to a different instance kind
        // clears mismatched storage instead of corrupting it
        let mut registry = Registry::new();
        registry.register_builtins();
        let shape = registry.create_type("Shape", TypeKind::Primitive(FieldKind::Int));
        let type_id = shape.borrow().id();

        let mut list = DynamicList::new(shape.borrow().reference());
        list.push(Value::Int(3)).unwrap();
        list.refresh(&registry);
        assert_eq!(list.len(), 1);

        // Replace the type record with a string-shaped one under the
        // same identifier
        registry.unregister(type_id);
        let replacement = crate::schema::TypeDef::new(
            type_id,
            "Shape",
            TypeKind::Primitive(FieldKind::String),
        );
        registry.register(crate::registry::Record::Type(std::rc::Rc::new(
            std::cell::RefCell::new(replacement),
        )));
        list.refresh(&registry);
        assert!(list.is_empty());
        assert_eq!(list.element_kind(), FieldKind::String);
    }
}
