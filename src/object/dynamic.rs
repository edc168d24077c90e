//! Schema-bound dynamic objects.
//!
//! A [`DynamicObject`] owns an ordered slot array mirroring its type
//! definition's fields. Slots are reconciled against the schema by field
//! identifier, so fields may be added, removed, renamed, or reordered
//! independently of edit order without invalidating stored data. Slots
//! that were never written read through to the type's default-value
//! instance; written slots carry an override flag. Objects may also hold
//! ad-hoc dynamic properties not backed by any field - always implicitly
//! overridden, with no default fallback.

use ahash::AHashMap;

use crate::registry::Registry;
use crate::schema::{collect_fields, FieldDef, TypeDef, TypeKind};
use crate::types::{EnumValue, FieldKind, Identifier, Ref, Result, StoreError, Value};
use crate::version::Tracking;

/// One field slot: durable field id, display name, declared kind, stored
/// value, and whether the value deliberately diverges from the default.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSlot {
    pub(crate) field_id: Identifier,
    pub(crate) name: String,
    pub(crate) kind: FieldKind,
    pub(crate) value: Value,
    pub(crate) overridden: bool,
}

impl FieldSlot {
    /// Durable identifier of the backing field
    pub fn field_id(&self) -> Identifier {
        self.field_id
    }

    /// Field display name as of the last refresh
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared value kind as of the last refresh
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Stored value
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Whether the value deliberately diverges from the type default
    pub fn overridden(&self) -> bool {
        self.overridden
    }

    /// Build a fully described slot, bypassing schema checks (decode path)
    pub(crate) fn raw(
        field_id: Identifier,
        name: String,
        kind: FieldKind,
        value: Value,
        overridden: bool,
    ) -> Self {
        FieldSlot {
            field_id,
            name,
            kind,
            value,
            overridden,
        }
    }
}

/// A schema-bound record instance: field slots synthesized from a type
/// definition, plus ad-hoc dynamic properties.
#[derive(Clone)]
pub struct DynamicObject {
    type_ref: Ref<TypeDef>,
    slots: Vec<FieldSlot>,
    dynamic: Vec<(String, Value)>,
    name_index: AHashMap<String, usize>,
    counter: u64,
    seen_schema: Option<(u64, u64)>,
    tracking: Tracking,
}

impl DynamicObject {
    /// Create an empty instance bound to a type. Slots are synthesized on
    /// the first [`refresh`](Self::refresh).
    pub fn new(type_ref: Ref<TypeDef>) -> Self {
        DynamicObject {
            type_ref,
            slots: Vec::new(),
            dynamic: Vec::new(),
            name_index: AHashMap::new(),
            counter: 0,
            seen_schema: None,
            tracking: Tracking::detached(),
        }
    }

    /// The bound type
    pub fn type_ref(&self) -> &Ref<TypeDef> {
        &self.type_ref
    }

    /// Field slots in schema order
    pub fn slots(&self) -> &[FieldSlot] {
        &self.slots
    }

    /// Ad-hoc dynamic properties in insertion order
    pub fn dynamic_properties(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.dynamic.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Every property: field slots in schema order, then dynamic
    /// properties in insertion order
    pub fn properties(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.slots
            .iter()
            .map(|s| (s.name.as_str(), &s.value))
            .chain(self.dynamic_properties())
    }

    /// Read a property by name. Field slots shadow dynamic properties.
    pub fn get(&self, name: &str) -> Option<&Value> {
        if let Some(slot) = self.slot_by_name(name) {
            return Some(&slot.value);
        }
        self.dynamic
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Whether a property's value deliberately diverges from the type
    /// default. Dynamic properties are always implicitly overridden.
    pub fn is_overridden(&self, name: &str) -> Option<bool> {
        if let Some(slot) = self.slot_by_name(name) {
            return Some(slot.overridden);
        }
        self.dynamic.iter().any(|(n, _)| n == name).then_some(true)
    }

    /// Write a property by name.
    ///
    /// A write to a declared field must match the field's kind - a
    /// mismatch is an error, never a silent coercion. A write to an
    /// unknown name synthesizes a dynamic property from the value's
    /// runtime kind. Structured values are deep-copied into freshly owned
    /// storage; if the slot already holds a container of the same shape,
    /// the write goes through `copy_from` so existing handles to the
    /// nested container stay valid. Writing the current value of an
    /// already-overridden slot is a no-op.
    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        if let Some(index) = self.slot_index_by_name(name) {
            return self.set_slot(index, value);
        }

        // Unknown name: synthesize (or update) an ad-hoc dynamic property
        if let Some(existing) = self.dynamic.iter_mut().find(|(n, _)| n == name) {
            if existing.1 == value {
                return Ok(());
            }
            self.counter += nested_version(&existing.1);
            existing.1 = value;
        } else {
            self.dynamic.push((name.to_string(), value));
        }
        self.reattach_nested();
        self.bump();
        Ok(())
    }

    fn set_slot(&mut self, index: usize, value: Value) -> Result<()> {
        let slot = &mut self.slots[index];
        let incoming = value.kind();

        if slot.kind != FieldKind::None && incoming != slot.kind && incoming != FieldKind::None {
            return Err(StoreError::TypeMismatch {
                field: slot.name.clone(),
                expected: slot.kind,
                actual: incoming,
            });
        }

        if slot.overridden && slot.value == value {
            return Ok(());
        }

        match (&mut slot.value, value) {
            // Write-through: keep the stored container's identity alive
            // for anything already holding a handle to it
            (Value::Object(existing), Value::Object(incoming)) => {
                existing.copy_from(&incoming);
            }
            (Value::List(existing), Value::List(incoming)) => {
                existing.copy_from(&incoming);
            }
            (stored, incoming) => {
                self.counter += nested_version(stored);
                *stored = incoming;
            }
        }
        if slot.kind == FieldKind::None {
            slot.kind = slot.value.kind();
        }
        slot.overridden = true;
        self.reattach_nested();
        self.bump();
        Ok(())
    }

    /// Mutably borrow a nested object field. Mutations through the
    /// returned handle report against the same owning record.
    pub fn object_mut(&mut self, name: &str) -> Option<&mut DynamicObject> {
        let index = self.slot_index_by_name(name)?;
        self.slots[index].value.as_object_mut()
    }

    /// Mutably borrow a nested list field
    pub fn list_mut(&mut self, name: &str) -> Option<&mut super::DynamicList> {
        let index = self.slot_index_by_name(name)?;
        self.slots[index].value.as_list_mut()
    }

    /// Remove a dynamic property. Declared fields cannot be removed here;
    /// edit the type definition instead.
    pub fn remove_dynamic(&mut self, name: &str) -> bool {
        let before = self.dynamic.len();
        let mut folded = 0u64;
        self.dynamic.retain(|(n, v)| {
            if n == name {
                folded += nested_version(v);
                false
            } else {
                true
            }
        });
        let removed = self.dynamic.len() != before;
        if removed {
            self.counter += folded;
            self.rebuild_index();
            self.bump();
        }
        removed
    }

    /// Observable version: own mutation counter plus the rollup of every
    /// nested structured slot. Any nested write strictly increases it;
    /// containers that leave the object fold their accumulated versions
    /// into the counter first, so the version never moves backwards.
    pub fn version(&self) -> u64 {
        let nested: u64 = self
            .slots
            .iter()
            .map(|s| &s.value)
            .chain(self.dynamic.iter().map(|(_, v)| v))
            .map(nested_version)
            .sum();
        self.counter + nested
    }

    /// Synchronize the slot array against the current type definition.
    ///
    /// No-op when the cached (type version, default version) pair is
    /// unchanged and no default override is supplied. Otherwise slots are
    /// reconciled by field identifier (values of retained fields are
    /// preserved, added fields get fresh unoverridden slots, removed
    /// fields are dropped), unoverridden primitive slots re-mirror the
    /// type-level default, and structured slots refresh recursively
    /// against the corresponding default sub-value. A dangling type
    /// reference leaves the object untouched.
    pub fn refresh(
        &mut self,
        registry: &Registry,
        default_override: Option<&DynamicObject>,
        skip_type_refresh: bool,
    ) {
        let Some(cell) = registry.find_type(self.type_ref.id()) else {
            return;
        };
        if !skip_type_refresh {
            if let Ok(mut type_def) = cell.try_borrow_mut() {
                type_def.refresh(registry);
            }
        }

        let (type_version, default_version, type_name, fields) = match cell.try_borrow() {
            Ok(type_def) => (
                type_def.version(),
                type_def.default_version(),
                type_def.name().to_string(),
                collect_fields(&type_def, registry),
            ),
            // The type record is mid-mutation (default resolution);
            // its caller refreshes us with an explicit default instead
            Err(_) => return,
        };

        if default_override.is_none() && self.seen_schema == Some((type_version, default_version)) {
            return;
        }
        self.type_ref = self.type_ref.with_name(type_name);

        // Pass 1: reconcile slots by field identifier
        let mut old = std::mem::take(&mut self.slots);
        let mut changed = false;
        for field in &fields {
            let kind = registry.field_kind(field).unwrap_or(FieldKind::None);
            let mut slot = match old.iter().position(|s| s.field_id == field.id) {
                Some(index) => old.remove(index),
                None => {
                    changed = true;
                    FieldSlot {
                        field_id: field.id,
                        name: field.name.clone(),
                        kind,
                        value: Value::None,
                        overridden: false,
                    }
                }
            };
            if slot.name != field.name {
                slot.name = field.name.clone();
                changed = true;
            }
            if kind != FieldKind::None && slot.kind != kind {
                // The field changed shape; stored data no longer fits
                self.counter += nested_version(&slot.value);
                slot.kind = kind;
                slot.value = Value::None;
                slot.overridden = false;
                changed = true;
            }
            self.slots.push(slot);
        }
        if !old.is_empty() {
            // Slots for removed fields are dropped; their accumulated
            // versions fold into the counter so the version never rewinds
            self.counter += old.iter().map(|s| nested_version(&s.value)).sum::<u64>();
            changed = true;
        }

        // Pass 2: default mirroring and structural recursion.
        // The default is cloned out of the type record so slot recursion
        // below can dereference freely.
        let default_owned: Option<DynamicObject> = match default_override {
            Some(d) => Some(d.clone()),
            None => cell
                .try_borrow()
                .ok()
                .and_then(|t| t.default_value().cloned()),
        };
        let default_source = default_owned.as_ref();

        for (field, index) in fields.iter().zip(0..self.slots.len()) {
            let default_value = default_source.and_then(|d| d.slot_value_by_id(field.id));
            changed |= Self::sync_slot(
                &mut self.slots[index],
                field,
                default_value,
                registry,
                skip_type_refresh,
            );
        }

        // Pass 3: rebuild the name lookup table
        self.rebuild_index();
        self.reattach_nested();
        self.seen_schema = Some((type_version, default_version));
        if changed {
            self.bump();
        }
    }

    /// Bring one slot in line with its field: mirror defaults for
    /// unoverridden primitives, resolve enum selections, and recurse into
    /// structured storage. Returns whether anything observable changed.
    fn sync_slot(
        slot: &mut FieldSlot,
        field: &FieldDef,
        default_value: Option<&Value>,
        registry: &Registry,
        skip_type_refresh: bool,
    ) -> bool {
        let mut changed = false;
        match slot.kind {
            kind if kind.is_primitive() => {
                if !slot.overridden {
                    if let Some(default) = default_value {
                        if slot.value != *default {
                            slot.value = default.clone();
                            changed = true;
                        }
                    } else if slot.value == Value::None {
                        slot.value = Value::zero_of(kind);
                        changed = true;
                    }
                }
            }
            FieldKind::EnumValue => {
                let current = match (&slot.value, slot.overridden) {
                    (Value::EnumValue(v), true) => Some(v.clone()),
                    _ => match default_value {
                        Some(Value::EnumValue(v)) => Some(v.clone()),
                        _ => None,
                    },
                };
                if let Some(resolved) = resolve_enum(registry, &field.field_type, current.as_ref())
                {
                    let resolved = Value::EnumValue(resolved);
                    if slot.value != resolved {
                        slot.value = resolved;
                        changed = true;
                    }
                }
            }
            FieldKind::Object => {
                if slot.value.as_object().is_none() {
                    slot.value = Value::Object(DynamicObject::new(field.field_type.clone()));
                    changed = true;
                }
                let nested_default = default_value.and_then(Value::as_object);
                if let Some(nested) = slot.value.as_object_mut() {
                    let before = nested.version();
                    nested.refresh(registry, nested_default, skip_type_refresh);
                    changed |= nested.version() != before;
                }
            }
            FieldKind::List => {
                if slot.value.as_list().is_none() {
                    slot.value =
                        Value::List(super::DynamicList::new(field.field_type.clone()));
                    changed = true;
                }
                if let Some(list) = slot.value.as_list_mut() {
                    let before = list.version();
                    list.refresh(registry);
                    changed |= list.version() != before;
                }
            }
            _ => {
                // References and asset handles: nothing to mirror, but an
                // unresolved placeholder still gets its zero value
                if !slot.overridden {
                    if let Some(default) = default_value {
                        if slot.value != *default {
                            slot.value = default.clone();
                            changed = true;
                        }
                    } else if slot.value == Value::None && slot.kind != FieldKind::None {
                        slot.value = Value::zero_of(slot.kind);
                        changed = true;
                    }
                }
            }
        }
        changed
    }

    /// Clear every override flag and return every field to the type (or
    /// supplied) default: primitives and enums take the default value,
    /// structured fields recurse.
    pub fn reset(&mut self, registry: &Registry, default_override: Option<&DynamicObject>) {
        for slot in &mut self.slots {
            slot.overridden = false;
            match &mut slot.value {
                Value::Object(nested) => nested.reset(registry, None),
                Value::List(list) => list.clear(),
                _ => {}
            }
        }
        self.counter += self
            .dynamic
            .iter()
            .map(|(_, v)| nested_version(v))
            .sum::<u64>();
        self.dynamic.clear();
        // Force the next mirror pass to run against the (possibly
        // unchanged) schema pair
        self.seen_schema = None;
        self.bump();
        self.refresh(registry, default_override, true);
        self.rebuild_index();
    }

    /// Copy every field's value and its override flag verbatim from
    /// `other` - overrides are not re-derived from this object's own
    /// defaults, so the copy duplicates exactly which fields were
    /// touched. Nested containers are written through `copy_from` to
    /// preserve their identity.
    pub fn copy_from(&mut self, other: &DynamicObject) {
        if *self == *other {
            return;
        }
        self.type_ref = other.type_ref.clone();

        let mut old = std::mem::take(&mut self.slots);
        for theirs in &other.slots {
            let slot = match old.iter().position(|s| s.field_id == theirs.field_id) {
                Some(index) => {
                    let mut mine = old.remove(index);
                    mine.name = theirs.name.clone();
                    mine.kind = theirs.kind;
                    mine.overridden = theirs.overridden;
                    match (&mut mine.value, &theirs.value) {
                        (Value::Object(existing), Value::Object(incoming)) => {
                            existing.copy_from(incoming);
                        }
                        (Value::List(existing), Value::List(incoming)) => {
                            existing.copy_from(incoming);
                        }
                        (stored, incoming) => {
                            self.counter += nested_version(stored);
                            *stored = incoming.clone();
                        }
                    }
                    mine
                }
                None => theirs.clone(),
            };
            self.slots.push(slot);
        }
        self.counter += old.iter().map(|s| nested_version(&s.value)).sum::<u64>();
        self.counter += self
            .dynamic
            .iter()
            .map(|(_, v)| nested_version(v))
            .sum::<u64>();
        self.dynamic = other.dynamic.clone();
        self.rebuild_index();
        self.reattach_nested();
        self.bump();
    }

    /// Wire change tracking through this object and every nested
    /// container, attributing mutations to the owning record.
    pub(crate) fn attach_tracking(&mut self, tracking: Tracking) {
        self.tracking = tracking;
        self.reattach_nested();
    }

    /// Value of the slot backed by `field_id`, ignoring names
    pub fn slot_value_by_id(&self, field_id: Identifier) -> Option<&Value> {
        self.slots
            .iter()
            .find(|s| s.field_id == field_id)
            .map(|s| &s.value)
    }

    /// Force a slot's override flag (deserialization path)
    pub(crate) fn set_overridden_by_id(&mut self, field_id: Identifier, overridden: bool) {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.field_id == field_id) {
            slot.overridden = overridden;
        }
    }

    /// Install a slot directly by field id, bypassing schema checks
    /// (enum case tables and the decode path)
    pub(crate) fn insert_slot_raw(&mut self, field_id: Identifier, value: Value, overridden: bool) {
        match self.slots.iter_mut().find(|s| s.field_id == field_id) {
            Some(slot) => {
                self.counter += nested_version(&slot.value);
                slot.kind = value.kind();
                slot.value = value;
                slot.overridden = overridden;
            }
            None => self.slots.push(FieldSlot {
                field_id,
                name: String::new(),
                kind: value.kind(),
                value,
                overridden,
            }),
        }
        self.bump();
    }

    /// Install a fully described slot (decode path)
    pub(crate) fn push_slot(&mut self, slot: FieldSlot) {
        self.slots.push(slot);
        self.rebuild_index();
    }

    /// Install a dynamic property directly (decode path)
    pub(crate) fn push_dynamic(&mut self, name: String, value: Value) {
        self.dynamic.push((name, value));
    }

    /// Rewrite every type identifier in this object through `remap`,
    /// recursing into nested containers (load-time migration path)
    pub(crate) fn remap_types(&mut self, remap: &dyn Fn(Identifier) -> Identifier) {
        let mapped = remap(self.type_ref.id());
        if mapped != self.type_ref.id() {
            self.type_ref = Ref::new(mapped, self.type_ref.name());
        }
        for value in self
            .slots
            .iter_mut()
            .map(|s| &mut s.value)
            .chain(self.dynamic.iter_mut().map(|(_, v)| v))
        {
            remap_value(value, remap);
        }
    }

    fn slot_by_name(&self, name: &str) -> Option<&FieldSlot> {
        self.slot_index_by_name(name).map(|i| &self.slots[i])
    }

    fn slot_index_by_name(&self, name: &str) -> Option<usize> {
        match self.name_index.get(name) {
            Some(&index) if self.slots.get(index).map(|s| s.name.as_str()) == Some(name) => {
                Some(index)
            }
            // Index is rebuilt on refresh; fall back to a scan between
            _ => self.slots.iter().position(|s| s.name == name),
        }
    }

    fn rebuild_index(&mut self) {
        self.name_index.clear();
        for (index, slot) in self.slots.iter().enumerate() {
            self.name_index.insert(slot.name.clone(), index);
        }
    }

    fn reattach_nested(&mut self) {
        let tracking = self.tracking.clone();
        for value in self
            .slots
            .iter_mut()
            .map(|s| &mut s.value)
            .chain(self.dynamic.iter_mut().map(|(_, v)| v))
        {
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

impl PartialEq for DynamicObject {
    fn eq(&self, other: &Self) -> bool {
        self.type_ref == other.type_ref
            && self.slots == other.slots
            && self.dynamic == other.dynamic
    }
}

impl std::fmt::Debug for DynamicObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicObject")
            .field("type_ref", &self.type_ref)
            .field("slots", &self.slots)
            .field("dynamic", &self.dynamic)
            .finish()
    }
}

pub(crate) fn nested_version(value: &Value) -> u64 {
    match value {
        Value::Object(obj) => obj.version(),
        Value::List(list) => list.version(),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::schema::builtins;

    fn registry_with_position() -> (Registry, Ref<TypeDef>) {
        let mut registry = Registry::new();
        registry.register_builtins();
        let position = registry.create_type("Position", TypeKind::Component);
        position
            .borrow_mut()
            .add_field("x", builtins::int_type(), false);
        let type_id = position.borrow().id();
        registry.resolve_default(type_id);
        position
            .borrow_mut()
            .default_value_mut()
            .unwrap()
            .set("x", Value::Int(5))
            .unwrap();
        let reference = position.borrow().reference();
        (registry, reference)
    }

    #[test]
    fn unoverridden_fields_track_the_default() {
        // Goal: an untouched field mirrors the type default, follows
        // default edits, and an overridden field does not
        let (registry, position) = registry_with_position();
        let mut plain = DynamicObject::new(position.clone());
        plain.refresh(&registry, None, false);
        let mut custom = DynamicObject::new(position.clone());
        custom.refresh(&registry, None, false);

        assert_eq!(plain.get("x"), Some(&Value::Int(5)));
        assert_eq!(plain.is_overridden("x"), Some(false));

        custom.set("x", Value::Int(7)).unwrap();
        assert_eq!(custom.is_overridden("x"), Some(true));

        // Edit the default; only the untouched instance follows
        let type_cell = registry.find_type(position.id()).unwrap();
        type_cell
            .borrow_mut()
            .default_value_mut()
            .unwrap()
            .set("x", Value::Int(6))
            .unwrap();
        plain.refresh(&registry, None, false);
        custom.refresh(&registry, None, false);
        assert_eq!(plain.get("x"), Some(&Value::Int(6)));
        assert_eq!(custom.get("x"), Some(&Value::Int(7)));
    }

    #[test]
    fn schema_edits_reconcile_by_field_identifier() {
        // Goal: renames and reorders preserve stored values; removals drop
        // the slot; additions appear with the default
        let (registry, position) = registry_with_position();
        let type_cell = registry.find_type(position.id()).unwrap();
        let x = type_cell.borrow().field_by_name("x").unwrap().id;

        let mut object = DynamicObject::new(position.clone());
        object.refresh(&registry, None, false);
        object.set("x", Value::Int(7)).unwrap();

        type_cell.borrow_mut().rename_field(x, "horizontal");
        let y = type_cell
            .borrow_mut()
            .add_field("y", builtins::int_type(), false);
        type_cell.borrow_mut().move_field(y, 0);
        object.refresh(&registry, None, false);

        assert_eq!(object.get("x"), None);
        assert_eq!(object.get("horizontal"), Some(&Value::Int(7)));
        assert_eq!(object.is_overridden("horizontal"), Some(true));
        assert_eq!(object.slots()[0].name(), "y");
        assert_eq!(object.get("y"), Some(&Value::Int(0)));

        type_cell.borrow_mut().remove_field(x);
        object.refresh(&registry, None, false);
        assert_eq!(object.get("horizontal"), None);
    }

    #[test]
    fn kind_mismatch_is_rejected_and_unknown_names_go_dynamic() {
        let (registry, position) = registry_with_position();
        let mut object = DynamicObject::new(position);
        object.refresh(&registry, None, false);

        let err = object.set("x", Value::String("no".into())).unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch { .. }));

        object.set("tag", Value::String("boss".into())).unwrap();
        assert_eq!(object.get("tag"), Some(&Value::String("boss".into())));
        assert_eq!(object.is_overridden("tag"), Some(true));
        assert!(object.remove_dynamic("tag"));
        assert_eq!(object.get("tag"), None);
    }

    #[test]
    fn versions_are_monotonic_and_noop_writes_do_not_bump() {
        let (registry, position) = registry_with_position();
        let mut object = DynamicObject::new(position);
        object.refresh(&registry, None, false);

        let v0 = object.version();
        object.set("x", Value::Int(7)).unwrap();
        let v1 = object.version();
        assert!(v1 > v0);

        // Writing the value already stored is not an observable change
        object.set("x", Value::Int(7)).unwrap();
        assert_eq!(object.version(), v1);
    }

    fn registry_with_sprite() -> (Registry, std::rc::Rc<std::cell::RefCell<TypeDef>>) {
        let mut registry = Registry::new();
        registry.register_builtins();
        let inner = registry.create_type("Extent", TypeKind::Struct);
        inner
            .borrow_mut()
            .add_field("width", builtins::int_type(), false);
        let outer = registry.create_type("Sprite", TypeKind::Component);
        outer
            .borrow_mut()
            .add_field("extent", inner.borrow().reference(), false);
        let inner_id = inner.borrow().id();
        let outer_id = outer.borrow().id();
        registry.resolve_default(inner_id);
        registry.resolve_default(outer_id);
        (registry, outer)
    }

    fn extent_width(object: &DynamicObject) -> Option<Value> {
        object
            .get("extent")
            .and_then(Value::as_object)
            .and_then(|e| e.get("width"))
            .cloned()
    }

    #[test]
    fn nested_writes_roll_up_and_copies_are_isolated() {
        // Goal: a structured field write bumps the parent's rollup
        // version, and a clone mutates independently of the original
        let (registry, outer) = registry_with_sprite();

        let mut sprite = DynamicObject::new(outer.borrow().reference());
        sprite.refresh(&registry, None, false);

        let v0 = sprite.version();
        sprite
            .object_mut("extent")
            .expect("nested slot synthesized")
            .set("width", Value::Int(32))
            .unwrap();
        assert!(sprite.version() > v0);

        let mut copy = sprite.clone();
        copy.object_mut("extent")
            .unwrap()
            .set("width", Value::Int(64))
            .unwrap();
        assert_eq!(extent_width(&sprite), Some(Value::Int(32)));
        assert_eq!(extent_width(&copy), Some(Value::Int(64)));
    }

    #[test]
    fn removing_a_structured_field_never_rewinds_the_version() {
        // Goal: a refresh that drops a heavily edited nested slot still
        // strictly increases the observable version
        let (registry, outer) = registry_with_sprite();
        let extent = outer.borrow().field_by_name("extent").unwrap().id;

        let mut sprite = DynamicObject::new(outer.borrow().reference());
        sprite.refresh(&registry, None, false);
        for step in 0..10i64 {
            sprite
                .object_mut("extent")
                .unwrap()
                .set("width", Value::Int(step))
                .unwrap();
        }
        let before = sprite.version();

        outer.borrow_mut().remove_field(extent);
        sprite.refresh(&registry, None, false);
        assert!(sprite.version() > before);
        assert_eq!(sprite.get("extent"), None);
    }

    #[test]
    fn copy_from_duplicates_nested_state_deeply() {
        // Goal: after a copy, mutating the source's nested object leaves
        // the copy untouched, and override flags come across verbatim
        let (registry, outer) = registry_with_sprite();

        let mut original = DynamicObject::new(outer.borrow().reference());
        original.refresh(&registry, None, false);
        original
            .object_mut("extent")
            .unwrap()
            .set("width", Value::Int(32))
            .unwrap();

        let mut copy = DynamicObject::new(outer.borrow().reference());
        copy.refresh(&registry, None, false);
        let v0 = copy.version();
        copy.copy_from(&original);
        assert!(copy.version() > v0);
        assert_eq!(extent_width(&copy), Some(Value::Int(32)));
        let nested = copy.get("extent").and_then(Value::as_object).unwrap();
        assert_eq!(nested.is_overridden("width"), Some(true));

        original
            .object_mut("extent")
            .unwrap()
            .set("width", Value::Int(64))
            .unwrap();
        assert_eq!(extent_width(&copy), Some(Value::Int(32)));
        assert_eq!(extent_width(&original), Some(Value::Int(64)));
    }

    #[test]
    fn reset_returns_every_field_to_the_default() {
        let (registry, position) = registry_with_position();
        let mut object = DynamicObject::new(position);
        object.refresh(&registry, None, false);
        object.set("x", Value::Int(7)).unwrap();
        object.set("note", Value::String("tmp".into())).unwrap();

        object.reset(&registry, None);
        assert_eq!(object.get("x"), Some(&Value::Int(5)));
        assert_eq!(object.is_overridden("x"), Some(false));
        assert_eq!(object.get("note"), None);
    }

    #[test]
    fn enum_slots_resolve_against_the_case_table() {
        // Goal: an untouched enum field takes the default case, and a
        // stored selection survives a case rename by identifier
        let mut registry = Registry::new();
        registry.register_builtins();
        let blend = registry.create_type("BlendMode", TypeKind::Enum);
        let normal = blend.borrow_mut().add_enum_case("Normal", 0);
        let add = blend.borrow_mut().add_enum_case("Add", 10);

        let holder = registry.create_type("Material", TypeKind::Component);
        holder
            .borrow_mut()
            .add_field("blend", blend.borrow().reference(), false);
        let holder_id = holder.borrow().id();
        registry.resolve_default(holder_id);

        let mut material = DynamicObject::new(holder.borrow().reference());
        material.refresh(&registry, None, false);
        match material.get("blend") {
            Some(Value::EnumValue(selection)) => {
                assert_eq!(selection.case_id, normal);
                assert_eq!(selection.value, 0);
            }
            other => panic!("expected enum selection, got {other:?}"),
        }

        let selection = EnumValue::new(blend.borrow().reference(), add, "Add", 10);
        material
            .set("blend", Value::EnumValue(selection))
            .unwrap();
        blend.borrow_mut().rename_field(add, "Additive");
        material.refresh(&registry, None, false);
        match material.get("blend") {
            Some(Value::EnumValue(selection)) => {
                assert_eq!(selection.case_id, add);
                assert_eq!(selection.name, "Additive");
                assert_eq!(selection.value, 10);
            }
            other => panic!("expected enum selection, got {other:?}"),
        }
    }
}

pub(crate) fn remap_value(value: &mut Value, remap: &dyn Fn(Identifier) -> Identifier) {
    match value {
        Value::Object(nested) => nested.remap_types(remap),
        Value::List(list) => list.remap_types(remap),
        Value::TypeRef(reference) => {
            let mapped = remap(reference.id());
            if mapped != reference.id() {
                *reference = Ref::new(mapped, reference.name());
            }
        }
        Value::EnumValue(selection) => {
            let mapped = remap(selection.enum_type.id());
            if mapped != selection.enum_type.id() {
                selection.enum_type = Ref::new(mapped, selection.enum_type.name());
            }
        }
        _ => {}
    }
}

/// Repair an enum selection against the freshest enum type: keep the
/// case identifier, refresh its name and numeric value, and fall back to
/// the type's default case when the stored case is gone.
fn resolve_enum(
    registry: &Registry,
    enum_type: &Ref<TypeDef>,
    current: Option<&EnumValue>,
) -> Option<EnumValue> {
    let cell = registry.find_type(enum_type.id())?;
    let type_def = cell.try_borrow().ok()?;
    if !matches!(type_def.kind(), TypeKind::Enum) {
        return None;
    }
    if let Some(current) = current {
        if let Some(case) = type_def.field(current.case_id) {
            let value = type_def.case_value(current.case_id).unwrap_or(current.value);
            return Some(EnumValue::new(
                type_def.reference(),
                current.case_id,
                case.name.clone(),
                value,
            ));
        }
    }
    type_def.default_case()
}
