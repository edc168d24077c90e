//! Weak typed references between registry records.
//!
//! A [`Ref<T>`] names a record without owning it: an identifier plus a
//! cached display name. Equality and hashing use the identifier only; the
//! cached name is advisory and repaired opportunistically when the
//! reference is resolved against a registry. A reference whose target is
//! missing resolves to `None` - a dangling reference is routine, not an
//! error.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::rc::Rc;

use crate::registry::{Record, RecordKind};
use crate::types::Identifier;

/// Marker contract tying a reference's type parameter to a registry
/// record kind.
///
/// Implemented by every concrete record type; lets the registry hand back
/// strongly typed handles from its untyped record map.
pub trait RecordClass: Sized + 'static {
    /// The record kind values of this class carry in the registry
    const KIND: RecordKind;

    /// Extract a typed handle from an untyped record, if the kinds match
    fn from_record(record: &Record) -> Option<Rc<RefCell<Self>>>;
}

/// A value naming a record without owning it: id + cached display name.
pub struct Ref<T: RecordClass> {
    id: Identifier,
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T: RecordClass> Ref<T> {
    /// Create a reference to a record by id, caching its display name
    pub fn new(id: Identifier, name: impl Into<String>) -> Self {
        Ref {
            id,
            name: name.into(),
            _marker: PhantomData,
        }
    }

    /// The reference to nothing (the null identifier)
    pub fn none() -> Self {
        Ref::new(Identifier::EMPTY, "")
    }

    /// Target identifier
    pub fn id(&self) -> Identifier {
        self.id
    }

    /// Last known display name of the target.
    ///
    /// Advisory only; never used for equality or lookup.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is the null reference
    pub fn is_none(&self) -> bool {
        self.id.is_empty()
    }

    /// Copy of this reference with a refreshed cached name
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Ref::new(self.id, name)
    }
}

// Manual impls: derive would bound T itself, but only the marker is stored.

impl<T: RecordClass> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Ref::new(self.id, self.name.clone())
    }
}

impl<T: RecordClass> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T: RecordClass> Eq for Ref<T> {}

impl<T: RecordClass> Hash for Ref<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T: RecordClass> Default for Ref<T> {
    fn default() -> Self {
        Ref::none()
    }
}

impl<T: RecordClass> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "Ref(none)")
        } else {
            write!(f, "Ref({} `{}`)", self.id, self.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TypeDef;

    #[test]
    fn equality_ignores_cached_name() {
        // Goal: two references to the same id compare equal whatever their
        // cached names say
        let id = Identifier::random();
        let a: Ref<TypeDef> = Ref::new(id, "Position");
        let b: Ref<TypeDef> = Ref::new(id, "RenamedLater");
        assert_eq!(a, b);
        assert_ne!(a, Ref::new(Identifier::random(), "Position"));
    }

    #[test]
    fn none_reference_has_empty_id() {
        let r: Ref<TypeDef> = Ref::none();
        assert!(r.is_none());
        assert_eq!(r.id(), Identifier::EMPTY);
    }
}
