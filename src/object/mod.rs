//! Dynamic object model: schema-bound containers with override tracking.

/// Schema-bound objects
pub mod dynamic;
/// Homogeneous lists
pub mod list;

pub use dynamic::{DynamicObject, FieldSlot};
pub use list::DynamicList;
