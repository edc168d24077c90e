//! Type definitions for the Mosaic Store
//!
//! This module contains the foundational value types organized by
//! category.

/// Identifier types
pub mod ids;
/// Weak typed references
pub mod reference;
/// Dynamic value representation
pub mod value;
/// System-wide error types
pub mod error;

// Re-export commonly used types for convenience
pub use error::{Result, StoreError, StreamError};
pub use ids::Identifier;
pub use reference::{RecordClass, Ref};
pub use value::{AssetHandle, EnumValue, FieldKind, Value};
