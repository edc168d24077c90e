//! Mosaic Store - an embedded schema-driven object store for content editors
//!
//! Mosaic Store holds every authored entity of an editing session (projects,
//! modules, type definitions, entities, entity groups, scripts, systems) as
//! dynamically-typed records keyed by a stable 128-bit identifier. It tracks
//! per-field overrides against a type's default value, detects changes for
//! undo/redo and incremental rebuilds, and serializes the whole record graph
//! through a compact binary command protocol.
#![warn(missing_docs)]

// Core foundational modules
pub mod core;

// Type definitions for all data structures
pub mod types;

// System constants
pub mod constants;

// Domain modules
pub mod object;
pub mod registry;
pub mod schema;
pub mod stream;
pub mod version;
pub mod visitor;

// Re-export commonly used items for convenience
pub use self::core::{Config, LoadConfig};
pub use object::{DynamicList, DynamicObject};
pub use registry::{Record, RecordKind, Registry};
pub use schema::{FieldDef, TypeDef, TypeKind};
pub use stream::{AcceptReport, MigrationRegistry};
pub use types::{AssetHandle, EnumValue, FieldKind, Identifier, Ref, Value};
pub use types::{Result, StoreError, StreamError};
pub use version::{Caretaker, ChangeEvent, ChangeKind, Memento, VersionStorage};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize tracing for embedding applications that have no subscriber of
/// their own. Library code only emits events; calling this is optional.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Initializing {} v{}", NAME, VERSION);
}
