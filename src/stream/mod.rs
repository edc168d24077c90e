//! Binary command-stream persistence.
//!
//! A stored registry is a flat sequence of self-delimiting command
//! frames. The format is append-friendly and forward-skippable: every
//! frame declares its payload length, so readers can step over commands
//! they do not understand.

pub mod codec;
pub mod commands;
pub mod migration;
pub mod reader;
pub mod writer;

use std::path::Path;

use tracing::info;

use crate::core::LoadConfig;
use crate::registry::Registry;
use crate::types::Result;

pub use commands::CommandKind;
pub use migration::MigrationRegistry;
pub use reader::{accept, AcceptReport};
pub use writer::{encode_record, encode_unregister, persist_all};

/// Snapshot the registry to a stream file
pub fn save_to_path(registry: &Registry, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let data = persist_all(registry)?;
    std::fs::write(path, &data)?;
    info!(path = %path.display(), bytes = data.len(), "saved registry");
    Ok(())
}

/// Load a stream file into the registry
pub fn load_from_path(
    registry: &mut Registry,
    path: impl AsRef<Path>,
    migrations: &MigrationRegistry,
    config: &LoadConfig,
) -> Result<AcceptReport> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    let report = accept(&data, registry, migrations, config)?;
    info!(path = %path.display(), bytes = data.len(), "loaded registry");
    Ok(report)
}
