//! Load-time migration hooks.
//!
//! Streams written by older editors may reference retired type
//! identifiers or carry component layouts the current schema no longer
//! matches. A [`MigrationRegistry`] supplied to the loader remaps retired
//! type identifiers to their replacements and runs registered upgraders
//! over decoded component instances before they are reconciled against
//! the live schema.

use ahash::AHashMap;
use tracing::warn;

use crate::constants::MAX_SCHEMA_DEPTH;
use crate::object::DynamicObject;
use crate::types::Identifier;

/// In-place fixup run over a decoded instance of a migrated type
pub type Upgrader = Box<dyn Fn(&mut DynamicObject)>;

/// Type-identifier remaps plus per-type instance upgraders, consulted by
/// the loader before decoded payloads touch the registry.
#[derive(Default)]
pub struct MigrationRegistry {
    remaps: AHashMap<Identifier, Identifier>,
    upgraders: AHashMap<Identifier, Vec<Upgrader>>,
}

impl MigrationRegistry {
    /// An empty migration table
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that streams naming `from` should resolve to `to`
    pub fn add_remap(&mut self, from: Identifier, to: Identifier) {
        self.remaps.insert(from, to);
    }

    /// Register an upgrader for decoded instances of `type_id` (the
    /// post-remap identifier). Upgraders run in registration order.
    pub fn add_upgrader(
        &mut self,
        type_id: Identifier,
        upgrader: impl Fn(&mut DynamicObject) + 'static,
    ) {
        self.upgraders
            .entry(type_id)
            .or_default()
            .push(Box::new(upgrader));
    }

    /// Resolve an identifier through the remap table, following chains.
    /// Chains are depth-capped; a remap cycle resolves to the identifier
    /// where the guard tripped.
    pub fn remap(&self, id: Identifier) -> Identifier {
        let mut current = id;
        for _ in 0..MAX_SCHEMA_DEPTH {
            match self.remaps.get(&current) {
                Some(next) => current = *next,
                None => return current,
            }
        }
        warn!(%id, "type remap chain exceeded depth cap");
        current
    }

    /// Run every upgrader registered for the instance's (post-remap) type
    pub fn upgrade(&self, type_id: Identifier, instance: &mut DynamicObject) {
        if let Some(upgraders) = self.upgraders.get(&type_id) {
            for upgrader in upgraders {
                upgrader(instance);
            }
        }
    }

    /// Whether the table is empty (the loader's fast path)
    pub fn is_empty(&self) -> bool {
        self.remaps.is_empty() && self.upgraders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remap_follows_chains() {
        // Goal: retired ids resolve transitively to the current one
        let mut migrations = MigrationRegistry::new();
        let a = Identifier::random();
        let b = Identifier::random();
        let c = Identifier::random();
        migrations.add_remap(a, b);
        migrations.add_remap(b, c);

        assert_eq!(migrations.remap(a), c);
        assert_eq!(migrations.remap(b), c);
        assert_eq!(migrations.remap(c), c);
    }

    #[test]
    fn remap_cycle_is_capped() {
        let mut migrations = MigrationRegistry::new();
        let a = Identifier::random();
        let b = Identifier::random();
        migrations.add_remap(a, b);
        migrations.add_remap(b, a);
        // Resolves to one of the cycle members instead of spinning
        let resolved = migrations.remap(a);
        assert!(resolved == a || resolved == b);
    }
}
