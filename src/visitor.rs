//! Project traversal.
//!
//! [`accept_project`] walks a project in a fixed, deterministic order:
//! modules in dependency order (dependencies first), and within each
//! module its types, then its systems in execution order, then scripts,
//! then entity groups with their entities and components. Consumers -
//! exporters, validators, code generators - implement [`ProjectVisitor`]
//! and override only the callbacks they care about.

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashSet;
use tracing::debug;

use crate::object::DynamicObject;
use crate::registry::{Entity, EntityGroup, ModuleDef, Project, Registry, Script, SystemDef};
use crate::schema::TypeDef;
use crate::types::{Identifier, Result, StoreError};

/// Callbacks fired while walking a project. Every callback has an empty
/// default body.
pub trait ProjectVisitor {
    /// Entering a module, before any of its contents
    fn begin_module(&mut self, _module: &ModuleDef) {}
    /// Leaving a module, after all of its contents
    fn end_module(&mut self, _module: &ModuleDef) {}
    /// A type definition declared by the current module
    fn visit_type(&mut self, _type_def: &TypeDef) {}
    /// A system, in execution order within the current module
    fn visit_system(&mut self, _system: &SystemDef) {}
    /// A script declared by the current module
    fn visit_script(&mut self, _script: &Script) {}
    /// An entity group declared by the current module
    fn visit_entity_group(&mut self, _group: &EntityGroup) {}
    /// An entity within the current group
    fn visit_entity(&mut self, _entity: &Entity) {}
    /// A component attached to the current entity
    fn visit_component(&mut self, _entity: &Entity, _component: &DynamicObject) {}
}

/// Walk a project depth-first in deterministic order.
///
/// Dangling references are skipped, not errors; a cycle among system
/// ordering constraints aborts with [`StoreError::SystemCycle`].
pub fn accept_project(
    project: &Project,
    registry: &Registry,
    visitor: &mut dyn ProjectVisitor,
) -> Result<()> {
    for module_cell in module_closure(project, registry) {
        let module = module_cell.borrow();
        visitor.begin_module(&module);

        for type_ref in &module.types {
            if let Some(cell) = registry.dereference(type_ref) {
                visitor.visit_type(&cell.borrow());
            } else {
                debug!(reference = %type_ref.name(), "skipping dangling type reference");
            }
        }

        let systems: Vec<_> = module
            .systems
            .iter()
            .filter_map(|r| registry.dereference(r))
            .collect();
        for system in order_systems(&systems)? {
            visitor.visit_system(&system.borrow());
        }

        for script_ref in &module.scripts {
            if let Some(cell) = registry.dereference(script_ref) {
                visitor.visit_script(&cell.borrow());
            }
        }

        for group_ref in &module.entity_groups {
            let Some(group_cell) = registry.dereference(group_ref) else {
                continue;
            };
            let group = group_cell.borrow();
            visitor.visit_entity_group(&group);
            for entity_ref in &group.entities {
                let Some(entity_cell) = registry.dereference(entity_ref) else {
                    continue;
                };
                let entity = entity_cell.borrow();
                visitor.visit_entity(&entity);
                for component in entity.components() {
                    visitor.visit_component(&entity, component);
                }
            }
        }

        visitor.end_module(&module);
    }
    Ok(())
}

/// The project's modules plus everything they depend on, dependencies
/// first, each module exactly once
fn module_closure(project: &Project, registry: &Registry) -> Vec<Rc<RefCell<ModuleDef>>> {
    let mut out = Vec::new();
    let mut visited: AHashSet<Identifier> = AHashSet::new();
    for module_ref in &project.modules {
        visit_module(module_ref.id(), registry, &mut visited, &mut out);
    }
    out
}

fn visit_module(
    id: Identifier,
    registry: &Registry,
    visited: &mut AHashSet<Identifier>,
    out: &mut Vec<Rc<RefCell<ModuleDef>>>,
) {
    if id.is_empty() || !visited.insert(id) {
        return;
    }
    let Some(cell) = registry.find_by_id(id).and_then(|r| match r {
        crate::registry::Record::Module(cell) => Some(Rc::clone(cell)),
        _ => None,
    }) else {
        return;
    };
    let dependencies: Vec<Identifier> = cell
        .borrow()
        .dependencies
        .iter()
        .map(|d| d.id())
        .collect();
    for dependency in dependencies {
        visit_module(dependency, registry, visited, out);
    }
    out.push(cell);
}

/// Order systems so every `execute_after` target precedes its dependent
/// and every `execute_before` target follows it. Constraints naming
/// systems outside the given set are ignored. Ties keep the given order.
pub fn order_systems(
    systems: &[Rc<RefCell<SystemDef>>],
) -> Result<Vec<Rc<RefCell<SystemDef>>>> {
    let ids: Vec<Identifier> = systems.iter().map(|s| s.borrow().id()).collect();
    let index_of = |id: Identifier| ids.iter().position(|i| *i == id);

    // edges[a] holds indices that must run after a
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); systems.len()];
    let mut blockers: Vec<usize> = vec![0; systems.len()];
    for (index, system) in systems.iter().enumerate() {
        let system = system.borrow();
        for before in &system.execute_after {
            if let Some(other) = index_of(before.id()) {
                successors[other].push(index);
                blockers[index] += 1;
            }
        }
        for after in &system.execute_before {
            if let Some(other) = index_of(after.id()) {
                successors[index].push(other);
                blockers[other] += 1;
            }
        }
    }

    let mut ordered = Vec::with_capacity(systems.len());
    let mut placed = vec![false; systems.len()];
    while ordered.len() < systems.len() {
        // First unplaced system with no unresolved blockers keeps the
        // ordering stable for unconstrained systems
        let Some(next) = (0..systems.len()).find(|i| !placed[*i] && blockers[*i] == 0) else {
            let stuck: Vec<String> = systems
                .iter()
                .enumerate()
                .filter(|(i, _)| !placed[*i])
                .map(|(_, s)| s.borrow().name().to_string())
                .collect();
            return Err(StoreError::SystemCycle(stuck.join(", ")));
        };
        placed[next] = true;
        for &successor in &successors[next] {
            blockers[successor] -= 1;
        }
        ordered.push(Rc::clone(&systems[next]));
    }
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sys(registry: &mut Registry, name: &str) -> Rc<RefCell<SystemDef>> {
        registry.create_system(name)
    }

    #[test]
    fn systems_order_by_constraints() {
        // Goal: execute_after and execute_before both constrain the
        // order; unconstrained systems keep their given order
        let mut registry = Registry::new();
        let physics = sys(&mut registry, "physics");
        let render = sys(&mut registry, "render");
        let input = sys(&mut registry, "input");

        // render runs after physics; input runs before physics
        render
            .borrow_mut()
            .execute_after
            .push(physics.borrow().reference());
        input
            .borrow_mut()
            .execute_before
            .push(physics.borrow().reference());

        let ordered = order_systems(&[physics.clone(), render.clone(), input.clone()]).unwrap();
        let names: Vec<_> = ordered.iter().map(|s| s.borrow().name().to_string()).collect();
        assert_eq!(names, vec!["input", "physics", "render"]);
    }

    #[test]
    fn system_cycle_is_an_error() {
        let mut registry = Registry::new();
        let a = sys(&mut registry, "a");
        let b = sys(&mut registry, "b");
        a.borrow_mut().execute_after.push(b.borrow().reference());
        b.borrow_mut().execute_after.push(a.borrow().reference());

        let err = order_systems(&[a, b]).unwrap_err();
        assert!(matches!(err, StoreError::SystemCycle(_)));
    }

    #[test]
    fn constraints_outside_the_set_are_ignored() {
        let mut registry = Registry::new();
        let a = sys(&mut registry, "a");
        let elsewhere = sys(&mut registry, "elsewhere");
        a.borrow_mut()
            .execute_after
            .push(elsewhere.borrow().reference());

        let ordered = order_systems(&[a.clone()]).unwrap();
        assert_eq!(ordered.len(), 1);
    }

    #[test]
    fn module_closure_walks_dependencies_first() {
        // Goal: a project visiting module B that depends on A sees A's
        // contents before B's, each module once
        let mut registry = Registry::new();
        let a = registry.create_module("a");
        let b = registry.create_module("b");
        b.borrow_mut().dependencies.push(a.borrow().reference());
        let project_cell = registry.create_project("demo");
        project_cell.borrow_mut().modules.push(b.borrow().reference());
        project_cell.borrow_mut().modules.push(a.borrow().reference());

        struct Names(Vec<String>);
        impl ProjectVisitor for Names {
            fn begin_module(&mut self, module: &ModuleDef) {
                self.0.push(module.name().to_string());
            }
        }
        let mut names = Names(Vec::new());
        let project = project_cell.borrow();
        accept_project(&project, &registry, &mut names).unwrap();
        assert_eq!(names.0, vec!["a", "b"]);
    }
}
