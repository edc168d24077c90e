//! Stream deserialization: command frames into a live registry.
//!
//! Loading is a two-pass process. The frame scan applies structural
//! records (projects, modules, groups, scripts, systems, evictions)
//! immediately and buffers type and entity payloads. Buffered types are
//! then instantiated together, their default instances resolved in
//! dependency order, and finally entities are instantiated against the now
//! complete schema. Records whose identifier is already registered are
//! overwritten in place, so live handles held by an editor survive a
//! reload.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, info, warn};

use ahash::AHashSet;

use crate::constants::FRAME_HEADER_LENGTH;
use crate::core::LoadConfig;
use crate::object::DynamicObject;
use crate::registry::{Entity, EntityGroup, ModuleDef, Project, Record, Registry, Script, SystemDef};
use crate::schema::{FieldDef, TypeDef, TypeKind};
use crate::stream::codec::{read_ref, Reader};
use crate::stream::commands::CommandKind;
use crate::stream::migration::MigrationRegistry;
use crate::stream::writer::type_kind_from_tags;
use crate::types::{Identifier, Ref, Result, StoreError, StreamError};

/// What a load did, for logging and tests
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AcceptReport {
    /// Frames scanned
    pub frames: usize,
    /// Records created or overwritten
    pub applied: usize,
    /// Records evicted by `Unregister` frames
    pub evicted: usize,
    /// Frames skipped (unknown commands in lenient mode)
    pub skipped: usize,
    /// Type definitions instantiated
    pub types: usize,
    /// Entities instantiated
    pub entities: usize,
}

struct PendingType {
    id: Identifier,
    name: String,
    kind: TypeKind,
    base: Ref<TypeDef>,
    fields: Vec<FieldDef>,
    default: Option<DynamicObject>,
}

struct PendingEntity {
    id: Identifier,
    name: String,
    enabled: bool,
    components: Vec<DynamicObject>,
}

/// Apply a command stream to a registry.
///
/// A truncated frame or corrupt payload aborts the whole load with an
/// error; an unknown command byte is skipped with a warning unless
/// `config.strict` is set. Frames already applied before an abort stay
/// applied - callers that need atomicity load into a scratch registry.
pub fn accept(
    data: &[u8],
    registry: &mut Registry,
    migrations: &MigrationRegistry,
    config: &LoadConfig,
) -> Result<AcceptReport> {
    let mut report = AcceptReport::default();
    let mut pending_types: Vec<PendingType> = Vec::new();
    let mut pending_entities: Vec<PendingEntity> = Vec::new();

    // Pass over the frames: structural records apply immediately, types
    // and entities buffer until the whole stream is scanned
    let mut offset = 0usize;
    while offset < data.len() {
        let available = data.len() - offset;
        if available < FRAME_HEADER_LENGTH {
            return Err(StreamError::Truncated {
                offset,
                expected: FRAME_HEADER_LENGTH,
                available,
            }
            .into());
        }
        let command_byte = data[offset];
        let length = u32::from_le_bytes([
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
            data[offset + 4],
        ]);
        if length > config.max_frame_length {
            return Err(StreamError::FrameTooLarge {
                length,
                max_length: config.max_frame_length,
            }
            .into());
        }
        let payload_start = offset + FRAME_HEADER_LENGTH;
        let payload_end = payload_start + length as usize;
        if payload_end > data.len() {
            return Err(StreamError::Truncated {
                offset: payload_start,
                expected: length as usize,
                available: data.len() - payload_start,
            }
            .into());
        }
        let payload = &data[payload_start..payload_end];
        report.frames += 1;

        match CommandKind::from_u8(command_byte) {
            Some(CommandKind::CreateProject) => {
                apply_project(payload, registry)?;
                report.applied += 1;
            }
            Some(CommandKind::CreateModule) => {
                apply_module(payload, registry)?;
                report.applied += 1;
            }
            Some(CommandKind::CreateType) => {
                pending_types.push(decode_type(payload, migrations)?);
            }
            Some(CommandKind::CreateEntityGroup) => {
                apply_group(payload, registry)?;
                report.applied += 1;
            }
            Some(CommandKind::CreateEntity) => {
                pending_entities.push(decode_entity(payload, migrations)?);
            }
            Some(CommandKind::CreateScript) => {
                apply_script(payload, registry)?;
                report.applied += 1;
            }
            Some(CommandKind::CreateSystem) => {
                apply_system(payload, registry)?;
                report.applied += 1;
            }
            Some(CommandKind::Unregister) => {
                let mut reader = Reader::new(payload);
                let id = reader.read_id()?;
                if registry.unregister(id).is_some() {
                    report.evicted += 1;
                }
            }
            None => {
                if config.strict {
                    return Err(StreamError::UnknownCommand(command_byte).into());
                }
                warn!(
                    command = command_byte,
                    length, offset, "skipping unknown command frame"
                );
                report.skipped += 1;
            }
        }
        offset = payload_end;
    }

    // Types instantiate together so forward references between them
    // resolve regardless of frame order
    report.types = pending_types.len();
    let type_ids: Vec<Identifier> = pending_types.iter().map(|t| t.id).collect();
    for pending in pending_types.drain(..) {
        apply_type(pending, registry);
        report.applied += 1;
    }

    // Default instances resolve in dependency order: a type's base and
    // field types resolve before the type itself
    resolve_defaults_in_order(&type_ids, registry);

    // Entities reconcile against the now complete schema
    report.entities = pending_entities.len();
    for pending in pending_entities.drain(..) {
        apply_entity(pending, registry, migrations, config)?;
        report.applied += 1;
    }

    registry.refresh_all();
    info!(
        frames = report.frames,
        applied = report.applied,
        types = report.types,
        entities = report.entities,
        skipped = report.skipped,
        "accepted command stream"
    );
    Ok(report)
}

// ---- immediate applies -----------------------------------------------

fn apply_project(payload: &[u8], registry: &mut Registry) -> Result<()> {
    let mut reader = Reader::new(payload);
    let id = reader.read_id()?;
    let name = reader.read_string()?;
    let canvas_width = reader.read_u32()?;
    let canvas_height = reader.read_u32()?;
    let auto_resize = reader.read_bool()?;
    let modules = read_refs(&mut reader)?;

    let cell = match registry.find_by_id(id).and_then(|r| match r {
        Record::Project(cell) => Some(Rc::clone(cell)),
        _ => None,
    }) {
        Some(cell) => cell,
        None => {
            let cell = Rc::new(RefCell::new(Project::new(id, "")));
            registry.register(Record::Project(Rc::clone(&cell)));
            cell
        }
    };
    let mut project = cell.borrow_mut();
    project.set_name(name);
    project.settings.canvas_width = canvas_width;
    project.settings.canvas_height = canvas_height;
    project.settings.auto_resize = auto_resize;
    project.modules = modules;
    project.touch();
    Ok(())
}

fn apply_module(payload: &[u8], registry: &mut Registry) -> Result<()> {
    let mut reader = Reader::new(payload);
    let id = reader.read_id()?;
    let name = reader.read_string()?;
    let dependencies = read_refs(&mut reader)?;
    let types = read_refs(&mut reader)?;
    let entity_groups = read_refs(&mut reader)?;
    let scripts = read_refs(&mut reader)?;
    let systems = read_refs(&mut reader)?;

    let cell = find_or_create(registry, id, ModuleDef::new, Record::Module, |r| match r {
        Record::Module(cell) => Some(Rc::clone(cell)),
        _ => None,
    });
    let mut module = cell.borrow_mut();
    module.set_name(name);
    module.dependencies = dependencies;
    module.types = types;
    module.entity_groups = entity_groups;
    module.scripts = scripts;
    module.systems = systems;
    module.touch();
    Ok(())
}

fn apply_group(payload: &[u8], registry: &mut Registry) -> Result<()> {
    let mut reader = Reader::new(payload);
    let id = reader.read_id()?;
    let name = reader.read_string()?;
    let entities = read_refs(&mut reader)?;

    let cell = find_or_create(
        registry,
        id,
        EntityGroup::new,
        Record::EntityGroup,
        |r| match r {
            Record::EntityGroup(cell) => Some(Rc::clone(cell)),
            _ => None,
        },
    );
    let mut group = cell.borrow_mut();
    group.set_name(name);
    group.entities = entities;
    group.touch();
    Ok(())
}

fn apply_script(payload: &[u8], registry: &mut Registry) -> Result<()> {
    let mut reader = Reader::new(payload);
    let id = reader.read_id()?;
    let name = reader.read_string()?;
    let source = reader.read_string()?;

    let cell = find_or_create(registry, id, Script::new, Record::Script, |r| match r {
        Record::Script(cell) => Some(Rc::clone(cell)),
        _ => None,
    });
    let mut script = cell.borrow_mut();
    script.set_name(name);
    script.set_source(source);
    Ok(())
}

fn apply_system(payload: &[u8], registry: &mut Registry) -> Result<()> {
    let mut reader = Reader::new(payload);
    let id = reader.read_id()?;
    let name = reader.read_string()?;
    let execute_after = read_refs(&mut reader)?;
    let execute_before = read_refs(&mut reader)?;
    let components = read_refs(&mut reader)?;
    let script = read_ref(&mut reader)?;

    let cell = find_or_create(registry, id, SystemDef::new, Record::System, |r| match r {
        Record::System(cell) => Some(Rc::clone(cell)),
        _ => None,
    });
    let mut system = cell.borrow_mut();
    system.set_name(name);
    system.execute_after = execute_after;
    system.execute_before = execute_before;
    system.components = components;
    system.script = script;
    system.touch();
    Ok(())
}

fn find_or_create<T>(
    registry: &mut Registry,
    id: Identifier,
    make: fn(Identifier, String) -> T,
    wrap: fn(Rc<RefCell<T>>) -> Record,
    unwrap: fn(&Record) -> Option<Rc<RefCell<T>>>,
) -> Rc<RefCell<T>> {
    if let Some(cell) = registry.find_by_id(id).and_then(unwrap) {
        return cell;
    }
    let cell = Rc::new(RefCell::new(make(id, String::new())));
    registry.register(wrap(Rc::clone(&cell)));
    cell
}

// ---- buffered types ---------------------------------------------------

fn decode_type(payload: &[u8], migrations: &MigrationRegistry) -> Result<PendingType> {
    let mut reader = Reader::new(payload);
    let id = migrations.remap(reader.read_id()?);
    let name = reader.read_string()?;
    let kind_tag = reader.read_u8()?;
    let kind = type_kind_from_tags(kind_tag, &mut reader)?;
    let base: Ref<TypeDef> = read_ref(&mut reader)?;
    let base = remap_ref(base, migrations);

    let field_count = reader.read_varint()? as usize;
    let mut fields = Vec::with_capacity(field_count);
    for _ in 0..field_count {
        let field_id = reader.read_id()?;
        let field_name = reader.read_string()?;
        let field_type = remap_ref(read_ref(&mut reader)?, migrations);
        let is_array = reader.read_bool()?;
        fields.push(FieldDef {
            id: field_id,
            name: field_name,
            field_type,
            is_array,
        });
    }

    let default = if reader.read_bool()? {
        let mut object = crate::stream::codec::read_object(&mut reader)?;
        if !migrations.is_empty() {
            object.remap_types(&|id| migrations.remap(id));
        }
        Some(object)
    } else {
        None
    };

    Ok(PendingType {
        id,
        name,
        kind,
        base,
        fields,
        default,
    })
}

fn apply_type(pending: PendingType, registry: &mut Registry) {
    if let Some(cell) = registry.find_type(pending.id) {
        cell.borrow_mut().restore(
            pending.name,
            pending.kind,
            pending.base,
            pending.fields,
            pending.default,
        );
        return;
    }
    let mut type_def = TypeDef::new(pending.id, "", pending.kind);
    type_def.restore(
        pending.name,
        pending.kind,
        pending.base,
        pending.fields,
        pending.default,
    );
    registry.register(Record::Type(Rc::new(RefCell::new(type_def))));
}

/// Resolve default instances depth-first over base and field-type edges,
/// so nested defaults mirror already resolved sub-defaults. Cycles are
/// broken at the revisit; the refresh guard inside keeps that safe.
fn resolve_defaults_in_order(type_ids: &[Identifier], registry: &Registry) {
    let batch: AHashSet<Identifier> = type_ids.iter().copied().collect();
    let mut done: AHashSet<Identifier> = AHashSet::new();
    for &id in type_ids {
        resolve_default_dfs(id, registry, &batch, &mut done, &mut AHashSet::new());
    }
}

fn resolve_default_dfs(
    id: Identifier,
    registry: &Registry,
    batch: &AHashSet<Identifier>,
    done: &mut AHashSet<Identifier>,
    in_progress: &mut AHashSet<Identifier>,
) {
    if done.contains(&id) || !in_progress.insert(id) {
        return;
    }
    let dependencies: Vec<Identifier> = match registry.find_type(id) {
        Some(cell) => match cell.try_borrow() {
            Ok(type_def) => std::iter::once(type_def.base().id())
                .chain(type_def.fields().iter().map(|f| f.field_type.id()))
                .filter(|dep| !dep.is_empty() && batch.contains(dep))
                .collect(),
            Err(_) => Vec::new(),
        },
        None => Vec::new(),
    };
    for dep in dependencies {
        resolve_default_dfs(dep, registry, batch, done, in_progress);
    }
    registry.resolve_default(id);
    in_progress.remove(&id);
    done.insert(id);
}

// ---- buffered entities ------------------------------------------------

fn decode_entity(payload: &[u8], migrations: &MigrationRegistry) -> Result<PendingEntity> {
    let mut reader = Reader::new(payload);
    let id = reader.read_id()?;
    let name = reader.read_string()?;
    let enabled = reader.read_bool()?;
    let component_count = reader.read_varint()? as usize;
    let mut components = Vec::with_capacity(component_count);
    for _ in 0..component_count {
        let mut component = crate::stream::codec::read_object(&mut reader)?;
        if !migrations.is_empty() {
            component.remap_types(&|id| migrations.remap(id));
        }
        components.push(component);
    }
    Ok(PendingEntity {
        id,
        name,
        enabled,
        components,
    })
}

fn apply_entity(
    pending: PendingEntity,
    registry: &mut Registry,
    migrations: &MigrationRegistry,
    config: &LoadConfig,
) -> Result<()> {
    let mut components = pending.components;
    for component in &mut components {
        let type_id = component.type_ref().id();
        if registry.find_type(type_id).is_none() {
            if config.strict {
                return Err(StoreError::UnknownType(type_id));
            }
            // Kept verbatim: the data survives until the type reappears
            debug!(%type_id, entity = %pending.name, "component type unresolved, kept as stored");
            continue;
        }
        migrations.upgrade(type_id, component);
    }

    let cell = find_or_create(registry, pending.id, Entity::new, Record::Entity, |r| {
        match r {
            Record::Entity(cell) => Some(Rc::clone(cell)),
            _ => None,
        }
    });
    {
        let mut entity = cell.borrow_mut();
        entity.set_name(pending.name);
        entity.enabled = pending.enabled;
        entity.set_components(components);
    }
    // Reconcile component slots against the live schema now that every
    // type in the stream is instantiated
    cell.borrow_mut().refresh(registry);
    Ok(())
}

fn read_refs<T: crate::types::RecordClass>(reader: &mut Reader<'_>) -> Result<Vec<Ref<T>>> {
    let count = reader.read_varint()? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(read_ref(reader)?);
    }
    Ok(out)
}

fn remap_ref(reference: Ref<TypeDef>, migrations: &MigrationRegistry) -> Ref<TypeDef> {
    if migrations.is_empty() || reference.is_none() {
        return reference;
    }
    let mapped = migrations.remap(reference.id());
    if mapped == reference.id() {
        reference
    } else {
        Ref::new(mapped, reference.name())
    }
}
