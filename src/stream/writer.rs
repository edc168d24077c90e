//! Stream serialization: registry records to command frames.
//!
//! [`persist_all`] snapshots a whole registry as a flat frame sequence in
//! registration order. [`encode_record`] produces the single frame for one
//! record; the undo machinery uses it to capture mementos in the same
//! format the loader accepts.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::registry::{Record, Registry, BUILTIN_SOURCE};
use crate::schema::{TypeDef, TypeKind};
use crate::stream::codec::{self, write_bool, write_id, write_ref, write_string, write_varint};
use crate::stream::commands::CommandKind;
use crate::types::{FieldKind, Identifier, Result, StreamError};

/// Serialize the whole registry as one command stream.
///
/// Records are emitted in registration order; built-in primitive types are
/// ambient and skipped. Every record's references are repaired first so
/// cached display names on the wire are current. One scratch payload
/// buffer is reused across all records.
pub fn persist_all(registry: &Registry) -> Result<Bytes> {
    registry.refresh_all();
    let mut out = BytesMut::new();
    let mut scratch = BytesMut::new();
    let mut count = 0usize;
    for record in registry.records() {
        if registry.source_of(record.id()) == Some(BUILTIN_SOURCE) {
            continue;
        }
        let command = encode_payload(record, &mut scratch)?;
        out.put_u8(command as u8);
        out.put_u32_le(scratch.len() as u32);
        out.put_slice(&scratch);
        count += 1;
    }
    debug!(records = count, bytes = out.len(), "persisted registry");
    Ok(out.freeze())
}

/// Serialize one record as a single complete frame
pub fn encode_record(record: &Record) -> Result<Bytes> {
    let mut payload = BytesMut::new();
    let command = encode_payload(record, &mut payload)?;
    Ok(frame(command, &payload))
}

fn encode_payload(record: &Record, payload: &mut BytesMut) -> Result<CommandKind> {
    payload.clear();
    let command = match record {
        Record::Project(cell) => {
            let project = borrow(cell)?;
            write_id(payload, project.id());
            write_string(payload, project.name());
            payload.put_u32_le(project.settings.canvas_width);
            payload.put_u32_le(project.settings.canvas_height);
            write_bool(payload, project.settings.auto_resize);
            write_refs(payload, &project.modules);
            CommandKind::CreateProject
        }
        Record::Module(cell) => {
            let module = borrow(cell)?;
            write_id(payload, module.id());
            write_string(payload, module.name());
            write_refs(payload, &module.dependencies);
            write_refs(payload, &module.types);
            write_refs(payload, &module.entity_groups);
            write_refs(payload, &module.scripts);
            write_refs(payload, &module.systems);
            CommandKind::CreateModule
        }
        Record::Type(cell) => {
            let type_def = borrow(cell)?;
            write_type(payload, &type_def);
            CommandKind::CreateType
        }
        Record::EntityGroup(cell) => {
            let group = borrow(cell)?;
            write_id(payload, group.id());
            write_string(payload, group.name());
            write_refs(payload, &group.entities);
            CommandKind::CreateEntityGroup
        }
        Record::Entity(cell) => {
            let entity = borrow(cell)?;
            write_id(payload, entity.id());
            write_string(payload, entity.name());
            write_bool(payload, entity.enabled);
            write_varint(payload, entity.components().len() as u64);
            for component in entity.components() {
                codec::write_object(payload, component);
            }
            CommandKind::CreateEntity
        }
        Record::Script(cell) => {
            let script = borrow(cell)?;
            write_id(payload, script.id());
            write_string(payload, script.name());
            write_string(payload, &script.source);
            CommandKind::CreateScript
        }
        Record::System(cell) => {
            let system = borrow(cell)?;
            write_id(payload, system.id());
            write_string(payload, system.name());
            write_refs(payload, &system.execute_after);
            write_refs(payload, &system.execute_before);
            write_refs(payload, &system.components);
            write_ref(payload, &system.script);
            CommandKind::CreateSystem
        }
    };
    Ok(command)
}

/// The single frame evicting a record by identifier
pub fn encode_unregister(id: Identifier) -> Bytes {
    let mut payload = BytesMut::new();
    write_id(&mut payload, id);
    frame(CommandKind::Unregister, &payload)
}

fn frame(command: CommandKind, payload: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(payload.len() + crate::constants::FRAME_HEADER_LENGTH);
    out.put_u8(command as u8);
    out.put_u32_le(payload.len() as u32);
    out.put_slice(payload);
    out.freeze()
}

fn write_refs<T: crate::types::RecordClass>(
    buf: &mut BytesMut,
    refs: &[crate::types::Ref<T>],
) {
    write_varint(buf, refs.len() as u64);
    for reference in refs {
        write_ref(buf, reference);
    }
}

fn write_type(buf: &mut BytesMut, type_def: &TypeDef) {
    write_id(buf, type_def.id());
    write_string(buf, type_def.name());
    match type_def.kind() {
        TypeKind::Primitive(kind) => {
            buf.put_u8(0);
            buf.put_u8(kind as u8);
        }
        other => buf.put_u8(type_kind_tag(other)),
    }
    write_ref(buf, type_def.base());
    write_varint(buf, type_def.fields().len() as u64);
    for field in type_def.fields() {
        write_id(buf, field.id);
        write_string(buf, &field.name);
        write_ref(buf, &field.field_type);
        write_bool(buf, field.is_array);
    }
    match type_def.default_value() {
        Some(default) => {
            write_bool(buf, true);
            codec::write_object(buf, default);
        }
        None => write_bool(buf, false),
    }
}

pub(crate) fn type_kind_tag(kind: TypeKind) -> u8 {
    match kind {
        TypeKind::Primitive(_) => 0,
        TypeKind::Struct => 1,
        TypeKind::Enum => 2,
        TypeKind::Component => 3,
        TypeKind::Configuration => 4,
    }
}

pub(crate) fn type_kind_from_tags(
    tag: u8,
    reader: &mut codec::Reader<'_>,
) -> std::result::Result<TypeKind, StreamError> {
    match tag {
        0 => {
            let kind_tag = reader.read_u8()?;
            let kind = FieldKind::from_u8(kind_tag).ok_or(StreamError::InvalidTag(kind_tag))?;
            Ok(TypeKind::Primitive(kind))
        }
        1 => Ok(TypeKind::Struct),
        2 => Ok(TypeKind::Enum),
        3 => Ok(TypeKind::Component),
        4 => Ok(TypeKind::Configuration),
        other => Err(StreamError::Malformed(format!(
            "type kind tag {other:#04x}"
        ))),
    }
}

fn borrow<T>(cell: &std::rc::Rc<std::cell::RefCell<T>>) -> Result<std::cell::Ref<'_, T>> {
    cell.try_borrow()
        .map_err(|_| StreamError::Malformed("record borrowed for writing during persist".into()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_is_the_concatenation_of_record_frames() {
        // Goal: the shared scratch buffer leaves each frame byte-identical
        // to encoding the record on its own
        let mut registry = Registry::new();
        registry.create_script("boot");
        registry.create_entity("Player");

        let stream = persist_all(&registry).unwrap();
        let mut expected = BytesMut::new();
        for record in registry.records() {
            expected.extend_from_slice(&encode_record(record).unwrap());
        }
        assert_eq!(&stream[..], &expected[..]);
    }
}
