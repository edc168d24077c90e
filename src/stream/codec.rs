//! Byte-level primitives of the command-stream format.
//!
//! Fixed-width integers are little-endian. Lengths and counts use LEB128
//! varints. Strings are varint-length-prefixed UTF-8. Identifiers are raw
//! 16-byte blocks. Values are encoded behind their [`FieldKind`] tag byte,
//! which doubles as the in-memory kind discriminant.

use bytes::{BufMut, BytesMut};

use crate::constants::IDENTIFIER_LENGTH;
use crate::object::{DynamicList, DynamicObject, FieldSlot};
use crate::types::{AssetHandle, EnumValue, FieldKind, Identifier, Ref, StreamError, Value};

/// Bounds-checked sequential reader over a byte slice.
///
/// Every read that would run past the end reports a [`StreamError::Truncated`]
/// carrying the offset where the read started.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Read from the start of `buf`
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    /// Current byte offset
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Whether the reader is exhausted
    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], StreamError> {
        if self.remaining() < count {
            return Err(StreamError::Truncated {
                offset: self.pos,
                expected: count,
                available: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    /// Skip `count` bytes without decoding them
    pub fn skip(&mut self, count: usize) -> Result<(), StreamError> {
        self.take(count).map(|_| ())
    }

    /// Read one byte
    pub fn read_u8(&mut self) -> Result<u8, StreamError> {
        Ok(self.take(1)?[0])
    }

    /// Read a little-endian u32
    pub fn read_u32(&mut self) -> Result<u32, StreamError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a little-endian i32
    pub fn read_i32(&mut self) -> Result<i32, StreamError> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a little-endian i64
    pub fn read_i64(&mut self) -> Result<i64, StreamError> {
        let bytes = self.take(8)?;
        let mut out = [0u8; 8];
        out.copy_from_slice(bytes);
        Ok(i64::from_le_bytes(out))
    }

    /// Read a little-endian f64
    pub fn read_f64(&mut self) -> Result<f64, StreamError> {
        let bytes = self.take(8)?;
        let mut out = [0u8; 8];
        out.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(out))
    }

    /// Read a LEB128 varint
    pub fn read_varint(&mut self) -> Result<u64, StreamError> {
        let mut value: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift >= 64 {
                return Err(StreamError::Malformed("varint overflows u64".into()));
            }
        }
    }

    /// Read a boolean byte. Anything but 0 or 1 is corruption.
    pub fn read_bool(&mut self) -> Result<bool, StreamError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(StreamError::Malformed(format!(
                "boolean byte {other:#04x}"
            ))),
        }
    }

    /// Read a raw 16-byte identifier
    pub fn read_id(&mut self) -> Result<Identifier, StreamError> {
        let bytes = self.take(IDENTIFIER_LENGTH)?;
        let mut out = [0u8; IDENTIFIER_LENGTH];
        out.copy_from_slice(bytes);
        Ok(Identifier::from_bytes(out))
    }

    /// Read a varint-length-prefixed UTF-8 string
    pub fn read_string(&mut self) -> Result<String, StreamError> {
        let length = self.read_varint()? as usize;
        let bytes = self.take(length)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| StreamError::InvalidUtf8)
    }
}

/// Append a LEB128 varint
pub fn write_varint(buf: &mut BytesMut, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.put_u8(byte);
            return;
        }
        buf.put_u8(byte | 0x80);
    }
}

/// Append a varint-length-prefixed UTF-8 string
pub fn write_string(buf: &mut BytesMut, value: &str) {
    write_varint(buf, value.len() as u64);
    buf.put_slice(value.as_bytes());
}

/// Append a boolean byte
pub fn write_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(u8::from(value));
}

/// Append a raw 16-byte identifier
pub fn write_id(buf: &mut BytesMut, id: Identifier) {
    buf.put_slice(id.as_bytes());
}

fn write_ref_parts(buf: &mut BytesMut, id: Identifier, name: &str) {
    write_id(buf, id);
    write_string(buf, name);
}

/// Append a reference as id + cached display name
pub fn write_ref<T: crate::types::RecordClass>(buf: &mut BytesMut, reference: &Ref<T>) {
    write_ref_parts(buf, reference.id(), reference.name());
}

/// Read a reference encoded as id + cached display name
pub fn read_ref<T: crate::types::RecordClass>(
    reader: &mut Reader<'_>,
) -> Result<Ref<T>, StreamError> {
    let id = reader.read_id()?;
    let name = reader.read_string()?;
    Ok(Ref::new(id, name))
}

/// Append a value behind its kind tag byte
pub fn write_value(buf: &mut BytesMut, value: &Value) {
    buf.put_u8(value.kind() as u8);
    match value {
        Value::None => {}
        Value::Bool(v) => write_bool(buf, *v),
        Value::Int(v) => buf.put_i64_le(*v),
        Value::Float(v) => buf.put_f64_le(*v),
        Value::String(v) => write_string(buf, v),
        Value::Id(v) => write_id(buf, *v),
        Value::EnumValue(v) => {
            write_ref(buf, &v.enum_type);
            write_id(buf, v.case_id);
            write_string(buf, &v.name);
            buf.put_i32_le(v.value);
        }
        Value::Object(v) => write_object(buf, v),
        Value::List(v) => write_list(buf, v),
        Value::TypeRef(v) => write_ref(buf, v),
        Value::EntityRef(v) => write_ref(buf, v),
        Value::AssetRef(v) => {
            write_string(buf, &v.guid);
            buf.put_i64_le(v.file_id);
            buf.put_i32_le(v.type_tag);
        }
    }
}

/// Read a tagged value
pub fn read_value(reader: &mut Reader<'_>) -> Result<Value, StreamError> {
    let tag = reader.read_u8()?;
    let kind = FieldKind::from_u8(tag).ok_or(StreamError::InvalidTag(tag))?;
    match kind {
        FieldKind::None => Ok(Value::None),
        FieldKind::Bool => Ok(Value::Bool(reader.read_bool()?)),
        FieldKind::Int => Ok(Value::Int(reader.read_i64()?)),
        FieldKind::Float => Ok(Value::Float(reader.read_f64()?)),
        FieldKind::String => Ok(Value::String(reader.read_string()?)),
        FieldKind::Id => Ok(Value::Id(reader.read_id()?)),
        FieldKind::EnumValue => {
            let enum_type = read_ref(reader)?;
            let case_id = reader.read_id()?;
            let name = reader.read_string()?;
            let value = reader.read_i32()?;
            Ok(Value::EnumValue(EnumValue::new(
                enum_type, case_id, name, value,
            )))
        }
        FieldKind::Object => Ok(Value::Object(read_object(reader)?)),
        FieldKind::List => Ok(Value::List(read_list(reader)?)),
        FieldKind::TypeRef => Ok(Value::TypeRef(read_ref(reader)?)),
        FieldKind::EntityRef => Ok(Value::EntityRef(read_ref(reader)?)),
        FieldKind::AssetRef => {
            let guid = reader.read_string()?;
            let file_id = reader.read_i64()?;
            let type_tag = reader.read_i32()?;
            Ok(Value::AssetRef(AssetHandle {
                guid,
                file_id,
                type_tag,
            }))
        }
    }
}

/// Append a dynamic object: type reference, field slots keyed by durable
/// field id, then ad-hoc dynamic properties
pub fn write_object(buf: &mut BytesMut, object: &DynamicObject) {
    write_ref(buf, object.type_ref());
    write_varint(buf, object.slots().len() as u64);
    for slot in object.slots() {
        write_id(buf, slot.field_id());
        write_string(buf, slot.name());
        buf.put_u8(slot.kind() as u8);
        write_bool(buf, slot.overridden());
        write_value(buf, slot.value());
    }
    let dynamic: Vec<_> = object.dynamic_properties().collect();
    write_varint(buf, dynamic.len() as u64);
    for (name, value) in dynamic {
        write_string(buf, name);
        write_value(buf, value);
    }
}

/// Read a dynamic object written by [`write_object`].
///
/// The object comes back detached and un-refreshed; the caller reconciles
/// it against the live schema.
pub fn read_object(reader: &mut Reader<'_>) -> Result<DynamicObject, StreamError> {
    let type_ref = read_ref(reader)?;
    let mut object = DynamicObject::new(type_ref);

    let slot_count = reader.read_varint()? as usize;
    for _ in 0..slot_count {
        let field_id = reader.read_id()?;
        let name = reader.read_string()?;
        let kind_tag = reader.read_u8()?;
        let kind = FieldKind::from_u8(kind_tag).ok_or(StreamError::InvalidTag(kind_tag))?;
        let overridden = reader.read_bool()?;
        let value = read_value(reader)?;
        object.push_slot(FieldSlot::raw(field_id, name, kind, value, overridden));
    }

    let dynamic_count = reader.read_varint()? as usize;
    for _ in 0..dynamic_count {
        let name = reader.read_string()?;
        let value = read_value(reader)?;
        object.push_dynamic(name, value);
    }
    Ok(object)
}

fn write_list(buf: &mut BytesMut, list: &DynamicList) {
    write_ref(buf, list.element_type());
    buf.put_u8(list.element_kind() as u8);
    write_varint(buf, list.len() as u64);
    for item in list.iter() {
        write_value(buf, item);
    }
}

fn read_list(reader: &mut Reader<'_>) -> Result<DynamicList, StreamError> {
    let element_type = read_ref(reader)?;
    let kind_tag = reader.read_u8()?;
    let kind = FieldKind::from_u8(kind_tag).ok_or(StreamError::InvalidTag(kind_tag))?;
    let count = reader.read_varint()? as usize;
    let mut list = DynamicList::with_kind(element_type, kind);
    for _ in 0..count {
        let value = read_value(reader)?;
        list.push_raw(value);
    }
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: &Value) -> Value {
        let mut buf = BytesMut::new();
        write_value(&mut buf, value);
        let mut reader = Reader::new(&buf);
        let decoded = read_value(&mut reader).unwrap();
        assert!(reader.is_empty(), "trailing bytes after {value:?}");
        decoded
    }

    #[test]
    fn varint_boundaries() {
        // Goal: the continuation-bit boundaries encode and decode exactly
        for value in [0u64, 1, 127, 128, 16_383, 16_384, u64::MAX] {
            let mut buf = BytesMut::new();
            write_varint(&mut buf, value);
            let mut reader = Reader::new(&buf);
            assert_eq!(reader.read_varint().unwrap(), value);
            assert!(reader.is_empty());
        }
    }

    #[test]
    fn truncated_reads_report_offset() {
        // Goal: running off the end is an error carrying where and how
        // much, never a panic or a silent zero
        let mut reader = Reader::new(&[0x01, 0x02]);
        reader.read_u8().unwrap();
        let err = reader.read_i64().unwrap_err();
        match err {
            StreamError::Truncated {
                offset,
                expected,
                available,
            } => {
                assert_eq!(offset, 1);
                assert_eq!(expected, 8);
                assert_eq!(available, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn scalar_values_round_trip() {
        let id = Identifier::random();
        for value in [
            Value::None,
            Value::Bool(true),
            Value::Int(-42),
            Value::Float(2.5),
            Value::String("héllo".into()),
            Value::Id(id),
            Value::AssetRef(AssetHandle {
                guid: "ab12".into(),
                file_id: 7,
                type_tag: 3,
            }),
        ] {
            assert_eq!(round_trip(&value), value);
        }
    }

    #[test]
    fn invalid_tag_is_rejected() {
        let mut reader = Reader::new(&[0x55]);
        assert!(matches!(
            read_value(&mut reader),
            Err(StreamError::InvalidTag(0x55))
        ));
    }

    #[test]
    fn bad_boolean_byte_is_corruption() {
        let mut reader = Reader::new(&[0x02]);
        assert!(matches!(
            reader.read_bool(),
            Err(StreamError::Malformed(_))
        ));
    }

    proptest::proptest! {
        #[test]
        fn varint_round_trips(value: u64) {
            let mut buf = BytesMut::new();
            write_varint(&mut buf, value);
            let mut reader = Reader::new(&buf);
            proptest::prop_assert_eq!(reader.read_varint().unwrap(), value);
            proptest::prop_assert!(reader.is_empty());
        }

        #[test]
        fn strings_round_trip(value: String) {
            let mut buf = BytesMut::new();
            write_string(&mut buf, &value);
            let mut reader = Reader::new(&buf);
            proptest::prop_assert_eq!(reader.read_string().unwrap(), value);
        }

        #[test]
        fn arbitrary_bytes_never_panic_the_value_decoder(data: Vec<u8>) {
            // Goal: corrupt input fails with an error, never a panic
            let mut reader = Reader::new(&data);
            let _ = read_value(&mut reader);
        }
    }
}
