//! A runtime-typed message bound from a [`MetaMessage`] and a decoded
//! payload.
//!
//! `GenericMessage` is the bridge that lets a process handle payloads whose
//! types it only learns about at runtime, from a parsed `.odvd`
//! specification: once bound, it exposes the same visitor interface as a
//! statically generated type, so encoders like
//! [`JsonEncoder`](crate::JsonEncoder) or
//! [`ProtoEncoder`](crate::ProtoEncoder) cannot tell the difference.

use std::collections::BTreeMap;

use crate::meta::{Literal, MetaField, MetaMessage, TypeTag};
use crate::proto::ProtoDecoder;
use crate::visitor::{Visitable, Visitor};

/// A tagged value variant covering every field type of the meta-model.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Char(char),
    Uint8(u8),
    Int8(i8),
    Uint16(u16),
    Int16(i16),
    Uint32(u32),
    Int32(i32),
    Uint64(u64),
    Int64(i64),
    Float(f32),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Message(GenericMessage),
}

/// A message whose shape is bound at runtime from a [`MetaMessage`].
///
/// The shape is immutable after binding; decoders overwrite values in place.
/// Reading from multiple threads is safe, concurrent writes are not.
#[derive(Clone, Debug, PartialEq)]
pub struct GenericMessage {
    meta: MetaMessage,
    values: BTreeMap<u32, Value>,
}

impl Default for GenericMessage {
    fn default() -> GenericMessage {
        GenericMessage {
            meta: MetaMessage::new("", 0),
            values: BTreeMap::new(),
        }
    }
}

impl GenericMessage {
    pub fn new() -> GenericMessage {
        GenericMessage::default()
    }

    /// Binds this message to a schema and populates it from a decoder.
    ///
    /// Every field of `meta` is seeded with its declared default (or the
    /// type's zero value) and then overwritten with the value captured by
    /// `decoder`, if any. Nested message fields are resolved against
    /// `corpus` and constructed recursively; unresolvable or malformed
    /// nested payloads keep their defaults.
    pub fn set_meta_message(
        &mut self,
        meta: &MetaMessage,
        corpus: &[MetaMessage],
        decoder: &ProtoDecoder,
    ) {
        self.meta = meta.clone();
        self.values.clear();
        for field in &meta.fields {
            let value = bind_field(field, corpus, decoder);
            self.values.insert(field.field_identifier, value);
        }
    }

    /// The schema this message is bound to.
    pub fn meta_message(&self) -> &MetaMessage {
        &self.meta
    }

    /// The current value of a field, if the bound schema has it.
    pub fn value(&self, field_identifier: u32) -> Option<&Value> {
        self.values.get(&field_identifier)
    }

    fn dispatch(
        field: &MetaField,
        value: &mut Value,
        visitor: &mut dyn Visitor,
    ) {
        let tag = field.field_identifier;
        let name = field.name.as_str();
        match value {
            Value::Bool(v) => visitor.visit_bool(tag, name, v, bool_default(field)),
            Value::Char(v) => visitor.visit_char(tag, name, v, char_default(field)),
            Value::Uint8(v) => visitor.visit_u8(tag, name, v, int_default(field) as u8),
            Value::Int8(v) => visitor.visit_i8(tag, name, v, int_default(field) as i8),
            Value::Uint16(v) => visitor.visit_u16(tag, name, v, int_default(field) as u16),
            Value::Int16(v) => visitor.visit_i16(tag, name, v, int_default(field) as i16),
            Value::Uint32(v) => visitor.visit_u32(tag, name, v, int_default(field) as u32),
            Value::Int32(v) => visitor.visit_i32(tag, name, v, int_default(field) as i32),
            Value::Uint64(v) => visitor.visit_u64(tag, name, v, int_default(field) as u64),
            Value::Int64(v) => visitor.visit_i64(tag, name, v, int_default(field)),
            Value::Float(v) => visitor.visit_f32(tag, name, v, float_default(field) as f32),
            Value::Double(v) => visitor.visit_f64(tag, name, v, float_default(field)),
            Value::String(v) => visitor.visit_string(tag, name, v, string_default(field)),
            Value::Bytes(v) => visitor.visit_bytes(tag, name, v, string_default(field).as_bytes()),
            Value::Message(v) => visitor.visit_message(tag, name, v),
        }
    }
}

impl Visitable for GenericMessage {
    fn accept(&mut self, visitor: &mut dyn Visitor) {
        let GenericMessage { meta, values } = self;
        visitor.pre_visit(meta.message_identifier, meta.short_name(), &meta.name);
        for field in &meta.fields {
            if let Some(value) = values.get_mut(&field.field_identifier) {
                GenericMessage::dispatch(field, value, visitor);
            }
        }
        visitor.post_visit();
    }

    fn accept_field(&mut self, field_identifier: u32, visitor: &mut dyn Visitor) {
        let GenericMessage { meta, values } = self;
        if let Some(field) = meta.field(field_identifier) {
            if let Some(value) = values.get_mut(&field_identifier) {
                GenericMessage::dispatch(field, value, visitor);
            }
        }
    }
}

/// Builds the value for one field: schema default first, then the decoded
/// wire value on top.
fn bind_field(field: &MetaField, corpus: &[MetaMessage], decoder: &ProtoDecoder) -> Value {
    let tag = field.field_identifier;
    let varint = || decoder.entry(tag).and_then(|e| e.as_varint().ok());

    match field.field_type {
        TypeTag::Bool => Value::Bool(varint().map(|v| v != 0).unwrap_or_else(|| bool_default(field))),
        TypeTag::Char => Value::Char(
            varint()
                .and_then(|v| char::from_u32(v as u32))
                .unwrap_or_else(|| char_default(field)),
        ),
        TypeTag::Uint8 => {
            Value::Uint8(varint().map(|v| v as u8).unwrap_or(int_default(field) as u8))
        }
        TypeTag::Int8 => Value::Int8(
            varint()
                .map(|v| crate::encoding::zigzag_decode(v) as i8)
                .unwrap_or(int_default(field) as i8),
        ),
        TypeTag::Uint16 => {
            Value::Uint16(varint().map(|v| v as u16).unwrap_or(int_default(field) as u16))
        }
        TypeTag::Int16 => Value::Int16(
            varint()
                .map(|v| crate::encoding::zigzag_decode(v) as i16)
                .unwrap_or(int_default(field) as i16),
        ),
        TypeTag::Uint32 => {
            Value::Uint32(varint().map(|v| v as u32).unwrap_or(int_default(field) as u32))
        }
        TypeTag::Int32 => Value::Int32(
            varint()
                .map(|v| crate::encoding::zigzag_decode(v) as i32)
                .unwrap_or(int_default(field) as i32),
        ),
        TypeTag::Uint64 => Value::Uint64(varint().unwrap_or(int_default(field) as u64)),
        TypeTag::Int64 => Value::Int64(
            varint()
                .map(crate::encoding::zigzag_decode)
                .unwrap_or(int_default(field)),
        ),
        TypeTag::Float => Value::Float(
            decoder
                .entry(tag)
                .and_then(|e| e.as_fixed32().ok())
                .map(f32::from_bits)
                .unwrap_or(float_default(field) as f32),
        ),
        TypeTag::Double => Value::Double(
            decoder
                .entry(tag)
                .and_then(|e| e.as_fixed64().ok())
                .map(f64::from_bits)
                .unwrap_or(float_default(field)),
        ),
        TypeTag::String => Value::String(
            decoder
                .entry(tag)
                .and_then(|e| e.as_delimited().ok())
                .map(|payload| String::from_utf8_lossy(payload).into_owned())
                .unwrap_or_else(|| string_default(field).to_string()),
        ),
        TypeTag::Bytes => Value::Bytes(
            decoder
                .entry(tag)
                .and_then(|e| e.as_delimited().ok())
                .map(<[u8]>::to_vec)
                .unwrap_or_else(|| string_default(field).as_bytes().to_vec()),
        ),
        TypeTag::Message => {
            let mut nested = GenericMessage::new();
            if let Some(nested_meta) = field
                .message_type
                .as_deref()
                .and_then(|name| corpus.iter().find(|m| m.name == name))
            {
                let mut nested_decoder = ProtoDecoder::new();
                if let Some(payload) = decoder.entry(tag).and_then(|e| e.as_delimited().ok()) {
                    // A malformed nested payload leaves the defaults in place.
                    let _ = nested_decoder.decode_from(payload);
                }
                nested.set_meta_message(nested_meta, corpus, &nested_decoder);
            }
            Value::Message(nested)
        }
    }
}

fn bool_default(field: &MetaField) -> bool {
    matches!(field.default, Some(Literal::Bool(true)))
}

fn int_default(field: &MetaField) -> i64 {
    match field.default {
        Some(Literal::Integer(value)) => value,
        _ => 0,
    }
}

fn float_default(field: &MetaField) -> f64 {
    match field.default {
        Some(Literal::Float(value)) => value,
        Some(Literal::Integer(value)) => value as f64,
        _ => 0.0,
    }
}

fn string_default(field: &MetaField) -> &str {
    match &field.default {
        Some(Literal::String(value)) => value,
        _ => "",
    }
}

fn char_default(field: &MetaField) -> char {
    string_default(field).chars().next().unwrap_or('\0')
}
