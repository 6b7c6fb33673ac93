//! Encoding and decoding of messages in the Protobuf-compatible wire format,
//! driven through the visitor framework.
//!
//! [`ProtoEncoder`] and [`ProtoDecoder`] work for statically generated types
//! and [`GenericMessage`](crate::GenericMessage) alike: both sides of the
//! transformation only ever see the `Visitor` capability set.

use std::collections::BTreeMap;

use bytes::{Buf, BufMut};
use log::debug;

use crate::encoding::{
    decode_key, decode_varint, encode_key, encode_varint, zigzag_decode, zigzag_encode, WireType,
};
use crate::visitor::{Visitable, Visitor};
use crate::DecodeError;

/// A single wire value captured by [`ProtoDecoder`], still untyped.
#[derive(Clone, Debug, PartialEq)]
pub enum ProtoValue {
    Varint(u64),
    Fixed32(u32),
    Fixed64(u64),
    Delimited(Vec<u8>),
}

impl ProtoValue {
    pub fn as_varint(&self) -> Result<u64, DecodeError> {
        match self {
            ProtoValue::Varint(value) => Ok(*value),
            _ => Err(DecodeError::new("wire type mismatch: expected varint")),
        }
    }

    pub fn as_fixed32(&self) -> Result<u32, DecodeError> {
        match self {
            ProtoValue::Fixed32(value) => Ok(*value),
            _ => Err(DecodeError::new("wire type mismatch: expected fixed32")),
        }
    }

    pub fn as_fixed64(&self) -> Result<u64, DecodeError> {
        match self {
            ProtoValue::Fixed64(value) => Ok(*value),
            _ => Err(DecodeError::new("wire type mismatch: expected fixed64")),
        }
    }

    pub fn as_delimited(&self) -> Result<&[u8], DecodeError> {
        match self {
            ProtoValue::Delimited(value) => Ok(value),
            _ => Err(DecodeError::new(
                "wire type mismatch: expected length-delimited payload",
            )),
        }
    }
}

/// Encodes any visitable message into the Protobuf-compatible wire format.
///
/// Fields whose value equals their declared default are elided, matching the
/// implicit-default omission of proto2; nested messages are elided when their
/// own encoding is empty. Entries are keyed by field identifier, so the
/// serialized output is in ascending field-id order no matter in which order
/// the message declares its fields.
#[derive(Debug, Default)]
pub struct ProtoEncoder {
    entries: BTreeMap<u32, Vec<u8>>,
}

impl ProtoEncoder {
    pub fn new() -> ProtoEncoder {
        ProtoEncoder::default()
    }

    /// Returns the serialized message.
    pub fn encoded_data(&self) -> Vec<u8> {
        let len = self.entries.values().map(Vec::len).sum();
        let mut buf = Vec::with_capacity(len);
        for entry in self.entries.values() {
            buf.put_slice(entry);
        }
        buf
    }

    /// Convenience wrapper: runs a full traversal and returns the encoding.
    pub fn encode(message: &mut dyn Visitable) -> Vec<u8> {
        let mut encoder = ProtoEncoder::new();
        message.accept(&mut encoder);
        encoder.encoded_data()
    }

    fn put_varint(&mut self, tag: u32, value: u64) {
        let entry = self.entries.entry(tag).or_default();
        entry.clear();
        encode_key(tag, WireType::Varint, entry);
        encode_varint(value, entry);
    }

    fn put_fixed32(&mut self, tag: u32, value: u32) {
        let entry = self.entries.entry(tag).or_default();
        entry.clear();
        encode_key(tag, WireType::ThirtyTwoBit, entry);
        entry.put_u32_le(value);
    }

    fn put_fixed64(&mut self, tag: u32, value: u64) {
        let entry = self.entries.entry(tag).or_default();
        entry.clear();
        encode_key(tag, WireType::SixtyFourBit, entry);
        entry.put_u64_le(value);
    }

    fn put_delimited(&mut self, tag: u32, payload: &[u8]) {
        let entry = self.entries.entry(tag).or_default();
        entry.clear();
        encode_key(tag, WireType::LengthDelimited, entry);
        encode_varint(payload.len() as u64, entry);
        entry.put_slice(payload);
    }
}

impl Visitor for ProtoEncoder {
    fn visit_bool(&mut self, tag: u32, _name: &str, value: &mut bool, default: bool) {
        if *value != default {
            self.put_varint(tag, u64::from(*value));
        }
    }

    fn visit_char(&mut self, tag: u32, _name: &str, value: &mut char, default: char) {
        if *value != default {
            self.put_varint(tag, u64::from(u32::from(*value)));
        }
    }

    fn visit_u8(&mut self, tag: u32, _name: &str, value: &mut u8, default: u8) {
        if *value != default {
            self.put_varint(tag, u64::from(*value));
        }
    }

    fn visit_i8(&mut self, tag: u32, _name: &str, value: &mut i8, default: i8) {
        if *value != default {
            self.put_varint(tag, zigzag_encode(i64::from(*value)));
        }
    }

    fn visit_u16(&mut self, tag: u32, _name: &str, value: &mut u16, default: u16) {
        if *value != default {
            self.put_varint(tag, u64::from(*value));
        }
    }

    fn visit_i16(&mut self, tag: u32, _name: &str, value: &mut i16, default: i16) {
        if *value != default {
            self.put_varint(tag, zigzag_encode(i64::from(*value)));
        }
    }

    fn visit_u32(&mut self, tag: u32, _name: &str, value: &mut u32, default: u32) {
        if *value != default {
            self.put_varint(tag, u64::from(*value));
        }
    }

    fn visit_i32(&mut self, tag: u32, _name: &str, value: &mut i32, default: i32) {
        if *value != default {
            self.put_varint(tag, zigzag_encode(i64::from(*value)));
        }
    }

    fn visit_u64(&mut self, tag: u32, _name: &str, value: &mut u64, default: u64) {
        if *value != default {
            self.put_varint(tag, *value);
        }
    }

    fn visit_i64(&mut self, tag: u32, _name: &str, value: &mut i64, default: i64) {
        if *value != default {
            self.put_varint(tag, zigzag_encode(*value));
        }
    }

    fn visit_f32(&mut self, tag: u32, _name: &str, value: &mut f32, default: f32) {
        if *value != default {
            self.put_fixed32(tag, value.to_bits());
        }
    }

    fn visit_f64(&mut self, tag: u32, _name: &str, value: &mut f64, default: f64) {
        if *value != default {
            self.put_fixed64(tag, value.to_bits());
        }
    }

    fn visit_string(&mut self, tag: u32, _name: &str, value: &mut String, default: &str) {
        if value != default {
            self.put_delimited(tag, value.as_bytes());
        }
    }

    fn visit_bytes(&mut self, tag: u32, _name: &str, value: &mut Vec<u8>, default: &[u8]) {
        if value != default {
            self.put_delimited(tag, value);
        }
    }

    fn visit_message(&mut self, tag: u32, _name: &str, value: &mut dyn Visitable) {
        let mut nested = ProtoEncoder::new();
        value.accept(&mut nested);
        let payload = nested.encoded_data();
        if !payload.is_empty() {
            self.put_delimited(tag, &payload);
        }
    }
}

/// Decodes a Protobuf-compatible payload.
///
/// Decoding happens in two stages. `decode_from` parses the raw buffer into a
/// map from field identifier to [`ProtoValue`], guided purely by the
/// self-describing wire format: unknown fields are retained (and simply never
/// visited), duplicate fields overwrite. Driving the decoder through a
/// message's `accept` then writes the captured values into the message;
/// fields without a captured value keep whatever the message already holds,
/// which is its declared default for a freshly constructed one.
#[derive(Debug, Default)]
pub struct ProtoDecoder {
    entries: BTreeMap<u32, ProtoValue>,
}

impl ProtoDecoder {
    pub fn new() -> ProtoDecoder {
        ProtoDecoder::default()
    }

    /// Parses one serialized message, replacing any previously captured
    /// fields.
    ///
    /// Fails only on truncated input, an invalid key, or an unsupported wire
    /// type.
    pub fn decode_from(&mut self, mut buf: impl Buf) -> Result<(), DecodeError> {
        self.entries.clear();
        while buf.has_remaining() {
            let (tag, wire_type) = decode_key(&mut buf)?;
            let value = match wire_type {
                WireType::Varint => ProtoValue::Varint(decode_varint(&mut buf)?),
                WireType::ThirtyTwoBit => {
                    if buf.remaining() < 4 {
                        return Err(DecodeError::new("buffer underflow"));
                    }
                    ProtoValue::Fixed32(buf.get_u32_le())
                }
                WireType::SixtyFourBit => {
                    if buf.remaining() < 8 {
                        return Err(DecodeError::new("buffer underflow"));
                    }
                    ProtoValue::Fixed64(buf.get_u64_le())
                }
                WireType::LengthDelimited => {
                    let len = decode_varint(&mut buf)?;
                    if len > buf.remaining() as u64 {
                        return Err(DecodeError::new("buffer underflow"));
                    }
                    let mut payload = vec![0; len as usize];
                    buf.copy_to_slice(&mut payload);
                    ProtoValue::Delimited(payload)
                }
            };
            self.entries.insert(tag, value);
        }
        Ok(())
    }

    /// Parses one serialized message into a fresh decoder.
    pub fn decode(buf: impl Buf) -> Result<ProtoDecoder, DecodeError> {
        let mut decoder = ProtoDecoder::new();
        decoder.decode_from(buf)?;
        Ok(decoder)
    }

    /// The captured wire value for a field identifier, if present.
    pub fn entry(&self, tag: u32) -> Option<&ProtoValue> {
        self.entries.get(&tag)
    }

    fn varint(&self, tag: u32) -> Option<u64> {
        let entry = self.entries.get(&tag)?;
        match entry.as_varint() {
            Ok(value) => Some(value),
            Err(error) => {
                debug!("field {}: {}", tag, error);
                None
            }
        }
    }
}

impl Visitor for ProtoDecoder {
    fn visit_bool(&mut self, tag: u32, _name: &str, value: &mut bool, _default: bool) {
        if let Some(v) = self.varint(tag) {
            *value = v != 0;
        }
    }

    fn visit_char(&mut self, tag: u32, _name: &str, value: &mut char, _default: char) {
        if let Some(v) = self.varint(tag) {
            if let Some(c) = char::from_u32(v as u32) {
                *value = c;
            }
        }
    }

    fn visit_u8(&mut self, tag: u32, _name: &str, value: &mut u8, _default: u8) {
        if let Some(v) = self.varint(tag) {
            *value = v as u8;
        }
    }

    fn visit_i8(&mut self, tag: u32, _name: &str, value: &mut i8, _default: i8) {
        if let Some(v) = self.varint(tag) {
            *value = zigzag_decode(v) as i8;
        }
    }

    fn visit_u16(&mut self, tag: u32, _name: &str, value: &mut u16, _default: u16) {
        if let Some(v) = self.varint(tag) {
            *value = v as u16;
        }
    }

    fn visit_i16(&mut self, tag: u32, _name: &str, value: &mut i16, _default: i16) {
        if let Some(v) = self.varint(tag) {
            *value = zigzag_decode(v) as i16;
        }
    }

    fn visit_u32(&mut self, tag: u32, _name: &str, value: &mut u32, _default: u32) {
        if let Some(v) = self.varint(tag) {
            *value = v as u32;
        }
    }

    fn visit_i32(&mut self, tag: u32, _name: &str, value: &mut i32, _default: i32) {
        if let Some(v) = self.varint(tag) {
            *value = zigzag_decode(v) as i32;
        }
    }

    fn visit_u64(&mut self, tag: u32, _name: &str, value: &mut u64, _default: u64) {
        if let Some(v) = self.varint(tag) {
            *value = v;
        }
    }

    fn visit_i64(&mut self, tag: u32, _name: &str, value: &mut i64, _default: i64) {
        if let Some(v) = self.varint(tag) {
            *value = zigzag_decode(v);
        }
    }

    fn visit_f32(&mut self, tag: u32, _name: &str, value: &mut f32, _default: f32) {
        if let Some(entry) = self.entries.get(&tag) {
            match entry.as_fixed32() {
                Ok(bits) => *value = f32::from_bits(bits),
                Err(error) => debug!("field {}: {}", tag, error),
            }
        }
    }

    fn visit_f64(&mut self, tag: u32, _name: &str, value: &mut f64, _default: f64) {
        if let Some(entry) = self.entries.get(&tag) {
            match entry.as_fixed64() {
                Ok(bits) => *value = f64::from_bits(bits),
                Err(error) => debug!("field {}: {}", tag, error),
            }
        }
    }

    fn visit_string(&mut self, tag: u32, _name: &str, value: &mut String, _default: &str) {
        if let Some(entry) = self.entries.get(&tag) {
            match entry.as_delimited() {
                Ok(payload) => *value = String::from_utf8_lossy(payload).into_owned(),
                Err(error) => debug!("field {}: {}", tag, error),
            }
        }
    }

    fn visit_bytes(&mut self, tag: u32, _name: &str, value: &mut Vec<u8>, _default: &[u8]) {
        if let Some(entry) = self.entries.get(&tag) {
            match entry.as_delimited() {
                Ok(payload) => *value = payload.to_vec(),
                Err(error) => debug!("field {}: {}", tag, error),
            }
        }
    }

    fn visit_message(&mut self, tag: u32, _name: &str, value: &mut dyn Visitable) {
        if let Some(entry) = self.entries.get(&tag) {
            let payload = match entry.as_delimited() {
                Ok(payload) => payload,
                Err(error) => {
                    debug!("field {}: {}", tag, error);
                    return;
                }
            };
            let mut nested = ProtoDecoder::new();
            match nested.decode_from(payload) {
                Ok(()) => value.accept(&mut nested),
                Err(error) => debug!("field {}: {}", tag, error),
            }
        }
    }
}
