//! Decoding of LCM payloads into [`GenericMessage`]s.
//!
//! LCM is a fixed-layout, big-endian wire format without field tags: a
//! message body is an 8-byte type fingerprint (ignored here) followed by the
//! fields in schema declaration order. Because [`Visitable::accept`] drives a
//! visitor through the fields in exactly that order, the decoder is a plain
//! [`Visitor`] that consumes the buffer positionally, using the bound
//! [`MetaMessage`] as its script.

use log::debug;

use crate::generic::GenericMessage;
use crate::meta::MetaMessage;
use crate::parser::{self, ParseError};
use crate::proto::ProtoDecoder;
use crate::visitor::{Visitable, Visitor};

/// Magic bytes introducing an LCM datagram on the wire (`LC02`).
const LCM_MAGIC: [u8; 4] = [0x4C, 0x43, 0x30, 0x32];

/// Size of the type fingerprint preceding a message body.
const LCM_HASH_SIZE: usize = 8;

/// Translates LCM datagrams into [`GenericMessage`]s using a runtime-parsed
/// message specification.
#[derive(Debug, Default)]
pub struct LcmToGenericMessage {
    corpus: Vec<MetaMessage>,
}

impl LcmToGenericMessage {
    pub fn new() -> LcmToGenericMessage {
        LcmToGenericMessage::default()
    }

    /// Installs the message specification used to resolve channel names.
    /// Returns the number of parsed message types.
    pub fn set_message_specification(&mut self, spec: &str) -> Result<usize, ParseError> {
        let (messages, result) = parser::parse(spec);
        result?;
        self.corpus = messages;
        Ok(self.corpus.len())
    }

    /// Decodes one LCM datagram: magic, `u32` sequence number, NUL-terminated
    /// channel name, then the message body.
    ///
    /// The channel name selects the message type, matched against the short
    /// or long name of the parsed specifications. Returns `None` for
    /// malformed datagrams or unknown channels.
    pub fn get_generic_message(&self, data: &[u8]) -> Option<GenericMessage> {
        if data.len() < LCM_MAGIC.len() + 4 || data[..4] != LCM_MAGIC {
            return None;
        }
        let rest = &data[LCM_MAGIC.len() + 4..];
        let nul = rest.iter().position(|&b| b == 0)?;
        let channel = std::str::from_utf8(&rest[..nul]).ok()?;
        let body = &rest[nul + 1..];

        let meta = self
            .corpus
            .iter()
            .find(|m| m.short_name() == channel || m.name == channel)?;
        decode_lcm_body(meta, &self.corpus, body)
    }
}

/// Decodes a bare LCM message body (fingerprint plus fields) against a known
/// schema.
pub fn decode_lcm_body(
    meta: &MetaMessage,
    corpus: &[MetaMessage],
    body: &[u8],
) -> Option<GenericMessage> {
    if body.len() < LCM_HASH_SIZE {
        return None;
    }

    // Seed shape and defaults, then let the positional decoder overwrite.
    let mut message = GenericMessage::new();
    message.set_meta_message(meta, corpus, &ProtoDecoder::new());

    let mut decoder = LcmDecoder::new(&body[LCM_HASH_SIZE..]);
    message.accept(&mut decoder);
    if decoder.truncated {
        debug!("truncated LCM payload for '{}'", meta.name);
        return None;
    }
    Some(message)
}

/// A visitor consuming an LCM body front to back.
///
/// Nested messages are inlined without their own fingerprint, so
/// `visit_message` simply recurses on the same buffer.
struct LcmDecoder<'a> {
    buf: &'a [u8],
    truncated: bool,
}

impl<'a> LcmDecoder<'a> {
    fn new(buf: &'a [u8]) -> LcmDecoder<'a> {
        LcmDecoder {
            buf,
            truncated: false,
        }
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        if self.buf.len() < len {
            self.truncated = true;
            self.buf = &[];
            return None;
        }
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Some(head)
    }

    fn take_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        self.take(N).and_then(|bytes| bytes.try_into().ok())
    }

    /// Reads the `i32` length prefix of a string or byte field.
    fn take_len(&mut self) -> Option<usize> {
        let len = i32::from_be_bytes(self.take_array()?);
        if len < 0 {
            self.truncated = true;
            self.buf = &[];
            return None;
        }
        Some(len as usize)
    }
}

impl Visitor for LcmDecoder<'_> {
    fn visit_bool(&mut self, _tag: u32, _name: &str, value: &mut bool, _default: bool) {
        if let Some(bytes) = self.take(1) {
            *value = bytes[0] != 0;
        }
    }

    fn visit_char(&mut self, _tag: u32, _name: &str, value: &mut char, _default: char) {
        if let Some(bytes) = self.take(1) {
            *value = bytes[0] as char;
        }
    }

    fn visit_u8(&mut self, _tag: u32, _name: &str, value: &mut u8, _default: u8) {
        if let Some(bytes) = self.take(1) {
            *value = bytes[0];
        }
    }

    fn visit_i8(&mut self, _tag: u32, _name: &str, value: &mut i8, _default: i8) {
        if let Some(bytes) = self.take(1) {
            *value = bytes[0] as i8;
        }
    }

    fn visit_u16(&mut self, _tag: u32, _name: &str, value: &mut u16, _default: u16) {
        if let Some(bytes) = self.take_array() {
            *value = u16::from_be_bytes(bytes);
        }
    }

    fn visit_i16(&mut self, _tag: u32, _name: &str, value: &mut i16, _default: i16) {
        if let Some(bytes) = self.take_array() {
            *value = i16::from_be_bytes(bytes);
        }
    }

    fn visit_u32(&mut self, _tag: u32, _name: &str, value: &mut u32, _default: u32) {
        if let Some(bytes) = self.take_array() {
            *value = u32::from_be_bytes(bytes);
        }
    }

    fn visit_i32(&mut self, _tag: u32, _name: &str, value: &mut i32, _default: i32) {
        if let Some(bytes) = self.take_array() {
            *value = i32::from_be_bytes(bytes);
        }
    }

    fn visit_u64(&mut self, _tag: u32, _name: &str, value: &mut u64, _default: u64) {
        if let Some(bytes) = self.take_array() {
            *value = u64::from_be_bytes(bytes);
        }
    }

    fn visit_i64(&mut self, _tag: u32, _name: &str, value: &mut i64, _default: i64) {
        if let Some(bytes) = self.take_array() {
            *value = i64::from_be_bytes(bytes);
        }
    }

    fn visit_f32(&mut self, _tag: u32, _name: &str, value: &mut f32, _default: f32) {
        if let Some(bytes) = self.take_array() {
            *value = f32::from_be_bytes(bytes);
        }
    }

    fn visit_f64(&mut self, _tag: u32, _name: &str, value: &mut f64, _default: f64) {
        if let Some(bytes) = self.take_array() {
            *value = f64::from_be_bytes(bytes);
        }
    }

    fn visit_string(&mut self, _tag: u32, _name: &str, value: &mut String, _default: &str) {
        // The length includes the trailing NUL.
        if let Some(len) = self.take_len() {
            if let Some(bytes) = self.take(len) {
                let text = bytes.strip_suffix(&[0u8]).unwrap_or(bytes);
                *value = String::from_utf8_lossy(text).into_owned();
            }
        }
    }

    fn visit_bytes(&mut self, _tag: u32, _name: &str, value: &mut Vec<u8>, _default: &[u8]) {
        if let Some(len) = self.take_len() {
            if let Some(bytes) = self.take(len) {
                *value = bytes.to_vec();
            }
        }
    }

    fn visit_message(&mut self, _tag: u32, _name: &str, value: &mut dyn Visitable) {
        value.accept(self);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::generic::Value;

    const SPEC: &str = "
message test.Position [id = 1] {
    int32 x [id = 1];
    int32 y [id = 2];
}
message test.Status [id = 2] {
    bool armed [id = 1];
    int16 level [id = 2];
    float speed [id = 3];
    string label [id = 4];
    test.Position position [id = 5];
}
";

    fn body() -> Vec<u8> {
        let mut body = vec![0u8; LCM_HASH_SIZE];
        body.push(1); // armed
        body.extend_from_slice(&(-7i16).to_be_bytes());
        body.extend_from_slice(&2.5f32.to_be_bytes());
        body.extend_from_slice(&3i32.to_be_bytes()); // "hi" + NUL
        body.extend_from_slice(b"hi\0");
        body.extend_from_slice(&11i32.to_be_bytes()); // nested x
        body.extend_from_slice(&(-13i32).to_be_bytes()); // nested y
        body
    }

    fn corpus() -> Vec<MetaMessage> {
        let (messages, result) = parser::parse(SPEC);
        assert_eq!(result, Ok(()));
        messages
    }

    #[test]
    fn decode_body_positionally() {
        let corpus = corpus();
        let message = decode_lcm_body(&corpus[1], &corpus, &body()).unwrap();

        assert_eq!(message.value(1), Some(&Value::Bool(true)));
        assert_eq!(message.value(2), Some(&Value::Int16(-7)));
        assert_eq!(message.value(3), Some(&Value::Float(2.5)));
        assert_eq!(message.value(4), Some(&Value::String("hi".into())));
        match message.value(5) {
            Some(Value::Message(nested)) => {
                assert_eq!(nested.value(1), Some(&Value::Int32(11)));
                assert_eq!(nested.value(2), Some(&Value::Int32(-13)));
            }
            other => panic!("expected nested message, got {:?}", other),
        }
    }

    #[test]
    fn decode_datagram_with_channel_header() {
        let mut datagram = LCM_MAGIC.to_vec();
        datagram.extend_from_slice(&7u32.to_be_bytes());
        datagram.extend_from_slice(b"Status\0");
        datagram.extend_from_slice(&body());

        let mut bridge = LcmToGenericMessage::new();
        assert_eq!(bridge.set_message_specification(SPEC).unwrap(), 2);

        let message = bridge.get_generic_message(&datagram).unwrap();
        assert_eq!(message.meta_message().name, "test.Status");
        assert_eq!(message.value(2), Some(&Value::Int16(-7)));
    }

    #[test]
    fn unknown_channel_is_rejected() {
        let mut datagram = LCM_MAGIC.to_vec();
        datagram.extend_from_slice(&0u32.to_be_bytes());
        datagram.extend_from_slice(b"Nope\0");
        datagram.extend_from_slice(&body());

        let mut bridge = LcmToGenericMessage::new();
        bridge.set_message_specification(SPEC).unwrap();
        assert!(bridge.get_generic_message(&datagram).is_none());
    }

    #[test]
    fn truncated_body_is_rejected() {
        let corpus = corpus();
        let body = body();
        assert!(decode_lcm_body(&corpus[1], &corpus, &body[..body.len() - 2]).is_none());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let bridge = LcmToGenericMessage::new();
        assert!(bridge.get_generic_message(b"XXXX\0\0\0\0chan\0").is_none());
    }
}
