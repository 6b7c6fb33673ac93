//! The well-known `Envelope` container and its transport framing.
//!
//! An `Envelope` wraps an opaque serialized payload together with the
//! payload's numeric type identifier and three timestamps. For transport and
//! persistence it may be prefixed with a five-byte header: the magic bytes
//! `0x0D 0xA4` followed by the 24-bit little-endian length of the encoded
//! Envelope.

use crate::generic::GenericMessage;
use crate::json::JsonEncoder;
use crate::meta::MetaMessage;
use crate::proto::{ProtoDecoder, ProtoEncoder};
use crate::visitor::{Visitable, Visitor};
use crate::DecodeError;

const FRAME_HEADER_SIZE: usize = 5;
const FRAME_MAGIC_0: u8 = 0x0D;
const FRAME_MAGIC_1: u8 = 0xA4;

/// Seconds and microseconds since the UNIX epoch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TimeStamp {
    seconds: i32,
    microseconds: i32,
}

impl TimeStamp {
    pub const SHORT_NAME: &'static str = "TimeStamp";
    pub const LONG_NAME: &'static str = "cluon.data.TimeStamp";
    pub const IDENTIFIER: u32 = 12;

    pub fn new(seconds: i32, microseconds: i32) -> TimeStamp {
        TimeStamp {
            seconds,
            microseconds,
        }
    }

    pub fn seconds(&self) -> i32 {
        self.seconds
    }

    pub fn set_seconds(&mut self, seconds: i32) {
        self.seconds = seconds;
    }

    pub fn microseconds(&self) -> i32 {
        self.microseconds
    }

    pub fn set_microseconds(&mut self, microseconds: i32) {
        self.microseconds = microseconds;
    }
}

impl Visitable for TimeStamp {
    fn accept(&mut self, visitor: &mut dyn Visitor) {
        visitor.pre_visit(Self::IDENTIFIER, Self::SHORT_NAME, Self::LONG_NAME);
        visitor.visit_i32(1, "seconds", &mut self.seconds, 0);
        visitor.visit_i32(2, "microseconds", &mut self.microseconds, 0);
        visitor.post_visit();
    }

    fn accept_field(&mut self, field_identifier: u32, visitor: &mut dyn Visitor) {
        match field_identifier {
            1 => visitor.visit_i32(1, "seconds", &mut self.seconds, 0),
            2 => visitor.visit_i32(2, "microseconds", &mut self.microseconds, 0),
            _ => {}
        }
    }
}

/// The outer message carrying a type identifier, timestamps, and an opaque
/// serialized payload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Envelope {
    data_type: i32,
    serialized_data: Vec<u8>,
    sent: TimeStamp,
    received: TimeStamp,
    sample_time_stamp: TimeStamp,
    sender_stamp: u32,
}

impl Envelope {
    pub const SHORT_NAME: &'static str = "Envelope";
    pub const LONG_NAME: &'static str = "cluon.data.Envelope";
    pub const IDENTIFIER: u32 = 1;

    /// The field identifier of `serializedData`, used for masking during
    /// JSON transcoding.
    pub const SERIALIZED_DATA_FIELD: u32 = 2;

    pub fn data_type(&self) -> i32 {
        self.data_type
    }

    pub fn set_data_type(&mut self, data_type: i32) {
        self.data_type = data_type;
    }

    pub fn serialized_data(&self) -> &[u8] {
        &self.serialized_data
    }

    pub fn set_serialized_data(&mut self, serialized_data: Vec<u8>) {
        self.serialized_data = serialized_data;
    }

    pub fn sent(&self) -> &TimeStamp {
        &self.sent
    }

    pub fn set_sent(&mut self, sent: TimeStamp) {
        self.sent = sent;
    }

    pub fn received(&self) -> &TimeStamp {
        &self.received
    }

    pub fn set_received(&mut self, received: TimeStamp) {
        self.received = received;
    }

    pub fn sample_time_stamp(&self) -> &TimeStamp {
        &self.sample_time_stamp
    }

    pub fn set_sample_time_stamp(&mut self, sample_time_stamp: TimeStamp) {
        self.sample_time_stamp = sample_time_stamp;
    }

    pub fn sender_stamp(&self) -> u32 {
        self.sender_stamp
    }

    pub fn set_sender_stamp(&mut self, sender_stamp: u32) {
        self.sender_stamp = sender_stamp;
    }
}

impl Visitable for Envelope {
    fn accept(&mut self, visitor: &mut dyn Visitor) {
        visitor.pre_visit(Self::IDENTIFIER, Self::SHORT_NAME, Self::LONG_NAME);
        visitor.visit_i32(1, "dataType", &mut self.data_type, 0);
        visitor.visit_bytes(2, "serializedData", &mut self.serialized_data, &[]);
        visitor.visit_message(3, "sent", &mut self.sent);
        visitor.visit_message(4, "received", &mut self.received);
        visitor.visit_message(5, "sampleTimeStamp", &mut self.sample_time_stamp);
        visitor.visit_u32(6, "senderStamp", &mut self.sender_stamp, 0);
        visitor.post_visit();
    }

    fn accept_field(&mut self, field_identifier: u32, visitor: &mut dyn Visitor) {
        match field_identifier {
            1 => visitor.visit_i32(1, "dataType", &mut self.data_type, 0),
            2 => visitor.visit_bytes(2, "serializedData", &mut self.serialized_data, &[]),
            3 => visitor.visit_message(3, "sent", &mut self.sent),
            4 => visitor.visit_message(4, "received", &mut self.received),
            5 => visitor.visit_message(5, "sampleTimeStamp", &mut self.sample_time_stamp),
            6 => visitor.visit_u32(6, "senderStamp", &mut self.sender_stamp, 0),
            _ => {}
        }
    }
}

/// Serializes an Envelope without framing.
pub fn encode_envelope(envelope: &mut Envelope) -> Vec<u8> {
    ProtoEncoder::encode(envelope)
}

/// Serializes an Envelope and prepends the five-byte transport header.
pub fn encode_envelope_framed(envelope: &mut Envelope) -> Vec<u8> {
    let payload = encode_envelope(envelope);
    let mut framed = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    framed.push(FRAME_MAGIC_0);
    framed.push(FRAME_MAGIC_1);
    framed.push((payload.len() & 0xFF) as u8);
    framed.push(((payload.len() >> 8) & 0xFF) as u8);
    framed.push(((payload.len() >> 16) & 0xFF) as u8);
    framed.extend_from_slice(&payload);
    framed
}

/// Parses an Envelope from a buffer that may or may not carry the transport
/// header.
///
/// The header is only honored when both magic bytes match and the encoded
/// length equals the remaining buffer length; otherwise the whole buffer is
/// treated as a bare Envelope. A legitimate Envelope that happens to begin
/// with the magic bytes is therefore never corrupted.
pub fn decode_envelope(buf: &[u8]) -> Result<Envelope, DecodeError> {
    let payload = strip_frame(buf);
    let mut decoder = ProtoDecoder::new();
    decoder.decode_from(payload)?;
    let mut envelope = Envelope::default();
    envelope.accept(&mut decoder);
    Ok(envelope)
}

fn strip_frame(buf: &[u8]) -> &[u8] {
    if buf.len() >= FRAME_HEADER_SIZE && buf[0] == FRAME_MAGIC_0 && buf[1] == FRAME_MAGIC_1 {
        let length =
            usize::from(buf[2]) | (usize::from(buf[3]) << 8) | (usize::from(buf[4]) << 16);
        if length == buf.len() - FRAME_HEADER_SIZE {
            return &buf[FRAME_HEADER_SIZE..];
        }
    }
    buf
}

/// Renders an Envelope and its payload as one JSON document.
///
/// The Envelope's own fields appear first (`serializedData` masked out),
/// followed by the payload decoded through a [`GenericMessage`] under a key
/// derived from the payload type's long name with dots replaced by
/// underscores. Returns `"{}"` when the corpus has no message matching the
/// Envelope's `dataType`.
pub fn envelope_to_json(corpus: &[MetaMessage], envelope: &mut Envelope) -> String {
    let data_type = envelope.data_type() as u32;
    let payload_meta = match corpus.iter().find(|m| m.message_identifier == data_type) {
        Some(meta) => meta,
        None => return "{}".to_string(),
    };

    let mut envelope_json =
        JsonEncoder::without_outer_braces().mask(Envelope::SERIALIZED_DATA_FIELD, false);
    envelope.accept(&mut envelope_json);

    let mut decoder = ProtoDecoder::new();
    if decoder.decode_from(envelope.serialized_data()).is_err() {
        return "{}".to_string();
    }

    let mut payload = GenericMessage::new();
    payload.set_meta_message(payload_meta, corpus, &decoder);
    let mut payload_json = JsonEncoder::without_outer_braces();
    payload.accept(&mut payload_json);

    let key = payload_meta.name.replace('.', "_");
    format!(
        "{{{},\n\"{}\":{{{}}}}}",
        envelope_json.json(),
        key,
        payload_json.json()
    )
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_envelope() -> Envelope {
        let mut envelope = Envelope::default();
        envelope.set_data_type(30005);
        envelope.set_serialized_data(vec![0x08, 0x01]);
        envelope.set_sent(TimeStamp::new(1, 2));
        envelope
    }

    #[test]
    fn frame_layout() {
        let mut envelope = sample_envelope();
        let payload = encode_envelope(&mut envelope);
        let framed = encode_envelope_framed(&mut envelope);

        assert_eq!(framed[0], 0x0D);
        assert_eq!(framed[1], 0xA4);
        let length = usize::from(framed[2])
            | (usize::from(framed[3]) << 8)
            | (usize::from(framed[4]) << 16);
        assert_eq!(length, payload.len());
        assert_eq!(&framed[5..], &payload[..]);
    }

    #[test]
    fn framed_round_trip() {
        let mut envelope = sample_envelope();
        let framed = encode_envelope_framed(&mut envelope);
        assert_eq!(decode_envelope(&framed).unwrap(), envelope);
    }

    #[test]
    fn unframed_round_trip() {
        let mut envelope = sample_envelope();
        let encoded = encode_envelope(&mut envelope);
        assert_eq!(decode_envelope(&encoded).unwrap(), envelope);
    }

    #[test]
    fn magic_prefix_without_matching_length_is_payload() {
        // An unframed Envelope whose first field happens to produce the
        // magic bytes must not be treated as framed. Field 1 varint with
        // value chosen so the encoding starts 0x0D: tag 1 varint => 0x08.
        // Build an artificial buffer starting with the magic but with a
        // length field that does not match.
        let buf = [0x0D, 0xA4, 0xFF, 0x00, 0x00];
        assert_eq!(strip_frame(&buf), &buf[..]);
    }

    #[test]
    fn timestamps_default_to_zero() {
        let envelope = Envelope::default();
        assert_eq!(envelope.sent(), &TimeStamp::default());
        assert_eq!(envelope.sender_stamp(), 0);
    }
}
