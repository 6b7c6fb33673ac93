//! End-to-end encoding, transcoding, and framing tests.
//!
//! The message types below are written exactly the way `cluon-build` emits
//! them, so they double as a fixture for the generated-code contract.

use cluon::envelope::{decode_envelope, encode_envelope, encode_envelope_framed, envelope_to_json};
use cluon::{
    Envelope, GenericMessage, JsonEncoder, ProtoDecoder, ProtoEncoder, TimeStamp, Visitable,
    Visitor,
};

const TEST_SPEC: &str = "
message testdata.MyTestMessage5 [id = 30005] {
    uint8 attribute1 [ default = 1, id = 1 ];
    int8 attribute2 [ default = -1, id = 2 ];
    uint16 attribute3 [ default = 100, id = 3 ];
    int16 attribute4 [ default = -100, id = 4 ];
    uint32 attribute5 [ default = 10000, id = 5 ];
    int32 attribute6 [ default = -10000, id = 6 ];
    uint64 attribute7 [ default = 12345, id = 7 ];
    int64 attribute8 [ default = -12345, id = 8 ];
    float attribute9 [ default = -1.2345, id = 9 ];
    double attribute10 [ default = -10.2345, id = 10 ];
    string attribute11 [ default = \"Hello World!\", id = 11 ];
}
";

#[derive(Clone, Debug, PartialEq)]
pub struct MyTestMessage5 {
    attribute1: u8,
    attribute2: i8,
    attribute3: u16,
    attribute4: i16,
    attribute5: u32,
    attribute6: i32,
    attribute7: u64,
    attribute8: i64,
    attribute9: f32,
    attribute10: f64,
    attribute11: String,
}

impl Default for MyTestMessage5 {
    fn default() -> MyTestMessage5 {
        MyTestMessage5 {
            attribute1: 1u8,
            attribute2: -1i8,
            attribute3: 100u16,
            attribute4: -100i16,
            attribute5: 10000u32,
            attribute6: -10000i32,
            attribute7: 12345u64,
            attribute8: -12345i64,
            attribute9: -1.2345f32,
            attribute10: -10.2345f64,
            attribute11: String::from("Hello World!"),
        }
    }
}

impl Visitable for MyTestMessage5 {
    fn accept(&mut self, visitor: &mut dyn Visitor) {
        visitor.pre_visit(30005, "MyTestMessage5", "testdata.MyTestMessage5");
        visitor.visit_u8(1, "attribute1", &mut self.attribute1, 1u8);
        visitor.visit_i8(2, "attribute2", &mut self.attribute2, -1i8);
        visitor.visit_u16(3, "attribute3", &mut self.attribute3, 100u16);
        visitor.visit_i16(4, "attribute4", &mut self.attribute4, -100i16);
        visitor.visit_u32(5, "attribute5", &mut self.attribute5, 10000u32);
        visitor.visit_i32(6, "attribute6", &mut self.attribute6, -10000i32);
        visitor.visit_u64(7, "attribute7", &mut self.attribute7, 12345u64);
        visitor.visit_i64(8, "attribute8", &mut self.attribute8, -12345i64);
        visitor.visit_f32(9, "attribute9", &mut self.attribute9, -1.2345f32);
        visitor.visit_f64(10, "attribute10", &mut self.attribute10, -10.2345f64);
        visitor.visit_string(11, "attribute11", &mut self.attribute11, "Hello World!");
        visitor.post_visit();
    }

    fn accept_field(&mut self, field_identifier: u32, visitor: &mut dyn Visitor) {
        match field_identifier {
            1 => visitor.visit_u8(1, "attribute1", &mut self.attribute1, 1u8),
            2 => visitor.visit_i8(2, "attribute2", &mut self.attribute2, -1i8),
            3 => visitor.visit_u16(3, "attribute3", &mut self.attribute3, 100u16),
            4 => visitor.visit_i16(4, "attribute4", &mut self.attribute4, -100i16),
            5 => visitor.visit_u32(5, "attribute5", &mut self.attribute5, 10000u32),
            6 => visitor.visit_i32(6, "attribute6", &mut self.attribute6, -10000i32),
            7 => visitor.visit_u64(7, "attribute7", &mut self.attribute7, 12345u64),
            8 => visitor.visit_i64(8, "attribute8", &mut self.attribute8, -12345i64),
            9 => visitor.visit_f32(9, "attribute9", &mut self.attribute9, -1.2345f32),
            10 => visitor.visit_f64(10, "attribute10", &mut self.attribute10, -10.2345f64),
            11 => visitor.visit_string(11, "attribute11", &mut self.attribute11, "Hello World!"),
            _ => {}
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
struct Small {
    x: i32,
    s: String,
}

impl Visitable for Small {
    fn accept(&mut self, visitor: &mut dyn Visitor) {
        visitor.pre_visit(1, "T", "T");
        visitor.visit_i32(1, "x", &mut self.x, 0i32);
        visitor.visit_string(2, "s", &mut self.s, "");
        visitor.post_visit();
    }

    fn accept_field(&mut self, field_identifier: u32, visitor: &mut dyn Visitor) {
        match field_identifier {
            1 => visitor.visit_i32(1, "x", &mut self.x, 0i32),
            2 => visitor.visit_string(2, "s", &mut self.s, ""),
            _ => {}
        }
    }
}

fn parse_test_spec() -> Vec<cluon::MetaMessage> {
    let (messages, result) = cluon::parser::parse(TEST_SPEC);
    assert_eq!(result, Ok(()));
    messages
}

#[test]
fn proto_reference_bytes() {
    let mut small = Small {
        x: -1,
        s: "hi".into(),
    };
    assert_eq!(
        ProtoEncoder::encode(&mut small),
        [0x08, 0x01, 0x12, 0x02, 0x68, 0x69]
    );
}

#[test]
fn default_valued_message_encodes_to_nothing() {
    // Declared (non-zero) defaults are elided just like zero ones.
    let mut message = MyTestMessage5::default();
    assert!(ProtoEncoder::encode(&mut message).is_empty());

    let mut decoder = ProtoDecoder::new();
    decoder.decode_from(&[][..]).unwrap();
    let mut decoded = MyTestMessage5::default();
    decoded.accept(&mut decoder);
    assert_eq!(decoded, MyTestMessage5::default());
}

#[test]
fn round_trip_with_non_default_values() {
    let mut message = MyTestMessage5 {
        attribute1: 3,
        attribute2: -3,
        attribute3: 103,
        attribute4: -103,
        attribute5: 10003,
        attribute6: -10003,
        attribute7: 54321,
        attribute8: -74321,
        attribute9: 47.11,
        attribute10: -47.11,
        attribute11: String::from("Hello cluon World!"),
    };
    let encoded = ProtoEncoder::encode(&mut message);
    assert!(!encoded.is_empty());

    let mut decoder = ProtoDecoder::new();
    decoder.decode_from(&encoded[..]).unwrap();
    let mut decoded = MyTestMessage5::default();
    decoded.accept(&mut decoder);
    assert_eq!(decoded, message);
}

#[test]
fn encoding_is_invariant_to_declaration_order() {
    // The same fields declared in reverse order must serialize identically
    // when the identifiers are preserved.
    let forward = "message T [id = 1] { int32 x [id = 1]; string s [id = 2]; }";
    let reverse = "message T [id = 1] { string s [id = 2]; int32 x [id = 1]; }";

    let payload = {
        let mut small = Small {
            x: -1,
            s: "hi".into(),
        };
        ProtoEncoder::encode(&mut small)
    };

    let mut encodings = Vec::new();
    for spec in [forward, reverse] {
        let (messages, result) = cluon::parser::parse(spec);
        assert_eq!(result, Ok(()));

        let decoder = ProtoDecoder::decode(&payload[..]).unwrap();
        let mut gm = GenericMessage::new();
        gm.set_meta_message(&messages[0], &messages, &decoder);
        encodings.push(ProtoEncoder::encode(&mut gm));
    }
    assert_eq!(encodings[0], encodings[1]);
    assert_eq!(encodings[0], payload);
}

#[test]
fn od4_framing_is_idempotent() {
    let mut envelope = Envelope::default();
    envelope.set_data_type(30005);
    envelope.set_serialized_data(vec![0x12, 0x34, 0x56]);
    envelope.set_sent(TimeStamp::new(3, 4));
    envelope.set_sample_time_stamp(TimeStamp::new(5, 6));
    envelope.set_sender_stamp(7);

    let framed = encode_envelope_framed(&mut envelope);
    assert_eq!(framed[0], 0x0D);
    assert_eq!(framed[1], 0xA4);
    assert_eq!(decode_envelope(&framed).unwrap(), envelope);

    // Unframed decoding accepts the same payload.
    let plain = encode_envelope(&mut envelope);
    assert_eq!(decode_envelope(&plain).unwrap(), envelope);
}

#[test]
fn frame_length_matches_reference_layout() {
    // A 9-byte Envelope encoding yields the header 0D A4 09 00 00.
    let mut envelope = Envelope::default();
    envelope.set_serialized_data(vec![0xAA; 7]);
    let plain = encode_envelope(&mut envelope);
    assert_eq!(plain.len(), 9);

    let framed = encode_envelope_framed(&mut envelope);
    assert_eq!(&framed[..5], &[0x0D, 0xA4, 0x09, 0x00, 0x00]);
}

#[test]
fn equal_messages_produce_identical_json() {
    let mut first = MyTestMessage5::default();
    let mut second = MyTestMessage5::default();

    let mut json_first = JsonEncoder::new();
    first.accept(&mut json_first);
    let mut json_second = JsonEncoder::new();
    second.accept(&mut json_second);

    assert_eq!(json_first.json(), json_second.json());
}

#[test]
fn generic_message_json_equals_static_json() {
    let corpus = parse_test_spec();
    let mut message = MyTestMessage5 {
        attribute5: 99999,
        attribute11: String::from("transcoded"),
        ..MyTestMessage5::default()
    };
    let encoded = ProtoEncoder::encode(&mut message);

    let decoder = ProtoDecoder::decode(&encoded[..]).unwrap();
    let mut gm = GenericMessage::new();
    gm.set_meta_message(&corpus[0], &corpus, &decoder);

    let mut static_json = JsonEncoder::new();
    message.accept(&mut static_json);
    let mut generic_json = JsonEncoder::new();
    gm.accept(&mut generic_json);

    assert_eq!(static_json.json(), generic_json.json());
}

#[test]
fn envelope_payload_transcodes_to_json() {
    let corpus = parse_test_spec();

    let mut payload = MyTestMessage5::default();
    let mut envelope = Envelope::default();
    envelope.set_data_type(30005);
    envelope.set_serialized_data(ProtoEncoder::encode(&mut payload));

    let json = envelope_to_json(&corpus, &mut envelope);

    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed["dataType"], 30005);
    assert!(parsed.get("serializedData").is_none());
    assert_eq!(parsed["sent"]["seconds"], 0);
    let inner = &parsed["testdata_MyTestMessage5"];
    assert_eq!(inner["attribute1"], 1);
    assert_eq!(inner["attribute6"], -10000);
    assert_eq!(inner["attribute11"], "Hello World!");

    assert!(json.starts_with("{\"dataType\":30005,"));
    assert!(json.contains("\"testdata_MyTestMessage5\":{\"attribute1\":1,"));
    assert!(json.ends_with("\"attribute11\":\"Hello World!\"}}"));
}

#[test]
fn envelope_with_unknown_data_type_yields_empty_document() {
    let corpus = parse_test_spec();
    let mut envelope = Envelope::default();
    envelope.set_data_type(4242);
    assert_eq!(envelope_to_json(&corpus, &mut envelope), "{}");
}

#[test]
fn unknown_fields_from_newer_producers_are_ignored() {
    // A payload carrying fields 1, 2, and an unknown 15 decodes cleanly.
    let mut small = Small {
        x: 13,
        s: "keep".into(),
    };
    let mut encoded = ProtoEncoder::encode(&mut small);
    encoded.extend_from_slice(&[(15 << 3), 0x01]); // field 15, varint 1

    let mut decoder = ProtoDecoder::new();
    decoder.decode_from(&encoded[..]).unwrap();
    let mut decoded = Small::default();
    decoded.accept(&mut decoder);
    assert_eq!(decoded, small);
}
