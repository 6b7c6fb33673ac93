//! JSON rendering of any visitable message.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::visitor::{Visitable, Visitor};

/// A [`Visitor`] that renders the visited fields as JSON.
///
/// Each field becomes a `"name":value` pair; pairs are joined with `,\n`.
/// The outer curly braces are optional so that callers composing a larger
/// document (like the Envelope transcoder) can splice the output; a mask
/// of field identifiers can suppress selected fields.
///
/// Rendering rules: numeric fields (including `char`) print their numeric
/// value, floats use the shortest round-trippable decimal with non-finite
/// values rendered as `null`, `bytes` are Base64-encoded, and nested
/// messages recurse into a braced object.
#[derive(Debug, Default)]
pub struct JsonEncoder {
    without_outer_braces: bool,
    mask: HashMap<u32, bool>,
    entries: Vec<String>,
}

impl JsonEncoder {
    /// An encoder producing a self-contained JSON object.
    pub fn new() -> JsonEncoder {
        JsonEncoder::default()
    }

    /// An encoder producing only the `"name":value` pairs, without the
    /// surrounding braces.
    pub fn without_outer_braces() -> JsonEncoder {
        JsonEncoder {
            without_outer_braces: true,
            ..JsonEncoder::default()
        }
    }

    /// Suppresses (`false`) or retains (`true`) the field with the given
    /// identifier. Unlisted fields are always retained.
    pub fn mask(mut self, field_identifier: u32, include: bool) -> JsonEncoder {
        self.mask.insert(field_identifier, include);
        self
    }

    /// The JSON document accumulated so far.
    pub fn json(&self) -> String {
        let body = self.entries.join(",\n");
        if self.without_outer_braces {
            body
        } else {
            format!("{{{}}}", body)
        }
    }

    fn push(&mut self, tag: u32, name: &str, rendered: String) {
        if let Some(false) = self.mask.get(&tag) {
            return;
        }
        self.entries.push(format!("\"{}\":{}", name, rendered));
    }
}

impl Visitor for JsonEncoder {
    fn visit_bool(&mut self, tag: u32, name: &str, value: &mut bool, _default: bool) {
        self.push(tag, name, value.to_string());
    }

    fn visit_char(&mut self, tag: u32, name: &str, value: &mut char, _default: char) {
        self.push(tag, name, u32::from(*value).to_string());
    }

    fn visit_u8(&mut self, tag: u32, name: &str, value: &mut u8, _default: u8) {
        self.push(tag, name, value.to_string());
    }

    fn visit_i8(&mut self, tag: u32, name: &str, value: &mut i8, _default: i8) {
        self.push(tag, name, value.to_string());
    }

    fn visit_u16(&mut self, tag: u32, name: &str, value: &mut u16, _default: u16) {
        self.push(tag, name, value.to_string());
    }

    fn visit_i16(&mut self, tag: u32, name: &str, value: &mut i16, _default: i16) {
        self.push(tag, name, value.to_string());
    }

    fn visit_u32(&mut self, tag: u32, name: &str, value: &mut u32, _default: u32) {
        self.push(tag, name, value.to_string());
    }

    fn visit_i32(&mut self, tag: u32, name: &str, value: &mut i32, _default: i32) {
        self.push(tag, name, value.to_string());
    }

    fn visit_u64(&mut self, tag: u32, name: &str, value: &mut u64, _default: u64) {
        self.push(tag, name, value.to_string());
    }

    fn visit_i64(&mut self, tag: u32, name: &str, value: &mut i64, _default: i64) {
        self.push(tag, name, value.to_string());
    }

    fn visit_f32(&mut self, tag: u32, name: &str, value: &mut f32, _default: f32) {
        let rendered = if value.is_finite() {
            value.to_string()
        } else {
            "null".to_string()
        };
        self.push(tag, name, rendered);
    }

    fn visit_f64(&mut self, tag: u32, name: &str, value: &mut f64, _default: f64) {
        let rendered = if value.is_finite() {
            value.to_string()
        } else {
            "null".to_string()
        };
        self.push(tag, name, rendered);
    }

    fn visit_string(&mut self, tag: u32, name: &str, value: &mut String, _default: &str) {
        self.push(tag, name, format!("\"{}\"", escape(value)));
    }

    fn visit_bytes(&mut self, tag: u32, name: &str, value: &mut Vec<u8>, _default: &[u8]) {
        self.push(tag, name, format!("\"{}\"", BASE64.encode(value)));
    }

    fn visit_message(&mut self, tag: u32, name: &str, value: &mut dyn Visitable) {
        let mut nested = JsonEncoder::new();
        value.accept(&mut nested);
        self.push(tag, name, nested.json());
    }
}

/// Escapes a string for embedding in a JSON document.
fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '/' => escaped.push_str("\\/"),
            '\u{08}' => escaped.push_str("\\b"),
            '\u{0C}' => escaped.push_str("\\f"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                escaped.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => escaped.push(c),
        }
    }
    escaped
}
