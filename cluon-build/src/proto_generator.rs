//! Generates `.proto` (proto2) files from [`MetaMessage`] descriptors.
//!
//! The emitted messages use the same wire mapping as the binary codec, so a
//! stock Protobuf toolchain can exchange payloads with this middleware.

use cluon::meta::{MetaField, MetaMessage, TypeTag};

/// Fixed header emitted once per generated file.
const HEADER: &str = "\n\
//\n\
// THIS IS AN AUTO-GENERATED FILE. DO NOT MODIFY AS CHANGES MIGHT BE OVERWRITTEN!\n\
//\n\
\n\
\n\
// This line is only needed when using Google Protobuf 3.\n\
syntax = \"proto2\";\n\
\n";

/// Generates one `.proto` document covering all given messages.
pub fn generate(messages: &[MetaMessage]) -> String {
    let mut buf = String::new();
    for (index, message) in messages.iter().enumerate() {
        buf.push_str(&generate_message(message, index == 0));
    }
    buf
}

/// Generates the `.proto` text for a single message, optionally preceded by
/// the file header.
pub fn generate_message(message: &MetaMessage, with_header: bool) -> String {
    let mut buf = String::new();
    if with_header {
        buf.push_str(HEADER);
    }

    buf.push('\n');
    buf.push_str(&format!(
        "// Message identifier: {}.\n",
        message.message_identifier
    ));
    buf.push_str(&format!("message {} {{\n", message.name.replace('.', "_")));
    for field in &message.fields {
        buf.push_str("    \n");
        buf.push_str(&format!(
            "    optional {} {} = {};\n",
            proto_type(field),
            field.name,
            field.field_identifier
        ));
    }
    buf.push_str("    \n");
    buf.push_str("}\n");
    buf
}

/// Maps a field type onto the proto2 type carrying the same wire
/// representation: unsigned (and bool/char) as `uint32`/`uint64`, signed as
/// ZigZag `sint32`/`sint64`, the rest as themselves.
fn proto_type(field: &MetaField) -> String {
    match field.field_type {
        TypeTag::Bool | TypeTag::Char | TypeTag::Uint8 | TypeTag::Uint16 | TypeTag::Uint32 => {
            "uint32".to_string()
        }
        TypeTag::Int8 | TypeTag::Int16 | TypeTag::Int32 => "sint32".to_string(),
        TypeTag::Uint64 => "uint64".to_string(),
        TypeTag::Int64 => "sint64".to_string(),
        TypeTag::Float => "float".to_string(),
        TypeTag::Double => "double".to_string(),
        TypeTag::String => "string".to_string(),
        TypeTag::Bytes => "bytes".to_string(),
        TypeTag::Message => field
            .message_type
            .as_deref()
            .unwrap_or_default()
            .replace('.', "_"),
    }
}
