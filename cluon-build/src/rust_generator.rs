//! Generates Rust message types from [`MetaMessage`] descriptors.
//!
//! The output is a self-contained source file: one module per package, one
//! struct per message with schema defaults, getter/setter pairs, and the two
//! `Visitable` traversals, so every existing visitor (proto, JSON, LCM)
//! works on the generated types without further registration.

use cluon::meta::{Literal, MetaField, MetaMessage, TypeTag};
use log::debug;

/// Fixed banner at the top of every generated file.
const BANNER: &str =
    "// THIS IS AN AUTO-GENERATED FILE. DO NOT MODIFY AS CHANGES MIGHT BE OVERWRITTEN!\n";

/// Generates one Rust source file covering all given messages.
pub fn generate(messages: &[MetaMessage]) -> String {
    let mut buf = String::new();
    buf.push_str(BANNER);

    let mut generator = CodeGenerator {
        messages,
        depth: 0,
        buf: &mut buf,
    };

    // Group consecutive messages of the same package into one module tree.
    let mut index = 0;
    while index < messages.len() {
        let package = messages[index].package_name();
        let mut end = index + 1;
        while end < messages.len() && messages[end].package_name() == package {
            end += 1;
        }
        generator.push_package(package, &messages[index..end]);
        index = end;
    }

    buf
}

struct CodeGenerator<'a> {
    messages: &'a [MetaMessage],
    depth: u8,
    buf: &'a mut String,
}

impl CodeGenerator<'_> {
    fn push_indent(&mut self) {
        for _ in 0..self.depth {
            self.buf.push_str("    ");
        }
    }

    fn push_line(&mut self, line: &str) {
        self.push_indent();
        self.buf.push_str(line);
        self.buf.push('\n');
    }

    fn push_package(&mut self, package: &str, messages: &[MetaMessage]) {
        let segments: Vec<&str> = package.split('.').filter(|s| !s.is_empty()).collect();
        for segment in &segments {
            self.buf.push('\n');
            self.push_line(&format!("pub mod {} {{", sanitize_ident(segment)));
            self.depth += 1;
        }
        for message in messages {
            self.push_message(message);
        }
        for _ in &segments {
            self.depth -= 1;
            self.push_line("}");
        }
    }

    fn push_message(&mut self, message: &MetaMessage) {
        debug!("message: {}", message.name);
        let name = sanitize_ident(message.short_name());
        let depth = message.package_name().split('.').filter(|s| !s.is_empty()).count();

        self.buf.push('\n');
        self.push_line(&format!(
            "/// Generated from the `{}` message specification.",
            message.name
        ));
        self.push_line("#[derive(Clone, Debug, PartialEq)]");
        self.push_line(&format!("pub struct {} {{", name));
        self.depth += 1;
        for field in &message.fields {
            self.push_line(&format!(
                "{}: {},",
                sanitize_ident(&field.name),
                rust_type(field, self.messages, depth)
            ));
        }
        self.depth -= 1;
        self.push_line("}");

        self.buf.push('\n');
        self.push_line(&format!("impl Default for {} {{", name));
        self.depth += 1;
        self.push_line(&format!("fn default() -> {} {{", name));
        self.depth += 1;
        self.push_line(&format!("{} {{", name));
        self.depth += 1;
        for field in &message.fields {
            self.push_line(&format!(
                "{}: {},",
                sanitize_ident(&field.name),
                default_initializer(field)
            ));
        }
        self.depth -= 1;
        self.push_line("}");
        self.depth -= 1;
        self.push_line("}");
        self.depth -= 1;
        self.push_line("}");

        self.buf.push('\n');
        self.push_line(&format!("impl {} {{", name));
        self.depth += 1;
        self.push_line(&format!(
            "pub const SHORT_NAME: &'static str = \"{}\";",
            message.short_name()
        ));
        self.push_line(&format!(
            "pub const LONG_NAME: &'static str = \"{}\";",
            message.name
        ));
        self.push_line(&format!(
            "pub const IDENTIFIER: u32 = {};",
            message.message_identifier
        ));
        for field in &message.fields {
            self.push_accessors(field, depth);
        }
        self.depth -= 1;
        self.push_line("}");

        self.push_visitable_impl(message, &name);
    }

    fn push_accessors(&mut self, field: &MetaField, depth: usize) {
        let ident = sanitize_ident(&field.name);
        let ty = rust_type(field, self.messages, depth);
        self.buf.push('\n');
        match field.field_type {
            TypeTag::String => {
                self.push_line(&format!("pub fn {}(&self) -> &str {{", ident));
                self.depth += 1;
                self.push_line(&format!("&self.{}", ident));
            }
            TypeTag::Bytes => {
                self.push_line(&format!("pub fn {}(&self) -> &[u8] {{", ident));
                self.depth += 1;
                self.push_line(&format!("&self.{}", ident));
            }
            TypeTag::Message => {
                self.push_line(&format!("pub fn {}(&self) -> &{} {{", ident, ty));
                self.depth += 1;
                self.push_line(&format!("&self.{}", ident));
            }
            _ => {
                self.push_line(&format!("pub fn {}(&self) -> {} {{", ident, ty));
                self.depth += 1;
                self.push_line(&format!("self.{}", ident));
            }
        }
        self.depth -= 1;
        self.push_line("}");

        self.buf.push('\n');
        self.push_line(&format!("pub fn set_{}(&mut self, value: {}) {{", ident, ty));
        self.depth += 1;
        self.push_line(&format!("self.{} = value;", ident));
        self.depth -= 1;
        self.push_line("}");
    }

    fn push_visitable_impl(&mut self, message: &MetaMessage, name: &str) {
        self.buf.push('\n');
        self.push_line(&format!("impl ::cluon::Visitable for {} {{", name));
        self.depth += 1;

        self.push_line("fn accept(&mut self, visitor: &mut dyn ::cluon::Visitor) {");
        self.depth += 1;
        self.push_line(&format!(
            "visitor.pre_visit({}, \"{}\", \"{}\");",
            message.message_identifier,
            message.short_name(),
            message.name
        ));
        for field in &message.fields {
            let call = visit_call(field);
            self.push_line(&format!("visitor.{};", call));
        }
        self.push_line("visitor.post_visit();");
        self.depth -= 1;
        self.push_line("}");

        self.buf.push('\n');
        self.push_line(
            "fn accept_field(&mut self, field_identifier: u32, visitor: &mut dyn ::cluon::Visitor) {",
        );
        self.depth += 1;
        self.push_line("match field_identifier {");
        self.depth += 1;
        for field in &message.fields {
            let call = visit_call(field);
            self.push_line(&format!("{} => visitor.{},", field.field_identifier, call));
        }
        self.push_line("_ => {}");
        self.depth -= 1;
        self.push_line("}");
        self.depth -= 1;
        self.push_line("}");

        self.depth -= 1;
        self.push_line("}");
    }
}

/// The `visitor.<...>` invocation for one field, without the receiver.
fn visit_call(field: &MetaField) -> String {
    let tag = field.field_identifier;
    let name = &field.name;
    let ident = sanitize_ident(name);
    match field.field_type {
        TypeTag::Message => format!("visit_message({}, \"{}\", &mut self.{})", tag, name, ident),
        _ => format!(
            "{}({}, \"{}\", &mut self.{}, {})",
            visit_method(field.field_type),
            tag,
            name,
            ident,
            default_literal(field)
        ),
    }
}

fn visit_method(field_type: TypeTag) -> &'static str {
    match field_type {
        TypeTag::Bool => "visit_bool",
        TypeTag::Char => "visit_char",
        TypeTag::Uint8 => "visit_u8",
        TypeTag::Int8 => "visit_i8",
        TypeTag::Uint16 => "visit_u16",
        TypeTag::Int16 => "visit_i16",
        TypeTag::Uint32 => "visit_u32",
        TypeTag::Int32 => "visit_i32",
        TypeTag::Uint64 => "visit_u64",
        TypeTag::Int64 => "visit_i64",
        TypeTag::Float => "visit_f32",
        TypeTag::Double => "visit_f64",
        TypeTag::String => "visit_string",
        TypeTag::Bytes => "visit_bytes",
        TypeTag::Message => "visit_message",
    }
}

/// The Rust type of a field; message references become `super::`-relative
/// paths so the generated file works wherever it is included.
fn rust_type(field: &MetaField, messages: &[MetaMessage], depth: usize) -> String {
    match field.field_type {
        TypeTag::Bool => "bool".to_string(),
        TypeTag::Char => "char".to_string(),
        TypeTag::Uint8 => "u8".to_string(),
        TypeTag::Int8 => "i8".to_string(),
        TypeTag::Uint16 => "u16".to_string(),
        TypeTag::Int16 => "i16".to_string(),
        TypeTag::Uint32 => "u32".to_string(),
        TypeTag::Int32 => "i32".to_string(),
        TypeTag::Uint64 => "u64".to_string(),
        TypeTag::Int64 => "i64".to_string(),
        TypeTag::Float => "f32".to_string(),
        TypeTag::Double => "f64".to_string(),
        TypeTag::String => "String".to_string(),
        TypeTag::Bytes => "Vec<u8>".to_string(),
        TypeTag::Message => {
            let long_name = field.message_type.as_deref().unwrap_or_default();
            let target = messages.iter().find(|m| m.name == long_name);
            let mut path = String::new();
            for _ in 0..depth {
                path.push_str("super::");
            }
            match target {
                Some(target) => {
                    for segment in target
                        .package_name()
                        .split('.')
                        .filter(|s| !s.is_empty())
                    {
                        path.push_str(&sanitize_ident(segment));
                        path.push_str("::");
                    }
                    path.push_str(&sanitize_ident(target.short_name()));
                }
                None => path.push_str(&long_name.replace('.', "::")),
            }
            path
        }
    }
}

/// The initializer expression for one field in the `Default` impl.
fn default_initializer(field: &MetaField) -> String {
    match field.field_type {
        TypeTag::String => match &field.default {
            Some(Literal::String(value)) => {
                format!("String::from(\"{}\")", escape_str(value))
            }
            _ => "String::new()".to_string(),
        },
        TypeTag::Bytes => match &field.default {
            Some(Literal::String(value)) => format!("b\"{}\".to_vec()", escape_str(value)),
            _ => "Vec::new()".to_string(),
        },
        TypeTag::Message => "Default::default()".to_string(),
        _ => default_literal(field),
    }
}

/// The default literal handed to the visitor, typed to match the visit
/// method's signature.
fn default_literal(field: &MetaField) -> String {
    let int = |suffix: &str| {
        let value = match field.default {
            Some(Literal::Integer(value)) => value,
            _ => 0,
        };
        format!("{}{}", value, suffix)
    };
    let float = |suffix: &str| {
        let value = match field.default {
            Some(Literal::Float(value)) => value,
            Some(Literal::Integer(value)) => value as f64,
            _ => 0.0,
        };
        format!("{}{}", value, suffix)
    };
    match field.field_type {
        TypeTag::Bool => match field.default {
            Some(Literal::Bool(true)) => "true".to_string(),
            _ => "false".to_string(),
        },
        TypeTag::Char => match &field.default {
            Some(Literal::String(value)) if !value.is_empty() => {
                format!("'{}'", escape_char(value.chars().next().unwrap_or('\0')))
            }
            _ => "'\\0'".to_string(),
        },
        TypeTag::Uint8 => int("u8"),
        TypeTag::Int8 => int("i8"),
        TypeTag::Uint16 => int("u16"),
        TypeTag::Int16 => int("i16"),
        TypeTag::Uint32 => int("u32"),
        TypeTag::Int32 => int("i32"),
        TypeTag::Uint64 => int("u64"),
        TypeTag::Int64 => int("i64"),
        TypeTag::Float => float("f32"),
        TypeTag::Double => float("f64"),
        TypeTag::String => match &field.default {
            Some(Literal::String(value)) => format!("\"{}\"", escape_str(value)),
            _ => "\"\"".to_string(),
        },
        TypeTag::Bytes => match &field.default {
            Some(Literal::String(value)) => format!("b\"{}\"", escape_str(value)),
            _ => "b\"\"".to_string(),
        },
        TypeTag::Message => String::new(),
    }
}

fn escape_str(value: &str) -> String {
    value
        .chars()
        .flat_map(|c| escape_char(c).chars().collect::<Vec<_>>())
        .collect()
}

fn escape_char(c: char) -> String {
    match c {
        '"' => "\\\"".to_string(),
        '\\' => "\\\\".to_string(),
        '\n' => "\\n".to_string(),
        '\r' => "\\r".to_string(),
        '\t' => "\\t".to_string(),
        '\0' => "\\0".to_string(),
        '\'' => "\\'".to_string(),
        c => c.to_string(),
    }
}

/// Keywords that need a raw identifier prefix in generated code.
const RUST_KEYWORDS: &[&str] = &[
    "as", "async", "await", "become", "box", "break", "const", "continue", "crate", "do", "dyn",
    "else", "enum", "extern", "false", "final", "fn", "for", "if", "impl", "in", "let", "loop",
    "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref", "return", "static",
    "struct", "super", "trait", "true", "type", "typeof", "unsafe", "unsized", "use", "virtual",
    "where", "while", "yield",
];

fn sanitize_ident(ident: &str) -> String {
    if RUST_KEYWORDS.contains(&ident) {
        format!("r#{}", ident)
    } else {
        ident.to_string()
    }
}
