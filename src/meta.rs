//! In-memory description of message types parsed from `.odvd` specifications.
//!
//! `MetaMessage` plays the role of a descriptor: the schema parser produces
//! them, the code generators consume them, and [`GenericMessage`] binds
//! decoded payloads against them at runtime.
//!
//! [`GenericMessage`]: crate::GenericMessage

use std::fmt;

/// The exhaustive set of field types a message specification can use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Bool,
    Char,
    Uint8,
    Int8,
    Uint16,
    Int16,
    Uint32,
    Int32,
    Uint64,
    Int64,
    Float,
    Double,
    String,
    Bytes,
    /// An embedded message; the referenced type's long name is carried in
    /// [`MetaField::message_type`].
    Message,
}

impl TypeTag {
    /// Resolves a type name from the specification language, e.g. `uint32`.
    ///
    /// Returns `None` for anything that is not a primitive type name; such
    /// names are treated as message type references by the parser.
    pub fn from_spec_name(name: &str) -> Option<TypeTag> {
        Some(match name {
            "bool" => TypeTag::Bool,
            "char" => TypeTag::Char,
            "uint8" => TypeTag::Uint8,
            "int8" => TypeTag::Int8,
            "uint16" => TypeTag::Uint16,
            "int16" => TypeTag::Int16,
            "uint32" => TypeTag::Uint32,
            "int32" => TypeTag::Int32,
            "uint64" => TypeTag::Uint64,
            "int64" => TypeTag::Int64,
            "float" => TypeTag::Float,
            "double" => TypeTag::Double,
            "string" => TypeTag::String,
            "bytes" => TypeTag::Bytes,
            _ => return None,
        })
    }

    /// The type name as written in a specification file.
    pub fn spec_name(&self) -> &'static str {
        match self {
            TypeTag::Bool => "bool",
            TypeTag::Char => "char",
            TypeTag::Uint8 => "uint8",
            TypeTag::Int8 => "int8",
            TypeTag::Uint16 => "uint16",
            TypeTag::Int16 => "int16",
            TypeTag::Uint32 => "uint32",
            TypeTag::Int32 => "int32",
            TypeTag::Uint64 => "uint64",
            TypeTag::Int64 => "int64",
            TypeTag::Float => "float",
            TypeTag::Double => "double",
            TypeTag::String => "string",
            TypeTag::Bytes => "bytes",
            TypeTag::Message => "message",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.spec_name())
    }
}

/// A default literal attached to a field declaration.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

/// A single field of a [`MetaMessage`].
#[derive(Clone, Debug, PartialEq)]
pub struct MetaField {
    /// Strictly positive numeric field identifier, unique within the message.
    pub field_identifier: u32,
    pub field_type: TypeTag,
    /// Field name as declared, lowercase by convention.
    pub name: String,
    /// Optional default literal; fields without one default to the type's
    /// zero value.
    pub default: Option<Literal>,
    /// Long name of the referenced message for `TypeTag::Message` fields.
    pub message_type: Option<String>,
}

impl MetaField {
    pub fn new(field_identifier: u32, field_type: TypeTag, name: impl Into<String>) -> MetaField {
        MetaField {
            field_identifier,
            field_type,
            name: name.into(),
            default: None,
            message_type: None,
        }
    }
}

/// A named message type with its numeric identifier and ordered fields.
#[derive(Clone, Debug, PartialEq)]
pub struct MetaMessage {
    /// Dotted package-qualified long name, e.g. `a.b.Foo`.
    pub name: String,
    /// 32-bit message identifier, globally unique in the user's namespace.
    pub message_identifier: u32,
    /// Fields in declaration order.
    pub fields: Vec<MetaField>,
}

impl MetaMessage {
    pub fn new(name: impl Into<String>, message_identifier: u32) -> MetaMessage {
        MetaMessage {
            name: name.into(),
            message_identifier,
            fields: Vec::new(),
        }
    }

    /// The unqualified type name, e.g. `Foo` for `a.b.Foo`.
    pub fn short_name(&self) -> &str {
        match self.name.rfind('.') {
            Some(idx) => &self.name[idx + 1..],
            None => &self.name,
        }
    }

    /// The package prefix, e.g. `a.b` for `a.b.Foo`; empty for unqualified
    /// names.
    pub fn package_name(&self) -> &str {
        match self.name.rfind('.') {
            Some(idx) => &self.name[..idx],
            None => "",
        }
    }

    /// Looks up a field by its numeric identifier.
    pub fn field(&self, field_identifier: u32) -> Option<&MetaField> {
        self.fields
            .iter()
            .find(|f| f.field_identifier == field_identifier)
    }
}
