//! Uniform field traversal for statically generated and runtime-typed
//! messages.
//!
//! A message exposes its fields through [`Visitable::accept`], which drives a
//! [`Visitor`] with one strongly typed `visit_*` call per field. Every
//! visitor method has a no-op default body, so an implementation only claims
//! the capabilities it needs: an encoder implements the scalar visits, a
//! pretty-printer might only implement `pre_visit`/`post_visit`, a decoder
//! writes through the `&mut` value references.
//!
//! Scalar visits carry the field's declared default so that encoders can
//! elide fields that hold it. Nested message values are traversed by
//! recursing through their own `accept`, never by flattening them into the
//! outer traversal.

/// A message whose fields can be traversed by a [`Visitor`].
///
/// Generated message types implement this by construction;
/// [`GenericMessage`](crate::GenericMessage) implements it by dispatching
/// through its bound [`MetaMessage`](crate::MetaMessage).
pub trait Visitable {
    /// Full traversal: `pre_visit`, every field in schema declaration order,
    /// `post_visit`.
    fn accept(&mut self, visitor: &mut dyn Visitor);

    /// Targeted traversal: visits only the field with the given identifier,
    /// without `pre_visit`/`post_visit`. Unknown identifiers visit nothing.
    fn accept_field(&mut self, field_identifier: u32, visitor: &mut dyn Visitor);
}

/// The capability set invoked by a message's `accept` methods.
#[allow(unused_variables)]
pub trait Visitor {
    /// Called once before a full traversal with the message's numeric
    /// identifier, short name, and package-qualified long name.
    fn pre_visit(&mut self, message_identifier: u32, short_name: &str, long_name: &str) {}

    /// Called once after a full traversal.
    fn post_visit(&mut self) {}

    fn visit_bool(&mut self, tag: u32, name: &str, value: &mut bool, default: bool) {}
    fn visit_char(&mut self, tag: u32, name: &str, value: &mut char, default: char) {}
    fn visit_u8(&mut self, tag: u32, name: &str, value: &mut u8, default: u8) {}
    fn visit_i8(&mut self, tag: u32, name: &str, value: &mut i8, default: i8) {}
    fn visit_u16(&mut self, tag: u32, name: &str, value: &mut u16, default: u16) {}
    fn visit_i16(&mut self, tag: u32, name: &str, value: &mut i16, default: i16) {}
    fn visit_u32(&mut self, tag: u32, name: &str, value: &mut u32, default: u32) {}
    fn visit_i32(&mut self, tag: u32, name: &str, value: &mut i32, default: i32) {}
    fn visit_u64(&mut self, tag: u32, name: &str, value: &mut u64, default: u64) {}
    fn visit_i64(&mut self, tag: u32, name: &str, value: &mut i64, default: i64) {}
    fn visit_f32(&mut self, tag: u32, name: &str, value: &mut f32, default: f32) {}
    fn visit_f64(&mut self, tag: u32, name: &str, value: &mut f64, default: f64) {}
    fn visit_string(&mut self, tag: u32, name: &str, value: &mut String, default: &str) {}
    fn visit_bytes(&mut self, tag: u32, name: &str, value: &mut Vec<u8>, default: &[u8]) {}

    /// Visits an embedded message. Implementations that care about the value
    /// recurse via `value.accept(..)` with a visitor of their choosing.
    fn visit_message(&mut self, tag: u32, name: &str, value: &mut dyn Visitable) {}
}
