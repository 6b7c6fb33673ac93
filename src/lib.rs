//! A lightweight middleware for exchanging typed, self-describing messages
//! between processes on the same host and across hosts.
//!
//! The core pieces:
//!
//! - [`parser`]: parses `.odvd` message specifications into [`MetaMessage`]
//!   descriptors.
//! - [`visitor`]: the traversal contract every message (generated or
//!   runtime-typed) exposes to encoders and decoders.
//! - [`proto`]: a Protobuf-compatible (proto2 semantics) binary codec.
//! - [`json`]: a JSON encoder fed by the same traversal.
//! - [`generic`]: [`GenericMessage`], binding a runtime-parsed schema to
//!   decoded payloads so unknown types can be transcoded.
//! - [`envelope`]: the well-known [`Envelope`] container and its optional
//!   five-byte transport framing.
//! - [`lcm`]: a bridge decoding LCM datagrams into [`GenericMessage`]s.
//! - [`udp`]: thin UDP send/receive convenience wrappers.
//! - [`sharedmemory`] (Unix only): a named region with a cross-process
//!   mutex and condition variable.
//!
//! # Example
//!
//! Transcode a serialized Envelope into JSON without compile-time knowledge
//! of the payload type:
//!
//! ```
//! use cluon::{envelope, parser};
//!
//! let (corpus, result) = parser::parse(
//!     "message demo.Count [id = 1001] { uint32 value [id = 1]; }",
//! );
//! assert!(result.is_ok());
//!
//! let mut env = cluon::Envelope::default();
//! env.set_data_type(1001);
//! env.set_serialized_data(vec![0x08, 0x2A]); // value = 42
//!
//! let json = envelope::envelope_to_json(&corpus, &mut env);
//! assert!(json.contains("\"demo_Count\":{\"value\":42}"));
//! ```

pub mod encoding;
pub mod envelope;
pub mod generic;
pub mod json;
pub mod lcm;
pub mod meta;
pub mod parser;
pub mod proto;
#[cfg(unix)]
pub mod sharedmemory;
pub mod udp;
pub mod visitor;

mod error;

pub use crate::envelope::{Envelope, TimeStamp};
pub use crate::error::DecodeError;
pub use crate::generic::{GenericMessage, Value};
pub use crate::json::JsonEncoder;
pub use crate::lcm::LcmToGenericMessage;
pub use crate::meta::{Literal, MetaField, MetaMessage, TypeTag};
pub use crate::parser::{ParseError, ParseErrorKind};
pub use crate::proto::{ProtoDecoder, ProtoEncoder};
#[cfg(unix)]
pub use crate::sharedmemory::SharedMemory;
pub use crate::udp::{UdpReceiver, UdpSender};
pub use crate::visitor::{Visitable, Visitor};
