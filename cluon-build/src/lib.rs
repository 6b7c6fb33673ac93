//! `cluon-build` transforms `.odvd` message specifications into Rust sources
//! or `.proto` files.
//!
//! It is designed for build-time code generation as part of a Cargo build
//! script:
//!
//! ```no_run
//! // build.rs
//! fn main() {
//!     cluon_build::compile_odvd("src/messages.odvd").unwrap();
//! }
//! ```
//!
//! and in `lib.rs`:
//!
//! ```ignore
//! include!(concat!(env!("OUT_DIR"), "/messages.rs"));
//! ```
//!
//! The `cluon-msc` binary wraps the same generators for standalone use.

pub mod proto_generator;
pub mod rust_generator;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use cluon::meta::MetaMessage;
use cluon::parser;

/// Parses a specification file, mapping diagnostics onto `io::Error`.
pub fn parse_spec_file(input: impl AsRef<Path>) -> io::Result<Vec<MetaMessage>> {
    let input = input.as_ref();
    let spec = fs::read_to_string(input)?;
    let (messages, result) = parser::parse(&spec);
    result.map_err(|error| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{}: {}", input.display(), error),
        )
    })?;
    Ok(messages)
}

/// Compiles a `.odvd` file into Rust sources inside `OUT_DIR`, for use from
/// a build script. The output file carries the input's name with an `.rs`
/// extension.
pub fn compile_odvd(input: impl AsRef<Path>) -> io::Result<()> {
    let input = input.as_ref();
    let out_dir: PathBuf = std::env::var_os("OUT_DIR")
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "OUT_DIR is not set"))?
        .into();

    let messages = parse_spec_file(input)?;
    let stem = input
        .file_stem()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "input has no file name"))?;
    let target = out_dir.join(stem).with_extension("rs");
    fs::write(target, rust_generator::generate(&messages))
}
