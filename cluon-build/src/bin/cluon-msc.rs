//! Standalone message specification compiler.
//!
//! ```text
//! cluon-msc [--rust] [--proto] [--out=FILE] INPUT.odvd
//! ```
//!
//! Exits 0 on successful parse and generation, 1 otherwise.

use std::fs;
use std::process::ExitCode;

use cluon_build::{parse_spec_file, proto_generator, rust_generator};

struct Options {
    rust: bool,
    proto: bool,
    out: Option<String>,
    input: Option<String>,
}

fn usage(program: &str) {
    eprintln!("{} transforms a message specification file in .odvd format into Rust sources or a .proto file.", program);
    eprintln!("Usage:   {} [--rust] [--proto] [--out=<file>] <odvd file>", program);
    eprintln!("Example: {} --rust --out=/tmp/messages.rs messages.odvd", program);
}

fn parse_args(args: &[String]) -> Option<Options> {
    let mut options = Options {
        rust: false,
        proto: false,
        out: None,
        input: None,
    };
    for arg in args {
        if arg == "--rust" {
            options.rust = true;
        } else if arg == "--proto" {
            options.proto = true;
        } else if let Some(out) = arg.strip_prefix("--out=") {
            options.out = Some(out.to_string());
        } else if arg.starts_with("--") {
            return None;
        } else {
            options.input = Some(arg.clone());
        }
    }
    options.input.as_ref()?;
    Some(options)
}

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let program = args
        .first()
        .map(String::as_str)
        .unwrap_or("cluon-msc")
        .to_string();

    let options = match parse_args(&args[1..]) {
        Some(options) => options,
        None => {
            usage(&program);
            return ExitCode::FAILURE;
        }
    };
    let input = options.input.as_deref().unwrap_or_default();

    let messages = match parse_spec_file(input) {
        Ok(messages) => messages,
        Err(error) => {
            eprintln!("[{}] {}", program, error);
            return ExitCode::FAILURE;
        }
    };

    let mut content = String::new();
    if options.rust {
        content.push_str(&rust_generator::generate(&messages));
    }
    if options.proto {
        content.push_str(&proto_generator::generate(&messages));
    }

    match options.out {
        Some(out) => {
            if let Err(error) = fs::write(&out, content) {
                eprintln!("[{}] could not write '{}': {}", program, out, error);
                return ExitCode::FAILURE;
            }
        }
        None => print!("{}", content),
    }
    ExitCode::SUCCESS
}
