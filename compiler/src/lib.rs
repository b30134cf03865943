//! brine-proto-compiler
//!
//! This crate implements:
//!  1) A tokenizer + recursive descent parser for `.proto` schema text,
//!  2) The schema AST, also accepted in JSON form,
//!  3) The namespace resolver (`Builder`): import, lookup, extensions, defaults,
//!  4) A verifier for ids, names, map keys, enums and services,
//!  5) The `ProtoError` type.

pub mod error;
pub mod types;
pub mod utils;
pub mod tokenizer;
pub mod parser;
pub mod resolver;
pub mod verifier;
pub mod compiler;

pub use compiler::{compile_json_schema, compile_schema, compile_schema_with};
pub use error::ProtoError;
pub use parser::parse_schema;
pub use resolver::Builder;
pub use types::Schema;
