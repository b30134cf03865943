use brine_proto_schema::{BuildError, DecodeError, EncodeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse error at line {line}, column {column}: {msg}")]
    ParseError {
        msg:    String,
        line:   usize,
        column: usize,
    },

    #[error("Resolution error: {0}")]
    ResolveError(String),

    #[error("Unresolvable type reference {type_name} in field {field}")]
    UnresolvedType {
        type_name: String,
        field:     String,
    },

    #[error("Schema {0} has already been imported")]
    DuplicateImport(String),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}
