use thiserror::Error;

use crate::types::WireType;

/// Raised while turning a [Message](crate::Message) into wire bytes, or while
/// assigning a value through an accessor.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("Missing required field {field} of {message}")]
    MissingRequired {
        message: String,
        field:   String,
    },

    #[error("Illegal value for {field}: {reason}")]
    InvalidValue {
        field:  String,
        reason: String,
    },

    #[error("{message} has no field named {field}")]
    UnknownField {
        message: String,
        field:   String,
    },

    #[error("Expected a message of type {expected} but got {actual}")]
    TypeMismatch {
        expected: String,
        actual:   String,
    },
}

/// Raised while reading wire bytes. Decoding never yields a partial message;
/// the first error aborts the whole call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("Unexpected end of buffer: needed {needed} bytes but only {remaining} remain")]
    Truncated {
        needed:    usize,
        remaining: usize,
    },

    #[error("Varint is longer than 10 bytes")]
    VarintOverflow,

    #[error("Invalid wire type {0}")]
    InvalidWireType(u32),

    #[error("Invalid field id {0}")]
    InvalidFieldId(u32),

    #[error("Illegal wire type {actual} for field {field} (expected {expected})")]
    WireTypeMismatch {
        field:    String,
        expected: WireType,
        actual:   WireType,
    },

    #[error("Unexpected end group tag for field id {0}")]
    UnexpectedEndGroup(u32),

    #[error("Group with field id {0} is never closed")]
    UnterminatedGroup(u32),

    #[error("Message nesting exceeds {0} levels")]
    RecursionLimit(usize),

    #[error("Invalid UTF-8 in string value")]
    InvalidUtf8,

    #[error("Missing required field {field} of {message}")]
    MissingRequired {
        message: String,
        field:   String,
    },

    #[error("Translator for {message} failed: {reason}")]
    Translator {
        message: String,
        reason:  String,
    },
}

/// Raised by [RuntimeType::build](crate::RuntimeType::build) when the tree it
/// is handed is not fit for encoding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("No such type {0}")]
    NotFound(String),

    #[error("{0} is not a message type")]
    NotAMessage(String),

    #[error("Field {field} of {message} still references unresolved type {type_name}")]
    Unresolved {
        message:   String,
        field:     String,
        type_name: String,
    },

    #[error("Message {0} has not been resolved")]
    NotResolved(String),

    #[error("Field {field} of {message} has out of range id {id}")]
    IllegalId {
        message: String,
        field:   String,
        id:      i64,
    },
}
