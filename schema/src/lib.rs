//! Runtime half of brine-proto: the protocol buffer wire cursor, the scalar
//! type registry, the reflection tree a schema resolves into, dynamic
//! messages, and the codec that moves messages to and from wire bytes.
//!
//! Schemas are normally parsed and resolved by `brine-proto-compiler`; the
//! tree can also be assembled by hand:
//!
//! ```
//! use std::sync::Arc;
//! use brine_proto_schema::*;
//!
//! let mut tree = NamespaceTree::new();
//! let mut point = MessageDef::default();
//! point.fields.push(FieldDef::new("x", 1, Rule::Optional, TypeRef::Scalar(ScalarType::Int32)));
//! point.fields.push(FieldDef::new("y", 2, Rule::Optional, TypeRef::Scalar(ScalarType::Sint32)));
//! point.state = ResolveState::Resolved;
//! let id = tree.add_child(tree.root(), "Point", NodeKind::Message(point)).unwrap();
//!
//! let ty = RuntimeType::build(Arc::new(tree), id, Options::default()).unwrap();
//! let mut message = ty.new_message();
//! ty.set(&mut message, "x", Value::Int32(150)).unwrap();
//! ty.set(&mut message, "y", Value::Int32(-1)).unwrap();
//!
//! let bytes = ty.encode(&message).unwrap();
//! assert_eq!(bytes, [0x08, 0x96, 0x01, 0x10, 0x01]);
//! assert_eq!(format!("{:?}", ty.decode(&bytes).unwrap()), "Point {1: 150, 2: -1}");
//! ```

pub mod accessor;
pub mod bb;
pub mod codec;
pub mod error;
pub mod json;
pub mod options;
pub mod reflect;
pub mod types;
pub mod value;

pub use accessor::{to_camel_case, to_snake_case, Accessor};
pub use bb::*;
pub use codec::{skip_field, ElementCodec, RECURSION_LIMIT, EnumCodec, FieldCodec, OneofCodec, RuntimeType, ScalarCodec};
pub use error::*;
pub use json::value_to_json;
pub use options::{Options, Translator};
pub use reflect::*;
pub use types::*;
pub use value::*;
