use std::collections::BTreeMap;
use std::fmt;
use std::ops::Index;

use crate::types::ScalarType;

/// This type holds dynamic protobuf data.
///
/// Values can represent any field content of a resolved schema and are
/// converted to and from wire bytes by a [RuntimeType](crate::RuntimeType).
/// Enum values are stored by number; nested messages are owned, so a value
/// never borrows from the buffer it was decoded from or from the schema.
#[derive(Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Uint64(u64),
    Float(f32),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Enum(i32),
    Message(Message),
    List(Vec<Value>),
    Map(BTreeMap<MapKey, Value>),
}

/// The key of a map entry. Map keys are restricted to integral, boolean and
/// string scalars, which all order and compare exactly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapKey {
    Bool(bool),
    Int(i64),
    Uint(u64),
    String(String),
}

impl MapKey {
    /// Builds a key out of a scalar value, or `None` if the value kind can't
    /// key a map.
    pub fn from_value(value: &Value) -> Option<MapKey> {
        match *value {
            Value::Bool(value) => Some(MapKey::Bool(value)),
            Value::Int32(value) => Some(MapKey::Int(value as i64)),
            Value::Int64(value) => Some(MapKey::Int(value)),
            Value::Uint32(value) => Some(MapKey::Uint(value as u64)),
            Value::Uint64(value) => Some(MapKey::Uint(value)),
            Value::String(ref value) => Some(MapKey::String(value.clone())),
            _ => None,
        }
    }

    /// Converts the key back into the value representation of `scalar`.
    /// Returns `None` when the key does not fit the scalar.
    pub fn to_value(&self, scalar: ScalarType) -> Option<Value> {
        match (self, scalar) {
            (MapKey::Bool(b), ScalarType::Bool) => Some(Value::Bool(*b)),
            (MapKey::String(s), ScalarType::String) => Some(Value::String(s.clone())),
            (MapKey::Int(n), ScalarType::Int32 | ScalarType::Sint32 | ScalarType::Sfixed32) => {
                i32::try_from(*n).ok().map(Value::Int32)
            }
            (MapKey::Uint(n), ScalarType::Int32 | ScalarType::Sint32 | ScalarType::Sfixed32) => {
                i32::try_from(*n).ok().map(Value::Int32)
            }
            (MapKey::Int(n), ScalarType::Int64 | ScalarType::Sint64 | ScalarType::Sfixed64) => {
                Some(Value::Int64(*n))
            }
            (MapKey::Uint(n), ScalarType::Int64 | ScalarType::Sint64 | ScalarType::Sfixed64) => {
                i64::try_from(*n).ok().map(Value::Int64)
            }
            (MapKey::Int(n), ScalarType::Uint32 | ScalarType::Fixed32) => {
                u32::try_from(*n).ok().map(Value::Uint32)
            }
            (MapKey::Uint(n), ScalarType::Uint32 | ScalarType::Fixed32) => {
                u32::try_from(*n).ok().map(Value::Uint32)
            }
            (MapKey::Int(n), ScalarType::Uint64 | ScalarType::Fixed64) => {
                u64::try_from(*n).ok().map(Value::Uint64)
            }
            (MapKey::Uint(n), ScalarType::Uint64 | ScalarType::Fixed64) => Some(Value::Uint64(*n)),
            _ => None,
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MapKey::Bool(value) => value.fmt(f),
            MapKey::Int(value) => value.fmt(f),
            MapKey::Uint(value) => value.fmt(f),
            MapKey::String(value) => f.write_str(value),
        }
    }
}

impl Value {
    /// A convenience method to extract the value out of a [Bool](#variant.Bool).
    /// Returns `false` for other value kinds.
    pub fn as_bool(&self) -> bool {
        match *self {
            Value::Bool(value) => value,
            _ => false,
        }
    }

    /// Extracts any integral value that fits an `i32`, including enum numbers.
    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            Value::Int32(value) | Value::Enum(value) => Some(value),
            Value::Uint32(value) => i32::try_from(value).ok(),
            Value::Int64(value) => i32::try_from(value).ok(),
            Value::Uint64(value) => i32::try_from(value).ok(),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            Value::Uint32(value) => Some(value),
            Value::Int32(value) | Value::Enum(value) => u32::try_from(value).ok(),
            Value::Int64(value) => u32::try_from(value).ok(),
            Value::Uint64(value) => u32::try_from(value).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int32(value) | Value::Enum(value) => Some(value as i64),
            Value::Uint32(value) => Some(value as i64),
            Value::Int64(value) => Some(value),
            Value::Uint64(value) => i64::try_from(value).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::Int32(value) | Value::Enum(value) => u64::try_from(value).ok(),
            Value::Uint32(value) => Some(value as u64),
            Value::Int64(value) => u64::try_from(value).ok(),
            Value::Uint64(value) => Some(value),
            _ => None,
        }
    }

    /// Extracts any numeric value as a double.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float(value) => Some(value as f64),
            Value::Double(value) => Some(value),
            Value::Int32(value) => Some(value as f64),
            Value::Uint32(value) => Some(value as f64),
            Value::Int64(value) => Some(value as f64),
            Value::Uint64(value) => Some(value as f64),
            _ => None,
        }
    }

    /// A convenience method to extract the value out of a [String](#variant.String).
    /// Returns `""` for other value kinds.
    pub fn as_str(&self) -> &str {
        match *self {
            Value::String(ref value) => value.as_str(),
            _ => "",
        }
    }

    /// A convenience method to extract the value out of a [Bytes](#variant.Bytes).
    /// Returns an empty slice for other value kinds.
    pub fn as_bytes(&self) -> &[u8] {
        match *self {
            Value::Bytes(ref value) => value.as_slice(),
            _ => &[],
        }
    }

    pub fn as_message(&self) -> Option<&Message> {
        match *self {
            Value::Message(ref message) => Some(message),
            _ => None,
        }
    }

    /// A convenience method to get a list of values out of a [List](#variant.List).
    /// Returns an empty slice for other value kinds.
    pub fn as_list(&self) -> &[Value] {
        match *self {
            Value::List(ref values) => values.as_slice(),
            _ => &[],
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<MapKey, Value>> {
        match *self {
            Value::Map(ref entries) => Some(entries),
            _ => None,
        }
    }

    /// Length of a list or map. Returns `0` for other value kinds.
    pub fn len(&self) -> usize {
        match *self {
            Value::List(ref values) => values.len(),
            Value::Map(ref entries) => entries.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A convenience method to append to a [List](#variant.List). Does
    /// nothing for other value kinds.
    pub fn push(&mut self, value: Value) {
        if let Value::List(ref mut values) = *self {
            values.push(value);
        }
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match *self {
            Value::Bool(_) => "bool",
            Value::Int32(_) => "int32",
            Value::Uint32(_) => "uint32",
            Value::Int64(_) => "int64",
            Value::Uint64(_) => "uint64",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Enum(_) => "enum",
            Value::Message(_) => "message",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }
}

impl Index<usize> for Value {
    type Output = Value;

    /// A convenience method that adds support for `self[index]` expressions.
    /// It will panic if this value isn't a [List](#variant.List) or if the
    /// provided index is out of bounds.
    fn index(&self, index: usize) -> &Value {
        match *self {
            Value::List(ref values) => &values[index],
            _ => panic!("cannot index into a {} value", self.kind()),
        }
    }
}

impl From<Message> for Value {
    fn from(message: Message) -> Value {
        Value::Message(message)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match *self {
            Value::Bool(value) => value.fmt(f),
            Value::Int32(value) => value.fmt(f),
            Value::Uint32(value) => value.fmt(f),
            Value::Int64(value) => value.fmt(f),
            Value::Uint64(value) => value.fmt(f),
            Value::Float(value) => value.fmt(f),
            Value::Double(value) => value.fmt(f),
            Value::String(ref value) => value.fmt(f),
            Value::Bytes(ref value) => write!(f, "b{:?}", value),
            Value::Enum(value) => write!(f, "#{}", value),
            Value::Message(ref message) => message.fmt(f),
            Value::List(ref values) => values.fmt(f),
            Value::Map(ref entries) => entries.fmt(f),
        }
    }
}

/// A runtime instance of a message type.
///
/// Field storage is keyed by field id. A field that is absent from the
/// storage is unset; whether an unset field reads as its default is decided
/// by the [RuntimeType](crate::RuntimeType) that owns the schema.
#[derive(Clone, PartialEq)]
pub struct Message {
    type_name: String,
    fields: BTreeMap<u32, Value>,
    unknown_fields: Vec<u8>,
}

impl Message {
    /// Creates an empty instance of the message type with the given full name.
    pub fn new(type_name: impl Into<String>) -> Message {
        Message {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
            unknown_fields: Vec::new(),
        }
    }

    /// Full name of the message type, without a leading dot.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn get(&self, id: u32) -> Option<&Value> {
        self.fields.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Value> {
        self.fields.get_mut(&id)
    }

    /// Stores a value without any validation. Prefer the checked setters on
    /// [RuntimeType](crate::RuntimeType).
    pub fn insert(&mut self, id: u32, value: Value) -> Option<Value> {
        self.fields.insert(id, value)
    }

    pub fn remove(&mut self, id: u32) -> Option<Value> {
        self.fields.remove(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.fields.contains_key(&id)
    }

    /// Iterates set fields in ascending id order.
    pub fn fields(&self) -> impl Iterator<Item = (u32, &Value)> {
        self.fields.iter().map(|(id, value)| (*id, value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.unknown_fields.is_empty()
    }

    /// Raw tag and payload bytes of fields the schema did not know, kept only
    /// when unknown-field retention is enabled.
    pub fn unknown_fields(&self) -> &[u8] {
        &self.unknown_fields
    }

    pub fn push_unknown(&mut self, raw: &[u8]) {
        self.unknown_fields.extend_from_slice(raw);
    }

    pub fn clear_unknown(&mut self) {
        self.unknown_fields.clear();
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(f, "{} {{", self.type_name)?;
        let mut first = true;
        for (id, value) in &self.fields {
            if first {
                first = false;
            } else {
                write!(f, ", ")?;
            }
            write!(f, "{}: {:?}", id, value)?;
        }
        if !self.unknown_fields.is_empty() {
            write!(f, " +{} unknown bytes", self.unknown_fields.len())?;
        }
        write!(f, "}}")
    }
}
