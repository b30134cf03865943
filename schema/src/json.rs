//! JSON projection of dynamic messages.
//!
//! 64-bit integers travel as strings so they survive JSON number precision,
//! bytes as lowercase hex, enums by value name and non-finite floats as
//! `"NaN"`, `"Infinity"` or `"-Infinity"`.

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value as Json};

use crate::codec::{invalid, CodecTable, ElementCodec, FieldCodec, RuntimeType};
use crate::error::EncodeError;
use crate::reflect::Rule;
use crate::types::ScalarType;
use crate::value::{MapKey, Message, Value};

impl RuntimeType {
    pub fn to_json(&self, message: &Message) -> Json {
        self.table().message_to_json(self.codec_index(), message)
    }

    /// Builds an instance from a JSON object keyed by field name or accessor
    /// alias. `null` members are treated as unset.
    pub fn from_json(&self, json: &Json) -> Result<Message, EncodeError> {
        self.table().message_from_json(self.codec_index(), json)
    }
}

impl CodecTable {
    fn message_to_json(&self, ix: usize, message: &Message) -> Json {
        let codec = &self.messages[ix];
        let mut object = Map::new();
        for field in &codec.fields {
            if let Some(value) = message.get(field.id) {
                object.insert(field.name.clone(), self.field_to_json(field, value));
            }
        }
        Json::Object(object)
    }

    fn field_to_json(&self, field: &FieldCodec, value: &Value) -> Json {
        match *value {
            Value::List(ref items) => Json::Array(items.iter().map(|item| self.element_to_json(field, item)).collect()),
            Value::Map(ref entries) => Json::Object(
                entries
                    .iter()
                    .map(|(key, value)| (key.to_string(), self.element_to_json(field, value)))
                    .collect(),
            ),
            _ => self.element_to_json(field, value),
        }
    }

    fn element_to_json(&self, field: &FieldCodec, value: &Value) -> Json {
        match (&field.element, value) {
            (ElementCodec::Enum(def), Value::Enum(n)) => match def.name_of(*n) {
                Some(name) => Json::String(name.to_owned()),
                None => Json::from(*n),
            },
            (ElementCodec::Message(ix) | ElementCodec::Group(ix), Value::Message(message))
                if message.type_name() == self.messages[*ix].name =>
            {
                self.message_to_json(*ix, message)
            }
            _ => value_to_json(value),
        }
    }

    fn message_from_json(&self, ix: usize, json: &Json) -> Result<Message, EncodeError> {
        let codec = &self.messages[ix];
        let object = json.as_object().ok_or_else(|| EncodeError::TypeMismatch {
            expected: codec.name.clone(),
            actual:   json_kind(json).to_owned(),
        })?;

        let mut message = Message::new(codec.name.clone());
        for (name, member) in object {
            let field_ix = codec
                .field_index(name)
                .or_else(|| codec.accessors.get(name).copied())
                .ok_or_else(|| EncodeError::UnknownField {
                    message: codec.name.clone(),
                    field:   name.clone(),
                })?;
            let field = &codec.fields[field_ix];
            if member.is_null() {
                continue;
            }
            if let Some(oneof) = field.oneof {
                let oneof = &codec.oneofs[oneof];
                if oneof.members.iter().any(|&m| message.contains(codec.fields[m].id)) {
                    return Err(invalid(field, &format!("another member of oneof {} is already set", oneof.name)));
                }
            }
            let value = self.field_from_json(field, member)?;
            let value = self.verify(field, &value)?.into_owned();
            message.insert(field.id, value);
        }
        Ok(message)
    }

    fn field_from_json(&self, field: &FieldCodec, json: &Json) -> Result<Value, EncodeError> {
        match field.rule {
            Rule::Repeated => {
                let items = json.as_array().ok_or_else(|| invalid(field, "expected a JSON array"))?;
                items
                    .iter()
                    .map(|item| self.element_from_json(field, item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::List)
            }
            Rule::Map => {
                let key = field.key.ok_or_else(|| invalid(field, "map field without key type"))?;
                let object = json.as_object().ok_or_else(|| invalid(field, "expected a JSON object"))?;
                let mut entries = BTreeMap::new();
                for (text, member) in object {
                    let k = MapKey::parse(text, key.scalar)
                        .ok_or_else(|| invalid(field, &format!("key {:?} does not fit {}", text, key.scalar)))?;
                    entries.insert(k, self.element_from_json(field, member)?);
                }
                Ok(Value::Map(entries))
            }
            _ => self.element_from_json(field, json),
        }
    }

    fn element_from_json(&self, field: &FieldCodec, json: &Json) -> Result<Value, EncodeError> {
        match field.element {
            ElementCodec::Scalar(codec) => scalar_from_json(codec.scalar, json)
                .ok_or_else(|| invalid(field, &format!("JSON {} does not fit {}", json_kind(json), codec.scalar))),
            ElementCodec::Enum(_) => match *json {
                Json::String(ref name) => Ok(Value::String(name.clone())),
                Json::Number(ref n) => n
                    .as_i64()
                    .and_then(|n| i32::try_from(n).ok())
                    .map(Value::Enum)
                    .ok_or_else(|| invalid(field, "enum number out of range")),
                _ => Err(invalid(field, &format!("JSON {} is not an enum value", json_kind(json)))),
            },
            ElementCodec::Message(ix) | ElementCodec::Group(ix) => {
                self.message_from_json(ix, json).map(Value::Message)
            }
        }
    }
}

fn scalar_from_json(scalar: ScalarType, json: &Json) -> Option<Value> {
    match (scalar, json) {
        (ScalarType::Bool, Json::Bool(b)) => Some(Value::Bool(*b)),
        (ScalarType::String, Json::String(s)) => Some(Value::String(s.clone())),
        (ScalarType::Bytes, Json::String(s)) => hex::decode(s).ok().map(Value::Bytes),
        (ScalarType::Float | ScalarType::Double, Json::String(s)) => {
            let n = match s.as_str() {
                "NaN" => f64::NAN,
                "Infinity" => f64::INFINITY,
                "-Infinity" => f64::NEG_INFINITY,
                other => other.parse().ok()?,
            };
            Some(Value::Double(n))
        }
        (_, Json::String(s)) => Some(Value::String(s.clone())),
        (_, Json::Number(n)) => {
            if let Some(v) = n.as_i64() {
                Some(Value::Int64(v))
            } else if let Some(v) = n.as_u64() {
                Some(Value::Uint64(v))
            } else {
                n.as_f64().map(Value::Double)
            }
        }
        _ => None,
    }
}

fn float_to_json(n: f64) -> Json {
    if n.is_nan() {
        Json::String("NaN".into())
    } else if n.is_infinite() {
        Json::String(if n > 0.0 { "Infinity" } else { "-Infinity" }.into())
    } else {
        Number::from_f64(n).map_or(Json::Null, Json::Number)
    }
}

/// Schema-less rendering, used for values a translator produced. Messages
/// render with field ids as keys.
pub fn value_to_json(value: &Value) -> Json {
    match *value {
        Value::Bool(b) => Json::Bool(b),
        Value::Int32(n) | Value::Enum(n) => Json::from(n),
        Value::Uint32(n) => Json::from(n),
        Value::Int64(n) => Json::String(n.to_string()),
        Value::Uint64(n) => Json::String(n.to_string()),
        Value::Float(n) => float_to_json(n as f64),
        Value::Double(n) => float_to_json(n),
        Value::String(ref s) => Json::String(s.clone()),
        Value::Bytes(ref b) => Json::String(hex::encode(b)),
        Value::Message(ref message) => Json::Object(
            message
                .fields()
                .map(|(id, value)| (id.to_string(), value_to_json(value)))
                .collect(),
        ),
        Value::List(ref items) => Json::Array(items.iter().map(value_to_json).collect()),
        Value::Map(ref entries) => Json::Object(
            entries
                .iter()
                .map(|(key, value)| (key.to_string(), value_to_json(value)))
                .collect(),
        ),
    }
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}
