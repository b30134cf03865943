//! Field access on dynamic messages: construction, typed get/set with
//! validation, oneof bookkeeping and named accessors.

use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::codec::{invalid, CodecTable, ElementCodec, FieldCodec, RuntimeType};
use crate::error::EncodeError;
use crate::reflect::{Rule, Syntax};
use crate::types::ScalarType;
use crate::value::{MapKey, Message, Value};

/// `foo_bar_baz` to `fooBarBaz`.
pub fn to_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for (i, c) in name.chars().enumerate() {
        if c == '_' && i > 0 {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// `fooBarBaz` to `foo_bar_baz`.
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// A handle bound to one field of a runtime type.
#[derive(Debug, Clone, Copy)]
pub struct Accessor<'t> {
    ty:    &'t RuntimeType,
    field: usize,
}

impl<'t> Accessor<'t> {
    pub fn field(&self) -> &'t FieldCodec {
        &self.ty.fields()[self.field]
    }

    pub fn get<'m>(&self, message: &'m Message) -> Option<&'m Value> {
        message.get(self.field().id)
    }

    pub fn set(&self, message: &mut Message, value: Value) -> Result<(), EncodeError> {
        self.ty.set_at(message, self.field, value)
    }
}

impl RuntimeType {
    /// A fresh instance: repeated fields hold an empty list, map fields an
    /// empty map, and required or proto3 singular scalars their default.
    pub fn new_message(&self) -> Message {
        let codec = self.codec();
        let mut message = Message::new(codec.name.clone());
        for field in &codec.fields {
            match field.rule {
                Rule::Repeated => {
                    message.insert(field.id, Value::List(Vec::new()));
                }
                Rule::Map => {
                    message.insert(field.id, Value::Map(BTreeMap::new()));
                }
                rule if field.oneof.is_none() => {
                    let eager = rule == Rule::Required || codec.syntax == Syntax::Proto3;
                    if let (true, Some(default)) = (eager, field.default.as_ref()) {
                        message.insert(field.id, default.clone());
                    }
                }
                _ => {}
            }
        }
        message
    }

    /// Looks a field up by any accessor alias, `None` when accessors are
    /// disabled or the name is unknown.
    pub fn accessor(&self, name: &str) -> Option<Accessor<'_>> {
        let field = *self.codec().accessors.get(name)?;
        Some(Accessor { ty: self, field })
    }

    pub fn get<'m>(&self, message: &'m Message, name: &str) -> Option<&'m Value> {
        message.get(self.field(name)?.id)
    }

    /// The stored value, or the field's schema default when unset.
    pub fn get_or_default(&self, message: &Message, name: &str) -> Option<Value> {
        let field = self.field(name)?;
        message.get(field.id).cloned().or_else(|| field.default.clone())
    }

    pub fn has(&self, message: &Message, name: &str) -> bool {
        self.field(name).map_or(false, |field| message.contains(field.id))
    }

    /// Validates, coerces and stores `value`, clearing other members of the
    /// field's oneof.
    pub fn set(&self, message: &mut Message, name: &str, value: Value) -> Result<(), EncodeError> {
        let field = self.field_index(message, name)?;
        self.set_at(message, field, value)
    }

    /// Appends one element to a repeated field.
    pub fn add(&self, message: &mut Message, name: &str, value: Value) -> Result<(), EncodeError> {
        let ix = self.field_index(message, name)?;
        let field = &self.fields()[ix];
        if !field.is_repeated() {
            return Err(invalid(field, "add on a non-repeated field"));
        }
        let value = self.table().verify_element(field, &value)?.into_owned();
        match message.get_mut(field.id) {
            Some(Value::List(items)) => items.push(value),
            _ => {
                message.insert(field.id, Value::List(vec![value]));
            }
        }
        Ok(())
    }

    pub fn clear(&self, message: &mut Message, name: &str) -> Result<(), EncodeError> {
        let ix = self.field_index(message, name)?;
        message.remove(self.fields()[ix].id);
        Ok(())
    }

    /// Name of the member currently set in `oneof`.
    pub fn which_oneof<'s>(&'s self, message: &Message, oneof: &str) -> Option<&'s str> {
        let codec = self.codec();
        let oneof = codec.oneofs.iter().find(|o| o.name == oneof)?;
        oneof
            .members
            .iter()
            .map(|&ix| &codec.fields[ix])
            .find(|field| message.contains(field.id))
            .map(|field| field.name.as_str())
    }

    fn field_index(&self, message: &Message, name: &str) -> Result<usize, EncodeError> {
        self.check_type(message)?;
        self.codec().field_index(name).ok_or_else(|| EncodeError::UnknownField {
            message: self.name().to_owned(),
            field:   name.to_owned(),
        })
    }

    pub(crate) fn set_at(&self, message: &mut Message, ix: usize, value: Value) -> Result<(), EncodeError> {
        self.check_type(message)?;
        let codec = self.codec();
        let field = &codec.fields[ix];
        let value = self.table().verify(field, &value)?.into_owned();
        if let Some(oneof) = field.oneof {
            for &member in &codec.oneofs[oneof].members {
                message.remove(codec.fields[member].id);
            }
        }
        message.insert(field.id, value);
        Ok(())
    }
}

impl CodecTable {
    /// Checks `value` against the field's declared shape, converting it where
    /// a lossless coercion exists.
    pub(crate) fn verify<'v>(&self, field: &FieldCodec, value: &'v Value) -> Result<Cow<'v, Value>, EncodeError> {
        match (field.rule, value) {
            (Rule::Repeated, Value::List(items)) => {
                let mut coerced = Vec::new();
                let mut changed = false;
                for item in items {
                    let item = self.verify_element(field, item)?;
                    changed |= matches!(item, Cow::Owned(_));
                    coerced.push(item.into_owned());
                }
                Ok(if changed { Cow::Owned(Value::List(coerced)) } else { Cow::Borrowed(value) })
            }
            (Rule::Map, Value::Map(entries)) => {
                let key = field.key.ok_or_else(|| invalid(field, "map field without key type"))?;
                let mut coerced = BTreeMap::new();
                let mut changed = false;
                for (k, v) in entries {
                    if k.to_value(key.scalar).is_none() {
                        return Err(invalid(field, &format!("key {} does not fit {}", k, key.scalar)));
                    }
                    let v = self.verify_element(field, v)?;
                    changed |= matches!(v, Cow::Owned(_));
                    coerced.insert(k.clone(), v.into_owned());
                }
                Ok(if changed { Cow::Owned(Value::Map(coerced)) } else { Cow::Borrowed(value) })
            }
            (Rule::Repeated, _) => Err(invalid(field, &format!("expected a list, got {}", value.kind()))),
            (Rule::Map, _) => Err(invalid(field, &format!("expected a map, got {}", value.kind()))),
            _ => self.verify_element(field, value),
        }
    }

    pub(crate) fn verify_element<'v>(&self, field: &FieldCodec, value: &'v Value) -> Result<Cow<'v, Value>, EncodeError> {
        match field.element {
            ElementCodec::Scalar(codec) => verify_scalar(field, codec.scalar, value),
            ElementCodec::Enum(ref def) => {
                let number = match *value {
                    Value::String(ref name) => def
                        .value(name)
                        .ok_or_else(|| invalid(field, &format!("{} has no value named {}", def.name, name)))?,
                    _ => value
                        .as_i32()
                        .ok_or_else(|| invalid(field, &format!("expected {}, got {}", def.name, value.kind())))?,
                };
                if !def.open && def.name_of(number).is_none() {
                    return Err(invalid(field, &format!("{} has no value {}", def.name, number)));
                }
                Ok(match *value {
                    Value::Enum(_) => Cow::Borrowed(value),
                    _ => Cow::Owned(Value::Enum(number)),
                })
            }
            ElementCodec::Message(ix) | ElementCodec::Group(ix) => {
                let codec = &self.messages[ix];
                if let Value::Message(ref message) = *value {
                    if message.type_name() == codec.name {
                        return Ok(Cow::Borrowed(value));
                    }
                }
                let translated = match (codec.translator.as_ref(), value) {
                    (Some(translator), _) => translator.encode(value)?,
                    (None, Value::Message(message)) => message.clone(),
                    (None, _) => return Err(invalid(field, &format!("expected {}, got {}", codec.name, value.kind()))),
                };
                if translated.type_name() != codec.name {
                    return Err(EncodeError::TypeMismatch {
                        expected: codec.name.clone(),
                        actual:   translated.type_name().to_owned(),
                    });
                }
                Ok(Cow::Owned(Value::Message(translated)))
            }
        }
    }
}

fn verify_scalar<'v>(field: &FieldCodec, scalar: ScalarType, value: &'v Value) -> Result<Cow<'v, Value>, EncodeError> {
    use ScalarType::*;

    let coerced = match (scalar, value) {
        (Int32 | Sint32 | Sfixed32, Value::Int32(_))
        | (Uint32 | Fixed32, Value::Uint32(_))
        | (Int64 | Sint64 | Sfixed64, Value::Int64(_))
        | (Uint64 | Fixed64, Value::Uint64(_))
        | (Bool, Value::Bool(_))
        | (Float, Value::Float(_))
        | (Double, Value::Double(_))
        | (String, Value::String(_))
        | (Bytes, Value::Bytes(_)) => return Ok(Cow::Borrowed(value)),

        (Int32 | Sint32 | Sfixed32, Value::String(s)) => s.trim().parse().ok().map(Value::Int32),
        (Int32 | Sint32 | Sfixed32, _) => value.as_i32().map(Value::Int32),
        (Uint32 | Fixed32, Value::String(s)) => s.trim().parse().ok().map(Value::Uint32),
        (Uint32 | Fixed32, _) => value.as_u32().map(Value::Uint32),
        (Int64 | Sint64 | Sfixed64, Value::String(s)) => s.trim().parse().ok().map(Value::Int64),
        (Int64 | Sint64 | Sfixed64, _) => value.as_i64().map(Value::Int64),
        (Uint64 | Fixed64, Value::String(s)) => s.trim().parse().ok().map(Value::Uint64),
        (Uint64 | Fixed64, _) => value.as_u64().map(Value::Uint64),
        (Float, _) => value.as_f64().map(|v| Value::Float(v as f32)),
        (Double, _) => value.as_f64().map(Value::Double),
        (Bytes, Value::String(s)) => Some(Value::Bytes(s.as_bytes().to_vec())),
        (Bool | String | Bytes, _) => None,
    };

    coerced
        .map(Cow::Owned)
        .ok_or_else(|| invalid(field, &format!("{} value does not fit {}", value.kind(), scalar)))
}

impl MapKey {
    /// Parses a key from its string form, as used for JSON object keys.
    pub fn parse(text: &str, scalar: ScalarType) -> Option<MapKey> {
        match scalar {
            ScalarType::Bool => match text {
                "true" => Some(MapKey::Bool(true)),
                "false" => Some(MapKey::Bool(false)),
                _ => None,
            },
            ScalarType::String => Some(MapKey::String(text.to_owned())),
            ScalarType::Uint32 | ScalarType::Fixed32 | ScalarType::Uint64 | ScalarType::Fixed64 => {
                text.parse().ok().map(MapKey::Uint)
            }
            _ => text.parse().ok().map(MapKey::Int),
        }
        .filter(|key| key.to_value(scalar).is_some())
    }
}
