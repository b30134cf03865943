//! The scalar type registry: one static descriptor per protobuf scalar name.

use std::fmt;

use crate::value::Value;

/// Smallest legal field id.
pub const ID_MIN: u32 = 1;

/// Largest legal field id (29 bits).
pub const ID_MAX: u32 = 0x1FFF_FFFF;

/// Ids in this band are reserved by the protobuf implementation itself.
pub const RESERVED_ID_RANGE: (u32, u32) = (19000, 19999);

/// The 3-bit suffix of every tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    Varint     = 0,
    Bits64     = 1,
    Ldelim     = 2,
    StartGroup = 3,
    EndGroup   = 4,
    Bits32     = 5,
}

/// Wire types whose repeated values may be packed into one length-delimited run.
pub const PACKABLE_WIRE_TYPES: [WireType; 3] = [WireType::Varint, WireType::Bits64, WireType::Bits32];

impl WireType {
    pub fn from_u32(value: u32) -> Option<WireType> {
        match value {
            0 => Some(WireType::Varint),
            1 => Some(WireType::Bits64),
            2 => Some(WireType::Ldelim),
            3 => Some(WireType::StartGroup),
            4 => Some(WireType::EndGroup),
            5 => Some(WireType::Bits32),
            _ => None,
        }
    }

    pub fn is_packable(self) -> bool {
        PACKABLE_WIRE_TYPES.contains(&self)
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            WireType::Varint     => "VARINT",
            WireType::Bits64     => "BITS64",
            WireType::Ldelim     => "LDELIM",
            WireType::StartGroup => "STARTGROUP",
            WireType::EndGroup   => "ENDGROUP",
            WireType::Bits32     => "BITS32",
        };
        write!(f, "{}({})", name, *self as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Int32,
    Uint32,
    Sint32,
    Int64,
    Uint64,
    Sint64,
    Bool,
    Double,
    String,
    Bytes,
    Fixed32,
    Sfixed32,
    Fixed64,
    Sfixed64,
    Float,
}

/// A row of the registry.
#[derive(Debug)]
pub struct TypeDescriptor {
    pub name:      &'static str,
    pub scalar:    ScalarType,
    pub wire_type: WireType,
}

pub static TYPES: [TypeDescriptor; 15] = [
    TypeDescriptor { name: "int32",    scalar: ScalarType::Int32,    wire_type: WireType::Varint },
    TypeDescriptor { name: "uint32",   scalar: ScalarType::Uint32,   wire_type: WireType::Varint },
    TypeDescriptor { name: "sint32",   scalar: ScalarType::Sint32,   wire_type: WireType::Varint },
    TypeDescriptor { name: "int64",    scalar: ScalarType::Int64,    wire_type: WireType::Varint },
    TypeDescriptor { name: "uint64",   scalar: ScalarType::Uint64,   wire_type: WireType::Varint },
    TypeDescriptor { name: "sint64",   scalar: ScalarType::Sint64,   wire_type: WireType::Varint },
    TypeDescriptor { name: "bool",     scalar: ScalarType::Bool,     wire_type: WireType::Varint },
    TypeDescriptor { name: "double",   scalar: ScalarType::Double,   wire_type: WireType::Bits64 },
    TypeDescriptor { name: "string",   scalar: ScalarType::String,   wire_type: WireType::Ldelim },
    TypeDescriptor { name: "bytes",    scalar: ScalarType::Bytes,    wire_type: WireType::Ldelim },
    TypeDescriptor { name: "fixed32",  scalar: ScalarType::Fixed32,  wire_type: WireType::Bits32 },
    TypeDescriptor { name: "sfixed32", scalar: ScalarType::Sfixed32, wire_type: WireType::Bits32 },
    TypeDescriptor { name: "fixed64",  scalar: ScalarType::Fixed64,  wire_type: WireType::Bits64 },
    TypeDescriptor { name: "sfixed64", scalar: ScalarType::Sfixed64, wire_type: WireType::Bits64 },
    TypeDescriptor { name: "float",    scalar: ScalarType::Float,    wire_type: WireType::Bits32 },
];

/// Scalars allowed as map keys.
pub const MAP_KEY_TYPES: [ScalarType; 12] = [
    ScalarType::Int32,
    ScalarType::Sint32,
    ScalarType::Sfixed32,
    ScalarType::Uint32,
    ScalarType::Fixed32,
    ScalarType::Int64,
    ScalarType::Sint64,
    ScalarType::Sfixed64,
    ScalarType::Uint64,
    ScalarType::Fixed64,
    ScalarType::Bool,
    ScalarType::String,
];

impl ScalarType {
    /// Looks a scalar up by its schema name, e.g. `"sint32"`.
    pub fn from_name(name: &str) -> Option<ScalarType> {
        TYPES.iter().find(|d| d.name == name).map(|d| d.scalar)
    }

    pub fn descriptor(self) -> &'static TypeDescriptor {
        // TYPES is declared in variant order
        &TYPES[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    pub fn wire_type(self) -> WireType {
        self.descriptor().wire_type
    }

    pub fn is_packable(self) -> bool {
        self.wire_type().is_packable()
    }

    pub fn is_valid_map_key(self) -> bool {
        MAP_KEY_TYPES.contains(&self)
    }

    /// The value an unset field of this type reads as. Every call builds a new
    /// value, so a `bytes` default never aliases another instance's buffer.
    pub fn default_value(self) -> Value {
        match self {
            ScalarType::Int32 | ScalarType::Sint32 | ScalarType::Sfixed32 => Value::Int32(0),
            ScalarType::Uint32 | ScalarType::Fixed32 => Value::Uint32(0),
            ScalarType::Int64 | ScalarType::Sint64 | ScalarType::Sfixed64 => Value::Int64(0),
            ScalarType::Uint64 | ScalarType::Fixed64 => Value::Uint64(0),
            ScalarType::Bool => Value::Bool(false),
            ScalarType::Double => Value::Double(0.0),
            ScalarType::Float => Value::Float(0.0),
            ScalarType::String => Value::String(String::new()),
            ScalarType::Bytes => Value::Bytes(Vec::new()),
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}
