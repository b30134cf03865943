//! The wire codec engine.
//!
//! [RuntimeType::build] walks a resolved message and every message type
//! reachable from it and compiles each one into a [MessageCodec]: an
//! ascending-id table of [FieldCodec]s whose scalar elements carry a pair of
//! plain function pointers picked once from the type registry. Encoding and
//! decoding then only dispatch through that table.
//!
//! Message types refer to each other by index into the shared table, so
//! recursive schemas need no owning cycles.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::accessor::{to_camel_case, to_snake_case};
use crate::bb::{ByteBuffer, ByteBufferMut};
use crate::error::{BuildError, DecodeError, EncodeError};
use crate::options::{Options, Translator};
use crate::reflect::{NamespaceTree, NodeId, ResolveState, Rule, Syntax, TypeRef};
use crate::types::{ScalarType, WireType};
use crate::value::{MapKey, Message, Value};

type WriteFn = fn(&mut ByteBufferMut, &Value) -> bool;
type ReadFn = fn(&mut ByteBuffer) -> Result<Value, DecodeError>;

/// Writer/reader pair for one scalar type.
#[derive(Clone, Copy)]
pub struct ScalarCodec {
    pub scalar: ScalarType,
    write:      WriteFn,
    read:       ReadFn,
}

impl ScalarCodec {
    fn new(scalar: ScalarType, write: WriteFn, read: ReadFn) -> ScalarCodec {
        ScalarCodec { scalar, write, read }
    }

    /// Picks the codec functions for `scalar`.
    pub fn of(scalar: ScalarType) -> ScalarCodec {
        match scalar {
            ScalarType::Int32 => ScalarCodec::new(
                scalar,
                |bb, v| match *v {
                    Value::Int32(n) => { bb.write_var_int32(n); true }
                    _ => false,
                },
                |bb| Ok(Value::Int32(bb.read_var_int32()?)),
            ),
            ScalarType::Uint32 => ScalarCodec::new(
                scalar,
                |bb, v| match *v {
                    Value::Uint32(n) => { bb.write_var_uint32(n); true }
                    _ => false,
                },
                |bb| Ok(Value::Uint32(bb.read_var_uint32()?)),
            ),
            ScalarType::Sint32 => ScalarCodec::new(
                scalar,
                |bb, v| match *v {
                    Value::Int32(n) => { bb.write_zigzag32(n); true }
                    _ => false,
                },
                |bb| Ok(Value::Int32(bb.read_zigzag32()?)),
            ),
            ScalarType::Int64 => ScalarCodec::new(
                scalar,
                |bb, v| match *v {
                    Value::Int64(n) => { bb.write_var_int64(n); true }
                    _ => false,
                },
                |bb| Ok(Value::Int64(bb.read_var_int64()?)),
            ),
            ScalarType::Uint64 => ScalarCodec::new(
                scalar,
                |bb, v| match *v {
                    Value::Uint64(n) => { bb.write_var_uint64(n); true }
                    _ => false,
                },
                |bb| Ok(Value::Uint64(bb.read_var_uint64()?)),
            ),
            ScalarType::Sint64 => ScalarCodec::new(
                scalar,
                |bb, v| match *v {
                    Value::Int64(n) => { bb.write_zigzag64(n); true }
                    _ => false,
                },
                |bb| Ok(Value::Int64(bb.read_zigzag64()?)),
            ),
            ScalarType::Bool => ScalarCodec::new(
                scalar,
                |bb, v| match *v {
                    Value::Bool(b) => { bb.write_bool(b); true }
                    _ => false,
                },
                |bb| Ok(Value::Bool(bb.read_bool()?)),
            ),
            ScalarType::Double => ScalarCodec::new(
                scalar,
                |bb, v| match *v {
                    Value::Double(n) => { bb.write_double(n); true }
                    _ => false,
                },
                |bb| Ok(Value::Double(bb.read_double()?)),
            ),
            ScalarType::Float => ScalarCodec::new(
                scalar,
                |bb, v| match *v {
                    Value::Float(n) => { bb.write_float(n); true }
                    _ => false,
                },
                |bb| Ok(Value::Float(bb.read_float()?)),
            ),
            ScalarType::String => ScalarCodec::new(
                scalar,
                |bb, v| match *v {
                    Value::String(ref s) => { bb.write_string(s); true }
                    _ => false,
                },
                |bb| Ok(Value::String(bb.read_string()?)),
            ),
            ScalarType::Bytes => ScalarCodec::new(
                scalar,
                |bb, v| match *v {
                    Value::Bytes(ref b) => { bb.write_length_delimited(b); true }
                    _ => false,
                },
                |bb| Ok(Value::Bytes(bb.read_length_delimited()?.to_vec())),
            ),
            ScalarType::Fixed32 => ScalarCodec::new(
                scalar,
                |bb, v| match *v {
                    Value::Uint32(n) => { bb.write_fixed32(n); true }
                    _ => false,
                },
                |bb| Ok(Value::Uint32(bb.read_fixed32()?)),
            ),
            ScalarType::Sfixed32 => ScalarCodec::new(
                scalar,
                |bb, v| match *v {
                    Value::Int32(n) => { bb.write_sfixed32(n); true }
                    _ => false,
                },
                |bb| Ok(Value::Int32(bb.read_sfixed32()?)),
            ),
            ScalarType::Fixed64 => ScalarCodec::new(
                scalar,
                |bb, v| match *v {
                    Value::Uint64(n) => { bb.write_fixed64(n); true }
                    _ => false,
                },
                |bb| Ok(Value::Uint64(bb.read_fixed64()?)),
            ),
            ScalarType::Sfixed64 => ScalarCodec::new(
                scalar,
                |bb, v| match *v {
                    Value::Int64(n) => { bb.write_sfixed64(n); true }
                    _ => false,
                },
                |bb| Ok(Value::Int64(bb.read_sfixed64()?)),
            ),
        }
    }

    pub fn wire_type(&self) -> WireType {
        self.scalar.wire_type()
    }
}

impl fmt::Debug for ScalarCodec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ScalarCodec({})", self.scalar)
    }
}

/// Enum metadata copied out of the tree for verification and JSON naming.
#[derive(Debug, Clone)]
pub struct EnumCodec {
    pub name:   String,
    pub values: Vec<(String, i32)>,
    pub open:   bool,
}

impl EnumCodec {
    pub fn value(&self, name: &str) -> Option<i32> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, id)| *id)
    }

    pub fn name_of(&self, id: i32) -> Option<&str> {
        self.values.iter().find(|(_, v)| *v == id).map(|(n, _)| n.as_str())
    }

    pub fn first(&self) -> i32 {
        self.values.first().map_or(0, |(_, id)| *id)
    }
}

/// How a single element of a field travels on the wire. Message and group
/// elements point at another entry of the codec table.
#[derive(Debug, Clone)]
pub enum ElementCodec {
    Scalar(ScalarCodec),
    Enum(EnumCodec),
    Message(usize),
    Group(usize),
}

impl ElementCodec {
    pub fn wire_type(&self) -> WireType {
        match self {
            ElementCodec::Scalar(codec) => codec.wire_type(),
            ElementCodec::Enum(_) => WireType::Varint,
            ElementCodec::Message(_) => WireType::Ldelim,
            ElementCodec::Group(_) => WireType::StartGroup,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldCodec {
    pub id:        u32,
    pub name:      String,
    /// `Message.field`, used in error messages.
    pub full_name: String,
    pub rule:      Rule,
    pub packed:    bool,
    /// Index into the owning [MessageCodec]'s oneofs.
    pub oneof:     Option<usize>,
    pub default:   Option<Value>,
    pub element:   ElementCodec,
    /// Key codec of a map field.
    pub key:       Option<ScalarCodec>,
    /// Singular scalar and enum fields holding their default stay off the wire.
    skip_default:  bool,
}

impl FieldCodec {
    pub fn is_repeated(&self) -> bool {
        self.rule == Rule::Repeated
    }

    pub fn is_map(&self) -> bool {
        self.rule == Rule::Map
    }

    pub fn is_required(&self) -> bool {
        self.rule == Rule::Required
    }
}

#[derive(Debug, Clone)]
pub struct OneofCodec {
    pub name:    String,
    /// Indices into the owning message's field codecs.
    pub members: Vec<usize>,
}

pub struct MessageCodec {
    pub name:              String,
    pub node:              NodeId,
    pub syntax:            Syntax,
    pub fields:            Vec<FieldCodec>,
    pub oneofs:            Vec<OneofCodec>,
    by_id:                 HashMap<u32, usize>,
    by_name:               HashMap<String, usize>,
    pub(crate) accessors:  HashMap<String, usize>,
    pub(crate) translator: Option<Arc<dyn Translator>>,
}

impl fmt::Debug for MessageCodec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MessageCodec")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("oneofs", &self.oneofs)
            .field("translated", &self.translator.is_some())
            .finish()
    }
}

impl MessageCodec {
    pub fn field_by_id(&self, id: u32) -> Option<&FieldCodec> {
        self.by_id.get(&id).map(|&ix| &self.fields[ix])
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn field(&self, name: &str) -> Option<&FieldCodec> {
        self.field_index(name).map(|ix| &self.fields[ix])
    }

    fn build(
        tree: &NamespaceTree,
        node: NodeId,
        options: &Options,
        interner: &mut Interner,
    ) -> Result<MessageCodec, BuildError> {
        let name = tree.full_name(node);
        let def = tree
            .message(node)
            .ok_or_else(|| BuildError::NotAMessage(name.clone()))?;
        if def.state != ResolveState::Resolved {
            return Err(BuildError::NotResolved(name));
        }

        // codec order is ascending id; oneof membership is declared by position
        let mut order: Vec<usize> = (0..def.fields.len()).collect();
        order.sort_by_key(|&ix| def.fields[ix].id);
        let mut position = vec![0; def.fields.len()];
        for (codec_ix, &def_ix) in order.iter().enumerate() {
            position[def_ix] = codec_ix;
        }

        let mut fields = Vec::with_capacity(order.len());
        for &def_ix in &order {
            let field = &def.fields[def_ix];
            let unresolved = |type_name: &str| BuildError::Unresolved {
                message:   name.clone(),
                field:     field.name.clone(),
                type_name: type_name.to_owned(),
            };
            let element = match field.type_ref {
                TypeRef::Unresolved(ref type_name) => return Err(unresolved(type_name)),
                TypeRef::Scalar(scalar) => ElementCodec::Scalar(ScalarCodec::of(scalar)),
                TypeRef::Enum(id) => {
                    let def = tree.enum_def(id).ok_or_else(|| unresolved(&tree.full_name(id)))?;
                    ElementCodec::Enum(EnumCodec {
                        name:   tree.full_name(id),
                        values: def.values.iter().map(|v| (v.name.clone(), v.id)).collect(),
                        open:   def.is_open(),
                    })
                }
                TypeRef::Message(id) => ElementCodec::Message(interner.intern(id)),
                TypeRef::Group(id) => ElementCodec::Group(interner.intern(id)),
            };
            let key = match field.key_type {
                None => None,
                Some(TypeRef::Scalar(scalar)) => Some(ScalarCodec::of(scalar)),
                Some(TypeRef::Unresolved(ref type_name)) => return Err(unresolved(type_name)),
                Some(_) => return Err(unresolved("map key")),
            };
            let id = u32::try_from(field.id).map_err(|_| BuildError::IllegalId {
                message: name.clone(),
                field:   field.name.clone(),
                id:      field.id,
            })?;
            let singular = matches!(field.rule, Rule::Optional);
            let skip_default = singular
                && field.oneof.is_none()
                && matches!(element, ElementCodec::Scalar(_) | ElementCodec::Enum(_));
            fields.push(FieldCodec {
                id,
                name: field.name.clone(),
                full_name: format!("{}.{}", name, field.name),
                rule: field.rule,
                packed: field.packed,
                oneof: field.oneof,
                default: field.default.clone(),
                element,
                key,
                skip_default,
            });
        }

        let oneofs = def
            .oneofs
            .iter()
            .map(|oneof| OneofCodec {
                name:    oneof.name.clone(),
                members: oneof.fields.iter().map(|&ix| position[ix]).collect(),
            })
            .collect();

        let by_id = fields.iter().enumerate().map(|(ix, f)| (f.id, ix)).collect();
        let by_name: HashMap<String, usize> =
            fields.iter().enumerate().map(|(ix, f)| (f.name.clone(), ix)).collect();

        let mut accessors = HashMap::new();
        if options.populate_accessors {
            for (ix, field) in fields.iter().enumerate() {
                accessors.insert(field.name.clone(), ix);
                accessors.entry(to_camel_case(&field.name)).or_insert(ix);
                accessors.entry(to_snake_case(&field.name)).or_insert(ix);
            }
        }

        Ok(MessageCodec {
            translator: options.translator(&name).cloned(),
            name,
            node,
            syntax: def.syntax,
            fields,
            oneofs,
            by_id,
            by_name,
            accessors,
        })
    }
}

/// Hands out stable table indices for message nodes in discovery order.
struct Interner {
    order:    Vec<NodeId>,
    index_of: HashMap<NodeId, usize>,
}

impl Interner {
    fn intern(&mut self, node: NodeId) -> usize {
        if let Some(&ix) = self.index_of.get(&node) {
            return ix;
        }
        let ix = self.order.len();
        self.order.push(node);
        self.index_of.insert(node, ix);
        ix
    }
}

/// Codecs of one message type and everything reachable from it.
pub(crate) struct CodecTable {
    pub(crate) messages: Vec<MessageCodec>,
    pub(crate) options:  Options,
}

/// Deepest nesting of submessages and groups a decode will follow.
pub const RECURSION_LIMIT: usize = 100;

/// Where a decode loop sits, which decides how it may end.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Frame {
    /// The whole input; ends exactly at end of buffer.
    TopLevel,
    /// Inside a length prefix; a zero tag also ends it.
    Bounded,
    /// Inside a group opened with this field id; ends at the matching END tag.
    Group(u32),
}

/// A message type compiled for encoding and decoding.
///
/// Cloning is cheap: the schema tree and the codec table are shared and
/// immutable, so a `RuntimeType` may be used from several threads at once.
#[derive(Clone)]
pub struct RuntimeType {
    tree:  Arc<NamespaceTree>,
    table: Arc<CodecTable>,
    ix:    usize,
}

impl fmt::Debug for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RuntimeType").field("name", &self.name()).finish()
    }
}

impl RuntimeType {
    /// Compiles the message at `node` of a resolved tree.
    pub fn build(tree: Arc<NamespaceTree>, node: NodeId, options: Options) -> Result<RuntimeType, BuildError> {
        if tree.get(node).is_none() {
            return Err(BuildError::NotFound(format!("node #{}", node.index())));
        }
        let mut interner = Interner { order: Vec::new(), index_of: HashMap::new() };
        interner.intern(node);

        let mut messages = Vec::new();
        while messages.len() < interner.order.len() {
            let next = interner.order[messages.len()];
            messages.push(MessageCodec::build(&tree, next, &options, &mut interner)?);
        }
        debug!(
            message = %messages[0].name,
            types = messages.len(),
            "built codec table"
        );

        Ok(RuntimeType {
            tree,
            table: Arc::new(CodecTable { messages, options }),
            ix: 0,
        })
    }

    pub(crate) fn codec(&self) -> &MessageCodec {
        &self.table.messages[self.ix]
    }

    pub(crate) fn table(&self) -> &CodecTable {
        &self.table
    }

    pub(crate) fn codec_index(&self) -> usize {
        self.ix
    }

    /// Full name of the message type.
    pub fn name(&self) -> &str {
        &self.codec().name
    }

    pub fn node(&self) -> NodeId {
        self.codec().node
    }

    pub fn tree(&self) -> &NamespaceTree {
        &self.tree
    }

    pub fn options(&self) -> &Options {
        &self.table.options
    }

    /// Field codecs in ascending id order.
    pub fn fields(&self) -> &[FieldCodec] {
        &self.codec().fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldCodec> {
        self.codec().field(name)
    }

    pub fn oneofs(&self) -> &[OneofCodec] {
        &self.codec().oneofs
    }

    /// The runtime type of a message- or group-typed field, sharing this
    /// type's tables.
    pub fn nested(&self, field_name: &str) -> Option<RuntimeType> {
        match self.field(field_name)?.element {
            ElementCodec::Message(ix) | ElementCodec::Group(ix) => Some(RuntimeType {
                tree:  self.tree.clone(),
                table: self.table.clone(),
                ix,
            }),
            _ => None,
        }
    }

    /// Encodes `message` into a fresh byte vector.
    pub fn encode(&self, message: &Message) -> Result<Vec<u8>, EncodeError> {
        self.check_type(message)?;
        let mut bb = ByteBufferMut::new();
        self.table.encode_message(self.ix, message, &mut bb)?;
        Ok(bb.data())
    }

    /// Encodes `message` preceded by its length as a varint.
    pub fn encode_delimited(&self, message: &Message) -> Result<Vec<u8>, EncodeError> {
        let body = self.encode(message)?;
        let mut bb = ByteBufferMut::new();
        bb.write_length_delimited(&body);
        Ok(bb.data())
    }

    /// Decodes a whole buffer as one message of this type.
    pub fn decode(&self, bytes: &[u8]) -> Result<Message, DecodeError> {
        let mut bb = ByteBuffer::new(bytes);
        self.table.decode_message(self.ix, &mut bb, Frame::TopLevel, 0)
    }

    /// Reads one length-prefixed message from `bb`, leaving the cursor after it.
    pub fn decode_delimited(&self, bb: &mut ByteBuffer) -> Result<Message, DecodeError> {
        let payload = bb.read_length_delimited()?;
        self.decode(payload)
    }

    pub(crate) fn check_type(&self, message: &Message) -> Result<(), EncodeError> {
        if message.type_name() != self.name() {
            return Err(EncodeError::TypeMismatch {
                expected: self.name().to_owned(),
                actual:   message.type_name().to_owned(),
            });
        }
        Ok(())
    }
}

impl CodecTable {
    fn encode_message(&self, ix: usize, message: &Message, bb: &mut ByteBufferMut) -> Result<(), EncodeError> {
        let codec = &self.messages[ix];
        for oneof in &codec.oneofs {
            let mut set = oneof.members.iter().map(|&m| &codec.fields[m]).filter(|f| message.contains(f.id));
            if let (Some(_), Some(second)) = (set.next(), set.next()) {
                return Err(invalid(second, &format!("another member of oneof {} is already set", oneof.name)));
            }
        }
        for field in &codec.fields {
            let value = match message.get(field.id) {
                Some(value) => value,
                None if field.is_required() => {
                    return Err(EncodeError::MissingRequired {
                        message: codec.name.clone(),
                        field:   field.name.clone(),
                    })
                }
                None => continue,
            };
            let value = self.verify(field, value)?;
            if field.skip_default && field.default.as_ref().map_or(false, |d| is_default(d, &value)) {
                continue;
            }
            self.encode_field(field, &value, bb)?;
        }
        bb.write_bytes(message.unknown_fields());
        Ok(())
    }

    fn encode_field(&self, field: &FieldCodec, value: &Value, bb: &mut ByteBufferMut) -> Result<(), EncodeError> {
        match (field.rule, value) {
            (Rule::Map, Value::Map(entries)) => {
                for (key, value) in entries {
                    self.encode_map_entry(field, key, value, bb)?;
                }
                Ok(())
            }
            (Rule::Repeated, Value::List(items)) => {
                if items.is_empty() {
                    return Ok(());
                }
                if field.packed && field.element.wire_type().is_packable() {
                    let mut packed = ByteBufferMut::new();
                    for item in items {
                        self.write_element(field, item, &mut packed)?;
                    }
                    bb.write_tag(field.id, WireType::Ldelim);
                    bb.write_length_delimited(packed.as_slice());
                } else {
                    for item in items {
                        self.encode_single(field.id, field, item, bb)?;
                    }
                }
                Ok(())
            }
            (Rule::Map | Rule::Repeated, _) => Err(invalid(field, "expected a collection")),
            _ => self.encode_single(field.id, field, value, bb),
        }
    }

    /// Tag plus value for one element.
    fn encode_single(&self, id: u32, field: &FieldCodec, value: &Value, bb: &mut ByteBufferMut) -> Result<(), EncodeError> {
        match (&field.element, value) {
            (ElementCodec::Group(ix), Value::Message(message)) => {
                bb.write_tag(id, WireType::StartGroup);
                self.encode_message(*ix, message, bb)?;
                bb.write_tag(id, WireType::EndGroup);
                Ok(())
            }
            (element, _) => {
                bb.write_tag(id, element.wire_type());
                self.write_element(field, value, bb)
            }
        }
    }

    /// Value bytes without a tag, as written inside packed runs.
    fn write_element(&self, field: &FieldCodec, value: &Value, bb: &mut ByteBufferMut) -> Result<(), EncodeError> {
        match (&field.element, value) {
            (ElementCodec::Scalar(codec), value) => {
                if (codec.write)(bb, value) {
                    Ok(())
                } else {
                    Err(invalid(field, &format!("{} does not encode as {}", value.kind(), codec.scalar)))
                }
            }
            (ElementCodec::Enum(_), Value::Enum(n)) => {
                bb.write_var_int32(*n);
                Ok(())
            }
            (ElementCodec::Message(ix), Value::Message(message)) => {
                let mut sub = ByteBufferMut::new();
                self.encode_message(*ix, message, &mut sub)?;
                bb.write_length_delimited(sub.as_slice());
                Ok(())
            }
            (_, value) => Err(invalid(field, &format!("unexpected {} value", value.kind()))),
        }
    }

    /// One synthetic entry message: key as field 1, value as field 2.
    fn encode_map_entry(&self, field: &FieldCodec, key: &MapKey, value: &Value, bb: &mut ByteBufferMut) -> Result<(), EncodeError> {
        let key_codec = field.key.ok_or_else(|| invalid(field, "map field without key type"))?;
        let key_value = key
            .to_value(key_codec.scalar)
            .ok_or_else(|| invalid(field, &format!("key {} does not fit {}", key, key_codec.scalar)))?;

        let mut entry = ByteBufferMut::new();
        entry.write_tag(1, key_codec.wire_type());
        (key_codec.write)(&mut entry, &key_value);
        self.encode_single(2, field, value, &mut entry)?;

        bb.write_tag(field.id, WireType::Ldelim);
        bb.write_length_delimited(entry.as_slice());
        Ok(())
    }

    fn decode_message(&self, ix: usize, bb: &mut ByteBuffer, frame: Frame, depth: usize) -> Result<Message, DecodeError> {
        if depth > RECURSION_LIMIT {
            return Err(DecodeError::RecursionLimit(RECURSION_LIMIT));
        }
        let codec = &self.messages[ix];
        let mut message = Message::new(codec.name.clone());

        loop {
            if bb.is_empty() {
                if let Frame::Group(id) = frame {
                    return Err(DecodeError::UnterminatedGroup(id));
                }
                break;
            }
            let start = bb.index();
            let (id, wire_type) = bb.read_tag()?;

            if wire_type == WireType::EndGroup {
                match frame {
                    Frame::Group(open) if open == id => break,
                    _ => return Err(DecodeError::UnexpectedEndGroup(id)),
                }
            }
            if id == 0 {
                match frame {
                    Frame::Bounded => break,
                    _ => return Err(DecodeError::InvalidFieldId(0)),
                }
            }

            match codec.by_id.get(&id) {
                Some(&field_ix) => self.decode_field(codec, field_ix, wire_type, bb, &mut message, depth)?,
                None => {
                    trace!(message = %codec.name, id, wire_type = %wire_type, "skipping unknown field");
                    skip_nested(bb, id, wire_type, depth)?;
                    if self.options.retain_unknown_fields {
                        message.push_unknown(&bb.data()[start..bb.index()]);
                    }
                }
            }
        }

        self.finish(codec, &mut message)?;
        Ok(message)
    }

    /// Required checks and default population once the input is consumed.
    fn finish(&self, codec: &MessageCodec, message: &mut Message) -> Result<(), DecodeError> {
        for field in &codec.fields {
            if message.contains(field.id) {
                continue;
            }
            if field.is_required() {
                return Err(DecodeError::MissingRequired {
                    message: codec.name.clone(),
                    field:   field.name.clone(),
                });
            }
            if !self.options.populate_defaults || field.oneof.is_some() {
                continue;
            }
            match field.rule {
                Rule::Repeated => {
                    message.insert(field.id, Value::List(Vec::new()));
                }
                Rule::Map => {
                    message.insert(field.id, Value::Map(BTreeMap::new()));
                }
                _ => {
                    if let Some(ref default) = field.default {
                        message.insert(field.id, default.clone());
                    }
                }
            }
        }
        Ok(())
    }

    fn decode_field(
        &self,
        codec: &MessageCodec,
        field_ix: usize,
        wire_type: WireType,
        bb: &mut ByteBuffer,
        message: &mut Message,
        depth: usize,
    ) -> Result<(), DecodeError> {
        let field = &codec.fields[field_ix];
        match field.rule {
            Rule::Map => {
                expect_wire(field, WireType::Ldelim, wire_type)?;
                let (key, value) = self.decode_map_entry(field, bb, depth)?;
                match message.get_mut(field.id) {
                    Some(Value::Map(entries)) => {
                        entries.insert(key, value);
                    }
                    _ => {
                        let mut entries = BTreeMap::new();
                        entries.insert(key, value);
                        message.insert(field.id, Value::Map(entries));
                    }
                }
            }
            Rule::Repeated => {
                let element_wire = field.element.wire_type();
                let mut items = Vec::new();
                // either encoding is accepted regardless of the declared packing
                if wire_type == WireType::Ldelim && element_wire.is_packable() {
                    let mut run = ByteBuffer::new(bb.read_length_delimited()?);
                    while !run.is_empty() {
                        items.push(self.read_element(field, &mut run, depth)?);
                    }
                } else {
                    expect_wire(field, element_wire, wire_type)?;
                    items.push(self.decode_single(field, bb, depth)?);
                }
                match message.get_mut(field.id) {
                    Some(Value::List(existing)) => existing.extend(items),
                    _ => {
                        message.insert(field.id, Value::List(items));
                    }
                }
            }
            _ => {
                expect_wire(field, field.element.wire_type(), wire_type)?;
                let value = self.decode_single(field, bb, depth)?;
                if let Some(oneof) = field.oneof {
                    for &member in &codec.oneofs[oneof].members {
                        if member != field_ix {
                            message.remove(codec.fields[member].id);
                        }
                    }
                }
                message.insert(field.id, value);
            }
        }
        Ok(())
    }

    /// One element whose tag has already been read.
    fn decode_single(&self, field: &FieldCodec, bb: &mut ByteBuffer, depth: usize) -> Result<Value, DecodeError> {
        match field.element {
            ElementCodec::Group(ix) => {
                let message = self.decode_message(ix, bb, Frame::Group(field.id), depth + 1)?;
                self.translate_decoded(ix, message)
            }
            _ => self.read_element(field, bb, depth),
        }
    }

    fn read_element(&self, field: &FieldCodec, bb: &mut ByteBuffer, depth: usize) -> Result<Value, DecodeError> {
        match field.element {
            ElementCodec::Scalar(codec) => (codec.read)(bb),
            ElementCodec::Enum(_) => Ok(Value::Enum(bb.read_var_int32()?)),
            ElementCodec::Message(ix) => {
                let mut sub = ByteBuffer::new(bb.read_length_delimited()?);
                let message = self.decode_message(ix, &mut sub, Frame::Bounded, depth + 1)?;
                self.translate_decoded(ix, message)
            }
            ElementCodec::Group(_) => Err(DecodeError::WireTypeMismatch {
                field:    field.full_name.clone(),
                expected: WireType::StartGroup,
                actual:   WireType::Ldelim,
            }),
        }
    }

    fn decode_map_entry(&self, field: &FieldCodec, bb: &mut ByteBuffer, depth: usize) -> Result<(MapKey, Value), DecodeError> {
        let key_codec = field.key.ok_or(DecodeError::WireTypeMismatch {
            field:    field.full_name.clone(),
            expected: WireType::Ldelim,
            actual:   WireType::Ldelim,
        })?;
        let mut entry = ByteBuffer::new(bb.read_length_delimited()?);
        let mut key = None;
        let mut value = None;

        while !entry.is_empty() {
            let (id, wire_type) = entry.read_tag()?;
            match id {
                1 => {
                    expect_wire(field, key_codec.wire_type(), wire_type)?;
                    key = Some((key_codec.read)(&mut entry)?);
                }
                2 => {
                    expect_wire(field, field.element.wire_type(), wire_type)?;
                    value = Some(self.decode_single(field, &mut entry, depth + 1)?);
                }
                _ => skip_nested(&mut entry, id, wire_type, depth + 1)?,
            }
        }

        let key = key.unwrap_or_else(|| key_codec.scalar.default_value());
        let key = MapKey::from_value(&key).ok_or(DecodeError::WireTypeMismatch {
            field:    field.full_name.clone(),
            expected: key_codec.wire_type(),
            actual:   key_codec.wire_type(),
        })?;
        let value = match value {
            Some(value) => value,
            None => self.element_default(field),
        };
        Ok((key, value))
    }

    /// The value an absent map entry value reads as.
    fn element_default(&self, field: &FieldCodec) -> Value {
        match field.element {
            ElementCodec::Scalar(codec) => codec.scalar.default_value(),
            ElementCodec::Enum(ref def) => Value::Enum(def.first()),
            ElementCodec::Message(ix) | ElementCodec::Group(ix) => {
                Value::Message(Message::new(self.messages[ix].name.clone()))
            }
        }
    }

    fn translate_decoded(&self, ix: usize, message: Message) -> Result<Value, DecodeError> {
        match self.messages[ix].translator {
            Some(ref translator) => translator.decode(message),
            None => Ok(Value::Message(message)),
        }
    }
}

/// Singular defaults compare floats by bit pattern so `-0.0` still goes out.
fn is_default(default: &Value, value: &Value) -> bool {
    match (default, value) {
        (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
        (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
        _ => default == value,
    }
}

fn expect_wire(field: &FieldCodec, expected: WireType, actual: WireType) -> Result<(), DecodeError> {
    if expected == actual {
        Ok(())
    } else {
        Err(DecodeError::WireTypeMismatch {
            field: field.full_name.clone(),
            expected,
            actual,
        })
    }
}

pub(crate) fn invalid(field: &FieldCodec, reason: &str) -> EncodeError {
    EncodeError::InvalidValue {
        field:  field.full_name.clone(),
        reason: reason.to_owned(),
    }
}

/// Consumes the payload of a field whose tag was just read.
pub fn skip_field(bb: &mut ByteBuffer, id: u32, wire_type: WireType) -> Result<(), DecodeError> {
    skip_nested(bb, id, wire_type, 0)
}

fn skip_nested(bb: &mut ByteBuffer, id: u32, wire_type: WireType, depth: usize) -> Result<(), DecodeError> {
    match wire_type {
        WireType::Varint => {
            bb.read_var_uint64()?;
        }
        WireType::Bits64 => bb.skip(8)?,
        WireType::Ldelim => {
            bb.read_length_delimited()?;
        }
        WireType::Bits32 => bb.skip(4)?,
        WireType::StartGroup if depth >= RECURSION_LIMIT => {
            return Err(DecodeError::RecursionLimit(RECURSION_LIMIT))
        }
        WireType::StartGroup => loop {
            if bb.is_empty() {
                return Err(DecodeError::UnterminatedGroup(id));
            }
            let (inner, inner_wire) = bb.read_tag()?;
            if inner_wire == WireType::EndGroup {
                if inner == id {
                    break;
                }
                return Err(DecodeError::UnexpectedEndGroup(inner));
            }
            skip_nested(bb, inner, inner_wire, depth + 1)?;
        },
        WireType::EndGroup => return Err(DecodeError::UnexpectedEndGroup(id)),
    }
    Ok(())
}
