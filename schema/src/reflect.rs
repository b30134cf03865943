//! The reflection tree: namespaces, messages, enums and services linked into
//! one arena, addressed by [NodeId].
//!
//! Nodes own their children through the arena; the `parent` link is a plain
//! index used for upward name lookup only.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::types::{ScalarType, WireType};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Syntax {
    #[default]
    Proto2,
    Proto3,
}

impl Syntax {
    pub fn from_name(name: &str) -> Option<Syntax> {
        match name {
            "proto2" => Some(Syntax::Proto2),
            "proto3" => Some(Syntax::Proto3),
            _ => None,
        }
    }
}

/// Per-node resolution progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolveState {
    #[default]
    Declared,
    Resolving,
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rule {
    #[default]
    Optional,
    Required,
    Repeated,
    Map,
}

impl Rule {
    pub fn from_name(name: &str) -> Option<Rule> {
        match name {
            "optional" => Some(Rule::Optional),
            "required" => Some(Rule::Required),
            "repeated" => Some(Rule::Repeated),
            "map" => Some(Rule::Map),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Rule::Optional => "optional",
            Rule::Required => "required",
            Rule::Repeated => "repeated",
            Rule::Map => "map",
        }
    }
}

/// An option value as written in the schema. Identifiers such as enum
/// constants are kept as strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Aggregate(BTreeMap<String, OptionValue>),
}

impl OptionValue {
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            OptionValue::Bool(value) => Some(value),
            OptionValue::String(ref value) if value == "true" => Some(true),
            OptionValue::String(ref value) if value == "false" => Some(false),
            _ => None,
        }
    }
}

pub type OptionMap = BTreeMap<String, OptionValue>;

/// A field's type, first as written and then bound to what it names.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    Unresolved(String),
    Scalar(ScalarType),
    Enum(NodeId),
    Message(NodeId),
    Group(NodeId),
}

impl TypeRef {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, TypeRef::Unresolved(_))
    }

    /// Wire type of a single element, `None` while unresolved.
    pub fn wire_type(&self) -> Option<WireType> {
        match *self {
            TypeRef::Unresolved(_) => None,
            TypeRef::Scalar(scalar) => Some(scalar.wire_type()),
            TypeRef::Enum(_) => Some(WireType::Varint),
            TypeRef::Message(_) => Some(WireType::Ldelim),
            TypeRef::Group(_) => Some(WireType::StartGroup),
        }
    }

    pub fn is_packable(&self) -> bool {
        self.wire_type().map_or(false, WireType::is_packable)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name:          String,
    pub original_name: String,
    pub id:            i64,
    pub rule:          Rule,
    pub type_ref:      TypeRef,
    /// Key type of a map field.
    pub key_type:      Option<TypeRef>,
    pub packed:        bool,
    pub default:       Option<Value>,
    /// Index into the owning message's `oneofs`.
    pub oneof:         Option<usize>,
    pub options:       OptionMap,
    /// Scope that declared this field through `extend`, if any.
    pub extension:     Option<NodeId>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, id: i64, rule: Rule, type_ref: TypeRef) -> FieldDef {
        let name = name.into();
        FieldDef {
            original_name: name.clone(),
            name,
            id,
            rule,
            type_ref,
            key_type: None,
            packed: false,
            default: None,
            oneof: None,
            options: OptionMap::new(),
            extension: None,
        }
    }

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

#[derive(Debug, Clone, PartialEq)]
pub struct OneofDef {
    pub name:   String,
    /// Indices into the owning message's `fields`.
    pub fields: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessageDef {
    pub fields:           Vec<FieldDef>,
    pub oneofs:           Vec<OneofDef>,
    /// Inclusive id ranges open to extensions.
    pub extension_ranges: Vec<(i64, i64)>,
    pub reserved_ranges:  Vec<(i64, i64)>,
    pub reserved_names:   Vec<String>,
    pub is_group:         bool,
    pub syntax:           Syntax,
    pub state:            ResolveState,
}

impl MessageDef {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_by_id(&self, id: i64) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn in_extension_range(&self, id: i64) -> bool {
        self.extension_ranges.iter().any(|&(lo, hi)| id >= lo && id <= hi)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumValueDef {
    pub name:    String,
    pub id:      i32,
    pub options: OptionMap,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnumDef {
    pub values:          Vec<EnumValueDef>,
    pub reserved_ranges: Vec<(i64, i64)>,
    pub reserved_names:  Vec<String>,
    pub syntax:          Syntax,
    pub state:           ResolveState,
}

impl EnumDef {
    pub fn value(&self, name: &str) -> Option<i32> {
        self.values.iter().find(|v| v.name == name).map(|v| v.id)
    }

    /// First declared name carrying `id`.
    pub fn name_of(&self, id: i32) -> Option<&str> {
        self.values.iter().find(|v| v.id == id).map(|v| v.name.as_str())
    }

    /// Proto3 enums are open: unknown numbers are legal values.
    pub fn is_open(&self) -> bool {
        self.syntax == Syntax::Proto3
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    pub name:            String,
    pub request:         TypeRef,
    pub response:        TypeRef,
    pub request_stream:  bool,
    pub response_stream: bool,
    pub options:         OptionMap,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServiceDef {
    pub methods: Vec<MethodDef>,
    pub state:   ResolveState,
}

/// A field declared in an `extend` block, waiting to be bound to its target.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionDef {
    pub target:  TypeRef,
    pub field:   FieldDef,
    pub applied: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Namespace,
    Message(MessageDef),
    Enum(EnumDef),
    Service(ServiceDef),
}

impl NodeKind {
    pub fn is_type(&self) -> bool {
        matches!(self, NodeKind::Message(_) | NodeKind::Enum(_))
    }

    /// Namespaces and messages may contain named children.
    pub fn is_scope(&self) -> bool {
        matches!(self, NodeKind::Namespace | NodeKind::Message(_))
    }

    pub fn describe(&self) -> &'static str {
        match self {
            NodeKind::Namespace => "namespace",
            NodeKind::Message(_) => "message",
            NodeKind::Enum(_) => "enum",
            NodeKind::Service(_) => "service",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name:       String,
    pub parent:     Option<NodeId>,
    pub kind:       NodeKind,
    pub options:    OptionMap,
    pub extensions: Vec<ExtensionDef>,
    children:       Vec<NodeId>,
    child_index:    HashMap<String, NodeId>,
}

impl Node {
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<NodeId> {
        self.child_index.get(name).copied()
    }

    pub fn as_message(&self) -> Option<&MessageDef> {
        match self.kind {
            NodeKind::Message(ref message) => Some(message),
            _ => None,
        }
    }

    pub fn as_message_mut(&mut self) -> Option<&mut MessageDef> {
        match self.kind {
            NodeKind::Message(ref mut message) => Some(message),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumDef> {
        match self.kind {
            NodeKind::Enum(ref def) => Some(def),
            _ => None,
        }
    }

    pub fn as_service(&self) -> Option<&ServiceDef> {
        match self.kind {
            NodeKind::Service(ref def) => Some(def),
            _ => None,
        }
    }

    pub fn option(&self, name: &str) -> Option<&OptionValue> {
        self.options.get(name)
    }
}

/// The merged definitions of every imported schema.
#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceTree {
    nodes: Vec<Node>,
}

impl Default for NamespaceTree {
    fn default() -> Self {
        NamespaceTree::new()
    }
}

impl NamespaceTree {
    /// A tree holding only the unnamed root namespace.
    pub fn new() -> NamespaceTree {
        NamespaceTree {
            nodes: vec![Node {
                name: String::new(),
                parent: None,
                kind: NodeKind::Namespace,
                options: OptionMap::new(),
                extensions: Vec::new(),
                children: Vec::new(),
                child_index: HashMap::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// All node ids in creation order; parents always precede their children.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn message(&self, id: NodeId) -> Option<&MessageDef> {
        self.get(id).and_then(Node::as_message)
    }

    pub fn message_mut(&mut self, id: NodeId) -> Option<&mut MessageDef> {
        self.nodes.get_mut(id.0).and_then(Node::as_message_mut)
    }

    pub fn enum_def(&self, id: NodeId) -> Option<&EnumDef> {
        self.get(id).and_then(Node::as_enum)
    }

    /// Adds a named child under `parent`. If the name is taken, the existing
    /// child is returned as the error.
    pub fn add_child(&mut self, parent: NodeId, name: &str, kind: NodeKind) -> Result<NodeId, NodeId> {
        if let Some(existing) = self.nodes[parent.0].child(name) {
            return Err(existing);
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name: name.to_owned(),
            parent: Some(parent),
            kind,
            options: OptionMap::new(),
            extensions: Vec::new(),
            children: Vec::new(),
            child_index: HashMap::new(),
        });
        let parent_node = &mut self.nodes[parent.0];
        parent_node.children.push(id);
        parent_node.child_index.insert(name.to_owned(), id);
        Ok(id)
    }

    /// Dotted full name without the leading dot, e.g. `pkg.Outer.Inner`.
    pub fn full_name(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = &self.nodes[node_id.0];
            if node.parent.is_some() {
                parts.push(node.name.as_str());
            }
            current = node.parent;
        }
        parts.reverse();
        parts.join(".")
    }

    /// Follows a dotted path downward from `scope`.
    pub fn walk(&self, scope: NodeId, path: &str) -> Option<NodeId> {
        let mut current = scope;
        for part in path.split('.') {
            current = self.nodes[current.0].child(part)?;
        }
        Some(current)
    }

    /// Finds a node by absolute name; a leading dot is optional.
    pub fn find(&self, full_name: &str) -> Option<NodeId> {
        let path = full_name.strip_prefix('.').unwrap_or(full_name);
        if path.is_empty() {
            return Some(NodeId::ROOT);
        }
        self.walk(NodeId::ROOT, path)
    }

    /// Resolves `path` the way protobuf does: a leading dot means absolute
    /// from the root; otherwise each scope from `from` outward to the root is
    /// tried in turn and the first node accepted by `accept` wins.
    pub fn lookup(&self, path: &str, from: NodeId, accept: impl Fn(&NodeKind) -> bool) -> Option<NodeId> {
        if let Some(absolute) = path.strip_prefix('.') {
            return self
                .walk(NodeId::ROOT, absolute)
                .filter(|id| accept(&self.nodes[id.0].kind));
        }
        let mut scope = Some(from);
        while let Some(id) = scope {
            if let Some(found) = self.walk(id, path) {
                if accept(&self.nodes[found.0].kind) {
                    return Some(found);
                }
            }
            scope = self.nodes[id.0].parent;
        }
        None
    }

    /// Looks up a message or enum, see [lookup](#method.lookup).
    pub fn lookup_type(&self, path: &str, from: NodeId) -> Option<NodeId> {
        self.lookup(path, from, NodeKind::is_type)
    }

    /// Returns `true` once every node is resolved and no reference is left
    /// pending.
    pub fn is_resolved(&self) -> bool {
        self.nodes.iter().all(|node| {
            let pending_extension = node.extensions.iter().any(|e| !e.applied);
            let state_ok = match node.kind {
                NodeKind::Namespace => true,
                NodeKind::Message(ref m) => {
                    m.state == ResolveState::Resolved
                        && m.fields.iter().all(|f| f.type_ref.is_resolved())
                }
                NodeKind::Enum(ref e) => e.state == ResolveState::Resolved,
                NodeKind::Service(ref s) => s.state == ResolveState::Resolved,
            };
            state_ok && !pending_extension
        })
    }

    /// Full names of every message, enum and service, in declaration order.
    pub fn type_names(&self) -> Vec<(String, &'static str)> {
        self.ids()
            .filter(|id| !matches!(self.node(*id).kind, NodeKind::Namespace))
            .map(|id| (self.full_name(id), self.node(id).kind.describe()))
            .collect()
    }
}
