//! Merges parsed schemas into one [NamespaceTree] and binds every type
//! reference in it.
//!
//! Both `import` and `resolve_all` work on a copy of the tree and only commit
//! it when they succeed, so a failed call leaves the builder as it was.

use std::collections::HashSet;
use std::sync::Arc;

use brine_proto_schema::{
    to_camel_case, BuildError, EnumDef, EnumValueDef, ExtensionDef, FieldDef, MessageDef, MethodDef, NamespaceTree,
    NodeId, NodeKind, OneofDef, OptionValue, Options, ResolveState, Rule, RuntimeType, ScalarType, ServiceDef, Syntax,
    TypeRef, Value,
};
use tracing::{debug, trace};

use crate::{
    error::ProtoError,
    types::{EnumDecl, ExtendDecl, FieldDecl, MessageDecl, Schema, ServiceDecl},
    utils::{quote, resolve_error},
    verifier::verify_tree,
};

/// Accumulates imported schemas and resolves them into runtime types.
#[derive(Debug)]
pub struct Builder {
    tree:     NamespaceTree,
    options:  Options,
    origins:  HashSet<String>,
    resolved: bool,
    snapshot: Option<Arc<NamespaceTree>>,
}

impl Default for Builder {
    fn default() -> Self {
        Builder::new(Options::default())
    }
}

impl Builder {
    pub fn new(options: Options) -> Builder {
        Builder {
            tree: NamespaceTree::new(),
            options,
            origins: HashSet::new(),
            resolved: false,
            snapshot: None,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn tree(&self) -> &NamespaceTree {
        &self.tree
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Returns `true` if a schema with this origin (usually a file path) was
    /// imported before.
    pub fn is_imported(&self, origin: &str) -> bool {
        self.origins.contains(origin)
    }

    /// The resolved tree shared with every runtime type built from it.
    pub fn snapshot(&self) -> Option<Arc<NamespaceTree>> {
        self.snapshot.clone().filter(|_| self.resolved)
    }

    /// Absolute lookup of any node by full name, leading dot optional.
    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        self.tree.find(name)
    }

    /// Merges `schema` into the tree under its package.
    pub fn import(&mut self, schema: &Schema, origin: Option<&str>) -> Result<(), ProtoError> {
        if let Some(origin) = origin {
            if self.origins.contains(origin) {
                if self.options.allow_duplicate_imports {
                    debug!(origin, "skipping schema imported before");
                    return Ok(());
                }
                return Err(ProtoError::DuplicateImport(origin.to_owned()));
            }
        }

        let mut tree = self.tree.clone();
        let mut importer = Importer {
            tree:       &mut tree,
            syntax:     schema.syntax,
            camel_case: self.options.convert_fields_to_camel_case,
        };
        let scope = importer.package_scope(schema.package.as_deref())?;
        importer.import_scope(scope, &schema.messages, &schema.enums, &schema.services, &schema.extends)?;
        if !schema.options.is_empty() {
            let node = tree.node_mut(scope);
            for (name, value) in &schema.options {
                node.options.insert(name.clone(), value.clone());
            }
        }

        debug!(
            origin = origin.unwrap_or("<inline>"),
            package = schema.package.as_deref().unwrap_or(""),
            messages = schema.messages.len(),
            enums = schema.enums.len(),
            services = schema.services.len(),
            "imported schema"
        );

        self.tree = tree;
        if let Some(origin) = origin {
            self.origins.insert(origin.to_owned());
        }
        self.resolved = false;
        self.snapshot = None;
        Ok(())
    }

    /// Binds every pending reference, applies extensions and verifies the
    /// result. Does nothing when nothing was imported since the last call.
    pub fn resolve_all(&mut self) -> Result<(), ProtoError> {
        if self.resolved {
            return Ok(());
        }
        let mut tree = self.tree.clone();
        apply_extensions(&mut tree)?;
        let ids: Vec<NodeId> = tree.ids().collect();
        for id in ids {
            resolve_node(&mut tree, id)?;
        }
        verify_tree(&tree)?;

        debug!(nodes = tree.len(), "resolved schema");
        self.snapshot = Some(Arc::new(tree.clone()));
        self.tree = tree;
        self.resolved = true;
        Ok(())
    }

    /// Compiles the message type `type_name` (absolute, leading dot optional).
    pub fn build(&self, type_name: &str) -> Result<RuntimeType, ProtoError> {
        let tree = self
            .snapshot()
            .ok_or_else(|| BuildError::NotResolved(type_name.to_owned()))?;
        let id = tree
            .find(type_name)
            .ok_or_else(|| BuildError::NotFound(type_name.to_owned()))?;
        if tree.message(id).is_none() {
            return Err(BuildError::NotAMessage(tree.full_name(id)).into());
        }
        Ok(RuntimeType::build(tree, id, self.options.clone())?)
    }
}

struct Importer<'t> {
    tree:       &'t mut NamespaceTree,
    syntax:     Syntax,
    camel_case: bool,
}

impl Importer<'_> {
    fn package_scope(&mut self, package: Option<&str>) -> Result<NodeId, ProtoError> {
        let mut scope = self.tree.root();
        let package = match package {
            Some(package) if !package.is_empty() => package.trim_start_matches('.'),
            _ => return Ok(scope),
        };
        for part in package.split('.') {
            scope = match self.tree.add_child(scope, part, NodeKind::Namespace) {
                Ok(id) => id,
                Err(existing) if matches!(self.tree.node(existing).kind, NodeKind::Namespace) => existing,
                Err(existing) => {
                    return Err(resolve_error(format!(
                        "Package {} collides with {} {}",
                        quote(package),
                        self.tree.node(existing).kind.describe(),
                        quote(&self.tree.full_name(existing))
                    )))
                }
            };
        }
        Ok(scope)
    }

    fn declare(&mut self, scope: NodeId, name: &str, kind: NodeKind) -> Result<NodeId, ProtoError> {
        self.tree
            .add_child(scope, name, kind)
            .map_err(|existing| resolve_error(format!("Duplicate name {}", quote(&self.tree.full_name(existing)))))
    }

    /// Declares every type of one scope before descending into any body, so
    /// bodies may refer to siblings declared later.
    fn import_scope(
        &mut self,
        scope: NodeId,
        messages: &[MessageDecl],
        enums: &[EnumDecl],
        services: &[ServiceDecl],
        extends: &[ExtendDecl],
    ) -> Result<(), ProtoError> {
        let mut declared = Vec::with_capacity(messages.len());
        for decl in messages {
            let def = MessageDef {
                is_group: decl.is_group,
                syntax: self.syntax,
                ..MessageDef::default()
            };
            declared.push(self.declare(scope, &decl.name, NodeKind::Message(def))?);
        }
        for decl in enums {
            let def = self.enum_def(scope, decl)?;
            let id = self.declare(scope, &decl.name, NodeKind::Enum(def))?;
            self.tree.node_mut(id).options = decl.options.clone();
        }
        for decl in services {
            let id = self.declare(scope, &decl.name, NodeKind::Service(ServiceDef::default()))?;
            let methods = decl
                .methods
                .iter()
                .map(|m| MethodDef {
                    name:            m.name.clone(),
                    request:         TypeRef::Unresolved(m.request.clone()),
                    response:        TypeRef::Unresolved(m.response.clone()),
                    request_stream:  m.request_stream,
                    response_stream: m.response_stream,
                    options:         m.options.clone(),
                })
                .collect();
            let node = self.tree.node_mut(id);
            node.options = decl.options.clone();
            node.kind = NodeKind::Service(ServiceDef { methods, state: ResolveState::Declared });
        }

        for (decl, id) in messages.iter().zip(declared) {
            self.define_message(id, decl)?;
        }

        for extend in extends {
            for decl in &extend.fields {
                let mut field = self.field_def(decl);
                field.extension = Some(scope);
                self.tree.node_mut(scope).extensions.push(ExtensionDef {
                    target:  TypeRef::Unresolved(extend.ref_.clone()),
                    field,
                    applied: false,
                });
            }
        }
        Ok(())
    }

    fn define_message(&mut self, id: NodeId, decl: &MessageDecl) -> Result<(), ProtoError> {
        self.import_scope(id, &decl.messages, &decl.enums, &[], &decl.extends)?;

        let mut oneofs: Vec<OneofDef> = decl
            .oneofs
            .iter()
            .map(|name| OneofDef { name: name.clone(), fields: Vec::new() })
            .collect();
        let mut fields = Vec::with_capacity(decl.fields.len());
        for (ix, field) in decl.fields.iter().enumerate() {
            let mut def = self.field_def(field);
            if let Some(ref name) = field.oneof {
                let oneof = match oneofs.iter().position(|o| &o.name == name) {
                    Some(oneof) => oneof,
                    None => {
                        oneofs.push(OneofDef { name: name.clone(), fields: Vec::new() });
                        oneofs.len() - 1
                    }
                };
                oneofs[oneof].fields.push(ix);
                def.oneof = Some(oneof);
            }
            fields.push(def);
        }

        trace!(message = %self.tree.full_name(id), fields = fields.len(), "declared message");
        let node = self.tree.node_mut(id);
        node.options = decl.options.clone();
        if let Some(def) = node.as_message_mut() {
            def.fields = fields;
            def.oneofs = oneofs;
            def.extension_ranges = decl.extensions.clone();
            def.reserved_ranges = decl.reserved_ranges.clone();
            def.reserved_names = decl.reserved_names.clone();
        }
        Ok(())
    }

    fn field_def(&self, decl: &FieldDecl) -> FieldDef {
        let name = if self.camel_case { to_camel_case(&decl.name) } else { decl.name.clone() };
        let mut def = FieldDef::new(name, decl.id, decl.rule, TypeRef::Unresolved(decl.type_.clone()));
        def.original_name = decl.name.clone();
        def.key_type = decl.key_type.clone().map(TypeRef::Unresolved);
        def.options = decl.options.clone();
        def
    }

    fn enum_def(&self, scope: NodeId, decl: &EnumDecl) -> Result<EnumDef, ProtoError> {
        let mut values = Vec::with_capacity(decl.values.len());
        for value in &decl.values {
            let id = i32::try_from(value.id).map_err(|_| {
                resolve_error(format!(
                    "Value {} of enum {} is out of range",
                    quote(&value.name),
                    quote(&qualify(&*self.tree, scope, &decl.name))
                ))
            })?;
            values.push(EnumValueDef { name: value.name.clone(), id, options: value.options.clone() });
        }
        Ok(EnumDef {
            values,
            reserved_ranges: decl.reserved_ranges.clone(),
            reserved_names: decl.reserved_names.clone(),
            syntax: self.syntax,
            state: ResolveState::Declared,
        })
    }
}

fn qualify(tree: &NamespaceTree, scope: NodeId, name: &str) -> String {
    let prefix = tree.full_name(scope);
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{}.{}", prefix, name)
    }
}

/// Binds each pending extension to its target message and appends the field
/// there. The target is reset to `Declared` so the new field gets resolved.
fn apply_extensions(tree: &mut NamespaceTree) -> Result<(), ProtoError> {
    let scopes: Vec<NodeId> = tree.ids().collect();
    for scope in scopes {
        let extensions = tree.node(scope).extensions.clone();
        for (ix, extension) in extensions.iter().enumerate() {
            if extension.applied {
                continue;
            }
            let mut field = extension.field.clone();
            let target_name = match extension.target {
                TypeRef::Unresolved(ref name) => name.clone(),
                _ => continue,
            };
            let target = tree
                .lookup(&target_name, scope, |kind| matches!(kind, NodeKind::Message(_)))
                .ok_or_else(|| ProtoError::UnresolvedType {
                    type_name: target_name.clone(),
                    field:     qualify(tree, scope, &field.name),
                })?;
            let target_full = tree.full_name(target);
            let def = tree
                .message(target)
                .ok_or_else(|| resolve_error(format!("{} is not a message", quote(&target_full))))?;

            if !def.in_extension_range(field.id) {
                return Err(resolve_error(format!(
                    "Extension field {} uses id {} outside the extension ranges of {}",
                    quote(&field.name),
                    field.id,
                    quote(&target_full)
                )));
            }
            if let Some(existing) = def.field_by_id(field.id) {
                return Err(resolve_error(format!(
                    "Extension field {} reuses id {} of field {} in {}",
                    quote(&field.name),
                    field.id,
                    quote(&existing.name),
                    quote(&target_full)
                )));
            }
            if def.field(&field.name).is_some() {
                field.name = qualify(tree, scope, &field.name);
            }

            trace!(target = %target_full, field = %field.name, "applying extension");
            if let Some(def) = tree.message_mut(target) {
                def.fields.push(field);
                def.state = ResolveState::Declared;
            }
            let ext = &mut tree.node_mut(scope).extensions[ix];
            ext.target = TypeRef::Message(target);
            ext.applied = true;
        }
    }
    Ok(())
}

/// Walks one node through `Declared → Resolving → Resolved`.
fn resolve_node(tree: &mut NamespaceTree, id: NodeId) -> Result<(), ProtoError> {
    let state = match tree.node(id).kind {
        NodeKind::Namespace => return Ok(()),
        NodeKind::Message(ref def) => def.state,
        NodeKind::Enum(ref def) => def.state,
        NodeKind::Service(ref def) => def.state,
    };
    match state {
        ResolveState::Resolved => return Ok(()),
        ResolveState::Resolving => {
            return Err(resolve_error(format!("Cyclic resolution of {}", quote(&tree.full_name(id)))));
        }
        ResolveState::Declared => {}
    }
    trace!(node = %tree.full_name(id), "resolving");
    set_state(tree, id, ResolveState::Resolving);

    match tree.node(id).kind.clone() {
        NodeKind::Message(def) => {
            let fields = resolve_fields(tree, id, def)?;
            if let Some(def) = tree.message_mut(id) {
                def.fields = fields;
            }
        }
        NodeKind::Service(def) => {
            let methods = resolve_methods(tree, id, def)?;
            tree.node_mut(id).kind = NodeKind::Service(ServiceDef { methods, state: ResolveState::Resolving });
        }
        _ => {}
    }

    set_state(tree, id, ResolveState::Resolved);
    Ok(())
}

fn set_state(tree: &mut NamespaceTree, id: NodeId, state: ResolveState) {
    match tree.node_mut(id).kind {
        NodeKind::Message(ref mut def) => def.state = state,
        NodeKind::Enum(ref mut def) => def.state = state,
        NodeKind::Service(ref mut def) => def.state = state,
        NodeKind::Namespace => {}
    }
}

fn resolve_fields(tree: &mut NamespaceTree, id: NodeId, def: MessageDef) -> Result<Vec<FieldDef>, ProtoError> {
    let message = tree.full_name(id);
    let mut fields = def.fields;
    for field in fields.iter_mut() {
        let scope = field.extension.unwrap_or(id);
        let field_name = format!("{}.{}", message, field.name);
        if let TypeRef::Unresolved(ref name) = field.type_ref {
            field.type_ref = bind_type(tree, name, scope, &field_name)?;
        }
        if let Some(TypeRef::Unresolved(ref name)) = field.key_type {
            field.key_type = Some(bind_type(tree, name, scope, &field_name)?);
        }
        if let TypeRef::Enum(target) = field.type_ref {
            resolve_node(tree, target)?;
        }
        finalize_field(tree, field, def.syntax, &field_name)?;
    }
    Ok(fields)
}

fn bind_type(tree: &NamespaceTree, name: &str, scope: NodeId, field: &str) -> Result<TypeRef, ProtoError> {
    if let Some(scalar) = ScalarType::from_name(name) {
        return Ok(TypeRef::Scalar(scalar));
    }
    let found = tree.lookup_type(name, scope).ok_or_else(|| ProtoError::UnresolvedType {
        type_name: name.to_owned(),
        field:     field.to_owned(),
    })?;
    Ok(match tree.node(found).kind {
        NodeKind::Message(ref def) if def.is_group => TypeRef::Group(found),
        NodeKind::Message(_) => TypeRef::Message(found),
        _ => TypeRef::Enum(found),
    })
}

fn resolve_methods(tree: &NamespaceTree, id: NodeId, def: ServiceDef) -> Result<Vec<MethodDef>, ProtoError> {
    let service = tree.full_name(id);
    let bind = |type_ref: &TypeRef, what: String| -> Result<TypeRef, ProtoError> {
        let name = match type_ref {
            TypeRef::Unresolved(name) => name,
            other => return Ok(other.clone()),
        };
        let found = tree.lookup_type(name, id).ok_or_else(|| ProtoError::UnresolvedType {
            type_name: name.clone(),
            field:     what.clone(),
        })?;
        match tree.node(found).kind {
            NodeKind::Message(_) => Ok(TypeRef::Message(found)),
            _ => Err(resolve_error(format!(
                "The {} type {} must be a message",
                what,
                quote(&tree.full_name(found))
            ))),
        }
    };

    let mut methods = def.methods;
    for method in methods.iter_mut() {
        method.request = bind(&method.request, format!("{}.{} request", service, method.name))?;
        method.response = bind(&method.response, format!("{}.{} response", service, method.name))?;
    }
    Ok(methods)
}

/// Computes `packed` and the default value of a bound field.
fn finalize_field(tree: &NamespaceTree, field: &mut FieldDef, syntax: Syntax, name: &str) -> Result<(), ProtoError> {
    let explicit_packed = field.options.get("packed").and_then(OptionValue::as_bool);
    field.packed = field.is_repeated()
        && field.type_ref.is_packable()
        && explicit_packed.unwrap_or(syntax == Syntax::Proto3);

    let explicit = field.options.get("default");
    field.default = match (field.rule, &field.type_ref) {
        (Rule::Repeated | Rule::Map, _) => None,
        (_, &TypeRef::Scalar(scalar)) => Some(match explicit {
            Some(value) => convert_default(value, scalar)
                .ok_or_else(|| resolve_error(format!("Illegal default value {:?} for {} field {}", value, scalar, quote(name))))?,
            None => scalar.default_value(),
        }),
        (_, &TypeRef::Enum(target)) => {
            let def = tree
                .enum_def(target)
                .ok_or_else(|| resolve_error(format!("{} is not an enum", quote(&tree.full_name(target)))))?;
            let number = match explicit {
                None => def.values.first().map_or(0, |v| v.id),
                Some(value) => {
                    let found = match value {
                        OptionValue::String(label) => def.value(label),
                        OptionValue::Int(n) => i32::try_from(*n).ok().filter(|n| def.name_of(*n).is_some()),
                        _ => None,
                    };
                    found.ok_or_else(|| {
                        resolve_error(format!(
                            "Illegal default value {:?} for enum {} field {}",
                            value,
                            quote(&tree.full_name(target)),
                            quote(name)
                        ))
                    })?
                }
            };
            Some(Value::Enum(number))
        }
        _ => None,
    };
    Ok(())
}

/// Converts an explicit `default` option to a value of `scalar`.
pub fn convert_default(value: &OptionValue, scalar: ScalarType) -> Option<Value> {
    use ScalarType::*;

    match (scalar, value) {
        (Bool, OptionValue::Bool(b)) => Some(Value::Bool(*b)),
        (Bool, other) => other.as_bool().map(Value::Bool),
        (Int32 | Sint32 | Sfixed32, OptionValue::Int(n)) => i32::try_from(*n).ok().map(Value::Int32),
        (Uint32 | Fixed32, OptionValue::Int(n)) => u32::try_from(*n).ok().map(Value::Uint32),
        (Int64 | Sint64 | Sfixed64, OptionValue::Int(n)) => Some(Value::Int64(*n)),
        (Uint64 | Fixed64, OptionValue::Int(n)) => u64::try_from(*n).ok().map(Value::Uint64),
        (Uint64 | Fixed64, OptionValue::String(s)) => s.parse().ok().map(Value::Uint64),
        (Float, value) => float_default(value).map(|n| Value::Float(n as f32)),
        (Double, value) => float_default(value).map(Value::Double),
        (String, OptionValue::String(s)) => Some(Value::String(s.clone())),
        (Bytes, OptionValue::String(s)) => Some(Value::Bytes(s.as_bytes().to_vec())),
        _ => None,
    }
}

fn float_default(value: &OptionValue) -> Option<f64> {
    match value {
        OptionValue::Int(n) => Some(*n as f64),
        OptionValue::Float(n) => Some(*n),
        OptionValue::String(s) => match s.as_str() {
            "inf" | "+inf" => Some(f64::INFINITY),
            "-inf" => Some(f64::NEG_INFINITY),
            "nan" | "-nan" => Some(f64::NAN),
            other => other.parse().ok(),
        },
        _ => None,
    }
}
