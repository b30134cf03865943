use std::collections::HashSet;

use brine_proto_schema::{
    EnumDef, MessageDef, NamespaceTree, Node, NodeKind, OptionValue, Syntax, TypeRef, ID_MAX, ID_MIN,
    RESERVED_ID_RANGE,
};

use crate::{
    error::ProtoError,
    utils::{quote, resolve_error},
};

/// Structural checks over a fully bound tree. Returns the first violation.
pub fn verify_tree(tree: &NamespaceTree) -> Result<(), ProtoError> {
    for id in tree.ids() {
        let node = tree.node(id);
        match node.kind {
            NodeKind::Message(ref def) => verify_message(&tree.full_name(id), def)?,
            NodeKind::Enum(ref def) => verify_enum(&tree.full_name(id), node, def)?,
            NodeKind::Service(ref def) => {
                for method in &def.methods {
                    for type_ref in [&method.request, &method.response] {
                        if !matches!(type_ref, TypeRef::Message(_)) {
                            return Err(resolve_error(format!(
                                "Method {} of {} must take and return messages",
                                quote(&method.name),
                                quote(&tree.full_name(id))
                            )));
                        }
                    }
                }
            }
            NodeKind::Namespace => {}
        }
    }
    Ok(())
}

fn in_ranges(ranges: &[(i64, i64)], id: i64) -> bool {
    ranges.iter().any(|&(lo, hi)| id >= lo && id <= hi)
}

fn verify_message(name: &str, def: &MessageDef) -> Result<(), ProtoError> {
    for &(lo, hi) in &def.extension_ranges {
        if lo < ID_MIN as i64 || hi > ID_MAX as i64 || lo > hi {
            return Err(resolve_error(format!(
                "Illegal extension range {} to {} in {}",
                lo,
                hi,
                quote(name)
            )));
        }
    }

    let mut ids = HashSet::new();
    let mut names = HashSet::new();
    for field in &def.fields {
        let field_name = quote(&format!("{}.{}", name, field.name));

        if field.id < ID_MIN as i64 || field.id > ID_MAX as i64 {
            return Err(resolve_error(format!(
                "Illegal field id {} for {}: ids must be between {} and {}",
                field.id, field_name, ID_MIN, ID_MAX
            )));
        }
        let (reserved_lo, reserved_hi) = RESERVED_ID_RANGE;
        if field.id >= reserved_lo as i64 && field.id <= reserved_hi as i64 {
            return Err(resolve_error(format!(
                "Illegal field id {} for {}: {} to {} are reserved for the protocol",
                field.id, field_name, reserved_lo, reserved_hi
            )));
        }
        if !ids.insert(field.id) {
            return Err(resolve_error(format!("The id {} is used twice in {}", field.id, quote(name))));
        }
        if !names.insert(field.name.as_str()) {
            return Err(resolve_error(format!("The field name {} is used twice", field_name)));
        }
        if in_ranges(&def.reserved_ranges, field.id) {
            return Err(resolve_error(format!("Field {} uses reserved id {}", field_name, field.id)));
        }
        if def.reserved_names.contains(&field.original_name) {
            return Err(resolve_error(format!("Field {} uses a reserved name", field_name)));
        }
        if field.extension.is_none() && def.in_extension_range(field.id) {
            return Err(resolve_error(format!(
                "Field {} uses id {} inside an extension range",
                field_name, field.id
            )));
        }
        if field.oneof.is_some() && (field.is_repeated() || field.is_map()) {
            return Err(resolve_error(format!("Oneof member {} cannot be repeated", field_name)));
        }
        if field.is_map() {
            match field.key_type {
                Some(TypeRef::Scalar(key)) if key.is_valid_map_key() => {}
                _ => return Err(resolve_error(format!("Illegal map key type for {}", field_name))),
            }
        }

        if def.syntax == Syntax::Proto3 {
            if field.is_required() {
                return Err(resolve_error(format!("Required field {} is not allowed in proto3", field_name)));
            }
            if field.options.contains_key("default") {
                return Err(resolve_error(format!("Explicit default on {} is not allowed in proto3", field_name)));
            }
            if matches!(field.type_ref, TypeRef::Group(_)) {
                return Err(resolve_error(format!("Group {} is not allowed in proto3", field_name)));
            }
        }
    }
    Ok(())
}

fn verify_enum(name: &str, node: &Node, def: &EnumDef) -> Result<(), ProtoError> {
    let first = def
        .values
        .first()
        .ok_or_else(|| resolve_error(format!("Enum {} must have at least one value", quote(name))))?;
    if def.syntax == Syntax::Proto3 && first.id != 0 {
        return Err(resolve_error(format!("The first value of proto3 enum {} must be zero", quote(name))));
    }

    let allow_alias = node.option("allow_alias").and_then(OptionValue::as_bool).unwrap_or(false);
    let mut names = HashSet::new();
    let mut numbers = HashSet::new();
    for value in &def.values {
        if !names.insert(value.name.as_str()) {
            return Err(resolve_error(format!("Enum {} defines {} twice", quote(name), quote(&value.name))));
        }
        if !numbers.insert(value.id) && !allow_alias {
            return Err(resolve_error(format!(
                "Enum {} uses the number {} twice; set allow_alias to permit this",
                quote(name),
                value.id
            )));
        }
        if in_ranges(&def.reserved_ranges, value.id as i64) || def.reserved_names.contains(&value.name) {
            return Err(resolve_error(format!("Enum value {} of {} is reserved", quote(&value.name), quote(name))));
        }
    }
    Ok(())
}
