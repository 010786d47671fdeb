use crate::error::ExecutionError;
use crate::execution::ExecutionContext;
use crate::node::ExecutionNode;
use crate::node::NodeId;
use crate::node::NodeKind;
use crate::node::NodeOrigin;
use crate::node::NodeResult;
use crate::node::NodeTree;
use crate::resolve::field_error;
use crate::value::FieldValue;
use crate::JsonMap;
use crate::JsonValue;
use apollo_compiler::ast::Value;
use apollo_compiler::executable::Field;
use apollo_compiler::executable::Selection;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::ObjectType;
use apollo_compiler::schema::Type;
use apollo_compiler::Name;
use apollo_compiler::Schema;
use indexmap::IndexMap;
use std::collections::HashSet;

/// The node kind for a position of type `ty`
pub(crate) fn node_kind<'a>(schema: &Schema, ty: &Type) -> NodeKind<'a> {
    match ty {
        Type::List(_) | Type::NonNullList(_) => NodeKind::Array { items: Vec::new() },
        Type::Named(name) | Type::NonNullNamed(name) => match schema.types.get(name) {
            Some(ExtendedType::Object(_) | ExtendedType::Interface(_) | ExtendedType::Union(_)) => {
                NodeKind::Object {
                    object_type: None,
                    sub_fields: Vec::new(),
                }
            }
            _ => NodeKind::Value,
        },
    }
}

/// The type of items of a list type
pub(crate) fn item_type(ty: &Type) -> &Type {
    match ty {
        Type::List(inner) | Type::NonNullList(inner) => inner,
        Type::Named(_) | Type::NonNullNamed(_) => ty,
    }
}

/// Creates top-level field nodes of the operation
pub(crate) fn build_root<'a>(ctx: &ExecutionContext<'a>, tree: &mut NodeTree<'a>) {
    let Some(object_type) = tree.object_type(NodeId::ROOT) else {
        return;
    };
    add_sub_fields(
        ctx,
        tree,
        NodeId::ROOT,
        object_type,
        &ctx.operation.selection_set.selections,
    );
}

/// Settles a node whose value is known, then builds its children:
/// sub-fields of an object (not executed yet) or items of a list (completed recursively).
///
/// Shape or type mismatches are recorded as field errors and fail the node.
pub(crate) fn complete_node<'a>(
    ctx: &ExecutionContext<'a>,
    tree: &mut NodeTree<'a>,
    id: NodeId,
    value: FieldValue,
) {
    let node = tree.get(id);
    if value.is_null() {
        if node.ty.is_non_null() {
            let message = format!("non-null type {} resolved to null", node.ty);
            field_error(ctx, tree, id, ExecutionError::new(message));
        } else {
            tree.get_mut(id).result = NodeResult::Resolved(value);
        }
        return;
    }
    let result = match node.kind {
        NodeKind::Array { .. } => complete_list(ctx, tree, id, value),
        NodeKind::Object { .. } => complete_object(ctx, tree, id, value),
        NodeKind::Value => match complete_leaf(ctx.schema, &node.ty, value) {
            Ok(json) => {
                tree.get_mut(id).result = NodeResult::Resolved(FieldValue::Json(json));
                Ok(())
            }
            Err(error) => Err(error),
        },
        NodeKind::Root { .. } | NodeKind::Null => Ok(()),
    };
    if let Err(error) = result {
        field_error(ctx, tree, id, error)
    }
}

fn complete_list<'a>(
    ctx: &ExecutionContext<'a>,
    tree: &mut NodeTree<'a>,
    id: NodeId,
    value: FieldValue,
) -> Result<(), ExecutionError> {
    let node = tree.get(id);
    let items = match value {
        FieldValue::List(items) => items,
        FieldValue::Json(JsonValue::Array(items)) => items.into_iter().map(FieldValue::Json).collect(),
        FieldValue::Json(_) | FieldValue::Object(_) => {
            return Err(ExecutionError::new(format!(
                "list type {} resolved to a non-list value",
                node.ty
            )))
        }
    };
    let item_ty = item_type(&node.ty).clone();
    let fields = node.fields.clone();
    // Item values are owned by item nodes from now on
    tree.get_mut(id).result = NodeResult::Resolved(FieldValue::List(Vec::new()));
    for (index, item) in items.into_iter().enumerate() {
        let kind = if item.is_null() {
            NodeKind::Null
        } else {
            node_kind(ctx.schema, &item_ty)
        };
        let item_id = tree.add_child(ExecutionNode::new(
            id,
            kind,
            item_ty.clone(),
            fields.clone(),
            Some(index),
            NodeOrigin::ListItem,
        ));
        complete_node(ctx, tree, item_id, item);
    }
    Ok(())
}

fn complete_object<'a>(
    ctx: &ExecutionContext<'a>,
    tree: &mut NodeTree<'a>,
    id: NodeId,
    value: FieldValue,
) -> Result<(), ExecutionError> {
    let node = tree.get(id);
    let ty_name = node.ty.inner_named_type();
    match &value {
        FieldValue::Object(_) | FieldValue::Json(JsonValue::Object(_)) => {}
        FieldValue::List(_) | FieldValue::Json(JsonValue::Array(_)) => {
            return Err(ExecutionError::new(format!(
                "Non-list type {} resolved to a list",
                node.ty
            )))
        }
        FieldValue::Json(_) => {
            return Err(ExecutionError::new(format!(
                "resolver returned a leaf value but expected an object for type {ty_name}"
            )))
        }
    }
    let object_type = resolve_object_type(ctx, ty_name, &value)?;
    let selections: Vec<&'a Selection> = node
        .fields
        .iter()
        .flat_map(|field| &field.selection_set.selections)
        .collect();
    let node = tree.get_mut(id);
    node.result = NodeResult::Resolved(value);
    if let NodeKind::Object {
        object_type: concrete,
        ..
    } = &mut node.kind
    {
        *concrete = Some(object_type)
    }
    add_sub_fields(ctx, tree, id, object_type, selections);
    Ok(())
}

/// <https://spec.graphql.org/October2021/#ResolveAbstractType()>
///
/// For an abstract type, the concrete type comes from a registered type resolver,
/// or else the type name carried by the value.
fn resolve_object_type<'a>(
    ctx: &ExecutionContext<'a>,
    ty_name: &Name,
    value: &FieldValue,
) -> Result<&'a ObjectType, ExecutionError> {
    let schema: &'a Schema = ctx.schema;
    macro_rules! type_error {
        ($($arg: tt)+) => {
            return Err(ExecutionError::new(format!($($arg)+)))
        };
    }
    let Some(ty_def) = schema.types.get(ty_name) else {
        type_error!("undefined type {ty_name}")
    };
    match ty_def {
        ExtendedType::Object(def) => {
            if let Some(resolved_type_name) = value.type_name_hint() {
                if resolved_type_name != ty_name.as_str() {
                    type_error!(
                        "resolver returned an object of type {resolved_type_name}, \
                         expected {ty_name}"
                    )
                }
            }
            Ok(def.as_ref())
        }
        ExtendedType::Interface(_) | ExtendedType::Union(_) => {
            let resolved_type_name = ctx
                .resolvers
                .resolve_type(ty_name, value)
                .or_else(|| value.type_name_hint().map(str::to_owned));
            let Some(resolved_type_name) = resolved_type_name else {
                type_error!("could not determine the object type of a value of abstract type {ty_name}")
            };
            let Some(object_def) = schema.get_object(&resolved_type_name) else {
                type_error!(
                    "resolver returned an object of type {resolved_type_name} \
                     not defined in the schema"
                )
            };
            if let ExtendedType::Union(union_def) = ty_def {
                if !union_def.members.contains(&object_def.name) {
                    type_error!(
                        "resolver returned an object of type {resolved_type_name}, \
                         expected a member of union type {ty_name}"
                    )
                }
            } else if !object_def.implements_interfaces.contains(ty_name) {
                type_error!(
                    "resolver returned an object of type {resolved_type_name} \
                     which does not implement interface {ty_name}"
                )
            }
            Ok(object_def.as_ref())
        }
        ExtendedType::Scalar(_) | ExtendedType::Enum(_) | ExtendedType::InputObject(_) => {
            type_error!("resolver returned an object, expected {ty_name}")
        }
    }
}

/// Groups selections by response key and adds one unresolved node per group.
/// `__typename` nodes are completed immediately.
fn add_sub_fields<'a>(
    ctx: &ExecutionContext<'a>,
    tree: &mut NodeTree<'a>,
    parent: NodeId,
    object_type: &'a ObjectType,
    selections: impl IntoIterator<Item = &'a Selection>,
) {
    let mut grouped_field_set = IndexMap::new();
    collect_fields(
        ctx,
        object_type,
        selections,
        &mut HashSet::new(),
        &mut grouped_field_set,
    );
    for fields in grouped_field_set.into_values() {
        // Indexing should not panic: `collect_fields` only creates a `Vec` to push to it
        let ty = fields[0].ty().clone();
        let is_typename = fields[0].name.as_str() == "__typename";
        let kind = node_kind(ctx.schema, &ty);
        let child = tree.add_child(ExecutionNode::new(
            parent,
            kind,
            ty,
            fields,
            None,
            NodeOrigin::Field,
        ));
        if is_typename {
            tree.get_mut(child).result =
                NodeResult::Resolved(FieldValue::json(object_type.name.as_str()));
        }
    }
}

/// <https://spec.graphql.org/October2021/#CollectFields()>
pub(crate) fn collect_fields<'a>(
    ctx: &ExecutionContext<'a>,
    object_type: &ObjectType,
    selections: impl IntoIterator<Item = &'a Selection>,
    visited_fragments: &mut HashSet<&'a Name>,
    grouped_fields: &mut IndexMap<&'a Name, Vec<&'a Field>>,
) {
    for selection in selections {
        if eval_if_arg(selection, "skip", ctx.variable_values).unwrap_or(false)
            || !eval_if_arg(selection, "include", ctx.variable_values).unwrap_or(true)
        {
            continue;
        }
        match selection {
            Selection::Field(field) => grouped_fields
                .entry(field.response_key())
                .or_default()
                .push(field.as_ref()),
            Selection::FragmentSpread(spread) => {
                if !visited_fragments.insert(&spread.fragment_name) {
                    continue;
                }
                let Some(fragment) = ctx.document.fragments.get(&spread.fragment_name) else {
                    continue;
                };
                if does_fragment_type_apply(ctx.schema, object_type, fragment.type_condition()) {
                    collect_fields(
                        ctx,
                        object_type,
                        &fragment.selection_set.selections,
                        visited_fragments,
                        grouped_fields,
                    )
                }
            }
            Selection::InlineFragment(inline) => {
                let applies = inline.type_condition.as_ref().map_or(true, |condition| {
                    does_fragment_type_apply(ctx.schema, object_type, condition)
                });
                if applies {
                    collect_fields(
                        ctx,
                        object_type,
                        &inline.selection_set.selections,
                        visited_fragments,
                        grouped_fields,
                    )
                }
            }
        }
    }
}

/// <https://spec.graphql.org/October2021/#DoesFragmentTypeApply()>
fn does_fragment_type_apply(schema: &Schema, object_type: &ObjectType, fragment_type: &Name) -> bool {
    match schema.types.get(fragment_type) {
        Some(ExtendedType::Object(_)) => *fragment_type == object_type.name,
        Some(ExtendedType::Interface(_)) => object_type.implements_interfaces.contains(fragment_type),
        Some(ExtendedType::Union(def)) => def.members.contains(&object_type.name),
        _ => false,
    }
}

fn eval_if_arg(selection: &Selection, directive_name: &str, variable_values: &JsonMap) -> Option<bool> {
    match selection
        .directives()
        .get(directive_name)?
        .specified_argument_by_name("if")?
        .as_ref()
    {
        Value::Boolean(value) => Some(*value),
        Value::Variable(var) => variable_values.get(var.as_str())?.as_bool(),
        _ => None,
    }
}

/// Result coercion of a scalar or enum value
///
/// <https://spec.graphql.org/October2021/#CompleteValue()>
pub(crate) fn complete_leaf(schema: &Schema, ty: &Type, value: FieldValue) -> Result<JsonValue, ExecutionError> {
    let ty_name = ty.inner_named_type();
    let json_value = match value {
        FieldValue::Json(json) => json,
        FieldValue::Object(_) => {
            return Err(ExecutionError::new(format!(
                "resolver returned an object, expected {ty_name}"
            )))
        }
        FieldValue::List(_) => {
            return Err(ExecutionError::new(format!(
                "Non-list type {ty} resolved to a list"
            )))
        }
    };
    macro_rules! coercion_error {
        ($($arg: tt)+) => {
            return Err(ExecutionError::new(format!($($arg)+)))
        };
    }
    match schema.types.get(ty_name) {
        Some(ExtendedType::Enum(enum_def)) => {
            // https://spec.graphql.org/October2021/#sec-Enums.Result-Coercion
            if !json_value
                .as_str()
                .is_some_and(|str| enum_def.values.contains_key(str))
            {
                coercion_error!("resolver returned {json_value}, expected enum {ty_name}")
            }
        }
        Some(ExtendedType::Scalar(_)) => match ty_name.as_str() {
            "Int" => {
                // https://spec.graphql.org/October2021/#sec-Int.Result-Coercion
                match json_value.as_i64() {
                    Some(int) if i32::try_from(int).is_err() => {
                        coercion_error!("resolver returned {json_value} which overflows Int")
                    }
                    Some(_) => {}
                    None => coercion_error!("resolver returned {json_value}, expected Int"),
                }
            }
            "Float" => {
                // https://spec.graphql.org/October2021/#sec-Float.Result-Coercion
                // Integers are valid floats
                if !json_value.is_number() {
                    coercion_error!("resolver returned {json_value}, expected Float")
                }
            }
            "String" => {
                if !json_value.is_string() {
                    coercion_error!("resolver returned {json_value}, expected String")
                }
            }
            "Boolean" => {
                if !json_value.is_boolean() {
                    coercion_error!("resolver returned {json_value}, expected Boolean")
                }
            }
            "ID" => {
                // https://spec.graphql.org/October2021/#sec-ID.Result-Coercion
                if !(json_value.is_string() || json_value.is_i64()) {
                    coercion_error!("resolver returned {json_value}, expected ID")
                }
            }
            _ => {
                // Custom scalar: any JSON value is passed through
            }
        },
        _ => coercion_error!("resolver returned a leaf value but expected an object for type {ty_name}"),
    }
    Ok(json_value)
}
