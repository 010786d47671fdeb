use crate::error::ExecutionError;
use crate::JsonMap;
use crate::JsonValue;
use apollo_compiler::ast::Value;
use apollo_compiler::executable::Field;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::FieldDefinition;
use apollo_compiler::schema::Type;
use apollo_compiler::Node;
use apollo_compiler::Schema;

macro_rules! coercion_error {
    ($($arg: tt)+) => {
        return Err(ExecutionError::new(format!($($arg)+)))
    };
}

/// <https://spec.graphql.org/October2021/#sec-Coercing-Field-Arguments>
///
/// `variable_values` are expected to be coerced already.
pub(crate) fn coerce_argument_values(
    schema: &Schema,
    variable_values: &JsonMap,
    field_def: &FieldDefinition,
    field: &Field,
) -> Result<JsonMap, ExecutionError> {
    let mut coerced_values = JsonMap::new();
    for arg_def in &field_def.arguments {
        let arg_name = &arg_def.name;
        let what = format!("argument {arg_name}");
        let provided = field.arguments.iter().find(|arg| arg.name == *arg_name);
        if let Some(arg) = provided {
            match arg.value.as_variable() {
                Some(var_name) => {
                    // An unset variable falls back to the default value below
                    if let Some(var_value) = variable_values.get(var_name.as_str()) {
                        if var_value.is_null() && arg_def.ty.is_non_null() {
                            coercion_error!("null value for non-nullable {what}")
                        }
                        coerced_values.insert(arg_name.as_str(), var_value.clone());
                        continue;
                    }
                }
                None => {
                    let value =
                        coerce_argument_value(schema, variable_values, &what, &arg_def.ty, &arg.value)?;
                    coerced_values.insert(arg_name.as_str(), value);
                    continue;
                }
            }
        }
        if let Some(default) = &arg_def.default_value {
            coerced_values.insert(arg_name.as_str(), graphql_value_to_json(&what, default)?);
        } else if arg_def.ty.is_non_null() {
            coercion_error!("missing value for required {what}")
        }
    }
    Ok(coerced_values)
}

fn coerce_argument_value(
    schema: &Schema,
    variable_values: &JsonMap,
    what: &str,
    ty: &Type,
    value: &Node<Value>,
) -> Result<JsonValue, ExecutionError> {
    if value.is_null() {
        if ty.is_non_null() {
            coercion_error!("null value for non-null {what}")
        }
        return Ok(JsonValue::Null);
    }
    if let Some(var_name) = value.as_variable() {
        return match variable_values.get(var_name.as_str()) {
            Some(var_value) if var_value.is_null() && ty.is_non_null() => {
                coercion_error!("null variable value for non-null {what}")
            }
            Some(var_value) => Ok(var_value.clone()),
            None if ty.is_non_null() => coercion_error!("missing variable for non-null {what}"),
            None => Ok(JsonValue::Null),
        };
    }
    let ty_name = match ty {
        Type::List(item_ty) | Type::NonNullList(item_ty) => {
            // https://spec.graphql.org/October2021/#sec-List.Input-Coercion
            return value
                .as_list()
                // A single value is coerced to a list of one
                .unwrap_or(std::slice::from_ref(value))
                .iter()
                .map(|item| coerce_argument_value(schema, variable_values, what, item_ty, item))
                .collect();
        }
        Type::Named(ty_name) | Type::NonNullNamed(ty_name) => ty_name,
    };
    match schema.types.get(ty_name) {
        Some(ExtendedType::InputObject(ty_def)) => {
            // https://spec.graphql.org/October2021/#sec-Input-Objects.Input-Coercion
            let Some(object) = value.as_object() else {
                coercion_error!("could not coerce {what}: {value} to type {ty_name}")
            };
            if let Some((key, _)) = object
                .iter()
                .find(|(key, _)| !ty_def.fields.contains_key(key))
            {
                coercion_error!("input object has key {key} not in type {ty_name}")
            }
            let mut coerced_object = JsonMap::new();
            for (field_name, field_def) in &ty_def.fields {
                let what = format!("input field {ty_name}.{field_name}");
                let provided = object.iter().find(|(key, _)| key == field_name);
                if let Some((_, field_value)) = provided {
                    let coerced =
                        coerce_argument_value(schema, variable_values, &what, &field_def.ty, field_value)?;
                    coerced_object.insert(field_name.as_str(), coerced);
                } else if let Some(default) = &field_def.default_value {
                    coerced_object.insert(field_name.as_str(), graphql_value_to_json(&what, default)?);
                } else if field_def.ty.is_non_null() {
                    coercion_error!("missing value for non-null {what}")
                }
            }
            Ok(coerced_object.into())
        }
        Some(_) => {
            // Scalars and enums were checked by validation, only convert the representation
            graphql_value_to_json(what, value)
        }
        None => coercion_error!("undefined type {ty_name} for {what}"),
    }
}

/// Converts a constant GraphQL value to JSON
pub(crate) fn graphql_value_to_json(what: &str, value: &Value) -> Result<JsonValue, ExecutionError> {
    match value {
        Value::Null => Ok(JsonValue::Null),
        Value::Variable(var_name) => coercion_error!("unexpected variable ${var_name} in {what}"),
        Value::Enum(value) => Ok(value.as_str().into()),
        Value::String(value) => Ok(value.as_str().into()),
        Value::Boolean(value) => Ok((*value).into()),
        // serde_json parses numbers with whatever precision it supports
        Value::Int(value) => match value.as_str().parse() {
            Ok(number) => Ok(JsonValue::Number(number)),
            Err(_) => coercion_error!("Int value overflow in {what}"),
        },
        Value::Float(value) => match value.as_str().parse() {
            Ok(number) => Ok(JsonValue::Number(number)),
            Err(_) => coercion_error!("Float value overflow in {what}"),
        },
        Value::List(items) => items
            .iter()
            .map(|item| graphql_value_to_json(what, item))
            .collect(),
        Value::Object(fields) => fields
            .iter()
            .map(|(key, value)| Ok((key.as_str(), graphql_value_to_json(what, value)?)))
            .collect(),
    }
}
