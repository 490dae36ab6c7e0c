//! Runtime type checks over `Any` values.

use crate::descriptor::FunctionDescriptor;
use crate::plugin::FunctionPlugin;
use crate::registry::FunctionRegistry;
use sluice_types::{Type, Value};

/// `is_string`, `is_long`, `is_double`, `is_number`, `is_bool`, `is_null`,
/// `is_not_null`, `is_list`, `is_map`
#[derive(Debug, Default)]
pub struct TypeCheckFunctions;

const CHECKS: &[(&str, fn(&Value) -> bool, &str)] = &[
    ("is_string", |v| matches!(v, Value::String(_)), "Checks whether the value is a string"),
    ("is_long", |v| matches!(v, Value::Long(_)), "Checks whether the value is a long"),
    ("is_double", |v| matches!(v, Value::Double(_)), "Checks whether the value is a double"),
    (
        "is_number",
        |v| matches!(v, Value::Long(_) | Value::Double(_)),
        "Checks whether the value is a long or a double",
    ),
    ("is_bool", |v| matches!(v, Value::Boolean(_)), "Checks whether the value is a boolean"),
    ("is_null", Value::is_null, "Checks whether the value is null"),
    ("is_not_null", |v| !v.is_null(), "Checks whether the value is not null"),
    ("is_list", |v| matches!(v, Value::Array(_)), "Checks whether the value is an array"),
    ("is_map", |v| matches!(v, Value::Map(_)), "Checks whether the value is a map"),
];

impl FunctionPlugin for TypeCheckFunctions {
    fn name(&self) -> &str {
        "checks"
    }

    fn register(&self, registry: &mut FunctionRegistry) {
        for &(name, check, description) in CHECKS {
            registry.register(
                FunctionDescriptor::new(name, Type::Boolean)
                    .param("value", Type::Any)
                    .describe(description),
                move |_, args| Ok(Value::Boolean(check(args.get(0)))),
            );
        }
    }
}
