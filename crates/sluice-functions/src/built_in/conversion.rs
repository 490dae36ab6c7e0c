//! Conversion functions
//!
//! Message fields are typed `Any`; these are the way a rule turns field content
//! into a concrete type. Conversions never fail: unconvertible input yields the
//! caller-supplied default.

use crate::descriptor::FunctionDescriptor;
use crate::plugin::FunctionPlugin;
use crate::registry::FunctionRegistry;
use sluice_types::{Type, Value};
use std::collections::BTreeMap;

/// `to_string`, `to_long`, `to_double`, `to_bool`, `to_map`, `to_array`
#[derive(Debug, Default)]
pub struct ConversionFunctions;

/// Best-effort integer view of a value
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn long_of(value: &Value) -> Option<i64> {
    match value {
        Value::Long(i) => Some(*i),
        Value::Double(d) if d.is_finite() => Some(*d as i64),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Best-effort floating point view of a value
#[must_use]
pub fn double_of(value: &Value) -> Option<f64> {
    match value {
        Value::Long(_) | Value::Double(_) => value.as_double(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn bool_of(value: &Value) -> bool {
    match value {
        Value::Boolean(b) => *b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        Value::Long(i) => *i != 0,
        Value::Double(d) => *d != 0.0,
        _ => false,
    }
}

impl FunctionPlugin for ConversionFunctions {
    fn name(&self) -> &str {
        "conversion"
    }

    fn register(&self, registry: &mut FunctionRegistry) {
        registry.register(
            FunctionDescriptor::new("to_string", Type::String)
                .param("value", Type::Any)
                .optional_or("default", Type::String, Value::from(""))
                .describe("Converts a value to its string representation"),
            |_, args| {
                Ok(match args.get(0) {
                    Value::Null => args.get(1).clone(),
                    Value::String(s) => Value::String(s.clone()),
                    other => Value::String(other.to_string()),
                })
            },
        );

        registry.register(
            FunctionDescriptor::new("to_long", Type::Long)
                .param("value", Type::Any)
                .optional_or("default", Type::Long, Value::Long(0))
                .describe("Converts a value to a long, returning the default when it cannot"),
            |_, args| match long_of(args.get(0)) {
                Some(i) => Ok(Value::Long(i)),
                None => Ok(Value::Long(args.long(1)?)),
            },
        );

        registry.register(
            FunctionDescriptor::new("to_double", Type::Double)
                .param("value", Type::Any)
                .optional_or("default", Type::Double, Value::Double(0.0))
                .describe("Converts a value to a double, returning the default when it cannot"),
            |_, args| match double_of(args.get(0)) {
                Some(d) => Ok(Value::Double(d)),
                None => Ok(Value::Double(args.double(1)?)),
            },
        );

        registry.register(
            FunctionDescriptor::new("to_bool", Type::Boolean)
                .param("value", Type::Any)
                .describe("Converts a value to a boolean; only \"true\", true and non-zero numbers are true"),
            |_, args| Ok(Value::Boolean(bool_of(args.get(0)))),
        );

        registry.register(
            FunctionDescriptor::new("to_map", Type::Map)
                .param("value", Type::Any)
                .describe("Returns the value if it is a map, otherwise an empty map"),
            |_, args| {
                Ok(match args.get(0) {
                    Value::Map(map) => Value::Map(map.clone()),
                    _ => Value::Map(BTreeMap::new()),
                })
            },
        );

        registry.register(
            FunctionDescriptor::new("to_array", Type::array(Type::Any))
                .param("value", Type::Any)
                .describe("Returns arrays unchanged, null as an empty array and wraps anything else"),
            |_, args| {
                Ok(match args.get(0) {
                    Value::Array(items) => Value::Array(items.clone()),
                    Value::Null => Value::Array(Vec::new()),
                    other => Value::Array(vec![other.clone()]),
                })
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_of() {
        assert_eq!(long_of(&Value::from(" 503 ")), Some(503));
        assert_eq!(long_of(&Value::Double(2.9)), Some(2));
        assert_eq!(long_of(&Value::from("abc")), None);
        assert_eq!(long_of(&Value::Double(f64::NAN)), None);
        assert_eq!(long_of(&Value::Null), None);
    }

    #[test]
    fn test_bool_of() {
        assert!(bool_of(&Value::from("TRUE")));
        assert!(!bool_of(&Value::from("yes")));
        assert!(bool_of(&Value::Long(2)));
        assert!(!bool_of(&Value::Null));
    }
}
