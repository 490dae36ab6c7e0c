//! JSON functions.

use crate::descriptor::FunctionDescriptor;
use crate::plugin::FunctionPlugin;
use crate::registry::FunctionRegistry;
use sluice_types::{Type, Value};

/// `parse_json`
#[derive(Debug, Default)]
pub struct JsonFunctions;

impl FunctionPlugin for JsonFunctions {
    fn name(&self) -> &str {
        "json"
    }

    fn register(&self, registry: &mut FunctionRegistry) {
        registry.register(
            FunctionDescriptor::new("parse_json", Type::Map)
                .param("value", Type::String)
                .describe("Parses a JSON object into a map"),
            |_, args| {
                let parsed: serde_json::Value = serde_json::from_str(args.string(0)?)
                    .map_err(|e| args.fail(format!("invalid JSON: {e}")))?;
                match Value::from(&parsed) {
                    map @ Value::Map(_) => Ok(map),
                    other => Err(args.fail(format!("expected a JSON object, found {}", other.type_name()))),
                }
            },
        );
    }
}
