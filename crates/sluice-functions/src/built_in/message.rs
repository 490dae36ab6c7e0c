//! Message functions
//!
//! Everything here reads or changes the message being processed, so none of
//! these functions are pure. Mutations are performed through the call
//! context's effect capabilities.

use crate::descriptor::FunctionDescriptor;
use crate::plugin::FunctionPlugin;
use crate::registry::FunctionRegistry;
use sluice_types::{EvaluationError, Type, Value};

/// `has_field`, `set_field`, `set_fields`, `rename_field`, `remove_field`,
/// `route_to_stream`, `remove_from_stream`, `drop_message`, `stop_processing`, `debug`
#[derive(Debug, Default)]
pub struct MessageFunctions;

fn field_name(function: &str, prefix: &str, name: &str, suffix: &str) -> Result<String, EvaluationError> {
    let full = format!("{prefix}{name}{suffix}");
    if full.trim().is_empty() {
        return Err(EvaluationError::function(function, "field name must not be empty"));
    }
    Ok(full)
}

impl FunctionPlugin for MessageFunctions {
    fn name(&self) -> &str {
        "message"
    }

    fn register(&self, registry: &mut FunctionRegistry) {
        registry.register(
            FunctionDescriptor::new("has_field", Type::Boolean)
                .param("field", Type::String)
                .effecting()
                .describe("Checks whether the message has the given field"),
            |ctx, args| Ok(Value::Boolean(ctx.message().has_field(args.string(0)?))),
        );

        registry.register(
            FunctionDescriptor::new("set_field", Type::Void)
                .param("field", Type::String)
                .param("value", Type::Any)
                .optional_or("prefix", Type::String, Value::from(""))
                .optional_or("suffix", Type::String, Value::from(""))
                .effecting()
                .describe("Sets a field on the message"),
            |ctx, args| {
                let name = field_name(args.function(), args.string(2)?, args.string(0)?, args.string(3)?)?;
                ctx.set_field(&name, args.get(1).clone());
                Ok(Value::Null)
            },
        );

        registry.register(
            FunctionDescriptor::new("set_fields", Type::Void)
                .param("fields", Type::Map)
                .optional_or("prefix", Type::String, Value::from(""))
                .optional_or("suffix", Type::String, Value::from(""))
                .effecting()
                .describe("Sets every entry of a map as a message field"),
            |ctx, args| {
                let (prefix, suffix) = (args.string(1)?, args.string(2)?);
                for (name, value) in args.map(0)? {
                    let name = field_name(args.function(), prefix, name, suffix)?;
                    ctx.set_field(&name, value.clone());
                }
                Ok(Value::Null)
            },
        );

        registry.register(
            FunctionDescriptor::new("rename_field", Type::Void)
                .param("old_field", Type::String)
                .param("new_field", Type::String)
                .effecting()
                .describe("Renames a message field; absent fields are left alone"),
            |ctx, args| {
                let new = field_name(args.function(), "", args.string(1)?, "")?;
                ctx.rename_field(args.string(0)?, &new);
                Ok(Value::Null)
            },
        );

        registry.register(
            FunctionDescriptor::new("remove_field", Type::Void)
                .param("field", Type::String)
                .effecting()
                .describe("Removes a field from the message"),
            |ctx, args| {
                ctx.remove_field(args.string(0)?);
                Ok(Value::Null)
            },
        );

        registry.register(
            FunctionDescriptor::new("route_to_stream", Type::Void)
                .param("id", Type::String)
                .effecting()
                .describe("Routes the message to a stream"),
            |ctx, args| {
                let id = args.string(0)?;
                if id.is_empty() {
                    return Err(args.fail("stream id must not be empty"));
                }
                ctx.route_to_stream(id);
                Ok(Value::Null)
            },
        );

        registry.register(
            FunctionDescriptor::new("remove_from_stream", Type::Void)
                .param("id", Type::String)
                .effecting()
                .describe("Removes the message from a stream"),
            |ctx, args| {
                ctx.remove_from_stream(args.string(0)?);
                Ok(Value::Null)
            },
        );

        registry.register(
            FunctionDescriptor::new("drop_message", Type::Void)
                .effecting()
                .describe("Drops the message; the current pipeline ends after this stage"),
            |ctx, _| {
                ctx.drop_message();
                Ok(Value::Null)
            },
        );

        registry.register(
            FunctionDescriptor::new("stop_processing", Type::Void)
                .effecting()
                .describe("Skips the remaining stages of the current pipeline"),
            |ctx, _| {
                ctx.stop_processing();
                Ok(Value::Null)
            },
        );

        registry.register(
            FunctionDescriptor::new("debug", Type::Void)
                .param("value", Type::Any)
                .effecting()
                .describe("Emits the value on the debug channel"),
            |ctx, args| {
                ctx.debug(args.get(0));
                Ok(Value::Null)
            },
        );
    }
}
