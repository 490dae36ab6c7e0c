//! String functions
//!
//! Positions and widths count Unicode scalar values, not bytes.

use crate::descriptor::FunctionDescriptor;
use crate::plugin::FunctionPlugin;
use crate::registry::FunctionRegistry;
use sluice_types::{Type, Value};
use std::collections::BTreeMap;

/// Case conversion, searching, slicing, splitting and joining
#[derive(Debug, Default)]
pub struct StringFunctions;

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn abbreviate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    let keep = width.saturating_sub(3);
    let mut out: String = value.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Resolve a possibly negative position against a length, clamped to `0..=len`
fn resolve_index(index: i64, len: usize) -> usize {
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let resolved = if index < 0 { len_i + index } else { index };
    usize::try_from(resolved.clamp(0, len_i)).unwrap_or(len)
}

fn substring(value: &str, start: i64, end: Option<i64>) -> Option<String> {
    let len = value.chars().count();
    let from = resolve_index(start, len);
    let to = end.map_or(len, |e| resolve_index(e, len));
    if from > to {
        return None;
    }
    Some(value.chars().skip(from).take(to - from).collect())
}

fn key_value(value: &str, delimiters: &str, kv_delimiters: &str) -> BTreeMap<String, Value> {
    value
        .split(|c: char| delimiters.contains(c))
        .filter_map(|pair| {
            let (key, val) = pair.split_once(|c: char| kv_delimiters.contains(c))?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            let val = val.trim().trim_matches(|c: char| c == '"' || c == '\'');
            Some((key.to_string(), Value::from(val)))
        })
        .collect()
}

fn search(value: &str, needle: &str, ignore_case: bool, f: fn(&str, &str) -> bool) -> Value {
    if ignore_case {
        Value::Boolean(f(&value.to_lowercase(), &needle.to_lowercase()))
    } else {
        Value::Boolean(f(value, needle))
    }
}

impl FunctionPlugin for StringFunctions {
    fn name(&self) -> &str {
        "strings"
    }

    #[allow(clippy::too_many_lines)]
    fn register(&self, registry: &mut FunctionRegistry) {
        registry.register(
            FunctionDescriptor::new("lowercase", Type::String)
                .param("value", Type::String)
                .describe("Lowercases a string"),
            |_, args| Ok(Value::String(args.string(0)?.to_lowercase())),
        );

        registry.register(
            FunctionDescriptor::new("uppercase", Type::String)
                .param("value", Type::String)
                .describe("Uppercases a string"),
            |_, args| Ok(Value::String(args.string(0)?.to_uppercase())),
        );

        registry.register(
            FunctionDescriptor::new("capitalize", Type::String)
                .param("value", Type::String)
                .describe("Uppercases the first character of a string"),
            |_, args| Ok(Value::String(capitalize(args.string(0)?))),
        );

        registry.register(
            FunctionDescriptor::new("trim", Type::String)
                .param("value", Type::String)
                .describe("Removes leading and trailing whitespace"),
            |_, args| Ok(Value::String(args.string(0)?.trim().to_string())),
        );

        registry.register(
            FunctionDescriptor::new("abbreviate", Type::String)
                .param("value", Type::String)
                .param("width", Type::Long)
                .describe("Abbreviates a string with an ellipsis so it is at most width characters"),
            |_, args| {
                let width = args.long(1)?;
                if width < 4 {
                    return Err(args.fail(format!("width must be at least 4, got {width}")));
                }
                let width = usize::try_from(width).unwrap_or(usize::MAX);
                Ok(Value::String(abbreviate(args.string(0)?, width)))
            },
        );

        registry.register(
            FunctionDescriptor::new("contains", Type::Boolean)
                .param("value", Type::String)
                .param("search", Type::String)
                .optional_or("ignore_case", Type::Boolean, Value::Boolean(false))
                .describe("Checks whether a string contains another string"),
            |_, args| Ok(search(args.string(0)?, args.string(1)?, args.boolean(2)?, |a, b| a.contains(b))),
        );

        registry.register(
            FunctionDescriptor::new("starts_with", Type::Boolean)
                .param("value", Type::String)
                .param("prefix", Type::String)
                .optional_or("ignore_case", Type::Boolean, Value::Boolean(false))
                .describe("Checks whether a string starts with a prefix"),
            |_, args| Ok(search(args.string(0)?, args.string(1)?, args.boolean(2)?, |a, b| a.starts_with(b))),
        );

        registry.register(
            FunctionDescriptor::new("ends_with", Type::Boolean)
                .param("value", Type::String)
                .param("suffix", Type::String)
                .optional_or("ignore_case", Type::Boolean, Value::Boolean(false))
                .describe("Checks whether a string ends with a suffix"),
            |_, args| Ok(search(args.string(0)?, args.string(1)?, args.boolean(2)?, |a, b| a.ends_with(b))),
        );

        registry.register(
            FunctionDescriptor::new("substring", Type::String)
                .param("value", Type::String)
                .param("start", Type::Long)
                .optional("end", Type::Long)
                .describe("Characters from start up to end; negative positions count from the end"),
            |_, args| {
                let (start, end) = (args.long(1)?, args.opt_long(2)?);
                substring(args.string(0)?, start, end)
                    .map(Value::String)
                    .ok_or_else(|| args.fail(format!("start {start} is after end {}", end.unwrap_or_default())))
            },
        );

        registry.register(
            FunctionDescriptor::new("concat", Type::String)
                .param("first", Type::String)
                .param("second", Type::String)
                .describe("Concatenates two strings"),
            |_, args| Ok(Value::String(format!("{}{}", args.string(0)?, args.string(1)?))),
        );

        registry.register(
            FunctionDescriptor::new("replace", Type::String)
                .param("value", Type::String)
                .param("search", Type::String)
                .optional_or("replacement", Type::String, Value::from(""))
                .optional_or("max", Type::Long, Value::Long(-1))
                .describe("Replaces occurrences of search; max limits the count, -1 replaces all"),
            |_, args| {
                let (value, needle, replacement) = (args.string(0)?, args.string(1)?, args.string(2)?);
                if needle.is_empty() {
                    return Ok(Value::from(value));
                }
                Ok(Value::String(match usize::try_from(args.long(3)?) {
                    Ok(max) => value.replacen(needle, replacement, max),
                    Err(_) => value.replace(needle, replacement),
                }))
            },
        );

        registry.register(
            FunctionDescriptor::new("join", Type::String)
                .param("elements", Type::array(Type::Any))
                .optional_or("delimiter", Type::String, Value::from(""))
                .describe("Joins array elements with a delimiter"),
            |_, args| {
                let parts: Vec<String> = args.array(0)?.iter().map(ToString::to_string).collect();
                Ok(Value::String(parts.join(args.string(1)?)))
            },
        );

        registry.register(
            FunctionDescriptor::new("length", Type::Long)
                .param("value", Type::Any)
                .describe("Length of a string in characters, or the size of an array or map"),
            |_, args| {
                let len = match args.get(0) {
                    Value::String(s) => s.chars().count(),
                    Value::Array(items) => items.len(),
                    Value::Map(map) => map.len(),
                    other => return Err(args.fail(format!("cannot take the length of a {}", other.type_name()))),
                };
                Ok(Value::Long(i64::try_from(len).unwrap_or(i64::MAX)))
            },
        );

        registry.register(
            FunctionDescriptor::new("key_value", Type::Map)
                .param("value", Type::String)
                .optional_or("delimiters", Type::String, Value::from(" "))
                .optional_or("kv_delimiters", Type::String, Value::from("="))
                .describe("Parses `k=v` pairs into a map, stripping quotes around values"),
            |_, args| Ok(Value::Map(key_value(args.string(0)?, args.string(1)?, args.string(2)?))),
        );
    }
}
