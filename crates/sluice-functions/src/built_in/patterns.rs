//! Regular expression functions
//!
//! Patterns usually come from rule literals and repeat for every message, so
//! compiled expressions are cached per plugin instance. A malformed pattern is
//! a runtime failure of the calling statement.

use crate::args::Args;
use crate::descriptor::FunctionDescriptor;
use crate::plugin::FunctionPlugin;
use crate::registry::FunctionRegistry;
use dashmap::DashMap;
use regex::Regex;
use sluice_types::{EvaluationError, Type, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

const MAX_CACHED_PATTERNS: usize = 1024;

/// `regex`, `regex_replace`, `split`
#[derive(Debug, Default)]
pub struct PatternFunctions {
    cache: Arc<RegexCache>,
}

/// Shared cache of compiled patterns
#[derive(Debug, Default)]
pub struct RegexCache {
    compiled: DashMap<String, Regex>,
}

impl RegexCache {
    /// Compile or fetch a pattern
    ///
    /// # Errors
    ///
    /// Returns a function failure when the pattern does not compile.
    pub fn get(&self, args: &Args<'_>, pattern: &str) -> Result<Regex, EvaluationError> {
        if let Some(regex) = self.compiled.get(pattern) {
            return Ok(regex.clone());
        }
        let regex = Regex::new(pattern)
            .map_err(|e| args.fail(format!("invalid regular expression '{pattern}': {e}")))?;
        if self.compiled.len() >= MAX_CACHED_PATTERNS {
            self.compiled.clear();
        }
        self.compiled.insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }
}

fn capture_map(regex: &Regex, value: &str, group_names: Option<&[Value]>) -> BTreeMap<String, Value> {
    let mut result = BTreeMap::new();
    let Some(captures) = regex.captures(value) else {
        result.insert("matches".to_string(), Value::Boolean(false));
        return result;
    };
    result.insert("matches".to_string(), Value::Boolean(true));

    let names: Vec<Option<&str>> = regex.capture_names().collect();
    for (index, group) in captures.iter().enumerate().skip(1) {
        let Some(group) = group else { continue };
        let key = group_names
            .and_then(|g| g.get(index - 1))
            .and_then(Value::as_str)
            .or(names.get(index).copied().flatten())
            .map_or_else(|| (index - 1).to_string(), str::to_string);
        result.insert(key, Value::from(group.as_str()));
    }
    result
}

impl FunctionPlugin for PatternFunctions {
    fn name(&self) -> &str {
        "patterns"
    }

    fn register(&self, registry: &mut FunctionRegistry) {
        let cache = Arc::clone(&self.cache);
        registry.register(
            FunctionDescriptor::new("regex", Type::Map)
                .param("pattern", Type::String)
                .param("value", Type::String)
                .optional("group_names", Type::array(Type::String))
                .describe(
                    "Matches a pattern; returns {matches: bool} plus capture groups keyed by \
                     group_names, named groups or position",
                ),
            move |_, args| {
                let regex = cache.get(args, args.string(0)?)?;
                let names = match args.get(2) {
                    Value::Null => None,
                    _ => Some(args.array(2)?),
                };
                Ok(Value::Map(capture_map(&regex, args.string(1)?, names)))
            },
        );

        let cache = Arc::clone(&self.cache);
        registry.register(
            FunctionDescriptor::new("regex_replace", Type::String)
                .param("pattern", Type::String)
                .param("value", Type::String)
                .param("replacement", Type::String)
                .optional_or("replace_all", Type::Boolean, Value::Boolean(true))
                .describe("Replaces pattern matches; $1 or ${name} refer to capture groups"),
            move |_, args| {
                let regex = cache.get(args, args.string(0)?)?;
                let (value, replacement) = (args.string(1)?, args.string(2)?);
                let replaced = if args.boolean(3)? {
                    regex.replace_all(value, replacement)
                } else {
                    regex.replace(value, replacement)
                };
                Ok(Value::String(replaced.into_owned()))
            },
        );

        let cache = Arc::clone(&self.cache);
        registry.register(
            FunctionDescriptor::new("split", Type::array(Type::String))
                .param("pattern", Type::String)
                .param("value", Type::String)
                .optional_or("limit", Type::Long, Value::Long(0))
                .describe("Splits a string around pattern matches; a positive limit caps the parts"),
            move |_, args| {
                let regex = cache.get(args, args.string(0)?)?;
                let value = args.string(1)?;
                let parts: Vec<Value> = match usize::try_from(args.long(2)?) {
                    Ok(limit) if limit > 0 => regex.splitn(value, limit).map(Value::from).collect(),
                    _ => regex.split(value).map(Value::from).collect(),
                };
                Ok(Value::Array(parts))
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_map_uses_names_then_positions() {
        let regex = Regex::new(r"(?P<user>\w+)@(\w+)").unwrap();
        let map = capture_map(&regex, "ada@example", None);
        assert_eq!(map.get("matches"), Some(&Value::Boolean(true)));
        assert_eq!(map.get("user"), Some(&Value::from("ada")));
        assert_eq!(map.get("1"), Some(&Value::from("example")));
    }

    #[test]
    fn test_capture_map_with_group_names() {
        let regex = Regex::new(r"(\d+)-(\d+)").unwrap();
        let names = vec![Value::from("low"), Value::from("high")];
        let map = capture_map(&regex, "10-20", Some(&names));
        assert_eq!(map.get("low"), Some(&Value::from("10")));
        assert_eq!(map.get("high"), Some(&Value::from("20")));
    }

    #[test]
    fn test_no_match() {
        let regex = Regex::new(r"\d+").unwrap();
        let map = capture_map(&regex, "none", None);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("matches"), Some(&Value::Boolean(false)));
    }

    #[test]
    fn test_cache_reports_invalid_pattern() {
        let cache = RegexCache::default();
        let args = Args::new("regex", &[]);
        let err = cache.get(&args, "(unclosed").unwrap_err();
        assert!(matches!(err, EvaluationError::Function { ref function, .. } if function == "regex"));
    }
}
