//! Date functions
//!
//! Patterns use `chrono` strftime syntax. Timestamps are always UTC.

use crate::descriptor::FunctionDescriptor;
use crate::plugin::FunctionPlugin;
use crate::registry::FunctionRegistry;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sluice_types::{Type, Value};

/// `now`, `parse_date`, `format_date`, `parse_unix_millis`, `to_unix_millis`
#[derive(Debug, Default)]
pub struct DateFunctions;

/// Parse with an explicit pattern, falling back from zoned to naive forms
fn parse_with_pattern(value: &str, pattern: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_str(value, pattern) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, pattern) {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(value, pattern)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn parse_date(value: &str, pattern: Option<&str>) -> Option<DateTime<Utc>> {
    match pattern {
        Some(pattern) => parse_with_pattern(value.trim(), pattern),
        None => DateTime::parse_from_rfc3339(value.trim()).ok().map(|dt| dt.with_timezone(&Utc)),
    }
}

impl FunctionPlugin for DateFunctions {
    fn name(&self) -> &str {
        "dates"
    }

    fn register(&self, registry: &mut FunctionRegistry) {
        registry.register(
            FunctionDescriptor::new("now", Type::DateTime)
                .effecting()
                .describe("Current time in UTC"),
            |_, _| Ok(Value::DateTime(Utc::now())),
        );

        registry.register(
            FunctionDescriptor::new("parse_date", Type::DateTime)
                .param("value", Type::String)
                .optional("pattern", Type::String)
                .describe("Parses a timestamp with a strftime pattern, or RFC 3339 when no pattern is given"),
            |_, args| {
                let (value, pattern) = (args.string(0)?, args.opt_string(1)?);
                parse_date(value, pattern).map(Value::DateTime).ok_or_else(|| {
                    args.fail(format!(
                        "cannot parse '{value}' with pattern '{}'",
                        pattern.unwrap_or("rfc3339")
                    ))
                })
            },
        );

        registry.register(
            FunctionDescriptor::new("format_date", Type::String)
                .param("value", Type::DateTime)
                .param("format", Type::String)
                .describe("Formats a timestamp with a strftime pattern"),
            |_, args| {
                use std::fmt::Write;
                let (value, format) = (args.datetime(0)?, args.string(1)?);
                let mut out = String::new();
                write!(out, "{}", value.format(format))
                    .map_err(|_| args.fail(format!("invalid format '{format}'")))?;
                Ok(Value::String(out))
            },
        );

        registry.register(
            FunctionDescriptor::new("parse_unix_millis", Type::DateTime)
                .param("value", Type::Long)
                .describe("Timestamp from milliseconds since the Unix epoch"),
            |_, args| {
                let millis = args.long(0)?;
                DateTime::from_timestamp_millis(millis)
                    .map(Value::DateTime)
                    .ok_or_else(|| args.fail(format!("{millis} is out of range")))
            },
        );

        registry.register(
            FunctionDescriptor::new("to_unix_millis", Type::Long)
                .param("value", Type::DateTime)
                .describe("Milliseconds since the Unix epoch"),
            |_, args| Ok(Value::Long(args.datetime(0)?.timestamp_millis())),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_date_variants() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        assert_eq!(parse_date("2024-03-09T14:05:00Z", None), Some(expected));
        assert_eq!(parse_date("09/03/2024 14:05", Some("%d/%m/%Y %H:%M")), Some(expected));
        assert_eq!(
            parse_date("2024-03-09", Some("%Y-%m-%d")),
            Some(Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_date("yesterday", None), None);
    }
}
