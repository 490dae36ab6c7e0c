//! Built-in functions provided by the Sluice engine.

use crate::plugin::FunctionPlugin;

// Type conversion & inspection
pub mod checks;
pub mod conversion;

// Message state and routing
pub mod message;

// Text processing
pub mod patterns;
pub mod strings;

// Dates, encodings and structured payloads
pub mod dates;
pub mod encoding;
pub mod json;

/// All built-in function groups, in registration order
#[must_use]
pub fn plugins() -> Vec<Box<dyn FunctionPlugin>> {
    vec![
        Box::new(conversion::ConversionFunctions),
        Box::new(checks::TypeCheckFunctions),
        Box::new(message::MessageFunctions),
        Box::new(strings::StringFunctions),
        Box::new(patterns::PatternFunctions::default()),
        Box::new(dates::DateFunctions),
        Box::new(encoding::EncodingFunctions),
        Box::new(json::JsonFunctions),
    ]
}
