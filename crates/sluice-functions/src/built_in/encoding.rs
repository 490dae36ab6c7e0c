//! Encoding and hashing functions.

use crate::descriptor::FunctionDescriptor;
use crate::plugin::FunctionPlugin;
use crate::registry::FunctionRegistry;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use sluice_types::{Type, Value};
use std::fmt::Write as _;

/// `base64_encode`, `base64_decode`, `sha256`
#[derive(Debug, Default)]
pub struct EncodingFunctions;

fn hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

impl FunctionPlugin for EncodingFunctions {
    fn name(&self) -> &str {
        "encoding"
    }

    fn register(&self, registry: &mut FunctionRegistry) {
        registry.register(
            FunctionDescriptor::new("base64_encode", Type::String)
                .param("value", Type::String)
                .describe("Standard base64 encoding of the UTF-8 bytes"),
            |_, args| Ok(Value::String(STANDARD.encode(args.string(0)?))),
        );

        registry.register(
            FunctionDescriptor::new("base64_decode", Type::String)
                .param("value", Type::String)
                .describe("Decodes standard base64 into a UTF-8 string"),
            |_, args| {
                let bytes = STANDARD
                    .decode(args.string(0)?.trim())
                    .map_err(|e| args.fail(format!("invalid base64: {e}")))?;
                String::from_utf8(bytes)
                    .map(Value::String)
                    .map_err(|_| args.fail("decoded bytes are not valid UTF-8"))
            },
        );

        registry.register(
            FunctionDescriptor::new("sha256", Type::String)
                .param("value", Type::String)
                .describe("Lowercase hex SHA-256 digest"),
            |_, args| Ok(Value::String(hex(&Sha256::digest(args.string(0)?.as_bytes())))),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex() {
        assert_eq!(hex(&[0x00, 0xab, 0x10]), "00ab10");
    }
}
