//! Static descriptions of callable functions.
//!
//! The validator resolves calls purely from these descriptors; the invoke
//! closure is never consulted until evaluation.

use sluice_types::{Type, Value};

/// One declared parameter of a function
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDescriptor {
    /// Parameter name, usable as a named argument
    pub name: String,
    /// Declared type
    pub ty: Type,
    /// Whether a call must supply this parameter
    pub required: bool,
    /// Value used when an optional parameter is omitted
    pub default: Option<Value>,
}

impl ParameterDescriptor {
    /// Required parameter
    pub fn required(name: impl Into<String>, ty: Type) -> Self {
        Self { name: name.into(), ty, required: true, default: None }
    }

    /// Optional parameter without a default; omitted arguments evaluate to `Null`
    pub fn optional(name: impl Into<String>, ty: Type) -> Self {
        Self { name: name.into(), ty, required: false, default: None }
    }

    /// Value handed to the function when the argument is omitted
    #[must_use]
    pub fn default_value(&self) -> Value {
        self.default.clone().unwrap_or(Value::Null)
    }
}

/// Signature and metadata of a registered function
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDescriptor {
    /// Function name as written in rules
    pub name: String,
    /// Ordered parameter list
    pub params: Vec<ParameterDescriptor>,
    /// Type of the call expression
    pub return_type: Type,
    /// True when the result depends only on the arguments and calling it has no
    /// effect on the message or the outside world
    pub is_pure: bool,
    /// Human readable summary
    pub description: String,
}

impl FunctionDescriptor {
    /// Pure function with no parameters yet
    pub fn new(name: impl Into<String>, return_type: Type) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            return_type,
            is_pure: true,
            description: String::new(),
        }
    }

    /// Append a required parameter
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.params.push(ParameterDescriptor::required(name, ty));
        self
    }

    /// Append an optional parameter that evaluates to `Null` when omitted
    #[must_use]
    pub fn optional(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.params.push(ParameterDescriptor::optional(name, ty));
        self
    }

    /// Append an optional parameter with a default value
    #[must_use]
    pub fn optional_or(mut self, name: impl Into<String>, ty: Type, default: Value) -> Self {
        self.params.push(ParameterDescriptor {
            name: name.into(),
            ty,
            required: false,
            default: Some(default),
        });
        self
    }

    /// Mark the function as reading or mutating message state
    #[must_use]
    pub const fn effecting(mut self) -> Self {
        self.is_pure = false;
        self
    }

    /// Set the description
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Parameter index by name
    #[must_use]
    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }

    /// Number of required parameters
    #[must_use]
    pub fn required_count(&self) -> usize {
        self.params.iter().filter(|p| p.required).count()
    }

    /// Signature as shown in diagnostics, e.g. `to_long(value: Any, default?: Long) -> Long`
    #[must_use]
    pub fn signature(&self) -> String {
        let params = self
            .params
            .iter()
            .map(|p| format!("{}{}: {}", p.name, if p.required { "" } else { "?" }, p.ty))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({}) -> {}", self.name, params, self.return_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_signature() {
        let descriptor = FunctionDescriptor::new("to_long", Type::Long)
            .param("value", Type::Any)
            .optional_or("default", Type::Long, Value::Long(0));

        assert!(descriptor.is_pure);
        assert_eq!(descriptor.required_count(), 1);
        assert_eq!(descriptor.param_index("default"), Some(1));
        assert_eq!(descriptor.signature(), "to_long(value: Any, default?: Long) -> Long");
        assert_eq!(descriptor.params[1].default_value(), Value::Long(0));
    }

    #[test]
    fn test_optional_without_default_is_null() {
        let descriptor = FunctionDescriptor::new("f", Type::Void).optional("x", Type::String).effecting();
        assert!(!descriptor.is_pure);
        assert_eq!(descriptor.params[0].default_value(), Value::Null);
    }
}
