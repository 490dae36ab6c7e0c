use crate::types::Type;
use thiserror::Error;

/// Runtime failure while evaluating an expression or statement.
///
/// Evaluation errors are scoped to a single statement: the interpreter records
/// them in the rule's error sink and carries on with the next statement.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    /// Integer or floating point division or remainder by zero
    #[error("division by zero")]
    DivisionByZero,

    /// Checked integer arithmetic overflowed
    #[error("arithmetic overflow in {operation}")]
    Overflow {
        /// Operator that overflowed
        operation: String,
    },

    /// A null value (typically a missing message field) reached an operator
    /// that needs a concrete value
    #[error("null value used in {operation}")]
    NullValue {
        /// Operator or construct that received the null
        operation: String,
    },

    /// A runtime value did not have the type the operation needed
    #[error("expected {expected}, found {actual}")]
    TypeMismatch {
        /// Expected type
        expected: Type,
        /// Name of the actual runtime type
        actual: String,
    },

    /// Array index outside of the array bounds
    #[error("index {index} out of bounds for array of length {length}")]
    IndexOutOfBounds {
        /// Requested index
        index: i64,
        /// Array length
        length: usize,
    },

    /// Map lookup with a key that is not present
    #[error("key '{key}' not present in map")]
    MissingKey {
        /// Requested key
        key: String,
    },

    /// A function reported a failure
    #[error("function '{function}' failed: {message}")]
    Function {
        /// Function name
        function: String,
        /// Failure detail
        message: String,
    },

    /// A function name was not resolvable at runtime
    #[error("unknown function '{name}'")]
    UnknownFunction {
        /// Function name
        name: String,
    },

    /// A variable was read before it was bound
    #[error("variable '{name}' is not bound")]
    UnboundVariable {
        /// Variable name
        name: String,
    },
}

impl EvaluationError {
    /// Null value error for the given operation
    pub fn null_value(operation: impl Into<String>) -> Self {
        Self::NullValue { operation: operation.into() }
    }

    /// Function failure with a message
    pub fn function(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Function { function: function.into(), message: message.into() }
    }

    /// Type mismatch against a runtime value type name
    pub fn type_mismatch(expected: Type, actual: impl Into<String>) -> Self {
        Self::TypeMismatch { expected, actual: actual.into() }
    }

    /// Error category for logging and metrics
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::DivisionByZero | Self::Overflow { .. } => "arithmetic",
            Self::NullValue { .. } => "null_value",
            Self::TypeMismatch { .. } => "type",
            Self::IndexOutOfBounds { .. } | Self::MissingKey { .. } => "index",
            Self::Function { .. } | Self::UnknownFunction { .. } => "function",
            Self::UnboundVariable { .. } => "variable",
        }
    }
}
