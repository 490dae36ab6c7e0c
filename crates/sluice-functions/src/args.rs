use chrono::{DateTime, Utc};
use sluice_types::{EvaluationError, Type, Value};
use std::collections::BTreeMap;

/// Bound argument values, one per declared parameter in declaration order.
///
/// Omitted optional parameters already carry their default (or `Null`), so a
/// function indexes by parameter position and never sees named arguments.
#[derive(Debug, Clone, Copy)]
pub struct Args<'a> {
    function: &'a str,
    values: &'a [Value],
}

impl<'a> Args<'a> {
    /// Wrap bound values for the named function
    #[must_use]
    pub const fn new(function: &'a str, values: &'a [Value]) -> Self {
        Self { function, values }
    }

    /// Name of the function being invoked
    #[must_use]
    pub const fn function(&self) -> &'a str {
        self.function
    }

    /// Number of bound values
    #[must_use]
    pub const fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no values are bound
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw value at a parameter position; `Null` past the end
    #[must_use]
    pub fn get(&self, index: usize) -> &'a Value {
        const NULL: &Value = &Value::Null;
        self.values.get(index).unwrap_or(NULL)
    }

    /// Failure attributed to the invoked function
    #[must_use]
    pub fn fail(&self, message: impl Into<String>) -> EvaluationError {
        EvaluationError::function(self.function, message)
    }

    fn mismatch(&self, index: usize, expected: Type) -> EvaluationError {
        match self.get(index) {
            Value::Null => EvaluationError::null_value(format!("argument {index} of '{}'", self.function)),
            other => EvaluationError::type_mismatch(expected, other.type_name()),
        }
    }

    /// String argument
    ///
    /// # Errors
    ///
    /// Fails when the value is not a string.
    pub fn string(&self, index: usize) -> Result<&'a str, EvaluationError> {
        self.get(index).as_str().ok_or_else(|| self.mismatch(index, Type::String))
    }

    /// Optional string argument; `Null` maps to `None`
    ///
    /// # Errors
    ///
    /// Fails when the value is neither null nor a string.
    pub fn opt_string(&self, index: usize) -> Result<Option<&'a str>, EvaluationError> {
        match self.get(index) {
            Value::Null => Ok(None),
            _ => self.string(index).map(Some),
        }
    }

    /// Integer argument
    ///
    /// # Errors
    ///
    /// Fails when the value is not a long.
    pub fn long(&self, index: usize) -> Result<i64, EvaluationError> {
        self.get(index).as_long().ok_or_else(|| self.mismatch(index, Type::Long))
    }

    /// Optional integer argument; `Null` maps to `None`
    ///
    /// # Errors
    ///
    /// Fails when the value is neither null nor a long.
    pub fn opt_long(&self, index: usize) -> Result<Option<i64>, EvaluationError> {
        match self.get(index) {
            Value::Null => Ok(None),
            _ => self.long(index).map(Some),
        }
    }

    /// Floating point argument, widening longs
    ///
    /// # Errors
    ///
    /// Fails when the value is not numeric.
    pub fn double(&self, index: usize) -> Result<f64, EvaluationError> {
        self.get(index).as_double().ok_or_else(|| self.mismatch(index, Type::Double))
    }

    /// Boolean argument
    ///
    /// # Errors
    ///
    /// Fails when the value is not a boolean.
    pub fn boolean(&self, index: usize) -> Result<bool, EvaluationError> {
        self.get(index).as_bool().ok_or_else(|| self.mismatch(index, Type::Boolean))
    }

    /// Timestamp argument
    ///
    /// # Errors
    ///
    /// Fails when the value is not a timestamp.
    pub fn datetime(&self, index: usize) -> Result<&'a DateTime<Utc>, EvaluationError> {
        self.get(index).as_datetime().ok_or_else(|| self.mismatch(index, Type::DateTime))
    }

    /// Array argument
    ///
    /// # Errors
    ///
    /// Fails when the value is not an array.
    pub fn array(&self, index: usize) -> Result<&'a [Value], EvaluationError> {
        self.get(index).as_array().ok_or_else(|| self.mismatch(index, Type::array(Type::Any)))
    }

    /// Map argument
    ///
    /// # Errors
    ///
    /// Fails when the value is not a map.
    pub fn map(&self, index: usize) -> Result<&'a BTreeMap<String, Value>, EvaluationError> {
        self.get(index).as_map().ok_or_else(|| self.mismatch(index, Type::Map))
    }
}
