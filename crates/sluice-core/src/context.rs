//! Per-evaluation state
//!
//! An [`EvaluationContext`] lives for exactly one (message, rule) evaluation.
//! It owns the rule's variable bindings (name to declared type and value),
//! its error sink and its control
//! flags, and borrows the message mutably so statements observe each other's
//! mutations. Nothing in it is shared between threads.

use ahash::AHashMap;
use sluice_functions::{CallContext, ControlFlags, Function, MessageEffects};
use sluice_types::{EvaluationError, Message, Type, Value};

/// Evaluation state for one rule against one message
pub struct EvaluationContext<'m> {
    message: &'m mut Message,
    effects: &'m dyn MessageEffects,
    variables: AHashMap<String, (Type, Value)>,
    errors: Vec<EvaluationError>,
    flags: ControlFlags,
}

impl<'m> EvaluationContext<'m> {
    /// Fresh context with no bindings and no errors
    pub fn new(message: &'m mut Message, effects: &'m dyn MessageEffects) -> Self {
        Self { message, effects, variables: AHashMap::new(), errors: Vec::new(), flags: ControlFlags::default() }
    }

    /// The message under evaluation
    #[must_use]
    pub fn message(&self) -> &Message {
        &*self.message
    }

    /// Field content, `Null` when the field is absent
    #[must_use]
    pub fn field(&self, name: &str) -> Value {
        self.message.field(name).cloned().unwrap_or(Value::Null)
    }

    /// Bind a variable with the type the validator inferred for it
    pub fn bind(&mut self, name: &str, ty: Type, value: Value) {
        self.variables.insert(name.to_string(), (ty, value));
    }

    /// Read a variable
    ///
    /// # Errors
    ///
    /// `UnboundVariable` if the declaring statement failed or never ran.
    pub fn variable(&self, name: &str) -> Result<Value, EvaluationError> {
        self.variables
            .get(name)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| EvaluationError::UnboundVariable { name: name.to_string() })
    }

    /// Declared type of a bound variable
    #[must_use]
    pub fn variable_type(&self, name: &str) -> Option<&Type> {
        self.variables.get(name).map(|(ty, _)| ty)
    }

    /// Invoke a function against this context's message
    ///
    /// # Errors
    ///
    /// Whatever the function reports.
    pub fn call(&mut self, function: &Function, values: &[Value]) -> Result<Value, EvaluationError> {
        let mut ctx = CallContext::new(&mut *self.message, self.effects, &mut self.flags);
        function.invoke(&mut ctx, values)
    }

    pub fn record_error(&mut self, error: EvaluationError) {
        self.errors.push(error);
    }

    #[must_use]
    pub fn errors(&self) -> &[EvaluationError] {
        &self.errors
    }

    #[must_use]
    pub const fn flags(&self) -> ControlFlags {
        self.flags
    }

    /// Consume the context, returning the recorded errors and raised flags
    #[must_use]
    pub fn finish(self) -> (Vec<EvaluationError>, ControlFlags) {
        (self.errors, self.flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_functions::{DirectEffects, FunctionRegistry};

    #[test]
    fn test_variables_and_calls() {
        let registry = FunctionRegistry::with_builtins();
        let mut message = Message::with_id("m");
        message.set_field("a", Value::Long(1));
        let mut ctx = EvaluationContext::new(&mut message, &DirectEffects);

        assert_eq!(ctx.field("a"), Value::Long(1));
        assert_eq!(ctx.field("missing"), Value::Null);
        assert!(matches!(ctx.variable("x"), Err(EvaluationError::UnboundVariable { .. })));

        ctx.bind("x", Type::String, Value::from("b"));
        assert_eq!(ctx.variable_type("x"), Some(&Type::String));
        let set_field = registry.get("set_field").unwrap();
        ctx.call(set_field, &[Value::from("b"), ctx.variable("x").unwrap(), Value::from(""), Value::from("")])
            .unwrap();
        ctx.call(registry.get("stop_processing").unwrap(), &[]).unwrap();

        assert!(ctx.flags().stop_processing());
        let (errors, _) = ctx.finish();
        assert!(errors.is_empty());
        assert_eq!(message.field("b"), Some(&Value::from("b")));
    }
}
