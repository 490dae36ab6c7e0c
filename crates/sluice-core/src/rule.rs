//! Validated rules

use crate::ast::{Expression, Statement};
use crate::codegen::CompiledRule;
use std::sync::Arc;

/// A rule that passed validation
///
/// Rules can only be obtained from the validator, so every `Rule` is
/// well-typed: all calls resolve, every call carries its parameter bindings,
/// every variable is declared before use and the condition is Boolean.
#[derive(Debug, Clone)]
pub struct Rule {
    name: String,
    source: String,
    when: Expression,
    then: Vec<Statement>,
    compiled: Option<Arc<CompiledRule>>,
}

impl Rule {
    pub(crate) fn new(name: String, source: String, when: Expression, then: Vec<Statement>) -> Self {
        Self { name, source, when, then, compiled: None }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source text the rule was parsed from
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub const fn when(&self) -> &Expression {
        &self.when
    }

    #[must_use]
    pub fn then(&self) -> &[Statement] {
        &self.then
    }

    /// Closure form of the rule, present when the configuration runs compiled
    #[must_use]
    pub fn compiled(&self) -> Option<&Arc<CompiledRule>> {
        self.compiled.as_ref()
    }

    #[must_use]
    pub const fn is_compiled(&self) -> bool {
        self.compiled.is_some()
    }

    /// Attach the compiled form
    #[must_use]
    pub fn with_compiled(mut self, compiled: CompiledRule) -> Self {
        self.compiled = Some(Arc::new(compiled));
        self
    }

    /// Drop the compiled form, forcing interpretation
    #[must_use]
    pub fn interpreted(mut self) -> Self {
        self.compiled = None;
        self
    }
}
