//! Tree-walking rule interpreter
//!
//! Evaluates one validated [`Rule`] against one message. The condition and
//! the statements each run in a fresh [`EvaluationContext`]; the statements
//! only run when the condition holds. A failing statement records its error
//! and the next statement still runs. Rules carrying a compiled form dispatch to the
//! compiled closures instead of walking the tree.

use crate::ast::{Expression, FunctionCall, LogicalOperator, Statement};
use crate::context::EvaluationContext;
use crate::listener::{InterpreterListener, NoopListener};
use crate::ops;
use crate::rule::Rule;
use serde::Serialize;
use sluice_functions::{DirectEffects, FunctionRegistry, MessageEffects};
use sluice_types::{EvaluationError, Message, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{instrument, trace};

/// Result of evaluating one rule against one message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationOutcome {
    /// Rule name
    pub rule: String,
    /// Whether the condition held
    pub matched: bool,
    /// Errors recorded while evaluating the condition or statements
    #[serde(serialize_with = "serialize_errors")]
    pub errors: Vec<EvaluationError>,
    /// `drop_message()` ran
    pub dropped: bool,
    /// `stop_processing()` ran
    pub stop_requested: bool,
}

fn serialize_errors<S: serde::Serializer>(errors: &[EvaluationError], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(errors.iter().map(ToString::to_string))
}

/// Evaluates rules against messages
#[derive(Clone)]
pub struct Interpreter {
    registry: Arc<FunctionRegistry>,
    effects: Arc<dyn MessageEffects>,
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter").field("registry", &self.registry).finish_non_exhaustive()
    }
}

impl Interpreter {
    /// Interpreter applying effects directly to the message
    #[must_use]
    pub fn new(registry: Arc<FunctionRegistry>) -> Self {
        Self::with_effects(registry, Arc::new(DirectEffects))
    }

    /// Interpreter routing message effects through `effects`
    #[must_use]
    pub fn with_effects(registry: Arc<FunctionRegistry>, effects: Arc<dyn MessageEffects>) -> Self {
        Self { registry, effects }
    }

    #[must_use]
    pub const fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    /// Evaluate a rule against a message
    pub fn evaluate(&self, rule: &Rule, message: &mut Message) -> EvaluationOutcome {
        self.evaluate_with(rule, message, &mut NoopListener)
    }

    /// Evaluate a rule, reporting each step to `listener`
    ///
    /// Runs [`Self::evaluate_condition`] and, when it holds,
    /// [`Self::execute_actions`].
    pub fn evaluate_with(
        &self,
        rule: &Rule,
        message: &mut Message,
        listener: &mut dyn InterpreterListener,
    ) -> EvaluationOutcome {
        let mut outcome = self.evaluate_condition(rule, message, listener);
        if outcome.matched {
            self.execute_actions(rule, message, listener, &mut outcome);
        }
        outcome
    }

    /// Evaluate only the `when` clause, in a context of its own
    ///
    /// A condition that fails to evaluate does not match; its error is kept
    /// in the outcome.
    #[instrument(level = "trace", skip_all, fields(rule = %rule.name(), message_id = %message.id()))]
    pub fn evaluate_condition(
        &self,
        rule: &Rule,
        message: &mut Message,
        listener: &mut dyn InterpreterListener,
    ) -> EvaluationOutcome {
        listener.evaluate_rule(rule);
        let mut ctx = EvaluationContext::new(message, self.effects.as_ref());

        let matched = match self.condition(rule, &mut ctx) {
            Ok(matched) => matched,
            Err(error) => {
                trace!(%error, "condition failed");
                listener.fail_condition(rule, &error);
                ctx.record_error(error);
                false
            }
        };
        if matched {
            listener.satisfy_rule(rule);
        } else {
            listener.dissatisfy_rule(rule);
        }

        let (errors, flags) = ctx.finish();
        EvaluationOutcome {
            rule: rule.name().to_string(),
            matched,
            errors,
            dropped: flags.drop_message(),
            stop_requested: flags.stop_processing(),
        }
    }

    /// Run the `then` statements in a fresh context, folding their errors and
    /// control flags into `outcome`
    #[instrument(level = "trace", skip_all, fields(rule = %rule.name(), message_id = %message.id()))]
    pub fn execute_actions(
        &self,
        rule: &Rule,
        message: &mut Message,
        listener: &mut dyn InterpreterListener,
        outcome: &mut EvaluationOutcome,
    ) {
        listener.execute_rule(rule);
        let mut ctx = EvaluationContext::new(message, self.effects.as_ref());
        for (index, statement) in rule.then().iter().enumerate() {
            listener.execute_statement(rule, index, statement);
            if let Err(error) = self.statement(rule, index, statement, &mut ctx) {
                trace!(index, %error, "statement failed");
                listener.fail_statement(rule, index, &error);
                ctx.record_error(error);
            }
        }
        listener.finish_execute_rule(rule);

        let (errors, flags) = ctx.finish();
        outcome.errors.extend(errors);
        outcome.dropped |= flags.drop_message();
        outcome.stop_requested |= flags.stop_processing();
    }

    fn condition(&self, rule: &Rule, ctx: &mut EvaluationContext<'_>) -> Result<bool, EvaluationError> {
        match rule.compiled() {
            Some(compiled) => compiled.condition(ctx),
            None => {
                let value = self.eval_expression(rule.when(), ctx)?;
                ops::expect_bool(&value, "when")
            }
        }
    }

    fn statement(
        &self,
        rule: &Rule,
        index: usize,
        statement: &Statement,
        ctx: &mut EvaluationContext<'_>,
    ) -> Result<(), EvaluationError> {
        match rule.compiled() {
            Some(compiled) => compiled.execute_statement(index, ctx),
            None => self.execute_statement(statement, ctx),
        }
    }

    /// Run one statement by walking its tree
    ///
    /// # Errors
    ///
    /// The first evaluation error inside the statement.
    pub fn execute_statement(
        &self,
        statement: &Statement,
        ctx: &mut EvaluationContext<'_>,
    ) -> Result<(), EvaluationError> {
        match statement {
            Statement::VarAssign { name, expr, ty, .. } => {
                let value = self.eval_expression(expr, ctx)?;
                let ty = ty.clone().unwrap_or_else(|| value.value_type());
                ctx.bind(name, ty, value);
            }
            Statement::ExprStatement { expr, .. } => {
                self.eval_expression(expr, ctx)?;
            }
        }
        Ok(())
    }

    /// Evaluate an expression by walking its tree
    ///
    /// # Errors
    ///
    /// Any runtime failure in the expression or the functions it calls.
    pub fn eval_expression(&self, expr: &Expression, ctx: &mut EvaluationContext<'_>) -> Result<Value, EvaluationError> {
        match expr {
            Expression::Literal { value, .. } => Ok(value.clone()),
            Expression::FieldRef { name, .. } => Ok(ctx.field(name)),
            Expression::VarRef { name, .. } => ctx.variable(name),
            Expression::FunctionCall(call) => self.call(call, ctx),
            Expression::BinaryOp { left, operator, right, .. } => {
                let left = self.eval_expression(left, ctx)?;
                let right = self.eval_expression(right, ctx)?;
                ops::binary(*operator, &left, &right)
            }
            Expression::LogicalOp { left, operator, right, .. } => {
                let lhs = ops::expect_bool(&self.eval_expression(left, ctx)?, operator.symbol())?;
                let short_circuit = match operator {
                    LogicalOperator::And => !lhs,
                    LogicalOperator::Or => lhs,
                };
                if short_circuit {
                    return Ok(Value::Boolean(lhs));
                }
                let rhs = ops::expect_bool(&self.eval_expression(right, ctx)?, operator.symbol())?;
                Ok(Value::Boolean(rhs))
            }
            Expression::Not { operand, .. } => ops::not(&self.eval_expression(operand, ctx)?),
            Expression::Negate { operand, .. } => ops::negate(&self.eval_expression(operand, ctx)?),
            Expression::Index { target, index, .. } => {
                let target = self.eval_expression(target, ctx)?;
                let index = self.eval_expression(index, ctx)?;
                ops::index(&target, &index)
            }
            Expression::ArrayLiteral { elements, .. } => elements
                .iter()
                .map(|e| self.eval_expression(e, ctx))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Expression::MapLiteral { entries, .. } => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    map.insert(key.clone(), self.eval_expression(value, ctx)?);
                }
                Ok(Value::Map(map))
            }
        }
    }

    fn call(&self, call: &FunctionCall, ctx: &mut EvaluationContext<'_>) -> Result<Value, EvaluationError> {
        let function = self
            .registry
            .get(&call.name)
            .ok_or_else(|| EvaluationError::UnknownFunction { name: call.name.clone() })?;

        let params = &function.descriptor().params;
        let mut values = Vec::with_capacity(params.len());
        for (slot, param) in params.iter().enumerate() {
            match call.bindings.get(slot).copied().flatten() {
                Some(arg) => values.push(self.eval_expression(&call.args[arg].value, ctx)?),
                None => values.push(param.default_value()),
            }
        }
        ctx.call(function, &values)
    }
}
