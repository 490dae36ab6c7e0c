//! Closure compiler for validated rules
//!
//! Lowers a rule's AST into a tree of boxed closures. Function handles are
//! resolved once at compile time, and pure subexpressions whose inputs are
//! all constant are evaluated ahead of time. Operators share [`crate::ops`]
//! with the interpreter, so a compiled rule produces exactly the outcome the
//! interpreter would.

use crate::ast::{Expression, FunctionCall, LogicalOperator, Statement};
use crate::context::EvaluationContext;
use crate::ops;
use crate::rule::Rule;
use sluice_functions::{CallContext, ControlFlags, DirectEffects, Function, FunctionRegistry};
use sluice_types::{EvaluationError, Message, Type, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

type Eval = Box<dyn Fn(&mut EvaluationContext<'_>) -> Result<Value, EvaluationError> + Send + Sync>;

fn boxed<F>(f: F) -> Eval
where
    F: Fn(&mut EvaluationContext<'_>) -> Result<Value, EvaluationError> + Send + Sync + 'static,
{
    Box::new(f)
}

enum CompiledStatement {
    Assign { name: String, ty: Option<Type>, eval: Eval },
    Effect(Eval),
}

/// A rule lowered to closures
pub struct CompiledRule {
    condition: Eval,
    statements: Vec<CompiledStatement>,
    folded: usize,
}

impl std::fmt::Debug for CompiledRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledRule")
            .field("statements", &self.statements.len())
            .field("folded", &self.folded)
            .finish_non_exhaustive()
    }
}

impl CompiledRule {
    /// Evaluate the condition
    ///
    /// # Errors
    ///
    /// Runtime failures in the condition, or a non-boolean result.
    pub fn condition(&self, ctx: &mut EvaluationContext<'_>) -> Result<bool, EvaluationError> {
        let value = (self.condition)(ctx)?;
        ops::expect_bool(&value, "when")
    }

    /// Run the statement at `index`; an index past the end does nothing
    ///
    /// # Errors
    ///
    /// Runtime failures in the statement.
    pub fn execute_statement(&self, index: usize, ctx: &mut EvaluationContext<'_>) -> Result<(), EvaluationError> {
        match self.statements.get(index) {
            Some(CompiledStatement::Assign { name, ty, eval }) => {
                let value = eval(ctx)?;
                let ty = ty.clone().unwrap_or_else(|| value.value_type());
                ctx.bind(name, ty, value);
            }
            Some(CompiledStatement::Effect(eval)) => {
                eval(ctx)?;
            }
            None => {}
        }
        Ok(())
    }

    #[must_use]
    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }

    /// Subexpressions evaluated at compile time
    #[must_use]
    pub const fn folded(&self) -> usize {
        self.folded
    }
}

/// Compile a validated rule
#[must_use]
pub fn compile(rule: &Rule, registry: &FunctionRegistry) -> CompiledRule {
    let mut compiler = Compiler { registry, folded: 0 };
    let condition = compiler.lower(rule.when()).into_eval();
    let statements = rule
        .then()
        .iter()
        .map(|statement| match statement {
            Statement::VarAssign { name, expr, ty, .. } => CompiledStatement::Assign {
                name: name.clone(),
                ty: ty.clone(),
                eval: compiler.lower(expr).into_eval(),
            },
            Statement::ExprStatement { expr, .. } => CompiledStatement::Effect(compiler.lower(expr).into_eval()),
        })
        .collect();
    debug!(rule = %rule.name(), folded = compiler.folded, "compiled rule");
    CompiledRule { condition, statements, folded: compiler.folded }
}

/// Intermediate form: a known value, a known failure, or code to run
enum Lowered {
    Const(Value),
    Failed(EvaluationError),
    Code(Eval),
}

impl Lowered {
    fn from_result(result: Result<Value, EvaluationError>) -> Self {
        match result {
            Ok(value) => Self::Const(value),
            Err(error) => Self::Failed(error),
        }
    }

    fn is_code(&self) -> bool {
        matches!(self, Self::Code(_))
    }

    fn into_eval(self) -> Eval {
        match self {
            Self::Const(value) => boxed(move |_| Ok(value.clone())),
            Self::Failed(error) => boxed(move |_| Err(error.clone())),
            Self::Code(eval) => eval,
        }
    }
}

struct Compiler<'r> {
    registry: &'r FunctionRegistry,
    folded: usize,
}

impl Compiler<'_> {
    fn fold(&mut self, result: Result<Value, EvaluationError>) -> Lowered {
        self.folded += 1;
        Lowered::from_result(result)
    }

    fn lower(&mut self, expr: &Expression) -> Lowered {
        match expr {
            Expression::Literal { value, .. } => Lowered::Const(value.clone()),
            Expression::FieldRef { name, .. } => {
                let name = name.clone();
                Lowered::Code(boxed(move |ctx| Ok(ctx.field(&name))))
            }
            Expression::VarRef { name, .. } => {
                let name = name.clone();
                Lowered::Code(boxed(move |ctx| ctx.variable(&name)))
            }
            Expression::FunctionCall(call) => self.lower_call(call),
            Expression::BinaryOp { left, operator, right, .. } => {
                let op = *operator;
                match (self.lower(left), self.lower(right)) {
                    (Lowered::Failed(e), _) => Lowered::Failed(e),
                    (Lowered::Const(l), Lowered::Const(r)) => self.fold(ops::binary(op, &l, &r)),
                    (Lowered::Const(_), Lowered::Failed(e)) => Lowered::Failed(e),
                    (l, r) => {
                        let (l, r) = (l.into_eval(), r.into_eval());
                        Lowered::Code(boxed(move |ctx| {
                            let left = l(ctx)?;
                            let right = r(ctx)?;
                            ops::binary(op, &left, &right)
                        }))
                    }
                }
            }
            Expression::LogicalOp { left, operator, right, .. } => self.lower_logical(left, *operator, right),
            Expression::Not { operand, .. } => self.lower_unary(operand, ops::not),
            Expression::Negate { operand, .. } => self.lower_unary(operand, ops::negate),
            Expression::Index { target, index, .. } => match (self.lower(target), self.lower(index)) {
                (Lowered::Failed(e), _) => Lowered::Failed(e),
                (Lowered::Const(t), Lowered::Const(i)) => self.fold(ops::index(&t, &i)),
                (Lowered::Const(_), Lowered::Failed(e)) => Lowered::Failed(e),
                (t, i) => {
                    let (t, i) = (t.into_eval(), i.into_eval());
                    Lowered::Code(boxed(move |ctx| {
                        let target = t(ctx)?;
                        let index = i(ctx)?;
                        ops::index(&target, &index)
                    }))
                }
            },
            Expression::ArrayLiteral { elements, .. } => {
                let parts: Vec<Lowered> = elements.iter().map(|e| self.lower(e)).collect();
                self.lower_sequence(parts, Value::Array)
            }
            Expression::MapLiteral { entries, .. } => {
                let keys: Vec<String> = entries.iter().map(|(k, _)| k.clone()).collect();
                let parts: Vec<Lowered> = entries.iter().map(|(_, v)| self.lower(v)).collect();
                self.lower_sequence(parts, move |values| {
                    let mut map = BTreeMap::new();
                    for (key, value) in keys.iter().zip(values) {
                        map.insert(key.clone(), value);
                    }
                    Value::Map(map)
                })
            }
        }
    }

    fn lower_unary(&mut self, operand: &Expression, op: fn(&Value) -> Result<Value, EvaluationError>) -> Lowered {
        match self.lower(operand) {
            Lowered::Const(value) => self.fold(op(&value)),
            Lowered::Failed(e) => Lowered::Failed(e),
            Lowered::Code(eval) => Lowered::Code(boxed(move |ctx| op(&eval(ctx)?))),
        }
    }

    fn lower_logical(&mut self, left: &Expression, op: LogicalOperator, right: &Expression) -> Lowered {
        let symbol = op.symbol();
        let short_circuit = move |lhs: bool| match op {
            LogicalOperator::And => !lhs,
            LogicalOperator::Or => lhs,
        };
        let right = self.lower(right);

        match self.lower(left) {
            Lowered::Failed(e) => Lowered::Failed(e),
            Lowered::Const(value) => match ops::expect_bool(&value, symbol) {
                Err(e) => Lowered::Failed(e),
                Ok(lhs) if short_circuit(lhs) => {
                    self.folded += 1;
                    Lowered::Const(Value::Boolean(lhs))
                }
                Ok(_) => match right {
                    Lowered::Const(value) => self.fold(ops::expect_bool(&value, symbol).map(Value::Boolean)),
                    Lowered::Failed(e) => Lowered::Failed(e),
                    Lowered::Code(r) => Lowered::Code(boxed(move |ctx| {
                        ops::expect_bool(&r(ctx)?, symbol).map(Value::Boolean)
                    })),
                },
            },
            Lowered::Code(l) => {
                let r = right.into_eval();
                Lowered::Code(boxed(move |ctx| {
                    let lhs = ops::expect_bool(&l(ctx)?, symbol)?;
                    if short_circuit(lhs) {
                        return Ok(Value::Boolean(lhs));
                    }
                    ops::expect_bool(&r(ctx)?, symbol).map(Value::Boolean)
                }))
            }
        }
    }

    /// Lower a list of subexpressions evaluated left to right and combined by `build`
    fn lower_sequence<F>(&mut self, parts: Vec<Lowered>, build: F) -> Lowered
    where
        F: Fn(Vec<Value>) -> Value + Send + Sync + 'static,
    {
        let first_code = parts.iter().position(Lowered::is_code).unwrap_or(parts.len());
        // a failure before any runtime code is the guaranteed result
        if let Some(error) = parts[..first_code].iter().find_map(|p| match p {
            Lowered::Failed(e) => Some(e.clone()),
            _ => None,
        }) {
            return Lowered::Failed(error);
        }
        if first_code == parts.len() {
            let values = parts
                .into_iter()
                .filter_map(|p| match p {
                    Lowered::Const(v) => Some(v),
                    _ => None,
                })
                .collect();
            return Lowered::Const(build(values));
        }

        let evals: Vec<Eval> = parts.into_iter().map(Lowered::into_eval).collect();
        Lowered::Code(boxed(move |ctx| {
            let values = evals.iter().map(|eval| eval(ctx)).collect::<Result<Vec<_>, _>>()?;
            Ok(build(values))
        }))
    }

    fn lower_call(&mut self, call: &FunctionCall) -> Lowered {
        let Some(function) = self.registry.get(&call.name).cloned() else {
            return Lowered::Failed(EvaluationError::UnknownFunction { name: call.name.clone() });
        };

        let params = &function.descriptor().params;
        let parts: Vec<Lowered> = params
            .iter()
            .enumerate()
            .map(|(slot, param)| match call.bindings.get(slot).copied().flatten() {
                Some(arg) => self.lower(&call.args[arg].value),
                None => Lowered::Const(param.default_value()),
            })
            .collect();

        let all_const = parts.iter().all(|p| matches!(p, Lowered::Const(_)));
        if function.descriptor().is_pure && all_const {
            let values: Vec<Value> = parts
                .into_iter()
                .filter_map(|p| match p {
                    Lowered::Const(v) => Some(v),
                    _ => None,
                })
                .collect();
            return self.fold(invoke_pure(&function, &values));
        }

        let first_code = parts.iter().position(Lowered::is_code).unwrap_or(parts.len());
        if let Some(error) = parts[..first_code].iter().find_map(|p| match p {
            Lowered::Failed(e) => Some(e.clone()),
            _ => None,
        }) {
            return Lowered::Failed(error);
        }

        let evals: Vec<Eval> = parts.into_iter().map(Lowered::into_eval).collect();
        Lowered::Code(boxed(move |ctx| {
            let values = evals.iter().map(|eval| eval(ctx)).collect::<Result<Vec<_>, _>>()?;
            ctx.call(&function, &values)
        }))
    }
}

/// Run a pure function outside of any message
fn invoke_pure(function: &Arc<Function>, values: &[Value]) -> Result<Value, EvaluationError> {
    let mut scratch = Message::with_id("");
    let mut flags = ControlFlags::default();
    let mut ctx = CallContext::new(&mut scratch, &DirectEffects, &mut flags);
    function.invoke(&mut ctx, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::validate;

    #[test]
    fn test_constant_subexpressions_fold() {
        let registry = FunctionRegistry::with_builtins();
        let rule = validate(
            "rule \"r\" when uppercase(\"a\") == \"A\" and 2 * 3 > 5 then set_field(\"x\", 1 + 1); end",
            &registry,
        )
        .unwrap();
        let compiled = compile(&rule, &registry);
        assert!(compiled.folded() >= 4);
        assert_eq!(compiled.statement_count(), 1);

        let mut message = Message::with_id("m");
        let mut ctx = EvaluationContext::new(&mut message, &DirectEffects);
        assert!(compiled.condition(&mut ctx).unwrap());
        compiled.execute_statement(0, &mut ctx).unwrap();
        drop(ctx);
        assert_eq!(message.field("x"), Some(&Value::Long(2)));
    }

    #[test]
    fn test_folded_failures_surface_at_runtime() {
        let registry = FunctionRegistry::with_builtins();
        let rule = validate("rule \"r\" when 1 / 0 == 1 then end", &registry).unwrap();
        let compiled = compile(&rule, &registry);

        let mut message = Message::with_id("m");
        let mut ctx = EvaluationContext::new(&mut message, &DirectEffects);
        assert_eq!(compiled.condition(&mut ctx).unwrap_err(), EvaluationError::DivisionByZero);
    }
}
