//! Static semantic validation
//!
//! Resolves every function call against the registry, binds arguments to
//! parameters, infers expression types bottom-up and checks declarations in
//! statement order. Errors are collected rather than returned at the first
//! failure so a rule author sees everything wrong with a rule at once.

use crate::ast::{BinaryOperator, Expression, FunctionCall, RuleDecl, Span, Statement};
use crate::error::ValidationError;
use crate::parser::parse_rule;
use crate::rule::Rule;
use ahash::AHashMap;
use sluice_functions::{FunctionDescriptor, FunctionRegistry};
use sluice_types::Type;
use tracing::{debug, instrument, warn};

/// Parse and validate a rule source
///
/// # Errors
///
/// A single `Syntax` error when parsing fails, otherwise every semantic
/// error found in the rule.
pub fn validate(source: &str, registry: &FunctionRegistry) -> Result<Rule, Vec<ValidationError>> {
    let decl = parse_rule(source).map_err(|e| vec![ValidationError::from(e)])?;
    validate_decl(decl, registry)
}

/// Validate an already parsed rule declaration
///
/// # Errors
///
/// Every semantic error found in the rule, in source order.
#[instrument(skip(decl, registry), fields(rule = %decl.name))]
pub fn validate_decl(decl: RuleDecl, registry: &FunctionRegistry) -> Result<Rule, Vec<ValidationError>> {
    let RuleDecl { name, mut when, mut then, source, .. } = decl;
    let mut validator = Validator::new(registry);

    if let Some(ty) = validator.check_expression(&mut when) {
        if ty != Type::Boolean {
            validator.errors.push(ValidationError::ConditionNotBoolean { actual: ty, position: when.span() });
        }
    }
    for statement in &mut then {
        validator.check_statement(statement, &name);
    }

    if validator.errors.is_empty() {
        debug!(statements = then.len(), "rule validated");
        Ok(Rule::new(name, source, when, then))
    } else {
        warn!(errors = validator.errors.len(), "rule rejected");
        Err(validator.errors)
    }
}

struct Validator<'r> {
    registry: &'r FunctionRegistry,
    /// Declared variables; `None` once the declaring expression failed to type
    variables: AHashMap<String, Option<Type>>,
    errors: Vec<ValidationError>,
}

impl<'r> Validator<'r> {
    fn new(registry: &'r FunctionRegistry) -> Self {
        Self { registry, variables: AHashMap::new(), errors: Vec::new() }
    }

    fn check_statement(&mut self, statement: &mut Statement, rule: &str) {
        match statement {
            Statement::VarAssign { name, expr, ty, span } => {
                let inferred = self.check_expression(expr);
                if inferred == Some(Type::Void) {
                    self.errors.push(ValidationError::TypeMismatch {
                        expected: Type::Any,
                        actual: Type::Void,
                        position: expr.span(),
                    });
                }
                let inferred = inferred.filter(|t| *t != Type::Void);
                if self.variables.contains_key(name.as_str()) {
                    self.errors.push(ValidationError::DuplicateVariable { name: name.clone(), position: *span });
                } else {
                    self.variables.insert(name.clone(), inferred.clone());
                }
                *ty = inferred;
            }
            Statement::ExprStatement { expr, span } => {
                self.check_expression(expr);
                if !self.has_effect(expr) {
                    warn!(rule, position = %span, "statement has no effect");
                }
            }
        }
    }

    fn has_effect(&self, expr: &Expression) -> bool {
        match expr {
            Expression::FunctionCall(call) => {
                self.registry.descriptor(&call.name).is_none_or(|d| !d.is_pure)
                    || call.args.iter().any(|a| self.has_effect(&a.value))
            }
            _ => false,
        }
    }

    /// Infer the type of an expression. `None` means an error was already
    /// reported for it or one of its children.
    fn check_expression(&mut self, expr: &mut Expression) -> Option<Type> {
        match expr {
            Expression::Literal { ty, .. } => Some(ty.clone()),
            Expression::FieldRef { .. } => Some(Type::Any),
            Expression::VarRef { name, span } => match self.variables.get(name.as_str()) {
                Some(ty) => ty.clone(),
                None => {
                    self.errors.push(ValidationError::UndeclaredVariable { name: name.clone(), position: *span });
                    None
                }
            },
            Expression::FunctionCall(call) => self.check_call(call),
            Expression::BinaryOp { left, operator, right, span } => {
                let lt = self.check_expression(left);
                let rt = self.check_expression(right);
                self.binary_type(*operator, lt?, rt?, *span)
            }
            Expression::LogicalOp { left, right, .. } => {
                self.expect_boolean(left);
                self.expect_boolean(right);
                Some(Type::Boolean)
            }
            Expression::Not { operand, .. } => {
                self.expect_boolean(operand);
                Some(Type::Boolean)
            }
            Expression::Negate { operand, .. } => {
                let ty = self.check_expression(operand)?;
                if ty.is_numeric() {
                    Some(ty)
                } else {
                    self.errors.push(ValidationError::TypeMismatch {
                        expected: Type::Double,
                        actual: ty,
                        position: operand.span(),
                    });
                    None
                }
            }
            Expression::Index { target, index, span } => {
                let target_ty = self.check_expression(target);
                let index_ty = self.check_expression(index);
                let (target_ty, index_ty) = (target_ty?, index_ty?);
                let (key_ty, result) = match target_ty {
                    Type::Array(element) => (Type::Long, *element),
                    Type::Map => (Type::String, Type::Any),
                    actual => {
                        self.errors.push(ValidationError::NotIndexable { actual, position: *span });
                        return None;
                    }
                };
                if key_ty.accepts(&index_ty) {
                    Some(result)
                } else {
                    self.errors.push(ValidationError::TypeMismatch {
                        expected: key_ty,
                        actual: index_ty,
                        position: index.span(),
                    });
                    None
                }
            }
            Expression::ArrayLiteral { elements, .. } => {
                let mut element_ty: Option<Type> = None;
                let mut failed = false;
                for element in elements.iter_mut() {
                    let Some(ty) = self.check_expression(element) else {
                        failed = true;
                        continue;
                    };
                    if !self.reject_void(&ty, element.span()) {
                        failed = true;
                        continue;
                    }
                    element_ty = Some(match element_ty {
                        None => ty,
                        Some(prev) => prev.unify(&ty).unwrap_or(Type::Any),
                    });
                }
                if failed { None } else { Some(Type::array(element_ty.unwrap_or(Type::Any))) }
            }
            Expression::MapLiteral { entries, .. } => {
                let mut failed = false;
                for (_, value) in entries.iter_mut() {
                    match self.check_expression(value) {
                        Some(ty) if self.reject_void(&ty, value.span()) => {}
                        _ => failed = true,
                    }
                }
                if failed { None } else { Some(Type::Map) }
            }
        }
    }

    /// Report a Void value used as data; true when the type is usable
    fn reject_void(&mut self, ty: &Type, position: Span) -> bool {
        if *ty == Type::Void {
            self.errors.push(ValidationError::TypeMismatch { expected: Type::Any, actual: Type::Void, position });
            false
        } else {
            true
        }
    }

    fn expect_boolean(&mut self, expr: &mut Expression) {
        if let Some(ty) = self.check_expression(expr) {
            if ty != Type::Boolean {
                self.errors.push(ValidationError::TypeMismatch {
                    expected: Type::Boolean,
                    actual: ty,
                    position: expr.span(),
                });
            }
        }
    }

    fn binary_type(&mut self, op: BinaryOperator, left: Type, right: Type, span: Span) -> Option<Type> {
        let result = if op.is_arithmetic() {
            match (&left, &right) {
                (Type::Long, Type::Long) => Some(Type::Long),
                (l, r) if l.is_numeric() && r.is_numeric() => Some(Type::Double),
                (Type::String, Type::String) if op == BinaryOperator::Add => Some(Type::String),
                _ => None,
            }
        } else if op.is_ordering() {
            let comparable = (left.is_numeric() && right.is_numeric())
                || matches!((&left, &right), (Type::String, Type::String) | (Type::DateTime, Type::DateTime));
            comparable.then_some(Type::Boolean)
        } else {
            (left != Type::Void && right != Type::Void).then_some(Type::Boolean)
        };

        if result.is_none() {
            self.errors.push(ValidationError::InvalidOperator {
                operator: op.symbol().to_string(),
                left,
                right,
                position: span,
            });
        }
        result
    }

    fn check_call(&mut self, call: &mut FunctionCall) -> Option<Type> {
        let arg_types: Vec<Option<Type>> =
            call.args.iter_mut().map(|arg| self.check_expression(&mut arg.value)).collect();

        let registry = self.registry;
        let Some(descriptor) = registry.descriptor(&call.name) else {
            self.errors.push(ValidationError::UnknownFunction { name: call.name.clone(), position: call.span });
            return None;
        };

        let before = self.errors.len();
        let bindings = self.bind_arguments(call, descriptor);

        for (param, slot) in descriptor.params.iter().zip(&bindings) {
            let Some(arg_index) = *slot else { continue };
            let Some(actual) = &arg_types[arg_index] else { continue };
            if !param.ty.accepts(actual) {
                self.errors.push(ValidationError::TypeMismatch {
                    expected: param.ty.clone(),
                    actual: actual.clone(),
                    position: call.args[arg_index].span,
                });
            }
        }

        call.bindings = bindings;
        let clean = self.errors.len() == before && arg_types.iter().all(Option::is_some);
        clean.then(|| descriptor.return_type.clone())
    }

    /// Map each parameter to the argument bound to it
    fn bind_arguments(&mut self, call: &FunctionCall, descriptor: &FunctionDescriptor) -> Vec<Option<usize>> {
        let params = &descriptor.params;
        let mut bindings: Vec<Option<usize>> = vec![None; params.len()];
        let mut positional = 0usize;
        let mut seen_named = false;

        for (arg_index, arg) in call.args.iter().enumerate() {
            match &arg.name {
                Some(param_name) => {
                    seen_named = true;
                    match descriptor.param_index(param_name) {
                        None => self.errors.push(ValidationError::UnknownParameter {
                            function: call.name.clone(),
                            parameter: param_name.clone(),
                            position: arg.span,
                        }),
                        Some(slot) if bindings[slot].is_some() => {
                            self.errors.push(ValidationError::DuplicateArgument {
                                function: call.name.clone(),
                                parameter: param_name.clone(),
                                position: arg.span,
                            });
                        }
                        Some(slot) => bindings[slot] = Some(arg_index),
                    }
                }
                None if seen_named => {
                    self.errors.push(ValidationError::PositionalAfterNamed {
                        function: call.name.clone(),
                        position: arg.span,
                    });
                }
                None => {
                    if positional < params.len() {
                        bindings[positional] = Some(arg_index);
                    }
                    positional += 1;
                }
            }
        }

        if positional > params.len() {
            self.errors.push(ValidationError::WrongArgumentCount {
                function: call.name.clone(),
                min: descriptor.required_count(),
                max: params.len(),
                actual: call.args.len(),
                position: call.span,
            });
            return bindings;
        }

        for (param, slot) in params.iter().zip(&bindings) {
            if param.required && slot.is_none() {
                self.errors.push(ValidationError::MissingArgument {
                    function: call.name.clone(),
                    parameter: param.name.clone(),
                    position: call.span,
                });
            }
        }
        bindings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn errors(source: &str) -> Vec<ValidationError> {
        validate(source, &FunctionRegistry::with_builtins()).unwrap_err()
    }

    #[test]
    fn test_bindings_follow_parameter_order() {
        let rule = validate(
            "rule \"r\" when true then set_field(value: 1, field: \"a\"); end",
            &FunctionRegistry::with_builtins(),
        )
        .unwrap();
        let Statement::ExprStatement { expr: Expression::FunctionCall(call), .. } = &rule.then()[0] else {
            panic!("expected a call statement");
        };
        assert_eq!(call.bindings, vec![Some(1), Some(0), None, None]);
    }

    #[test]
    fn test_argument_binding_errors() {
        let errs = errors("rule \"r\" when true then set_field(\"a\", value: 1, \"b\"); end");
        assert!(matches!(errs[0], ValidationError::PositionalAfterNamed { .. }));

        let errs = errors("rule \"r\" when true then set_field(\"a\", 1, field: \"b\"); end");
        assert!(matches!(errs[0], ValidationError::DuplicateArgument { .. }));

        let errs = errors("rule \"r\" when true then set_field(\"a\", colour: 1); end");
        assert!(matches!(errs[0], ValidationError::UnknownParameter { .. }));

        let errs = errors("rule \"r\" when true then set_field(\"a\"); end");
        assert!(matches!(&errs[0], ValidationError::MissingArgument { parameter, .. } if parameter == "value"));

        let errs = errors("rule \"r\" when has_field(\"a\", \"b\") then end");
        assert!(matches!(errs[0], ValidationError::WrongArgumentCount { min: 1, max: 1, actual: 2, .. }));
    }

    #[test]
    fn test_void_cannot_be_bound() {
        let errs = errors("rule \"r\" when true then let x = drop_message(); end");
        assert!(matches!(errs[0], ValidationError::TypeMismatch { actual: Type::Void, .. }));
    }

    #[test]
    fn test_poisoned_variables_do_not_cascade() {
        let errs = errors("rule \"r\" when true then let x = nope(); set_field(\"a\", x); end");
        assert_eq!(errs.len(), 1);
        assert!(matches!(errs[0], ValidationError::UnknownFunction { .. }));
    }
}
