//! Abstract syntax tree for rules and pipelines

use sluice_types::{Type, Value};
use std::fmt;

/// Source position of a node, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Span {
    /// Line number
    pub line: u32,
    /// Column number
    pub column: u32,
}

impl Span {
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl BinaryOperator {
    /// Operator as written in source
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
        }
    }

    #[must_use]
    pub const fn is_arithmetic(&self) -> bool {
        matches!(self, Self::Add | Self::Subtract | Self::Multiply | Self::Divide | Self::Modulo)
    }

    #[must_use]
    pub const fn is_equality(&self) -> bool {
        matches!(self, Self::Equal | Self::NotEqual)
    }

    #[must_use]
    pub const fn is_ordering(&self) -> bool {
        matches!(
            self,
            Self::LessThan | Self::LessThanOrEqual | Self::GreaterThan | Self::GreaterThanOrEqual
        )
    }
}

/// Short-circuiting boolean connectives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOperator {
    And,
    Or,
}

impl LogicalOperator {
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

/// One argument of a function call, optionally named
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: Option<String>,
    pub value: Expression,
    pub span: Span,
}

/// A function call
///
/// `bindings` is empty after parsing. The validator fills it with one entry
/// per declared parameter: the index into `args` bound to that parameter, or
/// `None` when the parameter was omitted and takes its default.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<Argument>,
    pub bindings: Vec<Option<usize>>,
    pub span: Span,
}

/// AST node representing an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Literal value with its static type
    Literal { value: Value, ty: Type, span: Span },

    /// `$message.field` or `$message["field"]`
    FieldRef { name: String, span: Span },

    /// Reference to a `let`-bound variable
    VarRef { name: String, span: Span },

    FunctionCall(FunctionCall),

    BinaryOp { left: Box<Expression>, operator: BinaryOperator, right: Box<Expression>, span: Span },

    LogicalOp { left: Box<Expression>, operator: LogicalOperator, right: Box<Expression>, span: Span },

    Not { operand: Box<Expression>, span: Span },

    Negate { operand: Box<Expression>, span: Span },

    /// `target[index]` over arrays and maps
    Index { target: Box<Expression>, index: Box<Expression>, span: Span },

    ArrayLiteral { elements: Vec<Expression>, span: Span },

    MapLiteral { entries: Vec<(String, Expression)>, span: Span },
}

impl Expression {
    /// Literal from a value, typed by the value itself
    #[must_use]
    pub fn literal(value: Value, span: Span) -> Self {
        let ty = value.value_type();
        Self::Literal { value, ty, span }
    }

    #[must_use]
    pub fn binary(left: Expression, operator: BinaryOperator, right: Expression, span: Span) -> Self {
        Self::BinaryOp { left: Box::new(left), operator, right: Box::new(right), span }
    }

    #[must_use]
    pub fn logical(left: Expression, operator: LogicalOperator, right: Expression, span: Span) -> Self {
        Self::LogicalOp { left: Box::new(left), operator, right: Box::new(right), span }
    }

    /// Source position of the node
    #[must_use]
    pub const fn span(&self) -> Span {
        match self {
            Self::FunctionCall(call) => call.span,
            Self::Literal { span, .. }
            | Self::FieldRef { span, .. }
            | Self::VarRef { span, .. }
            | Self::BinaryOp { span, .. }
            | Self::LogicalOp { span, .. }
            | Self::Not { span, .. }
            | Self::Negate { span, .. }
            | Self::Index { span, .. }
            | Self::ArrayLiteral { span, .. }
            | Self::MapLiteral { span, .. } => *span,
        }
    }
}

fn write_string_literal(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for ch in s.chars() {
        match ch {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            other => write!(f, "{other}")?,
        }
    }
    f.write_str("\"")
}

fn write_value(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::String(s) => write_string_literal(f, s),
        Value::Double(d) if d.fract() == 0.0 && d.is_finite() => write!(f, "{d:.1}"),
        other => write!(f, "{other}"),
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal { value, .. } => write_value(f, value),
            Self::FieldRef { name, .. } => {
                if name.chars().all(|c: char| c.is_alphanumeric() || c == '_') && !name.is_empty() {
                    write!(f, "$message.{name}")
                } else {
                    f.write_str("$message[")?;
                    write_string_literal(f, name)?;
                    f.write_str("]")
                }
            }
            Self::VarRef { name, .. } => f.write_str(name),
            Self::FunctionCall(call) => {
                write!(f, "{}(", call.name)?;
                for (i, arg) in call.args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    if let Some(name) = &arg.name {
                        write!(f, "{name}: ")?;
                    }
                    write!(f, "{}", arg.value)?;
                }
                f.write_str(")")
            }
            Self::BinaryOp { left, operator, right, .. } => {
                write!(f, "({left} {} {right})", operator.symbol())
            }
            Self::LogicalOp { left, operator, right, .. } => {
                write!(f, "({left} {} {right})", operator.symbol())
            }
            Self::Not { operand, .. } => write!(f, "not {operand}"),
            Self::Negate { operand, .. } => write!(f, "-{operand}"),
            Self::Index { target, index, .. } => write!(f, "{target}[{index}]"),
            Self::ArrayLiteral { elements, .. } => {
                f.write_str("[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{element}")?;
                }
                f.write_str("]")
            }
            Self::MapLiteral { entries, .. } => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_string_literal(f, key)?;
                    write!(f, ": {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

/// A statement in a rule's `then` block
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `let name = expr;` with the type inferred by the validator
    VarAssign { name: String, expr: Expression, ty: Option<Type>, span: Span },

    /// `expr;`, evaluated for its effects
    ExprStatement { expr: Expression, span: Span },
}

impl Statement {
    #[must_use]
    pub const fn span(&self) -> Span {
        match self {
            Self::VarAssign { span, .. } | Self::ExprStatement { span, .. } => *span,
        }
    }

    #[must_use]
    pub const fn expression(&self) -> &Expression {
        match self {
            Self::VarAssign { expr, .. } | Self::ExprStatement { expr, .. } => expr,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VarAssign { name, expr, .. } => write!(f, "let {name} = {expr};"),
            Self::ExprStatement { expr, .. } => write!(f, "{expr};"),
        }
    }
}

/// A parsed, not yet validated rule
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDecl {
    pub name: String,
    pub when: Expression,
    pub then: Vec<Statement>,
    /// Source text of this declaration
    pub source: String,
    pub span: Span,
}

/// A rule reference inside a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleRef {
    pub name: String,
    pub span: Span,
}

/// Match keyword of a stage as written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageMatch {
    /// `match all`
    All,
    /// `match any` or `match either`
    Any,
    /// `match pass`: run the rules, never halt
    Pass,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageDecl {
    pub order: i32,
    pub matching: StageMatch,
    pub rules: Vec<RuleRef>,
    pub span: Span,
}

/// A parsed pipeline whose rule references are not yet resolved
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineDecl {
    pub name: String,
    pub stages: Vec<StageDecl>,
    pub source: String,
    pub span: Span,
}

/// Top-level item of a source document
#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    Rule(RuleDecl),
    Pipeline(PipelineDecl),
}

impl Declaration {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Rule(rule) => &rule.name,
            Self::Pipeline(pipeline) => &pipeline.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_round_trips_field_refs() {
        let plain = Expression::FieldRef { name: "status".into(), span: Span::default() };
        let odd = Expression::FieldRef { name: "http status".into(), span: Span::default() };
        assert_eq!(plain.to_string(), "$message.status");
        assert_eq!(odd.to_string(), "$message[\"http status\"]");
    }

    #[test]
    fn test_display_binary() {
        let expr = Expression::binary(
            Expression::literal(Value::Long(1), Span::default()),
            BinaryOperator::Add,
            Expression::literal(Value::Double(2.0), Span::default()),
            Span::default(),
        );
        assert_eq!(expr.to_string(), "(1 + 2.0)");
    }
}
