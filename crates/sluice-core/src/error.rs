//! Error types for the Sluice core
//!
//! Each phase has its own error type: [`SyntaxError`] from the parser,
//! [`ValidationError`] from the validator, [`PipelineError`] while resolving
//! pipeline declarations and [`StageFailure`] when a gated stage halts a
//! pipeline. Runtime failures are [`sluice_types::EvaluationError`] and never
//! leave the rule boundary. [`SluiceError`] aggregates the build-time errors
//! for configuration loading.

use crate::ast::Span;
use crate::pipeline::MatchPolicy;
use sluice_types::Type;
use std::fmt;
use thiserror::Error;

/// Parse failure with the location of the offending token
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("syntax error at {line}:{column}: {message}")]
pub struct SyntaxError {
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
    /// What went wrong
    pub message: String,
}

impl SyntaxError {
    /// Syntax error at a span
    pub fn at(span: Span, message: impl Into<String>) -> Self {
        Self { line: span.line, column: span.column, message: message.into() }
    }

    /// Location of the error
    #[must_use]
    pub const fn span(&self) -> Span {
        Span { line: self.line, column: self.column }
    }
}

/// Reason a rule was rejected before admission
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// The source did not parse
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    /// No registered function has this name
    #[error("{position}: unknown function '{name}'")]
    UnknownFunction { name: String, position: Span },

    /// An argument or operand had the wrong type
    #[error("{position}: expected {expected}, found {actual}")]
    TypeMismatch { expected: Type, actual: Type, position: Span },

    /// A variable was read before any `let` declared it
    #[error("{position}: undeclared variable '{name}'")]
    UndeclaredVariable { name: String, position: Span },

    /// The `when` expression is not Boolean
    #[error("{position}: rule condition must be Boolean, found {actual}")]
    ConditionNotBoolean { actual: Type, position: Span },

    /// A `let` re-declared an existing variable
    #[error("{position}: variable '{name}' is already declared")]
    DuplicateVariable { name: String, position: Span },

    /// Too many or too few positional arguments
    #[error("{position}: '{function}' takes {min} to {max} arguments, {actual} given")]
    WrongArgumentCount { function: String, min: usize, max: usize, actual: usize, position: Span },

    /// A required parameter received no argument
    #[error("{position}: missing required argument '{parameter}' of '{function}'")]
    MissingArgument { function: String, parameter: String, position: Span },

    /// A named argument does not match any parameter
    #[error("{position}: '{function}' has no parameter named '{parameter}'")]
    UnknownParameter { function: String, parameter: String, position: Span },

    /// A parameter was bound twice
    #[error("{position}: argument '{parameter}' of '{function}' given more than once")]
    DuplicateArgument { function: String, parameter: String, position: Span },

    /// A positional argument followed a named one
    #[error("{position}: positional argument after named arguments in call to '{function}'")]
    PositionalAfterNamed { function: String, position: Span },

    /// Operator not defined for these operand types
    #[error("{position}: operator '{operator}' cannot be applied to {left} and {right}")]
    InvalidOperator { operator: String, left: Type, right: Type, position: Span },

    /// Index applied to a value that is neither an array nor a map
    #[error("{position}: cannot index into {actual}")]
    NotIndexable { actual: Type, position: Span },
}

impl ValidationError {
    /// Location of the error
    #[must_use]
    pub fn position(&self) -> Span {
        match self {
            Self::Syntax(e) => e.span(),
            Self::UnknownFunction { position, .. }
            | Self::TypeMismatch { position, .. }
            | Self::UndeclaredVariable { position, .. }
            | Self::ConditionNotBoolean { position, .. }
            | Self::DuplicateVariable { position, .. }
            | Self::WrongArgumentCount { position, .. }
            | Self::MissingArgument { position, .. }
            | Self::UnknownParameter { position, .. }
            | Self::DuplicateArgument { position, .. }
            | Self::PositionalAfterNamed { position, .. }
            | Self::InvalidOperator { position, .. }
            | Self::NotIndexable { position, .. } => *position,
        }
    }
}

/// Failure to turn a pipeline declaration into a runnable pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// The source did not parse
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    /// Two stages share the same number
    #[error("pipeline '{pipeline}' declares stage {order} more than once")]
    DuplicateStage { pipeline: String, order: i32 },

    /// A stage references a rule that is not admitted
    #[error("pipeline '{pipeline}' references unknown rule '{rule}' at {position}")]
    UnknownRule { pipeline: String, rule: String, position: Span },
}

/// A gated stage whose match policy was not satisfied
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "stage {stage} of pipeline '{pipeline}' failed: {matched} of {total} rules matched under {policy}"
)]
pub struct StageFailure {
    /// Pipeline name
    pub pipeline: String,
    /// Stage number
    pub stage: i32,
    /// Policy that was not satisfied
    pub policy: MatchPolicy,
    /// Rules whose condition held
    pub matched: usize,
    /// Rules in the stage
    pub total: usize,
}

/// Build-time error while assembling a configuration snapshot
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SluiceError {
    /// A rule failed to parse or validate
    #[error("rule {} rejected: {}", name.as_deref().unwrap_or("<unnamed>"), join_errors(errors))]
    RuleRejected { name: Option<String>, errors: Vec<ValidationError> },

    /// A second rule with an already admitted name
    #[error("duplicate rule '{name}'")]
    DuplicateRule { name: String },

    /// A pipeline failed to parse or resolve
    #[error("pipeline {} rejected: {source}", name.as_deref().unwrap_or("<unnamed>"))]
    PipelineRejected {
        name: Option<String>,
        #[source]
        source: PipelineError,
    },

    /// A second pipeline with an already admitted name
    #[error("duplicate pipeline '{name}'")]
    DuplicatePipeline { name: String },

    /// A pipeline was requested that the snapshot does not contain
    #[error("unknown pipeline '{name}'")]
    UnknownPipeline { name: String },

    /// Invalid engine settings
    #[error("configuration error: {message}")]
    Configuration { message: String, setting: Option<String> },

    /// A worker thread failed outside of rule evaluation
    #[error("worker error: {message}")]
    Worker { message: String },
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

impl SluiceError {
    /// Configuration error for a named setting
    pub fn configuration(setting: &str, message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into(), setting: Some(setting.to_string()) }
    }

    /// Get the error category for logging and metrics
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::RuleRejected { .. } | Self::DuplicateRule { .. } => "rule",
            Self::PipelineRejected { .. }
            | Self::DuplicatePipeline { .. }
            | Self::UnknownPipeline { .. } => "pipeline",
            Self::Configuration { .. } => "configuration",
            Self::Worker { .. } => "worker",
        }
    }

    /// Get the error severity level
    #[must_use]
    pub const fn severity(&self) -> ErrorSeverity {
        match self {
            Self::RuleRejected { .. } | Self::DuplicateRule { .. } => ErrorSeverity::Medium,
            Self::PipelineRejected { .. } | Self::DuplicatePipeline { .. } => ErrorSeverity::Medium,
            Self::UnknownPipeline { .. } => ErrorSeverity::Low,
            Self::Configuration { .. } => ErrorSeverity::Critical,
            Self::Worker { .. } => ErrorSeverity::High,
        }
    }

    /// Whether the rest of the configuration keeps working despite this error
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Configuration { .. })
    }
}

/// Error severity levels for logging and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Low => write!(f, "LOW"),
            ErrorSeverity::Medium => write!(f, "MEDIUM"),
            ErrorSeverity::High => write!(f, "HIGH"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Result type alias for snapshot building
pub type SluiceResult<T> = Result<T, SluiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_display() {
        let err = SyntaxError::at(Span::new(3, 7), "expected 'then'");
        assert_eq!(err.to_string(), "syntax error at 3:7: expected 'then'");
        assert_eq!(ValidationError::from(err).position(), Span::new(3, 7));
    }

    #[test]
    fn test_rule_rejection_lists_errors() {
        let err = SluiceError::RuleRejected {
            name: Some("r".into()),
            errors: vec![ValidationError::UnknownFunction { name: "nope".into(), position: Span::new(1, 1) }],
        };
        assert_eq!(err.to_string(), "rule r rejected: 1:1: unknown function 'nope'");
        assert_eq!(err.category(), "rule");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_configuration_errors_are_not_recoverable() {
        let err = SluiceError::configuration("workers", "must be positive");
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert!(!err.is_recoverable());
    }
}
