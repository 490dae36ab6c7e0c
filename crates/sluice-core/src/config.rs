//! Engine configuration

use crate::error::{SluiceError, SluiceResult};
use crate::executor::{ExecutorOptions, PROCESSING_ERROR_FIELD};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How admitted rules are executed
///
/// The mode applies to a whole snapshot: either every rule carries a compiled
/// form or none does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Interpreted,
    Compiled,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interpreted => write!(f, "interpreted"),
            Self::Compiled => write!(f, "compiled"),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = SluiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interpreted" | "interpreter" => Ok(Self::Interpreted),
            "compiled" | "codegen" => Ok(Self::Compiled),
            other => Err(SluiceError::configuration(
                "execution_mode",
                format!("unknown execution mode '{other}', expected 'interpreted' or 'compiled'"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    /// Worker threads used by the message processor
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Bound of the work queue feeding the workers
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_true")]
    pub record_processing_errors: bool,
    #[serde(default = "default_processing_error_field")]
    pub processing_error_field: String,
}

fn default_workers() -> usize {
    num_cpus::get()
}

const fn default_channel_capacity() -> usize {
    1024
}

const fn default_true() -> bool {
    true
}

fn default_processing_error_field() -> String {
    PROCESSING_ERROR_FIELD.to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            execution_mode: ExecutionMode::default(),
            workers: default_workers(),
            channel_capacity: default_channel_capacity(),
            record_processing_errors: true,
            processing_error_field: default_processing_error_field(),
        }
    }
}

impl EngineConfig {
    /// Reject settings the engine cannot run with
    ///
    /// # Errors
    ///
    /// `SluiceError::Configuration` naming the offending setting.
    pub fn validate(&self) -> SluiceResult<()> {
        if self.workers == 0 {
            return Err(SluiceError::configuration("workers", "at least one worker is required"));
        }
        if self.channel_capacity == 0 {
            return Err(SluiceError::configuration("channel_capacity", "channel capacity must be positive"));
        }
        if self.record_processing_errors && self.processing_error_field.trim().is_empty() {
            return Err(SluiceError::configuration(
                "processing_error_field",
                "field name must not be empty while processing errors are recorded",
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn executor_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            record_processing_errors: self.record_processing_errors,
            processing_error_field: self.processing_error_field.clone(),
        }
    }
}
