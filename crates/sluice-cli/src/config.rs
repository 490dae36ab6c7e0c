//! File and environment configuration for the `sluice` binary
//!
//! Settings come from a TOML file (`--config`, else `SLUICE_CONFIG_PATH`,
//! else `sluice.toml`) and are then overridden by environment variables.
//! Rule and pipeline paths in the file are resolved against the directory the
//! file lives in.

use anyhow::{Context, Result};
use serde::Deserialize;
use sluice_core::{EngineConfig, ExecutionMode};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_PATH_ENV: &str = "SLUICE_CONFIG_PATH";
pub const EXECUTION_MODE_ENV: &str = "SLUICE_EXECUTION_MODE";
pub const WORKERS_ENV: &str = "SLUICE_WORKERS";
pub const LOG_JSON_ENV: &str = "SLUICE_LOG_JSON";

const DEFAULT_CONFIG_PATH: &str = "sluice.toml";

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RulesConfig {
    /// Source files holding rule declarations
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelinesConfig {
    #[serde(default)]
    pub files: Vec<PathBuf>,
    /// Pipelines a message runs through; empty means every admitted pipeline
    #[serde(default)]
    pub run: Vec<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), json: false }
    }
}

fn default_log_level() -> String {
    "sluice=info".to_string()
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SluiceConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub pipelines: PipelinesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// File the settings were read from, `None` when running on defaults
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl SluiceConfig {
    /// Load the configuration file and apply environment overrides
    ///
    /// A missing file is not an error: defaults are used and `source` stays
    /// empty. A file that exists but does not parse is.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => std::env::var_os(CONFIG_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
        };

        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            debug!(path = %path.display(), "Configuration file not found");
            Self::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.engine.validate().context("invalid [engine] settings")?;
        Ok(config)
    }

    /// Parse a configuration file, resolving relative source paths against
    /// the file's directory
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration file {}", path.display()))?;
        let mut config = Self::from_toml(&text)
            .with_context(|| format!("failed to parse configuration file {}", path.display()))?;
        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            config.resolve_paths(base);
        }
        config.source = Some(path.to_path_buf());
        debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `SLUICE_*` overrides read through `lookup`
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(mode) = lookup(EXECUTION_MODE_ENV) {
            self.engine.execution_mode = mode
                .parse::<ExecutionMode>()
                .with_context(|| format!("invalid {EXECUTION_MODE_ENV}"))?;
        }
        if let Some(workers) = lookup(WORKERS_ENV) {
            self.engine.workers = workers
                .trim()
                .parse()
                .with_context(|| format!("invalid {WORKERS_ENV} '{workers}'"))?;
        }
        if let Some(json) = lookup(LOG_JSON_ENV) {
            self.logging.json = matches!(json.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        for path in self.rules.files.iter_mut().chain(self.pipelines.files.iter_mut()) {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    /// Every configured source file, rules first
    pub fn source_files(&self) -> impl Iterator<Item = &PathBuf> {
        self.rules.files.iter().chain(self.pipelines.files.iter())
    }
}
