//! Configuration management for shell-exec.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::Args;
use crate::error::{ExecError, ValidationError};
use crate::execution::{ExecHelper, ExecOptions, LogMask, DEFAULT_TIMEOUT};
use crate::transport::Transport;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Execution defaults.
    pub execution: ExecutionSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Execution configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSection {
    /// Timeout in seconds; 0 disables the timeout.
    pub timeout_secs: u64,
    /// Log commands at info level.
    pub verbose: bool,
    /// Regex whose groups are masked in logged commands.
    pub log_mask: Option<String>,
    /// Default scope (chroot) directory.
    pub chroot: Option<String>,
    /// Require empty stderr in addition to the exit code check.
    pub check_stderr: bool,
    /// Accepted exit codes.
    pub expected: Vec<i32>,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            verbose: false,
            log_mask: None,
            chroot: None,
            check_stderr: false,
            expected: vec![0],
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Ok(timeout) = std::env::var("SHELL_EXEC_TIMEOUT") {
            if let Ok(timeout) = timeout.parse() {
                self.execution.timeout_secs = timeout;
            }
        }

        if let Ok(mask) = std::env::var("SHELL_EXEC_LOG_MASK") {
            if !mask.is_empty() {
                self.execution.log_mask = Some(mask);
            }
        }

        if let Ok(chroot) = std::env::var("SHELL_EXEC_CHROOT") {
            self.execution.chroot = (!chroot.is_empty()).then_some(chroot);
        }

        if let Ok(level) = std::env::var("SHELL_EXEC_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(timeout) = args.timeout {
            self.execution.timeout_secs = timeout;
        }

        if let Some(ref mask) = args.mask {
            self.execution.log_mask = Some(mask.clone());
        }

        if let Some(ref chroot) = args.chroot {
            self.execution.chroot = Some(chroot.clone());
        }

        if let Some(ref expected) = args.expected {
            self.execution.expected = expected.clone();
        }

        if args.verbose {
            self.execution.verbose = true;
        }

        if args.check_stderr {
            self.execution.check_stderr = true;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(ref path) = args.config {
            config = Config::from_file(path)?;
        }

        config.apply_env();
        config.apply_args(args);

        Ok(config)
    }

    /// Configured timeout; `None` when disabled.
    pub fn timeout(&self) -> Option<Duration> {
        match self.execution.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Compile the configured log mask.
    pub fn log_mask(&self) -> Result<Option<LogMask>, ConfigError> {
        self.execution
            .log_mask
            .as_deref()
            .map(LogMask::new)
            .transpose()
            .map_err(ConfigError::Invalid)
    }

    /// Per-call options carrying the configured defaults.
    pub fn exec_options<O: Default>(&self) -> ExecOptions<O> {
        let mut options = ExecOptions::new().verbose(self.execution.verbose);
        options.timeout = self.timeout();
        options
    }

    /// Build a helper for `transport` with the configured mask and scope.
    pub fn build_helper<T: Transport>(&self, transport: T) -> Result<ExecHelper<T>, ConfigError> {
        let mut helper = ExecHelper::new(transport);
        if let Some(mask) = self.log_mask()? {
            helper = helper.with_mask(mask);
        }
        if let Some(ref chroot) = self.execution.chroot {
            helper = helper
                .with_default_scope(chroot)
                .map_err(|e| match e {
                    ExecError::Validation(invalid) => ConfigError::Invalid(invalid),
                    other => ConfigError::Invalid(ValidationError::ScopePath(other.to_string())),
                })?;
        }
        Ok(helper)
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// A configured value is not usable.
    Invalid(ValidationError),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::Invalid(e) => write!(f, "invalid configuration: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}
