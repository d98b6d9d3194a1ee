//! Per-call execution options.

use std::path::Path;
use std::time::Duration;

use super::command::LogMask;
use crate::error::ValidationError;

/// Default execution timeout (one hour).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Options for one `execute` call.
///
/// `O` carries transport specific settings such as a working directory.
#[derive(Debug, Clone)]
pub struct ExecOptions<O> {
    /// Log at `info` instead of `debug`.
    pub verbose: bool,
    /// Bound on the wait for completion; `None` waits forever.
    pub timeout: Option<Duration>,
    /// Mask applied after the helper's own mask.
    pub mask: Option<LogMask>,
    /// Bytes fed to the command's stdin.
    pub stdin: Option<Vec<u8>>,
    /// Capture stdout.
    pub open_stdout: bool,
    /// Log captured stdout lines.
    pub log_stdout: bool,
    /// Capture stderr.
    pub open_stderr: bool,
    /// Log captured stderr lines.
    pub log_stderr: bool,
    /// Scope for this call only, ahead of any helper or block scope.
    pub scope: Option<String>,
    /// Transport options.
    pub transport: O,
}

impl<O: Default> Default for ExecOptions<O> {
    fn default() -> Self {
        Self {
            verbose: false,
            timeout: Some(DEFAULT_TIMEOUT),
            mask: None,
            stdin: None,
            open_stdout: true,
            log_stdout: true,
            open_stderr: true,
            log_stderr: true,
            scope: None,
            transport: O::default(),
        }
    }
}

impl<O: Default> ExecOptions<O> {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<O> ExecOptions<O> {
    /// Log at `info` level.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Wait for completion without a bound.
    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Add a per-call log mask.
    pub fn mask(mut self, mask: LogMask) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Compile and add a per-call log mask.
    pub fn mask_pattern(self, pattern: &str) -> Result<Self, ValidationError> {
        Ok(self.mask(LogMask::new(pattern)?))
    }

    /// Feed `data` to stdin.
    pub fn stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    /// Choose whether stdout is captured and logged.
    pub fn stdout(mut self, open: bool, log: bool) -> Self {
        self.open_stdout = open;
        self.log_stdout = log;
        self
    }

    /// Choose whether stderr is captured and logged.
    pub fn stderr(mut self, open: bool, log: bool) -> Self {
        self.open_stderr = open;
        self.log_stderr = log;
        self
    }

    /// Scope this call only.
    pub fn scope(mut self, target: impl AsRef<Path>) -> Result<Self, ValidationError> {
        self.scope = super::scope::scope_from_path(target.as_ref())?;
        Ok(self)
    }

    /// Set transport options.
    pub fn transport(mut self, options: O) -> Self {
        self.transport = options;
        self
    }
}
