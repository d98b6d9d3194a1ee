//! Error types for shell-exec.

use std::time::Duration;

use thiserror::Error;

use crate::execution::{ExecResult, ParallelCalledProcessError, ProcessFailure};

/// Main error type for shell-exec operations.
#[derive(Error, Debug)]
pub enum ExecError {
    /// Malformed input, rejected before any transport is touched.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The execution context could not be opened or driven.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// The command did not finish within its timeout.
    #[error(transparent)]
    Timeout(Box<ExecutionTimeoutError>),

    /// The command finished, but its exit code or stderr was not expected.
    #[error("{0}")]
    CalledProcess(Box<dyn ProcessFailure>),

    /// One or more commands of a parallel run failed.
    #[error(transparent)]
    Parallel(Box<ParallelCalledProcessError>),
}

impl ExecError {
    /// Build a transport error from a message.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Build a transport error wrapping an I/O error.
    pub fn transport_io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Whether this error was raised by result validation.
    pub fn is_called_process(&self) -> bool {
        matches!(self, Self::CalledProcess(_))
    }

    /// Whether this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// The validation failure, if this is one.
    pub fn as_failure(&self) -> Option<&(dyn ProcessFailure + 'static)> {
        match self {
            Self::CalledProcess(failure) => Some(failure.as_ref()),
            _ => None,
        }
    }
}

/// Input validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Command is empty or whitespace only.
    #[error("command is empty")]
    EmptyCommand,

    /// Command contains a character no shell can carry.
    #[error("command contains invalid character: {0:?}")]
    InvalidCharacter(char),

    /// Scope path is not representable as a command argument.
    #[error("unsupported scope path: {0}")]
    ScopePath(String),

    /// Log mask is not a valid regular expression.
    #[error("invalid log mask {pattern:?}: {reason}")]
    InvalidMask { pattern: String, reason: String },
}

/// Timeout raised by [`ExecHelper::execute`](crate::ExecHelper::execute).
///
/// Carries everything captured before the deadline; `result.exit_code` is
/// always `None`.
#[derive(Error, Debug, Clone)]
#[error(
    "wait for {cmd:?} during {timeout:?} for exit code timed out",
    cmd = .result.cmd()
)]
pub struct ExecutionTimeoutError {
    /// Partial result collected before the command was stopped.
    pub result: ExecResult,
    /// The timeout that elapsed.
    pub timeout: Duration,
}

/// Convenience Result type for shell-exec operations.
pub type Result<T> = std::result::Result<T, ExecError>;
