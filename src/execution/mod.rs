//! Command execution engine.
//!
//! This module provides the transport independent execution pipeline:
//! - Command formatting, scoping and log masking
//! - Timeout bounded execution with structured results
//! - Exit code and stderr validation
//! - Scoped (chroot style) overrides
//!
//! # Example
//!
//! ```no_run
//! use shell_exec::execution::{CheckOptions, ExecHelper, ExecOptions};
//! use shell_exec::transport::LocalTransport;
//! use std::time::Duration;
//!
//! let helper = ExecHelper::new(LocalTransport::new());
//! let options = ExecOptions::new().timeout(Duration::from_secs(60));
//!
//! let result = helper.execute("echo hello", &options).unwrap();
//! println!("Output: {}", result.stdout_str());
//!
//! // Fail unless the command exits with 0 or 2
//! helper
//!     .check_call("grep -q needle haystack.txt", &options, &CheckOptions::new().expected([0, 2]))
//!     .unwrap();
//! ```

mod command;
pub mod exit_code;
mod executor;
mod options;
mod result;
mod scope;
mod validator;

pub use command::{CommandFormatter, CommandLine, LogMask, MASK_TOKEN, SCOPE_PREFIX};
pub use executor::{execute_together, ExecHelper, OUTPUT_TARGET};
pub use options::{ExecOptions, DEFAULT_TIMEOUT};
pub use result::{ExecResult, ResultSummary};
pub use scope::ScopeGuard;
pub use validator::{
    check_exit_code, check_stderr_empty, CalledProcessError, CheckOptions, ExpectedCodes,
    FailureKind, ParallelCalledProcessError, ProcessFailure,
};
