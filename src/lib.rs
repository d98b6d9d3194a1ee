//! # shell-exec
//!
//! Uniform shell command execution over interchangeable transports.
//!
//! A command is formatted (optionally wrapped into a chroot style scope),
//! dispatched through a [`Transport`], driven until it finishes or times
//! out, and returned as a structured [`ExecResult`]. Exit code and stderr
//! policies are layered on top with [`ExecHelper::check_call`] and
//! [`ExecHelper::check_stderr`].
//!
//! ## Features
//!
//! - **Transport independent**: local subprocesses and container exec share one engine
//! - **Timeouts**: hard wall-clock bound with best-effort termination
//! - **Log masking**: regex based redaction of secrets in logged commands
//! - **Scopes**: nestable, thread-safe chroot style overrides
//!
//! ## Quick Start
//!
//! ```no_run
//! use shell_exec::{CheckOptions, ExecHelper, ExecOptions, LocalTransport, LogMask};
//!
//! fn main() -> shell_exec::Result<()> {
//!     // Initialize logging
//!     shell_exec::logging::try_init().ok();
//!
//!     let helper = ExecHelper::new(LocalTransport::new())
//!         .with_mask(LogMask::new(r"--password=(\S+)")?);
//!     let options = ExecOptions::new();
//!
//!     let result = helper.check_call("uname -a", &options, &CheckOptions::new())?;
//!     println!("{}", result.stdout_str());
//!
//!     {
//!         let _root = helper.scope("/mnt/target")?;
//!         helper.check_stderr("apt-get -qq update", &options, &CheckOptions::new())?;
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod execution;
pub mod logging;
pub mod transport;

// Re-export commonly used types
pub use error::{ExecError, ExecutionTimeoutError, Result, ValidationError};
pub use execution::{
    execute_together, CalledProcessError, CheckOptions, CommandLine, ExecHelper, ExecOptions,
    ExecResult, ExpectedCodes, FailureKind, LogMask, ProcessFailure, ScopeGuard,
};
pub use transport::{
    ContainerOptions, ContainerTransport, ExecutionContext, LocalOptions, LocalTransport,
    OpenRequest, Transport,
};
