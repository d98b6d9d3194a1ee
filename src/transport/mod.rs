//! Transport abstraction layer.
//!
//! A transport turns a formatted command into a running execution context.
//! The engine never touches processes or sessions directly; it only drives
//! contexts through the [`ExecutionContext`] trait.

mod container;
mod local;
mod process;

pub use container::{ContainerOptions, ContainerTransport};
pub use local::{LocalOptions, LocalTransport};
pub use process::ProcessContext;

use std::fmt::Debug;
use std::time::{Instant, SystemTime};

use crate::Result;

/// Everything a transport needs to start one command.
#[derive(Debug, Clone, Copy)]
pub struct OpenRequest<'a, O> {
    /// Fully formatted command, never masked.
    pub command: &'a str,
    /// Bytes written to the command's stdin, which is then closed.
    pub stdin: Option<&'a [u8]>,
    /// Capture stdout.
    pub open_stdout: bool,
    /// Capture stderr.
    pub open_stderr: bool,
    /// Scope the command was wrapped into, if any.
    pub scope: Option<&'a str>,
    /// Transport specific options.
    pub options: &'a O,
}

/// A way of running commands.
pub trait Transport: Send + Sync {
    /// Transport specific per-call options.
    type Options: Default + Clone + Debug + Send + Sync;

    /// Live handle for one command.
    type Context: ExecutionContext;

    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Start `request.command`.
    ///
    /// Fails with [`ExecError::Transport`](crate::ExecError::Transport) when
    /// the command cannot be dispatched.
    fn open_execute_context(&self, request: &OpenRequest<'_, Self::Options>)
        -> Result<Self::Context>;
}

/// Live handle for exactly one in-flight command.
///
/// Dropping the context releases it; implementations stop the command if it
/// is still running at that point.
pub trait ExecutionContext {
    /// Block until the command finishes or `deadline` passes.
    ///
    /// Returns the exit code, or `None` if the deadline passed first.
    fn wait(&mut self, deadline: Option<Instant>) -> Result<Option<i32>>;

    /// Stdout accumulated so far.
    fn stdout(&mut self) -> Vec<u8>;

    /// Stderr accumulated so far.
    fn stderr(&mut self) -> Vec<u8>;

    /// Ask the command to stop. Best effort.
    fn terminate(&mut self) -> Result<()>;

    /// Wall-clock time the command was dispatched.
    fn started(&self) -> SystemTime;
}
