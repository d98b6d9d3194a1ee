//! Command execution engine.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::command::{effective_scope, CommandFormatter, CommandLine, LogMask};
use super::options::ExecOptions;
use super::result::ExecResult;
use super::scope::{scope_from_path, ScopeCell, ScopeGuard};
use super::validator::{
    check_exit_code, check_stderr_empty, CheckOptions, ParallelCalledProcessError,
};
use crate::error::{ExecError, ExecutionTimeoutError};
use crate::transport::{ExecutionContext, OpenRequest, Transport};
use crate::Result;

/// Tracing target for captured output lines.
pub const OUTPUT_TARGET: &str = "shell_exec::output";

/// Log at `info` when verbose, else at `debug`.
macro_rules! log_at {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            info!($($arg)+)
        } else {
            debug!($($arg)+)
        }
    };
}

/// Runs commands through a [`Transport`].
///
/// Holds the transport, the instance-wide log mask and the current scope.
/// `execute` may be called from many threads at once; only scope blocks
/// (see [`ExecHelper::scope`]) are serialised.
pub struct ExecHelper<T: Transport> {
    name: String,
    transport: T,
    formatter: CommandFormatter,
    scope: ScopeCell,
}

impl<T: Transport> ExecHelper<T> {
    /// Create a helper named after its transport.
    pub fn new(transport: T) -> Self {
        Self {
            name: transport.name().to_string(),
            transport,
            formatter: CommandFormatter::default(),
            scope: ScopeCell::new(None),
        }
    }

    /// Override the name used in logs and parallel results.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Mask applied to every command before it is logged.
    pub fn with_mask(mut self, mask: LogMask) -> Self {
        self.formatter = CommandFormatter::new(Some(mask));
        self
    }

    /// Default scope for every command.
    pub fn with_default_scope(self, target: impl AsRef<Path>) -> Result<Self> {
        self.set_scope(Some(target.as_ref()))?;
        Ok(self)
    }

    /// Helper name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The command formatter.
    pub fn formatter(&self) -> &CommandFormatter {
        &self.formatter
    }

    /// Scope commands currently run in.
    pub fn current_scope(&self) -> Option<String> {
        self.scope.current()
    }

    /// Number of scope blocks currently entered.
    pub fn scope_depth(&self) -> usize {
        self.scope.depth()
    }

    /// Replace the default scope. `None` disables scoping.
    pub fn set_scope(&self, target: Option<&Path>) -> Result<()> {
        let scope = target.map(scope_from_path).transpose()?.flatten();
        self.scope.set(scope);
        Ok(())
    }

    /// Run commands in `target` until the guard is dropped.
    ///
    /// Blocks from other threads wait for this one to end; nested blocks on
    /// the same thread are allowed.
    pub fn scope(&self, target: impl AsRef<Path>) -> Result<ScopeGuard<'_>> {
        let scope = scope_from_path(target.as_ref())?;
        Ok(self.scope.enter(scope))
    }

    /// Disable scoping until the guard is dropped.
    pub fn unscoped(&self) -> ScopeGuard<'_> {
        self.scope.enter(None)
    }

    /// Hold the session lock for a batch of commands.
    ///
    /// The scope is left as is, and scope changes made while the guard is
    /// alive persist. Scope blocks from other threads wait for the guard.
    pub fn lock(&self) -> ScopeGuard<'_> {
        self.scope.hold()
    }

    /// Run `f` with `target` as the active scope.
    pub fn scoped<R>(&self, target: impl AsRef<Path>, f: impl FnOnce(&Self) -> R) -> Result<R> {
        let _guard = self.scope(target)?;
        Ok(f(self))
    }

    /// Execute `command` and wait for it to finish.
    ///
    /// Fails with a validation error before anything is dispatched, with a
    /// transport error if the command cannot be started, and with a timeout
    /// error if it does not finish in `options.timeout`. A non-zero exit code
    /// is not an error here; see [`check_call`](Self::check_call).
    pub fn execute(
        &self,
        command: impl Into<CommandLine>,
        options: &ExecOptions<T::Options>,
    ) -> Result<ExecResult> {
        let rendered = command.into().to_shell()?;
        let scope = options
            .scope
            .clone()
            .or_else(|| self.scope.current())
            .filter(|s| effective_scope(Some(s.as_str())).is_some());
        let formatted = self.formatter.wrap(&rendered, scope.as_deref())?;
        let masked = self.formatter.mask(&rendered, options.mask.as_ref());

        match scope {
            Some(ref root) => log_at!(
                options.verbose,
                helper = %self.name,
                command = %masked,
                scope = %root,
                "Executing command"
            ),
            None => log_at!(
                options.verbose,
                helper = %self.name,
                command = %masked,
                "Executing command"
            ),
        }

        let mut ctx = self.transport.open_execute_context(&OpenRequest {
            command: &formatted,
            stdin: options.stdin.as_deref(),
            open_stdout: options.open_stdout,
            open_stderr: options.open_stderr,
            scope: scope.as_deref(),
            options: &options.transport,
        })?;

        let start = Instant::now();
        let deadline = options.timeout.map(|timeout| start + timeout);
        let exit_code = ctx.wait(deadline)?;

        let Some(code) = exit_code else {
            if let Err(e) = ctx.terminate() {
                warn!(helper = %self.name, command = %masked, error = %e, "failed to stop timed out command");
            }
            let result = self.assemble(&mut ctx, &masked, None, start, options);
            let timeout = options.timeout.unwrap_or_default();
            warn!(
                helper = %self.name,
                command = %masked,
                timeout = ?timeout,
                "Command timed out"
            );
            return Err(ExecError::Timeout(Box::new(ExecutionTimeoutError {
                result,
                timeout,
            })));
        };

        let result = self.assemble(&mut ctx, &masked, Some(code), start, options);
        drop(ctx);

        log_at!(
            options.verbose,
            helper = %self.name,
            command = %result.cmd(),
            exit_code = code,
            "Command finished"
        );
        Ok(result)
    }

    /// Shorthand for [`execute`](Self::execute).
    pub fn run(
        &self,
        command: impl Into<CommandLine>,
        options: &ExecOptions<T::Options>,
    ) -> Result<ExecResult> {
        self.execute(command, options)
    }

    /// Execute `command` and validate its exit code.
    pub fn check_call(
        &self,
        command: impl Into<CommandLine>,
        options: &ExecOptions<T::Options>,
        check: &CheckOptions,
    ) -> Result<ExecResult> {
        let result = self.execute(command, options)?;
        check_exit_code(result, check)
    }

    /// Execute `command`, validate its exit code and require empty stderr.
    pub fn check_stderr(
        &self,
        command: impl Into<CommandLine>,
        options: &ExecOptions<T::Options>,
        check: &CheckOptions,
    ) -> Result<ExecResult> {
        let result = self.execute(command, options)?;
        check_stderr_empty(result, check)
    }

    fn assemble(
        &self,
        ctx: &mut T::Context,
        masked: &str,
        exit_code: Option<i32>,
        start: Instant,
        options: &ExecOptions<T::Options>,
    ) -> ExecResult {
        let stdout = if options.open_stdout { ctx.stdout() } else { Vec::new() };
        let stderr = if options.open_stderr { ctx.stderr() } else { Vec::new() };
        let result = ExecResult::new(masked, exit_code, stdout, stderr, start.elapsed())
            .with_started(ctx.started());

        if options.log_stdout {
            self.log_output("stdout", result.stdout(), options.verbose);
        }
        if options.log_stderr {
            self.log_output("stderr", result.stderr(), options.verbose);
        }
        result
    }

    fn log_output(&self, stream: &str, lines: &[Vec<u8>], verbose: bool) {
        for line in lines {
            let text = String::from_utf8_lossy(line);
            log_at!(
                verbose,
                target: OUTPUT_TARGET,
                helper = %self.name,
                stream,
                "{}",
                text.trim_end()
            );
        }
    }
}

impl<T> ExecHelper<T>
where
    T: Transport + 'static,
    T::Options: 'static,
{
    /// Execute on tokio's blocking pool.
    pub async fn execute_async(
        self: &Arc<Self>,
        command: impl Into<CommandLine>,
        options: ExecOptions<T::Options>,
    ) -> Result<ExecResult> {
        let helper = Arc::clone(self);
        let command = command.into();
        match tokio::task::spawn_blocking(move || helper.execute(command, &options)).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(ExecError::transport(format!("execution task failed: {e}"))),
        }
    }
}

impl<T: Transport> fmt::Debug for ExecHelper<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecHelper")
            .field("name", &self.name)
            .field("mask", &self.formatter.log_mask().map(LogMask::as_str))
            .field("scope", &self.scope.current())
            .finish_non_exhaustive()
    }
}

/// Run `command` on every helper at once and validate the exit codes.
///
/// Returns `(helper name, result)` pairs in helper order. Helpers that could
/// not run the command always fail the call; unexpected exit codes fail it
/// when `check.raise_on_err` is set.
pub fn execute_together<T: Transport>(
    helpers: &[&ExecHelper<T>],
    command: impl Into<CommandLine>,
    options: &ExecOptions<T::Options>,
    check: &CheckOptions,
) -> Result<Vec<(String, ExecResult)>> {
    let command = command.into();
    let rendered = command.to_shell()?;

    let outcomes: Vec<(String, Result<ExecResult>)> = std::thread::scope(|s| {
        let handles: Vec<_> = helpers
            .iter()
            .map(|helper| {
                let command = command.clone();
                s.spawn(move || helper.execute(command, options))
            })
            .collect();

        helpers
            .iter()
            .zip(handles)
            .map(|(helper, handle)| {
                let outcome = handle
                    .join()
                    .unwrap_or_else(|payload| std::panic::resume_unwind(payload));
                (helper.name().to_string(), outcome)
            })
            .collect()
    });

    let mut results = Vec::with_capacity(outcomes.len());
    let mut failed = Vec::new();
    let mut errors = Vec::new();
    for (name, outcome) in outcomes {
        match outcome {
            Ok(result) => {
                if !check.expected.contains(result.exit_code()) {
                    error!(
                        helper = %name,
                        command = %result.cmd(),
                        exit_code = ?result.exit_code(),
                        expected = %check.expected,
                        "Command exit code is not expected"
                    );
                    failed.push(name.clone());
                }
                results.push((name, result));
            }
            Err(e) => errors.push((name, e)),
        }
    }

    if errors.is_empty() && (failed.is_empty() || !check.raise_on_err) {
        return Ok(results);
    }

    let command = helpers
        .first()
        .map(|h| h.formatter.mask(&rendered, options.mask.as_ref()))
        .unwrap_or(rendered);
    Err(ExecError::Parallel(Box::new(ParallelCalledProcessError {
        command,
        expected: check.expected.clone(),
        results,
        failed,
        errors,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LocalTransport;

    #[test]
    fn test_helper_named_after_transport() {
        let helper = ExecHelper::new(LocalTransport::new());
        assert_eq!(helper.name(), "localhost");

        let helper = helper.with_name("build-host");
        assert_eq!(helper.name(), "build-host");
    }

    #[test]
    fn test_debug_shows_mask_and_scope() {
        let helper = ExecHelper::new(LocalTransport::new())
            .with_mask(LogMask::new(r"pw=(\S+)").unwrap())
            .with_default_scope("/mnt/root")
            .unwrap();

        let debug = format!("{helper:?}");
        assert!(debug.contains(r"pw=(\S+)"));
        assert!(debug.contains("/mnt/root"));
    }

    #[test]
    fn test_set_scope_none_disables() {
        let helper = ExecHelper::new(LocalTransport::new())
            .with_default_scope("/mnt/root")
            .unwrap();
        helper.set_scope(None).unwrap();
        assert_eq!(helper.current_scope(), None);
    }

    #[test]
    fn test_execute_rejects_empty_before_dispatch() {
        let helper = ExecHelper::new(LocalTransport::new());
        let err = helper.execute("", &ExecOptions::new()).unwrap_err();
        assert!(matches!(err, ExecError::Validation(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_execute_local() {
        let helper = ExecHelper::new(LocalTransport::new());
        let result = helper
            .execute("printf 'a\\nb\\n'", &ExecOptions::new().verbose(true))
            .unwrap();
        assert_eq!(result.exit_code(), Some(0));
        assert_eq!(result.stdout().len(), 2);
    }
}
