//! Exit code and stderr validation of execution results.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tracing::error;

use super::exit_code::EX_OK;
use super::result::ExecResult;
use crate::error::ExecError;

/// Ordered, de-duplicated set of acceptable exit codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedCodes(Vec<i32>);

impl ExpectedCodes {
    /// Build a set from codes, keeping first occurrences in order.
    pub fn new(codes: impl IntoIterator<Item = i32>) -> Self {
        let mut unique = Vec::new();
        for code in codes {
            if !unique.contains(&code) {
                unique.push(code);
            }
        }
        Self(unique)
    }

    /// Whether `code` is acceptable. An unknown code never is.
    pub fn contains(&self, code: Option<i32>) -> bool {
        code.is_some_and(|c| self.0.contains(&c))
    }

    /// The codes, in order.
    pub fn codes(&self) -> &[i32] {
        &self.0
    }
}

impl Default for ExpectedCodes {
    fn default() -> Self {
        Self(vec![EX_OK])
    }
}

impl From<i32> for ExpectedCodes {
    fn from(code: i32) -> Self {
        Self(vec![code])
    }
}

impl From<&[i32]> for ExpectedCodes {
    fn from(codes: &[i32]) -> Self {
        Self::new(codes.iter().copied())
    }
}

impl<const N: usize> From<[i32; N]> for ExpectedCodes {
    fn from(codes: [i32; N]) -> Self {
        Self::new(codes)
    }
}

impl From<Vec<i32>> for ExpectedCodes {
    fn from(codes: Vec<i32>) -> Self {
        Self::new(codes)
    }
}

impl fmt::Display for ExpectedCodes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, code) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{code}")?;
        }
        f.write_str("}")
    }
}

/// Which policy a result violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Exit code outside the expected set.
    ExitCode,
    /// Stderr was not empty.
    Stderr,
}

/// Shape shared by every validation failure.
///
/// Implement it for custom error types handed to
/// [`CheckOptions::raise_as`].
pub trait ProcessFailure: fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// The violating result.
    fn result(&self) -> &ExecResult;

    /// Expected exit codes.
    fn expected(&self) -> &ExpectedCodes;

    /// Which policy was violated.
    fn kind(&self) -> FailureKind;

    /// Type erased access for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Masked command.
    fn command(&self) -> &str {
        self.result().cmd()
    }

    /// Observed exit code.
    fn exit_code(&self) -> Option<i32> {
        self.result().exit_code()
    }

    /// Captured stdout lines.
    fn stdout(&self) -> &[Vec<u8>] {
        self.result().stdout()
    }

    /// Captured stderr lines.
    fn stderr(&self) -> &[Vec<u8>] {
        self.result().stderr()
    }
}

impl dyn ProcessFailure {
    /// Downcast to the concrete failure type.
    pub fn downcast_ref<T: ProcessFailure>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Default validation failure.
#[derive(Debug, Clone)]
pub struct CalledProcessError {
    result: ExecResult,
    expected: ExpectedCodes,
    kind: FailureKind,
    error_info: Option<String>,
}

impl CalledProcessError {
    /// Create a failure for `result`.
    pub fn new(
        result: ExecResult,
        expected: ExpectedCodes,
        kind: FailureKind,
        error_info: Option<String>,
    ) -> Self {
        Self {
            result,
            expected,
            kind,
            error_info,
        }
    }

    /// Caller supplied context prefix.
    pub fn error_info(&self) -> Option<&str> {
        self.error_info.as_deref()
    }

    /// Consume the failure, returning the result.
    pub fn into_result(self) -> ExecResult {
        self.result
    }

    fn headline(&self) -> String {
        let prefix = self
            .error_info
            .as_deref()
            .map(|info| format!("{info}\n"))
            .unwrap_or_default();
        match self.kind {
            FailureKind::ExitCode => format!(
                "{prefix}Command {:?} returned exit code {} while expected {}",
                self.result.cmd(),
                display_code(self.result.exit_code()),
                self.expected
            ),
            FailureKind::Stderr => format!(
                "{prefix}Command {:?} output contains STDERR while not expected\n\texpected: {}",
                self.result.cmd(),
                self.expected
            ),
        }
    }
}

impl fmt::Display for CalledProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n\tSTDOUT:\n{}\n\tSTDERR:\n{}",
            self.headline(),
            self.result.stdout_brief(),
            self.result.stderr_brief()
        )
    }
}

impl std::error::Error for CalledProcessError {}

impl ProcessFailure for CalledProcessError {
    fn result(&self) -> &ExecResult {
        &self.result
    }

    fn expected(&self) -> &ExpectedCodes {
        &self.expected
    }

    fn kind(&self) -> FailureKind {
        self.kind
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

type ErrorFactory = Arc<dyn Fn(CalledProcessError) -> Box<dyn ProcessFailure> + Send + Sync>;

/// Validation policy for `check_call` / `check_stderr`.
#[derive(Clone)]
pub struct CheckOptions {
    /// Acceptable exit codes.
    pub expected: ExpectedCodes,
    /// Fail on violation instead of returning the result.
    pub raise_on_err: bool,
    /// Prefix for failure messages.
    pub error_info: Option<String>,
    factory: Option<ErrorFactory>,
}

impl CheckOptions {
    /// Default policy: expect exit code 0 and raise.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the expected exit codes.
    pub fn expected(mut self, expected: impl Into<ExpectedCodes>) -> Self {
        self.expected = expected.into();
        self
    }

    /// Choose whether violations fail the call.
    pub fn raise_on_err(mut self, raise: bool) -> Self {
        self.raise_on_err = raise;
        self
    }

    /// Prefix failure messages with `info`.
    pub fn error_info(mut self, info: impl Into<String>) -> Self {
        self.error_info = Some(info.into());
        self
    }

    /// Raise violations as a custom failure type.
    pub fn raise_as<F, E>(mut self, factory: F) -> Self
    where
        F: Fn(CalledProcessError) -> E + Send + Sync + 'static,
        E: ProcessFailure,
    {
        self.factory = Some(Arc::new(move |err| -> Box<dyn ProcessFailure> {
            Box::new(factory(err))
        }));
        self
    }

    fn raise(&self, err: CalledProcessError) -> ExecError {
        let failure: Box<dyn ProcessFailure> = match self.factory {
            Some(ref factory) => factory(err),
            None => Box::new(err),
        };
        ExecError::CalledProcess(failure)
    }
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            expected: ExpectedCodes::default(),
            raise_on_err: true,
            error_info: None,
            factory: None,
        }
    }
}

impl fmt::Debug for CheckOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckOptions")
            .field("expected", &self.expected)
            .field("raise_on_err", &self.raise_on_err)
            .field("error_info", &self.error_info)
            .field("custom_error", &self.factory.is_some())
            .finish()
    }
}

/// Apply the exit code policy to an existing result.
pub fn check_exit_code(result: ExecResult, check: &CheckOptions) -> Result<ExecResult, ExecError> {
    if check.expected.contains(result.exit_code()) {
        return Ok(result);
    }

    error!(
        command = %result.cmd(),
        exit_code = %display_code(result.exit_code()),
        expected = %check.expected,
        "{}Command exit code is not expected",
        info_prefix(check)
    );

    if !check.raise_on_err {
        return Ok(result);
    }
    Err(check.raise(CalledProcessError::new(
        result,
        check.expected.clone(),
        FailureKind::ExitCode,
        check.error_info.clone(),
    )))
}

/// Apply the exit code policy, then require empty stderr.
pub fn check_stderr_empty(result: ExecResult, check: &CheckOptions) -> Result<ExecResult, ExecError> {
    let result = check_exit_code(result, check)?;
    if result.stderr().is_empty() {
        return Ok(result);
    }

    error!(
        command = %result.cmd(),
        stderr = %result.stderr_brief(),
        "{}Command output contains STDERR while not expected",
        info_prefix(check)
    );

    if !check.raise_on_err {
        return Ok(result);
    }
    Err(check.raise(CalledProcessError::new(
        result,
        check.expected.clone(),
        FailureKind::Stderr,
        check.error_info.clone(),
    )))
}

fn info_prefix(check: &CheckOptions) -> String {
    check
        .error_info
        .as_deref()
        .map(|info| format!("{info}: "))
        .unwrap_or_default()
}

fn display_code(code: Option<i32>) -> String {
    code.map_or_else(|| "unknown".to_string(), |c| c.to_string())
}

/// Aggregated failure of a parallel run.
#[derive(Debug)]
pub struct ParallelCalledProcessError {
    /// Command that was run everywhere (masked).
    pub command: String,
    /// Expected exit codes.
    pub expected: ExpectedCodes,
    /// Results of every helper that completed, keyed by helper name.
    pub results: Vec<(String, ExecResult)>,
    /// Helpers whose result violated the policy.
    pub failed: Vec<String>,
    /// Helpers that could not run the command at all.
    pub errors: Vec<(String, ExecError)>,
}

impl fmt::Display for ParallelCalledProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Command {:?} failed on {} of {} targets while expected {}",
            self.command,
            self.failed.len() + self.errors.len(),
            self.results.len() + self.errors.len(),
            self.expected
        )?;
        for name in &self.failed {
            if let Some((_, result)) = self.results.iter().find(|(n, _)| n == name) {
                write!(f, "\n\t{name}: exit code {}", display_code(result.exit_code()))?;
            }
        }
        for (name, err) in &self.errors {
            write!(f, "\n\t{name}: {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParallelCalledProcessError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn result(code: Option<i32>, stderr: &[u8]) -> ExecResult {
        ExecResult::new("cmd", code, b"out\n".to_vec(), stderr.to_vec(), Duration::ZERO)
    }

    #[derive(Debug)]
    struct DeployError(CalledProcessError);

    impl fmt::Display for DeployError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "deploy step failed: {}", self.0)
        }
    }

    impl ProcessFailure for DeployError {
        fn result(&self) -> &ExecResult {
            self.0.result()
        }
        fn expected(&self) -> &ExpectedCodes {
            self.0.expected()
        }
        fn kind(&self) -> FailureKind {
            self.0.kind()
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_expected_codes_dedup_ordered() {
        let codes = ExpectedCodes::new([2, 0, 2, 1, 0]);
        assert_eq!(codes.codes(), &[2, 0, 1]);
        assert_eq!(codes.to_string(), "{2, 0, 1}");
    }

    #[test]
    fn test_expected_codes_unknown_never_matches() {
        assert!(ExpectedCodes::default().contains(Some(0)));
        assert!(!ExpectedCodes::default().contains(None));
    }

    #[test]
    fn test_check_exit_code_pass() {
        let checked = check_exit_code(result(Some(0), b""), &CheckOptions::new()).unwrap();
        assert_eq!(checked.exit_code(), Some(0));
    }

    #[test]
    fn test_check_exit_code_raise() {
        let err = check_exit_code(result(Some(1), b""), &CheckOptions::new()).unwrap_err();
        let failure = err.as_failure().unwrap();
        assert_eq!(failure.kind(), FailureKind::ExitCode);
        assert_eq!(failure.exit_code(), Some(1));
        assert_eq!(failure.expected(), &ExpectedCodes::default());
        assert!(err.to_string().contains("returned exit code 1 while expected {0}"));
    }

    #[test]
    fn test_check_exit_code_no_raise() {
        let check = CheckOptions::new().raise_on_err(false);
        let checked = check_exit_code(result(Some(3), b""), &check).unwrap();
        assert_eq!(checked.exit_code(), Some(3));
    }

    #[test]
    fn test_check_exit_code_alternative_expected() {
        let check = CheckOptions::new().expected([0, 3]);
        assert!(check_exit_code(result(Some(3), b""), &check).is_ok());
    }

    #[test]
    fn test_check_stderr_kind_distinct() {
        let err = check_stderr_empty(result(Some(0), b"warning\n"), &CheckOptions::new()).unwrap_err();
        let failure = err.as_failure().unwrap();
        assert_eq!(failure.kind(), FailureKind::Stderr);
        assert!(err.to_string().contains("contains STDERR"));
        assert!(err.to_string().contains("warning"));
    }

    #[test]
    fn test_check_stderr_reports_exit_code_first() {
        let err = check_stderr_empty(result(Some(2), b"boom\n"), &CheckOptions::new()).unwrap_err();
        assert_eq!(err.as_failure().unwrap().kind(), FailureKind::ExitCode);
    }

    #[test]
    fn test_error_info_prefix() {
        let check = CheckOptions::new().error_info("Package install failed");
        let err = check_exit_code(result(Some(100), b""), &check).unwrap_err();
        assert!(err.to_string().starts_with("Package install failed\nCommand"));
    }

    #[test]
    fn test_custom_failure_type() {
        let check = CheckOptions::new().raise_as(DeployError);
        let err = check_exit_code(result(Some(1), b""), &check).unwrap_err();

        let failure = err.as_failure().unwrap();
        assert!(failure.downcast_ref::<DeployError>().is_some());
        assert!(failure.downcast_ref::<CalledProcessError>().is_none());
        assert!(err.to_string().starts_with("deploy step failed"));
        assert_eq!(failure.command(), "cmd");
    }
}
