//! Command-line interface for shell-exec.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::path::PathBuf;

use crate::error::ExecError;
use crate::execution::{CommandLine, ExecResult};

/// Exit status for usage, configuration and validation errors.
pub const EXIT_USAGE: u8 = 2;

/// Exit status when the command timed out (as coreutils `timeout`).
pub const EXIT_TIMEOUT: u8 = 124;

/// Exit status when the command could not be started.
pub const EXIT_TRANSPORT: u8 = 125;

/// Exit status of the binary for an execution outcome.
///
/// Mirrors the command's exit code, except that a failed check never
/// reports success.
pub fn exit_status(outcome: &crate::Result<ExecResult>) -> u8 {
    match outcome {
        Ok(result) => command_status(result.exit_code()),
        Err(ExecError::CalledProcess(failure)) => match command_status(failure.exit_code()) {
            0 => 1,
            code => code,
        },
        Err(ExecError::Timeout(_)) => EXIT_TIMEOUT,
        Err(ExecError::Transport { .. }) => EXIT_TRANSPORT,
        Err(ExecError::Validation(_) | ExecError::Parallel(_)) => EXIT_USAGE,
    }
}

fn command_status(code: Option<i32>) -> u8 {
    code.and_then(|c| u8::try_from(c).ok()).unwrap_or(1)
}

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Command tokens; a single token is run as a shell line.
    pub command: Vec<String>,
    /// Timeout in seconds, 0 for none.
    pub timeout: Option<u64>,
    /// Log mask regex.
    pub mask: Option<String>,
    /// Scope (chroot) directory.
    pub chroot: Option<String>,
    /// Expected exit codes.
    pub expected: Option<Vec<i32>>,
    /// Require empty stderr.
    pub check_stderr: bool,
    /// Report failures without failing.
    pub no_raise: bool,
    /// Run inside this container.
    pub container: Option<String>,
    /// Container runtime binary.
    pub runtime: Option<String>,
    /// Working directory.
    pub workdir: Option<PathBuf>,
    /// Print a JSON summary instead of raw output.
    pub json: bool,
    /// Log commands at info level.
    pub verbose: bool,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

impl Args {
    /// The command to run, if one was given.
    pub fn command_line(&self) -> Option<CommandLine> {
        match self.command.as_slice() {
            [] => None,
            [line] => Some(CommandLine::Shell(line.clone())),
            tokens => Some(CommandLine::Argv(tokens.to_vec())),
        }
    }
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('t') | Long("timeout") => {
                let value: String = parser.value()?.parse()?;
                result.timeout = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("timeout", value))?,
                );
            }
            Short('m') | Long("mask") => {
                result.mask = Some(parser.value()?.parse()?);
            }
            Short('r') | Long("chroot") => {
                result.chroot = Some(parser.value()?.parse()?);
            }
            Short('e') | Long("expect") => {
                let value: String = parser.value()?.parse()?;
                result.expected = Some(parse_codes(&value)?);
            }
            Long("check-stderr") => {
                result.check_stderr = true;
            }
            Long("no-raise") => {
                result.no_raise = true;
            }
            Short('C') | Long("container") => {
                result.container = Some(parser.value()?.parse()?);
            }
            Long("runtime") => {
                result.runtime = Some(parser.value()?.parse()?);
            }
            Short('w') | Long("workdir") => {
                result.workdir = Some(parser.value()?.parse()?);
            }
            Long("json") => {
                result.json = true;
            }
            Short('v') | Long("verbose") => {
                result.verbose = true;
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(val) => {
                // everything from the first positional on belongs to the command
                result.command.push(into_token(val)?);
                for raw in parser.raw_args()? {
                    result.command.push(into_token(raw)?);
                }
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

fn into_token(value: OsString) -> Result<String, ArgsError> {
    value
        .into_string()
        .map_err(|v| ArgsError::InvalidValue("command", v.to_string_lossy().into_owned()))
}

fn parse_codes(value: &str) -> Result<Vec<i32>, ArgsError> {
    value
        .split(',')
        .map(|code| {
            code.trim()
                .parse()
                .map_err(|_| ArgsError::InvalidValue("expect", value.to_string()))
        })
        .collect()
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"shell-exec {version}
Run a command locally or in a container and validate its result

USAGE:
    shell-exec [OPTIONS] [--] <COMMAND>...

OPTIONS:
    -t, --timeout <SECS>    Timeout in seconds, 0 for none [default: 3600]
    -m, --mask <REGEX>      Mask matched groups of the command in logs
    -r, --chroot <DIR>      Run the command inside DIR via chroot
    -e, --expect <CODES>    Accepted exit codes, comma separated [default: 0]
        --check-stderr      Also fail when the command writes to stderr
        --no-raise          Report validation failures but exit with the command's code
    -C, --container <NAME>  Run inside a running container
        --runtime <BIN>     Container runtime [default: docker]
    -w, --workdir <DIR>     Working directory
        --json              Print a JSON summary of the result
    -v, --verbose           Log commands at info level
    -c, --config <FILE>     Path to configuration file (JSON)
    -l, --log-level <LVL>   Log level (error, warn, info, debug, trace)
    -h, --help              Print help
    -V, --version           Print version

ENVIRONMENT VARIABLES:
    SHELL_EXEC_TIMEOUT      Timeout in seconds (overrides config)
    SHELL_EXEC_LOG_MASK     Log mask regex (overrides config)
    SHELL_EXEC_CHROOT       Scope directory (overrides config)
    SHELL_EXEC_LOG_LEVEL    Log level (overrides config)
    RUST_LOG                Alternative log level setting

EXAMPLES:
    # Run a shell line
    shell-exec 'uname -a && id'

    # Accept "no match" from grep, hide the token in logs
    shell-exec -e 0,1 -m 'token=(\S+)' -- grep -q token=abc /etc/app.conf

    # Run inside a container with a 10 second timeout
    shell-exec -C web -t 10 -- nginx -t
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("shell-exec {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}
