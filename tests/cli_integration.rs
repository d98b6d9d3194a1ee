//! CLI integration tests.
//!
//! These tests verify the CLI argument parsing and configuration loading.

use std::ffi::OsString;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

use shell_exec::cli::{exit_status, parse_args_from, Args, EXIT_TIMEOUT, EXIT_TRANSPORT, EXIT_USAGE};
use shell_exec::config::{Config, ConfigError};
use shell_exec::{
    CalledProcessError, CommandLine, ExecError, ExecOptions, ExecResult, ExecutionTimeoutError,
    ExpectedCodes, FailureKind, LocalOptions, LocalTransport, ValidationError,
};

fn args(args: &[&str]) -> Vec<OsString> {
    std::iter::once("shell-exec")
        .chain(args.iter().copied())
        .map(OsString::from)
        .collect()
}

// ============================================================================
// CLI Argument Tests
// ============================================================================

#[test]
fn test_cli_defaults() {
    let result = parse_args_from(args(&["true"])).unwrap();

    assert_eq!(result.command_line(), Some(CommandLine::Shell("true".into())));
    assert!(result.timeout.is_none());
    assert!(result.expected.is_none());
    assert!(result.container.is_none());
    assert!(result.config.is_none());
    assert!(!result.json);
    assert!(!result.no_raise);
}

#[test]
fn test_cli_full_options() {
    let result = parse_args_from(args(&[
        "-t",
        "30",
        "-e",
        "0,1",
        "-m",
        "token=(\\S+)",
        "-l",
        "debug",
        "--json",
        "--",
        "curl",
        "-H",
        "Authorization: token=abc",
        "https://example.invalid",
    ]))
    .unwrap();

    assert_eq!(result.timeout, Some(30));
    assert_eq!(result.expected, Some(vec![0, 1]));
    assert_eq!(result.mask.as_deref(), Some("token=(\\S+)"));
    assert_eq!(result.log_level, Some("debug".to_string()));
    assert!(result.json);
    assert_eq!(
        result.command_line(),
        Some(CommandLine::Argv(vec![
            "curl".into(),
            "-H".into(),
            "Authorization: token=abc".into(),
            "https://example.invalid".into(),
        ]))
    );
}

#[test]
fn test_cli_config_file() {
    let result = parse_args_from(args(&["-c", "/etc/shell-exec.json", "true"])).unwrap();

    assert!(result.config.is_some());
    assert_eq!(
        result.config.unwrap().to_str().unwrap(),
        "/etc/shell-exec.json"
    );
}

#[test]
fn test_cli_invalid_timeout() {
    let result = parse_args_from(args(&["-t", "not-a-number", "true"]));
    assert!(result.is_err());
}

#[test]
fn test_cli_missing_value() {
    let result = parse_args_from(args(&["--chroot"]));
    assert!(result.is_err());
}

// ============================================================================
// Exit Status Tests
// ============================================================================

fn finished(code: Option<i32>, stderr: &[u8]) -> ExecResult {
    ExecResult::new("cmd", code, Vec::new(), stderr.to_vec(), Duration::ZERO)
}

fn failed(code: i32, kind: FailureKind, expected: &[i32]) -> shell_exec::Result<ExecResult> {
    Err(ExecError::CalledProcess(Box::new(CalledProcessError::new(
        finished(Some(code), b"oops\n"),
        ExpectedCodes::from(expected),
        kind,
        None,
    ))))
}

#[test]
fn test_exit_status_mirrors_command() {
    assert_eq!(exit_status(&Ok(finished(Some(0), b""))), 0);
    assert_eq!(exit_status(&Ok(finished(Some(3), b""))), 3);
    assert_eq!(exit_status(&Ok(finished(Some(-1), b""))), 1);
    assert_eq!(exit_status(&Ok(finished(Some(300), b""))), 1);
}

#[test]
fn test_exit_status_stderr_failure_not_success() {
    assert_eq!(exit_status(&failed(0, FailureKind::Stderr, &[0])), 1);
}

#[test]
fn test_exit_status_unexpected_zero_not_success() {
    assert_eq!(exit_status(&failed(0, FailureKind::ExitCode, &[1])), 1);
    assert_eq!(exit_status(&failed(2, FailureKind::ExitCode, &[0])), 2);
}

#[test]
fn test_exit_status_errors() {
    let timeout = Err(ExecError::Timeout(Box::new(ExecutionTimeoutError {
        result: finished(None, b""),
        timeout: Duration::from_secs(1),
    })));
    assert_eq!(exit_status(&timeout), EXIT_TIMEOUT);
    assert_eq!(
        exit_status(&Err(ExecError::transport("connection refused"))),
        EXIT_TRANSPORT
    );
    assert_eq!(
        exit_status(&Err(ExecError::Validation(ValidationError::EmptyCommand))),
        EXIT_USAGE
    );
}

// ============================================================================
// Configuration Loading Tests
// ============================================================================

#[test]
fn test_config_from_json_file() {
    let json = r#"{
        "execution": {
            "timeout_secs": 120,
            "verbose": true,
            "log_mask": "--password=(\\S+)",
            "chroot": "/mnt/target",
            "check_stderr": true,
            "expected": [0, 3]
        },
        "logging": {
            "level": "debug"
        }
    }"#;

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();

    let config = Config::from_file(file.path()).unwrap();

    assert_eq!(config.timeout(), Some(Duration::from_secs(120)));
    assert!(config.execution.verbose);
    assert!(config.execution.check_stderr);
    assert_eq!(config.execution.chroot.as_deref(), Some("/mnt/target"));
    assert_eq!(config.execution.expected, vec![0, 3]);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_config_priority_cli_over_file() {
    let json = r#"{
        "execution": {
            "timeout_secs": 120,
            "expected": [0, 3]
        }
    }"#;

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();

    // CLI args should override file
    let args = Args {
        timeout: Some(5),
        expected: Some(vec![1]),
        config: Some(file.path().to_path_buf()),
        ..Args::default()
    };

    let config = Config::load(&args).unwrap();

    assert_eq!(config.timeout(), Some(Duration::from_secs(5)));
    assert_eq!(config.execution.expected, vec![1]);
}

#[test]
fn test_config_missing_file() {
    let args = Args {
        config: Some("/nonexistent/shell-exec.json".into()),
        ..Args::default()
    };

    assert!(matches!(Config::load(&args), Err(ConfigError::Io(_))));
}

#[test]
fn test_config_malformed_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"{ not json").unwrap();

    assert!(matches!(
        Config::from_file(file.path()),
        Err(ConfigError::Json(_))
    ));
}

#[test]
fn test_config_builds_helper() {
    let args = Args {
        chroot: Some("/mnt/target".into()),
        mask: Some("pw=(\\S+)".into()),
        verbose: true,
        ..Args::default()
    };

    let mut config = Config::default();
    config.apply_args(&args);

    let helper = config.build_helper(LocalTransport::new()).unwrap();
    assert_eq!(helper.current_scope().as_deref(), Some("/mnt/target"));
    assert_eq!(helper.formatter().mask("db pw=x", None), "db pw=<*masked*>");

    let options: ExecOptions<LocalOptions> = config.exec_options();
    assert!(options.verbose);
    assert_eq!(options.timeout, config.timeout());
}

// ============================================================================
// Configuration Serialization Tests
// ============================================================================

#[test]
fn test_config_roundtrip() {
    let original = Config::default();
    let json = serde_json::to_string(&original).unwrap();
    let loaded: Config = serde_json::from_str(&json).unwrap();

    assert_eq!(original.execution.timeout_secs, loaded.execution.timeout_secs);
    assert_eq!(original.execution.expected, loaded.execution.expected);
}

#[test]
fn test_config_partial_deserialization() {
    // Only specify some fields, others should use defaults
    let json = r#"{"execution": {"verbose": true}}"#;
    let config: Config = serde_json::from_str(json).unwrap();

    assert!(config.execution.verbose);
    assert_eq!(config.execution.timeout_secs, 3600); // Default
    assert_eq!(config.logging.level, "info"); // Default
}
