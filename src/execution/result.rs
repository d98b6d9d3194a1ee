//! Execution result types.

use std::ops::Range;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::exit_code::exit_code_name;

/// Number of lines kept at each end of a brief output.
const BRIEF_EDGE_LINES: usize = 3;

/// Outputs longer than this are shortened in briefs.
const BRIEF_MAX_LINES: usize = 7;

/// Result of command execution.
///
/// Built once per `execute` call and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    cmd: String,
    exit_code: Option<i32>,
    stdout: Vec<Vec<u8>>,
    stderr: Vec<Vec<u8>>,
    started: SystemTime,
    duration: Duration,
}

impl ExecResult {
    /// Create a new execution result from raw captured bytes.
    ///
    /// `cmd` is the command as it may be shown to people, i.e. already masked.
    pub fn new(
        cmd: impl Into<String>,
        exit_code: Option<i32>,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
        duration: Duration,
    ) -> Self {
        Self {
            cmd: cmd.into(),
            exit_code,
            stdout: split_lines(&stdout),
            stderr: split_lines(&stderr),
            started: SystemTime::now()
                .checked_sub(duration)
                .unwrap_or_else(SystemTime::now),
            duration,
        }
    }

    /// Set the start timestamp.
    pub fn with_started(mut self, started: SystemTime) -> Self {
        self.started = started;
        self
    }

    /// The command, masked for display.
    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    /// Exit code, `None` when the command was stopped before it finished.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Captured stdout, one entry per line with line endings kept.
    pub fn stdout(&self) -> &[Vec<u8>] {
        &self.stdout
    }

    /// Captured stderr, one entry per line with line endings kept.
    pub fn stderr(&self) -> &[Vec<u8>] {
        &self.stderr
    }

    /// Wall-clock time the command was dispatched.
    pub fn started(&self) -> SystemTime {
        self.started
    }

    /// Elapsed execution time.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Check if command succeeded (exit code 0).
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stdout decoded as UTF-8 (lossy).
    pub fn stdout_str(&self) -> String {
        decode(&self.stdout)
    }

    /// Stderr decoded as UTF-8 (lossy).
    pub fn stderr_str(&self) -> String {
        decode(&self.stderr)
    }

    /// Stdout with long output reduced to its first and last lines.
    pub fn stdout_brief(&self) -> String {
        brief(&self.stdout)
    }

    /// Stderr with long output reduced to its first and last lines.
    pub fn stderr_brief(&self) -> String {
        brief(&self.stderr)
    }

    /// A range of stdout lines, decoded and joined.
    ///
    /// Out of bounds ranges are clamped.
    pub fn stdout_lines(&self, range: Range<usize>) -> String {
        let end = range.end.min(self.stdout.len());
        let start = range.start.min(end);
        decode(&self.stdout[start..end])
    }

    /// Parse stdout as JSON.
    pub fn stdout_json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.stdout.concat())
    }

    /// Serializable summary of this result.
    pub fn summary(&self) -> ResultSummary {
        ResultSummary {
            cmd: self.cmd.clone(),
            exit_code: self.exit_code,
            exit_code_name: self.exit_code.and_then(exit_code_name).map(str::to_string),
            stdout: self.stdout_str(),
            stderr: self.stderr_str(),
            started_unix_ms: self
                .started
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            duration_ms: self.duration.as_millis() as u64,
        }
    }
}

impl std::fmt::Display for ExecResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Command: {:?}\nexit code: ", self.cmd)?;
        match self.exit_code {
            Some(code) => match exit_code_name(code) {
                Some(name) => write!(f, "{code} ({name})")?,
                None => write!(f, "{code}")?,
            },
            None => write!(f, "unknown")?,
        }
        write!(
            f,
            "\nstdout:\n{}\nstderr:\n{}",
            self.stdout_brief(),
            self.stderr_brief()
        )
    }
}

/// Serializable view of an [`ExecResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSummary {
    /// Masked command.
    pub cmd: String,
    /// Exit code, if the command completed.
    pub exit_code: Option<i32>,
    /// Symbolic exit code name, when one is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code_name: Option<String>,
    /// Decoded stdout.
    pub stdout: String,
    /// Decoded stderr.
    pub stderr: String,
    /// Start time, milliseconds since the Unix epoch.
    pub started_unix_ms: u64,
    /// Elapsed time in milliseconds.
    pub duration_ms: u64,
}

/// Split raw output into lines, keeping line endings.
fn split_lines(raw: &[u8]) -> Vec<Vec<u8>> {
    raw.split_inclusive(|&b| b == b'\n')
        .map(<[u8]>::to_vec)
        .collect()
}

fn decode(lines: &[Vec<u8>]) -> String {
    String::from_utf8_lossy(&lines.concat()).into_owned()
}

fn brief(lines: &[Vec<u8>]) -> String {
    if lines.len() <= BRIEF_MAX_LINES {
        return decode(lines).trim_end().to_string();
    }
    let head = decode(&lines[..BRIEF_EDGE_LINES]);
    let tail = decode(&lines[lines.len() - BRIEF_EDGE_LINES..]);
    format!("{}\n...\n{}", head.trim_end(), tail.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(count: usize) -> Vec<u8> {
        (1..=count)
            .map(|i| format!("line{i}\n"))
            .collect::<String>()
            .into_bytes()
    }

    #[test]
    fn test_result_new_splits_lines() {
        let result = ExecResult::new(
            "echo hi",
            Some(0),
            b"hi\nthere".to_vec(),
            Vec::new(),
            Duration::from_millis(100),
        );

        assert_eq!(result.cmd(), "echo hi");
        assert_eq!(result.stdout(), &[b"hi\n".to_vec(), b"there".to_vec()]);
        assert!(result.stderr().is_empty());
        assert_eq!(result.duration(), Duration::from_millis(100));
        assert!(result.is_success());
    }

    #[test]
    fn test_result_unknown_exit_code() {
        let result = ExecResult::new("sleep 10", None, Vec::new(), Vec::new(), Duration::ZERO);
        assert!(!result.is_success());
        assert!(result.to_string().contains("exit code: unknown"));
    }

    #[test]
    fn test_stdout_str_lossy() {
        let result = ExecResult::new("x", Some(0), vec![b'o', b'k', 0xff], Vec::new(), Duration::ZERO);
        assert!(result.stdout_str().starts_with("ok"));
    }

    #[test]
    fn test_brief_short_output_kept() {
        let result = ExecResult::new("x", Some(0), numbered(7), Vec::new(), Duration::ZERO);
        assert_eq!(result.stdout_brief().lines().count(), 7);
        assert!(!result.stdout_brief().contains("..."));
    }

    #[test]
    fn test_brief_long_output_shortened() {
        let result = ExecResult::new("x", Some(0), numbered(10), Vec::new(), Duration::ZERO);
        assert_eq!(
            result.stdout_brief(),
            "line1\nline2\nline3\n...\nline8\nline9\nline10"
        );
    }

    #[test]
    fn test_stdout_lines_clamped() {
        let result = ExecResult::new("x", Some(0), numbered(3), Vec::new(), Duration::ZERO);
        assert_eq!(result.stdout_lines(1..2), "line2\n");
        assert_eq!(result.stdout_lines(2..50), "line3\n");
        assert_eq!(result.stdout_lines(10..20), "");
    }

    #[test]
    fn test_stdout_json() {
        let result = ExecResult::new(
            "cat data.json",
            Some(0),
            b"{\"name\": \"demo\",\n \"count\": 3}\n".to_vec(),
            Vec::new(),
            Duration::ZERO,
        );
        let value: serde_json::Value = result.stdout_json().unwrap();
        assert_eq!(value["count"], 3);
    }

    #[test]
    fn test_summary_serialization() {
        let result = ExecResult::new("kill -9 $$", Some(137), Vec::new(), b"Killed\n".to_vec(), Duration::from_millis(5));
        let json = serde_json::to_string(&result.summary()).unwrap();
        assert!(json.contains("\"exit_code\":137"));
        assert!(json.contains("SIGKILL"));
        assert!(json.contains("Killed"));
    }
}
