//! Local subprocess transport.

use std::collections::HashMap;
use std::path::PathBuf;

use super::process::{shell_command, ProcessContext};
use super::{OpenRequest, Transport};
use crate::Result;

/// Per-call options for [`LocalTransport`].
#[derive(Debug, Clone, Default)]
pub struct LocalOptions {
    /// Working directory override.
    pub cwd: Option<PathBuf>,
    /// Replace the inherited environment entirely.
    pub env: Option<HashMap<String, String>>,
    /// Variables added on top of the (inherited or replaced) environment.
    pub env_patch: HashMap<String, String>,
}

impl LocalOptions {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the working directory.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Replace the environment.
    pub fn env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Add one variable on top of the environment.
    pub fn env_patch(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_patch.insert(key.into(), value.into());
        self
    }
}

/// Runs commands as children of the current process through `/bin/sh -c`.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    name: String,
    defaults: LocalOptions,
}

impl LocalTransport {
    /// Create a local transport.
    pub fn new() -> Self {
        Self {
            name: "localhost".to_string(),
            defaults: LocalOptions::default(),
        }
    }

    /// Options applied when a call leaves them unset.
    pub fn with_defaults(mut self, defaults: LocalOptions) -> Self {
        self.defaults = defaults;
        self
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for LocalTransport {
    type Options = LocalOptions;
    type Context = ProcessContext;

    fn name(&self) -> &str {
        &self.name
    }

    fn open_execute_context(&self, request: &OpenRequest<'_, LocalOptions>) -> Result<ProcessContext> {
        let mut cmd = shell_command(request.command);

        if let Some(dir) = request.options.cwd.as_ref().or(self.defaults.cwd.as_ref()) {
            cmd.current_dir(dir);
        }

        if let Some(env) = request.options.env.as_ref().or(self.defaults.env.as_ref()) {
            cmd.env_clear();
            cmd.envs(env);
        }
        cmd.envs(&self.defaults.env_patch);
        cmd.envs(&request.options.env_patch);

        ProcessContext::spawn(cmd, request.stdin, request.open_stdout, request.open_stderr)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::transport::ExecutionContext;

    fn open(transport: &LocalTransport, command: &str, options: &LocalOptions) -> ProcessContext {
        transport
            .open_execute_context(&OpenRequest {
                command,
                stdin: None,
                open_stdout: true,
                open_stderr: true,
                scope: None,
                options,
            })
            .unwrap()
    }

    #[test]
    fn test_cwd_option() {
        let dir = tempfile::tempdir().unwrap();
        let options = LocalOptions::new().cwd(dir.path());
        let mut ctx = open(&LocalTransport::new(), "pwd", &options);
        assert_eq!(ctx.wait(None).unwrap(), Some(0));

        let printed = String::from_utf8(ctx.stdout()).unwrap();
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(PathBuf::from(printed.trim()).canonicalize().unwrap(), expected);
    }

    #[test]
    fn test_env_patch_merges() {
        let options = LocalOptions::new().env_patch("SHELL_EXEC_TEST_VAR", "patched");
        let mut ctx = open(&LocalTransport::new(), "echo $SHELL_EXEC_TEST_VAR", &options);
        ctx.wait(None).unwrap();
        assert_eq!(ctx.stdout(), b"patched\n");
    }

    #[test]
    fn test_env_replaces() {
        let options = LocalOptions::new()
            .env([("ONLY", "this")])
            .env_patch("EXTRA", "too");
        let mut ctx = open(&LocalTransport::new(), "echo \"$ONLY $EXTRA ${HOME:-unset}\"", &options);
        ctx.wait(None).unwrap();
        assert_eq!(ctx.stdout(), b"this too unset\n");
    }

    #[test]
    fn test_defaults_used_when_unset() {
        let transport = LocalTransport::new()
            .with_defaults(LocalOptions::new().env_patch("FROM_DEFAULTS", "yes"));
        let mut ctx = open(&transport, "echo $FROM_DEFAULTS", &LocalOptions::new());
        ctx.wait(None).unwrap();
        assert_eq!(ctx.stdout(), b"yes\n");
    }

    #[test]
    fn test_missing_cwd_is_transport_error() {
        let options = LocalOptions::new().cwd("/definitely/not/here");
        let err = LocalTransport::new()
            .open_execute_context(&OpenRequest {
                command: "true",
                stdin: None,
                open_stdout: true,
                open_stderr: true,
                scope: None,
                options: &options,
            })
            .err()
            .unwrap();
        assert!(matches!(err, crate::ExecError::Transport { .. }));
    }
}
