//! Container exec transport.
//!
//! Commands run inside an already running container through the runtime's
//! `exec` subcommand (`docker exec`, `podman exec`, ...).

use std::collections::BTreeMap;
use std::process::Command;

use super::process::ProcessContext;
use super::{OpenRequest, Transport};
use crate::Result;

/// Default container runtime binary.
pub const DEFAULT_RUNTIME: &str = "docker";

/// Per-call options for [`ContainerTransport`].
#[derive(Debug, Clone, Default)]
pub struct ContainerOptions {
    /// User to run as inside the container.
    pub user: Option<String>,
    /// Working directory inside the container.
    pub workdir: Option<String>,
    /// Extra environment variables.
    pub env: BTreeMap<String, String>,
}

impl ContainerOptions {
    /// Set the user.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the working directory.
    pub fn workdir(mut self, dir: impl Into<String>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Runs commands inside a container.
#[derive(Debug, Clone)]
pub struct ContainerTransport {
    runtime: String,
    container: String,
}

impl ContainerTransport {
    /// Target `container` using the default runtime.
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            runtime: DEFAULT_RUNTIME.to_string(),
            container: container.into(),
        }
    }

    /// Use a different runtime binary.
    pub fn runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = runtime.into();
        self
    }

    /// The target container.
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Runtime invocation for `command_line`.
    pub fn build_command(&self, command_line: &str, stdin: bool, options: &ContainerOptions) -> Command {
        let mut cmd = Command::new(&self.runtime);
        cmd.arg("exec");
        if stdin {
            cmd.arg("-i");
        }
        if let Some(ref user) = options.user {
            cmd.arg("--user").arg(user);
        }
        if let Some(ref dir) = options.workdir {
            cmd.arg("--workdir").arg(dir);
        }
        for (key, value) in &options.env {
            cmd.arg("-e").arg(format!("{key}={value}"));
        }
        cmd.arg(&self.container).arg("sh").arg("-c").arg(command_line);
        cmd
    }
}

impl Transport for ContainerTransport {
    type Options = ContainerOptions;
    type Context = ProcessContext;

    fn name(&self) -> &str {
        &self.container
    }

    fn open_execute_context(
        &self,
        request: &OpenRequest<'_, ContainerOptions>,
    ) -> Result<ProcessContext> {
        let cmd = self.build_command(request.command, request.stdin.is_some(), request.options);
        ProcessContext::spawn(cmd, request.stdin, request.open_stdout, request.open_stderr)
    }
}
