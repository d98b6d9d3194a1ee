//! Child-process execution context shared by process based transports.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

use super::ExecutionContext;
use crate::error::ExecError;
use crate::execution::exit_code;
use crate::Result;

/// Buffer size for reading child output.
const READ_BUFFER_SIZE: usize = 4096;

/// Time a child gets to exit after SIGTERM before it is killed.
const TERMINATE_GRACE: Duration = Duration::from_millis(200);

/// Build a command that runs `command_line` through the platform shell.
pub(crate) fn shell_command(command_line: &str) -> Command {
    #[cfg(unix)]
    {
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg(command_line);
        cmd
    }
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd.exe");
        cmd.arg("/c").arg(command_line);
        cmd
    }
}

/// Output pipe drained on a background thread.
struct StreamReader {
    buffer: Arc<Mutex<Vec<u8>>>,
    eof: mpsc::Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl StreamReader {
    fn spawn<R: Read + Send + 'static>(mut pipe: R) -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let (done, eof) = mpsc::channel();
        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; READ_BUFFER_SIZE];
            loop {
                match pipe.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => sink.lock().extend_from_slice(&buf[..n]),
                    Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        debug!(error = %e, "output pipe closed");
                        break;
                    }
                }
            }
            let _ = done.send(());
        });
        Self {
            buffer,
            eof,
            handle: Some(handle),
        }
    }

    fn snapshot(&self) -> Vec<u8> {
        self.buffer.lock().clone()
    }

    /// Wait for the pipe to reach EOF, at most until `deadline`.
    ///
    /// Returns `false` if the deadline passed while something still held the
    /// write end open.
    fn finish(&mut self, deadline: Option<Instant>) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };
        let closed = match deadline {
            None => {
                let _ = self.eof.recv();
                true
            }
            Some(deadline) => !matches!(
                self.eof
                    .recv_timeout(deadline.saturating_duration_since(Instant::now())),
                Err(RecvTimeoutError::Timeout)
            ),
        };
        if closed {
            let _ = handle.join();
        } else {
            self.handle = Some(handle);
        }
        closed
    }
}

/// Execution context backed by a local child process.
///
/// The child runs in its own process group on Unix so termination reaches
/// everything it spawned.
pub struct ProcessContext {
    child: Child,
    stdout: Option<StreamReader>,
    stderr: Option<StreamReader>,
    started: SystemTime,
    /// Status of the shell itself, once reaped.
    reaped: Option<ExitStatus>,
    exit_code: Option<i32>,
}

impl ProcessContext {
    /// Spawn `command` and start draining its output.
    ///
    /// `stdin` is written from a helper thread and the pipe closed afterwards.
    pub fn spawn(
        mut command: Command,
        stdin: Option<&[u8]>,
        open_stdout: bool,
        open_stderr: bool,
    ) -> Result<Self> {
        command
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(if open_stdout {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stderr(if open_stderr {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let program = command.get_program().to_string_lossy().into_owned();
        let started = SystemTime::now();
        let mut child = command
            .spawn()
            .map_err(|e| ExecError::transport_io(format!("failed to spawn {program}"), e))?;

        if let (Some(data), Some(mut pipe)) = (stdin, child.stdin.take()) {
            let data = data.to_vec();
            std::thread::spawn(move || {
                if let Err(e) = pipe.write_all(&data) {
                    debug!(error = %e, "stdin not fully consumed");
                }
            });
        }

        let stdout = child.stdout.take().map(StreamReader::spawn);
        let stderr = child.stderr.take().map(StreamReader::spawn);

        Ok(Self {
            child,
            stdout,
            stderr,
            started,
            reaped: None,
            exit_code: None,
        })
    }

    /// OS process id of the child.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Drain both pipes after the shell exited.
    ///
    /// Background processes that inherited the pipes can keep them open past
    /// the shell's exit; the drain gives up at `deadline`.
    fn finish(&mut self, status: ExitStatus, deadline: Option<Instant>) -> Option<i32> {
        self.reaped = Some(status);
        let mut drained = true;
        for reader in [self.stdout.as_mut(), self.stderr.as_mut()]
            .into_iter()
            .flatten()
        {
            drained &= reader.finish(deadline);
        }
        if !drained {
            return None;
        }
        let code = status_code(status);
        self.exit_code = Some(code);
        Some(code)
    }

    #[cfg(unix)]
    fn signal_group(&self, signal: libc::c_int) {
        let pgid = self.child.id() as libc::pid_t;
        // SAFETY: killpg only sends a signal; the group id comes from a child
        // we spawned and have not reaped yet.
        let rc = unsafe { libc::killpg(pgid, signal) };
        if rc != 0 {
            debug!(pgid, signal, error = %std::io::Error::last_os_error(), "killpg failed");
        }
    }
}

impl ExecutionContext for ProcessContext {
    fn wait(&mut self, deadline: Option<Instant>) -> Result<Option<i32>> {
        if let Some(code) = self.exit_code {
            return Ok(Some(code));
        }

        let status = match (self.reaped, deadline) {
            (Some(status), _) => Some(Ok(status)),
            (None, None) => Some(self.child.wait()),
            (None, Some(deadline)) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                self.child.wait_timeout(remaining).transpose()
            }
        };

        match status {
            None => Ok(None),
            Some(Ok(status)) => Ok(self.finish(status, deadline)),
            Some(Err(e)) => Err(ExecError::transport_io("failed to wait for child", e)),
        }
    }

    fn stdout(&mut self) -> Vec<u8> {
        self.stdout.as_ref().map(StreamReader::snapshot).unwrap_or_default()
    }

    fn stderr(&mut self) -> Vec<u8> {
        self.stderr.as_ref().map(StreamReader::snapshot).unwrap_or_default()
    }

    fn terminate(&mut self) -> Result<()> {
        if self.exit_code.is_some() {
            return Ok(());
        }

        if let Some(status) = self.reaped {
            // the shell is gone, only its process group still holds the pipes
            #[cfg(unix)]
            self.signal_group(libc::SIGKILL);
            self.exit_code = Some(status_code(status));
            return Ok(());
        }

        #[cfg(unix)]
        {
            self.signal_group(libc::SIGTERM);
            match self.child.wait_timeout(TERMINATE_GRACE) {
                Ok(Some(status)) => {
                    self.exit_code = Some(status_code(status));
                    return Ok(());
                }
                Ok(None) => self.signal_group(libc::SIGKILL),
                Err(e) => return Err(ExecError::transport_io("failed to wait for child", e)),
            }
        }

        if let Err(e) = self.child.kill() {
            // already gone
            if e.kind() != std::io::ErrorKind::InvalidInput {
                return Err(ExecError::transport_io("failed to kill child", e));
            }
        }
        let status = self
            .child
            .wait()
            .map_err(|e| ExecError::transport_io("failed to reap child", e))?;
        self.exit_code = Some(status_code(status));
        Ok(())
    }

    fn started(&self) -> SystemTime {
        self.started
    }
}

impl Drop for ProcessContext {
    fn drop(&mut self) {
        if self.exit_code.is_some() {
            return;
        }
        if self.reaped.is_some() || matches!(self.child.try_wait(), Ok(None)) {
            if let Err(e) = self.terminate() {
                warn!(pid = self.child.id(), error = %e, "failed to stop child on release");
            }
        }
    }
}

fn status_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return exit_code::from_signal(signal);
        }
    }
    -1
}
