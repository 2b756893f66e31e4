// # Command Runner
//
// The single execution primitive behind every PowerDNS control call.
//
// Each invocation runs with a deadline. stdout and stderr are captured in
// full (including whatever was written before a timeout) and attached to
// the error, so a failed `pdnsutil` call is diagnosable from the log alone.

use rpz_core::ServerSyncError;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Default deadline for one control command
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// How long to keep reading pipes after a timed-out child was killed
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Captured output of a successful command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs external commands with a deadline
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
}

impl CommandRunner {
    /// Create a runner with the given per-command deadline
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Per-command deadline
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `program` with `args`
    ///
    /// Exit status 0 is success. A non-zero status, a missing program and an
    /// expired deadline each map to their own [`ServerSyncError`] variant.
    ///
    /// The deadline covers the whole call: a command that exits but leaves a
    /// background process holding stdout or stderr open is reported as a
    /// timeout once the deadline passes. The child is killed when the
    /// deadline expires, and only then: if this future is dropped early the
    /// command is left to finish on its own.
    pub async fn run(
        &self,
        program: &Path,
        args: &[String],
    ) -> Result<CommandOutput, ServerSyncError> {
        let command_line = describe(program, args);
        tracing::debug!("Running {}", command_line);

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ServerSyncError::execution(&command_line, e.to_string()))?;

        let mut output = Captured {
            stdout: child.stdout.take().map(PipeCapture::spawn),
            stderr: child.stderr.take().map(PipeCapture::spawn),
        };
        let deadline = Instant::now() + self.timeout;

        let waited = tokio::time::timeout_at(deadline, child.wait()).await;
        match waited {
            Ok(Ok(status)) => {
                if output.closed_by(deadline).await {
                    let (stdout, stderr) = output.into_text();
                    return classify(command_line, status, stdout, stderr);
                }
                tracing::warn!(
                    "{} exited but its output stayed open past the {:?} deadline",
                    command_line,
                    self.timeout
                );
            }
            Ok(Err(e)) => {
                return Err(ServerSyncError::execution(&command_line, e.to_string()));
            }
            Err(_) => {
                if let Err(e) = child.kill().await {
                    tracing::warn!("Failed to kill timed-out command {}: {}", command_line, e);
                }
                output.closed_by(Instant::now() + PIPE_DRAIN_TIMEOUT).await;
            }
        }

        let (stdout, stderr) = output.into_text();
        Err(ServerSyncError::Timeout {
            command: command_line,
            timeout: self.timeout,
            stdout,
            stderr,
        })
    }
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

fn classify(
    command: String,
    status: ExitStatus,
    stdout: String,
    stderr: String,
) -> Result<CommandOutput, ServerSyncError> {
    if status.success() {
        return Ok(CommandOutput { stdout, stderr });
    }

    // Killed by a signal: no exit code
    let code = status.code().unwrap_or(-1);
    Err(ServerSyncError::NonZeroExit {
        command,
        code,
        stdout,
        stderr,
    })
}

/// A pipe read to its end in the background
///
/// Bytes land in a shared buffer as they arrive, so whatever was read
/// before the reader is abandoned is still available.
struct PipeCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    reader: JoinHandle<()>,
}

impl PipeCapture {
    fn spawn<R>(mut pipe: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let reader = tokio::spawn(async move {
            let mut chunk = [0u8; 4096];
            loop {
                match pipe.read(&mut chunk).await {
                    // Partial output is still useful if the pipe errors
                    Ok(0) | Err(_) => break,
                    Ok(n) => lock(&sink).extend_from_slice(&chunk[..n]),
                }
            }
        });
        Self { buffer, reader }
    }

    /// Wait until the pipe reaches EOF or `deadline` passes
    async fn closed_by(&mut self, deadline: Instant) -> bool {
        tokio::time::timeout_at(deadline, &mut self.reader)
            .await
            .is_ok()
    }

    fn into_text(self) -> String {
        self.reader.abort();
        let bytes = lock(&self.buffer);
        String::from_utf8_lossy(&bytes).trim().to_string()
    }
}

/// stdout and stderr of one child
struct Captured {
    stdout: Option<PipeCapture>,
    stderr: Option<PipeCapture>,
}

impl Captured {
    async fn closed_by(&mut self, deadline: Instant) -> bool {
        let mut closed = true;
        for pipe in [&mut self.stdout, &mut self.stderr].into_iter().flatten() {
            closed &= pipe.closed_by(deadline).await;
        }
        closed
    }

    fn into_text(self) -> (String, String) {
        (
            self.stdout.map(PipeCapture::into_text).unwrap_or_default(),
            self.stderr.map(PipeCapture::into_text).unwrap_or_default(),
        )
    }
}

fn lock(buffer: &Mutex<Vec<u8>>) -> MutexGuard<'_, Vec<u8>> {
    buffer.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Human-readable command line for logs and errors
pub fn describe(program: &Path, args: &[String]) -> String {
    let mut line = program.display().to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}
