//! Running the external downloader tools.

use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::error::DownloadError;
use super::types::CommandSpec;

/// Lines buffered between the pipe readers and the session loop.
const LINE_BUFFER: usize = 256;

/// Starts external processes.
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, command: &CommandSpec) -> Result<Box<dyn ExternalProcess>, DownloadError>;
}

/// A running external process with its output merged into one line stream.
#[async_trait]
pub trait ExternalProcess: Send {
    /// Next output line, or `None` once both output pipes are closed.
    ///
    /// Cancel-safe: dropping the future loses no line.
    async fn next_line(&mut self) -> std::io::Result<Option<String>>;

    /// Kill the process. Safe to call repeatedly or after it exited.
    async fn kill(&mut self);

    /// Wait for the process to exit and return its exit code.
    async fn wait(&mut self) -> std::io::Result<i32>;

    /// Whether the process is still running.
    fn is_running(&mut self) -> bool;
}

/// Launcher backed by `tokio::process`.
#[derive(Debug, Default, Clone)]
pub struct TokioProcessLauncher;

impl TokioProcessLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessLauncher for TokioProcessLauncher {
    fn launch(&self, command: &CommandSpec) -> Result<Box<dyn ExternalProcess>, DownloadError> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DownloadError::Launch {
                program: command.program.clone(),
                source,
            })?;

        debug!(pid = ?child.id(), program = %command.program.display(), "Spawned process");

        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(stdout, tx.clone(), "stdout");
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_reader(stderr, tx, "stderr");
        }

        Ok(Box::new(TokioProcess {
            child,
            lines: rx,
            exit_code: None,
        }))
    }
}

/// Forward every line of one pipe into the shared channel, so stdout and
/// stderr interleave in the order they are produced.
fn spawn_line_reader<R>(pipe: R, tx: mpsc::Sender<std::io::Result<String>>, name: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            match read_line(&mut reader, &mut buf).await {
                Ok(true) => {
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    if tx.send(Ok(line)).await.is_err() {
                        break;
                    }
                }
                Ok(false) => break,
                Err(e) => {
                    warn!(pipe = name, error = %e, "Failed to read process output");
                    let _ = tx.send(Err(e)).await;
                    break;
                }
            }
        }
    });
}

/// Read the next non-empty line into `buf`, ending at `\n` or `\r`.
///
/// Progress bars redraw with a bare `\r`, so it ends a line too. Returns
/// `false` at end of input with nothing buffered.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    loop {
        let (used, done) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(!buf.is_empty());
            }
            match available.iter().position(|b| *b == b'\n' || *b == b'\r') {
                Some(end) => {
                    buf.extend_from_slice(&available[..end]);
                    (end + 1, !buf.is_empty())
                }
                None => {
                    buf.extend_from_slice(available);
                    (available.len(), false)
                }
            }
        };
        reader.consume(used);
        if done {
            return Ok(true);
        }
    }
}

/// A child process spawned by [`TokioProcessLauncher`].
pub struct TokioProcess {
    child: Child,
    lines: mpsc::Receiver<std::io::Result<String>>,
    exit_code: Option<i32>,
}

#[async_trait]
impl ExternalProcess for TokioProcess {
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.lines.recv().await.transpose()
    }

    async fn kill(&mut self) {
        if self.exit_code.is_some() {
            return;
        }
        if let Err(e) = self.child.kill().await {
            // Already reaped or gone, nothing left to kill.
            debug!(error = %e, "Kill on finished process");
        }
    }

    async fn wait(&mut self) -> std::io::Result<i32> {
        if let Some(code) = self.exit_code {
            return Ok(code);
        }
        let status = self.child.wait().await?;
        let code = exit_code(status);
        self.exit_code = Some(code);
        Ok(code)
    }

    fn is_running(&mut self) -> bool {
        if self.exit_code.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit_code = Some(exit_code(status));
                false
            }
            Ok(None) => true,
            Err(_) => false,
        }
    }
}

/// Exit code, or the negated signal number when the process was killed.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }

    -1
}
