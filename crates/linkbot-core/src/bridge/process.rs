//! Bridge process spawning and I/O.
//!
//! Spawns the bridge through the login shell, turns stdout/stderr into line
//! events on a channel, and watches for exit. A dedicated task owns the
//! child: it reports an unexpected exit as [`ProcessEvent::Exit`], or, when
//! asked to stop (or when the [`BridgeProcess`] is dropped), terminates the
//! child (SIGTERM, then kill after a grace period).

use crate::client::ClientError;
use crate::shell::{build_shell_command, ProcessExit};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Grace period used when the process handle is dropped without `stop`.
const DROP_GRACE: Duration = Duration::from_secs(2);

/// Output of a bridge process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Stdout(String),
    Stderr(String),
    /// The process exited without being asked to.
    Exit(ProcessExit),
}

/// How to launch the bridge.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    pub program: String,
    pub args: Vec<String>,
    /// Custom shell prefix (e.g. "/bin/zsh -l -c").
    pub shell_prefix: Option<String>,
}

impl SpawnConfig {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            shell_prefix: None,
        }
    }

    pub fn shell_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.shell_prefix = Some(prefix.into());
        self
    }
}

/// A running bridge process.
pub struct BridgeProcess {
    stdin: Option<ChildStdin>,
    stop_tx: Option<oneshot::Sender<Duration>>,
    waiter: JoinHandle<std::io::Result<ProcessExit>>,
}

impl BridgeProcess {
    /// Spawn the process and start the reader and exit-watcher tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        config: SpawnConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ProcessEvent>), ClientError> {
        let mut cmd = build_shell_command(
            &config.program,
            &config.args,
            config.shell_prefix.as_deref(),
        )
        .map_err(ClientError::Spawn)?;

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| ClientError::Spawn(format!("{}: {}", config.program, e)))?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClientError::Spawn("Failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ClientError::Spawn("Failed to capture stderr".to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        forward_lines(stdout, tx.clone(), ProcessEvent::Stdout);
        forward_lines(stderr, tx.clone(), ProcessEvent::Stderr);

        let (stop_tx, stop_rx) = oneshot::channel();
        let waiter = tokio::spawn(watch_child(child, stop_rx, tx));

        Ok((
            Self {
                stdin,
                stop_tx: Some(stop_tx),
                waiter,
            },
            rx,
        ))
    }

    /// Write one line to stdin.
    pub async fn write_line(&mut self, line: &str) -> Result<(), ClientError> {
        let stdin = self.stdin.as_mut().ok_or(ClientError::NotRunning)?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Close stdin, terminate the process and wait for it to go away.
    pub async fn stop(mut self, grace: Duration) -> Result<ProcessExit, ClientError> {
        self.stdin.take();
        if let Some(stop_tx) = self.stop_tx.take() {
            // Fails only if the process already exited on its own.
            let _ = stop_tx.send(grace);
        }
        match (&mut self.waiter).await {
            Ok(result) => result.map_err(ClientError::Io),
            Err(e) => Err(ClientError::Other(format!("Bridge watcher failed: {}", e))),
        }
    }
}

/// Forward `stream` line by line until EOF or a read error.
///
/// Invalid UTF-8 is decoded lossily; the pipe must stay drained or the
/// bridge blocks (or dies of SIGPIPE) on its next write.
fn forward_lines<R>(
    stream: R,
    tx: mpsc::UnboundedSender<ProcessEvent>,
    wrap: fn(String) -> ProcessEvent,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    log::debug!("Bridge output stream closed: {}", e);
                    break;
                }
            }
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\n', '\r']).to_string();
            if tx.send(wrap(line)).is_err() {
                break;
            }
        }
    });
}

async fn watch_child(
    mut child: Child,
    stop_rx: oneshot::Receiver<Duration>,
    tx: mpsc::UnboundedSender<ProcessEvent>,
) -> std::io::Result<ProcessExit> {
    tokio::select! {
        status = child.wait() => {
            let exit = ProcessExit::from_status(status?);
            let _ = tx.send(ProcessEvent::Exit(exit.clone()));
            Ok(exit)
        }
        grace = stop_rx => {
            let status = terminate(&mut child, grace.unwrap_or(DROP_GRACE)).await?;
            Ok(ProcessExit::from_status(status))
        }
    }
}

/// SIGTERM first on Unix so the bridge can close its browser cleanly.
async fn terminate(child: &mut Child, grace: Duration) -> std::io::Result<ExitStatus> {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
        if let Ok(status) = tokio::time::timeout(grace, child.wait()).await {
            return status;
        }
        log::warn!("Bridge process {} ignored SIGTERM, killing", pid);
    }
    #[cfg(not(unix))]
    let _ = grace;

    child.kill().await?;
    child.wait().await
}
