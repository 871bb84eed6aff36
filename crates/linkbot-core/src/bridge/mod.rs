//! Session client backed by an external bridge program.
//!
//! The bridge owns the actual chat-network connection (browser automation,
//! credential cache) and talks to linkbot over stdio using the line protocol
//! in [`protocol`]. One bridge process runs per [`BridgeClient`]; the
//! process is started by `initialize` and torn down by `destroy`.

mod process;
pub mod protocol;

pub use process::{BridgeProcess, ProcessEvent, SpawnConfig};
pub use protocol::{parse_line, BridgeCommand};

use crate::client::{ClientError, ClientEvent, ClientFactory, SessionClient, SessionIdentity};
use crate::logging::{log_line, open_transcript, TranscriptHandle};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Default time the bridge gets to exit after SIGTERM.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// How to launch bridge processes.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Bridge executable (resolved through the login shell's PATH).
    pub program: String,
    /// Extra arguments placed before `--client-id` / `--data-dir`.
    pub args: Vec<String>,
    pub shell_prefix: Option<String>,
    /// Where to write per-client transcripts; `None` disables them.
    pub log_dir: Option<PathBuf>,
    pub stop_grace: Duration,
}

impl BridgeConfig {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            shell_prefix: None,
            log_dir: None,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }

    /// Full argument list for a given session identity.
    fn args_for(&self, identity: &SessionIdentity) -> Vec<String> {
        let mut args = self.args.clone();
        args.push("--client-id".to_string());
        args.push(identity.client_id.clone());
        args.push("--data-dir".to_string());
        args.push(identity.data_dir.to_string_lossy().into_owned());
        args
    }
}

/// Creates a fresh [`BridgeClient`] per session attempt.
pub struct BridgeFactory {
    config: BridgeConfig,
}

impl BridgeFactory {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }
}

impl ClientFactory for BridgeFactory {
    fn create(
        &self,
        identity: &SessionIdentity,
        events: mpsc::Sender<ClientEvent>,
    ) -> Result<Box<dyn SessionClient>, ClientError> {
        Ok(Box::new(BridgeClient::new(
            self.config.clone(),
            identity.clone(),
            events,
        )))
    }
}

pub struct BridgeClient {
    config: BridgeConfig,
    identity: SessionIdentity,
    events: mpsc::Sender<ClientEvent>,
    transcript: TranscriptHandle,
    process: Option<BridgeProcess>,
    pump: Option<JoinHandle<()>>,
}

impl BridgeClient {
    pub fn new(
        config: BridgeConfig,
        identity: SessionIdentity,
        events: mpsc::Sender<ClientEvent>,
    ) -> Self {
        let transcript = open_transcript(config.log_dir.as_deref(), &identity.client_id);
        Self {
            config,
            identity,
            events,
            transcript,
            process: None,
            pump: None,
        }
    }

    async fn write(&mut self, command: BridgeCommand<'_>) -> Result<(), ClientError> {
        let line = command.to_line()?;
        let process = self.process.as_mut().ok_or(ClientError::NotRunning)?;
        log_line(&self.transcript, "STDIN", &line);
        process.write_line(&line).await
    }
}

/// Translate process output into client events until the process exits or
/// the session stops listening.
async fn pump_output(
    mut output: mpsc::UnboundedReceiver<ProcessEvent>,
    events: mpsc::Sender<ClientEvent>,
    transcript: TranscriptHandle,
    client_id: String,
) {
    while let Some(event) = output.recv().await {
        let forwarded = match event {
            ProcessEvent::Stdout(line) => {
                log_line(&transcript, "STDOUT", &line);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match parse_line(line) {
                    Ok(Some(event)) => event,
                    Ok(None) => {
                        log::trace!("[{}] ignoring bridge event: {}", client_id, line);
                        continue;
                    }
                    Err(e) => {
                        log::debug!("[{}] non-protocol bridge output ({}): {}", client_id, e, line);
                        continue;
                    }
                }
            }
            ProcessEvent::Stderr(line) => {
                log_line(&transcript, "STDERR", &line);
                log::debug!("[{}] bridge: {}", client_id, line);
                continue;
            }
            ProcessEvent::Exit(exit) => {
                log_line(&transcript, "EXIT", &exit.to_string());
                ClientEvent::Fault(format!("bridge exited with {}", exit))
            }
        };

        let fatal = matches!(forwarded, ClientEvent::Fault(_));
        if events.send(forwarded).await.is_err() || fatal {
            break;
        }
    }
}

#[async_trait]
impl SessionClient for BridgeClient {
    async fn initialize(&mut self) -> Result<(), ClientError> {
        if self.process.is_some() {
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.identity.data_dir).await?;

        let mut spawn = SpawnConfig::new(&self.config.program, self.config.args_for(&self.identity));
        if let Some(prefix) = &self.config.shell_prefix {
            spawn = spawn.shell_prefix(prefix.clone());
        }

        let (process, output) = BridgeProcess::spawn(spawn)?;
        log_line(
            &self.transcript,
            "SPAWN",
            &format!("{} {}", self.config.program, self.config.args_for(&self.identity).join(" ")),
        );
        log::info!(
            "[{}] started bridge {}",
            self.identity.client_id,
            self.config.program
        );

        self.pump = Some(tokio::spawn(pump_output(
            output,
            self.events.clone(),
            self.transcript.clone(),
            self.identity.client_id.clone(),
        )));
        self.process = Some(process);

        self.write(BridgeCommand::Initialize).await
    }

    async fn send_message(&mut self, to: &str, text: &str) -> Result<(), ClientError> {
        self.write(BridgeCommand::Send { to, text }).await
    }

    async fn destroy(&mut self) -> Result<(), ClientError> {
        // Stop translating first so the shutdown exit is not reported as a fault.
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if self.process.is_none() {
            return Ok(());
        }

        if let Err(e) = self.write(BridgeCommand::Destroy).await {
            log::debug!("[{}] destroy command not delivered: {}", self.identity.client_id, e);
        }

        let Some(process) = self.process.take() else {
            return Ok(());
        };
        let exit = process.stop(self.config.stop_grace).await?;
        log_line(&self.transcript, "EXIT", &exit.to_string());
        log::info!("[{}] bridge stopped ({})", self.identity.client_id, exit);
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// A minimal bridge: announces a QR and readiness after `initialize`,
    /// echoes sends back as own messages, exits on `destroy`.
    const FAKE_BRIDGE: &str = r#"read cmd
echo '{"event":"qr","qr":"qr-1"}'
echo 'booting browser'
echo '{"event":"ready","info":{"pushname":"Bot","wid":"100@c.us"}}'
while read line; do
  case "$line" in
    *destroy*) exit 0 ;;
    *send*) echo '{"event":"message","message":{"from":"100@c.us","body":"ack","fromMe":true}}' ;;
  esac
done"#;

    fn config(script: &str, log_dir: Option<PathBuf>) -> BridgeConfig {
        let mut config = BridgeConfig::new("/bin/sh");
        config.args = vec!["-c".to_string(), script.to_string()];
        config.shell_prefix = Some("/bin/sh -c".to_string());
        config.log_dir = log_dir;
        config.stop_grace = Duration::from_secs(2);
        config
    }

    async fn next(rx: &mut mpsc::Receiver<ClientEvent>) -> ClientEvent {
        tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("timed out waiting for client event")
            .expect("event channel closed")
    }

    #[test]
    fn identity_args_are_appended() {
        let mut config = BridgeConfig::new("linkbot-bridge");
        config.args = vec!["--headless".to_string()];
        let identity = SessionIdentity::new("support", "/var/lib/linkbot");
        assert_eq!(
            config.args_for(&identity),
            vec![
                "--headless",
                "--client-id",
                "support",
                "--data-dir",
                "/var/lib/linkbot"
            ]
        );
    }

    #[tokio::test]
    async fn full_lifecycle_over_stdio() {
        let dir = tempdir().unwrap();
        let identity = SessionIdentity::new("bot", dir.path().join("data"));
        let (tx, mut rx) = mpsc::channel(16);
        let factory = BridgeFactory::new(config(FAKE_BRIDGE, Some(dir.path().join("logs"))));

        let mut client = factory.create(&identity, tx).unwrap();
        client.initialize().await.unwrap();

        assert_eq!(next(&mut rx).await, ClientEvent::Qr("qr-1".to_string()));
        match next(&mut rx).await {
            ClientEvent::Ready(info) => {
                assert_eq!(info.display_name, "Bot");
                assert_eq!(info.id.as_deref(), Some("100@c.us"));
            }
            other => panic!("unexpected {other:?}"),
        }

        client.send_message("200@c.us", "hello").await.unwrap();
        match next(&mut rx).await {
            ClientEvent::Message(msg) => {
                assert!(msg.from_me);
                assert_eq!(msg.body, "ack");
            }
            other => panic!("unexpected {other:?}"),
        }

        client.destroy().await.unwrap();
        assert!(dir.path().join("data").is_dir());

        let transcript = std::fs::read_to_string(dir.path().join("logs/bot.log")).unwrap();
        assert!(transcript.contains(r#"STDIN: {"command":"initialize"}"#));
        assert!(transcript.contains(r#"STDIN: {"command":"send","to":"200@c.us","text":"hello"}"#));
        assert!(transcript.contains("STDOUT: booting browser"));
        // Either the bridge honoured `destroy` or SIGTERM got there first.
        assert!(transcript.contains("EXIT: "));
    }

    #[tokio::test]
    async fn unexpected_exit_is_a_fault() {
        let dir = tempdir().unwrap();
        let identity = SessionIdentity::new("bot", dir.path());
        let (tx, mut rx) = mpsc::channel(16);
        let mut client = BridgeClient::new(config("read cmd; exit 7", None), identity, tx);

        client.initialize().await.unwrap();
        match next(&mut rx).await {
            ClientEvent::Fault(reason) => assert!(reason.contains("exit code 7"), "{reason}"),
            other => panic!("unexpected {other:?}"),
        }
        client.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn send_before_initialize_is_not_running() {
        let dir = tempdir().unwrap();
        let (tx, _rx) = mpsc::channel(1);
        let mut client =
            BridgeClient::new(config(FAKE_BRIDGE, None), SessionIdentity::new("bot", dir.path()), tx);
        assert!(matches!(
            client.send_message("1@c.us", "hi").await,
            Err(ClientError::NotRunning)
        ));
        // Destroying a client that never started is a no-op.
        client.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn destroy_kills_unresponsive_bridge() {
        let dir = tempdir().unwrap();
        let (tx, _rx) = mpsc::channel(1);
        let mut config = config("trap '' TERM; read cmd; sleep 30", None);
        config.stop_grace = Duration::from_millis(200);
        let mut client = BridgeClient::new(config, SessionIdentity::new("bot", dir.path()), tx);

        client.initialize().await.unwrap();
        tokio::time::timeout(Duration::from_secs(10), client.destroy())
            .await
            .expect("destroy hung")
            .unwrap();
    }
}
