//! Command-line and environment configuration.

use chrono_tz::Tz;
use clap::Parser;
use linkbot_core::bridge::{BridgeConfig, DEFAULT_STOP_GRACE};
use linkbot_core::client::SessionIdentity;
use linkbot_core::session::RecoveryPolicy;
use std::path::PathBuf;
use std::time::Duration;

use crate::DaemonError;

/// linkbot: QR-linked chat bot with an HTTP status page.
#[derive(Debug, Parser)]
#[command(name = "linkbot", version, about)]
pub struct Config {
    /// Address to bind the HTTP server to
    #[arg(long, env = "LINKBOT_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the HTTP server
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Identity key of the linked session; reused across restarts
    #[arg(long, env = "LINKBOT_CLIENT_ID", default_value = "default")]
    pub client_id: String,

    /// Directory for the session credential cache [default: ~/.linkbot/sessions]
    #[arg(long, env = "LINKBOT_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Bridge program that drives the chat-network client
    #[arg(long, env = "LINKBOT_BRIDGE", default_value = "linkbot-bridge")]
    pub bridge: String,

    /// Extra argument passed to the bridge (repeatable)
    #[arg(long = "bridge-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub bridge_args: Vec<String>,

    /// Shell prefix used to launch the bridge (e.g. "/bin/zsh -l -c")
    #[arg(long, env = "LINKBOT_SHELL")]
    pub shell: Option<String>,

    /// Directory for bridge transcripts; disabled when unset
    #[arg(long, env = "LINKBOT_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Seconds to wait before recreating a lost session client
    #[arg(long, env = "LINKBOT_SETTLE_DELAY_SECS", default_value_t = 5)]
    pub settle_delay_secs: u64,

    /// Stop after this many consecutive failed recoveries [default: unbounded]
    #[arg(long, env = "LINKBOT_MAX_RECOVERY_ATTEMPTS")]
    pub max_recovery_attempts: Option<u32>,

    /// Give up on a reply after this many seconds [default: no limit]
    #[arg(long, env = "LINKBOT_SEND_TIMEOUT_SECS")]
    pub send_timeout_secs: Option<u64>,

    /// IANA timezone used by the !time reply
    #[arg(long, env = "LINKBOT_TIMEZONE", default_value = "UTC")]
    pub timezone: String,
}

/// Validated settings the daemon starts from.
#[derive(Debug)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub identity: SessionIdentity,
    pub bridge: BridgeConfig,
    pub policy: RecoveryPolicy,
    pub send_timeout: Option<Duration>,
    pub timezone: Tz,
}

impl Config {
    pub fn into_settings(self) -> Result<Settings, DaemonError> {
        if self.bridge.trim().is_empty() {
            return Err(DaemonError::MissingBridge);
        }

        let timezone: Tz = self
            .timezone
            .parse()
            .map_err(|_| DaemonError::InvalidTimezone(self.timezone.clone()))?;

        let data_dir = match self.data_dir {
            Some(dir) => dir,
            None => linkbot_core::paths::default_data_dir().map_err(DaemonError::DataDir)?,
        };

        Ok(Settings {
            host: self.host,
            port: self.port,
            identity: SessionIdentity::new(self.client_id, data_dir),
            bridge: BridgeConfig {
                program: self.bridge,
                args: self.bridge_args,
                shell_prefix: self.shell,
                log_dir: self.log_dir,
                stop_grace: DEFAULT_STOP_GRACE,
            },
            policy: RecoveryPolicy {
                settle_delay: Duration::from_secs(self.settle_delay_secs),
                max_attempts: self.max_recovery_attempts,
            },
            send_timeout: self.send_timeout_secs.map(Duration::from_secs),
            timezone,
        })
    }
}
