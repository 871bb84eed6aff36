//! Session client contract.
//!
//! The session client is the external capability that talks to the messaging
//! network: it brokers QR-based device linking, delivers inbound messages and
//! reports disconnects. linkbot never implements the protocol itself; it only
//! drives a client through this narrow interface.
//!
//! Clients report everything that happens to them as [`ClientEvent`]s on the
//! channel handed to [`ClientFactory::create`]. Each client gets its own
//! channel, so once a client is dropped nothing it emits can reach its
//! successor.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::mpsc;

/// Persistent identity a client is bound to.
///
/// The same identity is reused on every recreation so the external client can
/// pick up its cached credentials instead of asking for a new QR scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    /// Identity key (the external client's "client id").
    pub client_id: String,
    /// Directory where the external client keeps its credential cache.
    pub data_dir: PathBuf,
}

impl SessionIdentity {
    pub fn new(client_id: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            client_id: client_id.into(),
            data_dir: data_dir.into(),
        }
    }
}

/// Account details reported once the session is authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Display name of the linked account.
    pub display_name: String,
    /// Network identifier of the linked account, when the client reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// A message received by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Chat identifier the message came from (replies go back here).
    pub from: String,
    /// Message text.
    pub body: String,
    /// The message was authored by the linked account itself.
    pub from_me: bool,
    /// The message is an ephemeral status broadcast.
    pub is_status: bool,
}

impl InboundMessage {
    /// Whether this message should be answered at all.
    ///
    /// Own messages and status broadcasts never reach the reply engine, and
    /// neither do empty bodies (media without caption, reactions).
    pub fn wants_reply(&self) -> bool {
        !self.from_me && !self.is_status && !self.body.trim().is_empty()
    }
}

/// Lifecycle and traffic events emitted by a session client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A new QR payload is available for scanning. Replaces any previous one.
    Qr(String),
    /// The session is linked and ready.
    Ready(ClientInfo),
    /// Authentication failed; the client is expected to issue a new QR.
    AuthFailure(String),
    /// The client lost its connection to the network.
    Disconnected(String),
    /// A message arrived.
    Message(InboundMessage),
    /// The client itself broke (process exited, stream closed, ...).
    Fault(String),
}

impl ClientEvent {
    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::Qr(_) => "qr",
            ClientEvent::Ready(_) => "ready",
            ClientEvent::AuthFailure(_) => "auth_failure",
            ClientEvent::Disconnected(_) => "disconnected",
            ClientEvent::Message(_) => "message",
            ClientEvent::Fault(_) => "fault",
        }
    }
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Failed to start session client: {0}")]
    Spawn(String),

    #[error("Session client is not running")]
    NotRunning,

    #[error("Failed to talk to session client: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid session client payload: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("Session client timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("{0}")]
    Other(String),
}

/// A live connection to the messaging network.
#[async_trait]
pub trait SessionClient: Send {
    /// Begin connecting. Progress is reported through [`ClientEvent`]s.
    async fn initialize(&mut self) -> Result<(), ClientError>;

    /// Send a text message. Best effort, no delivery guarantee.
    async fn send_message(&mut self, to: &str, text: &str) -> Result<(), ClientError>;

    /// Release every resource held by the client. May fail; callers treat
    /// failure as non-fatal.
    async fn destroy(&mut self) -> Result<(), ClientError>;
}

/// Builds session clients bound to an identity.
pub trait ClientFactory: Send + Sync {
    fn create(
        &self,
        identity: &SessionIdentity,
        events: mpsc::Sender<ClientEvent>,
    ) -> Result<Box<dyn SessionClient>, ClientError>;
}
