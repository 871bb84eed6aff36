//! # linkbot-core
//!
//! Core logic for linkbot, a chat bot whose session is linked to an account
//! by scanning a QR code.
//!
//! This crate is transport-agnostic and is used by:
//! - the HTTP status surface (`linkbot-http`)
//! - the daemon binary (`linkbot-daemon`)
//!
//! ## Key Concepts
//!
//! - **Session**: the lifecycle state machine of one linked account
//! - **SessionClient**: the connection to the chat network (a bridge process)
//! - **Recovery**: tearing down a failed client and starting a fresh one
//! - **ReplyEngine**: keyword rules that turn inbound text into replies

pub mod bridge;
pub mod client;
pub mod event_bus;
pub mod logging;
pub mod paths;
pub mod reply;
pub mod session;
pub mod shell;

// Re-export commonly used types
pub use bridge::{BridgeConfig, BridgeFactory};
pub use client::{ClientError, ClientEvent, ClientFactory, ClientInfo, SessionClient, SessionIdentity};
pub use event_bus::EventBus;
pub use reply::ReplyEngine;
pub use session::{RecoveryPolicy, SessionError, SessionManager, SessionState, SessionStatus, StatusStore, StatusSummary};
