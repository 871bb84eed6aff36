//! Line-delimited JSON protocol spoken with the bridge program.
//!
//! The bridge writes one event object per stdout line:
//!
//! ```json
//! {"event":"qr","qr":"2@AbC..."}
//! {"event":"ready","info":{"pushname":"Support Bot","wid":"15551234567@c.us"}}
//! {"event":"auth_failure","reason":"restore session failed"}
//! {"event":"disconnected","reason":"LOGOUT"}
//! {"event":"message","message":{"from":"15557654321@c.us","body":"hi","fromMe":false,"isStatus":false}}
//! ```
//!
//! and reads one command object per stdin line (see [`BridgeCommand`]).
//! Events the bridge may emit that linkbot does not care about (loading
//! progress, state changes) are ignored.

use crate::client::{ClientEvent, ClientInfo, InboundMessage};
use serde::{Deserialize, Serialize};

const KNOWN_EVENTS: [&str; 5] = ["qr", "ready", "auth_failure", "disconnected", "message"];

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum BridgeEvent {
    Qr {
        qr: String,
    },
    Ready {
        #[serde(default)]
        info: Option<ReadyInfo>,
    },
    AuthFailure {
        #[serde(default)]
        reason: String,
    },
    Disconnected {
        #[serde(default)]
        reason: String,
    },
    Message {
        message: WireMessage,
    },
}

#[derive(Debug, Default, Deserialize)]
struct ReadyInfo {
    #[serde(default)]
    pushname: Option<String>,
    #[serde(default)]
    wid: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    from: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    from_me: bool,
    #[serde(default)]
    is_status: bool,
}

impl From<ReadyInfo> for ClientInfo {
    fn from(info: ReadyInfo) -> Self {
        // Fall back to the number part of the wid ("15551234567@c.us").
        let display_name = info
            .pushname
            .filter(|name| !name.trim().is_empty())
            .or_else(|| {
                info.wid
                    .as_deref()
                    .and_then(|wid| wid.split('@').next())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "unknown".to_string());

        ClientInfo {
            display_name,
            id: info.wid,
        }
    }
}

impl From<BridgeEvent> for ClientEvent {
    fn from(event: BridgeEvent) -> Self {
        match event {
            BridgeEvent::Qr { qr } => ClientEvent::Qr(qr),
            BridgeEvent::Ready { info } => ClientEvent::Ready(info.unwrap_or_default().into()),
            BridgeEvent::AuthFailure { reason } => ClientEvent::AuthFailure(reason),
            BridgeEvent::Disconnected { reason } => ClientEvent::Disconnected(reason),
            BridgeEvent::Message { message } => ClientEvent::Message(InboundMessage {
                from: message.from,
                body: message.body,
                from_me: message.from_me,
                is_status: message.is_status,
            }),
        }
    }
}

/// Parse one stdout line.
///
/// `Ok(None)` for well-formed JSON that is not an event linkbot handles;
/// `Err` for lines that are not JSON or carry a malformed known event.
pub fn parse_line(line: &str) -> Result<Option<ClientEvent>, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    let known = value
        .get("event")
        .and_then(|e| e.as_str())
        .is_some_and(|kind| KNOWN_EVENTS.contains(&kind));
    if !known {
        return Ok(None);
    }
    let event: BridgeEvent = serde_json::from_value(value)?;
    Ok(Some(event.into()))
}

/// Commands written to the bridge's stdin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum BridgeCommand<'a> {
    Initialize,
    Send { to: &'a str, text: &'a str },
    Destroy,
}

impl BridgeCommand<'_> {
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
