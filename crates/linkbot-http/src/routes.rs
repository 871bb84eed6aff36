//! HTTP route handlers.
//!
//! Every handler works on a single [`SessionStatus`] snapshot, so state and
//! QR payload in one response always belong together.

use axum::{extract::State, http::StatusCode, response::Html, response::Json};
use linkbot_core::session::{SessionState, SessionStatus, StatusSummary};
use serde::Serialize;
use std::sync::Arc;

use crate::qr;
use crate::AppState;

/// Dashboard reload interval while the page is open.
const REFRESH_SECS: u32 = 5;

/// Response body of `GET /get-qr`.
#[derive(Debug, Serialize)]
pub struct QrResponse {
    /// One of `connected`, `waiting_for_scan`, `initializing`, `error`.
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code_data_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code_string: Option<String>,
    pub message: String,
}

impl QrResponse {
    fn plain(status: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            qr_code_data_url: None,
            qr_code_string: None,
            message: message.into(),
        }
    }
}

/// Handler for GET /health
pub async fn health() -> &'static str {
    "OK"
}

/// Handler for GET /api/status
///
/// Same projection as the `session:status` WebSocket event.
pub async fn api_status(State(state): State<Arc<AppState>>) -> Json<StatusSummary> {
    Json(state.store.snapshot().summary())
}

/// Handler for GET /get-qr
pub async fn get_qr(State(state): State<Arc<AppState>>) -> (StatusCode, Json<QrResponse>) {
    let (code, body) = qr_response(&state.store.snapshot());
    (code, Json(body))
}

fn qr_response(status: &SessionStatus) -> (StatusCode, QrResponse) {
    if status.is_authenticated() {
        return (
            StatusCode::OK,
            QrResponse::plain("connected", "Session is connected"),
        );
    }

    let Some(payload) = status.pending_qr.as_deref() else {
        return (
            StatusCode::ACCEPTED,
            QrResponse::plain("initializing", "QR code not generated yet, try again shortly"),
        );
    };

    match qr::render_data_url(payload) {
        Ok(data_url) => (
            StatusCode::OK,
            QrResponse {
                status: "waiting_for_scan",
                qr_code_data_url: Some(data_url),
                qr_code_string: Some(payload.to_string()),
                message: "Scan the QR code with your phone to link this session".to_string(),
            },
        ),
        Err(e) => {
            log::error!("Failed to render QR code: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                QrResponse::plain("error", format!("Failed to render QR code: {}", e)),
            )
        }
    }
}

/// Handler for GET /
pub async fn dashboard(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(render_dashboard(&state.store.snapshot()))
}

fn render_dashboard(status: &SessionStatus) -> String {
    let body = match (status.state, status.pending_qr.as_deref()) {
        (SessionState::Authenticated, _) => {
            let name = status
                .info
                .as_ref()
                .map(|i| i.display_name.as_str())
                .unwrap_or("unknown");
            format!(
                "<p class=\"ok\">Connected as <strong>{}</strong></p>",
                escape_html(name)
            )
        }
        (_, Some(payload)) => match qr::render_data_url(payload) {
            Ok(data_url) => format!(
                "<p>Scan this code with your phone to link the session.</p>\n\
                 <img src=\"{}\" alt=\"QR code\" width=\"256\" height=\"256\">",
                data_url
            ),
            Err(e) => format!(
                "<p class=\"error\">Could not render QR code: {}</p>",
                escape_html(&e.to_string())
            ),
        },
        _ => "<p>Starting session, waiting for a QR code...</p>".to_string(),
    };

    let last_error = status
        .last_error
        .as_deref()
        .map(|e| format!("<p class=\"muted\">Last problem: {}</p>\n", escape_html(e)))
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta http-equiv="refresh" content="{refresh}">
<title>linkbot</title>
<style>
body {{ font-family: sans-serif; max-width: 32rem; margin: 3rem auto; }}
.ok {{ color: #1a7f37; }}
.error {{ color: #cf222e; }}
.muted {{ color: #6e7781; font-size: 0.9rem; }}
</style>
</head>
<body>
<h1>linkbot</h1>
<p>Session state: <code>{state}</code></p>
{body}
{last_error}<p class="muted">Messages answered: {handled}</p>
</body>
</html>
"#,
        refresh = REFRESH_SECS,
        state = status.state,
        body = body,
        last_error = last_error,
        handled = status.messages_handled,
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// ============================================================================
// TESTS
// ============================================================================
