//! HTTP status surface for linkbot.
//!
//! Read-only: a dashboard page, the pending QR code as JSON, a health check,
//! a machine-readable status document and a WebSocket event stream.

mod qr;
mod routes;
mod state;
mod websocket;

use axum::{routing::get, Router};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use qr::{render_data_url, render_svg, QrRenderError};
pub use routes::QrResponse;
pub use state::AppState;

/// Build the router for the status surface.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(routes::dashboard))
        .route("/get-qr", get(routes::get_qr))
        .route("/health", get(routes::health))
        .route("/api/status", get(routes::api_status))
        .route("/ws/events", get(websocket::ws_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serve on an already-bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        log::info!("HTTP server listening on http://{}", addr);
    }

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move {
            shutdown.await;
            log::info!("HTTP server shutting down");
        })
        .await
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use linkbot_core::client::ClientInfo;
    use linkbot_core::event_bus::EventBus;
    use linkbot_core::session::{SessionState, SessionStatus, StatusStore};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tower::ServiceExt;

    fn app_state() -> Arc<AppState> {
        Arc::new(AppState::new(StatusStore::new(), Arc::new(EventBus::new())))
    }

    async fn get(state: Arc<AppState>, uri: &str) -> (StatusCode, String) {
        let response = create_router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (status, body) = get(app_state(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn get_qr_initializing_is_202() {
        let (status, body) = get(app_state(), "/get-qr").await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "initializing");
    }

    #[tokio::test]
    async fn get_qr_follows_published_status() {
        let state = app_state();
        state.store.publish(SessionStatus {
            state: SessionState::AwaitingQr,
            pending_qr: Some("2@abc".to_string()),
            ..SessionStatus::new()
        });

        let (status, body) = get(state.clone(), "/get-qr").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "waiting_for_scan");
        assert_eq!(json["qr_code_string"], "2@abc");

        state.store.publish(SessionStatus {
            state: SessionState::Authenticated,
            info: Some(ClientInfo {
                display_name: "Bot".to_string(),
                id: None,
            }),
            ..SessionStatus::new()
        });
        let (status, body) = get(state, "/get-qr").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "connected");
    }

    #[tokio::test]
    async fn dashboard_is_html() {
        let (status, body) = get(app_state(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with("<!DOCTYPE html>"));
        assert!(body.contains("uninitialized"));
    }

    #[tokio::test]
    async fn api_status_is_json() {
        let (status, body) = get(app_state(), "/api/status").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["state"], "uninitialized");
        assert_eq!(json["messages_handled"], 0);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let (status, _) = get(app_state(), "/logout").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ws_without_upgrade_is_rejected() {
        let (status, _) = get(app_state(), "/ws/events").await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn serve_answers_and_shuts_down() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(serve(listener, app_state(), async {
            rx.await.ok();
        }));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("OK"));

        tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
