//! linkbot daemon.
//!
//! Binds the HTTP status surface, then runs the session manager until
//! Ctrl-C / SIGTERM or until recovery gives up.

mod config;

use clap::Parser;
use linkbot_core::bridge::BridgeFactory;
use linkbot_core::event_bus::EventBus;
use linkbot_core::reply::ReplyEngine;
use linkbot_core::session::{SessionError, SessionManager};
use linkbot_http::AppState;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;

use config::{Config, Settings};

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("No bridge program configured")]
    MissingBridge,
    #[error("Unknown timezone: {0}")]
    InvalidTimezone(String),
    #[error("Cannot determine data directory: {0}")]
    DataDir(String),
    #[error("Failed to bind HTTP server to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("HTTP server failed: {0}")]
    Server(#[source] std::io::Error),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();
    if let Err(e) = run(config).await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), DaemonError> {
    let settings = config.into_settings()?;

    // Bind before touching the session so a busy port fails fast.
    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = TcpListener::bind((settings.host.as_str(), settings.port))
        .await
        .map_err(|source| DaemonError::Bind {
            addr: addr.clone(),
            source,
        })?;

    let Settings {
        identity,
        bridge,
        policy,
        send_timeout,
        timezone,
        ..
    } = settings;

    log::info!(
        "Starting session '{}' (data dir {}, bridge {})",
        identity.client_id,
        identity.data_dir.display(),
        bridge.program
    );

    let engine = ReplyEngine::new(timezone);
    log::info!("Answering !time in {}", engine.timezone());

    let event_bus = Arc::new(EventBus::new());
    let mut manager = SessionManager::new(identity, Arc::new(BridgeFactory::new(bridge)), engine)
    .with_policy(policy)
    .with_event_bus(Arc::clone(&event_bus));
    if let Some(timeout) = send_timeout {
        manager = manager.with_send_timeout(timeout);
    }

    let state = Arc::new(AppState::new(manager.status_store(), event_bus));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut server_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(linkbot_http::serve(listener, state, async move {
        let _ = server_shutdown.wait_for(|stop| *stop).await;
    }));
    let mut session = tokio::spawn(manager.run(shutdown_rx));

    let finished = tokio::select! {
        _ = shutdown_signal() => None,
        result = &mut session => Some(result),
    };
    let _ = shutdown_tx.send(true);
    let session_result = match finished {
        Some(result) => result,
        None => {
            log::info!("Shutdown requested");
            session.await
        }
    };

    let server_result = server.await;
    session_result??;
    server_result?.map_err(DaemonError::Server)?;
    log::info!("linkbot stopped");
    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_read_well() {
        assert_eq!(
            DaemonError::InvalidTimezone("Mars/Olympus".to_string()).to_string(),
            "Unknown timezone: Mars/Olympus"
        );
        let bind = DaemonError::Bind {
            addr: "0.0.0.0:3000".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use"),
        };
        assert_eq!(
            bind.to_string(),
            "Failed to bind HTTP server to 0.0.0.0:3000: address in use"
        );
        assert_eq!(
            DaemonError::from(SessionError::RecoveryExhausted(3)).to_string(),
            "Gave up recreating the session client after 3 consecutive attempts"
        );
    }

    #[tokio::test]
    async fn busy_port_is_a_bind_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let config = Config::try_parse_from([
            "linkbot",
            "--host",
            "127.0.0.1",
            "--port",
            &port.to_string(),
            "--data-dir",
            "/tmp/linkbot-test",
        ])
        .unwrap();

        let err = run(config).await.unwrap_err();
        assert!(matches!(err, DaemonError::Bind { .. }), "{err}");
    }
}
