//! Relay server binary.
//!
//! Wires the relay task to the HTTP + `WebSocket` server and runs until
//! Ctrl-C (or SIGTERM on Unix).
//!
//! # Startup Sequence
//!
//! 1. Load configuration from the environment
//! 2. Initialize structured logging (tracing)
//! 3. Spawn the relay task
//! 4. Serve HTTP until a shutdown signal arrives
//! 5. Stop the relay, which closes every dashboard connection
//! 6. Wait (bounded) for `WebSocket` sessions to send their close frames

mod config;
mod error;

use std::sync::Arc;
use std::time::Duration;

use centrale_relay::{spawn_relay, start_server, AppState, RelayHandle};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, RelayConfig};
use crate::error::AppError;

/// How long shutdown waits for `WebSocket` sessions to finish closing.
const SESSION_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Application entry point for the relay.
///
/// # Errors
///
/// Returns an error if configuration is invalid or the server cannot bind.
#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Load configuration.
    let config = RelayConfig::from_env()?;

    // 2. Initialize structured logging.
    init_tracing(config.log_format);
    info!(
        host = config.host,
        port = config.port,
        subscriber_buffer = config.subscriber_buffer,
        max_body_bytes = config.max_body_bytes,
        "centrale-server starting"
    );

    // 3. Spawn the relay task.
    let (relay, relay_task) = spawn_relay(config.relay_options());
    let state = Arc::new(AppState::new(relay.clone()).with_max_body_bytes(config.max_body_bytes));
    let sessions = state.sessions.clone();

    // 4. Serve until signalled. Stopping the relay closes every subscriber
    //    queue, which ends the upgraded sessions; Axum does not wait for
    //    those, so step 6 does.
    let stopper = relay.clone();
    let served = start_server(&config.server(), state, async move {
        shutdown_signal().await;
        info!("Shutdown signal received, closing subscribers");
        stopper.shutdown().await;
    })
    .await;

    // 5. Make sure the relay is down even if serving failed.
    stop_relay(&relay, relay_task).await;

    // 6. Let sessions flush their close frames before the runtime drops.
    if tokio::time::timeout(SESSION_DRAIN_TIMEOUT, sessions.wait_idle())
        .await
        .is_err()
    {
        warn!(
            live = sessions.live(),
            "WebSocket sessions still open after drain timeout"
        );
    }
    served?;

    info!("centrale-server shutdown complete");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn stop_relay(relay: &RelayHandle, task: tokio::task::JoinHandle<()>) {
    relay.shutdown().await;
    if let Err(e) = task.await {
        error!(error = %e, "Relay task ended abnormally");
    }
}

/// Resolve on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
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
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
