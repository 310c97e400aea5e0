//! Trade Tape Binary
//!
//! Connects to the trade feed, keeps the recent-trades ledger and serves it
//! over HTTP.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin trade-tape
//! ```
//!
//! # Environment Variables
//!
//! All optional.
//! - `TRADE_TAPE_FEED_URL`: feed endpoint (default: wss://www.cryptofacilities.com/ws/v1)
//! - `TRADE_TAPE_PRODUCT_ID`: instrument at startup (default: `PI_XBTUSD`)
//! - `TRADE_TAPE_MAX_TRADES`: ledger capacity (default: 50)
//! - `TRADE_TAPE_RECONNECT_ATTEMPTS`: consecutive reconnect attempts (default: 5)
//! - `TRADE_TAPE_RECONNECT_INTERVAL_MS`: pause between attempts (default: 3000)
//! - `TRADE_TAPE_RECONNECT_JITTER`: random spread of each pause as a fraction
//!   of the interval, `0.0..=1.0` (default: 0.0)
//! - `TRADE_TAPE_HTTP_PORT`: HTTP port (default: 8083)
//! - `OTEL_ENABLED`: export spans over OTLP (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: service name (default: trade-tape)
//! - `RUST_LOG`: log filter (default: `trade_tape=info`)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use trade_tape::infrastructure::telemetry;
use trade_tape::{
    ChannelIntentSink, FeedClient, FeedEvent, HttpServer, HttpServerState, MessageDispatcher,
    SessionDriver, TapeConfig, TradeSession, init_metrics,
};

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the feed event channel.
const EVENT_BUFFER: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init().context("failed to initialize telemetry")?;

    tracing::info!("Starting Trade Tape");

    let _metrics_handle = init_metrics().context("failed to install metrics recorder")?;

    let config = TapeConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    // Kill cancels only the feed; shutdown cancels everything.
    let feed_token = shutdown_token.child_token();

    let (event_tx, event_rx) = mpsc::channel::<FeedEvent>(EVENT_BUFFER);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    let client = FeedClient::new(
        config.feed.client_config(),
        event_tx,
        outbound_rx,
        feed_token.clone(),
    );

    let session = TradeSession::with_dispatcher(
        config.feed.product_id.clone(),
        config.ledger.max_trades,
        ChannelIntentSink::new(outbound_tx, feed_token),
        MessageDispatcher::new(),
    );
    let (driver, handle) = SessionDriver::new(session, event_rx, shutdown_token.clone());

    let http_state = Arc::new(HttpServerState::new(env!("CARGO_PKG_VERSION"), handle));
    let http_server = HttpServer::new(
        config.server.http_port,
        http_state,
        shutdown_token.clone(),
    );

    let driver_task = tokio::spawn(driver.run());

    tokio::spawn(async move {
        if let Err(e) = client.run().await {
            tracing::error!(error = %e, "Feed client stopped with error");
        }
    });

    tokio::spawn(async move {
        if let Err(e) = http_server.run().await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    tracing::info!("Trade Tape ready");

    await_shutdown(shutdown_token).await;

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, driver_task).await {
        Ok(Ok(session)) => tracing::info!(
            trades = session.ledger().len(),
            status = session.status().as_str(),
            "Session drained"
        ),
        Ok(Err(e)) => tracing::error!(error = %e, "Session driver panicked"),
        Err(_) => tracing::warn!("Session driver did not stop in time"),
    }

    tracing::info!("Trade Tape stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &TapeConfig) {
    tracing::info!(
        feed_url = %config.feed.url,
        product_id = %config.feed.product_id,
        max_trades = config.ledger.max_trades,
        http_port = config.server.http_port,
        "Configuration loaded"
    );
    tracing::debug!(
        reconnect_attempts = config.feed.reconnect_attempts,
        reconnect_interval_ms = config.feed.reconnect_interval.as_millis(),
        reconnect_jitter = config.feed.reconnect_jitter,
        "Reconnect policy"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
