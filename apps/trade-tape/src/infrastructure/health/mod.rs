//! HTTP Surface: Ledger, Control, Health and Metrics
//!
//! Serves the ledger to the display, accepts the two external signals and
//! reports health to orchestrators and monitoring.
//!
//! # Endpoints
//!
//! - `GET /ledger` - current ledger as `{"instrument": ..., "trades": [...]}`
//! - `POST /instrument` - switch instrument, body `{"product_id": "PI_ETHUSD"}`;
//!   `409` once the session is offline
//! - `POST /kill` - close the feed for good
//! - `GET /health` - JSON health status
//! - `GET /healthz` - liveness probe (simple OK)
//! - `GET /readyz` - readiness probe (feed connection open)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{CommandError, LedgerSnapshot, SessionHandle, SessionStatus};
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Feed state.
    pub feed: FeedInfo,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Feed live.
    Healthy,
    /// Feed connecting or reconnecting.
    Degraded,
    /// Feed offline for good.
    Unhealthy,
}

impl From<SessionStatus> for HealthStatus {
    fn from(status: SessionStatus) -> Self {
        match status {
            SessionStatus::Live => Self::Healthy,
            SessionStatus::Connecting | SessionStatus::Reconnecting => Self::Degraded,
            SessionStatus::Offline => Self::Unhealthy,
        }
    }
}

/// Feed state as reported by `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct FeedInfo {
    /// Session status.
    pub status: SessionStatus,
    /// Instrument being observed.
    pub instrument: String,
    /// Trades currently in the ledger.
    pub trades: usize,
}

/// Body of `POST /instrument`.
#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentRequest {
    /// Instrument to switch to.
    pub product_id: String,
}

/// Reply to accepted control requests.
#[derive(Debug, Clone, Serialize)]
struct Accepted {
    accepted: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    instrument: Option<String>,
}

/// Error reply.
#[derive(Debug, Clone, Serialize)]
struct ErrorBody {
    error: String,
}

// =============================================================================
// Server State
// =============================================================================

/// Shared state for the HTTP server.
pub struct HttpServerState {
    version: String,
    started_at: Instant,
    session: SessionHandle,
}

impl HttpServerState {
    /// Create new server state around a session handle.
    #[must_use]
    pub fn new(version: impl Into<String>, session: SessionHandle) -> Self {
        Self {
            version: version.into(),
            started_at: Instant::now(),
            session,
        }
    }
}

/// Build the router; exposed for in-process tests.
pub fn router(state: Arc<HttpServerState>) -> Router {
    Router::new()
        .route("/ledger", get(ledger_handler))
        .route("/instrument", post(instrument_handler))
        .route("/kill", post(kill_handler))
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Server
// =============================================================================

/// HTTP server for the display, control and probes.
pub struct HttpServer {
    port: u16,
    state: Arc<HttpServerState>,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a new HTTP server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HttpServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError` if binding fails or the server encounters a
    /// fatal error while running.
    pub async fn run(self) -> Result<(), HttpServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HttpServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn ledger_handler(State(state): State<Arc<HttpServerState>>) -> Json<LedgerSnapshot> {
    Json(state.session.ledger())
}

async fn instrument_handler(
    State(state): State<Arc<HttpServerState>>,
    Json(request): Json<InstrumentRequest>,
) -> impl IntoResponse {
    match state.session.change_instrument(&request.product_id).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(Accepted {
                accepted: "instrument",
                instrument: Some(request.product_id.trim().to_string()),
            }),
        )
            .into_response(),
        Err(e) => command_error(&e).into_response(),
    }
}

async fn kill_handler(State(state): State<Arc<HttpServerState>>) -> impl IntoResponse {
    match state.session.kill().await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(Accepted {
                accepted: "kill",
                instrument: None,
            }),
        )
            .into_response(),
        Err(e) => command_error(&e).into_response(),
    }
}

fn command_error(error: &CommandError) -> (StatusCode, Json<ErrorBody>) {
    let status = match error {
        CommandError::EmptyInstrument => StatusCode::BAD_REQUEST,
        CommandError::Offline => StatusCode::CONFLICT,
        CommandError::Stopped => StatusCode::SERVICE_UNAVAILABLE,
    };
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
        }),
    )
}

async fn health_handler(State(state): State<Arc<HttpServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HttpServerState>>) -> impl IntoResponse {
    if state.session.status() == SessionStatus::Live {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

fn build_health_response(state: &HttpServerState) -> HealthResponse {
    let status = state.session.status();
    let snapshot = state.session.ledger();

    HealthResponse {
        status: status.into(),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        feed: FeedInfo {
            status,
            instrument: snapshot.instrument,
            trades: snapshot.ledger.len(),
        },
    }
}

// =============================================================================
// Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn health_follows_session_status() {
        assert_eq!(HealthStatus::from(SessionStatus::Live), HealthStatus::Healthy);
        assert_eq!(
            HealthStatus::from(SessionStatus::Connecting),
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthStatus::from(SessionStatus::Reconnecting),
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthStatus::from(SessionStatus::Offline),
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn command_errors_map_to_status_codes() {
        assert_eq!(
            command_error(&CommandError::EmptyInstrument).0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            command_error(&CommandError::Offline).0,
            StatusCode::CONFLICT
        );
        assert_eq!(
            command_error(&CommandError::Stopped).0,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
