//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Feed**: inbound frames, connection state, reconnects
//! - **Dispatch**: classification outcomes and trades offered to merges
//! - **Ledger**: current size and merge latency
//! - **Subscription**: intents sent, failed intents, instrument changes
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the HTTP port. Recording before
//! [`init_metrics`] is a no-op.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::subscription::IntentAction;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first one.
///
/// # Errors
///
/// Returns an error if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Feed
    describe_counter!(
        "trade_tape_frames_received_total",
        "Total text frames received from the trade feed"
    );
    describe_gauge!(
        "trade_tape_feed_connected",
        "1 while the trade feed connection is open"
    );
    describe_counter!(
        "trade_tape_reconnects_total",
        "Total trade feed reconnection attempts"
    );

    // Dispatch
    describe_counter!(
        "trade_tape_dispatch_total",
        "Inbound payloads by dispatch outcome"
    );
    describe_counter!(
        "trade_tape_trades_offered_total",
        "Trade records offered to a ledger merge, duplicates included"
    );

    // Ledger
    describe_gauge!("trade_tape_ledger_size", "Trades currently in the ledger");
    describe_histogram!(
        "trade_tape_merge_seconds",
        "Time spent merging a batch into the ledger"
    );

    // Subscription
    describe_counter!(
        "trade_tape_intents_sent_total",
        "Subscribe/unsubscribe intents handed to the transport"
    );
    describe_counter!(
        "trade_tape_intents_failed_total",
        "Intents the transport could not accept"
    );
    describe_counter!(
        "trade_tape_instrument_changes_total",
        "Instrument change signals that reset the ledger"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for dispatch outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchLabel {
    /// Trades merged into the ledger.
    Merged,
    /// Trade for an instrument other than the current one.
    Foreign,
    /// Control message, heartbeat or unknown payload.
    Ignored,
    /// Payload that failed to decode.
    Malformed,
}

impl DispatchLabel {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Merged => "merged",
            Self::Foreign => "foreign",
            Self::Ignored => "ignored",
            Self::Malformed => "malformed",
        }
    }
}

/// Record a text frame received from the feed.
pub fn record_frame_received() {
    counter!("trade_tape_frames_received_total").increment(1);
}

/// Update the feed connection gauge.
pub fn set_feed_connected(connected: bool) {
    gauge!("trade_tape_feed_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Record a reconnection attempt.
pub fn record_reconnect() {
    counter!("trade_tape_reconnects_total").increment(1);
}

/// Record a dispatch outcome.
pub fn record_dispatch(label: DispatchLabel) {
    counter!("trade_tape_dispatch_total", "outcome" => label.as_str()).increment(1);
}

/// Record trade records offered to a merge.
pub fn record_trades_offered(count: usize) {
    counter!("trade_tape_trades_offered_total").increment(count as u64);
}

/// Update the ledger size gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_ledger_size(size: usize) {
    gauge!("trade_tape_ledger_size").set(size as f64);
}

/// Record merge duration.
pub fn record_merge_duration(duration: Duration) {
    histogram!("trade_tape_merge_seconds").record(duration.as_secs_f64());
}

/// Record an intent handed to the transport.
pub fn record_intent_sent(action: IntentAction) {
    counter!("trade_tape_intents_sent_total", "action" => action.as_str()).increment(1);
}

/// Record an intent the transport rejected.
pub fn record_intent_failed(action: IntentAction) {
    counter!("trade_tape_intents_failed_total", "action" => action.as_str()).increment(1);
}

/// Record an instrument change.
pub fn record_instrument_change() {
    counter!("trade_tape_instrument_changes_total").increment(1);
}

// =============================================================================
// Tests
// =============================================================================
