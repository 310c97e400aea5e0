//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`IntentSink`]: hands subscribe/unsubscribe intents to the transport and
//!   closes it on kill
//! - [`ReceiptClock`]: local receipt time for trades the feed does not stamp

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::domain::subscription::SubscriptionIntent;

// =============================================================================
// Intent Sink
// =============================================================================

/// Errors raised by outbound ports.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    /// The transport is gone.
    #[error("transport closed")]
    Closed,

    /// The intent could not be encoded.
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Outbound side of the transport.
///
/// Implementations must not block: the session calls them from its event loop.
#[cfg_attr(test, mockall::automock)]
pub trait IntentSink: Send {
    /// Queue an intent for connection number `connection`.
    ///
    /// Connections are counted from `1` in open order. The transport discards
    /// intents addressed to a connection other than the one it holds.
    ///
    /// # Errors
    ///
    /// Returns [`PortError`] if the intent cannot be queued.
    fn send(&mut self, intent: &SubscriptionIntent, connection: u64) -> Result<(), PortError>;

    /// Close the connection and stop reconnecting. Must be idempotent.
    fn close(&mut self);
}

// =============================================================================
// Receipt Clock
// =============================================================================

/// Source of local receipt timestamps in epoch milliseconds.
pub trait ReceiptClock: Send {
    /// Current time in epoch milliseconds.
    fn now_millis(&self) -> i64;
}

/// Wall clock backed by `chrono::Utc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl ReceiptClock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually driven clock for tests and replays.
///
/// Clones share the same instant.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    /// Clock frozen at `millis`.
    #[must_use]
    pub fn at(millis: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(millis)),
        }
    }

    /// Move the clock to `millis`.
    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }

    /// Move the clock forward by `millis`.
    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl ReceiptClock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
