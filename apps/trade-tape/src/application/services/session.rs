//! Trade Session
//!
//! Lifecycle coordinator for one observed instrument. A [`TradeSession`] owns
//! the [`SubscriptionController`] and the [`Ledger`], reacts to transport
//! events and external signals, and publishes every ledger change on a watch
//! channel.
//!
//! # Guarantees
//!
//! - An instrument change empties the ledger before any intent for the new
//!   instrument is handed to the transport.
//! - Incremental trades are filtered by the controller's current instrument.
//! - Kill is a one-way latch: the transport is closed once and nothing is
//!   subscribed afterwards.

use serde::Serialize;
use tokio::sync::watch;

use super::dispatcher::{DispatchOutcome, MessageDispatcher};
use crate::application::ports::{IntentSink, ReceiptClock, SystemClock};
use crate::domain::ledger::{Ledger, MAX_TRADES};
use crate::domain::subscription::{CloseKind, SubscriptionController, SubscriptionIntent};
use crate::infrastructure::feed::FeedEvent;
use crate::infrastructure::metrics;

// =============================================================================
// Published State
// =============================================================================

/// Connection status as seen by the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Waiting for the first connection.
    Connecting,
    /// Connection open.
    Live,
    /// Connection lost, transport retrying.
    Reconnecting,
    /// Killed or out of retries; nothing more will happen.
    Offline,
}

impl SessionStatus {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Live => "live",
            Self::Reconnecting => "reconnecting",
            Self::Offline => "offline",
        }
    }
}

/// Read-only view of the ledger handed to the display.
///
/// Serializes as `{"instrument": "...", "trades": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerSnapshot {
    /// Instrument the trades belong to.
    pub instrument: String,
    /// Trades, newest first.
    #[serde(flatten)]
    pub ledger: Ledger,
}

// =============================================================================
// Session
// =============================================================================

/// Owns the subscription and the ledger for one stream.
pub struct TradeSession<S, C = SystemClock> {
    controller: SubscriptionController,
    ledger: Ledger,
    dispatcher: MessageDispatcher<C>,
    sink: S,
    ledger_tx: watch::Sender<LedgerSnapshot>,
    status_tx: watch::Sender<SessionStatus>,
}

impl<S: IntentSink> TradeSession<S, SystemClock> {
    /// Session for `instrument` with the default capacity and wall-clock stamps.
    #[must_use]
    pub fn new(instrument: impl Into<String>, sink: S) -> Self {
        Self::with_dispatcher(instrument, MAX_TRADES, sink, MessageDispatcher::new())
    }
}

impl<S: IntentSink, C: ReceiptClock> TradeSession<S, C> {
    /// Session with an explicit ledger capacity and dispatcher.
    #[must_use]
    pub fn with_dispatcher(
        instrument: impl Into<String>,
        capacity: usize,
        sink: S,
        dispatcher: MessageDispatcher<C>,
    ) -> Self {
        let controller = SubscriptionController::new(instrument);
        let ledger = Ledger::with_capacity(capacity);
        let (ledger_tx, _) = watch::channel(LedgerSnapshot {
            instrument: controller.target_instrument().to_string(),
            ledger: ledger.clone(),
        });
        let (status_tx, _) = watch::channel(SessionStatus::Connecting);

        Self {
            controller,
            ledger,
            dispatcher,
            sink,
            ledger_tx,
            status_tx,
        }
    }

    // -------------------------------------------------------------------------
    // External signals
    // -------------------------------------------------------------------------

    /// Switch to `instrument`.
    ///
    /// Returns `false` when nothing changed (same target, or session killed).
    pub fn on_instrument_change(&mut self, instrument: &str) -> bool {
        if self.controller.is_offline() {
            tracing::info!(instrument, "Ignoring instrument change on a killed session");
            return false;
        }
        if instrument == self.controller.target_instrument() {
            return false;
        }

        tracing::info!(
            from = self.controller.target_instrument(),
            to = instrument,
            "Switching instrument"
        );
        metrics::record_instrument_change();

        let intents = self.controller.request_subscribe(instrument);
        self.ledger = self.ledger.reset();
        self.publish_ledger();
        self.forward(&intents);
        true
    }

    /// Close the transport and stop for good. Idempotent.
    ///
    /// Returns `true` only on the first call.
    pub fn kill(&mut self) -> bool {
        if !self.controller.kill() {
            return false;
        }

        tracing::info!(instrument = self.controller.current_instrument(), "Killing feed");
        self.sink.close();
        self.set_status(SessionStatus::Offline);
        true
    }

    // -------------------------------------------------------------------------
    // Transport events
    // -------------------------------------------------------------------------

    /// Route a transport event to the matching handler.
    pub fn handle_event(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::Opened => self.on_connection_open(),
            FeedEvent::Message(payload) => {
                let _ = self.on_message(&payload);
            }
            FeedEvent::Closed { will_retry } => self.on_connection_close(if will_retry {
                CloseKind::WillRetry
            } else {
                CloseKind::Terminal
            }),
        }
    }

    /// A fresh connection is open: (re)subscribe.
    pub fn on_connection_open(&mut self) {
        if self.controller.is_offline() {
            return;
        }

        // A switch requested while disconnected already reset the ledger.
        let deferred = self.controller.pending_instrument().is_some();
        let intents = self.controller.on_connection_open();
        if deferred {
            tracing::debug!(
                instrument = self.controller.current_instrument(),
                "Applied deferred switch"
            );
        }

        self.set_status(SessionStatus::Live);
        self.forward(&intents);
    }

    /// The connection closed. The ledger stays visible.
    pub fn on_connection_close(&mut self, kind: CloseKind) {
        self.controller.on_connection_close(kind);

        let status = if self.controller.is_offline() {
            SessionStatus::Offline
        } else {
            SessionStatus::Reconnecting
        };
        tracing::info!(?kind, status = status.as_str(), "Trade feed closed");
        self.set_status(status);
    }

    /// Dispatch one inbound payload.
    pub fn on_message(&mut self, payload: &str) -> DispatchOutcome {
        let current = self.controller.current_instrument().to_string();
        let outcome = self.dispatcher.dispatch(payload, &current, &self.ledger);

        match &outcome {
            DispatchOutcome::Merged { ledger, accepted, source } => {
                tracing::trace!(accepted, ?source, "Merged trades");
                if *ledger != self.ledger {
                    self.ledger = ledger.clone();
                    self.publish_ledger();
                }
                self.confirm(&current);
            }
            DispatchOutcome::Acknowledged => self.confirm(&current),
            DispatchOutcome::Dropped(_) => {}
        }

        outcome
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Current ledger.
    #[must_use]
    pub const fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Receiver for ledger snapshots.
    #[must_use]
    pub fn subscribe_ledger(&self) -> watch::Receiver<LedgerSnapshot> {
        self.ledger_tx.subscribe()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        *self.status_tx.borrow()
    }

    /// Receiver for status changes.
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    /// Subscription state.
    #[must_use]
    pub const fn controller(&self) -> &SubscriptionController {
        &self.controller
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn confirm(&mut self, instrument: &str) {
        if self.controller.confirm(instrument) {
            tracing::info!(instrument, "Subscription live");
        }
    }

    fn forward(&mut self, intents: &[SubscriptionIntent]) {
        let connection = self.controller.connection();
        for intent in intents {
            match self.sink.send(intent, connection) {
                Ok(()) => {
                    tracing::info!(
                        action = intent.action.as_str(),
                        instrument = %intent.instrument,
                        connection,
                        "Sent subscription intent"
                    );
                    metrics::record_intent_sent(intent.action);
                }
                Err(e) => {
                    tracing::warn!(
                        action = intent.action.as_str(),
                        instrument = %intent.instrument,
                        error = %e,
                        "Failed to send subscription intent"
                    );
                    metrics::record_intent_failed(intent.action);
                }
            }
        }
    }

    fn publish_ledger(&self) {
        metrics::set_ledger_size(self.ledger.len());
        self.ledger_tx.send_replace(LedgerSnapshot {
            instrument: self.controller.target_instrument().to_string(),
            ledger: self.ledger.clone(),
        });
    }

    fn set_status(&self, status: SessionStatus) {
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }
}

// =============================================================================
// Tests
// =============================================================================
