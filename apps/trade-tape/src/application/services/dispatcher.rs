//! Message Dispatcher
//!
//! Classifies raw feed payloads and routes trade records into the ledger.
//!
//! # Classification
//!
//! 1. `trade_snapshot` with at least one trade: the whole batch, reversed and
//!    stamped once, merged regardless of its `product_id`
//! 2. `trade`: merged only when `product_id` equals the current instrument,
//!    stamped with the local receipt time
//! 3. anything else: no ledger change; a subscription ack for the current
//!    instrument is reported so the session can confirm it
//!
//! Malformed payloads are logged and dropped.

use std::time::Instant;

use crate::application::ports::{ReceiptClock, SystemClock};
use crate::domain::ledger::{Ledger, TradeRecord};
use crate::infrastructure::feed::codec::JsonCodec;
use crate::infrastructure::feed::messages::{
    EventMessage, FeedMessage, TradeMessage, TradeSnapshotMessage,
};
use crate::infrastructure::metrics::{self, DispatchLabel};

// =============================================================================
// Outcome
// =============================================================================

/// Which kind of payload produced a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeSource {
    /// Snapshot sent after subscribing.
    Snapshot,
    /// Single incremental trade.
    Incremental,
}

/// Why a payload left the ledger untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Trade tagged with an instrument other than the current one.
    Foreign,
    /// Control message, heartbeat, empty snapshot or unknown payload.
    Ignored,
    /// Payload failed to decode.
    Malformed,
}

/// Result of dispatching one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Trades were merged; `ledger` is the new value.
    Merged {
        /// Ledger after the merge.
        ledger: Ledger,
        /// Records offered to the merge.
        accepted: usize,
        /// Snapshot or incremental.
        source: MergeSource,
    },
    /// The feed acknowledged a subscription to the current instrument.
    Acknowledged,
    /// Nothing to do.
    Dropped(DropReason),
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Stateless classifier; the ledger and current instrument are passed in.
#[derive(Debug, Clone, Default)]
pub struct MessageDispatcher<C = SystemClock> {
    codec: JsonCodec,
    clock: C,
}

impl MessageDispatcher<SystemClock> {
    /// Dispatcher stamping trades with wall-clock time.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl<C: ReceiptClock> MessageDispatcher<C> {
    /// Dispatcher stamping trades with `clock`.
    #[must_use]
    pub const fn with_clock(clock: C) -> Self {
        Self {
            codec: JsonCodec::new(),
            clock,
        }
    }

    /// Classify `payload` and merge any accepted trades into `ledger`.
    pub fn dispatch(&self, payload: &str, current_instrument: &str, ledger: &Ledger) -> DispatchOutcome {
        let message = match self.codec.decode(payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed payload");
                metrics::record_dispatch(DispatchLabel::Malformed);
                return DispatchOutcome::Dropped(DropReason::Malformed);
            }
        };

        let outcome = match message {
            FeedMessage::TradeSnapshot(snapshot) => {
                self.on_snapshot(&snapshot, current_instrument, ledger)
            }
            FeedMessage::Trade(trade) => self.on_trade(&trade, current_instrument, ledger),
            FeedMessage::Event(event) => on_event(&event, current_instrument),
            FeedMessage::Heartbeat(_) | FeedMessage::Unrecognized => {
                DispatchOutcome::Dropped(DropReason::Ignored)
            }
        };

        metrics::record_dispatch(match &outcome {
            DispatchOutcome::Merged { .. } => DispatchLabel::Merged,
            DispatchOutcome::Dropped(DropReason::Foreign) => DispatchLabel::Foreign,
            DispatchOutcome::Dropped(DropReason::Malformed) => DispatchLabel::Malformed,
            DispatchOutcome::Acknowledged | DispatchOutcome::Dropped(DropReason::Ignored) => {
                DispatchLabel::Ignored
            }
        });

        outcome
    }

    fn on_snapshot(
        &self,
        snapshot: &TradeSnapshotMessage,
        current_instrument: &str,
        ledger: &Ledger,
    ) -> DispatchOutcome {
        if snapshot.trades.is_empty() {
            return DispatchOutcome::Dropped(DropReason::Ignored);
        }

        if let Some(product_id) = snapshot.product_id.as_deref()
            && product_id != current_instrument
        {
            tracing::debug!(
                product_id,
                current = current_instrument,
                "Snapshot tagged with another instrument"
            );
        }

        // Every record shares the batch receipt instant, wire `time` included,
        // so incremental and snapshot trades sort on one clock. The feed lists
        // oldest first.
        let receipt = self.clock.now_millis();
        let batch: Vec<TradeRecord> = snapshot
            .trades
            .iter()
            .rev()
            .map(|trade| trade.to_record(receipt))
            .collect();

        merge(ledger, &batch, MergeSource::Snapshot)
    }

    fn on_trade(&self, trade: &TradeMessage, current_instrument: &str, ledger: &Ledger) -> DispatchOutcome {
        if trade.product_id.as_deref() != Some(current_instrument) {
            tracing::debug!(
                product_id = ?trade.product_id,
                current = current_instrument,
                "Dropping trade for another instrument"
            );
            return DispatchOutcome::Dropped(DropReason::Foreign);
        }

        let record = trade.to_record(self.clock.now_millis());
        merge(ledger, std::slice::from_ref(&record), MergeSource::Incremental)
    }
}

fn on_event(event: &EventMessage, current_instrument: &str) -> DispatchOutcome {
    if event.is_error() {
        tracing::warn!(
            event = ?event.event,
            reason = event.message.as_deref().unwrap_or_default(),
            product_ids = ?event.product_ids,
            "Feed reported an error"
        );
    } else if event.acknowledges(current_instrument) {
        tracing::debug!(instrument = current_instrument, "Subscription acknowledged");
        return DispatchOutcome::Acknowledged;
    } else {
        tracing::debug!(event = ?event.event, "Ignoring control event");
    }

    DispatchOutcome::Dropped(DropReason::Ignored)
}

fn merge(ledger: &Ledger, batch: &[TradeRecord], source: MergeSource) -> DispatchOutcome {
    let started = Instant::now();
    let merged = ledger.merge(batch);
    metrics::record_merge_duration(started.elapsed());
    metrics::record_trades_offered(batch.len());

    DispatchOutcome::Merged {
        ledger: merged,
        accepted: batch.len(),
        source,
    }
}

// =============================================================================
// Tests
// =============================================================================
