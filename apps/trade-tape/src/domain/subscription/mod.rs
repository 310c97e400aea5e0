//! Subscription Controller
//!
//! Owns the single logical subscription to one instrument over one logical
//! stream connection and decides which subscribe/unsubscribe intents must be
//! sent upstream.
//!
//! # Design
//!
//! The upstream protocol has no reliable subscribe acknowledgement, so the
//! controller tracks the current instrument optimistically at request time.
//! It remembers which instrument a subscribe intent was issued for on the
//! current connection (`active`) and only ever unsubscribes that one.
//!
//! ```text
//!                 open                    confirm
//! Unsubscribed ─────────► Subscribing ─────────────► Subscribed
//!      ▲                       │   request_subscribe(x)   │
//!      └──────── close ────────┴──────────────────────────┘
//! ```
//!
//! A terminal close (kill signal or exhausted retries) latches the controller
//! offline: no further intents are produced.

// =============================================================================
// Types
// =============================================================================

/// An instrument identifier (e.g. `PI_XBTUSD`).
pub type Instrument = String;

/// Lifecycle phase of the upstream subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscriptionPhase {
    /// No subscription exists on the wire.
    #[default]
    Unsubscribed,
    /// Subscribe intent sent on a fresh connection, no data seen yet.
    Subscribing,
    /// Subscription considered live.
    Subscribed,
}

/// Direction of an upstream intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentAction {
    /// Start receiving trades for an instrument.
    Subscribe,
    /// Stop receiving trades for an instrument.
    Unsubscribe,
}

impl IntentAction {
    /// Wire name of the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
        }
    }
}

/// A subscribe or unsubscribe instruction for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionIntent {
    /// Subscribe or unsubscribe.
    pub action: IntentAction,
    /// Target instrument.
    pub instrument: Instrument,
}

impl SubscriptionIntent {
    /// Subscribe intent for `instrument`.
    #[must_use]
    pub fn subscribe(instrument: impl Into<Instrument>) -> Self {
        Self {
            action: IntentAction::Subscribe,
            instrument: instrument.into(),
        }
    }

    /// Unsubscribe intent for `instrument`.
    #[must_use]
    pub fn unsubscribe(instrument: impl Into<Instrument>) -> Self {
        Self {
            action: IntentAction::Unsubscribe,
            instrument: instrument.into(),
        }
    }
}

/// Why the connection closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    /// The transport will reconnect on its own.
    WillRetry,
    /// Kill signal or retry budget spent; nothing more will happen.
    Terminal,
}

// =============================================================================
// Controller
// =============================================================================

/// State machine for the single upstream trade subscription.
///
/// Every transition returns the intents that must be sent, in order.
///
/// # Example
///
/// ```rust
/// use trade_tape::domain::subscription::{SubscriptionController, SubscriptionIntent};
///
/// let mut controller = SubscriptionController::new("PI_XBTUSD");
///
/// let intents = controller.on_connection_open();
/// assert_eq!(intents, vec![SubscriptionIntent::subscribe("PI_XBTUSD")]);
///
/// let intents = controller.request_subscribe("PI_ETHUSD");
/// assert_eq!(
///     intents,
///     vec![
///         SubscriptionIntent::unsubscribe("PI_XBTUSD"),
///         SubscriptionIntent::subscribe("PI_ETHUSD"),
///     ]
/// );
/// ```
#[derive(Debug, Clone)]
pub struct SubscriptionController {
    current: Instrument,
    pending: Option<Instrument>,
    active: Option<Instrument>,
    connection_open: bool,
    phase: SubscriptionPhase,
    offline: bool,
    connection: u64,
}

impl SubscriptionController {
    /// Create a controller for the initial instrument. No connection yet.
    #[must_use]
    pub fn new(initial: impl Into<Instrument>) -> Self {
        Self {
            current: initial.into(),
            pending: None,
            active: None,
            connection_open: false,
            phase: SubscriptionPhase::Unsubscribed,
            offline: false,
            connection: 0,
        }
    }

    /// Redirect the subscription to `instrument`.
    ///
    /// With an open connection this emits `unsubscribe(previous)` (only when a
    /// subscribe intent for it was issued on this connection) followed by
    /// `subscribe(instrument)`. Without one, the request is parked and applied
    /// on the next [`on_connection_open`](Self::on_connection_open).
    pub fn request_subscribe(
        &mut self,
        instrument: impl Into<Instrument>,
    ) -> Vec<SubscriptionIntent> {
        if self.offline {
            return vec![];
        }

        let instrument = instrument.into();
        if !self.connection_open {
            self.pending = (instrument != self.current).then_some(instrument);
            return vec![];
        }

        if instrument == self.current && self.active.as_ref() == Some(&instrument) {
            return vec![];
        }

        let mut intents = Vec::with_capacity(2);
        if let Some(previous) = self.active.take()
            && previous != instrument
        {
            intents.push(SubscriptionIntent::unsubscribe(previous));
        }
        intents.push(SubscriptionIntent::subscribe(instrument.clone()));

        self.active = Some(instrument.clone());
        self.current = instrument;
        self.pending = None;
        self.phase = SubscriptionPhase::Subscribed;

        intents
    }

    /// A fresh connection is up: subscribe to the pending or current instrument.
    ///
    /// The server holds no subscription state for a new connection, so no
    /// unsubscribe is ever emitted here.
    pub fn on_connection_open(&mut self) -> Vec<SubscriptionIntent> {
        if self.offline {
            return vec![];
        }

        self.connection_open = true;
        self.connection += 1;
        if let Some(pending) = self.pending.take() {
            self.current = pending;
        }

        self.active = Some(self.current.clone());
        self.phase = SubscriptionPhase::Subscribing;

        vec![SubscriptionIntent::subscribe(self.current.clone())]
    }

    /// The connection is gone.
    ///
    /// The current instrument is kept for the next open unless the close is
    /// terminal, which latches the controller offline with no pending work.
    pub fn on_connection_close(&mut self, kind: CloseKind) {
        self.connection_open = false;
        self.active = None;
        self.phase = SubscriptionPhase::Unsubscribed;

        if kind == CloseKind::Terminal {
            self.offline = true;
            self.pending = None;
        }
    }

    /// Evidence that `instrument` is flowing (ack, snapshot or accepted trade).
    ///
    /// Returns `true` when this moved the phase to `Subscribed`.
    pub fn confirm(&mut self, instrument: &str) -> bool {
        if self.phase == SubscriptionPhase::Subscribing && self.active.as_deref() == Some(instrument)
        {
            self.phase = SubscriptionPhase::Subscribed;
            return true;
        }
        false
    }

    /// Latch the controller offline. Idempotent.
    ///
    /// Returns `true` only on the first call.
    pub fn kill(&mut self) -> bool {
        if self.offline {
            return false;
        }
        self.offline = true;
        self.pending = None;
        true
    }

    /// Instrument incoming trades must match.
    #[must_use]
    pub fn current_instrument(&self) -> &str {
        &self.current
    }

    /// Instrument parked until the next connection open.
    #[must_use]
    pub fn pending_instrument(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Instrument the controller is heading to: pending if any, else current.
    #[must_use]
    pub fn target_instrument(&self) -> &str {
        self.pending.as_deref().unwrap_or(&self.current)
    }

    /// Instrument with a subscribe intent issued on the current connection.
    #[must_use]
    pub fn active_instrument(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> SubscriptionPhase {
        self.phase
    }

    /// Whether the transport connection is open.
    #[must_use]
    pub const fn is_connection_open(&self) -> bool {
        self.connection_open
    }

    /// Number of connection opens seen so far; `0` before the first.
    ///
    /// Intents returned by a transition belong to this connection.
    #[must_use]
    pub const fn connection(&self) -> u64 {
        self.connection
    }

    /// Whether a terminal close or kill has latched the controller.
    #[must_use]
    pub const fn is_offline(&self) -> bool {
        self.offline
    }
}

// =============================================================================
// Tests
// =============================================================================
