//! Trade Feed Message Types
//!
//! Wire format types for the trade feed WebSocket. Every inbound payload is a
//! single JSON object tagged either by a `feed` field (data) or an `event`
//! field (control).
//!
//! # Inbound
//!
//! ## Data (tagged by `feed`)
//! - `trade_snapshot`: recent trades delivered once after subscribing, oldest first
//! - `trade`: a single execution
//! - `heartbeat`: keep-alive
//!
//! ## Control (tagged by `event`)
//! - `info`: server greeting
//! - `subscribed` / `unsubscribed`: subscription acknowledgements
//! - `error`: request rejected
//!
//! # Outbound
//!
//! - [`SubscriptionRequest`]: `{"event":"subscribe","feed":"trade","product_ids":["PI_XBTUSD"]}`

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::ledger::{TradeRecord, TradeSide};
use crate::domain::subscription::SubscriptionIntent;

/// Feed name for the trade channel.
pub const TRADE_FEED: &str = "trade";

/// Feed name for the snapshot sent after subscribing.
pub const TRADE_SNAPSHOT_FEED: &str = "trade_snapshot";

/// Feed name for keep-alive messages.
pub const HEARTBEAT_FEED: &str = "heartbeat";

// =============================================================================
// Data Messages
// =============================================================================

/// A single trade as it appears on the wire.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "feed": "trade",
///   "product_id": "PI_XBTUSD",
///   "uid": "b5a1c239-7987-4207-96bf-02355a3263cf",
///   "side": "sell",
///   "type": "fill",
///   "seq": 85423,
///   "time": 1612269825817,
///   "qty": 2000.0,
///   "price": 33481.5
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeMessage {
    /// Feed name ("trade").
    #[serde(default)]
    pub feed: Option<String>,

    /// Instrument the trade belongs to.
    #[serde(default)]
    pub product_id: Option<String>,

    /// Exchange-assigned trade identifier.
    #[serde(default)]
    pub uid: Option<String>,

    /// Aggressor side.
    pub side: TradeSide,

    /// Fill type (e.g. "fill", "liquidation").
    #[serde(rename = "type", default)]
    pub trade_type: Option<String>,

    /// Exchange sequence number.
    #[serde(default)]
    pub seq: Option<u64>,

    /// Exchange timestamp in epoch milliseconds.
    #[serde(default)]
    pub time: Option<i64>,

    /// Executed quantity.
    pub qty: Decimal,

    /// Execution price.
    pub price: Decimal,
}

impl TradeMessage {
    /// Convert to a ledger record stamped with `observed_at`.
    #[must_use]
    pub const fn to_record(&self, observed_at: i64) -> TradeRecord {
        TradeRecord::new(self.price, self.qty, self.side, observed_at)
    }
}

/// Recent trades delivered right after subscribing, oldest first.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "feed": "trade_snapshot",
///   "product_id": "PI_XBTUSD",
///   "trades": [{"feed": "trade", "product_id": "PI_XBTUSD", "side": "buy", "qty": 1.0, "price": 100.0}]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeSnapshotMessage {
    /// Feed name ("`trade_snapshot`").
    pub feed: String,

    /// Instrument the snapshot belongs to.
    #[serde(default)]
    pub product_id: Option<String>,

    /// Trades, oldest first.
    #[serde(default)]
    pub trades: Vec<TradeMessage>,
}

/// Keep-alive message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatMessage {
    /// Feed name ("heartbeat").
    pub feed: String,

    /// Server time in epoch milliseconds.
    #[serde(default)]
    pub time: Option<i64>,
}

// =============================================================================
// Control Messages
// =============================================================================

/// Kind of control event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Server greeting after connect.
    Info,
    /// Subscription accepted.
    Subscribed,
    /// Unsubscription accepted.
    Unsubscribed,
    /// Subscribe request rejected.
    SubscribedFailed,
    /// Unsubscribe request rejected.
    UnsubscribedFailed,
    /// Generic error.
    Error,
    /// Anything this client does not know about.
    #[serde(other)]
    Other,
}

/// Control message tagged by `event`.
///
/// # Wire Format (JSON)
/// ```json
/// {"event": "subscribed", "feed": "trade", "product_ids": ["PI_XBTUSD"]}
/// {"event": "error", "message": "Invalid product id"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMessage {
    /// Event kind.
    pub event: EventKind,

    /// Feed the event refers to.
    #[serde(default)]
    pub feed: Option<String>,

    /// Instruments the event refers to.
    #[serde(default)]
    pub product_ids: Vec<String>,

    /// Human-readable message (errors).
    #[serde(default)]
    pub message: Option<String>,

    /// Protocol version (info).
    #[serde(default)]
    pub version: Option<i64>,
}

impl EventMessage {
    /// Whether this acknowledges a trade subscription for `instrument`.
    #[must_use]
    pub fn acknowledges(&self, instrument: &str) -> bool {
        self.event == EventKind::Subscribed
            && self.feed.as_deref() == Some(TRADE_FEED)
            && self.product_ids.iter().any(|id| id == instrument)
    }

    /// Whether this is an error-like event.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(
            self.event,
            EventKind::Error | EventKind::SubscribedFailed | EventKind::UnsubscribedFailed
        )
    }
}

// =============================================================================
// Unified Inbound Message
// =============================================================================

/// Any decoded inbound payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMessage {
    /// Snapshot of recent trades.
    TradeSnapshot(TradeSnapshotMessage),
    /// Single incremental trade.
    Trade(TradeMessage),
    /// Keep-alive.
    Heartbeat(HeartbeatMessage),
    /// Control event.
    Event(EventMessage),
    /// Well-formed JSON this client does not recognize.
    Unrecognized,
}

impl FeedMessage {
    /// Short label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TradeSnapshot(_) => "trade_snapshot",
            Self::Trade(_) => "trade",
            Self::Heartbeat(_) => "heartbeat",
            Self::Event(_) => "event",
            Self::Unrecognized => "unrecognized",
        }
    }
}

// =============================================================================
// Outbound Messages
// =============================================================================

/// Subscribe/unsubscribe request for the trade feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionRequest {
    /// "subscribe" or "unsubscribe".
    pub event: &'static str,

    /// Always "trade".
    pub feed: &'static str,

    /// Target instruments.
    pub product_ids: Vec<String>,
}

impl From<&SubscriptionIntent> for SubscriptionRequest {
    fn from(intent: &SubscriptionIntent) -> Self {
        Self {
            event: intent.action.as_str(),
            feed: TRADE_FEED,
            product_ids: vec![intent.instrument.clone()],
        }
    }
}
