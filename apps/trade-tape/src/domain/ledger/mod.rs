//! Trade Ledger
//!
//! Bounded, deduplicated, newest-first collection of recent trades for the
//! instrument currently being observed.
//!
//! # Invariants
//!
//! - `len() <= capacity()` at all times
//! - `observed_at` is non-increasing from front to back
//! - no two records share the same [`TradeIdentity`]
//!
//! A ledger is never mutated in place: [`Ledger::merge`] and [`Ledger::reset`]
//! return a new value and leave the receiver untouched.

use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Constants
// =============================================================================

/// Default number of trades a ledger keeps.
pub const MAX_TRADES: usize = 50;

// =============================================================================
// Trade Record
// =============================================================================

/// Aggressor side of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    /// Buyer lifted the offer.
    Buy,
    /// Seller hit the bid.
    Sell,
}

impl TradeSide {
    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

/// A single trade execution as held in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Execution price.
    pub price: Decimal,
    /// Executed quantity.
    pub quantity: Decimal,
    /// Aggressor side.
    pub side: TradeSide,
    /// Epoch milliseconds; the local receipt time when the feed omits it.
    pub observed_at: i64,
}

impl TradeRecord {
    /// Create a new trade record.
    #[must_use]
    pub const fn new(price: Decimal, quantity: Decimal, side: TradeSide, observed_at: i64) -> Self {
        Self {
            price,
            quantity,
            side,
            observed_at,
        }
    }

    /// Deduplication key for this record.
    #[must_use]
    pub const fn identity(&self) -> TradeIdentity {
        TradeIdentity {
            observed_at: self.observed_at,
            price: self.price,
            quantity: self.quantity,
            side: self.side,
        }
    }
}

/// Composite key identifying "the same event".
///
/// Decimal comparison is numeric, so `1.0` and `1.00` are the same price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TradeIdentity {
    observed_at: i64,
    price: Decimal,
    quantity: Decimal,
    side: TradeSide,
}

// =============================================================================
// Ledger
// =============================================================================

/// Capacity-bounded, newest-first trade ledger.
///
/// # Example
///
/// ```rust
/// use rust_decimal::Decimal;
/// use trade_tape::domain::ledger::{Ledger, TradeRecord, TradeSide};
///
/// let ledger = Ledger::new();
/// let trade = TradeRecord::new(Decimal::new(100, 0), Decimal::ONE, TradeSide::Buy, 1_000);
///
/// let ledger = ledger.merge(&[trade.clone(), trade.clone()]);
/// assert_eq!(ledger.len(), 1);
///
/// let ledger = ledger.reset();
/// assert!(ledger.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ledger {
    trades: Vec<TradeRecord>,
    #[serde(skip)]
    capacity: usize,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// Create an empty ledger holding at most [`MAX_TRADES`] trades.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_capacity(MAX_TRADES)
    }

    /// Create an empty ledger with a custom capacity.
    #[must_use]
    pub const fn with_capacity(capacity: usize) -> Self {
        Self {
            trades: Vec::new(),
            capacity,
        }
    }

    /// Merge `incoming` ahead of the current trades.
    ///
    /// Incoming records are placed in front of the existing ones, duplicate
    /// identities keep their first occurrence, the result is stably sorted
    /// newest first and truncated to capacity. Records sharing a timestamp
    /// keep their concatenated order.
    #[must_use]
    pub fn merge(&self, incoming: &[TradeRecord]) -> Self {
        let mut seen = HashSet::with_capacity(incoming.len() + self.trades.len());
        let mut trades: Vec<TradeRecord> = incoming
            .iter()
            .chain(self.trades.iter())
            .filter(|trade| seen.insert(trade.identity()))
            .cloned()
            .collect();

        trades.sort_by(|a, b| b.observed_at.cmp(&a.observed_at));
        trades.truncate(self.capacity);

        Self {
            trades,
            capacity: self.capacity,
        }
    }

    /// Empty ledger with the same capacity.
    #[must_use]
    pub const fn reset(&self) -> Self {
        Self::with_capacity(self.capacity)
    }

    /// Trades, newest first.
    #[must_use]
    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    /// Iterate trades, newest first.
    pub fn iter(&self) -> std::slice::Iter<'_, TradeRecord> {
        self.trades.iter()
    }

    /// Most recent trade, if any.
    #[must_use]
    pub fn latest(&self) -> Option<&TradeRecord> {
        self.trades.first()
    }

    /// Number of trades held.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.trades.len()
    }

    /// Whether the ledger holds no trades.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// Maximum number of trades held.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<'a> IntoIterator for &'a Ledger {
    type Item = &'a TradeRecord;
    type IntoIter = std::slice::Iter<'a, TradeRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.trades.iter()
    }
}

// =============================================================================
// Tests
// =============================================================================
