#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Trade Tape - Recent Trades Ledger
//!
//! Keeps a bounded, deduplicated, newest-first ledger of recent trades for a
//! single instrument fed by a WebSocket push stream, and follows instrument
//! switches and reconnects without mixing data across instruments.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: pure data and state machines
//!   - `ledger`: bounded trade ledger and its merge
//!   - `subscription`: subscribe/unsubscribe lifecycle across reconnects
//!
//! - **Application**: use cases and port definitions
//!   - `ports`: intent sink and receipt clock
//!   - `services`: dispatcher, session, single-writer driver
//!
//! - **Infrastructure**: adapters and external integrations
//!   - `feed`: WebSocket client, codec and wire types
//!   - `config`: environment configuration
//!   - `health`: HTTP surface for the display, control and probes
//!   - `metrics`, `telemetry`: observability
//!
//! # Data Flow
//!
//! ```text
//!                 FeedEvent             dispatch            watch
//! Trade feed WS ────────────► Driver ───────────► Session ─────────► GET /ledger
//!       ▲                       ▲                    │
//!       └──── intents ──────────┼────────────────────┘
//!                               └──── POST /instrument, POST /kill
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Ledger and subscription state with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::ledger::{Ledger, MAX_TRADES, TradeIdentity, TradeRecord, TradeSide};
pub use domain::subscription::{
    CloseKind, IntentAction, SubscriptionController, SubscriptionIntent, SubscriptionPhase,
};

// Ports
pub use application::ports::{IntentSink, ManualClock, PortError, ReceiptClock, SystemClock};

// Services
pub use application::services::{
    CommandError, DispatchOutcome, DropReason, LedgerSnapshot, MergeSource, MessageDispatcher,
    SessionCommand, SessionDriver, SessionHandle, SessionStatus, TradeSession,
};

// Feed adapter
pub use infrastructure::feed::{
    ChannelIntentSink, CodecError, FeedClient, FeedClientConfig, FeedClientError, FeedEvent,
    JsonCodec, OutboundFrame, ReconnectConfig,
};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, FeedSettings, LedgerSettings, ServerSettings, TapeConfig,
};

// HTTP server
pub use infrastructure::health::{HttpServer, HttpServerError, HttpServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
