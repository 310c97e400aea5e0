//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `MessageDispatcher`: classifies feed payloads and merges accepted trades
//! - `TradeSession`: owns the ledger and the subscription, reacts to signals
//! - `SessionDriver`: single-writer event loop feeding a session

pub mod dispatcher;
pub mod driver;
pub mod session;

pub use dispatcher::{DispatchOutcome, DropReason, MergeSource, MessageDispatcher};
pub use driver::{CommandError, SessionCommand, SessionDriver, SessionHandle};
pub use session::{LedgerSnapshot, SessionStatus, TradeSession};
