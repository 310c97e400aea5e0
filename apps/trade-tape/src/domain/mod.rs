//! Domain Layer - Trade ledger and subscription state.
//!
//! Pure types and state machines with no I/O. Everything here runs
//! synchronously inside a single callback and never blocks.

/// Bounded, deduplicated, newest-first trade ledger.
pub mod ledger;

/// Single-instrument subscription state machine.
pub mod subscription;
