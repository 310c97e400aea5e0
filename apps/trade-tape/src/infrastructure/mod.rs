//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Trade feed WebSocket adapter (wire types, codec, client, intent sink).
pub mod feed;

/// Configuration loading.
pub mod config;

/// HTTP surface: ledger, control signals, health probes and metrics.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Logging and OpenTelemetry tracing integration.
pub mod telemetry;
