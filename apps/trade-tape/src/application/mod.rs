//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for the transport and the receipt clock.
pub mod ports;

/// Dispatcher, session and driver.
pub mod services;
