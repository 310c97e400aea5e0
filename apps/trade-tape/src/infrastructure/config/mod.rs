//! Configuration Module
//!
//! Configuration loading for the trade tape service.

mod settings;

pub use settings::{
    ConfigError, DEFAULT_PRODUCT_ID, FeedSettings, LedgerSettings, ServerSettings, TapeConfig,
};
