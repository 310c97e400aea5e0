//! Trade Tape Configuration Settings
//!
//! Configuration types for the service, loaded from environment variables.
//! Every variable is optional; unset variables fall back to defaults, set but
//! unparseable ones are an error.

use std::str::FromStr;
use std::time::Duration;

use crate::domain::ledger::MAX_TRADES;
use crate::infrastructure::feed::{DEFAULT_FEED_URL, FeedClientConfig, ReconnectConfig};
use crate::infrastructure::feed::reconnect::{DEFAULT_INTERVAL, DEFAULT_MAX_ATTEMPTS};

/// Instrument observed at startup.
pub const DEFAULT_PRODUCT_ID: &str = "PI_XBTUSD";

/// Feed connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSettings {
    /// WebSocket URL of the trade feed.
    pub url: String,
    /// Instrument subscribed at startup.
    pub product_id: String,
    /// Consecutive reconnection attempts before going offline (0 = unlimited).
    pub reconnect_attempts: u32,
    /// Pause between reconnection attempts.
    pub reconnect_interval: Duration,
    /// Random spread applied to each pause, as a fraction of the interval.
    pub reconnect_jitter: f64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            product_id: DEFAULT_PRODUCT_ID.to_string(),
            reconnect_attempts: DEFAULT_MAX_ATTEMPTS,
            reconnect_interval: DEFAULT_INTERVAL,
            reconnect_jitter: 0.0,
        }
    }
}

impl FeedSettings {
    /// Client configuration for these settings.
    #[must_use]
    pub fn client_config(&self) -> FeedClientConfig {
        FeedClientConfig::new(self.url.clone()).with_reconnect(
            ReconnectConfig::fixed(self.reconnect_interval, self.reconnect_attempts)
                .with_jitter(self.reconnect_jitter),
        )
    }
}

/// Ledger settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSettings {
    /// Maximum number of trades kept.
    pub max_trades: usize,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            max_trades: MAX_TRADES,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSettings {
    /// HTTP port for ledger, control, health and metrics.
    pub http_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { http_port: 8083 }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TapeConfig {
    /// Feed connection settings.
    pub feed: FeedSettings,
    /// Ledger settings.
    pub ledger: LedgerSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl TapeConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an empty or unparseable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an empty or unparseable value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let feed = FeedSettings {
            url: parse_string(&lookup, "TRADE_TAPE_FEED_URL", defaults.feed.url)?,
            product_id: parse_string(
                &lookup,
                "TRADE_TAPE_PRODUCT_ID",
                defaults.feed.product_id,
            )?,
            reconnect_attempts: parse_value(
                &lookup,
                "TRADE_TAPE_RECONNECT_ATTEMPTS",
                defaults.feed.reconnect_attempts,
            )?,
            reconnect_interval: parse_value(
                &lookup,
                "TRADE_TAPE_RECONNECT_INTERVAL_MS",
                u64::try_from(defaults.feed.reconnect_interval.as_millis()).unwrap_or(u64::MAX),
            )
            .map(Duration::from_millis)?,
            reconnect_jitter: parse_value(
                &lookup,
                "TRADE_TAPE_RECONNECT_JITTER",
                defaults.feed.reconnect_jitter,
            )?,
        };
        if !(0.0..=1.0).contains(&feed.reconnect_jitter) {
            return Err(ConfigError::InvalidValue {
                key: "TRADE_TAPE_RECONNECT_JITTER".to_string(),
                value: feed.reconnect_jitter.to_string(),
            });
        }

        let ledger = LedgerSettings {
            max_trades: parse_value(
                &lookup,
                "TRADE_TAPE_MAX_TRADES",
                defaults.ledger.max_trades,
            )?,
        };
        if ledger.max_trades == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TRADE_TAPE_MAX_TRADES".to_string(),
                value: "0".to_string(),
            });
        }

        let server = ServerSettings {
            http_port: parse_value(&lookup, "TRADE_TAPE_HTTP_PORT", defaults.server.http_port)?,
        };

        Ok(Self {
            feed,
            ledger,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed.
    #[error("environment variable {key} has invalid value {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
    },
}

fn parse_string<F>(lookup: &F, key: &str, default: String) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) if value.trim().is_empty() => Err(ConfigError::EmptyValue(key.to_string())),
        Some(value) => Ok(value.trim().to_string()),
    }
}

fn parse_value<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key).map_or(Ok(default), |value| {
        value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        })
    })
}
