//! Trade Feed Codec
//!
//! Decodes inbound text frames into [`FeedMessage`] and encodes outbound
//! subscription requests.
//!
//! Classification looks at the `feed` field first (data messages), then at
//! `event` (control messages). Valid JSON that matches neither is
//! [`FeedMessage::Unrecognized`]; invalid JSON or a known tag with a body that
//! does not fit its schema is a [`CodecError`].

use serde_json::Value;

use super::messages::{
    EventMessage, FeedMessage, HEARTBEAT_FEED, HeartbeatMessage, SubscriptionRequest, TRADE_FEED,
    TRADE_SNAPSHOT_FEED, TradeMessage, TradeSnapshotMessage,
};
use crate::domain::subscription::SubscriptionIntent;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload is JSON but not an object.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for the trade feed.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object or a tagged message
    /// does not match its schema.
    pub fn decode(&self, text: &str) -> Result<FeedMessage, CodecError> {
        let value: Value = serde_json::from_str(text.trim())?;

        if !value.is_object() {
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {}",
                preview(text)
            )));
        }

        let feed = value.get("feed").and_then(Value::as_str);
        let has_event = value.get("event").is_some();

        let message = match feed {
            Some(TRADE_SNAPSHOT_FEED) if !has_event => {
                let m: TradeSnapshotMessage = serde_json::from_value(value)?;
                FeedMessage::TradeSnapshot(m)
            }
            Some(TRADE_FEED) if !has_event => {
                let m: TradeMessage = serde_json::from_value(value)?;
                FeedMessage::Trade(m)
            }
            Some(HEARTBEAT_FEED) if !has_event => {
                let m: HeartbeatMessage = serde_json::from_value(value)?;
                FeedMessage::Heartbeat(m)
            }
            _ if has_event => {
                let m: EventMessage = serde_json::from_value(value)?;
                FeedMessage::Event(m)
            }
            _ => FeedMessage::Unrecognized,
        };

        Ok(message)
    }

    /// Encode a subscription intent as a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode_intent(&self, intent: &SubscriptionIntent) -> Result<String, CodecError> {
        self.encode(&SubscriptionRequest::from(intent))
    }

    /// Encode a value to JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode<T: serde::Serialize>(&self, value: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(value)?)
    }
}

fn preview(text: &str) -> String {
    text.trim().chars().take(50).collect()
}
