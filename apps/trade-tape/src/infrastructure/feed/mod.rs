//! Trade Feed Adapter
//!
//! WebSocket integration with the trade feed:
//!
//! - `messages`: wire types for data, control and outbound frames
//! - `codec`: JSON decoding and classification of inbound frames
//! - `reconnect`: fixed-interval, bounded reconnection policy
//! - `client`: socket lifecycle producing [`FeedEvent`]s
//! - `sink`: channel-backed [`IntentSink`](crate::application::ports::IntentSink)

pub mod client;
pub mod codec;
pub mod messages;
pub mod reconnect;
pub mod sink;

pub use client::{
    DEFAULT_FEED_URL, FeedClient, FeedClientConfig, FeedClientError, FeedEvent, OutboundFrame,
};
pub use codec::{CodecError, JsonCodec};
pub use messages::FeedMessage;
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use sink::ChannelIntentSink;
