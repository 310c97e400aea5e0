//! Channel-backed [`IntentSink`].
//!
//! Encodes intents into wire frames and queues them for the [`FeedClient`]
//! without blocking. The queue is unbounded: once the controller has moved
//! to a new instrument its intents must reach the transport. Closing cancels
//! the client's token.
//!
//! [`FeedClient`]: super::client::FeedClient

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::client::OutboundFrame;
use super::codec::JsonCodec;
use crate::application::ports::{IntentSink, PortError};
use crate::domain::subscription::SubscriptionIntent;

/// Queues encoded intents for the feed client.
#[derive(Debug)]
pub struct ChannelIntentSink {
    codec: JsonCodec,
    outbound_tx: mpsc::UnboundedSender<OutboundFrame>,
    cancel: CancellationToken,
}

impl ChannelIntentSink {
    /// Create a sink writing to `outbound_tx` and cancelling `cancel` on close.
    #[must_use]
    pub const fn new(
        outbound_tx: mpsc::UnboundedSender<OutboundFrame>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            codec: JsonCodec::new(),
            outbound_tx,
            cancel,
        }
    }
}

impl IntentSink for ChannelIntentSink {
    fn send(&mut self, intent: &SubscriptionIntent, connection: u64) -> Result<(), PortError> {
        if self.cancel.is_cancelled() {
            return Err(PortError::Closed);
        }

        let text = self
            .codec
            .encode_intent(intent)
            .map_err(|e| PortError::Encode(e.to_string()))?;

        self.outbound_tx
            .send(OutboundFrame::new(connection, text))
            .map_err(|_| PortError::Closed)
    }

    fn close(&mut self) {
        self.cancel.cancel();
    }
}
