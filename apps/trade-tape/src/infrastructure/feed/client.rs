//! Trade Feed WebSocket Client
//!
//! Owns the socket to the trade feed and turns it into a stream of
//! [`FeedEvent`]s. Outbound frames arrive on an mpsc channel fed by
//! [`ChannelIntentSink`](super::sink::ChannelIntentSink), each addressed to
//! the connection it was issued for.
//!
//! # Stream URL
//!
//! - Production: `wss://www.cryptofacilities.com/ws/v1`
//!
//! # Lifecycle
//!
//! Successful connects are numbered from `1` and each reports exactly one
//! [`FeedEvent::Opened`], so a consumer counting those events knows the
//! current number. Outbound frames addressed to any other connection are
//! dropped: the server behind a new socket holds no subscription state from
//! the old one. Every loss reports
//! [`FeedEvent::Closed`]; `will_retry` is `false` exactly once, when the
//! client stops for good (cancellation or exhausted retry budget).

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::infrastructure::metrics;

/// Default trade feed endpoint.
pub const DEFAULT_FEED_URL: &str = "wss://www.cryptofacilities.com/ws/v1";

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the feed client.
#[derive(Debug, thiserror::Error)]
pub enum FeedClientError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Event receiver dropped.
    #[error("event channel closed")]
    ChannelSend,

    /// Retry budget spent.
    #[error("maximum reconnection attempts ({0}) exceeded")]
    MaxReconnectAttemptsExceeded(u32),

    /// Connection closed by the server.
    #[error("connection closed")]
    ConnectionClosed,
}

// =============================================================================
// Feed Events
// =============================================================================

/// Transport events delivered to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// A fresh connection is open.
    Opened,
    /// A text frame arrived.
    Message(String),
    /// The connection is gone.
    Closed {
        /// Whether the client will attempt to reconnect.
        will_retry: bool,
    },
}

/// Encoded frame queued for the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    /// Connection number the frame was issued for.
    pub connection: u64,
    /// Text payload.
    pub text: String,
}

impl OutboundFrame {
    /// Create a frame addressed to `connection`.
    #[must_use]
    pub fn new(connection: u64, text: impl Into<String>) -> Self {
        Self {
            connection,
            text: text.into(),
        }
    }
}

// =============================================================================
// Client Configuration
// =============================================================================

/// Configuration for the feed client.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedClientConfig {
    /// WebSocket URL.
    pub url: String,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
}

impl FeedClientConfig {
    /// Create a new configuration with the default reconnect policy.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Replace the reconnect policy.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }
}

impl Default for FeedClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_URL)
    }
}

// =============================================================================
// Feed Client
// =============================================================================

/// How a single connection ended.
enum Ending {
    /// Cancelled or outbound side dropped; stop without retrying.
    Stop,
    /// Connection lost after it was opened.
    Lost(FeedClientError),
    /// Connect attempt failed before opening.
    Failed(FeedClientError),
}

/// WebSocket client for the trade feed.
///
/// Manages the connection lifecycle including:
/// - Forwarding text frames as [`FeedEvent::Message`]
/// - Answering pings
/// - Fixed-interval reconnection with a bounded budget
/// - Closing the socket on cancellation
pub struct FeedClient {
    config: FeedClientConfig,
    event_tx: mpsc::Sender<FeedEvent>,
    outbound_rx: mpsc::UnboundedReceiver<OutboundFrame>,
    cancel: CancellationToken,
    connection: u64,
}

impl FeedClient {
    /// Create a new feed client.
    #[must_use]
    pub fn new(
        config: FeedClientConfig,
        event_tx: mpsc::Sender<FeedEvent>,
        outbound_rx: mpsc::UnboundedReceiver<OutboundFrame>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            event_tx,
            outbound_rx,
            cancel,
            connection: 0,
        }
    }

    /// Run the connection loop until cancelled or the retry budget is spent.
    ///
    /// # Errors
    ///
    /// Returns [`FeedClientError::MaxReconnectAttemptsExceeded`] when the
    /// budget runs out, or [`FeedClientError::ChannelSend`] when the event
    /// receiver is gone.
    pub async fn run(mut self) -> Result<(), FeedClientError> {
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Feed client cancelled");
                self.emit(FeedEvent::Closed { will_retry: false }).await?;
                return Ok(());
            }

            let error = match self.connect_and_run(&mut policy).await? {
                Ending::Stop => {
                    tracing::info!("Feed client stopped");
                    metrics::set_feed_connected(false);
                    self.emit(FeedEvent::Closed { will_retry: false }).await?;
                    return Ok(());
                }
                Ending::Lost(e) => {
                    metrics::set_feed_connected(false);
                    e
                }
                Ending::Failed(e) => e,
            };

            tracing::warn!(error = %error, "Trade feed connection error");

            let Some(delay) = policy.next_delay() else {
                let attempts = policy.max_attempts();
                tracing::error!(attempts, "Giving up on trade feed");
                self.emit(FeedEvent::Closed { will_retry: false }).await?;
                return Err(FeedClientError::MaxReconnectAttemptsExceeded(attempts));
            };

            self.emit(FeedEvent::Closed { will_retry: true }).await?;
            metrics::record_reconnect();
            tracing::info!(
                attempt = policy.attempt_count(),
                delay_ms = delay.as_millis(),
                "Reconnecting to trade feed"
            );

            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::info!("Feed client cancelled during reconnect delay");
                    self.emit(FeedEvent::Closed { will_retry: false }).await?;
                    return Ok(());
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Connect once and pump frames until the connection ends.
    async fn connect_and_run(
        &mut self,
        policy: &mut ReconnectPolicy,
    ) -> Result<Ending, FeedClientError> {
        tracing::info!(url = %self.config.url, "Connecting to trade feed");

        let connect = tokio::select! {
            () = self.cancel.cancelled() => return Ok(Ending::Stop),
            result = tokio_tungstenite::connect_async(self.config.url.as_str()) => result,
        };
        let (ws_stream, _response) = match connect {
            Ok(ok) => ok,
            Err(e) => return Ok(Ending::Failed(e.into())),
        };

        let (mut write, mut read) = ws_stream.split();

        self.connection += 1;
        policy.reset();
        metrics::set_feed_connected(true);
        tracing::info!(connection = self.connection, "Trade feed connected");
        self.emit(FeedEvent::Opened).await?;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(Ending::Stop);
                }
                outbound = self.outbound_rx.recv() => {
                    let Some(frame) = outbound else {
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(Ending::Stop);
                    };
                    if frame.connection != self.connection {
                        tracing::debug!(
                            frame = %frame.text,
                            addressed = frame.connection,
                            current = self.connection,
                            "Dropping frame for another connection"
                        );
                        continue;
                    }
                    tracing::debug!(frame = %frame.text, "Sending frame");
                    if let Err(e) = write.send(Message::Text(frame.text.into())).await {
                        return Ok(Ending::Lost(e.into()));
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            metrics::record_frame_received();
                            self.emit(FeedEvent::Message(text.as_str().to_owned())).await?;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                return Ok(Ending::Lost(e.into()));
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(?frame, "Server sent close frame");
                            return Ok(Ending::Lost(FeedClientError::ConnectionClosed));
                        }
                        Some(Ok(_)) => {
                            // Binary, pong and raw frames carry nothing for us
                        }
                        Some(Err(e)) => return Ok(Ending::Lost(e.into())),
                        None => {
                            tracing::info!("WebSocket stream ended");
                            return Ok(Ending::Lost(FeedClientError::ConnectionClosed));
                        }
                    }
                }
            }
        }
    }

    async fn emit(&self, event: FeedEvent) -> Result<(), FeedClientError> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| FeedClientError::ChannelSend)
    }
}
