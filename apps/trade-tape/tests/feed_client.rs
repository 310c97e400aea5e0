//! Feed Client Integration Tests
//!
//! Runs the client against an in-process WebSocket server on localhost.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use trade_tape::{
    ChannelIntentSink, FeedClient, FeedClientConfig, FeedClientError, FeedEvent, MAX_TRADES,
    MessageDispatcher, OutboundFrame, ReconnectConfig, SessionDriver, SessionStatus, TradeSession,
};

const WAIT: Duration = Duration::from_secs(5);

async fn local_listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

fn fast_config(url: &str, attempts: u32) -> FeedClientConfig {
    FeedClientConfig::new(url)
        .with_reconnect(ReconnectConfig::fixed(Duration::from_millis(10), attempts))
}

async fn next_event(rx: &mut mpsc::Receiver<FeedEvent>) -> FeedEvent {
    timeout(WAIT, rx.recv()).await.unwrap().unwrap()
}

async fn first_text<S>(ws: &mut tokio_tungstenite::WebSocketStream<S>) -> String
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return text.as_str().to_owned(),
            Some(Ok(_)) => {}
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_client_forwards_frames_both_ways() {
    let (listener, url) = local_listener().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::Text(r#"{"event":"info","version":1}"#.into()))
            .await
            .unwrap();

        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return text.as_str().to_owned(),
                Some(Ok(_)) => {}
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    });

    let (event_tx, mut event_rx) = mpsc::channel(16);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let client = FeedClient::new(fast_config(&url, 1), event_tx, outbound_rx, cancel.clone());
    let client_task = tokio::spawn(client.run());

    assert_eq!(next_event(&mut event_rx).await, FeedEvent::Opened);
    assert_eq!(
        next_event(&mut event_rx).await,
        FeedEvent::Message(r#"{"event":"info","version":1}"#.to_string())
    );

    outbound_tx.send(OutboundFrame::new(1, "hello")).unwrap();
    let received = timeout(WAIT, server).await.unwrap().unwrap();
    assert_eq!(received, "hello");

    cancel.cancel();
    let result = timeout(WAIT, client_task).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_client_gives_up_after_budget() {
    // Bind then drop so the port refuses connections.
    let (listener, url) = local_listener().await;
    drop(listener);

    let (event_tx, mut event_rx) = mpsc::channel(16);
    let (_outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let client = FeedClient::new(
        fast_config(&url, 2),
        event_tx,
        outbound_rx,
        CancellationToken::new(),
    );

    let result = timeout(WAIT, client.run()).await.unwrap();
    assert!(matches!(
        result,
        Err(FeedClientError::MaxReconnectAttemptsExceeded(2))
    ));

    let mut events = Vec::new();
    while let Ok(event) = event_rx.try_recv() {
        events.push(event);
    }
    assert_eq!(
        events,
        vec![
            FeedEvent::Closed { will_retry: true },
            FeedEvent::Closed { will_retry: true },
            FeedEvent::Closed { will_retry: false },
        ]
    );
}

#[tokio::test]
async fn test_stale_frames_are_dropped_on_connect() {
    let (listener, url) = local_listener().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        first_text(&mut ws).await
    });

    let (event_tx, mut event_rx) = mpsc::channel(16);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    outbound_tx.send(OutboundFrame::new(0, "stale")).unwrap();

    let cancel = CancellationToken::new();
    let client = FeedClient::new(fast_config(&url, 1), event_tx, outbound_rx, cancel.clone());
    tokio::spawn(client.run());

    assert_eq!(next_event(&mut event_rx).await, FeedEvent::Opened);
    outbound_tx.send(OutboundFrame::new(1, "fresh")).unwrap();

    let received = timeout(WAIT, server).await.unwrap().unwrap();
    assert_eq!(received, "fresh");
    cancel.cancel();
}

#[tokio::test]
async fn test_late_frames_for_previous_connection_are_dropped() {
    let (listener, url) = local_listener().await;

    let server = tokio::spawn(async move {
        // First connection is dropped right after the handshake.
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        drop(ws);

        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        first_text(&mut ws).await
    });

    let (event_tx, mut event_rx) = mpsc::channel(16);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let client = FeedClient::new(fast_config(&url, 3), event_tx, outbound_rx, cancel.clone());
    tokio::spawn(client.run());

    assert_eq!(next_event(&mut event_rx).await, FeedEvent::Opened);
    assert_eq!(
        next_event(&mut event_rx).await,
        FeedEvent::Closed { will_retry: true }
    );
    assert_eq!(next_event(&mut event_rx).await, FeedEvent::Opened);

    // Issued by a session that has not yet seen the second open.
    outbound_tx
        .send(OutboundFrame::new(1, "unsubscribe-old"))
        .unwrap();
    outbound_tx.send(OutboundFrame::new(2, "fresh")).unwrap();

    let received = timeout(WAIT, server).await.unwrap().unwrap();
    assert_eq!(received, "fresh");
    cancel.cancel();
}

#[tokio::test]
async fn test_session_subscribes_and_fills_ledger_end_to_end() {
    let (listener, url) = local_listener().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let subscribe = first_text(&mut ws).await;

        ws.send(Message::Text(
            r#"{"event":"subscribed","feed":"trade","product_ids":["PI_XBTUSD"]}"#.into(),
        ))
        .await
        .unwrap();
        ws.send(Message::Text(
            r#"{"feed":"trade_snapshot","product_id":"PI_XBTUSD","trades":[
                {"feed":"trade","product_id":"PI_XBTUSD","side":"buy","qty":5,"price":34000.5,"time":1612269825817},
                {"feed":"trade","product_id":"PI_XBTUSD","side":"sell","qty":2,"price":34001,"time":1612269825900}
            ]}"#
            .into(),
        ))
        .await
        .unwrap();

        // Hold the socket open until the client hangs up.
        while let Some(Ok(frame)) = ws.next().await {
            if frame.is_close() {
                break;
            }
        }
        subscribe
    });

    let shutdown = CancellationToken::new();
    let feed_token = shutdown.child_token();
    let (event_tx, event_rx) = mpsc::channel(64);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    let client = FeedClient::new(fast_config(&url, 1), event_tx, outbound_rx, feed_token.clone());
    let session = TradeSession::with_dispatcher(
        "PI_XBTUSD",
        MAX_TRADES,
        ChannelIntentSink::new(outbound_tx, feed_token),
        MessageDispatcher::new(),
    );
    let (driver, handle) = SessionDriver::new(session, event_rx, shutdown.clone());
    let driver_task = tokio::spawn(driver.run());
    tokio::spawn(client.run());

    let mut ledger = handle.watch_ledger();
    timeout(WAIT, ledger.wait_for(|snapshot| snapshot.ledger.len() == 2))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(handle.status(), SessionStatus::Live);

    let snapshot = handle.ledger();
    assert_eq!(snapshot.instrument, "PI_XBTUSD");
    // Newest delivered first; the whole snapshot shares one receipt instant.
    let prices: Vec<String> = snapshot.ledger.iter().map(|t| t.price.to_string()).collect();
    assert_eq!(prices, vec!["34001", "34000.5"]);
    let first = snapshot.ledger.latest().unwrap().observed_at;
    assert!(snapshot.ledger.iter().all(|t| t.observed_at == first));
    assert!(first != 1_612_269_825_900);

    handle.kill().await.unwrap();
    let subscribe = timeout(WAIT, server).await.unwrap().unwrap();
    assert_eq!(
        subscribe,
        r#"{"event":"subscribe","feed":"trade","product_ids":["PI_XBTUSD"]}"#
    );

    let mut status = handle.watch_status();
    timeout(WAIT, status.wait_for(|s| *s == SessionStatus::Offline))
        .await
        .unwrap()
        .unwrap();

    shutdown.cancel();
    let session = timeout(WAIT, driver_task).await.unwrap().unwrap();
    assert!(session.controller().is_offline());
}
