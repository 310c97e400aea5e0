//! Session Lifecycle Integration Tests
//!
//! Drives a `TradeSession` through snapshot, incremental, switch, reconnect
//! and kill scenarios and checks both the ledger and the intents the
//! transport receives.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use trade_tape::{
    ChannelIntentSink, CloseKind, FeedEvent, IntentAction, IntentSink, MAX_TRADES, ManualClock,
    MessageDispatcher, PortError, SessionStatus, SubscriptionIntent, TradeSession,
};

// =============================================================================
// Helpers
// =============================================================================

#[derive(Debug, Default)]
struct Recorded {
    intents: Vec<SubscriptionIntent>,
    closes: usize,
}

#[derive(Debug, Clone, Default)]
struct RecordingSink {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingSink {
    fn intents(&self) -> Vec<SubscriptionIntent> {
        self.inner.lock().intents.clone()
    }

    fn take_intents(&self) -> Vec<SubscriptionIntent> {
        std::mem::take(&mut self.inner.lock().intents)
    }

    fn closes(&self) -> usize {
        self.inner.lock().closes
    }
}

impl IntentSink for RecordingSink {
    fn send(&mut self, intent: &SubscriptionIntent, _connection: u64) -> Result<(), PortError> {
        self.inner.lock().intents.push(intent.clone());
        Ok(())
    }

    fn close(&mut self) {
        self.inner.lock().closes += 1;
    }
}

const START: i64 = 1_612_269_000_000;

fn setup(instrument: &str) -> (TradeSession<RecordingSink, ManualClock>, RecordingSink, ManualClock) {
    let sink = RecordingSink::default();
    let clock = ManualClock::at(START);
    let session = TradeSession::with_dispatcher(
        instrument,
        MAX_TRADES,
        sink.clone(),
        MessageDispatcher::with_clock(clock.clone()),
    );
    (session, sink, clock)
}

fn trade_json(product_id: &str, side: &str, qty: &str, price: &str) -> String {
    format!(
        r#"{{"feed":"trade","product_id":"{product_id}","side":"{side}","qty":{qty},"price":{price}}}"#
    )
}

fn snapshot_json(product_id: &str, trades: &[String]) -> String {
    format!(
        r#"{{"feed":"trade_snapshot","product_id":"{product_id}","trades":[{}]}}"#,
        trades.join(",")
    )
}

// =============================================================================
// Ledger Scenarios
// =============================================================================

fn timed_trade_json(side: &str, qty: &str, price: &str, time: i64) -> String {
    format!(
        r#"{{"feed":"trade","product_id":"PI_XBTUSD","side":"{side}","qty":{qty},"price":{price},"time":{time}}}"#
    )
}

fn prices(session: &TradeSession<RecordingSink, ManualClock>) -> Vec<Decimal> {
    session.ledger().iter().map(|t| t.price).collect()
}

#[test]
fn test_snapshot_on_empty_ledger_lists_reverse_delivery_order() {
    let (mut session, _sink, _clock) = setup("PI_XBTUSD");
    session.on_connection_open();

    let snapshot = snapshot_json(
        "PI_XBTUSD",
        &[
            trade_json("PI_XBTUSD", "buy", "1", "100"),
            trade_json("PI_XBTUSD", "sell", "2", "101"),
            trade_json("PI_XBTUSD", "buy", "0.5", "99"),
        ],
    );
    session.on_message(&snapshot);

    assert_eq!(
        prices(&session),
        vec![Decimal::new(99, 0), Decimal::new(101, 0), Decimal::new(100, 0)]
    );
    let sides: Vec<&str> = session.ledger().iter().map(|t| t.side.as_str()).collect();
    assert_eq!(sides, vec!["buy", "sell", "buy"]);
    assert_eq!(session.ledger().latest().unwrap().quantity, Decimal::new(5, 1));
    assert!(session.ledger().iter().all(|t| t.observed_at == START));
}

#[test]
fn test_snapshot_order_does_not_follow_wire_times() {
    let (mut session, _sink, _clock) = setup("PI_XBTUSD");
    session.on_connection_open();

    // Wire times disagree with delivery order.
    let snapshot = snapshot_json(
        "PI_XBTUSD",
        &[
            timed_trade_json("buy", "1", "100", START + 300),
            timed_trade_json("sell", "2", "101", START - 50),
            timed_trade_json("buy", "0.5", "99", START + 100),
        ],
    );
    session.on_message(&snapshot);

    assert_eq!(
        prices(&session),
        vec![Decimal::new(99, 0), Decimal::new(101, 0), Decimal::new(100, 0)]
    );
    assert!(session.ledger().iter().all(|t| t.observed_at == START));
}

#[test]
fn test_incremental_after_snapshot_with_skewed_times_is_newest() {
    let (mut session, _sink, clock) = setup("PI_XBTUSD");
    session.on_connection_open();

    // Exchange clock runs ahead of the local one.
    let trades: Vec<String> = (1..=50)
        .map(|i| timed_trade_json("buy", "1", &i.to_string(), START + 100 + i))
        .collect();
    session.on_message(&snapshot_json("PI_XBTUSD", &trades));
    assert_eq!(session.ledger().len(), MAX_TRADES);

    clock.set(START + 5);
    session.on_message(&timed_trade_json("sell", "7", "999", START + 200));

    let ledger = session.ledger();
    assert_eq!(ledger.len(), MAX_TRADES);
    assert_eq!(ledger.latest().unwrap().price, Decimal::new(999, 0));
    assert_eq!(ledger.latest().unwrap().observed_at, START + 5);
    assert!(ledger.iter().all(|t| t.price != Decimal::new(1, 0)));
    assert_eq!(ledger.iter().nth(1).unwrap().price, Decimal::new(50, 0));
}

#[test]
fn test_full_ledger_plus_incremental_drops_oldest() {
    let (mut session, _sink, clock) = setup("PI_XBTUSD");
    session.on_connection_open();

    let trades: Vec<String> = (1..=50)
        .map(|i| {
            format!(
                r#"{{"product_id":"PI_XBTUSD","side":"buy","qty":1,"price":{i},"time":{}}}"#,
                START + i
            )
        })
        .collect();
    session.on_message(&snapshot_json("PI_XBTUSD", &trades));
    assert_eq!(session.ledger().len(), MAX_TRADES);

    clock.set(START + 1_000);
    session.on_message(&trade_json("PI_XBTUSD", "sell", "7", "999"));

    let ledger = session.ledger();
    assert_eq!(ledger.len(), MAX_TRADES);
    assert_eq!(ledger.latest().unwrap().price, Decimal::new(999, 0));
    // Price 1 was delivered first, so it was the oldest.
    assert!(ledger.iter().all(|t| t.price != Decimal::new(1, 0)));
}

#[test]
fn test_switch_clears_ledger_immediately() {
    let (mut session, _sink, clock) = setup("A");
    session.on_connection_open();

    for i in 0..10 {
        clock.advance(1);
        session.on_message(&trade_json("A", "buy", "1", &i.to_string()));
    }
    assert_eq!(session.ledger().len(), 10);

    session.on_instrument_change("B");

    assert!(session.ledger().is_empty());
    assert!(session.subscribe_ledger().borrow().ledger.is_empty());
}

#[test]
fn test_stale_trade_after_switch_never_enters_ledger() {
    let (mut session, _sink, _clock) = setup("A");
    session.on_connection_open();
    session.on_instrument_change("B");

    // In-flight trade for the old instrument.
    session.on_message(&trade_json("A", "buy", "1", "10"));
    assert!(session.ledger().is_empty());

    session.on_message(&trade_json("B", "sell", "1", "20"));
    assert_eq!(session.ledger().len(), 1);
}

#[test]
fn test_duplicate_delivery_is_merged_once() {
    let (mut session, _sink, _clock) = setup("A");
    session.on_connection_open();

    let trade = trade_json("A", "buy", "1.0", "10.50");
    session.on_message(&trade);
    session.on_message(&trade_json("A", "buy", "1", "10.5"));
    session.on_message(&trade);

    assert_eq!(session.ledger().len(), 1);
}

#[test]
fn test_malformed_and_control_payloads_leave_ledger_alone() {
    let (mut session, _sink, _clock) = setup("A");
    session.on_connection_open();
    session.on_message(&trade_json("A", "buy", "1", "10"));
    let before = session.ledger().clone();

    session.on_message("not json");
    session.on_message(r#"{"event":"info","version":1}"#);
    session.on_message(r#"{"feed":"heartbeat","time":1}"#);
    session.on_message(r#"{"event":"error","message":"Invalid product id"}"#);

    assert_eq!(session.ledger(), &before);
}

// =============================================================================
// Subscription Contracts
// =============================================================================

#[test]
fn test_resubscribe_after_reconnect() {
    let (mut session, sink, _clock) = setup("A");
    session.on_connection_open();
    session.on_connection_close(CloseKind::WillRetry);
    assert_eq!(session.status(), SessionStatus::Reconnecting);
    sink.take_intents();

    session.on_connection_open();

    assert_eq!(sink.intents(), vec![SubscriptionIntent::subscribe("A")]);
    assert!(
        sink.intents()
            .iter()
            .all(|i| i.action != IntentAction::Unsubscribe)
    );
}

#[test]
fn test_switch_while_open_unsubscribes_then_subscribes() {
    let (mut session, sink, _clock) = setup("A");
    session.on_connection_open();
    sink.take_intents();

    session.on_instrument_change("B");

    assert_eq!(
        sink.intents(),
        vec![
            SubscriptionIntent::unsubscribe("A"),
            SubscriptionIntent::subscribe("B"),
        ]
    );
}

#[test]
fn test_rapid_double_switch() {
    let (mut session, sink, _clock) = setup("A");
    session.on_connection_open();
    sink.take_intents();

    session.on_instrument_change("B");
    session.on_instrument_change("C");

    assert_eq!(
        sink.intents(),
        vec![
            SubscriptionIntent::unsubscribe("A"),
            SubscriptionIntent::subscribe("B"),
            SubscriptionIntent::unsubscribe("B"),
            SubscriptionIntent::subscribe("C"),
        ]
    );
    assert_eq!(session.controller().current_instrument(), "C");
}

#[test]
fn test_burst_of_switches_reaches_transport_in_order() {
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let mut session = TradeSession::with_dispatcher(
        "I0",
        MAX_TRADES,
        ChannelIntentSink::new(outbound_tx, CancellationToken::new()),
        MessageDispatcher::with_clock(ManualClock::at(START)),
    );
    session.on_connection_open();

    // Nobody drains the transport while the burst is issued.
    for i in 1..=20 {
        assert!(session.on_instrument_change(&format!("I{i}")));
    }
    assert_eq!(session.controller().current_instrument(), "I20");

    let mut frames = Vec::new();
    while let Ok(frame) = outbound_rx.try_recv() {
        assert_eq!(frame.connection, 1);
        frames.push(frame.text);
    }
    assert_eq!(frames.len(), 1 + 2 * 20);
    assert_eq!(
        frames[0],
        r#"{"event":"subscribe","feed":"trade","product_ids":["I0"]}"#
    );
    for i in 1..=20 {
        assert_eq!(
            frames[2 * i - 1],
            format!(r#"{{"event":"unsubscribe","feed":"trade","product_ids":["I{}"]}}"#, i - 1)
        );
        assert_eq!(
            frames[2 * i],
            format!(r#"{{"event":"subscribe","feed":"trade","product_ids":["I{i}"]}}"#)
        );
    }
}

#[test]
fn test_switch_during_outage_applies_on_reconnect() {
    let (mut session, sink, _clock) = setup("A");
    session.on_connection_open();
    session.on_connection_close(CloseKind::WillRetry);
    sink.take_intents();

    session.on_instrument_change("B");
    assert!(sink.intents().is_empty());

    session.on_connection_open();
    assert_eq!(sink.intents(), vec![SubscriptionIntent::subscribe("B")]);
}

// =============================================================================
// Kill and Retry Exhaustion
// =============================================================================

#[test]
fn test_kill_twice_is_noop() {
    let (mut session, sink, _clock) = setup("A");
    session.on_connection_open();

    assert!(session.kill());
    assert!(!session.kill());
    assert_eq!(sink.closes(), 1);

    // The transport reports its terminal close afterwards.
    session.handle_event(FeedEvent::Closed { will_retry: false });
    assert_eq!(session.status(), SessionStatus::Offline);
}

#[test]
fn test_exhausted_retries_go_offline_without_resubscribing() {
    let (mut session, sink, _clock) = setup("A");
    session.on_connection_open();
    session.handle_event(FeedEvent::Closed { will_retry: true });
    session.handle_event(FeedEvent::Closed { will_retry: true });
    session.handle_event(FeedEvent::Closed { will_retry: false });
    sink.take_intents();

    assert_eq!(session.status(), SessionStatus::Offline);

    session.handle_event(FeedEvent::Opened);
    session.on_instrument_change("B");

    assert!(sink.intents().is_empty());
    assert_eq!(sink.closes(), 0);
}
