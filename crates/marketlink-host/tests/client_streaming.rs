//! End-to-end push delivery: engine pushes cross the bounded queue, the
//! dispatch thread, the callback table, and the streaming arenas before
//! reaching host listeners.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use marketlink_host::model::{AskBid, Liquidity, Side, Trade};
use marketlink_host::{ExchangeClient, ExchangeError, PaperConfig, PaperExchange};

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn seeded_engine() -> Arc<PaperExchange> {
    let engine = Arc::new(PaperExchange::new(PaperConfig::with_keys("key", "secret")));
    engine.add_market_symbol("BTC", "USD");
    engine.add_market_symbol("ETH", "USD");
    engine
}

fn level(price: i64, qty: i64) -> AskBid {
    AskBid::new(Decimal::new(price, 0), Decimal::new(qty, 0))
}

#[test]
fn test_orderbook_delta_reaches_listener() {
    init_tracing();
    let engine = seeded_engine();
    let client = ExchangeClient::from_engine(engine.clone());

    let (tx, rx) = mpsc::channel();
    client
        .listen_orderbook("BTC-USD", move |delta| {
            let _ = tx.send(delta.clone());
        })
        .unwrap();

    engine
        .push_orderbook(
            "BTC-USD",
            vec![level(100, 1)],
            vec![level(101, 2)],
            5,
            6,
        )
        .unwrap();

    let delta = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert_eq!(delta.market, "BTC-USD");
    assert_eq!(delta.bids, vec![level(100, 1)]);
    assert_eq!(delta.asks, vec![level(101, 2)]);
    assert_eq!(delta.last_update_id, 5);
    assert_eq!(delta.update_id, 6);

    client.disconnect().unwrap();
}

#[test]
fn test_deltas_arrive_in_push_order() {
    let engine = seeded_engine();
    let client = ExchangeClient::from_engine(engine.clone());

    let (tx, rx) = mpsc::channel();
    client
        .listen_orderbook("BTC-USD", move |delta| {
            let _ = tx.send(delta.update_id);
        })
        .unwrap();

    for id in 1..=5 {
        engine
            .push_orderbook("BTC-USD", vec![level(100, 1)], vec![], id - 1, id)
            .unwrap();
    }
    for expected in 1..=5 {
        assert_eq!(rx.recv_timeout(RECV_TIMEOUT).unwrap(), expected);
    }

    client.disconnect().unwrap();
}

#[test]
fn test_listeners_fan_out_per_market() {
    let engine = seeded_engine();
    let client = ExchangeClient::from_engine(engine.clone());

    let (tx_a, rx_a) = mpsc::channel();
    let (tx_b, rx_b) = mpsc::channel();
    let (tx_eth, rx_eth) = mpsc::channel();
    client
        .listen_orderbook("BTC-USD", move |delta| {
            let _ = tx_a.send(delta.update_id);
        })
        .unwrap();
    client
        .listen_orderbook("BTC-USD", move |delta| {
            let _ = tx_b.send(delta.update_id);
        })
        .unwrap();
    client
        .listen_orderbook("ETH-USD", move |delta| {
            let _ = tx_eth.send(delta.update_id);
        })
        .unwrap();

    engine
        .push_orderbook("BTC-USD", vec![level(100, 1)], vec![], 0, 1)
        .unwrap();

    // Both listeners on the market see the delta; the other market's
    // listener sees nothing.
    assert_eq!(rx_a.recv_timeout(RECV_TIMEOUT).unwrap(), 1);
    assert_eq!(rx_b.recv_timeout(RECV_TIMEOUT).unwrap(), 1);
    assert!(rx_eth.recv_timeout(Duration::from_millis(100)).is_err());

    client.disconnect().unwrap();
}

#[test]
fn test_trades_reach_listener() {
    let engine = seeded_engine();
    let client = ExchangeClient::from_engine(engine.clone());

    let (tx, rx) = mpsc::channel();
    client
        .listen_trades("BTC-USD", move |batch| {
            let _ = tx.send(batch.clone());
        })
        .unwrap();

    engine
        .push_trades(
            "BTC-USD",
            vec![Trade {
                id: "T-1".into(),
                buyer_order_id: Some("B-1".into()),
                seller_order_id: None,
                market_pair: "BTC-USD".into(),
                price: Decimal::new(100, 0),
                qty: Decimal::new(3, 1),
                fees: Some(Decimal::new(1, 2)),
                side: Side::Buy,
                liquidity: Liquidity::Taker,
                created_at: 1_700_000_000_000,
            }],
        )
        .unwrap();

    let batch = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert_eq!(batch.market, "BTC-USD");
    assert_eq!(batch.trades.len(), 1);
    assert_eq!(batch.trades[0].id, "T-1");
    assert_eq!(batch.trades[0].qty, Decimal::new(3, 1));
    assert_eq!(batch.trades[0].liquidity, Liquidity::Taker);

    client.disconnect().unwrap();
}

#[test]
fn test_unsubscribed_market_push_is_dropped() {
    let engine = seeded_engine();
    let client = ExchangeClient::from_engine(engine.clone());

    let (tx, rx) = mpsc::channel();
    client
        .listen_orderbook("BTC-USD", move |delta| {
            let _ = tx.send(delta.update_id);
        })
        .unwrap();

    // ETH-USD was never subscribed at the engine, so this push vanishes
    // before it reaches the queue.
    engine
        .push_orderbook("ETH-USD", vec![level(50, 1)], vec![], 0, 1)
        .unwrap();
    engine
        .push_orderbook("BTC-USD", vec![level(100, 1)], vec![], 1, 2)
        .unwrap();

    assert_eq!(rx.recv_timeout(RECV_TIMEOUT).unwrap(), 2);

    client.disconnect().unwrap();
}

#[test]
fn test_error_and_heartbeat_hooks() {
    let engine = seeded_engine();
    let client = ExchangeClient::from_engine(engine.clone());

    let (err_tx, err_rx) = mpsc::channel();
    let (hb_tx, hb_rx) = mpsc::channel();
    client
        .on_error(move |err| {
            let _ = err_tx.send(err.to_string());
        })
        .unwrap();
    client
        .on_heartbeat(move || {
            let _ = hb_tx.send(());
        })
        .unwrap();

    engine
        .push_error(ExchangeError::Exchange("venue over capacity".into()))
        .unwrap();
    engine.push_heartbeat();

    let message = err_rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert!(message.contains("venue over capacity"));
    hb_rx.recv_timeout(RECV_TIMEOUT).unwrap();

    client.disconnect().unwrap();
}

#[test]
fn test_disconnect_fires_listener_once() {
    let engine = seeded_engine();
    let client = ExchangeClient::from_engine(engine.clone());

    let (tx, rx) = mpsc::channel();
    client
        .on_disconnect(move || {
            let _ = tx.send(());
        })
        .unwrap();
    assert!(client.is_connected());

    client.disconnect().unwrap();
    rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert!(!client.is_connected());
    assert!(client.wait_for_disconnect(Some(RECV_TIMEOUT)));

    // Disconnecting again neither errors nor fires the listener a
    // second time.
    client.disconnect().unwrap();
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    // A push after teardown is refused by the engine.
    let refused = engine
        .push_error(ExchangeError::Exchange("late".into()))
        .unwrap_err();
    assert!(matches!(refused, ExchangeError::SubscriptionFailed(_)));
}

#[test]
fn test_engine_initiated_disconnect_releases_waiters() {
    let engine = seeded_engine();
    let client = ExchangeClient::from_engine(engine.clone());

    let (tx, rx) = mpsc::channel();
    client
        .on_disconnect(move || {
            let _ = tx.send(());
        })
        .unwrap();

    engine.push_disconnect().unwrap();

    rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert!(client.wait_for_disconnect(Some(RECV_TIMEOUT)));
    assert!(!client.is_connected());

    // Host-side teardown afterwards is a clean no-op.
    client.disconnect().unwrap();
}

#[test]
fn test_drop_after_engine_disconnect_releases_handles() {
    let engine = seeded_engine();
    let client = ExchangeClient::from_engine(engine.clone());
    let handle = client.handle();

    let (tx, rx) = mpsc::channel();
    client
        .on_disconnect(move || {
            let _ = tx.send(());
        })
        .unwrap();

    engine.push_disconnect().unwrap();
    rx.recv_timeout(RECV_TIMEOUT).unwrap();
    drop(client);

    // Drop tears down the boundary side even though the stream had
    // already ended: the engine registration is gone.
    assert!(!marketlink_ffi::unregister_engine(handle));
}

#[test]
fn test_failed_subscribe_does_not_arm_listener() {
    let engine = seeded_engine();
    let client = ExchangeClient::from_engine(engine.clone());

    let (tx_stale, rx_stale) = mpsc::channel();
    let err = client
        .listen_orderbook("DOGE-EUR", move |delta| {
            let _ = tx_stale.send(delta.update_id);
        })
        .unwrap_err();
    assert!(matches!(err, ExchangeError::SymbolNotFound(_)));

    // The market appears later; only the listener registered after that
    // sees its deltas.
    engine.add_market_symbol("DOGE", "EUR");
    let (tx, rx) = mpsc::channel();
    client
        .listen_orderbook("DOGE-EUR", move |delta| {
            let _ = tx.send(delta.update_id);
        })
        .unwrap();
    engine
        .push_orderbook("DOGE-EUR", vec![level(1, 1)], vec![], 0, 1)
        .unwrap();

    assert_eq!(rx.recv_timeout(RECV_TIMEOUT).unwrap(), 1);
    assert!(rx_stale.recv_timeout(Duration::from_millis(100)).is_err());

    client.disconnect().unwrap();
}

#[test]
fn test_client_without_listeners_disconnects_cleanly() {
    let engine = seeded_engine();
    let client = ExchangeClient::from_engine(engine);

    assert!(client.is_connected());
    client.disconnect().unwrap();
    assert!(!client.is_connected());
    assert!(client.wait_for_disconnect(Some(Duration::from_millis(100))));
}
