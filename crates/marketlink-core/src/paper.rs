//! Deterministic in-process engine.
//!
//! `PaperExchange` implements [`ExchangeEngine`] entirely in memory: seeded
//! market data answers the snapshot calls, placed orders fill or rest
//! immediately, and pushes are injected by the owner through the `push_*`
//! methods. It is the engine the shipped `init_paper` entry point
//! constructs, and the one every boundary test drives.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fxhash::{FxHashMap, FxHashSet};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::debug;

use crate::engine::ExchangeEngine;
use crate::error::{ExchangeError, Result};
use crate::events::{EventSender, OrderbookEvent, StreamEvent, TradesEvent};
use crate::model::{
    AskBid, Balance, Candle, Interval, MarketPair, Order, OrderRequest, OrderStatus, OrderType,
    OrderbookSnapshot, Paginator, Side, Trade,
};

/// Construction parameters for a paper client.
///
/// These are the same plain values every venue engine takes at
/// construction; the paper engine only checks that an API key is present
/// before answering private endpoints.
#[derive(Debug, Clone)]
pub struct PaperConfig {
    /// API key; empty means "no key set".
    pub api_key: String,
    /// API secret.
    pub api_secret: String,
    /// Route to the venue sandbox instead of production.
    pub sandbox: bool,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            sandbox: true,
            timeout: Duration::from_secs(10),
        }
    }
}

impl PaperConfig {
    /// Config with credentials set, for exercising private endpoints.
    #[must_use]
    pub fn with_keys(api_key: &str, api_secret: &str) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct PaperState {
    pairs: Vec<MarketPair>,
    books: FxHashMap<String, OrderbookSnapshot>,
    tickers: FxHashMap<String, Decimal>,
    candles: FxHashMap<String, Vec<Candle>>,
    public_trades: FxHashMap<String, Vec<Trade>>,
    balances: Vec<Balance>,
    open_orders: Vec<Order>,
    order_history: Vec<Order>,
    trade_history: Vec<Trade>,
    next_order_id: u64,
    book_subscriptions: FxHashSet<String>,
    trade_subscriptions: FxHashSet<String>,
    events: Option<EventSender>,
    shut_down: bool,
}

/// In-memory engine behind the `init_paper` boundary entry point.
pub struct PaperExchange {
    config: PaperConfig,
    state: Mutex<PaperState>,
}

impl PaperExchange {
    /// Create an empty paper venue.
    #[must_use]
    pub fn new(config: PaperConfig) -> Self {
        Self {
            config,
            state: Mutex::new(PaperState {
                next_order_id: 1,
                ..PaperState::default()
            }),
        }
    }

    // ---- Seeding ----

    /// Register a market pair so snapshot and subscribe calls accept it.
    pub fn add_market(&self, pair: MarketPair) {
        self.state.lock().pairs.push(pair);
    }

    /// Register a market pair by symbol with unit increments.
    pub fn add_market_symbol(&self, base: &str, quote: &str) {
        self.add_market(MarketPair {
            base: base.into(),
            quote: quote.into(),
            symbol: format!("{base}-{quote}"),
            base_increment: Decimal::new(1, 8),
            quote_increment: Decimal::new(1, 2),
            min_base_price: None,
            min_quote_price: None,
        });
    }

    /// Seed the order-book snapshot for `market`.
    pub fn set_order_book(&self, market: &str, book: OrderbookSnapshot) {
        self.state.lock().books.insert(market.into(), book);
    }

    /// Seed the ticker price for `market`.
    pub fn set_ticker(&self, market: &str, price: Decimal) {
        self.state.lock().tickers.insert(market.into(), price);
    }

    /// Seed historic candles for `market`.
    pub fn set_candles(&self, market: &str, candles: Vec<Candle>) {
        self.state.lock().candles.insert(market.into(), candles);
    }

    /// Seed historic public trades for `market`.
    pub fn set_historic_trades(&self, market: &str, trades: Vec<Trade>) {
        self.state.lock().public_trades.insert(market.into(), trades);
    }

    /// Seed account balances.
    pub fn set_balances(&self, balances: Vec<Balance>) {
        self.state.lock().balances = balances;
    }

    /// Seed account trade history.
    pub fn set_trade_history(&self, trades: Vec<Trade>) {
        self.state.lock().trade_history = trades;
    }

    // ---- Push injection ----

    /// Push an order-book delta to subscribed listeners.
    ///
    /// The delta also replaces the stored snapshot for the market. Events
    /// for markets without an active subscription are dropped, mirroring
    /// what a venue feed would never have sent.
    ///
    /// # Errors
    ///
    /// `SubscriptionFailed` when the stream is not connected.
    pub fn push_orderbook(
        &self,
        market: &str,
        bids: Vec<AskBid>,
        asks: Vec<AskBid>,
        last_update_id: u64,
        update_id: u64,
    ) -> Result<()> {
        let sender = {
            let mut state = self.state.lock();
            state.books.insert(
                market.into(),
                OrderbookSnapshot {
                    bids: bids.clone(),
                    asks: asks.clone(),
                    last_update_id,
                    update_id,
                },
            );
            if !state.book_subscriptions.contains(market) {
                debug!(market, "orderbook push for unsubscribed market dropped");
                return Ok(());
            }
            state.connected_sender()?
        };
        sender.send(StreamEvent::Orderbook(OrderbookEvent {
            market: market.into(),
            bids,
            asks,
            last_update_id,
            update_id,
        }))
    }

    /// Push a batch of trades to subscribed listeners.
    ///
    /// # Errors
    ///
    /// `SubscriptionFailed` when the stream is not connected.
    pub fn push_trades(&self, market: &str, trades: Vec<Trade>) -> Result<()> {
        let sender = {
            let state = self.state.lock();
            if !state.trade_subscriptions.contains(market) {
                debug!(market, "trade push for unsubscribed market dropped");
                return Ok(());
            }
            state.connected_sender()?
        };
        sender.send(StreamEvent::Trades(TradesEvent {
            market: market.into(),
            trades,
        }))
    }

    /// Push a heartbeat. Sheds instead of blocking when the queue is full.
    pub fn push_heartbeat(&self) {
        if let Some(sender) = self.state.lock().events.clone() {
            sender.send_lossy(StreamEvent::Heartbeat);
        }
    }

    /// Surface an engine-side error to the host's error hook.
    ///
    /// # Errors
    ///
    /// `SubscriptionFailed` when the stream is not connected.
    pub fn push_error(&self, error: ExchangeError) -> Result<()> {
        let sender = self.state.lock().connected_sender()?;
        sender.send(StreamEvent::Error(error))
    }

    /// Engine-initiated teardown: emit the final disconnect event.
    ///
    /// # Errors
    ///
    /// `SubscriptionFailed` when the stream is not connected.
    pub fn push_disconnect(&self) -> Result<()> {
        let sender = self.state.lock().connected_sender()?;
        sender.send(StreamEvent::Disconnect)
    }

    // ---- Internals ----

    fn require_key(&self) -> Result<()> {
        if self.config.api_key.is_empty() {
            return Err(ExchangeError::no_api_key(
                "operation requires an API key, none was configured",
            ));
        }
        Ok(())
    }

    fn now_ms() -> Result<u64> {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| ExchangeError::GetTimestampFailed(e.to_string()))?;
        Ok(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
    }
}

impl PaperState {
    fn connected_sender(&self) -> Result<EventSender> {
        if self.shut_down {
            return Err(ExchangeError::subscription("engine is shut down"));
        }
        self.events
            .clone()
            .ok_or_else(|| ExchangeError::subscription("stream not connected"))
    }

    fn require_market(&self, market: &str) -> Result<()> {
        if self.pairs.iter().any(|p| p.symbol == market) || self.books.contains_key(market) {
            Ok(())
        } else {
            Err(ExchangeError::symbol_not_found(market))
        }
    }
}

fn window<T: Clone>(items: &[T], paginator: Option<&Paginator>) -> Vec<T> {
    let limit = paginator
        .and_then(|p| p.limit)
        .map_or(items.len(), |l| usize::try_from(l).unwrap_or(usize::MAX));
    items.iter().take(limit).cloned().collect()
}

impl ExchangeEngine for PaperExchange {
    fn order_book(&self, market: &str) -> Result<OrderbookSnapshot> {
        let state = self.state.lock();
        state.require_market(market)?;
        Ok(state.books.get(market).cloned().unwrap_or_default())
    }

    fn price_ticker(&self, market: &str) -> Result<Decimal> {
        let state = self.state.lock();
        state.require_market(market)?;
        state
            .tickers
            .get(market)
            .copied()
            .ok_or_else(|| ExchangeError::NoMarketPair(format!("no ticker for {market}")))
    }

    fn historic_rates(
        &self,
        market: &str,
        _interval: Interval,
        paginator: Option<&Paginator>,
    ) -> Result<Vec<Candle>> {
        let state = self.state.lock();
        state.require_market(market)?;
        Ok(window(
            state.candles.get(market).map_or(&[][..], Vec::as_slice),
            paginator,
        ))
    }

    fn historic_trades(&self, market: &str, paginator: Option<&Paginator>) -> Result<Vec<Trade>> {
        let state = self.state.lock();
        state.require_market(market)?;
        Ok(window(
            state
                .public_trades
                .get(market)
                .map_or(&[][..], Vec::as_slice),
            paginator,
        ))
    }

    fn place_order(&self, request: &OrderRequest) -> Result<Order> {
        self.require_key()?;
        let size = request.size()?;
        let price = request.price()?;
        let created_at = Self::now_ms()?;

        let mut state = self.state.lock();
        state.require_market(&request.market)?;

        let id = format!("PAPER-{}", state.next_order_id);
        state.next_order_id += 1;

        let order = Order {
            id,
            market_pair: request.market.clone(),
            client_order_id: None,
            created_at,
            order_type: if request.is_limit() {
                OrderType::Limit
            } else {
                OrderType::Market
            },
            side: request.side,
            status: if request.is_limit() {
                OrderStatus::Open
            } else {
                OrderStatus::Filled
            },
            size,
            price,
            remaining: request.is_limit().then_some(size),
        };
        if request.is_limit() {
            state.open_orders.push(order.clone());
        } else {
            state.order_history.push(order.clone());
        }
        debug!(id = %order.id, market = %order.market_pair, "order placed");
        Ok(order)
    }

    fn get_order(&self, order_id: &str, _market: Option<&str>) -> Result<Order> {
        self.require_key()?;
        let state = self.state.lock();
        state
            .open_orders
            .iter()
            .chain(state.order_history.iter())
            .find(|o| o.id == order_id)
            .cloned()
            .ok_or_else(|| ExchangeError::invalid_argument(format!("unknown order id {order_id}")))
    }

    fn cancel_order(&self, order_id: &str, _market: Option<&str>) -> Result<()> {
        self.require_key()?;
        let mut state = self.state.lock();
        let position = state
            .open_orders
            .iter()
            .position(|o| o.id == order_id)
            .ok_or_else(|| {
                ExchangeError::invalid_argument(format!("unknown order id {order_id}"))
            })?;
        let mut order = state.open_orders.remove(position);
        order.status = OrderStatus::Canceled;
        state.order_history.push(order);
        Ok(())
    }

    fn cancel_all_orders(&self, market: Option<&str>) -> Result<Vec<String>> {
        self.require_key()?;
        let mut state = self.state.lock();
        let (cancelled, kept): (Vec<_>, Vec<_>) = state
            .open_orders
            .drain(..)
            .partition(|o| market.is_none_or(|m| o.market_pair == m));
        state.open_orders = kept;
        let ids = cancelled.iter().map(|o| o.id.clone()).collect();
        for mut order in cancelled {
            order.status = OrderStatus::Canceled;
            state.order_history.push(order);
        }
        Ok(ids)
    }

    fn open_orders(&self) -> Result<Vec<Order>> {
        self.require_key()?;
        Ok(self.state.lock().open_orders.clone())
    }

    fn order_history(
        &self,
        market: Option<&str>,
        paginator: Option<&Paginator>,
    ) -> Result<Vec<Order>> {
        self.require_key()?;
        let state = self.state.lock();
        let filtered: Vec<Order> = state
            .order_history
            .iter()
            .filter(|o| market.is_none_or(|m| o.market_pair == m))
            .cloned()
            .collect();
        Ok(window(&filtered, paginator))
    }

    fn trade_history(
        &self,
        market: Option<&str>,
        order_id: Option<&str>,
        paginator: Option<&Paginator>,
    ) -> Result<Vec<Trade>> {
        self.require_key()?;
        let state = self.state.lock();
        let filtered: Vec<Trade> = state
            .trade_history
            .iter()
            .filter(|t| market.is_none_or(|m| t.market_pair == m))
            .filter(|t| {
                order_id.is_none_or(|id| {
                    t.buyer_order_id.as_deref() == Some(id)
                        || t.seller_order_id.as_deref() == Some(id)
                })
            })
            .cloned()
            .collect();
        Ok(window(&filtered, paginator))
    }

    fn account_balances(&self, paginator: Option<&Paginator>) -> Result<Vec<Balance>> {
        self.require_key()?;
        Ok(window(&self.state.lock().balances, paginator))
    }

    fn market_pairs(&self) -> Result<Vec<MarketPair>> {
        Ok(self.state.lock().pairs.clone())
    }

    fn connect_events(&self, events: EventSender) -> Result<()> {
        let mut state = self.state.lock();
        if state.events.is_some() {
            return Err(ExchangeError::subscription("events already connected"));
        }
        state.shut_down = false;
        state.events = Some(events);
        Ok(())
    }

    fn subscribe_orderbook(&self, market: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.require_market(market)?;
        state.connected_sender()?;
        state.book_subscriptions.insert(market.into());
        debug!(market, "orderbook subscription active");
        Ok(())
    }

    fn subscribe_trades(&self, market: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.require_market(market)?;
        state.connected_sender()?;
        state.trade_subscriptions.insert(market.into());
        debug!(market, "trade subscription active");
        Ok(())
    }

    fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shut_down = true;
        state.events = None;
        state.book_subscriptions.clear();
        state.trade_subscriptions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event_queue;

    fn keyed_paper() -> PaperExchange {
        let paper = PaperExchange::new(PaperConfig::with_keys("key", "secret"));
        paper.add_market_symbol("BTC", "USD");
        paper
    }

    fn limit_request(size: &str, price: &str) -> OrderRequest {
        OrderRequest {
            market: "BTC-USD".into(),
            size: size.into(),
            price: Some(price.into()),
            side: Side::Buy,
            time_in_force: crate::model::TimeInForce::default(),
            post_only: false,
        }
    }

    #[test]
    fn test_place_and_get_order() {
        let paper = keyed_paper();
        let placed = paper.place_order(&limit_request("1.5", "30000")).unwrap();
        assert_eq!(placed.status, OrderStatus::Open);
        let fetched = paper.get_order(&placed.id, None).unwrap();
        assert_eq!(fetched, placed);
    }

    #[test]
    fn test_malformed_quantity_rejected_without_order() {
        let paper = keyed_paper();
        let err = paper.place_order(&limit_request("1.5x", "30000")).unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidArgument(_)));
        assert!(!err.message().is_empty());
        assert!(paper.open_orders().unwrap().is_empty());
    }

    #[test]
    fn test_private_ops_need_api_key() {
        let paper = PaperExchange::new(PaperConfig::default());
        paper.add_market_symbol("BTC", "USD");
        let err = paper.open_orders().unwrap_err();
        assert!(matches!(err, ExchangeError::NoApiKeySet(_)));
    }

    #[test]
    fn test_unknown_market_is_symbol_not_found() {
        let paper = keyed_paper();
        let err = paper.order_book("DOGE-EUR").unwrap_err();
        assert!(matches!(err, ExchangeError::SymbolNotFound(_)));
    }

    #[test]
    fn test_cancel_all_partitions_by_market() {
        let paper = keyed_paper();
        paper.add_market_symbol("ETH", "USD");
        paper.place_order(&limit_request("1", "30000")).unwrap();
        let mut eth = limit_request("2", "2000");
        eth.market = "ETH-USD".into();
        paper.place_order(&eth).unwrap();

        let cancelled = paper.cancel_all_orders(Some("BTC-USD")).unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(paper.open_orders().unwrap().len(), 1);

        let rest = paper.cancel_all_orders(None).unwrap();
        assert_eq!(rest.len(), 1);
        assert!(paper.open_orders().unwrap().is_empty());
    }

    #[test]
    fn test_push_requires_subscription_and_connection() {
        let paper = keyed_paper();
        // Not connected: unsubscribed pushes are dropped silently.
        paper
            .push_orderbook("BTC-USD", Vec::new(), Vec::new(), 0, 1)
            .unwrap();

        let (tx, rx) = event_queue(8);
        paper.connect_events(tx).unwrap();
        paper.subscribe_orderbook("BTC-USD").unwrap();
        paper
            .push_orderbook("BTC-USD", Vec::new(), Vec::new(), 5, 6)
            .unwrap();
        match rx.recv().unwrap() {
            StreamEvent::Orderbook(ev) => {
                assert_eq!(ev.market, "BTC-USD");
                assert_eq!(ev.last_update_id, 5);
                assert_eq!(ev.update_id, 6);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_shutdown_stops_pushes() {
        let paper = keyed_paper();
        let (tx, _rx) = event_queue(8);
        paper.connect_events(tx).unwrap();
        paper.subscribe_orderbook("BTC-USD").unwrap();
        paper.shutdown();
        let err = paper
            .push_error(ExchangeError::Socket("gone".into()))
            .unwrap_err();
        assert!(matches!(err, ExchangeError::SubscriptionFailed(_)));
    }

    #[test]
    fn test_connect_events_is_single_shot() {
        let paper = keyed_paper();
        let (tx, _rx) = event_queue(8);
        paper.connect_events(tx.clone()).unwrap();
        assert!(paper.connect_events(tx).is_err());
    }

    #[test]
    fn test_paginator_limit_windows_results() {
        let paper = keyed_paper();
        paper.set_balances(
            (0..10)
                .map(|i| Balance {
                    asset: format!("AS{i}"),
                    total: Decimal::from(i),
                    free: Decimal::from(i),
                })
                .collect(),
        );
        let paginator = Paginator {
            limit: Some(3),
            ..Paginator::default()
        };
        assert_eq!(paper.account_balances(Some(&paginator)).unwrap().len(), 3);
        assert_eq!(paper.account_balances(None).unwrap().len(), 10);
    }
}
