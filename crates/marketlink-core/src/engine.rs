//! The engine trait the boundary layer is generic over.

use rust_decimal::Decimal;

use crate::error::Result;
use crate::events::EventSender;
use crate::model::{
    Balance, Candle, Interval, MarketPair, Order, OrderRequest, OrderbookSnapshot, Paginator,
    Trade,
};

/// A blocking exchange-connectivity engine.
///
/// This is the seam between the boundary layer and venue-specific code:
/// the FFI surface marshals arguments, resolves a client handle to an
/// `Arc<dyn ExchangeEngine>`, and calls straight through. All snapshot and
/// order operations block the calling thread until the venue answers;
/// asynchronous pushes flow through the [`EventSender`] installed by
/// [`ExchangeEngine::connect_events`].
///
/// Implementations must be safe to call from multiple threads; the
/// boundary enforces no serialization of its own.
pub trait ExchangeEngine: Send + Sync {
    /// Fetch a full order-book snapshot for `market`.
    fn order_book(&self, market: &str) -> Result<OrderbookSnapshot>;

    /// Fetch the current price for `market`.
    fn price_ticker(&self, market: &str) -> Result<Decimal>;

    /// Fetch historic candles for `market`.
    fn historic_rates(
        &self,
        market: &str,
        interval: Interval,
        paginator: Option<&Paginator>,
    ) -> Result<Vec<Candle>>;

    /// Fetch historic public trades for `market`.
    fn historic_trades(&self, market: &str, paginator: Option<&Paginator>) -> Result<Vec<Trade>>;

    /// Place an order and return it as acknowledged by the venue.
    fn place_order(&self, request: &OrderRequest) -> Result<Order>;

    /// Look up one order by id.
    fn get_order(&self, order_id: &str, market: Option<&str>) -> Result<Order>;

    /// Cancel one order by id.
    fn cancel_order(&self, order_id: &str, market: Option<&str>) -> Result<()>;

    /// Cancel every open order, optionally restricted to one market.
    /// Returns the cancelled order ids.
    fn cancel_all_orders(&self, market: Option<&str>) -> Result<Vec<String>>;

    /// All currently open orders for the account.
    fn open_orders(&self) -> Result<Vec<Order>>;

    /// Closed and cancelled orders for the account.
    fn order_history(
        &self,
        market: Option<&str>,
        paginator: Option<&Paginator>,
    ) -> Result<Vec<Order>>;

    /// Fills for the account.
    fn trade_history(
        &self,
        market: Option<&str>,
        order_id: Option<&str>,
        paginator: Option<&Paginator>,
    ) -> Result<Vec<Trade>>;

    /// Account balances.
    fn account_balances(&self, paginator: Option<&Paginator>) -> Result<Vec<Balance>>;

    /// The venue's market-pair catalogue.
    fn market_pairs(&self) -> Result<Vec<MarketPair>>;

    /// Install the event queue producer.
    ///
    /// Called exactly once per client, during subscription setup and
    /// before any `subscribe_*` call. The engine must deliver every push
    /// for this client through `events`, ending with
    /// [`StreamEvent::Disconnect`](crate::events::StreamEvent::Disconnect)
    /// on engine-initiated teardown.
    fn connect_events(&self, events: EventSender) -> Result<()>;

    /// Start order-book delivery for `market`.
    ///
    /// Subscribing to the same market again is additive on the host side;
    /// engines may treat repeat calls as a no-op.
    fn subscribe_orderbook(&self, market: &str) -> Result<()>;

    /// Start trade delivery for `market`.
    fn subscribe_trades(&self, market: &str) -> Result<()>;

    /// Stop producing events. Called from the disconnect path; must be
    /// idempotent and must not emit further events after returning.
    fn shutdown(&self);
}
