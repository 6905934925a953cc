//! Market data types: books, candles, pairs.

use rust_decimal::Decimal;

/// One price level of an order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AskBid {
    /// Price of the level.
    pub price: Decimal,
    /// Quantity resting at the level.
    pub qty: Decimal,
}

impl AskBid {
    /// Construct a level from integer-scaled parts (convenience for tests
    /// and seeding).
    #[must_use]
    pub fn new(price: Decimal, qty: Decimal) -> Self {
        Self { price, qty }
    }
}

/// A full order-book snapshot for one market.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderbookSnapshot {
    /// Bid levels, best first.
    pub bids: Vec<AskBid>,
    /// Ask levels, best first.
    pub asks: Vec<AskBid>,
    /// Identifier of the last update folded into this snapshot.
    pub last_update_id: u64,
    /// Identifier of this snapshot.
    pub update_id: u64,
}

/// Candle width for historic rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interval {
    /// One minute.
    OneMinute,
    /// Five minutes.
    FiveMinutes,
    /// Fifteen minutes.
    FifteenMinutes,
    /// One hour.
    OneHour,
    /// Six hours.
    SixHours,
    /// One day.
    OneDay,
}

/// One OHLCV candle.
///
/// Candles are the only bulk record with no owned sub-strings, so they
/// cross the boundary as plain numerics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Candle {
    /// Open time, milliseconds since the epoch.
    pub time: u64,
    /// Lowest trade price in the window.
    pub low: f64,
    /// Highest trade price in the window.
    pub high: f64,
    /// First trade price in the window.
    pub open: f64,
    /// Last trade price in the window.
    pub close: f64,
    /// Traded base volume in the window.
    pub volume: f64,
}

/// A tradable market pair and its venue constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketPair {
    /// Base asset symbol.
    pub base: String,
    /// Quote asset symbol.
    pub quote: String,
    /// Venue symbol for the pair.
    pub symbol: String,
    /// Smallest base quantity step.
    pub base_increment: Decimal,
    /// Smallest quote price step.
    pub quote_increment: Decimal,
    /// Minimum base price, when the venue enforces one.
    pub min_base_price: Option<Decimal>,
    /// Minimum quote price, when the venue enforces one.
    pub min_quote_price: Option<Decimal>,
}
