//! Fixed-layout record types and their marshaling.
//!
//! Each bulk record is a `#[repr(C)]` struct of scalars and owned string
//! pointers. Decimal quantities always cross as strings: the record layout
//! stays free of any particular decimal representation and both sides
//! re-parse on arrival. A record produced here owns its strings until the
//! receiving side consumes it (read every string, release every string,
//! exactly once); the `consume` methods below do that in one step.

use std::ffi::c_char;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use marketlink_core::model::{
    AskBid, Balance, Candle, Interval, Liquidity, MarketPair, Order, OrderStatus, OrderType,
    Paginator, Side, TimeInForce, Trade,
};
use marketlink_core::{ExchangeError, Result};

use crate::string::{consume_cstring, consume_opt_cstring, opt_arg_str, opt_owned_string, owned_string};

// ============================================================================
// Scalar enum encodings
// ============================================================================

/// Side of an order or trade on the wire.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiSide {
    /// Bid side.
    Buy = 0,
    /// Ask side.
    Sell = 1,
}

impl FfiSide {
    /// Decode a raw discriminant.
    #[must_use]
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Buy),
            1 => Some(Self::Sell),
            _ => None,
        }
    }
}

impl From<Side> for FfiSide {
    fn from(side: Side) -> Self {
        match side {
            Side::Buy => Self::Buy,
            Side::Sell => Self::Sell,
        }
    }
}

impl From<FfiSide> for Side {
    fn from(side: FfiSide) -> Self {
        match side {
            FfiSide::Buy => Self::Buy,
            FfiSide::Sell => Self::Sell,
        }
    }
}

/// Order type on the wire.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiOrderType {
    /// Resting order at a fixed price.
    Limit = 0,
    /// Immediate execution at the touch.
    Market = 1,
    /// Limit order armed by a stop price.
    StopLimit = 2,
    /// Market order armed by a stop price.
    StopMarket = 3,
    /// Venue-specific type this boundary does not model.
    Unknown = 4,
}

impl From<OrderType> for FfiOrderType {
    fn from(t: OrderType) -> Self {
        match t {
            OrderType::Limit => Self::Limit,
            OrderType::Market => Self::Market,
            OrderType::StopLimit => Self::StopLimit,
            OrderType::StopMarket => Self::StopMarket,
            OrderType::Unknown => Self::Unknown,
        }
    }
}

impl From<FfiOrderType> for OrderType {
    fn from(t: FfiOrderType) -> Self {
        match t {
            FfiOrderType::Limit => Self::Limit,
            FfiOrderType::Market => Self::Market,
            FfiOrderType::StopLimit => Self::StopLimit,
            FfiOrderType::StopMarket => Self::StopMarket,
            FfiOrderType::Unknown => Self::Unknown,
        }
    }
}

/// Order lifecycle state on the wire.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiOrderStatus {
    /// Accepted, not yet filled.
    New = 0,
    /// Some quantity executed.
    PartiallyFilled = 1,
    /// Fully executed.
    Filled = 2,
    /// Cancelled by the owner.
    Canceled = 3,
    /// Cancel requested, not yet confirmed.
    PendingCancel = 4,
    /// Refused by the venue.
    Rejected = 5,
    /// Expired by time-in-force.
    Expired = 6,
    /// Resting on the book.
    Open = 7,
    /// Submitted, not yet acknowledged.
    Pending = 8,
    /// Live (venue-specific synonym for open).
    Active = 9,
}

impl From<OrderStatus> for FfiOrderStatus {
    fn from(s: OrderStatus) -> Self {
        match s {
            OrderStatus::New => Self::New,
            OrderStatus::PartiallyFilled => Self::PartiallyFilled,
            OrderStatus::Filled => Self::Filled,
            OrderStatus::Canceled => Self::Canceled,
            OrderStatus::PendingCancel => Self::PendingCancel,
            OrderStatus::Rejected => Self::Rejected,
            OrderStatus::Expired => Self::Expired,
            OrderStatus::Open => Self::Open,
            OrderStatus::Pending => Self::Pending,
            OrderStatus::Active => Self::Active,
        }
    }
}

impl From<FfiOrderStatus> for OrderStatus {
    fn from(s: FfiOrderStatus) -> Self {
        match s {
            FfiOrderStatus::New => Self::New,
            FfiOrderStatus::PartiallyFilled => Self::PartiallyFilled,
            FfiOrderStatus::Filled => Self::Filled,
            FfiOrderStatus::Canceled => Self::Canceled,
            FfiOrderStatus::PendingCancel => Self::PendingCancel,
            FfiOrderStatus::Rejected => Self::Rejected,
            FfiOrderStatus::Expired => Self::Expired,
            FfiOrderStatus::Open => Self::Open,
            FfiOrderStatus::Pending => Self::Pending,
            FfiOrderStatus::Active => Self::Active,
        }
    }
}

/// Liquidity role on the wire.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiLiquidity {
    /// Resting order, added liquidity.
    Maker = 0,
    /// Aggressing order, removed liquidity.
    Taker = 1,
}

impl From<Liquidity> for FfiLiquidity {
    fn from(l: Liquidity) -> Self {
        match l {
            Liquidity::Maker => Self::Maker,
            Liquidity::Taker => Self::Taker,
        }
    }
}

impl From<FfiLiquidity> for Liquidity {
    fn from(l: FfiLiquidity) -> Self {
        match l {
            FfiLiquidity::Maker => Self::Maker,
            FfiLiquidity::Taker => Self::Taker,
        }
    }
}

/// Encode a candle width for a boundary call.
#[must_use]
pub fn interval_to_u32(interval: Interval) -> u32 {
    match interval {
        Interval::OneMinute => 0,
        Interval::FiveMinutes => 1,
        Interval::FifteenMinutes => 2,
        Interval::OneHour => 3,
        Interval::SixHours => 4,
        Interval::OneDay => 5,
    }
}

/// Encode a time-in-force policy as the `(kind, duration_ms)` pair the
/// boundary carries.
#[must_use]
pub fn time_in_force_to_raw(tif: TimeInForce) -> (u32, u64) {
    match tif {
        TimeInForce::GoodTillCancelled => (0, 0),
        TimeInForce::ImmediateOrCancelled => (1, 0),
        TimeInForce::FillOrKill => (2, 0),
        TimeInForce::GoodTillTime(duration) => {
            (3, u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
        }
    }
}

/// Decode a candle-width discriminant.
pub(crate) fn interval_from_u32(value: u32) -> Result<Interval> {
    let interval = match value {
        0 => Interval::OneMinute,
        1 => Interval::FiveMinutes,
        2 => Interval::FifteenMinutes,
        3 => Interval::OneHour,
        4 => Interval::SixHours,
        5 => Interval::OneDay,
        other => {
            return Err(ExchangeError::invalid_argument(format!(
                "unknown interval discriminant {other}"
            )))
        }
    };
    Ok(interval)
}

/// Decode a time-in-force `(kind, duration)` pair.
///
/// `GoodTillTime` cannot carry its duration in a discriminant, so it
/// crosses as kind 3 plus a millisecond count.
pub(crate) fn time_in_force_from_raw(kind: u32, duration_ms: u64) -> Result<TimeInForce> {
    let tif = match kind {
        0 => TimeInForce::GoodTillCancelled,
        1 => TimeInForce::ImmediateOrCancelled,
        2 => TimeInForce::FillOrKill,
        3 => TimeInForce::GoodTillTime(Duration::from_millis(duration_ms)),
        other => {
            return Err(ExchangeError::invalid_argument(format!(
                "unknown time-in-force discriminant {other}"
            )))
        }
    };
    Ok(tif)
}

fn parse_decimal(text: &str, field: &str) -> Result<Decimal> {
    Decimal::from_str(text)
        .map_err(|e| ExchangeError::ParseDecimal(format!("{field} {text:?}: {e}")))
}

fn parse_opt_decimal(text: Option<String>, field: &str) -> Result<Option<Decimal>> {
    text.map(|t| parse_decimal(&t, field)).transpose()
}

// ============================================================================
// Bulk records
// ============================================================================

/// One order-book price level on the wire.
#[repr(C)]
#[derive(Debug)]
pub struct FfiAskBid {
    /// Price, decimal string.
    pub price: *mut c_char,
    /// Quantity, decimal string.
    pub qty: *mut c_char,
}

impl From<AskBid> for FfiAskBid {
    fn from(level: AskBid) -> Self {
        Self {
            price: owned_string(&level.price.to_string()),
            qty: owned_string(&level.qty.to_string()),
        }
    }
}

impl FfiAskBid {
    /// Read the record and release its strings in one step.
    ///
    /// # Errors
    ///
    /// `ParseDecimal` when a field does not parse; the strings are
    /// released regardless.
    ///
    /// # Safety
    ///
    /// The record must have been produced by this library and not yet
    /// consumed or released.
    pub unsafe fn consume(&mut self) -> Result<AskBid> {
        // SAFETY: ownership of both strings transfers here, once.
        let (price, qty) = unsafe { (consume_cstring(self.price), consume_cstring(self.qty)) };
        self.price = std::ptr::null_mut();
        self.qty = std::ptr::null_mut();
        Ok(AskBid {
            price: parse_decimal(&price, "level price")?,
            qty: parse_decimal(&qty, "level qty")?,
        })
    }
}

/// One trade on the wire.
#[repr(C)]
#[derive(Debug)]
pub struct FfiTrade {
    /// Venue trade identifier.
    pub id: *mut c_char,
    /// Buyer's order id, or null.
    pub buyer_order_id: *mut c_char,
    /// Seller's order id, or null.
    pub seller_order_id: *mut c_char,
    /// Market the trade printed on.
    pub market_pair: *mut c_char,
    /// Execution price, decimal string.
    pub price: *mut c_char,
    /// Executed quantity, decimal string.
    pub qty: *mut c_char,
    /// Fees, decimal string, or null.
    pub fees: *mut c_char,
    /// Aggressor side.
    pub side: FfiSide,
    /// Liquidity role.
    pub liquidity: FfiLiquidity,
    /// Execution time, milliseconds since the epoch.
    pub created_at: u64,
}

impl From<Trade> for FfiTrade {
    fn from(trade: Trade) -> Self {
        Self {
            id: owned_string(&trade.id),
            buyer_order_id: opt_owned_string(trade.buyer_order_id.as_deref()),
            seller_order_id: opt_owned_string(trade.seller_order_id.as_deref()),
            market_pair: owned_string(&trade.market_pair),
            price: owned_string(&trade.price.to_string()),
            qty: owned_string(&trade.qty.to_string()),
            fees: opt_owned_string(trade.fees.map(|f| f.to_string()).as_deref()),
            side: trade.side.into(),
            liquidity: trade.liquidity.into(),
            created_at: trade.created_at,
        }
    }
}

impl FfiTrade {
    /// Read the record and release its strings in one step.
    ///
    /// # Errors
    ///
    /// `ParseDecimal` when a decimal field does not parse; the strings
    /// are released regardless.
    ///
    /// # Safety
    ///
    /// The record must have been produced by this library and not yet
    /// consumed or released.
    pub unsafe fn consume(&mut self) -> Result<Trade> {
        // SAFETY: ownership of every string transfers here, once.
        let (id, buyer, seller, market, price, qty, fees) = unsafe {
            (
                consume_cstring(self.id),
                consume_opt_cstring(self.buyer_order_id),
                consume_opt_cstring(self.seller_order_id),
                consume_cstring(self.market_pair),
                consume_cstring(self.price),
                consume_cstring(self.qty),
                consume_opt_cstring(self.fees),
            )
        };
        self.id = std::ptr::null_mut();
        self.buyer_order_id = std::ptr::null_mut();
        self.seller_order_id = std::ptr::null_mut();
        self.market_pair = std::ptr::null_mut();
        self.price = std::ptr::null_mut();
        self.qty = std::ptr::null_mut();
        self.fees = std::ptr::null_mut();
        Ok(Trade {
            id,
            buyer_order_id: buyer,
            seller_order_id: seller,
            market_pair: market,
            price: parse_decimal(&price, "trade price")?,
            qty: parse_decimal(&qty, "trade qty")?,
            fees: parse_opt_decimal(fees, "trade fees")?,
            side: self.side.into(),
            liquidity: self.liquidity.into(),
            created_at: self.created_at,
        })
    }

}

/// One order on the wire.
#[repr(C)]
#[derive(Debug)]
pub struct FfiOrder {
    /// Venue-assigned identifier.
    pub id: *mut c_char,
    /// Market the order rests on.
    pub market_pair: *mut c_char,
    /// Caller-assigned identifier, or null.
    pub client_order_id: *mut c_char,
    /// Creation time, milliseconds since the epoch.
    pub created_at: u64,
    /// Order type.
    pub order_type: FfiOrderType,
    /// Side.
    pub side: FfiSide,
    /// Lifecycle state.
    pub status: FfiOrderStatus,
    /// Original size, decimal string.
    pub size: *mut c_char,
    /// Limit price, decimal string, or null.
    pub price: *mut c_char,
    /// Unfilled remainder, decimal string, or null.
    pub remaining: *mut c_char,
}

impl From<Order> for FfiOrder {
    fn from(order: Order) -> Self {
        Self {
            id: owned_string(&order.id),
            market_pair: owned_string(&order.market_pair),
            client_order_id: opt_owned_string(order.client_order_id.as_deref()),
            created_at: order.created_at,
            order_type: order.order_type.into(),
            side: order.side.into(),
            status: order.status.into(),
            size: owned_string(&order.size.to_string()),
            price: opt_owned_string(order.price.map(|p| p.to_string()).as_deref()),
            remaining: opt_owned_string(order.remaining.map(|r| r.to_string()).as_deref()),
        }
    }
}

impl FfiOrder {
    /// Read the record and release its strings in one step.
    ///
    /// # Errors
    ///
    /// `ParseDecimal` when a decimal field does not parse; the strings
    /// are released regardless.
    ///
    /// # Safety
    ///
    /// The record must have been produced by this library and not yet
    /// consumed or released.
    pub unsafe fn consume(&mut self) -> Result<Order> {
        // SAFETY: ownership of every string transfers here, once.
        let (id, market, client_id, size, price, remaining) = unsafe {
            (
                consume_cstring(self.id),
                consume_cstring(self.market_pair),
                consume_opt_cstring(self.client_order_id),
                consume_cstring(self.size),
                consume_opt_cstring(self.price),
                consume_opt_cstring(self.remaining),
            )
        };
        self.id = std::ptr::null_mut();
        self.market_pair = std::ptr::null_mut();
        self.client_order_id = std::ptr::null_mut();
        self.size = std::ptr::null_mut();
        self.price = std::ptr::null_mut();
        self.remaining = std::ptr::null_mut();
        Ok(Order {
            id,
            market_pair: market,
            client_order_id: client_id,
            created_at: self.created_at,
            order_type: self.order_type.into(),
            side: self.side.into(),
            status: self.status.into(),
            size: parse_decimal(&size, "order size")?,
            price: parse_opt_decimal(price, "order price")?,
            remaining: parse_opt_decimal(remaining, "order remaining")?,
        })
    }
}

/// One asset balance on the wire.
#[repr(C)]
#[derive(Debug)]
pub struct FfiBalance {
    /// Asset symbol.
    pub asset: *mut c_char,
    /// Total balance, decimal string.
    pub total: *mut c_char,
    /// Free balance, decimal string.
    pub free: *mut c_char,
}

impl From<Balance> for FfiBalance {
    fn from(balance: Balance) -> Self {
        Self {
            asset: owned_string(&balance.asset),
            total: owned_string(&balance.total.to_string()),
            free: owned_string(&balance.free.to_string()),
        }
    }
}

impl FfiBalance {
    /// Read the record and release its strings in one step.
    ///
    /// # Errors
    ///
    /// `ParseDecimal` when a decimal field does not parse; the strings
    /// are released regardless.
    ///
    /// # Safety
    ///
    /// The record must have been produced by this library and not yet
    /// consumed or released.
    pub unsafe fn consume(&mut self) -> Result<Balance> {
        // SAFETY: ownership of every string transfers here, once.
        let (asset, total, free) = unsafe {
            (
                consume_cstring(self.asset),
                consume_cstring(self.total),
                consume_cstring(self.free),
            )
        };
        self.asset = std::ptr::null_mut();
        self.total = std::ptr::null_mut();
        self.free = std::ptr::null_mut();
        Ok(Balance {
            asset,
            total: parse_decimal(&total, "balance total")?,
            free: parse_decimal(&free, "balance free")?,
        })
    }
}

/// One market pair on the wire.
#[repr(C)]
#[derive(Debug)]
pub struct FfiMarketPair {
    /// Base asset symbol.
    pub base: *mut c_char,
    /// Quote asset symbol.
    pub quote: *mut c_char,
    /// Venue symbol for the pair.
    pub symbol: *mut c_char,
    /// Smallest base quantity step, decimal string.
    pub base_increment: *mut c_char,
    /// Smallest quote price step, decimal string.
    pub quote_increment: *mut c_char,
    /// Minimum base price, decimal string, or null.
    pub min_base_price: *mut c_char,
    /// Minimum quote price, decimal string, or null.
    pub min_quote_price: *mut c_char,
}

impl From<MarketPair> for FfiMarketPair {
    fn from(pair: MarketPair) -> Self {
        Self {
            base: owned_string(&pair.base),
            quote: owned_string(&pair.quote),
            symbol: owned_string(&pair.symbol),
            base_increment: owned_string(&pair.base_increment.to_string()),
            quote_increment: owned_string(&pair.quote_increment.to_string()),
            min_base_price: opt_owned_string(pair.min_base_price.map(|p| p.to_string()).as_deref()),
            min_quote_price: opt_owned_string(
                pair.min_quote_price.map(|p| p.to_string()).as_deref(),
            ),
        }
    }
}

impl FfiMarketPair {
    /// Read the record and release its strings in one step.
    ///
    /// # Errors
    ///
    /// `ParseDecimal` when a decimal field does not parse; the strings
    /// are released regardless.
    ///
    /// # Safety
    ///
    /// The record must have been produced by this library and not yet
    /// consumed or released.
    pub unsafe fn consume(&mut self) -> Result<MarketPair> {
        // SAFETY: ownership of every string transfers here, once.
        let (base, quote, symbol, base_inc, quote_inc, min_base, min_quote) = unsafe {
            (
                consume_cstring(self.base),
                consume_cstring(self.quote),
                consume_cstring(self.symbol),
                consume_cstring(self.base_increment),
                consume_cstring(self.quote_increment),
                consume_opt_cstring(self.min_base_price),
                consume_opt_cstring(self.min_quote_price),
            )
        };
        *self = Self {
            base: std::ptr::null_mut(),
            quote: std::ptr::null_mut(),
            symbol: std::ptr::null_mut(),
            base_increment: std::ptr::null_mut(),
            quote_increment: std::ptr::null_mut(),
            min_base_price: std::ptr::null_mut(),
            min_quote_price: std::ptr::null_mut(),
        };
        Ok(MarketPair {
            base,
            quote,
            symbol,
            base_increment: parse_decimal(&base_inc, "pair base increment")?,
            quote_increment: parse_decimal(&quote_inc, "pair quote increment")?,
            min_base_price: parse_opt_decimal(min_base, "pair min base price")?,
            min_quote_price: parse_opt_decimal(min_quote, "pair min quote price")?,
        })
    }
}

/// One OHLCV candle on the wire. Plain numerics, nothing to release.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FfiCandle {
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

impl From<Candle> for FfiCandle {
    fn from(candle: Candle) -> Self {
        Self {
            time: candle.time,
            low: candle.low,
            high: candle.high,
            open: candle.open,
            close: candle.close,
            volume: candle.volume,
        }
    }
}

impl From<FfiCandle> for Candle {
    fn from(candle: FfiCandle) -> Self {
        Self {
            time: candle.time,
            low: candle.low,
            high: candle.high,
            open: candle.open,
            close: candle.close,
            volume: candle.volume,
        }
    }
}

/// Pagination window in the host→native direction.
///
/// Zero scalars and null cursors mean "unset". The cursor strings are
/// borrowed for the duration of the call, caller-owned.
#[repr(C)]
#[derive(Debug)]
pub struct FfiPaginator {
    /// Inclusive window start, milliseconds since the epoch; 0 = unset.
    pub start_time: u64,
    /// Inclusive window end, milliseconds since the epoch; 0 = unset.
    pub end_time: u64,
    /// Maximum record count; 0 = unset.
    pub limit: u64,
    /// Records before this cursor, or null.
    pub before: *const c_char,
    /// Records after this cursor, or null.
    pub after: *const c_char,
}

impl FfiPaginator {
    /// Encode a pagination window for a boundary call.
    #[must_use]
    pub fn encode(paginator: &Paginator, before: &CursorStrings) -> Self {
        Self {
            start_time: paginator.start_time.unwrap_or(0),
            end_time: paginator.end_time.unwrap_or(0),
            limit: paginator.limit.unwrap_or(0),
            before: before.before_ptr(),
            after: before.after_ptr(),
        }
    }
}

/// NUL-terminated cursor storage backing an [`FfiPaginator`].
///
/// The paginator borrows these; the caller keeps this alive across the
/// boundary call.
#[derive(Debug, Default)]
pub struct CursorStrings {
    before: Option<std::ffi::CString>,
    after: Option<std::ffi::CString>,
}

impl CursorStrings {
    /// Build cursor storage from a pagination window.
    #[must_use]
    pub fn new(paginator: &Paginator) -> Self {
        Self {
            before: paginator
                .before
                .as_deref()
                .and_then(|c| std::ffi::CString::new(c).ok()),
            after: paginator
                .after
                .as_deref()
                .and_then(|c| std::ffi::CString::new(c).ok()),
        }
    }

    fn before_ptr(&self) -> *const c_char {
        self.before
            .as_ref()
            .map_or(std::ptr::null(), |c| c.as_ptr())
    }

    fn after_ptr(&self) -> *const c_char {
        self.after.as_ref().map_or(std::ptr::null(), |c| c.as_ptr())
    }
}

/// Decode an optional paginator argument.
///
/// # Safety
///
/// `ptr` must be null or point to a valid [`FfiPaginator`] whose cursor
/// strings outlive the call.
pub(crate) unsafe fn read_paginator(ptr: *const FfiPaginator) -> Result<Option<Paginator>> {
    if ptr.is_null() {
        return Ok(None);
    }
    // SAFETY: ptr is non-null and valid per the caller contract
    let raw = unsafe { &*ptr };
    let none_if_zero = |v: u64| (v != 0).then_some(v);
    // SAFETY: cursor strings are valid per the caller contract
    let (before, after) = unsafe {
        (
            opt_arg_str(raw.before, "paginator before")?,
            opt_arg_str(raw.after, "paginator after")?,
        )
    };
    Ok(Some(Paginator {
        start_time: none_if_zero(raw.start_time),
        end_time: none_if_zero(raw.end_time),
        limit: none_if_zero(raw.limit),
        before: before.map(ToOwned::to_owned),
        after: after.map(ToOwned::to_owned),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order() -> Order {
        Order {
            id: "PAPER-7".into(),
            market_pair: "BTC-USD".into(),
            client_order_id: None,
            created_at: 1_700_000_000_000,
            order_type: OrderType::Limit,
            side: Side::Sell,
            status: OrderStatus::Open,
            size: Decimal::new(15, 1),
            price: Some(Decimal::from(30_000)),
            remaining: Some(Decimal::new(15, 1)),
        }
    }

    #[test]
    fn test_order_round_trip() {
        let original = sample_order();
        let mut record = FfiOrder::from(original.clone());
        assert!(record.client_order_id.is_null());
        assert!(!record.price.is_null());

        // SAFETY: record was just produced and is unconsumed
        let back = unsafe { record.consume() }.unwrap();
        assert_eq!(back, original);
        // All string fields were nulled by the consume.
        assert!(record.id.is_null());
        assert!(record.price.is_null());
    }

    #[test]
    fn test_trade_round_trip() {
        let original = Trade {
            id: "t-1".into(),
            buyer_order_id: Some("b-1".into()),
            seller_order_id: None,
            market_pair: "ETH-USD".into(),
            price: Decimal::from(2_000),
            qty: Decimal::new(25, 2),
            fees: Some(Decimal::new(1, 3)),
            side: Side::Buy,
            liquidity: Liquidity::Taker,
            created_at: 42,
        };
        let mut record = FfiTrade::from(original.clone());
        // SAFETY: record was just produced and is unconsumed
        let back = unsafe { record.consume() }.unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn test_pair_round_trip() {
        let original = MarketPair {
            base: "BTC".into(),
            quote: "USD".into(),
            symbol: "BTC-USD".into(),
            base_increment: Decimal::new(1, 8),
            quote_increment: Decimal::new(1, 2),
            min_base_price: None,
            min_quote_price: Some(Decimal::new(1, 2)),
        };
        let mut record = FfiMarketPair::from(original.clone());
        // SAFETY: record was just produced and is unconsumed
        let back = unsafe { record.consume() }.unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn test_paginator_zero_means_unset() {
        let raw = FfiPaginator {
            start_time: 0,
            end_time: 9,
            limit: 0,
            before: std::ptr::null(),
            after: std::ptr::null(),
        };
        // SAFETY: raw is a valid stack value with null cursors
        let decoded = unsafe { read_paginator(&raw) }.unwrap().unwrap();
        assert_eq!(decoded.start_time, None);
        assert_eq!(decoded.end_time, Some(9));
        assert_eq!(decoded.limit, None);
        assert_eq!(decoded.before, None);

        // SAFETY: null is explicitly allowed
        assert_eq!(unsafe { read_paginator(std::ptr::null()) }.unwrap(), None);
    }

    #[test]
    fn test_paginator_encode_round_trip() {
        let paginator = Paginator {
            start_time: Some(1),
            end_time: None,
            limit: Some(50),
            before: Some("cur-b".into()),
            after: None,
        };
        let cursors = CursorStrings::new(&paginator);
        let raw = FfiPaginator::encode(&paginator, &cursors);
        // SAFETY: raw borrows cursors, which are still alive
        let decoded = unsafe { read_paginator(&raw) }.unwrap().unwrap();
        assert_eq!(decoded, paginator);
    }

    #[test]
    fn test_time_in_force_decoding() {
        assert_eq!(
            time_in_force_from_raw(0, 0).unwrap(),
            TimeInForce::GoodTillCancelled
        );
        assert_eq!(
            time_in_force_from_raw(3, 5_000).unwrap(),
            TimeInForce::GoodTillTime(Duration::from_millis(5_000))
        );
        assert!(time_in_force_from_raw(9, 0).is_err());
    }

    #[test]
    fn test_interval_decoding() {
        assert_eq!(interval_from_u32(0).unwrap(), Interval::OneMinute);
        assert_eq!(interval_from_u32(5).unwrap(), Interval::OneDay);
        assert!(interval_from_u32(6).is_err());
    }

    #[test]
    fn test_scalar_encodings_invert() {
        for interval in [
            Interval::OneMinute,
            Interval::FiveMinutes,
            Interval::FifteenMinutes,
            Interval::OneHour,
            Interval::SixHours,
            Interval::OneDay,
        ] {
            assert_eq!(
                interval_from_u32(interval_to_u32(interval)).unwrap(),
                interval
            );
        }
        let (kind, duration) = time_in_force_to_raw(TimeInForce::GoodTillTime(
            Duration::from_millis(1_500),
        ));
        assert_eq!(
            time_in_force_from_raw(kind, duration).unwrap(),
            TimeInForce::GoodTillTime(Duration::from_millis(1_500))
        );
    }
}
