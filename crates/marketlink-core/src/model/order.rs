//! Order types and the request that places one.

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::error::{ExchangeError, Result};

/// Side of an order or trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Bid side.
    Buy,
    /// Ask side.
    Sell,
}

/// Order type reported by the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderType {
    /// Resting order at a fixed price.
    Limit,
    /// Immediate execution at the touch.
    Market,
    /// Limit order armed by a stop price.
    StopLimit,
    /// Market order armed by a stop price.
    StopMarket,
    /// Venue-specific type this boundary does not model.
    Unknown,
}

/// Lifecycle state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    /// Accepted, not yet filled.
    New,
    /// Some quantity executed.
    PartiallyFilled,
    /// Fully executed.
    Filled,
    /// Cancelled by the owner.
    Canceled,
    /// Cancel requested, not yet confirmed.
    PendingCancel,
    /// Refused by the venue.
    Rejected,
    /// Expired by time-in-force.
    Expired,
    /// Resting on the book.
    Open,
    /// Submitted, not yet acknowledged.
    Pending,
    /// Live (venue-specific synonym for open).
    Active,
}

/// Time-in-force policy for a limit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeInForce {
    /// Rest until cancelled.
    #[default]
    GoodTillCancelled,
    /// Fill what is immediately available, cancel the rest.
    ImmediateOrCancelled,
    /// Fill completely or cancel entirely.
    FillOrKill,
    /// Rest for the given duration, then expire.
    GoodTillTime(Duration),
}

/// An order as reported by the venue.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    /// Venue-assigned identifier.
    pub id: String,
    /// Market the order rests on.
    pub market_pair: String,
    /// Caller-assigned identifier, if any.
    pub client_order_id: Option<String>,
    /// Creation time, milliseconds since the epoch.
    pub created_at: u64,
    /// Order type.
    pub order_type: OrderType,
    /// Side.
    pub side: Side,
    /// Lifecycle state.
    pub status: OrderStatus,
    /// Original size.
    pub size: Decimal,
    /// Limit price; absent for market orders.
    pub price: Option<Decimal>,
    /// Unfilled remainder; absent when the venue does not report it.
    pub remaining: Option<Decimal>,
}

/// Parameters for placing an order.
///
/// Size and price arrive as strings (that is how they cross the boundary)
/// and are validated by [`OrderRequest::size`] / [`OrderRequest::price`]
/// before anything reaches a venue.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    /// Market to trade.
    pub market: String,
    /// Order size as a decimal string.
    pub size: String,
    /// Limit price as a decimal string; `None` places a market order.
    pub price: Option<String>,
    /// Side.
    pub side: Side,
    /// Time-in-force; ignored for market orders.
    pub time_in_force: TimeInForce,
    /// Reject instead of crossing the book.
    pub post_only: bool,
}

impl OrderRequest {
    /// Parse and validate the size field.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when the size is not a positive decimal.
    pub fn size(&self) -> Result<Decimal> {
        parse_positive(&self.size, "order size")
    }

    /// Parse and validate the price field, if present.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when a price is present but not a positive decimal.
    pub fn price(&self) -> Result<Option<Decimal>> {
        self.price
            .as_deref()
            .map(|p| parse_positive(p, "order price"))
            .transpose()
    }

    /// Whether this request places a limit order.
    #[must_use]
    pub fn is_limit(&self) -> bool {
        self.price.is_some()
    }
}

fn parse_positive(text: &str, what: &str) -> Result<Decimal> {
    let value = Decimal::from_str(text)
        .map_err(|e| ExchangeError::invalid_argument(format!("malformed {what} {text:?}: {e}")))?;
    if value <= Decimal::ZERO {
        return Err(ExchangeError::invalid_argument(format!(
            "{what} must be positive, got {value}"
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(size: &str, price: Option<&str>) -> OrderRequest {
        OrderRequest {
            market: "BTC-USD".into(),
            size: size.into(),
            price: price.map(Into::into),
            side: Side::Buy,
            time_in_force: TimeInForce::default(),
            post_only: false,
        }
    }

    #[test]
    fn test_valid_limit_request() {
        let req = request("0.5", Some("30000"));
        assert_eq!(req.size().unwrap(), Decimal::new(5, 1));
        assert_eq!(req.price().unwrap(), Some(Decimal::from(30000)));
        assert!(req.is_limit());
    }

    #[test]
    fn test_malformed_size_is_invalid_argument() {
        let req = request("not-a-number", Some("30000"));
        let err = req.size().unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidArgument(_)));
        assert!(!err.message().is_empty());
    }

    #[test]
    fn test_non_positive_size_rejected() {
        assert!(request("0", None).size().is_err());
        assert!(request("-1", None).size().is_err());
    }

    #[test]
    fn test_market_request_has_no_price() {
        let req = request("1", None);
        assert_eq!(req.price().unwrap(), None);
        assert!(!req.is_limit());
    }
}
