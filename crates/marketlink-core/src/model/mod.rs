//! Domain model shared by the engine trait and the boundary layer.
//!
//! Decimal quantities are `rust_decimal::Decimal` in the model; across the
//! C boundary they travel as owned strings and are re-parsed on arrival,
//! which keeps the fixed-layout records free of any particular decimal
//! representation.

mod account;
mod market;
mod order;

pub use account::{Balance, Trade};
pub use market::{AskBid, Candle, Interval, MarketPair, OrderbookSnapshot};
pub use order::{Order, OrderRequest, OrderStatus, OrderType, Side, TimeInForce};

/// Pagination window accepted by the historic and history snapshot calls.
///
/// All fields are optional; `limit` doubles as a sizing hint for the
/// caller's record buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Paginator {
    /// Inclusive start of the window, milliseconds since the epoch.
    pub start_time: Option<u64>,
    /// Inclusive end of the window, milliseconds since the epoch.
    pub end_time: Option<u64>,
    /// Maximum number of records the caller wants.
    pub limit: Option<u64>,
    /// Opaque cursor: return records before this one.
    pub before: Option<String>,
    /// Opaque cursor: return records after this one.
    pub after: Option<String>,
}

/// Liquidity role of a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Liquidity {
    /// Resting order, added liquidity.
    Maker,
    /// Aggressing order, removed liquidity.
    Taker,
}
