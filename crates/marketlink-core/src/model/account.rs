//! Account-scoped types: balances and fills.

use rust_decimal::Decimal;

use super::order::Side;
use super::Liquidity;

/// Balance of one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Balance {
    /// Asset symbol.
    pub asset: String,
    /// Total balance including holds.
    pub total: Decimal,
    /// Freely usable balance.
    pub free: Decimal,
}

/// A single fill, either historic market data or an account trade.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    /// Venue trade identifier.
    pub id: String,
    /// Buyer's order id, when reported.
    pub buyer_order_id: Option<String>,
    /// Seller's order id, when reported.
    pub seller_order_id: Option<String>,
    /// Market the trade printed on.
    pub market_pair: String,
    /// Execution price.
    pub price: Decimal,
    /// Executed quantity.
    pub qty: Decimal,
    /// Fees charged, when reported.
    pub fees: Option<Decimal>,
    /// Aggressor side.
    pub side: Side,
    /// Liquidity role of the reporting account.
    pub liquidity: Liquidity,
    /// Execution time, milliseconds since the epoch.
    pub created_at: u64,
}
