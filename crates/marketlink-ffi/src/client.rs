//! Client lifecycle and the snapshot entry points.
//!
//! A client handle wraps one engine behind the boundary. Every snapshot
//! and order operation here follows the same shape: check out-pointers,
//! borrow string arguments, resolve the handle, call the engine, marshal
//! the answer into caller-owned memory, and collapse the outcome into an
//! [`FfiResult`].

use std::ffi::c_char;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::prelude::ToPrimitive;
use tracing::debug;

use marketlink_core::model::OrderRequest;
use marketlink_core::{ExchangeError, ExchangeEngine, PaperConfig, PaperExchange, Result};

use crate::buffer::FixedBuffer;
use crate::handle::HandleTable;
use crate::record::{
    interval_from_u32, read_paginator, time_in_force_from_raw, FfiAskBid, FfiBalance, FfiCandle,
    FfiMarketPair, FfiOrder, FfiPaginator, FfiSide, FfiTrade,
};
use crate::result::{ffi_result, FfiResult};
use crate::string::{arg_str, opt_arg_str, owned_string};

/// Live clients, keyed by the handle crossing the boundary.
static CLIENTS: HandleTable<Arc<dyn ExchangeEngine>> = HandleTable::new("clients");

/// Register an engine and mint a client handle for it.
///
/// This is the seam where venue engines bind: anything implementing
/// [`ExchangeEngine`] becomes drivable through the C surface. The shipped
/// `init_paper` entry point is exactly this call over a
/// [`PaperExchange`].
pub fn register_engine(engine: Arc<dyn ExchangeEngine>) -> u64 {
    CLIENTS.insert(engine)
}

/// Release a client handle registered through [`register_engine`].
///
/// Only needed for clients that never went through subscription setup;
/// `disconnect` releases the client together with its subscription.
/// Returns whether the handle was still live.
pub fn unregister_engine(client: u64) -> bool {
    CLIENTS.remove(client).is_some()
}

/// Resolve a client handle.
pub(crate) fn resolve_client(client: u64) -> Result<Arc<dyn ExchangeEngine>> {
    CLIENTS
        .get(client)
        .ok_or_else(|| ExchangeError::invalid_argument(format!("unknown client handle {client}")))
}

fn require_out<T>(ptr: *mut T, name: &str) -> Result<()> {
    if ptr.is_null() {
        return Err(ExchangeError::missing_parameter(format!(
            "{name} out-pointer is null"
        )));
    }
    Ok(())
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Create a paper-trading client.
///
/// # Arguments
///
/// * `api_key` - API key, or NULL for none (private calls will fail)
/// * `api_secret` - API secret, or NULL
/// * `sandbox` - Route to the venue sandbox
/// * `timeout_ms` - Request timeout in milliseconds
/// * `out_client` - Receives the client handle
///
/// # Safety
///
/// String arguments must be NULL or valid NUL-terminated strings;
/// `out_client` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn init_paper(
    api_key: *const c_char,
    api_secret: *const c_char,
    sandbox: bool,
    timeout_ms: u64,
    out_client: *mut u64,
) -> FfiResult {
    // SAFETY: forwarded caller contract
    ffi_result(unsafe { init_paper_impl(api_key, api_secret, sandbox, timeout_ms, out_client) })
}

unsafe fn init_paper_impl(
    api_key: *const c_char,
    api_secret: *const c_char,
    sandbox: bool,
    timeout_ms: u64,
    out_client: *mut u64,
) -> Result<()> {
    require_out(out_client, "client")?;
    // SAFETY: caller contract, null allowed
    let api_key = unsafe { opt_arg_str(api_key, "api_key")? }.unwrap_or_default();
    // SAFETY: caller contract, null allowed
    let api_secret = unsafe { opt_arg_str(api_secret, "api_secret")? }.unwrap_or_default();

    let config = PaperConfig {
        api_key: api_key.to_owned(),
        api_secret: api_secret.to_owned(),
        sandbox,
        timeout: Duration::from_millis(timeout_ms),
    };
    let client = register_engine(Arc::new(PaperExchange::new(config)));
    debug!(client, "paper client created");
    // SAFETY: out_client is non-null per the check above
    unsafe { *out_client = client };
    Ok(())
}

// ============================================================================
// Market data snapshots
// ============================================================================

/// Fetch an order-book snapshot into caller-owned level buffers.
///
/// Writes at most `bid_capacity` / `ask_capacity` levels and reports the
/// written counts; surplus levels are dropped.
///
/// # Safety
///
/// * `market` must be a valid NUL-terminated string
/// * `bid_buf` / `ask_buf` must be valid for their capacities (or NULL
///   with zero capacity)
/// * the out-pointers must be valid
#[no_mangle]
pub unsafe extern "C" fn order_book(
    client: u64,
    market: *const c_char,
    bid_buf: *mut FfiAskBid,
    bid_capacity: usize,
    ask_buf: *mut FfiAskBid,
    ask_capacity: usize,
    out_bid_count: *mut usize,
    out_ask_count: *mut usize,
    out_last_update_id: *mut u64,
    out_update_id: *mut u64,
) -> FfiResult {
    let outcome = || -> Result<()> {
        require_out(out_bid_count, "bid count")?;
        require_out(out_ask_count, "ask count")?;
        require_out(out_last_update_id, "last update id")?;
        require_out(out_update_id, "update id")?;
        // SAFETY: caller contract
        let market = unsafe { arg_str(market, "market")? };
        // SAFETY: caller guarantees buffer validity
        let mut bids = unsafe { FixedBuffer::new(bid_buf, bid_capacity, "bids")? };
        // SAFETY: caller guarantees buffer validity
        let mut asks = unsafe { FixedBuffer::new(ask_buf, ask_capacity, "asks")? };

        let book = resolve_client(client)?.order_book(market)?;
        // SAFETY: out-pointers are non-null per the checks above
        unsafe {
            *out_bid_count = bids.fill(book.bids, FfiAskBid::from);
            *out_ask_count = asks.fill(book.asks, FfiAskBid::from);
            *out_last_update_id = book.last_update_id;
            *out_update_id = book.update_id;
        }
        Ok(())
    }();
    ffi_result(outcome)
}

/// Fetch the current price for a market.
///
/// # Safety
///
/// `market` must be a valid NUL-terminated string; `out_price` must be a
/// valid pointer.
#[no_mangle]
pub unsafe extern "C" fn get_price_ticker(
    client: u64,
    market: *const c_char,
    out_price: *mut f64,
) -> FfiResult {
    let outcome = || -> Result<()> {
        require_out(out_price, "price")?;
        // SAFETY: caller contract
        let market = unsafe { arg_str(market, "market")? };
        let price = resolve_client(client)?.price_ticker(market)?;
        let price = price.to_f64().ok_or_else(|| {
            ExchangeError::ParseDecimal(format!("price {price} does not fit in an f64"))
        })?;
        // SAFETY: out_price is non-null per the check above
        unsafe { *out_price = price };
        Ok(())
    }();
    ffi_result(outcome)
}

/// Fetch historic candles into a caller-owned buffer.
///
/// # Safety
///
/// * `market` must be a valid NUL-terminated string
/// * `paginator` must be NULL or valid for the duration of the call
/// * `buf` must be valid for `capacity` records (or NULL with zero)
/// * `out_count` must be a valid pointer
#[no_mangle]
pub unsafe extern "C" fn get_historic_rates(
    client: u64,
    market: *const c_char,
    interval: u32,
    paginator: *const FfiPaginator,
    buf: *mut FfiCandle,
    capacity: usize,
    out_count: *mut usize,
) -> FfiResult {
    let outcome = || -> Result<()> {
        require_out(out_count, "candle count")?;
        // SAFETY: caller contract
        let market = unsafe { arg_str(market, "market")? };
        let interval = interval_from_u32(interval)?;
        // SAFETY: caller contract
        let paginator = unsafe { read_paginator(paginator)? };
        // SAFETY: caller guarantees buffer validity
        let mut buffer = unsafe { FixedBuffer::new(buf, capacity, "candles")? };

        let candles =
            resolve_client(client)?.historic_rates(market, interval, paginator.as_ref())?;
        // SAFETY: out_count is non-null per the check above
        unsafe { *out_count = buffer.fill(candles, FfiCandle::from) };
        Ok(())
    }();
    ffi_result(outcome)
}

/// Fetch historic public trades into a caller-owned buffer.
///
/// # Safety
///
/// Same contract as [`get_historic_rates`], with trade records.
#[no_mangle]
pub unsafe extern "C" fn get_historic_trades(
    client: u64,
    market: *const c_char,
    paginator: *const FfiPaginator,
    buf: *mut FfiTrade,
    capacity: usize,
    out_count: *mut usize,
) -> FfiResult {
    let outcome = || -> Result<()> {
        require_out(out_count, "trade count")?;
        // SAFETY: caller contract
        let market = unsafe { arg_str(market, "market")? };
        // SAFETY: caller contract
        let paginator = unsafe { read_paginator(paginator)? };
        // SAFETY: caller guarantees buffer validity
        let mut buffer = unsafe { FixedBuffer::new(buf, capacity, "trades")? };

        let trades = resolve_client(client)?.historic_trades(market, paginator.as_ref())?;
        // SAFETY: out_count is non-null per the check above
        unsafe { *out_count = buffer.fill(trades, FfiTrade::from) };
        Ok(())
    }();
    ffi_result(outcome)
}

/// Fetch the venue's market-pair catalogue into a caller-owned buffer.
///
/// # Safety
///
/// `buf` must be valid for `capacity` records (or NULL with zero);
/// `out_count` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn receive_pairs(
    client: u64,
    buf: *mut FfiMarketPair,
    capacity: usize,
    out_count: *mut usize,
) -> FfiResult {
    let outcome = || -> Result<()> {
        require_out(out_count, "pair count")?;
        // SAFETY: caller guarantees buffer validity
        let mut buffer = unsafe { FixedBuffer::new(buf, capacity, "pairs")? };
        let pairs = resolve_client(client)?.market_pairs()?;
        // SAFETY: out_count is non-null per the check above
        unsafe { *out_count = buffer.fill(pairs, FfiMarketPair::from) };
        Ok(())
    }();
    ffi_result(outcome)
}

// ============================================================================
// Account snapshots
// ============================================================================

/// Fetch all open orders into a caller-owned buffer.
///
/// # Safety
///
/// `buf` must be valid for `capacity` records (or NULL with zero);
/// `out_count` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn get_all_open_orders(
    client: u64,
    buf: *mut FfiOrder,
    capacity: usize,
    out_count: *mut usize,
) -> FfiResult {
    let outcome = || -> Result<()> {
        require_out(out_count, "order count")?;
        // SAFETY: caller guarantees buffer validity
        let mut buffer = unsafe { FixedBuffer::new(buf, capacity, "orders")? };
        let orders = resolve_client(client)?.open_orders()?;
        // SAFETY: out_count is non-null per the check above
        unsafe { *out_count = buffer.fill(orders, FfiOrder::from) };
        Ok(())
    }();
    ffi_result(outcome)
}

/// Fetch closed and cancelled orders into a caller-owned buffer.
///
/// # Safety
///
/// * `market` must be NULL or a valid NUL-terminated string
/// * `paginator` must be NULL or valid for the duration of the call
/// * `buf` must be valid for `capacity` records (or NULL with zero)
/// * `out_count` must be a valid pointer
#[no_mangle]
pub unsafe extern "C" fn get_order_history(
    client: u64,
    market: *const c_char,
    paginator: *const FfiPaginator,
    buf: *mut FfiOrder,
    capacity: usize,
    out_count: *mut usize,
) -> FfiResult {
    let outcome = || -> Result<()> {
        require_out(out_count, "order count")?;
        // SAFETY: caller contract, null allowed
        let market = unsafe { opt_arg_str(market, "market")? };
        // SAFETY: caller contract
        let paginator = unsafe { read_paginator(paginator)? };
        // SAFETY: caller guarantees buffer validity
        let mut buffer = unsafe { FixedBuffer::new(buf, capacity, "orders")? };

        let orders = resolve_client(client)?.order_history(market, paginator.as_ref())?;
        // SAFETY: out_count is non-null per the check above
        unsafe { *out_count = buffer.fill(orders, FfiOrder::from) };
        Ok(())
    }();
    ffi_result(outcome)
}

/// Fetch account fills into a caller-owned buffer.
///
/// # Safety
///
/// Same contract as [`get_order_history`], with an optional `order_id`
/// filter and trade records.
#[no_mangle]
pub unsafe extern "C" fn get_trade_history(
    client: u64,
    market: *const c_char,
    order_id: *const c_char,
    paginator: *const FfiPaginator,
    buf: *mut FfiTrade,
    capacity: usize,
    out_count: *mut usize,
) -> FfiResult {
    let outcome = || -> Result<()> {
        require_out(out_count, "trade count")?;
        // SAFETY: caller contract, null allowed
        let market = unsafe { opt_arg_str(market, "market")? };
        // SAFETY: caller contract, null allowed
        let order_id = unsafe { opt_arg_str(order_id, "order_id")? };
        // SAFETY: caller contract
        let paginator = unsafe { read_paginator(paginator)? };
        // SAFETY: caller guarantees buffer validity
        let mut buffer = unsafe { FixedBuffer::new(buf, capacity, "trades")? };

        let trades =
            resolve_client(client)?.trade_history(market, order_id, paginator.as_ref())?;
        // SAFETY: out_count is non-null per the check above
        unsafe { *out_count = buffer.fill(trades, FfiTrade::from) };
        Ok(())
    }();
    ffi_result(outcome)
}

/// Fetch account balances into a caller-owned buffer.
///
/// # Safety
///
/// `paginator` must be NULL or valid for the duration of the call;
/// `buf` must be valid for `capacity` records (or NULL with zero);
/// `out_count` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn get_account_balances(
    client: u64,
    paginator: *const FfiPaginator,
    buf: *mut FfiBalance,
    capacity: usize,
    out_count: *mut usize,
) -> FfiResult {
    let outcome = || -> Result<()> {
        require_out(out_count, "balance count")?;
        // SAFETY: caller contract
        let paginator = unsafe { read_paginator(paginator)? };
        // SAFETY: caller guarantees buffer validity
        let mut buffer = unsafe { FixedBuffer::new(buf, capacity, "balances")? };

        let balances = resolve_client(client)?.account_balances(paginator.as_ref())?;
        // SAFETY: out_count is non-null per the check above
        unsafe { *out_count = buffer.fill(balances, FfiBalance::from) };
        Ok(())
    }();
    ffi_result(outcome)
}

// ============================================================================
// Orders
// ============================================================================

/// Place an order and write the acknowledged record.
///
/// A null `price` places a market order. Time-in-force crosses as a
/// `(kind, duration_ms)` pair; the duration only applies to kind 3
/// (good-till-time).
///
/// # Safety
///
/// * `market` and `size` must be valid NUL-terminated strings
/// * `price` must be NULL or a valid NUL-terminated string
/// * `out_order` must be a valid pointer
#[no_mangle]
pub unsafe extern "C" fn place_order(
    client: u64,
    market: *const c_char,
    size: *const c_char,
    price: *const c_char,
    side: u32,
    tif_kind: u32,
    tif_duration_ms: u64,
    post_only: bool,
    out_order: *mut FfiOrder,
) -> FfiResult {
    let outcome = || -> Result<()> {
        require_out(out_order, "order")?;
        // SAFETY: caller contract
        let market = unsafe { arg_str(market, "market")? };
        // SAFETY: caller contract
        let size = unsafe { arg_str(size, "size")? };
        // SAFETY: caller contract, null allowed
        let price = unsafe { opt_arg_str(price, "price")? };
        let side = FfiSide::from_u32(side).ok_or_else(|| {
            ExchangeError::invalid_argument(format!("unknown side discriminant {side}"))
        })?;

        let request = OrderRequest {
            market: market.to_owned(),
            size: size.to_owned(),
            price: price.map(ToOwned::to_owned),
            side: side.into(),
            time_in_force: time_in_force_from_raw(tif_kind, tif_duration_ms)?,
            post_only,
        };
        let order = resolve_client(client)?.place_order(&request)?;
        // SAFETY: out_order is non-null per the check above
        unsafe { out_order.write(FfiOrder::from(order)) };
        Ok(())
    }();
    ffi_result(outcome)
}

/// Look up one order by id and write its record.
///
/// # Safety
///
/// * `order_id` must be a valid NUL-terminated string
/// * `market` must be NULL or a valid NUL-terminated string
/// * `out_order` must be a valid pointer
#[no_mangle]
pub unsafe extern "C" fn get_order(
    client: u64,
    order_id: *const c_char,
    market: *const c_char,
    out_order: *mut FfiOrder,
) -> FfiResult {
    let outcome = || -> Result<()> {
        require_out(out_order, "order")?;
        // SAFETY: caller contract
        let order_id = unsafe { arg_str(order_id, "order_id")? };
        // SAFETY: caller contract, null allowed
        let market = unsafe { opt_arg_str(market, "market")? };
        let order = resolve_client(client)?.get_order(order_id, market)?;
        // SAFETY: out_order is non-null per the check above
        unsafe { out_order.write(FfiOrder::from(order)) };
        Ok(())
    }();
    ffi_result(outcome)
}

/// Cancel one order by id.
///
/// # Safety
///
/// `order_id` must be a valid NUL-terminated string; `market` must be
/// NULL or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn cancel_order(
    client: u64,
    order_id: *const c_char,
    market: *const c_char,
) -> FfiResult {
    let outcome = || -> Result<()> {
        // SAFETY: caller contract
        let order_id = unsafe { arg_str(order_id, "order_id")? };
        // SAFETY: caller contract, null allowed
        let market = unsafe { opt_arg_str(market, "market")? };
        resolve_client(client)?.cancel_order(order_id, market)
    }();
    ffi_result(outcome)
}

/// Cancel every open order, optionally restricted to one market, writing
/// the cancelled ids as owned strings into a caller-owned buffer.
///
/// Each written id must be released with `free_string`.
///
/// # Safety
///
/// * `market` must be NULL or a valid NUL-terminated string
/// * `buf` must be valid for `capacity` pointers (or NULL with zero)
/// * `out_count` must be a valid pointer
#[no_mangle]
pub unsafe extern "C" fn cancel_all_orders(
    client: u64,
    market: *const c_char,
    buf: *mut *mut c_char,
    capacity: usize,
    out_count: *mut usize,
) -> FfiResult {
    let outcome = || -> Result<()> {
        require_out(out_count, "id count")?;
        // SAFETY: caller contract, null allowed
        let market = unsafe { opt_arg_str(market, "market")? };
        // SAFETY: caller guarantees buffer validity
        let mut buffer = unsafe { FixedBuffer::new(buf, capacity, "order ids")? };

        let ids = resolve_client(client)?.cancel_all_orders(market)?;
        // SAFETY: out_count is non-null per the check above
        unsafe { *out_count = buffer.fill(ids, |id| owned_string(&id)) };
        Ok(())
    }();
    ffi_result(outcome)
}
