//! The host-side exchange client.
//!
//! `ExchangeClient` drives the C boundary the way a C#/Java/Python
//! binding would: snapshot calls marshal through caller-owned record
//! buffers, push delivery goes through `extern "C"` trampolines that
//! resolve a registry key back to host state, and every owned string
//! coming across is read and released in one step.

use std::cell::UnsafeCell;
use std::ffi::{c_char, c_void, CStr, CString};
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::Arc;
use std::time::Duration;

use fxhash::FxHashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use marketlink_core::model::{
    AskBid, Balance, Candle, Interval, MarketPair, Order, OrderRequest, OrderbookSnapshot,
    Paginator, Side, TimeInForce, Trade,
};
use marketlink_core::{
    ExchangeEngine, ExchangeError, OrderbookEvent, PaperConfig, Result, TradesEvent,
};

use marketlink_ffi as ffi;

use crate::keepalive::KeepAlive;
use crate::registry;

/// Levels each side of the streaming book arenas can hold.
const ORDERBOOK_ARENA_CAPACITY: usize = 512;
/// Trades the streaming trade arena can hold.
const TRADE_ARENA_CAPACITY: usize = 1024;
/// Default record capacity for snapshot calls.
const SNAPSHOT_CAPACITY: usize = 256;
/// Largest snapshot buffer a paginator limit can request; anything above
/// is clamped rather than allocated.
const SNAPSHOT_CAPACITY_MAX: usize = 4096;
/// Capacity for id and market-pair snapshots.
const ID_CAPACITY: usize = 1024;

/// Listener for order-book deltas.
pub type OrderbookListener = Box<dyn Fn(&OrderbookEvent) + Send>;
/// Listener for trade batches.
pub type TradesListener = Box<dyn Fn(&TradesEvent) + Send>;
/// Listener for engine-side errors.
pub type ErrorListener = Box<dyn Fn(&ExchangeError) + Send>;
/// Listener for events that carry no payload (heartbeats, disconnects).
pub type VoidListener = Box<dyn Fn() + Send>;

// ============================================================================
// Streaming arenas
// ============================================================================

/// Pinned storage the native side writes stream records into.
///
/// The cells are wrapped in `UnsafeCell` because the write happens on the
/// dispatch thread while the allocation is owned here: the protocol makes
/// the access exclusive in time (the dispatch thread writes, then blocks
/// in the callback while the host reads) rather than in the type system.
struct Arena<T> {
    cells: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

// SAFETY: the records are inert data whose pointers are only dereferenced
// by consume() during a callback, and access to the cells is serialized by
// the callback protocol — the dispatch thread writes, then blocks in the
// callback while the host reads. The impls are unconditional because the
// record types carry raw pointers and would otherwise never qualify.
unsafe impl<T> Send for Arena<T> {}
// SAFETY: see the Send impl above; the cells are never touched
// concurrently.
unsafe impl<T> Sync for Arena<T> {}

impl<T> Arena<T> {
    fn new(capacity: usize) -> Self {
        Self {
            cells: (0..capacity)
                .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
                .collect(),
        }
    }

    fn capacity(&self) -> usize {
        self.cells.len()
    }

    fn base_ptr(&self) -> *mut T {
        self.cells.as_ptr().cast::<T>().cast_mut()
    }

    /// Pointer to slot `i`.
    ///
    /// # Safety
    ///
    /// `i` must be below the capacity, and the slot must hold an
    /// initialized record when dereferenced.
    unsafe fn slot(&self, i: usize) -> *mut T {
        // SAFETY: in-bounds offset per the caller contract
        unsafe { self.base_ptr().add(i) }
    }
}

fn drain_levels(arena: &Arena<ffi::FfiAskBid>, count: usize) -> Vec<AskBid> {
    let count = count.min(arena.capacity());
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        // SAFETY: the dispatch thread wrote `count` records and is now
        // blocked inside this callback.
        let record = unsafe { &mut *arena.slot(i) };
        // SAFETY: the record is initialized and unconsumed.
        match unsafe { record.consume() } {
            Ok(level) => out.push(level),
            Err(e) => warn!(error = %e, "dropping unparsable book level"),
        }
    }
    out
}

fn drain_trades(arena: &Arena<ffi::FfiTrade>, count: usize) -> Vec<Trade> {
    let count = count.min(arena.capacity());
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        // SAFETY: same protocol as drain_levels.
        let record = unsafe { &mut *arena.slot(i) };
        // SAFETY: the record is initialized and unconsumed.
        match unsafe { record.consume() } {
            Ok(trade) => out.push(trade),
            Err(e) => warn!(error = %e, "dropping unparsable trade"),
        }
    }
    out
}

// ============================================================================
// Shared per-client state
// ============================================================================

/// State the trampolines need, held behind the registry so callbacks
/// never carry a pointer into it.
pub(crate) struct ClientShared {
    bids: Arena<ffi::FfiAskBid>,
    asks: Arena<ffi::FfiAskBid>,
    trades: Arena<ffi::FfiTrade>,
    orderbook_listeners: Mutex<FxHashMap<String, Vec<OrderbookListener>>>,
    trade_listeners: Mutex<FxHashMap<String, Vec<TradesListener>>>,
    error_listeners: Mutex<Vec<ErrorListener>>,
    heartbeat_listeners: Mutex<Vec<VoidListener>>,
    disconnect_listeners: Mutex<Vec<VoidListener>>,
    keepalive: Arc<KeepAlive>,
}

impl ClientShared {
    fn new() -> Self {
        Self {
            bids: Arena::new(ORDERBOOK_ARENA_CAPACITY),
            asks: Arena::new(ORDERBOOK_ARENA_CAPACITY),
            trades: Arena::new(TRADE_ARENA_CAPACITY),
            orderbook_listeners: Mutex::new(FxHashMap::default()),
            trade_listeners: Mutex::new(FxHashMap::default()),
            error_listeners: Mutex::new(Vec::new()),
            heartbeat_listeners: Mutex::new(Vec::new()),
            disconnect_listeners: Mutex::new(Vec::new()),
            keepalive: Arc::new(KeepAlive::new()),
        }
    }
}

// ============================================================================
// Callback trampolines
// ============================================================================

#[allow(clippy::cast_possible_truncation)]
fn key_of(user_data: *mut c_void) -> u64 {
    user_data as usize as u64
}

#[allow(clippy::cast_possible_truncation)]
fn user_data_for(key: u64) -> *mut c_void {
    key as usize as *mut c_void
}

unsafe extern "C" fn on_error_trampoline(user_data: *mut c_void, tag: u32, message: *const c_char) {
    let Some(shared) = registry::get(key_of(user_data)) else {
        return;
    };
    let message = if message.is_null() {
        String::new()
    } else {
        // SAFETY: borrowed for the duration of the callback, per contract.
        unsafe { CStr::from_ptr(message) }
            .to_string_lossy()
            .into_owned()
    };
    let err = ExchangeError::from_tag(tag, message.clone())
        .unwrap_or(ExchangeError::UnknownResponse(message));
    for listener in shared.error_listeners.lock().iter() {
        listener(&err);
    }
}

unsafe extern "C" fn on_heartbeat_trampoline(user_data: *mut c_void) {
    let Some(shared) = registry::get(key_of(user_data)) else {
        return;
    };
    for listener in shared.heartbeat_listeners.lock().iter() {
        listener();
    }
}

unsafe extern "C" fn on_orderbook_trampoline(
    user_data: *mut c_void,
    bid_count: usize,
    ask_count: usize,
    market: *mut c_char,
    last_update_id: u64,
    update_id: u64,
) {
    // SAFETY: ownership of the market string transfers to us.
    let market = unsafe { ffi::consume_cstring(market) };
    let Some(shared) = registry::get(key_of(user_data)) else {
        return;
    };
    // Copy-out comes before the listener lookup: arena records must be
    // consumed during the callback whether or not anyone is listening.
    let event = OrderbookEvent {
        bids: drain_levels(&shared.bids, bid_count),
        asks: drain_levels(&shared.asks, ask_count),
        market,
        last_update_id,
        update_id,
    };
    let listeners = shared.orderbook_listeners.lock();
    if let Some(for_market) = listeners.get(&event.market) {
        for listener in for_market {
            listener(&event);
        }
    }
}

unsafe extern "C" fn on_trades_trampoline(
    user_data: *mut c_void,
    trade_count: usize,
    market: *mut c_char,
) {
    // SAFETY: ownership of the market string transfers to us.
    let market = unsafe { ffi::consume_cstring(market) };
    let Some(shared) = registry::get(key_of(user_data)) else {
        return;
    };
    let event = TradesEvent {
        trades: drain_trades(&shared.trades, trade_count),
        market,
    };
    let listeners = shared.trade_listeners.lock();
    if let Some(for_market) = listeners.get(&event.market) {
        for listener in for_market {
            listener(&event);
        }
    }
}

unsafe extern "C" fn on_disconnect_trampoline(user_data: *mut c_void) {
    // Exactly one caller gets the entry, so the listeners below can only
    // ever run once per client.
    let Some(shared) = registry::remove(key_of(user_data)) else {
        return;
    };
    shared.keepalive.signal();
    for listener in shared.disconnect_listeners.lock().iter() {
        listener();
    }
}

// ============================================================================
// Marshaling helpers
// ============================================================================

fn check(rc: ffi::FfiResult) -> Result<()> {
    // SAFETY: rc came straight from a boundary call; its message is ours
    // and unreleased.
    unsafe { rc.into_result() }
}

fn cstring(value: &str, name: &str) -> Result<CString> {
    CString::new(value)
        .map_err(|_| ExchangeError::invalid_argument(format!("{name} contains a nul byte")))
}

fn opt_cstring(value: Option<&str>, name: &str) -> Result<Option<CString>> {
    value.map(|v| cstring(v, name)).transpose()
}

fn opt_ptr(value: &Option<CString>) -> *const c_char {
    value.as_ref().map_or(ptr::null(), |v| v.as_ptr())
}

/// Encoded pagination window whose cursor strings outlive the call.
struct EncodedPaginator {
    _cursors: ffi::CursorStrings,
    raw: Option<ffi::FfiPaginator>,
}

impl EncodedPaginator {
    fn new(paginator: Option<&Paginator>) -> Self {
        match paginator {
            Some(p) => {
                let cursors = ffi::CursorStrings::new(p);
                let raw = ffi::FfiPaginator::encode(p, &cursors);
                Self {
                    _cursors: cursors,
                    raw: Some(raw),
                }
            }
            None => Self {
                _cursors: ffi::CursorStrings::default(),
                raw: None,
            },
        }
    }

    fn ptr(&self) -> *const ffi::FfiPaginator {
        self.raw.as_ref().map_or(ptr::null(), ptr::from_ref)
    }
}

fn snapshot_capacity(paginator: Option<&Paginator>) -> usize {
    let limit = paginator
        .and_then(|p| p.limit)
        .map_or(0, |l| usize::try_from(l).unwrap_or(usize::MAX));
    limit.clamp(SNAPSHOT_CAPACITY, SNAPSHOT_CAPACITY_MAX)
}

/// Run a snapshot call against a scratch record buffer, then consume
/// every written record into a domain value.
fn with_record_buffer<R, T>(
    capacity: usize,
    call: impl FnOnce(*mut R, usize, &mut usize) -> ffi::FfiResult,
    mut consume: impl FnMut(&mut R) -> Result<T>,
) -> Result<Vec<T>> {
    let mut storage: Vec<MaybeUninit<R>> = Vec::with_capacity(capacity);
    let mut count = 0_usize;
    check(call(storage.as_mut_ptr().cast(), capacity, &mut count))?;

    let mut out = Vec::with_capacity(count.min(capacity));
    let mut first_err: Option<ExchangeError> = None;
    for i in 0..count.min(capacity) {
        // SAFETY: the callee initialized `count` records.
        let record = unsafe { &mut *storage.as_mut_ptr().cast::<R>().add(i) };
        // Consume every record even after a failure so no owned string
        // is left behind.
        match consume(record) {
            Ok(value) => out.push(value),
            Err(e) => {
                first_err.get_or_insert(e);
            }
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(out),
    }
}

// ============================================================================
// ExchangeClient
// ============================================================================

/// A connected exchange client.
///
/// Snapshot and order methods block until the engine answers. Push
/// delivery starts with the first `listen_*` call, which lazily runs
/// subscription setup and starts the keep-alive thread; listeners are
/// invoked on the boundary's dispatch thread.
///
/// Dropping the client disconnects it.
pub struct ExchangeClient {
    handle: u64,
    shared: Arc<ClientShared>,
    subscription: Mutex<Option<u64>>,
}

impl ExchangeClient {
    /// Connect a paper-trading client.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when a credential contains a nul byte;
    /// `InitializationFailed` when the boundary rejects the client.
    pub fn init_paper(config: &PaperConfig) -> Result<Self> {
        let api_key = cstring(&config.api_key, "api_key")?;
        let api_secret = cstring(&config.api_secret, "api_secret")?;
        let timeout_ms = u64::try_from(config.timeout.as_millis()).unwrap_or(u64::MAX);
        let mut handle = 0_u64;
        // SAFETY: argument strings outlive the call; out-pointer is valid.
        check(unsafe {
            ffi::init_paper(
                api_key.as_ptr(),
                api_secret.as_ptr(),
                config.sandbox,
                timeout_ms,
                &mut handle,
            )
        })?;
        Ok(Self::wrap(handle))
    }

    /// Wrap an engine registered through the Rust-level seam.
    ///
    /// This is how venue engines (and tests, which keep their own handle
    /// on the engine to drive pushes) enter the boundary.
    #[must_use]
    pub fn from_engine(engine: Arc<dyn ExchangeEngine>) -> Self {
        Self::wrap(ffi::register_engine(engine))
    }

    fn wrap(handle: u64) -> Self {
        let shared = Arc::new(ClientShared::new());
        // Registered before any callback can be installed, so a live
        // trampoline always resolves.
        registry::insert(handle, Arc::clone(&shared));
        debug!(handle, "client connected");
        Self {
            handle,
            shared,
            subscription: Mutex::new(None),
        }
    }

    /// The boundary handle, as useful for diagnostics as it is opaque.
    #[must_use]
    pub fn handle(&self) -> u64 {
        self.handle
    }

    // ---- Market data snapshots ----

    /// Fetch a full order-book snapshot.
    ///
    /// # Errors
    ///
    /// Propagates the boundary error, `SymbolNotFound` for unknown
    /// markets.
    pub fn order_book(&self, market: &str) -> Result<OrderbookSnapshot> {
        let market_c = cstring(market, "market")?;
        let mut bid_storage: Vec<ffi::FfiAskBid> = Vec::with_capacity(ORDERBOOK_ARENA_CAPACITY);
        let mut ask_storage: Vec<ffi::FfiAskBid> = Vec::with_capacity(ORDERBOOK_ARENA_CAPACITY);
        let (mut bid_count, mut ask_count) = (0_usize, 0_usize);
        let (mut last_update_id, mut update_id) = (0_u64, 0_u64);
        // SAFETY: buffers are valid for their capacities; out-pointers
        // are valid stack slots.
        check(unsafe {
            ffi::order_book(
                self.handle,
                market_c.as_ptr(),
                bid_storage.as_mut_ptr(),
                ORDERBOOK_ARENA_CAPACITY,
                ask_storage.as_mut_ptr(),
                ORDERBOOK_ARENA_CAPACITY,
                &mut bid_count,
                &mut ask_count,
                &mut last_update_id,
                &mut update_id,
            )
        })?;
        // Both sides are drained before either error propagates so a bad
        // bid cannot strand the ask records' owned strings.
        let bids = consume_written_levels(bid_storage.spare_capacity_mut(), bid_count);
        let asks = consume_written_levels(ask_storage.spare_capacity_mut(), ask_count);
        Ok(OrderbookSnapshot {
            bids: bids?,
            asks: asks?,
            last_update_id,
            update_id,
        })
    }

    /// Fetch the current price for a market.
    ///
    /// # Errors
    ///
    /// Propagates the boundary error.
    pub fn price_ticker(&self, market: &str) -> Result<f64> {
        let market_c = cstring(market, "market")?;
        let mut price = 0.0_f64;
        // SAFETY: the string outlives the call; out-pointer is valid.
        check(unsafe { ffi::get_price_ticker(self.handle, market_c.as_ptr(), &mut price) })?;
        Ok(price)
    }

    /// Fetch historic candles.
    ///
    /// # Errors
    ///
    /// Propagates the boundary error.
    pub fn historic_rates(
        &self,
        market: &str,
        interval: Interval,
        paginator: Option<&Paginator>,
    ) -> Result<Vec<Candle>> {
        let market_c = cstring(market, "market")?;
        let encoded = EncodedPaginator::new(paginator);
        with_record_buffer(
            snapshot_capacity(paginator),
            |buf, capacity, count| {
                // SAFETY: arguments outlive the call; the buffer is valid
                // for `capacity` records.
                unsafe {
                    ffi::get_historic_rates(
                        self.handle,
                        market_c.as_ptr(),
                        ffi::interval_to_u32(interval),
                        encoded.ptr(),
                        buf,
                        capacity,
                        count,
                    )
                }
            },
            |record: &mut ffi::FfiCandle| Ok(Candle::from(*record)),
        )
    }

    /// Fetch historic public trades.
    ///
    /// # Errors
    ///
    /// Propagates the boundary error.
    pub fn historic_trades(
        &self,
        market: &str,
        paginator: Option<&Paginator>,
    ) -> Result<Vec<Trade>> {
        let market_c = cstring(market, "market")?;
        let encoded = EncodedPaginator::new(paginator);
        with_record_buffer(
            snapshot_capacity(paginator),
            |buf, capacity, count| {
                // SAFETY: arguments outlive the call; buffer is valid.
                unsafe {
                    ffi::get_historic_trades(
                        self.handle,
                        market_c.as_ptr(),
                        encoded.ptr(),
                        buf,
                        capacity,
                        count,
                    )
                }
            },
            |record: &mut ffi::FfiTrade| {
                // SAFETY: the record was written by the call above.
                unsafe { record.consume() }
            },
        )
    }

    /// Fetch the venue's market-pair catalogue.
    ///
    /// # Errors
    ///
    /// Propagates the boundary error.
    pub fn market_pairs(&self) -> Result<Vec<MarketPair>> {
        with_record_buffer(
            ID_CAPACITY,
            |buf, capacity, count| {
                // SAFETY: buffer is valid for `capacity` records.
                unsafe { ffi::receive_pairs(self.handle, buf, capacity, count) }
            },
            |record: &mut ffi::FfiMarketPair| {
                // SAFETY: the record was written by the call above.
                unsafe { record.consume() }
            },
        )
    }

    // ---- Account snapshots ----

    /// Fetch all open orders.
    ///
    /// At most 256 orders are returned; a fuller account silently loses
    /// the surplus, exactly as the boundary reports it.
    ///
    /// # Errors
    ///
    /// Propagates the boundary error.
    pub fn open_orders(&self) -> Result<Vec<Order>> {
        with_record_buffer(
            SNAPSHOT_CAPACITY,
            |buf, capacity, count| {
                // SAFETY: buffer is valid for `capacity` records.
                unsafe { ffi::get_all_open_orders(self.handle, buf, capacity, count) }
            },
            |record: &mut ffi::FfiOrder| {
                // SAFETY: the record was written by the call above.
                unsafe { record.consume() }
            },
        )
    }

    /// Fetch closed and cancelled orders.
    ///
    /// # Errors
    ///
    /// Propagates the boundary error.
    pub fn order_history(
        &self,
        market: Option<&str>,
        paginator: Option<&Paginator>,
    ) -> Result<Vec<Order>> {
        let market_c = opt_cstring(market, "market")?;
        let encoded = EncodedPaginator::new(paginator);
        with_record_buffer(
            snapshot_capacity(paginator),
            |buf, capacity, count| {
                // SAFETY: arguments outlive the call; buffer is valid.
                unsafe {
                    ffi::get_order_history(
                        self.handle,
                        opt_ptr(&market_c),
                        encoded.ptr(),
                        buf,
                        capacity,
                        count,
                    )
                }
            },
            |record: &mut ffi::FfiOrder| {
                // SAFETY: the record was written by the call above.
                unsafe { record.consume() }
            },
        )
    }

    /// Fetch account fills, optionally filtered by market and order.
    ///
    /// # Errors
    ///
    /// Propagates the boundary error.
    pub fn trade_history(
        &self,
        market: Option<&str>,
        order_id: Option<&str>,
        paginator: Option<&Paginator>,
    ) -> Result<Vec<Trade>> {
        let market_c = opt_cstring(market, "market")?;
        let order_id_c = opt_cstring(order_id, "order_id")?;
        let encoded = EncodedPaginator::new(paginator);
        with_record_buffer(
            snapshot_capacity(paginator),
            |buf, capacity, count| {
                // SAFETY: arguments outlive the call; buffer is valid.
                unsafe {
                    ffi::get_trade_history(
                        self.handle,
                        opt_ptr(&market_c),
                        opt_ptr(&order_id_c),
                        encoded.ptr(),
                        buf,
                        capacity,
                        count,
                    )
                }
            },
            |record: &mut ffi::FfiTrade| {
                // SAFETY: the record was written by the call above.
                unsafe { record.consume() }
            },
        )
    }

    /// Fetch account balances.
    ///
    /// # Errors
    ///
    /// Propagates the boundary error.
    pub fn account_balances(&self, paginator: Option<&Paginator>) -> Result<Vec<Balance>> {
        let encoded = EncodedPaginator::new(paginator);
        with_record_buffer(
            snapshot_capacity(paginator),
            |buf, capacity, count| {
                // SAFETY: arguments outlive the call; buffer is valid.
                unsafe {
                    ffi::get_account_balances(self.handle, encoded.ptr(), buf, capacity, count)
                }
            },
            |record: &mut ffi::FfiBalance| {
                // SAFETY: the record was written by the call above.
                unsafe { record.consume() }
            },
        )
    }

    // ---- Orders ----

    /// Place an order.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for malformed size/price; otherwise the
    /// boundary error.
    pub fn place_order(&self, request: &OrderRequest) -> Result<Order> {
        let market_c = cstring(&request.market, "market")?;
        let size_c = cstring(&request.size, "size")?;
        let price_c = opt_cstring(request.price.as_deref(), "price")?;
        let (tif_kind, tif_duration_ms) = ffi::time_in_force_to_raw(request.time_in_force);
        let mut out = MaybeUninit::<ffi::FfiOrder>::uninit();
        // SAFETY: argument strings outlive the call; out-pointer is valid.
        check(unsafe {
            ffi::place_order(
                self.handle,
                market_c.as_ptr(),
                size_c.as_ptr(),
                opt_ptr(&price_c),
                ffi::FfiSide::from(request.side) as u32,
                tif_kind,
                tif_duration_ms,
                request.post_only,
                out.as_mut_ptr(),
            )
        })?;
        // SAFETY: the call succeeded, so the record was written.
        let mut record = unsafe { out.assume_init() };
        // SAFETY: freshly written, unconsumed.
        unsafe { record.consume() }
    }

    /// Place a limit buy.
    ///
    /// # Errors
    ///
    /// Same as [`ExchangeClient::place_order`].
    pub fn limit_buy(&self, market: &str, size: &str, price: &str) -> Result<Order> {
        self.place_order(&limit_request(market, size, price, Side::Buy))
    }

    /// Place a limit sell.
    ///
    /// # Errors
    ///
    /// Same as [`ExchangeClient::place_order`].
    pub fn limit_sell(&self, market: &str, size: &str, price: &str) -> Result<Order> {
        self.place_order(&limit_request(market, size, price, Side::Sell))
    }

    /// Place a market buy.
    ///
    /// # Errors
    ///
    /// Same as [`ExchangeClient::place_order`].
    pub fn market_buy(&self, market: &str, size: &str) -> Result<Order> {
        self.place_order(&market_request(market, size, Side::Buy))
    }

    /// Place a market sell.
    ///
    /// # Errors
    ///
    /// Same as [`ExchangeClient::place_order`].
    pub fn market_sell(&self, market: &str, size: &str) -> Result<Order> {
        self.place_order(&market_request(market, size, Side::Sell))
    }

    /// Look up one order by id.
    ///
    /// # Errors
    ///
    /// Propagates the boundary error.
    pub fn get_order(&self, order_id: &str, market: Option<&str>) -> Result<Order> {
        let order_id_c = cstring(order_id, "order_id")?;
        let market_c = opt_cstring(market, "market")?;
        let mut out = MaybeUninit::<ffi::FfiOrder>::uninit();
        // SAFETY: argument strings outlive the call; out-pointer is valid.
        check(unsafe {
            ffi::get_order(
                self.handle,
                order_id_c.as_ptr(),
                opt_ptr(&market_c),
                out.as_mut_ptr(),
            )
        })?;
        // SAFETY: the call succeeded, so the record was written.
        let mut record = unsafe { out.assume_init() };
        // SAFETY: freshly written, unconsumed.
        unsafe { record.consume() }
    }

    /// Cancel one order by id.
    ///
    /// # Errors
    ///
    /// Propagates the boundary error.
    pub fn cancel_order(&self, order_id: &str, market: Option<&str>) -> Result<()> {
        let order_id_c = cstring(order_id, "order_id")?;
        let market_c = opt_cstring(market, "market")?;
        // SAFETY: argument strings outlive the call.
        check(unsafe { ffi::cancel_order(self.handle, order_id_c.as_ptr(), opt_ptr(&market_c)) })
    }

    /// Cancel every open order, optionally restricted to one market.
    /// Returns the cancelled order ids.
    ///
    /// # Errors
    ///
    /// Propagates the boundary error.
    pub fn cancel_all_orders(&self, market: Option<&str>) -> Result<Vec<String>> {
        let market_c = opt_cstring(market, "market")?;
        let mut ids: Vec<*mut c_char> = vec![ptr::null_mut(); ID_CAPACITY];
        let mut count = 0_usize;
        // SAFETY: the id buffer is valid for its length.
        check(unsafe {
            ffi::cancel_all_orders(
                self.handle,
                opt_ptr(&market_c),
                ids.as_mut_ptr(),
                ids.len(),
                &mut count,
            )
        })?;
        Ok(ids
            .into_iter()
            .take(count)
            // SAFETY: each written id is an unreleased owned string.
            .map(|id| unsafe { ffi::consume_cstring(id) })
            .collect())
    }

    // ---- Streaming ----

    /// Listen for order-book deltas on a market.
    ///
    /// Listening is additive: every registered listener for the market
    /// sees every delta, in registration order.
    ///
    /// # Errors
    ///
    /// Propagates subscription-setup failures.
    pub fn listen_orderbook(
        &self,
        market: &str,
        listener: impl Fn(&OrderbookEvent) + Send + 'static,
    ) -> Result<()> {
        let subscription = self.ensure_subscribed()?;
        let market_c = cstring(market, "market")?;
        // Listener first: no delta delivered after subscribe can be
        // missed.
        self.shared
            .orderbook_listeners
            .lock()
            .entry(market.to_owned())
            .or_default()
            .push(Box::new(listener));
        // SAFETY: the string outlives the call.
        let subscribed =
            check(unsafe { ffi::subscribe_orderbook(self.handle, subscription, market_c.as_ptr()) });
        if subscribed.is_err() {
            // A refused subscribe must not leave the listener armed for
            // whoever subscribes this market later.
            drop_last_listener(&self.shared.orderbook_listeners, market);
        }
        subscribed
    }

    /// Listen for trades on a market.
    ///
    /// # Errors
    ///
    /// Propagates subscription-setup failures.
    pub fn listen_trades(
        &self,
        market: &str,
        listener: impl Fn(&TradesEvent) + Send + 'static,
    ) -> Result<()> {
        let subscription = self.ensure_subscribed()?;
        let market_c = cstring(market, "market")?;
        self.shared
            .trade_listeners
            .lock()
            .entry(market.to_owned())
            .or_default()
            .push(Box::new(listener));
        // SAFETY: the string outlives the call.
        let subscribed =
            check(unsafe { ffi::subscribe_trades(self.handle, subscription, market_c.as_ptr()) });
        if subscribed.is_err() {
            drop_last_listener(&self.shared.trade_listeners, market);
        }
        subscribed
    }

    /// Listen for engine-side errors.
    ///
    /// # Errors
    ///
    /// Propagates subscription-setup failures.
    pub fn on_error(&self, listener: impl Fn(&ExchangeError) + Send + 'static) -> Result<()> {
        self.ensure_subscribed()?;
        self.shared.error_listeners.lock().push(Box::new(listener));
        Ok(())
    }

    /// Listen for transport heartbeats.
    ///
    /// # Errors
    ///
    /// Propagates subscription-setup failures.
    pub fn on_heartbeat(&self, listener: impl Fn() + Send + 'static) -> Result<()> {
        self.ensure_subscribed()?;
        self.shared
            .heartbeat_listeners
            .lock()
            .push(Box::new(listener));
        Ok(())
    }

    /// Listen for the stream ending. Invoked exactly once, on the
    /// callback thread, after which the client is disconnected.
    ///
    /// # Errors
    ///
    /// Propagates subscription-setup failures.
    pub fn on_disconnect(&self, listener: impl Fn() + Send + 'static) -> Result<()> {
        self.ensure_subscribed()?;
        self.shared
            .disconnect_listeners
            .lock()
            .push(Box::new(listener));
        Ok(())
    }

    fn ensure_subscribed(&self) -> Result<u64> {
        let mut subscription = self.subscription.lock();
        if let Some(existing) = *subscription {
            return Ok(existing);
        }
        self.shared.keepalive.ensure_started();
        let table = ffi::FfiCallbackTable {
            on_error: Some(on_error_trampoline),
            on_heartbeat: Some(on_heartbeat_trampoline),
            on_orderbook: Some(on_orderbook_trampoline),
            on_trades: Some(on_trades_trampoline),
            on_disconnect: Some(on_disconnect_trampoline),
        };
        let mut handle = 0_u64;
        // SAFETY: the arenas live in ClientShared, which the registry
        // keeps alive until the disconnect trampoline has run; the
        // out-pointer is a valid stack slot.
        check(unsafe {
            ffi::init_subscriptions(
                self.handle,
                table,
                user_data_for(self.handle),
                self.shared.bids.base_ptr(),
                self.shared.bids.capacity(),
                self.shared.asks.base_ptr(),
                self.shared.asks.capacity(),
                self.shared.trades.base_ptr(),
                self.shared.trades.capacity(),
                &mut handle,
            )
        })?;
        *subscription = Some(handle);
        debug!(client = self.handle, subscription = handle, "subscribed");
        Ok(handle)
    }

    // ---- Lifecycle ----

    /// Whether the client is still registered (not yet disconnected).
    #[must_use]
    pub fn is_connected(&self) -> bool {
        registry::get(self.handle).is_some()
    }

    /// Block until the stream disconnects, or the timeout elapses.
    /// Returns whether the client is disconnected.
    pub fn wait_for_disconnect(&self, timeout: Option<Duration>) -> bool {
        self.shared.keepalive.wait(timeout)
    }

    /// Disconnect the client.
    ///
    /// Tears down the subscription (when one exists), fires disconnect
    /// listeners once, and releases both boundary handles. Calling it
    /// again is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates boundary teardown failures.
    pub fn disconnect(&self) -> Result<()> {
        let subscription = self.subscription.lock().take();
        if let Some(subscription) = subscription {
            // The disconnect trampoline removes the registry entry and
            // signals the keep-alive before this returns.
            check(ffi::disconnect(subscription))
        } else {
            ffi::unregister_engine(self.handle);
            if let Some(shared) = registry::remove(self.handle) {
                shared.keepalive.signal();
            }
            Ok(())
        }
    }
}

impl Drop for ExchangeClient {
    fn drop(&mut self) {
        // Unconditional: after an engine-initiated disconnect the host
        // registry entry is already gone, but the boundary still holds
        // the subscription and the engine until disconnect releases them.
        if let Err(e) = self.disconnect() {
            warn!(client = self.handle, error = %e, "disconnect on drop failed");
        }
    }
}

fn consume_written_levels(
    storage: &mut [MaybeUninit<ffi::FfiAskBid>],
    count: usize,
) -> Result<Vec<AskBid>> {
    let mut out = Vec::with_capacity(count.min(storage.len()));
    let mut first_err: Option<ExchangeError> = None;
    for slot in storage.iter_mut().take(count) {
        // SAFETY: the callee initialized `count` records.
        let record = unsafe { slot.assume_init_mut() };
        // Every record is consumed even after a failure; an early return
        // here would strand the remaining records' owned strings.
        match unsafe { record.consume() } {
            Ok(level) => out.push(level),
            Err(e) => {
                first_err.get_or_insert(e);
            }
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(out),
    }
}

fn drop_last_listener<L>(listeners: &Mutex<FxHashMap<String, Vec<L>>>, market: &str) {
    let mut listeners = listeners.lock();
    if let Some(for_market) = listeners.get_mut(market) {
        for_market.pop();
        if for_market.is_empty() {
            listeners.remove(market);
        }
    }
}

fn limit_request(market: &str, size: &str, price: &str, side: Side) -> OrderRequest {
    OrderRequest {
        market: market.to_owned(),
        size: size.to_owned(),
        price: Some(price.to_owned()),
        side,
        time_in_force: TimeInForce::default(),
        post_only: false,
    }
}

fn market_request(market: &str, size: &str, side: Side) -> OrderRequest {
    OrderRequest {
        market: market.to_owned(),
        size: size.to_owned(),
        price: None,
        side,
        time_in_force: TimeInForce::default(),
        post_only: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(text: &str) -> *mut c_char {
        CString::new(text).unwrap().into_raw()
    }

    #[test]
    fn test_shared_state_crosses_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        // The trampolines resolve ClientShared from the dispatch thread;
        // the arenas carry raw-pointer records across it.
        assert_send_sync::<ClientShared>();
        assert_send_sync::<Arena<ffi::FfiAskBid>>();
        assert_send_sync::<Arena<ffi::FfiTrade>>();
    }

    #[test]
    fn test_level_consumption_drains_past_a_bad_record() {
        let records = [
            ffi::FfiAskBid {
                price: raw("100"),
                qty: raw("1"),
            },
            ffi::FfiAskBid {
                price: raw("not a price"),
                qty: raw("2"),
            },
            ffi::FfiAskBid {
                price: raw("101"),
                qty: raw("3"),
            },
        ];
        let mut storage: Vec<MaybeUninit<ffi::FfiAskBid>> =
            records.into_iter().map(MaybeUninit::new).collect();

        let err = consume_written_levels(&mut storage, 3).unwrap_err();
        assert!(matches!(err, ExchangeError::ParseDecimal(_)));

        // Every record was consumed, including the ones after the bad
        // one: no owned string is left behind.
        for slot in &storage {
            let record = unsafe { slot.assume_init_ref() };
            assert!(record.price.is_null());
            assert!(record.qty.is_null());
        }
    }

    #[test]
    fn test_snapshot_capacity_is_clamped() {
        let with_limit = |limit| Paginator {
            limit: Some(limit),
            ..Paginator::default()
        };
        assert_eq!(snapshot_capacity(None), SNAPSHOT_CAPACITY);
        assert_eq!(snapshot_capacity(Some(&with_limit(3))), SNAPSHOT_CAPACITY);
        assert_eq!(snapshot_capacity(Some(&with_limit(1000))), 1000);
        assert_eq!(
            snapshot_capacity(Some(&with_limit(u64::MAX))),
            SNAPSHOT_CAPACITY_MAX
        );
    }
}
