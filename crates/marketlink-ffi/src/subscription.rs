//! Push subscriptions and callback dispatch.
//!
//! Subscription setup is two-phase: `init_subscriptions` installs the
//! callback table and the streaming arenas and returns a subscription
//! handle; `subscribe_orderbook` / `subscribe_trades` then activate
//! per-market delivery. Engine pushes never invoke the callbacks
//! directly — they flow through a bounded channel into one dispatch
//! thread per client, which writes an event's records into the arenas,
//! invokes the callback, and only reuses the arenas after it returns.
//!
//! # Thread Safety
//!
//! - Callbacks are invoked from the dispatch thread
//! - Callbacks for one client are serialized (never concurrent), which
//!   preserves per-(market, kind) delivery order
//! - After `disconnect()` returns, no more callbacks fire for the handle
//!
//! # Example (C)
//!
//! ```c
//! void on_book(void* ctx, size_t bids, size_t asks, char* market,
//!              uint64_t last_id, uint64_t id) {
//!     /* copy levels out of the arenas, release their strings */
//!     free_string(market);
//! }
//!
//! FfiAskBid bids[512], asks[512];
//! FfiTrade trades[1024];
//! uint64_t sub = 0;
//! FfiCallbackTable table = { on_err, on_ping, on_book, on_trades, on_gone };
//! init_subscriptions(client, table, NULL,
//!                    bids, 512, asks, 512, trades, 1024, &sub);
//! subscribe_orderbook(client, sub, "BTC-USD");
//! /* ... */
//! disconnect(sub);
//! ```

use std::ffi::{c_char, c_void, CString};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::RecvError;
use parking_lot::Mutex;
use tracing::{debug, error};

use marketlink_core::events::{
    event_queue, EventReceiver, EventSender, OrderbookEvent, StreamEvent, TradesEvent,
    DEFAULT_EVENT_QUEUE_CAPACITY,
};
use marketlink_core::{ExchangeError, Result};

use crate::buffer::FixedBuffer;
use crate::client::{resolve_client, unregister_engine};
use crate::handle::HandleTable;
use crate::record::{FfiAskBid, FfiTrade};
use crate::result::{ffi_result, FfiResult};
use crate::string::{arg_str, owned_string};

// ============================================================================
// Callback table
// ============================================================================

/// Callback invoked when the engine surfaces an error.
///
/// `message` is borrowed and only valid during the callback.
pub type ErrorCallback =
    Option<unsafe extern "C" fn(user_data: *mut c_void, tag: u32, message: *const c_char)>;

/// Callback invoked on a transport keep-alive.
pub type HeartbeatCallback = Option<unsafe extern "C" fn(user_data: *mut c_void)>;

/// Callback invoked when an order-book delta has been written to the
/// arenas.
///
/// `bid_count` / `ask_count` are the level counts written to the bid and
/// ask arenas. `market` is an owned string the callback must release with
/// `free_string`. Arena records are valid until the callback returns and
/// must be consumed within it.
pub type OrderbookCallback = Option<
    unsafe extern "C" fn(
        user_data: *mut c_void,
        bid_count: usize,
        ask_count: usize,
        market: *mut c_char,
        last_update_id: u64,
        update_id: u64,
    ),
>;

/// Callback invoked when a trade batch has been written to the trade
/// arena. Same ownership contract as [`OrderbookCallback`].
pub type TradesCallback = Option<
    unsafe extern "C" fn(user_data: *mut c_void, trade_count: usize, market: *mut c_char),
>;

/// Callback invoked exactly once when the stream ends.
pub type DisconnectCallback = Option<unsafe extern "C" fn(user_data: *mut c_void)>;

/// The callback table installed by `init_subscriptions`.
///
/// Any entry may be NULL to ignore that event kind.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FfiCallbackTable {
    /// Engine-side errors.
    pub on_error: ErrorCallback,
    /// Transport keep-alives.
    pub on_heartbeat: HeartbeatCallback,
    /// Order-book deltas.
    pub on_orderbook: OrderbookCallback,
    /// Trade batches.
    pub on_trades: TradesCallback,
    /// Stream teardown.
    pub on_disconnect: DisconnectCallback,
}

// ============================================================================
// Subscription state
// ============================================================================

struct SubscriptionEntry {
    client: u64,
    sender: EventSender,
    thread: Mutex<Option<JoinHandle<()>>>,
}

/// Live subscriptions, keyed by the handle crossing the boundary.
static SUBSCRIPTIONS: HandleTable<Arc<SubscriptionEntry>> = HandleTable::new("subscriptions");

/// Everything the dispatch thread owns: the caller's callback table and
/// context pointer, plus the three streaming arenas.
struct DispatchContext {
    callbacks: FfiCallbackTable,
    user_data: *mut c_void,
    bids: FixedBuffer<FfiAskBid>,
    asks: FixedBuffer<FfiAskBid>,
    trades: FixedBuffer<FfiTrade>,
}

// SAFETY: the context moves onto the dispatch thread once and is never
// shared. The user_data pointer is opaque to us; thread safety of what it
// points to is the caller's responsibility, as with any C callback API.
unsafe impl Send for DispatchContext {}

impl DispatchContext {
    fn deliver(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Heartbeat => self.on_heartbeat(),
            StreamEvent::Error(err) => self.on_error(&err),
            StreamEvent::Orderbook(ev) => self.on_orderbook(ev),
            StreamEvent::Trades(ev) => self.on_trades(ev),
            // Handled by the dispatch loop itself.
            StreamEvent::Disconnect => {}
        }
    }

    fn on_heartbeat(&self) {
        if let Some(callback) = self.callbacks.on_heartbeat {
            // SAFETY: invoking the caller-supplied callback with its own
            // context pointer, per the installed table.
            unsafe { callback(self.user_data) };
        }
    }

    fn on_error(&self, err: &ExchangeError) {
        error!(tag = err.tag(), message = err.message(), "engine error");
        if let Some(callback) = self.callbacks.on_error {
            let message = CString::new(err.message())
                .unwrap_or_else(|_| CString::new("error message contained nul byte").unwrap());
            // SAFETY: message stays alive across the call; the callback
            // contract says it is borrowed only for its duration.
            unsafe { callback(self.user_data, err.tag(), message.as_ptr()) };
        }
    }

    fn on_orderbook(&mut self, ev: OrderbookEvent) {
        let Some(callback) = self.callbacks.on_orderbook else {
            return;
        };
        // Arenas are only written when the event will actually be
        // delivered; otherwise record strings would have no one to
        // release them.
        let bid_count = self.bids.fill(ev.bids, FfiAskBid::from);
        let ask_count = self.asks.fill(ev.asks, FfiAskBid::from);
        let market = owned_string(&ev.market);
        // SAFETY: arena records stay untouched until the callback
        // returns; the market string's ownership transfers to the caller.
        unsafe {
            callback(
                self.user_data,
                bid_count,
                ask_count,
                market,
                ev.last_update_id,
                ev.update_id,
            );
        }
    }

    fn on_trades(&mut self, ev: TradesEvent) {
        let Some(callback) = self.callbacks.on_trades else {
            return;
        };
        let trade_count = self.trades.fill(ev.trades, FfiTrade::from);
        let market = owned_string(&ev.market);
        // SAFETY: same contract as the order-book path.
        unsafe { callback(self.user_data, trade_count, market) };
    }

    fn on_disconnect(&self) {
        if let Some(callback) = self.callbacks.on_disconnect {
            // SAFETY: caller-supplied callback with its own context.
            unsafe { callback(self.user_data) };
        }
    }
}

/// Dispatch loop: pop events until the stream ends, then fire the
/// disconnect callback exactly once.
fn dispatch_loop(rx: &EventReceiver, mut ctx: DispatchContext) {
    loop {
        match rx.recv() {
            Ok(StreamEvent::Disconnect) => break,
            Ok(event) => ctx.deliver(event),
            // All senders gone without an explicit disconnect; treat it
            // as one.
            Err(RecvError) => break,
        }
    }
    debug!("dispatch loop ending");
    ctx.on_disconnect();
}

// ============================================================================
// FFI Functions
// ============================================================================

/// Install a callback table and streaming arenas for a client.
///
/// The arenas are caller-owned and must stay valid until `disconnect`
/// returns; the dispatch thread writes each delivered event's records
/// into them and reuses them only after the callback has returned.
///
/// No events are delivered until a `subscribe_*` call activates a
/// market.
///
/// # Safety
///
/// * `client` must be a live client handle
/// * the arena pointers must be valid for their capacities (or NULL with
///   zero capacity) until `disconnect` returns
/// * `out_subscription` must be a valid pointer
/// * callbacks must tolerate being invoked from a background thread
#[no_mangle]
pub unsafe extern "C" fn init_subscriptions(
    client: u64,
    callbacks: FfiCallbackTable,
    user_data: *mut c_void,
    bid_buf: *mut FfiAskBid,
    bid_capacity: usize,
    ask_buf: *mut FfiAskBid,
    ask_capacity: usize,
    trade_buf: *mut FfiTrade,
    trade_capacity: usize,
    out_subscription: *mut u64,
) -> FfiResult {
    let outcome = || -> Result<()> {
        if out_subscription.is_null() {
            return Err(ExchangeError::missing_parameter(
                "subscription out-pointer is null",
            ));
        }
        let engine = resolve_client(client)?;
        // SAFETY: caller guarantees arena validity for the subscription
        // lifetime.
        let (bids, asks, trades) = unsafe {
            (
                FixedBuffer::new(bid_buf, bid_capacity, "bid arena")?,
                FixedBuffer::new(ask_buf, ask_capacity, "ask arena")?,
                FixedBuffer::new(trade_buf, trade_capacity, "trade arena")?,
            )
        };

        let (tx, rx) = event_queue(DEFAULT_EVENT_QUEUE_CAPACITY);
        engine.connect_events(tx.clone())?;

        let ctx = DispatchContext {
            callbacks,
            user_data,
            bids,
            asks,
            trades,
        };
        let handle = thread::Builder::new()
            .name("marketlink-dispatch".into())
            .spawn(move || dispatch_loop(&rx, ctx))
            .map_err(|e| ExchangeError::subscription(format!("dispatch thread: {e}")))?;

        let subscription = SUBSCRIPTIONS.insert(Arc::new(SubscriptionEntry {
            client,
            sender: tx,
            thread: Mutex::new(Some(handle)),
        }));
        debug!(client, subscription, "subscriptions initialized");
        // SAFETY: out_subscription is non-null per the check above
        unsafe { *out_subscription = subscription };
        Ok(())
    }();
    ffi_result(outcome)
}

fn resolve_subscription(client: u64, subscription: u64) -> Result<Arc<SubscriptionEntry>> {
    let entry = SUBSCRIPTIONS.get(subscription).ok_or_else(|| {
        ExchangeError::invalid_argument(format!("unknown subscription handle {subscription}"))
    })?;
    if entry.client != client {
        return Err(ExchangeError::invalid_argument(
            "subscription does not belong to this client",
        ));
    }
    Ok(entry)
}

/// Activate order-book delivery for a market.
///
/// Subscribing to the same market again is not an error; delivery is
/// additive and host-side listeners decide who sees an event.
///
/// # Safety
///
/// `market` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn subscribe_orderbook(
    client: u64,
    subscription: u64,
    market: *const c_char,
) -> FfiResult {
    let outcome = || -> Result<()> {
        // SAFETY: caller contract
        let market = unsafe { arg_str(market, "market")? };
        resolve_subscription(client, subscription)?;
        resolve_client(client)?.subscribe_orderbook(market)
    }();
    ffi_result(outcome)
}

/// Activate trade delivery for a market.
///
/// # Safety
///
/// `market` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn subscribe_trades(
    client: u64,
    subscription: u64,
    market: *const c_char,
) -> FfiResult {
    let outcome = || -> Result<()> {
        // SAFETY: caller contract
        let market = unsafe { arg_str(market, "market")? };
        resolve_subscription(client, subscription)?;
        resolve_client(client)?.subscribe_trades(market)
    }();
    ffi_result(outcome)
}

/// Tear down a subscription and its client.
///
/// Stops the engine, drains pending events, fires the disconnect
/// callback, and releases both handles. Safe to call any number of
/// times: a stale or unknown handle is a successful no-op.
#[no_mangle]
pub extern "C" fn disconnect(subscription: u64) -> FfiResult {
    let Some(entry) = SUBSCRIPTIONS.remove(subscription) else {
        return FfiResult::ok();
    };
    if let Ok(engine) = resolve_client(entry.client) {
        engine.shutdown();
    }
    // Queue the final event behind whatever the engine already pushed;
    // ignore a closed queue (the dispatch loop already ended).
    let _ = entry.sender.send(StreamEvent::Disconnect);

    if let Some(handle) = entry.thread.lock().take() {
        // A callback may itself call disconnect; joining our own thread
        // would deadlock.
        if handle.thread().id() != thread::current().id() {
            let _ = handle.join();
        }
    }
    unregister_engine(entry.client);
    debug!(subscription, client = entry.client, "disconnected");
    FfiResult::ok()
}

/// True when the subscription handle still resolves.
///
/// # Safety
///
/// `out_active` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn subscription_is_active(
    subscription: u64,
    out_active: *mut bool,
) -> FfiResult {
    if out_active.is_null() {
        return ExchangeError::missing_parameter("active out-pointer is null").into();
    }
    // SAFETY: out_active is non-null per the check above
    unsafe { *out_active = SUBSCRIPTIONS.get(subscription).is_some() };
    FfiResult::ok()
}

#[cfg(test)]
#[allow(clippy::manual_c_str_literals)]
mod tests {
    use super::*;
    use std::ptr;
    use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    use rust_decimal::Decimal;

    use marketlink_core::model::AskBid;
    use marketlink_core::{ExchangeEngine, PaperConfig, PaperExchange};

    use crate::client::register_engine;
    use crate::result::ResultTag;

    fn null_table() -> FfiCallbackTable {
        FfiCallbackTable {
            on_error: None,
            on_heartbeat: None,
            on_orderbook: None,
            on_trades: None,
            on_disconnect: None,
        }
    }

    fn empty_level() -> FfiAskBid {
        FfiAskBid {
            price: ptr::null_mut(),
            qty: ptr::null_mut(),
        }
    }

    fn wait_until(what: &str, condition: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn paper_client() -> (Arc<PaperExchange>, u64) {
        let paper = Arc::new(PaperExchange::new(PaperConfig::default()));
        paper.add_market_symbol("BTC", "USD");
        let client = register_engine(Arc::clone(&paper) as Arc<dyn ExchangeEngine>);
        (paper, client)
    }

    #[test]
    fn test_init_subscriptions_null_out() {
        let (_paper, client) = paper_client();
        let rc = unsafe {
            init_subscriptions(
                client,
                null_table(),
                ptr::null_mut(),
                ptr::null_mut(),
                0,
                ptr::null_mut(),
                0,
                ptr::null_mut(),
                0,
                ptr::null_mut(),
            )
        };
        assert_eq!(rc.tag, ResultTag::MissingParameter);
        unsafe { crate::string::free_string(rc.message) };
        unregister_engine(client);
    }

    #[test]
    fn test_init_subscriptions_unknown_client() {
        let mut sub = 0_u64;
        let rc = unsafe {
            init_subscriptions(
                0xbad_u64,
                null_table(),
                ptr::null_mut(),
                ptr::null_mut(),
                0,
                ptr::null_mut(),
                0,
                ptr::null_mut(),
                0,
                &mut sub,
            )
        };
        assert_eq!(rc.tag, ResultTag::InvalidArgument);
        unsafe { crate::string::free_string(rc.message) };
    }

    #[test]
    fn test_disconnect_unknown_handle_is_ok() {
        assert!(disconnect(0).is_ok());
        assert!(disconnect(0xdead_beef).is_ok());
    }

    // Statics for the delivery test below (one test uses them; tests that
    // share statics would race).
    static OB_CALLS: AtomicUsize = AtomicUsize::new(0);
    static OB_PAYLOAD_OK: AtomicUsize = AtomicUsize::new(0);
    static OB_UPDATE_ID: AtomicU64 = AtomicU64::new(0);
    static HB_CALLS: AtomicUsize = AtomicUsize::new(0);
    static DC_CALLS: AtomicUsize = AtomicUsize::new(0);
    static BID_ARENA: AtomicPtr<FfiAskBid> = AtomicPtr::new(ptr::null_mut());
    static ASK_ARENA: AtomicPtr<FfiAskBid> = AtomicPtr::new(ptr::null_mut());

    unsafe extern "C" fn test_on_orderbook(
        _user_data: *mut c_void,
        bid_count: usize,
        ask_count: usize,
        market: *mut c_char,
        last_update_id: u64,
        update_id: u64,
    ) {
        OB_CALLS.fetch_add(1, Ordering::SeqCst);
        OB_UPDATE_ID.store(update_id, Ordering::SeqCst);

        let market = unsafe { crate::string::consume_cstring(market) };
        let bid = unsafe { (*BID_ARENA.load(Ordering::SeqCst)).consume() };
        let ask = unsafe { (*ASK_ARENA.load(Ordering::SeqCst)).consume() };
        let payload_ok = market == "BTC-USD"
            && bid_count == 1
            && ask_count == 1
            && last_update_id == 5
            && bid.is_ok_and(|b| b == AskBid::new(Decimal::from(100), Decimal::from(1)))
            && ask.is_ok_and(|a| a == AskBid::new(Decimal::from(101), Decimal::from(2)));
        if payload_ok {
            OB_PAYLOAD_OK.store(1, Ordering::SeqCst);
        }
    }

    unsafe extern "C" fn test_on_heartbeat(_user_data: *mut c_void) {
        HB_CALLS.fetch_add(1, Ordering::SeqCst);
    }

    unsafe extern "C" fn test_on_disconnect(_user_data: *mut c_void) {
        DC_CALLS.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn test_orderbook_delivery_and_disconnect() {
        let (paper, client) = paper_client();

        let mut bids: Vec<FfiAskBid> = (0..8).map(|_| empty_level()).collect();
        let mut asks: Vec<FfiAskBid> = (0..8).map(|_| empty_level()).collect();
        let mut trades: Vec<FfiTrade> = Vec::with_capacity(0);
        BID_ARENA.store(bids.as_mut_ptr(), Ordering::SeqCst);
        ASK_ARENA.store(asks.as_mut_ptr(), Ordering::SeqCst);

        let table = FfiCallbackTable {
            on_error: None,
            on_heartbeat: Some(test_on_heartbeat),
            on_orderbook: Some(test_on_orderbook),
            on_trades: None,
            on_disconnect: Some(test_on_disconnect),
        };
        let mut sub = 0_u64;
        let rc = unsafe {
            init_subscriptions(
                client,
                table,
                ptr::null_mut(),
                bids.as_mut_ptr(),
                bids.len(),
                asks.as_mut_ptr(),
                asks.len(),
                trades.as_mut_ptr(),
                0,
                &mut sub,
            )
        };
        assert!(rc.is_ok());
        assert_ne!(sub, 0);

        let rc = unsafe { subscribe_orderbook(client, sub, b"BTC-USD\0".as_ptr().cast()) };
        assert!(rc.is_ok());

        paper.push_heartbeat();
        paper
            .push_orderbook(
                "BTC-USD",
                vec![AskBid::new(Decimal::from(100), Decimal::from(1))],
                vec![AskBid::new(Decimal::from(101), Decimal::from(2))],
                5,
                6,
            )
            .unwrap();

        wait_until("orderbook callback", || {
            OB_CALLS.load(Ordering::SeqCst) >= 1
        });
        assert_eq!(OB_PAYLOAD_OK.load(Ordering::SeqCst), 1);
        assert_eq!(OB_UPDATE_ID.load(Ordering::SeqCst), 6);
        wait_until("heartbeat callback", || {
            HB_CALLS.load(Ordering::SeqCst) >= 1
        });

        let mut active = false;
        assert!(unsafe { subscription_is_active(sub, &mut active) }.is_ok());
        assert!(active);

        assert!(disconnect(sub).is_ok());
        wait_until("disconnect callback", || {
            DC_CALLS.load(Ordering::SeqCst) == 1
        });

        // Idempotent: the stale handle is a no-op and nothing fires twice.
        assert!(disconnect(sub).is_ok());
        thread::sleep(Duration::from_millis(20));
        assert_eq!(DC_CALLS.load(Ordering::SeqCst), 1);

        assert!(unsafe { subscription_is_active(sub, &mut active) }.is_ok());
        assert!(!active);
        // The client was released with its subscription.
        assert!(resolve_client(client).is_err());
    }

    #[test]
    fn test_subscribe_before_init_fails() {
        let (_paper, client) = paper_client();
        let rc = unsafe { subscribe_orderbook(client, 0, b"BTC-USD\0".as_ptr().cast()) };
        assert_eq!(rc.tag, ResultTag::InvalidArgument);
        unsafe { crate::string::free_string(rc.message) };
        unregister_engine(client);
    }
}
