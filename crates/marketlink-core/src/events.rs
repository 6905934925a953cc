//! Stream events and the bounded queue that carries them.
//!
//! The callback table the host installs is never invoked by the engine
//! directly. Instead every engine pushes [`StreamEvent`]s into a bounded
//! channel, and one dispatch thread per client pops them and drives the
//! callbacks. This decouples engine I/O threads from host listener
//! execution time and gives each (client, market, kind) stream a single
//! consumer, which is what preserves delivery order.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::warn;

use crate::error::{ExchangeError, Result};
use crate::model::{AskBid, Trade};

/// Default capacity of the per-client event queue.
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 256;

/// An order-book delta pushed by the venue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderbookEvent {
    /// Market the update belongs to.
    pub market: String,
    /// Updated bid levels.
    pub bids: Vec<AskBid>,
    /// Updated ask levels.
    pub asks: Vec<AskBid>,
    /// Identifier of the previous update.
    pub last_update_id: u64,
    /// Identifier of this update.
    pub update_id: u64,
}

/// A batch of trades pushed by the venue.
#[derive(Debug, Clone, PartialEq)]
pub struct TradesEvent {
    /// Market the trades printed on.
    pub market: String,
    /// The trades, in print order.
    pub trades: Vec<Trade>,
}

/// One asynchronous push from the engine to the host.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Transport-level keep-alive.
    Heartbeat,
    /// Engine-side failure surfaced to the host's error hook.
    Error(ExchangeError),
    /// Order-book delta.
    Orderbook(OrderbookEvent),
    /// Trade prints.
    Trades(TradesEvent),
    /// Stream teardown; always the last event of a queue.
    Disconnect,
}

impl StreamEvent {
    /// Short name for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat",
            Self::Error(_) => "error",
            Self::Orderbook(_) => "orderbook",
            Self::Trades(_) => "trades",
            Self::Disconnect => "disconnect",
        }
    }
}

/// Producer half of a client's event queue, handed to the engine at
/// subscription setup.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<StreamEvent>,
}

impl EventSender {
    /// Push an event, blocking while the queue is full.
    ///
    /// # Errors
    ///
    /// `SubscriptionFailed` when the consumer side is gone (stream torn
    /// down while the engine was still producing).
    pub fn send(&self, event: StreamEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|e| ExchangeError::subscription(format!("event queue closed: {e}")))
    }

    /// Push an event without blocking, dropping it when the queue is full.
    ///
    /// Used for events that are safe to shed under pressure (heartbeats).
    pub fn send_lossy(&self, event: StreamEvent) {
        if let Err(TrySendError::Full(event)) = self.tx.try_send(event) {
            warn!(kind = event.kind(), "event queue full, dropping event");
        }
    }
}

/// Consumer half of a client's event queue, owned by the dispatch thread.
pub type EventReceiver = Receiver<StreamEvent>;

/// Create a bounded event queue.
///
/// # Panics
///
/// Panics if `capacity` is zero.
#[must_use]
pub fn event_queue(capacity: usize) -> (EventSender, EventReceiver) {
    assert!(capacity > 0, "event queue capacity must be > 0");
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    (EventSender { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_arrive_in_emission_order() {
        let (tx, rx) = event_queue(8);
        for i in 0..5 {
            tx.send(StreamEvent::Orderbook(OrderbookEvent {
                market: "BTC-USD".into(),
                bids: Vec::new(),
                asks: Vec::new(),
                last_update_id: i,
                update_id: i + 1,
            }))
            .unwrap();
        }
        for i in 0..5 {
            match rx.recv().unwrap() {
                StreamEvent::Orderbook(ev) => assert_eq!(ev.last_update_id, i),
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[test]
    fn test_send_fails_after_receiver_drop() {
        let (tx, rx) = event_queue(1);
        drop(rx);
        let err = tx.send(StreamEvent::Heartbeat).unwrap_err();
        assert!(matches!(err, ExchangeError::SubscriptionFailed(_)));
    }

    #[test]
    fn test_lossy_send_sheds_when_full() {
        let (tx, rx) = event_queue(1);
        tx.send(StreamEvent::Heartbeat).unwrap();
        // Queue is full; this must not block.
        tx.send_lossy(StreamEvent::Heartbeat);
        assert_eq!(rx.len(), 1);
    }
}
