//! # Marketlink Core
//!
//! Venue-neutral core of the marketlink connectivity engine.
//!
//! This crate provides:
//! - **Model**: exchange domain types (orders, books, candles, balances)
//! - **Engine**: the [`ExchangeEngine`] trait venue adapters implement
//! - **Events**: the bounded stream-event queue between engine and host
//! - **Paper**: a deterministic in-memory engine for tests and demos
//!
//! The C boundary itself lives in `marketlink-ffi`; nothing in this crate
//! is `unsafe` or layout-sensitive.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod engine;
pub mod error;
pub mod events;
pub mod model;
pub mod paper;

pub use engine::ExchangeEngine;
pub use error::{ExchangeError, Result};
pub use events::{
    event_queue, EventReceiver, EventSender, OrderbookEvent, StreamEvent, TradesEvent,
    DEFAULT_EVENT_QUEUE_CAPACITY,
};
pub use paper::{PaperConfig, PaperExchange};
