//! Safe host-side client over the marketlink boundary.
//!
//! This crate plays the role a foreign-language binding would: it calls
//! the `marketlink-ffi` surface through the same C-shaped contracts
//! (handles, caller-owned record buffers, callback tables, owned
//! strings) and re-exposes everything as a safe Rust API. Every unsafe
//! boundary interaction lives here so applications never see a raw
//! pointer.
//!
//! # Example
//!
//! ```no_run
//! use marketlink_host::{ExchangeClient, PaperConfig};
//!
//! # fn main() -> marketlink_host::Result<()> {
//! let client = ExchangeClient::init_paper(&PaperConfig::default())?;
//! client.listen_orderbook("BTC-USD", |delta| {
//!     println!("{}: {} bids", delta.market, delta.bids.len());
//! })?;
//! client.wait_for_disconnect(None);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod client;
mod keepalive;
mod registry;

pub use client::{
    ErrorListener, ExchangeClient, OrderbookListener, TradesListener, VoidListener,
};

pub use marketlink_core::model;
pub use marketlink_core::{
    ExchangeEngine, ExchangeError, OrderbookEvent, PaperConfig, PaperExchange, Result, TradesEvent,
};
