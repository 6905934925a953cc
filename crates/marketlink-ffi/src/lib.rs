//! C FFI boundary for the marketlink connectivity engine.
//!
//! This crate provides `extern "C"` functions for driving an exchange
//! engine from C and any language with C FFI support (C#, Java, Python,
//! Node.js, etc.).
//!
//! # Design
//!
//! - **Integer handles**: clients and subscriptions are `u64` ids resolved
//!   through generational tables, never raw pointers
//! - **Tagged results**: every function returns [`FfiResult`]
//!   (`tag == 0` means success, otherwise the tag classifies the error and
//!   `message` carries the text)
//! - **Explicit memory management**: strings allocated here are freed by
//!   the caller with `free_string`; record buffers are caller-allocated
//! - **Out-parameters**: values are returned via pointer arguments
//! - **Push callbacks**: subscriptions deliver events through a callback
//!   table invoked from a per-client dispatch thread
//!
//! # Example (C)
//!
//! ```c
//! #include "marketlink.h"
//!
//! int main() {
//!     uint64_t client = 0;
//!     FfiResult rc = init_paper("key", "secret", true, 10000, &client);
//!     if (rc.tag != 0) {
//!         printf("error %u: %s\n", rc.tag, rc.message);
//!         free_string(rc.message);
//!         return 1;
//!     }
//!
//!     double price = 0.0;
//!     rc = get_price_ticker(client, "BTC-USD", &price);
//!     /* ... */
//!     return 0;
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
// Snapshot entry points mirror a flat C signature; splitting them into
// structs would change the boundary contract.
#![allow(clippy::too_many_arguments)]

mod buffer;
mod client;
mod handle;
mod record;
mod result;
mod string;
mod subscription;

// Re-export all FFI functions and boundary types
pub use client::*;
pub use record::*;
pub use result::*;
pub use string::*;
pub use subscription::*;
