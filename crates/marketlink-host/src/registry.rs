//! Process-wide client liveness registry.
//!
//! Callback context crossing the boundary is never a pointer into host
//! state: it is only the registry key. A trampoline resolves the key
//! here, and a key whose client has been torn down simply misses — the
//! event is dropped instead of touching reclaimed memory.

use std::sync::{Arc, OnceLock};

use fxhash::FxHashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::client::ClientShared;

static REGISTRY: OnceLock<Mutex<FxHashMap<u64, Arc<ClientShared>>>> = OnceLock::new();

fn table() -> &'static Mutex<FxHashMap<u64, Arc<ClientShared>>> {
    REGISTRY.get_or_init(|| Mutex::new(FxHashMap::default()))
}

/// Register a client's shared state under its key. Called before the
/// callback table is installed, so no trampoline can miss a live client.
pub(crate) fn insert(key: u64, shared: Arc<ClientShared>) {
    table().lock().insert(key, shared);
    debug!(key, "client registered");
}

/// Resolve a registry key to its client, if still live.
pub(crate) fn get(key: u64) -> Option<Arc<ClientShared>> {
    table().lock().get(&key).cloned()
}

/// Remove a client from the registry. Exactly one caller gets the entry;
/// later calls (and stale trampolines) see `None`.
pub(crate) fn remove(key: u64) -> Option<Arc<ClientShared>> {
    let removed = table().lock().remove(&key);
    if removed.is_some() {
        debug!(key, "client deregistered");
    }
    removed
}
