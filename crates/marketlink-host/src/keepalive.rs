//! Keep-alive primitive for callback-driven clients.
//!
//! Once a client listens for pushes, something must keep the host's
//! interest in the stream alive and give applications a way to block
//! until the stream ends. This is a manually-resettable wait event
//! (mutex + condvar) plus one lazily-started thread that parks on it;
//! the disconnect trampoline signals it.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

pub(crate) struct KeepAlive {
    disconnected: Mutex<bool>,
    signal: Condvar,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl KeepAlive {
    pub fn new() -> Self {
        Self {
            disconnected: Mutex::new(false),
            signal: Condvar::new(),
            thread: Mutex::new(None),
        }
    }

    /// Start the keep-alive thread if it is not already running.
    ///
    /// Called on the first listen/subscribe; a client that never
    /// subscribes never pays for the thread.
    pub fn ensure_started(self: &Arc<Self>) {
        let mut slot = self.thread.lock();
        if slot.is_some() {
            return;
        }
        let keepalive = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("marketlink-keepalive".into())
            .spawn(move || {
                keepalive.wait(None);
                debug!("keep-alive released");
            });
        match spawned {
            Ok(handle) => *slot = Some(handle),
            // Thread creation failing leaves waiting to the caller's own
            // threads; the signal path is unaffected.
            Err(e) => debug!(error = %e, "keep-alive thread not started"),
        }
    }

    /// Signal disconnection, releasing every waiter.
    pub fn signal(&self) {
        let mut disconnected = self.disconnected.lock();
        *disconnected = true;
        self.signal.notify_all();
    }

    /// Block until the client disconnects, or the timeout elapses.
    /// Returns whether the client is disconnected.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut disconnected = self.disconnected.lock();
        match timeout {
            Some(timeout) => {
                if !*disconnected {
                    self.signal.wait_for(&mut disconnected, timeout);
                }
            }
            None => {
                while !*disconnected {
                    self.signal.wait(&mut disconnected);
                }
            }
        }
        *disconnected
    }

    /// Whether the disconnect signal has fired.
    pub fn is_disconnected(&self) -> bool {
        *self.disconnected.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_times_out_until_signaled() {
        let keepalive = KeepAlive::new();
        assert!(!keepalive.wait(Some(Duration::from_millis(10))));
        assert!(!keepalive.is_disconnected());

        keepalive.signal();
        assert!(keepalive.wait(Some(Duration::from_millis(10))));
        assert!(keepalive.is_disconnected());
        // Signalling again is harmless.
        keepalive.signal();
        assert!(keepalive.wait(None));
    }

    #[test]
    fn test_signal_releases_started_thread() {
        let keepalive = Arc::new(KeepAlive::new());
        keepalive.ensure_started();
        keepalive.ensure_started(); // second call is a no-op

        keepalive.signal();
        let handle = keepalive.thread.lock().take().unwrap();
        handle.join().unwrap();
    }
}
