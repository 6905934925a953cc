//! Fixed-capacity record buffers.
//!
//! Every bulk transfer across the boundary goes through memory the caller
//! allocates: a `(ptr, capacity)` pair the callee writes at most `capacity`
//! fixed-layout records into, reporting the written count out-of-band.
//! The callee never reads the buffer and never retains the pointer beyond
//! the agreed window — for snapshot calls that window is the call itself,
//! for streaming arenas it is the lifetime of the subscription, with
//! reuse gated on the callback having returned.
//!
//! When more records exist than fit, the surplus is dropped and the
//! reported count equals the capacity. The caller cannot distinguish a
//! full buffer from a truncated one; this matches the observed boundary
//! contract and is logged as a warning here.

use marketlink_core::{ExchangeError, Result};
use tracing::warn;

/// A caller-owned record buffer the native side writes into.
pub(crate) struct FixedBuffer<T> {
    ptr: *mut T,
    capacity: usize,
}

// SAFETY: the buffer is a dumb (pointer, capacity) pair. For streaming
// arenas it moves onto the dispatch thread, which is the only writer; the
// host reads only between callback entry and return, per the protocol.
unsafe impl<T: Send> Send for FixedBuffer<T> {}

impl<T> FixedBuffer<T> {
    /// Wrap a caller-supplied buffer.
    ///
    /// A null pointer is only acceptable together with zero capacity
    /// (a zero-capacity buffer is never written).
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for writes of `capacity` records of `T` for as
    /// long as this value is used.
    pub unsafe fn new(ptr: *mut T, capacity: usize, name: &str) -> Result<Self> {
        if ptr.is_null() && capacity > 0 {
            return Err(ExchangeError::missing_parameter(format!(
                "{name} buffer is null"
            )));
        }
        Ok(Self { ptr, capacity })
    }

    /// Number of records the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Convert and write records, returning how many were written.
    ///
    /// At most `capacity` source items are converted; conversion of the
    /// surplus never happens, so records that own allocations are only
    /// materialized when they will actually be handed to the caller.
    pub fn fill<S, I, F>(&mut self, items: I, mut convert: F) -> usize
    where
        I: IntoIterator<Item = S>,
        I::IntoIter: ExactSizeIterator,
        F: FnMut(S) -> T,
    {
        let iter = items.into_iter();
        let available = iter.len();
        let written = available.min(self.capacity);
        if available > self.capacity {
            warn!(
                available,
                capacity = self.capacity,
                "record buffer too small, truncating"
            );
        }
        for (i, item) in iter.take(written).enumerate() {
            // SAFETY: i < written <= capacity, and the caller guaranteed
            // validity for `capacity` writes at construction.
            unsafe { self.ptr.add(i).write(convert(item)) };
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(capacity: usize, records: usize) -> (Vec<u64>, usize) {
        let mut storage = vec![0_u64; capacity];
        // SAFETY: storage outlives the buffer and holds `capacity` slots
        let mut buffer =
            unsafe { FixedBuffer::new(storage.as_mut_ptr(), capacity, "test") }.unwrap();
        let written = buffer.fill(0..records, |v| v as u64 + 1);
        (storage, written)
    }

    #[test]
    fn test_boundary_counts() {
        // K in {0, 1, N-1, N, N+1} for N = 4
        for (records, expected) in [(0, 0), (1, 1), (3, 3), (4, 4), (5, 4)] {
            let (_, written) = filled(4, records);
            assert_eq!(written, expected, "records = {records}");
        }
    }

    #[test]
    fn test_writes_land_in_order() {
        let (storage, written) = filled(4, 3);
        assert_eq!(written, 3);
        assert_eq!(&storage[..3], &[1, 2, 3]);
        // Slot past the written count is untouched.
        assert_eq!(storage[3], 0);
    }

    #[test]
    fn test_truncation_never_writes_past_capacity() {
        let (storage, written) = filled(2, 10);
        assert_eq!(written, 2);
        assert_eq!(storage, vec![1, 2]);
    }

    #[test]
    fn test_surplus_is_never_converted() {
        let mut storage = vec![0_u64; 2];
        // SAFETY: storage holds 2 slots
        let mut buffer = unsafe { FixedBuffer::new(storage.as_mut_ptr(), 2, "test") }.unwrap();
        let mut conversions = 0;
        buffer.fill(0..10_usize, |v| {
            conversions += 1;
            v as u64
        });
        assert_eq!(conversions, 2);
    }

    #[test]
    fn test_null_with_capacity_rejected() {
        // SAFETY: null is explicitly handled
        let err = unsafe { FixedBuffer::<u64>::new(std::ptr::null_mut(), 4, "bids") }
            .err()
            .unwrap();
        assert!(matches!(err, ExchangeError::MissingParameter(_)));

        // SAFETY: zero capacity is never written
        let mut empty = unsafe { FixedBuffer::<u64>::new(std::ptr::null_mut(), 0, "bids") }.unwrap();
        assert_eq!(empty.fill(0..3_usize, |v| v as u64), 0);
        assert_eq!(empty.capacity(), 0);
    }
}
