//! Generational handle tables.
//!
//! Handles crossing the boundary are `u64` ids, never pointers: the upper
//! half is a slot index (offset by one so `0` is never a valid handle),
//! the lower half a generation counter bumped on every removal. A stale
//! id therefore resolves to nothing instead of touching reclaimed state,
//! which is what makes `disconnect` idempotent and double-frees
//! structurally impossible.

use parking_lot::Mutex;
use tracing::debug;

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

struct TableInner<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
}

/// A process-wide id → value table.
pub(crate) struct HandleTable<T> {
    name: &'static str,
    inner: Mutex<TableInner<T>>,
}

impl<T> HandleTable<T> {
    /// Create an empty table. `name` shows up in lifecycle logs.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Mutex::new(TableInner {
                slots: Vec::new(),
                free: Vec::new(),
            }),
        }
    }

    /// Insert a value and mint its handle.
    pub fn insert(&self, value: T) -> u64 {
        let mut inner = self.inner.lock();
        let index = match inner.free.pop() {
            Some(index) => {
                inner.slots[index].value = Some(value);
                index
            }
            None => {
                inner.slots.push(Slot {
                    generation: 0,
                    value: Some(value),
                });
                inner.slots.len() - 1
            }
        };
        let id = pack(index, inner.slots[index].generation);
        debug!(table = self.name, id, "handle created");
        id
    }

    /// Resolve a handle to a clone of its value.
    pub fn get(&self, id: u64) -> Option<T>
    where
        T: Clone,
    {
        let (index, generation) = unpack(id)?;
        let inner = self.inner.lock();
        let slot = inner.slots.get(index)?;
        if slot.generation != generation {
            return None;
        }
        slot.value.clone()
    }

    /// Remove a handle, returning its value. Stale and unknown ids yield
    /// `None`; the slot's generation is bumped so the id never resolves
    /// again.
    pub fn remove(&self, id: u64) -> Option<T> {
        let (index, generation) = unpack(id)?;
        let mut inner = self.inner.lock();
        let slot = inner.slots.get_mut(index)?;
        if slot.generation != generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        inner.free.push(index);
        debug!(table = self.name, id, "handle removed");
        Some(value)
    }
}

fn pack(index: usize, generation: u32) -> u64 {
    ((index as u64 + 1) << 32) | u64::from(generation)
}

#[allow(clippy::cast_possible_truncation)] // both halves are 32 bits wide
fn unpack(id: u64) -> Option<(usize, u32)> {
    let index = (id >> 32) as usize;
    if index == 0 {
        return None;
    }
    Some((index - 1, id as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let table: HandleTable<&str> = HandleTable::new("test");
        let id = table.insert("alpha");
        assert_ne!(id, 0);
        assert_eq!(table.get(id), Some("alpha"));
        assert_eq!(table.remove(id), Some("alpha"));
        assert_eq!(table.get(id), None);
    }

    #[test]
    fn test_zero_is_never_valid() {
        let table: HandleTable<u8> = HandleTable::new("test");
        table.insert(1);
        assert_eq!(table.get(0), None);
        assert_eq!(table.remove(0), None);
    }

    #[test]
    fn test_stale_handle_after_slot_reuse() {
        let table: HandleTable<u8> = HandleTable::new("test");
        let first = table.insert(1);
        assert_eq!(table.remove(first), Some(1));

        // Slot is reused with a bumped generation.
        let second = table.insert(2);
        assert_ne!(first, second);
        assert_eq!(table.get(first), None);
        assert_eq!(table.get(second), Some(2));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let table: HandleTable<u8> = HandleTable::new("test");
        let id = table.insert(7);
        assert_eq!(table.remove(id), Some(7));
        assert_eq!(table.remove(id), None);
        assert_eq!(table.remove(id), None);
    }

    #[test]
    fn test_distinct_handles() {
        let table: HandleTable<u8> = HandleTable::new("test");
        let a = table.insert(1);
        let b = table.insert(2);
        assert_ne!(a, b);
        assert_eq!(table.get(a), Some(1));
        assert_eq!(table.get(b), Some(2));
    }
}
