//! Generation-counted handle table.
//!
//! Hands out integer handles for values that something outside the borrow
//! checker refers to: the engine's callback context, a scan cursor held by a
//! caller. The high half of a handle is a generation, so a handle that
//! outlives its value (or arrives after the slot was reused) misses instead
//! of reaching the wrong value.

struct Slot<T> {
    generation: u32,
    entry: Option<T>,
}

/// Slot array with per-slot generations and a free list.
pub(crate) struct HandleTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> HandleTable<T> {
    pub(crate) const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Stores `value` and returns its handle. Never returns 0.
    pub(crate) fn insert(&mut self, value: T) -> u64 {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: None,
                });
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.generation = slot.generation.wrapping_add(1).max(1);
        slot.entry = Some(value);
        pack(index, slot.generation)
    }

    /// Looks up a live handle.
    #[cfg_attr(not(feature = "ffi"), allow(dead_code))]
    pub(crate) fn get(&self, handle: u64) -> Option<&T> {
        let (index, generation) = unpack(handle);
        self.slots
            .get(index as usize)
            .filter(|slot| slot.generation == generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    /// Takes the value out of a live handle. `None` if it was not live.
    pub(crate) fn remove(&mut self, handle: u64) -> Option<T> {
        let (index, generation) = unpack(handle);
        let slot = self
            .slots
            .get_mut(index as usize)
            .filter(|slot| slot.generation == generation)?;
        let value = slot.entry.take()?;
        self.free.push(index);
        Some(value)
    }

    /// Takes every live value. Outstanding handles all miss afterwards.
    pub(crate) fn clear(&mut self) -> Vec<T> {
        let mut values = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(value) = slot.entry.take() {
                self.free.push(index as u32);
                values.push(value);
            }
        }
        values
    }

    /// Number of live handles.
    pub(crate) fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

fn pack(index: u32, generation: u32) -> u64 {
    (u64::from(generation) << 32) | u64::from(index)
}

fn unpack(handle: u64) -> (u32, u32) {
    (handle as u32, (handle >> 32) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut table = HandleTable::new();
        let handle = table.insert("a");
        assert_ne!(handle, 0);
        assert_eq!(table.get(handle), Some(&"a"));
        assert_eq!(table.remove(handle), Some("a"));
        assert!(table.get(handle).is_none());
        assert_eq!(table.remove(handle), None);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_stale_handle_misses_reused_slot() {
        let mut table = HandleTable::new();
        let first = table.insert(1);
        table.remove(first);
        let second = table.insert(2);

        assert_eq!(first as u32, second as u32);
        assert_ne!(first, second);
        assert!(table.get(first).is_none());
        assert_eq!(table.get(second), Some(&2));
        assert_eq!(table.remove(first), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_unknown_handle() {
        let table: HandleTable<u8> = HandleTable::new();
        assert!(table.get(0).is_none());
        assert!(table.get(u64::MAX).is_none());
    }

    #[test]
    fn test_clear_invalidates_handles() {
        let mut table = HandleTable::new();
        let a = table.insert("a");
        let b = table.insert("b");
        table.remove(a);

        assert_eq!(table.clear(), vec!["b"]);
        assert_eq!(table.remove(b), None);
        assert_eq!(table.len(), 0);

        let c = table.insert("c");
        assert_ne!(c, a);
        assert_ne!(c, b);
    }
}
