//! Handle-keyed storage that never auto-vivifies entries.
//!
//! Match tables identify entries, members and groups by small integers that
//! the table itself allocates. A freed handle becomes available again, and the
//! smallest free handle is always reused first, so handle values stay dense.
//!
//! Lookups never create entries: `get()` returns `Option<&V>` and the
//! reference-count helpers return an error for unknown handles instead of
//! silently inserting a zero-count slot.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use thiserror::Error;

/// Integer representation shared by entry, member and group handles.
pub type RawHandle = u32;

/// Error type for HandleMap operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandleMapError {
    #[error("Handle {0} not found")]
    HandleNotFound(RawHandle),

    #[error("Handle {handle} still referenced ({ref_count} references)")]
    StillReferenced { handle: RawHandle, ref_count: u32 },

    #[error("Reference count underflow for handle {0}")]
    RefCountUnderflow(RawHandle),
}

#[derive(Debug, Clone)]
struct Slot<V> {
    value: V,
    ref_count: u32,
}

/// Handle allocator and storage with explicit reference counting.
#[derive(Debug, Clone)]
pub struct HandleMap<V> {
    slots: Vec<Option<Slot<V>>>,
    free: BinaryHeap<Reverse<RawHandle>>,
    len: usize,
}

impl<V> HandleMap<V> {
    /// Creates a new empty map.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: BinaryHeap::new(),
            len: 0,
        }
    }

    /// Creates a new map with room for `capacity` handles.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: BinaryHeap::new(),
            len: 0,
        }
    }

    /// Returns the number of live handles.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no handle is live.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns true if `handle` is live.
    pub fn contains(&self, handle: RawHandle) -> bool {
        self.slot(handle).is_some()
    }

    /// Stores `value` under the smallest free handle and returns that handle.
    pub fn insert(&mut self, value: V) -> RawHandle {
        let slot = Some(Slot {
            value,
            ref_count: 0,
        });
        self.len += 1;
        match self.free.pop() {
            Some(Reverse(handle)) => {
                self.slots[handle as usize] = slot;
                handle
            }
            None => {
                self.slots.push(slot);
                (self.slots.len() - 1) as RawHandle
            }
        }
    }

    /// Returns the value for `handle`.
    ///
    /// **This never creates entries.**
    pub fn get(&self, handle: RawHandle) -> Option<&V> {
        self.slot(handle).map(|s| &s.value)
    }

    /// Returns the value for `handle` mutably.
    ///
    /// **This never creates entries.**
    pub fn get_mut(&mut self, handle: RawHandle) -> Option<&mut V> {
        self.slots
            .get_mut(handle as usize)
            .and_then(|s| s.as_mut())
            .map(|s| &mut s.value)
    }

    /// Removes `handle` regardless of its reference count.
    pub fn remove(&mut self, handle: RawHandle) -> Option<V> {
        let slot = self.slots.get_mut(handle as usize)?.take()?;
        self.len -= 1;
        self.free.push(Reverse(handle));
        Some(slot.value)
    }

    /// Removes `handle` only if nothing references it.
    pub fn remove_unreferenced(&mut self, handle: RawHandle) -> Result<V, HandleMapError> {
        let ref_count = self
            .slot(handle)
            .ok_or(HandleMapError::HandleNotFound(handle))?
            .ref_count;
        if ref_count > 0 {
            return Err(HandleMapError::StillReferenced { handle, ref_count });
        }
        self.remove(handle)
            .ok_or(HandleMapError::HandleNotFound(handle))
    }

    /// Increments the reference count of `handle` and returns the new count.
    pub fn increment_ref(&mut self, handle: RawHandle) -> Result<u32, HandleMapError> {
        let slot = self
            .slot_mut(handle)
            .ok_or(HandleMapError::HandleNotFound(handle))?;
        slot.ref_count = slot.ref_count.saturating_add(1);
        Ok(slot.ref_count)
    }

    /// Decrements the reference count of `handle` and returns the new count.
    pub fn decrement_ref(&mut self, handle: RawHandle) -> Result<u32, HandleMapError> {
        let slot = self
            .slot_mut(handle)
            .ok_or(HandleMapError::HandleNotFound(handle))?;
        if slot.ref_count == 0 {
            return Err(HandleMapError::RefCountUnderflow(handle));
        }
        slot.ref_count -= 1;
        Ok(slot.ref_count)
    }

    /// Returns the reference count of `handle`, or `None` if it is not live.
    pub fn ref_count(&self, handle: RawHandle) -> Option<u32> {
        self.slot(handle).map(|s| s.ref_count)
    }

    /// Iterates over live handles in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (RawHandle, &V)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(h, s)| s.as_ref().map(|s| (h as RawHandle, &s.value)))
    }

    /// Returns the live handles in ascending order.
    pub fn handles(&self) -> Vec<RawHandle> {
        self.iter().map(|(h, _)| h).collect()
    }

    /// Drops every entry and resets handle allocation.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.len = 0;
    }

    fn slot(&self, handle: RawHandle) -> Option<&Slot<V>> {
        self.slots.get(handle as usize).and_then(|s| s.as_ref())
    }

    fn slot_mut(&mut self, handle: RawHandle) -> Option<&mut Slot<V>> {
        self.slots.get_mut(handle as usize).and_then(|s| s.as_mut())
    }
}

impl<V> Default for HandleMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_insert_allocates_dense_handles() {
        let mut map = HandleMap::new();
        assert_eq!(map.insert("a"), 0);
        assert_eq!(map.insert("b"), 1);
        assert_eq!(map.insert("c"), 2);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_smallest_free_handle_reused() {
        let mut map = HandleMap::new();
        for v in 0..4 {
            map.insert(v);
        }
        map.remove(2);
        map.remove(0);

        assert_eq!(map.insert(10), 0);
        assert_eq!(map.insert(20), 2);
        assert_eq!(map.insert(30), 4);
        assert_eq!(map.handles(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_get_never_creates() {
        let mut map: HandleMap<i32> = HandleMap::new();

        assert!(map.get(7).is_none());
        assert!(map.get_mut(7).is_none());
        assert!(map.is_empty());
        assert_eq!(map.increment_ref(7), Err(HandleMapError::HandleNotFound(7)));
        assert!(map.is_empty());
    }

    #[test]
    fn test_remove_twice() {
        let mut map = HandleMap::new();
        let h = map.insert("x");
        assert_eq!(map.remove(h), Some("x"));
        assert_eq!(map.remove(h), None);
        assert!(!map.contains(h));
    }

    #[test]
    fn test_referenced_handle_not_removable() {
        let mut map = HandleMap::new();
        let h = map.insert("member");
        assert_eq!(map.increment_ref(h).unwrap(), 1);
        assert_eq!(map.increment_ref(h).unwrap(), 2);

        assert_eq!(
            map.remove_unreferenced(h),
            Err(HandleMapError::StillReferenced {
                handle: h,
                ref_count: 2
            })
        );

        map.decrement_ref(h).unwrap();
        map.decrement_ref(h).unwrap();
        assert_eq!(map.remove_unreferenced(h), Ok("member"));
    }

    #[test]
    fn test_decrement_ref_underflow_protection() {
        let mut map = HandleMap::new();
        let h = map.insert(());

        assert_eq!(map.decrement_ref(h), Err(HandleMapError::RefCountUnderflow(h)));
        map.increment_ref(h).unwrap();
        assert_eq!(map.decrement_ref(h), Ok(0));
        assert_eq!(map.ref_count(h), Some(0));
    }

    #[test]
    fn test_reinserted_handle_starts_unreferenced() {
        let mut map = HandleMap::new();
        let h = map.insert(1);
        map.increment_ref(h).unwrap();
        map.remove(h);

        let h2 = map.insert(2);
        assert_eq!(h, h2);
        assert_eq!(map.ref_count(h2), Some(0));
    }

    #[test]
    fn test_clear() {
        let mut map = HandleMap::with_capacity(4);
        map.insert(1);
        map.insert(2);
        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.insert(3), 0);
    }
}
