//! Entry storage and key matching shared by all table variants.
//!
//! Exact-only tables keep a hash index on the packed key. Any other key
//! schema falls back to an ordered scan: for keys with ternary or range
//! fields the lowest priority value wins, otherwise the longest total LPM
//! prefix wins. Remaining ties go to the smaller handle.

use bm_common::HandleMap;
use std::collections::HashMap;
use std::sync::Arc;

use crate::counters::{CounterValue, EntryCounters};
use crate::error::{MatchError, MatchResult};
use crate::handle::EntryHandle;
use crate::key::{CompiledKey, KeySchema, MatchKeyParam};

#[derive(Debug)]
pub(crate) struct MatchEntry<V> {
    key: CompiledKey,
    priority: i32,
    pub(crate) value: V,
    pub(crate) counters: EntryCounters,
}

#[derive(Debug)]
pub(crate) struct MatchUnit<V> {
    table: String,
    schema: Arc<KeySchema>,
    max_size: usize,
    entries: HandleMap<MatchEntry<V>>,
    exact_index: HashMap<Vec<u8>, EntryHandle>,
}

impl<V> MatchUnit<V> {
    pub(crate) fn new(table: impl Into<String>, schema: Arc<KeySchema>, max_size: usize) -> Self {
        Self {
            table: table.into(),
            schema,
            max_size,
            entries: HandleMap::new(),
            exact_index: HashMap::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Validates `params` and `priority` without inserting anything.
    pub(crate) fn check(&self, params: &[MatchKeyParam], priority: i32) -> MatchResult<CompiledKey> {
        let key = self.schema.compile(params)?;
        if self.schema.needs_priority() && priority < 0 {
            return Err(MatchError::InvalidPriority(priority));
        }
        if self.entries.len() >= self.max_size {
            return Err(MatchError::TableFull {
                table: self.table.clone(),
                max_size: self.max_size,
            });
        }
        let priority = self.effective_priority(priority);
        if let Some(existing) = self.find_duplicate(&key, priority) {
            return Err(MatchError::DuplicateEntry(existing));
        }
        Ok(key)
    }

    /// Inserts an entry whose key was produced by [`MatchUnit::check`].
    pub(crate) fn insert(&mut self, key: CompiledKey, value: V, priority: i32) -> EntryHandle {
        let exact = self.schema.is_exact_only().then(|| key.exact_bytes());
        let handle = EntryHandle::new(self.entries.insert(MatchEntry {
            key,
            priority: self.effective_priority(priority),
            value,
            counters: EntryCounters::new(),
        }));
        if let Some(bytes) = exact {
            self.exact_index.insert(bytes, handle);
        }
        handle
    }

    pub(crate) fn add(&mut self, params: &[MatchKeyParam], value: V, priority: i32) -> MatchResult<EntryHandle> {
        let key = self.check(params, priority)?;
        Ok(self.insert(key, value, priority))
    }

    pub(crate) fn get(&self, handle: EntryHandle) -> MatchResult<&MatchEntry<V>> {
        self.entries
            .get(handle.as_raw())
            .ok_or(MatchError::InvalidHandle(handle))
    }

    /// Replaces the value of `handle` and returns the previous one.
    pub(crate) fn replace(&mut self, handle: EntryHandle, value: V) -> MatchResult<V> {
        let entry = self
            .entries
            .get_mut(handle.as_raw())
            .ok_or(MatchError::InvalidHandle(handle))?;
        Ok(std::mem::replace(&mut entry.value, value))
    }

    /// Removes `handle` and returns its value.
    pub(crate) fn remove(&mut self, handle: EntryHandle) -> MatchResult<V> {
        let entry = self
            .entries
            .remove(handle.as_raw())
            .ok_or(MatchError::InvalidHandle(handle))?;
        if self.schema.is_exact_only() {
            self.exact_index.remove(&entry.key.exact_bytes());
        }
        Ok(entry.value)
    }

    /// Finds the best entry matching the packed lookup key.
    pub(crate) fn lookup(&self, key: &[u8]) -> Option<(EntryHandle, &MatchEntry<V>)> {
        if self.schema.is_exact_only() {
            let handle = *self.exact_index.get(key)?;
            return self.entries.get(handle.as_raw()).map(|e| (handle, e));
        }

        self.entries
            .iter()
            .filter(|(_, e)| e.key.matches(&self.schema, key))
            .min_by_key(|(h, e)| (e.priority, std::cmp::Reverse(e.key.prefix_length()), *h))
            .map(|(h, e)| (EntryHandle::new(h), e))
    }

    pub(crate) fn query_counters(&self, handle: EntryHandle) -> MatchResult<(CounterValue, CounterValue)> {
        Ok(self.get(handle)?.counters.query())
    }

    pub(crate) fn reset_counters(&self) {
        for (_, entry) in self.entries.iter() {
            entry.counters.reset();
        }
    }

    pub(crate) fn handles(&self) -> Vec<EntryHandle> {
        self.entries.handles().into_iter().map(EntryHandle::new).collect()
    }

    fn effective_priority(&self, priority: i32) -> i32 {
        if self.schema.needs_priority() {
            priority
        } else {
            0
        }
    }

    fn find_duplicate(&self, key: &CompiledKey, priority: i32) -> Option<EntryHandle> {
        if self.schema.is_exact_only() {
            return self.exact_index.get(&key.exact_bytes()).copied();
        }
        self.entries
            .iter()
            .find(|(_, e)| e.key == *key && e.priority == priority)
            .map(|(h, _)| EntryHandle::new(h))
    }
}
