//! Per-entry traffic counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counter value type for bytes and packets.
pub type CounterValue = u64;

/// Byte and packet counters attached to a table entry.
///
/// Updated by the data plane under the table's shared lock, so both fields
/// are atomics.
#[derive(Debug, Default)]
pub struct EntryCounters {
    bytes: AtomicU64,
    packets: AtomicU64,
}

impl EntryCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accounts one packet of `bytes` length.
    pub fn increment(&self, bytes: usize) {
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        self.packets.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns `(bytes, packets)`.
    pub fn query(&self) -> (CounterValue, CounterValue) {
        (
            self.bytes.load(Ordering::Relaxed),
            self.packets.load(Ordering::Relaxed),
        )
    }

    pub fn reset(&self) {
        self.bytes.store(0, Ordering::Relaxed);
        self.packets.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_and_reset() {
        let c = EntryCounters::new();
        c.increment(64);
        c.increment(1500);
        assert_eq!(c.query(), (1564, 2));

        c.reset();
        assert_eq!(c.query(), (0, 0));
    }
}
