//! Per-entry counters, valid on every table kind.

use bm_tables::{CounterValue, EntryHandle};

use super::error::TableOpResult;
use super::runtime::{OnMissing, Switch};

impl Switch {
    /// Returns `(bytes, packets)` counted for `handle`.
    pub fn table_read_counters(&self, table: &str, handle: EntryHandle) -> TableOpResult<(CounterValue, CounterValue)> {
        self.with_table("table_read_counters", table, OnMissing::Invariant, |_, t| {
            Ok(t.query_counters(handle)?)
        })
    }

    pub fn table_reset_counters(&self, table: &str) -> TableOpResult<()> {
        self.with_table("table_reset_counters", table, OnMissing::Invariant, |_, t| Ok(t.reset_counters()?))
    }
}
