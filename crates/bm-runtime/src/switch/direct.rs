//! Direct table operations.

use bm_tables::{ActionData, EntryHandle, MatchKeyParam};

use super::error::TableOpResult;
use super::runtime::{expect_direct, program_action, OnMissing, Switch};

impl Switch {
    /// Adds an entry to a direct table.
    ///
    /// `priority` must be non-negative when the table's key has a ternary or
    /// range field; lower values win. It is ignored otherwise.
    pub fn mt_add_entry(
        &self,
        table: &str,
        match_key: &[MatchKeyParam],
        action: &str,
        action_data: ActionData,
        priority: i32,
    ) -> TableOpResult<EntryHandle> {
        self.with_table("mt_add_entry", table, OnMissing::Invariant, |generation, t| {
            let t = expect_direct(t)?;
            let action = program_action(generation, table, action)?;
            Ok(t.add_entry(match_key, action, action_data, priority)?)
        })
    }

    pub fn mt_set_default_action(&self, table: &str, action: &str, action_data: ActionData) -> TableOpResult<()> {
        self.with_table("mt_set_default_action", table, OnMissing::Invariant, |generation, t| {
            let t = expect_direct(t)?;
            let action = program_action(generation, table, action)?;
            Ok(t.set_default_action(action, action_data)?)
        })
    }

    pub fn mt_delete_entry(&self, table: &str, handle: EntryHandle) -> TableOpResult<()> {
        self.with_table("mt_delete_entry", table, OnMissing::Invariant, |_, t| {
            Ok(expect_direct(t)?.delete_entry(handle)?)
        })
    }

    pub fn mt_modify_entry(
        &self,
        table: &str,
        handle: EntryHandle,
        action: &str,
        action_data: ActionData,
    ) -> TableOpResult<()> {
        self.with_table("mt_modify_entry", table, OnMissing::Invariant, |generation, t| {
            let t = expect_direct(t)?;
            let action = program_action(generation, table, action)?;
            Ok(t.modify_entry(handle, action, action_data)?)
        })
    }

    /// Number of entries in any kind of table.
    pub fn mt_get_num_entries(&self, table: &str) -> TableOpResult<usize> {
        self.with_table("mt_get_num_entries", table, OnMissing::InvalidName, |_, t| Ok(t.num_entries()))
    }
}
