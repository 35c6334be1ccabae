//! Indirect table with a member selector.

use std::ops::Deref;

use super::indirect::IndirectTable;
use crate::error::MatchResult;
use crate::handle::{EntryHandle, GroupHandle, MemberHandle};
use crate::key::{KeySchema, MatchKeyParam};

/// An indirect table whose entries may also point at groups of members.
///
/// Derefs to [`IndirectTable`] for the member and entry operations it
/// shares with plain indirect tables.
#[derive(Debug)]
pub struct IndirectWsTable {
    inner: IndirectTable,
}

impl IndirectWsTable {
    pub fn new(name: impl Into<String>, schema: KeySchema, max_size: usize, with_counters: bool) -> Self {
        Self {
            inner: IndirectTable::new(name, schema, max_size, with_counters),
        }
    }

    pub fn as_indirect(&self) -> &IndirectTable {
        &self.inner
    }

    pub fn create_group(&self) -> GroupHandle {
        self.inner.create_group()
    }

    /// Deletes an unreferenced group, releasing its members.
    pub fn delete_group(&self, group: GroupHandle) -> MatchResult<()> {
        self.inner.delete_group(group)
    }

    pub fn add_member_to_group(&self, member: MemberHandle, group: GroupHandle) -> MatchResult<()> {
        self.inner.add_member_to_group(member, group)
    }

    pub fn remove_member_from_group(&self, member: MemberHandle, group: GroupHandle) -> MatchResult<()> {
        self.inner.remove_member_from_group(member, group)
    }

    /// Members of `group` in insertion order.
    pub fn group_members(&self, group: GroupHandle) -> MatchResult<Vec<MemberHandle>> {
        self.inner.group_members(group)
    }

    pub fn num_groups(&self) -> usize {
        self.inner.num_groups()
    }

    pub fn add_entry_ws(
        &self,
        match_key: &[MatchKeyParam],
        group: GroupHandle,
        priority: i32,
    ) -> MatchResult<EntryHandle> {
        self.inner.add_entry_ws(match_key, group, priority)
    }

    pub fn modify_entry_ws(&self, handle: EntryHandle, group: GroupHandle) -> MatchResult<()> {
        self.inner.modify_entry_ws(handle, group)
    }

    pub fn set_default_group(&self, group: GroupHandle) -> MatchResult<()> {
        self.inner.set_default_group(group)
    }
}

impl Deref for IndirectWsTable {
    type Target = IndirectTable;

    fn deref(&self) -> &IndirectTable {
        &self.inner
    }
}
