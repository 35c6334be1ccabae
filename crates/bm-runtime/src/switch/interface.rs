//! The control interface as a trait, so control-plane front ends can be
//! written against it and tested with a fake.

use bm_tables::{ActionData, CounterValue, EntryHandle, GroupHandle, MatchKeyParam, MemberHandle};

use super::error::{SwapError, TableOpResult};
use super::runtime::Switch;

pub trait RuntimeInterface: Send + Sync {
    fn mt_add_entry(
        &self,
        table: &str,
        match_key: &[MatchKeyParam],
        action: &str,
        action_data: ActionData,
        priority: i32,
    ) -> TableOpResult<EntryHandle>;
    fn mt_set_default_action(&self, table: &str, action: &str, action_data: ActionData) -> TableOpResult<()>;
    fn mt_delete_entry(&self, table: &str, handle: EntryHandle) -> TableOpResult<()>;
    fn mt_modify_entry(
        &self,
        table: &str,
        handle: EntryHandle,
        action: &str,
        action_data: ActionData,
    ) -> TableOpResult<()>;

    fn mt_indirect_add_member(&self, table: &str, action: &str, action_data: ActionData)
        -> TableOpResult<MemberHandle>;
    fn mt_indirect_delete_member(&self, table: &str, member: MemberHandle) -> TableOpResult<()>;
    fn mt_indirect_add_entry(
        &self,
        table: &str,
        match_key: &[MatchKeyParam],
        member: MemberHandle,
        priority: i32,
    ) -> TableOpResult<EntryHandle>;
    fn mt_indirect_modify_entry(&self, table: &str, handle: EntryHandle, member: MemberHandle) -> TableOpResult<()>;
    fn mt_indirect_delete_entry(&self, table: &str, handle: EntryHandle) -> TableOpResult<()>;
    fn mt_indirect_set_default_member(&self, table: &str, member: MemberHandle) -> TableOpResult<()>;

    fn mt_indirect_ws_create_group(&self, table: &str) -> TableOpResult<GroupHandle>;
    fn mt_indirect_ws_delete_group(&self, table: &str, group: GroupHandle) -> TableOpResult<()>;
    fn mt_indirect_ws_add_member_to_group(
        &self,
        table: &str,
        member: MemberHandle,
        group: GroupHandle,
    ) -> TableOpResult<()>;
    fn mt_indirect_ws_remove_member_from_group(
        &self,
        table: &str,
        member: MemberHandle,
        group: GroupHandle,
    ) -> TableOpResult<()>;
    fn mt_indirect_ws_add_entry(
        &self,
        table: &str,
        match_key: &[MatchKeyParam],
        group: GroupHandle,
        priority: i32,
    ) -> TableOpResult<EntryHandle>;
    fn mt_indirect_ws_modify_entry(&self, table: &str, handle: EntryHandle, group: GroupHandle) -> TableOpResult<()>;
    fn mt_indirect_ws_set_default_group(&self, table: &str, group: GroupHandle) -> TableOpResult<()>;

    /// Returns `(bytes, packets)`.
    fn table_read_counters(&self, table: &str, handle: EntryHandle) -> TableOpResult<(CounterValue, CounterValue)>;
    fn table_reset_counters(&self, table: &str) -> TableOpResult<()>;

    fn load_new_config(&self, description: &str) -> Result<(), SwapError>;
    fn swap_configs(&self) -> Result<(), SwapError>;
}

impl RuntimeInterface for Switch {
    fn mt_add_entry(
        &self,
        table: &str,
        match_key: &[MatchKeyParam],
        action: &str,
        action_data: ActionData,
        priority: i32,
    ) -> TableOpResult<EntryHandle> {
        Switch::mt_add_entry(self, table, match_key, action, action_data, priority)
    }

    fn mt_set_default_action(&self, table: &str, action: &str, action_data: ActionData) -> TableOpResult<()> {
        Switch::mt_set_default_action(self, table, action, action_data)
    }

    fn mt_delete_entry(&self, table: &str, handle: EntryHandle) -> TableOpResult<()> {
        Switch::mt_delete_entry(self, table, handle)
    }

    fn mt_modify_entry(
        &self,
        table: &str,
        handle: EntryHandle,
        action: &str,
        action_data: ActionData,
    ) -> TableOpResult<()> {
        Switch::mt_modify_entry(self, table, handle, action, action_data)
    }

    fn mt_indirect_add_member(
        &self,
        table: &str,
        action: &str,
        action_data: ActionData,
    ) -> TableOpResult<MemberHandle> {
        Switch::mt_indirect_add_member(self, table, action, action_data)
    }

    fn mt_indirect_delete_member(&self, table: &str, member: MemberHandle) -> TableOpResult<()> {
        Switch::mt_indirect_delete_member(self, table, member)
    }

    fn mt_indirect_add_entry(
        &self,
        table: &str,
        match_key: &[MatchKeyParam],
        member: MemberHandle,
        priority: i32,
    ) -> TableOpResult<EntryHandle> {
        Switch::mt_indirect_add_entry(self, table, match_key, member, priority)
    }

    fn mt_indirect_modify_entry(&self, table: &str, handle: EntryHandle, member: MemberHandle) -> TableOpResult<()> {
        Switch::mt_indirect_modify_entry(self, table, handle, member)
    }

    fn mt_indirect_delete_entry(&self, table: &str, handle: EntryHandle) -> TableOpResult<()> {
        Switch::mt_indirect_delete_entry(self, table, handle)
    }

    fn mt_indirect_set_default_member(&self, table: &str, member: MemberHandle) -> TableOpResult<()> {
        Switch::mt_indirect_set_default_member(self, table, member)
    }

    fn mt_indirect_ws_create_group(&self, table: &str) -> TableOpResult<GroupHandle> {
        Switch::mt_indirect_ws_create_group(self, table)
    }

    fn mt_indirect_ws_delete_group(&self, table: &str, group: GroupHandle) -> TableOpResult<()> {
        Switch::mt_indirect_ws_delete_group(self, table, group)
    }

    fn mt_indirect_ws_add_member_to_group(
        &self,
        table: &str,
        member: MemberHandle,
        group: GroupHandle,
    ) -> TableOpResult<()> {
        Switch::mt_indirect_ws_add_member_to_group(self, table, member, group)
    }

    fn mt_indirect_ws_remove_member_from_group(
        &self,
        table: &str,
        member: MemberHandle,
        group: GroupHandle,
    ) -> TableOpResult<()> {
        Switch::mt_indirect_ws_remove_member_from_group(self, table, member, group)
    }

    fn mt_indirect_ws_add_entry(
        &self,
        table: &str,
        match_key: &[MatchKeyParam],
        group: GroupHandle,
        priority: i32,
    ) -> TableOpResult<EntryHandle> {
        Switch::mt_indirect_ws_add_entry(self, table, match_key, group, priority)
    }

    fn mt_indirect_ws_modify_entry(&self, table: &str, handle: EntryHandle, group: GroupHandle) -> TableOpResult<()> {
        Switch::mt_indirect_ws_modify_entry(self, table, handle, group)
    }

    fn mt_indirect_ws_set_default_group(&self, table: &str, group: GroupHandle) -> TableOpResult<()> {
        Switch::mt_indirect_ws_set_default_group(self, table, group)
    }

    fn table_read_counters(&self, table: &str, handle: EntryHandle) -> TableOpResult<(CounterValue, CounterValue)> {
        Switch::table_read_counters(self, table, handle)
    }

    fn table_reset_counters(&self, table: &str) -> TableOpResult<()> {
        Switch::table_reset_counters(self, table)
    }

    fn load_new_config(&self, description: &str) -> Result<(), SwapError> {
        Switch::load_new_config(self, description)
    }

    fn swap_configs(&self) -> Result<(), SwapError> {
        Switch::swap_configs(self)
    }
}
