//! Action profile members and selector groups.
//!
//! Member and entry operations accept both indirect table kinds. Group
//! operations need a table with a selector. Member and group creation and
//! deletion are audited.

use bm_tables::{ActionData, EntryHandle, GroupHandle, MatchKeyParam, MemberHandle};
use std::fmt;

use super::error::TableOpResult;
use super::runtime::{caller_action, expect_indirect, expect_indirect_ws, OnMissing, Switch, AUDIT_SOURCE};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;

fn audit_resource(category: AuditCategory, op: &str, table: &str, object: impl fmt::Display) {
    audit_log!(AuditRecord::new(category, AUDIT_SOURCE, op)
        .with_outcome(AuditOutcome::Success)
        .with_table(table)
        .with_object_id(object));
}

impl Switch {
    pub fn mt_indirect_add_member(
        &self,
        table: &str,
        action: &str,
        action_data: ActionData,
    ) -> TableOpResult<MemberHandle> {
        let member = self.with_table("mt_indirect_add_member", table, OnMissing::InvalidName, |generation, t| {
            let t = expect_indirect(t)?;
            let action = caller_action(generation, action)?;
            Ok(t.add_member(action, action_data)?)
        })?;
        audit_resource(AuditCategory::ResourceCreate, "mt_indirect_add_member", table, member);
        Ok(member)
    }

    /// Fails with `MbrStillUsed` while an entry, the default binding or a
    /// group references the member.
    pub fn mt_indirect_delete_member(&self, table: &str, member: MemberHandle) -> TableOpResult<()> {
        self.with_table("mt_indirect_delete_member", table, OnMissing::InvalidName, |_, t| {
            Ok(expect_indirect(t)?.delete_member(member)?)
        })?;
        audit_resource(AuditCategory::ResourceDelete, "mt_indirect_delete_member", table, member);
        Ok(())
    }

    pub fn mt_indirect_modify_member(
        &self,
        table: &str,
        member: MemberHandle,
        action: &str,
        action_data: ActionData,
    ) -> TableOpResult<()> {
        self.with_table("mt_indirect_modify_member", table, OnMissing::InvalidName, |generation, t| {
            let t = expect_indirect(t)?;
            let action = caller_action(generation, action)?;
            Ok(t.modify_member(member, action, action_data)?)
        })
    }

    pub fn mt_indirect_add_entry(
        &self,
        table: &str,
        match_key: &[MatchKeyParam],
        member: MemberHandle,
        priority: i32,
    ) -> TableOpResult<EntryHandle> {
        self.with_table("mt_indirect_add_entry", table, OnMissing::InvalidName, |_, t| {
            Ok(expect_indirect(t)?.add_entry(match_key, member, priority)?)
        })
    }

    pub fn mt_indirect_modify_entry(&self, table: &str, handle: EntryHandle, member: MemberHandle) -> TableOpResult<()> {
        self.with_table("mt_indirect_modify_entry", table, OnMissing::InvalidName, |_, t| {
            Ok(expect_indirect(t)?.modify_entry(handle, member)?)
        })
    }

    pub fn mt_indirect_delete_entry(&self, table: &str, handle: EntryHandle) -> TableOpResult<()> {
        self.with_table("mt_indirect_delete_entry", table, OnMissing::InvalidName, |_, t| {
            Ok(expect_indirect(t)?.delete_entry(handle)?)
        })
    }

    pub fn mt_indirect_set_default_member(&self, table: &str, member: MemberHandle) -> TableOpResult<()> {
        self.with_table("mt_indirect_set_default_member", table, OnMissing::InvalidName, |_, t| {
            Ok(expect_indirect(t)?.set_default_member(member)?)
        })
    }

    pub fn mt_indirect_ws_create_group(&self, table: &str) -> TableOpResult<GroupHandle> {
        let group = self.with_table("mt_indirect_ws_create_group", table, OnMissing::InvalidName, |_, t| {
            Ok(expect_indirect_ws(t)?.create_group())
        })?;
        audit_resource(AuditCategory::ResourceCreate, "mt_indirect_ws_create_group", table, group);
        Ok(group)
    }

    /// Fails with `GrpStillUsed` while an entry or the default binding
    /// references the group.
    pub fn mt_indirect_ws_delete_group(&self, table: &str, group: GroupHandle) -> TableOpResult<()> {
        self.with_table("mt_indirect_ws_delete_group", table, OnMissing::InvalidName, |_, t| {
            Ok(expect_indirect_ws(t)?.delete_group(group)?)
        })?;
        audit_resource(AuditCategory::ResourceDelete, "mt_indirect_ws_delete_group", table, group);
        Ok(())
    }

    pub fn mt_indirect_ws_add_member_to_group(
        &self,
        table: &str,
        member: MemberHandle,
        group: GroupHandle,
    ) -> TableOpResult<()> {
        self.with_table("mt_indirect_ws_add_member_to_group", table, OnMissing::InvalidName, |_, t| {
            Ok(expect_indirect_ws(t)?.add_member_to_group(member, group)?)
        })
    }

    pub fn mt_indirect_ws_remove_member_from_group(
        &self,
        table: &str,
        member: MemberHandle,
        group: GroupHandle,
    ) -> TableOpResult<()> {
        self.with_table("mt_indirect_ws_remove_member_from_group", table, OnMissing::InvalidName, |_, t| {
            Ok(expect_indirect_ws(t)?.remove_member_from_group(member, group)?)
        })
    }

    /// Members of `group` in insertion order.
    pub fn mt_indirect_ws_get_group_members(&self, table: &str, group: GroupHandle) -> TableOpResult<Vec<MemberHandle>> {
        self.with_table("mt_indirect_ws_get_group_members", table, OnMissing::InvalidName, |_, t| {
            Ok(expect_indirect_ws(t)?.group_members(group)?)
        })
    }

    pub fn mt_indirect_ws_add_entry(
        &self,
        table: &str,
        match_key: &[MatchKeyParam],
        group: GroupHandle,
        priority: i32,
    ) -> TableOpResult<EntryHandle> {
        self.with_table("mt_indirect_ws_add_entry", table, OnMissing::InvalidName, |_, t| {
            Ok(expect_indirect_ws(t)?.add_entry_ws(match_key, group, priority)?)
        })
    }

    pub fn mt_indirect_ws_modify_entry(&self, table: &str, handle: EntryHandle, group: GroupHandle) -> TableOpResult<()> {
        self.with_table("mt_indirect_ws_modify_entry", table, OnMissing::InvalidName, |_, t| {
            Ok(expect_indirect_ws(t)?.modify_entry_ws(handle, group)?)
        })
    }

    pub fn mt_indirect_ws_set_default_group(&self, table: &str, group: GroupHandle) -> TableOpResult<()> {
        self.with_table("mt_indirect_ws_set_default_group", table, OnMissing::InvalidName, |_, t| {
            Ok(expect_indirect_ws(t)?.set_default_group(group)?)
        })
    }
}
