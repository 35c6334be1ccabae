//! Indirect match table and the member/group registries behind it.
//!
//! Entries do not carry an action. They point at a member (an action plus
//! its data) or, for selector tables, at a group of members. Every binding
//! to a member or group holds a reference on it: entries, the default
//! binding, and group membership all count, and a referenced object cannot
//! be deleted.

use bm_common::{HandleMap, HandleMapError};
use log::{debug, error};
use parking_lot::RwLock;
use std::sync::Arc;

use super::match_unit::MatchUnit;
use super::LookupResult;
use crate::action::{ActionData, ActionEntry, ActionFn};
use crate::counters::CounterValue;
use crate::error::{MatchError, MatchResult};
use crate::handle::{EntryHandle, GroupHandle, MemberHandle};
use crate::key::{KeySchema, MatchKeyParam};

// Fixed seeds keep member selection stable across runs and generations.
const SELECTOR_SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

/// What an indirect entry (or the default binding) points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndirectIndex {
    Member(MemberHandle),
    Group(GroupHandle),
}

#[derive(Debug, Default)]
struct Group {
    members: Vec<MemberHandle>,
}

#[derive(Debug)]
struct IndirectState {
    entries: MatchUnit<IndirectIndex>,
    members: HandleMap<ActionEntry>,
    groups: HandleMap<Group>,
    default_index: Option<IndirectIndex>,
}

impl IndirectState {
    fn check_index(&self, index: IndirectIndex) -> MatchResult<()> {
        match index {
            IndirectIndex::Member(m) if !self.members.contains(m.as_raw()) => {
                Err(MatchError::InvalidMbrHandle(m))
            }
            IndirectIndex::Group(g) if !self.groups.contains(g.as_raw()) => {
                Err(MatchError::InvalidGrpHandle(g))
            }
            _ => Ok(()),
        }
    }

    fn bind(&mut self, index: IndirectIndex) -> MatchResult<()> {
        match index {
            IndirectIndex::Member(m) => self
                .members
                .increment_ref(m.as_raw())
                .map(|_| ())
                .map_err(|_| MatchError::InvalidMbrHandle(m)),
            IndirectIndex::Group(g) => self
                .groups
                .increment_ref(g.as_raw())
                .map(|_| ())
                .map_err(|_| MatchError::InvalidGrpHandle(g)),
        }
    }

    fn unbind(&mut self, index: IndirectIndex) {
        let res = match index {
            IndirectIndex::Member(m) => self.members.decrement_ref(m.as_raw()),
            IndirectIndex::Group(g) => self.groups.decrement_ref(g.as_raw()),
        };
        // Bound objects cannot be deleted, so a failure here means the
        // reference counts are already wrong.
        if let Err(e) = res {
            error!("Reference count out of sync for {:?}: {}", index, e);
        }
    }

    /// Resolves `index` to the action it runs for `key`.
    fn resolve(&self, index: IndirectIndex, selector: &ahash::RandomState, key: &[u8]) -> Option<ActionEntry> {
        let member = match index {
            IndirectIndex::Member(m) => m,
            IndirectIndex::Group(g) => {
                let group = self.groups.get(g.as_raw())?;
                if group.members.is_empty() {
                    return None;
                }
                let pick = selector.hash_one(key) % group.members.len() as u64;
                group.members[pick as usize]
            }
        };
        self.members.get(member.as_raw()).cloned()
    }
}

/// A table whose entries point at shared action profile members.
///
/// Group operations are only reachable through
/// [`IndirectWsTable`](super::IndirectWsTable); a plain indirect table never
/// holds groups.
#[derive(Debug)]
pub struct IndirectTable {
    name: String,
    schema: Arc<KeySchema>,
    with_counters: bool,
    selector: ahash::RandomState,
    state: RwLock<IndirectState>,
}

impl IndirectTable {
    pub fn new(name: impl Into<String>, schema: KeySchema, max_size: usize, with_counters: bool) -> Self {
        let name = name.into();
        let schema = Arc::new(schema);
        let [k0, k1, k2, k3] = SELECTOR_SEEDS;
        Self {
            state: RwLock::new(IndirectState {
                entries: MatchUnit::new(name.clone(), Arc::clone(&schema), max_size),
                members: HandleMap::new(),
                groups: HandleMap::new(),
                default_index: None,
            }),
            name,
            schema,
            with_counters,
            selector: ahash::RandomState::with_seeds(k0, k1, k2, k3),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &KeySchema {
        &self.schema
    }

    pub fn num_entries(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn num_members(&self) -> usize {
        self.state.read().members.len()
    }

    pub fn add_member(&self, action: Arc<ActionFn>, action_data: ActionData) -> MatchResult<MemberHandle> {
        let bound = ActionEntry::bind(action, action_data)?;
        let member = MemberHandle::new(self.state.write().members.insert(bound));
        debug!("{}: added member {}", self.name, member);
        Ok(member)
    }

    pub fn modify_member(
        &self,
        member: MemberHandle,
        action: Arc<ActionFn>,
        action_data: ActionData,
    ) -> MatchResult<()> {
        let bound = ActionEntry::bind(action, action_data)?;
        let mut state = self.state.write();
        let slot = state
            .members
            .get_mut(member.as_raw())
            .ok_or(MatchError::InvalidMbrHandle(member))?;
        *slot = bound;
        Ok(())
    }

    /// Deletes `member` unless an entry, the default binding, or a group
    /// still refers to it.
    pub fn delete_member(&self, member: MemberHandle) -> MatchResult<()> {
        self.state
            .write()
            .members
            .remove_unreferenced(member.as_raw())
            .map_err(|e| match e {
                HandleMapError::StillReferenced { ref_count, .. } => {
                    MatchError::MbrStillUsed { member, ref_count }
                }
                _ => MatchError::InvalidMbrHandle(member),
            })?;
        debug!("{}: deleted member {}", self.name, member);
        Ok(())
    }

    pub fn get_member(&self, member: MemberHandle) -> MatchResult<ActionEntry> {
        self.state
            .read()
            .members
            .get(member.as_raw())
            .cloned()
            .ok_or(MatchError::InvalidMbrHandle(member))
    }

    /// Number of bindings currently holding `member`.
    pub fn member_ref_count(&self, member: MemberHandle) -> MatchResult<u32> {
        self.state
            .read()
            .members
            .ref_count(member.as_raw())
            .ok_or(MatchError::InvalidMbrHandle(member))
    }

    pub fn add_entry(
        &self,
        match_key: &[MatchKeyParam],
        member: MemberHandle,
        priority: i32,
    ) -> MatchResult<EntryHandle> {
        self.add_indexed(match_key, IndirectIndex::Member(member), priority)
    }

    pub fn modify_entry(&self, handle: EntryHandle, member: MemberHandle) -> MatchResult<()> {
        self.modify_indexed(handle, IndirectIndex::Member(member))
    }

    pub fn delete_entry(&self, handle: EntryHandle) -> MatchResult<()> {
        let mut state = self.state.write();
        let old = state.entries.remove(handle)?;
        state.unbind(old);
        debug!("{}: deleted entry {}", self.name, handle);
        Ok(())
    }

    /// Returns what `handle` points at.
    pub fn get_entry(&self, handle: EntryHandle) -> MatchResult<IndirectIndex> {
        Ok(self.state.read().entries.get(handle)?.value)
    }

    pub fn set_default_member(&self, member: MemberHandle) -> MatchResult<()> {
        self.set_default_index(IndirectIndex::Member(member))
    }

    pub fn default_index(&self) -> Option<IndirectIndex> {
        self.state.read().default_index
    }

    pub fn lookup(&self, key: &[u8], packet_len: usize) -> LookupResult {
        let state = self.state.read();
        let default = || {
            state
                .default_index
                .and_then(|index| state.resolve(index, &self.selector, key))
        };
        let Some((handle, entry)) = state.entries.lookup(key) else {
            return LookupResult::Miss { default: default() };
        };
        match state.resolve(entry.value, &self.selector, key) {
            Some(action) => {
                if self.with_counters {
                    entry.counters.increment(packet_len);
                }
                LookupResult::Hit { handle, action }
            }
            None => LookupResult::Miss { default: default() },
        }
    }

    pub fn query_counters(&self, handle: EntryHandle) -> MatchResult<(CounterValue, CounterValue)> {
        if !self.with_counters {
            return Err(MatchError::CountersDisabled(self.name.clone()));
        }
        self.state.read().entries.query_counters(handle)
    }

    pub fn reset_counters(&self) -> MatchResult<()> {
        if !self.with_counters {
            return Err(MatchError::CountersDisabled(self.name.clone()));
        }
        self.state.read().entries.reset_counters();
        Ok(())
    }

    fn add_indexed(
        &self,
        match_key: &[MatchKeyParam],
        index: IndirectIndex,
        priority: i32,
    ) -> MatchResult<EntryHandle> {
        let mut state = self.state.write();
        state.check_index(index)?;
        let key = state.entries.check(match_key, priority)?;
        state.bind(index)?;
        let handle = state.entries.insert(key, index, priority);
        debug!("{}: added entry {} -> {:?}", self.name, handle, index);
        Ok(handle)
    }

    fn modify_indexed(&self, handle: EntryHandle, index: IndirectIndex) -> MatchResult<()> {
        let mut state = self.state.write();
        state.entries.get(handle)?;
        state.bind(index)?;
        let old = state.entries.replace(handle, index)?;
        state.unbind(old);
        debug!("{}: modified entry {} -> {:?}", self.name, handle, index);
        Ok(())
    }

    fn set_default_index(&self, index: IndirectIndex) -> MatchResult<()> {
        let mut state = self.state.write();
        state.bind(index)?;
        if let Some(old) = state.default_index.replace(index) {
            state.unbind(old);
        }
        debug!("{}: default set to {:?}", self.name, index);
        Ok(())
    }

    // Group operations, exposed by `IndirectWsTable`.

    pub(crate) fn create_group(&self) -> GroupHandle {
        let group = GroupHandle::new(self.state.write().groups.insert(Group::default()));
        debug!("{}: created group {}", self.name, group);
        group
    }

    pub(crate) fn delete_group(&self, group: GroupHandle) -> MatchResult<()> {
        let mut state = self.state.write();
        let removed = state
            .groups
            .remove_unreferenced(group.as_raw())
            .map_err(|e| match e {
                HandleMapError::StillReferenced { ref_count, .. } => {
                    MatchError::GrpStillUsed { group, ref_count }
                }
                _ => MatchError::InvalidGrpHandle(group),
            })?;
        for member in removed.members {
            state.unbind(IndirectIndex::Member(member));
        }
        debug!("{}: deleted group {}", self.name, group);
        Ok(())
    }

    pub(crate) fn add_member_to_group(&self, member: MemberHandle, group: GroupHandle) -> MatchResult<()> {
        let mut state = self.state.write();
        state.check_index(IndirectIndex::Member(member))?;
        let grp = state
            .groups
            .get(group.as_raw())
            .ok_or(MatchError::InvalidGrpHandle(group))?;
        if grp.members.contains(&member) {
            return Err(MatchError::MbrAlreadyInGrp { member, group });
        }
        state.bind(IndirectIndex::Member(member))?;
        if let Some(grp) = state.groups.get_mut(group.as_raw()) {
            grp.members.push(member);
        }
        debug!("{}: member {} joined group {}", self.name, member, group);
        Ok(())
    }

    pub(crate) fn remove_member_from_group(&self, member: MemberHandle, group: GroupHandle) -> MatchResult<()> {
        let mut state = self.state.write();
        state.check_index(IndirectIndex::Member(member))?;
        let grp = state
            .groups
            .get_mut(group.as_raw())
            .ok_or(MatchError::InvalidGrpHandle(group))?;
        let pos = grp
            .members
            .iter()
            .position(|m| *m == member)
            .ok_or(MatchError::MbrNotInGrp { member, group })?;
        grp.members.remove(pos);
        state.unbind(IndirectIndex::Member(member));
        debug!("{}: member {} left group {}", self.name, member, group);
        Ok(())
    }

    pub(crate) fn group_members(&self, group: GroupHandle) -> MatchResult<Vec<MemberHandle>> {
        self.state
            .read()
            .groups
            .get(group.as_raw())
            .map(|g| g.members.clone())
            .ok_or(MatchError::InvalidGrpHandle(group))
    }

    pub(crate) fn num_groups(&self) -> usize {
        self.state.read().groups.len()
    }

    pub(crate) fn add_entry_ws(
        &self,
        match_key: &[MatchKeyParam],
        group: GroupHandle,
        priority: i32,
    ) -> MatchResult<EntryHandle> {
        self.add_indexed(match_key, IndirectIndex::Group(group), priority)
    }

    pub(crate) fn modify_entry_ws(&self, handle: EntryHandle, group: GroupHandle) -> MatchResult<()> {
        self.modify_indexed(handle, IndirectIndex::Group(group))
    }

    pub(crate) fn set_default_group(&self, group: GroupHandle) -> MatchResult<()> {
        self.set_default_index(IndirectIndex::Group(group))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionParam;
    use crate::error::MatchErrorCode;
    use crate::key::{MatchKeyField, MatchKind};
    use pretty_assertions::assert_eq;

    fn set_port() -> Arc<ActionFn> {
        Arc::new(ActionFn::new(
            "set_port",
            0,
            vec![ActionParam {
                name: "port".to_string(),
                bitwidth: 9,
            }],
        ))
    }

    fn port(p: u8) -> ActionData {
        ActionData::new().with(vec![0, p])
    }

    fn ecmp_table() -> IndirectTable {
        IndirectTable::new(
            "ecmp",
            KeySchema::new(vec![MatchKeyField::new("ipv4.dstAddr", MatchKind::Lpm, 4)]),
            8,
            true,
        )
    }

    fn key(prefix: u32) -> Vec<MatchKeyParam> {
        vec![MatchKeyParam::lpm(vec![10, 0, 0, 0], prefix)]
    }

    #[test]
    fn test_entry_pins_member() {
        let t = ecmp_table();
        let m = t.add_member(set_port(), port(1)).unwrap();
        let h = t.add_entry(&key(8), m, 1).unwrap();
        assert_eq!(t.member_ref_count(m).unwrap(), 1);

        assert_eq!(
            t.delete_member(m).unwrap_err(),
            MatchError::MbrStillUsed {
                member: m,
                ref_count: 1
            }
        );

        t.delete_entry(h).unwrap();
        t.delete_member(m).unwrap();
        assert_eq!(t.num_members(), 0);
        assert_eq!(t.delete_member(m).unwrap_err().code(), MatchErrorCode::InvalidMbrHandle);
    }

    #[test]
    fn test_add_entry_unknown_member() {
        let t = ecmp_table();
        let err = t.add_entry(&key(8), MemberHandle::new(4), 1).unwrap_err();
        assert_eq!(err.code(), MatchErrorCode::InvalidMbrHandle);
        assert_eq!(t.num_entries(), 0);
    }

    #[test]
    fn test_modify_entry_moves_reference() {
        let t = ecmp_table();
        let m1 = t.add_member(set_port(), port(1)).unwrap();
        let m2 = t.add_member(set_port(), port(2)).unwrap();
        let h = t.add_entry(&key(8), m1, 1).unwrap();

        t.modify_entry(h, m2).unwrap();
        assert_eq!(t.member_ref_count(m1).unwrap(), 0);
        assert_eq!(t.member_ref_count(m2).unwrap(), 1);
        assert_eq!(t.get_entry(h).unwrap(), IndirectIndex::Member(m2));

        let res = t.lookup(&[10, 1, 1, 1], 64);
        assert_eq!(res.action().unwrap().data, port(2));
    }

    #[test]
    fn test_default_member_is_a_reference() {
        let t = ecmp_table();
        let m1 = t.add_member(set_port(), port(1)).unwrap();
        let m2 = t.add_member(set_port(), port(2)).unwrap();
        t.set_default_member(m1).unwrap();
        assert!(t.delete_member(m1).is_err());

        t.set_default_member(m2).unwrap();
        t.delete_member(m1).unwrap();

        let res = t.lookup(&[192, 168, 0, 1], 64);
        assert!(!res.is_hit());
        assert_eq!(res.action().unwrap().data, port(2));
    }

    #[test]
    fn test_modify_member_changes_all_entries() {
        let t = ecmp_table();
        let m = t.add_member(set_port(), port(1)).unwrap();
        t.add_entry(&key(8), m, 1).unwrap();
        t.modify_member(m, set_port(), port(7)).unwrap();
        assert_eq!(t.lookup(&[10, 0, 0, 1], 64).action().unwrap().data, port(7));
        assert_eq!(
            t.modify_member(MemberHandle::new(9), set_port(), port(1))
                .unwrap_err()
                .code(),
            MatchErrorCode::InvalidMbrHandle
        );
    }

    #[test]
    fn test_group_membership() {
        let t = ecmp_table();
        let m = t.add_member(set_port(), port(1)).unwrap();
        let g = t.create_group();

        t.add_member_to_group(m, g).unwrap();
        assert_eq!(
            t.add_member_to_group(m, g).unwrap_err(),
            MatchError::MbrAlreadyInGrp { member: m, group: g }
        );
        assert_eq!(t.delete_member(m).unwrap_err().code(), MatchErrorCode::MbrStillUsed);

        t.remove_member_from_group(m, g).unwrap();
        assert_eq!(
            t.remove_member_from_group(m, g).unwrap_err(),
            MatchError::MbrNotInGrp { member: m, group: g }
        );
        assert!(t.group_members(g).unwrap().is_empty());
        assert_eq!(t.member_ref_count(m).unwrap(), 0);
    }

    #[test]
    fn test_delete_group_releases_members() {
        let t = ecmp_table();
        let m = t.add_member(set_port(), port(1)).unwrap();
        let g = t.create_group();
        t.add_member_to_group(m, g).unwrap();
        let h = t.add_entry_ws(&key(8), g, 1).unwrap();

        assert_eq!(t.delete_group(g).unwrap_err().code(), MatchErrorCode::GrpStillUsed);
        t.delete_entry(h).unwrap();
        t.delete_group(g).unwrap();
        assert_eq!(t.num_groups(), 0);
        assert_eq!(t.member_ref_count(m).unwrap(), 0);
        assert_eq!(t.delete_group(g).unwrap_err().code(), MatchErrorCode::InvalidGrpHandle);
    }

    #[test]
    fn test_group_selection_is_stable_and_within_group() {
        let t = ecmp_table();
        let g = t.create_group();
        for p in 1..=4 {
            let m = t.add_member(set_port(), port(p)).unwrap();
            t.add_member_to_group(m, g).unwrap();
        }
        t.add_entry_ws(&key(8), g, 1).unwrap();

        let pkt = [10, 9, 8, 7];
        let first = t.lookup(&pkt, 64).action().cloned().unwrap();
        for _ in 0..8 {
            assert_eq!(t.lookup(&pkt, 64).action(), Some(&first));
        }
        let chosen = first.data.get(0).unwrap()[1];
        assert!((1..=4).contains(&chosen));
    }

    #[test]
    fn test_empty_group_falls_back_to_default() {
        let t = ecmp_table();
        let m = t.add_member(set_port(), port(9)).unwrap();
        t.set_default_member(m).unwrap();
        let g = t.create_group();
        let h = t.add_entry_ws(&key(8), g, 1).unwrap();

        let res = t.lookup(&[10, 0, 0, 1], 64);
        assert!(!res.is_hit());
        assert_eq!(res.action().unwrap().data, port(9));
        assert_eq!(t.query_counters(h).unwrap(), (0, 0));
    }

    #[test]
    fn test_entry_to_unknown_group() {
        let t = ecmp_table();
        assert_eq!(
            t.add_entry_ws(&key(8), GroupHandle::new(0), 1).unwrap_err(),
            MatchError::InvalidGrpHandle(GroupHandle::new(0))
        );
        assert_eq!(
            t.set_default_group(GroupHandle::new(0)).unwrap_err().code(),
            MatchErrorCode::InvalidGrpHandle
        );
    }
}
