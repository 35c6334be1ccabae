//! Direct match table: each entry binds a key straight to an action.

use log::debug;
use parking_lot::RwLock;
use std::sync::Arc;

use super::match_unit::MatchUnit;
use super::LookupResult;
use crate::action::{ActionData, ActionEntry, ActionFn};
use crate::counters::CounterValue;
use crate::error::{MatchError, MatchResult};
use crate::handle::EntryHandle;
use crate::key::{KeySchema, MatchKeyParam};

#[derive(Debug)]
struct DirectState {
    entries: MatchUnit<ActionEntry>,
    default_entry: Option<ActionEntry>,
}

/// A table whose entries carry their own action and action data.
#[derive(Debug)]
pub struct DirectTable {
    name: String,
    schema: Arc<KeySchema>,
    with_counters: bool,
    state: RwLock<DirectState>,
}

impl DirectTable {
    pub fn new(name: impl Into<String>, schema: KeySchema, max_size: usize, with_counters: bool) -> Self {
        let name = name.into();
        let schema = Arc::new(schema);
        Self {
            state: RwLock::new(DirectState {
                entries: MatchUnit::new(name.clone(), Arc::clone(&schema), max_size),
                default_entry: None,
            }),
            name,
            schema,
            with_counters,
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

    /// Adds an entry binding `match_key` to `action(action_data)`.
    ///
    /// `priority` only matters when the key has ternary or range fields.
    pub fn add_entry(
        &self,
        match_key: &[MatchKeyParam],
        action: Arc<ActionFn>,
        action_data: ActionData,
        priority: i32,
    ) -> MatchResult<EntryHandle> {
        let bound = ActionEntry::bind(action, action_data)?;
        let handle = self.state.write().entries.add(match_key, bound, priority)?;
        debug!("{}: added entry {}", self.name, handle);
        Ok(handle)
    }

    pub fn set_default_action(&self, action: Arc<ActionFn>, action_data: ActionData) -> MatchResult<()> {
        let bound = ActionEntry::bind(action, action_data)?;
        debug!("{}: default action set to {}", self.name, bound);
        self.state.write().default_entry = Some(bound);
        Ok(())
    }

    pub fn delete_entry(&self, handle: EntryHandle) -> MatchResult<()> {
        self.state.write().entries.remove(handle)?;
        debug!("{}: deleted entry {}", self.name, handle);
        Ok(())
    }

    pub fn modify_entry(
        &self,
        handle: EntryHandle,
        action: Arc<ActionFn>,
        action_data: ActionData,
    ) -> MatchResult<()> {
        let bound = ActionEntry::bind(action, action_data)?;
        self.state.write().entries.replace(handle, bound)?;
        debug!("{}: modified entry {}", self.name, handle);
        Ok(())
    }

    /// Returns the action bound to `handle`.
    pub fn get_entry(&self, handle: EntryHandle) -> MatchResult<ActionEntry> {
        Ok(self.state.read().entries.get(handle)?.value.clone())
    }

    pub fn default_action(&self) -> Option<ActionEntry> {
        self.state.read().default_entry.clone()
    }

    pub fn lookup(&self, key: &[u8], packet_len: usize) -> LookupResult {
        let state = self.state.read();
        match state.entries.lookup(key) {
            Some((handle, entry)) => {
                if self.with_counters {
                    entry.counters.increment(packet_len);
                }
                LookupResult::Hit {
                    handle,
                    action: entry.value.clone(),
                }
            }
            None => LookupResult::Miss {
                default: state.default_entry.clone(),
            },
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionParam;
    use crate::error::MatchErrorCode;
    use crate::key::{MatchKeyField, MatchKind};

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

    fn drop_action() -> Arc<ActionFn> {
        Arc::new(ActionFn::new("_drop", 1, vec![]))
    }

    fn dmac_table(with_counters: bool) -> DirectTable {
        DirectTable::new(
            "dmac",
            KeySchema::new(vec![MatchKeyField::new("ethernet.dstAddr", MatchKind::Exact, 6)]),
            4,
            with_counters,
        )
    }

    const MAC: [u8; 6] = [0, 0, 0, 0, 0, 1];

    #[test]
    fn test_add_lookup_delete() {
        let t = dmac_table(true);
        let h = t
            .add_entry(
                &[MatchKeyParam::exact(MAC.to_vec())],
                set_port(),
                ActionData::new().with(vec![0, 2]),
                -1,
            )
            .unwrap();
        assert_eq!(t.num_entries(), 1);

        let res = t.lookup(&MAC, 64);
        assert!(res.is_hit());
        assert_eq!(res.action().unwrap().action.name(), "set_port");

        t.delete_entry(h).unwrap();
        assert_eq!(t.delete_entry(h).unwrap_err().code(), MatchErrorCode::InvalidHandle);
        assert_eq!(
            t.modify_entry(h, drop_action(), ActionData::new()).unwrap_err(),
            MatchError::InvalidHandle(h)
        );
    }

    #[test]
    fn test_miss_uses_default_action() {
        let t = dmac_table(true);
        assert_eq!(t.lookup(&MAC, 64), LookupResult::Miss { default: None });

        t.set_default_action(drop_action(), ActionData::new()).unwrap();
        let res = t.lookup(&MAC, 64);
        assert!(!res.is_hit());
        assert_eq!(res.action().unwrap().action.name(), "_drop");
    }

    #[test]
    fn test_modify_entry() {
        let t = dmac_table(true);
        let h = t
            .add_entry(
                &[MatchKeyParam::exact(MAC.to_vec())],
                set_port(),
                ActionData::new().with(vec![0, 1]),
                -1,
            )
            .unwrap();
        t.modify_entry(h, drop_action(), ActionData::new()).unwrap();
        assert_eq!(t.get_entry(h).unwrap().action.name(), "_drop");
    }

    #[test]
    fn test_bad_action_data_not_inserted() {
        let t = dmac_table(true);
        let err = t
            .add_entry(&[MatchKeyParam::exact(MAC.to_vec())], set_port(), ActionData::new(), -1)
            .unwrap_err();
        assert_eq!(err.code(), MatchErrorCode::BadActionData);
        assert_eq!(t.num_entries(), 0);
    }

    #[test]
    fn test_counters() {
        let t = dmac_table(true);
        let h = t
            .add_entry(
                &[MatchKeyParam::exact(MAC.to_vec())],
                drop_action(),
                ActionData::new(),
                -1,
            )
            .unwrap();
        t.lookup(&MAC, 100);
        t.lookup(&MAC, 50);
        assert_eq!(t.query_counters(h).unwrap(), (150, 2));

        t.reset_counters().unwrap();
        assert_eq!(t.query_counters(h).unwrap(), (0, 0));
        assert_eq!(
            t.query_counters(EntryHandle::new(9)).unwrap_err().code(),
            MatchErrorCode::InvalidHandle
        );
    }

    #[test]
    fn test_counters_disabled() {
        let t = dmac_table(false);
        assert_eq!(
            t.query_counters(EntryHandle::new(0)).unwrap_err().code(),
            MatchErrorCode::CountersDisabled
        );
        assert!(t.reset_counters().is_err());
    }
}
