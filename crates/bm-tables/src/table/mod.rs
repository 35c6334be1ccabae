//! Match table variants.

mod direct;
mod indirect;
mod indirect_ws;
mod match_unit;

pub use direct::DirectTable;
pub use indirect::{IndirectIndex, IndirectTable};
pub use indirect_ws::IndirectWsTable;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::action::ActionEntry;
use crate::counters::CounterValue;
use crate::error::MatchResult;
use crate::handle::EntryHandle;

/// The kind of a match table, as named in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableKind {
    #[serde(rename = "simple")]
    Direct,
    #[serde(rename = "indirect")]
    Indirect,
    #[serde(rename = "indirect_ws")]
    IndirectWs,
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TableKind::Direct => "direct",
            TableKind::Indirect => "indirect",
            TableKind::IndirectWs => "indirect_ws",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of a table lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupResult {
    Hit { handle: EntryHandle, action: ActionEntry },
    Miss { default: Option<ActionEntry> },
}

impl LookupResult {
    /// The action to run, if any.
    pub fn action(&self) -> Option<&ActionEntry> {
        match self {
            LookupResult::Hit { action, .. } => Some(action),
            LookupResult::Miss { default } => default.as_ref(),
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, LookupResult::Hit { .. })
    }
}

/// A named match table of any kind.
#[derive(Debug)]
pub enum MatchTable {
    Direct(DirectTable),
    Indirect(IndirectTable),
    IndirectWs(IndirectWsTable),
}

impl MatchTable {
    pub fn kind(&self) -> TableKind {
        match self {
            MatchTable::Direct(_) => TableKind::Direct,
            MatchTable::Indirect(_) => TableKind::Indirect,
            MatchTable::IndirectWs(_) => TableKind::IndirectWs,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            MatchTable::Direct(t) => t.name(),
            MatchTable::Indirect(t) => t.name(),
            MatchTable::IndirectWs(t) => t.name(),
        }
    }

    pub fn num_entries(&self) -> usize {
        match self {
            MatchTable::Direct(t) => t.num_entries(),
            MatchTable::Indirect(t) => t.num_entries(),
            MatchTable::IndirectWs(t) => t.num_entries(),
        }
    }

    pub fn lookup(&self, key: &[u8], packet_len: usize) -> LookupResult {
        match self {
            MatchTable::Direct(t) => t.lookup(key, packet_len),
            MatchTable::Indirect(t) => t.lookup(key, packet_len),
            MatchTable::IndirectWs(t) => t.lookup(key, packet_len),
        }
    }

    pub fn query_counters(&self, handle: EntryHandle) -> MatchResult<(CounterValue, CounterValue)> {
        match self {
            MatchTable::Direct(t) => t.query_counters(handle),
            MatchTable::Indirect(t) => t.query_counters(handle),
            MatchTable::IndirectWs(t) => t.query_counters(handle),
        }
    }

    pub fn reset_counters(&self) -> MatchResult<()> {
        match self {
            MatchTable::Direct(t) => t.reset_counters(),
            MatchTable::Indirect(t) => t.reset_counters(),
            MatchTable::IndirectWs(t) => t.reset_counters(),
        }
    }

    pub fn as_direct(&self) -> Option<&DirectTable> {
        match self {
            MatchTable::Direct(t) => Some(t),
            _ => None,
        }
    }

    /// Indirect view of this table; selector tables qualify too.
    pub fn as_indirect(&self) -> Option<&IndirectTable> {
        match self {
            MatchTable::Indirect(t) => Some(t),
            MatchTable::IndirectWs(t) => Some(t.as_indirect()),
            MatchTable::Direct(_) => None,
        }
    }

    pub fn as_indirect_ws(&self) -> Option<&IndirectWsTable> {
        match self {
            MatchTable::IndirectWs(t) => Some(t),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{KeySchema, MatchKeyField, MatchKind};

    fn schema() -> KeySchema {
        KeySchema::new(vec![MatchKeyField::new("f", MatchKind::Exact, 1)])
    }

    #[test]
    fn test_views_by_kind() {
        let direct = MatchTable::Direct(DirectTable::new("d", schema(), 1, false));
        let indirect = MatchTable::Indirect(IndirectTable::new("i", schema(), 1, false));
        let ws = MatchTable::IndirectWs(IndirectWsTable::new("w", schema(), 1, false));

        assert!(direct.as_direct().is_some());
        assert!(direct.as_indirect().is_none());
        assert!(indirect.as_indirect().is_some());
        assert!(indirect.as_indirect_ws().is_none());
        assert!(ws.as_indirect().is_some());
        assert!(ws.as_indirect_ws().is_some());
        assert_eq!(ws.kind(), TableKind::IndirectWs);
        assert_eq!(ws.name(), "w");
    }

    #[test]
    fn test_table_kind_names() {
        let kind: TableKind = serde_json::from_str("\"simple\"").unwrap();
        assert_eq!(kind, TableKind::Direct);
        assert_eq!(TableKind::IndirectWs.to_string(), "indirect_ws");
    }
}
