//! Serde model of a JSON program description.
//!
//! Field references are written as two-element arrays, e.g.
//! `["ethernet", "dstAddr"]`. Header types list fields the same way:
//! `["dstAddr", 48]`.

use bm_tables::{MatchKind, TableKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramDescription {
    #[serde(default)]
    pub header_types: Vec<HeaderTypeDesc>,
    #[serde(default)]
    pub headers: Vec<HeaderDesc>,
    #[serde(default)]
    pub parsers: Vec<ParserDesc>,
    #[serde(default)]
    pub deparsers: Vec<DeparserDesc>,
    #[serde(default)]
    pub actions: Vec<ActionDesc>,
    #[serde(default)]
    pub pipelines: Vec<PipelineDesc>,
    #[serde(default)]
    pub learn_lists: Vec<LearnListDesc>,
}

/// `[header, field]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef(pub String, pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderTypeDesc {
    pub name: String,
    /// `(field name, bit width)` in wire order
    pub fields: Vec<(String, u32)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderDesc {
    pub name: String,
    pub header_type: String,
    #[serde(default)]
    pub metadata: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserDesc {
    pub name: String,
    pub init_state: String,
    pub parse_states: Vec<ParseStateDesc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseStateDesc {
    pub name: String,
    /// Headers extracted in order on entering the state
    #[serde(default)]
    pub extracts: Vec<String>,
    #[serde(default)]
    pub transition_key: Vec<FieldRef>,
    #[serde(default)]
    pub transitions: Vec<TransitionDesc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionDesc {
    /// Hex value compared against the transition key; `None` is the default
    /// transition.
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub mask: Option<String>,
    /// `None` ends parsing.
    #[serde(default)]
    pub next_state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeparserDesc {
    pub name: String,
    pub order: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDesc {
    pub name: String,
    pub id: u32,
    #[serde(default)]
    pub runtime_data: Vec<RuntimeDataDesc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeDataDesc {
    pub name: String,
    pub bitwidth: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDesc {
    pub name: String,
    #[serde(default)]
    pub init_table: Option<String>,
    #[serde(default)]
    pub tables: Vec<TableDesc>,
}

fn default_table_kind() -> TableKind {
    TableKind::Direct
}

fn default_max_size() -> usize {
    1024
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDesc {
    pub name: String,
    #[serde(rename = "type", default = "default_table_kind")]
    pub kind: TableKind,
    #[serde(default)]
    pub key: Vec<KeyDesc>,
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    #[serde(default)]
    pub with_counters: bool,
    /// Actions entries of this table may use
    pub actions: Vec<String>,
    /// Next table per action name; `None` ends the pipeline.
    #[serde(default)]
    pub next_tables: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub base_default_next: Option<String>,
    /// Direct tables only
    #[serde(default)]
    pub default_entry: Option<DefaultEntryDesc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDesc {
    pub match_type: MatchKind,
    pub target: FieldRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultEntryDesc {
    pub action: String,
    /// Hex strings, one per runtime parameter
    #[serde(default)]
    pub action_data: Vec<String>,
}

fn default_max_samples() -> usize {
    1024
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnListDesc {
    pub id: u32,
    pub name: String,
    pub elements: Vec<FieldRef>,
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_table_defaults() {
        let table: TableDesc = serde_json::from_str(
            r#"{ "name": "smac", "actions": ["_nop"],
                 "key": [{ "match_type": "exact", "target": ["ethernet", "srcAddr"] }] }"#,
        )
        .unwrap();

        assert_eq!(table.kind, TableKind::Direct);
        assert_eq!(table.max_size, 1024);
        assert!(!table.with_counters);
        assert_eq!(
            table.key[0].target,
            FieldRef("ethernet".to_string(), "srcAddr".to_string())
        );
    }

    #[test]
    fn test_header_type_field_pairs() {
        let ht: HeaderTypeDesc =
            serde_json::from_str(r#"{ "name": "vlan_t", "fields": [["pcp", 3], ["vid", 12]] }"#).unwrap();
        assert_eq!(ht.fields, vec![("pcp".to_string(), 3), ("vid".to_string(), 12)]);
    }

    #[test]
    fn test_empty_description() {
        let desc: ProgramDescription = serde_json::from_str("{}").unwrap();
        assert_eq!(desc, ProgramDescription::default());
    }
}
