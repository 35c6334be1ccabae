//! Builds a [`ConfigGeneration`] from a [`ProgramDescription`].
//!
//! Every cross reference in the description is resolved here: header types,
//! headers, actions, tables, parse states and learn list fields. A dangling
//! reference or duplicate name rejects the whole description.

use bm_tables::{
    ActionData, ActionFn, ActionParam, DirectTable, IndirectTable, IndirectWsTable, KeySchema, MatchError,
    MatchKeyField, MatchTable, TableKind,
};
use log::debug;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use super::description::{FieldRef, ParserDesc, ProgramDescription, TableDesc};
use super::generation::ConfigGeneration;
use super::parser::{Deparser, ParseState, Parser, Transition};
use super::pipeline::{Pipeline, PipelineTable};
use crate::learning::{LearnEngine, LearnError};
use crate::packet::{FieldId, FieldLayout, HeaderLayout, PhvFactory};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read program description {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed program description")]
    Json(#[source] serde_json::Error),

    #[error("Duplicate {kind} '{name}'")]
    Duplicate { kind: &'static str, name: String },

    #[error("Unknown {kind} '{name}'")]
    Unknown { kind: &'static str, name: String },

    #[error("Unknown field {0}.{1}")]
    UnknownField(String, String),

    #[error("Table '{table}' uses unknown action '{action}'")]
    UnknownAction { table: String, action: String },

    #[error("Header '{header}' is {bits} bits long, not a whole number of bytes")]
    UnalignedHeader { header: String, bits: usize },

    #[error("Bad value '{value}': {reason}")]
    BadValue { value: String, reason: &'static str },

    #[error("Bad default entry for table '{table}'")]
    BadDefaultEntry {
        table: String,
        #[source]
        source: MatchError,
    },

    #[error("Table '{0}' of kind {1} cannot have a default entry")]
    DefaultEntryNotSupported(String, TableKind),

    #[error("Bad learn list")]
    Learn(#[from] LearnError),

    #[error("A program is already installed as generation {0}")]
    AlreadyInitialized(u64),
}

pub type LoadResult<T> = Result<T, LoadError>;

pub fn parse_description(json: &str) -> LoadResult<ProgramDescription> {
    serde_json::from_str(json).map_err(LoadError::Json)
}

pub fn read_description(path: impl AsRef<Path>) -> LoadResult<ProgramDescription> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_description(&text)
}

/// Builds generation `id` from `desc`.
pub fn build_generation(id: u64, desc: &ProgramDescription) -> LoadResult<ConfigGeneration> {
    let phv_factory = Arc::new(build_phv_factory(id, desc)?);
    let actions = build_actions(desc)?;

    let mut tables = HashMap::new();
    let mut pipelines = HashMap::new();
    for p in &desc.pipelines {
        if pipelines.contains_key(&p.name) {
            return Err(duplicate("pipeline", &p.name));
        }
        let mut flow = Vec::with_capacity(p.tables.len());
        for t in &p.tables {
            if tables.contains_key(&t.name) {
                return Err(duplicate("table", &t.name));
            }
            let (table, pipeline_table) = build_table(t, &phv_factory, &actions)?;
            tables.insert(t.name.clone(), Arc::new(table));
            flow.push(pipeline_table);
        }
        pipelines.insert(p.name.clone(), Arc::new(Pipeline::new(p.name.clone(), p.init_table.clone(), flow)));
    }
    check_control_flow(desc, &tables)?;

    let mut parsers = HashMap::new();
    for p in &desc.parsers {
        if parsers.contains_key(&p.name) {
            return Err(duplicate("parser", &p.name));
        }
        parsers.insert(p.name.clone(), Arc::new(build_parser(p, &phv_factory)?));
    }

    let mut deparsers = HashMap::new();
    for d in &desc.deparsers {
        if deparsers.contains_key(&d.name) {
            return Err(duplicate("deparser", &d.name));
        }
        let order = d
            .order
            .iter()
            .map(|h| phv_factory.header_id(h).ok_or_else(|| unknown("header", h)))
            .collect::<LoadResult<Vec<_>>>()?;
        deparsers.insert(d.name.clone(), Arc::new(Deparser::new(d.name.clone(), order)));
    }

    let mut learn_engine = LearnEngine::new();
    for l in &desc.learn_lists {
        let elements = l
            .elements
            .iter()
            .map(|f| resolve_field(&phv_factory, f))
            .collect::<LoadResult<Vec<_>>>()?;
        learn_engine.add_list(l.id, l.name.clone(), elements, l.max_samples)?;
    }

    debug!(
        "Built generation {}: {} tables, {} actions, {} pipelines",
        id,
        tables.len(),
        actions.len(),
        pipelines.len()
    );

    Ok(ConfigGeneration {
        id,
        tables,
        actions,
        pipelines,
        parsers,
        deparsers,
        learn_engine: Arc::new(learn_engine),
        phv_factory,
    })
}

fn duplicate(kind: &'static str, name: &str) -> LoadError {
    LoadError::Duplicate {
        kind,
        name: name.to_string(),
    }
}

fn unknown(kind: &'static str, name: &str) -> LoadError {
    LoadError::Unknown {
        kind,
        name: name.to_string(),
    }
}

fn build_phv_factory(id: u64, desc: &ProgramDescription) -> LoadResult<PhvFactory> {
    let mut header_types: HashMap<&str, Vec<FieldLayout>> = HashMap::new();
    for ht in &desc.header_types {
        let fields = ht
            .fields
            .iter()
            .map(|(name, bitwidth)| FieldLayout {
                name: name.clone(),
                bitwidth: *bitwidth,
            })
            .collect();
        if header_types.insert(ht.name.as_str(), fields).is_some() {
            return Err(duplicate("header type", &ht.name));
        }
    }

    let mut seen = HashSet::new();
    let mut layouts = Vec::with_capacity(desc.headers.len());
    for h in &desc.headers {
        if !seen.insert(h.name.as_str()) {
            return Err(duplicate("header", &h.name));
        }
        let fields = header_types
            .get(h.header_type.as_str())
            .ok_or_else(|| unknown("header type", &h.header_type))?
            .clone();
        let layout = HeaderLayout {
            name: h.name.clone(),
            fields,
            metadata: h.metadata,
        };
        let bits = layout.bit_len();
        if !h.metadata && bits % 8 != 0 {
            return Err(LoadError::UnalignedHeader {
                header: h.name.clone(),
                bits,
            });
        }
        layouts.push(layout);
    }
    Ok(PhvFactory::new(id, layouts))
}

fn build_actions(desc: &ProgramDescription) -> LoadResult<HashMap<String, Arc<ActionFn>>> {
    let mut actions = HashMap::new();
    for a in &desc.actions {
        let params = a
            .runtime_data
            .iter()
            .map(|p| ActionParam {
                name: p.name.clone(),
                bitwidth: p.bitwidth,
            })
            .collect();
        let action = Arc::new(ActionFn::new(a.name.clone(), a.id, params));
        if actions.insert(a.name.clone(), action).is_some() {
            return Err(duplicate("action", &a.name));
        }
    }
    Ok(actions)
}

fn resolve_field(factory: &PhvFactory, FieldRef(header, field): &FieldRef) -> LoadResult<FieldId> {
    factory
        .field_id(header, field)
        .ok_or_else(|| LoadError::UnknownField(header.clone(), field.clone()))
}

fn build_table(
    desc: &TableDesc,
    factory: &PhvFactory,
    actions: &HashMap<String, Arc<ActionFn>>,
) -> LoadResult<(MatchTable, PipelineTable)> {
    let mut key_ids = Vec::with_capacity(desc.key.len());
    let mut fields = Vec::with_capacity(desc.key.len());
    for k in &desc.key {
        let id = resolve_field(factory, &k.target)?;
        let width = factory
            .field_width_bytes(id)
            .ok_or_else(|| LoadError::UnknownField(k.target.0.clone(), k.target.1.clone()))?;
        fields.push(MatchKeyField::new(
            format!("{}.{}", k.target.0, k.target.1),
            k.match_type,
            width,
        ));
        key_ids.push(id);
    }

    let unknown_action = |action: &str| LoadError::UnknownAction {
        table: desc.name.clone(),
        action: action.to_string(),
    };
    for a in desc.actions.iter().chain(desc.next_tables.keys()) {
        if !actions.contains_key(a) {
            return Err(unknown_action(a));
        }
    }

    let schema = KeySchema::new(fields);
    let table = match desc.kind {
        TableKind::Direct => {
            let table = DirectTable::new(desc.name.clone(), schema, desc.max_size, desc.with_counters);
            if let Some(entry) = &desc.default_entry {
                let action = actions.get(&entry.action).ok_or_else(|| unknown_action(&entry.action))?;
                let data = default_action_data(action, &entry.action_data)?;
                table
                    .set_default_action(Arc::clone(action), data)
                    .map_err(|source| LoadError::BadDefaultEntry {
                        table: desc.name.clone(),
                        source,
                    })?;
            }
            MatchTable::Direct(table)
        }
        TableKind::Indirect | TableKind::IndirectWs if desc.default_entry.is_some() => {
            return Err(LoadError::DefaultEntryNotSupported(desc.name.clone(), desc.kind));
        }
        TableKind::Indirect => {
            MatchTable::Indirect(IndirectTable::new(desc.name.clone(), schema, desc.max_size, desc.with_counters))
        }
        TableKind::IndirectWs => MatchTable::IndirectWs(IndirectWsTable::new(
            desc.name.clone(),
            schema,
            desc.max_size,
            desc.with_counters,
        )),
    };

    let flow = PipelineTable::new(
        desc.name.clone(),
        key_ids,
        desc.next_tables.iter().map(|(a, n)| (a.clone(), n.clone())).collect(),
        desc.base_default_next.clone(),
    );
    Ok((table, flow))
}

fn default_action_data(action: &ActionFn, values: &[String]) -> LoadResult<ActionData> {
    values
        .iter()
        .zip(action.params())
        .map(|(v, p)| parse_hex(v, (p.bitwidth as usize + 7) / 8))
        .chain(
            // Surplus values are passed through so the table reports the
            // arity mismatch.
            values.iter().skip(action.params().len()).map(|v| parse_hex(v, 0)),
        )
        .collect()
}

fn check_control_flow(desc: &ProgramDescription, tables: &HashMap<String, Arc<MatchTable>>) -> LoadResult<()> {
    let check = |name: &Option<String>| match name {
        Some(n) if !tables.contains_key(n) => Err(unknown("table", n)),
        _ => Ok(()),
    };
    for p in &desc.pipelines {
        check(&p.init_table)?;
        for t in &p.tables {
            check(&t.base_default_next)?;
            for next in t.next_tables.values() {
                check(next)?;
            }
        }
    }
    Ok(())
}

fn build_parser(desc: &ParserDesc, factory: &PhvFactory) -> LoadResult<Parser> {
    let mut index = HashMap::new();
    for (i, s) in desc.parse_states.iter().enumerate() {
        if index.insert(s.name.as_str(), i).is_some() {
            return Err(duplicate("parse state", &s.name));
        }
    }
    let state_id = |name: &str| index.get(name).copied().ok_or_else(|| unknown("parse state", name));

    let mut states = Vec::with_capacity(desc.parse_states.len());
    for s in &desc.parse_states {
        let extracts = s
            .extracts
            .iter()
            .map(|h| factory.header_id(h).ok_or_else(|| unknown("header", h)))
            .collect::<LoadResult<Vec<_>>>()?;
        let key = s
            .transition_key
            .iter()
            .map(|f| resolve_field(factory, f))
            .collect::<LoadResult<Vec<_>>>()?;
        let key_width: usize = key.iter().filter_map(|id| factory.field_width_bytes(*id)).sum();

        let mut transitions = Vec::with_capacity(s.transitions.len());
        for t in &s.transitions {
            transitions.push(Transition {
                value: t.value.as_deref().map(|v| parse_hex(v, key_width)).transpose()?,
                mask: t.mask.as_deref().map(|m| parse_hex(m, key_width)).transpose()?,
                next: t.next_state.as_deref().map(state_id).transpose()?,
            });
        }
        states.push(ParseState {
            name: s.name.clone(),
            extracts,
            key,
            transitions,
        });
    }

    Ok(Parser::new(desc.name.clone(), state_id(&desc.init_state)?, states))
}

/// Parses a hex string (optional `0x` prefix) into exactly `width` bytes,
/// big-endian. `width == 0` keeps the natural length.
pub(crate) fn parse_hex(value: &str, width: usize) -> LoadResult<Vec<u8>> {
    let bad = |reason| LoadError::BadValue {
        value: value.to_string(),
        reason,
    };
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(bad("not a hex number"));
    }

    let padded = if digits.len() % 2 == 1 {
        format!("0{}", digits)
    } else {
        digits.to_string()
    };
    let mut bytes = (0..padded.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&padded[i..i + 2], 16).map_err(|_| bad("not a hex number")))
        .collect::<LoadResult<Vec<u8>>>()?;

    if width == 0 {
        return Ok(bytes);
    }
    if bytes.len() > width {
        let excess = bytes.len() - width;
        if bytes[..excess].iter().any(|b| *b != 0) {
            return Err(bad("value too wide"));
        }
        bytes.drain(..excess);
    }
    let mut out = vec![0u8; width - bytes.len()];
    out.extend_from_slice(&bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn base() -> serde_json::Value {
        json!({
            "header_types": [
                { "name": "ethernet_t", "fields": [["dstAddr", 48], ["srcAddr", 48], ["etherType", 16]] }
            ],
            "headers": [{ "name": "ethernet", "header_type": "ethernet_t" }],
            "actions": [
                { "name": "_drop", "id": 0 },
                { "name": "forward", "id": 1, "runtime_data": [{ "name": "port", "bitwidth": 9 }] }
            ],
            "pipelines": [{
                "name": "ingress",
                "init_table": "dmac",
                "tables": [{
                    "name": "dmac",
                    "type": "simple",
                    "key": [{ "match_type": "exact", "target": ["ethernet", "dstAddr"] }],
                    "actions": ["forward", "_drop"],
                    "with_counters": true,
                    "default_entry": { "action": "forward", "action_data": ["0x1ff"] }
                }]
            }],
            "parsers": [{
                "name": "parser",
                "init_state": "start",
                "parse_states": [{ "name": "start", "extracts": ["ethernet"] }]
            }],
            "deparsers": [{ "name": "deparser", "order": ["ethernet"] }]
        })
    }

    fn build(value: serde_json::Value) -> LoadResult<ConfigGeneration> {
        let desc: ProgramDescription = serde_json::from_value(value).map_err(LoadError::Json)?;
        build_generation(1, &desc)
    }

    #[test]
    fn test_build_valid_program() {
        let generation = build(base()).unwrap();
        assert_eq!(generation.id(), 1);
        assert_eq!(generation.table_names(), vec!["dmac"]);
        assert!(generation.get_action("forward").is_some());
        assert!(generation.get_parser("parser").is_some());
        assert!(generation.get_deparser("deparser").is_some());

        let pipeline = generation.get_pipeline("ingress").unwrap();
        assert_eq!(pipeline.init_table(), Some("dmac"));

        let dmac = generation.get_table("dmac").unwrap();
        let default = dmac.as_direct().unwrap().default_action().unwrap();
        assert_eq!(default.data.get(0), Some(&[0x01u8, 0xff][..]));
    }

    #[test]
    fn test_unknown_action_rejected() {
        let mut desc = base();
        desc["pipelines"][0]["tables"][0]["actions"] = json!(["forward", "flood"]);
        assert!(matches!(
            build(desc).unwrap_err(),
            LoadError::UnknownAction { ref action, .. } if action == "flood"
        ));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut desc = base();
        desc["pipelines"][0]["tables"][0]["key"][0]["target"] = json!(["ethernet", "vid"]);
        assert!(matches!(build(desc).unwrap_err(), LoadError::UnknownField(_, _)));
    }

    #[test]
    fn test_unknown_init_table_rejected() {
        let mut desc = base();
        desc["pipelines"][0]["init_table"] = json!("smac");
        assert!(matches!(
            build(desc).unwrap_err(),
            LoadError::Unknown { kind: "table", .. }
        ));
    }

    #[test]
    fn test_duplicate_header_rejected() {
        let mut desc = base();
        desc["headers"] = json!([
            { "name": "ethernet", "header_type": "ethernet_t" },
            { "name": "ethernet", "header_type": "ethernet_t" }
        ]);
        assert!(matches!(
            build(desc).unwrap_err(),
            LoadError::Duplicate { kind: "header", .. }
        ));
    }

    #[test]
    fn test_unaligned_header_rejected() {
        let mut desc = base();
        desc["header_types"][0]["fields"] = json!([["dstAddr", 47]]);
        assert!(matches!(build(desc).unwrap_err(), LoadError::UnalignedHeader { bits: 47, .. }));
    }

    #[test]
    fn test_bad_default_entry_rejected() {
        let mut desc = base();
        desc["pipelines"][0]["tables"][0]["default_entry"] = json!({ "action": "forward" });
        assert!(matches!(build(desc).unwrap_err(), LoadError::BadDefaultEntry { .. }));
    }

    #[test]
    fn test_indirect_default_entry_rejected() {
        let mut desc = base();
        desc["pipelines"][0]["tables"][0]["type"] = json!("indirect");
        assert!(matches!(
            build(desc).unwrap_err(),
            LoadError::DefaultEntryNotSupported(_, TableKind::Indirect)
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(parse_description("{ not json").unwrap_err(), LoadError::Json(_)));
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("0x1ff", 2).unwrap(), vec![0x01, 0xff]);
        assert_eq!(parse_hex("0800", 2).unwrap(), vec![0x08, 0x00]);
        assert_eq!(parse_hex("0x0001", 1).unwrap(), vec![0x01]);
        assert_eq!(parse_hex("abc", 0).unwrap(), vec![0x0a, 0xbc]);
        assert!(parse_hex("0x100", 1).is_err());
        assert!(parse_hex("zz", 1).is_err());
    }
}
