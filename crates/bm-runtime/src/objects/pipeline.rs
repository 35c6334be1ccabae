//! Pipeline control flow: which table runs next after each action.

use std::collections::HashMap;

use crate::packet::{FieldId, Phv};

/// How a pipeline applies one table.
#[derive(Debug, Clone)]
pub struct PipelineTable {
    name: String,
    key: Vec<FieldId>,
    next_tables: HashMap<String, Option<String>>,
    base_default_next: Option<String>,
}

impl PipelineTable {
    pub(crate) fn new(
        name: String,
        key: Vec<FieldId>,
        next_tables: HashMap<String, Option<String>>,
        base_default_next: Option<String>,
    ) -> Self {
        Self {
            name,
            key,
            next_tables,
            base_default_next,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Packs the lookup key for this table from `phv`.
    pub fn build_key(&self, phv: &Phv) -> Vec<u8> {
        self.key
            .iter()
            .filter_map(|id| phv.field(*id))
            .flatten()
            .copied()
            .collect()
    }

    /// Table to apply after `action` ran, or after a miss with no default
    /// action when `action` is `None`.
    pub fn next_table(&self, action: Option<&str>) -> Option<&str> {
        action
            .and_then(|a| self.next_tables.get(a))
            .unwrap_or(&self.base_default_next)
            .as_deref()
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    init_table: Option<String>,
    tables: HashMap<String, PipelineTable>,
}

impl Pipeline {
    pub(crate) fn new(name: String, init_table: Option<String>, tables: Vec<PipelineTable>) -> Self {
        Self {
            name,
            init_table,
            tables: tables.into_iter().map(|t| (t.name.clone(), t)).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn init_table(&self) -> Option<&str> {
        self.init_table.as_deref()
    }

    pub fn table(&self, name: &str) -> Option<&PipelineTable> {
        self.tables.get(name)
    }

    pub fn num_tables(&self) -> usize {
        self.tables.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_table() {
        let t = PipelineTable::new(
            "acl".to_string(),
            vec![],
            HashMap::from([
                ("permit".to_string(), Some("fwd".to_string())),
                ("deny".to_string(), None),
            ]),
            Some("log".to_string()),
        );
        assert_eq!(t.next_table(Some("permit")), Some("fwd"));
        assert_eq!(t.next_table(Some("deny")), None);
        assert_eq!(t.next_table(Some("other")), Some("log"));
        assert_eq!(t.next_table(None), Some("log"));
    }
}
