//! A complete forwarding program built from one description.

use bm_tables::{ActionFn, MatchTable};
use std::collections::HashMap;
use std::sync::Arc;

use super::parser::{Deparser, Parser};
use super::pipeline::Pipeline;
use crate::learning::LearnEngine;
use crate::packet::PhvFactory;

/// One configuration generation.
///
/// The set of tables, actions, pipelines, parsers and deparsers is fixed
/// once built; tables only mutate their own entries. Generations are shared
/// through `Arc` and live as long as the controller or an in-flight
/// operation holds them.
#[derive(Debug)]
pub struct ConfigGeneration {
    pub(super) id: u64,
    pub(super) tables: HashMap<String, Arc<MatchTable>>,
    pub(super) actions: HashMap<String, Arc<ActionFn>>,
    pub(super) pipelines: HashMap<String, Arc<Pipeline>>,
    pub(super) parsers: HashMap<String, Arc<Parser>>,
    pub(super) deparsers: HashMap<String, Arc<Deparser>>,
    pub(super) learn_engine: Arc<LearnEngine>,
    pub(super) phv_factory: Arc<PhvFactory>,
}

impl ConfigGeneration {
    /// Generation number assigned by the controller.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn get_table(&self, name: &str) -> Option<&Arc<MatchTable>> {
        self.tables.get(name)
    }

    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn get_action(&self, name: &str) -> Option<&Arc<ActionFn>> {
        self.actions.get(name)
    }

    pub fn get_pipeline(&self, name: &str) -> Option<Arc<Pipeline>> {
        self.pipelines.get(name).cloned()
    }

    pub fn get_parser(&self, name: &str) -> Option<Arc<Parser>> {
        self.parsers.get(name).cloned()
    }

    pub fn get_deparser(&self, name: &str) -> Option<Arc<Deparser>> {
        self.deparsers.get(name).cloned()
    }

    pub fn learn_engine(&self) -> &Arc<LearnEngine> {
        &self.learn_engine
    }

    pub fn phv_factory(&self) -> &Arc<PhvFactory> {
        &self.phv_factory
    }
}
