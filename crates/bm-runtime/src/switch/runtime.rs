//! The runtime controller.

use bm_tables::{ActionFn, DirectTable, IndirectTable, IndirectWsTable, MatchTable, TableKind};
use log::{debug, error, info};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::config::SwitchConfig;
use super::error::{InvariantViolation, TableOpError, TableOpResult};
use super::lifecycle::{GenerationSlots, SwapState};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::learning::LearnEngine;
use crate::objects::{
    build_generation, parse_description, ConfigGeneration, Deparser, LoadError, LoadResult, Parser, Pipeline,
    ProgramDescription,
};
use crate::packet::PhvSource;
use crate::pre::McPre;

pub(super) const AUDIT_SOURCE: &str = "Switch";

/// How a table operation treats a table name missing from the control
/// generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum OnMissing {
    /// Caller error, reported as `InvalidTableName`
    InvalidName,
    /// The caller was handed a name by the program itself, so a miss means
    /// the controller is inconsistent
    Invariant,
}

/// Runtime controller of one switch.
///
/// Owns the active and staged configuration generations behind a single
/// reader/writer lock. Table operations take the lock shared; staging, swap
/// requests and cutover take it exclusive. The pending-swap flag can be read
/// without the lock but every decision re-checks it under the lock.
#[derive(Debug)]
pub struct Switch {
    config: SwitchConfig,
    pub(super) slots: RwLock<GenerationSlots>,
    pub(super) swap_ordered: AtomicBool,
    pub(super) phv_source: Arc<PhvSource>,
    pre: Arc<McPre>,
}

impl Switch {
    pub fn new(config: SwitchConfig) -> Self {
        Self {
            config,
            slots: RwLock::new(GenerationSlots::default()),
            swap_ordered: AtomicBool::new(false),
            phv_source: Arc::new(PhvSource::new()),
            pre: Arc::new(McPre::new()),
        }
    }

    pub fn config(&self) -> &SwitchConfig {
        &self.config
    }

    /// Installs the first program from a JSON description. Returns the
    /// generation number.
    pub fn init_objects(&self, description: &str) -> LoadResult<u64> {
        let desc = parse_description(description)?;
        self.init_objects_from(&desc)
    }

    /// Installs `desc` as the first active program. Once a program is
    /// installed it only changes through cutover, so a second call fails with
    /// [`LoadError::AlreadyInitialized`].
    pub fn init_objects_from(&self, desc: &ProgramDescription) -> LoadResult<u64> {
        let mut slots = self.slots.write();
        if let Some(id) = slots.active.as_ref().map(|g| g.id()) {
            let e = LoadError::AlreadyInitialized(id);
            drop(slots);
            debug!("init_objects refused: {}", e);
            audit_log!(AuditRecord::new(AuditCategory::SystemLifecycle, AUDIT_SOURCE, "init_objects")
                .with_error(&e)
                .with_outcome(AuditOutcome::Rejected));
            return Err(e);
        }
        let generation = match build_generation(slots.next_id(), desc) {
            Ok(g) => Arc::new(g),
            Err(e) => {
                drop(slots);
                audit_log!(AuditRecord::new(AuditCategory::SystemLifecycle, AUDIT_SOURCE, "init_objects")
                    .with_error(&e));
                return Err(e);
            }
        };
        let id = generation.id();
        slots.last_id = id;
        self.phv_source.install(Arc::clone(generation.phv_factory()));
        slots.active = Some(generation);
        drop(slots);

        info!("Installed initial program as generation {}", id);
        audit_log!(AuditRecord::new(AuditCategory::SystemLifecycle, AUDIT_SOURCE, "init_objects")
            .with_outcome(AuditOutcome::Success)
            .with_generation(id));
        Ok(id)
    }

    /// Generation the data plane currently forwards with.
    pub fn active_generation(&self) -> Option<Arc<ConfigGeneration>> {
        self.slots.read().active.clone()
    }

    pub fn staged_generation(&self) -> Option<Arc<ConfigGeneration>> {
        self.slots.read().staged.clone()
    }

    /// Generation table operations currently apply to.
    pub fn control_generation(&self) -> Option<Arc<ConfigGeneration>> {
        self.slots.read().control().cloned()
    }

    pub fn swap_state(&self) -> SwapState {
        let slots = self.slots.read();
        SwapState::of(&slots, self.swap_ordered.load(Ordering::Acquire))
    }

    /// Lock-free hint that a cutover is pending.
    pub fn swap_requested(&self) -> bool {
        self.swap_ordered.load(Ordering::Acquire)
    }

    pub fn get_pipeline(&self, name: &str) -> Option<Arc<Pipeline>> {
        self.slots.read().active.as_ref()?.get_pipeline(name)
    }

    pub fn get_parser(&self, name: &str) -> Option<Arc<Parser>> {
        self.slots.read().active.as_ref()?.get_parser(name)
    }

    pub fn get_deparser(&self, name: &str) -> Option<Arc<Deparser>> {
        self.slots.read().active.as_ref()?.get_deparser(name)
    }

    /// Learning engine of the active generation.
    pub fn get_learn_engine(&self) -> Option<Arc<LearnEngine>> {
        self.slots
            .read()
            .active
            .as_ref()
            .map(|g| Arc::clone(g.learn_engine()))
    }

    /// Multicast replication engine. Lives as long as the switch and is not
    /// swapped with the program.
    pub fn get_pre(&self) -> Arc<McPre> {
        Arc::clone(&self.pre)
    }

    /// Slot packets take their PHV layout from.
    pub fn phv_source(&self) -> &Arc<PhvSource> {
        &self.phv_source
    }

    /// Runs `f` against `table` in the control generation under the shared
    /// lock and logs the outcome.
    pub(super) fn with_table<T>(
        &self,
        op: &'static str,
        table: &str,
        on_missing: OnMissing,
        f: impl FnOnce(&ConfigGeneration, &MatchTable) -> TableOpResult<T>,
    ) -> TableOpResult<T> {
        let slots = self.slots.read();
        let generation = slots.control();
        let result = match generation.and_then(|g| g.get_table(table).map(|t| (g.as_ref(), t.as_ref()))) {
            Some((g, t)) => f(g, t),
            None => Err(match on_missing {
                OnMissing::InvalidName => TableOpError::InvalidTableName(table.to_string()),
                OnMissing::Invariant => TableOpError::Invariant(InvariantViolation::MissingTable(table.to_string())),
            }),
        };
        let generation_id = generation.map(|g| g.id());
        drop(slots);

        if let Err(e) = &result {
            report_failure(op, table, generation_id, e);
        }
        result
    }
}

fn report_failure(op: &'static str, table: &str, generation: Option<u64>, e: &TableOpError) {
    match e {
        TableOpError::Invariant(violation) => {
            error!("{} on table '{}': {}", op, table, violation);
            let mut record = AuditRecord::new(AuditCategory::InvariantViolation, AUDIT_SOURCE, op)
                .with_table(table)
                .with_error(violation);
            if let Some(id) = generation {
                record = record.with_generation(id);
            }
            audit_log!(record);
        }
        _ => debug!("{} on table '{}' failed: {}", op, table, e),
    }
}

pub(super) fn expect_direct<'a>(table: &'a MatchTable) -> TableOpResult<&'a DirectTable> {
    table.as_direct().ok_or_else(|| wrong_type(table, TableKind::Direct))
}

/// Accepts both indirect table kinds.
pub(super) fn expect_indirect<'a>(table: &'a MatchTable) -> TableOpResult<&'a IndirectTable> {
    table.as_indirect().ok_or_else(|| wrong_type(table, TableKind::Indirect))
}

pub(super) fn expect_indirect_ws<'a>(table: &'a MatchTable) -> TableOpResult<&'a IndirectWsTable> {
    table
        .as_indirect_ws()
        .ok_or_else(|| wrong_type(table, TableKind::IndirectWs))
}

fn wrong_type(table: &MatchTable, expected: TableKind) -> TableOpError {
    TableOpError::WrongTableType {
        table: table.name().to_string(),
        expected,
        actual: table.kind(),
    }
}

/// Looks up an action a direct table operation names. The control plane takes
/// action names from the program, so a miss is an invariant violation.
pub(super) fn program_action(
    generation: &ConfigGeneration,
    table: &str,
    action: &str,
) -> TableOpResult<Arc<ActionFn>> {
    generation.get_action(action).cloned().ok_or_else(|| {
        TableOpError::Invariant(InvariantViolation::MissingAction {
            table: table.to_string(),
            action: action.to_string(),
        })
    })
}

/// Looks up an action named by a member operation; a miss is a caller error.
pub(super) fn caller_action(generation: &ConfigGeneration, action: &str) -> TableOpResult<Arc<ActionFn>> {
    generation
        .get_action(action)
        .cloned()
        .ok_or_else(|| TableOpError::InvalidActionName(action.to_string()))
}
