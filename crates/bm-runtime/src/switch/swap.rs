//! Two-phase configuration swap.
//!
//! A new program is first staged with [`Switch::load_new_config`]. While it is
//! staged, table operations populate it instead of the active program. The
//! control plane then requests the swap with [`Switch::swap_configs`] and the
//! data plane performs the cutover with [`Switch::do_swap`] at a point where no
//! packet is in flight.

use log::{debug, info, warn};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::error::SwapError;
use super::runtime::{Switch, AUDIT_SOURCE};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::objects::{build_generation, parse_description, LoadResult, ProgramDescription};

impl Switch {
    fn check_swap_enabled(&self, op: &'static str) -> Result<(), SwapError> {
        if self.config().enable_swap {
            return Ok(());
        }
        debug!("{} refused: configuration swap is disabled", op);
        audit_log!(AuditRecord::new(AuditCategory::ConfigSwap, AUDIT_SOURCE, op)
            .with_error(SwapError::ConfigSwapDisabled)
            .with_outcome(AuditOutcome::Rejected));
        Err(SwapError::ConfigSwapDisabled)
    }

    /// Builds a new program from a JSON description and stages it.
    pub fn load_new_config(&self, description: &str) -> Result<(), SwapError> {
        self.stage("load_new_config", || parse_description(description))
    }

    /// [`Switch::load_new_config`] for an already parsed description.
    pub fn load_new_config_from(&self, desc: &ProgramDescription) -> Result<(), SwapError> {
        self.stage("load_new_config", || Ok(desc.clone()))
    }

    fn stage(&self, op: &'static str, desc: impl FnOnce() -> LoadResult<ProgramDescription>) -> Result<(), SwapError> {
        self.check_swap_enabled(op)?;

        let mut slots = self.slots.write();
        if slots.staged.is_some() {
            debug!("{} refused: a staged configuration is pending", op);
            return Err(SwapError::OngoingSwap);
        }

        let id = slots.next_id();
        let built = desc().and_then(|d| build_generation(id, &d));
        let generation = match built {
            Ok(g) => Arc::new(g),
            Err(e) => {
                drop(slots);
                warn!("Rejected new configuration: {}", e);
                audit_log!(AuditRecord::new(AuditCategory::ConfigLoad, AUDIT_SOURCE, op).with_error(&e));
                return Err(SwapError::InvalidConfig(e));
            }
        };
        slots.last_id = id;
        slots.staged = Some(generation);
        drop(slots);

        info!("Staged generation {}", id);
        audit_log!(AuditRecord::new(AuditCategory::ConfigLoad, AUDIT_SOURCE, op)
            .with_outcome(AuditOutcome::Success)
            .with_generation(id));
        Ok(())
    }

    /// Requests cutover to the staged program. Requesting again before the
    /// cutover succeeds without effect.
    pub fn swap_configs(&self) -> Result<(), SwapError> {
        self.check_swap_enabled("swap_configs")?;

        let slots = self.slots.write();
        let Some(staged) = slots.staged.as_ref() else {
            debug!("swap_configs refused: nothing staged");
            return Err(SwapError::NoOngoingSwap);
        };
        let id = staged.id();
        let already = self.swap_ordered.swap(true, Ordering::AcqRel);
        drop(slots);

        if already {
            debug!("Swap to generation {} already requested", id);
            return Ok(());
        }
        info!("Swap to generation {} requested", id);
        audit_log!(AuditRecord::new(AuditCategory::ConfigSwap, AUDIT_SOURCE, "swap_configs")
            .with_outcome(AuditOutcome::Success)
            .with_generation(id));
        Ok(())
    }

    /// Cuts over to the staged program if a swap was requested. Returns
    /// whether a cutover happened.
    ///
    /// Must only be called from the data plane's safe point, never
    /// concurrently with itself.
    pub fn do_swap(&self) -> bool {
        if !self.swap_ordered.load(Ordering::Acquire) {
            return false;
        }

        let mut slots = self.slots.write();
        if !self.swap_ordered.load(Ordering::Acquire) {
            return false;
        }
        let Some(staged) = slots.staged.take() else {
            self.swap_ordered.store(false, Ordering::Release);
            warn!("Swap requested with nothing staged");
            return false;
        };
        self.phv_source.install(Arc::clone(staged.phv_factory()));
        let to = staged.id();
        let from = slots.active.replace(staged).map(|g| g.id());
        self.swap_ordered.store(false, Ordering::Release);
        drop(slots);

        info!("Cut over to generation {}", to);
        audit_log!(AuditRecord::new(AuditCategory::ConfigSwap, AUDIT_SOURCE, "do_swap")
            .with_outcome(AuditOutcome::Success)
            .with_generation(to)
            .with_details(serde_json::json!({ "from": from, "to": to })));
        true
    }
}
