//! Generation slots and the swap state machine.
//!
//! ```text
//!            load_new_config          swap_configs
//!   Idle ─────────────────► Staged ─────────────────► SwapPending
//!    ▲                                                    │
//!    └───────────────────────── do_swap ──────────────────┘
//! ```

use std::fmt;
use std::sync::Arc;

use crate::objects::ConfigGeneration;

/// Where the controller is in the two-phase swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwapState {
    /// No staged generation
    Idle,
    /// Staged generation present, swap not requested
    Staged,
    /// Swap requested, waiting for the data plane's cutover
    SwapPending,
}

impl SwapState {
    pub(crate) fn of(slots: &GenerationSlots, swap_ordered: bool) -> Self {
        match (&slots.staged, swap_ordered) {
            (None, _) => SwapState::Idle,
            (Some(_), false) => SwapState::Staged,
            (Some(_), true) => SwapState::SwapPending,
        }
    }
}

impl fmt::Display for SwapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapState::Idle => write!(f, "idle"),
            SwapState::Staged => write!(f, "staged"),
            SwapState::SwapPending => write!(f, "swap_pending"),
        }
    }
}

/// The active and staged generations, guarded together by the controller's
/// lock.
#[derive(Debug, Default)]
pub(crate) struct GenerationSlots {
    pub(crate) active: Option<Arc<ConfigGeneration>>,
    pub(crate) staged: Option<Arc<ConfigGeneration>>,
    /// Number of the most recently built generation
    pub(crate) last_id: u64,
}

impl GenerationSlots {
    /// Number the next successfully built generation gets. Only committed by
    /// setting `last_id`, so rejected descriptions do not consume numbers.
    pub(crate) fn next_id(&self) -> u64 {
        self.last_id + 1
    }

    /// Generation control operations apply to: the staged one while it
    /// exists, so a new program can be populated before cutover.
    pub(crate) fn control(&self) -> Option<&Arc<ConfigGeneration>> {
        self.staged.as_ref().or(self.active.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_state_of_empty_slots() {
        let slots = GenerationSlots::default();
        assert_eq!(SwapState::of(&slots, false), SwapState::Idle);
        // A stray flag without a staged generation is still idle.
        assert_eq!(SwapState::of(&slots, true), SwapState::Idle);
        assert!(slots.control().is_none());
        assert_eq!(slots.next_id(), 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(SwapState::SwapPending.to_string(), "swap_pending");
    }
}
