//! Runtime controller: table dispatch, locking and configuration swap.

mod config;
mod counters;
mod direct;
mod error;
mod indirect;
mod interface;
mod lifecycle;
mod runtime;
mod swap;

pub use config::SwitchConfig;
pub use error::{InvariantViolation, SwapError, SwapErrorCode, TableOpError, TableOpResult};
pub use interface::RuntimeInterface;
pub use lifecycle::SwapState;
pub use runtime::Switch;
