//! Runtime control surface of a bm-style programmable switch.
//!
//! [`Switch`] owns the forwarding program as a sequence of configuration
//! generations. Control-plane requests are dispatched to the named table of
//! the current generation under a shared lock, while a new program can be
//! staged and later cut over to atomically by the data plane.
//!
//! ```ignore
//! use bm_runtime::{Switch, SwitchConfig};
//!
//! let switch = Switch::new(SwitchConfig::with_swap());
//! switch.init_objects(&std::fs::read_to_string("l2.json")?)?;
//!
//! switch.load_new_config(&std::fs::read_to_string("l3.json")?)?;
//! switch.swap_configs()?;
//! // later, at the data plane's safe point
//! switch.do_swap();
//! ```

pub mod audit;
pub mod dataplane;
pub mod learning;
pub mod objects;
pub mod packet;
pub mod pre;
pub mod switch;

pub use dataplane::{DataPlaneDriver, DriverConfig, PacketProcessor, RawPacket, TableWalker};
pub use objects::{ConfigGeneration, LoadError, LoadResult, ProgramDescription};
pub use switch::{
    InvariantViolation, RuntimeInterface, SwapError, SwapErrorCode, SwapState, Switch, SwitchConfig, TableOpError,
    TableOpResult,
};
