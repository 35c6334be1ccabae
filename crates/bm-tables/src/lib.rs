//! Match-action tables for the bm switch runtime.
//!
//! Three table variants share one matching engine:
//!
//! - [`DirectTable`]: each entry carries its own action and action data
//! - [`IndirectTable`]: entries point at shared members of an action profile
//! - [`IndirectWsTable`]: entries may also point at groups of members, one
//!   of which is selected per packet
//!
//! Entries, members and groups are named by typed handles
//! ([`EntryHandle`], [`MemberHandle`], [`GroupHandle`]) so the three
//! namespaces cannot be mixed up. All operations report failures as
//! [`MatchError`], which maps onto the numeric [`MatchErrorCode`] used on
//! the control interface.
//!
//! # Example
//!
//! ```
//! use bm_tables::{ActionData, ActionFn, DirectTable, KeySchema, MatchKeyField, MatchKeyParam, MatchKind};
//! use std::sync::Arc;
//!
//! let table = DirectTable::new(
//!     "smac",
//!     KeySchema::new(vec![MatchKeyField::new("ethernet.srcAddr", MatchKind::Exact, 6)]),
//!     1024,
//!     true,
//! );
//! let nop = Arc::new(ActionFn::new("_nop", 0, vec![]));
//! let mac = vec![0, 1, 2, 3, 4, 5];
//!
//! let handle = table
//!     .add_entry(&[MatchKeyParam::exact(mac.clone())], nop, ActionData::new(), -1)
//!     .unwrap();
//! assert!(table.lookup(&mac, 64).is_hit());
//! assert_eq!(table.query_counters(handle).unwrap(), (64, 1));
//! ```

pub mod action;
pub mod counters;
pub mod error;
pub mod handle;
pub mod key;
pub mod table;

pub use action::{ActionData, ActionEntry, ActionFn, ActionParam};
pub use counters::{CounterValue, EntryCounters};
pub use error::{MatchError, MatchErrorCode, MatchResult, MatchResultExt};
pub use handle::{EntryHandle, EntryKind, GroupHandle, GroupKind, Handle, HandleKind, MemberHandle, MemberKind};
pub use key::{KeySchema, MatchKeyField, MatchKeyParam, MatchKind};
pub use table::{
    DirectTable, IndirectIndex, IndirectTable, IndirectWsTable, LookupResult, MatchTable, TableKind,
};
