//! Shared building blocks for the bm switch runtime.
//!
//! Every match table owns one or more registries that hand out opaque
//! integer handles for entries, members and groups. This crate provides the
//! registry used for all of them:
//!
//! - [`HandleMap`]: handle allocator plus storage that never creates entries
//!   implicitly and tracks explicit reference counts
//! - [`RawHandle`]: the integer representation shared by all handle kinds
//!
//! # Example
//!
//! ```
//! use bm_common::HandleMap;
//!
//! let mut members: HandleMap<String> = HandleMap::new();
//! let mbr = members.insert("set_port(1)".to_string());
//!
//! // A referenced member cannot be removed.
//! members.increment_ref(mbr).unwrap();
//! assert!(members.remove_unreferenced(mbr).is_err());
//!
//! members.decrement_ref(mbr).unwrap();
//! assert!(members.remove_unreferenced(mbr).is_ok());
//! ```

mod handle_map;

pub use handle_map::{HandleMap, HandleMapError, RawHandle};
