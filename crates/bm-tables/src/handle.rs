//! Type-safe table handles.
//!
//! Entry, member and group handles are all small integers handed out by a
//! table, but they live in different namespaces. Wrapping them in distinct
//! types prevents passing a member handle where an entry handle is expected.
//!
//! A handle only means something to the table (and configuration generation)
//! that issued it.

use bm_common::RawHandle;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

/// Marker trait for handle namespaces.
pub trait HandleKind: Send + Sync + 'static {
    /// Returns the namespace name for debugging.
    fn kind_name() -> &'static str;
}

/// A table-scoped handle in namespace `T`.
///
/// ```
/// use bm_tables::{EntryHandle, MemberHandle};
///
/// let entry = EntryHandle::new(3);
/// let member = MemberHandle::new(3);
/// assert_eq!(entry.as_raw(), member.as_raw());
///
/// // Different namespaces do not mix:
/// // fn takes_entry(h: EntryHandle) {}
/// // takes_entry(member); // Error: expected EntryHandle, found MemberHandle
/// ```
pub struct Handle<T: HandleKind> {
    raw: RawHandle,
    _marker: PhantomData<T>,
}

impl<T: HandleKind> Handle<T> {
    /// Wraps a raw handle value.
    pub const fn new(raw: RawHandle) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Returns the raw handle value.
    pub const fn as_raw(&self) -> RawHandle {
        self.raw
    }
}

// Manual impls so `T` does not need to implement these traits.
impl<T: HandleKind> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: HandleKind> Copy for Handle<T> {}

impl<T: HandleKind> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", T::kind_name(), self.raw)
    }
}

impl<T: HandleKind> fmt::Display for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl<T: HandleKind> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T: HandleKind> Eq for Handle<T> {}

impl<T: HandleKind> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: HandleKind> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<T: HandleKind> Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

macro_rules! define_handle_kind {
    ($name:ident, $kind_name:literal, $alias:ident) => {
        #[doc = concat!("Marker type for ", $kind_name, " handles.")]
        #[derive(Debug, Clone, Copy)]
        pub struct $name;

        impl HandleKind for $name {
            fn kind_name() -> &'static str {
                $kind_name
            }
        }

        #[doc = concat!("Handle identifying a table ", $kind_name, ".")]
        pub type $alias = Handle<$name>;
    };
}

define_handle_kind!(EntryKind, "Entry", EntryHandle);
define_handle_kind!(MemberKind, "Member", MemberHandle);
define_handle_kind!(GroupKind, "Group", GroupHandle);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_handle_raw_value() {
        let h = EntryHandle::new(42);
        assert_eq!(h.as_raw(), 42);
        assert_eq!(h.to_string(), "42");
    }

    #[test]
    fn test_handle_debug_names_kind() {
        assert_eq!(format!("{:?}", MemberHandle::new(7)), "Member(7)");
        assert_eq!(format!("{:?}", GroupHandle::new(0)), "Group(0)");
    }

    #[test]
    fn test_handle_equality_and_hash() {
        let mut set = HashSet::new();
        set.insert(GroupHandle::new(1));
        set.insert(GroupHandle::new(1));
        set.insert(GroupHandle::new(2));
        assert_eq!(set.len(), 2);
        assert!(GroupHandle::new(1) < GroupHandle::new(2));
    }
}
