//! Match table error types and status codes.
//!
//! [`MatchErrorCode`] is the flat status code returned across the control
//! plane boundary. [`MatchError`] is the Rust error carried by table
//! operations; it keeps the offending handle or key detail and maps back to
//! its code with [`MatchError::code`].

use std::fmt;
use thiserror::Error;

use crate::handle::{EntryHandle, GroupHandle, MemberHandle};

/// Status codes for match table operations.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchErrorCode {
    Success = 0,
    TableFull = 1,
    InvalidHandle = 2,
    CountersDisabled = 3,
    InvalidTableName = 4,
    InvalidActionName = 5,
    WrongTableType = 6,
    InvalidMbrHandle = 7,
    MbrStillUsed = 8,
    MbrAlreadyInGrp = 9,
    MbrNotInGrp = 10,
    InvalidGrpHandle = 11,
    GrpStillUsed = 12,
    EmptyGrp = 13,
    DuplicateEntry = 14,
    BadMatchKey = 15,
    BadActionData = 16,
    InvalidPriority = 17,
    Error = 18,
}

impl MatchErrorCode {
    /// Creates a code from its raw value; unknown values map to `Error`.
    pub fn from_raw(code: i32) -> Self {
        match code {
            0 => MatchErrorCode::Success,
            1 => MatchErrorCode::TableFull,
            2 => MatchErrorCode::InvalidHandle,
            3 => MatchErrorCode::CountersDisabled,
            4 => MatchErrorCode::InvalidTableName,
            5 => MatchErrorCode::InvalidActionName,
            6 => MatchErrorCode::WrongTableType,
            7 => MatchErrorCode::InvalidMbrHandle,
            8 => MatchErrorCode::MbrStillUsed,
            9 => MatchErrorCode::MbrAlreadyInGrp,
            10 => MatchErrorCode::MbrNotInGrp,
            11 => MatchErrorCode::InvalidGrpHandle,
            12 => MatchErrorCode::GrpStillUsed,
            13 => MatchErrorCode::EmptyGrp,
            14 => MatchErrorCode::DuplicateEntry,
            15 => MatchErrorCode::BadMatchKey,
            16 => MatchErrorCode::BadActionData,
            17 => MatchErrorCode::InvalidPriority,
            _ => MatchErrorCode::Error,
        }
    }

    /// Returns the raw value.
    pub fn as_raw(self) -> i32 {
        self as i32
    }

    pub fn is_success(&self) -> bool {
        *self == MatchErrorCode::Success
    }
}

impl fmt::Display for MatchErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchErrorCode::Success => "SUCCESS",
            MatchErrorCode::TableFull => "TABLE_FULL",
            MatchErrorCode::InvalidHandle => "INVALID_HANDLE",
            MatchErrorCode::CountersDisabled => "COUNTERS_DISABLED",
            MatchErrorCode::InvalidTableName => "INVALID_TABLE_NAME",
            MatchErrorCode::InvalidActionName => "INVALID_ACTION_NAME",
            MatchErrorCode::WrongTableType => "WRONG_TABLE_TYPE",
            MatchErrorCode::InvalidMbrHandle => "INVALID_MBR_HANDLE",
            MatchErrorCode::MbrStillUsed => "MBR_STILL_USED",
            MatchErrorCode::MbrAlreadyInGrp => "MBR_ALREADY_IN_GRP",
            MatchErrorCode::MbrNotInGrp => "MBR_NOT_IN_GRP",
            MatchErrorCode::InvalidGrpHandle => "INVALID_GRP_HANDLE",
            MatchErrorCode::GrpStillUsed => "GRP_STILL_USED",
            MatchErrorCode::EmptyGrp => "EMPTY_GRP",
            MatchErrorCode::DuplicateEntry => "DUPLICATE_ENTRY",
            MatchErrorCode::BadMatchKey => "BAD_MATCH_KEY",
            MatchErrorCode::BadActionData => "BAD_ACTION_DATA",
            MatchErrorCode::InvalidPriority => "INVALID_PRIORITY",
            MatchErrorCode::Error => "ERROR",
        };
        write!(f, "{}", s)
    }
}

/// Error returned by match table operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error("Table {table} is full ({max_size} entries)")]
    TableFull { table: String, max_size: usize },

    #[error("Invalid entry handle {0}")]
    InvalidHandle(EntryHandle),

    #[error("Counters are disabled for table {0}")]
    CountersDisabled(String),

    #[error("Invalid member handle {0}")]
    InvalidMbrHandle(MemberHandle),

    #[error("Member {member} still used ({ref_count} references)")]
    MbrStillUsed { member: MemberHandle, ref_count: u32 },

    #[error("Member {member} already in group {group}")]
    MbrAlreadyInGrp {
        member: MemberHandle,
        group: GroupHandle,
    },

    #[error("Member {member} not in group {group}")]
    MbrNotInGrp {
        member: MemberHandle,
        group: GroupHandle,
    },

    #[error("Invalid group handle {0}")]
    InvalidGrpHandle(GroupHandle),

    #[error("Group {group} still used ({ref_count} references)")]
    GrpStillUsed { group: GroupHandle, ref_count: u32 },

    #[error("Duplicate entry, existing handle {0}")]
    DuplicateEntry(EntryHandle),

    #[error("Bad match key: {0}")]
    BadMatchKey(String),

    #[error("Bad action data for {action}: expected {expected} parameters, got {actual}")]
    BadActionData {
        action: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid priority {0}")]
    InvalidPriority(i32),
}

impl MatchError {
    /// Returns the status code for this error.
    pub fn code(&self) -> MatchErrorCode {
        match self {
            MatchError::TableFull { .. } => MatchErrorCode::TableFull,
            MatchError::InvalidHandle(_) => MatchErrorCode::InvalidHandle,
            MatchError::CountersDisabled(_) => MatchErrorCode::CountersDisabled,
            MatchError::InvalidMbrHandle(_) => MatchErrorCode::InvalidMbrHandle,
            MatchError::MbrStillUsed { .. } => MatchErrorCode::MbrStillUsed,
            MatchError::MbrAlreadyInGrp { .. } => MatchErrorCode::MbrAlreadyInGrp,
            MatchError::MbrNotInGrp { .. } => MatchErrorCode::MbrNotInGrp,
            MatchError::InvalidGrpHandle(_) => MatchErrorCode::InvalidGrpHandle,
            MatchError::GrpStillUsed { .. } => MatchErrorCode::GrpStillUsed,
            MatchError::DuplicateEntry(_) => MatchErrorCode::DuplicateEntry,
            MatchError::BadMatchKey(_) => MatchErrorCode::BadMatchKey,
            MatchError::BadActionData { .. } => MatchErrorCode::BadActionData,
            MatchError::InvalidPriority(_) => MatchErrorCode::InvalidPriority,
        }
    }

    pub(crate) fn bad_key(message: impl Into<String>) -> Self {
        MatchError::BadMatchKey(message.into())
    }
}

/// Result type for match table operations.
pub type MatchResult<T> = Result<T, MatchError>;

/// Extension trait for collapsing a result into its status code.
pub trait MatchResultExt {
    fn to_code(&self) -> MatchErrorCode;
}

impl<T> MatchResultExt for MatchResult<T> {
    fn to_code(&self) -> MatchErrorCode {
        match self {
            Ok(_) => MatchErrorCode::Success,
            Err(e) => e.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_from_raw() {
        assert_eq!(MatchErrorCode::from_raw(0), MatchErrorCode::Success);
        assert_eq!(MatchErrorCode::from_raw(6), MatchErrorCode::WrongTableType);
        assert_eq!(MatchErrorCode::from_raw(-3), MatchErrorCode::Error);
        assert_eq!(MatchErrorCode::from_raw(999), MatchErrorCode::Error);
    }

    #[test]
    fn test_code_round_trips_raw_value() {
        let code = MatchErrorCode::MbrStillUsed;
        assert_eq!(MatchErrorCode::from_raw(code.as_raw()), code);
    }

    #[test]
    fn test_code_display() {
        assert_eq!(MatchErrorCode::InvalidTableName.to_string(), "INVALID_TABLE_NAME");
        assert_eq!(MatchErrorCode::BadMatchKey.to_string(), "BAD_MATCH_KEY");
    }

    #[test]
    fn test_error_to_code() {
        let err = MatchError::InvalidHandle(EntryHandle::new(3));
        assert_eq!(err.code(), MatchErrorCode::InvalidHandle);

        let err = MatchError::MbrStillUsed {
            member: MemberHandle::new(1),
            ref_count: 2,
        };
        assert_eq!(err.code(), MatchErrorCode::MbrStillUsed);
        assert!(err.to_string().contains("2 references"));
    }

    #[test]
    fn test_result_ext() {
        let ok: MatchResult<()> = Ok(());
        assert!(ok.to_code().is_success());

        let err: MatchResult<()> = Err(MatchError::InvalidPriority(-1));
        assert_eq!(err.to_code(), MatchErrorCode::InvalidPriority);
    }
}
