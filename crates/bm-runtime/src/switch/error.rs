//! Controller error types.

use bm_tables::{MatchError, MatchErrorCode, TableKind};
use std::fmt;
use thiserror::Error;

use crate::objects::LoadError;

/// Controller state that a well-formed program never produces.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("table '{0}' missing from the control generation")]
    MissingTable(String),

    #[error("action '{action}' of table '{table}' missing from the action registry")]
    MissingAction { table: String, action: String },
}

/// Failure of a table operation on the control interface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableOpError {
    #[error("Invalid table name '{0}'")]
    InvalidTableName(String),

    #[error("Table '{table}' is {actual}, operation requires {expected}")]
    WrongTableType {
        table: String,
        expected: TableKind,
        actual: TableKind,
    },

    #[error("Invalid action name '{0}'")]
    InvalidActionName(String),

    #[error(transparent)]
    Table(#[from] MatchError),

    #[error("Internal invariant violated: {0}")]
    Invariant(InvariantViolation),
}

impl TableOpError {
    /// Status code reported on the control interface. Table errors keep their
    /// own code.
    pub fn code(&self) -> MatchErrorCode {
        match self {
            TableOpError::InvalidTableName(_) => MatchErrorCode::InvalidTableName,
            TableOpError::WrongTableType { .. } => MatchErrorCode::WrongTableType,
            TableOpError::InvalidActionName(_) => MatchErrorCode::InvalidActionName,
            TableOpError::Table(e) => e.code(),
            TableOpError::Invariant(_) => MatchErrorCode::Error,
        }
    }

    pub fn is_invariant(&self) -> bool {
        matches!(self, TableOpError::Invariant(_))
    }
}

pub type TableOpResult<T> = Result<T, TableOpError>;

/// Status codes of the swap operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum SwapErrorCode {
    Success = 0,
    ConfigSwapDisabled = 1,
    OngoingSwap = 2,
    NoOngoingSwap = 3,
    InvalidConfig = 4,
}

impl SwapErrorCode {
    /// Unknown values map to `InvalidConfig`.
    pub fn from_raw(code: i32) -> Self {
        match code {
            0 => SwapErrorCode::Success,
            1 => SwapErrorCode::ConfigSwapDisabled,
            2 => SwapErrorCode::OngoingSwap,
            3 => SwapErrorCode::NoOngoingSwap,
            _ => SwapErrorCode::InvalidConfig,
        }
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for SwapErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SwapErrorCode::Success => "SUCCESS",
            SwapErrorCode::ConfigSwapDisabled => "CONFIG_SWAP_DISABLED",
            SwapErrorCode::OngoingSwap => "ONGOING_SWAP",
            SwapErrorCode::NoOngoingSwap => "NO_ONGOING_SWAP",
            SwapErrorCode::InvalidConfig => "INVALID_CONFIG",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Error)]
pub enum SwapError {
    #[error("Configuration swap is disabled")]
    ConfigSwapDisabled,

    #[error("A staged configuration is already waiting for cutover")]
    OngoingSwap,

    #[error("No staged configuration to swap to")]
    NoOngoingSwap,

    #[error("New configuration rejected")]
    InvalidConfig(#[source] LoadError),
}

impl SwapError {
    pub fn code(&self) -> SwapErrorCode {
        match self {
            SwapError::ConfigSwapDisabled => SwapErrorCode::ConfigSwapDisabled,
            SwapError::OngoingSwap => SwapErrorCode::OngoingSwap,
            SwapError::NoOngoingSwap => SwapErrorCode::NoOngoingSwap,
            SwapError::InvalidConfig(_) => SwapErrorCode::InvalidConfig,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bm_tables::EntryHandle;

    #[test]
    fn test_table_op_codes() {
        assert_eq!(
            TableOpError::InvalidTableName("t".into()).code(),
            MatchErrorCode::InvalidTableName
        );
        assert_eq!(
            TableOpError::from(MatchError::InvalidHandle(EntryHandle::new(3))).code(),
            MatchErrorCode::InvalidHandle
        );
        let invariant = TableOpError::Invariant(InvariantViolation::MissingTable("t".into()));
        assert_eq!(invariant.code(), MatchErrorCode::Error);
        assert!(invariant.is_invariant());
    }

    #[test]
    fn test_swap_code_raw_values() {
        for code in [
            SwapErrorCode::Success,
            SwapErrorCode::ConfigSwapDisabled,
            SwapErrorCode::OngoingSwap,
            SwapErrorCode::NoOngoingSwap,
            SwapErrorCode::InvalidConfig,
        ] {
            assert_eq!(SwapErrorCode::from_raw(code.as_raw()), code);
        }
        assert_eq!(SwapErrorCode::from_raw(99), SwapErrorCode::InvalidConfig);
        assert_eq!(SwapErrorCode::OngoingSwap.to_string(), "ONGOING_SWAP");
    }

    #[test]
    fn test_swap_error_codes() {
        assert_eq!(SwapError::OngoingSwap.code(), SwapErrorCode::OngoingSwap);
        assert_eq!(SwapError::NoOngoingSwap.code(), SwapErrorCode::NoOngoingSwap);
    }
}
