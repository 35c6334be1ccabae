//! Audit trail for control-plane state changes.
//!
//! Operational logging goes through the `log` facade. Changes that alter what
//! the data plane forwards are additionally recorded as structured
//! [`AuditRecord`]s on the `audit` tracing target:
//!
//! - configuration lifecycle: bootstrap, staging, swap request, cutover
//! - action profile members and selector groups: creation and deletion
//! - internal invariant violations detected by the controller
//!
//! Records serialize to JSON so they can be shipped to a collector as-is.
//!
//! # Severity
//!
//! | Outcome      | Level |
//! |--------------|-------|
//! | `Success`    | info  |
//! | `InProgress` | debug |
//! | `Failure`    | warn  |
//! | `Rejected`   | warn  |
//!
//! # Example
//!
//! ```ignore
//! use bm_runtime::audit::{AuditCategory, AuditOutcome, AuditRecord};
//! use bm_runtime::audit_log;
//!
//! audit_log!(AuditRecord::new(AuditCategory::ConfigSwap, "Switch", "swap_configs")
//!     .with_outcome(AuditOutcome::Success)
//!     .with_generation(3));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of change an audit record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCategory {
    /// Process and data-plane start/stop, first program install
    SystemLifecycle,
    /// Building and staging a new program
    ConfigLoad,
    /// Swap requests and cutovers
    ConfigSwap,
    /// Members and groups created
    ResourceCreate,
    /// Members and groups deleted
    ResourceDelete,
    /// Controller found its own state inconsistent
    InvariantViolation,
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditCategory::SystemLifecycle => "SYSTEM_LIFECYCLE",
            AuditCategory::ConfigLoad => "CONFIG_LOAD",
            AuditCategory::ConfigSwap => "CONFIG_SWAP",
            AuditCategory::ResourceCreate => "RESOURCE_CREATE",
            AuditCategory::ResourceDelete => "RESOURCE_DELETE",
            AuditCategory::InvariantViolation => "INVARIANT_VIOLATION",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    InProgress,
    /// Refused by policy, e.g. hot swap disabled
    Rejected,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditOutcome::Success => write!(f, "success"),
            AuditOutcome::Failure => write!(f, "failure"),
            AuditOutcome::InProgress => write!(f, "in_progress"),
            AuditOutcome::Rejected => write!(f, "rejected"),
        }
    }
}

/// One audited event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub category: AuditCategory,
    /// Component that emitted the record
    pub source: String,
    pub action: String,
    pub outcome: AuditOutcome,

    /// Table the action applied to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    /// Member, group or entry handle, rendered as text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,

    /// Configuration generation the action applied to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditRecord {
    /// Creates a record stamped with the current time. The outcome starts as
    /// `InProgress`.
    pub fn new(category: AuditCategory, source: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            source: source.into(),
            action: action.into(),
            outcome: AuditOutcome::InProgress,
            table: None,
            object_id: None,
            generation: None,
            details: None,
            error: None,
        }
    }

    pub fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_object_id(mut self, id: impl fmt::Display) -> Self {
        self.object_id = Some(id.to_string());
        self
    }

    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = Some(generation);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Records `error` and marks the outcome as `Failure`.
    pub fn with_error(mut self, error: impl fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self.outcome = AuditOutcome::Failure;
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization_failed","message":"{}"}}"#, e))
    }
}

/// Emits an [`AuditRecord`] on the `audit` target at a level chosen by its
/// outcome.
#[macro_export]
macro_rules! audit_log {
    ($record:expr) => {
        let record = $record;
        match record.outcome {
            $crate::audit::AuditOutcome::Success => {
                tracing::info!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    outcome = %record.outcome,
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
            $crate::audit::AuditOutcome::InProgress => {
                tracing::debug!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    outcome = %record.outcome,
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
            $crate::audit::AuditOutcome::Failure | $crate::audit::AuditOutcome::Rejected => {
                tracing::warn!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    outcome = %record.outcome,
                    error = record.error.as_deref().unwrap_or(""),
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
        }
    };
}

/// Installs a global JSON subscriber. `RUST_LOG` overrides `log_level`.
///
/// `log` records from the rest of the crate are bridged into the same
/// subscriber.
pub fn init_logging(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .json(),
        )
        .init();
}

/// Human-readable variant of [`init_logging`] for interactive use.
pub fn init_logging_pretty(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).pretty())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_builder() {
        let record = AuditRecord::new(AuditCategory::ResourceCreate, "Switch", "mt_indirect_add_member")
            .with_outcome(AuditOutcome::Success)
            .with_table("ecmp")
            .with_object_id(4u32)
            .with_generation(2);

        assert_eq!(record.category, AuditCategory::ResourceCreate);
        assert_eq!(record.table.as_deref(), Some("ecmp"));
        assert_eq!(record.object_id.as_deref(), Some("4"));
        assert_eq!(record.generation, Some(2));
    }

    #[test]
    fn test_with_error_marks_failure() {
        let record = AuditRecord::new(AuditCategory::ConfigLoad, "Switch", "load_new_config")
            .with_error("unknown action 'fwd'");
        assert_eq!(record.outcome, AuditOutcome::Failure);
        assert_eq!(record.error.as_deref(), Some("unknown action 'fwd'"));
    }

    #[test]
    fn test_json_omits_empty_fields() {
        let json = AuditRecord::new(AuditCategory::ConfigSwap, "Switch", "do_swap")
            .with_outcome(AuditOutcome::Success)
            .with_details(serde_json::json!({ "from": 1, "to": 2 }))
            .to_json();

        assert!(json.contains("\"category\":\"CONFIG_SWAP\""));
        assert!(json.contains("\"outcome\":\"success\""));
        assert!(json.contains("\"from\":1"));
        assert!(!json.contains("\"table\""));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_display() {
        assert_eq!(AuditCategory::InvariantViolation.to_string(), "INVARIANT_VIOLATION");
        assert_eq!(AuditOutcome::Rejected.to_string(), "rejected");
    }
}
