//! Prescription workflow: validate, evaluate, then commit or block.
//!
//! ```text
//! Validating → Evaluating ─┬─→ Committing ────────────┬─→ Committed
//!                          ├─→ CommittingWithOverride ┘
//!                          └─→ Blocked ─────────────────→ Rejected
//! ```
//!
//! Any failure before commit ends in `Rejected` with nothing written.

mod prescriber;

pub use prescriber::*;

use thiserror::Error;

use crate::audit::AuditError;
use crate::db::DbError;
use crate::models::SafetyReport;
use crate::safety::{EvaluationError, LookupError};

/// Workflow states, logged at each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Validating,
    Evaluating,
    Committing,
    Blocked,
    CommittingWithOverride,
    Committed,
    Rejected,
}

impl WorkflowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::Validating => "validating",
            WorkflowState::Evaluating => "evaluating",
            WorkflowState::Committing => "committing",
            WorkflowState::Blocked => "blocked",
            WorkflowState::CommittingWithOverride => "committing_with_override",
            WorkflowState::Committed => "committed",
            WorkflowState::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Committed | WorkflowState::Rejected)
    }
}

/// Workflow errors.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Blocking alerts and no acceptable override. Carries the full report.
    #[error("Prescription blocked by {} safety alert(s)", .0.blocking_alert_ids().len())]
    SafetyAlert(Box<SafetyReport>),

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Concurrent write conflict: {0}")]
    ConcurrencyConflict(String),

    /// The engine cannot serve further calls (e.g. a poisoned lock).
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    #[error("Safety lookup failed: {0}")]
    Lookup(LookupError),
}

impl WorkflowError {
    /// True when repeating the whole call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkflowError::Persistence(_) | WorkflowError::ConcurrencyConflict(_)
        )
    }

    /// The blocking report, for `SafetyAlert`.
    pub fn report(&self) -> Option<&SafetyReport> {
        match self {
            WorkflowError::SafetyAlert(report) => Some(report),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::Validation(_) => "validation",
            WorkflowError::NotFound(_) => "not_found",
            WorkflowError::SafetyAlert(_) => "safety_alert",
            WorkflowError::Persistence(_) => "persistence",
            WorkflowError::ConcurrencyConflict(_) => "concurrency_conflict",
            WorkflowError::Unavailable(_) => "unavailable",
            WorkflowError::Lookup(_) => "lookup",
        }
    }
}

impl From<DbError> for WorkflowError {
    fn from(e: DbError) -> Self {
        if e.is_busy() {
            WorkflowError::ConcurrencyConflict(e.to_string())
        } else {
            WorkflowError::Persistence(e.to_string())
        }
    }
}

impl From<rusqlite::Error> for WorkflowError {
    fn from(e: rusqlite::Error) -> Self {
        DbError::from(e).into()
    }
}

impl From<LookupError> for WorkflowError {
    fn from(e: LookupError) -> Self {
        match e {
            LookupError::Storage(db) if db.is_busy() => {
                WorkflowError::ConcurrencyConflict(db.to_string())
            }
            other => WorkflowError::Lookup(other),
        }
    }
}

impl From<EvaluationError> for WorkflowError {
    fn from(e: EvaluationError) -> Self {
        match e {
            EvaluationError::PatientNotFound(id) => {
                WorkflowError::NotFound(format!("patient {}", id))
            }
            EvaluationError::MedicationNotFound(id) => {
                WorkflowError::NotFound(format!("medication {}", id))
            }
            EvaluationError::Lookup(e) => e.into(),
        }
    }
}

impl From<AuditError> for WorkflowError {
    fn from(e: AuditError) -> Self {
        match e {
            AuditError::Database(db) => db.into(),
            other => WorkflowError::Persistence(format!("audit: {}", other)),
        }
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::ffi;

    fn busy() -> DbError {
        DbError::Sqlite(rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_BUSY),
            None,
        ))
    }

    #[test]
    fn test_retryable() {
        assert!(WorkflowError::Persistence("x".into()).is_retryable());
        assert!(WorkflowError::ConcurrencyConflict("x".into()).is_retryable());
        assert!(!WorkflowError::Validation("x".into()).is_retryable());
        assert!(!WorkflowError::NotFound("x".into()).is_retryable());
        assert!(!WorkflowError::Unavailable("x".into()).is_retryable());
        assert!(!WorkflowError::Lookup(LookupError::Unavailable("x".into())).is_retryable());
    }

    #[test]
    fn test_busy_maps_to_conflict() {
        assert!(matches!(
            WorkflowError::from(busy()),
            WorkflowError::ConcurrencyConflict(_)
        ));
        assert!(matches!(
            WorkflowError::from(LookupError::Storage(busy())),
            WorkflowError::ConcurrencyConflict(_)
        ));
        assert!(matches!(
            WorkflowError::from(AuditError::Database(busy())),
            WorkflowError::ConcurrencyConflict(_)
        ));
        assert!(matches!(
            WorkflowError::from(DbError::NotFound("x".into())),
            WorkflowError::Persistence(_)
        ));
    }

    #[test]
    fn test_evaluation_errors() {
        assert!(matches!(
            WorkflowError::from(EvaluationError::PatientNotFound("p".into())),
            WorkflowError::NotFound(_)
        ));
        assert!(matches!(
            WorkflowError::from(EvaluationError::Lookup(LookupError::Unavailable("x".into()))),
            WorkflowError::Lookup(_)
        ));
    }

    #[test]
    fn test_terminal_states() {
        assert!(WorkflowState::Committed.is_terminal());
        assert!(WorkflowState::Rejected.is_terminal());
        assert!(!WorkflowState::Blocked.is_terminal());
    }
}
