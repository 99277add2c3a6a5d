//! Medication safety checks.
//!
//! Pipeline: Lookups (allergies, active medications, interaction catalog)
//! → RiskClassifier → SafetyReport
//!
//! Everything in this module is read-only. Persistence decisions are made by
//! [`crate::workflow`].

mod alternatives;
mod classifier;
mod evaluator;
mod sources;

pub use alternatives::*;
pub use classifier::*;
pub use evaluator::*;
pub use sources::*;

use thiserror::Error;

/// Failure to read a fact the safety decision depends on.
///
/// Never converted into an empty result: missing data is not "no interactions".
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Storage error: {0}")]
    Storage(#[from] crate::db::DbError),

    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

pub type LookupResult<T> = Result<T, LookupError>;

/// Evaluation errors.
#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("Patient not found: {0}")]
    PatientNotFound(String),

    #[error("Medication not found: {0}")]
    MedicationNotFound(String),

    #[error(transparent)]
    Lookup(#[from] LookupError),
}

pub type EvaluationResult<T> = Result<T, EvaluationError>;
