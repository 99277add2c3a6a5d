//! Audit trail for committed prescriptions.
//!
//! Every commit emits one [`AuditEvent`] through an [`AuditSink`] on the same
//! connection as the prescription insert, so a failed emit rolls the
//! prescription back with it.

mod chain;
mod event;

pub use chain::*;
pub use event::*;

use rusqlite::Connection;
use thiserror::Error;

/// Audit errors.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Database error: {0}")]
    Database(#[from] crate::db::DbError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Audit chain broken at entry {seq}: {reason}")]
    ChainBroken { seq: i64, reason: String },

    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for AuditError {
    fn from(e: rusqlite::Error) -> Self {
        AuditError::Database(e.into())
    }
}

pub type AuditResult<T> = Result<T, AuditError>;

/// Receives audit events inside the committing transaction.
pub trait AuditSink: Send + Sync {
    /// Record `event`. `conn` is the open write transaction.
    fn emit(&self, conn: &Connection, event: &AuditEvent) -> AuditResult<()>;
}
