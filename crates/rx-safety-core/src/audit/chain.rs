//! Hash-chained audit log stored in the `audit_log` table.
//!
//! ```text
//! entry_hash[n] = SHA-256( entry_hash[n-1] || payload[n] )
//! entry_hash[0] = SHA-256( payload[0] )
//! ```
//!
//! Rows are append-only (schema triggers). Editing or removing any row
//! breaks every later hash, which [`verify_chain`] reports.

use rusqlite::{params, Connection, OptionalExtension, Row};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::{AuditError, AuditEvent, AuditResult, AuditSink};

/// A stored audit row.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub seq: i64,
    pub event_id: String,
    pub prev_hash: Option<String>,
    pub entry_hash: String,
    pub payload: String,
    pub created_at: String,
}

impl AuditEntry {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            seq: row.get(0)?,
            event_id: row.get(1)?,
            prev_hash: row.get(2)?,
            entry_hash: row.get(3)?,
            payload: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    /// Decode the stored payload.
    pub fn event(&self) -> AuditResult<AuditEvent> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

/// Result of a successful chain verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainStatus {
    pub entry_count: u64,
    /// Hash of the newest entry; `None` for an empty log
    pub head_hash: Option<String>,
}

/// The default sink: appends to `audit_log` on the committing connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashChainAuditLog;

impl AuditSink for HashChainAuditLog {
    fn emit(&self, conn: &Connection, event: &AuditEvent) -> AuditResult<()> {
        let payload = event.to_canonical_json()?;
        let prev_hash = head_hash(conn)?;
        let entry_hash = chain_hash(prev_hash.as_deref(), &payload);

        conn.execute(
            "INSERT INTO audit_log (event_id, prev_hash, entry_hash, payload) VALUES (?1, ?2, ?3, ?4)",
            params![event.event_id, prev_hash, entry_hash, payload],
        )?;

        debug!(
            event_id = %event.event_id,
            action = event.action.as_str(),
            prescription_id = %event.prescription_id,
            "Appended audit entry"
        );
        Ok(())
    }
}

/// Hash of one chain link.
pub fn chain_hash(prev_hash: Option<&str>, payload: &str) -> String {
    let mut hasher = Sha256::new();
    if let Some(prev) = prev_hash {
        hasher.update(prev.as_bytes());
    }
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash of the newest entry.
pub fn head_hash(conn: &Connection) -> AuditResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT entry_hash FROM audit_log ORDER BY seq DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?)
}

/// All entries, oldest first.
pub fn read_entries(conn: &Connection) -> AuditResult<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(
        "SELECT seq, event_id, prev_hash, entry_hash, payload, created_at FROM audit_log ORDER BY seq",
    )?;
    let entries = stmt
        .query_map([], AuditEntry::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

/// Entries whose event refers to `prescription_id`, oldest first.
pub fn entries_for_prescription(
    conn: &Connection,
    prescription_id: &str,
) -> AuditResult<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT seq, event_id, prev_hash, entry_hash, payload, created_at FROM audit_log
        WHERE json_extract(payload, '$.prescription_id') = ?1
        ORDER BY seq
        "#,
    )?;
    let entries = stmt
        .query_map([prescription_id], AuditEntry::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

/// Recompute every link and check it against the stored hashes.
pub fn verify_chain(conn: &Connection) -> AuditResult<ChainStatus> {
    let entries = read_entries(conn)?;
    let mut expected_prev: Option<String> = None;

    for entry in &entries {
        if entry.prev_hash != expected_prev {
            warn!(seq = entry.seq, "Audit chain link mismatch");
            return Err(AuditError::ChainBroken {
                seq: entry.seq,
                reason: "previous hash does not match the preceding entry".into(),
            });
        }
        let recomputed = chain_hash(entry.prev_hash.as_deref(), &entry.payload);
        if recomputed != entry.entry_hash {
            warn!(seq = entry.seq, "Audit entry hash mismatch");
            return Err(AuditError::ChainBroken {
                seq: entry.seq,
                reason: "entry hash does not match its payload".into(),
            });
        }
        expected_prev = Some(entry.entry_hash.clone());
    }

    Ok(ChainStatus {
        entry_count: entries.len() as u64,
        head_hash: expected_prev,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditAction;
    use crate::db::Database;
    use crate::models::RiskLevel;

    fn event(prescription_id: &str) -> AuditEvent {
        AuditEvent {
            event_id: uuid::Uuid::new_v4().to_string(),
            action: AuditAction::PrescriptionCommitted,
            prescription_id: prescription_id.into(),
            provider_id: "dr-1".into(),
            patient_id: "p1".into(),
            medication_id: "MED-ASA".into(),
            overall_risk_level: RiskLevel::None,
            override_used: false,
            override_id: None,
            alert_ids: vec![],
            overridden_alert_ids: vec![],
            controlled_substance: false,
            occurred_at: "2024-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn test_chain_hash_deterministic() {
        let a = chain_hash(None, "payload");
        assert_eq!(a, chain_hash(None, "payload"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, chain_hash(Some(&a), "payload"));
    }

    #[test]
    fn test_empty_log_verifies() {
        let db = Database::open_in_memory().unwrap();
        let status = verify_chain(db.conn()).unwrap();
        assert_eq!(status.entry_count, 0);
        assert!(status.head_hash.is_none());
    }

    #[test]
    fn test_emit_links_entries() {
        let db = Database::open_in_memory().unwrap();
        let sink = HashChainAuditLog;
        sink.emit(db.conn(), &event("rx1")).unwrap();
        sink.emit(db.conn(), &event("rx2")).unwrap();

        let entries = read_entries(db.conn()).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].prev_hash.is_none());
        assert_eq!(entries[1].prev_hash.as_ref(), Some(&entries[0].entry_hash));

        let status = verify_chain(db.conn()).unwrap();
        assert_eq!(status.entry_count, 2);
        assert_eq!(status.head_hash, Some(entries[1].entry_hash.clone()));

        let for_rx2 = entries_for_prescription(db.conn(), "rx2").unwrap();
        assert_eq!(for_rx2.len(), 1);
        assert_eq!(for_rx2[0].event().unwrap().prescription_id, "rx2");
    }

    #[test]
    fn test_log_is_append_only() {
        let db = Database::open_in_memory().unwrap();
        HashChainAuditLog.emit(db.conn(), &event("rx1")).unwrap();

        assert!(db.conn().execute("UPDATE audit_log SET payload = '{}'", []).is_err());
        assert!(db.conn().execute("DELETE FROM audit_log", []).is_err());
    }

    #[test]
    fn test_tampering_detected() {
        let db = Database::open_in_memory().unwrap();
        let sink = HashChainAuditLog;
        sink.emit(db.conn(), &event("rx1")).unwrap();
        sink.emit(db.conn(), &event("rx2")).unwrap();

        // Bypass the append-only trigger the way a direct file edit would
        db.conn()
            .execute_batch(
                r#"
                DROP TRIGGER audit_log_no_update;
                UPDATE audit_log SET payload = replace(payload, 'rx1', 'rx9') WHERE seq = 1;
                "#,
            )
            .unwrap();

        let err = verify_chain(db.conn()).unwrap_err();
        assert!(matches!(err, AuditError::ChainBroken { seq: 1, .. }));
    }
}
