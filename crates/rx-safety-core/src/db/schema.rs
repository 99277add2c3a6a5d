//! SQLite schema definition.

/// Complete database schema for the medication safety engine.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Medication Catalog (Reference Data - read-only to the engine)
-- ============================================================================

CREATE TABLE IF NOT EXISTS medications (
    medication_id TEXT PRIMARY KEY,
    generic_name TEXT NOT NULL,
    brand_name TEXT,
    drug_class TEXT,
    therapeutic_class TEXT,
    ingredients TEXT NOT NULL DEFAULT '[]',      -- JSON array of strings
    controlled_substance INTEGER NOT NULL DEFAULT 0,
    schedule TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_medications_class ON medications(therapeutic_class COLLATE NOCASE);

-- Unordered pairs; lookups match either column order
CREATE TABLE IF NOT EXISTS interaction_rules (
    rule_id TEXT PRIMARY KEY,
    medication_a_id TEXT NOT NULL REFERENCES medications(medication_id),
    medication_b_id TEXT NOT NULL REFERENCES medications(medication_id),
    severity_level INTEGER NOT NULL CHECK (severity_level BETWEEN 1 AND 4),
    interaction_type TEXT NOT NULL DEFAULT 'other',
    contraindicated INTEGER NOT NULL DEFAULT 0,
    description TEXT NOT NULL DEFAULT '',
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    CHECK (medication_a_id <> medication_b_id)
);

CREATE INDEX IF NOT EXISTS idx_interactions_a ON interaction_rules(medication_a_id, active);
CREATE INDEX IF NOT EXISTS idx_interactions_b ON interaction_rules(medication_b_id, active);

-- ============================================================================
-- Patients and Allergies (owned by the patient record)
-- ============================================================================

CREATE TABLE IF NOT EXISTS patients (
    patient_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    date_of_birth TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS allergies (
    allergy_id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(patient_id),
    substance TEXT NOT NULL,
    allergy_type TEXT NOT NULL CHECK (allergy_type IN ('drug', 'food', 'environmental')),
    severity TEXT NOT NULL CHECK (severity IN ('mild', 'moderate', 'severe', 'life_threatening')),
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_allergies_patient ON allergies(patient_id, active);

-- ============================================================================
-- Prescriptions (written by the engine's commit path)
-- ============================================================================

CREATE TABLE IF NOT EXISTS prescriptions (
    prescription_id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(patient_id),
    medication_id TEXT NOT NULL REFERENCES medications(medication_id),
    prescriber_id TEXT NOT NULL,
    dose TEXT NOT NULL,
    frequency TEXT NOT NULL,
    route TEXT,
    duration TEXT,
    quantity INTEGER,
    refills INTEGER,
    instructions TEXT,
    status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'discontinued', 'cancelled')),
    risk_level TEXT NOT NULL DEFAULT 'none',
    override_used INTEGER NOT NULL DEFAULT 0,
    prescribed_at TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_prescriptions_patient ON prescriptions(patient_id, status);

-- ============================================================================
-- Overrides (Append-Only - Immutable after creation)
-- ============================================================================

CREATE TABLE IF NOT EXISTS prescription_overrides (
    override_id TEXT PRIMARY KEY,
    prescription_id TEXT NOT NULL UNIQUE REFERENCES prescriptions(prescription_id),
    overridden_alert_ids TEXT NOT NULL,          -- JSON array of alert ids
    override_reason TEXT NOT NULL,
    clinical_justification TEXT,
    monitoring_plan TEXT,
    provider_id TEXT NOT NULL,
    override_date TEXT NOT NULL
);

CREATE TRIGGER IF NOT EXISTS prescription_overrides_no_update BEFORE UPDATE ON prescription_overrides
BEGIN
    SELECT RAISE(ABORT, 'Overrides are immutable');
END;

CREATE TRIGGER IF NOT EXISTS prescription_overrides_no_delete BEFORE DELETE ON prescription_overrides
BEGIN
    SELECT RAISE(ABORT, 'Overrides are immutable');
END;

-- ============================================================================
-- Audit Log (Append-Only hash chain)
-- ============================================================================

CREATE TABLE IF NOT EXISTS audit_log (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id TEXT NOT NULL UNIQUE,
    prev_hash TEXT,                              -- NULL for the first entry
    entry_hash TEXT NOT NULL UNIQUE,             -- SHA-256 of prev_hash || payload
    payload TEXT NOT NULL,                       -- canonical JSON of the event
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TRIGGER IF NOT EXISTS audit_log_no_update BEFORE UPDATE ON audit_log
BEGIN
    SELECT RAISE(ABORT, 'Audit log is append-only');
END;

CREATE TRIGGER IF NOT EXISTS audit_log_no_delete BEFORE DELETE ON audit_log
BEGIN
    SELECT RAISE(ABORT, 'Audit log is append-only');
END;
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute_batch(
            r#"
            INSERT INTO patients (patient_id, name) VALUES ('p1', 'Test Patient');
            INSERT INTO medications (medication_id, generic_name) VALUES ('m1', 'warfarin');
            INSERT INTO medications (medication_id, generic_name) VALUES ('m2', 'aspirin');
            INSERT INTO prescriptions (prescription_id, patient_id, medication_id, prescriber_id, dose, frequency, prescribed_at)
            VALUES ('rx1', 'p1', 'm1', 'dr', '5 mg', 'daily', '2024-01-01T00:00:00Z');
            "#,
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);

        // Re-running is a no-op
        assert!(conn.execute_batch(SCHEMA).is_ok());
    }

    #[test]
    fn test_interaction_rule_constraints() {
        let conn = setup();

        // Self-interaction rejected
        let result = conn.execute(
            "INSERT INTO interaction_rules (rule_id, medication_a_id, medication_b_id, severity_level) VALUES ('r0', 'm1', 'm1', 2)",
            [],
        );
        assert!(result.is_err());

        // Severity out of range rejected
        let result = conn.execute(
            "INSERT INTO interaction_rules (rule_id, medication_a_id, medication_b_id, severity_level) VALUES ('r1', 'm1', 'm2', 5)",
            [],
        );
        assert!(result.is_err());

        let result = conn.execute(
            "INSERT INTO interaction_rules (rule_id, medication_a_id, medication_b_id, severity_level) VALUES ('r1', 'm1', 'm2', 4)",
            [],
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_override_unique_and_immutable() {
        let conn = setup();

        let insert = "INSERT INTO prescription_overrides (override_id, prescription_id, overridden_alert_ids, override_reason, provider_id, override_date) VALUES (?, 'rx1', '[]', 'reason long enough', 'dr', '2024-01-01')";
        assert!(conn.execute(insert, ["o1"]).is_ok());

        // Second override for the same prescription
        assert!(conn.execute(insert, ["o2"]).is_err());

        // Updates and deletes rejected
        assert!(conn
            .execute("UPDATE prescription_overrides SET override_reason = 'x'", [])
            .is_err());
        assert!(conn.execute("DELETE FROM prescription_overrides", []).is_err());
    }

    #[test]
    fn test_audit_log_append_only() {
        let conn = setup();

        conn.execute(
            "INSERT INTO audit_log (event_id, prev_hash, entry_hash, payload) VALUES ('e1', NULL, 'h1', '{}')",
            [],
        )
        .unwrap();

        assert!(conn.execute("UPDATE audit_log SET payload = '{\"x\":1}'", []).is_err());
        assert!(conn.execute("DELETE FROM audit_log", []).is_err());
    }
}
