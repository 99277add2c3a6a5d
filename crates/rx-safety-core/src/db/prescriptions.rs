//! Prescription and override database operations.

use std::collections::BTreeSet;

use rusqlite::{params, OptionalExtension, Row};

use super::{ClinicalStore, Database, DbError, DbResult};
use crate::models::{Prescription, PrescriptionOverride, PrescriptionStatus, RiskLevel};

const PRESCRIPTION_COLUMNS: &str = "prescription_id, patient_id, medication_id, prescriber_id, dose, frequency, route, duration, quantity, refills, instructions, status, risk_level, override_used, prescribed_at";

const OVERRIDE_COLUMNS: &str = "o.override_id, o.prescription_id, o.overridden_alert_ids, o.override_reason, o.clinical_justification, o.monitoring_plan, o.provider_id, o.override_date";

impl Database {
    /// Insert a prescription row directly, bypassing safety checks.
    ///
    /// For importing existing medication lists; new prescriptions go through the workflow.
    pub fn import_prescription(&self, prescription: &Prescription) -> DbResult<()> {
        self.store().insert_prescription(prescription)
    }

    /// Get a prescription by ID.
    pub fn get_prescription(&self, prescription_id: &str) -> DbResult<Option<Prescription>> {
        self.store().get_prescription(prescription_id)
    }

    /// Stop an active prescription.
    pub fn discontinue_prescription(&self, prescription_id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE prescriptions SET status = 'discontinued', updated_at = datetime('now')
            WHERE prescription_id = ? AND status = 'active'
            "#,
            [prescription_id],
        )?;
        Ok(rows_affected > 0)
    }

    /// List all prescriptions for a patient, oldest first.
    pub fn list_prescriptions_for_patient(&self, patient_id: &str) -> DbResult<Vec<Prescription>> {
        let sql = format!(
            "SELECT {} FROM prescriptions WHERE patient_id = ? ORDER BY prescribed_at, prescription_id",
            PRESCRIPTION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([patient_id], prescription_row)?;

        let mut prescriptions = Vec::new();
        for row in rows {
            prescriptions.push(row?.try_into()?);
        }
        Ok(prescriptions)
    }

    /// Get the override recorded for a prescription, if any.
    pub fn get_override(&self, prescription_id: &str) -> DbResult<Option<PrescriptionOverride>> {
        self.store().get_override(prescription_id)
    }

    /// All overrides recorded for a patient's prescriptions, oldest first.
    pub fn overrides_for_patient(&self, patient_id: &str) -> DbResult<Vec<PrescriptionOverride>> {
        let sql = format!(
            r#"
            SELECT {} FROM prescription_overrides o
            JOIN prescriptions p ON p.prescription_id = o.prescription_id
            WHERE p.patient_id = ?
            ORDER BY o.override_date, o.override_id
            "#,
            OVERRIDE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([patient_id], override_row)?;

        let mut overrides = Vec::new();
        for row in rows {
            overrides.push(row?.try_into()?);
        }
        Ok(overrides)
    }
}

impl<'c> ClinicalStore<'c> {
    /// Medication ids of a patient's active prescriptions.
    pub fn active_medication_ids(
        &self,
        patient_id: &str,
        excluding_prescription_id: Option<&str>,
    ) -> DbResult<BTreeSet<String>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT medication_id FROM prescriptions
            WHERE patient_id = ?1
            AND status = 'active'
            AND (?2 IS NULL OR prescription_id <> ?2)
            "#,
        )?;
        let rows = stmt.query_map(params![patient_id, excluding_prescription_id], |row| {
            row.get::<_, String>(0)
        })?;
        rows.collect::<Result<BTreeSet<_>, _>>().map_err(Into::into)
    }

    /// Get a prescription by ID.
    pub fn get_prescription(&self, prescription_id: &str) -> DbResult<Option<Prescription>> {
        let sql = format!(
            "SELECT {} FROM prescriptions WHERE prescription_id = ?",
            PRESCRIPTION_COLUMNS
        );
        self.conn
            .query_row(&sql, [prescription_id], prescription_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Insert a prescription row.
    pub fn insert_prescription(&self, rx: &Prescription) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO prescriptions (
                prescription_id, patient_id, medication_id, prescriber_id, dose, frequency,
                route, duration, quantity, refills, instructions, status, risk_level,
                override_used, prescribed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
            params![
                rx.prescription_id,
                rx.patient_id,
                rx.medication_id,
                rx.prescriber_id,
                rx.dose,
                rx.frequency,
                rx.route,
                rx.duration,
                rx.quantity,
                rx.refills,
                rx.instructions,
                rx.status.as_str(),
                rx.risk_level.as_str(),
                rx.override_used,
                rx.prescribed_at,
            ],
        )?;
        Ok(())
    }

    /// Insert an override row. Fails if the prescription already has one.
    pub fn insert_override(&self, record: &PrescriptionOverride) -> DbResult<()> {
        let alert_ids_json = serde_json::to_string(&record.overridden_alert_ids)?;

        self.conn.execute(
            r#"
            INSERT INTO prescription_overrides (
                override_id, prescription_id, overridden_alert_ids, override_reason,
                clinical_justification, monitoring_plan, provider_id, override_date
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                record.override_id,
                record.prescription_id,
                alert_ids_json,
                record.override_reason,
                record.clinical_justification,
                record.monitoring_plan,
                record.provider_id,
                record.override_date,
            ],
        )?;
        Ok(())
    }

    /// Get the override recorded for a prescription, if any.
    pub fn get_override(&self, prescription_id: &str) -> DbResult<Option<PrescriptionOverride>> {
        let sql = format!(
            "SELECT {} FROM prescription_overrides o WHERE o.prescription_id = ?",
            OVERRIDE_COLUMNS
        );
        self.conn
            .query_row(&sql, [prescription_id], override_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }
}

/// Intermediate row struct for database mapping.
struct PrescriptionRow {
    prescription_id: String,
    patient_id: String,
    medication_id: String,
    prescriber_id: String,
    dose: String,
    frequency: String,
    route: Option<String>,
    duration: Option<String>,
    quantity: Option<u32>,
    refills: Option<u32>,
    instructions: Option<String>,
    status: String,
    risk_level: String,
    override_used: bool,
    prescribed_at: String,
}

fn prescription_row(row: &Row<'_>) -> rusqlite::Result<PrescriptionRow> {
    Ok(PrescriptionRow {
        prescription_id: row.get(0)?,
        patient_id: row.get(1)?,
        medication_id: row.get(2)?,
        prescriber_id: row.get(3)?,
        dose: row.get(4)?,
        frequency: row.get(5)?,
        route: row.get(6)?,
        duration: row.get(7)?,
        quantity: row.get(8)?,
        refills: row.get(9)?,
        instructions: row.get(10)?,
        status: row.get(11)?,
        risk_level: row.get(12)?,
        override_used: row.get(13)?,
        prescribed_at: row.get(14)?,
    })
}

impl TryFrom<PrescriptionRow> for Prescription {
    type Error = DbError;

    fn try_from(row: PrescriptionRow) -> Result<Self, Self::Error> {
        let status = PrescriptionStatus::parse(&row.status)
            .ok_or_else(|| DbError::Constraint(format!("Unknown prescription status: {}", row.status)))?;
        let risk_level = RiskLevel::parse(&row.risk_level)
            .ok_or_else(|| DbError::Constraint(format!("Unknown risk level: {}", row.risk_level)))?;

        Ok(Prescription {
            prescription_id: row.prescription_id,
            patient_id: row.patient_id,
            medication_id: row.medication_id,
            prescriber_id: row.prescriber_id,
            dose: row.dose,
            frequency: row.frequency,
            route: row.route,
            duration: row.duration,
            quantity: row.quantity,
            refills: row.refills,
            instructions: row.instructions,
            status,
            risk_level,
            override_used: row.override_used,
            prescribed_at: row.prescribed_at,
        })
    }
}

/// Intermediate row struct for database mapping.
struct OverrideRow {
    override_id: String,
    prescription_id: String,
    overridden_alert_ids: String,
    override_reason: String,
    clinical_justification: Option<String>,
    monitoring_plan: Option<String>,
    provider_id: String,
    override_date: String,
}

fn override_row(row: &Row<'_>) -> rusqlite::Result<OverrideRow> {
    Ok(OverrideRow {
        override_id: row.get(0)?,
        prescription_id: row.get(1)?,
        overridden_alert_ids: row.get(2)?,
        override_reason: row.get(3)?,
        clinical_justification: row.get(4)?,
        monitoring_plan: row.get(5)?,
        provider_id: row.get(6)?,
        override_date: row.get(7)?,
    })
}

impl TryFrom<OverrideRow> for PrescriptionOverride {
    type Error = DbError;

    fn try_from(row: OverrideRow) -> Result<Self, Self::Error> {
        Ok(PrescriptionOverride {
            override_id: row.override_id,
            prescription_id: row.prescription_id,
            overridden_alert_ids: serde_json::from_str(&row.overridden_alert_ids)?,
            override_reason: row.override_reason,
            clinical_justification: row.clinical_justification,
            monitoring_plan: row.monitoring_plan,
            provider_id: row.provider_id,
            override_date: row.override_date,
        })
    }
}
