//! Patient and allergy database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{ClinicalStore, Database, DbError, DbResult};
use crate::models::{ActiveAllergy, Allergy, AllergySeverity, AllergyType, Patient};

impl Database {
    /// Insert a new patient.
    pub fn insert_patient(&self, patient: &Patient) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO patients (patient_id, name, date_of_birth, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                patient.patient_id,
                patient.name,
                patient.date_of_birth,
                patient.created_at,
                patient.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Get a patient by ID.
    pub fn get_patient(&self, patient_id: &str) -> DbResult<Option<Patient>> {
        self.conn
            .query_row(
                r#"
                SELECT patient_id, name, date_of_birth, created_at, updated_at
                FROM patients
                WHERE patient_id = ?
                "#,
                [patient_id],
                |row| {
                    Ok(Patient {
                        patient_id: row.get(0)?,
                        name: row.get(1)?,
                        date_of_birth: row.get(2)?,
                        created_at: row.get(3)?,
                        updated_at: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    /// Record an allergy on a patient.
    pub fn insert_allergy(&self, allergy: &Allergy) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO allergies (allergy_id, patient_id, substance, allergy_type, severity, active)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                allergy.allergy_id,
                allergy.patient_id,
                allergy.substance,
                allergy.allergy_type.as_str(),
                allergy.severity.as_str(),
                allergy.active,
            ],
        )?;
        Ok(())
    }

    /// Mark an allergy as historical (e.g. refuted by challenge testing).
    pub fn deactivate_allergy(&self, allergy_id: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("UPDATE allergies SET active = 0 WHERE allergy_id = ?", [allergy_id])?;
        Ok(rows_affected > 0)
    }

    /// List all allergies for a patient, active or not.
    pub fn list_allergies(&self, patient_id: &str) -> DbResult<Vec<Allergy>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT allergy_id, patient_id, substance, allergy_type, severity, active
            FROM allergies
            WHERE patient_id = ?
            ORDER BY allergy_id
            "#,
        )?;

        let rows = stmt.query_map([patient_id], allergy_row)?;

        let mut allergies = Vec::new();
        for row in rows {
            allergies.push(row?.try_into()?);
        }
        Ok(allergies)
    }
}

impl<'c> ClinicalStore<'c> {
    /// Check whether a patient exists.
    pub fn patient_exists(&self, patient_id: &str) -> DbResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM patients WHERE patient_id = ?",
                [patient_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Active allergies for a patient with normalized substances, by allergy id.
    pub fn active_allergies(&self, patient_id: &str) -> DbResult<Vec<ActiveAllergy>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT allergy_id, patient_id, substance, allergy_type, severity, active
            FROM allergies
            WHERE patient_id = ? AND active = 1
            ORDER BY allergy_id
            "#,
        )?;

        let rows = stmt.query_map([patient_id], allergy_row)?;

        let mut allergies = Vec::new();
        for row in rows {
            let allergy: Allergy = row?.try_into()?;
            let active = ActiveAllergy::from(&allergy);
            if !active.substance.is_empty() {
                allergies.push(active);
            }
        }
        Ok(allergies)
    }
}

/// Intermediate row struct for database mapping.
struct AllergyRow {
    allergy_id: String,
    patient_id: String,
    substance: String,
    allergy_type: String,
    severity: String,
    active: bool,
}

fn allergy_row(row: &Row<'_>) -> rusqlite::Result<AllergyRow> {
    Ok(AllergyRow {
        allergy_id: row.get(0)?,
        patient_id: row.get(1)?,
        substance: row.get(2)?,
        allergy_type: row.get(3)?,
        severity: row.get(4)?,
        active: row.get(5)?,
    })
}

impl TryFrom<AllergyRow> for Allergy {
    type Error = DbError;

    fn try_from(row: AllergyRow) -> Result<Self, Self::Error> {
        let allergy_type = AllergyType::parse(&row.allergy_type)
            .ok_or_else(|| DbError::Constraint(format!("Unknown allergy type: {}", row.allergy_type)))?;
        let severity = AllergySeverity::parse(&row.severity)
            .ok_or_else(|| DbError::Constraint(format!("Unknown allergy severity: {}", row.severity)))?;

        Ok(Allergy {
            allergy_id: row.allergy_id,
            patient_id: row.patient_id,
            substance: row.substance,
            allergy_type,
            severity,
            active: row.active,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> (Database, Patient) {
        let db = Database::open_in_memory().unwrap();
        let patient = Patient::new("Ada".into());
        db.insert_patient(&patient).unwrap();
        (db, patient)
    }

    #[test]
    fn test_insert_and_get_patient() {
        let (db, patient) = setup_db();

        let retrieved = db.get_patient(&patient.patient_id).unwrap().unwrap();
        assert_eq!(retrieved, patient);

        assert!(db.store().patient_exists(&patient.patient_id).unwrap());
        assert!(!db.store().patient_exists("nobody").unwrap());
    }

    #[test]
    fn test_active_allergies_normalized() {
        let (db, patient) = setup_db();

        let allergy = Allergy::new(
            patient.patient_id.clone(),
            " Penicillin ".into(),
            AllergyType::Drug,
            AllergySeverity::Severe,
        );
        db.insert_allergy(&allergy).unwrap();

        let active = db.store().active_allergies(&patient.patient_id).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].substance, "penicillin");
        assert_eq!(active[0].allergy_id, allergy.allergy_id);
    }

    #[test]
    fn test_inactive_allergy_ignored() {
        let (db, patient) = setup_db();

        let allergy = Allergy::new(
            patient.patient_id.clone(),
            "sulfa".into(),
            AllergyType::Drug,
            AllergySeverity::Mild,
        );
        db.insert_allergy(&allergy).unwrap();
        db.deactivate_allergy(&allergy.allergy_id).unwrap();

        assert!(db.store().active_allergies(&patient.patient_id).unwrap().is_empty());

        // Still on the record
        let all = db.list_allergies(&patient.patient_id).unwrap();
        assert_eq!(all.len(), 1);
        assert!(!all[0].active);
    }

    #[test]
    fn test_blank_substance_ignored() {
        let (db, patient) = setup_db();

        let allergy = Allergy::new(
            patient.patient_id.clone(),
            "   ".into(),
            AllergyType::Food,
            AllergySeverity::Mild,
        );
        db.insert_allergy(&allergy).unwrap();

        assert!(db.store().active_allergies(&patient.patient_id).unwrap().is_empty());
    }
}
