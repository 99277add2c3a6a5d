//! Medication catalog and interaction rule operations.

use std::collections::BTreeSet;

use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use super::{ClinicalStore, Database, DbError, DbResult};
use crate::models::{InteractionRule, InteractionType, Medication, SeverityLevel};

const MEDICATION_COLUMNS: &str = "medication_id, generic_name, brand_name, drug_class, therapeutic_class, ingredients, controlled_substance, schedule, active";

const RULE_COLUMNS: &str = "rule_id, medication_a_id, medication_b_id, severity_level, interaction_type, contraindicated, description, active";

impl Database {
    /// Insert or update a catalog medication.
    pub fn upsert_medication(&self, med: &Medication) -> DbResult<()> {
        let ingredients_json = serde_json::to_string(&med.ingredients)?;

        self.conn.execute(
            r#"
            INSERT INTO medications (
                medication_id, generic_name, brand_name, drug_class, therapeutic_class,
                ingredients, controlled_substance, schedule, active, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, datetime('now'))
            ON CONFLICT(medication_id) DO UPDATE SET
                generic_name = excluded.generic_name,
                brand_name = excluded.brand_name,
                drug_class = excluded.drug_class,
                therapeutic_class = excluded.therapeutic_class,
                ingredients = excluded.ingredients,
                controlled_substance = excluded.controlled_substance,
                schedule = excluded.schedule,
                active = excluded.active,
                updated_at = datetime('now')
            "#,
            params![
                med.medication_id,
                med.generic_name,
                med.brand_name,
                med.drug_class,
                med.therapeutic_class,
                ingredients_json,
                med.controlled_substance,
                med.schedule,
                med.active,
            ],
        )?;
        Ok(())
    }

    /// Get a medication by ID.
    pub fn get_medication(&self, medication_id: &str) -> DbResult<Option<Medication>> {
        self.store().get_medication(medication_id)
    }

    /// Mark a medication as no longer current (soft delete).
    pub fn deactivate_medication(&self, medication_id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE medications SET active = 0, updated_at = datetime('now') WHERE medication_id = ?",
            [medication_id],
        )?;
        Ok(rows_affected > 0)
    }

    /// Insert an interaction rule.
    pub fn insert_interaction_rule(&self, rule: &InteractionRule) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO interaction_rules (
                rule_id, medication_a_id, medication_b_id, severity_level,
                interaction_type, contraindicated, description, active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                rule.rule_id,
                rule.medication_a_id,
                rule.medication_b_id,
                rule.severity.level(),
                rule.interaction_type.as_str(),
                rule.contraindicated,
                rule.description,
                rule.active,
            ],
        )?;
        Ok(())
    }

    /// Retire a rule. Retired rules are kept for history but never matched.
    pub fn retire_interaction_rule(&self, rule_id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE interaction_rules SET active = 0 WHERE rule_id = ?",
            [rule_id],
        )?;
        Ok(rows_affected > 0)
    }
}

impl<'c> ClinicalStore<'c> {
    /// Get a medication by ID, current or not.
    pub fn get_medication(&self, medication_id: &str) -> DbResult<Option<Medication>> {
        let sql = format!("SELECT {} FROM medications WHERE medication_id = ?", MEDICATION_COLUMNS);
        self.conn
            .query_row(&sql, [medication_id], medication_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Current catalog medications in a therapeutic class, by generic name.
    ///
    /// Classes compare with `normalize_term`, which SQLite's NOCASE (ASCII
    /// only, no trimming) cannot express, so the match runs here.
    pub fn medications_in_class(&self, therapeutic_class: &str) -> DbResult<Vec<Medication>> {
        let sql = format!(
            r#"
            SELECT {} FROM medications
            WHERE therapeutic_class IS NOT NULL
            AND active = 1
            ORDER BY generic_name COLLATE NOCASE, medication_id
            "#,
            MEDICATION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], medication_row)?;

        let mut meds = Vec::new();
        for row in rows {
            let med: Medication = row?.try_into()?;
            if med.in_therapeutic_class(therapeutic_class) {
                meds.push(med);
            }
        }
        Ok(meds)
    }

    /// Active rules pairing `medication_id` with any of `candidate_ids`, in
    /// either stored order. Sorted by rule id.
    pub fn interactions_between(
        &self,
        medication_id: &str,
        candidate_ids: &BTreeSet<String>,
    ) -> DbResult<Vec<InteractionRule>> {
        if candidate_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; candidate_ids.len()].join(", ");
        let sql = format!(
            r#"
            SELECT {cols} FROM interaction_rules
            WHERE active = 1
            AND (
                (medication_a_id = ?1 AND medication_b_id IN ({ph}))
                OR (medication_b_id = ?1 AND medication_a_id IN ({ph}))
            )
            ORDER BY rule_id
            "#,
            cols = RULE_COLUMNS,
            ph = placeholders,
        );

        // ?1 is reused; the IN lists are bound twice after it
        let mut values: Vec<&str> = Vec::with_capacity(1 + candidate_ids.len() * 2);
        values.push(medication_id);
        values.extend(candidate_ids.iter().map(String::as_str));
        values.extend(candidate_ids.iter().map(String::as_str));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), rule_row)?;

        let mut rules = Vec::new();
        for row in rows {
            rules.push(row?.try_into()?);
        }
        Ok(rules)
    }
}

/// Intermediate row struct for database mapping.
struct MedicationRow {
    medication_id: String,
    generic_name: String,
    brand_name: Option<String>,
    drug_class: Option<String>,
    therapeutic_class: Option<String>,
    ingredients: String,
    controlled_substance: bool,
    schedule: Option<String>,
    active: bool,
}

fn medication_row(row: &Row<'_>) -> rusqlite::Result<MedicationRow> {
    Ok(MedicationRow {
        medication_id: row.get(0)?,
        generic_name: row.get(1)?,
        brand_name: row.get(2)?,
        drug_class: row.get(3)?,
        therapeutic_class: row.get(4)?,
        ingredients: row.get(5)?,
        controlled_substance: row.get(6)?,
        schedule: row.get(7)?,
        active: row.get(8)?,
    })
}

impl TryFrom<MedicationRow> for Medication {
    type Error = DbError;

    fn try_from(row: MedicationRow) -> Result<Self, Self::Error> {
        Ok(Medication {
            medication_id: row.medication_id,
            generic_name: row.generic_name,
            brand_name: row.brand_name,
            drug_class: row.drug_class,
            therapeutic_class: row.therapeutic_class,
            ingredients: serde_json::from_str(&row.ingredients)?,
            controlled_substance: row.controlled_substance,
            schedule: row.schedule,
            active: row.active,
        })
    }
}

/// Intermediate row struct for database mapping.
struct RuleRow {
    rule_id: String,
    medication_a_id: String,
    medication_b_id: String,
    severity_level: u8,
    interaction_type: String,
    contraindicated: bool,
    description: String,
    active: bool,
}

fn rule_row(row: &Row<'_>) -> rusqlite::Result<RuleRow> {
    Ok(RuleRow {
        rule_id: row.get(0)?,
        medication_a_id: row.get(1)?,
        medication_b_id: row.get(2)?,
        severity_level: row.get(3)?,
        interaction_type: row.get(4)?,
        contraindicated: row.get(5)?,
        description: row.get(6)?,
        active: row.get(7)?,
    })
}

impl TryFrom<RuleRow> for InteractionRule {
    type Error = DbError;

    fn try_from(row: RuleRow) -> Result<Self, Self::Error> {
        let severity = SeverityLevel::from_level(row.severity_level).ok_or_else(|| {
            DbError::Constraint(format!("Unknown severity level: {}", row.severity_level))
        })?;
        let interaction_type = InteractionType::parse(&row.interaction_type).ok_or_else(|| {
            DbError::Constraint(format!("Unknown interaction type: {}", row.interaction_type))
        })?;

        Ok(InteractionRule {
            rule_id: row.rule_id,
            medication_a_id: row.medication_a_id,
            medication_b_id: row.medication_b_id,
            severity,
            interaction_type,
            contraindicated: row.contraindicated,
            description: row.description,
            active: row.active,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        for (id, name, class) in [
            ("MED-WARF", "Warfarin", Some("Anticoagulant")),
            ("MED-ASA", "Aspirin", Some("NSAID")),
            ("MED-IBU", "Ibuprofen", Some("NSAID")),
            ("MED-NAP", "Naproxen", Some("nsaid")),
            ("MED-APAP", "Acetaminophen", None),
        ] {
            let mut med = Medication::new(id.into(), name.into());
            med.therapeutic_class = class.map(String::from);
            db.upsert_medication(&med).unwrap();
        }
        db
    }

    fn ids(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_upsert_and_get() {
        let db = setup_db();

        let mut med = Medication::new("MED-AMOX".into(), "Amoxicillin".into());
        med.brand_name = Some("Amoxil".into());
        med.drug_class = Some("penicillin".into());
        med.ingredients = vec!["amoxicillin trihydrate".into()];
        db.upsert_medication(&med).unwrap();

        let retrieved = db.get_medication("MED-AMOX").unwrap().unwrap();
        assert_eq!(retrieved, med);

        med.generic_name = "Amoxicillin (updated)".into();
        db.upsert_medication(&med).unwrap();
        let retrieved = db.get_medication("MED-AMOX").unwrap().unwrap();
        assert_eq!(retrieved.generic_name, "Amoxicillin (updated)");

        assert!(db.get_medication("missing").unwrap().is_none());
    }

    #[test]
    fn test_interactions_symmetric() {
        let db = setup_db();
        let rule = InteractionRule::new(
            "MED-WARF".into(),
            "MED-ASA".into(),
            SeverityLevel::Contraindicated,
            true,
            "Bleeding".into(),
        );
        db.insert_interaction_rule(&rule).unwrap();

        let store = db.store();
        let forward = store.interactions_between("MED-ASA", &ids(&["MED-WARF"])).unwrap();
        let backward = store.interactions_between("MED-WARF", &ids(&["MED-ASA"])).unwrap();

        assert_eq!(forward, vec![rule.clone()]);
        assert_eq!(backward, vec![rule]);
    }

    #[test]
    fn test_interactions_only_against_candidates() {
        let db = setup_db();
        db.insert_interaction_rule(&InteractionRule::new(
            "MED-ASA".into(),
            "MED-IBU".into(),
            SeverityLevel::Moderate,
            false,
            "GI".into(),
        ))
        .unwrap();

        let store = db.store();
        assert!(store.interactions_between("MED-ASA", &ids(&["MED-WARF"])).unwrap().is_empty());
        assert!(store.interactions_between("MED-ASA", &BTreeSet::new()).unwrap().is_empty());
        assert_eq!(
            store
                .interactions_between("MED-ASA", &ids(&["MED-WARF", "MED-IBU"]))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_retired_rule_not_matched() {
        let db = setup_db();
        let rule = InteractionRule::new(
            "MED-WARF".into(),
            "MED-IBU".into(),
            SeverityLevel::Major,
            false,
            "Bleeding".into(),
        );
        db.insert_interaction_rule(&rule).unwrap();
        assert!(db.retire_interaction_rule(&rule.rule_id).unwrap());

        let found = db
            .store()
            .interactions_between("MED-IBU", &ids(&["MED-WARF"]))
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_medications_in_class_sorted_case_insensitive() {
        let db = setup_db();
        db.deactivate_medication("MED-IBU").unwrap();

        let meds = db.store().medications_in_class("NSAID").unwrap();
        let names: Vec<_> = meds.iter().map(|m| m.generic_name.as_str()).collect();
        assert_eq!(names, vec!["Aspirin", "Naproxen"]);
    }

    #[test]
    fn test_medications_in_class_trims_and_folds_unicode() {
        let db = setup_db();
        for (id, name, class) in [
            ("MED-DICL", "Diclofenac", " NSAID  "),
            ("MED-KETO", "Kétoprofène", "Antiinflammatoire É"),
            ("MED-FLUR", "Flurbiprofène", "antiinflammatoire é "),
        ] {
            let mut med = Medication::new(id.into(), name.into());
            med.therapeutic_class = Some(class.into());
            db.upsert_medication(&med).unwrap();
        }

        let store = db.store();
        let nsaids: Vec<_> = store
            .medications_in_class("NSAID")
            .unwrap()
            .into_iter()
            .map(|m| m.medication_id)
            .collect();
        assert_eq!(nsaids, vec!["MED-ASA", "MED-DICL", "MED-IBU", "MED-NAP"]);

        let french: Vec<_> = store
            .medications_in_class("ANTIINFLAMMATOIRE É")
            .unwrap()
            .into_iter()
            .map(|m| m.medication_id)
            .collect();
        assert_eq!(french, vec!["MED-FLUR", "MED-KETO"]);
    }
}
