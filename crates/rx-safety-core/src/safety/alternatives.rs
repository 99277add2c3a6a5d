//! Substitute suggestions for a medication that cannot be prescribed as-is.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{Medication, RiskLevel};

use super::{EvaluationResult, SafetyEvaluator, SafetySources};

/// Patient context the alternatives are checked against.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AlternativeContext {
    pub patient_id: String,
    /// Prescription to leave out of the active set (e.g. the one being replaced)
    pub excluding_prescription_id: Option<String>,
    /// Class to search instead of the medication's own therapeutic class
    pub therapeutic_class: Option<String>,
}

impl AlternativeContext {
    pub fn for_patient(patient_id: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            ..Default::default()
        }
    }
}

/// A substitute that would not require an override.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlternativeMedication {
    pub medication: Medication,
    /// Risk of this substitute for the same patient
    pub overall_risk_level: RiskLevel,
    /// Non-blocking alerts the substitute still raises
    pub alert_count: usize,
}

impl AlternativeMedication {
    pub fn has_conflict(&self) -> bool {
        self.alert_count > 0
    }
}

/// Finds same-class substitutes that are safe for the patient.
pub struct AlternativeFinder<'e, 'a, S: SafetySources + ?Sized> {
    evaluator: &'e SafetyEvaluator<'a, S>,
}

impl<'e, 'a, S: SafetySources + ?Sized> AlternativeFinder<'e, 'a, S> {
    pub fn new(evaluator: &'e SafetyEvaluator<'a, S>) -> Self {
        Self { evaluator }
    }

    /// Alternatives to `medication_id`: same therapeutic class (or the
    /// context's class), excluding the original and anything that would
    /// itself need an override. Conflict-free first, then by generic name.
    pub fn alternatives(
        &self,
        medication_id: &str,
        context: &AlternativeContext,
    ) -> EvaluationResult<Vec<AlternativeMedication>> {
        self.evaluator.require_patient(&context.patient_id)?;
        let original = self.evaluator.require_medication(medication_id)?;

        let class = match context
            .therapeutic_class
            .as_deref()
            .or(original.therapeutic_class.as_deref())
            .map(str::trim)
            .filter(|c| !c.is_empty())
        {
            Some(class) => class.to_string(),
            None => return Ok(Vec::new()),
        };

        let candidates = self.evaluator.sources().medications_in_class(&class)?;
        let facts = self
            .evaluator
            .gather(&context.patient_id, context.excluding_prescription_id.as_deref())?;

        let mut found = Vec::new();
        for candidate in candidates {
            if candidate.medication_id == original.medication_id
                || !candidate.active
                || !candidate.in_therapeutic_class(&class)
            {
                continue;
            }
            let report = self.evaluator.assess(&context.patient_id, &candidate, &facts)?;
            if report.requires_override {
                continue;
            }
            found.push(AlternativeMedication {
                overall_risk_level: report.overall_risk_level,
                alert_count: report.alerts.len(),
                medication: candidate,
            });
        }

        found.sort_by(|a, b| {
            a.has_conflict()
                .cmp(&b.has_conflict())
                .then_with(|| {
                    a.medication
                        .generic_name
                        .to_lowercase()
                        .cmp(&b.medication.generic_name.to_lowercase())
                })
                .then_with(|| a.medication.medication_id.cmp(&b.medication.medication_id))
        });

        debug!(
            patient_id = %context.patient_id,
            medication_id,
            class = %class,
            found = found.len(),
            "Found alternatives"
        );

        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{
        Allergy, AllergySeverity, AllergyType, InteractionRule, Patient, Prescription,
        PrescriptionRequest, SeverityLevel,
    };
    use crate::safety::{ClassifierPolicy, EvaluationError};

    fn med(id: &str, name: &str, class: Option<&str>) -> Medication {
        let mut m = Medication::new(id.into(), name.into());
        m.therapeutic_class = class.map(String::from);
        m
    }

    fn setup() -> (Database, String) {
        let db = Database::open_in_memory().unwrap();
        let patient = Patient::new("Ada".into());
        db.insert_patient(&patient).unwrap();

        for m in [
            med("MED-WARF", "Warfarin", Some("Anticoagulant")),
            med("MED-ASA", "Aspirin", Some("NSAID")),
            med("MED-NAP", "Naproxen", Some("NSAID")),
            med("MED-IBU", "Ibuprofen", Some("NSAID")),
            med("MED-CEL", "Celecoxib", Some("NSAID")),
            med("MED-APAP", "Acetaminophen", None),
        ] {
            db.upsert_medication(&m).unwrap();
        }

        for (other, severity, contraindicated) in [
            ("MED-ASA", SeverityLevel::Contraindicated, true),
            ("MED-IBU", SeverityLevel::Major, false),
            ("MED-NAP", SeverityLevel::Moderate, false),
        ] {
            db.insert_interaction_rule(&InteractionRule::new(
                "MED-WARF".into(),
                other.into(),
                severity,
                contraindicated,
                "Bleeding".into(),
            ))
            .unwrap();
        }

        let request = PrescriptionRequest {
            patient_id: patient.patient_id.clone(),
            medication_id: "MED-WARF".into(),
            prescriber_id: "dr".into(),
            dose: "5 mg".into(),
            frequency: "daily".into(),
            ..Default::default()
        };
        db.import_prescription(&Prescription::from_request(&request, RiskLevel::None, false))
            .unwrap();

        (db, patient.patient_id)
    }

    fn names(found: &[AlternativeMedication]) -> Vec<&str> {
        found.iter().map(|a| a.medication.generic_name.as_str()).collect()
    }

    #[test]
    fn test_excludes_blocking_and_orders_conflict_free_first() {
        let (db, patient_id) = setup();
        let store = db.store();
        let evaluator = SafetyEvaluator::new(&store, ClassifierPolicy::default());
        let finder = AlternativeFinder::new(&evaluator);

        let found = finder
            .alternatives("MED-ASA", &AlternativeContext::for_patient(&patient_id))
            .unwrap();

        // Ibuprofen is major against warfarin; naproxen is moderate
        assert_eq!(names(&found), vec!["Celecoxib", "Naproxen"]);
        assert!(!found[0].has_conflict());
        assert_eq!(found[1].overall_risk_level, RiskLevel::Moderate);
    }

    #[test]
    fn test_allergy_excludes_alternative() {
        let (db, patient_id) = setup();
        let mut celecoxib = med("MED-CEL", "Celecoxib", Some("NSAID"));
        celecoxib.drug_class = Some("sulfonamide".into());
        db.upsert_medication(&celecoxib).unwrap();
        db.insert_allergy(&Allergy::new(
            patient_id.clone(),
            "Sulfonamide".into(),
            AllergyType::Drug,
            AllergySeverity::Moderate,
        ))
        .unwrap();

        let store = db.store();
        let evaluator = SafetyEvaluator::new(&store, ClassifierPolicy::default());
        let found = AlternativeFinder::new(&evaluator)
            .alternatives("MED-ASA", &AlternativeContext::for_patient(&patient_id))
            .unwrap();

        assert_eq!(names(&found), vec!["Naproxen"]);
    }

    #[test]
    fn test_explicit_class_and_missing_class() {
        let (db, patient_id) = setup();
        let store = db.store();
        let evaluator = SafetyEvaluator::new(&store, ClassifierPolicy::default());
        let finder = AlternativeFinder::new(&evaluator);

        // No class on acetaminophen: empty, not an error
        let found = finder
            .alternatives("MED-APAP", &AlternativeContext::for_patient(&patient_id))
            .unwrap();
        assert!(found.is_empty());

        let mut context = AlternativeContext::for_patient(&patient_id);
        context.therapeutic_class = Some("nsaid".into());
        let found = finder.alternatives("MED-APAP", &context).unwrap();
        assert_eq!(names(&found), vec!["Celecoxib", "Naproxen"]);
    }

    #[test]
    fn test_excluding_prescription_widens_results() {
        let (db, patient_id) = setup();
        let warfarin_rx = db.list_prescriptions_for_patient(&patient_id).unwrap()[0]
            .prescription_id
            .clone();

        let store = db.store();
        let evaluator = SafetyEvaluator::new(&store, ClassifierPolicy::default());
        let mut context = AlternativeContext::for_patient(&patient_id);
        context.excluding_prescription_id = Some(warfarin_rx);

        let found = AlternativeFinder::new(&evaluator)
            .alternatives("MED-ASA", &context)
            .unwrap();
        assert_eq!(names(&found), vec!["Celecoxib", "Ibuprofen", "Naproxen"]);
    }

    #[test]
    fn test_unknown_medication() {
        let (db, patient_id) = setup();
        let store = db.store();
        let evaluator = SafetyEvaluator::new(&store, ClassifierPolicy::default());

        let result = AlternativeFinder::new(&evaluator)
            .alternatives("MED-NONE", &AlternativeContext::for_patient(&patient_id));
        assert!(matches!(result, Err(EvaluationError::MedicationNotFound(_))));
    }
}
