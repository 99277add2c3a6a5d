//! Safety evaluation for candidate prescriptions.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::models::{ActiveAllergy, Medication, SafetyReport};

use super::{
    classify, AllergyMatcher, ClassifierInput, ClassifierPolicy, EvaluationError,
    EvaluationResult, LookupResult, SafetySources, SubstanceMatcher,
};

static DEFAULT_MATCHER: SubstanceMatcher = SubstanceMatcher;

/// A patient's allergy and medication context as of one read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientFacts {
    pub active_medication_ids: BTreeSet<String>,
    pub allergies: Vec<ActiveAllergy>,
}

/// Gathers facts from the lookups and classifies them.
pub struct SafetyEvaluator<'a, S: SafetySources + ?Sized> {
    sources: &'a S,
    policy: ClassifierPolicy,
    matcher: &'a dyn AllergyMatcher,
}

impl<'a, S: SafetySources + ?Sized> SafetyEvaluator<'a, S> {
    /// Create an evaluator using the default substance matcher.
    pub fn new(sources: &'a S, policy: ClassifierPolicy) -> Self {
        Self {
            sources,
            policy,
            matcher: &DEFAULT_MATCHER,
        }
    }

    /// Replace the allergy matcher.
    pub fn with_matcher(mut self, matcher: &'a dyn AllergyMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn sources(&self) -> &'a S {
        self.sources
    }

    /// Evaluate a candidate medication for a patient.
    pub fn evaluate(&self, patient_id: &str, medication_id: &str) -> EvaluationResult<SafetyReport> {
        self.evaluate_excluding(patient_id, medication_id, None)
    }

    /// Evaluate with one of the patient's own prescriptions left out of the
    /// comparison set.
    pub fn evaluate_excluding(
        &self,
        patient_id: &str,
        medication_id: &str,
        excluding_prescription_id: Option<&str>,
    ) -> EvaluationResult<SafetyReport> {
        self.require_patient(patient_id)?;
        let medication = self.require_medication(medication_id)?;
        let facts = self.gather(patient_id, excluding_prescription_id)?;
        Ok(self.assess(patient_id, &medication, &facts)?)
    }

    /// Fail with `PatientNotFound` unless the patient exists.
    pub fn require_patient(&self, patient_id: &str) -> EvaluationResult<()> {
        if self.sources.patient_exists(patient_id)? {
            Ok(())
        } else {
            Err(EvaluationError::PatientNotFound(patient_id.to_string()))
        }
    }

    /// Fetch a medication or fail with `MedicationNotFound`.
    pub fn require_medication(&self, medication_id: &str) -> EvaluationResult<Medication> {
        self.sources
            .get_medication(medication_id)?
            .ok_or_else(|| EvaluationError::MedicationNotFound(medication_id.to_string()))
    }

    /// Read the patient's active medications and allergies.
    pub fn gather(
        &self,
        patient_id: &str,
        excluding_prescription_id: Option<&str>,
    ) -> LookupResult<PatientFacts> {
        let active_medication_ids = self
            .sources
            .active_medication_ids(patient_id, excluding_prescription_id)?;
        let allergies = self.sources.active_allergies(patient_id)?;

        Ok(PatientFacts {
            active_medication_ids,
            allergies,
        })
    }

    /// Classify one medication against already-gathered facts.
    pub fn assess(
        &self,
        patient_id: &str,
        medication: &Medication,
        facts: &PatientFacts,
    ) -> LookupResult<SafetyReport> {
        let interactions = self
            .sources
            .lookup(&medication.medication_id, &facts.active_medication_ids)?;

        let allergy_matches: Vec<ActiveAllergy> = facts
            .allergies
            .iter()
            .filter(|a| self.matcher.matches(&a.substance, medication))
            .cloned()
            .collect();

        let mut medication_names = BTreeMap::new();
        for rule in &interactions {
            let other_id = rule.other_side(&medication.medication_id);
            if medication_names.contains_key(other_id) {
                continue;
            }
            if let Some(other) = self.sources.get_medication(other_id)? {
                medication_names.insert(other_id.to_string(), other.generic_name);
            }
        }

        let input = ClassifierInput {
            patient_id,
            medication,
            compared_medication_ids: &facts.active_medication_ids,
            interactions: &interactions,
            allergy_matches: &allergy_matches,
            medication_names: &medication_names,
        };
        let report = classify(&input, &self.policy);

        debug!(
            patient_id,
            medication_id = %medication.medication_id,
            compared = facts.active_medication_ids.len(),
            alerts = report.alerts.len(),
            risk = report.overall_risk_level.as_str(),
            requires_override = report.requires_override,
            "Evaluated candidate medication"
        );

        Ok(report)
    }
}
