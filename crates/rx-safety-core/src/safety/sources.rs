//! Read-only lookups the evaluator depends on.

use std::collections::BTreeSet;

use crate::models::{normalize_term, ActiveAllergy, InteractionRule, Medication};

use super::LookupResult;

/// Existence checks for referenced records.
pub trait ClinicalDirectory {
    fn get_medication(&self, medication_id: &str) -> LookupResult<Option<Medication>>;

    fn patient_exists(&self, patient_id: &str) -> LookupResult<bool>;
}

/// Known drug-drug interactions.
pub trait InteractionCatalog {
    /// Active rules pairing `medication_id` with any of `candidate_ids`.
    ///
    /// Must match regardless of which side of the stored pair is the
    /// candidate. Retired rules are never returned.
    fn lookup(
        &self,
        medication_id: &str,
        candidate_ids: &BTreeSet<String>,
    ) -> LookupResult<Vec<InteractionRule>>;

    /// Current catalog medications in a therapeutic class.
    fn medications_in_class(&self, therapeutic_class: &str) -> LookupResult<Vec<Medication>>;
}

/// A patient's active allergies.
pub trait AllergyRegistry {
    /// Active allergies with normalized substances. Inactive allergies are absent.
    fn active_allergies(&self, patient_id: &str) -> LookupResult<Vec<ActiveAllergy>>;

    /// Normalized (lower-cased, trimmed) active substances.
    fn active_substances(&self, patient_id: &str) -> LookupResult<BTreeSet<String>> {
        Ok(self
            .active_allergies(patient_id)?
            .into_iter()
            .map(|a| a.substance)
            .collect())
    }
}

/// A patient's currently active prescriptions.
pub trait ActiveMedicationSet {
    /// Medication ids of active prescriptions, optionally leaving one
    /// prescription out (when re-checking that prescription itself).
    fn active_medication_ids(
        &self,
        patient_id: &str,
        excluding_prescription_id: Option<&str>,
    ) -> LookupResult<BTreeSet<String>>;
}

/// Everything the evaluator needs, from one consistent source.
pub trait SafetySources:
    ClinicalDirectory + InteractionCatalog + AllergyRegistry + ActiveMedicationSet
{
}

impl<T> SafetySources for T where
    T: ClinicalDirectory + InteractionCatalog + AllergyRegistry + ActiveMedicationSet
{
}

/// Decides whether an allergy substance applies to a medication.
pub trait AllergyMatcher: Send + Sync {
    /// `substance` is already normalized.
    fn matches(&self, substance: &str, medication: &Medication) -> bool;
}

/// Case-insensitive containment against the medication's generic name, brand
/// name, drug class and ingredients.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstanceMatcher;

impl AllergyMatcher for SubstanceMatcher {
    fn matches(&self, substance: &str, medication: &Medication) -> bool {
        let substance = normalize_term(substance);
        if substance.is_empty() {
            return false;
        }
        medication
            .match_terms()
            .iter()
            .any(|term| term.contains(substance.as_str()) || substance.contains(term.as_str()))
    }
}
