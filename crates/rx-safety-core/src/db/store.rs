//! Connection-scoped view used by the safety engine.
//!
//! A `ClinicalStore` borrows either the plain connection or an open
//! transaction, so the evaluator can read through the same transaction the
//! workflow later commits.

use std::collections::BTreeSet;

use rusqlite::Connection;

use crate::models::{ActiveAllergy, InteractionRule, Medication};
use crate::safety::{
    ActiveMedicationSet, AllergyRegistry, ClinicalDirectory, InteractionCatalog, LookupResult,
};

/// Read/write access to clinical tables over one connection.
#[derive(Clone, Copy)]
pub struct ClinicalStore<'c> {
    pub(super) conn: &'c Connection,
}

impl<'c> ClinicalStore<'c> {
    /// Wrap a connection or a transaction (via deref).
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl ClinicalDirectory for ClinicalStore<'_> {
    fn get_medication(&self, medication_id: &str) -> LookupResult<Option<Medication>> {
        Ok(ClinicalStore::get_medication(self, medication_id)?)
    }

    fn patient_exists(&self, patient_id: &str) -> LookupResult<bool> {
        Ok(ClinicalStore::patient_exists(self, patient_id)?)
    }
}

impl InteractionCatalog for ClinicalStore<'_> {
    fn lookup(
        &self,
        medication_id: &str,
        candidate_ids: &BTreeSet<String>,
    ) -> LookupResult<Vec<InteractionRule>> {
        Ok(self.interactions_between(medication_id, candidate_ids)?)
    }

    fn medications_in_class(&self, therapeutic_class: &str) -> LookupResult<Vec<Medication>> {
        Ok(ClinicalStore::medications_in_class(self, therapeutic_class)?)
    }
}

impl AllergyRegistry for ClinicalStore<'_> {
    fn active_allergies(&self, patient_id: &str) -> LookupResult<Vec<ActiveAllergy>> {
        Ok(ClinicalStore::active_allergies(self, patient_id)?)
    }
}

impl ActiveMedicationSet for ClinicalStore<'_> {
    fn active_medication_ids(
        &self,
        patient_id: &str,
        excluding_prescription_id: Option<&str>,
    ) -> LookupResult<BTreeSet<String>> {
        Ok(ClinicalStore::active_medication_ids(
            self,
            patient_id,
            excluding_prescription_id,
        )?)
    }
}
