//! Thread-safe entry point over one database.
//!
//! All callers in a process share the connection through a mutex. Callers in
//! other processes (or holding other connections to the same file) are
//! serialized by SQLite's write lock, bounded by the configured busy timeout.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

use crate::audit::{
    entries_for_prescription, verify_chain, AuditError, AuditEvent, AuditSink, ChainStatus,
    HashChainAuditLog,
};
use crate::config::{ConfigError, SafetyConfig};
use crate::db::{Database, DbError};
use crate::models::{
    Allergy, CommittedPrescription, InteractionRule, Medication, OverrideRequest, Patient,
    Prescription, PrescriptionOverride, PrescriptionRequest, SafetyReport,
};
use crate::safety::{AllergyMatcher, AlternativeContext, AlternativeMedication};
use crate::workflow::{PrescriptionWorkflow, WorkflowError, WorkflowResult};

/// Errors opening an engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DbError),
}

/// The medication safety engine.
pub struct RxSafetyEngine {
    db: Arc<Mutex<Database>>,
    workflow: PrescriptionWorkflow,
}

impl RxSafetyEngine {
    /// Open (or create) a database file with the hash-chained audit log.
    pub fn open<P: AsRef<Path>>(path: P, config: SafetyConfig) -> Result<Self, EngineError> {
        Self::open_with_sink(path, config, Arc::new(HashChainAuditLog))
    }

    pub fn open_with_sink<P: AsRef<Path>>(
        path: P,
        config: SafetyConfig,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let db = Database::open_with_timeout(path, config.busy_timeout())?;
        Ok(Self::from_database(db, config, audit))
    }

    /// In-memory engine (for testing).
    pub fn open_in_memory(config: SafetyConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let db = Database::open_in_memory()?;
        Ok(Self::from_database(db, config, Arc::new(HashChainAuditLog)))
    }

    pub fn from_database(db: Database, config: SafetyConfig, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            workflow: PrescriptionWorkflow::new(config, audit),
        }
    }

    /// Replace the allergy matcher.
    pub fn with_matcher(mut self, matcher: Arc<dyn AllergyMatcher>) -> Self {
        self.workflow = self.workflow.with_matcher(matcher);
        self
    }

    pub fn config(&self) -> &SafetyConfig {
        self.workflow.config()
    }

    fn lock(&self) -> WorkflowResult<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|e| WorkflowError::Unavailable(format!("Lock poisoned: {}", e)))
    }

    // =========================================================================
    // Safety operations
    // =========================================================================

    /// Evaluate a candidate prescription without writing anything.
    pub fn evaluate(&self, request: &PrescriptionRequest) -> WorkflowResult<SafetyReport> {
        let mut db = self.lock()?;
        self.workflow.evaluate(&mut db, request)
    }

    /// Create a prescription, or fail with `SafetyAlert` when it is blocked
    /// and no override was supplied.
    pub fn prescribe(
        &self,
        request: &PrescriptionRequest,
        override_request: Option<&OverrideRequest>,
    ) -> WorkflowResult<CommittedPrescription> {
        let mut db = self.lock()?;
        self.workflow.prescribe(&mut db, request, override_request)
    }

    pub fn find_alternatives(
        &self,
        medication_id: &str,
        context: &AlternativeContext,
    ) -> WorkflowResult<Vec<AlternativeMedication>> {
        let mut db = self.lock()?;
        self.workflow.find_alternatives(&mut db, medication_id, context)
    }

    /// Re-check a stored prescription against the patient's other active
    /// medications.
    pub fn evaluate_existing(&self, prescription_id: &str) -> WorkflowResult<SafetyReport> {
        let mut db = self.lock()?;
        self.workflow.evaluate_existing(&mut db, prescription_id)
    }

    pub fn get_prescription(&self, prescription_id: &str) -> WorkflowResult<Option<Prescription>> {
        Ok(self.lock()?.get_prescription(prescription_id)?)
    }

    pub fn list_prescriptions(&self, patient_id: &str) -> WorkflowResult<Vec<Prescription>> {
        Ok(self.lock()?.list_prescriptions_for_patient(patient_id)?)
    }

    /// Stop an active prescription. Returns false if it was not active.
    pub fn discontinue_prescription(&self, prescription_id: &str) -> WorkflowResult<bool> {
        Ok(self.lock()?.discontinue_prescription(prescription_id)?)
    }

    pub fn get_override(
        &self,
        prescription_id: &str,
    ) -> WorkflowResult<Option<PrescriptionOverride>> {
        Ok(self.lock()?.get_override(prescription_id)?)
    }

    pub fn overrides_for_patient(&self, patient_id: &str) -> WorkflowResult<Vec<PrescriptionOverride>> {
        Ok(self.lock()?.overrides_for_patient(patient_id)?)
    }

    // =========================================================================
    // Audit
    // =========================================================================

    pub fn verify_audit_chain(&self) -> Result<ChainStatus, AuditError> {
        let db = self
            .db
            .lock()
            .map_err(|e| AuditError::Unavailable(format!("Lock poisoned: {}", e)))?;
        verify_chain(db.conn())
    }

    /// Audit events recorded for one prescription, oldest first.
    pub fn audit_trail(&self, prescription_id: &str) -> Result<Vec<AuditEvent>, AuditError> {
        let db = self
            .db
            .lock()
            .map_err(|e| AuditError::Unavailable(format!("Lock poisoned: {}", e)))?;
        entries_for_prescription(db.conn(), prescription_id)?
            .iter()
            .map(|entry| entry.event())
            .collect()
    }

    // =========================================================================
    // Reference data
    // =========================================================================

    pub fn upsert_medication(&self, medication: &Medication) -> WorkflowResult<()> {
        Ok(self.lock()?.upsert_medication(medication)?)
    }

    pub fn get_medication(&self, medication_id: &str) -> WorkflowResult<Option<Medication>> {
        Ok(self.lock()?.get_medication(medication_id)?)
    }

    pub fn add_interaction_rule(&self, rule: &InteractionRule) -> WorkflowResult<()> {
        Ok(self.lock()?.insert_interaction_rule(rule)?)
    }

    pub fn retire_interaction_rule(&self, rule_id: &str) -> WorkflowResult<bool> {
        Ok(self.lock()?.retire_interaction_rule(rule_id)?)
    }

    pub fn create_patient(&self, name: &str) -> WorkflowResult<Patient> {
        if name.trim().is_empty() {
            return Err(WorkflowError::Validation("name is required".into()));
        }
        let patient = Patient::new(name.trim().to_string());
        self.lock()?.insert_patient(&patient)?;
        Ok(patient)
    }

    pub fn get_patient(&self, patient_id: &str) -> WorkflowResult<Option<Patient>> {
        Ok(self.lock()?.get_patient(patient_id)?)
    }

    pub fn add_allergy(&self, allergy: &Allergy) -> WorkflowResult<()> {
        if allergy.substance.trim().is_empty() {
            return Err(WorkflowError::Validation("substance is required".into()));
        }
        Ok(self.lock()?.insert_allergy(allergy)?)
    }

    pub fn deactivate_allergy(&self, allergy_id: &str) -> WorkflowResult<bool> {
        Ok(self.lock()?.deactivate_allergy(allergy_id)?)
    }

    pub fn list_allergies(&self, patient_id: &str) -> WorkflowResult<Vec<Allergy>> {
        Ok(self.lock()?.list_allergies(patient_id)?)
    }

    /// Record an existing prescription without a safety check.
    pub fn import_prescription(&self, prescription: &Prescription) -> WorkflowResult<()> {
        Ok(self.lock()?.import_prescription(prescription)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SeverityLevel;

    #[test]
    fn test_open_rejects_invalid_config() {
        let config = SafetyConfig {
            busy_timeout_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            RxSafetyEngine::open_in_memory(config),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_poisoned_lock_is_not_retryable() {
        let engine = RxSafetyEngine::open_in_memory(SafetyConfig::default()).unwrap();
        let db = Arc::clone(&engine.db);
        let _ = std::thread::spawn(move || {
            let _guard = db.lock().unwrap();
            panic!("writer died holding the lock");
        })
        .join();

        let err = engine.get_patient("anyone").unwrap_err();
        assert!(matches!(err, WorkflowError::Unavailable(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_engine_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RxSafetyEngine>();
    }

    #[test]
    fn test_reference_data_round_trip() {
        let engine = RxSafetyEngine::open_in_memory(SafetyConfig::default()).unwrap();
        let patient = engine.create_patient(" Ada ").unwrap();
        assert_eq!(engine.get_patient(&patient.patient_id).unwrap().unwrap().name, "Ada");
        assert!(matches!(engine.create_patient(""), Err(WorkflowError::Validation(_))));

        engine
            .upsert_medication(&Medication::new("MED-A".into(), "Alpha".into()))
            .unwrap();
        engine
            .upsert_medication(&Medication::new("MED-B".into(), "Beta".into()))
            .unwrap();
        let rule = InteractionRule::new(
            "MED-A".into(),
            "MED-B".into(),
            SeverityLevel::Minor,
            false,
            String::new(),
        );
        engine.add_interaction_rule(&rule).unwrap();
        assert!(engine.retire_interaction_rule(&rule.rule_id).unwrap());
        assert!(!engine.retire_interaction_rule("missing").unwrap());
    }
}
