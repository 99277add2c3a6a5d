//! Prescription creation gated by the safety evaluation.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditSink};
use crate::config::SafetyConfig;
use crate::db::{ClinicalStore, Database};
use crate::models::{
    CommittedPrescription, OverrideRequest, Prescription, PrescriptionOverride,
    PrescriptionRequest, SafetyReport,
};
use crate::safety::{
    AllergyMatcher, AlternativeContext, AlternativeFinder, AlternativeMedication,
    SafetyEvaluator, SubstanceMatcher,
};

use super::{WorkflowError, WorkflowResult, WorkflowState};

/// Runs prescriptions through validation, evaluation and commit.
pub struct PrescriptionWorkflow {
    config: SafetyConfig,
    audit: Arc<dyn AuditSink>,
    matcher: Arc<dyn AllergyMatcher>,
}

impl PrescriptionWorkflow {
    pub fn new(config: SafetyConfig, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            config,
            audit,
            matcher: Arc::new(SubstanceMatcher),
        }
    }

    /// Replace the allergy matcher.
    pub fn with_matcher(mut self, matcher: Arc<dyn AllergyMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    /// Evaluate a candidate without writing anything.
    ///
    /// Reads run in one deferred transaction so the report reflects a single
    /// snapshot. The write lock is never taken.
    #[tracing::instrument(skip_all, fields(patient_id = %request.patient_id, medication_id = %request.medication_id))]
    pub fn evaluate(
        &self,
        db: &mut Database,
        request: &PrescriptionRequest,
    ) -> WorkflowResult<SafetyReport> {
        require_field("patient_id", &request.patient_id)?;
        require_field("medication_id", &request.medication_id)?;

        let tx = db.transaction()?;
        let store = ClinicalStore::new(&tx);
        let report = self
            .evaluator(&store)
            .evaluate(request.patient_id.trim(), request.medication_id.trim())?;
        Ok(report)
    }

    /// Re-check a stored prescription against the patient's other active
    /// medications.
    #[tracing::instrument(skip(self, db))]
    pub fn evaluate_existing(
        &self,
        db: &mut Database,
        prescription_id: &str,
    ) -> WorkflowResult<SafetyReport> {
        let tx = db.transaction()?;
        let store = ClinicalStore::new(&tx);
        let prescription = store
            .get_prescription(prescription_id)?
            .ok_or_else(|| WorkflowError::NotFound(format!("prescription {}", prescription_id)))?;

        let report = self.evaluator(&store).evaluate_excluding(
            &prescription.patient_id,
            &prescription.medication_id,
            Some(&prescription.prescription_id),
        )?;
        Ok(report)
    }

    /// Same-class substitutes that would not need an override.
    #[tracing::instrument(skip(self, db, context), fields(patient_id = %context.patient_id))]
    pub fn find_alternatives(
        &self,
        db: &mut Database,
        medication_id: &str,
        context: &AlternativeContext,
    ) -> WorkflowResult<Vec<AlternativeMedication>> {
        require_field("patient_id", &context.patient_id)?;
        require_field("medication_id", medication_id)?;

        let context = AlternativeContext {
            patient_id: context.patient_id.trim().to_string(),
            ..context.clone()
        };

        let tx = db.transaction()?;
        let store = ClinicalStore::new(&tx);
        let evaluator = self.evaluator(&store);
        let found =
            AlternativeFinder::new(&evaluator).alternatives(medication_id.trim(), &context)?;
        Ok(found)
    }

    /// Validate, evaluate and commit in one write transaction.
    ///
    /// The write lock is taken before the first read, so a concurrent writer
    /// for the same patient either finishes first (and is seen here) or
    /// waits for this call. Blocking alerts without an acceptable override
    /// end in `SafetyAlert` with nothing written. An override supplied when
    /// nothing blocks is ignored.
    #[tracing::instrument(
        skip_all,
        fields(
            patient_id = %request.patient_id,
            medication_id = %request.medication_id,
            with_override = override_request.is_some(),
        )
    )]
    pub fn prescribe(
        &self,
        db: &mut Database,
        request: &PrescriptionRequest,
        override_request: Option<&OverrideRequest>,
    ) -> WorkflowResult<CommittedPrescription> {
        match self.run(db, request, override_request) {
            Ok(committed) => {
                transition(WorkflowState::Committed);
                info!(
                    prescription_id = %committed.prescription.prescription_id,
                    risk = committed.report.overall_risk_level.as_str(),
                    override_used = committed.prescription.override_used,
                    "Prescription committed"
                );
                Ok(committed)
            }
            Err(e) => {
                transition(WorkflowState::Rejected);
                warn!(error_kind = e.kind(), retryable = e.is_retryable(), "Prescription rejected");
                Err(e)
            }
        }
    }

    fn run(
        &self,
        db: &mut Database,
        request: &PrescriptionRequest,
        override_request: Option<&OverrideRequest>,
    ) -> WorkflowResult<CommittedPrescription> {
        transition(WorkflowState::Validating);
        let request = self.validate(request, override_request)?;

        let tx = db.write_transaction()?;

        let committed = {
            let store = ClinicalStore::new(&tx);

            transition(WorkflowState::Evaluating);
            let evaluator = self.evaluator(&store);
            evaluator.require_patient(&request.patient_id)?;
            let medication = evaluator.require_medication(&request.medication_id)?;
            if !medication.active {
                return Err(WorkflowError::Validation(format!(
                    "medication {} is no longer active in the catalog",
                    medication.medication_id
                )));
            }
            let facts = evaluator.gather(&request.patient_id, None)?;
            let report = evaluator.assess(&request.patient_id, &medication, &facts)?;

            let override_to_apply = match (report.requires_override, override_request) {
                (false, _) => {
                    transition(WorkflowState::Committing);
                    None
                }
                (true, Some(ov)) => {
                    transition(WorkflowState::CommittingWithOverride);
                    Some(ov)
                }
                (true, None) => {
                    transition(WorkflowState::Blocked);
                    info!(
                        blocking = report.blocking_alert_ids().len(),
                        risk = report.overall_risk_level.as_str(),
                        "Prescription blocked"
                    );
                    // Dropping the transaction releases the lock with nothing written
                    return Err(WorkflowError::SafetyAlert(Box::new(report)));
                }
            };

            let prescription = Prescription::from_request(
                &request,
                report.overall_risk_level,
                override_to_apply.is_some(),
            );
            let override_record =
                override_to_apply.map(|ov| PrescriptionOverride::new(&prescription, &report, ov));

            store.insert_prescription(&prescription)?;
            if let Some(record) = &override_record {
                store.insert_override(record)?;
            }

            let committed = CommittedPrescription {
                prescription,
                override_record,
                report,
            };
            self.audit
                .emit(&tx, &AuditEvent::for_commit(&committed, &medication))?;
            committed
        };

        tx.commit()?;
        Ok(committed)
    }

    /// Check required fields and the override reason. Returns the request
    /// with identifiers trimmed.
    fn validate(
        &self,
        request: &PrescriptionRequest,
        override_request: Option<&OverrideRequest>,
    ) -> WorkflowResult<PrescriptionRequest> {
        require_field("patient_id", &request.patient_id)?;
        require_field("medication_id", &request.medication_id)?;
        require_field("prescriber_id", &request.prescriber_id)?;
        require_field("dose", &request.dose)?;
        require_field("frequency", &request.frequency)?;

        if let Some(ov) = override_request {
            let len = ov.reason.trim().chars().count();
            if len < self.config.min_override_reason_len {
                return Err(WorkflowError::Validation(format!(
                    "override reason must be at least {} characters",
                    self.config.min_override_reason_len
                )));
            }
        }

        let mut cleaned = request.clone();
        cleaned.patient_id = request.patient_id.trim().to_string();
        cleaned.medication_id = request.medication_id.trim().to_string();
        cleaned.prescriber_id = request.prescriber_id.trim().to_string();
        Ok(cleaned)
    }

    fn evaluator<'a, 'c>(
        &'a self,
        store: &'a ClinicalStore<'c>,
    ) -> SafetyEvaluator<'a, ClinicalStore<'c>> {
        SafetyEvaluator::new(store, self.config.classifier_policy())
            .with_matcher(self.matcher.as_ref())
    }
}

fn require_field(name: &str, value: &str) -> WorkflowResult<()> {
    if value.trim().is_empty() {
        Err(WorkflowError::Validation(format!("{} is required", name)))
    } else {
        Ok(())
    }
}

fn transition(state: WorkflowState) {
    debug!(state = state.as_str(), "Workflow transition");
}
