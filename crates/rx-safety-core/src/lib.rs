//! Rx Safety Core Library
//!
//! Medication safety engine: decides whether a prescription is safe to write,
//! and gates persistence behind an audited override when it is not.
//!
//! # Architecture
//!
//! ```text
//! PrescriptionRequest ──→ Validating
//!                              │
//!                  ┌───────────▼────────────┐   BEGIN IMMEDIATE
//!                  │       Evaluating       │
//!                  │  allergies  ─┐         │
//!                  │  active Rx  ─┼→ classify → SafetyReport
//!                  │  interactions┘         │
//!                  └───────────┬────────────┘
//!                              │
//!          ┌───────────────────┼────────────────────────┐
//!          ▼                   ▼                        ▼
//!      Committing     CommittingWithOverride         Blocked
//!          │                   │                        │
//!          └─────────┬─────────┘                        ▼
//!                    ▼                          SafetyAlert(report)
//!      prescription (+ override) + audit entry
//!                 COMMIT
//! ```
//!
//! # Core Principle
//!
//! **A blocking alert is never committed without a documented override.** The
//! report that decides the branch is computed inside the same transaction
//! that commits it.
//!
//! # Modules
//!
//! - [`db`]: SQLite storage and the transaction-scoped [`db::ClinicalStore`]
//! - [`models`]: Domain types (Medication, Allergy, SafetyReport, etc.)
//! - [`safety`]: Lookups, risk classifier, evaluator, alternatives
//! - [`workflow`]: Prescription state machine and atomic commit
//! - [`audit`]: Hash-chained audit log
//! - [`engine`]: Thread-safe facade

pub mod audit;
pub mod config;
pub mod db;
pub mod engine;
pub mod models;
pub mod safety;
pub mod workflow;

// Re-export commonly used types
pub use audit::{AuditEvent, AuditSink, ChainStatus, HashChainAuditLog};
pub use config::SafetyConfig;
pub use db::Database;
pub use engine::{EngineError, RxSafetyEngine};
pub use models::{
    Allergy, AllergySeverity, AllergyType, CommittedPrescription, InteractionRule, Medication,
    OverrideRequest, Patient, Prescription, PrescriptionOverride, PrescriptionRequest, RiskLevel,
    SafetyAlert, SafetyReport, SeverityLevel,
};
pub use safety::{AlternativeContext, AlternativeMedication, ClassifierPolicy, SafetyEvaluator};
pub use workflow::{PrescriptionWorkflow, WorkflowError, WorkflowState};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::Arc;

use models::InteractionType;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum RxSafetyError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Blocked by safety alerts; the payload is the report as JSON
    #[error("Safety alert: {0}")]
    SafetyAlert(String),

    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("Lookup error: {0}")]
    LookupError(String),

    #[error("Audit error: {0}")]
    AuditError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<WorkflowError> for RxSafetyError {
    fn from(e: WorkflowError) -> Self {
        match e {
            WorkflowError::Validation(msg) => RxSafetyError::InvalidInput(msg),
            WorkflowError::NotFound(msg) => RxSafetyError::NotFound(msg),
            WorkflowError::SafetyAlert(report) => match report.to_canonical_json() {
                Ok(json) => RxSafetyError::SafetyAlert(json),
                Err(e) => RxSafetyError::SerializationError(e.to_string()),
            },
            WorkflowError::Persistence(msg) => RxSafetyError::DatabaseError(msg),
            WorkflowError::Unavailable(msg) => RxSafetyError::DatabaseError(msg),
            WorkflowError::ConcurrencyConflict(msg) => RxSafetyError::ConcurrencyConflict(msg),
            WorkflowError::Lookup(e) => RxSafetyError::LookupError(e.to_string()),
        }
    }
}

impl From<EngineError> for RxSafetyError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Config(e) => RxSafetyError::InvalidInput(e.to_string()),
            EngineError::Database(e) => RxSafetyError::DatabaseError(e.to_string()),
        }
    }
}

impl From<config::ConfigError> for RxSafetyError {
    fn from(e: config::ConfigError) -> Self {
        RxSafetyError::InvalidInput(e.to_string())
    }
}

impl From<audit::AuditError> for RxSafetyError {
    fn from(e: audit::AuditError) -> Self {
        RxSafetyError::AuditError(e.to_string())
    }
}

impl From<serde_json::Error> for RxSafetyError {
    fn from(e: serde_json::Error) -> Self {
        RxSafetyError::SerializationError(e.to_string())
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path with default settings.
#[uniffi::export]
pub fn open_database(path: String) -> Result<Arc<RxSafetyCore>, RxSafetyError> {
    let engine = RxSafetyEngine::open(&path, SafetyConfig::default())?;
    Ok(Arc::new(RxSafetyCore { engine }))
}

/// Open or create a database with settings given as JSON.
#[uniffi::export]
pub fn open_database_with_config(
    path: String,
    config_json: String,
) -> Result<Arc<RxSafetyCore>, RxSafetyError> {
    let config = SafetyConfig::from_json_str(&config_json)?;
    let engine = RxSafetyEngine::open(&path, config)?;
    Ok(Arc::new(RxSafetyCore { engine }))
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<RxSafetyCore>, RxSafetyError> {
    let engine = RxSafetyEngine::open_in_memory(SafetyConfig::default())?;
    Ok(Arc::new(RxSafetyCore { engine }))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe engine wrapper for FFI.
#[derive(uniffi::Object)]
pub struct RxSafetyCore {
    engine: RxSafetyEngine,
}

#[uniffi::export]
impl RxSafetyCore {
    // =========================================================================
    // Reference Data
    // =========================================================================

    /// Add or update a catalog medication.
    pub fn upsert_medication(&self, medication: FfiMedication) -> Result<(), RxSafetyError> {
        self.engine.upsert_medication(&medication.into())?;
        Ok(())
    }

    /// Get a catalog medication by id.
    pub fn get_medication(
        &self,
        medication_id: String,
    ) -> Result<Option<FfiMedication>, RxSafetyError> {
        let medication = self.engine.get_medication(&medication_id)?;
        Ok(medication.map(|m| m.into()))
    }

    /// Add an interaction rule. Returns the new rule id.
    pub fn add_interaction_rule(&self, rule: FfiInteractionRule) -> Result<String, RxSafetyError> {
        let rule = InteractionRule::try_from(rule)?;
        self.engine.add_interaction_rule(&rule)?;
        Ok(rule.rule_id)
    }

    /// Retire an interaction rule so it no longer matches.
    pub fn retire_interaction_rule(&self, rule_id: String) -> Result<bool, RxSafetyError> {
        Ok(self.engine.retire_interaction_rule(&rule_id)?)
    }

    /// Create a new patient. Returns the patient id.
    pub fn create_patient(&self, name: String) -> Result<String, RxSafetyError> {
        Ok(self.engine.create_patient(&name)?.patient_id)
    }

    /// Record an active allergy. Returns the allergy id.
    pub fn add_allergy(&self, allergy: FfiAllergy) -> Result<String, RxSafetyError> {
        let allergy = Allergy::try_from(allergy)?;
        self.engine.add_allergy(&allergy)?;
        Ok(allergy.allergy_id)
    }

    pub fn deactivate_allergy(&self, allergy_id: String) -> Result<bool, RxSafetyError> {
        Ok(self.engine.deactivate_allergy(&allergy_id)?)
    }

    // =========================================================================
    // Safety Operations
    // =========================================================================

    /// Evaluate a candidate prescription without writing anything.
    pub fn evaluate(
        &self,
        request: FfiPrescriptionRequest,
    ) -> Result<FfiSafetyReport, RxSafetyError> {
        let report = self.engine.evaluate(&request.into())?;
        Ok(report.into())
    }

    /// Create a prescription. Fails with `SafetyAlert` when blocked.
    pub fn prescribe(
        &self,
        request: FfiPrescriptionRequest,
        override_request: Option<FfiOverrideRequest>,
    ) -> Result<FfiCommittedPrescription, RxSafetyError> {
        let override_request: Option<OverrideRequest> = override_request.map(|o| o.into());
        let committed = self
            .engine
            .prescribe(&request.into(), override_request.as_ref())?;
        Ok(committed.into())
    }

    /// Same-class substitutes that would not need an override.
    pub fn find_alternatives(
        &self,
        medication_id: String,
        patient_id: String,
        therapeutic_class: Option<String>,
        excluding_prescription_id: Option<String>,
    ) -> Result<Vec<FfiAlternative>, RxSafetyError> {
        let context = AlternativeContext {
            patient_id,
            excluding_prescription_id,
            therapeutic_class,
        };
        let found = self.engine.find_alternatives(&medication_id, &context)?;
        Ok(found.into_iter().map(|a| a.into()).collect())
    }

    /// Re-check a stored prescription against the patient's other active medications.
    pub fn evaluate_existing(
        &self,
        prescription_id: String,
    ) -> Result<FfiSafetyReport, RxSafetyError> {
        Ok(self.engine.evaluate_existing(&prescription_id)?.into())
    }

    pub fn discontinue_prescription(&self, prescription_id: String) -> Result<bool, RxSafetyError> {
        Ok(self.engine.discontinue_prescription(&prescription_id)?)
    }

    pub fn get_override(
        &self,
        prescription_id: String,
    ) -> Result<Option<FfiPrescriptionOverride>, RxSafetyError> {
        let record = self.engine.get_override(&prescription_id)?;
        Ok(record.map(|r| r.into()))
    }

    pub fn overrides_for_patient(
        &self,
        patient_id: String,
    ) -> Result<Vec<FfiPrescriptionOverride>, RxSafetyError> {
        let records = self.engine.overrides_for_patient(&patient_id)?;
        Ok(records.into_iter().map(|r| r.into()).collect())
    }

    // =========================================================================
    // Audit
    // =========================================================================

    /// Verify the audit hash chain end to end.
    pub fn verify_audit_chain(&self) -> Result<FfiChainStatus, RxSafetyError> {
        Ok(self.engine.verify_audit_chain()?.into())
    }

    /// Audit events for a prescription as JSON.
    pub fn audit_trail_json(&self, prescription_id: String) -> Result<String, RxSafetyError> {
        let events = self.engine.audit_trail(&prescription_id)?;
        Ok(serde_json::to_string(&events)?)
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe medication.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMedication {
    pub medication_id: String,
    pub generic_name: String,
    pub brand_name: Option<String>,
    pub drug_class: Option<String>,
    pub therapeutic_class: Option<String>,
    pub ingredients: Vec<String>,
    pub controlled_substance: bool,
    pub schedule: Option<String>,
    pub active: bool,
}

impl From<Medication> for FfiMedication {
    fn from(med: Medication) -> Self {
        Self {
            medication_id: med.medication_id,
            generic_name: med.generic_name,
            brand_name: med.brand_name,
            drug_class: med.drug_class,
            therapeutic_class: med.therapeutic_class,
            ingredients: med.ingredients,
            controlled_substance: med.controlled_substance,
            schedule: med.schedule,
            active: med.active,
        }
    }
}

impl From<FfiMedication> for Medication {
    fn from(med: FfiMedication) -> Self {
        Medication {
            medication_id: med.medication_id,
            generic_name: med.generic_name,
            brand_name: med.brand_name,
            drug_class: med.drug_class,
            therapeutic_class: med.therapeutic_class,
            ingredients: med.ingredients,
            controlled_substance: med.controlled_substance,
            schedule: med.schedule,
            active: med.active,
        }
    }
}

/// FFI-safe interaction rule input.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiInteractionRule {
    pub medication_a_id: String,
    pub medication_b_id: String,
    /// 1 (minor) through 4 (contraindicated)
    pub severity_level: u8,
    /// "pharmacodynamic", "pharmacokinetic" or "other"
    pub interaction_type: String,
    pub contraindicated: bool,
    pub description: String,
}

impl TryFrom<FfiInteractionRule> for InteractionRule {
    type Error = RxSafetyError;

    fn try_from(rule: FfiInteractionRule) -> Result<Self, Self::Error> {
        let severity = SeverityLevel::from_level(rule.severity_level).ok_or_else(|| {
            RxSafetyError::InvalidInput(format!("severity level {}", rule.severity_level))
        })?;
        let interaction_type = InteractionType::parse(&rule.interaction_type).ok_or_else(|| {
            RxSafetyError::InvalidInput(format!("interaction type {}", rule.interaction_type))
        })?;
        let mut converted = InteractionRule::new(
            rule.medication_a_id,
            rule.medication_b_id,
            severity,
            rule.contraindicated,
            rule.description,
        );
        converted.interaction_type = interaction_type;
        Ok(converted)
    }
}

/// FFI-safe allergy input.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAllergy {
    pub patient_id: String,
    pub substance: String,
    /// "drug", "food" or "environmental"
    pub allergy_type: String,
    /// "mild", "moderate", "severe" or "life_threatening"
    pub severity: String,
}

impl TryFrom<FfiAllergy> for Allergy {
    type Error = RxSafetyError;

    fn try_from(allergy: FfiAllergy) -> Result<Self, Self::Error> {
        let allergy_type = AllergyType::parse(&allergy.allergy_type).ok_or_else(|| {
            RxSafetyError::InvalidInput(format!("allergy type {}", allergy.allergy_type))
        })?;
        let severity = AllergySeverity::parse(&allergy.severity).ok_or_else(|| {
            RxSafetyError::InvalidInput(format!("allergy severity {}", allergy.severity))
        })?;
        Ok(Allergy::new(
            allergy.patient_id,
            allergy.substance,
            allergy_type,
            severity,
        ))
    }
}

/// FFI-safe prescription request.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPrescriptionRequest {
    pub patient_id: String,
    pub medication_id: String,
    pub prescriber_id: String,
    pub dose: String,
    pub frequency: String,
    pub route: Option<String>,
    pub duration: Option<String>,
    pub quantity: Option<u32>,
    pub refills: Option<u32>,
    pub instructions: Option<String>,
}

impl From<FfiPrescriptionRequest> for PrescriptionRequest {
    fn from(req: FfiPrescriptionRequest) -> Self {
        PrescriptionRequest {
            patient_id: req.patient_id,
            medication_id: req.medication_id,
            prescriber_id: req.prescriber_id,
            dose: req.dose,
            frequency: req.frequency,
            route: req.route,
            duration: req.duration,
            quantity: req.quantity,
            refills: req.refills,
            instructions: req.instructions,
        }
    }
}

/// FFI-safe override request.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiOverrideRequest {
    pub reason: String,
    pub clinical_justification: Option<String>,
    pub monitoring_plan: Option<String>,
}

impl From<FfiOverrideRequest> for OverrideRequest {
    fn from(req: FfiOverrideRequest) -> Self {
        OverrideRequest {
            reason: req.reason,
            clinical_justification: req.clinical_justification,
            monitoring_plan: req.monitoring_plan,
        }
    }
}

/// FFI-safe safety alert.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSafetyAlert {
    pub alert_id: String,
    /// "drug_drug" or "drug_allergy"
    pub kind: String,
    pub medication_id: String,
    /// Interacting medication for drug-drug alerts
    pub interacting_medication_id: Option<String>,
    /// Allergy id for drug-allergy alerts
    pub allergy_id: Option<String>,
    pub severity: String,
    pub contraindicated: bool,
    pub blocking: bool,
    pub message: String,
}

impl From<SafetyAlert> for FfiSafetyAlert {
    fn from(alert: SafetyAlert) -> Self {
        let (interacting_medication_id, allergy_id) = match &alert.kind {
            models::AlertKind::DrugDrug {
                interacting_medication_id,
                ..
            } => (Some(interacting_medication_id.clone()), None),
            models::AlertKind::DrugAllergy { allergy_id, .. } => (None, Some(allergy_id.clone())),
        };
        Self {
            kind: alert.kind.as_str().to_string(),
            alert_id: alert.alert_id,
            medication_id: alert.medication_id,
            interacting_medication_id,
            allergy_id,
            severity: alert.severity.as_str().to_string(),
            contraindicated: alert.contraindicated,
            blocking: alert.blocking,
            message: alert.message,
        }
    }
}

/// FFI-safe safety report.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSafetyReport {
    pub patient_id: String,
    pub medication_id: String,
    pub compared_medication_ids: Vec<String>,
    pub alerts: Vec<FfiSafetyAlert>,
    pub overall_risk_level: String,
    pub requires_override: bool,
}

impl From<SafetyReport> for FfiSafetyReport {
    fn from(report: SafetyReport) -> Self {
        Self {
            patient_id: report.patient_id,
            medication_id: report.medication_id,
            compared_medication_ids: report.compared_medication_ids,
            alerts: report.alerts.into_iter().map(|a| a.into()).collect(),
            overall_risk_level: report.overall_risk_level.as_str().to_string(),
            requires_override: report.requires_override,
        }
    }
}

/// FFI-safe prescription.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPrescription {
    pub prescription_id: String,
    pub patient_id: String,
    pub medication_id: String,
    pub prescriber_id: String,
    pub dose: String,
    pub frequency: String,
    pub status: String,
    pub risk_level: String,
    pub override_used: bool,
    pub prescribed_at: String,
}

impl From<Prescription> for FfiPrescription {
    fn from(rx: Prescription) -> Self {
        Self {
            prescription_id: rx.prescription_id,
            patient_id: rx.patient_id,
            medication_id: rx.medication_id,
            prescriber_id: rx.prescriber_id,
            dose: rx.dose,
            frequency: rx.frequency,
            status: rx.status.as_str().to_string(),
            risk_level: rx.risk_level.as_str().to_string(),
            override_used: rx.override_used,
            prescribed_at: rx.prescribed_at,
        }
    }
}

/// FFI-safe override record.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPrescriptionOverride {
    pub override_id: String,
    pub prescription_id: String,
    pub overridden_alert_ids: Vec<String>,
    pub override_reason: String,
    pub clinical_justification: Option<String>,
    pub monitoring_plan: Option<String>,
    pub provider_id: String,
    pub override_date: String,
}

impl From<PrescriptionOverride> for FfiPrescriptionOverride {
    fn from(record: PrescriptionOverride) -> Self {
        Self {
            override_id: record.override_id,
            prescription_id: record.prescription_id,
            overridden_alert_ids: record.overridden_alert_ids,
            override_reason: record.override_reason,
            clinical_justification: record.clinical_justification,
            monitoring_plan: record.monitoring_plan,
            provider_id: record.provider_id,
            override_date: record.override_date,
        }
    }
}

/// FFI-safe commit result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCommittedPrescription {
    pub prescription: FfiPrescription,
    pub override_record: Option<FfiPrescriptionOverride>,
    pub report: FfiSafetyReport,
}

impl From<CommittedPrescription> for FfiCommittedPrescription {
    fn from(committed: CommittedPrescription) -> Self {
        Self {
            prescription: committed.prescription.into(),
            override_record: committed.override_record.map(|r| r.into()),
            report: committed.report.into(),
        }
    }
}

/// FFI-safe alternative.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAlternative {
    pub medication: FfiMedication,
    pub overall_risk_level: String,
    pub alert_count: u32,
}

impl From<AlternativeMedication> for FfiAlternative {
    fn from(alt: AlternativeMedication) -> Self {
        Self {
            medication: alt.medication.into(),
            overall_risk_level: alt.overall_risk_level.as_str().to_string(),
            alert_count: alt.alert_count as u32,
        }
    }
}

/// FFI-safe audit chain status.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiChainStatus {
    pub entry_count: u64,
    pub head_hash: Option<String>,
}

impl From<ChainStatus> for FfiChainStatus {
    fn from(status: ChainStatus) -> Self {
        Self {
            entry_count: status.entry_count,
            head_hash: status.head_hash,
        }
    }
}
