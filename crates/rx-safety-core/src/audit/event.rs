//! Audit event payloads.

use serde::{Deserialize, Serialize};

use crate::models::{CommittedPrescription, Medication, RiskLevel};

/// What happened.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    PrescriptionCommitted,
    PrescriptionCommittedWithOverride,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::PrescriptionCommitted => "prescription_committed",
            AuditAction::PrescriptionCommittedWithOverride => {
                "prescription_committed_with_override"
            }
        }
    }
}

/// One audited prescription commit.
///
/// Carries ids and classifications only. Free text (override reasons,
/// allergy substances) stays in the clinical tables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEvent {
    pub event_id: String,
    pub action: AuditAction,
    pub prescription_id: String,
    pub provider_id: String,
    pub patient_id: String,
    pub medication_id: String,
    pub overall_risk_level: RiskLevel,
    pub override_used: bool,
    pub override_id: Option<String>,
    /// Every alert in the report, in report order
    pub alert_ids: Vec<String>,
    /// Alerts the provider overrode
    pub overridden_alert_ids: Vec<String>,
    pub controlled_substance: bool,
    pub occurred_at: String,
}

impl AuditEvent {
    /// Event for a prescription that is about to be committed.
    pub fn for_commit(committed: &CommittedPrescription, medication: &Medication) -> Self {
        let rx = &committed.prescription;
        let (action, override_id, overridden_alert_ids) = match &committed.override_record {
            Some(record) => (
                AuditAction::PrescriptionCommittedWithOverride,
                Some(record.override_id.clone()),
                record.overridden_alert_ids.clone(),
            ),
            None => (AuditAction::PrescriptionCommitted, None, Vec::new()),
        };

        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            action,
            prescription_id: rx.prescription_id.clone(),
            provider_id: rx.prescriber_id.clone(),
            patient_id: rx.patient_id.clone(),
            medication_id: rx.medication_id.clone(),
            overall_risk_level: committed.report.overall_risk_level,
            override_used: rx.override_used,
            override_id,
            alert_ids: committed.report.alert_ids(),
            overridden_alert_ids,
            controlled_substance: medication.controlled_substance,
            occurred_at: rx.prescribed_at.clone(),
        }
    }

    /// Canonical JSON: field order follows the struct.
    pub fn to_canonical_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
