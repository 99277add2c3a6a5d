//! Prescription, request and override models.

use serde::{Deserialize, Serialize};

use super::safety::{RiskLevel, SafetyReport};

/// Lifecycle status of a prescription.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PrescriptionStatus {
    /// Currently taken; participates in interaction checks
    Active,
    /// Stopped by a clinician
    Discontinued,
    /// Never dispensed
    Cancelled,
}

impl PrescriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrescriptionStatus::Active => "active",
            PrescriptionStatus::Discontinued => "discontinued",
            PrescriptionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(PrescriptionStatus::Active),
            "discontinued" => Some(PrescriptionStatus::Discontinued),
            "cancelled" => Some(PrescriptionStatus::Cancelled),
            _ => None,
        }
    }
}

/// A candidate prescription submitted for evaluation or creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PrescriptionRequest {
    pub patient_id: String,
    pub medication_id: String,
    /// Acting provider
    pub prescriber_id: String,
    /// Dose as written, e.g. "500 mg"
    pub dose: String,
    /// Frequency as written, e.g. "TID"
    pub frequency: String,
    pub route: Option<String>,
    pub duration: Option<String>,
    pub quantity: Option<u32>,
    pub refills: Option<u32>,
    pub instructions: Option<String>,
}

/// A provider's decision to proceed despite blocking alerts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OverrideRequest {
    pub reason: String,
    pub clinical_justification: Option<String>,
    pub monitoring_plan: Option<String>,
}

impl OverrideRequest {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            clinical_justification: None,
            monitoring_plan: None,
        }
    }
}

/// A stored prescription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prescription {
    pub prescription_id: String,
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
    pub status: PrescriptionStatus,
    /// Overall risk at the time of writing
    pub risk_level: RiskLevel,
    /// Whether a blocking alert was overridden
    pub override_used: bool,
    pub prescribed_at: String,
}

impl Prescription {
    /// Build an active prescription from a validated request.
    pub fn from_request(request: &PrescriptionRequest, risk_level: RiskLevel, override_used: bool) -> Self {
        Self {
            prescription_id: uuid::Uuid::new_v4().to_string(),
            patient_id: request.patient_id.clone(),
            medication_id: request.medication_id.clone(),
            prescriber_id: request.prescriber_id.clone(),
            dose: request.dose.trim().to_string(),
            frequency: request.frequency.trim().to_string(),
            route: request.route.clone(),
            duration: request.duration.clone(),
            quantity: request.quantity,
            refills: request.refills,
            instructions: request.instructions.clone(),
            status: PrescriptionStatus::Active,
            risk_level,
            override_used,
            prescribed_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Documented override of blocking alerts. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrescriptionOverride {
    pub override_id: String,
    pub prescription_id: String,
    /// Exact alert ids that were blocking at commit time
    pub overridden_alert_ids: Vec<String>,
    pub override_reason: String,
    pub clinical_justification: Option<String>,
    pub monitoring_plan: Option<String>,
    pub provider_id: String,
    pub override_date: String,
}

impl PrescriptionOverride {
    pub fn new(prescription: &Prescription, report: &SafetyReport, request: &OverrideRequest) -> Self {
        Self {
            override_id: uuid::Uuid::new_v4().to_string(),
            prescription_id: prescription.prescription_id.clone(),
            overridden_alert_ids: report.blocking_alert_ids(),
            override_reason: request.reason.trim().to_string(),
            clinical_justification: request.clinical_justification.clone(),
            monitoring_plan: request.monitoring_plan.clone(),
            provider_id: prescription.prescriber_id.clone(),
            override_date: prescription.prescribed_at.clone(),
        }
    }
}

/// Outcome of a successful `prescribe` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommittedPrescription {
    pub prescription: Prescription,
    /// Present iff the report required an override
    pub override_record: Option<PrescriptionOverride>,
    pub report: SafetyReport,
}
