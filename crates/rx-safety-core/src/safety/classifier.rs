//! Risk classification: raw matches in, ranked report out.
//!
//! Pure and deterministic. Inputs are deduplicated by alert id and the output
//! order depends only on the [`AlertRank`] total order, the alert kind and the
//! alert id.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::models::{
    ActiveAllergy, AlertKind, AlertRank, AllergySeverity, InteractionRule, Medication, RiskLevel,
    SafetyAlert, SafetyReport, SeverityLevel,
};

/// Policy knobs for classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassifierPolicy {
    /// Non-contraindicated alerts at or above this level block.
    pub blocking_threshold: SeverityLevel,
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        Self {
            blocking_threshold: SeverityLevel::Major,
        }
    }
}

impl ClassifierPolicy {
    pub fn is_blocking(&self, rank: AlertRank) -> bool {
        rank.contraindicated || rank.severity >= self.blocking_threshold
    }
}

/// Raw facts for one candidate medication.
#[derive(Debug, Clone, Copy)]
pub struct ClassifierInput<'a> {
    pub patient_id: &'a str,
    pub medication: &'a Medication,
    pub compared_medication_ids: &'a BTreeSet<String>,
    pub interactions: &'a [InteractionRule],
    pub allergy_matches: &'a [ActiveAllergy],
    /// Display names for interacting medications; ids are used when absent
    pub medication_names: &'a BTreeMap<String, String>,
}

/// Numeric level reported for an allergy match.
pub fn allergy_alert_severity(severity: AllergySeverity) -> SeverityLevel {
    match severity {
        AllergySeverity::Mild => SeverityLevel::Moderate,
        AllergySeverity::Moderate => SeverityLevel::Major,
        AllergySeverity::Severe | AllergySeverity::LifeThreatening => {
            SeverityLevel::Contraindicated
        }
    }
}

/// Report order: highest rank first, then allergies before interactions,
/// then alert id.
pub fn compare_alerts(a: &SafetyAlert, b: &SafetyAlert) -> Ordering {
    b.rank()
        .cmp(&a.rank())
        .then_with(|| a.kind.tie_break().cmp(&b.kind.tie_break()))
        .then_with(|| a.alert_id.cmp(&b.alert_id))
}

/// Build the safety report for one candidate.
pub fn classify(input: &ClassifierInput<'_>, policy: &ClassifierPolicy) -> SafetyReport {
    let medication = input.medication;
    let mut by_id: BTreeMap<String, SafetyAlert> = BTreeMap::new();

    for rule in input.interactions {
        let other_id = rule.other_side(&medication.medication_id).to_string();
        let other_name = input
            .medication_names
            .get(&other_id)
            .cloned()
            .unwrap_or_else(|| other_id.clone());
        let rank = rule.rank();
        let alert = SafetyAlert {
            alert_id: format!("ddi:{}", rule.rule_id),
            medication_id: medication.medication_id.clone(),
            kind: AlertKind::DrugDrug {
                rule_id: rule.rule_id.clone(),
                interacting_medication_id: other_id,
                interaction_type: rule.interaction_type,
            },
            severity: rule.severity,
            contraindicated: rule.contraindicated,
            blocking: policy.is_blocking(rank),
            message: drug_drug_message(medication, &other_name, rule),
        };
        by_id.insert(alert.alert_id.clone(), alert);
    }

    for allergy in input.allergy_matches {
        let severity = allergy_alert_severity(allergy.severity);
        // An active allergy match is always contraindicated
        let rank = AlertRank::new(true, severity);
        let alert = SafetyAlert {
            alert_id: format!("allergy:{}", allergy.allergy_id),
            medication_id: medication.medication_id.clone(),
            kind: AlertKind::DrugAllergy {
                allergy_id: allergy.allergy_id.clone(),
                substance: allergy.substance.clone(),
            },
            severity,
            contraindicated: true,
            blocking: policy.is_blocking(rank),
            message: format!(
                "Patient has an active {} allergy to {}; {} matches this allergy",
                allergy.severity.as_str().replace('_', "-"),
                allergy.substance,
                medication.generic_name
            ),
        };
        by_id.insert(alert.alert_id.clone(), alert);
    }

    let mut alerts: Vec<SafetyAlert> = by_id.into_values().collect();
    alerts.sort_by(compare_alerts);

    let overall_risk_level = alerts
        .first()
        .map(|top| RiskLevel::from(top.rank().effective_severity()))
        .unwrap_or(RiskLevel::None);
    let requires_override = alerts.iter().any(|a| a.blocking);

    SafetyReport {
        patient_id: input.patient_id.to_string(),
        medication_id: medication.medication_id.clone(),
        compared_medication_ids: input.compared_medication_ids.iter().cloned().collect(),
        alerts,
        overall_risk_level,
        requires_override,
    }
}

fn drug_drug_message(medication: &Medication, other_name: &str, rule: &InteractionRule) -> String {
    let label = if rule.contraindicated {
        "contraindicated"
    } else {
        rule.severity.as_str()
    };
    if rule.description.trim().is_empty() {
        format!(
            "{} has a {} interaction with active medication {}",
            medication.generic_name, label, other_name
        )
    } else {
        format!(
            "{} has a {} interaction with active medication {}: {}",
            medication.generic_name,
            label,
            other_name,
            rule.description.trim()
        )
    }
}
