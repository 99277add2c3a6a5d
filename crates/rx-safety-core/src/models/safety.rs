//! Safety alerts and reports produced by the evaluator.

use serde::{Deserialize, Serialize};

use super::interaction::{AlertRank, InteractionType, SeverityLevel};

/// What triggered an alert. Closed set: every kind is ranked and serialized explicitly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertKind {
    /// The candidate interacts with one of the patient's active medications.
    DrugDrug {
        rule_id: String,
        interacting_medication_id: String,
        interaction_type: InteractionType,
    },
    /// The candidate matches one of the patient's active allergies.
    DrugAllergy {
        allergy_id: String,
        substance: String,
    },
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::DrugDrug { .. } => "drug_drug",
            AlertKind::DrugAllergy { .. } => "drug_allergy",
        }
    }

    /// Tie-break order between kinds of equal rank; allergies sort first.
    pub(crate) fn tie_break(&self) -> u8 {
        match self {
            AlertKind::DrugAllergy { .. } => 0,
            AlertKind::DrugDrug { .. } => 1,
        }
    }
}

/// A single safety finding for a candidate prescription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SafetyAlert {
    /// Stable id: `ddi:<rule_id>` or `allergy:<allergy_id>`
    pub alert_id: String,
    /// Candidate medication the alert is about
    pub medication_id: String,
    #[serde(flatten)]
    pub kind: AlertKind,
    pub severity: SeverityLevel,
    pub contraindicated: bool,
    /// True when this alert alone forces an override
    pub blocking: bool,
    pub message: String,
}

impl SafetyAlert {
    pub fn rank(&self) -> AlertRank {
        AlertRank::new(self.contraindicated, self.severity)
    }
}

/// Overall risk of a candidate prescription.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    None,
    Minor,
    Moderate,
    Major,
    Contraindicated,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::None => "none",
            RiskLevel::Minor => "minor",
            RiskLevel::Moderate => "moderate",
            RiskLevel::Major => "major",
            RiskLevel::Contraindicated => "contraindicated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(RiskLevel::None),
            "minor" => Some(RiskLevel::Minor),
            "moderate" => Some(RiskLevel::Moderate),
            "major" => Some(RiskLevel::Major),
            "contraindicated" => Some(RiskLevel::Contraindicated),
            _ => None,
        }
    }
}

impl From<SeverityLevel> for RiskLevel {
    fn from(severity: SeverityLevel) -> Self {
        match severity {
            SeverityLevel::Minor => RiskLevel::Minor,
            SeverityLevel::Moderate => RiskLevel::Moderate,
            SeverityLevel::Major => RiskLevel::Major,
            SeverityLevel::Contraindicated => RiskLevel::Contraindicated,
        }
    }
}

/// Result of evaluating one candidate prescription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SafetyReport {
    pub patient_id: String,
    pub medication_id: String,
    /// Active medications the candidate was checked against, sorted
    pub compared_medication_ids: Vec<String>,
    /// Highest rank first
    pub alerts: Vec<SafetyAlert>,
    pub overall_risk_level: RiskLevel,
    pub requires_override: bool,
}

impl SafetyReport {
    /// True when there is nothing to warn about.
    pub fn is_clear(&self) -> bool {
        self.alerts.is_empty()
    }

    /// Ids of the alerts that force an override, in report order.
    pub fn blocking_alert_ids(&self) -> Vec<String> {
        self.alerts
            .iter()
            .filter(|a| a.blocking)
            .map(|a| a.alert_id.clone())
            .collect()
    }

    pub fn alert_ids(&self) -> Vec<String> {
        self.alerts.iter().map(|a| a.alert_id.clone()).collect()
    }

    /// Serialize to canonical JSON. Field order follows the struct, so equal
    /// reports serialize to identical bytes.
    pub fn to_canonical_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allergy_alert(blocking: bool) -> SafetyAlert {
        SafetyAlert {
            alert_id: "allergy:a1".into(),
            medication_id: "MED-AMOX".into(),
            kind: AlertKind::DrugAllergy {
                allergy_id: "a1".into(),
                substance: "penicillin".into(),
            },
            severity: SeverityLevel::Major,
            contraindicated: true,
            blocking,
            message: "Patient is allergic to penicillin".into(),
        }
    }

    #[test]
    fn test_alert_kind_serialized_as_tag() {
        let json = serde_json::to_value(allergy_alert(true)).unwrap();
        assert_eq!(json["kind"], "drug_allergy");
        assert_eq!(json["substance"], "penicillin");
        assert_eq!(json["severity"], "major");

        let back: SafetyAlert = serde_json::from_value(json).unwrap();
        assert_eq!(back, allergy_alert(true));
    }

    #[test]
    fn test_blocking_alert_ids() {
        let mut minor = allergy_alert(false);
        minor.alert_id = "allergy:a2".into();

        let report = SafetyReport {
            patient_id: "p1".into(),
            medication_id: "MED-AMOX".into(),
            compared_medication_ids: vec![],
            alerts: vec![allergy_alert(true), minor],
            overall_risk_level: RiskLevel::Contraindicated,
            requires_override: true,
        };

        assert_eq!(report.blocking_alert_ids(), vec!["allergy:a1"]);
        assert_eq!(report.alert_ids(), vec!["allergy:a1", "allergy:a2"]);
        assert!(!report.is_clear());
    }

    #[test]
    fn test_risk_level_from_severity() {
        assert_eq!(RiskLevel::from(SeverityLevel::Major), RiskLevel::Major);
        assert!(RiskLevel::None < RiskLevel::Minor);
        assert_eq!(RiskLevel::parse("none"), Some(RiskLevel::None));
    }
}
