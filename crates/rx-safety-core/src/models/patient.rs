//! Patient and allergy models.

use serde::{Deserialize, Serialize};

use super::medication::normalize_term;

/// A patient record. Only its existence matters to the safety engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    /// Patient identifier (UUID)
    pub patient_id: String,
    /// Display name
    pub name: String,
    /// Date of birth
    pub date_of_birth: Option<String>,
    /// Creation timestamp
    pub created_at: String,
    /// Last update timestamp
    pub updated_at: String,
}

impl Patient {
    /// Create a new patient with required fields.
    pub fn new(name: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            patient_id: uuid::Uuid::new_v4().to_string(),
            name,
            date_of_birth: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Category of allergen.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AllergyType {
    Drug,
    Food,
    Environmental,
}

impl AllergyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllergyType::Drug => "drug",
            AllergyType::Food => "food",
            AllergyType::Environmental => "environmental",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "drug" => Some(AllergyType::Drug),
            "food" => Some(AllergyType::Food),
            "environmental" => Some(AllergyType::Environmental),
            _ => None,
        }
    }
}

/// Recorded reaction severity of an allergy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AllergySeverity {
    Mild,
    Moderate,
    Severe,
    LifeThreatening,
}

impl AllergySeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllergySeverity::Mild => "mild",
            AllergySeverity::Moderate => "moderate",
            AllergySeverity::Severe => "severe",
            AllergySeverity::LifeThreatening => "life_threatening",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mild" => Some(AllergySeverity::Mild),
            "moderate" => Some(AllergySeverity::Moderate),
            "severe" => Some(AllergySeverity::Severe),
            "life_threatening" => Some(AllergySeverity::LifeThreatening),
            _ => None,
        }
    }
}

/// An allergy on a patient's record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Allergy {
    pub allergy_id: String,
    pub patient_id: String,
    /// Free-text substance as entered by the clinician
    pub substance: String,
    pub allergy_type: AllergyType,
    pub severity: AllergySeverity,
    /// Inactive allergies are historical and never matched
    pub active: bool,
}

impl Allergy {
    /// Create a new active allergy.
    pub fn new(
        patient_id: String,
        substance: String,
        allergy_type: AllergyType,
        severity: AllergySeverity,
    ) -> Self {
        Self {
            allergy_id: uuid::Uuid::new_v4().to_string(),
            patient_id,
            substance,
            allergy_type,
            severity,
            active: true,
        }
    }

    /// Substance lower-cased and trimmed for matching.
    pub fn normalized_substance(&self) -> String {
        normalize_term(&self.substance)
    }
}

/// An active allergy as seen by the safety engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct ActiveAllergy {
    pub allergy_id: String,
    /// Normalized substance
    pub substance: String,
    pub severity: AllergySeverity,
}

impl From<&Allergy> for ActiveAllergy {
    fn from(allergy: &Allergy) -> Self {
        Self {
            allergy_id: allergy.allergy_id.clone(),
            substance: allergy.normalized_substance(),
            severity: allergy.severity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_patient() {
        let patient = Patient::new("Ada Lovelace".into());
        assert_eq!(patient.name, "Ada Lovelace");
        assert_eq!(patient.patient_id.len(), 36); // UUID format
    }

    #[test]
    fn test_normalized_substance() {
        let allergy = Allergy::new(
            "p1".into(),
            "  PeniCILLIN ".into(),
            AllergyType::Drug,
            AllergySeverity::Severe,
        );
        assert_eq!(allergy.normalized_substance(), "penicillin");
        assert!(allergy.active);
    }

    #[test]
    fn test_enum_string_forms() {
        for t in [AllergyType::Drug, AllergyType::Food, AllergyType::Environmental] {
            assert_eq!(AllergyType::parse(t.as_str()), Some(t));
        }
        for s in [
            AllergySeverity::Mild,
            AllergySeverity::Moderate,
            AllergySeverity::Severe,
            AllergySeverity::LifeThreatening,
        ] {
            assert_eq!(AllergySeverity::parse(s.as_str()), Some(s));
        }
        assert_eq!(AllergySeverity::parse("unknown"), None);
    }
}
