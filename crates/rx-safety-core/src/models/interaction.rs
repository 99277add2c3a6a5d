//! Drug-drug interaction reference data and severity ordering.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Ordinal clinical severity, 1 (minor) through 4 (contraindicated).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SeverityLevel {
    Minor = 1,
    Moderate = 2,
    Major = 3,
    Contraindicated = 4,
}

impl SeverityLevel {
    /// Numeric level as stored in the catalog.
    pub fn level(self) -> u8 {
        self as u8
    }

    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(SeverityLevel::Minor),
            2 => Some(SeverityLevel::Moderate),
            3 => Some(SeverityLevel::Major),
            4 => Some(SeverityLevel::Contraindicated),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SeverityLevel::Minor => "minor",
            SeverityLevel::Moderate => "moderate",
            SeverityLevel::Major => "major",
            SeverityLevel::Contraindicated => "contraindicated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "minor" => Some(SeverityLevel::Minor),
            "moderate" => Some(SeverityLevel::Moderate),
            "major" => Some(SeverityLevel::Major),
            "contraindicated" => Some(SeverityLevel::Contraindicated),
            _ => None,
        }
    }
}

/// Rank of a single match: the contraindicated flag dominates the numeric level.
///
/// This is the only ordering used to sort alerts and to pick the overall risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlertRank {
    pub contraindicated: bool,
    pub severity: SeverityLevel,
}

impl AlertRank {
    pub fn new(contraindicated: bool, severity: SeverityLevel) -> Self {
        Self {
            contraindicated,
            severity,
        }
    }

    /// Severity as reported to clinicians: a contraindicated flag reads as contraindicated.
    pub fn effective_severity(&self) -> SeverityLevel {
        if self.contraindicated {
            SeverityLevel::Contraindicated
        } else {
            self.severity
        }
    }
}

impl Ord for AlertRank {
    fn cmp(&self, other: &Self) -> Ordering {
        self.contraindicated
            .cmp(&other.contraindicated)
            .then(self.severity.cmp(&other.severity))
    }
}

impl PartialOrd for AlertRank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Mechanism of a drug-drug interaction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    Pharmacodynamic,
    Pharmacokinetic,
    Other,
}

impl InteractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::Pharmacodynamic => "pharmacodynamic",
            InteractionType::Pharmacokinetic => "pharmacokinetic",
            InteractionType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pharmacodynamic" => Some(InteractionType::Pharmacodynamic),
            "pharmacokinetic" => Some(InteractionType::Pharmacokinetic),
            "other" => Some(InteractionType::Other),
            _ => None,
        }
    }
}

/// A known interaction between an unordered pair of medications.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractionRule {
    pub rule_id: String,
    pub medication_a_id: String,
    pub medication_b_id: String,
    pub severity: SeverityLevel,
    pub interaction_type: InteractionType,
    pub contraindicated: bool,
    pub description: String,
    /// Retired rules stay in the table with `active = false`
    pub active: bool,
}

impl InteractionRule {
    /// Create a new active rule.
    pub fn new(
        medication_a_id: String,
        medication_b_id: String,
        severity: SeverityLevel,
        contraindicated: bool,
        description: String,
    ) -> Self {
        Self {
            rule_id: uuid::Uuid::new_v4().to_string(),
            medication_a_id,
            medication_b_id,
            severity,
            interaction_type: InteractionType::Pharmacodynamic,
            contraindicated,
            description,
            active: true,
        }
    }

    /// Whether this rule covers the pair, in either order.
    pub fn involves_pair(&self, a: &str, b: &str) -> bool {
        (self.medication_a_id == a && self.medication_b_id == b)
            || (self.medication_a_id == b && self.medication_b_id == a)
    }

    /// The side of the pair that is not `medication_id`.
    pub fn other_side(&self, medication_id: &str) -> &str {
        if self.medication_a_id == medication_id {
            &self.medication_b_id
        } else {
            &self.medication_a_id
        }
    }

    pub fn rank(&self) -> AlertRank {
        AlertRank::new(self.contraindicated, self.severity)
    }
}
