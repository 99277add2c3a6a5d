//! Medication reference data.

use serde::{Deserialize, Serialize};

/// A drug product from the medication catalog.
///
/// Reference data: written by catalog import, never mutated by the safety engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Medication {
    /// Catalog identifier
    pub medication_id: String,
    /// Generic (non-proprietary) name, e.g. "amoxicillin"
    pub generic_name: String,
    /// Brand name, e.g. "Amoxil"
    pub brand_name: Option<String>,
    /// Pharmacological class, e.g. "penicillin"
    pub drug_class: Option<String>,
    /// Therapeutic class used to find substitutes, e.g. "NSAID"
    pub therapeutic_class: Option<String>,
    /// Active ingredient names
    pub ingredients: Vec<String>,
    /// Whether this is a controlled substance
    pub controlled_substance: bool,
    /// Controlled substance schedule (e.g. "II")
    pub schedule: Option<String>,
    /// Whether the catalog entry is current
    pub active: bool,
}

impl Medication {
    /// Create a new catalog medication with required fields.
    pub fn new(medication_id: String, generic_name: String) -> Self {
        Self {
            medication_id,
            generic_name,
            brand_name: None,
            drug_class: None,
            therapeutic_class: None,
            ingredients: Vec::new(),
            controlled_substance: false,
            schedule: None,
            active: true,
        }
    }

    /// All names an allergy substance may be matched against, lower-cased.
    pub fn match_terms(&self) -> Vec<String> {
        let mut terms = vec![normalize_term(&self.generic_name)];
        terms.extend(self.brand_name.as_deref().map(normalize_term));
        terms.extend(self.drug_class.as_deref().map(normalize_term));
        terms.extend(self.ingredients.iter().map(|i| normalize_term(i)));
        terms.retain(|t| !t.is_empty());
        terms.sort();
        terms.dedup();
        terms
    }

    /// Check whether this medication belongs to the given therapeutic class.
    pub fn in_therapeutic_class(&self, class: &str) -> bool {
        self.therapeutic_class
            .as_deref()
            .map(|c| normalize_term(c) == normalize_term(class))
            .unwrap_or(false)
    }
}

/// Normalize a free-text substance or drug name for comparison.
pub fn normalize_term(s: &str) -> String {
    s.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_terms_normalized_and_deduped() {
        let mut med = Medication::new("MED-AMOX".into(), "Amoxicillin".into());
        med.brand_name = Some("  Amoxil ".into());
        med.drug_class = Some("Penicillin".into());
        med.ingredients = vec!["amoxicillin".into(), "".into()];

        assert_eq!(med.match_terms(), vec!["amoxicillin", "amoxil", "penicillin"]);
    }

    #[test]
    fn test_therapeutic_class_case_insensitive() {
        let mut med = Medication::new("MED-IBU".into(), "Ibuprofen".into());
        assert!(!med.in_therapeutic_class("NSAID"));

        med.therapeutic_class = Some("NSAID".into());
        assert!(med.in_therapeutic_class("nsaid"));
        assert!(med.in_therapeutic_class(" NSAID "));
        assert!(!med.in_therapeutic_class("opioid"));
    }
}
