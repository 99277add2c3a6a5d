//! Property tests for the classifier and the interaction lookup.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;

use rx_safety_core::db::Database;
use rx_safety_core::models::{ActiveAllergy, AlertRank};
use rx_safety_core::safety::{classify, ClassifierInput, InteractionCatalog};
use rx_safety_core::{
    AllergySeverity, ClassifierPolicy, InteractionRule, Medication, SeverityLevel,
};

fn severity() -> impl Strategy<Value = SeverityLevel> {
    prop_oneof![
        Just(SeverityLevel::Minor),
        Just(SeverityLevel::Moderate),
        Just(SeverityLevel::Major),
        Just(SeverityLevel::Contraindicated),
    ]
}

fn allergy_severity() -> impl Strategy<Value = AllergySeverity> {
    prop_oneof![
        Just(AllergySeverity::Mild),
        Just(AllergySeverity::Moderate),
        Just(AllergySeverity::Severe),
        Just(AllergySeverity::LifeThreatening),
    ]
}

fn rule(index: usize, severity: SeverityLevel, contraindicated: bool) -> InteractionRule {
    let mut r = InteractionRule::new(
        format!("MED-{}", index),
        "MED-CAND".into(),
        severity,
        contraindicated,
        "desc".into(),
    );
    r.rule_id = format!("r{:02}", index);
    r
}

fn classify_with(
    rules: &[InteractionRule],
    allergies: &[ActiveAllergy],
    policy: ClassifierPolicy,
) -> rx_safety_core::SafetyReport {
    let medication = Medication::new("MED-CAND".into(), "Candidate".into());
    let compared: BTreeSet<String> = rules.iter().map(|r| r.medication_a_id.clone()).collect();
    let names = BTreeMap::new();
    let input = ClassifierInput {
        patient_id: "p1",
        medication: &medication,
        compared_medication_ids: &compared,
        interactions: rules,
        allergy_matches: allergies,
        medication_names: &names,
    };
    classify(&input, &policy)
}

proptest! {
    #[test]
    fn prop_contraindicated_outranks_everything_else(
        flagged in severity(),
        other in severity(),
    ) {
        prop_assert!(AlertRank::new(true, flagged) > AlertRank::new(false, other));
    }

    #[test]
    fn prop_contraindicated_always_requires_override(
        specs in prop::collection::vec((severity(), any::<bool>()), 0..6),
        flagged_severity in severity(),
        threshold in severity(),
    ) {
        let mut rules: Vec<_> = specs
            .iter()
            .enumerate()
            .map(|(i, (s, c))| rule(i, *s, *c))
            .collect();
        rules.push(rule(99, flagged_severity, true));

        let report = classify_with(&rules, &[], ClassifierPolicy { blocking_threshold: threshold });
        prop_assert!(report.requires_override);
        prop_assert_eq!(report.overall_risk_level.as_str(), "contraindicated");
        prop_assert!(report.alerts[0].contraindicated);
    }

    #[test]
    fn prop_classification_ignores_input_order(
        specs in prop::collection::vec((severity(), any::<bool>()), 0..8),
        allergy_specs in prop::collection::vec(allergy_severity(), 0..3),
        seed in any::<u64>(),
    ) {
        let rules: Vec<_> = specs
            .iter()
            .enumerate()
            .map(|(i, (s, c))| rule(i, *s, *c))
            .collect();
        let allergies: Vec<_> = allergy_specs
            .iter()
            .enumerate()
            .map(|(i, s)| ActiveAllergy {
                allergy_id: format!("a{}", i),
                substance: "candidate".into(),
                severity: *s,
            })
            .collect();

        // Deterministic rotation and reversal driven by the seed
        let mut shuffled_rules = rules.clone();
        let mut shuffled_allergies = allergies.clone();
        if !shuffled_rules.is_empty() {
            let k = (seed as usize) % shuffled_rules.len();
            shuffled_rules.rotate_left(k);
        }
        if seed % 2 == 0 {
            shuffled_rules.reverse();
            shuffled_allergies.reverse();
        }

        let policy = ClassifierPolicy::default();
        let a = classify_with(&rules, &allergies, policy);
        let b = classify_with(&shuffled_rules, &shuffled_allergies, policy);
        prop_assert_eq!(a.to_canonical_json().unwrap(), b.to_canonical_json().unwrap());
        prop_assert_eq!(a.requires_override, a.alerts.iter().any(|x| x.blocking));
    }

    #[test]
    fn prop_lookup_is_symmetric(
        level in severity(),
        contraindicated in any::<bool>(),
        stored_reversed in any::<bool>(),
    ) {
        let db = Database::open_in_memory().unwrap();
        for (id, name) in [("MED-A", "Alpha"), ("MED-B", "Beta")] {
            db.upsert_medication(&Medication::new(id.into(), name.into())).unwrap();
        }
        let (a, b) = if stored_reversed { ("MED-B", "MED-A") } else { ("MED-A", "MED-B") };
        db.insert_interaction_rule(&InteractionRule::new(
            a.into(),
            b.into(),
            level,
            contraindicated,
            String::new(),
        ))
        .unwrap();

        let store = db.store();
        let from_a = store.lookup("MED-A", &["MED-B".to_string()].into_iter().collect()).unwrap();
        let from_b = store.lookup("MED-B", &["MED-A".to_string()].into_iter().collect()).unwrap();

        prop_assert_eq!(from_a.len(), 1);
        prop_assert_eq!(&from_a, &from_b);
        prop_assert!(from_a[0].involves_pair("MED-B", "MED-A"));
        prop_assert_eq!(from_a[0].severity, level);
        prop_assert_eq!(from_a[0].contraindicated, contraindicated);
    }
}
