// ABOUTME: Property tests for the secrets key-presence check.
// ABOUTME: Only literal KEY= at the start of a line counts as assigned.

use proptest::prelude::*;
use shipit::deploy::{key_assigned, missing_keys};

fn key() -> impl Strategy<Value = String> {
    "[A-Z][A-Z0-9_]{0,15}"
}

proptest! {
    #[test]
    fn assigned_keys_are_never_missing(
        keys in prop::collection::vec(key(), 1..6),
        values in prop::collection::vec("[a-z0-9]{0,8}", 6),
    ) {
        let content: String = keys
            .iter()
            .zip(values.iter().cycle())
            .map(|(k, v)| format!("{}={}\n", k, v))
            .collect();
        prop_assert!(missing_keys(&content, &keys).is_empty());
    }

    #[test]
    fn missing_is_the_unassigned_subset_in_order(
        present in prop::collection::vec(key(), 0..5),
        required in prop::collection::vec(key(), 0..5),
    ) {
        let content: String = present.iter().map(|k| format!("{}=x\n", k)).collect();
        let expected: Vec<String> = required
            .iter()
            .filter(|k| !present.contains(k))
            .cloned()
            .collect();
        prop_assert_eq!(missing_keys(&content, &required), expected);
    }

    #[test]
    fn commented_or_indented_keys_do_not_count(k in key()) {
        let commented = format!("# {}=x\n", k);
        let indented = format!("  {}=x\n", k);
        let suffixed = format!("{}_OLD=x\n", k);
        prop_assert!(!key_assigned(&commented, &k));
        prop_assert!(!key_assigned(&indented, &k));
        prop_assert!(!key_assigned(&suffixed, &k));
    }
}
