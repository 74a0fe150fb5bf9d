//! Property-based tests for the catalog's pure building blocks.
//!
//! Value normalisation, name formatting and SKU derivation run on every
//! request, so they are checked across generated inputs rather than a handful
//! of examples.

use proptest::prelude::*;
use stateset_catalog::services::catalog::{
    sku::{derive_sku, format_name, option_code, word_code},
    variation_engine::{normalize_name, normalize_values},
};

fn value_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9]{1,8}( [A-Za-z0-9]{1,8})?"
}

fn padded_value_strategy() -> impl Strategy<Value = String> {
    (value_strategy(), " {0,3}", " {0,3}")
        .prop_map(|(value, left, right)| format!("{}{}{}", left, value, right))
}

fn name_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9' !-]{0,20}"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn normalised_values_are_sorted_trimmed_and_distinct(
        single in proptest::option::of(padded_value_strategy()),
        many in prop::collection::vec(padded_value_strategy(), 0..10),
    ) {
        prop_assume!(single.is_some() || !many.is_empty());

        let values = normalize_values(single.as_deref(), &many).unwrap();

        prop_assert!(!values.is_empty());
        prop_assert!(values.windows(2).all(|pair| pair[0] < pair[1]));
        prop_assert!(values.iter().all(|v| v.trim() == v));
        for raw in single.iter().chain(many.iter()) {
            prop_assert!(values.contains(&raw.trim().to_string()));
        }
    }

    #[test]
    fn normalising_twice_changes_nothing(
        many in prop::collection::vec(padded_value_strategy(), 1..10),
    ) {
        let once = normalize_values(None, &many).unwrap();
        let twice = normalize_values(None, &once).unwrap();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn any_blank_value_is_rejected(
        many in prop::collection::vec(value_strategy(), 0..5),
        blank in "[ \t]{0,4}",
    ) {
        let mut values = many;
        values.push(blank);
        prop_assert!(normalize_values(None, &values).is_err());
    }

    #[test]
    fn whitespace_only_names_are_rejected(blank in "[ \t\n]{0,6}") {
        prop_assert!(normalize_name(&blank, "name").is_err());
    }

    #[test]
    fn format_name_is_idempotent_and_case_blind(name in name_strategy()) {
        let formatted = format_name(&name);
        prop_assert_eq!(format_name(&formatted), formatted.clone());
        prop_assert_eq!(format_name(&name.to_uppercase()), formatted.clone());
        prop_assert!(formatted
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-'));
    }

    #[test]
    fn option_codes_are_short_upper_case_and_dash_free(value in value_strategy()) {
        let code = option_code(&value);
        prop_assert!(code.chars().count() <= 6);
        prop_assert!(!code.contains('-'));
        prop_assert!(!code.contains(' '));
        prop_assert_eq!(code.to_uppercase(), code);
    }

    #[test]
    fn sku_has_one_part_per_code(
        category in "[A-Z][a-z]{2,8}",
        product in "[A-Z][a-z]{2,8}( [A-Z][a-z]{2,8})?",
        values in prop::collection::vec("[A-Za-z0-9]{1,8}", 1..4),
    ) {
        let sku = derive_sku(&category, &product, values.iter().map(String::as_str));
        let parts: Vec<&str> = sku.split('-').collect();

        prop_assert_eq!(parts.len(), 2 + values.len());
        prop_assert_eq!(parts[0], word_code(&category));
        prop_assert_eq!(parts[1], word_code(&product));
        prop_assert_eq!(sku.to_uppercase(), sku.clone());
    }
}
