//! Property-Based Tests for the Sidecar Payload
//!
//! # Test Properties
//!
//! 1. **Escaping**: names and tag values without raw control characters
//!    survive a parse of the payload unchanged
//! 2. **Filtering**: the payload holds exactly the finite measurements, in order

#![cfg(test)]

use proptest::prelude::*;

use super::json::to_payload;
use crate::api::{Id, Measurement};

// =============================================================================
// Property Strategies
// =============================================================================

/// Printable text plus the escaped control characters.
fn text_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            4 => any::<char>().prop_filter("no control characters", |c| !c.is_control()),
            1 => prop::sample::select(vec!['"', '\\', '\u{8}', '\u{c}', '\n', '\r', '\t']),
        ],
        0..24,
    )
    .prop_map(|chars| chars.into_iter().collect())
}

fn value_strategy() -> impl Strategy<Value = f64> {
    prop_oneof![
        4 => -1.0e12f64..1.0e12f64,
        1 => Just(f64::NAN),
        1 => Just(f64::INFINITY),
        1 => Just(f64::NEG_INFINITY),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: escaped strings round-trip through a JSON parser.
    #[test]
    fn prop_strings_survive_escaping(name in text_strategy(), value in text_strategy()) {
        let id = Id::new(&name).with_tag("k", value.clone());
        let payload = to_payload(&[Measurement::new(id, 0, 1.0)]).unwrap();

        let parsed: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        prop_assert_eq!(parsed[0]["name"].as_str(), Some(name.as_str()));
        prop_assert_eq!(parsed[0]["tags"]["k"].as_str(), Some(value.as_str()));
    }

    /// Property: only finite values are written, in input order.
    #[test]
    fn prop_only_finite_values(values in prop::collection::vec(value_strategy(), 0..16)) {
        let measurements: Vec<Measurement> = values
            .iter()
            .enumerate()
            .map(|(i, v)| Measurement::new(Id::new(format!("m{}", i)), 0, *v))
            .collect();
        let payload = to_payload(&measurements).unwrap();

        let parsed: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        let names: Vec<String> = parsed
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["name"].as_str().unwrap().to_string())
            .collect();
        let expected: Vec<String> = values
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_finite())
            .map(|(i, _)| format!("m{}", i))
            .collect();
        prop_assert_eq!(names, expected);
    }
}
