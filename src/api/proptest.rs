//! Property-Based Tests for Identifiers
//!
//! # Test Properties
//!
//! 1. **Order Independence**: ids built from the same tags in any order are equal
//!    and hash alike
//! 2. **Copy-on-Write**: `with_tag` never changes the receiver
//! 3. **Registry Identity**: equal ids resolve to the same meter instance

#![cfg(test)]

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use proptest::prelude::*;

use super::id::Id;
use super::registry::Registry;
use crate::backend::AtomicFactory;

// =============================================================================
// Property Strategies
// =============================================================================

/// Tag sets with unique keys.
fn tags_strategy() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::btree_map("[a-z]{1,6}", "[a-zA-Z0-9._-]{0,8}", 0..6)
        .prop_map(|m| m.into_iter().collect())
}

fn build(name: &str, tags: &[(String, String)]) -> Id {
    Id::new(name).with_tags(tags.iter().cloned())
}

fn hash_of(id: &Id) -> u64 {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    hasher.finish()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: tag insertion order does not affect identity.
    #[test]
    fn prop_identity_ignores_order(
        name in "[a-z.]{1,12}",
        tags in tags_strategy(),
    ) {
        let forward = build(&name, &tags);
        let mut reversed_tags = tags.clone();
        reversed_tags.reverse();
        let reversed = build(&name, &reversed_tags);

        prop_assert_eq!(&forward, &reversed);
        prop_assert_eq!(hash_of(&forward), hash_of(&reversed));
        prop_assert_eq!(forward.tags().len(), tags.len());
    }

    /// Property: with_tag returns a new id and leaves the original untouched.
    #[test]
    fn prop_with_tag_copy_on_write(
        tags in tags_strategy(),
        key in "[a-z]{1,6}",
        value in "[a-z]{1,6}",
    ) {
        let original = build("metric", &tags);
        let before: Vec<_> = original.tags().to_vec();

        let updated = original.with_tag(key.clone(), value.clone());

        prop_assert_eq!(original.tags(), before.as_slice());
        prop_assert_eq!(updated.tag(&key), Some(value.as_str()));
    }

    /// Property: registry lookups with equal ids share one meter.
    #[test]
    fn prop_registry_lookup_identity(tags in tags_strategy()) {
        let registry = Registry::new(AtomicFactory);
        let mut reversed_tags = tags.clone();
        reversed_tags.reverse();

        let a = registry.counter(&build("hits", &tags));
        let b = registry.counter(&build("hits", &reversed_tags));

        prop_assert!(Arc::ptr_eq(&a, &b));
        prop_assert_eq!(registry.len(), 1);
    }
}
