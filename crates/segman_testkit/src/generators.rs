//! Property-based test generators using proptest.

use proptest::prelude::*;
use segman_core::{Capability, Metadata, MetadataValue, Operation};

/// Strategy for generating collection names.
pub fn collection_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,23}").expect("Invalid regex")
}

/// Strategy for generating metadata values.
pub fn metadata_value_strategy() -> impl Strategy<Value = MetadataValue> {
    prop_oneof![
        any::<bool>().prop_map(MetadataValue::Bool),
        any::<i64>().prop_map(MetadataValue::Int),
        (-1.0e6f64..1.0e6).prop_map(MetadataValue::Float),
        prop::string::string_regex("[a-z]{0,12}")
            .expect("Invalid regex")
            .prop_map(MetadataValue::Str),
    ]
}

/// Strategy for collection metadata mixing `hnsw:` keys with other keys.
pub fn collection_metadata_strategy() -> impl Strategy<Value = Metadata> {
    let key = prop_oneof![
        prop::sample::select(vec![
            "hnsw:space",
            "hnsw:M",
            "hnsw:construction_ef",
            "hnsw:search_ef",
            "hnsw:batch_size",
            "hnsw:sync_threshold",
        ])
        .prop_map(str::to_string),
        prop::string::string_regex("[a-z]{1,10}").expect("Invalid regex"),
    ];
    prop::collection::btree_map(key, metadata_value_strategy(), 0..8)
}

/// Strategy for on-disk segment sizes in bytes.
pub fn segment_sizes_strategy(max_segments: usize) -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0usize..4096, 1..=max_segments)
}

/// Strategy for capabilities.
pub fn capability_strategy() -> impl Strategy<Value = Capability> {
    prop_oneof![Just(Capability::MetadataReader), Just(Capability::VectorReader)]
}

/// Strategy for usage hints.
pub fn operation_strategy() -> impl Strategy<Value = Operation> {
    prop_oneof![
        Just(Operation::Add),
        Just(Operation::Update),
        Just(Operation::Upsert),
        Just(Operation::Delete),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use segman_core::propagate_hnsw_params;

    proptest! {
        #[test]
        fn names_are_nonempty(name in collection_name_strategy()) {
            prop_assert!(!name.is_empty());
        }

        #[test]
        fn propagation_only_keeps_hnsw_keys(metadata in collection_metadata_strategy()) {
            let propagated = propagate_hnsw_params(&metadata);
            prop_assert!(propagated.keys().all(|k| k.starts_with("hnsw:")));
            let expected = metadata.keys().filter(|k| k.starts_with("hnsw:")).count();
            prop_assert_eq!(propagated.len(), expected);
        }
    }
}
