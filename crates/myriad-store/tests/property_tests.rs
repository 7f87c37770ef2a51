//! Property-based tests for the reconciler
//!
//! 1. Rejected batches leave the property untouched
//! 2. Add followed by Get on the same context returns the added value
//! 3. Update touches exactly one cluster
//! 4. An unfiltered query yields one row per stored cluster
//! 5. Re-applying an update with the current cluster changes nothing

use myriad_model::{Cluster, Dimension, DimensionValues, Measure, MeasureSet, Operation, PropertyOperation};
use myriad_store::{Error, MyriadStore, StoreConfig};
use proptest::prelude::*;
use std::collections::BTreeMap;

// ============================================================================
// Strategies
// ============================================================================

fn region_strategy() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("US"), Just("EU"), Just("APAC")]
}

fn env_strategy() -> impl Strategy<Value = Option<&'static str>> {
    prop_oneof![Just(None), Just(Some("Prod")), Just(Some("Dev"))]
}

/// Zero or more tags on the repeatable property dimension.
fn tags_strategy() -> impl Strategy<Value = Vec<&'static str>> {
    prop::sample::subsequence(vec!["network", "storage", "Latency"], 0..=2)
}

fn cluster_strategy() -> impl Strategy<Value = Cluster> {
    (
        "[0-9]{1,4}",
        region_strategy(),
        env_strategy(),
        tags_strategy(),
        "[a-z]{3,8}",
        0i64..10_000,
    )
        .prop_map(|(value, region, env, tags, user, timestamp)| {
            let mut measures = MeasureSet::new();
            measures.insert(Measure::parse("Region", region).unwrap());
            if let Some(env) = env {
                measures.insert(Measure::parse("Env", env).unwrap());
            }
            for tag in tags {
                measures.insert(Measure::parse("Property", tag).unwrap());
            }
            Cluster::new(value, measures, user, timestamp)
        })
}

/// Clusters with pairwise distinct measure sets.
fn distinct_clusters_strategy() -> impl Strategy<Value = Vec<Cluster>> {
    prop::collection::vec(cluster_strategy(), 1..8).prop_map(|clusters| {
        let unique: BTreeMap<MeasureSet, Cluster> = clusters
            .into_iter()
            .map(|c| (c.measures.clone(), c))
            .collect();
        unique.into_values().collect()
    })
}

fn store() -> MyriadStore {
    MyriadStore::in_memory(StoreConfig::in_memory(["Region", "Env"])).unwrap()
}

fn add_all(key: &str, clusters: &[Cluster]) -> PropertyOperation {
    PropertyOperation::new(
        key,
        "",
        false,
        1,
        clusters.iter().cloned().map(Operation::add).collect(),
    )
}

/// A context no generated cluster can occupy.
fn vacant_slot() -> MeasureSet {
    [
        Measure::parse("Region", "US").unwrap(),
        Measure::parse("Env", "Staging").unwrap(),
    ]
    .into_iter()
    .collect()
}

// ============================================================================
// Reconciliation invariants
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn unmatched_update_or_remove_leaves_property_unchanged(
        clusters in distinct_clusters_strategy(),
        remove in any::<bool>(),
    ) {
        let store = store();
        store.put_property(&add_all("Latency", &clusters)).unwrap();
        let before = store.get_properties(&["Latency".to_string()]);

        let ghost = Cluster::new("0", vacant_slot(), "ghost", 0);
        let operation = if remove {
            Operation::remove(ghost)
        } else {
            Operation::update(ghost.clone(), ghost)
        };
        let op = PropertyOperation::new("Latency", "changed", true, 2, vec![operation]);
        let result = store.put_property(&op);
        prop_assert!(matches!(result, Err(Error::Conflict(_))));

        let after = store.get_properties(&["Latency".to_string()]);
        prop_assert_eq!(before[0].digest(), after[0].digest());
        prop_assert_eq!(&before[0], &after[0]);
    }

    #[test]
    fn add_then_get_returns_the_added_value(cluster in cluster_strategy()) {
        let store = store();
        store.put_property(&add_all("Latency", &[cluster.clone()])).unwrap();

        let result = store.get(&cluster.measures).unwrap();
        prop_assert_eq!(result.properties.len(), 1);
        prop_assert_eq!(&result.properties[0].value, &cluster.value);
    }

    #[test]
    fn add_then_get_finds_each_tag(cluster in cluster_strategy()) {
        let store = store();
        store.put_property(&add_all("Timeout", &[cluster.clone()])).unwrap();

        for tag in cluster.measures.values_of("Property") {
            let context: MeasureSet = [Measure::parse("Property", tag).unwrap()].into_iter().collect();
            let result = store.get(&context).unwrap();
            prop_assert_eq!(result.properties.len(), 1);
            prop_assert_eq!(&result.properties[0].value, &cluster.value);
        }
    }

    #[test]
    fn reapplied_update_is_idempotent(clusters in distinct_clusters_strategy(), pick in any::<prop::sample::Index>()) {
        let store = store();
        let before = store.put_property(&add_all("Latency", &clusters)).unwrap();

        let current = clusters[pick.index(clusters.len())].clone();
        let op = PropertyOperation::new("Latency", "", false, 1, vec![Operation::update(current.clone(), current)]);
        let after = store.put_property(&op).unwrap();
        prop_assert_eq!(before.digest(), after.digest());
    }

    #[test]
    fn update_touches_exactly_one_cluster(
        clusters in distinct_clusters_strategy(),
        pick in any::<prop::sample::Index>(),
        value in "[0-9]{1,4}",
    ) {
        let store = store();
        store.put_property(&add_all("Latency", &clusters)).unwrap();

        let index = pick.index(clusters.len());
        let old = clusters[index].clone();
        let new = Cluster::new(value, old.measures.clone(), "editor", old.timestamp + 1);
        let op = PropertyOperation::new("Latency", "", false, 2, vec![Operation::update(old, new.clone())]);
        let property = store.put_property(&op).unwrap();

        prop_assert_eq!(property.clusters.len(), clusters.len());
        for (i, cluster) in property.clusters.iter().enumerate() {
            if i == index {
                prop_assert_eq!(cluster, &new);
            } else {
                prop_assert_eq!(cluster, &clusters[i]);
            }
        }
    }

    #[test]
    fn unfiltered_query_yields_one_row_per_cluster(
        first in distinct_clusters_strategy(),
        second in distinct_clusters_strategy(),
    ) {
        let store = store();
        store.put_property(&add_all("Latency", &first)).unwrap();
        store.put_property(&add_all("Timeout", &second)).unwrap();

        let rows = store.query(&[]).unwrap().rows().count();
        prop_assert_eq!(rows, first.len() + second.len());

        let none = DimensionValues::new(Dimension::new("Env").unwrap(), ["Staging"]);
        prop_assert_eq!(store.query(&[none]).unwrap().rows().count(), 0);
    }

    #[test]
    fn dimension_values_are_sorted_and_unique(values in prop::collection::vec("[a-z]{1,4}", 0..16)) {
        let dv = DimensionValues::new(Dimension::new("Region").unwrap(), values.clone());
        prop_assert!(dv.values.windows(2).all(|w| w[0] < w[1]));
        for value in &values {
            prop_assert!(dv.contains(value));
        }
    }
}
