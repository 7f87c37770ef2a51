//! Operation batch application.
//!
//! ```text
//! Absent     --Add(C)-------------> Present({C})
//! Present(S) --Add(C)-------------> Present(S ∪ {C})          no slot of S matches C
//! Present(S) --Update(old, new)---> Present(S \ {old} ∪ {new}) old is current in S
//! Present(S) --Remove(old)--------> Present(S \ {old})         old is current in S
//! ```
//!
//! A batch is one transition: operations run in order against a working copy
//! and the first failure discards the whole batch. `Present(∅)` is a valid
//! outcome; properties are never deleted.

use crate::error::{Conflict, ConflictKind};
use myriad_model::{Cluster, Operation, Property, PropertyOperation};

/// Derive the next snapshot of `op.key` from `current`.
///
/// `current` is untouched on failure.
pub fn apply_operation(
    current: Option<&Property>,
    op: &PropertyOperation,
) -> Result<Property, Conflict> {
    let mut clusters: Vec<Cluster> = current.map(|p| p.clusters.clone()).unwrap_or_default();

    for operation in &op.operations {
        match operation {
            Operation::Add { new } => {
                if clusters.iter().any(|c| c.same_slot(new)) {
                    return Err(duplicate(op, new));
                }
                clusters.push(new.clone());
            }
            Operation::Update { old, new } => {
                let index = locate(&clusters, op, old)?;
                let collides = clusters
                    .iter()
                    .enumerate()
                    .any(|(i, c)| i != index && c.same_slot(new));
                if collides {
                    return Err(duplicate(op, new));
                }
                clusters[index] = new.clone();
            }
            Operation::Remove { old } => {
                let index = locate(&clusters, op, old)?;
                clusters.remove(index);
            }
        }
    }

    Ok(Property {
        key: op.key.clone(),
        description: op.description.clone(),
        deprecated: op.deprecated,
        timestamp: op.timestamp,
        clusters,
    })
}

/// Find the slot `old` refers to and check it still holds exactly `old`.
fn locate(clusters: &[Cluster], op: &PropertyOperation, old: &Cluster) -> Result<usize, Conflict> {
    let (index, current) = clusters
        .iter()
        .enumerate()
        .find(|(_, c)| c.same_slot(old))
        .ok_or_else(|| {
            Conflict::new(
                op.key.clone(),
                ConflictKind::MissingCluster {
                    measures: old.measures.clone(),
                },
            )
        })?;

    if current != old {
        return Err(Conflict::new(
            op.key.clone(),
            ConflictKind::StaleRevision {
                measures: old.measures.clone(),
            },
        ));
    }
    Ok(index)
}

fn duplicate(op: &PropertyOperation, new: &Cluster) -> Conflict {
    Conflict::new(
        op.key.clone(),
        ConflictKind::DuplicateCluster {
            measures: new.measures.clone(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use myriad_model::{Measure, MeasureSet};

    fn region(value: &str) -> MeasureSet {
        [Measure::parse("Region", value).unwrap()].into_iter().collect()
    }

    fn batch(ops: Vec<Operation<Cluster>>) -> PropertyOperation {
        PropertyOperation::new("Latency", "desc", false, 500, ops)
    }

    #[test]
    fn add_to_absent_creates_the_property() {
        let c = Cluster::new("42", region("US"), "alice", 100);
        let p = apply_operation(None, &batch(vec![Operation::add(c.clone())])).unwrap();
        assert_eq!(p.key, "Latency");
        assert_eq!(p.timestamp, 500);
        assert_eq!(p.clusters, vec![c]);
    }

    #[test]
    fn duplicate_add_conflicts() {
        let c = Cluster::new("42", region("US"), "alice", 100);
        let p = apply_operation(None, &batch(vec![Operation::add(c.clone())])).unwrap();
        let again = Cluster::new("99", region("US"), "bob", 200);
        let err = apply_operation(Some(&p), &batch(vec![Operation::add(again)])).unwrap_err();
        assert!(matches!(err.kind, ConflictKind::DuplicateCluster { .. }));
    }

    #[test]
    fn update_replaces_in_place_and_keeps_neighbours() {
        let us = Cluster::new("42", region("US"), "alice", 100);
        let eu = Cluster::new("55", region("EU"), "alice", 100);
        let p = apply_operation(
            None,
            &batch(vec![Operation::add(us.clone()), Operation::add(eu.clone())]),
        )
        .unwrap();

        let newer = Cluster::new("43", region("US"), "bob", 200);
        let q = apply_operation(Some(&p), &batch(vec![Operation::update(us, newer.clone())])).unwrap();
        assert_eq!(q.clusters, vec![newer, eu]);
    }

    #[test]
    fn stale_update_conflicts() {
        let us = Cluster::new("42", region("US"), "alice", 100);
        let p = apply_operation(None, &batch(vec![Operation::add(us.clone())])).unwrap();
        let newer = Cluster::new("43", region("US"), "bob", 200);
        let q = apply_operation(
            Some(&p),
            &batch(vec![Operation::update(us.clone(), newer)]),
        )
        .unwrap();

        let other = Cluster::new("44", region("US"), "carol", 300);
        let err = apply_operation(Some(&q), &batch(vec![Operation::update(us, other)])).unwrap_err();
        assert!(matches!(err.kind, ConflictKind::StaleRevision { .. }));
    }

    #[test]
    fn update_cannot_move_onto_an_occupied_slot() {
        let us = Cluster::new("42", region("US"), "alice", 100);
        let eu = Cluster::new("55", region("EU"), "alice", 100);
        let p = apply_operation(
            None,
            &batch(vec![Operation::add(us.clone()), Operation::add(eu)]),
        )
        .unwrap();
        let moved = Cluster::new("42", region("EU"), "alice", 200);
        let err = apply_operation(Some(&p), &batch(vec![Operation::update(us, moved)])).unwrap_err();
        assert!(matches!(err.kind, ConflictKind::DuplicateCluster { .. }));
    }

    #[test]
    fn removing_the_last_cluster_leaves_an_empty_property() {
        let us = Cluster::new("42", region("US"), "alice", 100);
        let p = apply_operation(None, &batch(vec![Operation::add(us.clone())])).unwrap();
        let q = apply_operation(Some(&p), &batch(vec![Operation::remove(us)])).unwrap();
        assert_eq!(q.key, "Latency");
        assert!(q.clusters.is_empty());
    }

    #[test]
    fn remove_on_absent_property_conflicts() {
        let us = Cluster::new("42", region("US"), "alice", 100);
        let err = apply_operation(None, &batch(vec![Operation::remove(us)])).unwrap_err();
        assert!(matches!(err.kind, ConflictKind::MissingCluster { .. }));
    }

    #[test]
    fn failing_batch_is_discarded_entirely() {
        let us = Cluster::new("42", region("US"), "alice", 100);
        let p = apply_operation(None, &batch(vec![Operation::add(us.clone())])).unwrap();
        let before = p.clone();

        let eu = Cluster::new("55", region("EU"), "alice", 100);
        let ghost = Cluster::new("1", region("APAC"), "alice", 100);
        let err = apply_operation(
            Some(&p),
            &batch(vec![Operation::add(eu), Operation::remove(ghost)]),
        );
        assert!(err.is_err());
        assert_eq!(p, before);
    }

    #[test]
    fn later_operations_see_earlier_ones_in_the_batch() {
        let us = Cluster::new("42", region("US"), "alice", 100);
        let newer = Cluster::new("43", region("US"), "alice", 101);
        let p = apply_operation(
            None,
            &batch(vec![
                Operation::add(us.clone()),
                Operation::update(us, newer.clone()),
            ]),
        )
        .unwrap();
        assert_eq!(p.clusters, vec![newer]);
    }

    #[test]
    fn reapplying_an_update_with_the_current_cluster_is_idempotent() {
        let us = Cluster::new("42", region("US"), "alice", 100);
        let p = apply_operation(None, &batch(vec![Operation::add(us.clone())])).unwrap();
        let written = Cluster::new("43", region("US"), "bob", 200);
        let q = apply_operation(
            Some(&p),
            &batch(vec![Operation::update(us.clone(), written.clone())]),
        )
        .unwrap();

        let same = apply_operation(
            Some(&q),
            &batch(vec![Operation::update(written.clone(), written.clone())]),
        )
        .unwrap();
        assert_eq!(same.clusters, q.clusters);

        // The `old` side still has to be current.
        let err = apply_operation(Some(&q), &batch(vec![Operation::update(us.clone(), us)]))
            .unwrap_err();
        assert!(matches!(err.kind, ConflictKind::StaleRevision { .. }));
    }
}
