//! The property reconciler.
//!
//! Each key owns a slot with its own write section and an atomically swapped
//! snapshot pointer:
//!
//! ```text
//! index: key ──► Arc<PropertySlot> ──► write:   Mutex<()>                 (one writer per key)
//!                                  └─► current: RwLock<Option<Arc<Property>>>  (held only to clone/swap)
//! order: [slot, slot, ...]                                                (discovery order, first write)
//! ```
//!
//! Writers on different keys never contend. Writers on the same key queue on
//! the slot's write section for at most the configured timeout. Readers clone
//! the current `Arc` and never wait for a writer's validation or logging.

use crate::apply;
use crate::error::{Conflict, ConflictKind, Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use myriad_model::{MeasureSet, Property, PropertyOperation, PropertyValue};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Answer to a `Get`: the context that was asked for and one projected value
/// per matching property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResult {
    pub context: MeasureSet,
    pub properties: Vec<PropertyValue>,
}

#[derive(Default)]
struct PropertySlot {
    write: Mutex<()>,
    current: RwLock<Option<Arc<Property>>>,
}

impl PropertySlot {
    fn snapshot(&self) -> Option<Arc<Property>> {
        self.current.read().clone()
    }
}

pub struct PropertyStore {
    index: DashMap<String, Arc<PropertySlot>>,
    order: RwLock<Vec<Arc<PropertySlot>>>,
    lock_timeout: Duration,
    property_dimension: String,
}

impl PropertyStore {
    pub fn new(lock_timeout: Duration, property_dimension: impl Into<String>) -> Self {
        Self {
            index: DashMap::new(),
            order: RwLock::new(Vec::new()),
            lock_timeout,
            property_dimension: property_dimension.into(),
        }
    }

    pub fn property_dimension(&self) -> &str {
        &self.property_dimension
    }

    fn slot(&self, key: &str) -> Arc<PropertySlot> {
        if let Some(slot) = self.index.get(key) {
            return Arc::clone(slot.value());
        }
        match self.index.entry(key.to_string()) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let slot = Arc::new(PropertySlot::default());
                entry.insert(Arc::clone(&slot));
                slot
            }
        }
    }

    /// Swap in `next`; a slot joins the discovery order with its first value.
    fn install(&self, slot: &Arc<PropertySlot>, next: Arc<Property>) {
        let previous = slot.current.write().replace(next);
        if previous.is_none() {
            self.order.write().push(Arc::clone(slot));
        }
    }

    /// Drop a slot that never received a value. Caller holds its write section.
    fn retire(&self, key: &str, slot: &Arc<PropertySlot>) {
        if slot.snapshot().is_none() {
            self.index.remove_if(key, |_, s| Arc::ptr_eq(s, slot));
        }
    }

    /// Apply `op` atomically.
    ///
    /// `commit` sees the derived snapshot before it becomes visible and can
    /// veto it (e.g. when the log append fails). On any error the canonical
    /// value is left exactly as it was.
    pub fn put<C>(&self, op: &PropertyOperation, commit: C) -> Result<Arc<Property>>
    where
        C: FnOnce(&Property) -> Result<()>,
    {
        let deadline = Instant::now() + self.lock_timeout;
        loop {
            let slot = self.slot(&op.key);
            let _guard = slot
                .write
                .try_lock_until(deadline)
                .ok_or_else(|| Conflict::new(op.key.clone(), ConflictKind::Busy))?;
            // A retired slot is no longer indexed; start over on the live one.
            let live = self
                .index
                .get(&op.key)
                .is_some_and(|s| Arc::ptr_eq(s.value(), &slot));
            if !live {
                continue;
            }

            let current = slot.snapshot();
            let next = apply::apply_operation(current.as_deref(), op)
                .map_err(Error::from)
                .and_then(|next| commit(&next).map(|()| next));
            return match next {
                Ok(next) => {
                    let next = Arc::new(next);
                    self.install(&slot, Arc::clone(&next));
                    Ok(next)
                }
                Err(e) => {
                    self.retire(&op.key, &slot);
                    Err(e)
                }
            };
        }
    }

    /// Install a snapshot value directly (used when loading from disk).
    pub(crate) fn restore(&self, property: Property) {
        let slot = self.slot(&property.key);
        self.install(&slot, Arc::new(property));
    }

    /// Current snapshot for `key`, if the property exists.
    pub fn property(&self, key: &str) -> Option<Arc<Property>> {
        self.index.get(key).and_then(|slot| slot.snapshot())
    }

    /// Direct key lookup in request order; unknown keys are omitted.
    pub fn get_properties(&self, keys: &[String]) -> Vec<Arc<Property>> {
        keys.iter().filter_map(|key| self.property(key)).collect()
    }

    /// Every property owning a cluster whose measure set is a superset of
    /// `context`, projected against its best matching cluster.
    ///
    /// A measure on the property dimension is also satisfied by the
    /// property's own key.
    pub fn get(&self, context: &MeasureSet) -> GetResult {
        let properties = self
            .snapshots()
            .filter_map(|p| {
                p.best_match_by(|cluster| {
                    context.iter().all(|measure| {
                        cluster.measures.contains(measure)
                            || (measure.dimension.name() == self.property_dimension
                                && measure.value == p.key)
                    })
                })
                .map(|c| p.value_for(c))
            })
            .collect();

        GetResult {
            context: context.clone(),
            properties,
        }
    }

    /// Number of properties in discovery order.
    pub(crate) fn slot_count(&self) -> usize {
        self.order.read().len()
    }

    /// Snapshot at a discovery position; `None` for an absent property.
    pub(crate) fn snapshot_at(&self, position: usize) -> Option<Arc<Property>> {
        let slot = self.order.read().get(position).cloned()?;
        slot.snapshot()
    }

    /// Per-key snapshots in discovery order, taken lazily.
    pub fn snapshots(&self) -> impl Iterator<Item = Arc<Property>> + '_ {
        let mut position = 0;
        std::iter::from_fn(move || loop {
            if position >= self.slot_count() {
                return None;
            }
            let snapshot = self.snapshot_at(position);
            position += 1;
            if snapshot.is_some() {
                return snapshot;
            }
        })
    }

    pub fn len(&self) -> usize {
        self.snapshots().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use myriad_model::{Cluster, Measure, Operation};

    fn store() -> PropertyStore {
        PropertyStore::new(Duration::from_millis(100), "Property")
    }

    fn region(value: &str) -> MeasureSet {
        [Measure::parse("Region", value).unwrap()].into_iter().collect()
    }

    fn add(key: &str, value: &str, measures: MeasureSet) -> PropertyOperation {
        PropertyOperation::new(
            key,
            "",
            false,
            1,
            vec![Operation::add(Cluster::new(value, measures, "u", 1))],
        )
    }

    #[test]
    fn discovery_order_is_insertion_order() {
        let store = store();
        for key in ["c", "a", "b"] {
            store.put(&add(key, "1", region("US")), |_| Ok(())).unwrap();
        }
        let keys: Vec<String> = store.snapshots().map(|p| p.key.clone()).collect();
        assert_eq!(keys, vec!["c", "a", "b"]);
    }

    #[test]
    fn vetoed_commit_leaves_state_unchanged() {
        let store = store();
        let err = store
            .put(&add("k", "1", region("US")), |_| {
                Err(Error::Transport(crate::error::TransportError::Remote {
                    message: "veto".into(),
                }))
            })
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(store.property("k").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn get_restricts_by_property_measures() {
        let store = store();
        store.put(&add("a", "1", region("US")), |_| Ok(())).unwrap();
        store.put(&add("b", "2", region("US")), |_| Ok(())).unwrap();

        let mut context = region("US");
        context.insert(Measure::parse("Property", "b").unwrap());
        let result = store.get(&context);
        assert_eq!(result.properties.len(), 1);
        assert_eq!(result.properties[0].name, "b");
        assert_eq!(result.context, context);
    }

    #[test]
    fn get_properties_omits_unknown_keys() {
        let store = store();
        store.put(&add("a", "1", region("US")), |_| Ok(())).unwrap();
        let found = store.get_properties(&["missing".to_string(), "a".to_string()]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key, "a");
    }

    #[test]
    fn snapshots_taken_before_a_write_stay_unchanged() {
        let store = store();
        let first = store.put(&add("a", "1", region("US")), |_| Ok(())).unwrap();
        let held = store.property("a").unwrap();

        let newer = Cluster::new("2", region("US"), "u", 2);
        let op = PropertyOperation::new(
            "a",
            "",
            false,
            2,
            vec![Operation::update(first.clusters[0].clone(), newer)],
        );
        store.put(&op, |_| Ok(())).unwrap();

        assert_eq!(held.clusters[0].value, "1");
        assert_eq!(store.property("a").unwrap().clusters[0].value, "2");
    }

    fn tagged(pairs: &[(&str, &str)]) -> MeasureSet {
        pairs
            .iter()
            .map(|(d, v)| Measure::parse(d, *v).unwrap())
            .collect()
    }

    #[test]
    fn get_finds_clusters_by_property_tags() {
        let store = store();
        let measures = tagged(&[("Env", "Prod"), ("Property", "network")]);
        store.put(&add("Timeout", "30", measures.clone()), |_| Ok(())).unwrap();

        let by_tag = store.get(&tagged(&[("Property", "network")]));
        assert_eq!(by_tag.properties.len(), 1);
        assert_eq!(by_tag.properties[0].name, "Timeout");

        let exact = store.get(&measures);
        assert_eq!(exact.properties.len(), 1);
        assert_eq!(exact.properties[0].value, "30");

        // The key itself still selects the property.
        let by_key = store.get(&tagged(&[("Env", "Prod"), ("Property", "Timeout")]));
        assert_eq!(by_key.properties.len(), 1);
        assert!(store.get(&tagged(&[("Property", "storage")])).properties.is_empty());
    }

    #[test]
    fn rejected_puts_leave_no_slots() {
        let store = store();
        for i in 0..100 {
            let ghost = Cluster::new("1", region("US"), "u", 1);
            let op = PropertyOperation::new(
                format!("ghost-{i}"),
                "",
                false,
                1,
                vec![Operation::remove(ghost)],
            );
            assert!(matches!(store.put(&op, |_| Ok(())), Err(Error::Conflict(_))));
        }
        assert!(store.index.is_empty());
        assert_eq!(store.slot_count(), 0);

        store.put(&add("ghost-7", "1", region("US")), |_| Ok(())).unwrap();
        assert_eq!(store.index.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn discovery_order_follows_first_successful_write() {
        let store = store();
        let stale = Cluster::new("0", region("US"), "u", 1);
        let op = PropertyOperation::new("late", "", false, 1, vec![Operation::remove(stale)]);
        assert!(store.put(&op, |_| Ok(())).is_err());

        store.put(&add("early", "1", region("US")), |_| Ok(())).unwrap();
        store.put(&add("late", "1", region("US")), |_| Ok(())).unwrap();
        let keys: Vec<String> = store.snapshots().map(|p| p.key.clone()).collect();
        assert_eq!(keys, vec!["early", "late"]);
    }
}
