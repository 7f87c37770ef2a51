//! Clusters: immutable, context-qualified revisions of a property value.

use crate::digest::{self, Digest};
use crate::epoch::Timestamp;
use crate::measure::MeasureSet;
use serde::{Deserialize, Serialize};

/// One revision of a property's value under a specific context.
///
/// Clusters are never mutated. An update replaces a cluster with a fresh one;
/// the measure set is the cluster's identity for merge purposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub value: String,
    pub measures: MeasureSet,
    pub user_name: String,
    pub timestamp: Timestamp,
}

impl Cluster {
    pub fn new(
        value: impl Into<String>,
        measures: MeasureSet,
        user_name: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            value: value.into(),
            measures,
            user_name: user_name.into(),
            timestamp,
        }
    }

    /// True when both clusters occupy the same revision slot.
    pub fn same_slot(&self, other: &Cluster) -> bool {
        self.measures == other.measures
    }

    pub fn digest(&self) -> Digest {
        let mut hasher = digest::Hasher::new();
        self.feed(&mut hasher);
        hasher.finish()
    }

    pub(crate) fn feed(&self, hasher: &mut digest::Hasher) {
        hasher.field(self.value.as_bytes());
        hasher.count(self.measures.len());
        for measure in &self.measures {
            hasher.field(measure.dimension.name().as_bytes());
            hasher.field(measure.value.as_bytes());
        }
        hasher.field(self.user_name.as_bytes());
        hasher.field(&self.timestamp.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::Measure;

    fn us() -> MeasureSet {
        [Measure::parse("Region", "US").unwrap()].into_iter().collect()
    }

    #[test]
    fn slot_identity_ignores_value_and_author() {
        let a = Cluster::new("42", us(), "alice", 100);
        let b = Cluster::new("43", us(), "bob", 200);
        assert!(a.same_slot(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn digest_tracks_content() {
        let a = Cluster::new("42", us(), "alice", 100);
        let b = Cluster::new("42", us(), "alice", 100);
        let c = Cluster::new("43", us(), "alice", 100);
        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
    }
}
