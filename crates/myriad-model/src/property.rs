//! Properties: the aggregate root.

use crate::cluster::Cluster;
use crate::digest::{self, Digest};
use crate::epoch::Timestamp;
use crate::error::ValidationError;
use crate::measure::MeasureSet;
use crate::operation::{Operation, PropertyOperation};
use serde::{Deserialize, Serialize};

/// A keyed value with an ordered list of context-qualified clusters.
///
/// Properties are snapshots: the store derives a new value for every applied
/// operation batch and never edits one in place. The cluster list holds at
/// most one cluster per distinct measure set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    pub description: String,
    pub deprecated: bool,
    pub timestamp: Timestamp,
    pub clusters: Vec<Cluster>,
}

/// A property projected against one matching cluster (the shape `Get` returns).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyValue {
    pub name: String,
    pub value: String,
    pub deprecated: bool,
}

impl Property {
    pub fn new(
        key: impl Into<String>,
        description: impl Into<String>,
        deprecated: bool,
        timestamp: Timestamp,
    ) -> Result<Self, ValidationError> {
        let key = key.into();
        validate_key(&key)?;
        Ok(Self {
            key,
            description: description.into(),
            deprecated,
            timestamp,
            clusters: Vec::new(),
        })
    }

    /// Position and value of the cluster occupying the `measures` slot.
    pub fn find_cluster(&self, measures: &MeasureSet) -> Option<(usize, &Cluster)> {
        self.clusters
            .iter()
            .enumerate()
            .find(|(_, c)| &c.measures == measures)
    }

    /// The cluster that best answers a lookup in `context`: among clusters
    /// whose measure set is a superset of `context`, the one with the fewest
    /// measures, then the most recent, then the earliest in the list.
    pub fn best_match(&self, context: &MeasureSet) -> Option<&Cluster> {
        self.best_match_by(|c| c.measures.is_superset(context))
    }

    /// [`Property::best_match`] over the clusters accepted by `admits`.
    pub fn best_match_by<F>(&self, admits: F) -> Option<&Cluster>
    where
        F: Fn(&Cluster) -> bool,
    {
        let mut best: Option<&Cluster> = None;
        for cluster in self.clusters.iter().filter(|c| admits(c)) {
            best = match best {
                None => Some(cluster),
                Some(current) => {
                    let narrower = cluster.measures.len() < current.measures.len();
                    let newer = cluster.measures.len() == current.measures.len()
                        && cluster.timestamp > current.timestamp;
                    if narrower || newer {
                        Some(cluster)
                    } else {
                        Some(current)
                    }
                }
            };
        }
        best
    }

    /// Project against `cluster`.
    pub fn value_for(&self, cluster: &Cluster) -> PropertyValue {
        PropertyValue {
            name: self.key.clone(),
            value: cluster.value.clone(),
            deprecated: self.deprecated,
        }
    }

    /// Build a batch that removes the cluster whose measure set equals
    /// `measures`. `None` when no cluster occupies that slot.
    pub fn delete_operation(
        &self,
        measures: &MeasureSet,
        timestamp: Timestamp,
    ) -> Option<PropertyOperation> {
        let (_, removed) = self.find_cluster(measures)?;
        Some(PropertyOperation::new(
            self.key.clone(),
            self.description.clone(),
            self.deprecated,
            timestamp,
            vec![Operation::remove(removed.clone())],
        ))
    }

    pub fn digest(&self) -> Digest {
        let mut hasher = digest::Hasher::new();
        hasher.field(self.key.as_bytes());
        hasher.field(self.description.as_bytes());
        hasher.field(&[u8::from(self.deprecated)]);
        hasher.field(&self.timestamp.to_le_bytes());
        hasher.count(self.clusters.len());
        for cluster in &self.clusters {
            cluster.feed(&mut hasher);
        }
        hasher.finish()
    }
}

pub fn validate_key(key: &str) -> Result<(), ValidationError> {
    if key.is_empty() {
        return Err(ValidationError::EmptyKey);
    }
    Ok(())
}
