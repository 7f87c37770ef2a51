//! Tabular projection over stored clusters.
//!
//! A query walks properties in discovery order and emits one row per cluster
//! that passes every filter. Rows are built lazily; each property is
//! snapshotted when the walk reaches it, so a query observes every property
//! either before or after any concurrent write to it.

use crate::catalog::DimensionCatalog;
use crate::store::PropertyStore;
use myriad_model::{Cluster, DimensionValues, Property, ValidationError};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One result row: column name to rendered value.
pub type Row = BTreeMap<String, String>;

pub const ORDINAL: &str = "Ordinal";
pub const VALUE: &str = "Value";
pub const USER_NAME: &str = "UserName";
pub const TIMESTAMP: &str = "Timestamp";
pub const DEPRECATED: &str = "Deprecated";

/// Per-dimension whitelists, combined with AND.
///
/// An empty whitelist places no restriction on its axis. A cluster that
/// carries no measure on a whitelisted dimension does not match it.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    clauses: Vec<DimensionValues>,
    property_dimension: String,
}

impl QueryFilter {
    pub fn new(
        filters: &[DimensionValues],
        catalog: &DimensionCatalog,
    ) -> Result<Self, ValidationError> {
        let mut clauses = Vec::new();
        for filter in filters {
            filter.dimension.validate()?;
            if !catalog.contains(filter.dimension.name()) {
                return Err(ValidationError::UnknownDimension {
                    dimension: filter.dimension.name().to_string(),
                });
            }
            if filter.is_empty() {
                continue;
            }
            // Incoming lists are not trusted to be sorted.
            clauses.push(DimensionValues::new(
                filter.dimension.clone(),
                filter.values.iter().cloned(),
            ));
        }
        Ok(Self {
            clauses,
            property_dimension: catalog.property_dimension().to_string(),
        })
    }

    pub fn is_unrestricted(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches(&self, property: &Property, cluster: &Cluster) -> bool {
        self.clauses.iter().all(|clause| {
            let name = clause.dimension.name();
            let tagged = cluster.measures.values_of(name).any(|v| clause.contains(v));
            if name == self.property_dimension {
                tagged || clause.contains(&property.key)
            } else {
                tagged
            }
        })
    }
}

/// A restartable query: every call to [`Query::rows`] walks a fresh view of
/// the store.
#[derive(Clone)]
pub struct Query {
    store: Arc<PropertyStore>,
    filter: Arc<QueryFilter>,
}

impl Query {
    pub fn new(store: Arc<PropertyStore>, filter: QueryFilter) -> Self {
        Self {
            store,
            filter: Arc::new(filter),
        }
    }

    pub fn rows(&self) -> QueryRows {
        QueryRows {
            store: Arc::clone(&self.store),
            filter: Arc::clone(&self.filter),
            position: 0,
            current: None,
            cluster: 0,
            ordinal: 0,
        }
    }
}

impl IntoIterator for &Query {
    type Item = Row;
    type IntoIter = QueryRows;

    fn into_iter(self) -> QueryRows {
        self.rows()
    }
}

pub struct QueryRows {
    store: Arc<PropertyStore>,
    filter: Arc<QueryFilter>,
    position: usize,
    current: Option<Arc<Property>>,
    cluster: usize,
    ordinal: usize,
}

impl Iterator for QueryRows {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        loop {
            if let Some(property) = self.current.clone() {
                while let Some(cluster) = property.clusters.get(self.cluster) {
                    self.cluster += 1;
                    if self.filter.matches(&property, cluster) {
                        let row = project(
                            self.ordinal,
                            &property,
                            cluster,
                            self.store.property_dimension(),
                        );
                        self.ordinal += 1;
                        return Some(row);
                    }
                }
                self.current = None;
            }

            if self.position >= self.store.slot_count() {
                return None;
            }
            self.current = self.store.snapshot_at(self.position);
            self.position += 1;
            self.cluster = 0;
        }
    }
}

/// Flatten one cluster into a row.
pub fn project(ordinal: usize, property: &Property, cluster: &Cluster, property_dimension: &str) -> Row {
    let mut row = Row::new();
    row.insert(ORDINAL.to_string(), ordinal.to_string());
    row.insert(property_dimension.to_string(), property.key.clone());
    for measure in &cluster.measures {
        if measure.dimension.name() != property_dimension {
            row.insert(measure.dimension.name().to_string(), measure.value.clone());
        }
    }
    row.insert(VALUE.to_string(), cluster.value.clone());
    row.insert(USER_NAME.to_string(), cluster.user_name.clone());
    row.insert(TIMESTAMP.to_string(), cluster.timestamp.to_string());
    row.insert(DEPRECATED.to_string(), property.deprecated.to_string());
    row
}
