//! Dimension catalog: the canonical value enumeration for each dimension.
//!
//! Values are held per dimension in a concurrent map, so additions to
//! different dimensions proceed independently while additions to one
//! dimension serialize. Callers only ever receive copies.

use crate::config::StoreConfig;
use crate::error::Result;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use myriad_model::{Dimension, DimensionValues, Measure, MeasureSet, ValidationError};
use parking_lot::RwLock;
use std::collections::BTreeSet;

#[derive(Debug)]
struct DimensionEntry {
    dimension: Dimension,
    repeatable: bool,
    values: BTreeSet<String>,
}

impl DimensionEntry {
    fn snapshot(&self) -> DimensionValues {
        DimensionValues {
            dimension: self.dimension.clone(),
            values: self.values.iter().cloned().collect(),
        }
    }
}

pub struct DimensionCatalog {
    entries: DashMap<String, DimensionEntry>,
    /// Registration order.
    order: RwLock<Vec<Dimension>>,
    property_dimension: String,
    list_property_dimension: bool,
}

impl DimensionCatalog {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let catalog = Self {
            entries: DashMap::new(),
            order: RwLock::new(Vec::new()),
            property_dimension: config.property_dimension.clone(),
            list_property_dimension: config.list_property_dimension,
        };
        catalog.add_dimension(&config.property_dimension, |_| Ok(()))?;
        for name in &config.dimensions {
            catalog.add_dimension(name, |_| Ok(()))?;
        }
        Ok(catalog)
    }

    pub fn property_dimension(&self) -> &str {
        &self.property_dimension
    }

    /// Full snapshot, one entry per dimension in registration order.
    pub fn metadata(&self) -> Vec<DimensionValues> {
        // Registration holds a map shard while it appends to `order`, so the
        // order lock must be released before touching the map.
        let order = self.order.read().clone();
        order
            .iter()
            .filter_map(|d| self.entries.get(d.name()).map(|e| e.snapshot()))
            .collect()
    }

    /// Dimension names in registration order (property dimension first).
    pub fn dimension_list(&self) -> Vec<String> {
        self.order
            .read()
            .iter()
            .filter(|d| self.list_property_dimension || d.name() != self.property_dimension)
            .map(|d| d.name().to_string())
            .collect()
    }

    pub fn values(&self, dimension: &str) -> Option<DimensionValues> {
        self.entries.get(dimension).map(|e| e.snapshot())
    }

    pub fn contains(&self, dimension: &str) -> bool {
        self.entries.contains_key(dimension)
    }

    pub fn is_repeatable(&self, dimension: &Dimension) -> bool {
        self.entries
            .get(dimension.name())
            .map(|e| e.repeatable)
            .unwrap_or(false)
    }

    /// Register a dimension. Idempotent; `journal` runs only when the
    /// dimension is new, before it becomes visible, and can veto it.
    pub fn add_dimension<F>(&self, name: &str, journal: F) -> Result<DimensionValues>
    where
        F: FnOnce(&Dimension) -> Result<()>,
    {
        let dimension = Dimension::new(name)?;
        match self.entries.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().snapshot()),
            Entry::Vacant(entry) => {
                journal(&dimension)?;
                let repeatable = name == self.property_dimension;
                let created = DimensionEntry {
                    dimension: dimension.clone(),
                    repeatable,
                    values: BTreeSet::new(),
                };
                let snapshot = created.snapshot();
                self.order.write().push(dimension);
                entry.insert(created);
                tracing::info!(dimension = %name, "registered dimension");
                Ok(snapshot)
            }
        }
    }

    /// Register `measure.value` under its dimension and return the refreshed
    /// values. Idempotent for known values; `journal` runs only for new ones.
    pub fn add_measure<F>(&self, measure: &Measure, journal: F) -> Result<DimensionValues>
    where
        F: FnOnce(&Measure) -> Result<()>,
    {
        measure.validate()?;
        let name = measure.dimension.name();
        {
            let entry = self
                .entries
                .get(name)
                .ok_or_else(|| unknown(&measure.dimension))?;
            if entry.values.contains(&measure.value) {
                return Ok(entry.snapshot());
            }
        }

        // The log append runs without a shard guard; a racing duplicate entry
        // replays as a no-op.
        journal(measure)?;
        let mut entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| unknown(&measure.dimension))?;
        if entry.values.insert(measure.value.clone()) {
            tracing::debug!(measure = %measure, "registered measure value");
        }
        Ok(entry.snapshot())
    }

    /// Record a value seen in stored data. Unknown dimensions are ignored.
    pub fn observe(&self, dimension: &str, value: &str) {
        if value.is_empty() {
            return;
        }
        if let Some(mut entry) = self.entries.get_mut(dimension) {
            if !entry.values.contains(value) {
                entry.values.insert(value.to_string());
            }
        }
    }

    /// Every measure must name a known dimension, and only repeatable
    /// dimensions may appear twice.
    pub fn validate_measures(&self, measures: &MeasureSet) -> std::result::Result<(), ValidationError> {
        for dimension in measures.dimensions() {
            if !self.contains(dimension.name()) {
                return Err(ValidationError::UnknownDimension {
                    dimension: dimension.name().to_string(),
                });
            }
        }
        measures.validate(|d| self.is_repeatable(d))
    }

    /// Replace values wholesale from a snapshot, registering any dimensions
    /// not yet known.
    pub(crate) fn restore(&self, snapshot: Vec<DimensionValues>) -> Result<()> {
        for dimension_values in snapshot {
            let name = dimension_values.dimension.name().to_string();
            self.add_dimension(&name, |_| Ok(()))?;
            if let Some(mut entry) = self.entries.get_mut(&name) {
                entry.values = dimension_values.values.into_iter().collect();
            }
        }
        Ok(())
    }
}

fn unknown(dimension: &Dimension) -> ValidationError {
    ValidationError::UnknownDimension {
        dimension: dimension.name().to_string(),
    }
}
