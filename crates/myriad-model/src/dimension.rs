//! Dimensions and their enumerated values.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Default name of the dimension that carries property keys.
///
/// It is a context axis rather than a content dimension: query rows put the
/// property key in this column, and it is the only dimension a cluster may
/// repeat (for tagging).
pub const PROPERTY_DIMENSION: &str = "Property";

/// A named axis such as `Region` or `Property`. Identity is the name, compared
/// case-sensitively.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Dimension {
    name: String,
}

impl Dimension {
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ValidationError::EmptyDimensionName);
        }
        Ok(Self { name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Re-check invariants on a value that may have arrived through
    /// deserialization.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyDimensionName);
        }
        Ok(())
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// The known values of one dimension, sorted ascending and deduplicated.
///
/// Used both as a catalog snapshot and as a query filter (an empty value list
/// means "no filtering on this axis").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionValues {
    pub dimension: Dimension,
    pub values: Vec<String>,
}

impl DimensionValues {
    pub fn new<I, S>(dimension: Dimension, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        Self {
            dimension,
            values: values.into_iter().collect(),
        }
    }

    pub fn empty(dimension: Dimension) -> Self {
        Self {
            dimension,
            values: Vec::new(),
        }
    }

    pub fn contains(&self, value: &str) -> bool {
        self.values
            .binary_search_by(|v| v.as_str().cmp(value))
            .is_ok()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}
