//! Measures and measure sets.
//!
//! A [`Measure`] is a (dimension, value) pair; a [`MeasureSet`] is the
//! unordered context a cluster is tagged with. Two clusters occupy the same
//! revision slot iff their measure sets are set-equal.

use crate::dimension::Dimension;
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A dimension/value pair. Equality and hashing cover both fields.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Measure {
    pub dimension: Dimension,
    pub value: String,
}

impl Measure {
    pub fn new(dimension: Dimension, value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        let measure = Self { dimension, value };
        measure.validate()?;
        Ok(measure)
    }

    /// Convenience for `Measure::new(Dimension::new(name)?, value)`.
    pub fn parse(dimension: &str, value: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(Dimension::new(dimension)?, value)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.dimension.validate()?;
        if self.value.is_empty() {
            return Err(ValidationError::EmptyMeasureValue {
                dimension: self.dimension.name().to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.dimension, self.value)
    }
}

/// An unordered set of measures, kept sorted so that equality, hashing and
/// serialization are canonical.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeasureSet(BTreeSet<Measure>);

impl MeasureSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Returns `false` if the measure was already present.
    pub fn insert(&mut self, measure: Measure) -> bool {
        self.0.insert(measure)
    }

    pub fn contains(&self, measure: &Measure) -> bool {
        self.0.contains(measure)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Measure> {
        self.0.iter()
    }

    pub fn is_subset(&self, other: &MeasureSet) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn is_superset(&self, other: &MeasureSet) -> bool {
        self.0.is_superset(&other.0)
    }

    /// All values recorded for `dimension` (more than one only for repeatable
    /// dimensions).
    pub fn values_of<'a>(&'a self, dimension: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |m| m.dimension.name() == dimension)
            .map(|m| m.value.as_str())
    }

    /// First value recorded for `dimension`.
    pub fn value_of<'a>(&'a self, dimension: &'a str) -> Option<&'a str> {
        self.values_of(dimension).next()
    }

    /// Distinct dimensions referenced by this set, in sorted order.
    pub fn dimensions(&self) -> impl Iterator<Item = &Dimension> {
        let mut last: Option<&Dimension> = None;
        self.0.iter().filter_map(move |m| {
            if last == Some(&m.dimension) {
                None
            } else {
                last = Some(&m.dimension);
                Some(&m.dimension)
            }
        })
    }

    /// Checks every measure and rejects repeated dimensions unless
    /// `repeatable` allows them.
    pub fn validate<F>(&self, repeatable: F) -> Result<(), ValidationError>
    where
        F: Fn(&Dimension) -> bool,
    {
        let mut previous: Option<&Dimension> = None;
        for measure in &self.0 {
            measure.validate()?;
            // Sorted order puts measures of one dimension next to each other.
            if previous == Some(&measure.dimension) && !repeatable(&measure.dimension) {
                return Err(ValidationError::RepeatedDimension {
                    dimension: measure.dimension.name().to_string(),
                });
            }
            previous = Some(&measure.dimension);
        }
        Ok(())
    }
}

impl FromIterator<Measure> for MeasureSet {
    fn from_iter<I: IntoIterator<Item = Measure>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a MeasureSet {
    type Item = &'a Measure;
    type IntoIter = std::collections::btree_set::Iter<'a, Measure>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for MeasureSet {
    type Item = Measure;
    type IntoIter = std::collections::btree_set::IntoIter<Measure>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for MeasureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, measure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{measure}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(dimension: &str, value: &str) -> Measure {
        Measure::parse(dimension, value).unwrap()
    }

    #[test]
    fn empty_value_is_rejected() {
        let err = Measure::parse("Region", "").unwrap_err();
        assert_eq!(
            err,
            ValidationError::EmptyMeasureValue {
                dimension: "Region".to_string()
            }
        );
    }

    #[test]
    fn measure_sets_compare_as_sets() {
        let a: MeasureSet = [m("Region", "US"), m("Env", "Prod")].into_iter().collect();
        let b: MeasureSet = [m("Env", "Prod"), m("Region", "US")].into_iter().collect();
        assert_eq!(a, b);
        assert!(a.is_superset(&[m("Env", "Prod")].into_iter().collect()));
    }

    #[test]
    fn repeated_dimension_needs_permission() {
        let set: MeasureSet = [m("Region", "US"), m("Region", "EU")].into_iter().collect();
        assert_eq!(
            set.validate(|_| false).unwrap_err(),
            ValidationError::RepeatedDimension {
                dimension: "Region".to_string()
            }
        );

        let tags: MeasureSet = [m("Property", "a"), m("Property", "b")].into_iter().collect();
        assert!(tags.validate(|d| d.name() == "Property").is_ok());
    }

    #[test]
    fn values_of_lists_repeated_tags() {
        let set: MeasureSet = [m("Property", "b"), m("Property", "a"), m("Region", "US")]
            .into_iter()
            .collect();
        let tags: Vec<&str> = set.values_of("Property").collect();
        assert_eq!(tags, vec!["a", "b"]);
        assert_eq!(set.value_of("Region"), Some("US"));
        assert_eq!(set.value_of("Env"), None);
    }

    #[test]
    fn dimensions_are_distinct() {
        let set: MeasureSet = [m("Property", "a"), m("Property", "b"), m("Region", "US")]
            .into_iter()
            .collect();
        let names: Vec<&str> = set.dimensions().map(|d| d.name()).collect();
        assert_eq!(names, vec!["Property", "Region"]);
    }
}
