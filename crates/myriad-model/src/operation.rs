//! Operations: tagged mutations applied to clusters.

use crate::cluster::Cluster;
use crate::epoch::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a single value changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation<T> {
    Add { new: T },
    Update { old: T, new: T },
    Remove { old: T },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Add,
    Update,
    Remove,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Add => f.write_str("add"),
            OperationKind::Update => f.write_str("update"),
            OperationKind::Remove => f.write_str("remove"),
        }
    }
}

impl<T> Operation<T> {
    pub fn add(new: T) -> Self {
        Operation::Add { new }
    }

    pub fn update(old: T, new: T) -> Self {
        Operation::Update { old, new }
    }

    pub fn remove(old: T) -> Self {
        Operation::Remove { old }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Add { .. } => OperationKind::Add,
            Operation::Update { .. } => OperationKind::Update,
            Operation::Remove { .. } => OperationKind::Remove,
        }
    }

    /// The value being replaced or removed; `None` for `Add`.
    pub fn old(&self) -> Option<&T> {
        match self {
            Operation::Add { .. } => None,
            Operation::Update { old, .. } | Operation::Remove { old } => Some(old),
        }
    }

    /// The value being introduced; `None` for `Remove`.
    pub fn new_value(&self) -> Option<&T> {
        match self {
            Operation::Add { new } | Operation::Update { new, .. } => Some(new),
            Operation::Remove { .. } => None,
        }
    }
}

/// A batch of cluster operations against one property, applied atomically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyOperation {
    pub key: String,
    pub description: String,
    pub deprecated: bool,
    pub timestamp: Timestamp,
    pub operations: Vec<Operation<Cluster>>,
}

impl PropertyOperation {
    pub fn new(
        key: impl Into<String>,
        description: impl Into<String>,
        deprecated: bool,
        timestamp: Timestamp,
        operations: Vec<Operation<Cluster>>,
    ) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            deprecated,
            timestamp,
            operations,
        }
    }
}
