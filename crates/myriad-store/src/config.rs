//! Store configuration.

use myriad_model::PROPERTY_DIMENSION;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a [`crate::MyriadStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the write-ahead log and snapshot. `None` keeps the
    /// store in memory only.
    pub data_dir: Option<PathBuf>,
    /// Dimensions registered at bootstrap, after the property dimension.
    pub dimensions: Vec<String>,
    /// Name of the tagging/context dimension. Always registered first and
    /// always repeatable.
    pub property_dimension: String,
    /// Whether `GetDimensionList` includes the property dimension.
    pub list_property_dimension: bool,
    /// Longest a write waits for another writer on the same key.
    pub lock_timeout_ms: u64,
    /// fsync every log append.
    pub sync_writes: bool,
    /// Checkpoint after this many log appends.
    pub checkpoint_every: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            dimensions: Vec::new(),
            property_dimension: PROPERTY_DIMENSION.to_string(),
            list_property_dimension: true,
            lock_timeout_ms: 5_000,
            sync_writes: true,
            checkpoint_every: Some(1_000),
        }
    }
}

impl StoreConfig {
    /// In-memory store with the given bootstrap dimensions.
    pub fn in_memory<I, S>(dimensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dimensions: dimensions.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
