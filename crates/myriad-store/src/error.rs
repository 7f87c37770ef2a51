//! Error types for store operations.

use myriad_model::{MeasureSet, ValidationError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed request; nothing was changed.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Optimistic-concurrency precondition failed; the whole batch was
    /// discarded and the caller must re-read and retry.
    #[error(transparent)]
    Conflict(#[from] Conflict),

    /// The channel to a remote store failed. Never retried here.
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),

    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistenceError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("conflict on property `{key}`: {kind}")]
pub struct Conflict {
    pub key: String,
    pub kind: ConflictKind,
}

impl Conflict {
    pub fn new(key: impl Into<String>, kind: ConflictKind) -> Self {
        Self {
            key: key.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ConflictKind {
    #[error("a cluster already occupies {measures}")]
    DuplicateCluster { measures: MeasureSet },

    #[error("no cluster occupies {measures}")]
    MissingCluster { measures: MeasureSet },

    #[error("the cluster at {measures} has been superseded")]
    StaleRevision { measures: MeasureSet },

    #[error("timed out waiting for a concurrent write")]
    Busy,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum TransportError {
    #[error("unsupported uri scheme `{scheme}`")]
    UnsupportedScheme { scheme: String },

    #[error("no service reachable at `{uri}`")]
    Unreachable { uri: String },

    #[error("malformed {what}: {message}")]
    Malformed { what: String, message: String },

    #[error("remote failure: {message}")]
    Remote { message: String },
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("log encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("replay of `{key}` produced {actual}, log recorded {expected}")]
    ReplayDiverged {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("log replay rejected an entry: {0}")]
    ReplayRejected(String),
}
