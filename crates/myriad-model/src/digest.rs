//! Content digests for clusters and properties.
//!
//! - algorithm: SHA-256
//! - input: a canonical, length-prefixed encoding of the value (measures in
//!   sorted order, so logically equal values hash equally)
//! - output: `"sha256:<64 lowercase hex digits>"`
//!
//! The store records the digest of every property it writes and uses it to
//! check that log replay reproduces the same state.

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;

/// Prefix used in serialized digests.
pub const DIGEST_PREFIX: &str = "sha256:";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Incremental canonical encoder feeding SHA-256.
pub(crate) struct Hasher {
    inner: Sha256,
}

impl Hasher {
    pub(crate) fn new() -> Self {
        Self {
            inner: Sha256::new(),
        }
    }

    /// Length-prefixed so adjacent fields cannot run together.
    pub(crate) fn field(&mut self, bytes: &[u8]) {
        self.inner.update((bytes.len() as u64).to_le_bytes());
        self.inner.update(bytes);
    }

    pub(crate) fn count(&mut self, n: usize) {
        self.inner.update((n as u64).to_le_bytes());
    }

    pub(crate) fn finish(self) -> Digest {
        let bytes = self.inner.finalize();
        let mut out = String::with_capacity(DIGEST_PREFIX.len() + bytes.len() * 2);
        out.push_str(DIGEST_PREFIX);
        for b in bytes.iter() {
            out.push_str(&format!("{b:02x}"));
        }
        Digest(out)
    }
}
