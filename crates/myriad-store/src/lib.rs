//! Myriad Property Store
//!
//! Owns the canonical property collection and the dimension catalog, and
//! answers the request/response protocol over both:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          MYRIAD STORE                            │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  ┌──────────┐   Request   ┌──────────────┐     ┌──────────────┐  │
//! │  │  Client  │────────────►│              │────►│  Property    │  │
//! │  │ (uri +   │             │  MyriadStore │     │  Store       │  │
//! │  │transport)│◄────────────│              │     │ (per-key)    │  │
//! │  └──────────┘   Response  │              │     └──────────────┘  │
//! │                           │              │     ┌──────────────┐  │
//! │                           │              │────►│  Dimension   │  │
//! │                           └──────┬───────┘     │  Catalog     │  │
//! │                                  │             └──────────────┘  │
//! │                                  ▼                               │
//! │                    ┌──────────────────────────┐                  │
//! │                    │ myriad.wal + snapshot    │                  │
//! │                    └──────────────────────────┘                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Features
//!
//! - **Optimistic concurrency**: updates name the cluster they replace; a
//!   stale reference is rejected, never merged
//! - **Per-key isolation**: writes to different keys never contend; readers
//!   never block
//! - **Durable**: every accepted mutation is logged before it becomes visible

pub mod apply;
pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod persistence;
pub mod protocol;
pub mod query;
pub mod store;


pub use catalog::DimensionCatalog;
pub use client::{LocalTransport, MyriadClient, Transport};
pub use config::StoreConfig;
pub use error::{Conflict, ConflictKind, Error, PersistenceError, Result, TransportError};
pub use query::{Query, QueryFilter, Row};
pub use store::{GetResult, PropertyStore};

use myriad_model::property::validate_key;
use myriad_model::{DimensionValues, Measure, MeasureSet, Property, PropertyOperation, ValidationError};
use parking_lot::RwLock;
use persistence::{Snapshot, WalEntry, WriteAheadLog, SNAPSHOT_FILE, WAL_FILE};
use std::path::PathBuf;
use std::sync::Arc;

pub struct MyriadStore {
    config: StoreConfig,
    properties: Arc<PropertyStore>,
    catalog: Arc<DimensionCatalog>,
    wal: Option<WriteAheadLog>,
    /// Mutations hold this shared; a checkpoint holds it exclusively so the
    /// snapshot and the truncated log agree.
    checkpoint_gate: RwLock<()>,
}

impl MyriadStore {
    /// Open (or create) a store. With a `data_dir`, the last snapshot is
    /// loaded and the log replayed over it.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let mut store = Self {
            properties: Arc::new(PropertyStore::new(
                config.lock_timeout(),
                config.property_dimension.clone(),
            )),
            catalog: Arc::new(DimensionCatalog::new(&config)?),
            wal: None,
            checkpoint_gate: RwLock::new(()),
            config,
        };

        if let Some(dir) = store.config.data_dir.clone() {
            std::fs::create_dir_all(&dir).map_err(PersistenceError::from)?;
            store.load_snapshot(&dir.join(SNAPSHOT_FILE))?;

            let wal = WriteAheadLog::open(&dir.join(WAL_FILE), store.config.sync_writes)?;
            let replayed = wal.replay(|entry| store.replay_entry(entry))?;
            tracing::info!(
                dir = %dir.display(),
                properties = store.properties.len(),
                replayed,
                "opened store"
            );
            store.wal = Some(wal);
        }

        Ok(store)
    }

    /// A store with no backing files.
    pub fn in_memory(config: StoreConfig) -> Result<Self> {
        Self::open(StoreConfig {
            data_dir: None,
            ..config
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn catalog(&self) -> &DimensionCatalog {
        &self.catalog
    }

    fn load_snapshot(&self, path: &std::path::Path) -> Result<()> {
        let Some(snapshot) = Snapshot::load(path)? else {
            return Ok(());
        };
        self.catalog.restore(snapshot.dimensions)?;
        for property in snapshot.properties {
            self.observe(&property);
            self.properties.restore(property);
        }
        Ok(())
    }

    fn replay_entry(&self, entry: WalEntry) -> Result<()> {
        match entry {
            WalEntry::PutProperty { operation, digest } => {
                let applied = self.properties.put(&operation, |next| {
                    let actual = next.digest();
                    if actual != digest {
                        return Err(PersistenceError::ReplayDiverged {
                            key: next.key.clone(),
                            expected: digest.to_string(),
                            actual: actual.to_string(),
                        }
                        .into());
                    }
                    Ok(())
                });
                match applied {
                    Ok(property) => self.observe(&property),
                    Err(Error::Conflict(conflict)) => {
                        return Err(PersistenceError::ReplayRejected(conflict.to_string()).into())
                    }
                    Err(e) => return Err(e),
                }
            }
            WalEntry::AddDimension { name } => {
                self.catalog.add_dimension(&name, |_| Ok(()))?;
            }
            WalEntry::AddMeasure { measure } => {
                self.catalog.add_measure(&measure, |_| Ok(()))?;
            }
        }
        Ok(())
    }

    fn journal(&self, entry: WalEntry) -> Result<()> {
        match &self.wal {
            Some(wal) => wal.append(&entry),
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Every dimension with its known values, in registration order.
    pub fn get_metadata(&self) -> Vec<DimensionValues> {
        self.catalog.metadata()
    }

    pub fn get_dimension_list(&self) -> Vec<String> {
        self.catalog.dimension_list()
    }

    /// Build a lazy, restartable query. Filters naming unknown dimensions are
    /// rejected up front.
    pub fn query(&self, filters: &[DimensionValues]) -> Result<Query> {
        let filter = QueryFilter::new(filters, &self.catalog)?;
        tracing::debug!(
            filters = filters.len(),
            unrestricted = filter.is_unrestricted(),
            "query"
        );
        Ok(Query::new(Arc::clone(&self.properties), filter))
    }

    /// Properties with a cluster whose measure set contains `context`. No
    /// match is an empty result, not an error.
    pub fn get(&self, context: &MeasureSet) -> Result<GetResult> {
        for measure in context {
            measure.validate()?;
            if !self.catalog.contains(measure.dimension.name()) {
                return Err(unknown_dimension(measure).into());
            }
        }
        let result = self.properties.get(context);
        tracing::debug!(context = %context, matches = result.properties.len(), "get");
        Ok(result)
    }

    pub fn get_properties(&self, keys: &[String]) -> Vec<Arc<Property>> {
        self.properties.get_properties(keys)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Validate and apply one batch. On success returns the new canonical
    /// value; on any failure nothing changes.
    pub fn put_property(&self, op: &PropertyOperation) -> Result<Arc<Property>> {
        self.validate_operation(op)?;
        tracing::debug!(
            key = %op.key,
            kinds = %op
                .operations
                .iter()
                .map(|o| o.kind().to_string())
                .collect::<Vec<_>>()
                .join(","),
            "applying put"
        );

        let property = {
            let _gate = self.checkpoint_gate.read();
            let applied = self.properties.put(op, |next| {
                self.journal(WalEntry::PutProperty {
                    operation: op.clone(),
                    digest: next.digest(),
                })
            });
            match applied {
                Ok(property) => {
                    // Still under the gate: a checkpoint must not capture the
                    // property without its catalog values.
                    self.observe(&property);
                    property
                }
                Err(e) => {
                    tracing::warn!(key = %op.key, error = %e, "rejected put");
                    return Err(e);
                }
            }
        };

        tracing::info!(
            key = %property.key,
            ops = op.operations.len(),
            clusters = property.clusters.len(),
            "applied put"
        );
        self.maybe_checkpoint()?;
        Ok(property)
    }

    fn validate_operation(&self, op: &PropertyOperation) -> Result<()> {
        validate_key(&op.key)?;
        for operation in &op.operations {
            for cluster in operation.old().into_iter().chain(operation.new_value()) {
                self.catalog.validate_measures(&cluster.measures)?;
            }
        }
        Ok(())
    }

    /// Feed the key and every measure value of a stored property back into
    /// the catalog.
    fn observe(&self, property: &Property) {
        self.catalog
            .observe(self.catalog.property_dimension(), &property.key);
        for cluster in &property.clusters {
            for measure in &cluster.measures {
                self.catalog.observe(measure.dimension.name(), &measure.value);
            }
        }
    }

    /// Register a value under an existing dimension. Idempotent.
    pub fn add_measure(&self, measure: &Measure) -> Result<DimensionValues> {
        let values = {
            let _gate = self.checkpoint_gate.read();
            self.catalog.add_measure(measure, |m| {
                self.journal(WalEntry::AddMeasure { measure: m.clone() })
            })?
        };
        self.maybe_checkpoint()?;
        Ok(values)
    }

    /// Register a new, initially empty dimension. Idempotent.
    pub fn add_dimension(&self, name: &str) -> Result<DimensionValues> {
        let values = {
            let _gate = self.checkpoint_gate.read();
            self.catalog.add_dimension(name, |d| {
                self.journal(WalEntry::AddDimension {
                    name: d.name().to_string(),
                })
            })?
        };
        self.maybe_checkpoint()?;
        Ok(values)
    }

    // ------------------------------------------------------------------
    // Checkpointing
    // ------------------------------------------------------------------

    fn data_dir(&self) -> Option<PathBuf> {
        self.config.data_dir.clone()
    }

    fn maybe_checkpoint(&self) -> Result<()> {
        let (Some(wal), Some(every)) = (&self.wal, self.config.checkpoint_every) else {
            return Ok(());
        };
        if every > 0 && wal.appended() >= every {
            self.checkpoint()?;
        }
        Ok(())
    }

    /// Write a snapshot of the whole store and empty the log. No-op for an
    /// in-memory store.
    pub fn checkpoint(&self) -> Result<()> {
        let (Some(wal), Some(dir)) = (&self.wal, self.data_dir()) else {
            return Ok(());
        };

        let _gate = self.checkpoint_gate.write();
        let snapshot = Snapshot::new(
            self.catalog.metadata(),
            self.properties.snapshots().map(|p| (*p).clone()).collect(),
        );
        snapshot.save(&dir.join(SNAPSHOT_FILE))?;
        wal.truncate()?;
        tracing::info!(
            dir = %dir.display(),
            properties = snapshot.properties.len(),
            "checkpoint written"
        );
        Ok(())
    }
}

fn unknown_dimension(measure: &Measure) -> ValidationError {
    ValidationError::UnknownDimension {
        dimension: measure.dimension.name().to_string(),
    }
}
