//! Durable state: a write-ahead log plus a periodic JSON snapshot.
//!
//! ```text
//! <data_dir>/
//!   snapshot.json   catalog + properties as of the last checkpoint
//!   myriad.wal      [len: u32 LE][bincode WalEntry] ... since that checkpoint
//! ```
//!
//! Recovery loads the snapshot, then replays the log on top of it. A record
//! cut short by a crash mid-append is dropped with a warning.

use crate::error::{PersistenceError, Result};
use myriad_model::digest::Digest;
use myriad_model::{DimensionValues, Measure, Property, PropertyOperation};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

pub const WAL_FILE: &str = "myriad.wal";
pub const SNAPSHOT_FILE: &str = "snapshot.json";
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalEntry {
    /// An applied batch and the digest of the property it produced.
    PutProperty {
        operation: PropertyOperation,
        digest: Digest,
    },
    AddDimension {
        name: String,
    },
    AddMeasure {
        measure: Measure,
    },
}

pub struct WriteAheadLog {
    file: Mutex<File>,
    path: PathBuf,
    sync: bool,
    appended: AtomicUsize,
}

impl WriteAheadLog {
    pub fn open(path: &Path, sync: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)
            .map_err(PersistenceError::from)?;

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
            sync,
            appended: AtomicUsize::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries appended since the log was opened or last truncated.
    pub fn appended(&self) -> usize {
        self.appended.load(Ordering::Relaxed)
    }

    pub fn append(&self, entry: &WalEntry) -> Result<()> {
        let data = bincode::serialize(entry).map_err(PersistenceError::from)?;
        let len = u32::try_from(data.len()).map_err(|_| {
            PersistenceError::Io(std::io::Error::new(
                ErrorKind::InvalidData,
                "log record exceeds 4 GiB",
            ))
        })?;

        let mut file = self.file.lock();
        let mut record = Vec::with_capacity(data.len() + 4);
        record.extend_from_slice(&len.to_le_bytes());
        record.extend_from_slice(&data);
        file.write_all(&record).map_err(PersistenceError::from)?;
        if self.sync {
            file.sync_data().map_err(PersistenceError::from)?;
        }
        self.appended.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Feed every complete record to `handler`, in append order.
    ///
    /// A torn record at the tail is cut off the file so later appends land
    /// directly after the last complete one.
    pub fn replay<F>(&self, mut handler: F) -> Result<usize>
    where
        F: FnMut(WalEntry) -> Result<()>,
    {
        let mut file = self.file.lock();
        let size = file.metadata().map_err(PersistenceError::from)?.len();
        file.seek(SeekFrom::Start(0)).map_err(PersistenceError::from)?;

        let mut replayed = 0;
        let mut offset: u64 = 0;
        while offset < size {
            let remaining = size - offset;
            if remaining < 4 {
                break;
            }
            let mut len_bytes = [0u8; 4];
            file.read_exact(&mut len_bytes).map_err(PersistenceError::from)?;

            let len = u64::from(u32::from_le_bytes(len_bytes));
            if len > remaining - 4 {
                break;
            }
            let mut data = vec![0u8; len as usize];
            file.read_exact(&mut data).map_err(PersistenceError::from)?;

            let entry: WalEntry = bincode::deserialize(&data).map_err(PersistenceError::from)?;
            handler(entry)?;
            replayed += 1;
            offset += 4 + len;
        }

        if offset < size {
            tracing::warn!(
                path = %self.path.display(),
                after = replayed,
                dropped = size - offset,
                "dropping torn record at end of log"
            );
            file.set_len(offset).map_err(PersistenceError::from)?;
            file.sync_data().map_err(PersistenceError::from)?;
        }

        Ok(replayed)
    }

    pub fn truncate(&self) -> Result<()> {
        let mut file = self.file.lock();
        file.set_len(0).map_err(PersistenceError::from)?;
        file.seek(SeekFrom::Start(0)).map_err(PersistenceError::from)?;
        if self.sync {
            file.sync_data().map_err(PersistenceError::from)?;
        }
        self.appended.store(0, Ordering::Relaxed);
        Ok(())
    }
}

/// Everything needed to rebuild a store without the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub dimensions: Vec<DimensionValues>,
    pub properties: Vec<Property>,
}

impl Snapshot {
    pub fn new(dimensions: Vec<DimensionValues>, properties: Vec<Property>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            dimensions,
            properties,
        }
    }

    /// `None` when no snapshot has been written yet.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PersistenceError::Io(e).into()),
        };
        let snapshot = serde_json::from_str(&text).map_err(PersistenceError::from)?;
        Ok(Some(snapshot))
    }

    /// Write to a sibling temp file, then rename over `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).map_err(PersistenceError::from)?;
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = File::create(&tmp).map_err(PersistenceError::from)?;
            file.write_all(&json).map_err(PersistenceError::from)?;
            file.sync_all().map_err(PersistenceError::from)?;
        }
        fs::rename(&tmp, path).map_err(PersistenceError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use myriad_model::{Cluster, Dimension, MeasureSet, Operation};
    use tempfile::tempdir;

    fn put(key: &str) -> WalEntry {
        let cluster = Cluster::new("42", MeasureSet::new(), "alice", 100);
        let operation = PropertyOperation::new(key, "", false, 100, vec![Operation::add(cluster)]);
        let mut property = Property::new(key, "", false, 100).unwrap();
        property.clusters = vec![Cluster::new("42", MeasureSet::new(), "alice", 100)];
        WalEntry::PutProperty {
            operation,
            digest: property.digest(),
        }
    }

    fn collect(wal: &WriteAheadLog) -> Vec<WalEntry> {
        let mut entries = Vec::new();
        wal.replay(|entry| {
            entries.push(entry);
            Ok(())
        })
        .unwrap();
        entries
    }

    #[test]
    fn replay_returns_entries_in_append_order() {
        let dir = tempdir().unwrap();
        let wal = WriteAheadLog::open(&dir.path().join(WAL_FILE), false).unwrap();
        let entries = vec![
            WalEntry::AddDimension { name: "Region".into() },
            WalEntry::AddMeasure {
                measure: Measure::parse("Region", "US").unwrap(),
            },
            put("Latency"),
        ];
        for entry in &entries {
            wal.append(entry).unwrap();
        }
        assert_eq!(wal.appended(), 3);
        assert_eq!(collect(&wal), entries);
    }

    #[test]
    fn log_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(WAL_FILE);
        {
            let wal = WriteAheadLog::open(&path, true).unwrap();
            wal.append(&put("Latency")).unwrap();
        }
        let wal = WriteAheadLog::open(&path, true).unwrap();
        assert_eq!(collect(&wal), vec![put("Latency")]);
        assert_eq!(wal.appended(), 0);
    }

    fn tear(path: &Path, bytes: &[u8]) {
        let mut file = OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(bytes).unwrap();
    }

    #[test]
    fn torn_tail_is_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(WAL_FILE);
        {
            let wal = WriteAheadLog::open(&path, false).unwrap();
            wal.append(&put("Latency")).unwrap();
        }
        let intact = fs::metadata(&path).unwrap().len();
        let mut torn = 64u32.to_le_bytes().to_vec();
        torn.extend_from_slice(&[1, 2, 3]);
        tear(&path, &torn);

        let wal = WriteAheadLog::open(&path, false).unwrap();
        assert_eq!(collect(&wal).len(), 1);
        assert_eq!(fs::metadata(&path).unwrap().len(), intact);
    }

    #[test]
    fn appends_after_a_torn_tail_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(WAL_FILE);
        {
            let wal = WriteAheadLog::open(&path, false).unwrap();
            wal.append(&put("Latency")).unwrap();
        }
        tear(&path, &[7, 0]);
        {
            let wal = WriteAheadLog::open(&path, false).unwrap();
            assert_eq!(collect(&wal).len(), 1);
            wal.append(&put("Timeout")).unwrap();
        }
        let wal = WriteAheadLog::open(&path, false).unwrap();
        assert_eq!(collect(&wal), vec![put("Latency"), put("Timeout")]);
    }

    #[test]
    fn oversized_length_header_is_treated_as_torn() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(WAL_FILE);
        {
            let wal = WriteAheadLog::open(&path, false).unwrap();
            wal.append(&put("Latency")).unwrap();
        }
        tear(&path, &u32::MAX.to_le_bytes());
        let wal = WriteAheadLog::open(&path, false).unwrap();
        assert_eq!(collect(&wal), vec![put("Latency")]);
    }

    #[test]
    fn truncate_empties_the_log() {
        let dir = tempdir().unwrap();
        let wal = WriteAheadLog::open(&dir.path().join(WAL_FILE), false).unwrap();
        wal.append(&put("Latency")).unwrap();
        wal.truncate().unwrap();
        assert!(collect(&wal).is_empty());
        assert_eq!(wal.appended(), 0);

        wal.append(&put("Timeout")).unwrap();
        assert_eq!(collect(&wal), vec![put("Timeout")]);
    }

    #[test]
    fn snapshot_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SNAPSHOT_FILE);
        assert!(Snapshot::load(&path).unwrap().is_none());

        let region = DimensionValues::new(Dimension::new("Region").unwrap(), ["US", "EU"]);
        let property = Property::new("Latency", "p99", false, 5).unwrap();
        let snapshot = Snapshot::new(vec![region], vec![property]);
        snapshot.save(&path).unwrap();

        assert_eq!(Snapshot::load(&path).unwrap(), Some(snapshot));
        assert!(!path.with_extension("json.tmp").exists());
    }
}
