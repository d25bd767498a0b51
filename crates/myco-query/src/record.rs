//! Saved queries.
//!
//! A [`QueryRecord`] is enough to rebuild a query in another process: the
//! record type, the normalized params and the context the compile read.
//! Records are keyed by fingerprint.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::compiler::QuerySpec;
use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::param::ParamMap;
use crate::schema::RecordType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub fingerprint: Fingerprint,
    pub record_type: RecordType,
    pub params: ParamMap,
    #[serde(default, skip_serializing_if = "ParamMap::is_empty")]
    pub context: ParamMap,
    pub last_accessed: DateTime<Utc>,
}

impl QueryRecord {
    pub fn from_spec(spec: &QuerySpec) -> Self {
        Self {
            fingerprint: spec.fingerprint.clone(),
            record_type: spec.record_type,
            params: spec.params.clone(),
            context: spec.context.clone(),
            last_accessed: Utc::now(),
        }
    }
}

/// Storage for saved queries.
pub trait QueryRecordStore: Send + Sync {
    /// Inserts or replaces the record with the same fingerprint.
    fn save(&self, record: QueryRecord) -> Result<()>;

    fn load(&self, fingerprint: &Fingerprint) -> Result<Option<QueryRecord>>;

    /// Bumps `last_accessed`. Returns `false` if there is no such record.
    fn touch(&self, fingerprint: &Fingerprint) -> Result<bool>;

    /// Deletes records not accessed within `older_than`. Returns how many
    /// were deleted.
    fn prune(&self, older_than: Duration) -> Result<usize>;
}

type Records = BTreeMap<Fingerprint, QueryRecord>;

fn prune_records(records: &mut Records, older_than: Duration) -> usize {
    let cutoff = Utc::now() - older_than;
    let before = records.len();
    records.retain(|_, record| record.last_accessed >= cutoff);
    before - records.len()
}

/// Records held for the life of the process.
#[derive(Debug, Default)]
pub struct MemoryRecords {
    records: RwLock<Records>,
}

impl MemoryRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl QueryRecordStore for MemoryRecords {
    fn save(&self, record: QueryRecord) -> Result<()> {
        self.records.write().insert(record.fingerprint.clone(), record);
        Ok(())
    }

    fn load(&self, fingerprint: &Fingerprint) -> Result<Option<QueryRecord>> {
        Ok(self.records.read().get(fingerprint).cloned())
    }

    fn touch(&self, fingerprint: &Fingerprint) -> Result<bool> {
        Ok(match self.records.write().get_mut(fingerprint) {
            Some(record) => {
                record.last_accessed = Utc::now();
                true
            }
            None => false,
        })
    }

    fn prune(&self, older_than: Duration) -> Result<usize> {
        Ok(prune_records(&mut self.records.write(), older_than))
    }
}

/// Records kept in one JSON file, rewritten on every change.
///
/// The file holds an object mapping fingerprints to records. A missing file
/// is an empty store.
#[derive(Debug)]
pub struct JsonFileRecords {
    path: PathBuf,
    records: RwLock<Records>,
}

impl JsonFileRecords {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => Records::new(),
            Ok(text) => serde_json::from_str(&text)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Records::new(),
            Err(err) => return Err(err.into()),
        };
        tracing::debug!(path = %path.display(), records = records.len(), "opened query records");
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, records: &Records) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_string_pretty(records)?)?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

impl QueryRecordStore for JsonFileRecords {
    fn save(&self, record: QueryRecord) -> Result<()> {
        let mut records = self.records.write();
        records.insert(record.fingerprint.clone(), record);
        self.write(&records)
    }

    fn load(&self, fingerprint: &Fingerprint) -> Result<Option<QueryRecord>> {
        Ok(self.records.read().get(fingerprint).cloned())
    }

    fn touch(&self, fingerprint: &Fingerprint) -> Result<bool> {
        let mut records = self.records.write();
        let Some(record) = records.get_mut(fingerprint) else {
            return Ok(false);
        };
        record.last_accessed = Utc::now();
        self.write(&records)?;
        Ok(true)
    }

    fn prune(&self, older_than: Duration) -> Result<usize> {
        let mut records = self.records.write();
        let pruned = prune_records(&mut records, older_than);
        if pruned > 0 {
            self.write(&records)?;
            tracing::debug!(pruned, "pruned query records");
        }
        Ok(pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;

    fn record(n: i64, age: Duration) -> QueryRecord {
        let params = params! { "id_in_set" => vec![n] };
        QueryRecord {
            fingerprint: Fingerprint::of(RecordType::Observation, &params, &ParamMap::new()),
            record_type: RecordType::Observation,
            params,
            context: ParamMap::new(),
            last_accessed: Utc::now() - age,
        }
    }

    #[test]
    fn memory_prune_keeps_recent() {
        let store = MemoryRecords::new();
        let fresh = record(1, Duration::zero());
        store.save(fresh.clone()).unwrap();
        store.save(record(2, Duration::days(30))).unwrap();

        assert_eq!(store.prune(Duration::days(7)).unwrap(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.load(&fresh.fingerprint).unwrap(), Some(fresh));
    }

    #[test]
    fn touch_refreshes() {
        let store = MemoryRecords::new();
        let old = record(1, Duration::days(30));
        store.save(old.clone()).unwrap();
        assert!(store.touch(&old.fingerprint).unwrap());
        assert_eq!(store.prune(Duration::days(7)).unwrap(), 0);

        let missing = record(9, Duration::zero()).fingerprint;
        assert!(!store.touch(&missing).unwrap());
    }

    #[test]
    fn serialized_form() {
        let json = serde_json::to_value(record(1, Duration::zero())).unwrap();
        assert_eq!(json["record_type"], "observation");
        assert_eq!(json["params"]["id_in_set"], serde_json::json!([1]));
        assert!(json.get("context").is_none());
    }
}
