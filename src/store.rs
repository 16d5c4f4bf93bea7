use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

/// A record as the storage layer returns it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub version: i64,
    pub data: serde_json::Value,
}

impl StoredRecord {
    #[must_use]
    pub fn new(version: i64, data: serde_json::Value) -> Self {
        Self { version, data }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Backend(String),
}

/// Read access to record data for permission checks.
///
/// `Ok(None)` means the record doesn't exist.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<StoredRecord>, StorageError>;
}

/// DashMap-backed [`RecordStore`] that also counts lookups.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, StoredRecord>,
    failures: DashMap<String, StorageError>,
    requests: DashMap<String, usize>,
    total_requests: AtomicUsize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data`, bumping the version of an existing record.
    pub fn set(&self, name: impl Into<String>, data: serde_json::Value) {
        let name = name.into();
        let version = self.records.get(&name).map_or(1, |r| r.version + 1);
        self.records.insert(name, StoredRecord::new(version, data));
    }

    /// Builder form of [`set`](Self::set).
    #[must_use]
    pub fn with_record(self, name: impl Into<String>, data: serde_json::Value) -> Self {
        self.set(name, data);
        self
    }

    pub fn remove(&self, name: &str) -> Option<StoredRecord> {
        self.records.remove(name).map(|(_, record)| record)
    }

    /// Make every lookup of `name` fail with `error`.
    pub fn fail(&self, name: impl Into<String>, error: StorageError) {
        self.failures.insert(name.into(), error);
    }

    /// How often `name` was looked up.
    #[must_use]
    pub fn requests_for(&self, name: &str) -> usize {
        self.requests.get(name).map_or(0, |count| *count.value())
    }

    #[must_use]
    pub fn total_requests(&self) -> usize {
        self.total_requests.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, name: &str) -> Result<Option<StoredRecord>, StorageError> {
        *self.requests.entry(name.to_owned()).or_insert(0) += 1;
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        if let Some(error) = self.failures.get(name) {
            return Err(error.value().clone());
        }
        Ok(self.records.get(name).map(|record| record.value().clone()))
    }
}
