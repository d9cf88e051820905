/// In-process object store.
///
/// Holds sealed objects in memory only. Used for dry runs and as the storage
/// double in tests.
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::{ObjectStore, StorageKey, StorageLocation, UploadResult};
use crate::crypto::hash;
use crate::error::{LogsealError, Result};

/// Object limit for `--dry-run`.
pub const DRY_RUN_MAX_OBJECTS: usize = 1024;

#[derive(Default)]
pub struct MemoryStore {
    objects: DashMap<String, Vec<u8>>,
    puts: AtomicUsize,
    max_objects: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that refuses new keys once `max_objects` are held.
    /// Overwrites of existing keys are always accepted. Concurrent puts of
    /// new keys may overshoot the limit by the number of writers in flight.
    pub fn with_max_objects(max_objects: usize) -> Self {
        Self {
            max_objects: Some(max_objects),
            ..Self::default()
        }
    }

    fn object_path(location: &StorageLocation, key: &StorageKey) -> String {
        format!("{}/{}", location.bucket, key)
    }

    /// Current contents of an object, if any.
    pub fn get(&self, location: &StorageLocation, key: &StorageKey) -> Option<Vec<u8>> {
        self.objects
            .get(&Self::object_path(location, key))
            .map(|entry| entry.value().clone())
    }

    /// Number of `put` calls received, including overwrites.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Number of distinct objects stored.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn check(&self, _location: &StorageLocation) -> Result<()> {
        Ok(())
    }

    async fn put(
        &self,
        location: &StorageLocation,
        key: &StorageKey,
        data: Vec<u8>,
    ) -> Result<UploadResult> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let path = Self::object_path(location, key);

        if let Some(max) = self.max_objects {
            if self.objects.len() >= max && !self.objects.contains_key(&path) {
                return Err(LogsealError::BackendRejected(format!(
                    "Memory store is full ({max} objects)"
                )));
            }
        }

        let result = UploadResult {
            storage_key: key.to_string(),
            content_hash: hash::hash(&data),
            size: data.len() as u64,
        };
        self.objects.insert(path, data);
        debug!(objects = self.objects.len(), "Object kept in memory");
        Ok(result)
    }
}
