//! Persistence layer for the cache store

use crate::cache::{root_patch, CacheStore, NormalizedRecord, OptimisticLayers, RecordSource, WriteOptions};
use crate::error::{to_storage_data, to_storage_io, StorageError};
use crate::operation::OperationRequest;
use crate::types::RequestId;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use sled::{Db, Tree};
use std::path::Path;

const TREE_RECORDS: &str = "cache_records";

/// Sled-based implementation of CacheStore
///
/// Real records are durable. Optimistic layers live in memory only and are
/// lost on restart; queued mutations still replay, but their optimistic
/// patches are not reapplied.
pub struct SledCacheStore {
    db: Db,
    records: Tree,
    optimistic: RwLock<OptimisticLayers>,
    // Serializes read-modify-write merges into the root records.
    merge_lock: Mutex<()>,
}

impl SledCacheStore {
    /// Open (or create) a store at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(to_storage_io)?;
        Self::from_db(db)
    }

    /// Use an already-open database, e.g. one shared with the queue store.
    pub fn from_db(db: Db) -> Result<Self, StorageError> {
        let records = db.open_tree(TREE_RECORDS).map_err(to_storage_io)?;
        Ok(Self {
            db,
            records,
            optimistic: RwLock::new(OptimisticLayers::new()),
            merge_lock: Mutex::new(()),
        })
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Ids of all durable records, in key order.
    pub fn list_ids(&self) -> Result<Vec<String>, StorageError> {
        let mut ids = Vec::new();
        for item in self.records.iter() {
            let (key, _) = item.map_err(to_storage_io)?;
            ids.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(ids)
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush().map_err(to_storage_io)?;
        Ok(())
    }

    fn get_durable(&self, id: &str) -> Result<Option<NormalizedRecord>, StorageError> {
        let Some(raw) = self.records.get(id.as_bytes()).map_err(to_storage_io)? else {
            return Ok(None);
        };
        let record = serde_json::from_slice(&raw).map_err(to_storage_data)?;
        Ok(Some(record))
    }

    fn put_durable(&self, record: &NormalizedRecord) -> Result<(), StorageError> {
        let value = serde_json::to_vec(record).map_err(to_storage_data)?;
        self.records
            .insert(record.id.as_bytes(), value)
            .map_err(to_storage_io)?;
        Ok(())
    }
}

impl RecordSource for SledCacheStore {
    fn read(&self, id: &str) -> Result<Option<NormalizedRecord>, StorageError> {
        let base = self.get_durable(id)?;
        Ok(self.optimistic.read().overlay(id, base))
    }
}

impl CacheStore for SledCacheStore {
    fn put_record(&self, record: NormalizedRecord) -> Result<(), StorageError> {
        self.put_durable(&record)
    }

    fn remove_record(&self, id: &str) -> Result<bool, StorageError> {
        let removed = self.records.remove(id.as_bytes()).map_err(to_storage_io)?;
        Ok(removed.is_some())
    }

    fn write(
        &self,
        request: &OperationRequest,
        data: &Value,
        options: &WriteOptions,
    ) -> Result<(), StorageError> {
        let Some(patch) = root_patch(request, data) else {
            return Ok(());
        };
        if options.optimistic {
            let request_id = options
                .request_id
                .clone()
                .unwrap_or_else(|| request.request_id.clone());
            self.optimistic.write().apply(&request_id, patch);
            return Ok(());
        }

        let _guard = self.merge_lock.lock();
        let mut record = self
            .get_durable(&patch.id)?
            .unwrap_or_else(|| NormalizedRecord::new(patch.id.clone()));
        record.merge(patch.fields);
        self.put_durable(&record)
    }

    fn remove_optimistic(&self, request_id: &RequestId) -> Result<bool, StorageError> {
        Ok(self.optimistic.write().remove(request_id))
    }
}
