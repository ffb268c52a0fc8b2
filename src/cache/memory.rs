//! In-memory cache store.

use crate::cache::{root_patch, CacheStore, NormalizedRecord, OptimisticLayers, RecordSource, WriteOptions};
use crate::error::StorageError;
use crate::operation::OperationRequest;
use crate::types::RequestId;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    records: RwLock<HashMap<String, NormalizedRecord>>,
    optimistic: RwLock<OptimisticLayers>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `records`.
    pub fn with_records(records: impl IntoIterator<Item = NormalizedRecord>) -> Self {
        let store = Self::new();
        {
            let mut map = store.records.write();
            for record in records {
                map.insert(record.id.clone(), record);
            }
        }
        store
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn optimistic_layer_count(&self) -> usize {
        self.optimistic.read().len()
    }
}

impl RecordSource for InMemoryCacheStore {
    fn read(&self, id: &str) -> Result<Option<NormalizedRecord>, StorageError> {
        let base = self.records.read().get(id).cloned();
        Ok(self.optimistic.read().overlay(id, base))
    }
}

impl CacheStore for InMemoryCacheStore {
    fn put_record(&self, record: NormalizedRecord) -> Result<(), StorageError> {
        self.records.write().insert(record.id.clone(), record);
        Ok(())
    }

    fn remove_record(&self, id: &str) -> Result<bool, StorageError> {
        Ok(self.records.write().remove(id).is_some())
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
        let mut records = self.records.write();
        records
            .entry(patch.id.clone())
            .or_insert_with(|| NormalizedRecord::new(patch.id.clone()))
            .merge(patch.fields);
        Ok(())
    }

    fn remove_optimistic(&self, request_id: &RequestId) -> Result<bool, StorageError> {
        Ok(self.optimistic.write().remove(request_id))
    }
}
