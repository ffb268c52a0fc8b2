//! Normalized Record Store
//!
//! Flat records keyed by reference id, plus per-request optimistic layers that
//! overlay them on read. Flattening responses into records is the job of an
//! external normalizer; the stores here only provide the record primitives and
//! a minimal root-field write used for optimistic patches.

pub mod key;
pub mod layers;
pub mod memory;
pub mod persistence;

pub use key::storage_key;
pub use layers::OptimisticLayers;
pub use memory::InMemoryCacheStore;
pub use persistence::SledCacheStore;

use crate::document::Selection;
use crate::error::StorageError;
use crate::operation::OperationRequest;
use crate::types::{RequestId, REF_FIELD, TYPENAME_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Flat stored representation of one typed entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl NormalizedRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    pub fn with_typename(self, typename: impl Into<String>) -> Self {
        self.with_field(TYPENAME_FIELD, Value::String(typename.into()))
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn typename(&self) -> Option<&str> {
        self.fields.get(TYPENAME_FIELD).and_then(Value::as_str)
    }

    /// Shallow merge: fields in `patch` replace fields of the same key.
    pub fn merge(&mut self, patch: Map<String, Value>) {
        for (key, value) in patch {
            self.fields.insert(key, value);
        }
    }
}

/// Build a reference value pointing at the record `id`.
pub fn reference(id: impl Into<String>) -> Value {
    let mut map = Map::new();
    map.insert(REF_FIELD.to_string(), Value::String(id.into()));
    Value::Object(map)
}

/// The referenced record id, if `value` is a reference.
pub fn as_reference(value: &Value) -> Option<&str> {
    value.as_object()?.get(REF_FIELD)?.as_str()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Keep the write in an optimistic layer instead of the real records.
    pub optimistic: bool,
    pub request_id: Option<RequestId>,
}

/// Read side of the store, all the denormalizer needs.
pub trait RecordSource {
    fn read(&self, id: &str) -> Result<Option<NormalizedRecord>, StorageError>;
}

impl<S: RecordSource + ?Sized> RecordSource for Arc<S> {
    fn read(&self, id: &str) -> Result<Option<NormalizedRecord>, StorageError> {
        (**self).read(id)
    }
}

/// Full cache store interface.
pub trait CacheStore: RecordSource + Send + Sync {
    /// Insert or replace a record.
    fn put_record(&self, record: NormalizedRecord) -> Result<(), StorageError>;

    /// Remove a record. References to it become dangling.
    fn remove_record(&self, id: &str) -> Result<bool, StorageError>;

    /// Merge a response's top-level fields into the operation's root record.
    fn write(
        &self,
        request: &OperationRequest,
        data: &Value,
        options: &WriteOptions,
    ) -> Result<(), StorageError>;

    /// Discard the optimistic layer written for `request_id`, if any.
    fn remove_optimistic(&self, request_id: &RequestId) -> Result<bool, StorageError>;
}

/// Root-record patch for `data` answered to `request`.
///
/// Only direct field selections are written, keyed by storage key; nested
/// values are kept embedded.
pub(crate) fn root_patch(request: &OperationRequest, data: &Value) -> Option<NormalizedRecord> {
    let data = data.as_object()?;
    let kind = request.kind();
    let mut record = NormalizedRecord::new(kind.root_record_id()).with_typename(kind.root_typename());

    for selection in &request.document.operation.selection_set.selections {
        let Selection::Field(field) = selection else {
            continue;
        };
        if let Some(value) = data.get(field.response_key()) {
            let key = storage_key(field, &request.variables, None);
            record.fields.insert(key, value.clone());
        }
    }
    Some(record)
}
