//! Mutation Queue Store
//!
//! Durable, insertion-ordered storage of pending mutations keyed by request id.
//! Putting an existing key overwrites the entry where it stands.

pub mod memory;
pub mod persistence;

pub use memory::InMemoryQueueStore;
pub use persistence::SledQueueStore;

use crate::error::StorageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One persisted pending mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub key: String,
    /// Serialized request, opaque to the store.
    pub value: Vec<u8>,
    pub enqueued_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn new(key: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            value,
            enqueued_at: Utc::now(),
        }
    }
}

/// Queue store interface. Implementations make each put/delete atomic.
pub trait QueueStore: Send + Sync {
    /// Insert, or overwrite in place when `key` is already queued.
    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

    fn get(&self, key: &str) -> Result<Option<QueueEntry>, StorageError>;

    /// Remove the entry for `key`, reporting whether it existed.
    fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// Remove the entry at `index` in persisted order.
    fn delete_at(&self, index: usize) -> Result<QueueEntry, StorageError>;

    /// All entries in persisted order.
    fn entries(&self) -> Result<Vec<QueueEntry>, StorageError>;

    fn len(&self) -> Result<usize, StorageError>;

    fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}
