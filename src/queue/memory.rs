//! In-memory queue store, for tests and ephemeral clients.

use crate::error::StorageError;
use crate::queue::{QueueEntry, QueueStore};
use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct InMemoryQueueStore {
    entries: Mutex<Vec<QueueEntry>>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueueStore for InMemoryQueueStore {
    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        let mut entries = self.entries.lock();
        match entries.iter_mut().find(|entry| entry.key == key) {
            Some(existing) => existing.value = value,
            None => entries.push(QueueEntry::new(key, value)),
        }
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<QueueEntry>, StorageError> {
        Ok(self.entries.lock().iter().find(|e| e.key == key).cloned())
    }

    fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|entry| entry.key != key);
        Ok(entries.len() != before)
    }

    fn delete_at(&self, index: usize) -> Result<QueueEntry, StorageError> {
        let mut entries = self.entries.lock();
        if index >= entries.len() {
            return Err(StorageError::PositionOutOfRange {
                index,
                len: entries.len(),
            });
        }
        Ok(entries.remove(index))
    }

    fn entries(&self) -> Result<Vec<QueueEntry>, StorageError> {
        Ok(self.entries.lock().clone())
    }

    fn len(&self) -> Result<usize, StorageError> {
        Ok(self.entries.lock().len())
    }
}
