//! Durable sled-backed mutation queue.
//!
//! Two trees: entries keyed by a big-endian sequence number, which keeps
//! iteration in insertion order, and an index from request id to sequence.
//! Every write touches both trees in one transaction, so an entry is never
//! listed without being reachable by its key.

use std::path::Path;

use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::{Db, IVec, Transactional, Tree};

use crate::error::{to_storage_data, to_storage_io, StorageError};
use crate::queue::{QueueEntry, QueueStore};

const TREE_ENTRIES: &str = "queue_entries";
const TREE_INDEX: &str = "queue_index";

pub struct SledQueueStore {
    db: Db,
    entries: Tree,
    index: Tree,
}

impl SledQueueStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(to_storage_io)?;
        Self::from_db(db)
    }

    pub fn from_db(db: Db) -> Result<Self, StorageError> {
        let entries = db.open_tree(TREE_ENTRIES).map_err(to_storage_io)?;
        let index = db.open_tree(TREE_INDEX).map_err(to_storage_io)?;
        Ok(Self { db, entries, index })
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush().map_err(to_storage_io)?;
        Ok(())
    }

    fn sequence_of(&self, key: &str) -> Result<Option<sled::IVec>, StorageError> {
        self.index.get(key.as_bytes()).map_err(to_storage_io)
    }

    fn decode(raw: &[u8]) -> Result<QueueEntry, StorageError> {
        bincode::deserialize(raw).map_err(to_storage_data)
    }

    fn encode(entry: &QueueEntry) -> Result<Vec<u8>, StorageError> {
        bincode::serialize(entry).map_err(to_storage_data)
    }

    /// Run `f` over both trees as one atomic transaction.
    fn transact<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        F: Fn(&TransactionalTree, &TransactionalTree) -> Result<T, ConflictableTransactionError<StorageError>>,
    {
        (&self.entries, &self.index)
            .transaction(|(entries, index)| f(entries, index))
            .map_err(|err| match err {
                TransactionError::Abort(err) => err,
                TransactionError::Storage(err) => to_storage_io(err),
            })
    }
}

fn abort(err: StorageError) -> ConflictableTransactionError<StorageError> {
    ConflictableTransactionError::Abort(err)
}

impl QueueStore for SledQueueStore {
    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        // Only used when the key is new; ids need not be contiguous.
        let fresh: IVec = self
            .db
            .generate_id()
            .map_err(to_storage_io)?
            .to_be_bytes()
            .to_vec()
            .into();

        self.transact(|entries, index| {
            if let Some(seq) = index.get(key.as_bytes())? {
                let mut entry = match entries.get(&seq)? {
                    Some(raw) => Self::decode(&raw).map_err(abort)?,
                    None => QueueEntry::new(key, Vec::new()),
                };
                entry.value = value.clone();
                entries.insert(seq, Self::encode(&entry).map_err(abort)?)?;
                return Ok(());
            }

            let entry = QueueEntry::new(key, value.clone());
            entries.insert(fresh.clone(), Self::encode(&entry).map_err(abort)?)?;
            index.insert(key.as_bytes(), fresh.clone())?;
            Ok(())
        })
    }

    fn get(&self, key: &str) -> Result<Option<QueueEntry>, StorageError> {
        let Some(seq) = self.sequence_of(key)? else {
            return Ok(None);
        };
        match self.entries.get(&seq).map_err(to_storage_io)? {
            Some(raw) => Ok(Some(Self::decode(&raw)?)),
            None => Ok(None),
        }
    }

    fn delete(&self, key: &str) -> Result<bool, StorageError> {
        self.transact(|entries, index| {
            let Some(seq) = index.remove(key.as_bytes())? else {
                return Ok(false);
            };
            entries.remove(seq)?;
            Ok(true)
        })
    }

    fn delete_at(&self, position: usize) -> Result<QueueEntry, StorageError> {
        let out_of_range = || StorageError::PositionOutOfRange {
            index: position,
            len: self.entries.len(),
        };
        let Some(item) = self.entries.iter().nth(position) else {
            return Err(out_of_range());
        };
        let (seq, raw) = item.map_err(to_storage_io)?;
        let entry = Self::decode(&raw)?;

        let removed = self.transact(|entries, index| {
            if entries.remove(seq.clone())?.is_none() {
                // Removed by another writer after the scan.
                return Ok(false);
            }
            index.remove(entry.key.as_bytes())?;
            Ok(true)
        })?;
        if removed {
            Ok(entry)
        } else {
            Err(out_of_range())
        }
    }

    fn entries(&self) -> Result<Vec<QueueEntry>, StorageError> {
        let mut out = Vec::new();
        for item in self.entries.iter() {
            let (_, raw) = item.map_err(to_storage_io)?;
            out.push(Self::decode(&raw)?);
        }
        Ok(out)
    }

    fn len(&self) -> Result<usize, StorageError> {
        Ok(self.entries.len())
    }
}
