//! # Outbound Ports (Driven Ports)
//!
//! The storage interface every ledger subsystem consumes.

use crate::errors::KvStoreError;

/// Abstract interface for ordered key-value database operations.
///
/// Production: `RocksDbStore`. Testing: `MemoryKvStore`.
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvStoreError>;

    /// Put a single key-value pair.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KvStoreError>;

    /// Delete a key.
    fn delete(&mut self, key: &[u8]) -> Result<(), KvStoreError>;

    /// Execute an atomic batch write.
    ///
    /// Either ALL operations in the batch succeed, or NONE are applied. The
    /// block pipeline relies on this to commit one block's mutations as a
    /// unit.
    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KvStoreError>;

    /// Check if a key exists.
    fn exists(&self, key: &[u8]) -> Result<bool, KvStoreError>;

    /// Iterate over keys with a prefix, in ascending byte order of the key.
    ///
    /// Passing an empty prefix scans the whole store.
    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvStoreError>;

    /// Delete every key in the store. Used when a reparse wipes derived state.
    fn clear(&mut self) -> Result<(), KvStoreError> {
        let keys: Vec<Vec<u8>> = self
            .prefix_scan(b"")?
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        let operations = keys.into_iter().map(BatchOperation::delete).collect();
        self.atomic_batch_write(operations)
    }
}

/// Batch operation for atomic writes.
#[derive(Debug, Clone)]
pub enum BatchOperation {
    /// Put a key-value pair.
    Put { key: Vec<u8>, value: Vec<u8> },
    /// Delete a key.
    Delete { key: Vec<u8> },
}

impl BatchOperation {
    /// Create a Put operation.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a Delete operation.
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Delete { key: key.into() }
    }
}
