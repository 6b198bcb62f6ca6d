use crate::errors::KvStoreError;
use crate::ports::{BatchOperation, KeyValueStore};
use std::collections::BTreeMap;
use std::ops::Bound;

/// In-memory key-value store for unit tests and reparse scratch state.
///
/// Backed by a `BTreeMap` so that `prefix_scan` honors the ordering contract
/// without extra sorting. Production uses `RocksDbStore`.
#[derive(Default)]
pub struct MemoryKvStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvStoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KvStoreError> {
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KvStoreError> {
        self.data.remove(key);
        Ok(())
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KvStoreError> {
        // Single-threaded map, applying in order is already atomic
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => {
                    self.data.insert(key, value);
                }
                BatchOperation::Delete { key } => {
                    self.data.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn exists(&self, key: &[u8]) -> Result<bool, KvStoreError> {
        Ok(self.data.contains_key(key))
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvStoreError> {
        let results: Vec<_> = self
            .data
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_kv_store_basics() {
        let mut store = MemoryKvStore::new();

        store.put(b"key1", b"value1").unwrap();
        store.put(b"key2", b"value2").unwrap();

        assert_eq!(store.get(b"key1").unwrap(), Some(b"value1".to_vec()));
        assert_eq!(store.get(b"key3").unwrap(), None);

        assert!(store.exists(b"key1").unwrap());
        assert!(!store.exists(b"key3").unwrap());

        store.delete(b"key1").unwrap();
        assert!(!store.exists(b"key1").unwrap());
    }

    #[test]
    fn test_batch_write() {
        let mut store = MemoryKvStore::new();

        let ops = vec![
            BatchOperation::put(b"a", b"1"),
            BatchOperation::put(b"b", b"2"),
            BatchOperation::delete(b"a"),
        ];

        store.atomic_batch_write(ops).unwrap();

        assert!(!store.exists(b"a").unwrap());
        assert_eq!(store.get(b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_prefix_scan_is_ordered() {
        let mut store = MemoryKvStore::new();

        store.put(b"range:0003", b"c").unwrap();
        store.put(b"range:0001", b"a").unwrap();
        store.put(b"range:0002", b"b").unwrap();
        store.put(b"other:0001", b"x").unwrap();

        let entries = store.prefix_scan(b"range:").unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].0, b"range:0001".to_vec());
        assert_eq!(entries[1].0, b"range:0002".to_vec());
        assert_eq!(entries[2].0, b"range:0003".to_vec());
    }

    #[test]
    fn test_clear() {
        let mut store = MemoryKvStore::new();
        store.put(b"a", b"1").unwrap();
        store.put(b"b", b"2").unwrap();

        store.clear().unwrap();
        assert!(store.is_empty());
    }
}
