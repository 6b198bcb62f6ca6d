//! # RocksDB Storage Adapter
//!
//! Production implementation of the `KeyValueStore` trait. Each ledger
//! database (property registry, unique tokens, TX index, trade log, STO
//! receipts) opens its own store at its own path, mirroring the on-disk
//! layout the consensus state was designed around.

use crate::errors::KvStoreError;
use crate::ports::{BatchOperation, KeyValueStore};
use rocksdb::{IteratorMode, Options, WriteBatch, WriteOptions, DB};
use std::path::Path;

/// RocksDB tuning knobs.
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Path to the database directory.
    pub path: String,
    /// Write buffer size in bytes (default: 64MB).
    pub write_buffer_size: usize,
    /// Maximum number of write buffers (default: 3).
    pub max_write_buffer_number: i32,
    /// Enable fsync after each write (default: true for durability).
    pub sync_writes: bool,
    /// Verify checksums when reading (default: true).
    pub paranoid_checks: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: "./data/ledger".to_string(),
            write_buffer_size: 64 * 1024 * 1024,
            max_write_buffer_number: 3,
            sync_writes: true,
            paranoid_checks: true,
        }
    }
}

impl RocksDbConfig {
    /// Create config for testing (smaller buffers, no sync).
    pub fn for_testing(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            write_buffer_size: 4 * 1024 * 1024,
            max_write_buffer_number: 2,
            sync_writes: false,
            paranoid_checks: true,
        }
    }
}

/// RocksDB-backed key-value store.
pub struct RocksDbStore {
    db: DB,
    config: RocksDbConfig,
}

impl RocksDbStore {
    /// Open or create a RocksDB database.
    pub fn open(config: RocksDbConfig) -> Result<Self, KvStoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_paranoid_checks(config.paranoid_checks);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_max_write_buffer_number(config.max_write_buffer_number);
        opts.set_compression_type(rocksdb::DBCompressionType::Snappy);

        let db = DB::open(&opts, &config.path)
            .map_err(|e| KvStoreError::io(format!("failed to open RocksDB: {}", e)))?;

        tracing::info!(path = %config.path, "opened ledger database");
        Ok(Self { db, config })
    }

    /// Open with default tuning at the given path.
    pub fn open_default(path: impl AsRef<Path>) -> Result<Self, KvStoreError> {
        let config = RocksDbConfig {
            path: path.as_ref().to_string_lossy().to_string(),
            ..Default::default()
        };
        Self::open(config)
    }

    fn write_opts(&self) -> WriteOptions {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        write_opts
    }
}

impl KeyValueStore for RocksDbStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvStoreError> {
        self.db
            .get(key)
            .map_err(|e| KvStoreError::io(format!("RocksDB get failed: {}", e)))
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KvStoreError> {
        self.db
            .put_opt(key, value, &self.write_opts())
            .map_err(|e| KvStoreError::io(format!("RocksDB put failed: {}", e)))
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KvStoreError> {
        self.db
            .delete_opt(key, &self.write_opts())
            .map_err(|e| KvStoreError::io(format!("RocksDB delete failed: {}", e)))
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KvStoreError> {
        let mut batch = WriteBatch::default();

        for op in operations {
            match op {
                BatchOperation::Put { key, value } => batch.put(&key, &value),
                BatchOperation::Delete { key } => batch.delete(&key),
            }
        }

        self.db
            .write_opt(batch, &self.write_opts())
            .map_err(|e| KvStoreError::io(format!("RocksDB batch write failed: {}", e)))
    }

    fn exists(&self, key: &[u8]) -> Result<bool, KvStoreError> {
        self.db
            .get_pinned(key)
            .map(|v| v.is_some())
            .map_err(|e| KvStoreError::io(format!("RocksDB exists check failed: {}", e)))
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvStoreError> {
        let mut results = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix, rocksdb::Direction::Forward));

        for item in iter {
            let (key, value) =
                item.map_err(|e| KvStoreError::io(format!("RocksDB scan failed: {}", e)))?;
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key.to_vec(), value.to_vec()));
        }

        Ok(results)
    }
}
