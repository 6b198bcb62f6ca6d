//! # Ordered Key-Value Store (sl-01)
//!
//! The persistence port for every ledger subsystem: an ordered byte-key to
//! byte-value store with atomic batch writes and prefix iteration.
//!
//! ## Ordering Contract
//!
//! `prefix_scan` yields entries in ascending byte order of their keys. Every
//! persisted keyspace in the ledger uses fixed-layout keys so that
//! lexicographic order equals numeric order; range scans over the
//! unique-token index and property registry depend on this.
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `ports/` - the `KeyValueStore` trait and `BatchOperation`
//! - `adapters/` - `MemoryKvStore` (tests) and `RocksDbStore` (production)

pub mod adapters;
pub mod errors;
pub mod ports;

pub use adapters::{MemoryKvStore, RocksDbConfig, RocksDbStore};
pub use errors::KvStoreError;
pub use ports::{BatchOperation, KeyValueStore};
