//! Storage adapters implementing the `KeyValueStore` port.

mod memory;
mod rocksdb_store;

pub use memory::MemoryKvStore;
pub use rocksdb_store::{RocksDbConfig, RocksDbStore};
