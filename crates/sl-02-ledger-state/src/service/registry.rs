//! # Property Registry
//!
//! Versioned property metadata, keyed by property id and archived by the
//! block hash that overwrote each version so a reorg can restore it.
//!
//! ## Keyspace
//!
//! - `'s' || u32_be(id)` - current entry
//! - `'b' || block_hash || u32_be(id)` - archived prior entry
//! - `'t' || txid` - creation-tx index, value `u32_be(id)`
//! - `'B'` - watermark block hash
//!
//! Property ids 1 and 2 are the genesis tokens: implied, never stored,
//! always answered from compiled-in entries.

use crate::domain::errors::LedgerError;
use crate::domain::property::{PropertyEntry, PROPERTY_TYPE_DIVISIBLE};
use shared_types::{
    Address, BlockHash, Ecosystem, PropertyId, TxHash, PROPERTY_STR, PROPERTY_TSTR,
};
use sl_01_kv_store::{BatchOperation, KeyValueStore};

const CURRENT_PREFIX: u8 = b's';
const ARCHIVE_PREFIX: u8 = b'b';
const TX_INDEX_PREFIX: u8 = b't';
const WATERMARK_KEY: &[u8] = b"B";

/// The property registry service.
pub struct PropertyRegistry<KV: KeyValueStore> {
    store: KV,
    next_main: PropertyId,
    next_test: PropertyId,
    genesis_main: PropertyEntry,
    genesis_test: PropertyEntry,
}

fn current_key(property: PropertyId) -> Vec<u8> {
    let mut key = Vec::with_capacity(5);
    key.push(CURRENT_PREFIX);
    key.extend_from_slice(&property.to_be_bytes());
    key
}

fn archive_key(block: &BlockHash, property: PropertyId) -> Vec<u8> {
    let mut key = Vec::with_capacity(37);
    key.push(ARCHIVE_PREFIX);
    key.extend_from_slice(block);
    key.extend_from_slice(&property.to_be_bytes());
    key
}

fn tx_index_key(txid: &TxHash) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.push(TX_INDEX_PREFIX);
    key.extend_from_slice(txid);
    key
}

fn encode_entry(entry: &PropertyEntry) -> Result<Vec<u8>, LedgerError> {
    bincode::serialize(entry).map_err(|e| LedgerError::Serialization(e.to_string()))
}

fn decode_entry(bytes: &[u8]) -> Result<PropertyEntry, LedgerError> {
    bincode::deserialize(bytes).map_err(|e| LedgerError::Serialization(e.to_string()))
}

fn property_id_from_current_key(key: &[u8]) -> Option<PropertyId> {
    let bytes: [u8; 4] = key.get(1..5)?.try_into().ok()?;
    Some(PropertyId::from_be_bytes(bytes))
}

impl<KV: KeyValueStore> PropertyRegistry<KV> {
    /// Open the registry over a store, deriving the next free ids from the
    /// persisted keys.
    pub fn new(store: KV, treasury: Address) -> Result<Self, LedgerError> {
        let genesis = |name: &str| PropertyEntry {
            issuer: treasury.clone(),
            prop_type: PROPERTY_TYPE_DIVISIBLE,
            category: "N/A".to_string(),
            subcategory: "N/A".to_string(),
            name: name.to_string(),
            url: "strata.network".to_string(),
            data: String::new(),
            ..Default::default()
        };

        let mut registry = Self {
            store,
            next_main: Ecosystem::Main.first_property(),
            next_test: Ecosystem::Test.first_property(),
            genesis_main: genesis("Strata"),
            genesis_test: genesis("Test Strata"),
        };
        registry.recount_next_ids()?;
        Ok(registry)
    }

    fn recount_next_ids(&mut self) -> Result<(), LedgerError> {
        for (key, _) in self.store.prefix_scan(&[CURRENT_PREFIX])? {
            let Some(id) = property_id_from_current_key(&key) else {
                continue;
            };
            match Ecosystem::of(id) {
                Ecosystem::Main if id >= self.next_main => self.next_main = id + 1,
                Ecosystem::Test if id >= self.next_test => self.next_test = id + 1,
                _ => {}
            }
        }
        Ok(())
    }

    /// The next id that `put` would allocate in an ecosystem.
    pub fn peek_next_id(&self, ecosystem: Ecosystem) -> PropertyId {
        match ecosystem {
            Ecosystem::Main => self.next_main,
            Ecosystem::Test => self.next_test,
        }
    }

    /// Restore the allocation counters, e.g. from a loaded snapshot.
    pub fn restore_next_ids(&mut self, next_main: PropertyId, next_test: PropertyId) {
        self.next_main = next_main;
        self.next_test = next_test;
    }

    /// Advance the counters past an id that is known to be allocated.
    /// Used when a replayed creation resolves to its recorded id.
    pub fn note_allocated(&mut self, property: PropertyId) {
        match Ecosystem::of(property) {
            Ecosystem::Main if property >= self.next_main => self.next_main = property + 1,
            Ecosystem::Test if property >= self.next_test => self.next_test = property + 1,
            _ => {}
        }
    }

    /// Register a new property: allocates the next id of the ecosystem and
    /// writes the entry plus the creation-tx index atomically.
    pub fn put(
        &mut self,
        ecosystem: Ecosystem,
        entry: &PropertyEntry,
    ) -> Result<PropertyId, LedgerError> {
        entry.validate()?;

        let property = match ecosystem {
            Ecosystem::Main => {
                let id = self.next_main;
                self.next_main += 1;
                id
            }
            Ecosystem::Test => {
                let id = self.next_test;
                self.next_test += 1;
                id
            }
        };

        let value = encode_entry(entry)?;
        let key = current_key(property);
        if self.store.exists(&key)? {
            tracing::warn!(property, "allocating an id that already has an entry");
        }

        self.store.atomic_batch_write(vec![
            BatchOperation::put(key, value),
            BatchOperation::put(tx_index_key(&entry.txid), property.to_be_bytes().to_vec()),
        ])?;

        tracing::debug!(property, name = %entry.name, "registered property");
        Ok(property)
    }

    /// Overwrite an entry, archiving the previous version under the block
    /// hash recorded in the new entry's `update_block`.
    pub fn update(&mut self, property: PropertyId, entry: &PropertyEntry) -> Result<(), LedgerError> {
        if property == PROPERTY_STR || property == PROPERTY_TSTR {
            return Err(LedgerError::UnknownProperty { property });
        }

        let key = current_key(property);
        let mut batch = Vec::with_capacity(2);
        if let Some(previous) = self.store.get(&key)? {
            batch.push(BatchOperation::put(
                archive_key(&entry.update_block, property),
                previous,
            ));
        }
        batch.push(BatchOperation::put(key, encode_entry(entry)?));
        self.store.atomic_batch_write(batch)?;

        tracing::debug!(property, "updated property entry");
        Ok(())
    }

    /// The current entry, if registered. Ids 1 and 2 answer from the
    /// compiled-in genesis entries.
    pub fn get(&self, property: PropertyId) -> Result<Option<PropertyEntry>, LedgerError> {
        if property == PROPERTY_STR {
            return Ok(Some(self.genesis_main.clone()));
        }
        if property == PROPERTY_TSTR {
            return Ok(Some(self.genesis_test.clone()));
        }

        match self.store.get(&current_key(property))? {
            Some(bytes) => Ok(Some(decode_entry(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Whether the property is registered (genesis ids included).
    pub fn has(&self, property: PropertyId) -> Result<bool, LedgerError> {
        if property == PROPERTY_STR || property == PROPERTY_TSTR {
            return Ok(true);
        }
        Ok(self.store.exists(&current_key(property))?)
    }

    /// Look up the property created by a transaction.
    pub fn find_by_txid(&self, txid: &TxHash) -> Result<Option<PropertyId>, LedgerError> {
        match self.store.get(&tx_index_key(txid))? {
            Some(bytes) => {
                let bytes: [u8; 4] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| LedgerError::Serialization("bad tx-index value".to_string()))?;
                Ok(Some(PropertyId::from_be_bytes(bytes)))
            }
            None => Ok(None),
        }
    }

    /// All stored entries, ascending by property id (genesis ids excluded).
    pub fn properties(&self) -> Result<Vec<(PropertyId, PropertyEntry)>, LedgerError> {
        let mut entries = Vec::new();
        for (key, value) in self.store.prefix_scan(&[CURRENT_PREFIX])? {
            let Some(id) = property_id_from_current_key(&key) else {
                continue;
            };
            entries.push((id, decode_entry(&value)?));
        }
        Ok(entries)
    }

    /// Reorg rollback: restore every entry whose `update_block` matches the
    /// disconnected block from its archived version.
    ///
    /// Returns the number of entries left registered. A missing archive row
    /// is state corruption; the caller must trigger a reparse.
    pub fn pop_block(&mut self, block: &BlockHash) -> Result<usize, LedgerError> {
        let mut batch = Vec::new();
        let mut remaining = 0usize;

        for (key, value) in self.store.prefix_scan(&[CURRENT_PREFIX])? {
            let Some(property) = property_id_from_current_key(&key) else {
                continue;
            };
            let entry = decode_entry(&value)?;
            if entry.update_block != *block {
                remaining += 1;
                continue;
            }

            if entry.creation_block == entry.update_block {
                // the disconnected block created this property
                batch.push(BatchOperation::delete(key));
                batch.push(BatchOperation::delete(tx_index_key(&entry.txid)));
                tracing::info!(property, "rolling back property creation");
            } else {
                let archived = archive_key(block, property);
                match self.store.get(&archived)? {
                    Some(previous) => {
                        batch.push(BatchOperation::put(key, previous));
                        batch.push(BatchOperation::delete(archived));
                        remaining += 1;
                        tracing::info!(property, "restored archived property version");
                    }
                    None => {
                        tracing::error!(property, "archived property version missing");
                        return Err(LedgerError::ReparseRequired);
                    }
                }
            }
        }

        self.store.atomic_batch_write(batch)?;
        self.recount_next_ids_after_pop(block);
        Ok(remaining)
    }

    fn recount_next_ids_after_pop(&mut self, _block: &BlockHash) {
        // deleted creations free their ids again
        self.next_main = Ecosystem::Main.first_property();
        self.next_test = Ecosystem::Test.first_property();
        if let Err(e) = self.recount_next_ids() {
            tracing::error!(error = %e, "failed to recount property ids after rollback");
        }
    }

    /// Persist the watermark: the hash of the most recent fully applied block.
    pub fn set_watermark(&mut self, block: &BlockHash) -> Result<(), LedgerError> {
        self.store.put(WATERMARK_KEY, block)?;
        Ok(())
    }

    /// The persisted watermark, if any.
    pub fn watermark(&self) -> Result<Option<BlockHash>, LedgerError> {
        match self.store.get(WATERMARK_KEY)? {
            Some(bytes) => {
                let hash: BlockHash = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| LedgerError::Serialization("bad watermark value".to_string()))?;
                Ok(Some(hash))
            }
            None => Ok(None),
        }
    }

    /// Drop every persisted row. Used when a reparse rebuilds from genesis.
    pub fn wipe(&mut self) -> Result<(), LedgerError> {
        self.store.clear()?;
        self.next_main = Ecosystem::Main.first_property();
        self.next_test = Ecosystem::Test.first_property();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sl_01_kv_store::MemoryKvStore;

    fn make_registry() -> PropertyRegistry<MemoryKvStore> {
        PropertyRegistry::new(MemoryKvStore::new(), "mpTreasury".to_string()).unwrap()
    }

    fn make_entry(name: &str, txid_byte: u8) -> PropertyEntry {
        PropertyEntry {
            issuer: "mpCarol".to_string(),
            prop_type: PROPERTY_TYPE_DIVISIBLE,
            name: name.to_string(),
            num_tokens: 1_000_000,
            fixed: true,
            txid: [txid_byte; 32],
            creation_block: [txid_byte; 32],
            update_block: [txid_byte; 32],
            ..Default::default()
        }
    }

    #[test]
    fn test_genesis_entries_are_implied() {
        let registry = make_registry();
        assert!(registry.has(PROPERTY_STR).unwrap());
        assert!(registry.has(PROPERTY_TSTR).unwrap());
        assert_eq!(registry.get(PROPERTY_STR).unwrap().unwrap().name, "Strata");
        // never persisted
        assert!(registry.properties().unwrap().is_empty());
    }

    #[test]
    fn test_put_allocates_sequential_ids_per_ecosystem() {
        let mut registry = make_registry();
        let a = registry.put(Ecosystem::Main, &make_entry("A", 1)).unwrap();
        let b = registry.put(Ecosystem::Main, &make_entry("B", 2)).unwrap();
        let t = registry.put(Ecosystem::Test, &make_entry("T", 3)).unwrap();

        assert_eq!(a, 3);
        assert_eq!(b, 4);
        assert_eq!(t, 0x8000_0003);
        assert_eq!(registry.peek_next_id(Ecosystem::Main), 5);
    }

    #[test]
    fn test_find_by_txid() {
        let mut registry = make_registry();
        let id = registry.put(Ecosystem::Main, &make_entry("A", 9)).unwrap();
        assert_eq!(registry.find_by_txid(&[9u8; 32]).unwrap(), Some(id));
        assert_eq!(registry.find_by_txid(&[8u8; 32]).unwrap(), None);
    }

    #[test]
    fn test_update_archives_previous_version() {
        let mut registry = make_registry();
        let id = registry.put(Ecosystem::Main, &make_entry("A", 1)).unwrap();

        let mut updated = registry.get(id).unwrap().unwrap();
        updated.num_tokens = 42;
        updated.update_block = [2u8; 32];
        registry.update(id, &updated).unwrap();

        assert_eq!(registry.get(id).unwrap().unwrap().num_tokens, 42);

        // rollback of block 2 restores the original
        let remaining = registry.pop_block(&[2u8; 32]).unwrap();
        assert_eq!(remaining, 1);
        assert_eq!(registry.get(id).unwrap().unwrap().num_tokens, 1_000_000);
    }

    #[test]
    fn test_pop_block_deletes_creations() {
        let mut registry = make_registry();
        let id = registry.put(Ecosystem::Main, &make_entry("A", 1)).unwrap();

        let remaining = registry.pop_block(&[1u8; 32]).unwrap();
        assert_eq!(remaining, 0);
        assert!(!registry.has(id).unwrap());
        assert_eq!(registry.find_by_txid(&[1u8; 32]).unwrap(), None);
        // the id is free again
        assert_eq!(registry.peek_next_id(Ecosystem::Main), 3);
    }

    #[test]
    fn test_missing_archive_row_signals_reparse() {
        let mut registry = make_registry();
        let id = registry.put(Ecosystem::Main, &make_entry("A", 1)).unwrap();

        // hand-roll an updated entry without archiving, as a corrupt store would look
        let mut updated = registry.get(id).unwrap().unwrap();
        updated.update_block = [5u8; 32];
        let value = bincode::serialize(&updated).unwrap();
        registry.store.put(&current_key(id), &value).unwrap();
        registry
            .store
            .delete(&archive_key(&[5u8; 32], id))
            .unwrap();

        assert!(matches!(
            registry.pop_block(&[5u8; 32]),
            Err(LedgerError::ReparseRequired)
        ));
    }

    #[test]
    fn test_watermark_roundtrip() {
        let mut registry = make_registry();
        assert_eq!(registry.watermark().unwrap(), None);
        registry.set_watermark(&[3u8; 32]).unwrap();
        assert_eq!(registry.watermark().unwrap(), Some([3u8; 32]));
    }

    #[test]
    fn test_counters_recovered_from_store() {
        let mut registry = make_registry();
        registry.put(Ecosystem::Main, &make_entry("A", 1)).unwrap();
        registry.put(Ecosystem::Main, &make_entry("B", 2)).unwrap();

        // reopen over the same data
        let mut store = MemoryKvStore::new();
        for (k, v) in registry.store.prefix_scan(b"").unwrap() {
            store.put(&k, &v).unwrap();
        }
        let reopened = PropertyRegistry::new(store, "mpTreasury".to_string()).unwrap();
        assert_eq!(reopened.peek_next_id(Ecosystem::Main), 5);
    }
}
