//! Persisted send-to-owners recipient rows, keyed `txid || address`.

use crate::domain::errors::MarketError;
use serde::{Deserialize, Serialize};
use shared_types::{Address, Amount, BlockHeight, PropertyId, TxHash};
use sl_01_kv_store::KeyValueStore;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct StoReceiptValue {
    property: PropertyId,
    amount: Amount,
    block: BlockHeight,
}

/// The STO recipient store.
pub struct StoReceiptStore<KV: KeyValueStore> {
    store: KV,
}

fn receipt_key(txid: &TxHash, address: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(32 + address.len());
    key.extend_from_slice(txid);
    key.extend_from_slice(address.as_bytes());
    key
}

impl<KV: KeyValueStore> StoReceiptStore<KV> {
    pub fn new(store: KV) -> Self {
        Self { store }
    }

    /// Record one recipient of a send-to-owners.
    pub fn record(
        &mut self,
        txid: &TxHash,
        address: &Address,
        property: PropertyId,
        amount: Amount,
        block: BlockHeight,
    ) -> Result<(), MarketError> {
        let value = StoReceiptValue {
            property,
            amount,
            block,
        };
        let bytes =
            bincode::serialize(&value).map_err(|e| MarketError::Serialization(e.to_string()))?;
        self.store.put(&receipt_key(txid, address), &bytes)?;
        Ok(())
    }

    /// Every recipient of one send-to-owners, in address order.
    pub fn recipients_of(
        &self,
        txid: &TxHash,
    ) -> Result<Vec<(Address, PropertyId, Amount, BlockHeight)>, MarketError> {
        let mut out = Vec::new();
        for (key, value) in self.store.prefix_scan(txid)? {
            let address = String::from_utf8(key[32..].to_vec())
                .map_err(|_| MarketError::Serialization("non-utf8 receipt address".to_string()))?;
            let receipt: StoReceiptValue = bincode::deserialize(&value)
                .map_err(|e| MarketError::Serialization(e.to_string()))?;
            out.push((address, receipt.property, receipt.amount, receipt.block));
        }
        Ok(out)
    }

    /// Drop every receipt recorded at or above a block (reorg).
    pub fn delete_at_or_above_block(&mut self, block: BlockHeight) -> Result<usize, MarketError> {
        let mut deleted = 0usize;
        for (key, value) in self.store.prefix_scan(b"")? {
            let receipt: StoReceiptValue = bincode::deserialize(&value)
                .map_err(|e| MarketError::Serialization(e.to_string()))?;
            if receipt.block >= block {
                self.store.delete(&key)?;
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Drop everything (reparse).
    pub fn wipe(&mut self) -> Result<(), MarketError> {
        self.store.clear()?;
        Ok(())
    }
}
