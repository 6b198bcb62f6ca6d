//! Persisted MetaDEx trade history.
//!
//! One row per cross, keyed by the two txids in ascending byte order so the
//! same trade always lands on the same key regardless of which side was the
//! taker.

use crate::domain::errors::MarketError;
use crate::domain::mdex::TradeFill;
use serde::{Deserialize, Serialize};
use shared_types::{Address, Amount, BlockHeight, PropertyId, TxHash};
use sl_01_kv_store::KeyValueStore;

/// A settled cross. Side 1 is the order whose txid sorts lower.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub address1: Address,
    pub address2: Address,
    pub property1: PropertyId,
    pub property2: PropertyId,
    /// Amount of `property1` delivered by side 1.
    pub amount1: Amount,
    /// Amount of `property2` delivered by side 2.
    pub amount2: Amount,
    pub block: BlockHeight,
}

/// The trade history store.
pub struct TradeLog<KV: KeyValueStore> {
    store: KV,
}

fn trade_key(txid_a: &TxHash, txid_b: &TxHash) -> Vec<u8> {
    let (first, second) = if txid_a <= txid_b {
        (txid_a, txid_b)
    } else {
        (txid_b, txid_a)
    };
    let mut key = Vec::with_capacity(64);
    key.extend_from_slice(first);
    key.extend_from_slice(second);
    key
}

impl<KV: KeyValueStore> TradeLog<KV> {
    pub fn new(store: KV) -> Self {
        Self { store }
    }

    /// Record a cross from the matching engine.
    pub fn record_fill(&mut self, fill: &TradeFill) -> Result<(), MarketError> {
        let record = if fill.maker_txid <= fill.taker_txid {
            TradeRecord {
                address1: fill.maker_address.clone(),
                address2: fill.taker_address.clone(),
                property1: fill.maker_property,
                property2: fill.taker_property,
                amount1: fill.maker_amount,
                amount2: fill.taker_amount,
                block: fill.block,
            }
        } else {
            TradeRecord {
                address1: fill.taker_address.clone(),
                address2: fill.maker_address.clone(),
                property1: fill.taker_property,
                property2: fill.maker_property,
                amount1: fill.taker_amount,
                amount2: fill.maker_amount,
                block: fill.block,
            }
        };

        let value =
            bincode::serialize(&record).map_err(|e| MarketError::Serialization(e.to_string()))?;
        self.store
            .put(&trade_key(&fill.maker_txid, &fill.taker_txid), &value)?;
        Ok(())
    }

    /// Whether a trade between the two txids is recorded.
    pub fn exists(&self, txid_a: &TxHash, txid_b: &TxHash) -> Result<bool, MarketError> {
        Ok(self.store.exists(&trade_key(txid_a, txid_b))?)
    }

    /// All trades one order took part in.
    pub fn trades_of(&self, txid: &TxHash) -> Result<Vec<TradeRecord>, MarketError> {
        let mut out = Vec::new();
        for (key, value) in self.store.prefix_scan(b"")? {
            if key.len() != 64 {
                continue;
            }
            if &key[..32] == txid.as_slice() || &key[32..] == txid.as_slice() {
                let record = bincode::deserialize(&value)
                    .map_err(|e| MarketError::Serialization(e.to_string()))?;
                out.push(record);
            }
        }
        Ok(out)
    }

    /// Number of recorded trades.
    pub fn count(&self) -> Result<usize, MarketError> {
        Ok(self.store.prefix_scan(b"")?.len())
    }

    /// Drop every trade recorded at or above a block (reorg).
    pub fn delete_at_or_above_block(&mut self, block: BlockHeight) -> Result<usize, MarketError> {
        let mut deleted = 0usize;
        for (key, value) in self.store.prefix_scan(b"")? {
            let record: TradeRecord = bincode::deserialize(&value)
                .map_err(|e| MarketError::Serialization(e.to_string()))?;
            if record.block >= block {
                self.store.delete(&key)?;
                deleted += 1;
            }
        }
        if deleted > 0 {
            tracing::info!(block, deleted, "dropped trades during rollback");
        }
        Ok(deleted)
    }

    /// Drop everything (reparse).
    pub fn wipe(&mut self) -> Result<(), MarketError> {
        self.store.clear()?;
        Ok(())
    }
}
