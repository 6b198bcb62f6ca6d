//! # TX Index (receipts)
//!
//! One row per processed payload, keyed by the hex txid, with auxiliary
//! purchase and cancel receipts under `"{txid}-{n}"` composite keys so they
//! can be enumerated by their parent transaction.
//!
//! Value layouts (ASCII):
//! - payload:  `"{valid}:{block}:{type}:{amount_amended}"`
//! - purchase: `"{vout}:{buyer}:{seller}:{property}:{tokens}:{block}"`
//! - cancel:   `"{sub_txid}:{property}:{amount}:{block}"`

use crate::errors::EngineError;
use shared_types::{Address, Amount, BlockHeight, PropertyId, TxHash};
use sl_01_kv_store::KeyValueStore;

/// A processed payload's index row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxRecord {
    pub valid: bool,
    pub block: BlockHeight,
    pub tx_type: u16,
    pub amount_amended: Amount,
}

/// A settled DEx purchase receipt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PurchaseReceipt {
    pub vout: u32,
    pub buyer: Address,
    pub seller: Address,
    pub property: PropertyId,
    pub tokens: Amount,
    pub block: BlockHeight,
}

/// A MetaDEx cancel receipt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CancelReceipt {
    pub order_txid: TxHash,
    pub property: PropertyId,
    pub amount: Amount,
    pub block: BlockHeight,
}

/// The TX index store.
pub struct TxIndex<KV: KeyValueStore> {
    store: KV,
}

fn main_key(txid: &TxHash) -> Vec<u8> {
    hex::encode(txid).into_bytes()
}

fn sub_prefix(txid: &TxHash) -> Vec<u8> {
    let mut key = main_key(txid);
    key.push(b'-');
    key
}

fn sub_key(txid: &TxHash, n: usize) -> Vec<u8> {
    let mut key = sub_prefix(txid);
    key.extend_from_slice(n.to_string().as_bytes());
    key
}

fn parse_fields(value: &[u8]) -> Result<Vec<String>, EngineError> {
    let text = std::str::from_utf8(value)
        .map_err(|_| EngineError::Serialization("non-utf8 tx index value".to_string()))?;
    Ok(text.split(':').map(str::to_string).collect())
}

fn parse_number<T: std::str::FromStr>(field: &str) -> Result<T, EngineError> {
    field
        .parse()
        .map_err(|_| EngineError::Serialization(format!("bad tx index field `{}`", field)))
}

impl<KV: KeyValueStore> TxIndex<KV> {
    pub fn new(store: KV) -> Self {
        Self { store }
    }

    /// Record a processed payload.
    pub fn record_tx(
        &mut self,
        txid: &TxHash,
        valid: bool,
        block: BlockHeight,
        tx_type: u16,
        amount_amended: Amount,
    ) -> Result<(), EngineError> {
        let value = format!(
            "{}:{}:{}:{}",
            u8::from(valid),
            block,
            tx_type,
            amount_amended
        );
        self.store.put(&main_key(txid), value.as_bytes())?;
        Ok(())
    }

    /// The index row of a payload, if processed.
    pub fn get_tx(&self, txid: &TxHash) -> Result<Option<TxRecord>, EngineError> {
        let Some(value) = self.store.get(&main_key(txid))? else {
            return Ok(None);
        };
        let fields = parse_fields(&value)?;
        if fields.len() != 4 {
            return Err(EngineError::Serialization(
                "malformed tx index row".to_string(),
            ));
        }
        Ok(Some(TxRecord {
            valid: fields[0] == "1",
            block: parse_number(&fields[1])?,
            tx_type: parse_number(&fields[2])?,
            amount_amended: parse_number(&fields[3])?,
        }))
    }

    /// The row of a payload that was applied successfully.
    pub fn valid_tx(&self, txid: &TxHash) -> Result<Option<TxRecord>, EngineError> {
        Ok(self.get_tx(txid)?.filter(|record| record.valid))
    }

    /// Record a settled purchase under the payment txid.
    #[allow(clippy::too_many_arguments)]
    pub fn record_purchase(
        &mut self,
        payment_txid: &TxHash,
        vout: u32,
        buyer: &Address,
        seller: &Address,
        property: PropertyId,
        tokens: Amount,
        block: BlockHeight,
    ) -> Result<usize, EngineError> {
        let n = self.receipt_count(payment_txid)? + 1;
        let value = format!(
            "{}:{}:{}:{}:{}:{}",
            vout, buyer, seller, property, tokens, block
        );
        self.store.put(&sub_key(payment_txid, n), value.as_bytes())?;
        Ok(n)
    }

    /// Record one cancelled order under the cancelling master txid.
    pub fn record_metadex_cancel(
        &mut self,
        master_txid: &TxHash,
        order_txid: &TxHash,
        property: PropertyId,
        amount: Amount,
        block: BlockHeight,
    ) -> Result<usize, EngineError> {
        let n = self.receipt_count(master_txid)? + 1;
        let value = format!("{}:{}:{}:{}", hex::encode(order_txid), property, amount, block);
        self.store.put(&sub_key(master_txid, n), value.as_bytes())?;
        Ok(n)
    }

    /// Number of auxiliary receipts under a parent txid.
    pub fn receipt_count(&self, txid: &TxHash) -> Result<usize, EngineError> {
        Ok(self.store.prefix_scan(&sub_prefix(txid))?.len())
    }

    /// A purchase receipt by parent txid and 1-based index.
    pub fn purchase(
        &self,
        payment_txid: &TxHash,
        n: usize,
    ) -> Result<Option<PurchaseReceipt>, EngineError> {
        let Some(value) = self.store.get(&sub_key(payment_txid, n))? else {
            return Ok(None);
        };
        let fields = parse_fields(&value)?;
        if fields.len() != 6 {
            return Err(EngineError::Serialization(
                "malformed purchase receipt".to_string(),
            ));
        }
        Ok(Some(PurchaseReceipt {
            vout: parse_number(&fields[0])?,
            buyer: fields[1].clone(),
            seller: fields[2].clone(),
            property: parse_number(&fields[3])?,
            tokens: parse_number(&fields[4])?,
            block: parse_number(&fields[5])?,
        }))
    }

    /// A cancel receipt by parent txid and 1-based index.
    pub fn metadex_cancel(
        &self,
        master_txid: &TxHash,
        n: usize,
    ) -> Result<Option<CancelReceipt>, EngineError> {
        let Some(value) = self.store.get(&sub_key(master_txid, n))? else {
            return Ok(None);
        };
        let fields = parse_fields(&value)?;
        if fields.len() != 4 {
            return Err(EngineError::Serialization(
                "malformed cancel receipt".to_string(),
            ));
        }
        let bytes = hex::decode(&fields[0])
            .map_err(|_| EngineError::Serialization("bad receipt txid".to_string()))?;
        let order_txid: TxHash = bytes
            .try_into()
            .map_err(|_| EngineError::Serialization("bad receipt txid length".to_string()))?;
        Ok(Some(CancelReceipt {
            order_txid,
            property: parse_number(&fields[1])?,
            amount: parse_number(&fields[2])?,
            block: parse_number(&fields[3])?,
        }))
    }

    /// Total number of indexed payloads.
    pub fn count_total(&self) -> Result<usize, EngineError> {
        Ok(self
            .store
            .prefix_scan(b"")?
            .iter()
            .filter(|(key, _)| key.len() == 64)
            .count())
    }

    /// Number of indexed payloads in one block.
    pub fn count_in_block(&self, block: BlockHeight) -> Result<usize, EngineError> {
        let mut count = 0usize;
        for (key, value) in self.store.prefix_scan(b"")? {
            if key.len() != 64 {
                continue;
            }
            let fields = parse_fields(&value)?;
            if fields.len() == 4 && parse_number::<BlockHeight>(&fields[1])? == block {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Drop every row recorded at or above a block (reorg).
    pub fn delete_at_or_above_block(&mut self, block: BlockHeight) -> Result<usize, EngineError> {
        let mut deleted = 0usize;
        for (key, value) in self.store.prefix_scan(b"")? {
            let fields = parse_fields(&value)?;
            // the block is field 1 of payload rows and the last field of
            // receipt rows
            let row_block: BlockHeight = if key.len() == 64 {
                if fields.len() != 4 {
                    continue;
                }
                parse_number(&fields[1])?
            } else {
                match fields.last() {
                    Some(last) => parse_number(last)?,
                    None => continue,
                }
            };
            if row_block >= block {
                self.store.delete(&key)?;
                deleted += 1;
            }
        }
        if deleted > 0 {
            tracing::info!(block, deleted, "dropped tx index rows during rollback");
        }
        Ok(deleted)
    }

    /// Drop everything (reparse).
    pub fn wipe(&mut self) -> Result<(), EngineError> {
        self.store.clear()?;
        Ok(())
    }
}
