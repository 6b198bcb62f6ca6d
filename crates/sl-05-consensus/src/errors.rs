use shared_types::BlockHeight;
use sl_01_kv_store::KvStoreError;
use sl_02_ledger_state::LedgerError;
use sl_03_markets::MarketError;
use thiserror::Error;

/// Fatal engine failures, surfaced to the host as typed codes.
///
/// Payload rejections are not errors: they are reported per transaction in
/// a [`crate::pipeline::TxDisposition`] and the block continues.
#[derive(Debug, Error)]
pub enum EngineError {
    /// State corruption: the engine must be restarted from the earliest
    /// usable checkpoint.
    #[error("state corruption: {0}; reparse required")]
    ReparseRequired(String),

    #[error("snapshot consensus hash mismatch at height {height}")]
    SnapshotHashMismatch { height: BlockHeight },

    #[error("no usable snapshot at height {height}")]
    SnapshotNotFound { height: BlockHeight },

    #[error("snapshot file malformed: {0}")]
    SnapshotMalformed(String),

    #[error(transparent)]
    Store(#[from] KvStoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Market(#[from] MarketError),

    #[error("snapshot I/O failure: {0}")]
    SnapshotIo(String),

    #[error("serialization failure: {0}")]
    Serialization(String),
}
