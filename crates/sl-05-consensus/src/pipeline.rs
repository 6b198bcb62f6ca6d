//! # Block Pipeline
//!
//! The chain-event surface of the engine: block-begin, per-transaction
//! application, block-end, reorg disconnect, snapshot save/restore. The
//! state lock is held across each call; the host drives calls in chain
//! order and never overlaps them.
//!
//! ## Reorg protocol
//!
//! `disconnect_begin(B)` rolls the persisted stores back exactly (property
//! registry version restore, TX index/trade/receipt row deletion), wipes
//! the replay-derived in-memory state, and reports the best snapshot at or
//! below the new tip. The host then calls `restore_from_snapshot` and
//! replays forward; replayed blocks re-derive in-memory state only (see
//! the apply module).

use crate::apply::{apply_intent, expire_crowdsales, ApplyResult};
use crate::engine::LedgerEngine;
use crate::errors::EngineError;
use crate::intent::TransactionIntent;
use crate::snapshot::{
    latest_snapshot_at_or_below, load_snapshot, prune_snapshots, write_snapshot, SnapshotData,
};
use shared_types::{Amount, BlockHash, BlockHeight, Ecosystem, TxHash, TxType};
use sl_01_kv_store::KeyValueStore;
use sl_02_ledger_state::TallyJournal;

/// Metadata of the block being processed, supplied by the host node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    pub height: BlockHeight,
    pub hash: BlockHash,
    pub prev_hash: BlockHash,
    /// Block timestamp in unix seconds.
    pub time: i64,
}

/// Per-transaction verdict reported back to the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxDisposition {
    Applied {
        tx_type: Option<TxType>,
        amount_amended: Amount,
    },
    Rejected {
        tx_type: Option<TxType>,
        reason: String,
    },
}

/// What block-end did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockEndSummary {
    pub expired_crowdsales: usize,
    pub expired_accepts: usize,
    pub alert_cleared: bool,
    /// Consensus hash sealing a snapshot written at this height.
    pub snapshot_hash: Option<[u8; 32]>,
}

/// Result of a disconnect: where the host can restore from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisconnectOutcome {
    /// Height of the best usable snapshot at or below the new tip, or None
    /// when only a genesis reparse can recover.
    pub restore_height: Option<BlockHeight>,
}

impl<KV: KeyValueStore> LedgerEngine<KV> {
    /// Begin applying a block. Verifies watermark continuity.
    pub fn block_begin(&self, block: &BlockInfo) -> Result<(), EngineError> {
        let state = self.lock();
        if state.halted_for_restore {
            return Err(EngineError::ReparseRequired(
                "state wiped by a disconnect; restore a snapshot first".to_string(),
            ));
        }
        if let Some(watermark) = state.watermark {
            if watermark != block.prev_hash {
                return Err(EngineError::ReparseRequired(format!(
                    "watermark {} does not extend to block {}",
                    hex::encode(watermark),
                    block.height
                )));
            }
        }
        tracing::debug!(height = block.height, "block begin");
        Ok(())
    }

    /// Apply one transaction's intent. All-or-nothing per payload; the
    /// verdict is recorded in the TX index.
    pub fn apply_transaction(
        &self,
        block: &BlockInfo,
        idx: u32,
        txid: &TxHash,
        intent: &TransactionIntent,
    ) -> Result<TxDisposition, EngineError> {
        let mut state = self.lock();
        let replay = state.is_replay(block.height);
        let tx_type = intent.tx_type();

        let result = apply_intent(&mut state, block, idx, txid, intent)?;
        match result {
            ApplyResult::Applied { amount_amended } => {
                if let (false, Some(tx_type)) = (replay, tx_type) {
                    state
                        .tx_index
                        .record_tx(txid, true, block.height, tx_type.code(), amount_amended)?;
                }
                Ok(TxDisposition::Applied {
                    tx_type,
                    amount_amended,
                })
            }
            ApplyResult::Rejected { reason } => {
                if let (false, Some(tx_type)) = (replay, tx_type) {
                    state
                        .tx_index
                        .record_tx(txid, false, block.height, tx_type.code(), 0)?;
                }
                tracing::debug!(
                    height = block.height,
                    idx,
                    %reason,
                    "rejected payload"
                );
                Ok(TxDisposition::Rejected { tx_type, reason })
            }
        }
    }

    /// Finish a block: run chain-time expiries, advance the watermark, and
    /// persist a snapshot on the configured cadence.
    pub fn block_end(&self, block: &BlockInfo) -> Result<BlockEndSummary, EngineError> {
        let mut state = self.lock();
        let mut summary = BlockEndSummary::default();

        summary.expired_crowdsales = expire_crowdsales(&mut state, block)?;

        {
            let state = &mut *state;
            let mut journal = TallyJournal::new(&mut state.balances);
            match state.dex.expire_accepts(&mut journal, block.height) {
                Ok(expired) => {
                    summary.expired_accepts = expired.len();
                    journal.commit();
                }
                Err(e) => {
                    journal.rollback();
                    return Err(e.into());
                }
            }
        }

        summary.alert_cleared = state
            .alerts
            .check_expired(block.height, block.time.max(0) as u64);

        let replay = state.is_replay(block.height);
        let on_cadence =
            block.height > 0 && block.height % state.config.snapshot_interval == 0;
        if on_cadence && !replay {
            summary.snapshot_hash = Some(self.write_snapshot_locked(&mut state, block)?);
        }

        state.watermark = Some(block.hash);
        state.registry.set_watermark(&block.hash)?;

        if state.replay_until.is_some_and(|until| block.height >= until) {
            tracing::info!(height = block.height, "replay complete; live again");
            state.replay_until = None;
        }

        tracing::debug!(height = block.height, "block end");
        Ok(summary)
    }

    /// Force a snapshot of the current state (host-driven checkpoints).
    pub fn save_state(&self, block: &BlockInfo) -> Result<[u8; 32], EngineError> {
        let mut state = self.lock();
        self.write_snapshot_locked(&mut state, block)
    }

    fn write_snapshot_locked(
        &self,
        state: &mut crate::engine::LedgerState<KV>,
        block: &BlockInfo,
    ) -> Result<[u8; 32], EngineError> {
        let data = SnapshotData {
            height: block.height,
            block_hash: block.hash,
            next_main: state.registry.peek_next_id(Ecosystem::Main),
            next_test: state.registry.peek_next_id(Ecosystem::Test),
            balances: state.balances.clone(),
            dex: state.dex.clone(),
            mdex: state.mdex.clone(),
            crowdsales: state.crowdsales.clone(),
            unique_ranges: state.unique_tokens.all_ranges()?,
        };
        let sealed = write_snapshot(&state.config.snapshot_dir, &data)?;
        prune_snapshots(&state.config.snapshot_dir, state.config.snapshot_retention)?;
        Ok(sealed)
    }

    /// Roll back a disconnected tip block. Persisted stores roll back
    /// exactly; in-memory state is wiped pending a snapshot restore.
    pub fn disconnect_begin(&self, block: &BlockInfo) -> Result<DisconnectOutcome, EngineError> {
        let mut state = self.lock();

        if state.watermark != Some(block.hash) {
            return Err(EngineError::ReparseRequired(
                "disconnect of a block that is not the applied tip".to_string(),
            ));
        }

        tracing::warn!(height = block.height, "disconnecting block");
        state.tx_index.delete_at_or_above_block(block.height)?;
        state.trade_log.delete_at_or_above_block(block.height)?;
        state.sto_receipts.delete_at_or_above_block(block.height)?;

        match state.registry.pop_block(&block.hash) {
            Ok(remaining) => {
                tracing::info!(remaining, "property registry rolled back");
            }
            Err(e) => return Err(e.into()),
        }

        state.balances.clear();
        state.dex.clear();
        state.mdex.clear();
        state.crowdsales.clear();
        state.unique_tokens.wipe()?;
        state.alerts.clear();
        state.watermark = Some(block.prev_hash);
        state.registry.set_watermark(&block.prev_hash)?;
        state.halted_for_restore = true;

        let restore_height = latest_snapshot_at_or_below(
            &state.config.snapshot_dir,
            block.height.saturating_sub(1),
        )?;
        Ok(DisconnectOutcome { restore_height })
    }

    /// Finish a disconnect (bookkeeping hook for the host).
    pub fn disconnect_end(&self, block: &BlockInfo) -> Result<(), EngineError> {
        tracing::info!(height = block.height, "disconnect complete");
        Ok(())
    }

    /// Restore in-memory state from the snapshot at `height` and arm
    /// replay mode up to `replay_until` (the current tip), after which the
    /// engine applies blocks normally again.
    pub fn restore_from_snapshot(
        &self,
        height: BlockHeight,
        replay_until: Option<BlockHeight>,
    ) -> Result<(), EngineError> {
        let mut state = self.lock();
        let data = load_snapshot(&state.config.snapshot_dir, height)?;

        state.balances = data.balances;
        state.dex = data.dex;
        state.mdex = data.mdex;
        state.crowdsales = data.crowdsales;
        state.registry.restore_next_ids(data.next_main, data.next_test);
        state.unique_tokens.wipe()?;
        for (property, start, end, owner) in &data.unique_ranges {
            state
                .unique_tokens
                .restore_range(*property, *start, *end, owner)?;
        }

        state.watermark = Some(data.block_hash);
        state.registry.set_watermark(&data.block_hash)?;
        state.replay_until = replay_until.filter(|until| *until > height);
        state.halted_for_restore = false;

        tracing::info!(
            height,
            replay_until = ?state.replay_until,
            "restored state from snapshot"
        );
        Ok(())
    }

    /// Wipe everything, persisted stores included, and return to genesis.
    /// The last resort when no usable snapshot exists.
    pub fn reset_to_genesis(&self) -> Result<(), EngineError> {
        let mut state = self.lock();
        tracing::warn!("resetting ledger state to genesis for full reparse");

        state.registry.wipe()?;
        state.unique_tokens.wipe()?;
        state.tx_index.wipe()?;
        state.trade_log.wipe()?;
        state.sto_receipts.wipe()?;
        state.balances.clear();
        state.dex.clear();
        state.mdex.clear();
        state.crowdsales.clear();
        state.alerts.clear();
        state.watermark = None;
        state.replay_until = None;
        state.halted_for_restore = false;
        state.apply_genesis_balances();
        Ok(())
    }
}
