//! # The Ledger Engine
//!
//! The single engine value the host holds. All mutable consensus state
//! (C2-C7, the TX index and the receipt stores) lives behind one
//! `parking_lot::Mutex`; the block pipeline holds the lock for a whole
//! block's application, and the read API takes it briefly per query.
//! There are no process-level singletons.

use crate::alerts::{Alert, AlertRegistry};
use crate::config::LedgerConfig;
use crate::consensus_hash::consensus_hash;
use crate::errors::EngineError;
use crate::tx_index::TxIndex;
use parking_lot::{Mutex, MutexGuard};
use shared_types::{Address, Amount, BlockHash, BlockHeight, Ecosystem, PropertyId, TxHash};
use sl_01_kv_store::{KeyValueStore, MemoryKvStore};
use sl_02_ledger_state::{
    BalanceLedger, PendingPool, PendingSend, PropertyEntry, PropertyRegistry, TallyType,
    UniqueTokenStore, HISTORY_ISSUER_TOKENS, HISTORY_USER_TOKENS,
};
use sl_03_markets::{DexState, MetaDexBook, StoReceiptStore, TradeLog};
use sl_04_crowdsale::CrowdsaleMap;

/// The backing stores of the engine, one per persisted database.
pub struct LedgerStores<KV: KeyValueStore> {
    pub registry: KV,
    pub unique_tokens: KV,
    pub tx_index: KV,
    pub trade_log: KV,
    pub sto_receipts: KV,
}

impl LedgerStores<MemoryKvStore> {
    /// Fully in-memory stores, for tests and reparse scratch runs.
    pub fn in_memory() -> Self {
        Self {
            registry: MemoryKvStore::new(),
            unique_tokens: MemoryKvStore::new(),
            tx_index: MemoryKvStore::new(),
            trade_log: MemoryKvStore::new(),
            sto_receipts: MemoryKvStore::new(),
        }
    }
}

/// The full mutable consensus state, guarded by the engine mutex.
pub(crate) struct LedgerState<KV: KeyValueStore> {
    pub(crate) config: LedgerConfig,
    pub(crate) balances: BalanceLedger,
    pub(crate) registry: PropertyRegistry<KV>,
    pub(crate) unique_tokens: UniqueTokenStore<KV>,
    pub(crate) dex: DexState,
    pub(crate) mdex: MetaDexBook,
    pub(crate) crowdsales: CrowdsaleMap,
    pub(crate) tx_index: TxIndex<KV>,
    pub(crate) trade_log: TradeLog<KV>,
    pub(crate) sto_receipts: StoReceiptStore<KV>,
    pub(crate) pending: PendingPool,
    pub(crate) alerts: AlertRegistry,
    pub(crate) watermark: Option<BlockHash>,
    /// Blocks at or below this height re-derive in-memory state only; the
    /// persisted registry and receipt stores already reflect them.
    pub(crate) replay_until: Option<BlockHeight>,
    /// Set after a disconnect wipes in-memory state; block application is
    /// refused until a snapshot restore or a genesis reset.
    pub(crate) halted_for_restore: bool,
}

impl<KV: KeyValueStore> LedgerState<KV> {
    pub(crate) fn is_replay(&self, height: BlockHeight) -> bool {
        self.replay_until.is_some_and(|until| height <= until)
    }

    pub(crate) fn consensus_hash(&self) -> [u8; 32] {
        consensus_hash(
            &self.balances,
            &self.dex,
            &self.mdex,
            &self.crowdsales,
            self.registry.peek_next_id(Ecosystem::Main),
            self.registry.peek_next_id(Ecosystem::Test),
        )
    }

    pub(crate) fn apply_genesis_balances(&mut self) {
        for (address, property, amount) in self.config.genesis_balances.clone() {
            self.balances
                .update(&address, property, amount, TallyType::Available);
        }
        if !self.config.genesis_balances.is_empty() {
            tracing::info!(
                entries = self.config.genesis_balances.len(),
                "applied genesis balances"
            );
        }
    }
}

/// The engine handle the host owns. Clone-free: exactly one instance.
pub struct LedgerEngine<KV: KeyValueStore> {
    state: Mutex<LedgerState<KV>>,
}

impl<KV: KeyValueStore> LedgerEngine<KV> {
    /// Build the engine over its stores. A fresh ledger (no watermark)
    /// receives the configured genesis balances.
    pub fn new(stores: LedgerStores<KV>, config: LedgerConfig) -> Result<Self, EngineError> {
        let registry = PropertyRegistry::new(stores.registry, config.treasury.clone())?;
        let watermark = registry.watermark()?;

        let mut state = LedgerState {
            config,
            balances: BalanceLedger::new(),
            registry,
            unique_tokens: UniqueTokenStore::new(stores.unique_tokens),
            dex: DexState::new(),
            mdex: MetaDexBook::new(),
            crowdsales: CrowdsaleMap::new(),
            tx_index: TxIndex::new(stores.tx_index),
            trade_log: TradeLog::new(stores.trade_log),
            sto_receipts: StoReceiptStore::new(stores.sto_receipts),
            pending: PendingPool::new(),
            alerts: AlertRegistry::new(),
            watermark,
            replay_until: None,
            halted_for_restore: false,
        };

        if state.watermark.is_none() {
            state.apply_genesis_balances();
        } else {
            tracing::info!(
                watermark = %hex::encode(state.watermark.unwrap_or_default()),
                "engine opened with existing watermark; awaiting snapshot restore or reparse"
            );
        }

        Ok(Self {
            state: Mutex::new(state),
        })
    }

    /// Orderly shutdown. Stores flush on drop; this only reports.
    pub fn shutdown(&self) {
        let state = self.state.lock();
        tracing::info!(
            watermark = ?state.watermark.map(hex::encode),
            "ledger engine shutting down"
        );
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, LedgerState<KV>> {
        self.state.lock()
    }

    // ------------------------------------------------------------------
    // Read API: each call takes the state lock briefly.
    // ------------------------------------------------------------------

    /// Balance of one bucket.
    pub fn balance(&self, address: &Address, property: PropertyId, ttype: TallyType) -> Amount {
        self.state.lock().balances.get(address, property, ttype)
    }

    /// AVAILABLE minus outstanding pending debits.
    pub fn spendable_balance(&self, address: &Address, property: PropertyId) -> Amount {
        self.state.lock().balances.spendable(address, property)
    }

    /// Total visible supply of a property and its holder count.
    pub fn total_tokens(&self, property: PropertyId) -> (Amount, usize) {
        self.state.lock().balances.total_of(property)
    }

    /// The current property entry.
    pub fn property(&self, property: PropertyId) -> Result<Option<PropertyEntry>, EngineError> {
        Ok(self.state.lock().registry.get(property)?)
    }

    /// The property created by a transaction.
    pub fn property_by_creation_tx(
        &self,
        txid: &TxHash,
    ) -> Result<Option<PropertyId>, EngineError> {
        Ok(self.state.lock().registry.find_by_txid(txid)?)
    }

    /// Whether a live crowdsale is minting the property.
    pub fn is_crowdsale_active(&self, property: PropertyId) -> bool {
        self.state.lock().crowdsales.is_active_property(property)
    }

    /// Look up whether a transaction was recorded as a crowdsale
    /// participation, active or closed, returning
    /// `(property, user_tokens, issuer_tokens)`.
    pub fn crowdsale_participation(
        &self,
        txid: &TxHash,
    ) -> Result<Option<(PropertyId, Amount, Amount)>, EngineError> {
        let state = self.state.lock();

        for (_, crowdsale) in state.crowdsales.iter() {
            if let Some(row) = crowdsale.participations.get(txid) {
                if let (Some(&user), Some(&issuer)) =
                    (row.get(HISTORY_USER_TOKENS), row.get(HISTORY_ISSUER_TOKENS))
                {
                    return Ok(Some((crowdsale.property_id, user, issuer)));
                }
            }
        }

        for (property, entry) in state.registry.properties()? {
            if entry.fixed || entry.manual {
                continue;
            }
            if let Some(row) = entry.historical_data.get(txid) {
                if let (Some(&user), Some(&issuer)) =
                    (row.get(HISTORY_USER_TOKENS), row.get(HISTORY_ISSUER_TOKENS))
                {
                    return Ok(Some((property, user, issuer)));
                }
            }
        }

        Ok(None)
    }

    /// The current consensus hash (C8), computed on demand.
    pub fn consensus_hash(&self) -> [u8; 32] {
        self.state.lock().consensus_hash()
    }

    /// The unique-token ranges an address owns within a property.
    pub fn unique_ranges_of(
        &self,
        property: PropertyId,
        address: &Address,
    ) -> Result<Vec<(shared_types::TokenId, shared_types::TokenId)>, EngineError> {
        Ok(self.state.lock().unique_tokens.ranges_of(property, address)?)
    }

    /// The owner of one unique token, if allocated.
    pub fn unique_token_owner(
        &self,
        property: PropertyId,
        token: shared_types::TokenId,
    ) -> Result<Option<Address>, EngineError> {
        Ok(self.state.lock().unique_tokens.owner_of(property, token)?)
    }

    /// The index row of a processed payload.
    pub fn transaction(&self, txid: &TxHash) -> Result<Option<crate::tx_index::TxRecord>, EngineError> {
        self.state.lock().tx_index.get_tx(txid)
    }

    /// A purchase receipt under a payment txid (1-based).
    pub fn purchase_receipt(
        &self,
        payment_txid: &TxHash,
        n: usize,
    ) -> Result<Option<crate::tx_index::PurchaseReceipt>, EngineError> {
        self.state.lock().tx_index.purchase(payment_txid, n)
    }

    /// Number of auxiliary receipts under a parent txid.
    pub fn receipt_count(&self, txid: &TxHash) -> Result<usize, EngineError> {
        self.state.lock().tx_index.receipt_count(txid)
    }

    /// All recorded trades one order took part in.
    pub fn trades_of(
        &self,
        txid: &TxHash,
    ) -> Result<Vec<sl_03_markets::TradeRecord>, EngineError> {
        Ok(self.state.lock().trade_log.trades_of(txid)?)
    }

    /// Hash of the most recent fully applied block.
    pub fn watermark(&self) -> Option<BlockHash> {
        self.state.lock().watermark
    }

    /// The live protocol alert, if any.
    pub fn current_alert(&self) -> Option<Alert> {
        self.state.lock().alerts.current().cloned()
    }

    /// Track a broadcast-but-unconfirmed outgoing send.
    pub fn add_pending(&self, txid: TxHash, pending: PendingSend) {
        let mut state = self.state.lock();
        let state = &mut *state;
        state.pending.add(&mut state.balances, txid, pending);
    }

    /// Drop a pending send (confirmed or replaced).
    pub fn remove_pending(&self, txid: &TxHash) -> Option<PendingSend> {
        let mut state = self.state.lock();
        let state = &mut *state;
        state.pending.remove(&mut state.balances, txid)
    }
}
