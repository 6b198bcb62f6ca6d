//! Per-type state transitions.
//!
//! One handler per intent variant. Every handler validates before it
//! mutates and routes all balance movement through a `TallyJournal`, so a
//! rejected mid-sequence check unwinds the whole payload. Rejections are
//! data (the tx is indexed invalid); only store failures and state
//! corruption escape as errors.
//!
//! ## Replay mode
//!
//! While re-deriving in-memory state after a reorg (heights at or below
//! `replay_until`), the persisted stores (registry, TX index, trade log,
//! receipts) already reflect these blocks: writes to them are skipped,
//! issuer checks against the registry are relaxed (the recorded validity
//! verdict is trusted instead), and only C2/C4/C5/C6/C7 are mutated.

use crate::engine::LedgerState;
use crate::errors::EngineError;
use crate::intent::{OfferAction, PropertyCreation, TransactionIntent};
use crate::pipeline::BlockInfo;
use shared_types::{Address, Amount, Ecosystem, PropertyId, TokenId, TxHash};
use sl_01_kv_store::KeyValueStore;
use sl_02_ledger_state::{
    LedgerError, PropertyEntry, PropertyRegistry, TallyJournal, TallyType,
};
use sl_03_markets::{MarketError, MetaDexOrder, UnitPrice};
use sl_04_crowdsale::{Crowdsale, CrowdsaleMap};
use std::collections::BTreeMap;

/// Outcome of applying one payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ApplyResult {
    Applied { amount_amended: Amount },
    Rejected { reason: String },
}

fn rejected(reason: impl Into<String>) -> Result<ApplyResult, EngineError> {
    Ok(ApplyResult::Rejected {
        reason: reason.into(),
    })
}

/// Classify a ledger-layer failure: soft failures reject the payload,
/// store trouble is fatal.
fn ledger_outcome(err: LedgerError) -> Result<ApplyResult, EngineError> {
    match err {
        LedgerError::Store(e) => Err(e.into()),
        LedgerError::Serialization(s) => Err(EngineError::Serialization(s)),
        LedgerError::ReparseRequired => {
            Err(EngineError::ReparseRequired("registry archive missing".to_string()))
        }
        soft => rejected(soft.to_string()),
    }
}

/// Classify a market-layer failure.
fn market_outcome(err: MarketError) -> Result<ApplyResult, EngineError> {
    match err {
        MarketError::ReserveUnderflow => Err(EngineError::ReparseRequired(
            "reserve bookkeeping underflow".to_string(),
        )),
        MarketError::Store(e) => Err(e.into()),
        MarketError::Serialization(s) => Err(EngineError::Serialization(s)),
        MarketError::Ledger(inner) => ledger_outcome(inner),
        soft => rejected(soft.to_string()),
    }
}

pub(crate) fn apply_intent<KV: KeyValueStore>(
    state: &mut LedgerState<KV>,
    block: &BlockInfo,
    idx: u32,
    txid: &TxHash,
    intent: &TransactionIntent,
) -> Result<ApplyResult, EngineError> {
    if let Some(tx_type) = intent.tx_type() {
        if !state
            .config
            .activation
            .is_allowed(tx_type, block.height, intent.primary_property())
        {
            return rejected(format!(
                "type {} disallowed before its activation height",
                tx_type.code()
            ));
        }
    }

    let replay = state.is_replay(block.height);
    if replay {
        // trust the recorded verdict instead of re-running registry-
        // dependent checks against post-reorg entries
        if let Some(record) = state.tx_index.get_tx(txid)? {
            if !record.valid {
                return rejected("recorded invalid in a replayed block");
            }
        }
    }

    use TransactionIntent::*;
    match intent {
        SimpleSend {
            sender,
            recipient,
            property,
            amount,
        } => apply_simple_send(state, replay, block, txid, sender, recipient, *property, *amount),
        SendToOwners {
            sender,
            property,
            amount,
        } => apply_send_to_owners(state, replay, block, txid, sender, *property, *amount),
        UniqueSend {
            sender,
            recipient,
            property,
            token_start,
            token_end,
        } => apply_unique_send(
            state,
            sender,
            recipient,
            *property,
            *token_start,
            *token_end,
        ),
        TradeOffer {
            sender,
            property,
            amount,
            native_desired,
            min_fee,
            block_time_limit,
            action,
        } => apply_trade_offer(
            state,
            txid,
            sender,
            *property,
            *amount,
            *native_desired,
            *min_fee,
            *block_time_limit,
            *action,
        ),
        AcceptOffer {
            buyer,
            seller,
            property,
            amount,
        } => apply_accept_offer(state, block, buyer, seller, *property, *amount),
        NativePayment {
            buyer,
            seller,
            amount,
            vout,
        } => apply_native_payment(state, replay, block, txid, buyer, seller, *amount, *vout),
        MetaDexTrade {
            sender,
            property_for_sale,
            amount_for_sale,
            property_desired,
            amount_desired,
        } => apply_metadex_trade(
            state,
            replay,
            block,
            idx,
            txid,
            sender,
            *property_for_sale,
            *amount_for_sale,
            *property_desired,
            *amount_desired,
        ),
        MetaDexCancelPrice {
            sender,
            property_for_sale,
            amount_for_sale,
            property_desired,
            amount_desired,
        } => {
            let price = match UnitPrice::new(*amount_desired, *amount_for_sale) {
                Ok(price) => price,
                Err(e) => return market_outcome(e),
            };
            apply_metadex_cancel(state, replay, block, txid, |mdex, journal| {
                mdex.cancel_at_price(journal, sender, *property_for_sale, *property_desired, price)
            })
        }
        MetaDexCancelPair {
            sender,
            property_for_sale,
            property_desired,
        } => apply_metadex_cancel(state, replay, block, txid, |mdex, journal| {
            mdex.cancel_pair(journal, sender, *property_for_sale, *property_desired)
        }),
        MetaDexCancelEcosystem { sender, ecosystem } => {
            apply_metadex_cancel(state, replay, block, txid, |mdex, journal| {
                mdex.cancel_ecosystem(journal, sender, *ecosystem)
            })
        }
        CreatePropertyFixed {
            sender,
            creation,
            amount,
        } => apply_create_fixed(state, replay, block, txid, sender, creation, *amount),
        CreatePropertyVariable {
            sender,
            creation,
            property_desired,
            tokens_per_unit,
            deadline,
            early_bird_pct,
            issuer_pct,
        } => apply_create_variable(
            state,
            replay,
            block,
            txid,
            sender,
            creation,
            *property_desired,
            *tokens_per_unit,
            *deadline,
            *early_bird_pct,
            *issuer_pct,
        ),
        CloseCrowdsale { sender } => {
            match close_crowdsale(
                &mut state.registry,
                &mut state.crowdsales,
                sender,
                block,
                txid,
                false,
                replay,
            )? {
                Some(_) => Ok(ApplyResult::Applied { amount_amended: 0 }),
                None => rejected("no active crowdsale for this address"),
            }
        }
        CreatePropertyManual { sender, creation } => {
            apply_create_manual(state, replay, block, txid, sender, creation)
        }
        GrantTokens {
            sender,
            recipient,
            property,
            amount,
        } => apply_grant(state, replay, block, txid, sender, recipient, *property, *amount),
        RevokeTokens {
            sender,
            property,
            amount,
        } => apply_revoke(state, replay, block, txid, sender, *property, *amount),
        ChangeIssuer {
            sender,
            recipient,
            property,
        } => apply_change_issuer(state, replay, block, sender, recipient, *property),
        Alert {
            sender,
            alert_type,
            expiry,
            message,
        } => {
            tracing::info!(%sender, "processing protocol alert");
            state.alerts.set(crate::alerts::Alert {
                alert_type: *alert_type,
                expiry: *expiry,
                message: message.clone(),
            });
            Ok(ApplyResult::Applied { amount_amended: 0 })
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_simple_send<KV: KeyValueStore>(
    state: &mut LedgerState<KV>,
    replay: bool,
    block: &BlockInfo,
    txid: &TxHash,
    sender: &Address,
    recipient: &Address,
    property: PropertyId,
    amount: Amount,
) -> Result<ApplyResult, EngineError> {
    if amount <= 0 {
        return rejected("zero or negative send amount");
    }
    let Some(entry) = state.registry.get(property)? else {
        return rejected(format!("property {} is not registered", property));
    };
    if entry.is_unique() {
        return rejected("unique tokens move by range send");
    }

    let crowdsale_hit = state
        .crowdsales
        .get(recipient)
        .is_some_and(|crowd| crowd.property_desired == property && !crowd.is_expired(block.time));

    let LedgerState {
        balances,
        registry,
        crowdsales,
        ..
    } = state;

    let mut journal = TallyJournal::new(balances);
    if !journal.update(sender, property, -amount, TallyType::Available) {
        journal.rollback();
        return rejected("insufficient balance");
    }
    if !journal.update(recipient, property, amount, TallyType::Available) {
        journal.rollback();
        return rejected("recipient balance overflow");
    }

    if crowdsale_hit {
        let Some(crowd) = crowdsales.get_mut(recipient) else {
            journal.rollback();
            return Err(EngineError::ReparseRequired(
                "crowdsale vanished mid-payload".to_string(),
            ));
        };
        let Some(created_entry) = registry.get(crowd.property_id)? else {
            journal.rollback();
            return Err(EngineError::ReparseRequired(
                "crowdsale property missing from registry".to_string(),
            ));
        };

        let issuance = crowd.compute_issuance(
            created_entry.is_divisible(),
            entry.is_divisible(),
            block.time,
            amount,
        );
        if !journal.update(sender, crowd.property_id, issuance.user_tokens, TallyType::Available)
            || !journal.update(
                recipient,
                crowd.property_id,
                issuance.issuer_tokens,
                TallyType::Available,
            )
        {
            journal.rollback();
            return rejected("crowdsale issuance overflow");
        }
        crowd.record_participation(*txid, amount, block.time, issuance);
        tracing::debug!(
            property = crowd.property_id,
            user_tokens = issuance.user_tokens,
            issuer_tokens = issuance.issuer_tokens,
            "recorded crowdsale participation"
        );

        if issuance.maxed_out {
            journal.commit();
            close_crowdsale(registry, crowdsales, recipient, block, txid, true, replay)?;
            return Ok(ApplyResult::Applied {
                amount_amended: amount,
            });
        }
    }

    journal.commit();
    Ok(ApplyResult::Applied {
        amount_amended: amount,
    })
}

fn apply_send_to_owners<KV: KeyValueStore>(
    state: &mut LedgerState<KV>,
    replay: bool,
    block: &BlockInfo,
    txid: &TxHash,
    sender: &Address,
    property: PropertyId,
    amount: Amount,
) -> Result<ApplyResult, EngineError> {
    if amount <= 0 {
        return rejected("zero or negative distribution amount");
    }
    if !state.registry.has(property)? {
        return rejected(format!("property {} is not registered", property));
    }

    let receivers = sl_03_markets::sto_receivers(&state.balances, sender, property, amount);
    if receivers.is_empty() {
        return rejected("no other holders to distribute to");
    }

    let LedgerState {
        balances,
        sto_receipts,
        ..
    } = state;

    let mut journal = TallyJournal::new(balances);
    if !journal.update(sender, property, -amount, TallyType::Available) {
        journal.rollback();
        return rejected("insufficient balance");
    }
    for (address, cut) in &receivers {
        if !journal.update(address, property, *cut, TallyType::Available) {
            journal.rollback();
            return rejected("receiver balance overflow");
        }
    }

    if !replay {
        for (address, cut) in &receivers {
            if let Err(e) = sto_receipts.record(txid, address, property, *cut, block.height) {
                journal.rollback();
                return market_outcome(e);
            }
        }
    }

    journal.commit();
    tracing::debug!(
        property,
        amount,
        receivers = receivers.len(),
        "distributed send-to-owners"
    );
    Ok(ApplyResult::Applied {
        amount_amended: amount,
    })
}

fn apply_unique_send<KV: KeyValueStore>(
    state: &mut LedgerState<KV>,
    sender: &Address,
    recipient: &Address,
    property: PropertyId,
    token_start: TokenId,
    token_end: TokenId,
) -> Result<ApplyResult, EngineError> {
    if token_start <= 0 || token_end < token_start {
        return rejected("malformed token range");
    }
    let Some(entry) = state.registry.get(property)? else {
        return rejected(format!("property {} is not registered", property));
    };
    if !entry.is_unique() {
        return rejected("property is not a unique-token class");
    }

    let count = token_end - token_start + 1;
    let LedgerState {
        balances,
        unique_tokens,
        ..
    } = state;

    let mut journal = TallyJournal::new(balances);
    if !journal.update(sender, property, -count, TallyType::Available) {
        journal.rollback();
        return rejected("insufficient tokens");
    }
    if !journal.update(recipient, property, count, TallyType::Available) {
        journal.rollback();
        return rejected("recipient balance overflow");
    }

    match unique_tokens.move_range(property, token_start, token_end, sender, recipient) {
        Ok(true) => {
            journal.commit();
            Ok(ApplyResult::Applied {
                amount_amended: count,
            })
        }
        Ok(false) => {
            journal.rollback();
            rejected("token range is not owned contiguously by the sender")
        }
        Err(e) => {
            journal.rollback();
            ledger_outcome(e)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_trade_offer<KV: KeyValueStore>(
    state: &mut LedgerState<KV>,
    txid: &TxHash,
    sender: &Address,
    property: PropertyId,
    amount: Amount,
    native_desired: Amount,
    min_fee: Amount,
    block_time_limit: u8,
    action: OfferAction,
) -> Result<ApplyResult, EngineError> {
    if !state.registry.has(property)? {
        return rejected(format!("property {} is not registered", property));
    }

    let LedgerState { balances, dex, .. } = state;
    let mut journal = TallyJournal::new(balances);
    let result = match action {
        OfferAction::New => dex.create_offer(
            &mut journal,
            *txid,
            sender,
            property,
            amount,
            native_desired,
            min_fee,
            block_time_limit,
        ),
        OfferAction::Update => dex.update_offer(
            &mut journal,
            *txid,
            sender,
            property,
            amount,
            native_desired,
            min_fee,
            block_time_limit,
        ),
        OfferAction::Cancel => dex.cancel_offer(&mut journal, sender, property),
    };

    match result {
        Ok(amended) => {
            journal.commit();
            Ok(ApplyResult::Applied {
                amount_amended: amended,
            })
        }
        Err(e) => {
            journal.rollback();
            market_outcome(e)
        }
    }
}

fn apply_accept_offer<KV: KeyValueStore>(
    state: &mut LedgerState<KV>,
    block: &BlockInfo,
    buyer: &Address,
    seller: &Address,
    property: PropertyId,
    amount: Amount,
) -> Result<ApplyResult, EngineError> {
    let LedgerState { balances, dex, .. } = state;
    let mut journal = TallyJournal::new(balances);

    match dex.accept_offer(&mut journal, seller, property, buyer, amount, block.height) {
        Ok(amended) => {
            journal.commit();
            Ok(ApplyResult::Applied {
                amount_amended: amended,
            })
        }
        Err(e) => {
            journal.rollback();
            market_outcome(e)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_native_payment<KV: KeyValueStore>(
    state: &mut LedgerState<KV>,
    replay: bool,
    block: &BlockInfo,
    txid: &TxHash,
    buyer: &Address,
    seller: &Address,
    amount: Amount,
    vout: u32,
) -> Result<ApplyResult, EngineError> {
    let LedgerState {
        balances,
        dex,
        tx_index,
        ..
    } = state;
    let mut journal = TallyJournal::new(balances);

    match dex.payment(&mut journal, seller, buyer, amount, block.height) {
        Ok(Some(purchase)) => {
            if !replay {
                if let Err(e) = tx_index.record_purchase(
                    txid,
                    vout,
                    buyer,
                    seller,
                    purchase.property,
                    purchase.tokens,
                    block.height,
                ) {
                    journal.rollback();
                    return Err(e);
                }
            }
            journal.commit();
            Ok(ApplyResult::Applied {
                amount_amended: purchase.tokens,
            })
        }
        Ok(None) => {
            journal.commit();
            Ok(ApplyResult::Applied { amount_amended: 0 })
        }
        Err(e) => {
            journal.rollback();
            market_outcome(e)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_metadex_trade<KV: KeyValueStore>(
    state: &mut LedgerState<KV>,
    replay: bool,
    block: &BlockInfo,
    idx: u32,
    txid: &TxHash,
    sender: &Address,
    property_for_sale: PropertyId,
    amount_for_sale: Amount,
    property_desired: PropertyId,
    amount_desired: Amount,
) -> Result<ApplyResult, EngineError> {
    if !state.registry.has(property_for_sale)? || !state.registry.has(property_desired)? {
        return rejected("order references an unregistered property");
    }

    let order = MetaDexOrder {
        block: block.height,
        idx,
        txid: *txid,
        address: sender.clone(),
        property_for_sale,
        amount_for_sale,
        property_desired,
        amount_desired,
        amount_remaining: amount_for_sale,
    };
    if let Err(e) = order.validate() {
        return market_outcome(e);
    }

    let LedgerState {
        balances,
        mdex,
        trade_log,
        ..
    } = state;

    let mut journal = TallyJournal::new(balances);
    if !journal.update(sender, property_for_sale, -amount_for_sale, TallyType::Available) {
        journal.rollback();
        return rejected("insufficient balance");
    }
    if !journal.update(
        sender,
        property_for_sale,
        amount_for_sale,
        TallyType::MetaDexReserve,
    ) {
        journal.rollback();
        return rejected("reserve overflow");
    }

    match mdex.execute(&mut journal, order) {
        Ok(outcome) => {
            if !replay {
                for fill in &outcome.fills {
                    if let Err(e) = trade_log.record_fill(fill) {
                        journal.rollback();
                        return market_outcome(e);
                    }
                }
            }
            journal.commit();
            Ok(ApplyResult::Applied {
                amount_amended: amount_for_sale,
            })
        }
        Err(e) => {
            journal.rollback();
            market_outcome(e)
        }
    }
}

fn apply_metadex_cancel<KV: KeyValueStore>(
    state: &mut LedgerState<KV>,
    replay: bool,
    block: &BlockInfo,
    txid: &TxHash,
    cancel: impl FnOnce(
        &mut sl_03_markets::MetaDexBook,
        &mut TallyJournal<'_>,
    ) -> Result<Vec<sl_03_markets::CancelRelease>, MarketError>,
) -> Result<ApplyResult, EngineError> {
    let LedgerState {
        balances,
        mdex,
        tx_index,
        ..
    } = state;

    let mut journal = TallyJournal::new(balances);
    let releases = match cancel(mdex, &mut journal) {
        Ok(releases) => releases,
        Err(e) => {
            journal.rollback();
            return market_outcome(e);
        }
    };
    if releases.is_empty() {
        journal.rollback();
        return rejected("no matching open orders to cancel");
    }

    if !replay {
        for release in &releases {
            if let Err(e) = tx_index.record_metadex_cancel(
                txid,
                &release.txid,
                release.property,
                release.amount,
                block.height,
            ) {
                journal.rollback();
                return Err(e);
            }
        }
    }

    journal.commit();
    let total: Amount = releases.iter().map(|r| r.amount).sum();
    Ok(ApplyResult::Applied {
        amount_amended: total,
    })
}

fn build_entry(
    sender: &Address,
    creation: &PropertyCreation,
    block: &BlockInfo,
    txid: &TxHash,
) -> PropertyEntry {
    PropertyEntry {
        issuer: sender.clone(),
        prop_type: creation.prop_type,
        prev_prop_id: creation.prev_prop_id,
        category: creation.category.clone(),
        subcategory: creation.subcategory.clone(),
        name: creation.name.clone(),
        url: creation.url.clone(),
        data: creation.data.clone(),
        txid: *txid,
        creation_block: block.hash,
        update_block: block.hash,
        ..Default::default()
    }
}

/// Predecessor rules for REPLACING/APPENDING types.
fn check_predecessor<KV: KeyValueStore>(
    registry: &PropertyRegistry<KV>,
    entry: &PropertyEntry,
    sender: &Address,
    replay: bool,
) -> Result<Option<ApplyResult>, EngineError> {
    if !entry.requires_predecessor() {
        return Ok(None);
    }
    let Some(prev) = registry.get(entry.prev_prop_id)? else {
        return Ok(Some(ApplyResult::Rejected {
            reason: "predecessor property is not registered".to_string(),
        }));
    };
    if !replay && prev.issuer != *sender {
        return Ok(Some(ApplyResult::Rejected {
            reason: "predecessor is issued by a different address".to_string(),
        }));
    }
    Ok(None)
}

/// Allocate the id: a fresh one normally, the recorded one in replay.
fn resolve_property_id<KV: KeyValueStore>(
    registry: &mut PropertyRegistry<KV>,
    ecosystem: Ecosystem,
    entry: &PropertyEntry,
    txid: &TxHash,
    replay: bool,
) -> Result<Result<PropertyId, ApplyResult>, EngineError> {
    if replay {
        match registry.find_by_txid(txid)? {
            Some(id) => {
                registry.note_allocated(id);
                Ok(Ok(id))
            }
            None => Err(EngineError::ReparseRequired(
                "replayed property creation missing from registry".to_string(),
            )),
        }
    } else {
        match registry.put(ecosystem, entry) {
            Ok(id) => Ok(Ok(id)),
            Err(e) => ledger_outcome(e).map(Err),
        }
    }
}

fn apply_create_fixed<KV: KeyValueStore>(
    state: &mut LedgerState<KV>,
    replay: bool,
    block: &BlockInfo,
    txid: &TxHash,
    sender: &Address,
    creation: &PropertyCreation,
    amount: Amount,
) -> Result<ApplyResult, EngineError> {
    if amount <= 0 {
        return rejected("zero or negative issuance");
    }

    let mut entry = build_entry(sender, creation, block, txid);
    entry.num_tokens = amount;
    entry.fixed = true;
    if let Err(e) = entry.validate() {
        return ledger_outcome(e);
    }
    if let Some(result) = check_predecessor(&state.registry, &entry, sender, replay)? {
        return Ok(result);
    }

    let property = match resolve_property_id(&mut state.registry, creation.ecosystem, &entry, txid, replay)? {
        Ok(id) => id,
        Err(result) => return Ok(result),
    };

    let LedgerState {
        balances,
        unique_tokens,
        ..
    } = state;
    let mut journal = TallyJournal::new(balances);
    if !journal.update(sender, property, amount, TallyType::Available) {
        journal.rollback();
        return rejected("issuance overflow");
    }
    if entry.is_unique() {
        if let Err(e) = unique_tokens.create(property, amount, sender) {
            journal.rollback();
            return ledger_outcome(e);
        }
    }
    journal.commit();

    tracing::info!(property, name = %entry.name, amount, "created fixed property");
    Ok(ApplyResult::Applied {
        amount_amended: amount,
    })
}

#[allow(clippy::too_many_arguments)]
fn apply_create_variable<KV: KeyValueStore>(
    state: &mut LedgerState<KV>,
    replay: bool,
    block: &BlockInfo,
    txid: &TxHash,
    sender: &Address,
    creation: &PropertyCreation,
    property_desired: PropertyId,
    tokens_per_unit: Amount,
    deadline: i64,
    early_bird_pct: u8,
    issuer_pct: u8,
) -> Result<ApplyResult, EngineError> {
    if tokens_per_unit <= 0 {
        return rejected("zero or negative issuance rate");
    }
    if deadline <= 0 {
        return rejected("malformed deadline");
    }
    if state.crowdsales.get(sender).is_some() {
        return rejected("address already runs a crowdsale");
    }
    if !state.registry.has(property_desired)? {
        return rejected("desired property is not registered");
    }
    if Ecosystem::of(property_desired) != creation.ecosystem {
        return rejected("desired property is in the wrong ecosystem");
    }

    let mut entry = build_entry(sender, creation, block, txid);
    entry.num_tokens = tokens_per_unit;
    entry.property_desired = property_desired;
    entry.deadline = deadline;
    entry.early_bird_pct = early_bird_pct;
    entry.issuer_pct = issuer_pct;
    if let Err(e) = entry.validate() {
        return ledger_outcome(e);
    }
    if let Some(result) = check_predecessor(&state.registry, &entry, sender, replay)? {
        return Ok(result);
    }

    let property = match resolve_property_id(&mut state.registry, creation.ecosystem, &entry, txid, replay)? {
        Ok(id) => id,
        Err(result) => return Ok(result),
    };

    state.crowdsales.insert(
        sender.clone(),
        Crowdsale {
            property_id: property,
            tokens_per_unit,
            property_desired,
            deadline,
            early_bird_pct,
            issuer_pct,
            user_created: 0,
            issuer_created: 0,
            participations: BTreeMap::new(),
        },
    );

    tracing::info!(property, name = %entry.name, "opened crowdsale");
    Ok(ApplyResult::Applied { amount_amended: 0 })
}

fn apply_create_manual<KV: KeyValueStore>(
    state: &mut LedgerState<KV>,
    replay: bool,
    block: &BlockInfo,
    txid: &TxHash,
    sender: &Address,
    creation: &PropertyCreation,
) -> Result<ApplyResult, EngineError> {
    let mut entry = build_entry(sender, creation, block, txid);
    entry.manual = true;
    if let Err(e) = entry.validate() {
        return ledger_outcome(e);
    }
    if let Some(result) = check_predecessor(&state.registry, &entry, sender, replay)? {
        return Ok(result);
    }

    let property = match resolve_property_id(&mut state.registry, creation.ecosystem, &entry, txid, replay)? {
        Ok(id) => id,
        Err(result) => return Ok(result),
    };

    tracing::info!(property, name = %entry.name, "created managed property");
    Ok(ApplyResult::Applied { amount_amended: 0 })
}

#[allow(clippy::too_many_arguments)]
fn apply_grant<KV: KeyValueStore>(
    state: &mut LedgerState<KV>,
    replay: bool,
    block: &BlockInfo,
    txid: &TxHash,
    sender: &Address,
    recipient: &Address,
    property: PropertyId,
    amount: Amount,
) -> Result<ApplyResult, EngineError> {
    if amount <= 0 {
        return rejected("zero or negative grant");
    }
    let Some(mut entry) = state.registry.get(property)? else {
        return rejected(format!("property {} is not registered", property));
    };
    if !entry.manual {
        return rejected("property is not managed");
    }
    if !replay && entry.issuer != *sender {
        return rejected("only the issuer may grant");
    }
    if entry.num_tokens.checked_add(amount).is_none() {
        return rejected("grant exceeds the supply ceiling");
    }

    let LedgerState {
        balances,
        unique_tokens,
        registry,
        ..
    } = state;
    let mut journal = TallyJournal::new(balances);
    if !journal.update(recipient, property, amount, TallyType::Available) {
        journal.rollback();
        return rejected("recipient balance overflow");
    }
    if entry.is_unique() {
        if let Err(e) = unique_tokens.create(property, amount, recipient) {
            journal.rollback();
            return ledger_outcome(e);
        }
    }

    if !replay {
        entry.historical_data.insert(*txid, vec![amount, 0]);
        entry.num_tokens += amount;
        entry.update_block = block.hash;
        if let Err(e) = registry.update(property, &entry) {
            journal.rollback();
            return ledger_outcome(e);
        }
    }

    journal.commit();
    tracing::debug!(property, amount, "granted tokens");
    Ok(ApplyResult::Applied {
        amount_amended: amount,
    })
}

fn apply_revoke<KV: KeyValueStore>(
    state: &mut LedgerState<KV>,
    replay: bool,
    block: &BlockInfo,
    txid: &TxHash,
    sender: &Address,
    property: PropertyId,
    amount: Amount,
) -> Result<ApplyResult, EngineError> {
    if amount <= 0 {
        return rejected("zero or negative revocation");
    }
    let Some(mut entry) = state.registry.get(property)? else {
        return rejected(format!("property {} is not registered", property));
    };
    if !entry.manual {
        return rejected("property is not managed");
    }
    if entry.is_unique() {
        return rejected("unique tokens cannot be revoked");
    }
    if !replay && entry.issuer != *sender {
        return rejected("only the issuer may revoke");
    }

    let LedgerState {
        balances, registry, ..
    } = state;
    let mut journal = TallyJournal::new(balances);
    if !journal.update(sender, property, -amount, TallyType::Available) {
        journal.rollback();
        return rejected("insufficient balance to revoke");
    }

    if !replay {
        entry.historical_data.insert(*txid, vec![0, amount]);
        entry.num_tokens -= amount;
        entry.update_block = block.hash;
        if let Err(e) = registry.update(property, &entry) {
            journal.rollback();
            return ledger_outcome(e);
        }
    }

    journal.commit();
    tracing::debug!(property, amount, "revoked tokens");
    Ok(ApplyResult::Applied {
        amount_amended: amount,
    })
}

fn apply_change_issuer<KV: KeyValueStore>(
    state: &mut LedgerState<KV>,
    replay: bool,
    block: &BlockInfo,
    sender: &Address,
    recipient: &Address,
    property: PropertyId,
) -> Result<ApplyResult, EngineError> {
    if recipient.is_empty() {
        return rejected("empty recipient");
    }
    let Some(mut entry) = state.registry.get(property)? else {
        return rejected(format!("property {} is not registered", property));
    };
    if !replay && entry.issuer != *sender {
        return rejected("only the issuer may transfer issuance");
    }
    if state.crowdsales.is_active_property(property) {
        return rejected("cannot change the issuer of an active crowdsale");
    }

    if !replay {
        entry.issuer = recipient.clone();
        entry.update_block = block.hash;
        state.registry.update(property, &entry)?;
    }

    tracing::info!(property, new_issuer = %recipient, "changed property issuer");
    Ok(ApplyResult::Applied { amount_amended: 0 })
}

/// Flush a live crowdsale into its property entry and drop it from the
/// active map. `maxed` marks a supply-ceiling closure.
pub(crate) fn close_crowdsale<KV: KeyValueStore>(
    registry: &mut PropertyRegistry<KV>,
    crowdsales: &mut CrowdsaleMap,
    issuer: &Address,
    block: &BlockInfo,
    txid_close: &TxHash,
    maxed: bool,
    replay: bool,
) -> Result<Option<PropertyId>, EngineError> {
    let Some(crowd) = crowdsales.remove(issuer) else {
        return Ok(None);
    };

    if !replay {
        let Some(mut entry) = registry.get(crowd.property_id)? else {
            return Err(EngineError::ReparseRequired(
                "crowdsale property missing from registry".to_string(),
            ));
        };
        entry.historical_data = crowd.participations.clone();
        entry.close_early = true;
        entry.max_tokens = maxed;
        entry.time_closed = block.time;
        entry.txid_close = *txid_close;
        entry.update_block = block.hash;
        registry.update(crowd.property_id, &entry)?;
    }

    tracing::info!(
        property = crowd.property_id,
        maxed,
        "closed crowdsale"
    );
    Ok(Some(crowd.property_id))
}

/// Expire every live crowdsale whose deadline passed, crediting the
/// issuer's missed-token residual. Runs at block-end.
pub(crate) fn expire_crowdsales<KV: KeyValueStore>(
    state: &mut LedgerState<KV>,
    block: &BlockInfo,
) -> Result<usize, EngineError> {
    let replay = state.is_replay(block.height);
    let expired = state.crowdsales.expired_issuers(block.time);
    let count = expired.len();

    for issuer in expired {
        let Some(crowd) = state.crowdsales.remove(&issuer) else {
            continue;
        };
        let Some(mut entry) = state.registry.get(crowd.property_id)? else {
            return Err(EngineError::ReparseRequired(
                "expired crowdsale property missing from registry".to_string(),
            ));
        };

        let missed = sl_04_crowdsale::calculate_missed_tokens(
            entry.is_divisible(),
            state
                .registry
                .get(crowd.property_desired)?
                .map(|desired| desired.is_divisible())
                .unwrap_or(true),
            crowd.tokens_per_unit,
            crowd.early_bird_pct,
            crowd.issuer_pct,
            crowd.deadline,
            &crowd.participations,
            crowd.issuer_created,
        );

        if !replay {
            entry.historical_data = crowd.participations.clone();
            entry.missed_tokens = missed;
            entry.time_closed = block.time;
            entry.update_block = block.hash;
            state.registry.update(crowd.property_id, &entry)?;
        }

        if missed > 0 {
            state
                .balances
                .update(&issuer, crowd.property_id, missed, TallyType::Available);
        }
        tracing::info!(
            property = crowd.property_id,
            missed,
            "expired crowdsale at block end"
        );
    }

    Ok(count)
}
