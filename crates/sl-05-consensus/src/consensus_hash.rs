//! # Consensus Hash
//!
//! A canonical SHA-256 fingerprint of the full deterministic state, built
//! from UTF-8 stage lines fed to the hasher without any delimiter. Other
//! implementations reproduce it from the documented line formats alone, so
//! the exact strings and sort orders below are consensus-critical.
//!
//! Stages, in order:
//!
//! 1. balances: `"{address}|{property}|{bal}|{so_res}|{acc_res}|{mdex_res}"`,
//!    addresses lexicographic, properties ascending; empty records and the
//!    PENDING bucket are invisible
//! 2. DEx offers: `"{txid}|{seller}|{property}|{offer_amt}|{native_desired}|{min_fee}|{time_limit}"`,
//!    ascending by txid
//! 3. DEx accepts: `"{offer_txid}|{buyer}|{amt}|{amt_remaining}|{accept_block}"`,
//!    ascending by (offer txid, buyer)
//! 4. MetaDEx orders: `"{txid}|{addr}|{pfs}|{afs}|{pd}|{ad}|{ar}"`, ascending
//!    by txid
//! 5. crowdsales: `"{property}|{property_desired}|{deadline}|{user_created}|{issuer_created}"`,
//!    ascending by property
//! 6. property counters: `"{next_main}|{next_test}"` once

use sha2::{Digest, Sha256};
use shared_types::PropertyId;
use sl_02_ledger_state::{BalanceLedger, TallyType};
use sl_03_markets::{DexState, MetaDexBook};
use sl_04_crowdsale::CrowdsaleMap;

/// Compute the consensus hash over the live state.
pub fn consensus_hash(
    balances: &BalanceLedger,
    dex: &DexState,
    mdex: &MetaDexBook,
    crowdsales: &CrowdsaleMap,
    next_main: PropertyId,
    next_test: PropertyId,
) -> [u8; 32] {
    let mut hasher = Sha256::new();

    // stage 1: balances
    for (address, tally) in balances.addresses() {
        for property in tally.properties() {
            let balance = tally.get(property, TallyType::Available);
            let sell_offer_reserve = tally.get(property, TallyType::SellOfferReserve);
            let accept_reserve = tally.get(property, TallyType::AcceptReserve);
            let metadex_reserve = tally.get(property, TallyType::MetaDexReserve);

            if balance == 0
                && sell_offer_reserve == 0
                && accept_reserve == 0
                && metadex_reserve == 0
            {
                continue;
            }

            hasher.update(format!(
                "{}|{}|{}|{}|{}|{}",
                address, property, balance, sell_offer_reserve, accept_reserve, metadex_reserve
            ));
        }
    }

    // stage 2: DEx sell offers, ascending by txid
    let mut offers: Vec<_> = dex
        .offers()
        .map(|offer| {
            (
                offer.txid,
                format!(
                    "{}|{}|{}|{}|{}|{}|{}",
                    hex::encode(offer.txid),
                    offer.seller,
                    offer.property,
                    offer.offer_amount_original,
                    offer.native_desired_original,
                    offer.min_fee,
                    offer.block_time_limit
                ),
            )
        })
        .collect();
    offers.sort();
    for (_, line) in offers {
        hasher.update(line);
    }

    // stage 3: DEx accepts, ascending by (offer txid, buyer)
    let mut accepts: Vec<_> = dex
        .accepts()
        .map(|accept| {
            (
                (accept.offer_txid, accept.buyer.clone()),
                format!(
                    "{}|{}|{}|{}|{}",
                    hex::encode(accept.offer_txid),
                    accept.buyer,
                    accept.amount,
                    accept.amount_remaining,
                    accept.accept_block
                ),
            )
        })
        .collect();
    accepts.sort();
    for (_, line) in accepts {
        hasher.update(line);
    }

    // stage 4: open MetaDEx orders, ascending by txid
    let mut orders: Vec<_> = mdex
        .open_orders()
        .map(|order| {
            (
                order.txid,
                format!(
                    "{}|{}|{}|{}|{}|{}|{}",
                    hex::encode(order.txid),
                    order.address,
                    order.property_for_sale,
                    order.amount_for_sale,
                    order.property_desired,
                    order.amount_desired,
                    order.amount_remaining
                ),
            )
        })
        .collect();
    orders.sort();
    for (_, line) in orders {
        hasher.update(line);
    }

    // stage 5: active crowdsales, ascending by property
    let mut crowds: Vec<_> = crowdsales
        .iter()
        .map(|(_, crowdsale)| {
            (
                crowdsale.property_id,
                format!(
                    "{}|{}|{}|{}|{}",
                    crowdsale.property_id,
                    crowdsale.property_desired,
                    crowdsale.deadline,
                    crowdsale.user_created,
                    crowdsale.issuer_created
                ),
            )
        })
        .collect();
    crowds.sort();
    for (_, line) in crowds {
        hasher.update(line);
    }

    // stage 6: property counters
    hasher.update(format!("{}|{}", next_main, next_test));

    hasher.finalize().into()
}
