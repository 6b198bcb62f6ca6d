//! The literal ledger scenarios, reproducible across implementations.

use crate::harness::*;
use sha2::{Digest, Sha256};
use shared_types::{COIN, FIRST_TEST_PROPERTY, PROPERTY_STR};
use sl_02_ledger_state::domain::property::{
    PROPERTY_TYPE_DIVISIBLE, PROPERTY_TYPE_INDIVISIBLE, PROPERTY_TYPE_UNIQUE,
};
use sl_02_ledger_state::TallyType;
use sl_05_consensus::{TransactionIntent, TxDisposition};

#[test]
fn test_simple_divisible_send() {
    let (engine, _dir) = make_engine(vec![(alice(), PROPERTY_STR, COIN)]);

    let out = apply_block(
        &engine,
        1,
        1_000,
        &[(txid(1), simple_send(alice(), bob(), PROPERTY_STR, COIN))],
    );
    expect_applied(&out[0]);

    assert_eq!(engine.balance(&alice(), PROPERTY_STR, TallyType::Available), 0);
    assert_eq!(
        engine.balance(&bob(), PROPERTY_STR, TallyType::Available),
        COIN
    );
}

#[test]
fn test_insufficient_send_rejected_without_side_effects() {
    let (engine, _dir) = make_engine(vec![(alice(), PROPERTY_STR, COIN)]);
    let hash_before = engine.consensus_hash();

    let out = apply_block(
        &engine,
        1,
        1_000,
        &[(txid(1), simple_send(alice(), bob(), PROPERTY_STR, 2 * COIN))],
    );
    assert!(matches!(&out[0], TxDisposition::Rejected { .. }));

    assert_eq!(
        engine.balance(&alice(), PROPERTY_STR, TallyType::Available),
        COIN
    );
    assert_eq!(engine.balance(&bob(), PROPERTY_STR, TallyType::Available), 0);
    assert_eq!(engine.consensus_hash(), hash_before);

    // the rejection is still indexed
    let record = engine.transaction(&txid(1)).unwrap().unwrap();
    assert!(!record.valid);
}

#[test]
fn test_create_fixed_property() {
    let (engine, _dir) = make_engine(vec![]);

    let out = apply_block(
        &engine,
        1,
        1_000,
        &[(
            txid(1),
            create_fixed(carol(), "Quantum Miner", PROPERTY_TYPE_INDIVISIBLE, 1_000_000),
        )],
    );
    expect_applied(&out[0]);

    let property = engine.property_by_creation_tx(&txid(1)).unwrap().unwrap();
    assert_eq!(property, 3);

    let entry = engine.property(property).unwrap().unwrap();
    assert_eq!(entry.issuer, carol());
    assert_eq!(entry.name, "Quantum Miner");
    assert!(entry.fixed);

    assert_eq!(
        engine.balance(&carol(), property, TallyType::Available),
        1_000_000
    );
    assert_eq!(engine.total_tokens(property), (1_000_000, 1));
}

#[test]
fn test_metadex_cross_at_equal_price() {
    let (engine, _dir) = make_engine(vec![(alice(), PROPERTY_STR, 25 * COIN / 10)]);

    // Bob issues the counter-asset
    apply_block(
        &engine,
        1,
        1_000,
        &[(
            txid(1),
            create_fixed(bob(), "Bolt", PROPERTY_TYPE_DIVISIBLE, 50 * COIN),
        )],
    );
    let bolt = engine.property_by_creation_tx(&txid(1)).unwrap().unwrap();

    // Alice sells 2.5 STR for 50.0 Bolt (price 20)
    let out = apply_block(
        &engine,
        2,
        1_100,
        &[(
            txid(2),
            metadex_trade(alice(), PROPERTY_STR, 25 * COIN / 10, bolt, 50 * COIN),
        )],
    );
    expect_applied(&out[0]);
    assert_eq!(
        engine.balance(&alice(), PROPERTY_STR, TallyType::MetaDexReserve),
        25 * COIN / 10
    );

    // Bob sells 50.0 Bolt for 2.5 STR (inverse price 20: exact cross)
    let out = apply_block(
        &engine,
        3,
        1_200,
        &[(
            txid(3),
            metadex_trade(bob(), bolt, 50 * COIN, PROPERTY_STR, 25 * COIN / 10),
        )],
    );
    expect_applied(&out[0]);

    assert_eq!(
        engine.balance(&alice(), bolt, TallyType::Available),
        50 * COIN
    );
    assert_eq!(
        engine.balance(&bob(), PROPERTY_STR, TallyType::Available),
        25 * COIN / 10
    );
    assert_eq!(
        engine.balance(&alice(), PROPERTY_STR, TallyType::MetaDexReserve),
        0
    );
    assert_eq!(engine.balance(&bob(), bolt, TallyType::MetaDexReserve), 0);

    // one trade, recorded under the ordered txid pair
    let trades = engine.trades_of(&txid(2)).unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(engine.trades_of(&txid(3)).unwrap(), trades);
}

#[test]
fn test_crowdsale_vesting_with_bonus() {
    let (engine, _dir) = make_engine(vec![(alice(), PROPERTY_STR, COIN)]);
    let deadline = 14 * 86_400i64;

    apply_block(
        &engine,
        1,
        1_000,
        &[(
            txid(1),
            TransactionIntent::CreatePropertyVariable {
                sender: dave(),
                creation: creation("Vested", PROPERTY_TYPE_INDIVISIBLE),
                property_desired: PROPERTY_STR,
                tokens_per_unit: 100,
                deadline,
                early_bird_pct: 10,
                issuer_pct: 5,
            },
        )],
    );
    let vested = engine.property_by_creation_tx(&txid(1)).unwrap().unwrap();
    assert!(engine.is_crowdsale_active(vested));

    // 1.00000000 STR contributed exactly one week before the deadline:
    // user = 1 * 100 * 1.10 = 110, issuer = 110 * 0.05 truncated = 5
    let out = apply_block(
        &engine,
        2,
        deadline - 7 * 86_400,
        &[(txid(2), simple_send(alice(), dave(), PROPERTY_STR, COIN))],
    );
    expect_applied(&out[0]);

    assert_eq!(engine.balance(&alice(), vested, TallyType::Available), 110);
    assert_eq!(engine.balance(&dave(), vested, TallyType::Available), 5);
    assert_eq!(
        engine.balance(&dave(), PROPERTY_STR, TallyType::Available),
        COIN
    );
    assert_eq!(
        engine.crowdsale_participation(&txid(2)).unwrap(),
        Some((vested, 110, 5))
    );

    // the deadline passes: the sale closes at block end, nothing is missed
    // for a single truncation of half a token
    apply_block(&engine, 3, deadline + 1, &[]);
    assert!(!engine.is_crowdsale_active(vested));

    let entry = engine.property(vested).unwrap().unwrap();
    assert_eq!(entry.time_closed, deadline + 1);
    assert_eq!(entry.missed_tokens, 0);
    assert_eq!(entry.historical_data.len(), 1);

    // participations stay discoverable after the close
    assert_eq!(
        engine.crowdsale_participation(&txid(2)).unwrap(),
        Some((vested, 110, 5))
    );
}

#[test]
fn test_crowdsale_missed_tokens_credit() {
    // two participations each truncate 5.5 to 5; expiry recovers the lost 1
    let (engine, _dir) = make_engine(vec![
        (alice(), PROPERTY_STR, COIN),
        (bob(), PROPERTY_STR, COIN),
    ]);
    let deadline = 14 * 86_400i64;

    apply_block(
        &engine,
        1,
        1_000,
        &[(
            txid(1),
            TransactionIntent::CreatePropertyVariable {
                sender: dave(),
                creation: creation("Vested", PROPERTY_TYPE_INDIVISIBLE),
                property_desired: PROPERTY_STR,
                tokens_per_unit: 100,
                deadline,
                early_bird_pct: 10,
                issuer_pct: 5,
            },
        )],
    );
    let vested = engine.property_by_creation_tx(&txid(1)).unwrap().unwrap();

    apply_block(
        &engine,
        2,
        deadline - 7 * 86_400,
        &[
            (txid(2), simple_send(alice(), dave(), PROPERTY_STR, COIN)),
            (txid(3), simple_send(bob(), dave(), PROPERTY_STR, COIN)),
        ],
    );
    assert_eq!(engine.balance(&dave(), vested, TallyType::Available), 10);

    apply_block(&engine, 3, deadline + 1, &[]);
    let entry = engine.property(vested).unwrap().unwrap();
    assert_eq!(entry.missed_tokens, 1);
    assert_eq!(engine.balance(&dave(), vested, TallyType::Available), 11);
}

#[test]
fn test_unique_token_move_split() {
    let (engine, _dir) = make_engine(vec![]);

    apply_block(
        &engine,
        1,
        1_000,
        &[(
            txid(1),
            create_fixed(alice(), "Deeds", PROPERTY_TYPE_UNIQUE, 100),
        )],
    );
    let deeds = engine.property_by_creation_tx(&txid(1)).unwrap().unwrap();
    assert_eq!(engine.unique_ranges_of(deeds, &alice()).unwrap(), vec![(1, 100)]);

    let out = apply_block(
        &engine,
        2,
        1_100,
        &[(
            txid(2),
            TransactionIntent::UniqueSend {
                sender: alice(),
                recipient: bob(),
                property: deeds,
                token_start: 25,
                token_end: 40,
            },
        )],
    );
    expect_applied(&out[0]);

    assert_eq!(
        engine.unique_ranges_of(deeds, &alice()).unwrap(),
        vec![(1, 24), (41, 100)]
    );
    assert_eq!(engine.unique_ranges_of(deeds, &bob()).unwrap(), vec![(25, 40)]);
    assert_eq!(engine.unique_token_owner(deeds, 25).unwrap(), Some(bob()));
    assert_eq!(engine.unique_token_owner(deeds, 24).unwrap(), Some(alice()));

    assert_eq!(engine.balance(&alice(), deeds, TallyType::Available), 84);
    assert_eq!(engine.balance(&bob(), deeds, TallyType::Available), 16);

    // a fragmented span bounces
    let out = apply_block(
        &engine,
        3,
        1_200,
        &[(
            txid(3),
            TransactionIntent::UniqueSend {
                sender: alice(),
                recipient: carol(),
                property: deeds,
                token_start: 20,
                token_end: 50,
            },
        )],
    );
    assert!(matches!(&out[0], TxDisposition::Rejected { .. }));
}

#[test]
fn test_consensus_hash_reference_vector() {
    let (engine, _dir) = make_engine(vec![(alice(), PROPERTY_STR, COIN)]);

    // scenario 1: the whole genesis balance moves to Bob
    apply_block(
        &engine,
        1,
        1_000,
        &[(txid(1), simple_send(alice(), bob(), PROPERTY_STR, COIN))],
    );
    // scenario 2: Carol registers property 3
    apply_block(
        &engine,
        2,
        1_100,
        &[(
            txid(2),
            create_fixed(carol(), "Quantum Miner", PROPERTY_TYPE_INDIVISIBLE, 1_000_000),
        )],
    );

    // rebuilt from the documented line formats alone
    let mut hasher = Sha256::new();
    hasher.update(format!("{}|1|100000000|0|0|0", bob()));
    hasher.update(format!("{}|3|1000000|0|0|0", carol()));
    hasher.update(format!("4|{}", FIRST_TEST_PROPERTY));
    let expected: [u8; 32] = hasher.finalize().into();

    assert_eq!(engine.consensus_hash(), expected);
}

#[test]
fn test_determinism_across_independent_runs() {
    let run = || {
        let (engine, dir) = make_engine(vec![(alice(), PROPERTY_STR, 10 * COIN)]);
        let mut hashes = Vec::new();
        apply_block(
            &engine,
            1,
            1_000,
            &[
                (txid(1), simple_send(alice(), bob(), PROPERTY_STR, 3 * COIN)),
                (
                    txid(2),
                    create_fixed(bob(), "Bolt", PROPERTY_TYPE_DIVISIBLE, 50 * COIN),
                ),
            ],
        );
        hashes.push(engine.consensus_hash());
        apply_block(
            &engine,
            2,
            1_100,
            &[(
                txid(3),
                metadex_trade(alice(), PROPERTY_STR, COIN, 3, 2 * COIN),
            )],
        );
        hashes.push(engine.consensus_hash());
        drop(dir);
        hashes
    };

    assert_eq!(run(), run());
}

#[test]
fn test_send_to_owners_distribution() {
    let (engine, _dir) = make_engine(vec![
        (alice(), PROPERTY_STR, 100),
        (bob(), PROPERTY_STR, 50),
        (carol(), PROPERTY_STR, 50),
    ]);

    let out = apply_block(
        &engine,
        1,
        1_000,
        &[(
            txid(1),
            TransactionIntent::SendToOwners {
                sender: alice(),
                property: PROPERTY_STR,
                amount: 100,
            },
        )],
    );
    expect_applied(&out[0]);

    assert_eq!(engine.balance(&alice(), PROPERTY_STR, TallyType::Available), 0);
    assert_eq!(engine.balance(&bob(), PROPERTY_STR, TallyType::Available), 100);
    assert_eq!(
        engine.balance(&carol(), PROPERTY_STR, TallyType::Available),
        100
    );

    // supply is conserved
    assert_eq!(engine.total_tokens(PROPERTY_STR).0, 200);
}

#[test]
fn test_grant_and_revoke_managed_property() {
    let (engine, _dir) = make_engine(vec![]);

    apply_block(
        &engine,
        1,
        1_000,
        &[(
            txid(1),
            TransactionIntent::CreatePropertyManual {
                sender: carol(),
                creation: creation("Managed", PROPERTY_TYPE_INDIVISIBLE),
            },
        )],
    );
    let managed = engine.property_by_creation_tx(&txid(1)).unwrap().unwrap();
    assert_eq!(engine.total_tokens(managed).0, 0);

    apply_block(
        &engine,
        2,
        1_100,
        &[(
            txid(2),
            TransactionIntent::GrantTokens {
                sender: carol(),
                recipient: bob(),
                property: managed,
                amount: 500,
            },
        )],
    );
    assert_eq!(engine.balance(&bob(), managed, TallyType::Available), 500);
    assert_eq!(engine.property(managed).unwrap().unwrap().num_tokens, 500);

    // only the issuer may grant
    let out = apply_block(
        &engine,
        3,
        1_200,
        &[(
            txid(3),
            TransactionIntent::GrantTokens {
                sender: bob(),
                recipient: bob(),
                property: managed,
                amount: 1,
            },
        )],
    );
    assert!(matches!(&out[0], TxDisposition::Rejected { .. }));

    // the issuer revokes from its own balance
    apply_block(
        &engine,
        4,
        1_300,
        &[
            (
                txid(4),
                TransactionIntent::GrantTokens {
                    sender: carol(),
                    recipient: carol(),
                    property: managed,
                    amount: 100,
                },
            ),
            (
                txid(5),
                TransactionIntent::RevokeTokens {
                    sender: carol(),
                    property: managed,
                    amount: 60,
                },
            ),
        ],
    );
    assert_eq!(engine.balance(&carol(), managed, TallyType::Available), 40);
    assert_eq!(engine.property(managed).unwrap().unwrap().num_tokens, 540);
    assert_eq!(engine.total_tokens(managed).0, 540);
}

#[test]
fn test_dex_offer_accept_payment_and_expiry() {
    let (engine, _dir) = make_engine(vec![(alice(), PROPERTY_STR, 1_000)]);

    // Alice offers 1000 tokens for 500 native units, 10-block window
    apply_block(
        &engine,
        1,
        1_000,
        &[(
            txid(1),
            TransactionIntent::TradeOffer {
                sender: alice(),
                property: PROPERTY_STR,
                amount: 1_000,
                native_desired: 500,
                min_fee: 10,
                block_time_limit: 10,
                action: sl_05_consensus::OfferAction::New,
            },
        )],
    );
    assert_eq!(
        engine.balance(&alice(), PROPERTY_STR, TallyType::SellOfferReserve),
        1_000
    );

    apply_block(
        &engine,
        2,
        1_100,
        &[(
            txid(2),
            TransactionIntent::AcceptOffer {
                buyer: bob(),
                seller: alice(),
                property: PROPERTY_STR,
                amount: 400,
            },
        )],
    );
    assert_eq!(
        engine.balance(&alice(), PROPERTY_STR, TallyType::AcceptReserve),
        400
    );

    // Bob pays 100 native units: 100 * 1000/500 = 200 tokens
    let out = apply_block(
        &engine,
        3,
        1_200,
        &[(
            txid(3),
            TransactionIntent::NativePayment {
                buyer: bob(),
                seller: alice(),
                amount: 100,
                vout: 0,
            },
        )],
    );
    assert_eq!(expect_applied(&out[0]), 200);
    assert_eq!(engine.balance(&bob(), PROPERTY_STR, TallyType::Available), 200);

    let receipt = engine.purchase_receipt(&txid(3), 1).unwrap().unwrap();
    assert_eq!(receipt.tokens, 200);
    assert_eq!(receipt.buyer, bob());

    // the unpaid remainder expires back into the offer after the window
    for height in 4..=12 {
        apply_block(&engine, height, 1_200 + height as i64, &[]);
    }
    assert_eq!(
        engine.balance(&alice(), PROPERTY_STR, TallyType::AcceptReserve),
        0
    );
    assert_eq!(
        engine.balance(&alice(), PROPERTY_STR, TallyType::SellOfferReserve),
        800
    );
    assert_eq!(engine.total_tokens(PROPERTY_STR).0, 1_000);
}
