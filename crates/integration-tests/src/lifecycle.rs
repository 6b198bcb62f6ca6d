//! Watermark continuity, reorg rollback, snapshot recovery and replay.

use crate::harness::*;
use shared_types::{COIN, PROPERTY_STR};
use sl_02_ledger_state::domain::property::PROPERTY_TYPE_INDIVISIBLE;
use sl_02_ledger_state::TallyType;
use sl_05_consensus::{BlockInfo, EngineError};

#[test]
fn test_watermark_mismatch_requires_reparse() {
    let (engine, _dir) = make_engine(vec![(alice(), PROPERTY_STR, COIN)]);
    apply_block(&engine, 1, 1_000, &[]);

    // a block that does not extend the applied tip
    let stranger = BlockInfo {
        height: 3,
        hash: block_hash(3),
        prev_hash: block_hash(2),
        time: 1_200,
    };
    assert!(matches!(
        engine.block_begin(&stranger),
        Err(EngineError::ReparseRequired(_))
    ));
}

#[test]
fn test_rollback_restores_pre_block_state() {
    let (engine, _dir) = make_engine(vec![(alice(), PROPERTY_STR, COIN)]);

    apply_block(
        &engine,
        1,
        1_000,
        &[(txid(1), simple_send(alice(), bob(), PROPERTY_STR, COIN / 2))],
    );
    engine.save_state(&block(1, 1_000)).unwrap();
    let hash_at_one = engine.consensus_hash();

    // block 2 creates a property and moves more funds
    apply_block(
        &engine,
        2,
        1_100,
        &[
            (
                txid(2),
                create_fixed(carol(), "Ephemeral", PROPERTY_TYPE_INDIVISIBLE, 42),
            ),
            (txid(3), simple_send(bob(), carol(), PROPERTY_STR, COIN / 4)),
        ],
    );
    assert_ne!(engine.consensus_hash(), hash_at_one);
    assert!(engine.property(3).unwrap().is_some());

    // disconnect block 2 and restore the block-1 snapshot
    let outcome = engine.disconnect_begin(&block(2, 1_100)).unwrap();
    assert_eq!(outcome.restore_height, Some(1));
    engine.disconnect_end(&block(2, 1_100)).unwrap();

    // applying before restoring is refused
    assert!(matches!(
        engine.block_begin(&block(2, 1_200)),
        Err(EngineError::ReparseRequired(_))
    ));

    engine.restore_from_snapshot(1, Some(1)).unwrap();

    assert_eq!(engine.consensus_hash(), hash_at_one);
    assert_eq!(engine.watermark(), Some(block_hash(1)));
    // the property creation rolled back, its id is free again
    assert!(engine.property(3).unwrap().is_none());
    assert_eq!(engine.property_by_creation_tx(&txid(2)).unwrap(), None);
    assert!(engine.transaction(&txid(2)).unwrap().is_none());

    // the chain keeps extending from block 1
    apply_block(
        &engine,
        2,
        1_300,
        &[(txid(4), simple_send(bob(), alice(), PROPERTY_STR, COIN / 4))],
    );
    assert_eq!(
        engine.balance(&alice(), PROPERTY_STR, TallyType::Available),
        COIN / 2 + COIN / 4
    );
}

#[test]
fn test_snapshot_roundtrip_through_engine() {
    let (engine, _dir) = make_engine(vec![(alice(), PROPERTY_STR, COIN)]);

    apply_block(
        &engine,
        1,
        1_000,
        &[(txid(1), simple_send(alice(), bob(), PROPERTY_STR, COIN / 2))],
    );
    let saved_hash = engine.save_state(&block(1, 1_000)).unwrap();
    assert_eq!(saved_hash, engine.consensus_hash());

    apply_block(
        &engine,
        2,
        1_100,
        &[(txid(2), simple_send(bob(), carol(), PROPERTY_STR, COIN / 8))],
    );

    // wipe memory, load: the restored state reproduces the sealed hash
    engine.restore_from_snapshot(1, None).unwrap();
    assert_eq!(engine.consensus_hash(), saved_hash);
    assert_eq!(
        engine.balance(&bob(), PROPERTY_STR, TallyType::Available),
        COIN / 2
    );
    assert_eq!(engine.balance(&carol(), PROPERTY_STR, TallyType::Available), 0);
}

#[test]
fn test_replay_rebuilds_in_memory_state() {
    let (engine, _dir) = make_engine(vec![(alice(), PROPERTY_STR, COIN)]);

    let block2_txs = [
        (
            txid(2),
            create_fixed(carol(), "Durable", PROPERTY_TYPE_INDIVISIBLE, 1_000),
        ),
        (txid(3), simple_send(alice(), bob(), PROPERTY_STR, COIN / 4)),
    ];

    apply_block(
        &engine,
        1,
        1_000,
        &[(txid(1), simple_send(alice(), bob(), PROPERTY_STR, COIN / 2))],
    );
    engine.save_state(&block(1, 1_000)).unwrap();

    apply_block(&engine, 2, 1_100, &block2_txs);
    let hash_at_two = engine.consensus_hash();

    apply_block(
        &engine,
        3,
        1_200,
        &[(txid(4), simple_send(bob(), carol(), PROPERTY_STR, COIN / 8))],
    );

    // reorg drops block 3; the best snapshot is at height 1, so block 2
    // replays on top of it
    let outcome = engine.disconnect_begin(&block(3, 1_200)).unwrap();
    assert_eq!(outcome.restore_height, Some(1));
    engine.restore_from_snapshot(1, Some(2)).unwrap();

    // block 2 created a property; its registry entry survived the reorg
    // and the replay resolves the same id
    apply_block(&engine, 2, 1_100, &block2_txs);

    assert_eq!(engine.consensus_hash(), hash_at_two);
    assert_eq!(engine.property_by_creation_tx(&txid(2)).unwrap(), Some(3));
    assert_eq!(engine.balance(&carol(), 3, TallyType::Available), 1_000);

    // and the chain continues normally
    apply_block(
        &engine,
        3,
        1_300,
        &[(txid(5), simple_send(bob(), carol(), PROPERTY_STR, COIN / 8))],
    );
    assert_eq!(
        engine.balance(&carol(), PROPERTY_STR, TallyType::Available),
        COIN / 8
    );
}

#[test]
fn test_periodic_snapshots_on_cadence() {
    let (engine, _dir) = make_engine(vec![(alice(), PROPERTY_STR, COIN)]);

    // the default cadence snapshots every 50 blocks
    let mut wrote_snapshot = false;
    for height in 1..=50 {
        let info = block(height, 1_000 + height as i64);
        engine.block_begin(&info).unwrap();
        let summary = engine.block_end(&info).unwrap();
        if height == 50 {
            wrote_snapshot = summary.snapshot_hash.is_some();
        } else {
            assert!(summary.snapshot_hash.is_none());
        }
    }
    assert!(wrote_snapshot);

    // the sealed snapshot restores
    engine.restore_from_snapshot(50, None).unwrap();
    assert_eq!(
        engine.balance(&alice(), PROPERTY_STR, TallyType::Available),
        COIN
    );
}

#[test]
fn test_reset_to_genesis() {
    let (engine, _dir) = make_engine(vec![(alice(), PROPERTY_STR, COIN)]);

    apply_block(
        &engine,
        1,
        1_000,
        &[
            (
                txid(1),
                create_fixed(carol(), "Doomed", PROPERTY_TYPE_INDIVISIBLE, 9),
            ),
            (txid(2), simple_send(alice(), bob(), PROPERTY_STR, COIN / 2)),
        ],
    );

    engine.reset_to_genesis().unwrap();

    assert_eq!(engine.watermark(), None);
    assert!(engine.property(3).unwrap().is_none());
    assert!(engine.transaction(&txid(1)).unwrap().is_none());
    assert_eq!(
        engine.balance(&alice(), PROPERTY_STR, TallyType::Available),
        COIN
    );
    assert_eq!(engine.balance(&bob(), PROPERTY_STR, TallyType::Available), 0);
}
