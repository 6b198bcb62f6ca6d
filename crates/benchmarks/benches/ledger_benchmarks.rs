//! Hot-path benchmarks: tally updates, MetaDEx matching, consensus hash.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use shared_types::{Address, Amount, FIRST_TEST_PROPERTY};
use sl_02_ledger_state::{BalanceLedger, TallyJournal, TallyType};
use sl_03_markets::{DexState, MetaDexBook, MetaDexOrder};
use sl_04_crowdsale::CrowdsaleMap;
use sl_05_consensus::consensus_hash;
use sl_benchmarks::seeded_ledger;

fn bench_tally_updates(c: &mut Criterion) {
    let mut group = c.benchmark_group("tally/update");
    for holders in [1_000usize, 10_000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(holders),
            &holders,
            |b, &holders| {
                let mut ledger = seeded_ledger(holders, 4);
                let address: Address = format!("mpHolder{:08}", holders / 2);
                b.iter(|| {
                    ledger.update(&address, 1, 1, TallyType::Available);
                    ledger.update(&address, 1, -1, TallyType::Available);
                });
            },
        );
    }
    group.finish();
}

fn make_maker(n: u32, address: &Address) -> MetaDexOrder {
    let mut txid = [0u8; 32];
    txid[..4].copy_from_slice(&n.to_be_bytes());
    MetaDexOrder {
        block: 10,
        idx: n,
        txid,
        address: address.clone(),
        property_for_sale: 3,
        amount_for_sale: 100,
        property_desired: 1,
        // every maker at a slightly different price level
        amount_desired: 100 + n as Amount,
        amount_remaining: 100,
    }
}

fn bench_metadex_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("metadex/cross_full_book");
    for makers in [100u32, 1_000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(makers),
            &makers,
            |b, &makers| {
                b.iter_batched(
                    || {
                        let mut ledger = BalanceLedger::new();
                        let mut book = MetaDexBook::new();
                        let maker_addr: Address = "mpMaker".to_string();
                        for n in 0..makers {
                            let order = make_maker(n, &maker_addr);
                            ledger.update(
                                &maker_addr,
                                3,
                                order.amount_for_sale,
                                TallyType::MetaDexReserve,
                            );
                            book.restore_order(order).unwrap();
                        }
                        let taker_addr: Address = "mpTaker".to_string();
                        let taker = MetaDexOrder {
                            block: 11,
                            idx: 1,
                            txid: [0xFF; 32],
                            address: taker_addr.clone(),
                            property_for_sale: 1,
                            amount_for_sale: makers as Amount * 300,
                            property_desired: 3,
                            amount_desired: 1,
                            amount_remaining: makers as Amount * 300,
                        };
                        ledger.update(
                            &taker_addr,
                            1,
                            taker.amount_for_sale,
                            TallyType::MetaDexReserve,
                        );
                        (ledger, book, taker)
                    },
                    |(mut ledger, mut book, taker)| {
                        let mut journal = TallyJournal::new(&mut ledger);
                        let outcome = book.execute(&mut journal, taker).unwrap();
                        journal.commit();
                        black_box(outcome)
                    },
                    criterion::BatchSize::SmallInput,
                );
            },
        );
    }
    group.finish();
}

fn bench_consensus_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("consensus_hash/balances");
    for holders in [1_000usize, 10_000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(holders),
            &holders,
            |b, &holders| {
                let ledger = seeded_ledger(holders, 4);
                let dex = DexState::new();
                let mdex = MetaDexBook::new();
                let crowdsales = CrowdsaleMap::new();
                b.iter(|| {
                    black_box(consensus_hash(
                        &ledger,
                        &dex,
                        &mdex,
                        &crowdsales,
                        3,
                        FIRST_TEST_PROPERTY,
                    ))
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_tally_updates,
    bench_metadex_matching,
    bench_consensus_hash
);
criterion_main!(benches);
