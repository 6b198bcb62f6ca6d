//! # Snapshot Persistence
//!
//! Every `snapshot_interval` blocks the full in-memory state is persisted
//! to flat files, one per category, so a reorg or restart can restore
//! without replaying from genesis.
//!
//! ## File format
//!
//! `{category}-{height:010}.dat` under the snapshot dir:
//!
//! - header line: `CATEGORY,height,block_hash_hex`
//! - one record per line, comma separated (crowdsale records append
//!   `,txid=amount;seconds;user;issuer` per participation)
//! - final line: hex consensus hash of the snapshotted state
//!
//! Files are fsynced and renamed into place before the watermark advances.
//! Loading replays categories in dependency order and rejects a snapshot
//! whose recomputed consensus hash disagrees with the stored one.

use crate::consensus_hash::consensus_hash;
use crate::errors::EngineError;
use shared_types::{Address, Amount, BlockHash, BlockHeight, PropertyId, TokenId};
use sl_02_ledger_state::{BalanceLedger, TallyType};
use sl_03_markets::{DexAccept, DexState, MetaDexBook, MetaDexOrder, SellOffer};
use sl_04_crowdsale::{Crowdsale, CrowdsaleMap};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const CATEGORIES: [&str; 7] = [
    "GLOBALS",
    "BALANCES",
    "OFFERS",
    "ACCEPTS",
    "MDEXORDERS",
    "CROWDSALES",
    "UNIQUETOKENS",
];

/// A full snapshot of the reorg-sensitive in-memory state.
pub(crate) struct SnapshotData {
    pub height: BlockHeight,
    pub block_hash: BlockHash,
    pub next_main: PropertyId,
    pub next_test: PropertyId,
    pub balances: BalanceLedger,
    pub dex: DexState,
    pub mdex: MetaDexBook,
    pub crowdsales: CrowdsaleMap,
    pub unique_ranges: Vec<(PropertyId, TokenId, TokenId, Address)>,
}

impl SnapshotData {
    pub(crate) fn consensus_hash(&self) -> [u8; 32] {
        consensus_hash(
            &self.balances,
            &self.dex,
            &self.mdex,
            &self.crowdsales,
            self.next_main,
            self.next_test,
        )
    }
}

fn file_name(category: &str, height: BlockHeight) -> String {
    format!("{}-{:010}.dat", category.to_lowercase(), height)
}

fn malformed(detail: impl Into<String>) -> EngineError {
    EngineError::SnapshotMalformed(detail.into())
}

fn io_err(e: std::io::Error) -> EngineError {
    EngineError::SnapshotIo(e.to_string())
}

fn parse_field<T: std::str::FromStr>(field: &str) -> Result<T, EngineError> {
    field
        .parse()
        .map_err(|_| malformed(format!("bad numeric field `{}`", field)))
}

fn parse_hash(field: &str) -> Result<[u8; 32], EngineError> {
    let bytes = hex::decode(field).map_err(|_| malformed("bad hash field"))?;
    bytes
        .try_into()
        .map_err(|_| malformed("bad hash field length"))
}

/// Durably write one category file: temp file, fsync, rename.
fn write_category(
    dir: &Path,
    category: &str,
    data: &SnapshotData,
    state_hash: &[u8; 32],
    records: Vec<String>,
) -> Result<(), EngineError> {
    let mut content = format!(
        "{},{},{}\n",
        category,
        data.height,
        hex::encode(data.block_hash)
    );
    for record in records {
        content.push_str(&record);
        content.push('\n');
    }
    content.push_str(&hex::encode(state_hash));
    content.push('\n');

    let final_path = dir.join(file_name(category, data.height));
    let temp_path = final_path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path).map_err(io_err)?;
    file.write_all(content.as_bytes()).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    fs::rename(&temp_path, &final_path).map_err(io_err)?;
    Ok(())
}

/// Persist a full snapshot. Returns the consensus hash it was sealed with.
pub(crate) fn write_snapshot(dir: &Path, data: &SnapshotData) -> Result<[u8; 32], EngineError> {
    fs::create_dir_all(dir).map_err(io_err)?;
    let state_hash = data.consensus_hash();

    write_category(
        dir,
        "GLOBALS",
        data,
        &state_hash,
        vec![format!("{},{}", data.next_main, data.next_test)],
    )?;

    let mut balance_rows = Vec::new();
    for (address, tally) in data.balances.addresses() {
        for property in tally.properties() {
            let available = tally.get(property, TallyType::Available);
            let sell_offer = tally.get(property, TallyType::SellOfferReserve);
            let accept = tally.get(property, TallyType::AcceptReserve);
            let metadex = tally.get(property, TallyType::MetaDexReserve);
            if available == 0 && sell_offer == 0 && accept == 0 && metadex == 0 {
                continue;
            }
            balance_rows.push(format!(
                "{},{},{},{},{},{}",
                address, property, available, sell_offer, accept, metadex
            ));
        }
    }
    write_category(dir, "BALANCES", data, &state_hash, balance_rows)?;

    let offer_rows = data
        .dex
        .offers()
        .map(|offer| {
            format!(
                "{},{},{},{},{},{},{},{}",
                offer.seller,
                offer.property,
                hex::encode(offer.txid),
                offer.offer_amount_original,
                offer.native_desired_original,
                offer.min_fee,
                offer.block_time_limit,
                offer.amount_remaining
            )
        })
        .collect();
    write_category(dir, "OFFERS", data, &state_hash, offer_rows)?;

    let accept_rows = data
        .dex
        .accepts()
        .map(|accept| {
            format!(
                "{},{},{},{},{},{},{},{},{},{}",
                accept.seller,
                accept.property,
                accept.buyer,
                hex::encode(accept.offer_txid),
                accept.amount,
                accept.amount_remaining,
                accept.accept_block,
                accept.block_time_limit,
                accept.offer_amount_original,
                accept.native_desired_original
            )
        })
        .collect();
    write_category(dir, "ACCEPTS", data, &state_hash, accept_rows)?;

    let order_rows = data
        .mdex
        .open_orders()
        .map(|order| {
            format!(
                "{},{},{},{},{},{},{},{},{}",
                order.address,
                order.block,
                order.amount_for_sale,
                order.property_for_sale,
                order.amount_desired,
                order.property_desired,
                order.idx,
                hex::encode(order.txid),
                order.amount_remaining
            )
        })
        .collect();
    write_category(dir, "MDEXORDERS", data, &state_hash, order_rows)?;

    let crowd_rows = data
        .crowdsales
        .iter()
        .map(|(issuer, crowd)| {
            let mut row = format!(
                "{},{},{},{},{},{},{},{},{}",
                issuer,
                crowd.property_id,
                crowd.tokens_per_unit,
                crowd.property_desired,
                crowd.deadline,
                crowd.early_bird_pct,
                crowd.issuer_pct,
                crowd.user_created,
                crowd.issuer_created
            );
            for (txid, values) in &crowd.participations {
                row.push_str(&format!(",{}=", hex::encode(txid)));
                let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                row.push_str(&rendered.join(";"));
            }
            row
        })
        .collect();
    write_category(dir, "CROWDSALES", data, &state_hash, crowd_rows)?;

    let range_rows = data
        .unique_ranges
        .iter()
        .map(|(property, start, end, owner)| {
            format!("{},{},{},{}", property, start, end, owner)
        })
        .collect();
    write_category(dir, "UNIQUETOKENS", data, &state_hash, range_rows)?;

    tracing::info!(
        height = data.height,
        hash = %hex::encode(state_hash),
        "persisted state snapshot"
    );
    Ok(state_hash)
}

struct CategoryFile {
    block_hash: BlockHash,
    records: Vec<String>,
    state_hash: [u8; 32],
}

fn read_category(
    dir: &Path,
    category: &str,
    height: BlockHeight,
) -> Result<CategoryFile, EngineError> {
    let path = dir.join(file_name(category, height));
    let content = fs::read_to_string(&path)
        .map_err(|_| EngineError::SnapshotNotFound { height })?;
    let mut lines: Vec<&str> = content.lines().collect();
    if lines.len() < 2 {
        return Err(malformed(format!("{} file truncated", category)));
    }

    let header: Vec<&str> = lines.remove(0).split(',').collect();
    if header.len() != 3 || header[0] != category {
        return Err(malformed(format!("{} header mismatch", category)));
    }
    let header_height: BlockHeight = parse_field(header[1])?;
    if header_height != height {
        return Err(malformed(format!("{} height mismatch", category)));
    }
    let block_hash = parse_hash(header[2])?;

    let state_hash = parse_hash(lines.pop().unwrap_or_default())?;
    Ok(CategoryFile {
        block_hash,
        records: lines.into_iter().map(str::to_string).collect(),
        state_hash,
    })
}

/// Load and verify the snapshot at `height`.
pub(crate) fn load_snapshot(dir: &Path, height: BlockHeight) -> Result<SnapshotData, EngineError> {
    let globals = read_category(dir, "GLOBALS", height)?;
    let globals_row = globals
        .records
        .first()
        .ok_or_else(|| malformed("GLOBALS file has no record"))?;
    let fields: Vec<&str> = globals_row.split(',').collect();
    if fields.len() != 2 {
        return Err(malformed("GLOBALS record malformed"));
    }

    let mut data = SnapshotData {
        height,
        block_hash: globals.block_hash,
        next_main: parse_field(fields[0])?,
        next_test: parse_field(fields[1])?,
        balances: BalanceLedger::new(),
        dex: DexState::new(),
        mdex: MetaDexBook::new(),
        crowdsales: CrowdsaleMap::new(),
        unique_ranges: Vec::new(),
    };

    for record in read_category(dir, "BALANCES", height)?.records {
        let fields: Vec<&str> = record.split(',').collect();
        if fields.len() != 6 {
            return Err(malformed("BALANCES record malformed"));
        }
        let address: Address = fields[0].to_string();
        let property: PropertyId = parse_field(fields[1])?;
        for (index, ttype) in [
            (2, TallyType::Available),
            (3, TallyType::SellOfferReserve),
            (4, TallyType::AcceptReserve),
            (5, TallyType::MetaDexReserve),
        ] {
            let amount: Amount = parse_field(fields[index])?;
            if amount != 0 {
                data.balances.update(&address, property, amount, ttype);
            }
        }
    }

    for record in read_category(dir, "OFFERS", height)?.records {
        let fields: Vec<&str> = record.split(',').collect();
        if fields.len() != 8 {
            return Err(malformed("OFFERS record malformed"));
        }
        data.dex.restore_offer(SellOffer {
            seller: fields[0].to_string(),
            property: parse_field(fields[1])?,
            txid: parse_hash(fields[2])?,
            offer_amount_original: parse_field(fields[3])?,
            native_desired_original: parse_field(fields[4])?,
            min_fee: parse_field(fields[5])?,
            block_time_limit: parse_field(fields[6])?,
            amount_remaining: parse_field(fields[7])?,
        });
    }

    for record in read_category(dir, "ACCEPTS", height)?.records {
        let fields: Vec<&str> = record.split(',').collect();
        if fields.len() != 10 {
            return Err(malformed("ACCEPTS record malformed"));
        }
        data.dex.restore_accept(DexAccept {
            seller: fields[0].to_string(),
            property: parse_field(fields[1])?,
            buyer: fields[2].to_string(),
            offer_txid: parse_hash(fields[3])?,
            amount: parse_field(fields[4])?,
            amount_remaining: parse_field(fields[5])?,
            accept_block: parse_field(fields[6])?,
            block_time_limit: parse_field(fields[7])?,
            offer_amount_original: parse_field(fields[8])?,
            native_desired_original: parse_field(fields[9])?,
        });
    }

    for record in read_category(dir, "MDEXORDERS", height)?.records {
        let fields: Vec<&str> = record.split(',').collect();
        if fields.len() != 9 {
            return Err(malformed("MDEXORDERS record malformed"));
        }
        let order = MetaDexOrder {
            address: fields[0].to_string(),
            block: parse_field(fields[1])?,
            amount_for_sale: parse_field(fields[2])?,
            property_for_sale: parse_field(fields[3])?,
            amount_desired: parse_field(fields[4])?,
            property_desired: parse_field(fields[5])?,
            idx: parse_field(fields[6])?,
            txid: parse_hash(fields[7])?,
            amount_remaining: parse_field(fields[8])?,
        };
        data.mdex
            .restore_order(order)
            .map_err(|e| malformed(format!("unrestorable order: {}", e)))?;
    }

    for record in read_category(dir, "CROWDSALES", height)?.records {
        let fields: Vec<&str> = record.split(',').collect();
        if fields.len() < 9 {
            return Err(malformed("CROWDSALES record malformed"));
        }
        let mut crowd = Crowdsale {
            property_id: parse_field(fields[1])?,
            tokens_per_unit: parse_field(fields[2])?,
            property_desired: parse_field(fields[3])?,
            deadline: parse_field(fields[4])?,
            early_bird_pct: parse_field(fields[5])?,
            issuer_pct: parse_field(fields[6])?,
            user_created: parse_field(fields[7])?,
            issuer_created: parse_field(fields[8])?,
            participations: BTreeMap::new(),
        };
        for participation in &fields[9..] {
            let (txid_hex, values) = participation
                .split_once('=')
                .ok_or_else(|| malformed("participation record malformed"))?;
            let txid = parse_hash(txid_hex)?;
            let values: Result<Vec<Amount>, EngineError> =
                values.split(';').map(parse_field).collect();
            crowd.participations.insert(txid, values?);
        }
        data.crowdsales.insert(fields[0].to_string(), crowd);
    }

    for record in read_category(dir, "UNIQUETOKENS", height)?.records {
        let fields: Vec<&str> = record.split(',').collect();
        if fields.len() != 4 {
            return Err(malformed("UNIQUETOKENS record malformed"));
        }
        data.unique_ranges.push((
            parse_field(fields[0])?,
            parse_field(fields[1])?,
            parse_field(fields[2])?,
            fields[3].to_string(),
        ));
    }

    // every category must carry the same sealed hash, and the state we
    // rebuilt must reproduce it
    let sealed = globals.state_hash;
    for category in CATEGORIES {
        let file = read_category(dir, category, height)?;
        if file.state_hash != sealed || file.block_hash != globals.block_hash {
            return Err(EngineError::SnapshotHashMismatch { height });
        }
    }
    if data.consensus_hash() != sealed {
        return Err(EngineError::SnapshotHashMismatch { height });
    }

    tracing::info!(height, "loaded state snapshot");
    Ok(data)
}

/// The greatest snapshotted height at or below `height`, if any.
pub(crate) fn latest_snapshot_at_or_below(
    dir: &Path,
    height: BlockHeight,
) -> Result<Option<BlockHeight>, EngineError> {
    Ok(snapshot_heights(dir)?
        .into_iter()
        .filter(|h| *h <= height)
        .max())
}

fn snapshot_heights(dir: &Path) -> Result<Vec<BlockHeight>, EngineError> {
    let mut heights = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(heights),
    };
    for entry in entries {
        let entry = entry.map_err(io_err)?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(rest) = name.strip_prefix("globals-") else {
            continue;
        };
        let Some(height) = rest.strip_suffix(".dat") else {
            continue;
        };
        if let Ok(height) = height.parse() {
            heights.push(height);
        }
    }
    heights.sort_unstable();
    Ok(heights)
}

/// Delete snapshot generations beyond the newest `keep`.
pub(crate) fn prune_snapshots(dir: &Path, keep: usize) -> Result<usize, EngineError> {
    let heights = snapshot_heights(dir)?;
    if heights.len() <= keep {
        return Ok(0);
    }
    let victims: Vec<BlockHeight> = heights[..heights.len() - keep].to_vec();
    let mut pruned = 0usize;
    for height in victims {
        for category in CATEGORIES {
            let path: PathBuf = dir.join(file_name(category, height));
            if fs::remove_file(&path).is_ok() {
                pruned += 1;
            }
        }
        tracing::debug!(height, "pruned old snapshot");
    }
    Ok(pruned)
}
