//! Test harness: engine builders, deterministic block metadata, and
//! intent shorthands.

use shared_types::{Address, Amount, BlockHash, BlockHeight, Ecosystem, PropertyId, TxHash};
use sl_01_kv_store::MemoryKvStore;
use sl_05_consensus::{
    BlockInfo, LedgerConfig, LedgerEngine, LedgerStores, PropertyCreation, TransactionIntent,
    TxDisposition,
};
use tempfile::TempDir;

pub fn alice() -> Address {
    "mpAlice1111111111111111111111111".to_string()
}

pub fn bob() -> Address {
    "mpBob2222222222222222222222222222".to_string()
}

pub fn carol() -> Address {
    "mpCarol333333333333333333333333333".to_string()
}

pub fn dave() -> Address {
    "mpDave44444444444444444444444444444".to_string()
}

/// Deterministic block hash for a test height.
pub fn block_hash(height: BlockHeight) -> BlockHash {
    let mut hash = [0xB0u8; 32];
    hash[..8].copy_from_slice(&height.to_be_bytes());
    hash
}

/// Block metadata at a height, chained onto the previous test block.
pub fn block(height: BlockHeight, time: i64) -> BlockInfo {
    BlockInfo {
        height,
        hash: block_hash(height),
        prev_hash: block_hash(height - 1),
        time,
    }
}

/// Deterministic txid for a test sequence number.
pub fn txid(n: u8) -> TxHash {
    let mut hash = [0u8; 32];
    hash[0] = n;
    hash[31] = 0x7D;
    hash
}

/// An engine over in-memory stores with the given genesis balances. The
/// returned tempdir holds snapshot files and must outlive the engine.
pub fn make_engine(
    genesis: Vec<(Address, PropertyId, Amount)>,
) -> (LedgerEngine<MemoryKvStore>, TempDir) {
    let dir = TempDir::new().expect("tempdir");
    let mut config = LedgerConfig::for_testing(dir.path());
    config.genesis_balances = genesis;
    let engine = LedgerEngine::new(LedgerStores::in_memory(), config).expect("engine");
    (engine, dir)
}

/// Drive one block through begin/apply/end and return the dispositions.
pub fn apply_block(
    engine: &LedgerEngine<MemoryKvStore>,
    height: BlockHeight,
    time: i64,
    txs: &[(TxHash, TransactionIntent)],
) -> Vec<TxDisposition> {
    let info = block(height, time);
    engine.block_begin(&info).expect("block begin");
    let dispositions = txs
        .iter()
        .enumerate()
        .map(|(idx, (txid, intent))| {
            engine
                .apply_transaction(&info, idx as u32, txid, intent)
                .expect("apply")
        })
        .collect();
    engine.block_end(&info).expect("block end");
    dispositions
}

pub fn simple_send(
    sender: Address,
    recipient: Address,
    property: PropertyId,
    amount: Amount,
) -> TransactionIntent {
    TransactionIntent::SimpleSend {
        sender,
        recipient,
        property,
        amount,
    }
}

pub fn creation(name: &str, prop_type: u16) -> PropertyCreation {
    PropertyCreation {
        ecosystem: Ecosystem::Main,
        prop_type,
        prev_prop_id: 0,
        category: "N/A".to_string(),
        subcategory: "N/A".to_string(),
        name: name.to_string(),
        url: String::new(),
        data: String::new(),
    }
}

pub fn create_fixed(sender: Address, name: &str, prop_type: u16, amount: Amount) -> TransactionIntent {
    TransactionIntent::CreatePropertyFixed {
        sender,
        creation: creation(name, prop_type),
        amount,
    }
}

pub fn metadex_trade(
    sender: Address,
    property_for_sale: PropertyId,
    amount_for_sale: Amount,
    property_desired: PropertyId,
    amount_desired: Amount,
) -> TransactionIntent {
    TransactionIntent::MetaDexTrade {
        sender,
        property_for_sale,
        amount_for_sale,
        property_desired,
        amount_desired,
    }
}

/// Unwrap an Applied disposition, panicking with the rejection reason.
pub fn expect_applied(disposition: &TxDisposition) -> Amount {
    match disposition {
        TxDisposition::Applied { amount_amended, .. } => *amount_amended,
        TxDisposition::Rejected { reason, .. } => panic!("payload rejected: {}", reason),
    }
}
