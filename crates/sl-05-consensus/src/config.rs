//! Engine configuration.

use shared_types::{
    is_test_ecosystem_property, Address, Amount, BlockHeight, PropertyId, TxType,
    MAX_STATE_HISTORY,
};
use std::path::PathBuf;

/// Mainnet activation heights per transaction type.
///
/// These are protocol constants; changing one forks consensus. The test
/// ecosystem bypasses them so new types can soak there first.
mod mainnet {
    use shared_types::BlockHeight;

    pub const GENESIS: BlockHeight = 249_498;
    pub const DEX: BlockHeight = 290_630;
    pub const SMART_PROPERTY: BlockHeight = 297_110;
    pub const MANAGED_PROPERTY: BlockHeight = 323_230;
    pub const SEND_TO_OWNERS: BlockHeight = 342_650;
    pub const METADEX: BlockHeight = 999_999;
    pub const UNIQUE_TOKENS: BlockHeight = 999_999;
}

/// Data-driven `(type, min_block)` gate table.
#[derive(Clone, Debug)]
pub struct ActivationTable {
    entries: Vec<(TxType, BlockHeight)>,
}

impl ActivationTable {
    /// The mainnet schedule.
    pub fn mainnet() -> Self {
        use TxType::*;
        Self {
            entries: vec![
                (SimpleSend, mainnet::GENESIS),
                (SendToOwners, mainnet::SEND_TO_OWNERS),
                (UniqueSend, mainnet::UNIQUE_TOKENS),
                (TradeOffer, mainnet::DEX),
                (AcceptOffer, mainnet::DEX),
                (MetaDexTrade, mainnet::METADEX),
                (MetaDexCancelPrice, mainnet::METADEX),
                (MetaDexCancelPair, mainnet::METADEX),
                (MetaDexCancelEcosystem, mainnet::METADEX),
                (CreatePropertyFixed, mainnet::SMART_PROPERTY),
                (CreatePropertyVariable, mainnet::SMART_PROPERTY),
                (CloseCrowdsale, mainnet::SMART_PROPERTY),
                (CreatePropertyManual, mainnet::MANAGED_PROPERTY),
                (GrantTokens, mainnet::MANAGED_PROPERTY),
                (RevokeTokens, mainnet::MANAGED_PROPERTY),
                (ChangeIssuer, mainnet::MANAGED_PROPERTY),
                (Alert, mainnet::GENESIS),
            ],
        }
    }

    /// Everything live from height zero (regtest and unit tests).
    pub fn all_from_genesis() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Whether a transaction type is live at `height`.
    ///
    /// Transactions touching a test-ecosystem property are always allowed.
    pub fn is_allowed(
        &self,
        tx_type: TxType,
        height: BlockHeight,
        property: Option<PropertyId>,
    ) -> bool {
        if property.is_some_and(is_test_ecosystem_property) {
            return true;
        }
        match self.entries.iter().find(|(t, _)| *t == tx_type) {
            Some((_, min_block)) => height >= *min_block,
            None => true,
        }
    }
}

/// Engine configuration: snapshot cadence, activation gates, genesis.
#[derive(Clone, Debug)]
pub struct LedgerConfig {
    /// Blocks between full state snapshots.
    pub snapshot_interval: BlockHeight,
    /// Snapshot generations kept on disk.
    pub snapshot_retention: usize,
    /// Directory for snapshot files.
    pub snapshot_dir: PathBuf,
    /// Issuer of the two genesis tokens.
    pub treasury: Address,
    /// Balances credited once when the engine starts with no watermark.
    pub genesis_balances: Vec<(Address, PropertyId, Amount)>,
    /// Per-type activation gates.
    pub activation: ActivationTable,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            snapshot_interval: MAX_STATE_HISTORY,
            snapshot_retention: 3,
            snapshot_dir: PathBuf::from("./data/state"),
            treasury: "sTreasury1111111111111111111111111".to_string(),
            genesis_balances: Vec::new(),
            activation: ActivationTable::mainnet(),
        }
    }
}

impl LedgerConfig {
    /// Config for tests: everything active, snapshots in a sandbox dir.
    pub fn for_testing(snapshot_dir: impl Into<PathBuf>) -> Self {
        Self {
            snapshot_dir: snapshot_dir.into(),
            activation: ActivationTable::all_from_genesis(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mainnet_gates() {
        let table = ActivationTable::mainnet();
        assert!(!table.is_allowed(TxType::SimpleSend, 200_000, Some(1)));
        assert!(table.is_allowed(TxType::SimpleSend, 249_498, Some(1)));
        assert!(!table.is_allowed(TxType::TradeOffer, 290_629, Some(1)));
        assert!(table.is_allowed(TxType::TradeOffer, 290_630, Some(1)));
    }

    #[test]
    fn test_test_ecosystem_bypasses_gates() {
        let table = ActivationTable::mainnet();
        assert!(table.is_allowed(TxType::MetaDexTrade, 1, Some(0x8000_0003)));
        assert!(!table.is_allowed(TxType::MetaDexTrade, 1, Some(31)));
    }

    #[test]
    fn test_genesis_table_allows_everything() {
        let table = ActivationTable::all_from_genesis();
        assert!(table.is_allowed(TxType::MetaDexTrade, 0, Some(1)));
    }
}
