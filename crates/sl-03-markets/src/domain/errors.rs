use shared_types::{Address, PropertyId};
use sl_01_kv_store::KvStoreError;
use sl_02_ledger_state::LedgerError;
use thiserror::Error;

/// Failures of the DEx and MetaDEx layer.
#[derive(Debug, Error)]
pub enum MarketError {
    #[error("{seller} already has an open sell offer for property {property}")]
    OfferAlreadyOpen {
        seller: Address,
        property: PropertyId,
    },

    #[error("no open sell offer for {seller} and property {property}")]
    OfferNotFound {
        seller: Address,
        property: PropertyId,
    },

    #[error("{buyer} already has an open accept toward {seller} for property {property}")]
    AcceptAlreadyOpen {
        seller: Address,
        property: PropertyId,
        buyer: Address,
    },

    #[error("an order cannot trade a property against itself")]
    SamePropertyPair { property: PropertyId },

    #[error("properties {for_sale} and {desired} live in different ecosystems")]
    CrossEcosystemPair {
        for_sale: PropertyId,
        desired: PropertyId,
    },

    #[error("amount {amount} is out of bounds")]
    InvalidAmount { amount: i64 },

    #[error("reserve bookkeeping failed mid-trade; state is inconsistent")]
    ReserveUnderflow,

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] KvStoreError),

    #[error("serialization failure: {0}")]
    Serialization(String),
}
