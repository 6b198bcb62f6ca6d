use shared_types::{Address, PropertyId, TokenId};
use sl_01_kv_store::KvStoreError;
use thiserror::Error;

/// Failures of the balance and property layer.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("property {property} is not registered")]
    UnknownProperty { property: PropertyId },

    #[error("insufficient balance for {address}: property {property}, required {required}, available {available}")]
    InsufficientBalance {
        address: Address,
        property: PropertyId,
        required: i64,
        available: i64,
    },

    #[error("string field `{field}` exceeds the 256 byte limit")]
    StringFieldTooLong { field: &'static str },

    #[error("invalid property type {prop_type}")]
    InvalidPropertyType { prop_type: u16 },

    #[error("property type {prop_type} requires a valid predecessor property")]
    MissingPredecessor { prop_type: u16 },

    #[error("a fixed-issuance property cannot also be managed")]
    FixedAndManaged,

    #[error("token range {start}..={end} of property {property} is not owned contiguously by {address}")]
    RangeNotOwned {
        property: PropertyId,
        start: TokenId,
        end: TokenId,
        address: Address,
    },

    #[error("amount {amount} is out of bounds")]
    InvalidAmount { amount: i64 },

    #[error("archived property version missing during rollback; reparse required")]
    ReparseRequired,

    #[error("serialization failure: {0}")]
    Serialization(String),

    #[error(transparent)]
    Store(#[from] KvStoreError),
}
