//! Property entries and their structural invariants.

use crate::domain::errors::LedgerError;
use serde::{Deserialize, Serialize};
use shared_types::{
    Address, Amount, BlockHash, PropertyId, TxHash, SP_STRING_FIELD_LEN, ZERO_HASH,
};
use std::collections::BTreeMap;

/// Indivisible tokens (whole units only).
pub const PROPERTY_TYPE_INDIVISIBLE: u16 = 1;
/// Divisible tokens (1e-8 base units).
pub const PROPERTY_TYPE_DIVISIBLE: u16 = 2;
/// Non-fungible tokens backed by the unique-token range index.
pub const PROPERTY_TYPE_UNIQUE: u16 = 5;
/// Indivisible, replacing a predecessor property.
pub const PROPERTY_TYPE_INDIVISIBLE_REPLACING: u16 = 65;
/// Divisible, replacing a predecessor property.
pub const PROPERTY_TYPE_DIVISIBLE_REPLACING: u16 = 66;
/// Indivisible, appending to a predecessor property.
pub const PROPERTY_TYPE_INDIVISIBLE_APPENDING: u16 = 129;
/// Divisible, appending to a predecessor property.
pub const PROPERTY_TYPE_DIVISIBLE_APPENDING: u16 = 130;

/// High-bit flag: this property replaces its predecessor.
const FLAG_REPLACING: u16 = 64;
/// High-bit flag: this property appends to its predecessor.
const FLAG_APPENDING: u16 = 128;

/// Indices into a crowdsale participation row in `historical_data`.
pub const HISTORY_AMOUNT_IN: usize = 0;
pub const HISTORY_TIME: usize = 1;
pub const HISTORY_USER_TOKENS: usize = 2;
pub const HISTORY_ISSUER_TOKENS: usize = 3;

/// A registered property.
///
/// For crowdsale properties `historical_data` rows are
/// `txid -> [amount_in, tx_seconds, user_tokens, issuer_tokens]`; for
/// managed properties they are `txid -> [grant, revoke]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyEntry {
    pub issuer: Address,
    pub prop_type: u16,
    pub prev_prop_id: PropertyId,
    pub category: String,
    pub subcategory: String,
    pub name: String,
    pub url: String,
    pub data: String,
    pub num_tokens: Amount,

    // crowdsale parameters
    pub property_desired: PropertyId,
    pub deadline: i64,
    pub early_bird_pct: u8,
    pub issuer_pct: u8,

    // closure state, when the property was a crowdsale
    pub close_early: bool,
    pub max_tokens: bool,
    pub missed_tokens: Amount,
    pub time_closed: i64,
    pub txid_close: TxHash,

    // provenance
    pub txid: TxHash,
    pub creation_block: BlockHash,
    pub update_block: BlockHash,
    pub fixed: bool,
    pub manual: bool,

    pub historical_data: BTreeMap<TxHash, Vec<Amount>>,
}

impl Default for PropertyEntry {
    fn default() -> Self {
        Self {
            issuer: Address::new(),
            prop_type: 0,
            prev_prop_id: 0,
            category: String::new(),
            subcategory: String::new(),
            name: String::new(),
            url: String::new(),
            data: String::new(),
            num_tokens: 0,
            property_desired: 0,
            deadline: 0,
            early_bird_pct: 0,
            issuer_pct: 0,
            close_early: false,
            max_tokens: false,
            missed_tokens: 0,
            time_closed: 0,
            txid_close: ZERO_HASH,
            txid: ZERO_HASH,
            creation_block: ZERO_HASH,
            update_block: ZERO_HASH,
            fixed: false,
            manual: false,
            historical_data: BTreeMap::new(),
        }
    }
}

impl PropertyEntry {
    /// Whether amounts of this property carry 1e-8 base units.
    pub fn is_divisible(&self) -> bool {
        matches!(
            self.prop_type,
            PROPERTY_TYPE_DIVISIBLE
                | PROPERTY_TYPE_DIVISIBLE_REPLACING
                | PROPERTY_TYPE_DIVISIBLE_APPENDING
        )
    }

    /// Whether this property is backed by the unique-token range index.
    pub fn is_unique(&self) -> bool {
        self.prop_type == PROPERTY_TYPE_UNIQUE
    }

    /// Whether the type flags require a predecessor property.
    pub fn requires_predecessor(&self) -> bool {
        self.prop_type & (FLAG_REPLACING | FLAG_APPENDING) != 0
    }

    /// Structural validation of a new entry.
    pub fn validate(&self) -> Result<(), LedgerError> {
        let fields: [(&'static str, &str); 5] = [
            ("category", &self.category),
            ("subcategory", &self.subcategory),
            ("name", &self.name),
            ("url", &self.url),
            ("data", &self.data),
        ];
        for (field, value) in fields {
            if value.len() > SP_STRING_FIELD_LEN {
                return Err(LedgerError::StringFieldTooLong { field });
            }
        }

        match self.prop_type {
            PROPERTY_TYPE_INDIVISIBLE
            | PROPERTY_TYPE_DIVISIBLE
            | PROPERTY_TYPE_UNIQUE
            | PROPERTY_TYPE_INDIVISIBLE_REPLACING
            | PROPERTY_TYPE_DIVISIBLE_REPLACING
            | PROPERTY_TYPE_INDIVISIBLE_APPENDING
            | PROPERTY_TYPE_DIVISIBLE_APPENDING => {}
            other => return Err(LedgerError::InvalidPropertyType { prop_type: other }),
        }

        if self.requires_predecessor() && self.prev_prop_id == 0 {
            return Err(LedgerError::MissingPredecessor {
                prop_type: self.prop_type,
            });
        }

        if self.fixed && self.manual {
            return Err(LedgerError::FixedAndManaged);
        }

        Ok(())
    }
}
