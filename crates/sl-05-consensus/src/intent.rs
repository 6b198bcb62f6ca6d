//! Validated transaction intents.
//!
//! The payload dispatcher (external) decodes raw payload bytes into one of
//! these variants; the engine only ever sees the typed form. A single
//! handler per variant keeps the pipeline linear and lets the activation
//! gates stay data-driven.

use shared_types::{Address, Amount, Ecosystem, PropertyId, TokenId, TxType};

/// Sub-action of a DEx trade offer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OfferAction {
    New = 1,
    Update = 2,
    Cancel = 3,
}

/// Common creation fields of the three property-creating intents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropertyCreation {
    pub ecosystem: Ecosystem,
    pub prop_type: u16,
    pub prev_prop_id: PropertyId,
    pub category: String,
    pub subcategory: String,
    pub name: String,
    pub url: String,
    pub data: String,
}

/// One decoded, structurally valid transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionIntent {
    SimpleSend {
        sender: Address,
        recipient: Address,
        property: PropertyId,
        amount: Amount,
    },
    SendToOwners {
        sender: Address,
        property: PropertyId,
        amount: Amount,
    },
    UniqueSend {
        sender: Address,
        recipient: Address,
        property: PropertyId,
        token_start: TokenId,
        token_end: TokenId,
    },
    TradeOffer {
        sender: Address,
        property: PropertyId,
        amount: Amount,
        native_desired: Amount,
        min_fee: Amount,
        block_time_limit: u8,
        action: OfferAction,
    },
    AcceptOffer {
        buyer: Address,
        seller: Address,
        property: PropertyId,
        amount: Amount,
    },
    /// A plain native-coin transfer observed on the base chain, routed here
    /// for DEx payment matching (and crowdsale lookups by the host).
    NativePayment {
        buyer: Address,
        seller: Address,
        amount: Amount,
        vout: u32,
    },
    MetaDexTrade {
        sender: Address,
        property_for_sale: PropertyId,
        amount_for_sale: Amount,
        property_desired: PropertyId,
        amount_desired: Amount,
    },
    MetaDexCancelPrice {
        sender: Address,
        property_for_sale: PropertyId,
        amount_for_sale: Amount,
        property_desired: PropertyId,
        amount_desired: Amount,
    },
    MetaDexCancelPair {
        sender: Address,
        property_for_sale: PropertyId,
        property_desired: PropertyId,
    },
    MetaDexCancelEcosystem {
        sender: Address,
        ecosystem: Ecosystem,
    },
    CreatePropertyFixed {
        sender: Address,
        creation: PropertyCreation,
        amount: Amount,
    },
    CreatePropertyVariable {
        sender: Address,
        creation: PropertyCreation,
        property_desired: PropertyId,
        tokens_per_unit: Amount,
        deadline: i64,
        early_bird_pct: u8,
        issuer_pct: u8,
    },
    CloseCrowdsale {
        sender: Address,
    },
    CreatePropertyManual {
        sender: Address,
        creation: PropertyCreation,
    },
    GrantTokens {
        sender: Address,
        recipient: Address,
        property: PropertyId,
        amount: Amount,
    },
    RevokeTokens {
        sender: Address,
        property: PropertyId,
        amount: Amount,
    },
    ChangeIssuer {
        sender: Address,
        recipient: Address,
        property: PropertyId,
    },
    Alert {
        sender: Address,
        alert_type: u32,
        expiry: u64,
        message: String,
    },
}

impl TransactionIntent {
    /// The wire type, when the intent corresponds to a payload type.
    /// Native payments are bare base-chain transfers and have none.
    pub fn tx_type(&self) -> Option<TxType> {
        use TransactionIntent::*;
        Some(match self {
            SimpleSend { .. } => TxType::SimpleSend,
            SendToOwners { .. } => TxType::SendToOwners,
            UniqueSend { .. } => TxType::UniqueSend,
            TradeOffer { .. } => TxType::TradeOffer,
            AcceptOffer { .. } => TxType::AcceptOffer,
            NativePayment { .. } => return None,
            MetaDexTrade { .. } => TxType::MetaDexTrade,
            MetaDexCancelPrice { .. } => TxType::MetaDexCancelPrice,
            MetaDexCancelPair { .. } => TxType::MetaDexCancelPair,
            MetaDexCancelEcosystem { .. } => TxType::MetaDexCancelEcosystem,
            CreatePropertyFixed { .. } => TxType::CreatePropertyFixed,
            CreatePropertyVariable { .. } => TxType::CreatePropertyVariable,
            CloseCrowdsale { .. } => TxType::CloseCrowdsale,
            CreatePropertyManual { .. } => TxType::CreatePropertyManual,
            GrantTokens { .. } => TxType::GrantTokens,
            RevokeTokens { .. } => TxType::RevokeTokens,
            ChangeIssuer { .. } => TxType::ChangeIssuer,
            Alert { .. } => TxType::Alert,
        })
    }

    /// The property the activation gate is judged against, if any.
    pub fn primary_property(&self) -> Option<PropertyId> {
        use TransactionIntent::*;
        match self {
            SimpleSend { property, .. }
            | SendToOwners { property, .. }
            | UniqueSend { property, .. }
            | TradeOffer { property, .. }
            | AcceptOffer { property, .. }
            | GrantTokens { property, .. }
            | RevokeTokens { property, .. }
            | ChangeIssuer { property, .. } => Some(*property),
            MetaDexTrade {
                property_for_sale, ..
            }
            | MetaDexCancelPrice {
                property_for_sale, ..
            }
            | MetaDexCancelPair {
                property_for_sale, ..
            } => Some(*property_for_sale),
            MetaDexCancelEcosystem { ecosystem, .. } => Some(ecosystem.first_property()),
            CreatePropertyFixed { creation, .. }
            | CreatePropertyVariable { creation, .. }
            | CreatePropertyManual { creation, .. } => Some(creation.ecosystem.first_property()),
            CloseCrowdsale { .. } | NativePayment { .. } | Alert { .. } => None,
        }
    }

    /// The sending address.
    pub fn sender(&self) -> &Address {
        use TransactionIntent::*;
        match self {
            SimpleSend { sender, .. }
            | SendToOwners { sender, .. }
            | UniqueSend { sender, .. }
            | TradeOffer { sender, .. }
            | MetaDexTrade { sender, .. }
            | MetaDexCancelPrice { sender, .. }
            | MetaDexCancelPair { sender, .. }
            | MetaDexCancelEcosystem { sender, .. }
            | CreatePropertyFixed { sender, .. }
            | CreatePropertyVariable { sender, .. }
            | CloseCrowdsale { sender }
            | CreatePropertyManual { sender, .. }
            | GrantTokens { sender, .. }
            | RevokeTokens { sender, .. }
            | ChangeIssuer { sender, .. }
            | Alert { sender, .. } => sender,
            AcceptOffer { buyer, .. } => buyer,
            NativePayment { buyer, .. } => buyer,
        }
    }
}
