//! Transaction type codes as carried on the wire and in the TX index.

use serde::{Deserialize, Serialize};

/// Protocol transaction types, with their wire codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum TxType {
    SimpleSend = 0,
    SendToOwners = 3,
    UniqueSend = 5,
    TradeOffer = 20,
    AcceptOffer = 22,
    MetaDexTrade = 25,
    MetaDexCancelPrice = 26,
    MetaDexCancelPair = 27,
    MetaDexCancelEcosystem = 28,
    CreatePropertyFixed = 50,
    CreatePropertyVariable = 51,
    CloseCrowdsale = 53,
    CreatePropertyManual = 54,
    GrantTokens = 55,
    RevokeTokens = 56,
    ChangeIssuer = 70,
    Alert = 65535,
}

impl TxType {
    /// Wire code of the type.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Human label, for logs and receipts.
    pub fn label(self) -> &'static str {
        match self {
            TxType::SimpleSend => "simple send",
            TxType::SendToOwners => "send to owners",
            TxType::UniqueSend => "unique send",
            TxType::TradeOffer => "trade offer",
            TxType::AcceptOffer => "accept offer",
            TxType::MetaDexTrade => "metadex trade",
            TxType::MetaDexCancelPrice => "metadex cancel at price",
            TxType::MetaDexCancelPair => "metadex cancel pair",
            TxType::MetaDexCancelEcosystem => "metadex cancel ecosystem",
            TxType::CreatePropertyFixed => "create fixed property",
            TxType::CreatePropertyVariable => "create crowdsale property",
            TxType::CloseCrowdsale => "close crowdsale",
            TxType::CreatePropertyManual => "create managed property",
            TxType::GrantTokens => "grant tokens",
            TxType::RevokeTokens => "revoke tokens",
            TxType::ChangeIssuer => "change issuer",
            TxType::Alert => "alert",
        }
    }
}
