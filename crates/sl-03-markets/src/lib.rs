//! # Markets (sl-03)
//!
//! The two exchanges of the Strata ledger plus their bookkeeping:
//!
//! - `domain::dex` - token-for-native-coin sell offers, accepts and payment
//!   matching
//! - `domain::mdex` - the token-for-token order book with deterministic
//!   price-time matching
//! - `domain::price` - exact rational unit prices
//! - `domain::sto` - send-to-owners pro-rata distribution
//! - `service::trade_log` - persisted trade history
//! - `service::sto_receipts` - persisted send-to-owners recipient rows
//!
//! All balance movement goes through a `TallyJournal` so a containing
//! payload can be rolled back as a unit.

pub mod domain;
pub mod service;

pub use domain::dex::{DexAccept, DexPurchase, DexState, ExpiredAccept, SellOffer};
pub use domain::errors::MarketError;
pub use domain::mdex::{
    CancelRelease, MatchOutcome, MetaDexBook, MetaDexOrder, OrderStatus, TradeFill,
};
pub use domain::price::UnitPrice;
pub use domain::sto::sto_receivers;
pub use service::sto_receipts::StoReceiptStore;
pub use service::trade_log::{TradeLog, TradeRecord};
