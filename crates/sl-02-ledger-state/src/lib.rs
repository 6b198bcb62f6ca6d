//! # Ledger State (sl-02)
//!
//! The balance and property layer of the Strata ledger:
//!
//! - `domain::tally` - per-address, per-property balance buckets
//! - `domain::property` - property entries and their invariants
//! - `domain::pending` - optimistic wallet-local pending debits
//! - `service::registry` - versioned, KV-backed property registry with
//!   reorg rollback
//! - `service::unique_tokens` - interval map of unique-token ranges
//!
//! ## Concurrency
//!
//! None of these types lock. The engine (sl-05) owns the single state mutex
//! and every mutating call happens under it; see the concurrency model in
//! the engine crate docs.

pub mod domain;
pub mod service;

pub use domain::errors::LedgerError;
pub use domain::pending::{PendingPool, PendingSend};
pub use domain::property::{PropertyEntry, HISTORY_AMOUNT_IN, HISTORY_ISSUER_TOKENS, HISTORY_TIME, HISTORY_USER_TOKENS};
pub use domain::tally::{AddressTally, BalanceLedger, BalanceRecord, TallyJournal, TallyType};
pub use service::registry::PropertyRegistry;
pub use service::unique_tokens::UniqueTokenStore;
