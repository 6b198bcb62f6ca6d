//! # Consensus Engine (sl-05)
//!
//! The deterministic state engine of the Strata ledger: one engine value
//! tying the tally, property registry, markets and crowdsales to the base
//! chain's block lifecycle.
//!
//! ## Architecture
//!
//! ```text
//! host node
//! ├── LedgerEngine (one instance, one state mutex)
//! │   ├── block_begin / apply_transaction / block_end
//! │   ├── disconnect_begin / restore_from_snapshot (reorg)
//! │   └── read API (balances, properties, consensus hash)
//! │
//! sl-05-consensus
//! ├── intent.rs         # typed payload intents + activation gates
//! ├── apply.rs          # one handler per intent, journaled
//! ├── consensus_hash.rs # canonical state fingerprint (C8)
//! ├── tx_index.rs       # per-tx validity and receipts (C10)
//! ├── snapshot.rs       # flat-file state persistence
//! └── pipeline.rs       # the chain-event surface (C9)
//! ```
//!
//! ## Concurrency Model
//!
//! Single-threaded cooperative with respect to state mutation: one
//! process-wide mutex guards all consensus state, the pipeline holds it
//! for a whole block, and payload application never suspends. Ordering is
//! `(block height, tx index)` and nothing else.

mod apply;
mod snapshot;

pub mod alerts;
pub mod config;
pub mod consensus_hash;
pub mod engine;
pub mod errors;
pub mod intent;
pub mod pipeline;
pub mod tx_index;

pub use alerts::Alert;
pub use config::{ActivationTable, LedgerConfig};
pub use consensus_hash::consensus_hash;
pub use engine::{LedgerEngine, LedgerStores};
pub use errors::EngineError;
pub use intent::{OfferAction, PropertyCreation, TransactionIntent};
pub use pipeline::{BlockEndSummary, BlockInfo, DisconnectOutcome, TxDisposition};
pub use tx_index::{CancelReceipt, PurchaseReceipt, TxRecord};
