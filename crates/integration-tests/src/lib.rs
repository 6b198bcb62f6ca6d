//! # Integration Tests Crate
//!
//! End-to-end scenarios that drive the full engine through its block
//! lifecycle: sends, property creation, MetaDEx crosses, crowdsale
//! vesting, unique-token moves, the consensus-hash reference vectors, and
//! the reorg/snapshot recovery protocol.
//!
//! ## Structure
//!
//! ```text
//! integration-tests/
//! ├── src/
//! │   ├── lib.rs        # This file
//! │   ├── harness.rs    # Engine builders, block helpers, intent builders
//! │   ├── scenarios.rs  # The literal ledger scenarios
//! │   └── lifecycle.rs  # Watermark, rollback, snapshot, replay tests
//! ```

pub mod harness;

#[cfg(test)]
mod lifecycle;
#[cfg(test)]
mod scenarios;
