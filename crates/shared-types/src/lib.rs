//! # Shared Types Crate
//!
//! Cross-subsystem primitives for the Strata ledger: identifiers, hashes,
//! ecosystem partitioning and transaction type codes.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every type that crosses a crate boundary is
//!   defined here.
//! - **Consensus-Critical Constants**: the ecosystem boundary, genesis
//!   property ids and numeric limits are fixed by the protocol and must not
//!   change without a consensus flag.

pub mod ecosystem;
pub mod entities;
pub mod transactions;

pub use ecosystem::*;
pub use entities::*;
pub use transactions::*;
