//! # Crowdsale Engine (sl-04)
//!
//! Live crowdsales and their issuance math. A crowdsale is the open phase
//! of a variable-issuance property: participations sent to the issuer mint
//! user tokens plus an issuer bonus until the deadline passes, the supply
//! maxes out, or the issuer closes the sale.
//!
//! The property entry stays authoritative; the active map here is an index
//! plus a buffer for in-flight participations, flushed into the entry at
//! close.

pub mod crowdsale;
pub mod fractional;

pub use crowdsale::{Crowdsale, CrowdsaleMap, Issuance};
pub use fractional::calculate_missed_tokens;
