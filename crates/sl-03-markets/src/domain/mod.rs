//! Pure market logic.

pub mod dex;
pub mod errors;
pub mod mdex;
pub mod price;
pub mod sto;
