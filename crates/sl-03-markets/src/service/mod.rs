//! KV-backed market bookkeeping: trade history and STO receipts.

pub mod sto_receipts;
pub mod trade_log;
