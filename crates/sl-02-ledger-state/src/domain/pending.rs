//! Optimistic wallet-local pending debits.
//!
//! A broadcast-but-unconfirmed send is tracked here and debited against the
//! PENDING bucket, so the wallet does not double-spend its own in-flight
//! amounts. The record is discarded when the transaction confirms or is
//! replaced; confirmation re-credits PENDING because the confirmed state
//! transition debits AVAILABLE instead.

use crate::domain::tally::{BalanceLedger, TallyType};
use shared_types::{Address, Amount, PropertyId, TxHash};
use shared_types::TxType;
use std::collections::BTreeMap;

/// One broadcast-but-unconfirmed outgoing transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingSend {
    pub sender: Address,
    pub property: PropertyId,
    pub amount: Amount,
    pub tx_type: TxType,
    pub subject: String,
}

/// All pending sends of the local wallet, keyed by txid.
#[derive(Clone, Debug, Default)]
pub struct PendingPool {
    map: BTreeMap<TxHash, PendingSend>,
}

impl PendingPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new pending send and debit the PENDING bucket.
    pub fn add(&mut self, ledger: &mut BalanceLedger, txid: TxHash, pending: PendingSend) {
        ledger.update(
            &pending.sender,
            pending.property,
            -pending.amount,
            TallyType::Pending,
        );
        self.map.insert(txid, pending);
    }

    /// Remove a pending send (confirmed or replaced) and release its debit.
    pub fn remove(&mut self, ledger: &mut BalanceLedger, txid: &TxHash) -> Option<PendingSend> {
        let pending = self.map.remove(txid)?;
        ledger.update(
            &pending.sender,
            pending.property,
            pending.amount,
            TallyType::Pending,
        );
        Some(pending)
    }

    pub fn contains(&self, txid: &TxHash) -> bool {
        self.map.contains_key(txid)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_debit_and_release() {
        let mut ledger = BalanceLedger::new();
        let mut pool = PendingPool::new();
        let sender = "mpSender".to_string();
        ledger.update(&sender, 1, 100, TallyType::Available);

        let txid = [7u8; 32];
        pool.add(
            &mut ledger,
            txid,
            PendingSend {
                sender: sender.clone(),
                property: 1,
                amount: 40,
                tx_type: TxType::SimpleSend,
                subject: "mpRecipient".to_string(),
            },
        );

        assert_eq!(ledger.get(&sender, 1, TallyType::Pending), -40);
        assert_eq!(ledger.spendable(&sender, 1), 60);

        pool.remove(&mut ledger, &txid).unwrap();
        assert_eq!(ledger.get(&sender, 1, TallyType::Pending), 0);
        assert!(pool.is_empty());
    }
}
