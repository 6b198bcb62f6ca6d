//! Per-address balance buckets (the tally).
//!
//! Every `(address, property)` pair carries five signed 64-bit buckets.
//! All buckets except PENDING must stay non-negative; PENDING may go
//! negative to represent broadcast-but-unconfirmed debits against the
//! available balance.

use serde::{Deserialize, Serialize};
use shared_types::{Address, Amount, PropertyId};
use std::collections::BTreeMap;

/// The balance compartments of a single `(address, property)` record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(usize)]
pub enum TallyType {
    /// Freely spendable tokens.
    Available = 0,
    /// Tokens locked in an open DEx sell offer.
    SellOfferReserve = 1,
    /// Tokens locked toward a specific DEx accept.
    AcceptReserve = 2,
    /// Wallet-local optimistic debits; the only bucket that may go negative.
    Pending = 3,
    /// Tokens locked in open MetaDEx orders.
    MetaDexReserve = 4,
}

/// Number of tally buckets.
pub const TALLY_TYPE_COUNT: usize = 5;

impl TallyType {
    /// All buckets, in storage order.
    pub const ALL: [TallyType; TALLY_TYPE_COUNT] = [
        TallyType::Available,
        TallyType::SellOfferReserve,
        TallyType::AcceptReserve,
        TallyType::Pending,
        TallyType::MetaDexReserve,
    ];
}

/// One balance record: five buckets for a single property.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRecord {
    balances: [Amount; TALLY_TYPE_COUNT],
}

impl BalanceRecord {
    pub fn get(&self, ttype: TallyType) -> Amount {
        self.balances[ttype as usize]
    }

    fn set(&mut self, ttype: TallyType, value: Amount) {
        self.balances[ttype as usize] = value;
    }

    /// Whether every bucket except PENDING is zero.
    ///
    /// Such records are invisible to the consensus hash and dropped from
    /// snapshots.
    pub fn is_empty_excluding_pending(&self) -> bool {
        TallyType::ALL
            .iter()
            .filter(|t| **t != TallyType::Pending)
            .all(|t| self.get(*t) == 0)
    }

    /// Sum of all non-PENDING buckets.
    pub fn total(&self) -> Amount {
        self.get(TallyType::Available)
            + self.get(TallyType::SellOfferReserve)
            + self.get(TallyType::AcceptReserve)
            + self.get(TallyType::MetaDexReserve)
    }
}

/// The balance buckets of one address, across all properties.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressTally {
    tokens: BTreeMap<PropertyId, BalanceRecord>,
}

impl AddressTally {
    /// Add `amount` (may be negative) to a bucket.
    ///
    /// Returns false without mutating when the post-state of a non-PENDING
    /// bucket would be negative, or on arithmetic overflow.
    pub fn update(&mut self, property: PropertyId, amount: Amount, ttype: TallyType) -> bool {
        let record = self.tokens.entry(property).or_default();
        let now = record.get(ttype);

        let updated = match now.checked_add(amount) {
            Some(v) => v,
            None => return false,
        };

        if ttype != TallyType::Pending && updated < 0 {
            return false;
        }

        record.set(ttype, updated);
        true
    }

    pub fn get(&self, property: PropertyId, ttype: TallyType) -> Amount {
        self.tokens
            .get(&property)
            .map(|r| r.get(ttype))
            .unwrap_or(0)
    }

    /// Properties with a record, in ascending numeric order.
    pub fn properties(&self) -> impl Iterator<Item = PropertyId> + '_ {
        self.tokens.keys().copied()
    }

    /// The full record for a property, if present.
    pub fn record(&self, property: PropertyId) -> Option<&BalanceRecord> {
        self.tokens.get(&property)
    }
}

/// The full tally: address to balance buckets, ordered lexicographically by
/// address. The ordering is load-bearing for the consensus hash.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceLedger {
    map: BTreeMap<Address, AddressTally>,
}

impl BalanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `amount` to `(address, property).ttype`.
    ///
    /// Soft failure: returns false and leaves state untouched when the
    /// update would underflow a non-PENDING bucket. The caller treats that
    /// as a semantic rejection of the containing payload.
    pub fn update(
        &mut self,
        address: &Address,
        property: PropertyId,
        amount: Amount,
        ttype: TallyType,
    ) -> bool {
        self.map
            .entry(address.clone())
            .or_default()
            .update(property, amount, ttype)
    }

    /// Balance of a bucket; zero if the record is absent.
    pub fn get(&self, address: &Address, property: PropertyId, ttype: TallyType) -> Amount {
        self.map
            .get(address)
            .map(|t| t.get(property, ttype))
            .unwrap_or(0)
    }

    /// Spendable balance: AVAILABLE plus any negative PENDING debit.
    pub fn spendable(&self, address: &Address, property: PropertyId) -> Amount {
        let available = self.get(address, property, TallyType::Available);
        let pending = self.get(address, property, TallyType::Pending);
        if pending < 0 {
            available + pending
        } else {
            available
        }
    }

    /// Total issued supply visible in the tally for a property, plus the
    /// number of addresses holding any of it.
    pub fn total_of(&self, property: PropertyId) -> (Amount, usize) {
        let mut total: Amount = 0;
        let mut holders = 0usize;
        for tally in self.map.values() {
            if let Some(record) = tally.record(property) {
                let held = record.total();
                if held > 0 {
                    holders += 1;
                }
                total += held;
            }
        }
        (total, holders)
    }

    /// Addresses with a tally, in lexicographic order.
    pub fn addresses(&self) -> impl Iterator<Item = (&Address, &AddressTally)> {
        self.map.iter()
    }

    /// The tally of one address, if present.
    pub fn tally(&self, address: &Address) -> Option<&AddressTally> {
        self.map.get(address)
    }

    /// Drop all balances. Used when a reparse rebuilds state from scratch.
    pub fn clear(&mut self) {
        self.map.clear();
    }
}

/// A scratch journal over the balance ledger.
///
/// Every state transition of one payload routes its tally updates through a
/// journal; a rejected mid-sequence check replays the inverse deltas so the
/// whole payload is all-or-nothing.
pub struct TallyJournal<'a> {
    ledger: &'a mut BalanceLedger,
    ops: Vec<(Address, PropertyId, TallyType, Amount)>,
}

impl<'a> TallyJournal<'a> {
    pub fn new(ledger: &'a mut BalanceLedger) -> Self {
        Self {
            ledger,
            ops: Vec::new(),
        }
    }

    /// Journaled tally update; same soft-failure contract as
    /// [`BalanceLedger::update`].
    pub fn update(
        &mut self,
        address: &Address,
        property: PropertyId,
        amount: Amount,
        ttype: TallyType,
    ) -> bool {
        if self.ledger.update(address, property, amount, ttype) {
            self.ops.push((address.clone(), property, ttype, amount));
            true
        } else {
            false
        }
    }

    pub fn get(&self, address: &Address, property: PropertyId, ttype: TallyType) -> Amount {
        self.ledger.get(address, property, ttype)
    }

    pub fn spendable(&self, address: &Address, property: PropertyId) -> Amount {
        self.ledger.spendable(address, property)
    }

    /// Read access to the underlying ledger.
    pub fn ledger(&self) -> &BalanceLedger {
        self.ledger
    }

    /// Keep all journaled updates.
    pub fn commit(self) {}

    /// Undo every journaled update, newest first.
    pub fn rollback(mut self) {
        while let Some((address, property, ttype, amount)) = self.ops.pop() {
            // the inverse of an applied delta always applies
            let reverted = self.ledger.update(&address, property, -amount, ttype);
            debug_assert!(reverted);
        }
    }
}
