//! # Unique-Token Range Index
//!
//! An interval map per property: contiguous token-id ranges mapped to their
//! owner address, with split on partial transfer and merge of adjacent
//! same-owner ranges.
//!
//! ## Keyspace
//!
//! ASCII `"{property:010}_{start:020}-{end:020}"` → owner address. The
//! fixed-width decimal fields make lexicographic key order equal numeric
//! order, so an ordered prefix scan yields ranges grouped by property and
//! sorted by start. Every scan in this module depends on that.
//!
//! ## Invariants
//!
//! - Ranges of one property never overlap.
//! - Two adjacent ranges with the same owner are merged into one.

use crate::domain::errors::LedgerError;
use shared_types::{Address, Amount, PropertyId, TokenId};
use sl_01_kv_store::KeyValueStore;

/// The unique-token range store.
pub struct UniqueTokenStore<KV: KeyValueStore> {
    store: KV,
}

fn range_key(property: PropertyId, start: TokenId, end: TokenId) -> Vec<u8> {
    format!("{:010}_{:020}-{:020}", property, start, end).into_bytes()
}

fn property_prefix(property: PropertyId) -> Vec<u8> {
    format!("{:010}_", property).into_bytes()
}

fn parse_key(key: &[u8]) -> Option<(PropertyId, TokenId, TokenId)> {
    let text = std::str::from_utf8(key).ok()?;
    let (prop, span) = text.split_once('_')?;
    let (start, end) = span.split_once('-')?;
    Some((prop.parse().ok()?, start.parse().ok()?, end.parse().ok()?))
}

impl<KV: KeyValueStore> UniqueTokenStore<KV> {
    pub fn new(store: KV) -> Self {
        Self { store }
    }

    fn add_range(
        &mut self,
        property: PropertyId,
        start: TokenId,
        end: TokenId,
        owner: &Address,
    ) -> Result<(), LedgerError> {
        self.store
            .put(&range_key(property, start, end), owner.as_bytes())?;
        Ok(())
    }

    fn delete_range(
        &mut self,
        property: PropertyId,
        start: TokenId,
        end: TokenId,
    ) -> Result<(), LedgerError> {
        self.store.delete(&range_key(property, start, end))?;
        Ok(())
    }

    /// Every range of every property, grouped by property and ascending by
    /// start. Used when snapshotting.
    pub fn all_ranges(&self) -> Result<Vec<(PropertyId, TokenId, TokenId, Address)>, LedgerError> {
        let mut out = Vec::new();
        for (key, value) in self.store.prefix_scan(b"")? {
            let Some((property, start, end)) = parse_key(&key) else {
                tracing::warn!("skipping malformed unique-token key");
                continue;
            };
            let owner = String::from_utf8(value)
                .map_err(|_| LedgerError::Serialization("non-utf8 range owner".to_string()))?;
            out.push((property, start, end, owner));
        }
        Ok(out)
    }

    /// All ranges of a property, ascending by start.
    pub fn ranges(&self, property: PropertyId) -> Result<Vec<(TokenId, TokenId, Address)>, LedgerError> {
        let mut out = Vec::new();
        for (key, value) in self.store.prefix_scan(&property_prefix(property))? {
            let Some((_, start, end)) = parse_key(&key) else {
                tracing::warn!("skipping malformed unique-token key");
                continue;
            };
            let owner = String::from_utf8(value)
                .map_err(|_| LedgerError::Serialization("non-utf8 range owner".to_string()))?;
            out.push((start, end, owner));
        }
        Ok(out)
    }

    /// The ranges a single address owns within a property.
    pub fn ranges_of(
        &self,
        property: PropertyId,
        address: &Address,
    ) -> Result<Vec<(TokenId, TokenId)>, LedgerError> {
        Ok(self
            .ranges(property)?
            .into_iter()
            .filter(|(_, _, owner)| owner == address)
            .map(|(start, end, _)| (start, end))
            .collect())
    }

    /// The range containing a token id, if allocated.
    pub fn range_containing(
        &self,
        property: PropertyId,
        token: TokenId,
    ) -> Result<Option<(TokenId, TokenId, Address)>, LedgerError> {
        for (start, end, owner) in self.ranges(property)? {
            if token >= start && token <= end {
                return Ok(Some((start, end, owner)));
            }
            if start > token {
                break;
            }
        }
        Ok(None)
    }

    /// The owner of a token id, if allocated.
    pub fn owner_of(
        &self,
        property: PropertyId,
        token: TokenId,
    ) -> Result<Option<Address>, LedgerError> {
        Ok(self
            .range_containing(property, token)?
            .map(|(_, _, owner)| owner))
    }

    /// Whether `[start, end]` lies inside a single allocated range.
    ///
    /// An unallocated span cannot be fragmented across owners, so it counts
    /// as contiguous; `move_range` separately requires ownership.
    pub fn is_contiguous(
        &self,
        property: PropertyId,
        start: TokenId,
        end: TokenId,
    ) -> Result<bool, LedgerError> {
        match self.range_containing(property, start)? {
            Some((_, range_end, _)) => Ok(end <= range_end),
            None => Ok(true),
        }
    }

    /// The highest allocated token id (zero when none are allocated).
    pub fn highest_range_end(&self, property: PropertyId) -> Result<TokenId, LedgerError> {
        Ok(self
            .ranges(property)?
            .last()
            .map(|(_, end, _)| *end)
            .unwrap_or(0))
    }

    /// Allocate `amount` new tokens above the current maximum, extending the
    /// topmost range when the new tokens adjoin one owned by `owner`.
    ///
    /// Returns the newly created span. `start + amount` saturates at
    /// `i64::MAX`.
    pub fn create(
        &mut self,
        property: PropertyId,
        amount: Amount,
        owner: &Address,
    ) -> Result<(TokenId, TokenId), LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount { amount });
        }

        let highest = self.highest_range_end(property)?;
        let new_start = highest + 1;
        let new_end = highest.saturating_add(amount);

        let mut range_start = new_start;
        if highest > 0 {
            if let Some((old_start, old_end, old_owner)) =
                self.range_containing(property, highest)?
            {
                if old_owner == *owner {
                    self.delete_range(property, old_start, old_end)?;
                    range_start = old_start;
                }
            }
        }
        self.add_range(property, range_start, new_end, owner)?;

        tracing::debug!(property, new_start, new_end, "created unique tokens");
        Ok((new_start, new_end))
    }

    /// Move `[start, end]` from one owner to another.
    ///
    /// Succeeds only when `from` owns the whole span within one range.
    /// Unmoved remainders split back to `from`; the moved span merges into
    /// any adjacent range already owned by `to`.
    pub fn move_range(
        &mut self,
        property: PropertyId,
        start: TokenId,
        end: TokenId,
        from: &Address,
        to: &Address,
    ) -> Result<bool, LedgerError> {
        if start <= 0 || end < start {
            return Err(LedgerError::InvalidAmount { amount: end - start });
        }

        let containing = match self.range_containing(property, start)? {
            Some(range) => range,
            None => return Ok(false),
        };
        let (range_start, range_end, range_owner) = containing;
        if range_owner != *from || end > range_end {
            return Ok(false);
        }

        // merge targets, resolved before the source range is rewritten
        let merge_before = match self.range_containing(property, start - 1)? {
            Some((s, e, owner)) if owner == *to => Some((s, e)),
            _ => None,
        };
        let merge_after = match self.range_containing(property, end + 1)? {
            Some((s, e, owner)) if owner == *to => Some((s, e)),
            _ => None,
        };

        // carve the span out of the source range
        self.delete_range(property, range_start, range_end)?;
        if range_start < start {
            self.add_range(property, range_start, start - 1, from)?;
        }
        if range_end > end {
            self.add_range(property, end + 1, range_end, from)?;
        }

        // place the span, merging into the destination's neighbors
        let mut new_start = start;
        let mut new_end = end;
        if let Some((s, e)) = merge_before {
            self.delete_range(property, s, e)?;
            new_start = s;
        }
        if let Some((s, e)) = merge_after {
            self.delete_range(property, s, e)?;
            new_end = e;
        }
        self.add_range(property, new_start, new_end, to)?;

        tracing::debug!(property, start, end, "moved unique-token range");
        Ok(true)
    }

    /// Restore a range verbatim (snapshot load): no merge logic runs.
    pub fn restore_range(
        &mut self,
        property: PropertyId,
        start: TokenId,
        end: TokenId,
        owner: &Address,
    ) -> Result<(), LedgerError> {
        self.add_range(property, start, end, owner)
    }

    /// Drop every range. Used when a reparse rebuilds from genesis.
    pub fn wipe(&mut self) -> Result<(), LedgerError> {
        self.store.clear()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sl_01_kv_store::MemoryKvStore;

    fn make_store() -> UniqueTokenStore<MemoryKvStore> {
        UniqueTokenStore::new(MemoryKvStore::new())
    }

    fn x() -> Address {
        "mpOwnerX".to_string()
    }

    fn y() -> Address {
        "mpOwnerY".to_string()
    }

    #[test]
    fn test_create_appends_above_current_max() {
        let mut store = make_store();
        assert_eq!(store.create(7, 100, &x()).unwrap(), (1, 100));
        assert_eq!(store.create(7, 50, &y()).unwrap(), (101, 150));
        assert_eq!(store.highest_range_end(7).unwrap(), 150);
    }

    #[test]
    fn test_create_merges_adjacent_same_owner() {
        let mut store = make_store();
        store.create(7, 100, &x()).unwrap();
        store.create(7, 20, &x()).unwrap();

        assert_eq!(store.ranges(7).unwrap(), vec![(1, 120, x())]);
    }

    #[test]
    fn test_create_clamps_to_int64_max() {
        let mut store = make_store();
        store.create(7, 10, &x()).unwrap();
        let (_, end) = store.create(7, i64::MAX, &y()).unwrap();
        assert_eq!(end, i64::MAX);
    }

    #[test]
    fn test_move_splits_remainders_back_to_sender() {
        let mut store = make_store();
        store.create(7, 100, &x()).unwrap();

        assert!(store.move_range(7, 25, 40, &x(), &y()).unwrap());

        assert_eq!(
            store.ranges(7).unwrap(),
            vec![(1, 24, x()), (25, 40, y()), (41, 100, x())]
        );
    }

    #[test]
    fn test_move_merges_into_receiver_neighbors() {
        let mut store = make_store();
        store.create(7, 100, &x()).unwrap();
        store.move_range(7, 1, 10, &x(), &y()).unwrap();

        // moving 11..=20 adjoins Y's 1..=10
        assert!(store.move_range(7, 11, 20, &x(), &y()).unwrap());
        assert_eq!(store.ranges(7).unwrap(), vec![(1, 20, y()), (21, 100, x())]);
    }

    #[test]
    fn test_move_rejects_foreign_or_fragmented_spans() {
        let mut store = make_store();
        store.create(7, 50, &x()).unwrap();
        store.create(7, 50, &y()).unwrap();

        // spans two owners
        assert!(!store.move_range(7, 40, 60, &x(), &y()).unwrap());
        // not the owner
        assert!(!store.move_range(7, 60, 70, &x(), &y()).unwrap());
        // unallocated
        assert!(!store.move_range(7, 200, 210, &x(), &y()).unwrap());
    }

    #[test]
    fn test_owner_lookup() {
        let mut store = make_store();
        store.create(7, 100, &x()).unwrap();
        store.move_range(7, 25, 40, &x(), &y()).unwrap();

        assert_eq!(store.owner_of(7, 24).unwrap(), Some(x()));
        assert_eq!(store.owner_of(7, 25).unwrap(), Some(y()));
        assert_eq!(store.owner_of(7, 40).unwrap(), Some(y()));
        assert_eq!(store.owner_of(7, 41).unwrap(), Some(x()));
        assert_eq!(store.owner_of(7, 101).unwrap(), None);
        assert_eq!(store.owner_of(8, 1).unwrap(), None);
    }

    #[test]
    fn test_ranges_of_address() {
        let mut store = make_store();
        store.create(7, 100, &x()).unwrap();
        store.move_range(7, 25, 40, &x(), &y()).unwrap();

        assert_eq!(store.ranges_of(7, &x()).unwrap(), vec![(1, 24), (41, 100)]);
        assert_eq!(store.ranges_of(7, &y()).unwrap(), vec![(25, 40)]);
    }

    #[test]
    fn test_properties_do_not_interfere() {
        let mut store = make_store();
        store.create(7, 10, &x()).unwrap();
        store.create(8, 10, &y()).unwrap();

        assert_eq!(store.ranges(7).unwrap(), vec![(1, 10, x())]);
        assert_eq!(store.ranges(8).unwrap(), vec![(1, 10, y())]);
    }
}
