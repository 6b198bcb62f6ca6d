//! The token-for-token market (MetaDEx).
//!
//! One book per `property_for_sale`: a price-sorted map of order sets, each
//! set totally ordered by `(block, idx)`. Matching is a pure function of
//! chain position: a new order walks the opposite book from the best price
//! upward, crossing at the resting (maker) order's price, and any residue
//! is inserted at its own price level.
//!
//! Settlement math is integer-only. The rational price orders the walk and
//! gates each cross; trade sizes come from a single floored
//! cross-multiplication per fill, and zero-size (dust) crosses never match.

use crate::domain::errors::MarketError;
use crate::domain::price::UnitPrice;
use shared_types::{same_ecosystem, Address, Amount, BlockHeight, Ecosystem, PropertyId, TxHash};
use sl_02_ledger_state::{TallyJournal, TallyType};
use std::collections::BTreeMap;

/// Position of an order inside a price level: chain order.
type OrderKey = (BlockHeight, u32);

/// An open MetaDEx order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetaDexOrder {
    pub block: BlockHeight,
    pub idx: u32,
    pub txid: TxHash,
    pub address: Address,
    pub property_for_sale: PropertyId,
    pub amount_for_sale: Amount,
    pub property_desired: PropertyId,
    pub amount_desired: Amount,
    pub amount_remaining: Amount,
}

impl MetaDexOrder {
    /// Units of `property_desired` asked per unit of `property_for_sale`.
    pub fn unit_price(&self) -> Result<UnitPrice, MarketError> {
        UnitPrice::new(self.amount_desired, self.amount_for_sale)
    }

    /// Structural checks shared by every order-shaped payload.
    pub fn validate(&self) -> Result<(), MarketError> {
        if self.property_for_sale == self.property_desired {
            return Err(MarketError::SamePropertyPair {
                property: self.property_for_sale,
            });
        }
        if !same_ecosystem(self.property_for_sale, self.property_desired) {
            return Err(MarketError::CrossEcosystemPair {
                for_sale: self.property_for_sale,
                desired: self.property_desired,
            });
        }
        if self.amount_for_sale <= 0 {
            return Err(MarketError::InvalidAmount {
                amount: self.amount_for_sale,
            });
        }
        if self.amount_desired <= 0 {
            return Err(MarketError::InvalidAmount {
                amount: self.amount_desired,
            });
        }
        Ok(())
    }
}

/// Final state of a new order after matching.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderStatus {
    /// No cross; the full amount rests in the book.
    Open,
    /// Some crosses; the residue rests in the book.
    PartiallyFilled,
    /// Fully crossed; nothing was inserted.
    Filled,
}

/// One cross between the new (taker) order and a resting (maker) order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TradeFill {
    pub maker_txid: TxHash,
    pub taker_txid: TxHash,
    pub maker_address: Address,
    pub taker_address: Address,
    /// Property the maker sold (what the taker wanted).
    pub maker_property: PropertyId,
    /// Amount of `maker_property` delivered to the taker.
    pub maker_amount: Amount,
    /// Property the taker sold (what the maker wanted).
    pub taker_property: PropertyId,
    /// Amount of `taker_property` delivered to the maker.
    pub taker_amount: Amount,
    pub block: BlockHeight,
}

/// Result of adding an order to the book.
#[derive(Clone, Debug)]
pub struct MatchOutcome {
    pub status: OrderStatus,
    pub fills: Vec<TradeFill>,
    pub amount_remaining: Amount,
}

/// A cancelled order's released reserve, for the receipt index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CancelRelease {
    pub txid: TxHash,
    pub property: PropertyId,
    pub amount: Amount,
}

/// The full MetaDEx: per-property price-sorted books.
#[derive(Clone, Debug, Default)]
pub struct MetaDexBook {
    books: BTreeMap<PropertyId, BTreeMap<UnitPrice, BTreeMap<OrderKey, MetaDexOrder>>>,
}

impl MetaDexBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new order whose `amount_for_sale` is already reserved in the
    /// taker's METADEX_RESERVE, matching it against the opposite book and
    /// inserting any residue.
    pub fn execute(
        &mut self,
        journal: &mut TallyJournal<'_>,
        mut taker: MetaDexOrder,
    ) -> Result<MatchOutcome, MarketError> {
        taker.validate()?;
        let taker_price = taker.unit_price()?;
        // a maker may cross when its own price does not exceed the
        // reciprocal of the taker's price
        let maker_limit = taker_price.inverse();

        // Snapshot the walk order up front: matching only consumes makers,
        // never adds them, so the snapshot stays complete and sorted.
        let candidates: Vec<(UnitPrice, OrderKey)> = self
            .books
            .get(&taker.property_desired)
            .map(|levels| {
                levels
                    .range(..=maker_limit)
                    .flat_map(|(price, orders)| {
                        orders
                            .iter()
                            .filter(|(_, maker)| {
                                maker.property_desired == taker.property_for_sale
                            })
                            .map(|(key, _)| (*price, *key))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut fills = Vec::new();
        for (price, key) in candidates {
            if taker.amount_remaining == 0 {
                break;
            }
            let Some(maker) = self
                .books
                .get_mut(&taker.property_desired)
                .and_then(|levels| levels.get_mut(&price))
                .and_then(|orders| orders.get_mut(&key))
            else {
                continue;
            };

            // cross at the maker's price; floor exactly once per fill
            let maker_capacity_in_taker_units = (maker.amount_remaining as i128
                * maker.amount_desired as i128
                / maker.amount_for_sale as i128) as Amount;
            if maker_capacity_in_taker_units == 0 {
                // resting dust worth less than one unit of the taker's leg
                continue;
            }

            let (taker_gives, maker_gives) =
                if maker_capacity_in_taker_units <= taker.amount_remaining {
                    (maker_capacity_in_taker_units, maker.amount_remaining)
                } else {
                    let maker_gives = (taker.amount_remaining as i128
                        * maker.amount_for_sale as i128
                        / maker.amount_desired as i128) as Amount;
                    if maker_gives == 0 {
                        // the taker residue is dust at this and every worse price
                        break;
                    }
                    (taker.amount_remaining, maker_gives)
                };

            let maker_address = maker.address.clone();
            let maker_txid = maker.txid;
            maker.amount_remaining -= maker_gives;
            let maker_exhausted = maker.amount_remaining == 0;

            if !journal.update(
                &taker.address,
                taker.property_for_sale,
                -taker_gives,
                TallyType::MetaDexReserve,
            ) || !journal.update(
                &maker_address,
                taker.property_for_sale,
                taker_gives,
                TallyType::Available,
            ) || !journal.update(
                &maker_address,
                taker.property_desired,
                -maker_gives,
                TallyType::MetaDexReserve,
            ) || !journal.update(
                &taker.address,
                taker.property_desired,
                maker_gives,
                TallyType::Available,
            ) {
                return Err(MarketError::ReserveUnderflow);
            }

            taker.amount_remaining -= taker_gives;
            fills.push(TradeFill {
                maker_txid,
                taker_txid: taker.txid,
                maker_address,
                taker_address: taker.address.clone(),
                maker_property: taker.property_desired,
                maker_amount: maker_gives,
                taker_property: taker.property_for_sale,
                taker_amount: taker_gives,
                block: taker.block,
            });

            if maker_exhausted {
                self.remove_order(taker.property_desired, price, key);
            }
        }

        let amount_remaining = taker.amount_remaining;
        let status = if amount_remaining == 0 {
            OrderStatus::Filled
        } else if fills.is_empty() {
            OrderStatus::Open
        } else {
            OrderStatus::PartiallyFilled
        };

        if amount_remaining > 0 {
            tracing::debug!(
                txid = %hex::encode(taker.txid),
                amount_remaining,
                "resting MetaDEx order in book"
            );
            self.books
                .entry(taker.property_for_sale)
                .or_default()
                .entry(taker_price)
                .or_default()
                .insert((taker.block, taker.idx), taker);
        }

        Ok(MatchOutcome {
            status,
            fills,
            amount_remaining,
        })
    }

    fn remove_order(&mut self, property: PropertyId, price: UnitPrice, key: OrderKey) {
        if let Some(levels) = self.books.get_mut(&property) {
            if let Some(orders) = levels.get_mut(&price) {
                orders.remove(&key);
                if orders.is_empty() {
                    levels.remove(&price);
                }
            }
            if levels.is_empty() {
                self.books.remove(&property);
            }
        }
    }

    /// Cancel own orders at an exact price on a pair.
    pub fn cancel_at_price(
        &mut self,
        journal: &mut TallyJournal<'_>,
        address: &Address,
        property_for_sale: PropertyId,
        property_desired: PropertyId,
        price: UnitPrice,
    ) -> Result<Vec<CancelRelease>, MarketError> {
        self.cancel_matching(journal, |order, order_price| {
            order.address == *address
                && order.property_for_sale == property_for_sale
                && order.property_desired == property_desired
                && *order_price == price
        })
    }

    /// Cancel all own orders on a pair, at any price.
    pub fn cancel_pair(
        &mut self,
        journal: &mut TallyJournal<'_>,
        address: &Address,
        property_for_sale: PropertyId,
        property_desired: PropertyId,
    ) -> Result<Vec<CancelRelease>, MarketError> {
        self.cancel_matching(journal, |order, _| {
            order.address == *address
                && order.property_for_sale == property_for_sale
                && order.property_desired == property_desired
        })
    }

    /// Cancel every own order in an ecosystem.
    pub fn cancel_ecosystem(
        &mut self,
        journal: &mut TallyJournal<'_>,
        address: &Address,
        ecosystem: Ecosystem,
    ) -> Result<Vec<CancelRelease>, MarketError> {
        self.cancel_matching(journal, |order, _| {
            order.address == *address && Ecosystem::of(order.property_for_sale) == ecosystem
        })
    }

    fn cancel_matching(
        &mut self,
        journal: &mut TallyJournal<'_>,
        matches: impl Fn(&MetaDexOrder, &UnitPrice) -> bool,
    ) -> Result<Vec<CancelRelease>, MarketError> {
        let mut victims: Vec<(PropertyId, UnitPrice, OrderKey)> = Vec::new();
        for (property, levels) in &self.books {
            for (price, orders) in levels {
                for (key, order) in orders {
                    if matches(order, price) {
                        victims.push((*property, *price, *key));
                    }
                }
            }
        }

        let mut released = Vec::with_capacity(victims.len());
        for (property, price, key) in victims {
            let Some(order) = self
                .books
                .get_mut(&property)
                .and_then(|levels| levels.get_mut(&price))
                .and_then(|orders| orders.remove(&key))
            else {
                continue;
            };

            if !journal.update(
                &order.address,
                order.property_for_sale,
                -order.amount_remaining,
                TallyType::MetaDexReserve,
            ) || !journal.update(
                &order.address,
                order.property_for_sale,
                order.amount_remaining,
                TallyType::Available,
            ) {
                return Err(MarketError::ReserveUnderflow);
            }

            tracing::debug!(
                txid = %hex::encode(order.txid),
                released = order.amount_remaining,
                "cancelled MetaDEx order"
            );
            released.push(CancelRelease {
                txid: order.txid,
                property: order.property_for_sale,
                amount: order.amount_remaining,
            });
            self.prune_empty(property, price);
        }
        Ok(released)
    }

    fn prune_empty(&mut self, property: PropertyId, price: UnitPrice) {
        if let Some(levels) = self.books.get_mut(&property) {
            if levels.get(&price).is_some_and(|orders| orders.is_empty()) {
                levels.remove(&price);
            }
            if levels.is_empty() {
                self.books.remove(&property);
            }
        }
    }

    /// Every open order, walked book by book, price level by price level.
    pub fn open_orders(&self) -> impl Iterator<Item = &MetaDexOrder> {
        self.books
            .values()
            .flat_map(|levels| levels.values())
            .flat_map(|orders| orders.values())
    }

    /// Whether a txid still has an open order for the given property.
    pub fn is_order_active(&self, txid: &TxHash, property: PropertyId) -> bool {
        self.books
            .get(&property)
            .map(|levels| {
                levels
                    .values()
                    .flat_map(|orders| orders.values())
                    .any(|order| order.txid == *txid)
            })
            .unwrap_or(false)
    }

    /// Restore an order verbatim (snapshot load): no matching runs.
    pub fn restore_order(&mut self, order: MetaDexOrder) -> Result<(), MarketError> {
        let price = order.unit_price()?;
        self.books
            .entry(order.property_for_sale)
            .or_default()
            .entry(price)
            .or_default()
            .insert((order.block, order.idx), order);
        Ok(())
    }

    /// Drop every book (reparse).
    pub fn clear(&mut self) {
        self.books.clear();
    }
}
