//! The native-coin market (DEx).
//!
//! A seller opens one sell offer per property, locking tokens in
//! SELLOFFER_RESERVE. A buyer accepts part of it, moving the accepted
//! tokens to ACCEPT_RESERVE, and then settles by paying native coin on the
//! base chain within the offer's block window. Unpaid accepts fall back to
//! the offer (or the seller's AVAILABLE when the offer is gone) at expiry.

use crate::domain::errors::MarketError;
use shared_types::{Address, Amount, BlockHeight, PropertyId, TxHash};
use sl_02_ledger_state::{TallyJournal, TallyType};
use std::collections::BTreeMap;

/// An open sell offer. `amount_remaining` is the unaccepted part.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SellOffer {
    pub txid: TxHash,
    pub seller: Address,
    pub property: PropertyId,
    /// Token amount actually reserved at creation (the amended amount).
    pub offer_amount_original: Amount,
    pub native_desired_original: Amount,
    pub min_fee: Amount,
    pub block_time_limit: u8,
    pub amount_remaining: Amount,
}

/// An open accept toward a sell offer.
///
/// Carries a copy of the offer's price legs and window so settlement and
/// expiry keep working after the offer itself is gone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DexAccept {
    pub offer_txid: TxHash,
    pub seller: Address,
    pub property: PropertyId,
    pub buyer: Address,
    pub amount: Amount,
    pub amount_remaining: Amount,
    pub accept_block: BlockHeight,
    pub block_time_limit: u8,
    pub offer_amount_original: Amount,
    pub native_desired_original: Amount,
}

impl DexAccept {
    /// Whether the payment window has closed at `block`.
    pub fn is_expired(&self, block: BlockHeight) -> bool {
        block >= self.accept_block + self.block_time_limit as BlockHeight
    }
}

/// A settled purchase, for the receipt index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DexPurchase {
    pub offer_txid: TxHash,
    pub seller: Address,
    pub buyer: Address,
    pub property: PropertyId,
    pub tokens: Amount,
}

/// An accept returned to the seller at expiry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpiredAccept {
    pub seller: Address,
    pub buyer: Address,
    pub property: PropertyId,
    pub amount_returned: Amount,
}

fn offer_key(seller: &Address, property: PropertyId) -> String {
    format!("{}_{}", seller, property)
}

fn accept_key(seller: &Address, property: PropertyId, buyer: &Address) -> String {
    format!("{}_{}+{}", seller, property, buyer)
}

/// All open sell offers and accepts.
#[derive(Clone, Debug, Default)]
pub struct DexState {
    offers: BTreeMap<String, SellOffer>,
    accepts: BTreeMap<String, DexAccept>,
}

impl DexState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new sell offer, reserving at most the seller's available
    /// balance. Returns the amended (actually reserved) amount.
    pub fn create_offer(
        &mut self,
        journal: &mut TallyJournal<'_>,
        txid: TxHash,
        seller: &Address,
        property: PropertyId,
        amount: Amount,
        native_desired: Amount,
        min_fee: Amount,
        block_time_limit: u8,
    ) -> Result<Amount, MarketError> {
        if amount <= 0 {
            return Err(MarketError::InvalidAmount { amount });
        }
        if native_desired <= 0 {
            return Err(MarketError::InvalidAmount {
                amount: native_desired,
            });
        }

        let key = offer_key(seller, property);
        if self.offers.contains_key(&key) {
            return Err(MarketError::OfferAlreadyOpen {
                seller: seller.clone(),
                property,
            });
        }

        // the offered amount is amended down to what the seller holds
        let available = journal.get(seller, property, TallyType::Available);
        let reserved = amount.min(available);
        if reserved <= 0 {
            return Err(MarketError::InvalidAmount { amount: reserved });
        }

        if !journal.update(seller, property, -reserved, TallyType::Available)
            || !journal.update(seller, property, reserved, TallyType::SellOfferReserve)
        {
            return Err(MarketError::ReserveUnderflow);
        }

        self.offers.insert(
            key,
            SellOffer {
                txid,
                seller: seller.clone(),
                property,
                offer_amount_original: reserved,
                native_desired_original: native_desired,
                min_fee,
                block_time_limit,
                amount_remaining: reserved,
            },
        );

        tracing::debug!(%seller, property, reserved, "opened sell offer");
        Ok(reserved)
    }

    /// Replace an open offer: releases the old reserve, then re-creates.
    #[allow(clippy::too_many_arguments)]
    pub fn update_offer(
        &mut self,
        journal: &mut TallyJournal<'_>,
        txid: TxHash,
        seller: &Address,
        property: PropertyId,
        amount: Amount,
        native_desired: Amount,
        min_fee: Amount,
        block_time_limit: u8,
    ) -> Result<Amount, MarketError> {
        self.cancel_offer(journal, seller, property)?;
        self.create_offer(
            journal,
            txid,
            seller,
            property,
            amount,
            native_desired,
            min_fee,
            block_time_limit,
        )
    }

    /// Cancel an open offer, releasing the unaccepted remainder.
    pub fn cancel_offer(
        &mut self,
        journal: &mut TallyJournal<'_>,
        seller: &Address,
        property: PropertyId,
    ) -> Result<Amount, MarketError> {
        let key = offer_key(seller, property);
        let offer = self
            .offers
            .remove(&key)
            .ok_or_else(|| MarketError::OfferNotFound {
                seller: seller.clone(),
                property,
            })?;

        if offer.amount_remaining > 0
            && (!journal.update(
                seller,
                property,
                -offer.amount_remaining,
                TallyType::SellOfferReserve,
            ) || !journal.update(seller, property, offer.amount_remaining, TallyType::Available))
        {
            return Err(MarketError::ReserveUnderflow);
        }

        tracing::debug!(%seller, property, released = offer.amount_remaining, "cancelled sell offer");
        Ok(offer.amount_remaining)
    }

    /// Reserve part of an offer toward a buyer. Returns the amended amount.
    pub fn accept_offer(
        &mut self,
        journal: &mut TallyJournal<'_>,
        seller: &Address,
        property: PropertyId,
        buyer: &Address,
        amount: Amount,
        block: BlockHeight,
    ) -> Result<Amount, MarketError> {
        if amount <= 0 {
            return Err(MarketError::InvalidAmount { amount });
        }

        let akey = accept_key(seller, property, buyer);
        if self.accepts.contains_key(&akey) {
            return Err(MarketError::AcceptAlreadyOpen {
                seller: seller.clone(),
                property,
                buyer: buyer.clone(),
            });
        }

        let offer = self
            .offers
            .get_mut(&offer_key(seller, property))
            .ok_or_else(|| MarketError::OfferNotFound {
                seller: seller.clone(),
                property,
            })?;

        let accepted = amount.min(offer.amount_remaining);
        if accepted <= 0 {
            return Err(MarketError::InvalidAmount { amount: accepted });
        }

        if !journal.update(seller, property, -accepted, TallyType::SellOfferReserve)
            || !journal.update(seller, property, accepted, TallyType::AcceptReserve)
        {
            return Err(MarketError::ReserveUnderflow);
        }

        offer.amount_remaining -= accepted;
        let accept = DexAccept {
            offer_txid: offer.txid,
            seller: seller.clone(),
            property,
            buyer: buyer.clone(),
            amount: accepted,
            amount_remaining: accepted,
            accept_block: block,
            block_time_limit: offer.block_time_limit,
            offer_amount_original: offer.offer_amount_original,
            native_desired_original: offer.native_desired_original,
        };
        self.accepts.insert(akey, accept);

        tracing::debug!(%seller, %buyer, property, accepted, "accepted sell offer");
        Ok(accepted)
    }

    /// Settle a native-coin payment from `buyer` to `seller` against the
    /// oldest unexpired accept between them.
    ///
    /// Returns the purchase when any tokens changed hands; a payment with
    /// no matching accept is not an error, it is simply ignored.
    pub fn payment(
        &mut self,
        journal: &mut TallyJournal<'_>,
        seller: &Address,
        buyer: &Address,
        native_amount: Amount,
        block: BlockHeight,
    ) -> Result<Option<DexPurchase>, MarketError> {
        if native_amount <= 0 {
            return Ok(None);
        }

        // oldest unexpired accept by this buyer toward this seller
        let key = self
            .accepts
            .iter()
            .filter(|(_, a)| {
                a.seller == *seller && a.buyer == *buyer && !a.is_expired(block)
            })
            .min_by_key(|(_, a)| a.accept_block)
            .map(|(k, _)| k.clone());
        let Some(key) = key else {
            return Ok(None);
        };

        let Some(accept) = self.accepts.get_mut(&key) else {
            return Ok(None);
        };

        // tokens bought at the offer's original price, floored
        let tokens = (native_amount as i128 * accept.offer_amount_original as i128
            / accept.native_desired_original as i128) as Amount;
        let tokens = tokens.min(accept.amount_remaining);
        if tokens <= 0 {
            return Ok(None);
        }

        if !journal.update(seller, accept.property, -tokens, TallyType::AcceptReserve)
            || !journal.update(buyer, accept.property, tokens, TallyType::Available)
        {
            return Err(MarketError::ReserveUnderflow);
        }

        accept.amount_remaining -= tokens;
        let purchase = DexPurchase {
            offer_txid: accept.offer_txid,
            seller: seller.clone(),
            buyer: buyer.clone(),
            property: accept.property,
            tokens,
        };
        if accept.amount_remaining == 0 {
            self.accepts.remove(&key);
        }

        tracing::debug!(%seller, %buyer, tokens, "settled DEx purchase");
        Ok(Some(purchase))
    }

    /// Expire unpaid accepts at block-end. Their remainder returns to the
    /// offer when it is still open, otherwise to the seller's AVAILABLE.
    pub fn expire_accepts(
        &mut self,
        journal: &mut TallyJournal<'_>,
        block: BlockHeight,
    ) -> Result<Vec<ExpiredAccept>, MarketError> {
        let expired_keys: Vec<String> = self
            .accepts
            .iter()
            .filter(|(_, a)| a.is_expired(block))
            .map(|(k, _)| k.clone())
            .collect();

        let mut expired = Vec::with_capacity(expired_keys.len());
        for key in expired_keys {
            let Some(accept) = self.accepts.remove(&key) else {
                continue;
            };
            let remainder = accept.amount_remaining;
            if remainder > 0 {
                if !journal.update(
                    &accept.seller,
                    accept.property,
                    -remainder,
                    TallyType::AcceptReserve,
                ) {
                    return Err(MarketError::ReserveUnderflow);
                }
                let offer = self.offers.get_mut(&offer_key(&accept.seller, accept.property));
                let ok = match offer {
                    Some(offer) => {
                        offer.amount_remaining += remainder;
                        journal.update(
                            &accept.seller,
                            accept.property,
                            remainder,
                            TallyType::SellOfferReserve,
                        )
                    }
                    None => journal.update(
                        &accept.seller,
                        accept.property,
                        remainder,
                        TallyType::Available,
                    ),
                };
                if !ok {
                    return Err(MarketError::ReserveUnderflow);
                }
            }

            tracing::debug!(
                seller = %accept.seller,
                buyer = %accept.buyer,
                remainder,
                "expired DEx accept"
            );
            expired.push(ExpiredAccept {
                seller: accept.seller,
                buyer: accept.buyer,
                property: accept.property,
                amount_returned: remainder,
            });
        }
        Ok(expired)
    }

    /// The open offer of a seller for a property, if any.
    pub fn offer(&self, seller: &Address, property: PropertyId) -> Option<&SellOffer> {
        self.offers.get(&offer_key(seller, property))
    }

    /// All open offers, ordered by `(seller, property)` key.
    pub fn offers(&self) -> impl Iterator<Item = &SellOffer> {
        self.offers.values()
    }

    /// All open accepts, ordered by `(seller, property, buyer)` key.
    pub fn accepts(&self) -> impl Iterator<Item = &DexAccept> {
        self.accepts.values()
    }

    /// Restore an offer verbatim (snapshot load).
    pub fn restore_offer(&mut self, offer: SellOffer) {
        self.offers
            .insert(offer_key(&offer.seller, offer.property), offer);
    }

    /// Restore an accept verbatim (snapshot load).
    pub fn restore_accept(&mut self, accept: DexAccept) {
        self.accepts.insert(
            accept_key(&accept.seller, accept.property, &accept.buyer),
            accept,
        );
    }

    /// Drop all offers and accepts (reparse).
    pub fn clear(&mut self) {
        self.offers.clear();
        self.accepts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sl_02_ledger_state::BalanceLedger;

    fn seller() -> Address {
        "mpSeller".to_string()
    }

    fn buyer() -> Address {
        "mpBuyer".to_string()
    }

    fn funded_ledger() -> BalanceLedger {
        let mut ledger = BalanceLedger::new();
        ledger.update(&seller(), 1, 1_000, TallyType::Available);
        ledger
    }

    fn open_offer(dex: &mut DexState, ledger: &mut BalanceLedger, amount: Amount) -> Amount {
        let mut journal = TallyJournal::new(ledger);
        let amended = dex
            .create_offer(&mut journal, [1u8; 32], &seller(), 1, amount, 500, 10, 20)
            .unwrap();
        journal.commit();
        amended
    }

    #[test]
    fn test_create_offer_reserves_and_amends() {
        let mut ledger = funded_ledger();
        let mut dex = DexState::new();

        // more than held: amended down to the balance
        let amended = open_offer(&mut dex, &mut ledger, 5_000);
        assert_eq!(amended, 1_000);
        assert_eq!(ledger.get(&seller(), 1, TallyType::Available), 0);
        assert_eq!(ledger.get(&seller(), 1, TallyType::SellOfferReserve), 1_000);
        assert_eq!(dex.offer(&seller(), 1).unwrap().amount_remaining, 1_000);
    }

    #[test]
    fn test_one_offer_per_seller_and_property() {
        let mut ledger = funded_ledger();
        let mut dex = DexState::new();
        open_offer(&mut dex, &mut ledger, 100);

        let mut journal = TallyJournal::new(&mut ledger);
        let err = dex.create_offer(&mut journal, [2u8; 32], &seller(), 1, 100, 500, 10, 20);
        assert!(matches!(err, Err(MarketError::OfferAlreadyOpen { .. })));
    }

    #[test]
    fn test_accept_moves_reserve_to_accept_bucket() {
        let mut ledger = funded_ledger();
        let mut dex = DexState::new();
        open_offer(&mut dex, &mut ledger, 1_000);

        let mut journal = TallyJournal::new(&mut ledger);
        let accepted = dex
            .accept_offer(&mut journal, &seller(), 1, &buyer(), 400, 100)
            .unwrap();
        journal.commit();

        assert_eq!(accepted, 400);
        assert_eq!(ledger.get(&seller(), 1, TallyType::SellOfferReserve), 600);
        assert_eq!(ledger.get(&seller(), 1, TallyType::AcceptReserve), 400);
        assert_eq!(dex.offer(&seller(), 1).unwrap().amount_remaining, 600);
    }

    #[test]
    fn test_payment_credits_buyer_pro_rata() {
        let mut ledger = funded_ledger();
        let mut dex = DexState::new();
        open_offer(&mut dex, &mut ledger, 1_000);

        let mut journal = TallyJournal::new(&mut ledger);
        dex.accept_offer(&mut journal, &seller(), 1, &buyer(), 400, 100)
            .unwrap();
        // offer: 1000 tokens for 500 native => 2 tokens per native unit
        let purchase = dex
            .payment(&mut journal, &seller(), &buyer(), 100, 105)
            .unwrap()
            .unwrap();
        journal.commit();

        assert_eq!(purchase.tokens, 200);
        assert_eq!(ledger.get(&buyer(), 1, TallyType::Available), 200);
        assert_eq!(ledger.get(&seller(), 1, TallyType::AcceptReserve), 200);

        // second payment settles the rest of the accept
        let mut journal = TallyJournal::new(&mut ledger);
        let purchase = dex
            .payment(&mut journal, &seller(), &buyer(), 500, 106)
            .unwrap()
            .unwrap();
        journal.commit();
        assert_eq!(purchase.tokens, 200); // capped at the accept remainder
        assert!(dex.accepts().next().is_none());
    }

    #[test]
    fn test_payment_without_accept_is_ignored() {
        let mut ledger = funded_ledger();
        let mut dex = DexState::new();
        open_offer(&mut dex, &mut ledger, 1_000);

        let mut journal = TallyJournal::new(&mut ledger);
        let purchase = dex
            .payment(&mut journal, &seller(), &buyer(), 100, 105)
            .unwrap();
        assert!(purchase.is_none());
    }

    #[test]
    fn test_expiry_returns_remainder_to_offer() {
        let mut ledger = funded_ledger();
        let mut dex = DexState::new();
        open_offer(&mut dex, &mut ledger, 1_000);

        let mut journal = TallyJournal::new(&mut ledger);
        dex.accept_offer(&mut journal, &seller(), 1, &buyer(), 400, 100)
            .unwrap();
        // window is 20 blocks; 119 is in-window, 120 is out
        assert!(dex
            .expire_accepts(&mut journal, 119)
            .unwrap()
            .is_empty());
        let expired = dex.expire_accepts(&mut journal, 120).unwrap();
        journal.commit();

        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].amount_returned, 400);
        assert_eq!(ledger.get(&seller(), 1, TallyType::AcceptReserve), 0);
        assert_eq!(ledger.get(&seller(), 1, TallyType::SellOfferReserve), 1_000);
        assert_eq!(dex.offer(&seller(), 1).unwrap().amount_remaining, 1_000);
    }

    #[test]
    fn test_expiry_falls_back_to_available_when_offer_is_gone() {
        let mut ledger = funded_ledger();
        let mut dex = DexState::new();
        open_offer(&mut dex, &mut ledger, 1_000);

        let mut journal = TallyJournal::new(&mut ledger);
        dex.accept_offer(&mut journal, &seller(), 1, &buyer(), 400, 100)
            .unwrap();
        dex.cancel_offer(&mut journal, &seller(), 1).unwrap();
        let expired = dex.expire_accepts(&mut journal, 200).unwrap();
        journal.commit();

        assert_eq!(expired.len(), 1);
        assert_eq!(ledger.get(&seller(), 1, TallyType::Available), 1_000);
        assert_eq!(ledger.get(&seller(), 1, TallyType::AcceptReserve), 0);
        assert_eq!(ledger.get(&seller(), 1, TallyType::SellOfferReserve), 0);
    }

    #[test]
    fn test_cancel_keeps_inflight_accepts() {
        let mut ledger = funded_ledger();
        let mut dex = DexState::new();
        open_offer(&mut dex, &mut ledger, 1_000);

        let mut journal = TallyJournal::new(&mut ledger);
        dex.accept_offer(&mut journal, &seller(), 1, &buyer(), 400, 100)
            .unwrap();
        let released = dex.cancel_offer(&mut journal, &seller(), 1).unwrap();
        journal.commit();

        assert_eq!(released, 600);
        assert_eq!(ledger.get(&seller(), 1, TallyType::Available), 600);
        // the accept still settles
        let mut journal = TallyJournal::new(&mut ledger);
        let purchase = dex
            .payment(&mut journal, &seller(), &buyer(), 500, 105)
            .unwrap()
            .unwrap();
        journal.commit();
        assert_eq!(purchase.tokens, 400);
    }
}
