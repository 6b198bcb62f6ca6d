//! Active crowdsales and participation issuance.

use shared_types::{
    Address, Amount, PropertyId, TxHash, COIN, MAX_INT_8_BYTES, SECONDS_PER_WEEK,
};
use std::collections::BTreeMap;

/// Tokens minted by one participation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Issuance {
    pub user_tokens: Amount,
    pub issuer_tokens: Amount,
    /// The participation hit the supply ceiling; the sale must close.
    pub maxed_out: bool,
}

/// A live crowdsale. The containing map is keyed by the issuer address; at
/// most one crowdsale per address can be open.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Crowdsale {
    pub property_id: PropertyId,
    /// Tokens minted per whole unit of `property_desired` (the entry's
    /// `num_tokens`).
    pub tokens_per_unit: Amount,
    pub property_desired: PropertyId,
    pub deadline: i64,
    pub early_bird_pct: u8,
    pub issuer_pct: u8,
    pub user_created: Amount,
    pub issuer_created: Amount,
    /// `txid -> [amount_in, tx_seconds, user_tokens, issuer_tokens]`,
    /// flushed into the property entry when the sale closes.
    pub participations: BTreeMap<TxHash, Vec<Amount>>,
}

impl Crowdsale {
    /// Compute the issuance for a participation of `amount_in` base units
    /// of `property_desired` at `tx_time`.
    ///
    /// The bonus math intentionally follows the historical float path:
    /// divisible properties true-divide and keep 1e-8 precision, while
    /// indivisible properties truncate the user tokens and again the issuer
    /// bonus. Changing either would fork consensus.
    pub fn compute_issuance(
        &self,
        created_divisible: bool,
        desired_divisible: bool,
        tx_time: i64,
        amount_in: Amount,
    ) -> Issuance {
        let bonus_seconds = self.deadline - tx_time;
        let weeks = bonus_seconds as f64 / SECONDS_PER_WEEK as f64;
        let bonus = 1.0 + (weeks * self.early_bird_pct as f64) / 100.0;

        let units = if desired_divisible {
            amount_in as f64 / COIN as f64
        } else {
            amount_in as f64
        };
        let user_whole = units * self.tokens_per_unit as f64 * bonus;

        let (mut user_tokens, mut issuer_tokens) = if created_divisible {
            let user = (user_whole * COIN as f64) as Amount;
            let issuer = (user as f64 * self.issuer_pct as f64 / 100.0) as Amount;
            (user, issuer)
        } else {
            let user = user_whole as Amount;
            let issuer = (user as f64 * self.issuer_pct as f64 / 100.0) as Amount;
            (user, issuer)
        };

        // clamp the final participation so cumulative issuance never
        // exceeds the 8-byte ceiling; user tokens take precedence
        let already = self.user_created as i128 + self.issuer_created as i128;
        let headroom = MAX_INT_8_BYTES as i128 - already;
        let mut maxed_out = false;
        if user_tokens as i128 + issuer_tokens as i128 >= headroom {
            maxed_out = true;
            user_tokens = user_tokens.min(headroom.max(0) as Amount);
            issuer_tokens = issuer_tokens.min((headroom - user_tokens as i128).max(0) as Amount);
        }

        Issuance {
            user_tokens,
            issuer_tokens,
            maxed_out,
        }
    }

    /// Record a participation in the running totals and the tx buffer.
    pub fn record_participation(
        &mut self,
        txid: TxHash,
        amount_in: Amount,
        tx_time: i64,
        issuance: Issuance,
    ) {
        self.user_created += issuance.user_tokens;
        self.issuer_created += issuance.issuer_tokens;
        self.participations.insert(
            txid,
            vec![
                amount_in,
                tx_time,
                issuance.user_tokens,
                issuance.issuer_tokens,
            ],
        );
    }

    /// Whether the sale's deadline has passed at `block_time`.
    pub fn is_expired(&self, block_time: i64) -> bool {
        block_time > self.deadline
    }
}

/// All live crowdsales, keyed by issuer address.
#[derive(Clone, Debug, Default)]
pub struct CrowdsaleMap {
    map: BTreeMap<Address, Crowdsale>,
}

impl CrowdsaleMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, issuer: Address, crowdsale: Crowdsale) {
        self.map.insert(issuer, crowdsale);
    }

    pub fn get(&self, issuer: &Address) -> Option<&Crowdsale> {
        self.map.get(issuer)
    }

    pub fn get_mut(&mut self, issuer: &Address) -> Option<&mut Crowdsale> {
        self.map.get_mut(issuer)
    }

    pub fn remove(&mut self, issuer: &Address) -> Option<Crowdsale> {
        self.map.remove(issuer)
    }

    /// Whether any live crowdsale mints the given property.
    pub fn is_active_property(&self, property: PropertyId) -> bool {
        self.map.values().any(|c| c.property_id == property)
    }

    /// Issuers with a live sale whose deadline passed at `block_time`.
    pub fn expired_issuers(&self, block_time: i64) -> Vec<Address> {
        self.map
            .iter()
            .filter(|(_, c)| c.is_expired(block_time))
            .map(|(issuer, _)| issuer.clone())
            .collect()
    }

    /// All live crowdsales, in issuer order.
    pub fn iter(&self) -> impl Iterator<Item = (&Address, &Crowdsale)> {
        self.map.iter()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Drop every live sale (reparse).
    pub fn clear(&mut self) {
        self.map.clear();
    }
}
