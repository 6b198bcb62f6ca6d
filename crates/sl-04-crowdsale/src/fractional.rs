//! Missed-token reconstruction at crowdsale expiry.
//!
//! When a sale expires, the theoretical issuer bonus is recomputed from the
//! recorded participations without the per-participation truncation, and
//! the difference to what was actually credited goes to the issuer. The
//! divisible path true-divides; the indivisible path truncates per row and
//! again at the end, matching the historical behavior.

use shared_types::{Amount, TxHash, COIN, SECONDS_PER_WEEK};
use std::collections::BTreeMap;

/// Index of the contributed amount in a participation row.
const ROW_AMOUNT_IN: usize = 0;
/// Index of the tx time in a participation row.
const ROW_TIME: usize = 1;

/// Reconstruct the issuer bonus shortfall of a finished crowdsale.
///
/// `amount_premined` is the issuer bonus actually credited during the sale
/// (`issuer_created`). The result is clamped at zero: float drift must not
/// turn into a debit.
#[allow(clippy::too_many_arguments)]
pub fn calculate_missed_tokens(
    created_divisible: bool,
    desired_divisible: bool,
    tokens_per_unit: Amount,
    early_bird_pct: u8,
    issuer_pct: u8,
    deadline: i64,
    participations: &BTreeMap<TxHash, Vec<Amount>>,
    amount_premined: Amount,
) -> Amount {
    let issuer_fraction = issuer_pct as f64 * 0.01;
    let mut total_created: f64 = 0.0;

    for row in participations.values() {
        let (Some(&amount_in), Some(&tx_time)) = (row.get(ROW_AMOUNT_IN), row.get(ROW_TIME))
        else {
            tracing::warn!("skipping malformed participation row");
            continue;
        };

        let bonus_seconds = deadline - tx_time;
        let weeks = bonus_seconds as f64 / SECONDS_PER_WEEK as f64;
        let bonus = (weeks * early_bird_pct as f64) / 100.0 + 1.0;

        let units = if desired_divisible {
            amount_in as f64 / COIN as f64
        } else {
            amount_in as f64
        };
        let created = units * tokens_per_unit as f64 * bonus;

        if created_divisible {
            total_created += created * COIN as f64;
        } else {
            total_created += (created as Amount) as f64;
        }
    }

    let total_premined = total_created * issuer_fraction;
    let missed = if created_divisible {
        total_premined - amount_premined as f64
    } else {
        (total_premined - amount_premined as f64).trunc()
    };

    (missed as Amount).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(entries: &[(u8, Amount, i64, Amount, Amount)]) -> BTreeMap<TxHash, Vec<Amount>> {
        entries
            .iter()
            .map(|(byte, amount, time, user, issuer)| {
                ([*byte; 32], vec![*amount, *time, *user, *issuer])
            })
            .collect()
    }

    #[test]
    fn test_truncation_shortfall_is_recovered() {
        // two participations each earned the issuer 5.5 tokens, credited as
        // 5 each; the theoretical total of 11 leaves 1 missed
        let participations = rows(&[
            (1, COIN, 7 * 86_400, 110, 5),
            (2, COIN, 7 * 86_400, 110, 5),
        ]);

        let missed = calculate_missed_tokens(
            false,
            true,
            100,
            10,
            5,
            14 * 86_400,
            &participations,
            10,
        );
        assert_eq!(missed, 1);
    }

    #[test]
    fn test_single_participation_rounds_to_zero() {
        // 5.5 theoretical vs 5 credited truncates back to zero missed
        let participations = rows(&[(1, COIN, 7 * 86_400, 110, 5)]);

        let missed =
            calculate_missed_tokens(false, true, 100, 10, 5, 14 * 86_400, &participations, 5);
        assert_eq!(missed, 0);
    }

    #[test]
    fn test_divisible_path_keeps_fractions() {
        let participations = rows(&[(1, COIN, 7 * 86_400, 110 * COIN, 550_000_000)]);

        let missed = calculate_missed_tokens(
            true,
            true,
            100,
            10,
            5,
            14 * 86_400,
            &participations,
            550_000_000,
        );
        assert_eq!(missed, 0);
    }

    #[test]
    fn test_never_negative() {
        let participations = rows(&[(1, COIN, 7 * 86_400, 110, 5)]);

        // over-credited premine must not produce a debit
        let missed =
            calculate_missed_tokens(false, true, 100, 10, 5, 14 * 86_400, &participations, 50);
        assert_eq!(missed, 0);
    }

    #[test]
    fn test_empty_sale_has_no_missed_tokens() {
        let missed =
            calculate_missed_tokens(false, true, 100, 10, 5, 14 * 86_400, &BTreeMap::new(), 0);
        assert_eq!(missed, 0);
    }
}
