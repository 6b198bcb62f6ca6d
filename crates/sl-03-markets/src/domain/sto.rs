//! Send-to-owners distribution.
//!
//! Splits an amount pro-rata over every holder of a property, excluding the
//! sender. Holdings count every reserve bucket. Each receiver's share is
//! the ceiling of its proportional cut, handed out largest holder first, so
//! the whole amount is always allocated and rounding dust goes to the
//! biggest holders.

use shared_types::{Address, Amount, PropertyId};
use sl_02_ledger_state::BalanceLedger;

/// The receivers of a send-to-owners, with their amounts, in payout order
/// (descending holdings, ties broken by ascending address).
pub fn sto_receivers(
    ledger: &BalanceLedger,
    sender: &Address,
    property: PropertyId,
    amount: Amount,
) -> Vec<(Address, Amount)> {
    let mut owners: Vec<(Amount, &Address)> = Vec::new();
    let mut total_tokens: i128 = 0;

    for (address, tally) in ledger.addresses() {
        let tokens = tally
            .record(property)
            .map(|record| record.total())
            .unwrap_or(0);
        if address == sender {
            continue;
        }
        if tokens > 0 {
            total_tokens += tokens as i128;
            owners.push((tokens, address));
        }
    }

    if total_tokens == 0 || amount <= 0 {
        return Vec::new();
    }

    // largest holder first; equal holders pay out in address order
    owners.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));

    let mut receivers = Vec::new();
    let mut sent_so_far: Amount = 0;
    for (owns, address) in owners {
        let cut = owns as i128 * amount as i128;
        let should_receive = (1 + (cut - 1) / total_tokens) as Amount;
        let will_receive = should_receive.min(amount - sent_so_far);

        if will_receive <= 0 {
            break;
        }
        sent_so_far += will_receive;
        receivers.push((address.clone(), will_receive));
    }

    receivers
}

#[cfg(test)]
mod tests {
    use super::*;
    use sl_02_ledger_state::TallyType;

    fn setup(holdings: &[(&str, Amount)]) -> BalanceLedger {
        let mut ledger = BalanceLedger::new();
        for (address, tokens) in holdings {
            ledger.update(&address.to_string(), 7, *tokens, TallyType::Available);
        }
        ledger
    }

    #[test]
    fn test_even_split() {
        let ledger = setup(&[("mpSender", 100), ("mpA", 50), ("mpB", 50)]);
        let receivers = sto_receivers(&ledger, &"mpSender".to_string(), 7, 100);

        assert_eq!(
            receivers,
            vec![("mpA".to_string(), 50), ("mpB".to_string(), 50)]
        );
    }

    #[test]
    fn test_ceiling_rounding_favors_largest_holder() {
        let ledger = setup(&[("mpSender", 0), ("mpBig", 2), ("mpSmall", 1)]);
        let receivers = sto_receivers(&ledger, &"mpSender".to_string(), 7, 1);

        // 2/3 of one unit rounds up; nothing is left for the small holder
        assert_eq!(receivers, vec![("mpBig".to_string(), 1)]);
    }

    #[test]
    fn test_sender_is_excluded() {
        let ledger = setup(&[("mpSender", 1_000_000), ("mpA", 10)]);
        let receivers = sto_receivers(&ledger, &"mpSender".to_string(), 7, 100);

        assert_eq!(receivers, vec![("mpA".to_string(), 100)]);
    }

    #[test]
    fn test_reserved_buckets_count_as_holdings() {
        let mut ledger = setup(&[("mpA", 50)]);
        ledger.update(&"mpB".to_string(), 7, 50, TallyType::MetaDexReserve);

        let receivers = sto_receivers(&ledger, &"mpSender".to_string(), 7, 10);
        assert_eq!(
            receivers,
            vec![("mpA".to_string(), 5), ("mpB".to_string(), 5)]
        );
    }

    #[test]
    fn test_no_holders_yields_nothing() {
        let ledger = setup(&[("mpSender", 100)]);
        assert!(sto_receivers(&ledger, &"mpSender".to_string(), 7, 100).is_empty());
    }

    #[test]
    fn test_whole_amount_is_always_allocated() {
        let ledger = setup(&[("mpA", 3), ("mpB", 3), ("mpC", 1)]);
        let receivers = sto_receivers(&ledger, &"mpSender".to_string(), 7, 100);

        let total: Amount = receivers.iter().map(|(_, amount)| amount).sum();
        assert_eq!(total, 100);
    }
}
