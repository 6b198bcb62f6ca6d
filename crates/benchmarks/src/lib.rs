//! # Ledger Benchmarks
//!
//! Performance validation for the hot paths of the state engine.
//!
//! ## Usage
//!
//! ```bash
//! cargo bench --package sl-benchmarks --bench ledger_benchmarks
//! ```
//!
//! ## Coverage
//!
//! | Area | Claim |
//! |------|-------|
//! | tally updates | O(log n) per balance move |
//! | MetaDEx matching | one book walk per order, no rescans |
//! | consensus hash | linear in live state size |

use shared_types::{Address, Amount, PropertyId};
use sl_02_ledger_state::{BalanceLedger, TallyType};

/// Seed a ledger with `addresses` holders of `properties` properties.
pub fn seeded_ledger(addresses: usize, properties: u32) -> BalanceLedger {
    let mut ledger = BalanceLedger::new();
    for a in 0..addresses {
        let address: Address = format!("mpHolder{:08}", a);
        for property in 1..=properties {
            ledger.update(
                &address,
                property as PropertyId,
                (a as Amount + 1) * 10,
                TallyType::Available,
            );
        }
    }
    ledger
}
