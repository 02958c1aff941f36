//! Capital allocation enforcement.
//!
//! Ensures gross notional exposure stays within session capital.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Check whether `post_trade_exposure` fits within `capital`.
pub fn check_allocation(post_trade_exposure: Decimal, capital: Decimal) -> AllocationCheck {
    if post_trade_exposure > capital {
        AllocationCheck::Rejected {
            would_be_pct: pct_of(post_trade_exposure, capital),
        }
    } else {
        AllocationCheck::Approved {
            remaining_capacity: capital - post_trade_exposure,
            utilization_pct: pct_of(post_trade_exposure, capital),
        }
    }
}

/// Largest whole-lot position size in one instrument that keeps total
/// exposure within capital, given the exposure held in everything else.
pub fn max_lots_within(
    capital: Decimal,
    other_exposure: Decimal,
    price: Decimal,
    multiplier: Decimal,
) -> i64 {
    let per_lot = price * multiplier;
    let available = capital - other_exposure;
    if available < Decimal::ZERO {
        return 0;
    }
    if per_lot <= Decimal::ZERO {
        return i64::MAX;
    }
    (available / per_lot).floor().to_i64().unwrap_or(i64::MAX)
}

fn pct_of(amount: Decimal, capital: Decimal) -> Decimal {
    if capital.is_zero() {
        return Decimal::ZERO;
    }
    amount / capital * Decimal::ONE_HUNDRED
}

/// Result of an allocation check.
#[derive(Debug)]
pub enum AllocationCheck {
    Approved {
        remaining_capacity: Decimal,
        utilization_pct: Decimal,
    },
    Rejected {
        would_be_pct: Decimal,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn approves_within_limit() {
        let result = check_allocation(dec!(60000), dec!(100000));
        assert!(matches!(
            result,
            AllocationCheck::Approved { remaining_capacity, .. } if remaining_capacity == dec!(40000)
        ));
    }

    #[test]
    fn rejects_over_limit() {
        let result = check_allocation(dec!(100001), dec!(100000));
        assert!(matches!(result, AllocationCheck::Rejected { .. }));
    }

    #[test]
    fn exposure_equal_to_capital_fits() {
        let result = check_allocation(dec!(100000), dec!(100000));
        assert!(matches!(result, AllocationCheck::Approved { .. }));
    }

    #[test]
    fn max_lots_floors_to_whole_lots() {
        // 100k capital, 70k used elsewhere, 22000 per lot → 1 lot.
        assert_eq!(max_lots_within(dec!(100000), dec!(70000), dec!(22000), Decimal::ONE), 1);
        // 150 × 50 = 7500 per lot → 4 lots in 30k.
        assert_eq!(max_lots_within(dec!(100000), dec!(70000), dec!(150), dec!(50)), 4);
        assert_eq!(max_lots_within(dec!(100000), dec!(120000), dec!(10), Decimal::ONE), 0);
    }
}
