//! Platform / developer revenue split.
//!
//! A fixed commission policy applied at purchase time. The split is pure
//! integer arithmetic over minor units: the platform fee is floor-rounded
//! and the developer share is the remainder, so the two parts always sum
//! back to the price exactly.

use serde::{Deserialize, Serialize};

use crate::error::{MarketError, Result};

/// Platform commission, in percent of the purchase price.
pub const PLATFORM_COMMISSION_PERCENT: i64 = 30;

/// The two-way split of a purchase price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueSplit {
    /// The marketplace operator's share, in minor units.
    pub platform_fee_minor: i64,
    /// The developer's share, in minor units.
    pub developer_amount_minor: i64,
}

impl RevenueSplit {
    /// Sum of both shares.
    #[must_use]
    pub const fn total(&self) -> i64 {
        self.platform_fee_minor + self.developer_amount_minor
    }
}

/// Split a price into `(platform_fee, developer_amount)`.
///
/// `calculate(0)` returns a zero split; free apps short-circuit before the
/// payment path and never reach this along checkout.
///
/// # Errors
///
/// Returns [`MarketError::InvalidPrice`] for negative prices.
pub fn calculate(price_minor: i64) -> Result<RevenueSplit> {
    if price_minor < 0 {
        return Err(MarketError::InvalidPrice(price_minor));
    }

    let platform_fee_minor = price_minor * PLATFORM_COMMISSION_PERCENT / 100;
    let developer_amount_minor = price_minor - platform_fee_minor;

    Ok(RevenueSplit {
        platform_fee_minor,
        developer_amount_minor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_price_splits_to_zero() {
        let split = calculate(0).unwrap();
        assert_eq!(split.platform_fee_minor, 0);
        assert_eq!(split.developer_amount_minor, 0);
    }

    #[test]
    fn thirty_percent_commission() {
        let split = calculate(1000).unwrap();
        assert_eq!(split.platform_fee_minor, 300);
        assert_eq!(split.developer_amount_minor, 700);
    }

    #[test]
    fn negative_price_rejected() {
        assert_eq!(calculate(-1), Err(MarketError::InvalidPrice(-1)));
    }

    #[test]
    fn split_is_exact_for_awkward_prices() {
        // Prices that do not divide evenly by the commission rate.
        for price in [1, 3, 7, 33, 99, 101, 999, 1001, 9_999_999_999] {
            let split = calculate(price).unwrap();
            assert_eq!(split.total(), price, "leakage at price {price}");
            assert!(split.platform_fee_minor >= 0);
            assert!(split.developer_amount_minor >= 0);
        }
    }

    #[test]
    fn split_sums_exactly_over_a_sweep() {
        for price in 0..10_000 {
            let split = calculate(price).unwrap();
            assert_eq!(split.total(), price);
        }
    }
}
