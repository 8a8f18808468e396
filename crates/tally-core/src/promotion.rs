//! # Promotion Engine
//!
//! Turns a promotion, an order amount and a point in time into a discount.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    compute_discount(promo, amount, now)                 │
//! │                                                                         │
//! │  amount ≤ 0 ─────────────────────────────────► ValidationError          │
//! │  promo absent ───────────────────────────────► $0.00                    │
//! │  !is_active or now ∉ [start, end] ───────────► $0.00                    │
//! │                                                                         │
//! │  PERCENTAGE    amount × bps / 10000, half-up ─► min(that, amount)       │
//! │  FIXED_AMOUNT  min(value, amount)                                       │
//! │  Other(_)      $0.00                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! An invalid promotion degrades to "no discount" so a stale coupon never
//! blocks a checkout. The clock is a parameter, never read here.

use chrono::{DateTime, Utc};

use crate::error::{CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{DiscountType, Promotion};

/// Computes the discount a promotion grants on `amount` at `now`.
///
/// The result is always within `[0, amount]`, so the net amount never goes
/// negative.
///
/// ```rust
/// use tally_core::promotion::compute_discount;
/// use tally_core::Money;
///
/// let discount = compute_discount(None, Money::from_cents(20000), chrono::Utc::now()).unwrap();
/// assert!(discount.is_zero());
/// ```
pub fn compute_discount(
    promotion: Option<&Promotion>,
    amount: Money,
    now: DateTime<Utc>,
) -> CoreResult<Money> {
    if !amount.is_positive() {
        return Err(ValidationError::must_be_positive("amount").into());
    }

    let promotion = match promotion {
        Some(p) if p.is_valid_at(now) => p,
        _ => return Ok(Money::zero()),
    };

    if promotion.discount_value <= 0 {
        return Ok(Money::zero());
    }

    let discount = match &promotion.discount_type {
        DiscountType::Percentage => {
            let bps = u32::try_from(promotion.discount_value).unwrap_or(u32::MAX);
            amount.percentage_bps(bps)
        }
        DiscountType::FixedAmount => Money::from_cents(promotion.discount_value),
        DiscountType::Other(_) => Money::zero(),
    };

    Ok(discount.min(amount))
}

/// Amount left to pay after the discount.
pub fn net_amount(
    promotion: Option<&Promotion>,
    amount: Money,
    now: DateTime<Utc>,
) -> CoreResult<Money> {
    Ok(amount - compute_discount(promotion, amount, now)?)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        "2026-03-01T00:00:00Z".parse().unwrap()
    }

    fn t1() -> DateTime<Utc> {
        "2026-03-31T23:59:59Z".parse().unwrap()
    }

    fn promo(discount_type: DiscountType, value: i64) -> Promotion {
        Promotion {
            id: 1,
            title: "March".into(),
            description: None,
            discount_type,
            discount_value: value,
            start_date: t0(),
            end_date: t1(),
            is_active: true,
            created_at: t0(),
            updated_at: t0(),
        }
    }

    #[test]
    fn test_percentage_inside_window() {
        // 10% of 200.00 = 20.00
        let p = promo(DiscountType::Percentage, 1000);
        let now = t0() + Duration::days(10);
        let discount = compute_discount(Some(&p), Money::from_cents(20000), now).unwrap();
        assert_eq!(discount.cents(), 2000);
    }

    #[test]
    fn test_percentage_after_window_is_zero() {
        let p = promo(DiscountType::Percentage, 1000);
        let discount =
            compute_discount(Some(&p), Money::from_cents(20000), t1() + Duration::seconds(1))
                .unwrap();
        assert!(discount.is_zero());
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let p = promo(DiscountType::Percentage, 1000);
        let amount = Money::from_cents(20000);
        assert_eq!(compute_discount(Some(&p), amount, t0()).unwrap().cents(), 2000);
        assert_eq!(compute_discount(Some(&p), amount, t1()).unwrap().cents(), 2000);
        assert!(compute_discount(Some(&p), amount, t0() - Duration::seconds(1))
            .unwrap()
            .is_zero());
    }

    #[test]
    fn test_fixed_amount_capped_at_original() {
        // 500.00 off a 100.00 order = 100.00, net 0.00
        let p = promo(DiscountType::FixedAmount, 50000);
        let amount = Money::from_cents(10000);
        let discount = compute_discount(Some(&p), amount, t0()).unwrap();
        assert_eq!(discount.cents(), 10000);
        assert!(net_amount(Some(&p), amount, t0()).unwrap().is_zero());
    }

    #[test]
    fn test_fixed_amount_below_original() {
        let p = promo(DiscountType::FixedAmount, 1500);
        let discount = compute_discount(Some(&p), Money::from_cents(10000), t0()).unwrap();
        assert_eq!(discount.cents(), 1500);
    }

    #[test]
    fn test_oversized_percentage_on_huge_amount_is_capped() {
        // 200% of the largest amount still discounts no more than the amount
        let p = promo(DiscountType::Percentage, 20000);
        let amount = Money::from_cents(i64::MAX);
        assert_eq!(compute_discount(Some(&p), amount, t0()).unwrap(), amount);
        assert!(net_amount(Some(&p), amount, t0()).unwrap().is_zero());
    }

    #[test]
    fn test_percentage_rounds_half_up() {
        // 15% of 0.10 = 1.5 cents -> 2 cents
        let p = promo(DiscountType::Percentage, 1500);
        let discount = compute_discount(Some(&p), Money::from_cents(10), t0()).unwrap();
        assert_eq!(discount.cents(), 2);
    }

    #[test]
    fn test_absent_inactive_and_unknown_are_zero() {
        let amount = Money::from_cents(10000);
        assert!(compute_discount(None, amount, t0()).unwrap().is_zero());

        let inactive = Promotion {
            is_active: false,
            ..promo(DiscountType::Percentage, 1000)
        };
        assert!(compute_discount(Some(&inactive), amount, t0()).unwrap().is_zero());

        let bogo = promo(DiscountType::Other("BUY_ONE_GET_ONE".into()), 1000);
        assert!(compute_discount(Some(&bogo), amount, t0()).unwrap().is_zero());
    }

    #[test]
    fn test_inverted_window_never_applies() {
        let p = Promotion {
            start_date: t1(),
            end_date: t0(),
            ..promo(DiscountType::Percentage, 1000)
        };
        let mid = t0() + Duration::days(5);
        assert!(compute_discount(Some(&p), Money::from_cents(10000), mid)
            .unwrap()
            .is_zero());
    }

    #[test]
    fn test_non_positive_amount_is_validation_error() {
        let p = promo(DiscountType::Percentage, 1000);
        for cents in [0, -500] {
            let err = compute_discount(Some(&p), Money::from_cents(cents), t0()).unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
        }
    }

    #[test]
    fn test_compute_is_repeatable() {
        let p = promo(DiscountType::Percentage, 333);
        let amount = Money::from_cents(12345);
        let now = t0() + Duration::hours(3);
        let first = compute_discount(Some(&p), amount, now).unwrap();
        let second = compute_discount(Some(&p), amount, now).unwrap();
        assert_eq!(first, second);
    }
}
