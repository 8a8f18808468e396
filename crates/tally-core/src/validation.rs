//! # Validation Module
//!
//! Input validation for payments, ledger writes and promotions.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Caller (HTTP / checkout orchestration)                       │
//! │  └── Deserialization, basic shape                                      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  └── Required fields, positivity, sign rules, lengths                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (new_stock = previous_stock + quantity_delta)               │
//! │  ├── CHECK (refunded_cents <= amount_cents)                            │
//! │  └── UNIQUE (transaction_reference)                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything here runs before a transaction is opened.

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{DiscountType, NewPromotion, PaymentDraft};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest accepted ledger reason.
pub const MAX_REASON_LEN: usize = 500;

/// Longest accepted promotion title.
pub const MAX_TITLE_LEN: usize = 200;

/// 100% in basis points.
pub const MAX_PERCENTAGE_BPS: i64 = 10_000;

/// Upper bound for list queries that take a limit.
pub const MAX_QUERY_LIMIT: i64 = 1_000;

// =============================================================================
// Payments
// =============================================================================

/// The gate every payment passes before it is created.
///
/// ## Rules
/// - amount > 0
/// - method, orderId and processedBy present
/// - changeAmount, if set, is ≥ 0 (for every method)
/// - cardLast4, if set, is exactly four digits
///
/// ```rust
/// use tally_core::{Money, PaymentDraft, PaymentMethod};
/// use tally_core::validation::validate_payment;
///
/// let draft = PaymentDraft::new(1, 2, Money::from_cents(10000), PaymentMethod::Card);
/// assert!(validate_payment(&draft).is_ok());
///
/// let missing = PaymentDraft { order_id: None, ..draft };
/// assert!(validate_payment(&missing).is_err());
/// ```
pub fn validate_payment(draft: &PaymentDraft) -> ValidationResult<()> {
    if draft.amount_cents <= 0 {
        return Err(ValidationError::must_be_positive("amount"));
    }

    draft.method.ok_or_else(|| ValidationError::required("method"))?;

    if draft.order_id.is_none() {
        return Err(ValidationError::required("orderId"));
    }

    if draft.processed_by.is_none() {
        return Err(ValidationError::required("processedBy"));
    }

    if let Some(change) = draft.change_cents {
        if change < 0 {
            return Err(ValidationError::must_not_be_negative("changeAmount"));
        }
    }

    if let Some(last4) = &draft.card_last4 {
        if last4.len() != 4 || !last4.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::InvalidFormat {
                field: "cardLast4".to_string(),
                reason: "must be exactly 4 digits".to_string(),
            });
        }
    }

    Ok(())
}

/// Validates the caller-side inputs of a refund.
pub fn validate_refund_request(amount: Money, reason: &str) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::must_be_positive("refundAmount"));
    }
    validate_reason(reason)
}

// =============================================================================
// Ledger
// =============================================================================

/// Validates a ledger reason.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most 500 characters
pub fn validate_reason(reason: &str) -> ValidationResult<()> {
    let reason = reason.trim();

    if reason.is_empty() {
        return Err(ValidationError::required("reason"));
    }

    if reason.chars().count() > MAX_REASON_LEN {
        return Err(ValidationError::TooLong {
            field: "reason".to_string(),
            max: MAX_REASON_LEN,
        });
    }

    Ok(())
}

/// Quantity for add/remove: strictly positive.
pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity <= 0 {
        return Err(ValidationError::must_be_positive("quantity"));
    }
    Ok(())
}

/// Target for adjust: zero or more.
pub fn validate_stock_target(new_quantity: i64) -> ValidationResult<()> {
    if new_quantity < 0 {
        return Err(ValidationError::must_not_be_negative("newQuantity"));
    }
    Ok(())
}

// =============================================================================
// Promotions
// =============================================================================

/// Validates a promotion before insert or update.
///
/// ## Rules
/// - title required, at most 200 characters
/// - discount value ≥ 0
/// - PERCENTAGE value at most 10000 bps (100%)
///
/// `start_date <= end_date` is deliberately not checked: an inverted window is
/// simply never valid.
pub fn validate_new_promotion(promotion: &NewPromotion) -> ValidationResult<()> {
    let title = promotion.title.trim();

    if title.is_empty() {
        return Err(ValidationError::required("title"));
    }

    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ValidationError::TooLong {
            field: "title".to_string(),
            max: MAX_TITLE_LEN,
        });
    }

    if promotion.discount_value < 0 {
        return Err(ValidationError::must_not_be_negative("discountValue"));
    }

    if promotion.discount_type == DiscountType::Percentage
        && promotion.discount_value > MAX_PERCENTAGE_BPS
    {
        return Err(ValidationError::OutOfRange {
            field: "discountValue".to_string(),
            min: 0,
            max: MAX_PERCENTAGE_BPS,
        });
    }

    Ok(())
}

// =============================================================================
// Queries
// =============================================================================

/// Validates a result limit for list queries.
pub fn validate_limit(limit: i64) -> ValidationResult<i64> {
    if !(1..=MAX_QUERY_LIMIT).contains(&limit) {
        return Err(ValidationError::OutOfRange {
            field: "limit".to_string(),
            min: 1,
            max: MAX_QUERY_LIMIT,
        });
    }
    Ok(limit)
}

/// Trims a free-text search term. Empty terms are rejected.
pub fn validate_search_term(term: &str) -> ValidationResult<String> {
    let term = term.trim();

    if term.is_empty() {
        return Err(ValidationError::required("query"));
    }

    if term.len() > 100 {
        return Err(ValidationError::TooLong {
            field: "query".to_string(),
            max: 100,
        });
    }

    Ok(term.to_string())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PaymentMethod;
    use chrono::Utc;

    fn card_draft() -> PaymentDraft {
        PaymentDraft::new(10, 3, Money::from_cents(10000), PaymentMethod::Card)
    }

    #[test]
    fn test_validate_payment_accepts_complete_draft() {
        assert!(validate_payment(&card_draft()).is_ok());
    }

    #[test]
    fn test_validate_payment_rejects_non_positive_amount() {
        for cents in [0, -100] {
            let draft = PaymentDraft {
                amount_cents: cents,
                ..card_draft()
            };
            assert!(matches!(
                validate_payment(&draft),
                Err(ValidationError::MustBePositive { .. })
            ));
        }
    }

    #[test]
    fn test_validate_payment_names_missing_field() {
        let draft = PaymentDraft {
            method: None,
            ..card_draft()
        };
        assert_eq!(validate_payment(&draft).unwrap_err().to_string(), "method is required");

        let draft = PaymentDraft {
            processed_by: None,
            ..card_draft()
        };
        assert_eq!(
            validate_payment(&draft).unwrap_err().to_string(),
            "processedBy is required"
        );
    }

    #[test]
    fn test_validate_payment_cash_change() {
        let mut draft = PaymentDraft::new(1, 1, Money::from_cents(500), PaymentMethod::Cash);
        draft.change_cents = Some(0);
        assert!(validate_payment(&draft).is_ok());

        draft.change_cents = Some(-1);
        assert!(validate_payment(&draft).is_err());
    }

    #[test]
    fn test_validate_payment_negative_change_on_any_method() {
        for method in [PaymentMethod::Card, PaymentMethod::Wallet] {
            let mut draft = PaymentDraft::new(1, 1, Money::from_cents(500), method);
            draft.change_cents = Some(-5);
            assert!(matches!(
                validate_payment(&draft),
                Err(ValidationError::MustNotBeNegative { .. })
            ));
        }
    }

    #[test]
    fn test_validate_payment_card_last4() {
        let mut draft = card_draft();
        draft.card_last4 = Some("4242".into());
        assert!(validate_payment(&draft).is_ok());

        draft.card_last4 = Some("42a2".into());
        assert!(validate_payment(&draft).is_err());
    }

    #[test]
    fn test_validate_reason() {
        assert!(validate_reason("restock").is_ok());
        assert!(validate_reason("   ").is_err());
        assert!(validate_reason(&"x".repeat(MAX_REASON_LEN + 1)).is_err());
    }

    #[test]
    fn test_validate_quantities() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_stock_target(0).is_ok());
        assert!(validate_stock_target(-1).is_err());
    }

    #[test]
    fn test_validate_new_promotion() {
        let now = Utc::now();
        let promo = NewPromotion {
            title: "Spring".into(),
            description: None,
            discount_type: DiscountType::Percentage,
            discount_value: 1000,
            start_date: now,
            end_date: now,
            is_active: true,
        };
        assert!(validate_new_promotion(&promo).is_ok());

        let too_much = NewPromotion {
            discount_value: 10_001,
            ..promo.clone()
        };
        assert!(validate_new_promotion(&too_much).is_err());

        // A fixed amount above 100.00 is fine
        let fixed = NewPromotion {
            discount_type: DiscountType::FixedAmount,
            discount_value: 50_000,
            ..promo.clone()
        };
        assert!(validate_new_promotion(&fixed).is_ok());

        let untitled = NewPromotion {
            title: " ".into(),
            ..promo
        };
        assert!(validate_new_promotion(&untitled).is_err());
    }

    #[test]
    fn test_validate_limit() {
        assert_eq!(validate_limit(50).unwrap(), 50);
        assert!(validate_limit(0).is_err());
        assert!(validate_limit(MAX_QUERY_LIMIT + 1).is_err());
    }
}
