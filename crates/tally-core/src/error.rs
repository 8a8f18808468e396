//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core errors (this file)                                         │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Malformed or missing input                     │
//! │                                                                         │
//! │  tally-db errors                                                       │
//! │  └── DbError          - NotFound, storage failures, Domain(CoreError)  │
//! │                                                                         │
//! │  tally-settle errors                                                   │
//! │  └── SettleError      - Config, worker channel, timeouts               │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → SettleError             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every error is raised BEFORE any mutation. A caller that receives one can
//! assume nothing was written.

use thiserror::Error;

use crate::money::Money;
use crate::types::{ActorRole, InventoryChangeType, PaymentAction, PaymentStatus};

// =============================================================================
// Error Kind
// =============================================================================

/// Coarse classification shared by every error in the workspace.
///
/// Callers (HTTP layer, worker) branch on this instead of matching every
/// variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    InsufficientStock,
    InvalidTransition,
    NotFound,
    /// Storage or infrastructure failure, not a business outcome.
    Internal,
}

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A removal asked for more units than the ledger holds.
    ///
    /// ## User Workflow
    /// ```text
    /// remove_stock(P, 60)
    ///      │
    ///      ▼
    /// current stock of P = 50
    ///      │
    ///      ▼
    /// InsufficientStock { product_id: P, available: 50, requested: 60 }
    ///      │
    ///      ▼
    /// no event appended, stock stays 50
    /// ```
    #[error("Insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: i64,
        available: i64,
        requested: i64,
    },

    /// The payment's current status does not allow the action.
    #[error("Payment {payment_id} is {from}, cannot {action}")]
    InvalidTransition {
        payment_id: i64,
        from: PaymentStatus,
        action: PaymentAction,
    },

    /// Refund larger than `amount - refunded_amount`.
    #[error("Refund of {requested} exceeds refundable balance {refundable} on payment {payment_id}")]
    RefundExceedsBalance {
        payment_id: i64,
        requested: Money,
        refundable: Money,
    },

    /// Payment is flagged non-refundable.
    #[error("Payment {payment_id} is not refundable")]
    NotRefundable { payment_id: i64 },

    /// The status policy does not grant this role the target status.
    #[error("{role} may not set payment status to {target}")]
    PolicyDenied {
        role: ActorRole,
        target: PaymentStatus,
    },

    /// Cash handed over is less than the amount due.
    #[error("Insufficient cash: {received} received, {required} required")]
    InsufficientTender { required: Money, received: Money },
}

impl CoreError {
    /// Maps the error onto the shared taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_) | CoreError::InsufficientTender { .. } => ErrorKind::Validation,
            CoreError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            CoreError::InvalidTransition { .. }
            | CoreError::RefundExceedsBalance { .. }
            | CoreError::NotRefundable { .. }
            | CoreError::PolicyDenied { .. } => ErrorKind::InvalidTransition,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors, detected before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be strictly greater than zero.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must be zero or greater.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., unknown enum name).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Quantity delta points the wrong way for its change type.
    #[error("{change_type} does not accept a quantity delta of {delta}")]
    SignMismatch {
        change_type: InventoryChangeType,
        delta: i64,
    },

    /// Caller-supplied stock snapshot disagrees with the ledger.
    #[error("{field} is {actual} but the ledger says {expected}")]
    StockMismatch {
        field: String,
        expected: i64,
        actual: i64,
    },
}

impl ValidationError {
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }

    pub fn must_be_positive(field: impl Into<String>) -> Self {
        ValidationError::MustBePositive {
            field: field.into(),
        }
    }

    pub fn must_not_be_negative(field: impl Into<String>) -> Self {
        ValidationError::MustNotBeNegative {
            field: field.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product_id: 7,
            available: 50,
            requested: 60,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for product 7: available 50, requested 60"
        );

        let err = CoreError::InvalidTransition {
            payment_id: 3,
            from: PaymentStatus::Completed,
            action: PaymentAction::Cancel,
        };
        assert_eq!(err.to_string(), "Payment 3 is COMPLETED, cannot cancel");

        let err = CoreError::RefundExceedsBalance {
            payment_id: 3,
            requested: Money::from_cents(100),
            refundable: Money::zero(),
        };
        assert_eq!(
            err.to_string(),
            "Refund of $1.00 exceeds refundable balance $0.00 on payment 3"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        assert_eq!(ValidationError::required("orderId").to_string(), "orderId is required");
        let err = ValidationError::SignMismatch {
            change_type: InventoryChangeType::Sale,
            delta: 4,
        };
        assert_eq!(err.to_string(), "SALE does not accept a quantity delta of 4");
    }

    #[test]
    fn test_kind_classification() {
        let validation: CoreError = ValidationError::must_be_positive("amount").into();
        assert_eq!(validation.kind(), ErrorKind::Validation);

        let refund = CoreError::NotRefundable { payment_id: 1 };
        assert_eq!(refund.kind(), ErrorKind::InvalidTransition);

        let denied = CoreError::PolicyDenied {
            role: ActorRole::Cashier,
            target: PaymentStatus::Refunded,
        };
        assert_eq!(denied.kind(), ErrorKind::InvalidTransition);

        let stock = CoreError::InsufficientStock {
            product_id: 1,
            available: 0,
            requested: 1,
        };
        assert_eq!(stock.kind(), ErrorKind::InsufficientStock);
    }
}
