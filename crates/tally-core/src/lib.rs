//! # tally-core: Pure Business Logic for Tally
//!
//! The transactional commerce core of a point-of-sale checkout as pure
//! functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Checkout Flow                                  │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            Orchestrator (HTTP layer, out of scope)              │   │
//! │  │   discount ──► final amount ──► payment ──► stock decrement     │   │
//! │  └──────┬──────────────────┬───────────────────────┬───────────────┘   │
//! │         │                  │                       │                    │
//! │  ┌──────▼──────────────────▼───────────────────────▼───────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │ promotion │  │  payment  │  │  ledger   │  │ validation│  │   │
//! │  │   │ discount  │  │  state    │  │  stock    │  │   rules   │  │   │
//! │  │   │  engine   │  │  machine  │  │  planner  │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tally-db (Database Layer)                    │   │
//! │  │        transactions, optimistic versions, stock projection      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (PaymentRecord, InventoryChangeEvent, Promotion)
//! - [`money`] - Money type with integer arithmetic
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//! - [`promotion`] - Discount engine
//! - [`payment`] - Payment state machine and status policy
//! - [`ledger`] - Stock movement planning and replay
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::Utc;
//! use tally_core::{DiscountType, Money, Promotion};
//! use tally_core::promotion::compute_discount;
//!
//! let now = Utc::now();
//! let promo = Promotion {
//!     id: 1,
//!     title: "Ten off".into(),
//!     description: None,
//!     discount_type: DiscountType::Percentage,
//!     discount_value: 1000, // 10% in basis points
//!     start_date: now - chrono::Duration::days(1),
//!     end_date: now + chrono::Duration::days(1),
//!     is_active: true,
//!     created_at: now,
//!     updated_at: now,
//! };
//!
//! let discount = compute_discount(Some(&promo), Money::from_cents(20000), now).unwrap();
//! assert_eq!(discount.cents(), 2000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod ledger;
pub mod money;
pub mod payment;
pub mod promotion;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use money::Money;
pub use payment::{SettlementOutcome, StatusPolicy};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default page size for "recent activity" style queries.
pub const DEFAULT_RECENT_LIMIT: i64 = 50;
