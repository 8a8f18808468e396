//! # Domain Types
//!
//! Core domain types used throughout Tally.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌──────────────────────┐   ┌─────────────────┐  │
//! │  │  PaymentRecord  │   │ InventoryChangeEvent │   │    Promotion    │  │
//! │  │  ─────────────  │   │  ──────────────────  │   │  ─────────────  │  │
//! │  │  id (i64)       │   │  id (insert order)   │   │  id (i64)       │  │
//! │  │  order_id       │   │  product_id          │   │  discount_type  │  │
//! │  │  amount_cents   │   │  quantity_delta      │   │  discount_value │  │
//! │  │  status         │   │  previous/new stock  │   │  start..=end    │  │
//! │  │  refunded_cents │   │  reason              │   │  is_active      │  │
//! │  └─────────────────┘   └──────────────────────┘   └─────────────────┘  │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌──────────────────────┐   ┌─────────────────┐  │
//! │  │  PaymentStatus  │   │ InventoryChangeType  │   │  DiscountType   │  │
//! │  │  PENDING ...    │   │  ADD, REMOVE, ...    │   │  PERCENTAGE     │  │
//! │  │  7 variants     │   │  14 variants         │   │  FIXED_AMOUNT   │  │
//! │  └─────────────────┘   └──────────────────────┘   │  Other(name)    │  │
//! │                                                   └─────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Enum wire values are SCREAMING_SNAKE_CASE (`"PARTIALLY_REFUNDED"`) both in
//! JSON and in the database. Struct fields are camelCase in JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Wallet,
    Card,
    /// Physical cash. The only method with a change amount.
    Cash,
}

impl PaymentMethod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Wallet => "WALLET",
            PaymentMethod::Card => "CARD",
            PaymentMethod::Cash => "CASH",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "WALLET" => Ok(PaymentMethod::Wallet),
            "CARD" => Ok(PaymentMethod::Card),
            "CASH" => Ok(PaymentMethod::Cash),
            _ => Err(ValidationError::NotAllowed {
                field: "method".to_string(),
                allowed: vec!["WALLET".into(), "CARD".into(), "CASH".into()],
            }),
        }
    }
}

// =============================================================================
// Payment Status
// =============================================================================

/// Lifecycle status of a payment.
///
/// ```text
///                 ┌──────────┐
///                 │ PENDING  │──────────────┐
///                 └────┬─────┘              │ cancel
///                      │ create             ▼
///   retry    ┌─────────▼────┐  cancel  ┌───────────┐
///  ┌────────►│  PROCESSING  │─────────►│ CANCELLED │
///  │         └──┬────────┬──┘          └───────────┘
///  │     settle │        │ settle
///  │   ┌────────▼┐     ┌─▼─────────┐  refund (partial)  ┌────────────────────┐
///  └───│ FAILED  │     │ COMPLETED │───────────────────►│ PARTIALLY_REFUNDED │──┐
///      └─────────┘     └─────┬─────┘                    └─────────┬──────────┘  │
///                            │ refund (full)                      │ refund      │ refund
///                            ▼                                    ▼ (rest)      │ (partial)
///                      ┌──────────┐◄────────────────────────────────            │
///                      │ REFUNDED │                              ◄──────────────┘
///                      └──────────┘
/// ```
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Refunded,
    PartiallyRefunded,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 7] = [
        PaymentStatus::Pending,
        PaymentStatus::Processing,
        PaymentStatus::Completed,
        PaymentStatus::Failed,
        PaymentStatus::Cancelled,
        PaymentStatus::Refunded,
        PaymentStatus::PartiallyRefunded,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Cancelled => "CANCELLED",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::PartiallyRefunded => "PARTIALLY_REFUNDED",
        }
    }

    /// PENDING and PROCESSING: waiting on settlement or cancellation.
    pub const fn is_transient(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Processing)
    }

    /// Statuses from which a refund may be issued.
    pub const fn accepts_refund(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Completed | PaymentStatus::PartiallyRefunded
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        PaymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == upper)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "paymentStatus".to_string(),
                allowed: PaymentStatus::ALL
                    .iter()
                    .map(|s| s.as_str().to_string())
                    .collect(),
            })
    }
}

/// Operations the state machine can be asked to perform.
///
/// Carried by `CoreError::InvalidTransition` so the message says what was
/// refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentAction {
    Settle,
    Release,
    Cancel,
    Retry,
    Refund,
    UpdateStatus,
}

impl fmt::Display for PaymentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentAction::Settle => "settle",
            PaymentAction::Release => "release",
            PaymentAction::Cancel => "cancel",
            PaymentAction::Retry => "retry",
            PaymentAction::Refund => "refund",
            PaymentAction::UpdateStatus => "update status",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Payment Gateway
// =============================================================================

/// Known gateway identifiers.
///
/// The stored `gateway` column is free-form text; this catalogue only names
/// the values the system itself assigns or recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentGateway {
    Internal,
    Stripe,
    Paypal,
    Square,
    Razorpay,
    AuthorizeNet,
    Braintree,
    Adyen,
    Worldpay,
    Payu,
    Mollie,
    Klarna,
    ApplePay,
    GooglePay,
    SamsungPay,
    BankTransfer,
    Custom,
}

impl PaymentGateway {
    /// Gateway assigned on creation when the draft names none.
    ///
    /// ```rust
    /// use tally_core::{PaymentGateway, PaymentMethod};
    ///
    /// assert_eq!(PaymentGateway::default_for(PaymentMethod::Cash), PaymentGateway::Internal);
    /// assert_eq!(PaymentGateway::default_for(PaymentMethod::Card), PaymentGateway::Stripe);
    /// ```
    pub const fn default_for(method: PaymentMethod) -> Self {
        match method {
            PaymentMethod::Cash => PaymentGateway::Internal,
            PaymentMethod::Card => PaymentGateway::Stripe,
            PaymentMethod::Wallet => PaymentGateway::Paypal,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentGateway::Internal => "INTERNAL",
            PaymentGateway::Stripe => "STRIPE",
            PaymentGateway::Paypal => "PAYPAL",
            PaymentGateway::Square => "SQUARE",
            PaymentGateway::Razorpay => "RAZORPAY",
            PaymentGateway::AuthorizeNet => "AUTHORIZE_NET",
            PaymentGateway::Braintree => "BRAINTREE",
            PaymentGateway::Adyen => "ADYEN",
            PaymentGateway::Worldpay => "WORLDPAY",
            PaymentGateway::Payu => "PAYU",
            PaymentGateway::Mollie => "MOLLIE",
            PaymentGateway::Klarna => "KLARNA",
            PaymentGateway::ApplePay => "APPLE_PAY",
            PaymentGateway::GooglePay => "GOOGLE_PAY",
            PaymentGateway::SamsungPay => "SAMSUNG_PAY",
            PaymentGateway::BankTransfer => "BANK_TRANSFER",
            PaymentGateway::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for PaymentGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Actor Role
// =============================================================================

/// Role of the actor requesting an administrative status override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorRole {
    Admin,
    Manager,
    Cashier,
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActorRole::Admin => "ADMIN",
            ActorRole::Manager => "MANAGER",
            ActorRole::Cashier => "CASHIER",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Payment Record
// =============================================================================

/// A persisted payment.
///
/// `amount_cents` never changes after creation. `refunded_cents` only grows
/// and never exceeds `amount_cents`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    #[serde(rename = "paymentId")]
    pub id: i64,
    pub order_id: i64,
    pub customer_id: Option<i64>,
    /// Actor who took the payment.
    pub processed_by: i64,
    #[serde(rename = "amount")]
    pub amount_cents: i64,
    pub method: PaymentMethod,
    #[serde(rename = "paymentStatus")]
    pub status: PaymentStatus,
    /// `TXN-<epoch millis>-<8 hex>`, unique.
    pub transaction_reference: String,
    pub gateway: String,
    pub card_last4: Option<String>,
    /// CASH only: change handed back.
    #[serde(rename = "changeAmount")]
    pub change_cents: Option<i64>,
    /// Append-only audit trail, entries separated by `" | "`.
    pub notes: Option<String>,
    pub gateway_response: Option<String>,
    #[serde(rename = "refundedAmount")]
    pub refunded_cents: i64,
    pub is_refundable: bool,
    #[ts(as = "String")]
    pub payment_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency token, bumped on every write.
    pub version: i64,
}

impl PaymentRecord {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    #[inline]
    pub fn refunded_amount(&self) -> Money {
        Money::from_cents(self.refunded_cents)
    }

    /// `amount - refunded_amount`: the most that may still be refunded.
    #[inline]
    pub fn refundable_balance(&self) -> Money {
        self.amount().saturating_sub(self.refunded_amount())
    }

    #[inline]
    pub fn change_amount(&self) -> Option<Money> {
        self.change_cents.map(Money::from_cents)
    }
}

// =============================================================================
// Payment Draft
// =============================================================================

/// Input to `create`. Required fields are `Option` so that validation can
/// name exactly which one is missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDraft {
    pub order_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub processed_by: Option<i64>,
    #[serde(rename = "amount")]
    pub amount_cents: i64,
    pub method: Option<PaymentMethod>,
    pub gateway: Option<String>,
    pub transaction_reference: Option<String>,
    pub card_last4: Option<String>,
    #[serde(rename = "changeAmount")]
    pub change_cents: Option<i64>,
    pub notes: Option<String>,
    /// Defaults to true.
    pub is_refundable: Option<bool>,
    /// Create in PENDING instead of PROCESSING; settlement waits until the
    /// payment is moved to PROCESSING.
    #[serde(default)]
    pub hold: bool,
}

impl PaymentDraft {
    /// A draft with every required field set.
    pub fn new(order_id: i64, processed_by: i64, amount: Money, method: PaymentMethod) -> Self {
        PaymentDraft {
            order_id: Some(order_id),
            processed_by: Some(processed_by),
            amount_cents: amount.cents(),
            method: Some(method),
            ..Default::default()
        }
    }

    pub fn with_customer(mut self, customer_id: i64) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn with_gateway(mut self, gateway: impl Into<String>) -> Self {
        self.gateway = Some(gateway.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn non_refundable(mut self) -> Self {
        self.is_refundable = Some(false);
        self
    }

    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Inventory Change Type
// =============================================================================

/// Which way a change type is allowed to move stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockDirection {
    /// quantity_delta > 0
    Increase,
    /// quantity_delta < 0
    Decrease,
    /// Any sign, including zero.
    Either,
}

/// Tagged reason for a stock movement.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InventoryChangeType {
    Add,
    Remove,
    Adjust,
    Sale,
    SaleReturn,
    Purchase,
    PurchaseReturn,
    Damage,
    Theft,
    Expired,
    TransferIn,
    TransferOut,
    InitialStock,
    AuditAdjustment,
}

impl InventoryChangeType {
    pub const ALL: [InventoryChangeType; 14] = [
        InventoryChangeType::Add,
        InventoryChangeType::Remove,
        InventoryChangeType::Adjust,
        InventoryChangeType::Sale,
        InventoryChangeType::SaleReturn,
        InventoryChangeType::Purchase,
        InventoryChangeType::PurchaseReturn,
        InventoryChangeType::Damage,
        InventoryChangeType::Theft,
        InventoryChangeType::Expired,
        InventoryChangeType::TransferIn,
        InventoryChangeType::TransferOut,
        InventoryChangeType::InitialStock,
        InventoryChangeType::AuditAdjustment,
    ];

    pub const fn direction(&self) -> StockDirection {
        match self {
            InventoryChangeType::Add
            | InventoryChangeType::SaleReturn
            | InventoryChangeType::Purchase
            | InventoryChangeType::TransferIn
            | InventoryChangeType::InitialStock => StockDirection::Increase,
            InventoryChangeType::Remove
            | InventoryChangeType::Sale
            | InventoryChangeType::PurchaseReturn
            | InventoryChangeType::Damage
            | InventoryChangeType::Theft
            | InventoryChangeType::Expired
            | InventoryChangeType::TransferOut => StockDirection::Decrease,
            InventoryChangeType::Adjust | InventoryChangeType::AuditAdjustment => {
                StockDirection::Either
            }
        }
    }

    /// True if `delta` points the way this change type moves stock.
    pub const fn accepts_delta(&self, delta: i64) -> bool {
        match self.direction() {
            StockDirection::Increase => delta > 0,
            StockDirection::Decrease => delta < 0,
            StockDirection::Either => true,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            InventoryChangeType::Add => "ADD",
            InventoryChangeType::Remove => "REMOVE",
            InventoryChangeType::Adjust => "ADJUST",
            InventoryChangeType::Sale => "SALE",
            InventoryChangeType::SaleReturn => "SALE_RETURN",
            InventoryChangeType::Purchase => "PURCHASE",
            InventoryChangeType::PurchaseReturn => "PURCHASE_RETURN",
            InventoryChangeType::Damage => "DAMAGE",
            InventoryChangeType::Theft => "THEFT",
            InventoryChangeType::Expired => "EXPIRED",
            InventoryChangeType::TransferIn => "TRANSFER_IN",
            InventoryChangeType::TransferOut => "TRANSFER_OUT",
            InventoryChangeType::InitialStock => "INITIAL_STOCK",
            InventoryChangeType::AuditAdjustment => "AUDIT_ADJUSTMENT",
        }
    }
}

impl fmt::Display for InventoryChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InventoryChangeType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        InventoryChangeType::ALL
            .into_iter()
            .find(|t| t.as_str() == upper)
            .ok_or_else(|| ValidationError::InvalidFormat {
                field: "changeType".to_string(),
                reason: format!("unknown change type '{}'", s),
            })
    }
}

// =============================================================================
// Inventory Change Event
// =============================================================================

/// One immutable row of the stock ledger.
///
/// `new_stock == previous_stock + quantity_delta` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct InventoryChangeEvent {
    /// Insertion-ordered identity.
    pub id: i64,
    pub product_id: i64,
    pub actor_id: i64,
    pub change_type: InventoryChangeType,
    /// Signed delta. Called `quantity` on the wire.
    #[serde(rename = "quantity")]
    pub quantity_delta: i64,
    pub previous_stock: i64,
    pub new_stock: i64,
    pub reason: String,
    pub notes: Option<String>,
    pub reference_id: Option<String>,
    pub is_system_generated: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Raw ledger input for `log_raw`.
///
/// Everything is optional so the validator can report the missing field.
/// `previous_stock`/`new_stock`, when supplied, are the caller's view and must
/// match what the ledger derives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NewInventoryEvent {
    pub product_id: Option<i64>,
    pub actor_id: Option<i64>,
    pub change_type: Option<InventoryChangeType>,
    /// Signed delta.
    pub quantity: Option<i64>,
    pub previous_stock: Option<i64>,
    pub new_stock: Option<i64>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub reference_id: Option<String>,
    #[serde(default)]
    pub is_system_generated: bool,
}

/// A fully validated event, ready to append.
///
/// Produced by the pure planners in [`crate::ledger`]; the database layer
/// stamps `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedInventoryEvent {
    pub product_id: i64,
    pub actor_id: i64,
    pub change_type: InventoryChangeType,
    pub quantity_delta: i64,
    pub previous_stock: i64,
    pub new_stock: i64,
    pub reason: String,
    pub notes: Option<String>,
    pub reference_id: Option<String>,
    pub is_system_generated: bool,
}

/// Grouped count/sum of ledger activity per change type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ChangeTypeSummary {
    pub change_type: InventoryChangeType,
    pub event_count: i64,
    pub total_quantity: i64,
}

/// Net quantity movement of one product over a time range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ProductQuantityTotal {
    pub product_id: i64,
    pub total_quantity: i64,
}

// =============================================================================
// Promotion
// =============================================================================

/// How a promotion's `discount_value` is interpreted.
///
/// Closed over the two kinds the engine computes, plus `Other` which keeps
/// names it does not know (e.g. `BUY_ONE_GET_ONE`). `Other` always yields a
/// zero discount.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DiscountType {
    /// `discount_value` is basis points (1000 = 10%).
    Percentage,
    /// `discount_value` is cents.
    FixedAmount,
    Other(String),
}

impl DiscountType {
    pub fn as_str(&self) -> &str {
        match self {
            DiscountType::Percentage => "PERCENTAGE",
            DiscountType::FixedAmount => "FIXED_AMOUNT",
            DiscountType::Other(name) => name,
        }
    }
}

/// Parsing is case-insensitive and never fails.
impl From<&str> for DiscountType {
    fn from(s: &str) -> Self {
        let upper = s.trim().to_uppercase();
        match upper.as_str() {
            "PERCENTAGE" => DiscountType::Percentage,
            "FIXED_AMOUNT" => DiscountType::FixedAmount,
            _ => DiscountType::Other(upper),
        }
    }
}

impl From<String> for DiscountType {
    fn from(s: String) -> Self {
        DiscountType::from(s.as_str())
    }
}

impl From<DiscountType> for String {
    fn from(t: DiscountType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for DiscountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A promotion definition, read-only input to the discount engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Promotion {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    #[ts(as = "String")]
    pub discount_type: DiscountType,
    /// Units depend on `discount_type`: basis points for PERCENTAGE
    /// (1000 = 10%, 10000 = 100%), cents for FIXED_AMOUNT (1000 = 10.00).
    pub discount_value: i64,
    #[ts(as = "String")]
    pub start_date: DateTime<Utc>,
    #[ts(as = "String")]
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Promotion {
    /// Active and `now` inside the inclusive `[start_date, end_date]` window.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.start_date <= now && now <= self.end_date
    }
}

/// Input for creating or replacing a promotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NewPromotion {
    pub title: String,
    pub description: Option<String>,
    #[ts(as = "String")]
    pub discount_type: DiscountType,
    /// Basis points for PERCENTAGE (1000 = 10%), cents for FIXED_AMOUNT.
    pub discount_value: i64,
    #[ts(as = "String")]
    pub start_date: DateTime<Utc>,
    #[ts(as = "String")]
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
}

// =============================================================================
// Payment Aggregates
// =============================================================================

/// Count and total of completed payments through one gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStats {
    pub gateway: String,
    pub payment_count: i64,
    #[serde(rename = "totalAmount")]
    pub total_cents: i64,
}

/// Count and total of payments currently in one status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StatusStats {
    #[serde(rename = "paymentStatus")]
    pub status: PaymentStatus,
    pub payment_count: i64,
    #[serde(rename = "totalAmount")]
    pub total_cents: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_status_parsing_is_case_insensitive() {
        assert_eq!(
            "partially_refunded".parse::<PaymentStatus>().unwrap(),
            PaymentStatus::PartiallyRefunded
        );
        assert_eq!("Completed".parse::<PaymentStatus>().unwrap(), PaymentStatus::Completed);
        assert!("SETTLED".parse::<PaymentStatus>().is_err());
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&PaymentStatus::PartiallyRefunded).unwrap();
        assert_eq!(json, "\"PARTIALLY_REFUNDED\"");
    }

    #[test]
    fn test_change_type_directions() {
        use InventoryChangeType::*;
        for t in [Add, SaleReturn, Purchase, TransferIn, InitialStock] {
            assert!(t.accepts_delta(5), "{t} should accept increases");
            assert!(!t.accepts_delta(-5), "{t} should reject decreases");
            assert!(!t.accepts_delta(0), "{t} should reject zero");
        }
        for t in [Remove, Sale, PurchaseReturn, Damage, Theft, Expired, TransferOut] {
            assert!(t.accepts_delta(-5), "{t} should accept decreases");
            assert!(!t.accepts_delta(5), "{t} should reject increases");
        }
        for t in [Adjust, AuditAdjustment] {
            assert!(t.accepts_delta(-5) && t.accepts_delta(0) && t.accepts_delta(5));
        }
    }

    #[test]
    fn test_change_type_round_trips_through_name() {
        for t in InventoryChangeType::ALL {
            assert_eq!(t.as_str().parse::<InventoryChangeType>().unwrap(), t);
        }
        assert!("RESTOCK".parse::<InventoryChangeType>().is_err());
    }

    #[test]
    fn test_discount_type_parsing() {
        assert_eq!(DiscountType::from("percentage"), DiscountType::Percentage);
        assert_eq!(DiscountType::from("Fixed_Amount"), DiscountType::FixedAmount);
        assert_eq!(
            DiscountType::from("buy_one_get_one"),
            DiscountType::Other("BUY_ONE_GET_ONE".to_string())
        );
        let json = serde_json::to_string(&DiscountType::FixedAmount).unwrap();
        assert_eq!(json, "\"FIXED_AMOUNT\"");
    }

    #[test]
    fn test_payment_record_wire_names() {
        let now = Utc::now();
        let record = PaymentRecord {
            id: 9,
            order_id: 1,
            customer_id: None,
            processed_by: 2,
            amount_cents: 10000,
            method: PaymentMethod::Card,
            status: PaymentStatus::Processing,
            transaction_reference: "TXN-1-ABCDEF12".to_string(),
            gateway: "STRIPE".to_string(),
            card_last4: None,
            change_cents: None,
            notes: None,
            gateway_response: None,
            refunded_cents: 0,
            is_refundable: true,
            payment_at: now,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["paymentId"], 9);
        assert_eq!(value["orderId"], 1);
        assert_eq!(value["amount"], 10000);
        assert_eq!(value["paymentStatus"], "PROCESSING");
        assert_eq!(value["refundedAmount"], 0);
    }

    #[test]
    fn test_promotion_window_is_inclusive() {
        let start = "2026-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let end = "2026-01-31T23:59:59Z".parse::<DateTime<Utc>>().unwrap();
        let promo = Promotion {
            id: 1,
            title: "January".into(),
            description: None,
            discount_type: DiscountType::Percentage,
            discount_value: 1000,
            start_date: start,
            end_date: end,
            is_active: true,
            created_at: start,
            updated_at: start,
        };
        assert!(promo.is_valid_at(start));
        assert!(promo.is_valid_at(end));
        assert!(!promo.is_valid_at(end + chrono::Duration::seconds(1)));
        assert!(!Promotion { is_active: false, ..promo }.is_valid_at(start));
    }

    #[test]
    fn test_percentage_discount_value_is_basis_points() {
        let start = "2026-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let promo = Promotion {
            id: 1,
            title: "Ten off".into(),
            description: None,
            discount_type: DiscountType::Percentage,
            discount_value: 1000,
            start_date: start,
            end_date: start + chrono::Duration::days(1),
            is_active: true,
            created_at: start,
            updated_at: start,
        };
        let value = serde_json::to_value(&promo).unwrap();
        assert_eq!(value["discountValue"], 1000);

        let discount =
            crate::promotion::compute_discount(Some(&promo), Money::from_cents(10000), start)
                .unwrap();
        assert_eq!(discount.cents(), 1000);
    }
}
