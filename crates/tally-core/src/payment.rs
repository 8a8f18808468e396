//! # Payment State Machine
//!
//! Every payment transition is computed here as a pure function of the
//! current record. The database layer loads the record, asks this module for
//! a [`PaymentTransition`], and writes it back only if nobody else wrote in
//! between.
//!
//! ## Transitions
//! ```text
//! ┌──────────────┬───────────────────────────────┬──────────────────────────┐
//! │ Operation    │ Allowed from                  │ Result                   │
//! ├──────────────┼───────────────────────────────┼──────────────────────────┤
//! │ create       │ (draft passes validation)     │ PROCESSING (or PENDING)  │
//! │ settle       │ PROCESSING                    │ COMPLETED | FAILED       │
//! │ cancel       │ PENDING, PROCESSING           │ CANCELLED                │
//! │ retry        │ FAILED                        │ PROCESSING               │
//! │ refund       │ COMPLETED, PARTIALLY_REFUNDED │ REFUNDED | PARTIALLY_... │
//! │ override     │ per StatusPolicy              │ target                   │
//! └──────────────┴───────────────────────────────┴──────────────────────────┘
//! ```
//!
//! A refund of exactly the refundable balance lands on REFUNDED, anything
//! smaller on PARTIALLY_REFUNDED. `refunded_cents` never exceeds
//! `amount_cents`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{
    ActorRole, PaymentAction, PaymentDraft, PaymentGateway, PaymentMethod, PaymentRecord,
    PaymentStatus,
};
use crate::validation::{validate_payment, validate_refund_request};

/// Separator between audit entries in `notes`.
pub const NOTE_SEPARATOR: &str = " | ";

/// Gateway response recorded on a successful settlement.
pub const APPROVED_RESPONSE: &str = "Payment processed successfully";

/// Gateway response recorded on a declined settlement.
pub const DECLINED_RESPONSE: &str = "Payment failed - insufficient funds";

// =============================================================================
// Creation
// =============================================================================

/// A validated payment, ready to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub order_id: i64,
    pub customer_id: Option<i64>,
    pub processed_by: i64,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_reference: String,
    pub gateway: String,
    pub card_last4: Option<String>,
    pub change_cents: Option<i64>,
    pub notes: Option<String>,
    pub is_refundable: bool,
    pub payment_at: DateTime<Utc>,
}

/// `TXN-<epoch millis>-<first 8 hex of a v4 UUID, upper case>`.
pub fn generate_transaction_reference(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("TXN-{}-{}", now.timestamp_millis(), suffix)
}

/// Runs `validate_payment` and fills in defaults.
///
/// - transaction reference generated when absent
/// - gateway defaulted by method when absent or blank
/// - status PROCESSING, or PENDING if the draft asked to hold settlement
pub fn prepare_payment(draft: &PaymentDraft, now: DateTime<Utc>) -> CoreResult<NewPayment> {
    validate_payment(draft)?;

    // validate_payment guarantees these are present
    let (Some(method), Some(order_id), Some(processed_by)) =
        (draft.method, draft.order_id, draft.processed_by)
    else {
        return Err(crate::error::ValidationError::required("method").into());
    };

    let gateway = draft
        .gateway
        .as_deref()
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| PaymentGateway::default_for(method).to_string());

    let transaction_reference = draft
        .transaction_reference
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| generate_transaction_reference(now));

    let status = if draft.hold {
        PaymentStatus::Pending
    } else {
        PaymentStatus::Processing
    };

    Ok(NewPayment {
        order_id,
        customer_id: draft.customer_id,
        processed_by,
        amount_cents: draft.amount_cents,
        method,
        status,
        transaction_reference,
        gateway,
        card_last4: draft.card_last4.clone(),
        change_cents: draft.change_cents,
        notes: draft.notes.clone(),
        is_refundable: draft.is_refundable.unwrap_or(true),
        payment_at: now,
    })
}

/// Change owed on a cash tender.
///
/// ```rust
/// use tally_core::payment::cash_change;
/// use tally_core::Money;
///
/// let change = cash_change(Money::from_cents(1750), Money::from_cents(2000)).unwrap();
/// assert_eq!(change.cents(), 250);
/// assert!(cash_change(Money::from_cents(1750), Money::from_cents(1000)).is_err());
/// ```
pub fn cash_change(amount: Money, received: Money) -> CoreResult<Money> {
    if received < amount {
        return Err(CoreError::InsufficientTender {
            required: amount,
            received,
        });
    }
    Ok(received - amount)
}

impl PaymentDraft {
    /// A CASH draft with the change already worked out.
    pub fn cash(order_id: i64, processed_by: i64, amount: Money, received: Money) -> CoreResult<Self> {
        let change = cash_change(amount, received)?;
        let mut draft = PaymentDraft::new(order_id, processed_by, amount, PaymentMethod::Cash);
        draft.change_cents = Some(change.cents());
        draft.notes = Some(format!("Cash received: {}, Change: {}", received, change));
        Ok(draft)
    }
}

// =============================================================================
// Transitions
// =============================================================================

/// Terminal outcome reported by a gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "response", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementOutcome {
    Approved(String),
    Declined(String),
}

impl SettlementOutcome {
    pub fn approved() -> Self {
        SettlementOutcome::Approved(APPROVED_RESPONSE.to_string())
    }

    pub fn declined() -> Self {
        SettlementOutcome::Declined(DECLINED_RESPONSE.to_string())
    }

    pub fn status(&self) -> PaymentStatus {
        match self {
            SettlementOutcome::Approved(_) => PaymentStatus::Completed,
            SettlementOutcome::Declined(_) => PaymentStatus::Failed,
        }
    }

    pub fn response(&self) -> &str {
        match self {
            SettlementOutcome::Approved(r) | SettlementOutcome::Declined(r) => r,
        }
    }
}

/// The mutable part of a payment after a transition.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentTransition {
    pub status: PaymentStatus,
    pub refunded_cents: i64,
    pub notes: Option<String>,
    pub gateway_response: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Appends an audit entry to existing notes.
pub fn append_note(existing: Option<&str>, entry: &str) -> String {
    match existing {
        Some(notes) if !notes.is_empty() => format!("{}{}{}", notes, NOTE_SEPARATOR, entry),
        _ => entry.to_string(),
    }
}

/// Edges of the payment graph, used when a policy enforces transitions.
pub fn can_transition(from: PaymentStatus, to: PaymentStatus) -> bool {
    use PaymentStatus::*;
    match from {
        Pending => matches!(to, Processing | Cancelled),
        Processing => matches!(to, Completed | Failed | Cancelled),
        Failed => matches!(to, Processing),
        Completed => matches!(to, Refunded | PartiallyRefunded),
        PartiallyRefunded => matches!(to, Refunded | PartiallyRefunded),
        Cancelled | Refunded => false,
    }
}

impl PaymentRecord {
    fn transition(&self, status: PaymentStatus, now: DateTime<Utc>) -> PaymentTransition {
        PaymentTransition {
            status,
            refunded_cents: self.refunded_cents,
            notes: self.notes.clone(),
            gateway_response: self.gateway_response.clone(),
            updated_at: now,
        }
    }

    fn refuse(&self, action: PaymentAction) -> CoreError {
        CoreError::InvalidTransition {
            payment_id: self.id,
            from: self.status,
            action,
        }
    }

    /// PROCESSING → COMPLETED | FAILED.
    pub fn settle(
        &self,
        outcome: &SettlementOutcome,
        now: DateTime<Utc>,
    ) -> CoreResult<PaymentTransition> {
        match self.status {
            PaymentStatus::Processing => {
                let mut t = self.transition(outcome.status(), now);
                t.gateway_response = Some(outcome.response().to_string());
                Ok(t)
            }
            PaymentStatus::Pending
            | PaymentStatus::Completed
            | PaymentStatus::Failed
            | PaymentStatus::Cancelled
            | PaymentStatus::Refunded
            | PaymentStatus::PartiallyRefunded => Err(self.refuse(PaymentAction::Settle)),
        }
    }

    /// PENDING → PROCESSING. Hands a held payment to settlement.
    pub fn release(&self, now: DateTime<Utc>) -> CoreResult<PaymentTransition> {
        match self.status {
            PaymentStatus::Pending => {
                let mut t = self.transition(PaymentStatus::Processing, now);
                t.notes = Some(append_note(self.notes.as_deref(), "Payment released for settlement"));
                Ok(t)
            }
            PaymentStatus::Processing
            | PaymentStatus::Completed
            | PaymentStatus::Failed
            | PaymentStatus::Cancelled
            | PaymentStatus::Refunded
            | PaymentStatus::PartiallyRefunded => Err(self.refuse(PaymentAction::Release)),
        }
    }

    /// PENDING | PROCESSING → CANCELLED.
    pub fn cancel(&self, now: DateTime<Utc>) -> CoreResult<PaymentTransition> {
        match self.status {
            PaymentStatus::Pending | PaymentStatus::Processing => {
                let mut t = self.transition(PaymentStatus::Cancelled, now);
                t.notes = Some(append_note(self.notes.as_deref(), "Payment cancelled"));
                Ok(t)
            }
            PaymentStatus::Completed
            | PaymentStatus::Failed
            | PaymentStatus::Cancelled
            | PaymentStatus::Refunded
            | PaymentStatus::PartiallyRefunded => Err(self.refuse(PaymentAction::Cancel)),
        }
    }

    /// FAILED → PROCESSING.
    pub fn retry(&self, now: DateTime<Utc>) -> CoreResult<PaymentTransition> {
        match self.status {
            PaymentStatus::Failed => {
                let mut t = self.transition(PaymentStatus::Processing, now);
                t.notes = Some(append_note(self.notes.as_deref(), "Payment retry attempted"));
                Ok(t)
            }
            PaymentStatus::Pending
            | PaymentStatus::Processing
            | PaymentStatus::Completed
            | PaymentStatus::Cancelled
            | PaymentStatus::Refunded
            | PaymentStatus::PartiallyRefunded => Err(self.refuse(PaymentAction::Retry)),
        }
    }

    /// COMPLETED | PARTIALLY_REFUNDED → REFUNDED | PARTIALLY_REFUNDED.
    ///
    /// ## Preconditions (checked in this order)
    /// 1. amount > 0 and a reason is given
    /// 2. status accepts refunds
    /// 3. `is_refundable`
    /// 4. amount ≤ refundable balance
    pub fn refund(
        &self,
        amount: Money,
        reason: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<PaymentTransition> {
        validate_refund_request(amount, reason)?;

        match self.status {
            PaymentStatus::Completed | PaymentStatus::PartiallyRefunded => {}
            PaymentStatus::Pending
            | PaymentStatus::Processing
            | PaymentStatus::Failed
            | PaymentStatus::Cancelled
            | PaymentStatus::Refunded => return Err(self.refuse(PaymentAction::Refund)),
        }

        if !self.is_refundable {
            return Err(CoreError::NotRefundable {
                payment_id: self.id,
            });
        }

        let refundable = self.refundable_balance();
        if amount > refundable {
            return Err(CoreError::RefundExceedsBalance {
                payment_id: self.id,
                requested: amount,
                refundable,
            });
        }

        let refunded = self.refunded_amount() + amount;
        let status = if refunded == self.amount() {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::PartiallyRefunded
        };

        let mut t = self.transition(status, now);
        t.refunded_cents = refunded.cents();
        t.notes = Some(append_note(
            self.notes.as_deref(),
            &format!("Refund: {} - Reason: {}", amount, reason.trim()),
        ));
        Ok(t)
    }

    /// Administrative override, gated by `policy`.
    ///
    /// Independently of the policy, REFUNDED and PARTIALLY_REFUNDED can only
    /// be set when they agree with `refunded_cents`.
    pub fn override_status(
        &self,
        target: PaymentStatus,
        role: ActorRole,
        policy: &StatusPolicy,
        now: DateTime<Utc>,
    ) -> CoreResult<PaymentTransition> {
        if !policy.permits(role, target) {
            return Err(CoreError::PolicyDenied { role, target });
        }

        if policy.enforce_transitions && !can_transition(self.status, target) {
            return Err(self.refuse(PaymentAction::UpdateStatus));
        }

        let consistent = match target {
            PaymentStatus::Refunded => self.refunded_amount() == self.amount(),
            PaymentStatus::PartiallyRefunded => {
                self.refunded_cents > 0 && self.refunded_amount() < self.amount()
            }
            PaymentStatus::Pending
            | PaymentStatus::Processing
            | PaymentStatus::Completed
            | PaymentStatus::Failed
            | PaymentStatus::Cancelled => true,
        };
        if !consistent {
            return Err(self.refuse(PaymentAction::UpdateStatus));
        }

        let mut t = self.transition(target, now);
        t.notes = Some(append_note(
            self.notes.as_deref(),
            &format!("Status override: {} -> {} by {}", self.status, target, role),
        ));
        Ok(t)
    }

    /// Applies a transition in memory and bumps the version, mirroring what
    /// the repository writes.
    pub fn apply(&mut self, t: PaymentTransition) {
        self.status = t.status;
        self.refunded_cents = t.refunded_cents;
        self.notes = t.notes;
        self.gateway_response = t.gateway_response;
        self.updated_at = t.updated_at;
        self.version += 1;
    }
}

// =============================================================================
// Status Policy
// =============================================================================

/// Which roles may force which statuses through `update_status`.
///
/// ## Default Table
/// ```text
/// ┌──────────┬──────────────────────────────┐
/// │ Role     │ May set                      │
/// ├──────────┼──────────────────────────────┤
/// │ ADMIN    │ any status                   │
/// │ MANAGER  │ any status                   │
/// │ CASHIER  │ COMPLETED, FAILED            │
/// └──────────┴──────────────────────────────┘
/// enforce_transitions = false
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPolicy {
    pub grants: HashMap<ActorRole, Vec<PaymentStatus>>,
    /// Also require the move to be an edge of the payment graph.
    #[serde(default)]
    pub enforce_transitions: bool,
}

impl Default for StatusPolicy {
    fn default() -> Self {
        StatusPolicy::empty()
            .grant(ActorRole::Admin, PaymentStatus::ALL)
            .grant(ActorRole::Manager, PaymentStatus::ALL)
            .grant(
                ActorRole::Cashier,
                [PaymentStatus::Completed, PaymentStatus::Failed],
            )
    }
}

impl StatusPolicy {
    /// A policy that grants nothing.
    pub fn empty() -> Self {
        StatusPolicy {
            grants: HashMap::new(),
            enforce_transitions: false,
        }
    }

    pub fn grant(mut self, role: ActorRole, statuses: impl IntoIterator<Item = PaymentStatus>) -> Self {
        self.grants.entry(role).or_default().extend(statuses);
        self
    }

    pub fn enforcing_transitions(mut self) -> Self {
        self.enforce_transitions = true;
        self
    }

    pub fn permits(&self, role: ActorRole, target: PaymentStatus) -> bool {
        self.grants
            .get(&role)
            .is_some_and(|allowed| allowed.contains(&target))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
