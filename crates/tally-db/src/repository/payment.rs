//! # Payment Repository
//!
//! Persistence for the payment state machine.
//!
//! ## Transition Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 Every Transition, Same Atomic Path                      │
//! │                                                                         │
//! │  cancel / retry_failed / refund / update_status / settle               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  load row (id, version = v)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  tally_core: record.<transition>(..) ──── Err ──► return, no write     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  UPDATE payments SET ..., version = v + 1                              │
//! │  WHERE id = ? AND version = v                                          │
//! │       │                                                                 │
//! │       ├── 1 row  ──► done                                              │
//! │       └── 0 rows ──► someone else won; reload and re-check             │
//! │                      (bounded; then ConcurrentModification)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The re-check matters: a second concurrent refund re-reads the first one's
//! `refunded_cents` before deciding whether the balance still covers it.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use tally_core::payment::{prepare_payment, PaymentTransition};
use tally_core::validation::validate_payment;
use tally_core::{
    ActorRole, CoreResult, GatewayStats, Money, PaymentDraft, PaymentRecord, PaymentStatus,
    SettlementOutcome, StatusPolicy, StatusStats,
};

use crate::error::{DbError, DbResult};

/// Upper bound on reload-and-retry rounds for one transition.
pub const MAX_TRANSITION_ATTEMPTS: usize = 32;

const PAYMENT_COLUMNS: &str = "id, order_id, customer_id, processed_by, amount_cents, method, \
     status, transaction_reference, gateway, card_last4, change_cents, notes, gateway_response, \
     refunded_cents, is_refundable, payment_at, created_at, updated_at, version";

fn select_payments(filter: &str) -> String {
    format!("SELECT {} FROM payments {}", PAYMENT_COLUMNS, filter)
}

/// Repository for payment database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.payments();
///
/// let payment = repo.create(&draft).await?;          // PROCESSING
/// let payment = repo.settle(payment.id, &SettlementOutcome::approved()).await?;
/// let payment = repo.refund(payment.id, Money::from_cents(4000), "customer return").await?;
/// ```
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    /// Creates a new PaymentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// `validatePayment`: the creation gate, exposed on its own.
    pub fn validate_payment(&self, draft: &PaymentDraft) -> DbResult<()> {
        validate_payment(draft)?;
        Ok(())
    }

    /// `create`: validates the draft, fills defaults and inserts it.
    ///
    /// The result is PROCESSING (PENDING when the draft holds settlement).
    /// Settlement itself happens elsewhere; see `settle`.
    pub async fn create(&self, draft: &PaymentDraft) -> DbResult<PaymentRecord> {
        let now = Utc::now();
        let new = prepare_payment(draft, now).map_err(|e| {
            warn!(error = %e, "Payment draft rejected");
            DbError::from(e)
        })?;

        let sql = format!(
            r#"
            INSERT INTO payments (
                order_id, customer_id, processed_by, amount_cents, method,
                status, transaction_reference, gateway, card_last4, change_cents,
                notes, gateway_response, refunded_cents, is_refundable,
                payment_at, created_at, updated_at, version
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9, ?10,
                ?11, NULL, 0, ?12,
                ?13, ?13, ?13, 0
            )
            RETURNING {}
            "#,
            PAYMENT_COLUMNS
        );

        let record = sqlx::query_as::<_, PaymentRecord>(&sql)
            .bind(new.order_id)
            .bind(new.customer_id)
            .bind(new.processed_by)
            .bind(new.amount_cents)
            .bind(new.method)
            .bind(new.status)
            .bind(&new.transaction_reference)
            .bind(&new.gateway)
            .bind(&new.card_last4)
            .bind(new.change_cents)
            .bind(&new.notes)
            .bind(new.is_refundable)
            .bind(new.payment_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match DbError::from(e) {
                DbError::UniqueViolation { field, .. } => {
                    DbError::duplicate(field, new.transaction_reference.clone())
                }
                other => other,
            })?;

        info!(
            payment_id = record.id,
            order_id = record.order_id,
            amount = %record.amount(),
            method = %record.method,
            status = %record.status,
            reference = %record.transaction_reference,
            "Payment created"
        );

        Ok(record)
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// `settle`: records the single terminal outcome of a PROCESSING payment.
    pub async fn settle(&self, id: i64, outcome: &SettlementOutcome) -> DbResult<PaymentRecord> {
        let record = self
            .transition(id, |p, now| p.settle(outcome, now))
            .await?;
        info!(payment_id = id, status = %record.status, "Payment settled");
        Ok(record)
    }

    /// `release`: PENDING → PROCESSING. The caller submits it for
    /// settlement.
    pub async fn release(&self, id: i64) -> DbResult<PaymentRecord> {
        let record = self.transition(id, |p, now| p.release(now)).await?;
        info!(payment_id = id, "Held payment released");
        Ok(record)
    }

    /// `cancel`: PENDING | PROCESSING → CANCELLED.
    pub async fn cancel(&self, id: i64) -> DbResult<PaymentRecord> {
        let record = self.transition(id, |p, now| p.cancel(now)).await?;
        info!(payment_id = id, "Payment cancelled");
        Ok(record)
    }

    /// `retryFailed`: FAILED → PROCESSING. The caller resubmits it for
    /// settlement.
    pub async fn retry_failed(&self, id: i64) -> DbResult<PaymentRecord> {
        let record = self.transition(id, |p, now| p.retry(now)).await?;
        info!(payment_id = id, "Payment re-entered processing");
        Ok(record)
    }

    /// `refund`: moves `amount` of the refundable balance back to the
    /// customer.
    pub async fn refund(&self, id: i64, amount: Money, reason: &str) -> DbResult<PaymentRecord> {
        let record = self
            .transition(id, |p, now| p.refund(amount, reason, now))
            .await?;
        info!(
            payment_id = id,
            amount = %amount,
            refunded = %record.refunded_amount(),
            status = %record.status,
            "Refund processed"
        );
        Ok(record)
    }

    /// `updateStatus`: administrative override, gated by `policy`.
    pub async fn update_status(
        &self,
        id: i64,
        target: PaymentStatus,
        role: ActorRole,
        policy: &StatusPolicy,
    ) -> DbResult<PaymentRecord> {
        let record = self
            .transition(id, |p, now| p.override_status(target, role, policy, now))
            .await?;
        info!(payment_id = id, status = %target, role = %role, "Payment status overridden");
        Ok(record)
    }

    /// Load, decide, compare-and-swap on `version`.
    async fn transition<F>(&self, id: i64, decide: F) -> DbResult<PaymentRecord>
    where
        F: Fn(&PaymentRecord, DateTime<Utc>) -> CoreResult<PaymentTransition>,
    {
        for attempt in 1..=MAX_TRANSITION_ATTEMPTS {
            let mut record = self.require(id).await?;

            let t = decide(&record, Utc::now()).map_err(|e| {
                warn!(
                    payment_id = id,
                    status = %record.status,
                    refunded = %record.refunded_amount(),
                    error = %e,
                    "Payment transition rejected"
                );
                DbError::from(e)
            })?;

            let result = sqlx::query(
                r#"
                UPDATE payments SET
                    status = ?3,
                    refunded_cents = ?4,
                    notes = ?5,
                    gateway_response = ?6,
                    updated_at = ?7,
                    version = version + 1
                WHERE id = ?1 AND version = ?2
                "#,
            )
            .bind(id)
            .bind(record.version)
            .bind(t.status)
            .bind(t.refunded_cents)
            .bind(&t.notes)
            .bind(&t.gateway_response)
            .bind(t.updated_at)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 1 {
                let from = record.status;
                record.apply(t);
                debug!(payment_id = id, from = %from, to = %record.status, "Payment updated");
                return Ok(record);
            }

            debug!(payment_id = id, attempt, "Version conflict, reloading payment");
            tokio::task::yield_now().await;
        }

        Err(DbError::ConcurrentModification {
            entity: "Payment".to_string(),
            id: id.to_string(),
        })
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    async fn require(&self, id: i64) -> DbResult<PaymentRecord> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Payment", id))
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<PaymentRecord>> {
        let payment = sqlx::query_as::<_, PaymentRecord>(&select_payments("WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(payment)
    }

    pub async fn get_by_reference(&self, reference: &str) -> DbResult<Option<PaymentRecord>> {
        let payment = sqlx::query_as::<_, PaymentRecord>(&select_payments(
            "WHERE transaction_reference = ?1",
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    /// Every payment, oldest first.
    pub async fn list_all(&self) -> DbResult<Vec<PaymentRecord>> {
        let payments = sqlx::query_as::<_, PaymentRecord>(&select_payments("ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;

        Ok(payments)
    }

    pub async fn by_customer(&self, customer_id: i64) -> DbResult<Vec<PaymentRecord>> {
        self.fetch_by("WHERE customer_id = ?1 ORDER BY id", customer_id)
            .await
    }

    pub async fn by_order(&self, order_id: i64) -> DbResult<Vec<PaymentRecord>> {
        self.fetch_by("WHERE order_id = ?1 ORDER BY id", order_id).await
    }

    /// Payments taken by one actor.
    pub async fn by_actor(&self, actor_id: i64) -> DbResult<Vec<PaymentRecord>> {
        self.fetch_by("WHERE processed_by = ?1 ORDER BY id", actor_id)
            .await
    }

    pub async fn by_status(&self, status: PaymentStatus) -> DbResult<Vec<PaymentRecord>> {
        let payments =
            sqlx::query_as::<_, PaymentRecord>(&select_payments("WHERE status = ?1 ORDER BY id"))
                .bind(status)
                .fetch_all(&self.pool)
                .await?;

        Ok(payments)
    }

    /// PROCESSING payments, oldest first. The settlement worker resubmits
    /// these after a restart.
    pub async fn list_processing(&self) -> DbResult<Vec<PaymentRecord>> {
        self.by_status(PaymentStatus::Processing).await
    }

    pub async fn by_customer_and_status(
        &self,
        customer_id: i64,
        status: PaymentStatus,
    ) -> DbResult<Vec<PaymentRecord>> {
        let payments = sqlx::query_as::<_, PaymentRecord>(&select_payments(
            "WHERE customer_id = ?1 AND status = ?2 ORDER BY id",
        ))
        .bind(customer_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    pub async fn by_gateway(&self, gateway: &str) -> DbResult<Vec<PaymentRecord>> {
        let payments =
            sqlx::query_as::<_, PaymentRecord>(&select_payments("WHERE gateway = ?1 ORDER BY id"))
                .bind(gateway)
                .fetch_all(&self.pool)
                .await?;

        Ok(payments)
    }

    pub async fn by_gateway_and_status(
        &self,
        gateway: &str,
        status: PaymentStatus,
    ) -> DbResult<Vec<PaymentRecord>> {
        let payments = sqlx::query_as::<_, PaymentRecord>(&select_payments(
            "WHERE gateway = ?1 AND status = ?2 ORDER BY id",
        ))
        .bind(gateway)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    /// Payments with `from <= payment_at <= to`.
    pub async fn by_date_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<PaymentRecord>> {
        let payments = sqlx::query_as::<_, PaymentRecord>(&select_payments(
            "WHERE payment_at BETWEEN ?1 AND ?2 ORDER BY id",
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    pub async fn by_actor_in_range(
        &self,
        actor_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<PaymentRecord>> {
        let payments = sqlx::query_as::<_, PaymentRecord>(&select_payments(
            "WHERE processed_by = ?1 AND payment_at BETWEEN ?2 AND ?3 ORDER BY id",
        ))
        .bind(actor_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    /// Payments that can still take a refund: COMPLETED or
    /// PARTIALLY_REFUNDED, refundable, with a positive balance.
    pub async fn list_refundable(&self) -> DbResult<Vec<PaymentRecord>> {
        let payments = sqlx::query_as::<_, PaymentRecord>(&select_payments(
            r#"
            WHERE status IN ('COMPLETED', 'PARTIALLY_REFUNDED')
              AND is_refundable = 1
              AND refunded_cents < amount_cents
            ORDER BY id
            "#,
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    async fn fetch_by(&self, filter: &str, key: i64) -> DbResult<Vec<PaymentRecord>> {
        let payments = sqlx::query_as::<_, PaymentRecord>(&select_payments(filter))
            .bind(key)
            .fetch_all(&self.pool)
            .await?;

        Ok(payments)
    }

    // =========================================================================
    // Aggregates
    // =========================================================================

    /// Σ amount of payments currently in `status`.
    pub async fn total_by_status(&self, status: PaymentStatus) -> DbResult<Money> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_cents), 0) FROM payments WHERE status = ?1",
        )
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        Ok(Money::from_cents(total))
    }

    /// Σ amount of COMPLETED payments through `gateway`.
    pub async fn total_completed_by_gateway(&self, gateway: &str) -> DbResult<Money> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount_cents), 0) FROM payments
            WHERE gateway = ?1 AND status = 'COMPLETED'
            "#,
        )
        .bind(gateway)
        .fetch_one(&self.pool)
        .await?;

        Ok(Money::from_cents(total))
    }

    /// Σ amount of a customer's COMPLETED payments.
    pub async fn total_paid_by_customer(&self, customer_id: i64) -> DbResult<Money> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount_cents), 0) FROM payments
            WHERE customer_id = ?1 AND status = 'COMPLETED'
            "#,
        )
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Money::from_cents(total))
    }

    /// Count and total of COMPLETED payments per gateway.
    pub async fn gateway_stats(&self) -> DbResult<Vec<GatewayStats>> {
        let stats = sqlx::query_as::<_, GatewayStats>(
            r#"
            SELECT gateway,
                   COUNT(*) AS payment_count,
                   SUM(amount_cents) AS total_cents
            FROM payments
            WHERE status = 'COMPLETED'
            GROUP BY gateway
            ORDER BY gateway
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(stats)
    }

    /// Count and total per current status.
    pub async fn status_stats(&self) -> DbResult<Vec<StatusStats>> {
        let stats = sqlx::query_as::<_, StatusStats>(
            r#"
            SELECT status,
                   COUNT(*) AS payment_count,
                   SUM(amount_cents) AS total_cents
            FROM payments
            GROUP BY status
            ORDER BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(stats)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Duration;
    use tally_core::payment::{APPROVED_RESPONSE, DECLINED_RESPONSE};
    use tally_core::{CoreError, PaymentMethod};

    async fn repo() -> PaymentRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().payments()
    }

    fn card(amount_cents: i64) -> PaymentDraft {
        PaymentDraft::new(1, 2, Money::from_cents(amount_cents), PaymentMethod::Card)
    }

    async fn completed(repo: &PaymentRepository, amount_cents: i64) -> PaymentRecord {
        let p = repo.create(&card(amount_cents)).await.unwrap();
        repo.settle(p.id, &SettlementOutcome::approved()).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_defaults() {
        let repo = repo().await;
        let p = repo.create(&card(10000)).await.unwrap();

        assert_eq!(p.status, PaymentStatus::Processing);
        assert_eq!(p.gateway, "STRIPE");
        assert_eq!(p.refunded_cents, 0);
        assert!(p.is_refundable);
        assert!(p.transaction_reference.starts_with("TXN-"));
        assert_eq!(p.version, 0);

        let found = repo.get_by_reference(&p.transaction_reference).await.unwrap();
        assert_eq!(found, Some(p));
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_drafts() {
        let repo = repo().await;

        let no_order = PaymentDraft { order_id: None, ..card(100) };
        assert!(repo.create(&no_order).await.unwrap_err().is_validation());
        assert!(repo.validate_payment(&no_order).unwrap_err().is_validation());

        let no_amount = card(0);
        assert!(repo.create(&no_amount).await.unwrap_err().is_validation());

        let mut negative_change =
            PaymentDraft::new(1, 2, Money::from_cents(100), PaymentMethod::Cash);
        negative_change.change_cents = Some(-1);
        assert!(repo.create(&negative_change).await.unwrap_err().is_validation());

        let card_negative_change = PaymentDraft { change_cents: Some(-5), ..card(100) };
        assert!(repo.create(&card_negative_change).await.unwrap_err().is_validation());

        assert!(repo.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_reference() {
        let repo = repo().await;
        let mut draft = card(100);
        draft.transaction_reference = Some("TXN-FIXED".into());
        repo.create(&draft).await.unwrap();

        let err = repo.create(&draft).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { ref value, .. } if value == "TXN-FIXED"));
    }

    #[tokio::test]
    async fn test_card_payment_refund_sequence() {
        let repo = repo().await;

        let p = repo.create(&card(10000)).await.unwrap();
        assert_eq!(p.status, PaymentStatus::Processing);

        let p = repo.settle(p.id, &SettlementOutcome::approved()).await.unwrap();
        assert_eq!(p.status, PaymentStatus::Completed);
        assert_eq!(p.gateway_response.as_deref(), Some(APPROVED_RESPONSE));

        let p = repo
            .refund(p.id, Money::from_cents(4000), "customer return")
            .await
            .unwrap();
        assert_eq!(p.refunded_cents, 4000);
        assert_eq!(p.status, PaymentStatus::PartiallyRefunded);

        let p = repo.refund(p.id, Money::from_cents(6000), "rest").await.unwrap();
        assert_eq!(p.refunded_cents, 10000);
        assert_eq!(p.status, PaymentStatus::Refunded);

        let err = repo.refund(p.id, Money::from_cents(100), "more").await.unwrap_err();
        assert!(err.is_invalid_transition());

        let stored = repo.get_by_id(p.id).await.unwrap().unwrap();
        assert_eq!(stored, p);
        assert_eq!(stored.version, 3);
        assert_eq!(
            stored.notes.as_deref(),
            Some("Refund: $40.00 - Reason: customer return | Refund: $60.00 - Reason: rest")
        );
    }

    #[tokio::test]
    async fn test_refund_exceeding_balance_leaves_record_unchanged() {
        let repo = repo().await;
        let p = completed(&repo, 10000).await;
        repo.refund(p.id, Money::from_cents(9000), "most").await.unwrap();

        let err = repo.refund(p.id, Money::from_cents(1001), "too much").await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::RefundExceedsBalance { .. })));

        let stored = repo.get_by_id(p.id).await.unwrap().unwrap();
        assert_eq!(stored.refunded_cents, 9000);
        assert_eq!(stored.status, PaymentStatus::PartiallyRefunded);
    }

    #[tokio::test]
    async fn test_non_refundable_payment() {
        let repo = repo().await;
        let p = repo.create(&card(500).non_refundable()).await.unwrap();
        repo.settle(p.id, &SettlementOutcome::approved()).await.unwrap();

        let err = repo.refund(p.id, Money::from_cents(100), "nope").await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::NotRefundable { .. })));
        assert!(repo.list_refundable().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_rules() {
        let repo = repo().await;

        let done = completed(&repo, 100).await;
        let err = repo.cancel(done.id).await.unwrap_err();
        assert!(err.is_invalid_transition());
        assert_eq!(repo.get_by_id(done.id).await.unwrap().unwrap(), done);

        let mut held = card(100);
        held.hold = true;
        let pending = repo.create(&held).await.unwrap();
        assert_eq!(pending.status, PaymentStatus::Pending);
        let cancelled = repo.cancel(pending.id).await.unwrap();
        assert_eq!(cancelled.status, PaymentStatus::Cancelled);
        assert_eq!(cancelled.notes.as_deref(), Some("Payment cancelled"));

        let err = repo
            .settle(cancelled.id, &SettlementOutcome::approved())
            .await
            .unwrap_err();
        assert!(err.is_invalid_transition());
    }

    #[tokio::test]
    async fn test_release_held_payment() {
        let repo = repo().await;
        let held = PaymentDraft { hold: true, ..card(100) };
        let pending = repo.create(&held).await.unwrap();

        let released = repo.release(pending.id).await.unwrap();
        assert_eq!(released.status, PaymentStatus::Processing);
        assert_eq!(released.version, pending.version + 1);
        assert_eq!(released.notes.as_deref(), Some("Payment released for settlement"));

        assert!(repo.release(pending.id).await.unwrap_err().is_invalid_transition());
        assert!(repo.release(404).await.unwrap_err().is_not_found());

        let settled = repo.settle(pending.id, &SettlementOutcome::approved()).await.unwrap();
        assert_eq!(settled.status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn test_settle_exactly_once() {
        let repo = repo().await;
        let p = repo.create(&card(100)).await.unwrap();
        repo.settle(p.id, &SettlementOutcome::declined()).await.unwrap();

        let err = repo.settle(p.id, &SettlementOutcome::approved()).await.unwrap_err();
        assert!(err.is_invalid_transition());

        let stored = repo.get_by_id(p.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Failed);
        assert_eq!(stored.gateway_response.as_deref(), Some(DECLINED_RESPONSE));
    }

    #[tokio::test]
    async fn test_retry_failed() {
        let repo = repo().await;
        let p = repo.create(&card(100)).await.unwrap();

        assert!(repo.retry_failed(p.id).await.unwrap_err().is_invalid_transition());

        repo.settle(p.id, &SettlementOutcome::declined()).await.unwrap();
        let retried = repo.retry_failed(p.id).await.unwrap();
        assert_eq!(retried.status, PaymentStatus::Processing);

        let settled = repo.settle(p.id, &SettlementOutcome::approved()).await.unwrap();
        assert_eq!(settled.status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn test_missing_payment() {
        let repo = repo().await;
        assert!(repo.cancel(404).await.unwrap_err().is_not_found());
        assert!(repo.get_by_id(404).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_status_policy() {
        let repo = repo().await;
        let policy = StatusPolicy::default();
        let p = repo.create(&card(100)).await.unwrap();

        let err = repo
            .update_status(p.id, PaymentStatus::Cancelled, ActorRole::Cashier, &policy)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::PolicyDenied { .. })));

        let p = repo
            .update_status(p.id, PaymentStatus::Completed, ActorRole::Cashier, &policy)
            .await
            .unwrap();
        assert_eq!(p.status, PaymentStatus::Completed);

        let strict = StatusPolicy::default().enforcing_transitions();
        let err = repo
            .update_status(p.id, PaymentStatus::Processing, ActorRole::Admin, &strict)
            .await
            .unwrap_err();
        assert!(err.is_invalid_transition());
    }

    #[tokio::test]
    async fn test_queries_and_aggregates() {
        let repo = repo().await;
        let from = Utc::now() - Duration::minutes(1);

        let a = completed(&repo, 1000).await;
        let b = repo
            .create(&PaymentDraft::new(2, 3, Money::from_cents(500), PaymentMethod::Cash).with_customer(77))
            .await
            .unwrap();
        repo.settle(b.id, &SettlementOutcome::approved()).await.unwrap();
        let c = repo
            .create(&PaymentDraft::new(3, 3, Money::from_cents(250), PaymentMethod::Wallet).with_customer(77))
            .await
            .unwrap();

        let to = Utc::now() + Duration::minutes(1);

        assert_eq!(repo.list_all().await.unwrap().len(), 3);
        assert_eq!(repo.by_customer(77).await.unwrap().len(), 2);
        assert_eq!(
            repo.by_customer_and_status(77, PaymentStatus::Processing).await.unwrap(),
            vec![c.clone()]
        );
        assert_eq!(repo.by_order(1).await.unwrap()[0].id, a.id);
        assert_eq!(repo.by_actor(3).await.unwrap().len(), 2);
        assert_eq!(repo.by_status(PaymentStatus::Completed).await.unwrap().len(), 2);
        assert_eq!(repo.list_processing().await.unwrap().len(), 1);
        assert_eq!(repo.by_gateway("INTERNAL").await.unwrap().len(), 1);
        assert_eq!(
            repo.by_gateway_and_status("PAYPAL", PaymentStatus::Processing)
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(repo.by_date_range(from, to).await.unwrap().len(), 3);
        assert_eq!(repo.by_actor_in_range(2, from, to).await.unwrap().len(), 1);
        assert_eq!(repo.list_refundable().await.unwrap().len(), 2);

        assert_eq!(
            repo.total_by_status(PaymentStatus::Completed).await.unwrap(),
            Money::from_cents(1500)
        );
        assert_eq!(
            repo.total_completed_by_gateway("STRIPE").await.unwrap(),
            Money::from_cents(1000)
        );
        assert_eq!(
            repo.total_paid_by_customer(77).await.unwrap(),
            Money::from_cents(500)
        );
        assert!(repo.total_paid_by_customer(1).await.unwrap().is_zero());

        let gateways = repo.gateway_stats().await.unwrap();
        assert_eq!(
            gateways,
            vec![
                GatewayStats { gateway: "INTERNAL".into(), payment_count: 1, total_cents: 500 },
                GatewayStats { gateway: "STRIPE".into(), payment_count: 1, total_cents: 1000 },
            ]
        );

        let statuses = repo.status_stats().await.unwrap();
        let processing = statuses
            .iter()
            .find(|s| s.status == PaymentStatus::Processing)
            .unwrap();
        assert_eq!((processing.payment_count, processing.total_cents), (1, 250));
    }

    #[tokio::test]
    async fn test_payments_are_never_deleted() {
        let repo = repo().await;
        let p = repo.create(&card(100)).await.unwrap();
        let delete = sqlx::query("DELETE FROM payments WHERE id = ?1")
            .bind(p.id)
            .execute(&repo.pool)
            .await;
        assert!(delete.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refunds_never_exceed_amount() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::new(dir.path().join("payments.db")).max_connections(8))
            .await
            .unwrap();
        let repo = db.payments();
        let p = completed(&repo, 10000).await;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.refund(p.id, Money::from_cents(1500), "split return").await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(e) => assert!(
                    matches!(e, DbError::Domain(CoreError::RefundExceedsBalance { .. })),
                    "unexpected error: {e}"
                ),
            }
        }

        assert_eq!(succeeded, 6);
        let stored = repo.get_by_id(p.id).await.unwrap().unwrap();
        assert_eq!(stored.refunded_cents, 9000);
        assert_eq!(stored.status, PaymentStatus::PartiallyRefunded);
        assert_eq!(stored.version, 7);
    }
}
