//! # Payment Gateways
//!
//! The worker asks a [`PaymentGateway`] for the terminal outcome of each
//! PROCESSING payment. Production wiring uses [`SimulatedGateway`]; tests
//! inject [`AlwaysApprove`] or [`AlwaysDecline`] so outcomes are
//! deterministic.

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tracing::debug;

use tally_core::{PaymentRecord, SettlementOutcome};

/// Something that can confirm a payment with the outside world.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Returns the terminal outcome for `payment`. Never fails: a gateway
    /// that cannot reach its provider reports a decline.
    async fn confirm(&self, payment: &PaymentRecord) -> SettlementOutcome;
}

// =============================================================================
// Simulated Gateway
// =============================================================================

/// Approves with probability `success_rate` after `delay`.
#[derive(Debug, Clone)]
pub struct SimulatedGateway {
    delay: Duration,
    success_rate: f64,
}

impl SimulatedGateway {
    /// `success_rate` is clamped to [0, 1].
    pub fn new(delay: Duration, success_rate: f64) -> Self {
        SimulatedGateway {
            delay,
            success_rate: success_rate.clamp(0.0, 1.0),
        }
    }

    pub fn success_rate(&self) -> f64 {
        self.success_rate
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn confirm(&self, payment: &PaymentRecord) -> SettlementOutcome {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        // ThreadRng is not Send; keep it out of the await above
        let approved = rand::thread_rng().gen_bool(self.success_rate);

        debug!(
            payment_id = payment.id,
            approved, "Simulated gateway responded"
        );

        if approved {
            SettlementOutcome::approved()
        } else {
            SettlementOutcome::declined()
        }
    }
}

// =============================================================================
// Deterministic Gateways
// =============================================================================

/// Approves everything immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysApprove;

#[async_trait]
impl PaymentGateway for AlwaysApprove {
    async fn confirm(&self, _payment: &PaymentRecord) -> SettlementOutcome {
        SettlementOutcome::approved()
    }
}

/// Declines everything immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysDecline;

#[async_trait]
impl PaymentGateway for AlwaysDecline {
    async fn confirm(&self, _payment: &PaymentRecord) -> SettlementOutcome {
        SettlementOutcome::declined()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tally_core::{PaymentMethod, PaymentStatus};

    fn record() -> PaymentRecord {
        let now = Utc::now();
        PaymentRecord {
            id: 1,
            order_id: 10,
            customer_id: None,
            processed_by: 1,
            amount_cents: 1000,
            method: PaymentMethod::Card,
            status: PaymentStatus::Processing,
            transaction_reference: "TXN-1-ABCDEF01".to_string(),
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
        }
    }

    #[tokio::test]
    async fn test_simulated_extremes_are_deterministic() {
        let payment = record();

        let always = SimulatedGateway::new(Duration::ZERO, 1.0);
        assert_eq!(always.confirm(&payment).await, SettlementOutcome::approved());

        let never = SimulatedGateway::new(Duration::ZERO, 0.0);
        assert_eq!(never.confirm(&payment).await, SettlementOutcome::declined());
    }

    #[test]
    fn test_success_rate_is_clamped() {
        assert_eq!(SimulatedGateway::new(Duration::ZERO, 3.0).success_rate(), 1.0);
        assert_eq!(SimulatedGateway::new(Duration::ZERO, -1.0).success_rate(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_delay_is_honored() {
        let gateway = SimulatedGateway::new(Duration::from_secs(2), 1.0);
        let start = tokio::time::Instant::now();
        gateway.confirm(&record()).await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_fixed_gateways() {
        let payment = record();
        assert_eq!(
            AlwaysApprove.confirm(&payment).await.status(),
            PaymentStatus::Completed
        );
        assert_eq!(
            AlwaysDecline.confirm(&payment).await.status(),
            PaymentStatus::Failed
        );
    }
}
