//! # Settlement Worker
//!
//! Drives PROCESSING payments to COMPLETED or FAILED.
//!
//! ## Settlement Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Settlement Worker Flow                            │
//! │                                                                         │
//! │  SettlementHandle                                                      │
//! │    submit(id) ───────────┐                                             │
//! │    create_and_submit() ──┤     ┌──────────────────────────────────┐    │
//! │    retry(id) ────────────┼───► │  job queue (mpsc, bounded)       │    │
//! │                          │     └────────────────┬─────────────────┘    │
//! │  recovery tick ──────────┘                      │                      │
//! │  (payments still PROCESSING,                    ▼                      │
//! │   e.g. after a crash)           ┌──────────────────────────────────┐   │
//! │                                 │ 1. Load: skip unless PROCESSING  │   │
//! │                                 │ 2. Confirm: gateway.confirm()    │   │
//! │                                 │ 3. Commit: payments().settle()   │   │
//! │                                 │    ├─ transient error → backoff  │   │
//! │                                 │    └─ invalid transition → drop  │   │
//! │                                 └──────────────────────────────────┘   │
//! │                                                                         │
//! │  A payment cancelled while its gateway call is in flight stays         │
//! │  CANCELLED: settle rejects the late outcome and the worker drops it.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use tally_core::{PaymentDraft, PaymentRecord, PaymentStatus, SettlementOutcome};
use tally_db::{Database, DbError};

use crate::config::SettlementConfig;
use crate::error::{SettleError, SettleResult};
use crate::gateway::PaymentGateway;

// =============================================================================
// Constants
// =============================================================================

/// How often `wait_for_outcome` re-reads the payment.
const OUTCOME_POLL_INTERVAL: Duration = Duration::from_millis(20);

// =============================================================================
// Settlement Worker
// =============================================================================

/// Background task that settles payments one at a time.
pub struct SettlementWorker {
    db: Database,

    config: Arc<SettlementConfig>,

    gateway: Arc<dyn PaymentGateway>,

    /// Payment ids waiting for settlement.
    job_rx: mpsc::Receiver<i64>,

    /// Shutdown requests, each acknowledged once the loop has stopped.
    shutdown_rx: mpsc::Receiver<oneshot::Sender<()>>,
}

/// Handle for feeding and stopping the settlement worker.
#[derive(Clone)]
pub struct SettlementHandle {
    db: Database,
    job_tx: mpsc::Sender<i64>,
    shutdown_tx: mpsc::Sender<oneshot::Sender<()>>,
}

impl SettlementHandle {
    /// Queues a payment for settlement. Waits if the queue is full.
    pub async fn submit(&self, payment_id: i64) -> SettleResult<()> {
        self.job_tx
            .send(payment_id)
            .await
            .map_err(|_| SettleError::ChannelClosed("Settlement queue closed".into()))?;
        debug!(payment_id, "Payment queued for settlement");
        Ok(())
    }

    /// Creates a payment and queues it when it starts out PROCESSING.
    /// Held (PENDING) payments are returned without being queued.
    pub async fn create_and_submit(&self, draft: &PaymentDraft) -> SettleResult<PaymentRecord> {
        let payment = self.db.payments().create(draft).await?;
        if payment.status == PaymentStatus::Processing {
            self.submit(payment.id).await?;
        }
        Ok(payment)
    }

    /// Moves a FAILED payment back to PROCESSING and queues it again.
    pub async fn retry(&self, payment_id: i64) -> SettleResult<PaymentRecord> {
        let payment = self.db.payments().retry_failed(payment_id).await?;
        self.submit(payment_id).await?;
        Ok(payment)
    }

    /// Moves a held (PENDING) payment to PROCESSING and queues it.
    pub async fn release(&self, payment_id: i64) -> SettleResult<PaymentRecord> {
        let payment = self.db.payments().release(payment_id).await?;
        self.submit(payment_id).await?;
        Ok(payment)
    }

    /// Stops the worker after the job in progress, if any, and waits for
    /// it to stop.
    pub async fn shutdown(&self) -> SettleResult<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.shutdown_tx
            .send(ack_tx)
            .await
            .map_err(|_| SettleError::ChannelClosed("Shutdown channel closed".into()))?;
        ack_rx
            .await
            .map_err(|_| SettleError::ChannelClosed("Worker stopped without acknowledging".into()))
    }
}

impl SettlementWorker {
    /// Creates a worker and its handle. Call [`run`](Self::run) to start it.
    pub fn new(
        db: Database,
        config: Arc<SettlementConfig>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> (Self, SettlementHandle) {
        let (job_tx, job_rx) = mpsc::channel(config.settlement.queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let handle = SettlementHandle {
            db: db.clone(),
            job_tx,
            shutdown_tx,
        };

        let worker = SettlementWorker {
            db,
            config,
            gateway,
            job_rx,
            shutdown_rx,
        };

        (worker, handle)
    }

    /// Creates a worker and runs it on the current Tokio runtime.
    pub fn spawn(
        db: Database,
        config: Arc<SettlementConfig>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> SettlementHandle {
        let (worker, handle) = Self::new(db, config, gateway);
        tokio::spawn(worker.run());
        handle
    }

    /// Runs the worker loop.
    ///
    /// The first recovery scan happens immediately, so payments left in
    /// PROCESSING by a previous run are settled on startup.
    pub async fn run(mut self) {
        info!("Settlement worker starting");

        let mut interval = tokio::time::interval(self.config.recovery_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let ack = loop {
            tokio::select! {
                // Recovery scan
                _ = interval.tick() => {
                    if let Err(e) = self.recover().await {
                        error!(?e, "Failed to scan for processing payments");
                    }
                }

                // Queued jobs
                Some(payment_id) = self.job_rx.recv() => {
                    if let Err(e) = self.settle_payment(payment_id).await {
                        error!(?e, payment_id, "Failed to settle payment");
                    }
                }

                // Shutdown (or every handle dropped)
                request = self.shutdown_rx.recv() => {
                    info!("Settlement worker shutting down");
                    break request;
                }
            }
        };

        self.job_rx.close();
        info!("Settlement worker stopped");

        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }

    /// Settles every payment currently in PROCESSING.
    async fn recover(&self) -> SettleResult<()> {
        let stuck = self.db.payments().list_processing().await?;

        if stuck.is_empty() {
            debug!("No payments awaiting settlement");
            return Ok(());
        }

        info!(count = stuck.len(), "Recovering payments left in processing");

        for payment in stuck {
            if let Err(e) = self.settle_payment(payment.id).await {
                error!(?e, payment_id = payment.id, "Recovery settlement failed");
            }
        }

        Ok(())
    }

    /// Asks the gateway for an outcome and commits it.
    async fn settle_payment(&self, payment_id: i64) -> SettleResult<()> {
        let payment = match self.db.payments().get_by_id(payment_id).await? {
            Some(p) => p,
            None => {
                warn!(payment_id, "Settlement requested for unknown payment");
                return Ok(());
            }
        };

        if payment.status != PaymentStatus::Processing {
            debug!(payment_id, status = %payment.status, "Payment not processing, skipping");
            return Ok(());
        }

        let outcome = self.gateway.confirm(&payment).await;
        self.commit(payment_id, &outcome).await
    }

    /// Commits `outcome`, backing off while the database is busy.
    async fn commit(&self, payment_id: i64, outcome: &SettlementOutcome) -> SettleResult<()> {
        let mut backoff = self.create_backoff();
        let mut retries = 0;

        loop {
            match self.db.payments().settle(payment_id, outcome).await {
                Ok(payment) => {
                    debug!(
                        payment_id,
                        status = %payment.status,
                        retries, "Settlement committed"
                    );
                    return Ok(());
                }
                Err(e) if e.is_invalid_transition() => {
                    warn!(
                        payment_id,
                        outcome = %outcome.status(),
                        error = %e,
                        "Dropping outcome for payment that left processing"
                    );
                    return Ok(());
                }
                Err(e) if e.is_transient() && retries < self.config.settlement.commit_max_retries => {
                    retries += 1;
                    let wait = backoff
                        .next_backoff()
                        .unwrap_or_else(|| self.config.commit_max_backoff());
                    warn!(
                        payment_id,
                        retries,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "Settlement commit failed, backing off"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.commit_initial_backoff(),
            max_interval: self.config.commit_max_backoff(),
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

// =============================================================================
// Waiting for an Outcome
// =============================================================================

/// Polls until the payment leaves PROCESSING and returns it.
///
/// A held (PENDING) payment is returned at once; it only settles after
/// [`SettlementHandle::release`].
///
/// Fails with [`SettleError::Timeout`] if it is still PROCESSING after
/// `timeout`.
pub async fn wait_for_outcome(
    db: &Database,
    payment_id: i64,
    timeout: Duration,
) -> SettleResult<PaymentRecord> {
    let poll = async {
        loop {
            let payment = db
                .payments()
                .get_by_id(payment_id)
                .await?
                .ok_or_else(|| DbError::not_found("Payment", payment_id))?;

            if payment.status != PaymentStatus::Processing {
                return Ok::<_, SettleError>(payment);
            }

            tokio::time::sleep(OUTCOME_POLL_INTERVAL).await;
        }
    };

    match tokio::time::timeout(timeout, poll).await {
        Ok(result) => result,
        Err(_) => Err(SettleError::Timeout {
            payment_id,
            waited_ms: timeout.as_millis() as u64,
        }),
    }
}

// =============================================================================
// Tests
// =============================================================================
