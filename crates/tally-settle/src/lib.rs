//! # tally-settle: Settlement Worker for Tally
//!
//! Moves PROCESSING payments to their terminal outcome in the background,
//! so checkout never blocks on a payment provider.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Settlement Architecture                           │
//! │                                                                         │
//! │  checkout ── create_and_submit(draft) ──┐                              │
//! │                                         ▼                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                    SettlementWorker (tokio task)                  │  │
//! │  │                                                                  │  │
//! │  │   job queue ──► PaymentGateway::confirm ──► payments().settle    │  │
//! │  │   recovery tick (PROCESSING left over from a previous run)       │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                         │                               │
//! │                                         ▼                               │
//! │  caller ◄── wait_for_outcome(db, id, timeout) ── COMPLETED | FAILED    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`config`] - Settlement configuration (TOML + environment)
//! - [`error`] - Settlement error types
//! - [`gateway`] - Gateway trait, simulated and deterministic gateways
//! - [`worker`] - The worker loop and its handle
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tally_settle::{SettlementConfig, SettlementWorker, SimulatedGateway};
//!
//! let config = SettlementConfig::load_or_default(None);
//! let gateway = SimulatedGateway::new(config.simulated_delay(), config.settlement.success_rate);
//! let handle = SettlementWorker::spawn(db.clone(), Arc::new(config), Arc::new(gateway));
//!
//! let payment = handle.create_and_submit(&draft).await?;
//! let settled = tally_settle::wait_for_outcome(&db, payment.id, Duration::from_secs(5)).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod gateway;
pub mod worker;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{DatabaseSettings, SettlementConfig, SettlementSettings};
pub use error::{SettleError, SettleResult};
pub use gateway::{AlwaysApprove, AlwaysDecline, PaymentGateway, SimulatedGateway};
pub use worker::{wait_for_outcome, SettlementHandle, SettlementWorker};
