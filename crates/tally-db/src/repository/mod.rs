//! # Repository Module
//!
//! Database repository implementations for Tally.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  Orchestrator / settlement worker                                      │
//! │       │                                                                 │
//! │       │  db.payments().refund(id, amount, "customer return")           │
//! │       ▼                                                                 │
//! │  PaymentRepository                                                     │
//! │  ├── load current row                                                  │
//! │  ├── ask tally-core for the transition (pure, may refuse)              │
//! │  └── write it back atomically                                          │
//! │       │                                                                 │
//! │       │  SQL                                                            │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Business rules live in tally-core; repositories own atomicity.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`PaymentRepository`](payment::PaymentRepository) - Payment lifecycle, queries, totals
//! - [`InventoryRepository`](inventory::InventoryRepository) - Stock ledger and projection
//! - [`PromotionRepository`](promotion::PromotionRepository) - Promotion CRUD and discounts

pub mod inventory;
pub mod payment;
pub mod promotion;
