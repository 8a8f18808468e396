//! # Inventory Ledger Repository
//!
//! Append-only stock ledger plus the `stock_levels` projection it drives.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 One Ledger Write = One Transaction                      │
//! │                                                                         │
//! │  BEGIN                                                                 │
//! │    │                                                                    │
//! │    ▼                                                                    │
//! │  UPSERT stock_levels(product) RETURNING current_stock                  │
//! │    │   (first statement is a write: takes the SQLite write lock, so    │
//! │    │    a concurrent writer waits here and later sees our result)      │
//! │    ▼                                                                    │
//! │  tally_core::ledger::plan_*(current_stock, request)                    │
//! │    │   Err ──► ROLLBACK, nothing written                               │
//! │    ▼                                                                    │
//! │  INSERT inventory_events ... RETURNING *                               │
//! │    ▼                                                                    │
//! │  UPDATE stock_levels SET current_stock = new_stock                     │
//! │    ▼                                                                    │
//! │  COMMIT                                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Events are never updated or deleted (the schema enforces it with
//! triggers). Corrections are new ADJUST or AUDIT_ADJUSTMENT events.
//!
//! ## Baseline
//! A product with no events has stock 0. `replayed_stock` recomputes the
//! level from the events alone and must always agree with `current_stock`.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info, warn};

use tally_core::ledger::{self, Replay, StockMovement};
use tally_core::validation::{validate_limit, validate_search_term};
use tally_core::{
    ChangeTypeSummary, CoreResult, InventoryChangeEvent, InventoryChangeType, NewInventoryEvent,
    PlannedInventoryEvent, ProductQuantityTotal, ValidationError, DEFAULT_RECENT_LIMIT,
};

use crate::error::{DbError, DbResult};

const EVENT_COLUMNS: &str = "id, product_id, actor_id, change_type, quantity_delta, \
     previous_stock, new_stock, reason, notes, reference_id, is_system_generated, created_at";

fn select_events(filter: &str) -> String {
    format!("SELECT {} FROM inventory_events {}", EVENT_COLUMNS, filter)
}

/// Repository for the inventory ledger.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.inventory();
///
/// repo.add_stock(7, 50, actor, "restock", None).await?;
/// let err = repo.remove_stock(7, 60, actor, "sale", None).await.unwrap_err();
/// assert!(err.is_insufficient_stock());
/// assert_eq!(repo.current_stock(7).await?, 50);
/// ```
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    /// Creates a new InventoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// `addStock`: an ADD event of `quantity` (> 0) units.
    pub async fn add_stock(
        &self,
        product_id: i64,
        quantity: i64,
        actor_id: i64,
        reason: &str,
        reference_id: Option<&str>,
    ) -> DbResult<InventoryChangeEvent> {
        let movement =
            StockMovement::add(product_id, quantity, actor_id, reason).with_reference(reference_id);
        self.record(movement).await
    }

    /// `removeStock`: a REMOVE event of `quantity` (> 0) units.
    ///
    /// Fails with `InsufficientStock`, writing nothing, when `quantity`
    /// exceeds the current level.
    pub async fn remove_stock(
        &self,
        product_id: i64,
        quantity: i64,
        actor_id: i64,
        reason: &str,
        reference_id: Option<&str>,
    ) -> DbResult<InventoryChangeEvent> {
        let movement = StockMovement::remove(product_id, quantity, actor_id, reason)
            .with_reference(reference_id);
        self.record(movement).await
    }

    /// `adjustStock`: sets the level to `new_quantity` (≥ 0) with an ADJUST
    /// event carrying whatever delta that takes, zero included.
    pub async fn adjust_stock(
        &self,
        product_id: i64,
        new_quantity: i64,
        actor_id: i64,
        reason: &str,
    ) -> DbResult<InventoryChangeEvent> {
        self.append(product_id, |current| {
            ledger::plan_adjust(current, product_id, new_quantity, actor_id, reason)
        })
        .await
    }

    /// `logRaw`: appends a caller-built event after checking every required
    /// field and, when supplied, the caller's stock snapshot.
    pub async fn log_raw(&self, raw: &NewInventoryEvent) -> DbResult<InventoryChangeEvent> {
        let product_id = raw
            .product_id
            .ok_or_else(|| ValidationError::required("productId"))?;
        self.append(product_id, |current| ledger::plan_raw(current, raw))
            .await
    }

    /// A system-generated SALE event for a settled order.
    pub async fn record_sale(
        &self,
        product_id: i64,
        quantity: i64,
        actor_id: i64,
        order_reference: &str,
    ) -> DbResult<InventoryChangeEvent> {
        let movement = StockMovement::new(
            product_id,
            InventoryChangeType::Sale,
            quantity,
            actor_id,
            format!("Sale for order {}", order_reference),
        )
        .with_reference(Some(order_reference))
        .system_generated();
        self.record(movement).await
    }

    /// Appends any typed movement (DAMAGE, TRANSFER_IN, ...).
    pub async fn record(&self, movement: StockMovement) -> DbResult<InventoryChangeEvent> {
        let product_id = movement.product_id;
        self.append(product_id, move |current| {
            ledger::plan_movement(current, movement)
        })
        .await
    }

    /// The shared atomic unit behind every write.
    async fn append<F>(&self, product_id: i64, plan: F) -> DbResult<InventoryChangeEvent>
    where
        F: FnOnce(i64) -> CoreResult<PlannedInventoryEvent>,
    {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let current: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO stock_levels (product_id, current_stock, updated_at)
            VALUES (?1, 0, ?2)
            ON CONFLICT (product_id) DO UPDATE SET updated_at = stock_levels.updated_at
            RETURNING current_stock
            "#,
        )
        .bind(product_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let planned = match plan(current) {
            Ok(planned) => planned,
            Err(err) => {
                tx.rollback().await?;
                warn!(product_id, current_stock = current, error = %err, "Ledger write rejected");
                return Err(err.into());
            }
        };

        let sql = format!(
            r#"
            INSERT INTO inventory_events (
                product_id, actor_id, change_type, quantity_delta,
                previous_stock, new_stock, reason, notes,
                reference_id, is_system_generated, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            RETURNING {}
            "#,
            EVENT_COLUMNS
        );
        let event = sqlx::query_as::<_, InventoryChangeEvent>(&sql)
            .bind(planned.product_id)
            .bind(planned.actor_id)
            .bind(planned.change_type)
            .bind(planned.quantity_delta)
            .bind(planned.previous_stock)
            .bind(planned.new_stock)
            .bind(&planned.reason)
            .bind(&planned.notes)
            .bind(&planned.reference_id)
            .bind(planned.is_system_generated)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            UPDATE stock_levels SET
                current_stock = ?2,
                last_event_id = ?3,
                updated_at = ?4
            WHERE product_id = ?1
            "#,
        )
        .bind(product_id)
        .bind(event.new_stock)
        .bind(event.id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(
            event_id = event.id,
            product_id,
            change_type = %event.change_type,
            delta = event.quantity_delta,
            new_stock = event.new_stock,
            "Stock movement recorded"
        );

        Ok(event)
    }

    // =========================================================================
    // Current Stock
    // =========================================================================

    /// Current level from the projection. 0 for a product never seen.
    pub async fn current_stock(&self, product_id: i64) -> DbResult<i64> {
        let stock: Option<i64> =
            sqlx::query_scalar("SELECT current_stock FROM stock_levels WHERE product_id = ?1")
                .bind(product_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(stock.unwrap_or(0))
    }

    /// Σ quantity_delta over all of the product's events.
    pub async fn replayed_stock(&self, product_id: i64) -> DbResult<i64> {
        let stock: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity_delta), 0) FROM inventory_events WHERE product_id = ?1",
        )
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(stock)
    }

    /// Replays the product's events and compares the result against the
    /// projection. Returns the replay; logs a warning on any disagreement.
    pub async fn verify_product(&self, product_id: i64) -> DbResult<Replay> {
        let events = self.history(product_id).await?;
        let replay = ledger::replay(&events);
        let projected = self.current_stock(product_id).await?;

        if !replay.is_consistent() || replay.stock != projected {
            warn!(
                product_id,
                replayed = replay.stock,
                projected,
                first_break = ?replay.first_break,
                "Stock ledger does not match projection"
            );
        }

        Ok(replay)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Gets one event by id.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<InventoryChangeEvent>> {
        let event = sqlx::query_as::<_, InventoryChangeEvent>(&select_events("WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(event)
    }

    /// All events for a product, oldest first.
    pub async fn history(&self, product_id: i64) -> DbResult<Vec<InventoryChangeEvent>> {
        debug!(product_id, "Loading product history");
        let events = sqlx::query_as::<_, InventoryChangeEvent>(&select_events(
            "WHERE product_id = ?1 ORDER BY id",
        ))
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    /// Events caused by one actor, oldest first.
    pub async fn by_actor(&self, actor_id: i64) -> DbResult<Vec<InventoryChangeEvent>> {
        let events = sqlx::query_as::<_, InventoryChangeEvent>(&select_events(
            "WHERE actor_id = ?1 ORDER BY id",
        ))
        .bind(actor_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    pub async fn by_change_type(
        &self,
        change_type: InventoryChangeType,
    ) -> DbResult<Vec<InventoryChangeEvent>> {
        self.by_change_types(&[change_type]).await
    }

    /// Events whose type is any of `change_types`. Empty input, empty output.
    pub async fn by_change_types(
        &self,
        change_types: &[InventoryChangeType],
    ) -> DbResult<Vec<InventoryChangeEvent>> {
        if change_types.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(select_events("WHERE change_type IN ("));
        let mut separated = query.separated(", ");
        for change_type in change_types {
            separated.push_bind(*change_type);
        }
        separated.push_unseparated(") ORDER BY id");

        let events = query
            .build_query_as::<InventoryChangeEvent>()
            .fetch_all(&self.pool)
            .await?;

        Ok(events)
    }

    /// Events with `from <= created_at <= to`.
    pub async fn by_date_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<InventoryChangeEvent>> {
        let events = sqlx::query_as::<_, InventoryChangeEvent>(&select_events(
            "WHERE created_at BETWEEN ?1 AND ?2 ORDER BY id",
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    pub async fn by_product_in_range(
        &self,
        product_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<InventoryChangeEvent>> {
        let events = sqlx::query_as::<_, InventoryChangeEvent>(&select_events(
            "WHERE product_id = ?1 AND created_at BETWEEN ?2 AND ?3 ORDER BY id",
        ))
        .bind(product_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    pub async fn by_actor_in_range(
        &self,
        actor_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<InventoryChangeEvent>> {
        let events = sqlx::query_as::<_, InventoryChangeEvent>(&select_events(
            "WHERE actor_id = ?1 AND created_at BETWEEN ?2 AND ?3 ORDER BY id",
        ))
        .bind(actor_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    pub async fn by_product_and_type(
        &self,
        product_id: i64,
        change_type: InventoryChangeType,
    ) -> DbResult<Vec<InventoryChangeEvent>> {
        let events = sqlx::query_as::<_, InventoryChangeEvent>(&select_events(
            "WHERE product_id = ?1 AND change_type = ?2 ORDER BY id",
        ))
        .bind(product_id)
        .bind(change_type)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    /// Events correlated with an external key (usually an order id).
    pub async fn by_reference(&self, reference_id: &str) -> DbResult<Vec<InventoryChangeEvent>> {
        let events = sqlx::query_as::<_, InventoryChangeEvent>(&select_events(
            "WHERE reference_id = ?1 ORDER BY id",
        ))
        .bind(reference_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    pub async fn by_system_generated(
        &self,
        is_system_generated: bool,
    ) -> DbResult<Vec<InventoryChangeEvent>> {
        let events = sqlx::query_as::<_, InventoryChangeEvent>(&select_events(
            "WHERE is_system_generated = ?1 ORDER BY id",
        ))
        .bind(is_system_generated)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    /// Events entered by people rather than the system.
    pub async fn manual_events(&self) -> DbResult<Vec<InventoryChangeEvent>> {
        self.by_system_generated(false).await
    }

    /// Case-insensitive substring search over `reason`.
    pub async fn search_reason(&self, term: &str) -> DbResult<Vec<InventoryChangeEvent>> {
        let term = validate_search_term(term)?;
        let events = sqlx::query_as::<_, InventoryChangeEvent>(&select_events(
            "WHERE instr(lower(reason), lower(?1)) > 0 ORDER BY id",
        ))
        .bind(term)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    /// The newest `limit` events, newest first. `None` means 50.
    pub async fn recent(&self, limit: Option<i64>) -> DbResult<Vec<InventoryChangeEvent>> {
        let limit = validate_limit(limit.unwrap_or(DEFAULT_RECENT_LIMIT))?;
        let events = sqlx::query_as::<_, InventoryChangeEvent>(&select_events(
            "ORDER BY id DESC LIMIT ?1",
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    // =========================================================================
    // Aggregates
    // =========================================================================

    /// Net quantity moved per product over `[from, to]`.
    pub async fn total_quantity_by_product(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<ProductQuantityTotal>> {
        let totals = sqlx::query_as::<_, ProductQuantityTotal>(
            r#"
            SELECT product_id, SUM(quantity_delta) AS total_quantity
            FROM inventory_events
            WHERE created_at BETWEEN ?1 AND ?2
            GROUP BY product_id
            ORDER BY product_id
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(totals)
    }

    /// Count and net quantity per change type over `[from, to]`.
    pub async fn activity_summary(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<ChangeTypeSummary>> {
        let summary = sqlx::query_as::<_, ChangeTypeSummary>(
            r#"
            SELECT change_type,
                   COUNT(*) AS event_count,
                   SUM(quantity_delta) AS total_quantity
            FROM inventory_events
            WHERE created_at BETWEEN ?1 AND ?2
            GROUP BY change_type
            ORDER BY change_type
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(summary)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
