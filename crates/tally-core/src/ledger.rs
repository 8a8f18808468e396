//! # Inventory Ledger Arithmetic
//!
//! Pure planning for stock movements. The database layer reads the current
//! stock inside a write transaction, hands it to a planner here, and appends
//! whatever comes back. Nothing in this module touches storage.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  One ledger write (single transaction)                  │
//! │                                                                         │
//! │  tally-db: lock stock_levels row, read current_stock                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  plan_movement / plan_adjust / plan_raw   ◄── THIS MODULE               │
//! │  ├── reason present?                                                   │
//! │  ├── delta sign matches change type?                                   │
//! │  ├── previous + delta ≥ 0?   else InsufficientStock                    │
//! │  └── PlannedInventoryEvent { previous, delta, new }                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  tally-db: INSERT event, UPDATE stock_levels, COMMIT                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Events are never corrected in place. A mistake is fixed by a new ADJUST or
//! AUDIT_ADJUSTMENT event.

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::{
    InventoryChangeEvent, InventoryChangeType, NewInventoryEvent, PlannedInventoryEvent,
    StockDirection,
};
use crate::validation::{validate_quantity, validate_reason, validate_stock_target};

// =============================================================================
// Stock Movement
// =============================================================================

/// A requested change to one product's stock, before the current level is
/// known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockMovement {
    pub product_id: i64,
    pub actor_id: i64,
    pub change_type: InventoryChangeType,
    /// Signed delta.
    pub quantity_delta: i64,
    pub reason: String,
    pub notes: Option<String>,
    pub reference_id: Option<String>,
    pub is_system_generated: bool,
}

impl StockMovement {
    /// A typed movement of `quantity` units. The sign is taken from the
    /// change type, so `quantity` must be positive unless the type is ADJUST
    /// or AUDIT_ADJUSTMENT, in which case it is used as-is.
    pub fn new(
        product_id: i64,
        change_type: InventoryChangeType,
        quantity: i64,
        actor_id: i64,
        reason: impl Into<String>,
    ) -> Self {
        let quantity_delta = match change_type.direction() {
            StockDirection::Increase => quantity,
            // i64::MIN saturates to a positive delta, which planning rejects
            StockDirection::Decrease => quantity.saturating_neg(),
            StockDirection::Either => quantity,
        };
        StockMovement {
            product_id,
            actor_id,
            change_type,
            quantity_delta,
            reason: reason.into(),
            notes: None,
            reference_id: None,
            is_system_generated: false,
        }
    }

    /// `addStock`: an ADD of `quantity` units.
    pub fn add(product_id: i64, quantity: i64, actor_id: i64, reason: impl Into<String>) -> Self {
        Self::new(product_id, InventoryChangeType::Add, quantity, actor_id, reason)
    }

    /// `removeStock`: a REMOVE of `quantity` units.
    pub fn remove(product_id: i64, quantity: i64, actor_id: i64, reason: impl Into<String>) -> Self {
        Self::new(product_id, InventoryChangeType::Remove, quantity, actor_id, reason)
    }

    pub fn with_reference(mut self, reference_id: Option<&str>) -> Self {
        self.reference_id = reference_id.map(str::to_string);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn system_generated(mut self) -> Self {
        self.is_system_generated = true;
        self
    }
}

// =============================================================================
// Planners
// =============================================================================

/// Plans a movement against `current_stock`.
///
/// ## Errors
/// - `Validation` if the reason is blank, the magnitude is zero for an
///   add/remove style type, or the delta points the wrong way
/// - `Validation` (`OutOfRange`) if the result does not fit in an `i64`
/// - `InsufficientStock` if the result would be negative
///
/// ```rust
/// use tally_core::ledger::{plan_movement, StockMovement};
///
/// let event = plan_movement(0, StockMovement::add(7, 50, 1, "restock")).unwrap();
/// assert_eq!((event.previous_stock, event.new_stock), (0, 50));
///
/// let err = plan_movement(50, StockMovement::remove(7, 60, 1, "sale")).unwrap_err();
/// assert!(err.to_string().contains("available 50"));
/// ```
pub fn plan_movement(
    current_stock: i64,
    movement: StockMovement,
) -> CoreResult<PlannedInventoryEvent> {
    validate_reason(&movement.reason)?;

    let delta = movement.quantity_delta;
    if movement.change_type.direction() != StockDirection::Either {
        validate_quantity(delta.saturating_abs())?;
    }
    if !movement.change_type.accepts_delta(delta) {
        return Err(ValidationError::SignMismatch {
            change_type: movement.change_type,
            delta,
        }
        .into());
    }

    let new_stock = current_stock
        .checked_add(delta)
        .ok_or_else(|| ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: current_stock.saturating_neg(),
            max: i64::MAX - current_stock.max(0),
        })?;
    if new_stock < 0 {
        return Err(CoreError::InsufficientStock {
            product_id: movement.product_id,
            available: current_stock,
            requested: delta.saturating_neg(),
        });
    }

    Ok(PlannedInventoryEvent {
        product_id: movement.product_id,
        actor_id: movement.actor_id,
        change_type: movement.change_type,
        quantity_delta: delta,
        previous_stock: current_stock,
        new_stock,
        reason: movement.reason.trim().to_string(),
        notes: movement.notes,
        reference_id: movement.reference_id,
        is_system_generated: movement.is_system_generated,
    })
}

/// Plans `adjustStock`: set the level to `new_quantity`, recording whatever
/// delta that takes. A zero delta is a valid audit entry.
pub fn plan_adjust(
    current_stock: i64,
    product_id: i64,
    new_quantity: i64,
    actor_id: i64,
    reason: &str,
) -> CoreResult<PlannedInventoryEvent> {
    validate_stock_target(new_quantity)?;
    let movement = StockMovement::new(
        product_id,
        InventoryChangeType::Adjust,
        new_quantity - current_stock,
        actor_id,
        reason,
    );
    plan_movement(current_stock, movement)
}

/// Plans `logRaw`.
///
/// Required: productId, actorId, changeType, quantity, reason. If the caller
/// sent `previousStock`/`newStock` they must agree with the ledger.
pub fn plan_raw(current_stock: i64, raw: &NewInventoryEvent) -> CoreResult<PlannedInventoryEvent> {
    let product_id = raw
        .product_id
        .ok_or_else(|| ValidationError::required("productId"))?;
    let actor_id = raw
        .actor_id
        .ok_or_else(|| ValidationError::required("actorId"))?;
    let change_type = raw
        .change_type
        .ok_or_else(|| ValidationError::required("changeType"))?;
    let quantity = raw
        .quantity
        .ok_or_else(|| ValidationError::required("quantity"))?;
    let reason = raw
        .reason
        .as_deref()
        .ok_or_else(|| ValidationError::required("reason"))?;

    if let Some(previous) = raw.previous_stock {
        if previous != current_stock {
            return Err(ValidationError::StockMismatch {
                field: "previousStock".to_string(),
                expected: current_stock,
                actual: previous,
            }
            .into());
        }
    }

    let movement = StockMovement {
        product_id,
        actor_id,
        change_type,
        quantity_delta: quantity,
        reason: reason.to_string(),
        notes: raw.notes.clone(),
        reference_id: raw.reference_id.clone(),
        is_system_generated: raw.is_system_generated,
    };
    let planned = plan_movement(current_stock, movement)?;

    if let Some(new_stock) = raw.new_stock {
        if new_stock != planned.new_stock {
            return Err(ValidationError::StockMismatch {
                field: "newStock".to_string(),
                expected: planned.new_stock,
                actual: new_stock,
            }
            .into());
        }
    }

    Ok(planned)
}

// =============================================================================
// Replay
// =============================================================================

/// Result of replaying one product's events in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replay {
    /// Σ quantity_delta from a zero baseline.
    pub stock: i64,
    pub event_count: usize,
    /// First event whose snapshot does not chain from its predecessor.
    pub first_break: Option<i64>,
}

impl Replay {
    pub fn is_consistent(&self) -> bool {
        self.first_break.is_none()
    }
}

/// Replays events (oldest first) and checks that every
/// `new = previous + delta` and every `previous` equals the prior `new`.
pub fn replay(events: &[InventoryChangeEvent]) -> Replay {
    let mut stock = 0i64;
    let mut first_break = None;

    for event in events {
        let chained = event.previous_stock == stock
            && event.previous_stock.checked_add(event.quantity_delta) == Some(event.new_stock);
        if !chained && first_break.is_none() {
            first_break = Some(event.id);
        }
        stock = stock.saturating_add(event.quantity_delta);
    }

    Replay {
        stock,
        event_count: events.len(),
        first_break,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::Utc;

    #[test]
    fn test_add_then_oversized_remove() {
        let added = plan_movement(0, StockMovement::add(1, 50, 9, "restock")).unwrap();
        assert_eq!(added.previous_stock, 0);
        assert_eq!(added.new_stock, 50);
        assert_eq!(added.change_type, InventoryChangeType::Add);

        let err = plan_movement(added.new_stock, StockMovement::remove(1, 60, 9, "sale")).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientStock {
                product_id: 1,
                available: 50,
                requested: 60
            }
        ));
    }

    #[test]
    fn test_remove_is_negative_delta() {
        let removed = plan_movement(50, StockMovement::remove(1, 20, 9, "sale")).unwrap();
        assert_eq!(removed.quantity_delta, -20);
        assert_eq!(removed.new_stock, 30);
        assert_eq!(removed.change_type, InventoryChangeType::Remove);
    }

    #[test]
    fn test_remove_exact_stock_reaches_zero() {
        let removed = plan_movement(5, StockMovement::remove(1, 5, 9, "clearance")).unwrap();
        assert_eq!(removed.new_stock, 0);
    }

    #[test]
    fn test_zero_and_negative_quantities_rejected() {
        for qty in [0, -3] {
            let err = plan_movement(10, StockMovement::add(1, qty, 9, "x")).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
            let err = plan_movement(10, StockMovement::remove(1, qty, 9, "x")).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
    }

    #[test]
    fn test_extreme_quantities_are_validation_errors() {
        let err = plan_movement(1, StockMovement::add(7, i64::MAX, 1, "restock")).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::OutOfRange { .. })
        ));

        let err = plan_movement(5, StockMovement::remove(7, i64::MIN, 1, "sale")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = plan_movement(5, StockMovement::add(7, i64::MIN, 1, "restock")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        // Fits exactly
        let full = plan_movement(1, StockMovement::add(7, i64::MAX - 1, 1, "restock")).unwrap();
        assert_eq!(full.new_stock, i64::MAX);
    }

    #[test]
    fn test_blank_reason_rejected() {
        let err = plan_movement(0, StockMovement::add(1, 5, 9, "  ")).unwrap_err();
        assert_eq!(err.to_string(), "Validation error: reason is required");
    }

    #[test]
    fn test_adjust_any_direction() {
        let up = plan_adjust(10, 1, 25, 9, "recount").unwrap();
        assert_eq!((up.quantity_delta, up.new_stock), (15, 25));

        let down = plan_adjust(10, 1, 4, 9, "recount").unwrap();
        assert_eq!((down.quantity_delta, down.new_stock), (-6, 4));

        let same = plan_adjust(10, 1, 10, 9, "recount").unwrap();
        assert_eq!((same.quantity_delta, same.new_stock), (0, 10));
        assert_eq!(same.change_type, InventoryChangeType::Adjust);
    }

    #[test]
    fn test_adjust_rejects_negative_target() {
        let err = plan_adjust(10, 1, -1, 9, "recount").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_typed_movement_signs() {
        let damage = plan_movement(
            10,
            StockMovement::new(1, InventoryChangeType::Damage, 2, 9, "dropped"),
        )
        .unwrap();
        assert_eq!(damage.quantity_delta, -2);

        let transfer = plan_movement(
            10,
            StockMovement::new(1, InventoryChangeType::TransferIn, 3, 9, "from store 2"),
        )
        .unwrap();
        assert_eq!(transfer.quantity_delta, 3);
    }

    fn raw(change_type: InventoryChangeType, quantity: i64) -> NewInventoryEvent {
        NewInventoryEvent {
            product_id: Some(1),
            actor_id: Some(9),
            change_type: Some(change_type),
            quantity: Some(quantity),
            reason: Some("manual".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_raw_requires_fields() {
        let cases = [
            (NewInventoryEvent { product_id: None, ..raw(InventoryChangeType::Add, 1) }, "productId"),
            (NewInventoryEvent { actor_id: None, ..raw(InventoryChangeType::Add, 1) }, "actorId"),
            (NewInventoryEvent { change_type: None, ..raw(InventoryChangeType::Add, 1) }, "changeType"),
            (NewInventoryEvent { quantity: None, ..raw(InventoryChangeType::Add, 1) }, "quantity"),
            (NewInventoryEvent { reason: None, ..raw(InventoryChangeType::Add, 1) }, "reason"),
        ];
        for (event, field) in cases {
            let err = plan_raw(0, &event).unwrap_err();
            assert!(err.to_string().contains(field), "expected {field} in {err}");
        }
    }

    #[test]
    fn test_raw_sign_rules() {
        assert!(plan_raw(10, &raw(InventoryChangeType::Sale, -2)).is_ok());
        let err = plan_raw(10, &raw(InventoryChangeType::Sale, 2)).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::SignMismatch { .. })
        ));
        assert!(plan_raw(10, &raw(InventoryChangeType::AuditAdjustment, -10)).is_ok());
        let err = plan_raw(10, &raw(InventoryChangeType::AuditAdjustment, -11)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
    }

    #[test]
    fn test_raw_snapshot_must_match_ledger() {
        let mut event = raw(InventoryChangeType::Add, 5);
        event.previous_stock = Some(10);
        event.new_stock = Some(15);
        assert!(plan_raw(10, &event).is_ok());

        // Caller believed stock was 100 (the old hardcoded placeholder)
        event.previous_stock = Some(100);
        assert!(plan_raw(10, &event).is_err());

        event.previous_stock = None;
        event.new_stock = Some(16);
        assert!(plan_raw(10, &event).is_err());
    }

    fn stored(id: i64, planned: &PlannedInventoryEvent) -> InventoryChangeEvent {
        InventoryChangeEvent {
            id,
            product_id: planned.product_id,
            actor_id: planned.actor_id,
            change_type: planned.change_type,
            quantity_delta: planned.quantity_delta,
            previous_stock: planned.previous_stock,
            new_stock: planned.new_stock,
            reason: planned.reason.clone(),
            notes: None,
            reference_id: None,
            is_system_generated: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_replay_matches_running_stock() {
        let mut stock = 0;
        let mut events = Vec::new();
        let movements = [
            StockMovement::add(1, 50, 9, "restock"),
            StockMovement::remove(1, 20, 9, "sale"),
            StockMovement::new(1, InventoryChangeType::SaleReturn, 2, 9, "return"),
        ];
        for (i, m) in movements.into_iter().enumerate() {
            let planned = plan_movement(stock, m).unwrap();
            stock = planned.new_stock;
            events.push(stored(i as i64 + 1, &planned));
        }
        let adjust = plan_adjust(stock, 1, 40, 9, "recount").unwrap();
        events.push(stored(4, &adjust));

        let replayed = replay(&events);
        assert_eq!(replayed.stock, 40);
        assert_eq!(replayed.event_count, 4);
        assert!(replayed.is_consistent());
    }

    #[test]
    fn test_replay_detects_broken_chain() {
        let first = plan_movement(0, StockMovement::add(1, 10, 9, "restock")).unwrap();
        let mut second = plan_movement(10, StockMovement::add(1, 5, 9, "restock")).unwrap();
        second.previous_stock = 100;
        second.new_stock = 105;
        let replayed = replay(&[stored(1, &first), stored(2, &second)]);
        assert_eq!(replayed.first_break, Some(2));
    }
}
