//! # Promotion Repository
//!
//! CRUD for promotion definitions, plus `apply_promotion`, which feeds a
//! stored promotion to the pure discount engine.
//!
//! Promotions are management data: unlike payments and ledger events they
//! can be edited, toggled and deleted.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

use tally_core::promotion::compute_discount;
use tally_core::validation::{validate_new_promotion, validate_search_term};
use tally_core::{DiscountType, Money, NewPromotion, Promotion};

use crate::error::{DbError, DbResult};

const PROMOTION_COLUMNS: &str = "id, title, description, discount_type, discount_value, \
     start_date, end_date, is_active, created_at, updated_at";

fn select_promotions(filter: &str) -> String {
    format!("SELECT {} FROM promotions {}", PROMOTION_COLUMNS, filter)
}

/// Storage shape of a promotion; `discount_type` stays text so unknown
/// kinds survive a round trip.
#[derive(Debug, sqlx::FromRow)]
struct PromotionRow {
    id: i64,
    title: String,
    description: Option<String>,
    discount_type: String,
    discount_value: i64,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PromotionRow> for Promotion {
    fn from(row: PromotionRow) -> Self {
        Promotion {
            id: row.id,
            title: row.title,
            description: row.description,
            discount_type: DiscountType::from(row.discount_type),
            discount_value: row.discount_value,
            start_date: row.start_date,
            end_date: row.end_date,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Repository for promotion database operations.
#[derive(Debug, Clone)]
pub struct PromotionRepository {
    pool: SqlitePool,
}

impl PromotionRepository {
    /// Creates a new PromotionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PromotionRepository { pool }
    }

    pub async fn create(&self, promotion: &NewPromotion) -> DbResult<Promotion> {
        validate_new_promotion(promotion)?;
        let now = Utc::now();

        let sql = format!(
            r#"
            INSERT INTO promotions (
                title, description, discount_type, discount_value,
                start_date, end_date, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            RETURNING {}
            "#,
            PROMOTION_COLUMNS
        );

        let row = sqlx::query_as::<_, PromotionRow>(&sql)
            .bind(promotion.title.trim())
            .bind(&promotion.description)
            .bind(promotion.discount_type.as_str())
            .bind(promotion.discount_value)
            .bind(promotion.start_date)
            .bind(promotion.end_date)
            .bind(promotion.is_active)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        info!(promotion_id = row.id, title = %row.title, "Promotion created");
        Ok(row.into())
    }

    /// Replaces every editable field of an existing promotion.
    pub async fn update(&self, id: i64, promotion: &NewPromotion) -> DbResult<Promotion> {
        validate_new_promotion(promotion)?;

        let sql = format!(
            r#"
            UPDATE promotions SET
                title = ?2,
                description = ?3,
                discount_type = ?4,
                discount_value = ?5,
                start_date = ?6,
                end_date = ?7,
                is_active = ?8,
                updated_at = ?9
            WHERE id = ?1
            RETURNING {}
            "#,
            PROMOTION_COLUMNS
        );

        let row = sqlx::query_as::<_, PromotionRow>(&sql)
            .bind(id)
            .bind(promotion.title.trim())
            .bind(&promotion.description)
            .bind(promotion.discount_type.as_str())
            .bind(promotion.discount_value)
            .bind(promotion.start_date)
            .bind(promotion.end_date)
            .bind(promotion.is_active)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Promotion", id))?;

        info!(promotion_id = id, "Promotion updated");
        Ok(row.into())
    }

    /// Turns a promotion on or off without touching its window.
    pub async fn set_active(&self, id: i64, is_active: bool) -> DbResult<Promotion> {
        let sql = format!(
            "UPDATE promotions SET is_active = ?2, updated_at = ?3 WHERE id = ?1 RETURNING {}",
            PROMOTION_COLUMNS
        );

        let row = sqlx::query_as::<_, PromotionRow>(&sql)
            .bind(id)
            .bind(is_active)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Promotion", id))?;

        info!(promotion_id = id, is_active, "Promotion toggled");
        Ok(row.into())
    }

    pub async fn delete(&self, id: i64) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM promotions WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Promotion", id));
        }

        info!(promotion_id = id, "Promotion deleted");
        Ok(())
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Promotion>> {
        let row = sqlx::query_as::<_, PromotionRow>(&select_promotions("WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Promotion::from))
    }

    pub async fn list_all(&self) -> DbResult<Vec<Promotion>> {
        self.fetch(&select_promotions("ORDER BY id")).await
    }

    /// Promotions flagged active, whatever their window.
    pub async fn list_active(&self) -> DbResult<Vec<Promotion>> {
        self.fetch(&select_promotions("WHERE is_active = 1 ORDER BY id"))
            .await
    }

    /// Active promotions whose window contains `now`.
    pub async fn list_currently_valid(&self, now: DateTime<Utc>) -> DbResult<Vec<Promotion>> {
        let rows = sqlx::query_as::<_, PromotionRow>(&select_promotions(
            "WHERE is_active = 1 ORDER BY id",
        ))
        .fetch_all(&self.pool)
        .await?;

        // The window check stays in tally-core so there is one definition of
        // "valid"; the active set is small.
        Ok(rows
            .into_iter()
            .map(Promotion::from)
            .filter(|p| p.is_valid_at(now))
            .collect())
    }

    /// Case-insensitive substring match on the title.
    pub async fn search_by_title(&self, term: &str) -> DbResult<Vec<Promotion>> {
        let term = validate_search_term(term)?;
        debug!(term = %term, "Searching promotions");

        let rows = sqlx::query_as::<_, PromotionRow>(&select_promotions(
            "WHERE instr(lower(title), lower(?1)) > 0 ORDER BY id",
        ))
        .bind(term)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Promotion::from).collect())
    }

    /// `computeDiscount` by id. A missing promotion discounts nothing.
    pub async fn apply_promotion(
        &self,
        promotion_id: i64,
        amount: Money,
        now: DateTime<Utc>,
    ) -> DbResult<Money> {
        let promotion = self.get_by_id(promotion_id).await?;
        let discount = compute_discount(promotion.as_ref(), amount, now)?;

        debug!(
            promotion_id,
            found = promotion.is_some(),
            amount = %amount,
            discount = %discount,
            "Promotion applied"
        );

        Ok(discount)
    }

    async fn fetch(&self, sql: &str) -> DbResult<Vec<Promotion>> {
        let rows = sqlx::query_as::<_, PromotionRow>(sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Promotion::from).collect())
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

    async fn repo() -> PromotionRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().promotions()
    }

    fn t0() -> DateTime<Utc> {
        "2026-06-01T00:00:00Z".parse().unwrap()
    }

    fn t1() -> DateTime<Utc> {
        "2026-06-30T23:59:59Z".parse().unwrap()
    }

    fn new_promotion(title: &str, discount_type: DiscountType, value: i64) -> NewPromotion {
        NewPromotion {
            title: title.to_string(),
            description: None,
            discount_type,
            discount_value: value,
            start_date: t0(),
            end_date: t1(),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_percentage_promotion_in_and_out_of_window() {
        let repo = repo().await;
        let promo = repo
            .create(&new_promotion("June ten", DiscountType::Percentage, 1000))
            .await
            .unwrap();

        let mid = t0() + Duration::days(10);
        let discount = repo
            .apply_promotion(promo.id, Money::from_cents(20000), mid)
            .await
            .unwrap();
        assert_eq!(discount, Money::from_cents(2000));

        let late = t1() + Duration::seconds(1);
        let discount = repo
            .apply_promotion(promo.id, Money::from_cents(20000), late)
            .await
            .unwrap();
        assert!(discount.is_zero());
    }

    #[tokio::test]
    async fn test_fixed_amount_is_capped() {
        let repo = repo().await;
        let promo = repo
            .create(&new_promotion("Big", DiscountType::FixedAmount, 50000))
            .await
            .unwrap();

        let discount = repo
            .apply_promotion(promo.id, Money::from_cents(10000), t0())
            .await
            .unwrap();
        assert_eq!(discount, Money::from_cents(10000));
    }

    #[tokio::test]
    async fn test_missing_or_unknown_promotion_discounts_nothing() {
        let repo = repo().await;
        let discount = repo
            .apply_promotion(999, Money::from_cents(500), t0())
            .await
            .unwrap();
        assert!(discount.is_zero());

        let bogo = repo
            .create(&new_promotion(
                "Two for one",
                DiscountType::from("BUY_ONE_GET_ONE"),
                100,
            ))
            .await
            .unwrap();
        assert_eq!(
            bogo.discount_type,
            DiscountType::Other("BUY_ONE_GET_ONE".to_string())
        );
        let discount = repo
            .apply_promotion(bogo.id, Money::from_cents(500), t0())
            .await
            .unwrap();
        assert!(discount.is_zero());

        assert!(repo
            .apply_promotion(bogo.id, Money::zero(), t0())
            .await
            .unwrap_err()
            .is_validation());
    }

    #[tokio::test]
    async fn test_crud() {
        let repo = repo().await;

        assert!(repo
            .create(&new_promotion("  ", DiscountType::Percentage, 10))
            .await
            .unwrap_err()
            .is_validation());
        assert!(repo
            .create(&new_promotion("Too much", DiscountType::Percentage, 10_001))
            .await
            .unwrap_err()
            .is_validation());

        let a = repo
            .create(&new_promotion("Summer sale", DiscountType::Percentage, 500))
            .await
            .unwrap();
        let b = repo
            .create(&new_promotion("Clearance", DiscountType::FixedAmount, 300))
            .await
            .unwrap();

        let updated = repo
            .update(a.id, &new_promotion("Summer SALE", DiscountType::Percentage, 750))
            .await
            .unwrap();
        assert_eq!(updated.discount_value, 750);
        assert!(repo
            .update(404, &new_promotion("x", DiscountType::Percentage, 1))
            .await
            .unwrap_err()
            .is_not_found());

        let off = repo.set_active(b.id, false).await.unwrap();
        assert!(!off.is_active);

        assert_eq!(repo.list_all().await.unwrap().len(), 2);
        assert_eq!(repo.list_active().await.unwrap().len(), 1);
        assert_eq!(repo.list_currently_valid(t0()).await.unwrap().len(), 1);
        assert!(repo
            .list_currently_valid(t1() + Duration::days(1))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(repo.search_by_title("sale").await.unwrap().len(), 1);

        repo.delete(b.id).await.unwrap();
        assert!(repo.get_by_id(b.id).await.unwrap().is_none());
        assert!(repo.delete(b.id).await.unwrap_err().is_not_found());
    }
}
