// File: creditbook-core/src/repositories/postgres/promo_codes.rs

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use creditbook_common::error::Error;
use creditbook_common::models::{PromoCode, PromoCodeStats, PromoCodeUpdate};
use creditbook_common::traits::repository_traits::PromoCodeRepository;

#[derive(Clone)]
pub struct PostgresPromoCodeRepository {
    pool: Pool<Postgres>,
}

impl PostgresPromoCodeRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PromoCodeRepository for PostgresPromoCodeRepository {
    async fn create_promo_code(&self, promo: &PromoCode) -> Result<(), Error> {
        // ON CONFLICT DO NOTHING so an existing (or deleted) code is never overwritten.
        let res = sqlx::query(
            r#"
            INSERT INTO promo_codes (
                promo_code_id, code, description, free_credits, max_uses, current_uses,
                allow_multiple_per_user, is_active, expires_at, created_by,
                created_at, updated_at
            )
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)
            ON CONFLICT (code) DO NOTHING
            "#,
        )
            .bind(promo.promo_code_id)
            .bind(&promo.code)
            .bind(&promo.description)
            .bind(promo.free_credits)
            .bind(promo.max_uses)
            .bind(promo.current_uses)
            .bind(promo.allow_multiple_per_user)
            .bind(promo.is_active)
            .bind(promo.expires_at)
            .bind(promo.created_by)
            .bind(promo.created_at)
            .bind(promo.updated_at)
            .execute(&self.pool)
            .await?;

        if res.rows_affected() == 0 {
            return Err(Error::DuplicateCode(promo.code.clone()));
        }
        Ok(())
    }

    async fn get_promo_code(&self, code: &str) -> Result<Option<PromoCode>, Error> {
        let promo = sqlx::query_as::<_, PromoCode>(
            r#"
            SELECT promo_code_id, code, description, free_credits, max_uses, current_uses,
                   allow_multiple_per_user, is_active, expires_at, created_by,
                   created_at, updated_at
            FROM promo_codes
            WHERE code = $1 AND deleted_at IS NULL
            "#,
        )
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(promo)
    }

    async fn update_promo_code(&self, code: &str, update: &PromoCodeUpdate) -> Result<PromoCode, Error> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, PromoCode>(
            r#"
            SELECT promo_code_id, code, description, free_credits, max_uses, current_uses,
                   allow_multiple_per_user, is_active, expires_at, created_by,
                   created_at, updated_at
            FROM promo_codes
            WHERE code = $1 AND deleted_at IS NULL
            FOR UPDATE
            "#,
        )
            .bind(code)
            .fetch_optional(&mut *tx)
            .await?;

        let mut promo = match existing {
            Some(p) => p,
            None => return Err(Error::NotFound(format!("promo code {}", code))),
        };
        update.apply_to(&mut promo, Utc::now());
        // Redemptions may have landed since the caller last read the row.
        promo.check_use_limit()?;

        sqlx::query(
            r#"
            UPDATE promo_codes
            SET description = $1,
                free_credits = $2,
                max_uses = $3,
                allow_multiple_per_user = $4,
                is_active = $5,
                expires_at = $6,
                updated_at = $7
            WHERE promo_code_id = $8
            "#,
        )
            .bind(&promo.description)
            .bind(promo.free_credits)
            .bind(promo.max_uses)
            .bind(promo.allow_multiple_per_user)
            .bind(promo.is_active)
            .bind(promo.expires_at)
            .bind(promo.updated_at)
            .bind(promo.promo_code_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(promo)
    }

    async fn delete_promo_code(&self, code: &str) -> Result<(), Error> {
        // Soft delete: redemption rows keep referencing the code, and the
        // unique key stops the same code from being created again.
        let res = sqlx::query(
            r#"
            UPDATE promo_codes
            SET deleted_at = $1, is_active = FALSE, updated_at = $1
            WHERE code = $2 AND deleted_at IS NULL
            "#,
        )
            .bind(Utc::now())
            .bind(code)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(Error::NotFound(format!("promo code {}", code)));
        }
        Ok(())
    }

    async fn list_promo_codes_with_stats(&self) -> Result<Vec<PromoCodeStats>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT p.promo_code_id, p.code, p.description, p.free_credits, p.max_uses,
                   p.current_uses, p.allow_multiple_per_user, p.is_active, p.expires_at,
                   p.created_by, p.created_at, p.updated_at,
                   COUNT(r.redemption_id) AS redemption_count,
                   COUNT(DISTINCT r.user_id) AS unique_users,
                   COALESCE(SUM(r.free_credits_granted), 0)::BIGINT AS credits_granted
            FROM promo_codes p
            LEFT JOIN promo_redemptions r ON r.promo_code_id = p.promo_code_id
            WHERE p.deleted_at IS NULL
            GROUP BY p.promo_code_id
            ORDER BY p.created_at DESC
            "#,
        )
            .fetch_all(&self.pool)
            .await?;

        let mut list = Vec::with_capacity(rows.len());
        for r in rows {
            let promo = PromoCode {
                promo_code_id: r.try_get("promo_code_id")?,
                code: r.try_get("code")?,
                description: r.try_get("description")?,
                free_credits: r.try_get("free_credits")?,
                max_uses: r.try_get("max_uses")?,
                current_uses: r.try_get("current_uses")?,
                allow_multiple_per_user: r.try_get("allow_multiple_per_user")?,
                is_active: r.try_get("is_active")?,
                expires_at: r.try_get("expires_at")?,
                created_by: r.try_get("created_by")?,
                created_at: r.try_get("created_at")?,
                updated_at: r.try_get("updated_at")?,
            };
            let remaining_uses = promo.remaining_uses();
            list.push(PromoCodeStats {
                promo,
                redemption_count: r.try_get("redemption_count")?,
                unique_users: r.try_get("unique_users")?,
                credits_granted: r.try_get("credits_granted")?,
                remaining_uses,
            });
        }
        Ok(list)
    }
}
