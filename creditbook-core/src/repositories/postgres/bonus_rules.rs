// File: creditbook-core/src/repositories/postgres/bonus_rules.rs

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use creditbook_common::error::Error;
use creditbook_common::models::PurchaseBonusRule;
use creditbook_common::traits::repository_traits::BonusRuleRepository;

#[derive(Clone)]
pub struct PostgresBonusRuleRepository {
    pool: Pool<Postgres>,
}

impl PostgresBonusRuleRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BonusRuleRepository for PostgresBonusRuleRepository {
    async fn upsert_rule(&self, rule: &PurchaseBonusRule) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO purchase_bonus_rules (
                pack_id, pack_credits, bonus_free_credits, is_active, updated_at
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (pack_id) DO UPDATE
            SET pack_credits = EXCLUDED.pack_credits,
                bonus_free_credits = EXCLUDED.bonus_free_credits,
                is_active = EXCLUDED.is_active,
                updated_at = EXCLUDED.updated_at
            "#,
        )
            .bind(&rule.pack_id)
            .bind(rule.pack_credits)
            .bind(rule.bonus_free_credits)
            .bind(rule.is_active)
            .bind(rule.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_rule(&self, pack_id: &str) -> Result<Option<PurchaseBonusRule>, Error> {
        let rule = sqlx::query_as::<_, PurchaseBonusRule>(
            r#"
            SELECT pack_id, pack_credits, bonus_free_credits, is_active, updated_at
            FROM purchase_bonus_rules
            WHERE pack_id = $1
            "#,
        )
            .bind(pack_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(rule)
    }

    async fn list_rules(&self) -> Result<Vec<PurchaseBonusRule>, Error> {
        let rules = sqlx::query_as::<_, PurchaseBonusRule>(
            r#"
            SELECT pack_id, pack_credits, bonus_free_credits, is_active, updated_at
            FROM purchase_bonus_rules
            ORDER BY pack_id ASC
            "#,
        )
            .fetch_all(&self.pool)
            .await?;
        Ok(rules)
    }
}
