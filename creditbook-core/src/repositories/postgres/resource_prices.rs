// File: creditbook-core/src/repositories/postgres/resource_prices.rs

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use creditbook_common::error::Error;
use creditbook_common::models::ResourcePrice;
use creditbook_common::traits::repository_traits::ResourcePriceRepository;

#[derive(Clone)]
pub struct PostgresResourcePriceRepository {
    pool: Pool<Postgres>,
}

impl PostgresResourcePriceRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResourcePriceRepository for PostgresResourcePriceRepository {
    async fn get_price(&self, resource_id: &str) -> Result<Option<ResourcePrice>, Error> {
        let price = sqlx::query_as::<_, ResourcePrice>(
            "SELECT resource_id, price_credits FROM resource_prices WHERE resource_id = $1",
        )
            .bind(resource_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(price)
    }

    async fn set_price(&self, price: &ResourcePrice) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO resource_prices (resource_id, price_credits)
            VALUES ($1, $2)
            ON CONFLICT (resource_id) DO UPDATE SET price_credits = EXCLUDED.price_credits
            "#,
        )
            .bind(&price.resource_id)
            .bind(price.price_credits)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
