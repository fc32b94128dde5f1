// File: creditbook-core/src/test_utils/helpers.rs

use std::collections::HashSet;
use std::sync::Arc;
use sqlx::{Connection, PgConnection, Pool, Postgres};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;
use crate::Error;
use crate::api::{ApiConfig, AppState};
use crate::cache::{BonusRuleCache, CacheConfig};
use crate::db::Database;
use crate::repositories::{Backends, MemoryBackend};
use crate::services::{LedgerConfig, LedgerService};

pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_creditbook";

/// Ledger service over a fresh in-memory backend. The backend is returned too
/// so tests can seed and inspect state directly.
pub fn memory_ledger() -> (LedgerService, MemoryBackend) {
    let backend = MemoryBackend::new();
    let cache = Arc::new(BonusRuleCache::new(
        Arc::new(backend.clone()),
        CacheConfig { max_age_seconds: None },
    ));
    let ledger = LedgerService::new(Arc::new(backend.clone()), cache, LedgerConfig::default());
    (ledger, backend)
}

/// Full application state over a fresh in-memory backend, with `admin` as the
/// only admin.
pub fn memory_app_state(admin: Uuid) -> Result<(AppState, MemoryBackend), Error> {
    let backend = MemoryBackend::new();
    let config = ApiConfig {
        webhook_secret: TEST_WEBHOOK_SECRET.to_string(),
        webhook_tolerance_secs: 300,
        admin_ids: HashSet::from([admin]),
        ledger: LedgerConfig::default(),
        cache: CacheConfig { max_age_seconds: None },
    };
    let state = AppState::new(Backends::memory(backend.clone()), config)?;
    Ok((state, backend))
}

/// Create the test database if it does not exist yet.
pub async fn ensure_test_database_exists() -> Result<(), Error> {
    let admin_url = std::env::var("DATABASE_ADMIN_URL")
        .unwrap_or_else(|_| "postgres://creditbook@localhost/postgres".to_string());

    let mut conn = PgConnection::connect(&admin_url).await?;

    let test_db = "creditbook_test";
    let create_db_sql = format!("CREATE DATABASE {test_db};");
    match sqlx::query(&create_db_sql).execute(&mut conn).await {
        Ok(_) => {
            println!("Created test DB '{test_db}'.");
        }
        Err(e) => {
            // 42P04 => "duplicate_database"
            let duplicate = e
                .as_database_error()
                .and_then(|db_err| db_err.code())
                .map(|code| code == "42P04")
                .unwrap_or(false);
            if !duplicate {
                return Err(Error::Database(e));
            }
        }
    }

    Ok(())
}

/// Create a connection pool to the test DB.
/// By default looks for `TEST_DATABASE_URL` in env,
/// else uses `postgres://creditbook@localhost/creditbook_test`.
pub async fn create_test_db_pool() -> Result<Pool<Postgres>, Error> {
    let url = std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgres://creditbook@localhost/creditbook_test".to_string());

    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&url)
        .await?;

    Ok(pool)
}

/// Wipes out test data so each test can start fresh.
pub async fn clean_database(pool: &Pool<Postgres>) -> Result<(), Error> {
    sqlx::query(r#"
        TRUNCATE TABLE
            accounts,
            credit_lots,
            promo_codes,
            promo_redemptions,
            purchase_bonus_rules,
            payment_idempotency_log,
            unlocks,
            ledger_entries,
            admin_audit_log,
            resource_prices
        RESTART IDENTITY CASCADE;
    "#)
        .execute(pool)
        .await?;

    Ok(())
}

/// Returns a migrated, empty test DB handle.
pub async fn setup_test_database() -> Result<Database, Error> {
    ensure_test_database_exists().await?;

    let pool = create_test_db_pool().await?;
    let db = Database::from_pool(pool);
    db.migrate().await?;
    clean_database(db.pool()).await?;

    Ok(db)
}
