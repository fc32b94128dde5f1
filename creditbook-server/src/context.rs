//! creditbook-server/src/context.rs
//!
//! Builds the storage backends and the shared HTTP state from CLI arguments.

use std::collections::HashSet;
use anyhow::{anyhow, Context};
use tracing::{info, warn};
use uuid::Uuid;

use creditbook_core::api::{ApiConfig, AppState};
use creditbook_core::cache::CacheConfig;
use creditbook_core::repositories::{Backends, MemoryBackend};
use creditbook_core::services::LedgerConfig;
use creditbook_core::db::{Database, DbConfig};

use crate::{Args, StoreKind};

pub struct ServerContext {
    pub state: AppState,
    /// Kept so the pool outlives the router when running on Postgres.
    pub db: Option<Database>,
}

impl ServerContext {
    pub async fn new(args: &Args) -> anyhow::Result<Self> {
        let (backends, db) = match args.store {
            StoreKind::Postgres => {
                let mut db_config = DbConfig::new(args.database_url.clone());
                db_config.max_connections = args.db_max_connections;
                let db = Database::connect(&db_config)
                    .await
                    .context("connecting to Postgres")?;
                db.ping().await.context("pinging Postgres")?;
                if args.migrate {
                    db.migrate().await.context("running migrations")?;
                }
                (Backends::postgres(db.pool().clone()), Some(db))
            }
            StoreKind::Memory => {
                warn!("Using the in-memory store; all balances are lost on exit.");
                (Backends::memory(MemoryBackend::new()), None)
            }
        };

        let config = ApiConfig {
            webhook_secret: args.webhook_secret.clone(),
            webhook_tolerance_secs: args.webhook_tolerance_secs,
            admin_ids: parse_admin_ids(&args.admin_ids)?,
            ledger: LedgerConfig { max_attempts: args.max_tx_attempts.max(1) },
            cache: CacheConfig {
                max_age_seconds: (args.bonus_cache_secs > 0).then_some(args.bonus_cache_secs),
            },
        };
        info!("Loaded {} admin id(s).", config.admin_ids.len());

        let state = AppState::new(backends, config)?;
        Ok(Self { state, db })
    }
}

fn parse_admin_ids(raw: &[String]) -> anyhow::Result<HashSet<Uuid>> {
    raw.iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| Uuid::parse_str(s).map_err(|e| anyhow!("invalid admin id '{}': {}", s, e)))
        .collect()
}
