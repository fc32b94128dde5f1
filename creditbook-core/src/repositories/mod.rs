// src/repositories/mod.rs

pub mod postgres;
pub mod memory;

use std::sync::Arc;
use sqlx::{Pool, Postgres};

pub use creditbook_common::traits::repository_traits::{
    BonusRuleRepository, LedgerStore, LedgerTx, PromoCodeRepository, ResourcePriceRepository,
};

pub use postgres::{
    PostgresBonusRuleRepository, PostgresLedgerStore, PostgresPromoCodeRepository,
    PostgresResourcePriceRepository,
};
pub use memory::{MemoryBackend, MemoryState};

/// One storage implementation for every repository the services need.
#[derive(Clone)]
pub struct Backends {
    pub ledger: Arc<dyn LedgerStore>,
    pub promo_codes: Arc<dyn PromoCodeRepository>,
    pub bonus_rules: Arc<dyn BonusRuleRepository>,
    pub resource_prices: Arc<dyn ResourcePriceRepository>,
}

impl Backends {
    pub fn postgres(pool: Pool<Postgres>) -> Self {
        Self {
            ledger: Arc::new(PostgresLedgerStore::new(pool.clone())),
            promo_codes: Arc::new(PostgresPromoCodeRepository::new(pool.clone())),
            bonus_rules: Arc::new(PostgresBonusRuleRepository::new(pool.clone())),
            resource_prices: Arc::new(PostgresResourcePriceRepository::new(pool)),
        }
    }

    /// All four views share the one in-process state.
    pub fn memory(backend: MemoryBackend) -> Self {
        Self {
            ledger: Arc::new(backend.clone()),
            promo_codes: Arc::new(backend.clone()),
            bonus_rules: Arc::new(backend.clone()),
            resource_prices: Arc::new(backend),
        }
    }
}
