// File: src/api/mod.rs

pub mod admin;
pub mod error;
pub mod identity;
pub mod routes;
pub mod signature;

use std::collections::HashSet;
use std::sync::Arc;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;
use uuid::Uuid;
use creditbook_common::error::Error;
use creditbook_common::traits::repository_traits::ResourcePriceRepository;

use crate::cache::{BonusRuleCache, CacheConfig};
use crate::repositories::Backends;
use crate::services::{BonusRuleService, LedgerConfig, LedgerService, PromoService};

pub use error::ApiError;
pub use identity::{AdminCaller, Caller, USER_ID_HEADER};
pub use signature::{SignatureError, WebhookVerifier, SIGNATURE_HEADER};

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub webhook_secret: String,
    pub webhook_tolerance_secs: i64,
    pub admin_ids: HashSet<Uuid>,
    pub ledger: LedgerConfig,
    pub cache: CacheConfig,
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<LedgerService>,
    pub promos: Arc<PromoService>,
    pub bonus_rules: Arc<BonusRuleService>,
    pub prices: Arc<dyn ResourcePriceRepository>,
    pub webhook: Arc<WebhookVerifier>,
    pub admin_ids: Arc<HashSet<Uuid>>,
}

impl AppState {
    pub fn new(backends: Backends, config: ApiConfig) -> Result<Self, Error> {
        let webhook = WebhookVerifier::new(config.webhook_secret.as_bytes(), config.webhook_tolerance_secs)
            .map_err(|e| Error::Config(format!("webhook secret: {}", e)))?;

        let cache = Arc::new(BonusRuleCache::new(backends.bonus_rules.clone(), config.cache));
        let ledger = LedgerService::new(backends.ledger, cache.clone(), config.ledger);

        Ok(Self {
            ledger: Arc::new(ledger),
            promos: Arc::new(PromoService::new(backends.promo_codes)),
            bonus_rules: Arc::new(BonusRuleService::new(backends.bonus_rules, cache)),
            prices: backends.resource_prices,
            webhook: Arc::new(webhook),
            admin_ids: Arc::new(config.admin_ids),
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/api/balance", get(routes::balance))
        .route("/api/promo/redeem", post(routes::redeem_promo))
        .route("/api/webhooks/payment", post(routes::payment_webhook))
        .route("/api/resources/{resource_id}/purchase", post(routes::purchase_resource))
        .route("/api/admin/grants", post(admin::grant))
        .route("/api/admin/revocations", post(admin::revoke))
        .route(
            "/api/admin/promo-codes",
            get(admin::list_promo_codes).post(admin::create_promo_code),
        )
        .route(
            "/api/admin/promo-codes/{code}",
            get(admin::get_promo_code)
                .patch(admin::update_promo_code)
                .delete(admin::delete_promo_code),
        )
        .route("/api/admin/bonus-rules", get(admin::list_bonus_rules))
        .route("/api/admin/bonus-rules/{pack_id}", put(admin::upsert_bonus_rule))
        .route("/api/admin/resources/{resource_id}/price", put(admin::set_resource_price))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
