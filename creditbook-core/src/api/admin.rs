// File: src/api/admin.rs
//
// Admin-only handlers. Every handler takes `AdminCaller`, so a request from a
// user outside the admin set is refused before any service is touched.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;
use creditbook_common::error::Error;
use creditbook_common::models::{
    Account, AdminGrant, AdminRevoke, BonusRuleInput, NewPromoCode, PromoCode, PromoCodeStats,
    PromoCodeUpdate, PurchaseBonusRule, ResourcePrice,
};
use creditbook_common::traits::repository_traits::ResourcePriceRepository;

use super::error::ApiError;
use super::identity::AdminCaller;
use super::AppState;

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub free_amount: i64,
    #[serde(default)]
    pub paid_amount: i64,
    #[serde(default)]
    pub unit_value_cents: i64,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub free_amount: i64,
    #[serde(default)]
    pub paid_amount: i64,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct PriceRequest {
    pub price_credits: i64,
}

fn balance_json(account: &Account) -> Value {
    json!({
        "free_credits": account.free_credits,
        "paid_credits": account.paid_credits,
        "total_credits": account.total_credits(),
    })
}

pub async fn grant(
    State(state): State<AppState>,
    AdminCaller(admin_id): AdminCaller,
    Json(req): Json<GrantRequest>,
) -> Result<Json<Value>, ApiError> {
    let account = state
        .ledger
        .admin_grant(&AdminGrant {
            admin_id,
            user_id: req.user_id,
            free_amount: req.free_amount,
            paid_amount: req.paid_amount,
            unit_value_cents: req.unit_value_cents,
            reason: req.reason,
        })
        .await?;
    Ok(Json(json!({ "success": true, "new_balance": balance_json(&account) })))
}

pub async fn revoke(
    State(state): State<AppState>,
    AdminCaller(admin_id): AdminCaller,
    Json(req): Json<RevokeRequest>,
) -> Result<Json<Value>, ApiError> {
    let account = state
        .ledger
        .admin_revoke(&AdminRevoke {
            admin_id,
            user_id: req.user_id,
            free_amount: req.free_amount,
            paid_amount: req.paid_amount,
            reason: req.reason,
        })
        .await?;
    Ok(Json(json!({ "success": true, "new_balance": balance_json(&account) })))
}

pub async fn list_promo_codes(
    State(state): State<AppState>,
    _admin: AdminCaller,
) -> Result<Json<Vec<PromoCodeStats>>, ApiError> {
    Ok(Json(state.promos.list_with_stats().await?))
}

pub async fn create_promo_code(
    State(state): State<AppState>,
    AdminCaller(admin_id): AdminCaller,
    Json(req): Json<NewPromoCode>,
) -> Result<(StatusCode, Json<PromoCode>), ApiError> {
    let created = state.promos.create(admin_id, req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_promo_code(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(code): Path<String>,
) -> Result<Json<PromoCode>, ApiError> {
    Ok(Json(state.promos.get(&code).await?))
}

pub async fn update_promo_code(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(code): Path<String>,
    Json(update): Json<PromoCodeUpdate>,
) -> Result<Json<PromoCode>, ApiError> {
    Ok(Json(state.promos.update(&code, update).await?))
}

pub async fn delete_promo_code(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(code): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.promos.delete(&code).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_bonus_rules(
    State(state): State<AppState>,
    _admin: AdminCaller,
) -> Result<Json<Vec<PurchaseBonusRule>>, ApiError> {
    Ok(Json(state.bonus_rules.list().await?))
}

pub async fn upsert_bonus_rule(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(pack_id): Path<String>,
    Json(input): Json<BonusRuleInput>,
) -> Result<Json<PurchaseBonusRule>, ApiError> {
    Ok(Json(state.bonus_rules.upsert(&pack_id, input).await?))
}

pub async fn set_resource_price(
    State(state): State<AppState>,
    AdminCaller(admin_id): AdminCaller,
    Path(resource_id): Path<String>,
    Json(req): Json<PriceRequest>,
) -> Result<Json<ResourcePrice>, ApiError> {
    if resource_id.trim().is_empty() {
        return Err(Error::Validation("resource id is required".into()).into());
    }
    if req.price_credits < 0 {
        return Err(Error::InvalidAmount("price_credits cannot be negative".into()).into());
    }
    let price = ResourcePrice {
        resource_id,
        price_credits: req.price_credits,
    };
    state.prices.set_price(&price).await?;
    info!("admin {} priced {} at {} credits", admin_id, price.resource_id, price.price_credits);
    Ok(Json(price))
}
