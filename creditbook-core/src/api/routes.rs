// File: src/api/routes.rs
//
// User-facing and webhook handlers.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, warn};
use creditbook_common::error::Error;
use creditbook_common::models::{BalanceBreakdown, CreditLot, LedgerTotals, PaymentCredit};
use creditbook_common::traits::repository_traits::ResourcePriceRepository;

use super::error::ApiError;
use super::identity::Caller;
use super::signature::SIGNATURE_HEADER;
use super::AppState;

pub const PAYMENT_SUCCEEDED: &str = "payment.succeeded";

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub code: String,
}

/// Envelope posted by the payment processor. Only `payment.succeeded`
/// carries a `PaymentCredit` in `data`.
#[derive(Debug, Deserialize)]
pub struct PaymentEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

/// `GET /api/balance` body: the two counters up top, lot detail and
/// lifetime totals under `breakdown`.
#[derive(Debug, Serialize)]
pub struct BalanceBody {
    pub free_credits: i64,
    pub paid_credits: i64,
    pub total_credits: i64,
    pub breakdown: BreakdownBody,
}

#[derive(Debug, Serialize)]
pub struct BreakdownBody {
    pub open_lot_count: usize,
    pub remaining_cost_basis_cents: i64,
    pub lots: Vec<CreditLot>,
    pub totals: LedgerTotals,
}

impl From<BalanceBreakdown> for BalanceBody {
    fn from(b: BalanceBreakdown) -> Self {
        Self {
            free_credits: b.free_credits,
            paid_credits: b.paid_credits,
            total_credits: b.total_credits,
            breakdown: BreakdownBody {
                open_lot_count: b.open_lot_count,
                remaining_cost_basis_cents: b.remaining_cost_basis_cents,
                lots: b.lots,
                totals: b.totals,
            },
        }
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn balance(
    State(state): State<AppState>,
    Caller(user_id): Caller,
) -> Result<Json<BalanceBody>, ApiError> {
    Ok(Json(state.ledger.get_breakdown(user_id).await?.into()))
}

pub async fn redeem_promo(
    State(state): State<AppState>,
    Caller(user_id): Caller,
    Json(req): Json<RedeemRequest>,
) -> Result<Json<Value>, ApiError> {
    let outcome = state.ledger.redeem_promo(user_id, &req.code).await?;
    Ok(Json(json!({
        "success": true,
        "code": outcome.code,
        "free_credits_granted": outcome.free_credits_granted,
        "free_credits": outcome.free_credits,
        "paid_credits": outcome.paid_credits,
    })))
}

pub async fn purchase_resource(
    State(state): State<AppState>,
    Caller(user_id): Caller,
    Path(resource_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let price = state
        .prices
        .get_price(&resource_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("resource {}", resource_id)))?;

    let outcome = state
        .ledger
        .debit_for_purchase(user_id, &resource_id, price.price_credits)
        .await?;

    Ok(Json(json!({
        "success": true,
        "remaining_balance": outcome.remaining_balance(),
        "unlock": outcome.unlock,
    })))
}

/// Once the signature checks out the processor always gets
/// `{"received": true}`; processing failures are only logged.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let header = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    if let Err(e) = state.webhook.verify(header, &body, Utc::now().timestamp()) {
        warn!("payment webhook rejected: {}", e);
        return Err(e.into());
    }

    match serde_json::from_slice::<PaymentEvent>(&body) {
        Ok(event) if event.event_type == PAYMENT_SUCCEEDED => {
            match serde_json::from_value::<PaymentCredit>(event.data) {
                Ok(payment) => {
                    if let Err(e) = state.ledger.credit_from_payment(&payment).await {
                        error!("payment {} not credited: {}", payment.payment_reference, e);
                    }
                }
                Err(e) => error!("payment webhook with unreadable data: {}", e),
            }
        }
        Ok(event) => debug!("ignoring payment webhook event '{}'", event.event_type),
        Err(e) => error!("unparseable payment webhook body: {}", e),
    }

    Ok(Json(json!({ "received": true })))
}
