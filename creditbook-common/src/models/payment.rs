// File: creditbook-common/src/models/payment.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A confirmed payment as delivered by the payment webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCredit {
    pub payment_reference: String,
    pub user_id: Uuid,
    pub pack_id: String,
    pub credits: i64,
    pub price_cents: i64,
}

/// What a payment credit did to the account. Stored verbatim in the
/// idempotency log so replays can return it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCreditResult {
    pub paid_credits_added: i64,
    pub bonus_credits_added: i64,
    pub unit_value_cents: i64,
    pub remainder_cents: i64,
    pub lot_id: Uuid,
}

/// Returned to callers of the credit operation; `replayed` marks an
/// idempotent no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCreditOutcome {
    #[serde(flatten)]
    pub result: PaymentCreditResult,
    pub replayed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub payment_reference: String,
    pub user_id: Uuid,
    pub result: Option<PaymentCreditResult>,
    pub processed_at: DateTime<Utc>,
}

/// Outcome of the insert-if-absent on the idempotency log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation {
    /// This transaction owns the reference and must complete it.
    Reserved,
    /// Another (committed) transaction already credited this reference.
    AlreadyProcessed(PaymentCreditResult),
}
