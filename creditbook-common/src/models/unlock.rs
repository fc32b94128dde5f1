// File: creditbook-common/src/models/unlock.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ownership record for a catalog resource, with how it was paid for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Unlock {
    pub unlock_id: Uuid,
    pub user_id: Uuid,
    pub resource_id: String,
    pub price_credits: i64,
    pub free_spent: i64,
    pub paid_spent: i64,
    pub cost_basis_cents: i64,
    pub unlocked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOutcome {
    pub unlock: Unlock,
    pub free_credits: i64,
    pub paid_credits: i64,
}

impl PurchaseOutcome {
    pub fn remaining_balance(&self) -> i64 {
        self.free_credits + self.paid_credits
    }
}

/// Catalog price for a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ResourcePrice {
    pub resource_id: String,
    pub price_credits: i64,
}
