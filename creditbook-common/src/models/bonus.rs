// File: creditbook-common/src/models/bonus.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bonus free credits attached to a purchasable credit pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PurchaseBonusRule {
    pub pack_id: String,
    pub pack_credits: i64,
    pub bonus_free_credits: i64,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseBonusRule {
    /// Bonus owed for a confirmed purchase of `credits` under this pack.
    /// A purchase whose size differs from the configured pack earns nothing.
    pub fn bonus_for(&self, credits: i64) -> i64 {
        if self.is_active && self.pack_credits == credits {
            self.bonus_free_credits
        } else {
            0
        }
    }
}

/// Admin input when creating or replacing a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BonusRuleInput {
    pub pack_credits: i64,
    pub bonus_free_credits: i64,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}
