// File: creditbook-common/src/models/audit.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminAuditEntry {
    pub audit_id: Uuid,
    pub admin_id: Uuid,
    pub user_id: Uuid,
    pub action: String,
    pub free_amount: i64,
    pub paid_amount: i64,
    pub unit_value_cents: Option<i64>,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl AdminAuditEntry {
    pub fn new(
        admin_id: Uuid,
        user_id: Uuid,
        action: &str,
        free_amount: i64,
        paid_amount: i64,
        unit_value_cents: Option<i64>,
        reason: &str,
    ) -> Self {
        Self {
            audit_id: Uuid::new_v4(),
            admin_id,
            user_id,
            action: action.to_string(),
            free_amount,
            paid_amount,
            unit_value_cents,
            reason: reason.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Administrative balance adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminGrant {
    pub admin_id: Uuid,
    pub user_id: Uuid,
    pub free_amount: i64,
    pub paid_amount: i64,
    pub unit_value_cents: i64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminRevoke {
    pub admin_id: Uuid,
    pub user_id: Uuid,
    pub free_amount: i64,
    pub paid_amount: i64,
    pub reason: String,
}
