// File: creditbook-common/src/models/promo.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// Codes are stored trimmed and uppercased; lookups normalize the same way.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PromoCode {
    pub promo_code_id: Uuid,
    pub code: String,
    pub description: Option<String>,
    pub free_credits: i64,
    /// `None` means unlimited.
    pub max_uses: Option<i64>,
    pub current_uses: i64,
    pub allow_multiple_per_user: bool,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PromoCode {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| exp <= now).unwrap_or(false)
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_uses.map(|max| self.current_uses >= max).unwrap_or(false)
    }

    pub fn remaining_uses(&self) -> Option<i64> {
        self.max_uses.map(|max| (max - self.current_uses).max(0))
    }

    /// `max_uses` may never drop below the uses already recorded. Checked
    /// against the locked row, since redemptions keep raising `current_uses`.
    pub fn check_use_limit(&self) -> Result<(), Error> {
        match self.max_uses {
            Some(max) if max < self.current_uses => Err(Error::Validation(format!(
                "max_uses {} is below the {} uses already recorded for {}",
                max, self.current_uses, self.code
            ))),
            _ => Ok(()),
        }
    }
}

/// Admin input for a new code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPromoCode {
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
    pub free_credits: i64,
    #[serde(default)]
    pub max_uses: Option<i64>,
    #[serde(default)]
    pub allow_multiple_per_user: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

/// Partial update. Nullable fields use `Option<Option<_>>`: absent leaves the
/// value alone, explicit `null` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromoCodeUpdate {
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default, with = "double_option")]
    pub max_uses: Option<Option<i64>>,
    #[serde(default)]
    pub allow_multiple_per_user: Option<bool>,
    #[serde(default, with = "double_option")]
    pub expires_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub free_credits: Option<i64>,
}

impl PromoCodeUpdate {
    pub fn apply_to(&self, code: &mut PromoCode, now: DateTime<Utc>) {
        if let Some(v) = self.is_active {
            code.is_active = v;
        }
        if let Some(v) = self.max_uses {
            code.max_uses = v;
        }
        if let Some(v) = self.allow_multiple_per_user {
            code.allow_multiple_per_user = v;
        }
        if let Some(v) = self.expires_at {
            code.expires_at = v;
        }
        if let Some(v) = &self.description {
            code.description = v.clone();
        }
        if let Some(v) = self.free_credits {
            code.free_credits = v;
        }
        code.updated_at = now;
    }
}

mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PromoRedemption {
    pub redemption_id: Uuid,
    pub promo_code_id: Uuid,
    pub user_id: Uuid,
    pub free_credits_granted: i64,
    pub redeemed_at: DateTime<Utc>,
}

/// Admin listing row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoCodeStats {
    #[serde(flatten)]
    pub promo: PromoCode,
    pub redemption_count: i64,
    pub unique_users: i64,
    pub credits_granted: i64,
    pub remaining_uses: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemOutcome {
    pub code: String,
    pub free_credits_granted: i64,
    pub free_credits: i64,
    pub paid_credits: i64,
}
