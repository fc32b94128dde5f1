// File: src/services/promo_service.rs

use std::sync::Arc;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;
use creditbook_common::error::Error;
use creditbook_common::models::{normalize_code, NewPromoCode, PromoCode, PromoCodeStats, PromoCodeUpdate};
use creditbook_common::traits::repository_traits::PromoCodeRepository;

const MAX_CODE_LEN: usize = 64;

/// Admin-side management of promo code definitions. Redemption itself is a
/// ledger operation and lives in `LedgerService`.
pub struct PromoService {
    repo: Arc<dyn PromoCodeRepository>,
}

impl PromoService {
    pub fn new(repo: Arc<dyn PromoCodeRepository>) -> Self {
        Self { repo }
    }

    pub async fn create(&self, admin_id: Uuid, input: NewPromoCode) -> Result<PromoCode, Error> {
        let code = validate_code(&input.code)?;
        if input.free_credits <= 0 {
            return Err(Error::InvalidAmount("free_credits must be positive".into()));
        }
        validate_max_uses(input.max_uses, 0)?;
        let now = Utc::now();
        if let Some(exp) = input.expires_at {
            if exp <= now {
                return Err(Error::Validation("expires_at must be in the future".into()));
            }
        }

        let promo = PromoCode {
            promo_code_id: Uuid::new_v4(),
            code,
            description: input.description.filter(|d| !d.trim().is_empty()),
            free_credits: input.free_credits,
            max_uses: input.max_uses,
            current_uses: 0,
            allow_multiple_per_user: input.allow_multiple_per_user,
            is_active: input.is_active,
            expires_at: input.expires_at,
            created_by: admin_id,
            created_at: now,
            updated_at: now,
        };
        self.repo.create_promo_code(&promo).await?;

        info!("admin {} created promo code {} ({} credits)", admin_id, promo.code, promo.free_credits);
        Ok(promo)
    }

    pub async fn get(&self, code: &str) -> Result<PromoCode, Error> {
        let code = normalize_code(code);
        self.repo
            .get_promo_code(&code)
            .await?
            .ok_or_else(|| Error::NotFound(format!("promo code {}", code)))
    }

    pub async fn update(&self, code: &str, update: PromoCodeUpdate) -> Result<PromoCode, Error> {
        let existing = self.get(code).await?;
        if let Some(credits) = update.free_credits {
            if credits <= 0 {
                return Err(Error::InvalidAmount("free_credits must be positive".into()));
            }
        }
        if let Some(max_uses) = update.max_uses {
            validate_max_uses(max_uses, existing.current_uses)?;
        }

        let updated = self.repo.update_promo_code(&existing.code, &update).await?;
        info!("promo code {} updated", updated.code);
        Ok(updated)
    }

    pub async fn delete(&self, code: &str) -> Result<(), Error> {
        let code = normalize_code(code);
        self.repo.delete_promo_code(&code).await?;
        info!("promo code {} deleted", code);
        Ok(())
    }

    pub async fn list_with_stats(&self) -> Result<Vec<PromoCodeStats>, Error> {
        self.repo.list_promo_codes_with_stats().await
    }
}

fn validate_code(raw: &str) -> Result<String, Error> {
    let code = normalize_code(raw);
    if code.is_empty() {
        return Err(Error::Validation("code is required".into()));
    }
    if code.len() > MAX_CODE_LEN {
        return Err(Error::Validation(format!("code longer than {} characters", MAX_CODE_LEN)));
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(Error::Validation("code may only contain letters, digits, '_' and '-'".into()));
    }
    Ok(code)
}

fn validate_max_uses(max_uses: Option<i64>, current_uses: i64) -> Result<(), Error> {
    match max_uses {
        Some(max) if max <= 0 => Err(Error::InvalidAmount("max_uses must be positive".into())),
        Some(max) if max < current_uses => Err(Error::Validation(format!(
            "max_uses {} is below the {} uses already recorded",
            max, current_uses
        ))),
        _ => Ok(()),
    }
}
