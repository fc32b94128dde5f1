// File: src/services/bonus_rule_service.rs

use std::sync::Arc;
use chrono::Utc;
use tracing::info;
use creditbook_common::error::Error;
use creditbook_common::models::{BonusRuleInput, PurchaseBonusRule};
use creditbook_common::traits::repository_traits::BonusRuleRepository;

use crate::cache::BonusRuleCache;

pub struct BonusRuleService {
    repo: Arc<dyn BonusRuleRepository>,
    cache: Arc<BonusRuleCache>,
}

impl BonusRuleService {
    pub fn new(repo: Arc<dyn BonusRuleRepository>, cache: Arc<BonusRuleCache>) -> Self {
        Self { repo, cache }
    }

    /// Create or replace the rule for `pack_id`, then drop the cached rule set.
    pub async fn upsert(&self, pack_id: &str, input: BonusRuleInput) -> Result<PurchaseBonusRule, Error> {
        let pack_id = pack_id.trim();
        if pack_id.is_empty() {
            return Err(Error::Validation("pack_id is required".into()));
        }
        if input.pack_credits <= 0 {
            return Err(Error::Validation("pack_credits must be positive".into()));
        }
        if input.bonus_free_credits < 0 {
            return Err(Error::Validation("bonus_free_credits cannot be negative".into()));
        }

        let rule = PurchaseBonusRule {
            pack_id: pack_id.to_string(),
            pack_credits: input.pack_credits,
            bonus_free_credits: input.bonus_free_credits,
            is_active: input.is_active,
            updated_at: Utc::now(),
        };
        self.repo.upsert_rule(&rule).await?;
        self.cache.invalidate();

        info!(
            "bonus rule {} => {} credits earn {} free (active={})",
            rule.pack_id, rule.pack_credits, rule.bonus_free_credits, rule.is_active
        );
        Ok(rule)
    }

    pub async fn list(&self) -> Result<Vec<PurchaseBonusRule>, Error> {
        self.cache.all().await
    }
}
