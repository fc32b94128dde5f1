// File: creditbook-core/src/repositories/memory/registry.rs

use std::collections::HashSet;
use async_trait::async_trait;
use chrono::Utc;
use creditbook_common::error::Error;
use creditbook_common::models::{
    PromoCode, PromoCodeStats, PromoCodeUpdate, PurchaseBonusRule, ResourcePrice,
};
use creditbook_common::traits::repository_traits::{
    BonusRuleRepository, PromoCodeRepository, ResourcePriceRepository,
};

use super::MemoryBackend;

#[async_trait]
impl PromoCodeRepository for MemoryBackend {
    async fn create_promo_code(&self, promo: &PromoCode) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        if state.promo_codes.contains_key(&promo.code) || state.retired_promo_codes.contains_key(&promo.code) {
            return Err(Error::DuplicateCode(promo.code.clone()));
        }
        state.promo_codes.insert(promo.code.clone(), promo.clone());
        Ok(())
    }

    async fn get_promo_code(&self, code: &str) -> Result<Option<PromoCode>, Error> {
        Ok(self.state.lock().await.promo_codes.get(code).cloned())
    }

    async fn update_promo_code(&self, code: &str, update: &PromoCodeUpdate) -> Result<PromoCode, Error> {
        let mut state = self.state.lock().await;
        let promo = state
            .promo_codes
            .get_mut(code)
            .ok_or_else(|| Error::NotFound(format!("promo code {}", code)))?;
        let mut updated = promo.clone();
        update.apply_to(&mut updated, Utc::now());
        updated.check_use_limit()?;
        *promo = updated.clone();
        Ok(updated)
    }

    async fn delete_promo_code(&self, code: &str) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        let mut promo = state
            .promo_codes
            .remove(code)
            .ok_or_else(|| Error::NotFound(format!("promo code {}", code)))?;
        promo.is_active = false;
        promo.updated_at = Utc::now();
        state.retired_promo_codes.insert(promo.code.clone(), promo);
        Ok(())
    }

    async fn list_promo_codes_with_stats(&self) -> Result<Vec<PromoCodeStats>, Error> {
        let state = self.state.lock().await;
        let mut list: Vec<PromoCodeStats> = state
            .promo_codes
            .values()
            .map(|promo| {
                let redemptions: Vec<_> = state
                    .redemptions
                    .iter()
                    .filter(|r| r.promo_code_id == promo.promo_code_id)
                    .collect();
                let unique: HashSet<_> = redemptions.iter().map(|r| r.user_id).collect();
                PromoCodeStats {
                    promo: promo.clone(),
                    redemption_count: redemptions.len() as i64,
                    unique_users: unique.len() as i64,
                    credits_granted: redemptions.iter().map(|r| r.free_credits_granted).sum(),
                    remaining_uses: promo.remaining_uses(),
                }
            })
            .collect();
        list.sort_by(|a, b| b.promo.created_at.cmp(&a.promo.created_at));
        Ok(list)
    }
}

#[async_trait]
impl BonusRuleRepository for MemoryBackend {
    async fn upsert_rule(&self, rule: &PurchaseBonusRule) -> Result<(), Error> {
        self.state.lock().await.bonus_rules.insert(rule.pack_id.clone(), rule.clone());
        Ok(())
    }

    async fn get_rule(&self, pack_id: &str) -> Result<Option<PurchaseBonusRule>, Error> {
        Ok(self.state.lock().await.bonus_rules.get(pack_id).cloned())
    }

    async fn list_rules(&self) -> Result<Vec<PurchaseBonusRule>, Error> {
        Ok(self.state.lock().await.bonus_rules.values().cloned().collect())
    }
}

#[async_trait]
impl ResourcePriceRepository for MemoryBackend {
    async fn get_price(&self, resource_id: &str) -> Result<Option<ResourcePrice>, Error> {
        Ok(self.state.lock().await.resource_prices.get(resource_id).cloned())
    }

    async fn set_price(&self, price: &ResourcePrice) -> Result<(), Error> {
        self.state
            .lock()
            .await
            .resource_prices
            .insert(price.resource_id.clone(), price.clone());
        Ok(())
    }
}
