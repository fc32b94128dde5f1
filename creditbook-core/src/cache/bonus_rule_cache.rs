// File: src/cache/bonus_rule_cache.rs

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use creditbook_common::error::Error;
use creditbook_common::models::PurchaseBonusRule;
use creditbook_common::traits::repository_traits::BonusRuleRepository;

/// Config that the BonusRuleCache will use
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Reload after this many seconds even without an invalidation, so that
    /// writes made by another process are picked up eventually.
    pub max_age_seconds: Option<i64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_age_seconds: Some(60) }
    }
}

struct LoadedRules {
    version: u64,
    loaded_at: DateTime<Utc>,
    rules: HashMap<String, PurchaseBonusRule>,
}

/// Versioned read-through cache of purchase bonus rules.
///
/// Admin writes call `invalidate`, which bumps the version; the next read
/// notices the stale version and reloads the whole table.
pub struct BonusRuleCache {
    repo: Arc<dyn BonusRuleRepository>,
    config: CacheConfig,
    version: AtomicU64,
    loaded: RwLock<Option<LoadedRules>>,
}

impl BonusRuleCache {
    pub fn new(repo: Arc<dyn BonusRuleRepository>, config: CacheConfig) -> Self {
        Self {
            repo,
            config,
            version: AtomicU64::new(1),
            loaded: RwLock::new(None),
        }
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn invalidate(&self) {
        let v = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("bonus rule cache invalidated => version {}", v);
    }

    pub async fn get(&self, pack_id: &str) -> Result<Option<PurchaseBonusRule>, Error> {
        {
            let guard = self.loaded.read().await;
            if let Some(loaded) = guard.as_ref() {
                if self.is_fresh(loaded) {
                    return Ok(loaded.rules.get(pack_id).cloned());
                }
            }
        }
        let rules = self.reload().await?;
        Ok(rules.get(pack_id).cloned())
    }

    pub async fn all(&self) -> Result<Vec<PurchaseBonusRule>, Error> {
        {
            let guard = self.loaded.read().await;
            if let Some(loaded) = guard.as_ref() {
                if self.is_fresh(loaded) {
                    return Ok(sorted(&loaded.rules));
                }
            }
        }
        let rules = self.reload().await?;
        Ok(sorted(&rules))
    }

    fn is_fresh(&self, loaded: &LoadedRules) -> bool {
        if loaded.version != self.version() {
            return false;
        }
        match self.config.max_age_seconds {
            Some(max_age) => Utc::now() - loaded.loaded_at < Duration::seconds(max_age),
            None => true,
        }
    }

    async fn reload(&self) -> Result<HashMap<String, PurchaseBonusRule>, Error> {
        // Read the version before loading: an invalidation that races the
        // load leaves the entry stale and forces another reload.
        let version = self.version();
        let rules: HashMap<String, PurchaseBonusRule> = self
            .repo
            .list_rules()
            .await?
            .into_iter()
            .map(|r| (r.pack_id.clone(), r))
            .collect();

        debug!("bonus rule cache loaded {} rules at version {}", rules.len(), version);
        let mut guard = self.loaded.write().await;
        *guard = Some(LoadedRules {
            version,
            loaded_at: Utc::now(),
            rules: rules.clone(),
        });
        Ok(rules)
    }
}

fn sorted(rules: &HashMap<String, PurchaseBonusRule>) -> Vec<PurchaseBonusRule> {
    let mut list: Vec<_> = rules.values().cloned().collect();
    list.sort_by(|a, b| a.pack_id.cmp(&b.pack_id));
    list
}
