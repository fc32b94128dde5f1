pub mod bonus_rule_cache;

pub use bonus_rule_cache::{BonusRuleCache, CacheConfig};
