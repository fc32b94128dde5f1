// File: src/services/mod.rs

pub mod account_store;
pub mod ledger_service;
pub mod promo_service;
pub mod bonus_rule_service;

pub use account_store::{AccountStore, AppliedDelta, BalanceDelta};
pub use ledger_service::{LedgerConfig, LedgerService};
pub use promo_service::PromoService;
pub use bonus_rule_service::BonusRuleService;
