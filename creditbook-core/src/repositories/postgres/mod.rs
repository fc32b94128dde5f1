// src/repositories/postgres/mod.rs

pub mod ledger;
pub mod promo_codes;
pub mod bonus_rules;
pub mod resource_prices;

pub use ledger::{PostgresLedgerStore, PostgresLedgerTx};
pub use promo_codes::PostgresPromoCodeRepository;
pub use bonus_rules::PostgresBonusRuleRepository;
pub use resource_prices::PostgresResourcePriceRepository;
