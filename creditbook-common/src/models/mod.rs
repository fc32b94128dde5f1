// File: creditbook-common/src/models/mod.rs
pub mod account;
pub mod promo;
pub mod bonus;
pub mod payment;
pub mod unlock;
pub mod audit;

pub use account::{
    Account, BalanceBreakdown, BalanceSnapshot, CreditLot, LedgerEntry, LedgerEntryKind,
    LedgerTotals, LotSource, NewLot, summarize_entries,
};
pub use promo::{normalize_code, NewPromoCode, PromoCode, PromoCodeStats, PromoCodeUpdate, PromoRedemption, RedeemOutcome};
pub use bonus::{BonusRuleInput, PurchaseBonusRule};
pub use payment::{IdempotencyRecord, PaymentCredit, PaymentCreditOutcome, PaymentCreditResult, Reservation};
pub use unlock::{PurchaseOutcome, ResourcePrice, Unlock};
pub use audit::{AdminAuditEntry, AdminGrant, AdminRevoke};
