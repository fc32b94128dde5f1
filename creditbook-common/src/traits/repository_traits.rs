use async_trait::async_trait;
use uuid::Uuid;
use crate::error::Error;
use crate::models::{
    Account, AdminAuditEntry, CreditLot, LedgerEntry, PaymentCreditResult, PromoCode,
    PromoCodeStats, PromoCodeUpdate, PromoRedemption, PurchaseBonusRule, Reservation,
    ResourcePrice, Unlock,
};

/// Opens ledger transactions.
///
/// Every balance mutation runs inside exactly one `LedgerTx`. A read-write
/// transaction serializes against other writers of the same account once
/// `lock_account` returns; snapshot transactions see one consistent commit.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, Error>;

    async fn begin_snapshot(&self) -> Result<Box<dyn LedgerTx>, Error>;
}

/// Transaction-scoped repository over accounts, lots, promo counters,
/// the idempotency log, unlocks and the ledger/audit trail.
///
/// Dropping a transaction without `commit` discards all of its writes.
#[async_trait]
pub trait LedgerTx: Send {
    // --- accounts ---
    /// Lock the account row for the rest of the transaction, creating an empty
    /// account first if the user has none.
    async fn lock_account(&mut self, user_id: Uuid) -> Result<Account, Error>;
    async fn read_account(&mut self, user_id: Uuid) -> Result<Option<Account>, Error>;
    async fn save_account(&mut self, account: &Account) -> Result<(), Error>;

    // --- credit lots ---
    /// Lots in FIFO order (oldest first).
    async fn load_lots(&mut self, user_id: Uuid, open_only: bool) -> Result<Vec<CreditLot>, Error>;
    async fn insert_lot(&mut self, lot: &CreditLot) -> Result<(), Error>;
    async fn update_lot_remaining(&mut self, lot_id: Uuid, credits_remaining: i64) -> Result<(), Error>;

    // --- promo codes ---
    /// Fetch and lock a code by its normalized form.
    async fn lock_promo_code(&mut self, code: &str) -> Result<Option<PromoCode>, Error>;
    async fn save_promo_uses(&mut self, promo_code_id: Uuid, current_uses: i64) -> Result<(), Error>;
    async fn count_redemptions(&mut self, promo_code_id: Uuid, user_id: Uuid) -> Result<i64, Error>;
    async fn insert_redemption(&mut self, redemption: &PromoRedemption) -> Result<(), Error>;

    // --- idempotency guard ---
    /// Insert-if-absent on the payment reference.
    async fn reserve_payment(&mut self, payment_reference: &str, user_id: Uuid) -> Result<Reservation, Error>;
    async fn complete_payment(&mut self, payment_reference: &str, result: &PaymentCreditResult) -> Result<(), Error>;

    // --- unlocks ---
    async fn find_unlock(&mut self, user_id: Uuid, resource_id: &str) -> Result<Option<Unlock>, Error>;
    async fn insert_unlock(&mut self, unlock: &Unlock) -> Result<(), Error>;

    // --- trail ---
    async fn insert_ledger_entry(&mut self, entry: &LedgerEntry) -> Result<(), Error>;
    async fn list_ledger_entries(&mut self, user_id: Uuid) -> Result<Vec<LedgerEntry>, Error>;
    async fn insert_audit(&mut self, entry: &AdminAuditEntry) -> Result<(), Error>;

    async fn commit(&mut self) -> Result<(), Error>;
    async fn rollback(&mut self) -> Result<(), Error>;
}

/// Admin-side CRUD over promo code definitions.
#[async_trait]
pub trait PromoCodeRepository: Send + Sync {
    /// Fails with `DuplicateCode` if the normalized code already exists.
    async fn create_promo_code(&self, promo: &PromoCode) -> Result<(), Error>;
    async fn get_promo_code(&self, code: &str) -> Result<Option<PromoCode>, Error>;
    async fn update_promo_code(&self, code: &str, update: &PromoCodeUpdate) -> Result<PromoCode, Error>;
    async fn delete_promo_code(&self, code: &str) -> Result<(), Error>;
    async fn list_promo_codes_with_stats(&self) -> Result<Vec<PromoCodeStats>, Error>;
}

#[async_trait]
pub trait BonusRuleRepository: Send + Sync {
    async fn upsert_rule(&self, rule: &PurchaseBonusRule) -> Result<(), Error>;
    async fn get_rule(&self, pack_id: &str) -> Result<Option<PurchaseBonusRule>, Error>;
    async fn list_rules(&self) -> Result<Vec<PurchaseBonusRule>, Error>;
}

#[async_trait]
pub trait ResourcePriceRepository: Send + Sync {
    async fn get_price(&self, resource_id: &str) -> Result<Option<ResourcePrice>, Error>;
    async fn set_price(&self, price: &ResourcePrice) -> Result<(), Error>;
}
