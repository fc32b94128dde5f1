//! In-process backend for local runs and tests.
//!
//! All tables live behind one `tokio::sync::Mutex`. A ledger transaction holds
//! the lock from `begin` to `commit`/`rollback` and works on a private copy, so
//! transactions are fully serialized and an abandoned one leaves no trace.

pub mod ledger;
pub mod registry;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;
use creditbook_common::models::{
    Account, AdminAuditEntry, CreditLot, IdempotencyRecord, LedgerEntry, PromoCode,
    PromoRedemption, PurchaseBonusRule, ResourcePrice, Unlock,
};

pub use ledger::MemoryLedgerTx;

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub accounts: HashMap<Uuid, Account>,
    /// Insertion order doubles as the FIFO tie-breaker.
    pub lots: Vec<CreditLot>,
    /// Keyed by normalized code.
    pub promo_codes: HashMap<String, PromoCode>,
    /// Deleted codes. Their redemptions stay, and the code cannot be reused.
    pub retired_promo_codes: HashMap<String, PromoCode>,
    pub redemptions: Vec<PromoRedemption>,
    pub bonus_rules: BTreeMap<String, PurchaseBonusRule>,
    pub idempotency: HashMap<String, IdempotencyRecord>,
    pub unlocks: Vec<Unlock>,
    pub ledger_entries: Vec<LedgerEntry>,
    pub audit: Vec<AdminAuditEntry>,
    pub resource_prices: HashMap<String, ResourcePrice>,
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the committed state.
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    /// Direct write access to the committed state, bypassing the ledger.
    pub async fn with_state_mut<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&mut MemoryState) -> T,
    {
        let mut guard = self.state.lock().await;
        f(&mut guard)
    }
}
