// File: creditbook-core/src/repositories/memory/ledger.rs

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;
use creditbook_common::error::Error;
use creditbook_common::fifo::sort_fifo;
use creditbook_common::models::{
    Account, AdminAuditEntry, CreditLot, IdempotencyRecord, LedgerEntry, PaymentCreditResult,
    PromoCode, PromoRedemption, Reservation, Unlock,
};
use creditbook_common::traits::repository_traits::{LedgerStore, LedgerTx};

use super::{MemoryBackend, MemoryState};

#[async_trait]
impl LedgerStore for MemoryBackend {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, Error> {
        let guard = self.state.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(MemoryLedgerTx { guard: Some(guard), working }))
    }

    async fn begin_snapshot(&self) -> Result<Box<dyn LedgerTx>, Error> {
        self.begin().await
    }
}

pub struct MemoryLedgerTx {
    guard: Option<OwnedMutexGuard<MemoryState>>,
    working: MemoryState,
}

impl MemoryLedgerTx {
    fn ensure_open(&self) -> Result<(), Error> {
        if self.guard.is_none() {
            return Err(Error::Validation("ledger transaction already finished".into()));
        }
        Ok(())
    }

    fn state(&mut self) -> Result<&mut MemoryState, Error> {
        self.ensure_open()?;
        Ok(&mut self.working)
    }
}

#[async_trait]
impl LedgerTx for MemoryLedgerTx {
    async fn lock_account(&mut self, user_id: Uuid) -> Result<Account, Error> {
        let state = self.state()?;
        let account = state
            .accounts
            .entry(user_id)
            .or_insert_with(|| Account::empty(user_id, Utc::now()));
        Ok(account.clone())
    }

    async fn read_account(&mut self, user_id: Uuid) -> Result<Option<Account>, Error> {
        Ok(self.state()?.accounts.get(&user_id).cloned())
    }

    async fn save_account(&mut self, account: &Account) -> Result<(), Error> {
        self.state()?.accounts.insert(account.user_id, account.clone());
        Ok(())
    }

    async fn load_lots(&mut self, user_id: Uuid, open_only: bool) -> Result<Vec<CreditLot>, Error> {
        let mut lots: Vec<CreditLot> = self
            .state()?
            .lots
            .iter()
            .filter(|l| l.user_id == user_id && (!open_only || l.credits_remaining > 0))
            .cloned()
            .collect();
        sort_fifo(&mut lots);
        Ok(lots)
    }

    async fn insert_lot(&mut self, lot: &CreditLot) -> Result<(), Error> {
        self.state()?.lots.push(lot.clone());
        Ok(())
    }

    async fn update_lot_remaining(&mut self, lot_id: Uuid, credits_remaining: i64) -> Result<(), Error> {
        match self.state()?.lots.iter_mut().find(|l| l.lot_id == lot_id) {
            Some(lot) => {
                lot.credits_remaining = credits_remaining;
                Ok(())
            }
            None => Err(Error::LedgerCorruption(format!("lot {} vanished during update", lot_id))),
        }
    }

    async fn lock_promo_code(&mut self, code: &str) -> Result<Option<PromoCode>, Error> {
        Ok(self.state()?.promo_codes.get(code).cloned())
    }

    async fn save_promo_uses(&mut self, promo_code_id: Uuid, current_uses: i64) -> Result<(), Error> {
        let now = Utc::now();
        if let Some(promo) = self
            .state()?
            .promo_codes
            .values_mut()
            .find(|p| p.promo_code_id == promo_code_id)
        {
            promo.current_uses = current_uses;
            promo.updated_at = now;
        }
        Ok(())
    }

    async fn count_redemptions(&mut self, promo_code_id: Uuid, user_id: Uuid) -> Result<i64, Error> {
        let count = self
            .state()?
            .redemptions
            .iter()
            .filter(|r| r.promo_code_id == promo_code_id && r.user_id == user_id)
            .count();
        Ok(count as i64)
    }

    async fn insert_redemption(&mut self, redemption: &PromoRedemption) -> Result<(), Error> {
        self.state()?.redemptions.push(redemption.clone());
        Ok(())
    }

    async fn reserve_payment(&mut self, payment_reference: &str, user_id: Uuid) -> Result<Reservation, Error> {
        let state = self.state()?;
        match state.idempotency.get(payment_reference) {
            Some(record) => match &record.result {
                Some(result) => Ok(Reservation::AlreadyProcessed(result.clone())),
                None => Err(Error::LedgerCorruption(format!(
                    "payment reference {} committed without a result",
                    payment_reference
                ))),
            },
            None => {
                state.idempotency.insert(
                    payment_reference.to_string(),
                    IdempotencyRecord {
                        payment_reference: payment_reference.to_string(),
                        user_id,
                        result: None,
                        processed_at: Utc::now(),
                    },
                );
                Ok(Reservation::Reserved)
            }
        }
    }

    async fn complete_payment(&mut self, payment_reference: &str, result: &PaymentCreditResult) -> Result<(), Error> {
        match self.state()?.idempotency.get_mut(payment_reference) {
            Some(record) => {
                record.result = Some(result.clone());
                record.processed_at = Utc::now();
                Ok(())
            }
            None => Err(Error::LedgerCorruption(format!(
                "payment reference {} completed without a reservation",
                payment_reference
            ))),
        }
    }

    async fn find_unlock(&mut self, user_id: Uuid, resource_id: &str) -> Result<Option<Unlock>, Error> {
        Ok(self
            .state()?
            .unlocks
            .iter()
            .find(|u| u.user_id == user_id && u.resource_id == resource_id)
            .cloned())
    }

    async fn insert_unlock(&mut self, unlock: &Unlock) -> Result<(), Error> {
        let state = self.state()?;
        if state
            .unlocks
            .iter()
            .any(|u| u.user_id == unlock.user_id && u.resource_id == unlock.resource_id)
        {
            return Err(Error::AlreadyOwned(unlock.resource_id.clone()));
        }
        state.unlocks.push(unlock.clone());
        Ok(())
    }

    async fn insert_ledger_entry(&mut self, entry: &LedgerEntry) -> Result<(), Error> {
        self.state()?.ledger_entries.push(entry.clone());
        Ok(())
    }

    async fn list_ledger_entries(&mut self, user_id: Uuid) -> Result<Vec<LedgerEntry>, Error> {
        Ok(self
            .state()?
            .ledger_entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert_audit(&mut self, entry: &AdminAuditEntry) -> Result<(), Error> {
        self.state()?.audit.push(entry.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), Error> {
        match self.guard.take() {
            Some(mut guard) => {
                *guard = std::mem::take(&mut self.working);
                Ok(())
            }
            None => Err(Error::Validation("ledger transaction already finished".into())),
        }
    }

    async fn rollback(&mut self) -> Result<(), Error> {
        self.guard.take();
        Ok(())
    }
}
