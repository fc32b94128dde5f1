// File: src/services/account_store.rs

use std::sync::Arc;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;
use creditbook_common::error::Error;
use creditbook_common::fifo::{check_lot_sum, consume_fifo, FifoConsumption};
use creditbook_common::models::{Account, BalanceSnapshot, CreditLot, NewLot};
use creditbook_common::traits::repository_traits::{LedgerStore, LedgerTx};

/// A signed change to one account. `new_lot` must be present exactly when
/// `paid_delta` is positive, and must hold exactly `paid_delta` credits.
#[derive(Debug, Clone, Default)]
pub struct BalanceDelta {
    pub free_delta: i64,
    pub paid_delta: i64,
    pub new_lot: Option<NewLot>,
}

/// What `apply_delta` wrote.
#[derive(Debug, Clone)]
pub struct AppliedDelta {
    pub account: Account,
    pub consumed: FifoConsumption,
    pub new_lot: Option<CreditLot>,
}

pub struct AccountStore {
    store: Arc<dyn LedgerStore>,
}

impl AccountStore {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Balance as of the latest commit. A user with no account reads as zero.
    pub async fn get_balance(&self, user_id: Uuid) -> Result<BalanceSnapshot, Error> {
        let mut tx = self.store.begin_snapshot().await?;
        let read = read_balance(&mut *tx, user_id).await;
        match read {
            Ok(snapshot) => {
                tx.commit().await?;
                Ok(snapshot)
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }

    /// Lock the account and apply `delta`.
    pub async fn apply_delta(
        tx: &mut dyn LedgerTx,
        user_id: Uuid,
        delta: BalanceDelta,
    ) -> Result<AppliedDelta, Error> {
        let account = tx.lock_account(user_id).await?;
        Self::apply_delta_locked(tx, account, delta).await
    }

    /// Same as `apply_delta` for an account the caller already locked in `tx`.
    pub async fn apply_delta_locked(
        tx: &mut dyn LedgerTx,
        mut account: Account,
        delta: BalanceDelta,
    ) -> Result<AppliedDelta, Error> {
        let user_id = account.user_id;

        match (&delta.new_lot, delta.paid_delta > 0) {
            (Some(lot), true) if lot.credits == delta.paid_delta => {}
            (None, false) => {}
            _ => {
                return Err(Error::InvalidAmount(format!(
                    "paid delta {} does not match the lot operation",
                    delta.paid_delta
                )));
            }
        }

        let free_after = account
            .free_credits
            .checked_add(delta.free_delta)
            .ok_or_else(|| Error::InvalidAmount("free credit overflow".into()))?;
        let paid_after = account
            .paid_credits
            .checked_add(delta.paid_delta)
            .ok_or_else(|| Error::InvalidAmount("paid credit overflow".into()))?;

        if free_after < 0 {
            return Err(Error::InsufficientBalance(format!(
                "user {} holds {} free credits, cannot remove {}",
                user_id, account.free_credits, -delta.free_delta
            )));
        }
        if paid_after < 0 {
            return Err(Error::InsufficientBalance(format!(
                "user {} holds {} paid credits, cannot remove {}",
                user_id, account.paid_credits, -delta.paid_delta
            )));
        }

        let mut consumed = FifoConsumption::default();
        if delta.paid_delta < 0 {
            let mut lots = tx.load_lots(user_id, true).await?;
            check_lot_sum(user_id, account.paid_credits, &lots)?;
            consumed = consume_fifo(&mut lots, -delta.paid_delta)?;
            for draw in &consumed.draws {
                tx.update_lot_remaining(draw.lot_id, draw.remaining_after).await?;
            }
            debug!(
                "user {} consumed {} paid credits from {} lot(s), cost {} cents",
                user_id,
                consumed.credits(),
                consumed.draws.len(),
                consumed.total_cost_cents
            );
        }

        let now = Utc::now();
        let new_lot = match delta.new_lot {
            Some(pending) => {
                let lot = CreditLot {
                    lot_id: Uuid::new_v4(),
                    user_id,
                    original_credits: pending.credits,
                    credits_remaining: pending.credits,
                    unit_value_cents: pending.unit_value_cents,
                    remainder_cents: pending.remainder_cents,
                    source: pending.source,
                    payment_reference: pending.payment_reference,
                    created_at: now,
                };
                tx.insert_lot(&lot).await?;
                Some(lot)
            }
            None => None,
        };

        account.free_credits = free_after;
        account.paid_credits = paid_after;
        account.updated_at = now;
        tx.save_account(&account).await?;

        Ok(AppliedDelta { account, consumed, new_lot })
    }
}

pub(crate) async fn read_balance(tx: &mut dyn LedgerTx, user_id: Uuid) -> Result<BalanceSnapshot, Error> {
    let account = tx
        .read_account(user_id)
        .await?
        .unwrap_or_else(|| Account::empty(user_id, Utc::now()));
    let lots = tx.load_lots(user_id, true).await?;
    Ok(BalanceSnapshot {
        user_id,
        free_credits: account.free_credits,
        paid_credits: account.paid_credits,
        lots,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use creditbook_common::models::LotSource;
    use crate::repositories::MemoryBackend;

    fn paid_lot(credits: i64, unit: i64) -> NewLot {
        NewLot {
            credits,
            unit_value_cents: unit,
            remainder_cents: 0,
            source: LotSource::AdminGrant,
            payment_reference: None,
        }
    }

    #[tokio::test]
    async fn unknown_user_reads_as_zero() -> Result<(), Error> {
        let store = AccountStore::new(Arc::new(MemoryBackend::new()));
        let snap = store.get_balance(Uuid::new_v4()).await?;
        assert_eq!(snap.total_credits(), 0);
        assert!(snap.lots.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn rejects_negative_result_without_writing() -> Result<(), Error> {
        let backend = MemoryBackend::new();
        let user = Uuid::new_v4();

        let mut tx = backend.begin().await?;
        AccountStore::apply_delta(&mut *tx, user, BalanceDelta {
            free_delta: 3,
            paid_delta: 2,
            new_lot: Some(paid_lot(2, 50)),
        })
        .await?;
        tx.commit().await?;

        let mut tx = backend.begin().await?;
        let err = AccountStore::apply_delta(&mut *tx, user, BalanceDelta {
            free_delta: 0,
            paid_delta: -3,
            new_lot: None,
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance(_)));
        drop(tx);

        let snap = AccountStore::new(Arc::new(backend.clone())).get_balance(user).await?;
        assert_eq!((snap.free_credits, snap.paid_credits), (3, 2));
        assert_eq!(snap.lots[0].credits_remaining, 2);
        Ok(())
    }

    #[tokio::test]
    async fn lot_without_matching_paid_delta_is_rejected() -> Result<(), Error> {
        let backend = MemoryBackend::new();
        let mut tx = backend.begin().await?;
        let err = AccountStore::apply_delta(&mut *tx, Uuid::new_v4(), BalanceDelta {
            free_delta: 0,
            paid_delta: 5,
            new_lot: Some(paid_lot(4, 10)),
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::InvalidAmount(_)));
        Ok(())
    }

    #[tokio::test]
    async fn drifted_lots_are_reported_as_corruption() -> Result<(), Error> {
        let backend = MemoryBackend::new();
        let user = Uuid::new_v4();

        let mut tx = backend.begin().await?;
        AccountStore::apply_delta(&mut *tx, user, BalanceDelta {
            free_delta: 0,
            paid_delta: 5,
            new_lot: Some(paid_lot(5, 100)),
        })
        .await?;
        tx.commit().await?;

        backend
            .with_state_mut(|state| {
                if let Some(account) = state.accounts.get_mut(&user) {
                    account.paid_credits = 7;
                }
            })
            .await;

        let mut tx = backend.begin().await?;
        let err = AccountStore::apply_delta(&mut *tx, user, BalanceDelta {
            free_delta: 0,
            paid_delta: -1,
            new_lot: None,
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::LedgerCorruption(_)));
        Ok(())
    }
}
