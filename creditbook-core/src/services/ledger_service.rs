// File: src/services/ledger_service.rs
//
// Every balance mutation goes through here. Each public operation runs in a
// single ledger transaction that takes the account lock first; serialization
// failures and deadlocks rerun the whole operation.

use std::sync::Arc;
use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;
use creditbook_common::error::{Error, ErrorKind};
use creditbook_common::models::{
    normalize_code, summarize_entries, Account, AdminAuditEntry, AdminGrant, AdminRevoke,
    BalanceBreakdown, BalanceSnapshot, LedgerEntry, LedgerEntryKind, LotSource, NewLot,
    PaymentCredit, PaymentCreditOutcome, PaymentCreditResult, PromoRedemption, PurchaseOutcome,
    RedeemOutcome, Reservation, Unlock,
};
use creditbook_common::traits::repository_traits::{LedgerStore, LedgerTx};

use crate::cache::BonusRuleCache;
use crate::services::account_store::{AccountStore, BalanceDelta};

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Attempts per operation when the database reports a serialization
    /// failure or deadlock. At least 1.
    pub max_attempts: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    accounts: AccountStore,
    bonus_rules: Arc<BonusRuleCache>,
    config: LedgerConfig,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>, bonus_rules: Arc<BonusRuleCache>, config: LedgerConfig) -> Self {
        Self {
            accounts: AccountStore::new(store.clone()),
            store,
            bonus_rules,
            config,
        }
    }

    pub async fn get_balance(&self, user_id: Uuid) -> Result<BalanceSnapshot, Error> {
        self.accounts.get_balance(user_id).await
    }

    /// Balance plus lifetime totals, all read from one snapshot.
    pub async fn get_breakdown(&self, user_id: Uuid) -> Result<BalanceBreakdown, Error> {
        let mut tx = self.store.begin_snapshot().await?;
        let read = breakdown_in_tx(&mut *tx, user_id).await;
        finish(tx, read).await
    }

    pub async fn admin_grant(&self, grant: &AdminGrant) -> Result<Account, Error> {
        if grant.free_amount < 0 || grant.paid_amount < 0 {
            return Err(Error::InvalidAmount("grant amounts cannot be negative".into()));
        }
        if grant.free_amount == 0 && grant.paid_amount == 0 {
            return Err(Error::InvalidAmount("grant must add free or paid credits".into()));
        }
        if grant.unit_value_cents < 0 {
            return Err(Error::InvalidAmount("unit value cannot be negative".into()));
        }
        if grant.reason.trim().is_empty() {
            return Err(Error::Validation("grant reason is required".into()));
        }

        let mut attempt = 1;
        let account = loop {
            let mut tx = self.store.begin().await?;
            let res = grant_in_tx(&mut *tx, grant).await;
            match finish(tx, res).await {
                Err(e) if self.should_retry(&e, attempt, "admin_grant") => attempt += 1,
                other => break report("admin_grant", grant.user_id, other)?,
            }
        };

        info!(
            "admin {} granted user {} free={} paid={} @{}c ({})",
            grant.admin_id, grant.user_id, grant.free_amount, grant.paid_amount,
            grant.unit_value_cents, grant.reason
        );
        Ok(account)
    }

    pub async fn admin_revoke(&self, revoke: &AdminRevoke) -> Result<Account, Error> {
        if revoke.free_amount < 0 || revoke.paid_amount < 0 {
            return Err(Error::InvalidAmount("revocation amounts cannot be negative".into()));
        }
        if revoke.free_amount == 0 && revoke.paid_amount == 0 {
            return Err(Error::InvalidAmount("revocation must remove free or paid credits".into()));
        }
        if revoke.reason.trim().is_empty() {
            return Err(Error::Validation("revocation reason is required".into()));
        }

        let mut attempt = 1;
        let account = loop {
            let mut tx = self.store.begin().await?;
            let res = revoke_in_tx(&mut *tx, revoke).await;
            match finish(tx, res).await {
                Err(e) if self.should_retry(&e, attempt, "admin_revoke") => attempt += 1,
                other => break report("admin_revoke", revoke.user_id, other)?,
            }
        };

        info!(
            "admin {} revoked free={} paid={} from user {} ({})",
            revoke.admin_id, revoke.free_amount, revoke.paid_amount, revoke.user_id, revoke.reason
        );
        Ok(account)
    }

    pub async fn redeem_promo(&self, user_id: Uuid, raw_code: &str) -> Result<RedeemOutcome, Error> {
        let code = normalize_code(raw_code);
        if code.is_empty() {
            return Err(Error::Validation("promo code is required".into()));
        }

        let mut attempt = 1;
        let outcome = loop {
            let mut tx = self.store.begin().await?;
            let res = redeem_in_tx(&mut *tx, user_id, &code).await;
            match finish(tx, res).await {
                Err(e) if self.should_retry(&e, attempt, "redeem_promo") => attempt += 1,
                other => break report("redeem_promo", user_id, other)?,
            }
        };

        info!(
            "user {} redeemed {} for {} free credits",
            user_id, outcome.code, outcome.free_credits_granted
        );
        Ok(outcome)
    }

    /// Credit a confirmed payment. Delivering the same `payment_reference`
    /// again returns the first result with `replayed = true`.
    pub async fn credit_from_payment(&self, payment: &PaymentCredit) -> Result<PaymentCreditOutcome, Error> {
        if payment.payment_reference.trim().is_empty() {
            return Err(Error::Validation("payment reference is required".into()));
        }
        if payment.credits <= 0 {
            return Err(Error::InvalidAmount(format!("credits must be positive, got {}", payment.credits)));
        }
        if payment.price_cents < 0 {
            return Err(Error::InvalidAmount(format!("price cannot be negative, got {}", payment.price_cents)));
        }

        let bonus = self
            .bonus_rules
            .get(&payment.pack_id)
            .await?
            .map(|rule| rule.bonus_for(payment.credits))
            .unwrap_or(0);

        let mut attempt = 1;
        let outcome = loop {
            let mut tx = self.store.begin().await?;
            let res = credit_in_tx(&mut *tx, payment, bonus).await;
            match finish(tx, res).await {
                Err(e) if self.should_retry(&e, attempt, "credit_from_payment") => attempt += 1,
                other => break report("credit_from_payment", payment.user_id, other)?,
            }
        };

        if outcome.replayed {
            info!("payment {} already processed => no-op", payment.payment_reference);
        } else {
            info!(
                "payment {} credited user {} paid={} bonus={} @{}c (+{}c remainder)",
                payment.payment_reference,
                payment.user_id,
                outcome.result.paid_credits_added,
                outcome.result.bonus_credits_added,
                outcome.result.unit_value_cents,
                outcome.result.remainder_cents
            );
        }
        Ok(outcome)
    }

    /// Spend `price_credits` on `resource_id`: free credits first, then paid
    /// credits oldest lot first.
    pub async fn debit_for_purchase(
        &self,
        user_id: Uuid,
        resource_id: &str,
        price_credits: i64,
    ) -> Result<PurchaseOutcome, Error> {
        if resource_id.trim().is_empty() {
            return Err(Error::Validation("resource id is required".into()));
        }
        if price_credits < 0 {
            return Err(Error::InvalidAmount(format!("price cannot be negative, got {}", price_credits)));
        }

        let mut attempt = 1;
        let outcome = loop {
            let mut tx = self.store.begin().await?;
            let res = purchase_in_tx(&mut *tx, user_id, resource_id, price_credits).await;
            match finish(tx, res).await {
                Err(e) if self.should_retry(&e, attempt, "debit_for_purchase") => attempt += 1,
                other => break report("debit_for_purchase", user_id, other)?,
            }
        };

        info!(
            "user {} unlocked {} for {} credits (free={}, paid={}, cost={}c)",
            user_id,
            resource_id,
            price_credits,
            outcome.unlock.free_spent,
            outcome.unlock.paid_spent,
            outcome.unlock.cost_basis_cents
        );
        Ok(outcome)
    }

    fn should_retry(&self, err: &Error, attempt: u32, op: &str) -> bool {
        if err.is_retryable() && attempt < self.config.max_attempts {
            warn!("{} attempt {} hit a transient conflict, retrying: {}", op, attempt, err);
            return true;
        }
        false
    }
}

/// Commit on success, roll back on failure.
async fn finish<T>(mut tx: Box<dyn LedgerTx>, res: Result<T, Error>) -> Result<T, Error> {
    match res {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rb) = tx.rollback().await {
                warn!("rollback failed after '{}': {}", e, rb);
            }
            Err(e)
        }
    }
}

fn report<T>(op: &str, user_id: Uuid, res: Result<T, Error>) -> Result<T, Error> {
    if let Err(e) = &res {
        match e.kind() {
            ErrorKind::Corruption => error!("{} for user {} aborted: {}", op, user_id, e),
            ErrorKind::BusinessRule => warn!("{} for user {} rejected: {}", op, user_id, e),
            ErrorKind::Internal => error!("{} for user {} failed: {}", op, user_id, e),
            ErrorKind::Validation | ErrorKind::Authorization => {}
        }
    }
    res
}

async fn breakdown_in_tx(tx: &mut dyn LedgerTx, user_id: Uuid) -> Result<BalanceBreakdown, Error> {
    let account = tx
        .read_account(user_id)
        .await?
        .unwrap_or_else(|| Account::empty(user_id, Utc::now()));
    let lots = tx.load_lots(user_id, false).await?;
    let entries = tx.list_ledger_entries(user_id).await?;

    let open: Vec<_> = lots.iter().filter(|l| l.credits_remaining > 0).collect();
    let mut remaining_cost = 0i64;
    for lot in &open {
        remaining_cost = remaining_cost
            .checked_add(lot.cost_of_next(lot.credits_remaining))
            .ok_or_else(|| Error::LedgerCorruption(format!("cost basis overflow for user {}", user_id)))?;
    }

    Ok(BalanceBreakdown {
        user_id,
        free_credits: account.free_credits,
        paid_credits: account.paid_credits,
        total_credits: account.total_credits(),
        open_lot_count: open.len(),
        remaining_cost_basis_cents: remaining_cost,
        totals: summarize_entries(&entries),
        lots,
    })
}

async fn grant_in_tx(tx: &mut dyn LedgerTx, grant: &AdminGrant) -> Result<Account, Error> {
    let new_lot = (grant.paid_amount > 0).then(|| NewLot {
        credits: grant.paid_amount,
        unit_value_cents: grant.unit_value_cents,
        remainder_cents: 0,
        source: LotSource::AdminGrant,
        payment_reference: None,
    });
    let cost = grant
        .paid_amount
        .checked_mul(grant.unit_value_cents)
        .ok_or_else(|| Error::InvalidAmount("grant cost overflow".into()))?;

    let applied = AccountStore::apply_delta(tx, grant.user_id, BalanceDelta {
        free_delta: grant.free_amount,
        paid_delta: grant.paid_amount,
        new_lot,
    })
    .await?;

    tx.insert_ledger_entry(&LedgerEntry::new(
        grant.user_id,
        LedgerEntryKind::AdminGrant,
        grant.free_amount,
        grant.paid_amount,
        cost,
        Some(grant.reason.clone()),
    ))
    .await?;
    tx.insert_audit(&AdminAuditEntry::new(
        grant.admin_id,
        grant.user_id,
        "grant",
        grant.free_amount,
        grant.paid_amount,
        (grant.paid_amount > 0).then_some(grant.unit_value_cents),
        &grant.reason,
    ))
    .await?;

    Ok(applied.account)
}

async fn revoke_in_tx(tx: &mut dyn LedgerTx, revoke: &AdminRevoke) -> Result<Account, Error> {
    let applied = AccountStore::apply_delta(tx, revoke.user_id, BalanceDelta {
        free_delta: -revoke.free_amount,
        paid_delta: -revoke.paid_amount,
        new_lot: None,
    })
    .await?;

    tx.insert_ledger_entry(&LedgerEntry::new(
        revoke.user_id,
        LedgerEntryKind::AdminRevoke,
        -revoke.free_amount,
        -revoke.paid_amount,
        applied.consumed.total_cost_cents,
        Some(revoke.reason.clone()),
    ))
    .await?;
    tx.insert_audit(&AdminAuditEntry::new(
        revoke.admin_id,
        revoke.user_id,
        "revoke",
        revoke.free_amount,
        revoke.paid_amount,
        None,
        &revoke.reason,
    ))
    .await?;

    Ok(applied.account)
}

async fn redeem_in_tx(tx: &mut dyn LedgerTx, user_id: Uuid, code: &str) -> Result<RedeemOutcome, Error> {
    // Account first, then the promo row: every writer locks in this order.
    let account = tx.lock_account(user_id).await?;

    let promo = match tx.lock_promo_code(code).await? {
        Some(p) if p.is_active => p,
        _ => return Err(Error::CodeNotFound(code.to_string())),
    };
    let now = Utc::now();
    if promo.is_expired_at(now) {
        return Err(Error::CodeExpired(code.to_string()));
    }
    if promo.is_exhausted() {
        return Err(Error::CodeExhausted(code.to_string()));
    }
    if !promo.allow_multiple_per_user && tx.count_redemptions(promo.promo_code_id, user_id).await? > 0 {
        return Err(Error::AlreadyRedeemed(code.to_string()));
    }
    if promo.free_credits <= 0 {
        return Err(Error::InvalidAmount(format!("promo code {} grants no credits", code)));
    }

    tx.save_promo_uses(promo.promo_code_id, promo.current_uses + 1).await?;
    tx.insert_redemption(&PromoRedemption {
        redemption_id: Uuid::new_v4(),
        promo_code_id: promo.promo_code_id,
        user_id,
        free_credits_granted: promo.free_credits,
        redeemed_at: now,
    })
    .await?;

    let applied = AccountStore::apply_delta_locked(tx, account, BalanceDelta {
        free_delta: promo.free_credits,
        paid_delta: 0,
        new_lot: None,
    })
    .await?;

    tx.insert_ledger_entry(&LedgerEntry::new(
        user_id,
        LedgerEntryKind::PromoRedemption,
        promo.free_credits,
        0,
        0,
        Some(promo.code.clone()),
    ))
    .await?;

    Ok(RedeemOutcome {
        code: promo.code,
        free_credits_granted: promo.free_credits,
        free_credits: applied.account.free_credits,
        paid_credits: applied.account.paid_credits,
    })
}

async fn credit_in_tx(
    tx: &mut dyn LedgerTx,
    payment: &PaymentCredit,
    bonus: i64,
) -> Result<PaymentCreditOutcome, Error> {
    // Concurrent duplicates block here on the reference key.
    match tx.reserve_payment(&payment.payment_reference, payment.user_id).await? {
        Reservation::AlreadyProcessed(result) => {
            return Ok(PaymentCreditOutcome { result, replayed: true });
        }
        Reservation::Reserved => {}
    }

    let unit_value_cents = payment.price_cents / payment.credits;
    let remainder_cents = payment.price_cents % payment.credits;

    let applied = AccountStore::apply_delta(tx, payment.user_id, BalanceDelta {
        free_delta: bonus,
        paid_delta: payment.credits,
        new_lot: Some(NewLot {
            credits: payment.credits,
            unit_value_cents,
            remainder_cents,
            source: LotSource::Payment,
            payment_reference: Some(payment.payment_reference.clone()),
        }),
    })
    .await?;
    let lot_id = applied
        .new_lot
        .map(|lot| lot.lot_id)
        .ok_or_else(|| Error::LedgerCorruption("payment credit produced no lot".into()))?;

    tx.insert_ledger_entry(&LedgerEntry::new(
        payment.user_id,
        LedgerEntryKind::PaymentCredit,
        bonus,
        payment.credits,
        payment.price_cents,
        Some(payment.payment_reference.clone()),
    ))
    .await?;

    let result = PaymentCreditResult {
        paid_credits_added: payment.credits,
        bonus_credits_added: bonus,
        unit_value_cents,
        remainder_cents,
        lot_id,
    };
    tx.complete_payment(&payment.payment_reference, &result).await?;

    Ok(PaymentCreditOutcome { result, replayed: false })
}

async fn purchase_in_tx(
    tx: &mut dyn LedgerTx,
    user_id: Uuid,
    resource_id: &str,
    price_credits: i64,
) -> Result<PurchaseOutcome, Error> {
    let account = tx.lock_account(user_id).await?;

    if tx.find_unlock(user_id, resource_id).await?.is_some() {
        return Err(Error::AlreadyOwned(resource_id.to_string()));
    }
    let available = account.total_credits();
    if available < price_credits {
        return Err(Error::InsufficientCredits { needed: price_credits, available });
    }

    let free_spent = price_credits.min(account.free_credits);
    let paid_spent = price_credits - free_spent;

    let applied = AccountStore::apply_delta_locked(tx, account, BalanceDelta {
        free_delta: -free_spent,
        paid_delta: -paid_spent,
        new_lot: None,
    })
    .await?;

    let unlock = Unlock {
        unlock_id: Uuid::new_v4(),
        user_id,
        resource_id: resource_id.to_string(),
        price_credits,
        free_spent,
        paid_spent,
        cost_basis_cents: applied.consumed.total_cost_cents,
        unlocked_at: Utc::now(),
    };
    tx.insert_unlock(&unlock).await?;

    tx.insert_ledger_entry(&LedgerEntry::new(
        user_id,
        LedgerEntryKind::Purchase,
        -free_spent,
        -paid_spent,
        applied.consumed.total_cost_cents,
        Some(resource_id.to_string()),
    ))
    .await?;

    Ok(PurchaseOutcome {
        unlock,
        free_credits: applied.account.free_credits,
        paid_credits: applied.account.paid_credits,
    })
}
