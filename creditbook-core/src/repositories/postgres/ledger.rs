// File: creditbook-core/src/repositories/postgres/ledger.rs

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Pool, Postgres, Row, Transaction};
use uuid::Uuid;
use creditbook_common::error::Error;
use creditbook_common::models::{
    Account, AdminAuditEntry, CreditLot, LedgerEntry, LotSource, LedgerEntryKind,
    PaymentCreditResult, PromoCode, PromoRedemption, Reservation, Unlock,
};
use creditbook_common::traits::repository_traits::{LedgerStore, LedgerTx};

#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: Pool<Postgres>,
}

impl PostgresLedgerStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, Error> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresLedgerTx { tx: Some(tx) }))
    }

    async fn begin_snapshot(&self) -> Result<Box<dyn LedgerTx>, Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PostgresLedgerTx { tx: Some(tx) }))
    }
}

/// One open Postgres transaction. Dropped without commit => rolled back by sqlx.
pub struct PostgresLedgerTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PostgresLedgerTx {
    fn conn(&mut self) -> Result<&mut PgConnection, Error> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| Error::Validation("ledger transaction already finished".into()))
    }
}

const LOT_COLUMNS: &str = r#"
    lot_id, user_id, original_credits, credits_remaining,
    unit_value_cents, remainder_cents, source, payment_reference, created_at
"#;

fn lot_from_row(r: &PgRow) -> Result<CreditLot, Error> {
    let source: String = r.try_get("source")?;
    Ok(CreditLot {
        lot_id: r.try_get("lot_id")?,
        user_id: r.try_get("user_id")?,
        original_credits: r.try_get("original_credits")?,
        credits_remaining: r.try_get("credits_remaining")?,
        unit_value_cents: r.try_get("unit_value_cents")?,
        remainder_cents: r.try_get("remainder_cents")?,
        source: source.parse::<LotSource>().map_err(Error::LedgerCorruption)?,
        payment_reference: r.try_get("payment_reference")?,
        created_at: r.try_get("created_at")?,
    })
}

fn entry_from_row(r: &PgRow) -> Result<LedgerEntry, Error> {
    let kind: String = r.try_get("kind")?;
    Ok(LedgerEntry {
        entry_id: r.try_get("entry_id")?,
        user_id: r.try_get("user_id")?,
        kind: kind.parse::<LedgerEntryKind>().map_err(Error::LedgerCorruption)?,
        free_delta: r.try_get("free_delta")?,
        paid_delta: r.try_get("paid_delta")?,
        cost_cents: r.try_get("cost_cents")?,
        reference: r.try_get("reference")?,
        created_at: r.try_get("created_at")?,
    })
}

#[async_trait]
impl LedgerTx for PostgresLedgerTx {
    async fn lock_account(&mut self, user_id: Uuid) -> Result<Account, Error> {
        let now = Utc::now();
        let conn = self.conn()?;
        sqlx::query(
            r#"
            INSERT INTO accounts (user_id, free_credits, paid_credits, created_at, updated_at)
            VALUES ($1, 0, 0, $2, $2)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
            .bind(user_id)
            .bind(now)
            .execute(&mut *conn)
            .await?;

        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT user_id, free_credits, paid_credits, created_at, updated_at
            FROM accounts
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
            .bind(user_id)
            .fetch_one(&mut *conn)
            .await?;
        Ok(account)
    }

    async fn read_account(&mut self, user_id: Uuid) -> Result<Option<Account>, Error> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT user_id, free_credits, paid_credits, created_at, updated_at
            FROM accounts
            WHERE user_id = $1
            "#,
        )
            .bind(user_id)
            .fetch_optional(self.conn()?)
            .await?;
        Ok(account)
    }

    async fn save_account(&mut self, account: &Account) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET free_credits = $1,
                paid_credits = $2,
                updated_at = $3
            WHERE user_id = $4
            "#,
        )
            .bind(account.free_credits)
            .bind(account.paid_credits)
            .bind(account.updated_at)
            .bind(account.user_id)
            .execute(self.conn()?)
            .await?;
        Ok(())
    }

    async fn load_lots(&mut self, user_id: Uuid, open_only: bool) -> Result<Vec<CreditLot>, Error> {
        let sql = format!(
            "SELECT {} FROM credit_lots WHERE user_id = $1 {} ORDER BY created_at ASC, seq ASC",
            LOT_COLUMNS,
            if open_only { "AND credits_remaining > 0" } else { "" }
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(self.conn()?)
            .await?;

        let mut lots = Vec::with_capacity(rows.len());
        for r in &rows {
            lots.push(lot_from_row(r)?);
        }
        Ok(lots)
    }

    async fn insert_lot(&mut self, lot: &CreditLot) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO credit_lots (
                lot_id, user_id, original_credits, credits_remaining,
                unit_value_cents, remainder_cents, source, payment_reference, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
            .bind(lot.lot_id)
            .bind(lot.user_id)
            .bind(lot.original_credits)
            .bind(lot.credits_remaining)
            .bind(lot.unit_value_cents)
            .bind(lot.remainder_cents)
            .bind(lot.source.to_string())
            .bind(&lot.payment_reference)
            .bind(lot.created_at)
            .execute(self.conn()?)
            .await?;
        Ok(())
    }

    async fn update_lot_remaining(&mut self, lot_id: Uuid, credits_remaining: i64) -> Result<(), Error> {
        let res = sqlx::query("UPDATE credit_lots SET credits_remaining = $1 WHERE lot_id = $2")
            .bind(credits_remaining)
            .bind(lot_id)
            .execute(self.conn()?)
            .await?;
        if res.rows_affected() != 1 {
            return Err(Error::LedgerCorruption(format!("lot {} vanished during update", lot_id)));
        }
        Ok(())
    }

    async fn lock_promo_code(&mut self, code: &str) -> Result<Option<PromoCode>, Error> {
        let promo = sqlx::query_as::<_, PromoCode>(
            r#"
            SELECT promo_code_id, code, description, free_credits, max_uses, current_uses,
                   allow_multiple_per_user, is_active, expires_at, created_by,
                   created_at, updated_at
            FROM promo_codes
            WHERE code = $1 AND deleted_at IS NULL
            FOR UPDATE
            "#,
        )
            .bind(code)
            .fetch_optional(self.conn()?)
            .await?;
        Ok(promo)
    }

    async fn save_promo_uses(&mut self, promo_code_id: Uuid, current_uses: i64) -> Result<(), Error> {
        sqlx::query("UPDATE promo_codes SET current_uses = $1, updated_at = $2 WHERE promo_code_id = $3")
            .bind(current_uses)
            .bind(Utc::now())
            .bind(promo_code_id)
            .execute(self.conn()?)
            .await?;
        Ok(())
    }

    async fn count_redemptions(&mut self, promo_code_id: Uuid, user_id: Uuid) -> Result<i64, Error> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM promo_redemptions WHERE promo_code_id = $1 AND user_id = $2",
        )
            .bind(promo_code_id)
            .bind(user_id)
            .fetch_one(self.conn()?)
            .await?;
        Ok(count)
    }

    async fn insert_redemption(&mut self, redemption: &PromoRedemption) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO promo_redemptions (
                redemption_id, promo_code_id, user_id, free_credits_granted, redeemed_at
            )
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
            .bind(redemption.redemption_id)
            .bind(redemption.promo_code_id)
            .bind(redemption.user_id)
            .bind(redemption.free_credits_granted)
            .bind(redemption.redeemed_at)
            .execute(self.conn()?)
            .await?;
        Ok(())
    }

    async fn reserve_payment(&mut self, payment_reference: &str, user_id: Uuid) -> Result<Reservation, Error> {
        let conn = self.conn()?;
        // A concurrent holder of the same key makes this block until it
        // commits (conflict) or rolls back (we win).
        let inserted = sqlx::query(
            r#"
            INSERT INTO payment_idempotency_log (payment_reference, user_id, result, processed_at)
            VALUES ($1, $2, NULL, $3)
            ON CONFLICT (payment_reference) DO NOTHING
            "#,
        )
            .bind(payment_reference)
            .bind(user_id)
            .bind(Utc::now())
            .execute(&mut *conn)
            .await?;

        if inserted.rows_affected() == 1 {
            return Ok(Reservation::Reserved);
        }

        let stored: Option<serde_json::Value> = sqlx::query_scalar(
            "SELECT result FROM payment_idempotency_log WHERE payment_reference = $1",
        )
            .bind(payment_reference)
            .fetch_one(&mut *conn)
            .await?;

        match stored {
            Some(json) => Ok(Reservation::AlreadyProcessed(serde_json::from_value(json)?)),
            None => Err(Error::LedgerCorruption(format!(
                "payment reference {} committed without a result",
                payment_reference
            ))),
        }
    }

    async fn complete_payment(&mut self, payment_reference: &str, result: &PaymentCreditResult) -> Result<(), Error> {
        let json = serde_json::to_value(result)?;
        sqlx::query(
            "UPDATE payment_idempotency_log SET result = $1, processed_at = $2 WHERE payment_reference = $3",
        )
            .bind(json)
            .bind(Utc::now())
            .bind(payment_reference)
            .execute(self.conn()?)
            .await?;
        Ok(())
    }

    async fn find_unlock(&mut self, user_id: Uuid, resource_id: &str) -> Result<Option<Unlock>, Error> {
        let unlock = sqlx::query_as::<_, Unlock>(
            r#"
            SELECT unlock_id, user_id, resource_id, price_credits, free_spent,
                   paid_spent, cost_basis_cents, unlocked_at
            FROM unlocks
            WHERE user_id = $1 AND resource_id = $2
            "#,
        )
            .bind(user_id)
            .bind(resource_id)
            .fetch_optional(self.conn()?)
            .await?;
        Ok(unlock)
    }

    async fn insert_unlock(&mut self, unlock: &Unlock) -> Result<(), Error> {
        let res = sqlx::query(
            r#"
            INSERT INTO unlocks (
                unlock_id, user_id, resource_id, price_credits, free_spent,
                paid_spent, cost_basis_cents, unlocked_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
            .bind(unlock.unlock_id)
            .bind(unlock.user_id)
            .bind(&unlock.resource_id)
            .bind(unlock.price_credits)
            .bind(unlock.free_spent)
            .bind(unlock.paid_spent)
            .bind(unlock.cost_basis_cents)
            .bind(unlock.unlocked_at)
            .execute(self.conn()?)
            .await;

        match res {
            Ok(_) => Ok(()),
            Err(e) => {
                let err = Error::from(e);
                if err.is_unique_violation() {
                    Err(Error::AlreadyOwned(unlock.resource_id.clone()))
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn insert_ledger_entry(&mut self, entry: &LedgerEntry) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO ledger_entries (
                entry_id, user_id, kind, free_delta, paid_delta, cost_cents, reference, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
            .bind(entry.entry_id)
            .bind(entry.user_id)
            .bind(entry.kind.to_string())
            .bind(entry.free_delta)
            .bind(entry.paid_delta)
            .bind(entry.cost_cents)
            .bind(&entry.reference)
            .bind(entry.created_at)
            .execute(self.conn()?)
            .await?;
        Ok(())
    }

    async fn list_ledger_entries(&mut self, user_id: Uuid) -> Result<Vec<LedgerEntry>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT entry_id, user_id, kind, free_delta, paid_delta, cost_cents, reference, created_at
            FROM ledger_entries
            WHERE user_id = $1
            ORDER BY seq ASC
            "#,
        )
            .bind(user_id)
            .fetch_all(self.conn()?)
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for r in &rows {
            entries.push(entry_from_row(r)?);
        }
        Ok(entries)
    }

    async fn insert_audit(&mut self, entry: &AdminAuditEntry) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO admin_audit_log (
                audit_id, admin_id, user_id, action, free_amount,
                paid_amount, unit_value_cents, reason, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
            .bind(entry.audit_id)
            .bind(entry.admin_id)
            .bind(entry.user_id)
            .bind(&entry.action)
            .bind(entry.free_amount)
            .bind(entry.paid_amount)
            .bind(entry.unit_value_cents)
            .bind(&entry.reason)
            .bind(entry.created_at)
            .execute(self.conn()?)
            .await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), Error> {
        match self.tx.take() {
            Some(tx) => {
                tx.commit().await?;
                Ok(())
            }
            None => Err(Error::Validation("ledger transaction already finished".into())),
        }
    }

    async fn rollback(&mut self) -> Result<(), Error> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}
