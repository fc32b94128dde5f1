// File: creditbook-common/src/models/account.rs

use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-user balance row. Both counters are never negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub user_id: Uuid,
    pub free_credits: i64,
    pub paid_credits: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn empty(user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            free_credits: 0,
            paid_credits: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn total_credits(&self) -> i64 {
        self.free_credits + self.paid_credits
    }
}

/// Where the paid credits in a lot came from.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LotSource {
    Payment,
    AdminGrant,
}

impl fmt::Display for LotSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LotSource::Payment => write!(f, "payment"),
            LotSource::AdminGrant => write!(f, "admin_grant"),
        }
    }
}

impl FromStr for LotSource {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "payment" => Ok(LotSource::Payment),
            "admin_grant" => Ok(LotSource::AdminGrant),
            _ => Err(format!("Unknown lot source: {}", s)),
        }
    }
}

/// A batch of paid credits acquired in one transaction at one unit cost.
///
/// Lots are never deleted; an exhausted lot (`credits_remaining == 0`) stays
/// behind as cost-basis history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditLot {
    pub lot_id: Uuid,
    pub user_id: Uuid,
    pub original_credits: i64,
    pub credits_remaining: i64,
    pub unit_value_cents: i64,
    /// `price_cents % original_credits`, charged to the first unit consumed.
    pub remainder_cents: i64,
    pub source: LotSource,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CreditLot {
    /// Cost of the next `amount` units taken from this lot, given how many
    /// units were already consumed before.
    pub fn cost_of_next(&self, amount: i64) -> i64 {
        let already_consumed = self.original_credits - self.credits_remaining;
        let mut cost = amount * self.unit_value_cents;
        if already_consumed == 0 && amount > 0 {
            cost += self.remainder_cents;
        }
        cost
    }

    pub fn total_cost_cents(&self) -> i64 {
        self.original_credits * self.unit_value_cents + self.remainder_cents
    }
}

/// Paid credits to be added as a fresh lot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLot {
    pub credits: i64,
    pub unit_value_cents: i64,
    pub remainder_cents: i64,
    pub source: LotSource,
    pub payment_reference: Option<String>,
}

/// Read-only view returned by balance queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub user_id: Uuid,
    pub free_credits: i64,
    pub paid_credits: i64,
    pub lots: Vec<CreditLot>,
}

impl BalanceSnapshot {
    pub fn total_credits(&self) -> i64 {
        self.free_credits + self.paid_credits
    }
}

/// Balance plus lifetime totals derived from the ledger entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTotals {
    pub free_granted: i64,
    pub paid_purchased: i64,
    pub free_spent: i64,
    pub paid_spent: i64,
    pub free_revoked: i64,
    pub paid_revoked: i64,
    pub cost_basis_spent_cents: i64,
    pub unlock_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceBreakdown {
    pub user_id: Uuid,
    pub free_credits: i64,
    pub paid_credits: i64,
    pub total_credits: i64,
    pub open_lot_count: usize,
    /// Cost basis still sitting in unspent paid credits.
    pub remaining_cost_basis_cents: i64,
    pub lots: Vec<CreditLot>,
    pub totals: LedgerTotals,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryKind {
    AdminGrant,
    AdminRevoke,
    PromoRedemption,
    PaymentCredit,
    Purchase,
}

impl fmt::Display for LedgerEntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LedgerEntryKind::AdminGrant => "admin_grant",
            LedgerEntryKind::AdminRevoke => "admin_revoke",
            LedgerEntryKind::PromoRedemption => "promo_redemption",
            LedgerEntryKind::PaymentCredit => "payment_credit",
            LedgerEntryKind::Purchase => "purchase",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for LedgerEntryKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin_grant" => Ok(LedgerEntryKind::AdminGrant),
            "admin_revoke" => Ok(LedgerEntryKind::AdminRevoke),
            "promo_redemption" => Ok(LedgerEntryKind::PromoRedemption),
            "payment_credit" => Ok(LedgerEntryKind::PaymentCredit),
            "purchase" => Ok(LedgerEntryKind::Purchase),
            _ => Err(format!("Unknown ledger entry kind: {}", s)),
        }
    }
}

/// One row per committed balance mutation. Deltas are signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: Uuid,
    pub user_id: Uuid,
    pub kind: LedgerEntryKind,
    pub free_delta: i64,
    pub paid_delta: i64,
    /// Cost basis moved by this entry: acquisition cost for credits in,
    /// consumed FIFO cost for credits out.
    pub cost_cents: i64,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        user_id: Uuid,
        kind: LedgerEntryKind,
        free_delta: i64,
        paid_delta: i64,
        cost_cents: i64,
        reference: Option<String>,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            user_id,
            kind,
            free_delta,
            paid_delta,
            cost_cents,
            reference,
            created_at: Utc::now(),
        }
    }
}

/// Fold ledger entries into lifetime totals.
pub fn summarize_entries<'a, I>(entries: I) -> LedgerTotals
where
    I: IntoIterator<Item = &'a LedgerEntry>,
{
    let mut totals = LedgerTotals::default();
    for e in entries {
        match e.kind {
            LedgerEntryKind::AdminGrant | LedgerEntryKind::PromoRedemption | LedgerEntryKind::PaymentCredit => {
                totals.free_granted += e.free_delta.max(0);
                totals.paid_purchased += e.paid_delta.max(0);
            }
            LedgerEntryKind::Purchase => {
                totals.free_spent += -e.free_delta.min(0);
                totals.paid_spent += -e.paid_delta.min(0);
                totals.cost_basis_spent_cents += e.cost_cents;
                totals.unlock_count += 1;
            }
            LedgerEntryKind::AdminRevoke => {
                totals.free_revoked += -e.free_delta.min(0);
                totals.paid_revoked += -e.paid_delta.min(0);
            }
        }
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lot(original: i64, remaining: i64, unit: i64, remainder: i64) -> CreditLot {
        CreditLot {
            lot_id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            original_credits: original,
            credits_remaining: remaining,
            unit_value_cents: unit,
            remainder_cents: remainder,
            source: LotSource::Payment,
            payment_reference: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn remainder_is_charged_to_first_unit_only() {
        // 1199 cents / 15 credits => 79 per unit, 14 left over
        let fresh = lot(15, 15, 79, 14);
        assert_eq!(fresh.total_cost_cents(), 1199);
        assert_eq!(fresh.cost_of_next(1), 93);

        let touched = lot(15, 10, 79, 14);
        assert_eq!(touched.cost_of_next(1), 79);
        assert_eq!(touched.cost_of_next(0), 0);
    }

    #[test]
    fn totals_split_by_entry_kind() {
        let user = Uuid::new_v4();
        let entries = vec![
            LedgerEntry::new(user, LedgerEntryKind::PaymentCredit, 2, 15, 1199, Some("pi_1".into())),
            LedgerEntry::new(user, LedgerEntryKind::PromoRedemption, 10, 0, 0, Some("WELCOME10".into())),
            LedgerEntry::new(user, LedgerEntryKind::Purchase, -12, -3, 251, Some("res_1".into())),
            LedgerEntry::new(user, LedgerEntryKind::AdminRevoke, 0, -1, 79, None),
        ];
        let t = summarize_entries(&entries);
        assert_eq!(t.free_granted, 12);
        assert_eq!(t.paid_purchased, 15);
        assert_eq!(t.free_spent, 12);
        assert_eq!(t.paid_spent, 3);
        assert_eq!(t.paid_revoked, 1);
        assert_eq!(t.cost_basis_spent_cents, 251);
        assert_eq!(t.unlock_count, 1);
    }

    #[test]
    fn lot_source_round_trips_through_text() {
        assert_eq!("admin_grant".parse::<LotSource>().unwrap(), LotSource::AdminGrant);
        assert_eq!(LotSource::Payment.to_string(), "payment");
        assert!("refund".parse::<LotSource>().is_err());
    }
}
