//! First-in-first-out consumption of paid-credit lots.
//!
//! Pure arithmetic over lots already loaded (and locked) by a ledger transaction.
//! Callers persist the new `credits_remaining` values themselves.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::models::account::CreditLot;

/// Credits taken out of a single lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotDraw {
    pub lot_id: Uuid,
    pub credits: i64,
    pub cost_cents: i64,
    pub remaining_after: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FifoConsumption {
    pub draws: Vec<LotDraw>,
    pub total_cost_cents: i64,
}

impl FifoConsumption {
    pub fn credits(&self) -> i64 {
        self.draws.iter().map(|d| d.credits).sum()
    }
}

/// Sort lots oldest first. Ties keep their existing (insertion) order.
pub fn sort_fifo(lots: &mut [CreditLot]) {
    lots.sort_by_key(|l| l.created_at);
}

/// Verify that the lot set agrees with the aggregate counter.
pub fn check_lot_sum(user_id: Uuid, paid_credits: i64, lots: &[CreditLot]) -> Result<(), Error> {
    let mut sum: i64 = 0;
    for lot in lots {
        if lot.credits_remaining < 0 || lot.credits_remaining > lot.original_credits {
            return Err(Error::LedgerCorruption(format!(
                "lot {} of user {} has credits_remaining={} outside 0..={}",
                lot.lot_id, user_id, lot.credits_remaining, lot.original_credits
            )));
        }
        sum += lot.credits_remaining;
    }
    if sum != paid_credits {
        return Err(Error::LedgerCorruption(format!(
            "user {} paid_credits={} but open lots hold {}",
            user_id, paid_credits, sum
        )));
    }
    Ok(())
}

/// Take `amount` credits from `lots` (already in FIFO order), decrementing
/// `credits_remaining` in place.
///
/// Running out of lots means the aggregate counter and the lot set diverged.
pub fn consume_fifo(lots: &mut [CreditLot], amount: i64) -> Result<FifoConsumption, Error> {
    if amount < 0 {
        return Err(Error::InvalidAmount(format!("cannot consume {} credits", amount)));
    }

    let mut out = FifoConsumption::default();
    let mut still_needed = amount;

    for lot in lots.iter_mut() {
        if still_needed == 0 {
            break;
        }
        if lot.credits_remaining <= 0 {
            continue;
        }
        let take = still_needed.min(lot.credits_remaining);
        let cost = lot.cost_of_next(take);
        lot.credits_remaining -= take;
        still_needed -= take;

        out.total_cost_cents += cost;
        out.draws.push(LotDraw {
            lot_id: lot.lot_id,
            credits: take,
            cost_cents: cost,
            remaining_after: lot.credits_remaining,
        });
    }

    if still_needed > 0 {
        return Err(Error::LedgerCorruption(format!(
            "lots exhausted with {} of {} credits still to consume",
            still_needed, amount
        )));
    }
    Ok(out)
}
