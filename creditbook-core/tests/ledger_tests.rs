// File: creditbook-core/tests/ledger_tests.rs

use std::sync::Arc;
use chrono::{Duration, Utc};
use futures_util::future::join_all;
use uuid::Uuid;

use creditbook_common::models::{
    AdminGrant, AdminRevoke, BonusRuleInput, NewPromoCode, PaymentCredit, PromoCodeUpdate,
};
use creditbook_common::traits::repository_traits::PromoCodeRepository;
use creditbook_core::{
    cache::{BonusRuleCache, CacheConfig},
    repositories::MemoryBackend,
    services::{BonusRuleService, LedgerService, PromoService},
    test_utils::helpers::memory_ledger,
    Error,
};

fn payment(reference: &str, user_id: Uuid, pack_id: &str, credits: i64, price_cents: i64) -> PaymentCredit {
    PaymentCredit {
        payment_reference: reference.to_string(),
        user_id,
        pack_id: pack_id.to_string(),
        credits,
        price_cents,
    }
}

fn grant(user_id: Uuid, free: i64, paid: i64, unit: i64) -> AdminGrant {
    AdminGrant {
        admin_id: Uuid::new_v4(),
        user_id,
        free_amount: free,
        paid_amount: paid,
        unit_value_cents: unit,
        reason: "support ticket".to_string(),
    }
}

fn welcome10() -> NewPromoCode {
    NewPromoCode {
        code: "welcome10".to_string(),
        description: Some("New user bonus".to_string()),
        free_credits: 10,
        max_uses: Some(100),
        allow_multiple_per_user: false,
        is_active: true,
        expires_at: None,
    }
}

/// Non-negative counters, and open lots summing to `paid_credits`, for every account.
async fn assert_ledger_consistent(backend: &MemoryBackend) {
    let state = backend.snapshot().await;
    for account in state.accounts.values() {
        assert!(account.free_credits >= 0, "negative free credits: {:?}", account);
        assert!(account.paid_credits >= 0, "negative paid credits: {:?}", account);
        let lot_sum: i64 = state
            .lots
            .iter()
            .filter(|l| l.user_id == account.user_id)
            .map(|l| l.credits_remaining)
            .sum();
        assert_eq!(lot_sum, account.paid_credits, "lots drifted for {}", account.user_id);
    }
    for lot in &state.lots {
        assert!(lot.credits_remaining >= 0 && lot.credits_remaining <= lot.original_credits);
    }
}

#[tokio::test]
async fn test_welcome10_redeemed_once_per_user() -> Result<(), Error> {
    let (ledger, backend) = memory_ledger();
    let promos = PromoService::new(Arc::new(backend.clone()));
    promos.create(Uuid::new_v4(), welcome10()).await?;

    let user = Uuid::new_v4();
    let outcome = ledger.redeem_promo(user, "  Welcome10 ").await?;
    assert_eq!(outcome.code, "WELCOME10");
    assert_eq!(outcome.free_credits_granted, 10);
    assert_eq!(outcome.free_credits, 10);

    let err = ledger.redeem_promo(user, "WELCOME10").await.unwrap_err();
    assert!(matches!(err, Error::AlreadyRedeemed(_)));

    let balance = ledger.get_balance(user).await?;
    assert_eq!(balance.free_credits, 10);
    assert_eq!(promos.get("WELCOME10").await?.current_uses, 1);

    // A different user can still use it.
    ledger.redeem_promo(Uuid::new_v4(), "WELCOME10").await?;
    assert_eq!(promos.get("WELCOME10").await?.current_uses, 2);

    let stats = promos.list_with_stats().await?;
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].redemption_count, 2);
    assert_eq!(stats[0].unique_users, 2);
    assert_eq!(stats[0].credits_granted, 20);
    assert_eq!(stats[0].remaining_uses, Some(98));
    Ok(())
}

#[tokio::test]
async fn test_promo_rejections() -> Result<(), Error> {
    let (ledger, backend) = memory_ledger();
    let promos = PromoService::new(Arc::new(backend.clone()));
    let admin = Uuid::new_v4();
    let user = Uuid::new_v4();

    assert!(matches!(ledger.redeem_promo(user, "NOPE").await, Err(Error::CodeNotFound(_))));
    assert!(matches!(ledger.redeem_promo(user, "   ").await, Err(Error::Validation(_))));

    let mut inactive = welcome10();
    inactive.code = "PAUSED".into();
    inactive.is_active = false;
    promos.create(admin, inactive).await?;
    assert!(matches!(ledger.redeem_promo(user, "paused").await, Err(Error::CodeNotFound(_))));

    let mut single = welcome10();
    single.code = "ONLYONE".into();
    single.max_uses = Some(1);
    promos.create(admin, single).await?;
    ledger.redeem_promo(user, "ONLYONE").await?;
    assert!(matches!(
        ledger.redeem_promo(Uuid::new_v4(), "ONLYONE").await,
        Err(Error::CodeExhausted(_))
    ));

    let mut soon = welcome10();
    soon.code = "SOON".into();
    soon.expires_at = Some(Utc::now() + Duration::hours(1));
    promos.create(admin, soon).await?;
    backend
        .with_state_mut(|state| {
            if let Some(p) = state.promo_codes.get_mut("SOON") {
                p.expires_at = Some(Utc::now() - Duration::seconds(1));
            }
        })
        .await;
    assert!(matches!(ledger.redeem_promo(user, "SOON").await, Err(Error::CodeExpired(_))));

    // Only the one successful redemption moved the balance.
    assert_eq!(ledger.get_balance(user).await?.free_credits, 10);
    assert_ledger_consistent(&backend).await;
    Ok(())
}

#[tokio::test]
async fn test_multi_use_code_redeems_repeatedly() -> Result<(), Error> {
    let (ledger, backend) = memory_ledger();
    let promos = PromoService::new(Arc::new(backend.clone()));
    let mut daily = welcome10();
    daily.code = "DAILY".into();
    daily.free_credits = 3;
    daily.allow_multiple_per_user = true;
    daily.max_uses = None;
    promos.create(Uuid::new_v4(), daily).await?;

    let user = Uuid::new_v4();
    for _ in 0..3 {
        ledger.redeem_promo(user, "DAILY").await?;
    }
    assert_eq!(ledger.get_balance(user).await?.free_credits, 9);
    Ok(())
}

#[tokio::test]
async fn test_max_uses_cannot_drop_below_uses_recorded_since_read() -> Result<(), Error> {
    let (ledger, backend) = memory_ledger();
    let promos = PromoService::new(Arc::new(backend.clone()));
    let mut spring = welcome10();
    spring.code = "SPRING".into();
    spring.max_uses = Some(10);
    let seen = promos.create(Uuid::new_v4(), spring).await?;
    assert_eq!(seen.current_uses, 0);

    for _ in 0..3 {
        ledger.redeem_promo(Uuid::new_v4(), "SPRING").await?;
    }

    // `seen` is stale now; the repository must check against the stored row.
    let lower = PromoCodeUpdate { max_uses: Some(Some(1)), ..Default::default() };
    let err = backend.update_promo_code(&seen.code, &lower).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    let stored = promos.get("SPRING").await?;
    assert_eq!((stored.current_uses, stored.max_uses), (3, Some(10)));

    let at_limit = PromoCodeUpdate { max_uses: Some(Some(3)), ..Default::default() };
    assert_eq!(promos.update("spring", at_limit).await?.max_uses, Some(3));
    assert!(matches!(
        ledger.redeem_promo(Uuid::new_v4(), "SPRING").await,
        Err(Error::CodeExhausted(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_deleted_code_keeps_history_and_cannot_be_reissued() -> Result<(), Error> {
    let (ledger, backend) = memory_ledger();
    let promos = PromoService::new(Arc::new(backend.clone()));
    let admin = Uuid::new_v4();
    promos.create(admin, welcome10()).await?;

    let user = Uuid::new_v4();
    ledger.redeem_promo(user, "WELCOME10").await?;
    promos.delete("WELCOME10").await?;

    assert!(matches!(ledger.redeem_promo(Uuid::new_v4(), "WELCOME10").await, Err(Error::CodeNotFound(_))));
    assert!(matches!(promos.get("WELCOME10").await, Err(Error::NotFound(_))));
    assert!(promos.list_with_stats().await?.is_empty());
    assert_eq!(backend.snapshot().await.redemptions.len(), 1);

    // Recreating the code would let `user` redeem it a second time.
    assert!(matches!(promos.create(admin, welcome10()).await, Err(Error::DuplicateCode(_))));
    assert_eq!(ledger.get_balance(user).await?.free_credits, 10);
    Ok(())
}

#[tokio::test]
async fn test_pi_123_payment_with_bonus_and_redelivery() -> Result<(), Error> {
    let backend = MemoryBackend::new();
    let cache = Arc::new(BonusRuleCache::new(Arc::new(backend.clone()), CacheConfig { max_age_seconds: None }));
    let rules = BonusRuleService::new(Arc::new(backend.clone()), cache.clone());
    let ledger = LedgerService::new(Arc::new(backend.clone()), cache, Default::default());

    rules
        .upsert("pack_15", BonusRuleInput { pack_credits: 15, bonus_free_credits: 2, is_active: true })
        .await?;

    let user = Uuid::new_v4();
    let first = ledger.credit_from_payment(&payment("pi_123", user, "pack_15", 15, 1199)).await?;
    assert!(!first.replayed);
    assert_eq!(first.result.paid_credits_added, 15);
    assert_eq!(first.result.bonus_credits_added, 2);
    assert_eq!(first.result.unit_value_cents, 79);
    assert_eq!(first.result.remainder_cents, 14);

    let balance = ledger.get_balance(user).await?;
    assert_eq!((balance.free_credits, balance.paid_credits), (2, 15));
    assert_eq!(balance.lots.len(), 1);
    assert_eq!(balance.lots[0].total_cost_cents(), 1199);
    assert_eq!(balance.lots[0].payment_reference.as_deref(), Some("pi_123"));

    let again = ledger.credit_from_payment(&payment("pi_123", user, "pack_15", 15, 1199)).await?;
    assert!(again.replayed);
    assert_eq!(again.result, first.result);

    let balance = ledger.get_balance(user).await?;
    assert_eq!((balance.free_credits, balance.paid_credits), (2, 15));
    assert_eq!(balance.lots.len(), 1);
    assert_ledger_consistent(&backend).await;
    Ok(())
}

#[tokio::test]
async fn test_bonus_only_for_matching_active_pack() -> Result<(), Error> {
    let backend = MemoryBackend::new();
    let cache = Arc::new(BonusRuleCache::new(Arc::new(backend.clone()), CacheConfig { max_age_seconds: None }));
    let rules = BonusRuleService::new(Arc::new(backend.clone()), cache.clone());
    let ledger = LedgerService::new(Arc::new(backend.clone()), cache, Default::default());
    let user = Uuid::new_v4();

    rules
        .upsert("pack_50", BonusRuleInput { pack_credits: 50, bonus_free_credits: 10, is_active: true })
        .await?;

    // Size differs from the configured pack.
    let odd = ledger.credit_from_payment(&payment("pi_a", user, "pack_50", 49, 4900)).await?;
    assert_eq!(odd.result.bonus_credits_added, 0);

    // Unknown pack.
    let unknown = ledger.credit_from_payment(&payment("pi_b", user, "pack_x", 50, 5000)).await?;
    assert_eq!(unknown.result.bonus_credits_added, 0);

    // Deactivating takes effect immediately through the cache invalidation.
    rules
        .upsert("pack_50", BonusRuleInput { pack_credits: 50, bonus_free_credits: 10, is_active: false })
        .await?;
    let off = ledger.credit_from_payment(&payment("pi_c", user, "pack_50", 50, 5000)).await?;
    assert_eq!(off.result.bonus_credits_added, 0);

    rules
        .upsert("pack_50", BonusRuleInput { pack_credits: 50, bonus_free_credits: 10, is_active: true })
        .await?;
    let on = ledger.credit_from_payment(&payment("pi_d", user, "pack_50", 50, 5000)).await?;
    assert_eq!(on.result.bonus_credits_added, 10);

    assert_eq!(ledger.get_balance(user).await?.free_credits, 10);
    Ok(())
}

#[tokio::test]
async fn test_payment_replays_equal_one() -> Result<(), Error> {
    let (ledger, backend) = memory_ledger();
    let user = Uuid::new_v4();
    let p = payment("pi_replay", user, "pack_10", 10, 999);

    let mut fresh = 0;
    for _ in 0..5 {
        if !ledger.credit_from_payment(&p).await?.replayed {
            fresh += 1;
        }
    }
    assert_eq!(fresh, 1);
    assert_eq!(ledger.get_balance(user).await?.paid_credits, 10);
    assert_eq!(backend.snapshot().await.idempotency.len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_webhooks_credit_once() -> Result<(), Error> {
    let (ledger, backend) = memory_ledger();
    let user = Uuid::new_v4();
    let p = payment("pi_race", user, "pack_10", 10, 1000);

    let results = join_all((0..8).map(|_| ledger.credit_from_payment(&p))).await;
    let mut fresh = 0;
    for r in results {
        if !r?.replayed {
            fresh += 1;
        }
    }
    assert_eq!(fresh, 1);
    assert_eq!(ledger.get_balance(user).await?.paid_credits, 10);
    assert_ledger_consistent(&backend).await;
    Ok(())
}

#[tokio::test]
async fn test_invalid_payment_is_rejected_before_any_write() -> Result<(), Error> {
    let (ledger, backend) = memory_ledger();
    let user = Uuid::new_v4();
    assert!(matches!(
        ledger.credit_from_payment(&payment("pi_zero", user, "pack", 0, 100)).await,
        Err(Error::InvalidAmount(_))
    ));
    assert!(matches!(
        ledger.credit_from_payment(&payment(" ", user, "pack", 5, 100)).await,
        Err(Error::Validation(_))
    ));
    assert!(backend.snapshot().await.idempotency.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_admin_grant_then_spend_leaves_two_in_lot() -> Result<(), Error> {
    let (ledger, backend) = memory_ledger();
    let user = Uuid::new_v4();

    let account = ledger.admin_grant(&grant(user, 0, 5, 100)).await?;
    assert_eq!(account.paid_credits, 5);

    let outcome = ledger.debit_for_purchase(user, "res_tutorial", 3).await?;
    assert_eq!(outcome.unlock.free_spent, 0);
    assert_eq!(outcome.unlock.paid_spent, 3);
    assert_eq!(outcome.unlock.cost_basis_cents, 300);
    assert_eq!(outcome.remaining_balance(), 2);

    let balance = ledger.get_balance(user).await?;
    assert_eq!(balance.lots.len(), 1);
    assert_eq!(balance.lots[0].credits_remaining, 2);

    let state = backend.snapshot().await;
    assert_eq!(state.audit.len(), 1);
    assert_eq!(state.audit[0].action, "grant");
    assert_eq!(state.audit[0].unit_value_cents, Some(100));
    Ok(())
}

#[tokio::test]
async fn test_admin_grant_validation() -> Result<(), Error> {
    let (ledger, backend) = memory_ledger();
    let user = Uuid::new_v4();

    assert!(matches!(ledger.admin_grant(&grant(user, 0, 0, 0)).await, Err(Error::InvalidAmount(_))));
    assert!(matches!(ledger.admin_grant(&grant(user, -1, 5, 10)).await, Err(Error::InvalidAmount(_))));
    assert!(matches!(ledger.admin_grant(&grant(user, 0, 5, -10)).await, Err(Error::InvalidAmount(_))));
    let mut no_reason = grant(user, 5, 0, 0);
    no_reason.reason = "  ".into();
    assert!(matches!(ledger.admin_grant(&no_reason).await, Err(Error::Validation(_))));

    assert!(backend.snapshot().await.accounts.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_exact_balance_and_short_by_one() -> Result<(), Error> {
    let (ledger, backend) = memory_ledger();
    let exact = Uuid::new_v4();
    ledger.admin_grant(&grant(exact, 4, 6, 50)).await?;
    let outcome = ledger.debit_for_purchase(exact, "res_a", 10).await?;
    assert_eq!((outcome.free_credits, outcome.paid_credits), (0, 0));

    let short = Uuid::new_v4();
    ledger.admin_grant(&grant(short, 4, 5, 50)).await?;
    let err = ledger.debit_for_purchase(short, "res_a", 10).await.unwrap_err();
    assert!(matches!(err, Error::InsufficientCredits { needed: 10, available: 9 }));

    let balance = ledger.get_balance(short).await?;
    assert_eq!((balance.free_credits, balance.paid_credits), (4, 5));
    assert_eq!(balance.lots[0].credits_remaining, 5);
    assert_ledger_consistent(&backend).await;
    Ok(())
}

#[tokio::test]
async fn test_free_credits_spent_before_paid() -> Result<(), Error> {
    let (ledger, _backend) = memory_ledger();
    let user = Uuid::new_v4();
    ledger.admin_grant(&grant(user, 2, 5, 100)).await?;

    let outcome = ledger.debit_for_purchase(user, "res_b", 4).await?;
    assert_eq!(outcome.unlock.free_spent, 2);
    assert_eq!(outcome.unlock.paid_spent, 2);
    assert_eq!(outcome.unlock.cost_basis_cents, 200);
    assert_eq!((outcome.free_credits, outcome.paid_credits), (0, 3));
    Ok(())
}

#[tokio::test]
async fn test_fifo_across_lots_with_remainder() -> Result<(), Error> {
    let (ledger, _backend) = memory_ledger();
    let user = Uuid::new_v4();

    // 100 cents / 3 credits => 33 per unit, 1 cent remainder on the first unit.
    ledger.credit_from_payment(&payment("pi_old", user, "p3", 3, 100)).await?;
    ledger.credit_from_payment(&payment("pi_new", user, "p2", 2, 500)).await?;

    let outcome = ledger.debit_for_purchase(user, "res_c", 4).await?;
    assert_eq!(outcome.unlock.cost_basis_cents, 100 + 250);

    let balance = ledger.get_balance(user).await?;
    assert_eq!(balance.paid_credits, 1);
    assert_eq!(balance.lots.len(), 1);
    assert_eq!(balance.lots[0].payment_reference.as_deref(), Some("pi_new"));
    assert_eq!(balance.lots[0].credits_remaining, 1);
    Ok(())
}

#[tokio::test]
async fn test_already_owned_wins_over_insufficient() -> Result<(), Error> {
    let (ledger, _backend) = memory_ledger();
    let user = Uuid::new_v4();
    ledger.admin_grant(&grant(user, 5, 0, 0)).await?;
    ledger.debit_for_purchase(user, "res_d", 5).await?;

    let err = ledger.debit_for_purchase(user, "res_d", 5).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyOwned(_)));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_underfunded_purchases() -> Result<(), Error> {
    let (ledger, backend) = memory_ledger();
    let ledger = Arc::new(ledger);
    let user = Uuid::new_v4();
    ledger.admin_grant(&grant(user, 2, 3, 100)).await?;

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.debit_for_purchase(user, &format!("res_{}", i), 3).await })
        })
        .collect();

    let mut ok = 0;
    for h in join_all(handles).await {
        match h.expect("task panicked") {
            Ok(_) => ok += 1,
            Err(Error::InsufficientCredits { .. }) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(ok, 1);

    let balance = ledger.get_balance(user).await?;
    assert_eq!(balance.total_credits(), 2);
    assert_ledger_consistent(&backend).await;
    Ok(())
}

#[tokio::test]
async fn test_admin_revoke_claws_back_fifo() -> Result<(), Error> {
    let (ledger, backend) = memory_ledger();
    let user = Uuid::new_v4();
    ledger.admin_grant(&grant(user, 3, 2, 100)).await?;
    ledger.credit_from_payment(&payment("pi_later", user, "p4", 4, 400)).await?;

    let revoke = AdminRevoke {
        admin_id: Uuid::new_v4(),
        user_id: user,
        free_amount: 1,
        paid_amount: 3,
        reason: "chargeback".into(),
    };
    let account = ledger.admin_revoke(&revoke).await?;
    assert_eq!((account.free_credits, account.paid_credits), (2, 3));

    let balance = ledger.get_balance(user).await?;
    assert_eq!(balance.lots.len(), 1);
    assert_eq!(balance.lots[0].payment_reference.as_deref(), Some("pi_later"));
    assert_eq!(balance.lots[0].credits_remaining, 3);

    let too_much = AdminRevoke { paid_amount: 4, ..revoke.clone() };
    assert!(matches!(ledger.admin_revoke(&too_much).await, Err(Error::InsufficientBalance(_))));

    let nothing = AdminRevoke { free_amount: 0, paid_amount: 0, ..revoke };
    assert!(matches!(ledger.admin_revoke(&nothing).await, Err(Error::InvalidAmount(_))));

    assert_ledger_consistent(&backend).await;
    assert_eq!(backend.snapshot().await.audit.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_breakdown_totals() -> Result<(), Error> {
    let (ledger, backend) = memory_ledger();
    let promos = PromoService::new(Arc::new(backend.clone()));
    promos.create(Uuid::new_v4(), welcome10()).await?;
    let user = Uuid::new_v4();

    ledger.redeem_promo(user, "WELCOME10").await?;
    ledger.credit_from_payment(&payment("pi_1", user, "p10", 10, 1000)).await?;
    ledger.debit_for_purchase(user, "res_1", 12).await?;
    ledger
        .admin_revoke(&AdminRevoke {
            admin_id: Uuid::new_v4(),
            user_id: user,
            free_amount: 0,
            paid_amount: 1,
            reason: "refund".into(),
        })
        .await?;

    let b = ledger.get_breakdown(user).await?;
    assert_eq!((b.free_credits, b.paid_credits, b.total_credits), (0, 7, 7));
    assert_eq!(b.totals.free_granted, 10);
    assert_eq!(b.totals.paid_purchased, 10);
    assert_eq!(b.totals.free_spent, 10);
    assert_eq!(b.totals.paid_spent, 2);
    assert_eq!(b.totals.paid_revoked, 1);
    assert_eq!(b.totals.cost_basis_spent_cents, 200);
    assert_eq!(b.totals.unlock_count, 1);
    assert_eq!(b.open_lot_count, 1);
    assert_eq!(b.remaining_cost_basis_cents, 700);

    let empty = ledger.get_breakdown(Uuid::new_v4()).await?;
    assert_eq!(empty.total_credits, 0);
    assert_eq!(empty.totals.unlock_count, 0);
    Ok(())
}

#[tokio::test]
async fn test_corrupted_lots_abort_without_writing() -> Result<(), Error> {
    let (ledger, backend) = memory_ledger();
    let user = Uuid::new_v4();
    ledger.admin_grant(&grant(user, 0, 5, 100)).await?;

    backend
        .with_state_mut(|state| {
            for lot in state.lots.iter_mut().filter(|l| l.user_id == user) {
                lot.credits_remaining = 1;
            }
        })
        .await;

    let err = ledger.debit_for_purchase(user, "res_x", 3).await.unwrap_err();
    assert!(matches!(err, Error::LedgerCorruption(_)));

    let state = backend.snapshot().await;
    assert!(state.unlocks.is_empty());
    assert_eq!(state.accounts[&user].paid_credits, 5);
    Ok(())
}
