//! Cross-module integration tests for the access gate, registration cache
//! and the daily report pipeline. Like the database tests, these run only
//! when DATABASE_URL points at a Postgres instance.

mod test_helpers;

use anyhow::Result;
use chrono::{Duration, Utc};
use nutrilog::cache::RegistrationCache;
use nutrilog::config::TrialConfig;
use nutrilog::{db, reports, subscription, users};
use sqlx::PgPool;
use subscription::AccessDecision;
use test_helpers::{create_test_user, log_test_meal, setup_test_database};

macro_rules! skip_if_no_db {
    ($test_fn:expr) => {
        match setup_test_database().await? {
            Some(pool) => $test_fn(&pool).await,
            None => Ok(()),
        }
    };
}

fn short_trial() -> TrialConfig {
    TrialConfig {
        period_days: 3,
        report_limit: 2,
        report_window_hours: 24,
    }
}

/// Shift a user's registration time so trial-expiry branches can be exercised
async fn backdate_user(pool: &PgPool, user_id: i64, days: i64) -> Result<()> {
    sqlx::query("UPDATE users SET created_at = created_at - ($1 || ' days')::interval WHERE id = $2")
        .bind(days.to_string())
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_fresh_user_is_allowed() -> Result<()> {
    skip_if_no_db!(test_fresh_user_is_allowed_impl)
}

async fn test_fresh_user_is_allowed_impl(pool: &PgPool) -> Result<()> {
    let user = create_test_user(pool, 9_101).await?;
    let decision = subscription::check_access(pool, &user, &short_trial(), Utc::now()).await?;
    assert_eq!(decision, AccessDecision::Allowed);
    Ok(())
}

#[tokio::test]
async fn test_trial_user_hits_rolling_cap() -> Result<()> {
    skip_if_no_db!(test_trial_user_hits_rolling_cap_impl)
}

async fn test_trial_user_hits_rolling_cap_impl(pool: &PgPool) -> Result<()> {
    let user = create_test_user(pool, 9_102).await?;
    let trial = short_trial();

    log_test_meal(pool, user.id, "Завтрак", 300.0).await?;
    let decision = subscription::check_access(pool, &user, &trial, Utc::now()).await?;
    assert_eq!(decision, AccessDecision::Allowed);

    log_test_meal(pool, user.id, "Обед", 550.0).await?;
    let decision = subscription::check_access(pool, &user, &trial, Utc::now()).await?;
    assert_eq!(
        decision,
        AccessDecision::TrialLimitExceeded {
            limit: 2,
            window_hours: 24
        }
    );

    Ok(())
}

#[tokio::test]
async fn test_expired_trial_requires_subscription() -> Result<()> {
    skip_if_no_db!(test_expired_trial_requires_subscription_impl)
}

async fn test_expired_trial_requires_subscription_impl(pool: &PgPool) -> Result<()> {
    let user = create_test_user(pool, 9_103).await?;
    backdate_user(pool, user.id, 10).await?;
    let user = db::get_user_by_id(pool, user.id).await?.unwrap();

    let decision = subscription::check_access(pool, &user, &short_trial(), Utc::now()).await?;
    assert_eq!(decision, AccessDecision::SubscriptionRequired);

    Ok(())
}

#[tokio::test]
async fn test_paid_user_bypasses_trial_limits() -> Result<()> {
    skip_if_no_db!(test_paid_user_bypasses_trial_limits_impl)
}

async fn test_paid_user_bypasses_trial_limits_impl(pool: &PgPool) -> Result<()> {
    let user = create_test_user(pool, 9_104).await?;
    backdate_user(pool, user.id, 10).await?;
    let user = db::get_user_by_id(pool, user.id).await?.unwrap();

    // Over the meal cap on top of the expired trial
    for _ in 0..3 {
        log_test_meal(pool, user.id, "Перекус", 150.0).await?;
    }

    let today = Utc::now().date_naive();
    let (_, payment_id) = db::create_subscription_with_payment(
        pool,
        user.id,
        "Месячная",
        199.0,
        "RUB",
        today - Duration::days(1),
        today + Duration::days(29),
    )
    .await?;
    db::set_payment_status(pool, payment_id, "succeeded").await?;

    let decision = subscription::check_access(pool, &user, &short_trial(), Utc::now()).await?;
    assert_eq!(decision, AccessDecision::Allowed);

    Ok(())
}

#[tokio::test]
async fn test_ensure_registered_uses_cache() -> Result<()> {
    skip_if_no_db!(test_ensure_registered_uses_cache_impl)
}

async fn test_ensure_registered_uses_cache_impl(pool: &PgPool) -> Result<()> {
    let cache = RegistrationCache::new();

    let first = users::ensure_registered(pool, &cache, 9_105, Some("carol")).await?;
    assert_eq!(cache.get(9_105), Some(first));

    // Repeat calls resolve to the same user whether they hit the cache or not
    let second = users::ensure_registered(pool, &cache, 9_105, Some("carol")).await?;
    assert_eq!(first, second);

    cache.remove(9_105);
    let third = users::ensure_registered(pool, &cache, 9_105, None).await?;
    assert_eq!(first, third);

    Ok(())
}

#[tokio::test]
async fn test_daily_report_pipeline() -> Result<()> {
    skip_if_no_db!(test_daily_report_pipeline_impl)
}

async fn test_daily_report_pipeline_impl(pool: &PgPool) -> Result<()> {
    let user = create_test_user(pool, 9_106).await?;

    log_test_meal(pool, user.id, "Завтрак", 300.0).await?;
    let meal_id = log_test_meal(pool, user.id, "Обед", 550.0).await?;

    let today = users::local_date(&user.timezone, Utc::now());
    reports::recompute_daily_report(pool, user.id, today).await?;

    let report = db::get_daily_report(pool, user.id, today).await?.unwrap();
    assert_eq!(report.total_calories, 850.0);
    assert_eq!(db::get_daily_meals(pool, user.id, today).await?.len(), 2);

    // Dropping a meal and recomputing shrinks the snapshot
    db::delete_meal(pool, meal_id).await?;
    reports::recompute_daily_report(pool, user.id, today).await?;

    let report = db::get_daily_report(pool, user.id, today).await?.unwrap();
    assert_eq!(report.total_calories, 300.0);

    let view = reports::build_stats_view(pool, &user, today, today).await?;
    assert!(view.has_data);
    assert!(view.next_date.is_none());
    assert!(view.text.contains("Завтрак"));

    Ok(())
}
