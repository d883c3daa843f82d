//! Database layer integration tests, run against a real Postgres instance
//! when DATABASE_URL is set and skipped otherwise.

mod test_helpers;

use anyhow::Result;
use chrono::{Duration, NaiveDate, Utc};
use nutrilog::db::*;
use sqlx::PgPool;
use test_helpers::{
    create_test_user, log_test_meal, sample_ingredients, sample_meal, setup_test_database,
};

/// Helper macro to skip tests when the database is not available
macro_rules! skip_if_no_db {
    ($test_fn:expr) => {
        match setup_test_database().await? {
            Some(pool) => $test_fn(&pool).await,
            None => Ok(()),
        }
    };
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn test_user_operations() -> Result<()> {
    skip_if_no_db!(test_user_operations_impl)
}

async fn test_user_operations_impl(pool: &PgPool) -> Result<()> {
    let user = get_or_create_user(pool, 9_001, "alice").await?;
    assert_eq!(user.telegram_id, 9_001);
    assert_eq!(user.username, "alice");
    assert_eq!(user.timezone, "UTC");
    assert!(!user.timezone_set);
    assert_eq!(user.calorie_goal, 2000.0);
    assert_eq!(user.meal_count, 0);

    // A second call returns the same row without overwriting anything
    let again = get_or_create_user(pool, 9_001, "renamed").await?;
    assert_eq!(again.id, user.id);
    assert_eq!(again.username, "alice");

    assert_eq!(get_user_by_telegram_id(pool, 9_001).await?, Some(user.clone()));
    assert_eq!(get_user_by_id(pool, user.id).await?, Some(user.clone()));
    assert_eq!(get_user_by_telegram_id(pool, 8_888_888).await?, None);

    assert!(set_user_timezone(pool, user.id, "UTC+3").await?);
    assert!(set_calorie_goal(pool, user.id, 1800.0).await?);
    increment_meal_count(pool, user.id).await?;

    let updated = get_user_by_id(pool, user.id).await?.unwrap();
    assert_eq!(updated.timezone, "UTC+3");
    assert!(updated.timezone_set);
    assert_eq!(updated.calorie_goal, 1800.0);
    assert_eq!(updated.meal_count, 1);

    Ok(())
}

#[tokio::test]
async fn test_utm_source_is_write_once() -> Result<()> {
    skip_if_no_db!(test_utm_source_is_write_once_impl)
}

async fn test_utm_source_is_write_once_impl(pool: &PgPool) -> Result<()> {
    let user = create_test_user(pool, 9_002).await?;

    assert!(set_utm_source_if_empty(pool, user.id, "blogger").await?);
    assert!(!set_utm_source_if_empty(pool, user.id, "other").await?);

    let stored = get_user_by_id(pool, user.id).await?.unwrap();
    assert_eq!(stored.utm_source.as_deref(), Some("blogger"));

    Ok(())
}

#[tokio::test]
async fn test_meal_lifecycle() -> Result<()> {
    skip_if_no_db!(test_meal_lifecycle_impl)
}

async fn test_meal_lifecycle_impl(pool: &PgPool) -> Result<()> {
    let user = create_test_user(pool, 9_003).await?;

    let mut meal = sample_meal("Овсянка с бананом", 269.0);
    meal.photo_key = Some("meals/9003/breakfast.jpg".to_string());

    let meal_id =
        insert_meal_with_ingredients(pool, user.id, &meal, &sample_ingredients()).await?;
    assert!(meal_id > 0);

    let stored = get_meal(pool, meal_id).await?.unwrap();
    assert_eq!(stored.user_id, user.id);
    assert_eq!(stored.name, "Овсянка с бананом");
    assert_eq!(stored.photo_key.as_deref(), Some("meals/9003/breakfast.jpg"));

    let ingredients = get_meal_ingredients(pool, meal_id).await?;
    assert_eq!(ingredients.len(), 2);
    assert_eq!(ingredients[0].name, "Овсянка");
    assert_eq!(ingredients[1].name, "Банан");

    // Replacing the analysis swaps totals and ingredients but keeps the photo
    let corrected = sample_meal("Овсянка с бананом и мёдом", 320.0);
    assert!(replace_meal_analysis(pool, meal_id, &corrected, &[]).await?);

    let replaced = get_meal(pool, meal_id).await?.unwrap();
    assert_eq!(replaced.name, "Овсянка с бананом и мёдом");
    assert_eq!(replaced.total_calories, 320.0);
    assert_eq!(replaced.photo_key.as_deref(), Some("meals/9003/breakfast.jpg"));
    assert!(get_meal_ingredients(pool, meal_id).await?.is_empty());

    let deleted = delete_meal(pool, meal_id).await?.unwrap();
    assert_eq!(deleted.id, meal_id);
    assert_eq!(deleted.photo_key.as_deref(), Some("meals/9003/breakfast.jpg"));

    assert!(get_meal(pool, meal_id).await?.is_none());
    assert!(delete_meal(pool, meal_id).await?.is_none());
    assert!(!replace_meal_analysis(pool, meal_id, &corrected, &[]).await?);

    Ok(())
}

#[tokio::test]
async fn test_meal_aggregation() -> Result<()> {
    skip_if_no_db!(test_meal_aggregation_impl)
}

async fn test_meal_aggregation_impl(pool: &PgPool) -> Result<()> {
    let user = create_test_user(pool, 9_004).await?;
    let now = Utc::now();

    // Empty range sums to zeros rather than NULLs
    let empty = sum_meals_between(pool, user.id, now - Duration::days(1), now).await?;
    assert_eq!(empty, MealTotals::default());

    log_test_meal(pool, user.id, "Завтрак", 300.0).await?;
    log_test_meal(pool, user.id, "Обед", 550.0).await?;

    let from = now - Duration::hours(1);
    let to = now + Duration::hours(1);

    let totals = sum_meals_between(pool, user.id, from, to).await?;
    assert_eq!(totals.calories, 850.0);
    assert_eq!(totals.weight, 500.0);

    let meals = list_meals_between(pool, user.id, from, to).await?;
    assert_eq!(meals.len(), 2);
    assert_eq!(meals[0].name, "Завтрак");
    assert_eq!(meals[1].name, "Обед");

    assert_eq!(count_meals_since(pool, user.id, from).await?, 2);
    assert_eq!(
        count_meals_since(pool, user.id, now + Duration::hours(2)).await?,
        0
    );

    Ok(())
}

#[tokio::test]
async fn test_daily_report_replacement_is_idempotent() -> Result<()> {
    skip_if_no_db!(test_daily_report_replacement_is_idempotent_impl)
}

async fn test_daily_report_replacement_is_idempotent_impl(pool: &PgPool) -> Result<()> {
    let user = create_test_user(pool, 9_005).await?;
    let report_date = date(2025, 3, 14);

    let totals = MealTotals {
        weight: 500.0,
        calories: 850.0,
        protein: 24.0,
        fat: 16.0,
        carbs: 80.0,
        fiber: 7.0,
    };
    let entries = vec![
        DayMealEntry {
            name: "Завтрак".to_string(),
            calories: 300.0,
        },
        DayMealEntry {
            name: "Обед".to_string(),
            calories: 550.0,
        },
    ];

    replace_daily_report(pool, user.id, report_date, &totals, &entries).await?;
    replace_daily_report(pool, user.id, report_date, &totals, &entries).await?;

    let report = get_daily_report(pool, user.id, report_date).await?.unwrap();
    assert_eq!(report.total_calories, 850.0);

    // Replaying must not duplicate the meal list; positions stay 1-based
    let meals = get_daily_meals(pool, user.id, report_date).await?;
    assert_eq!(meals.len(), 2);
    assert_eq!(meals[0].position, 1);
    assert_eq!(meals[0].name, "Завтрак");
    assert_eq!(meals[1].position, 2);

    // An empty recompute clears the day
    replace_daily_report(pool, user.id, report_date, &MealTotals::default(), &[]).await?;
    let cleared = get_daily_report(pool, user.id, report_date).await?.unwrap();
    assert_eq!(cleared.total_calories, 0.0);
    assert!(get_daily_meals(pool, user.id, report_date).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_report_date_range() -> Result<()> {
    skip_if_no_db!(test_report_date_range_impl)
}

async fn test_report_date_range_impl(pool: &PgPool) -> Result<()> {
    let user = create_test_user(pool, 9_006).await?;
    assert_eq!(get_report_date_range(pool, user.id).await?, None);

    for day in [10, 12, 15] {
        replace_daily_report(pool, user.id, date(2025, 3, day), &MealTotals::default(), &[])
            .await?;
    }

    assert_eq!(
        get_report_date_range(pool, user.id).await?,
        Some((date(2025, 3, 10), date(2025, 3, 15)))
    );

    Ok(())
}

#[tokio::test]
async fn test_subscription_and_payment_lifecycle() -> Result<()> {
    skip_if_no_db!(test_subscription_and_payment_lifecycle_impl)
}

async fn test_subscription_and_payment_lifecycle_impl(pool: &PgPool) -> Result<()> {
    let user = create_test_user(pool, 9_007).await?;

    let (subscription_id, payment_id) = create_subscription_with_payment(
        pool,
        user.id,
        "Месячная",
        199.0,
        "RUB",
        date(2025, 3, 1),
        date(2025, 4, 1),
    )
    .await?;
    assert!(subscription_id > 0);

    let payment = get_payment(pool, payment_id).await?.unwrap();
    assert_eq!(payment.user_id, user.id);
    assert_eq!(payment.subscription_id, subscription_id);
    assert_eq!(payment.status, "pending");
    assert_eq!(payment.provider_payment_id, None);

    assert!(set_payment_provider_id(pool, payment_id, "prov-1001").await?);
    let by_provider = get_payment_by_provider_id(pool, "prov-1001").await?.unwrap();
    assert_eq!(by_provider.id, payment_id);
    assert!(get_payment_by_provider_id(pool, "prov-unknown").await?.is_none());

    assert!(set_payment_status(pool, payment_id, "succeeded").await?);
    assert_eq!(
        get_payment(pool, payment_id).await?.unwrap().status,
        "succeeded"
    );

    Ok(())
}

#[tokio::test]
async fn test_find_active_payment_respects_period() -> Result<()> {
    skip_if_no_db!(test_find_active_payment_respects_period_impl)
}

async fn test_find_active_payment_respects_period_impl(pool: &PgPool) -> Result<()> {
    let user = create_test_user(pool, 9_008).await?;

    let (_, payment_id) = create_subscription_with_payment(
        pool,
        user.id,
        "Месячная",
        199.0,
        "RUB",
        date(2025, 3, 1),
        date(2025, 4, 1),
    )
    .await?;

    // A pending payment never grants access
    assert!(find_active_payment(pool, user.id, date(2025, 3, 15))
        .await?
        .is_none());

    set_payment_status(pool, payment_id, "succeeded").await?;

    // Both period boundaries are inclusive
    assert!(find_active_payment(pool, user.id, date(2025, 3, 1))
        .await?
        .is_some());
    assert!(find_active_payment(pool, user.id, date(2025, 4, 1))
        .await?
        .is_some());
    assert!(find_active_payment(pool, user.id, date(2025, 2, 28))
        .await?
        .is_none());
    assert!(find_active_payment(pool, user.id, date(2025, 4, 2))
        .await?
        .is_none());

    set_payment_status(pool, payment_id, "canceled").await?;
    assert!(find_active_payment(pool, user.id, date(2025, 3, 15))
        .await?
        .is_none());

    Ok(())
}

#[tokio::test]
async fn test_trial_ending_sweep_targets() -> Result<()> {
    skip_if_no_db!(test_trial_ending_sweep_targets_impl)
}

async fn test_trial_ending_sweep_targets_impl(pool: &PgPool) -> Result<()> {
    // Created just now, so a one-day trial ends within the next 24 hours
    let ending = create_test_user(pool, 9_009).await?;

    // Same situation but already paid for a covering period
    let paid = create_test_user(pool, 9_010).await?;
    let today = Utc::now().date_naive();
    let (_, payment_id) = create_subscription_with_payment(
        pool,
        paid.id,
        "Месячная",
        199.0,
        "RUB",
        today,
        today + Duration::days(30),
    )
    .await?;
    set_payment_status(pool, payment_id, "succeeded").await?;

    let due: Vec<i64> = list_users_with_trial_ending(pool, 1)
        .await?
        .into_iter()
        .map(|user| user.id)
        .collect();

    assert!(due.contains(&ending.id));
    assert!(!due.contains(&paid.id));

    // With a week of trial left, neither user is due for the notice
    let far: Vec<i64> = list_users_with_trial_ending(pool, 8)
        .await?
        .into_iter()
        .map(|user| user.id)
        .collect();
    assert!(!far.contains(&ending.id));

    Ok(())
}
