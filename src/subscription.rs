//! Access gating: free trial, rolling report limit and paid subscriptions.
//!
//! Every gated interaction asks this module for a decision before doing any
//! work. Paying users are never rate-limited; trial users get a rolling cap on
//! analyzed meals; everyone else is pointed at the subscription menu.

use anyhow::Result;
use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use sqlx::PgPool;
use tracing::debug;

use crate::config::TrialConfig;
use crate::db;
use crate::users;

/// Outcome of an access check for one gated interaction
#[derive(Debug, Clone, PartialEq)]
pub enum AccessDecision {
    Allowed,
    TrialLimitExceeded { limit: i64, window_hours: i64 },
    SubscriptionRequired,
}

/// Decide whether the user may run another gated interaction right now
pub async fn check_access(
    pool: &PgPool,
    user: &db::User,
    trial: &TrialConfig,
    now: DateTime<Utc>,
) -> Result<AccessDecision> {
    let today = users::local_date(&user.timezone, now);

    let has_active_payment = db::find_active_payment(pool, user.id, today)
        .await?
        .is_some();

    // Trial users pay with a rolling meal cap instead of money
    let recent_meals = if has_active_payment {
        0
    } else {
        let window_start = now - Duration::hours(trial.report_window_hours);
        db::count_meals_since(pool, user.id, window_start).await?
    };

    let decision = evaluate(now, user.created_at, trial, has_active_payment, recent_meals);
    debug!(user_id = %user.id, decision = ?decision, "Access check");
    Ok(decision)
}

/// Pure decision core, separated from the lookups for testability
fn evaluate(
    now: DateTime<Utc>,
    registered_at: DateTime<Utc>,
    trial: &TrialConfig,
    has_active_payment: bool,
    recent_meal_count: i64,
) -> AccessDecision {
    if has_active_payment {
        return AccessDecision::Allowed;
    }

    let trial_ends_at = registered_at + Duration::days(trial.period_days);
    if now >= trial_ends_at {
        return AccessDecision::SubscriptionRequired;
    }

    if recent_meal_count >= trial.report_limit {
        return AccessDecision::TrialLimitExceeded {
            limit: trial.report_limit,
            window_hours: trial.report_window_hours,
        };
    }

    AccessDecision::Allowed
}

/// Subscription period starting today and running for the plan's months
pub fn plan_period(start: NaiveDate, months: u32) -> (NaiveDate, NaiveDate) {
    let end = start
        .checked_add_months(Months::new(months))
        .unwrap_or(start);
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn trial() -> TrialConfig {
        TrialConfig {
            period_days: 7,
            report_limit: 5,
            report_window_hours: 24,
        }
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_subscriber_is_never_limited() {
        // Registered long ago, way over the meal cap, but paying
        let decision = evaluate(at(20, 12), at(1, 12), &trial(), true, 100);
        assert_eq!(decision, AccessDecision::Allowed);
    }

    #[test]
    fn test_trial_user_under_cap_is_allowed() {
        let decision = evaluate(at(2, 12), at(1, 12), &trial(), false, 4);
        assert_eq!(decision, AccessDecision::Allowed);
    }

    #[test]
    fn test_trial_user_at_cap_is_limited() {
        let decision = evaluate(at(2, 12), at(1, 12), &trial(), false, 5);
        assert_eq!(
            decision,
            AccessDecision::TrialLimitExceeded {
                limit: 5,
                window_hours: 24
            }
        );
    }

    #[test]
    fn test_expired_trial_requires_subscription() {
        let decision = evaluate(at(9, 12), at(1, 12), &trial(), false, 0);
        assert_eq!(decision, AccessDecision::SubscriptionRequired);
    }

    #[test]
    fn test_trial_boundary_is_exclusive() {
        // Exactly seven days after registration the trial is over
        let decision = evaluate(at(8, 12), at(1, 12), &trial(), false, 0);
        assert_eq!(decision, AccessDecision::SubscriptionRequired);
    }

    #[test]
    fn test_plan_period_clamps_month_end() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        let (_, end) = plan_period(start, 1);
        assert_eq!(end, NaiveDate::from_ymd_opt(2025, 2, 28).unwrap());
    }

    #[test]
    fn test_plan_period_one_year() {
        let start = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let (_, end) = plan_period(start, 12);
        assert_eq!(end, NaiveDate::from_ymd_opt(2026, 3, 14).unwrap());
    }
}
