//! Daily report aggregation and the statistics view.
//!
//! A user's daily report is a derived table: whenever a meal is created,
//! edited or deleted, the report row and the day's meal list snapshot are
//! rebuilt from the meals table for the local calendar day the meal falls in.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::db::{self, DayMealEntry};
use crate::observability;
use crate::texts;

/// Everything the stats message and its navigation keyboard need
#[derive(Debug, Clone, PartialEq)]
pub struct StatsView {
    pub text: String,
    pub prev_date: Option<NaiveDate>,
    pub next_date: Option<NaiveDate>,
    pub has_data: bool,
}

/// Rebuild the daily report and meal list for one user and local date.
///
/// Aggregates straight from the meals table so repeated recomputes converge on
/// the same totals no matter how the queue interleaved them.
pub async fn recompute_daily_report(pool: &PgPool, user_id: i64, date: NaiveDate) -> Result<()> {
    let started = std::time::Instant::now();

    let user = db::get_user_by_id(pool, user_id)
        .await?
        .with_context(|| format!("No user found with ID: {user_id}"))?;

    let (from, to) = crate::users::local_day_bounds(&user.timezone, date);

    let totals = db::sum_meals_between(pool, user_id, from, to).await?;
    let meals = db::list_meals_between(pool, user_id, from, to).await?;

    let entries: Vec<DayMealEntry> = meals
        .into_iter()
        .map(|meal| DayMealEntry {
            name: meal.name,
            calories: meal.total_calories,
        })
        .collect();

    db::replace_daily_report(pool, user_id, date, &totals, &entries).await?;

    observability::record_db_metrics("recompute_daily_report", started.elapsed());
    info!(
        user_id = %user_id,
        date = %date,
        meals = entries.len(),
        calories = %totals.calories,
        "Daily report recomputed"
    );
    Ok(())
}

/// Assemble the stats message and navigation state for one date
pub async fn build_stats_view(
    pool: &PgPool,
    user: &db::User,
    date: NaiveDate,
    today: NaiveDate,
) -> Result<StatsView> {
    debug!(user_id = %user.id, date = %date, "Building stats view");

    let report = db::get_daily_report(pool, user.id, date).await?;
    let meals = db::get_daily_meals(pool, user.id, date).await?;
    let range = db::get_report_date_range(pool, user.id).await?;

    let has_data = report.is_some() || !meals.is_empty();
    let (prev_date, next_date) = navigation_dates(range, date, today);
    let text = texts::format_daily_stats(date, report.as_ref(), &meals, user.calorie_goal);

    Ok(StatsView {
        text,
        prev_date,
        next_date,
        has_data,
    })
}

/// Whether the stats view may show `date`: inside `[earliest report, today]`.
///
/// With no history only today is viewable (as an empty day).
pub fn date_within_history(
    range: Option<(NaiveDate, NaiveDate)>,
    date: NaiveDate,
    today: NaiveDate,
) -> bool {
    if date > today {
        return false;
    }
    match range {
        Some((earliest, _)) => date >= earliest,
        None => date == today,
    }
}

/// Dates the stats arrows may move to: back while history exists, forward up to today
fn navigation_dates(
    range: Option<(NaiveDate, NaiveDate)>,
    date: NaiveDate,
    today: NaiveDate,
) -> (Option<NaiveDate>, Option<NaiveDate>) {
    let prev = match range {
        Some((earliest, _)) if date > earliest => date.pred_opt(),
        _ => None,
    };
    let next = if date < today { date.succ_opt() } else { None };
    (prev, next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_navigation_without_history() {
        let today = date(2025, 3, 15);
        let (prev, next) = navigation_dates(None, today, today);

        assert_eq!(prev, None);
        assert_eq!(next, None);
    }

    #[test]
    fn test_navigation_middle_of_history() {
        let range = Some((date(2025, 3, 1), date(2025, 3, 15)));
        let (prev, next) = navigation_dates(range, date(2025, 3, 10), date(2025, 3, 15));

        assert_eq!(prev, Some(date(2025, 3, 9)));
        assert_eq!(next, Some(date(2025, 3, 11)));
    }

    #[test]
    fn test_navigation_stops_at_earliest_report() {
        let range = Some((date(2025, 3, 10), date(2025, 3, 15)));
        let (prev, _) = navigation_dates(range, date(2025, 3, 10), date(2025, 3, 15));

        assert_eq!(prev, None);
    }

    #[test]
    fn test_history_window_rejects_dates_before_first_report() {
        let range = Some((date(2025, 3, 10), date(2025, 3, 15)));
        let today = date(2025, 3, 20);

        assert!(!date_within_history(range, date(2025, 3, 9), today));
        assert!(date_within_history(range, date(2025, 3, 10), today));
        assert!(date_within_history(range, today, today));
    }

    #[test]
    fn test_history_window_rejects_future_dates() {
        let range = Some((date(2025, 3, 10), date(2025, 3, 15)));
        let today = date(2025, 3, 15);

        assert!(!date_within_history(range, date(2025, 3, 16), today));
    }

    #[test]
    fn test_history_window_without_reports_allows_only_today() {
        let today = date(2025, 3, 15);

        assert!(date_within_history(None, today, today));
        assert!(!date_within_history(None, date(2025, 3, 14), today));
    }

    #[test]
    fn test_navigation_never_goes_past_today() {
        let range = Some((date(2025, 3, 1), date(2025, 3, 15)));
        let (_, next) = navigation_dates(range, date(2025, 3, 15), date(2025, 3, 15));

        assert_eq!(next, None);
    }
}
