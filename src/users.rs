//! User registration and per-user settings.
//!
//! Covers the registration fast path (TTL cache in front of the users table),
//! deep-link source attribution, calorie goal validation and the timezone
//! arithmetic that decides which local calendar day a meal belongs to.

use anyhow::Result;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, Utc};
use sqlx::PgPool;
use tracing::{debug, info};

use crate::cache::RegistrationCache;
use crate::db;

/// Fallback username when Telegram does not provide one
const UNKNOWN_USERNAME: &str = "Unknown";

/// Daily calorie goal bounds
pub const MIN_CALORIE_GOAL: i64 = 200;
pub const MAX_CALORIE_GOAL: i64 = 10000;

/// Timezone choices offered by the timezone keyboard, as (label, stored value)
pub const TIMEZONE_CHOICES: &[(&str, &str)] = &[
    ("Калининград (UTC+2)", "UTC+2"),
    ("Москва (UTC+3)", "UTC+3"),
    ("Самара (UTC+4)", "UTC+4"),
    ("Екатеринбург (UTC+5)", "UTC+5"),
    ("Омск (UTC+6)", "UTC+6"),
    ("Красноярск (UTC+7)", "UTC+7"),
    ("Иркутск (UTC+8)", "UTC+8"),
    ("Якутск (UTC+9)", "UTC+9"),
    ("Владивосток (UTC+10)", "UTC+10"),
    ("Магадан (UTC+11)", "UTC+11"),
    ("Камчатка (UTC+12)", "UTC+12"),
];

/// Make sure the sender has a users row, creating one on first contact.
///
/// The registration cache keeps recent senders out of the upsert path, so a
/// chatty user costs one database round-trip per cache TTL instead of one per
/// message. Returns the internal user id.
pub async fn ensure_registered(
    pool: &PgPool,
    cache: &RegistrationCache,
    telegram_id: i64,
    username: Option<&str>,
) -> Result<i64> {
    if let Some(user_id) = cache.get(telegram_id) {
        return Ok(user_id);
    }

    let username = username.unwrap_or(UNKNOWN_USERNAME);
    let user = db::get_or_create_user(pool, telegram_id, username).await?;
    cache.insert(telegram_id, user.id);

    debug!(telegram_id = %telegram_id, user_id = %user.id, "User registration ensured");
    Ok(user.id)
}

/// Record where a newly started user came from, once.
///
/// The `/start` deep-link payload carries query-string pairs; only the first
/// `utm_source` ever seen for a user is stored.
pub async fn record_utm_source(pool: &PgPool, user_id: i64, payload: &str) -> Result<()> {
    if let Some(source) = parse_start_payload(payload) {
        if db::set_utm_source_if_empty(pool, user_id, &source).await? {
            info!(user_id = %user_id, utm_source = %source, "Recorded acquisition source");
        }
    }
    Ok(())
}

/// Extract `utm_source` from a `/start` deep-link payload
pub fn parse_start_payload(payload: &str) -> Option<String> {
    payload
        .split('&')
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            match (parts.next(), parts.next()) {
                (Some(key), Some(value)) => Some((key.trim(), value.trim())),
                _ => None,
            }
        })
        .find(|(key, value)| *key == "utm_source" && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Parse a daily calorie goal, accepting only whole numbers within bounds
pub fn parse_goal(text: &str) -> Option<f64> {
    let goal: i64 = text.trim().parse().ok()?;
    if (MIN_CALORIE_GOAL..=MAX_CALORIE_GOAL).contains(&goal) {
        Some(goal as f64)
    } else {
        None
    }
}

/// Parse a stored timezone value ("UTC", "UTC+3", "UTC-4") into an offset
pub fn parse_utc_offset(timezone: &str) -> Option<FixedOffset> {
    let timezone = timezone.trim();
    if timezone == "UTC" {
        return FixedOffset::east_opt(0);
    }

    let rest = timezone.strip_prefix("UTC")?;
    let (sign, hours) = if let Some(hours) = rest.strip_prefix('+') {
        (1, hours)
    } else if let Some(hours) = rest.strip_prefix('-') {
        (-1, hours)
    } else {
        return None;
    };

    let hours: i32 = hours.parse().ok()?;
    if hours > 14 {
        return None;
    }
    FixedOffset::east_opt(sign * hours * 3600)
}

/// The user's local calendar date at the given instant.
///
/// An unparseable stored timezone falls back to UTC rather than failing the
/// request.
pub fn local_date(timezone: &str, now: DateTime<Utc>) -> NaiveDate {
    match parse_utc_offset(timezone) {
        Some(offset) => now.with_timezone(&offset).date_naive(),
        None => now.date_naive(),
    }
}

/// UTC instants bounding one local calendar day, as a half-open range
pub fn local_day_bounds(timezone: &str, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let offset = parse_utc_offset(timezone).unwrap_or_else(|| Utc.fix());

    let start_local = date
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| naive.and_local_timezone(offset).single());

    let start = match start_local {
        Some(start) => start.with_timezone(&Utc),
        // Fixed offsets cannot produce ambiguous local times; treat the date as UTC if they do
        None => DateTime::from_naive_utc_and_offset(
            date.and_hms_opt(0, 0, 0).unwrap_or_default(),
            Utc,
        ),
    };

    (start, start + Duration::days(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Offset, TimeZone};

    #[test]
    fn test_parse_goal_accepts_bounds() {
        assert_eq!(parse_goal("200"), Some(200.0));
        assert_eq!(parse_goal("10000"), Some(10000.0));
        assert_eq!(parse_goal(" 1800 "), Some(1800.0));
    }

    #[test]
    fn test_parse_goal_rejects_out_of_range() {
        assert_eq!(parse_goal("199"), None);
        assert_eq!(parse_goal("10001"), None);
        assert_eq!(parse_goal("-500"), None);
    }

    #[test]
    fn test_parse_goal_rejects_non_numbers() {
        assert_eq!(parse_goal("две тысячи"), None);
        assert_eq!(parse_goal("1500.5"), None);
        assert_eq!(parse_goal(""), None);
    }

    #[test]
    fn test_parse_start_payload() {
        assert_eq!(
            parse_start_payload("utm_source=google"),
            Some("google".to_string())
        );
        assert_eq!(
            parse_start_payload("ref=abc&utm_source=blogger"),
            Some("blogger".to_string())
        );
        assert_eq!(parse_start_payload("utm_source="), None);
        assert_eq!(parse_start_payload("hello"), None);
        assert_eq!(parse_start_payload(""), None);
    }

    #[test]
    fn test_parse_utc_offset() {
        assert_eq!(parse_utc_offset("UTC"), FixedOffset::east_opt(0));
        assert_eq!(parse_utc_offset("UTC+3"), FixedOffset::east_opt(3 * 3600));
        assert_eq!(parse_utc_offset("UTC-4"), FixedOffset::east_opt(-4 * 3600));
        assert_eq!(parse_utc_offset("UTC+15"), None);
        assert_eq!(parse_utc_offset("Moscow"), None);
        assert_eq!(parse_utc_offset("UTC+"), None);
    }

    #[test]
    fn test_local_date_crosses_midnight() {
        // 22:30 UTC on March 14 is already March 15 in UTC+3
        let now = Utc.with_ymd_and_hms(2025, 3, 14, 22, 30, 0).unwrap();

        assert_eq!(
            local_date("UTC+3", now),
            NaiveDate::from_ymd_opt(2025, 3, 15).unwrap()
        );
        assert_eq!(
            local_date("UTC", now),
            NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
        );
    }

    #[test]
    fn test_local_date_falls_back_to_utc() {
        let now = Utc.with_ymd_and_hms(2025, 3, 14, 22, 30, 0).unwrap();
        assert_eq!(
            local_date("garbage", now),
            NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
        );
    }

    #[test]
    fn test_local_day_bounds_cover_one_day() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        let (start, end) = local_day_bounds("UTC+3", date);

        // Local midnight in UTC+3 is 21:00 UTC the previous evening
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 3, 14, 21, 0, 0).unwrap());
        assert_eq!(end - start, Duration::days(1));
    }

    #[test]
    fn test_utc_fix_offset_is_zero() {
        assert_eq!(Utc.fix(), FixedOffset::east_opt(0).unwrap());
    }
}
