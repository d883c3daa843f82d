//! # Background Jobs Module
//!
//! This module runs deferred work on a queue so Telegram handlers can
//! respond quickly: daily report recomputes after a meal is logged, edited
//! or deleted, and the daily sweep notifying users whose trial is about to
//! end. Jobs are processed sequentially by a single worker task and a small
//! scheduler enqueues the trial sweep once per day.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use sqlx::postgres::PgPool;
use teloxide::prelude::*;
use tokio::sync::mpsc;
use tracing::{error, info, warn, Instrument};

use crate::config::TrialConfig;
use crate::db;
use crate::observability;
use crate::reports;
use crate::texts;

/// Hour of day (UTC) at which the trial-ending sweep runs
const TRIAL_SWEEP_HOUR: u32 = 10;

/// A unit of deferred work processed by the background worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Recompute the stored daily report for one user and local calendar date
    UpdateDailyReport { user_id: i64, date: NaiveDate },
    /// Notify users whose trial period ends within the next 24 hours
    NotifyTrialEnding,
}

/// Sending half of the job queue, shared with handlers and the webhook
pub type JobSender = mpsc::UnboundedSender<Job>;

/// Enqueue a job for the background worker
///
/// Sending only fails when the worker has stopped, which means the process
/// is shutting down, so the error is logged rather than propagated.
pub fn enqueue(sender: &JobSender, job: Job) {
    if let Err(e) = sender.send(job) {
        error!("Failed to enqueue background job: {e}");
    }
}

/// Spawn the background worker and return the queue handle
pub fn spawn_worker(pool: PgPool, bot: Bot, trial: TrialConfig) -> JobSender {
    let (sender, receiver) = mpsc::unbounded_channel();
    tokio::spawn(run_worker(pool, bot, trial, receiver));
    sender
}

/// Spawn the scheduler that enqueues the trial-ending sweep at 10:00 UTC daily
pub fn spawn_daily_scheduler(sender: JobSender) {
    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let next = next_sweep_after(now);
            let wait = (next - now)
                .to_std()
                .unwrap_or_else(|_| std::time::Duration::from_secs(1));

            info!("Next trial ending sweep scheduled at {next}");
            tokio::time::sleep(wait).await;

            enqueue(&sender, Job::NotifyTrialEnding);
        }
    });
}

async fn run_worker(
    pool: PgPool,
    bot: Bot,
    trial: TrialConfig,
    mut receiver: mpsc::UnboundedReceiver<Job>,
) {
    info!("Background job worker started");

    while let Some(job) = receiver.recv().await {
        let kind = match &job {
            Job::UpdateDailyReport { .. } => "update_daily_report",
            Job::NotifyTrialEnding => "notify_trial_ending",
        };
        let result = match process_job(&pool, &bot, &trial, &job).await {
            Ok(()) => "success",
            Err(e) => {
                error!("Background job {job:?} failed: {e:#}");
                "failure"
            }
        };
        metrics::counter!("jobs_processed_total", "job" => kind, "result" => result)
            .increment(1);
    }

    info!("Background job worker stopped");
}

async fn process_job(pool: &PgPool, bot: &Bot, trial: &TrialConfig, job: &Job) -> Result<()> {
    match job {
        Job::UpdateDailyReport { user_id, date } => {
            let span = observability::db_span("update_daily_report", "user_daily_reports");
            reports::recompute_daily_report(pool, *user_id, *date)
                .instrument(span)
                .await
                .context("Failed to recompute daily report")
        }
        Job::NotifyTrialEnding => notify_trial_ending(pool, bot, trial).await,
    }
}

/// Send the trial-ending notice to every user whose trial expires within
/// the next day and who has not paid yet
async fn notify_trial_ending(pool: &PgPool, bot: &Bot, trial: &TrialConfig) -> Result<()> {
    let users = db::list_users_with_trial_ending(pool, trial.period_days as i32)
        .await
        .context("Failed to list users with trial ending")?;

    info!("Trial ending sweep found {} users to notify", users.len());

    let mut delivered = 0;
    for user in &users {
        match bot
            .send_message(ChatId(user.telegram_id), texts::TRIAL_ENDING)
            .await
        {
            Ok(_) => {
                delivered += 1;
                observability::record_telegram_message("trial_notice");
            }
            Err(e) => {
                // Blocked bots and deleted accounts are expected here
                warn!(
                    "Failed to notify user {} about trial ending: {e}",
                    user.telegram_id
                );
            }
        }
    }

    info!(
        "Trial ending notifications delivered to {delivered} of {} users",
        users.len()
    );
    Ok(())
}

/// The next 10:00 UTC boundary strictly after `now`
fn next_sweep_after(now: DateTime<Utc>) -> DateTime<Utc> {
    let today_run = match now.date_naive().and_hms_opt(TRIAL_SWEEP_HOUR, 0, 0) {
        Some(naive) => Utc.from_utc_datetime(&naive),
        None => return now + chrono::Duration::hours(24),
    };

    if today_run > now {
        today_run
    } else {
        today_run + chrono::Duration::days(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_sweep_later_same_day() {
        let now = utc(2025, 6, 10, 7, 30);
        assert_eq!(next_sweep_after(now), utc(2025, 6, 10, 10, 0));
    }

    #[test]
    fn test_sweep_rolls_to_next_day() {
        let now = utc(2025, 6, 10, 15, 0);
        assert_eq!(next_sweep_after(now), utc(2025, 6, 11, 10, 0));
    }

    #[test]
    fn test_sweep_at_boundary_schedules_tomorrow() {
        let now = utc(2025, 6, 10, 10, 0);
        assert_eq!(next_sweep_after(now), utc(2025, 6, 11, 10, 0));
    }

    #[test]
    fn test_sweep_crosses_month_end() {
        let now = utc(2025, 1, 31, 23, 59);
        assert_eq!(next_sweep_after(now), utc(2025, 2, 1, 10, 0));
    }
}
