//! The analyze-persist-report pipeline shared by every meal input path
//!
//! Photo, voice, and text handlers all converge here: run the model, store
//! the breakdown, bump the meal counter, queue the daily report recompute,
//! and reply with the meal report message and its edit/delete keyboard.

use anyhow::Result;
use chrono::Utc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::{info, warn};

use crate::analysis::{AnalysisInput, MealAnalysis};
use crate::db;
use crate::errors::error_logging;
use crate::jobs::{self, Job};
use crate::observability;
use crate::texts;
use crate::users;

use super::ui_builder;
use super::AppContext;

/// Run the analysis for one meal submission and report the outcome.
///
/// `photo_key` is the already-uploaded object key for photo input; when the
/// submission turns out not to be food, or the analysis fails, the orphaned
/// object is removed again.
pub async fn analyze_and_report(
    bot: &Bot,
    chat_id: ChatId,
    ctx: &AppContext,
    user: &db::User,
    input: AnalysisInput,
    photo_key: Option<String>,
) -> Result<()> {
    let analysis = match ctx.analysis.analyze_meal(&input, &ctx.breaker).await {
        Ok(analysis) => analysis,
        Err(e) => {
            error_logging::log_analysis_error(
                &e,
                "analyze_meal",
                Some(user.id),
                input.kind(),
                None,
            );
            cleanup_photo(ctx, photo_key.as_deref()).await;
            bot.send_message(chat_id, texts::ANALYSIS_FAILED).await?;
            return Ok(());
        }
    };

    if !analysis.is_food {
        info!(user_id = %user.id, kind = input.kind(), "Submission rejected as non-food");
        cleanup_photo(ctx, photo_key.as_deref()).await;
        bot.send_message(chat_id, texts::NOT_FOOD).await?;
        return Ok(());
    }

    persist_and_report(bot, chat_id, ctx, user, analysis, photo_key).await
}

/// Store an accepted analysis and send the meal report message
pub async fn persist_and_report(
    bot: &Bot,
    chat_id: ChatId,
    ctx: &AppContext,
    user: &db::User,
    analysis: MealAnalysis,
    photo_key: Option<String>,
) -> Result<()> {
    let (new_meal, new_ingredients) = analysis.into_meal_record(photo_key);
    let meal_id =
        db::insert_meal_with_ingredients(&ctx.pool, user.id, &new_meal, &new_ingredients).await?;

    db::increment_meal_count(&ctx.pool, user.id).await?;
    enqueue_recompute(ctx, user, Utc::now());

    send_meal_report(bot, chat_id, ctx, meal_id).await?;

    observability::record_telegram_message("meal_logged");
    info!(
        user_id = %user.id,
        meal_id = %meal_id,
        name = %new_meal.name,
        calories = %new_meal.total_calories,
        "Meal logged"
    );
    Ok(())
}

/// Send (or resend) the stored meal's report with its edit/delete keyboard
pub async fn send_meal_report(
    bot: &Bot,
    chat_id: ChatId,
    ctx: &AppContext,
    meal_id: i64,
) -> Result<()> {
    let Some(meal) = db::get_meal(&ctx.pool, meal_id).await? else {
        bot.send_message(chat_id, texts::MEAL_NOT_FOUND).await?;
        return Ok(());
    };
    let ingredients = db::get_meal_ingredients(&ctx.pool, meal_id).await?;

    bot.send_message(chat_id, texts::format_meal_report(&meal, &ingredients))
        .parse_mode(ParseMode::Html)
        .reply_markup(ui_builder::meal_report_keyboard(meal_id))
        .await?;

    Ok(())
}

/// Queue a daily report rebuild for the local day an instant falls in
pub fn enqueue_recompute(ctx: &AppContext, user: &db::User, at: chrono::DateTime<Utc>) {
    let date = users::local_date(&user.timezone, at);
    jobs::enqueue(
        &ctx.jobs,
        Job::UpdateDailyReport {
            user_id: user.id,
            date,
        },
    );
}

/// Best-effort removal of a photo whose meal never made it into the database
async fn cleanup_photo(ctx: &AppContext, photo_key: Option<&str>) {
    if let Some(key) = photo_key {
        if let Err(e) = ctx.storage.delete_photo(key).await {
            warn!(key = %key, "Failed to clean up orphaned meal photo: {e:#}");
        }
    }
}
