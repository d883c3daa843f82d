//! Dialogue Manager module for text input while a dialogue state is active
//!
//! Two dialogue states accept free input: the calorie goal prompt and the
//! meal correction prompt. Corrections also accept voice messages, which are
//! transcribed first and then treated like typed text.

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{MessageId, ParseMode};
use tracing::{debug, info, warn};

use crate::analysis::{AnalysisInput, MealAnalysis};
use crate::db;
use crate::dialogue::ChatDialogue;
use crate::errors::error_logging;
use crate::observability;
use crate::texts;
use crate::users;

use super::analysis_flow;
use super::media_handlers;
use super::ui_builder;
use super::AppContext;

/// Handle text sent while the bot is waiting for a calorie goal
pub async fn handle_goal_input(
    bot: &Bot,
    msg: &Message,
    ctx: &AppContext,
    user: &db::User,
    dialogue: ChatDialogue,
    text: &str,
) -> Result<()> {
    let Some(goal) = users::parse_goal(text) else {
        debug!(user_id = %user.id, input = %text, "Rejected calorie goal input");
        bot.send_message(msg.chat.id, texts::GOAL_INVALID).await?;
        return Ok(());
    };

    db::set_calorie_goal(&ctx.pool, user.id, goal).await?;
    dialogue.exit().await?;

    bot.send_message(msg.chat.id, texts::format_goal_saved(goal))
        .await?;

    info!(user_id = %user.id, goal = %goal, "Calorie goal updated");
    Ok(())
}

/// Handle a meal correction sent while the edit prompt is active.
///
/// The corrected breakdown replaces the stored meal in place: the original
/// report message is edited rather than answered, and the prompt message is
/// removed so the chat reads as if the report was right all along.
#[allow(clippy::too_many_arguments)]
pub async fn handle_meal_correction(
    bot: &Bot,
    msg: &Message,
    ctx: &AppContext,
    user: &db::User,
    dialogue: ChatDialogue,
    meal_id: i64,
    report_message_id: i32,
    prompt_message_id: i32,
) -> Result<()> {
    let correction = match correction_text(bot, msg, ctx).await? {
        Some(text) => text,
        None => {
            bot.send_message(msg.chat.id, texts::EDIT_PROMPT).await?;
            return Ok(());
        }
    };

    let Some(meal) = db::get_meal(&ctx.pool, meal_id).await? else {
        bot.send_message(msg.chat.id, texts::MEAL_NOT_FOUND).await?;
        dialogue.exit().await?;
        return Ok(());
    };
    if meal.user_id != user.id {
        warn!(user_id = %user.id, meal_id = %meal_id, "Correction for someone else's meal");
        bot.send_message(msg.chat.id, texts::MEAL_NOT_FOUND).await?;
        dialogue.exit().await?;
        return Ok(());
    }

    let ingredients = db::get_meal_ingredients(&ctx.pool, meal_id).await?;
    let previous = MealAnalysis::from_stored(&meal, &ingredients);

    let input = AnalysisInput::Correction {
        previous,
        correction,
    };
    let analysis = match ctx.analysis.analyze_meal(&input, &ctx.breaker).await {
        Ok(analysis) => analysis,
        Err(e) => {
            error_logging::log_analysis_error(
                &e,
                "analyze_correction",
                Some(user.id),
                input.kind(),
                None,
            );
            bot.send_message(msg.chat.id, texts::ANALYSIS_FAILED).await?;
            return Ok(());
        }
    };

    if !analysis.is_food {
        bot.send_message(msg.chat.id, texts::NOT_FOOD).await?;
        return Ok(());
    }

    let (new_meal, new_ingredients) = analysis.into_meal_record(meal.photo_key.clone());
    db::replace_meal_analysis(&ctx.pool, meal_id, &new_meal, &new_ingredients).await?;

    // The meal keeps its original timestamp, so the rebuild targets the day
    // it was logged, not the day it was corrected
    analysis_flow::enqueue_recompute(ctx, user, meal.created_at);

    let updated = db::get_meal(&ctx.pool, meal_id).await?;
    let updated_ingredients = db::get_meal_ingredients(&ctx.pool, meal_id).await?;
    if let Some(updated) = updated {
        bot.edit_message_text(
            msg.chat.id,
            MessageId(report_message_id),
            texts::format_meal_report(&updated, &updated_ingredients),
        )
        .parse_mode(ParseMode::Html)
        .reply_markup(ui_builder::meal_report_keyboard(meal_id))
        .await?;
    }

    if let Err(e) = bot
        .delete_message(msg.chat.id, MessageId(prompt_message_id))
        .await
    {
        debug!("Failed to delete edit prompt message: {e}");
    }

    dialogue.exit().await?;
    observability::record_telegram_message("meal_corrected");
    info!(user_id = %user.id, meal_id = %meal_id, "Meal corrected");
    Ok(())
}

/// The correction as text: typed directly or transcribed from a voice message
async fn correction_text(bot: &Bot, msg: &Message, ctx: &AppContext) -> Result<Option<String>> {
    if let Some(text) = msg.text() {
        return Ok(Some(text.to_string()));
    }

    if let Some(voice) = msg.voice() {
        return match media_handlers::transcribe_voice(bot, ctx, voice.file.id.clone()).await {
            Ok(transcript) => Ok(transcript),
            Err(e) => {
                warn!("Failed to transcribe correction voice message: {e:#}");
                Ok(None)
            }
        };
    }

    Ok(None)
}
