//! Meal report callbacks: editing and deleting logged meals

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use tracing::{info, warn};

use crate::db;
use crate::dialogue::{ChatDialogue, ChatDialogueState};
use crate::observability;
use crate::texts;

use super::super::analysis_flow;
use super::super::AppContext;
use super::callback_handler::query_message;

/// Start the correction dialogue for a meal report.
///
/// The id of the report message is remembered so the corrected breakdown can
/// replace it in place, and the prompt's id so the prompt can be cleaned up.
pub async fn handle_edit_request(
    bot: &Bot,
    q: &CallbackQuery,
    ctx: &AppContext,
    user: &db::User,
    dialogue: &ChatDialogue,
    meal_id: &str,
) -> Result<()> {
    let Some((chat_id, report_message_id)) = query_message(q) else {
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };

    let Some(meal_id) = parse_owned_meal(ctx, user, meal_id).await? else {
        bot.answer_callback_query(q.id.clone())
            .text(texts::MEAL_NOT_FOUND)
            .await?;
        return Ok(());
    };

    let prompt = bot.send_message(chat_id, texts::EDIT_PROMPT).await?;
    dialogue
        .update(ChatDialogueState::EditingMeal {
            meal_id,
            report_message_id: report_message_id.0,
            prompt_message_id: prompt.id.0,
        })
        .await?;

    bot.answer_callback_query(q.id.clone()).await?;
    Ok(())
}

/// Delete a meal, its photo and its contribution to the daily report
pub async fn handle_delete_request(
    bot: &Bot,
    q: &CallbackQuery,
    ctx: &AppContext,
    user: &db::User,
    meal_id: &str,
) -> Result<()> {
    let Some(meal_id) = parse_owned_meal(ctx, user, meal_id).await? else {
        bot.answer_callback_query(q.id.clone())
            .text(texts::MEAL_NOT_FOUND)
            .await?;
        return Ok(());
    };

    let Some(meal) = db::delete_meal(&ctx.pool, meal_id).await? else {
        bot.answer_callback_query(q.id.clone())
            .text(texts::MEAL_NOT_FOUND)
            .await?;
        return Ok(());
    };

    if let Some(photo_key) = &meal.photo_key {
        if let Err(e) = ctx.storage.delete_photo(photo_key).await {
            warn!(photo_key = %photo_key, "Failed to delete meal photo: {e:#}");
        }
    }

    analysis_flow::enqueue_recompute(ctx, user, meal.created_at);

    // Replacing the report text also drops its inline keyboard
    if let Some((chat_id, message_id)) = query_message(q) {
        bot.edit_message_text(chat_id, message_id, texts::MEAL_DELETED)
            .await?;
    }

    bot.answer_callback_query(q.id.clone()).await?;
    observability::record_telegram_message("meal_deleted");
    info!(user_id = %user.id, meal_id = %meal_id, "Meal deleted");
    Ok(())
}

/// Parse a meal id from callback data and confirm the meal belongs to the user
async fn parse_owned_meal(ctx: &AppContext, user: &db::User, raw: &str) -> Result<Option<i64>> {
    let Ok(meal_id) = raw.parse::<i64>() else {
        warn!(data = %raw, "Malformed meal id in callback data");
        return Ok(None);
    };

    match db::get_meal(&ctx.pool, meal_id).await? {
        Some(meal) if meal.user_id == user.id => Ok(Some(meal_id)),
        Some(_) => {
            warn!(user_id = %user.id, meal_id = %meal_id, "Callback for someone else's meal");
            Ok(None)
        }
        None => Ok(None),
    }
}
