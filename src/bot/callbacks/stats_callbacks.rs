//! Stats navigation and timezone selection callbacks

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, ParseMode};
use tracing::{info, warn};

use crate::db;
use crate::dialogue::{ChatDialogue, ChatDialogueState};
use crate::reports;
use crate::texts;
use crate::users;

use super::super::command_handlers;
use super::super::ui_builder;
use super::super::AppContext;
use super::callback_handler::query_message;

/// Move the stats message to another local calendar day
pub async fn handle_stats_navigation(
    bot: &Bot,
    q: &CallbackQuery,
    ctx: &AppContext,
    user: &db::User,
    date: &str,
) -> Result<()> {
    let Some((chat_id, message_id)) = query_message(q) else {
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };

    let Ok(date) = date.parse::<NaiveDate>() else {
        warn!(data = %date, "Malformed date in stats callback");
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };

    // Stale buttons can outlive the history they pointed at, in both directions
    let today = users::local_date(&user.timezone, Utc::now());
    let range = db::get_report_date_range(&ctx.pool, user.id).await?;
    if !reports::date_within_history(range, date, today) {
        bot.answer_callback_query(q.id.clone())
            .text(texts::NO_DATA_FOR_DATE)
            .await?;
        return Ok(());
    }

    let view = reports::build_stats_view(&ctx.pool, user, date, today).await?;
    bot.edit_message_text(chat_id, message_id, view.text)
        .parse_mode(ParseMode::Html)
        .reply_markup(ui_builder::stats_navigation_keyboard(
            view.prev_date,
            view.next_date,
        ))
        .await?;

    bot.answer_callback_query(q.id.clone()).await?;
    Ok(())
}

/// Store the chosen timezone and resume whatever prompted the picker
pub async fn handle_timezone_choice(
    bot: &Bot,
    q: &CallbackQuery,
    ctx: &AppContext,
    user: &db::User,
    dialogue: &ChatDialogue,
    offset: &str,
) -> Result<()> {
    if users::parse_utc_offset(offset).is_none() {
        warn!(data = %offset, "Malformed offset in timezone callback");
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    }

    db::set_user_timezone(&ctx.pool, user.id, offset).await?;
    info!(user_id = %user.id, timezone = %offset, "Timezone set");

    // Replacing the prompt text also removes the picker keyboard
    if let Some((chat_id, message_id)) = query_message(q) {
        bot.edit_message_text(chat_id, message_id, texts::TIMEZONE_SAVED)
            .await?;
    }

    let show_stats_after = matches!(
        dialogue.get().await?,
        Some(ChatDialogueState::AwaitingTimezone {
            show_stats_after: true,
        })
    );
    dialogue.exit().await?;

    if show_stats_after {
        if let Some((chat_id, _)) = query_message(q) {
            // Re-read the user so the stats use the timezone just stored
            if let Some(fresh) = db::get_user_by_id(&ctx.pool, user.id).await? {
                command_handlers::send_daily_stats(bot, chat_id, ctx, &fresh).await?;
            }
        }
    }

    bot.answer_callback_query(q.id.clone()).await?;
    Ok(())
}
