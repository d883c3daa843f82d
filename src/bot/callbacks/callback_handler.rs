//! Callback Handler module for processing inline keyboard callback queries

use anyhow::{Context, Result};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, MessageId};
use tracing::{debug, warn};

use crate::db;
use crate::dialogue::ChatDialogue;
use crate::observability;
use crate::texts;
use crate::users;

use super::super::AppContext;
use super::{meal_callbacks, payment_callbacks, stats_callbacks};

/// Handle callback queries from inline keyboards.
///
/// Every button the bot sends encodes its action as a `prefix:payload`
/// string, so dispatch is a prefix match rather than dialogue-state driven.
pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    ctx: Arc<AppContext>,
    dialogue: ChatDialogue,
) -> Result<()> {
    let span = observability::telegram_span("callback_handler", Some(q.from.id.0 as i64));
    let _enter = span.enter();

    let start_time = std::time::Instant::now();

    let data = q.data.clone().unwrap_or_default();
    debug!(user_id = %q.from.id, data = %data, "Processing callback query");

    let user = load_callback_user(&ctx, &q).await?;

    let result = if let Some(meal_id) = data.strip_prefix("edit:") {
        meal_callbacks::handle_edit_request(&bot, &q, &ctx, &user, &dialogue, meal_id).await
    } else if let Some(meal_id) = data.strip_prefix("delete:") {
        meal_callbacks::handle_delete_request(&bot, &q, &ctx, &user, meal_id).await
    } else if let Some(date) = data.strip_prefix("stats:") {
        stats_callbacks::handle_stats_navigation(&bot, &q, &ctx, &user, date).await
    } else if let Some(offset) = data.strip_prefix("tz:") {
        stats_callbacks::handle_timezone_choice(&bot, &q, &ctx, &user, &dialogue, offset).await
    } else if data == "show_offer" {
        payment_callbacks::handle_show_offer(&bot, &q).await
    } else if let Some(months) = data.strip_prefix("sub_duration:") {
        payment_callbacks::handle_plan_selection(&bot, &q, &ctx, &user, months).await
    } else if let Some(payment_id) = data.strip_prefix("pay_check:") {
        payment_callbacks::handle_payment_check(&bot, &q, &ctx, &user, payment_id).await
    } else {
        warn!(data = %data, "Unknown callback data");
        bot.answer_callback_query(q.id.clone()).await?;
        Ok(())
    };

    if result.is_err() {
        // The loading spinner on the button would otherwise hang until
        // Telegram times the query out
        if let Err(e) = bot
            .answer_callback_query(q.id.clone())
            .text(texts::GENERIC_ERROR)
            .await
        {
            debug!("Failed to answer callback query after error: {e}");
        }
    }

    let status = if result.is_ok() { 200 } else { 500 };
    observability::record_request_metrics("telegram_callback", status, start_time.elapsed());

    result
}

/// Resolve the registered user behind a callback query
async fn load_callback_user(ctx: &AppContext, q: &CallbackQuery) -> Result<db::User> {
    let telegram_id = q.from.id.0 as i64;
    users::ensure_registered(&ctx.pool, &ctx.cache, telegram_id, q.from.username.as_deref())
        .await?;

    db::get_user_by_telegram_id(&ctx.pool, telegram_id)
        .await?
        .with_context(|| format!("User {telegram_id} missing right after registration"))
}

/// Chat and message the pressed keyboard was attached to, when still accessible
pub(super) fn query_message(q: &CallbackQuery) -> Option<(ChatId, MessageId)> {
    q.message.as_ref().map(|msg| (msg.chat().id, msg.id()))
}
