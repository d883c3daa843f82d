//! Message Handler module for processing incoming Telegram messages
//!
//! Commands are peeled off by the dispatcher before this handler runs, so
//! everything arriving here is meal input (photo, voice, free text) or a
//! reply to an active dialogue prompt. All analysis paths sit behind the
//! trial/subscription gate; the gate itself lives in `crate::subscription`.

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::{debug, warn};

use crate::db;
use crate::dialogue::{ChatDialogue, ChatDialogueState};
use crate::observability;
use crate::subscription::{self, AccessDecision};
use crate::texts;
use crate::users;

use super::dialogue_manager;
use super::media_handlers;
use super::AppContext;

/// Resolve the sender to a full user row, registering on first contact
pub async fn load_user(ctx: &AppContext, msg: &Message) -> Result<db::User> {
    let from = msg.from.as_ref();
    let telegram_id = from
        .map(|user| user.id.0 as i64)
        .unwrap_or(msg.chat.id.0);
    let username = from.and_then(|user| user.username.as_deref());

    users::ensure_registered(&ctx.pool, &ctx.cache, telegram_id, username).await?;

    db::get_user_by_telegram_id(&ctx.pool, telegram_id)
        .await?
        .with_context(|| format!("Registered user disappeared: telegram_id {telegram_id}"))
}

/// Run the access gate for one interaction; on denial the user is told why
/// and `false` is returned
pub async fn ensure_access(
    bot: &Bot,
    chat_id: ChatId,
    ctx: &AppContext,
    user: &db::User,
) -> Result<bool> {
    let decision = subscription::check_access(&ctx.pool, user, &ctx.trial, Utc::now()).await?;

    match decision {
        AccessDecision::Allowed => Ok(true),
        AccessDecision::TrialLimitExceeded {
            limit,
            window_hours,
        } => {
            bot.send_message(chat_id, texts::format_trial_limit(limit, window_hours))
                .await?;
            observability::record_telegram_message("trial_limit_denied");
            Ok(false)
        }
        AccessDecision::SubscriptionRequired => {
            bot.send_message(chat_id, texts::SUBSCRIPTION_REQUIRED)
                .await?;
            observability::record_telegram_message("subscription_denied");
            Ok(false)
        }
    }
}

/// Handle incoming non-command messages
pub async fn message_handler(
    bot: Bot,
    msg: Message,
    ctx: Arc<AppContext>,
    dialogue: ChatDialogue,
) -> Result<()> {
    let span = observability::telegram_span(
        "message_handler",
        msg.from.as_ref().map(|user| user.id.0 as i64),
    );
    let _enter = span.enter();

    let user = load_user(&ctx, &msg).await?;

    // Dialogue prompts come first so a pending question is not misread
    // as a fresh meal description
    let state = dialogue.get().await?.unwrap_or_default();
    match state {
        ChatDialogueState::AwaitingCalorieGoal => {
            if let Some(text) = msg.text() {
                return dialogue_manager::handle_goal_input(&bot, &msg, &ctx, &user, dialogue, text)
                    .await;
            }
        }
        ChatDialogueState::EditingMeal {
            meal_id,
            report_message_id,
            prompt_message_id,
        } => {
            if !ensure_access(&bot, msg.chat.id, &ctx, &user).await? {
                return Ok(());
            }
            return dialogue_manager::handle_meal_correction(
                &bot,
                &msg,
                &ctx,
                &user,
                dialogue,
                meal_id,
                report_message_id,
                prompt_message_id,
            )
            .await;
        }
        // The timezone is chosen through the inline keyboard, so free text
        // in that state falls through to normal handling
        ChatDialogueState::AwaitingTimezone { .. } | ChatDialogueState::Start => {}
    }

    if msg.photo().is_some() {
        if !ensure_access(&bot, msg.chat.id, &ctx, &user).await? {
            return Ok(());
        }
        return media_handlers::handle_photo_message(&bot, &msg, &ctx, &user).await;
    }

    if msg.voice().is_some() {
        if !ensure_access(&bot, msg.chat.id, &ctx, &user).await? {
            return Ok(());
        }
        return media_handlers::handle_voice_message(&bot, &msg, &ctx, &user).await;
    }

    if let Some(text) = msg.text() {
        if !ensure_access(&bot, msg.chat.id, &ctx, &user).await? {
            return Ok(());
        }
        debug!(user_id = %user.id, message_length = text.len(), "Received meal description");
        return media_handlers::handle_text_message(&bot, &msg, &ctx, &user, text).await;
    }

    warn!(user_id = %user.id, "Received unsupported message type");
    bot.send_message(msg.chat.id, texts::HELP).await?;
    Ok(())
}
