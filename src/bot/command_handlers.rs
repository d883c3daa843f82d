//! Command Handlers module for processing bot commands

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::command::BotCommands;
use tracing::{debug, info};

use crate::db;
use crate::dialogue::{ChatDialogue, ChatDialogueState};
use crate::observability;
use crate::reports;
use crate::texts;
use crate::users;

use super::message_handler::{ensure_access, load_user};
use super::ui_builder;
use super::AppContext;

/// Команды бота:
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "snake_case")]
pub enum Command {
    /// Начать вести дневник питания.
    Start(String),
    /// Справка.
    Help,
    /// Статистика за день.
    Stats,
    /// Цель по калориям.
    SetGoal,
    /// Подписка.
    Subscribe,
}

/// Handle a parsed bot command
pub async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    ctx: Arc<AppContext>,
    dialogue: ChatDialogue,
) -> Result<()> {
    let span = observability::telegram_span(
        "command_handler",
        msg.from.as_ref().map(|user| user.id.0 as i64),
    );
    let _enter = span.enter();

    let user = load_user(&ctx, &msg).await?;
    debug!(user_id = %user.id, command = ?cmd, "Handling bot command");

    match cmd {
        Command::Start(payload) => handle_start(&bot, &msg, &ctx, &user, &payload).await,
        Command::Help => {
            bot.send_message(msg.chat.id, texts::HELP).await?;
            Ok(())
        }
        Command::Stats => handle_stats(&bot, &msg, &ctx, &user, dialogue).await,
        Command::SetGoal => handle_set_goal(&bot, &msg, &ctx, &user, dialogue).await,
        Command::Subscribe => handle_subscribe(&bot, &msg, &ctx).await,
    }
}

/// Handle the /start command: registration, source attribution, welcome
async fn handle_start(
    bot: &Bot,
    msg: &Message,
    ctx: &AppContext,
    user: &db::User,
    payload: &str,
) -> Result<()> {
    if !payload.trim().is_empty() {
        users::record_utm_source(&ctx.pool, user.id, payload).await?;
    }

    bot.send_message(msg.chat.id, texts::WELCOME)
        .reply_markup(ui_builder::main_menu_keyboard())
        .await?;

    observability::record_telegram_message("start_command");
    info!(user_id = %user.id, "User started the bot");
    Ok(())
}

/// Handle the /stats command
///
/// Stats are bucketed by the user's local calendar day, so the first request
/// detours through the timezone picker; the dialogue remembers to show the
/// stats once the timezone callback lands.
async fn handle_stats(
    bot: &Bot,
    msg: &Message,
    ctx: &AppContext,
    user: &db::User,
    dialogue: ChatDialogue,
) -> Result<()> {
    if !ensure_access(bot, msg.chat.id, ctx, user).await? {
        return Ok(());
    }

    if !user.timezone_set {
        bot.send_message(msg.chat.id, texts::TIMEZONE_PROMPT)
            .reply_markup(ui_builder::timezone_keyboard())
            .await?;
        dialogue
            .update(ChatDialogueState::AwaitingTimezone {
                show_stats_after: true,
            })
            .await?;
        return Ok(());
    }

    send_daily_stats(bot, msg.chat.id, ctx, user).await
}

/// Send today's stats with the navigation keyboard; shared with the
/// timezone callback
pub async fn send_daily_stats(
    bot: &Bot,
    chat_id: ChatId,
    ctx: &AppContext,
    user: &db::User,
) -> Result<()> {
    let today = users::local_date(&user.timezone, Utc::now());
    let view = reports::build_stats_view(&ctx.pool, user, today, today).await?;

    bot.send_message(chat_id, view.text)
        .parse_mode(ParseMode::Html)
        .reply_markup(ui_builder::stats_navigation_keyboard(
            view.prev_date,
            view.next_date,
        ))
        .await?;

    observability::record_telegram_message("stats_command");
    Ok(())
}

/// Handle the /set_goal command
async fn handle_set_goal(
    bot: &Bot,
    msg: &Message,
    ctx: &AppContext,
    user: &db::User,
    dialogue: ChatDialogue,
) -> Result<()> {
    if !ensure_access(bot, msg.chat.id, ctx, user).await? {
        return Ok(());
    }

    bot.send_message(msg.chat.id, texts::GOAL_PROMPT).await?;
    dialogue.update(ChatDialogueState::AwaitingCalorieGoal).await?;
    Ok(())
}

/// Handle the /subscribe command
async fn handle_subscribe(bot: &Bot, msg: &Message, ctx: &AppContext) -> Result<()> {
    let plans = ctx.payments_config.plans();

    bot.send_message(msg.chat.id, texts::CHOOSE_PLAN)
        .reply_markup(ui_builder::subscription_plans_keyboard(&plans))
        .await?;

    observability::record_telegram_message("subscribe_command");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parsing() {
        assert_eq!(
            Command::parse("/start", "nutrilog_bot").unwrap(),
            Command::Start(String::new())
        );
        assert_eq!(
            Command::parse("/start utm_source=blogger", "nutrilog_bot").unwrap(),
            Command::Start("utm_source=blogger".to_string())
        );
        assert_eq!(
            Command::parse("/set_goal", "nutrilog_bot").unwrap(),
            Command::SetGoal
        );
        assert_eq!(
            Command::parse("/stats@nutrilog_bot", "nutrilog_bot").unwrap(),
            Command::Stats
        );
        assert!(Command::parse("просто текст", "nutrilog_bot").is_err());
    }

    #[test]
    fn test_command_descriptions_listed() {
        let descriptions = Command::descriptions().to_string();
        for command in ["/start", "/help", "/stats", "/set_goal", "/subscribe"] {
            assert!(
                descriptions.contains(command),
                "missing {command} in descriptions"
            );
        }
    }
}
