//! Subscription purchase callbacks: offer, plan selection and payment checks

use anyhow::Result;
use chrono::Utc;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use tracing::{info, warn};

use crate::db;
use crate::errors::error_logging;
use crate::observability;
use crate::payments;
use crate::texts;
use crate::users;

use super::super::ui_builder;
use super::super::AppContext;
use super::callback_handler::query_message;

/// Send the public offer document text
pub async fn handle_show_offer(bot: &Bot, q: &CallbackQuery) -> Result<()> {
    if let Some((chat_id, _)) = query_message(q) {
        bot.send_message(chat_id, texts::OFFER).await?;
    }
    bot.answer_callback_query(q.id.clone()).await?;
    Ok(())
}

/// Register a pending payment for the chosen plan and hand out the pay link
pub async fn handle_plan_selection(
    bot: &Bot,
    q: &CallbackQuery,
    ctx: &AppContext,
    user: &db::User,
    months: &str,
) -> Result<()> {
    let Some((chat_id, _)) = query_message(q) else {
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };

    let plan = months
        .parse::<u32>()
        .ok()
        .and_then(|months| ctx.payments_config.plan_by_months(months));
    let Some(plan) = plan else {
        warn!(data = %months, "Unknown subscription plan in callback data");
        bot.answer_callback_query(q.id.clone())
            .text(texts::GENERIC_ERROR)
            .await?;
        return Ok(());
    };

    let today = users::local_date(&user.timezone, Utc::now());
    let ticket =
        match payments::start_subscription_payment(&ctx.pool, &ctx.payments, user.id, &plan, today)
            .await
        {
            Ok(ticket) => ticket,
            Err(e) => {
                error_logging::log_payment_error(
                    &format!("{e:#}"),
                    "start_subscription_payment",
                    Some(user.id),
                    None,
                    None,
                );
                bot.answer_callback_query(q.id.clone())
                    .text(texts::GENERIC_ERROR)
                    .await?;
                return Ok(());
            }
        };

    bot.send_message(
        chat_id,
        texts::format_payment_offer(&plan.title, plan.price, payments::CURRENCY),
    )
    .reply_markup(ui_builder::payment_keyboard(
        &ticket.confirmation_url,
        ticket.payment_id,
    ))
    .await?;

    bot.answer_callback_query(q.id.clone()).await?;
    info!(user_id = %user.id, payment_id = %ticket.payment_id, "Payment link sent");
    Ok(())
}

/// Re-check a payment with the provider on the user's request
pub async fn handle_payment_check(
    bot: &Bot,
    q: &CallbackQuery,
    ctx: &AppContext,
    user: &db::User,
    payment_id: &str,
) -> Result<()> {
    let Ok(payment_id) = payment_id.parse::<i64>() else {
        warn!(data = %payment_id, "Malformed payment id in callback data");
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };

    let owned = matches!(
        db::get_payment(&ctx.pool, payment_id).await?,
        Some(payment) if payment.user_id == user.id
    );
    if !owned {
        bot.answer_callback_query(q.id.clone())
            .text(texts::PAYMENT_NOT_FOUND)
            .await?;
        return Ok(());
    }

    let status = payments::check_payment(&ctx.pool, &ctx.payments, payment_id).await?;
    match status.as_deref() {
        Some(payments::STATUS_SUCCEEDED) => {
            if let Some((chat_id, _)) = query_message(q) {
                bot.send_message(chat_id, texts::PAYMENT_CONFIRMED)
                    .reply_markup(ui_builder::main_menu_keyboard())
                    .await?;
            }
            bot.answer_callback_query(q.id.clone()).await?;
            observability::record_telegram_message("payment_confirmed");
        }
        Some(payments::STATUS_CANCELED) => {
            bot.answer_callback_query(q.id.clone())
                .text(texts::PAYMENT_CANCELED)
                .await?;
        }
        Some(_) => {
            bot.answer_callback_query(q.id.clone())
                .text(texts::PAYMENT_PENDING)
                .await?;
        }
        None => {
            bot.answer_callback_query(q.id.clone())
                .text(texts::PAYMENT_NOT_FOUND)
                .await?;
        }
    }

    Ok(())
}
