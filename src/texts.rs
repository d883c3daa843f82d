//! User-facing message texts and formatting helpers.
//!
//! The bot speaks Russian. Every string a user can see lives here so the
//! handlers stay free of literals, and every formatted message is built for
//! HTML parse mode.

use chrono::NaiveDate;
use teloxide::utils::html;

use crate::db::{DailyMeal, DailyReport, Ingredient, Meal};

pub const WELCOME: &str = "👋 Привет! Я помогу вести дневник питания.\n\n\
    Отправьте фото еды, голосовое или текстовое описание блюда, и я посчитаю \
    калории, белки, жиры, углеводы и клетчатку.\n\n\
    Команды:\n\
    /stats — статистика за день\n\
    /set_goal — цель по калориям\n\
    /subscribe — подписка\n\
    /help — справка";

pub const HELP: &str = "ℹ️ Как пользоваться ботом:\n\n\
    📸 Отправьте фото еды — я распознаю блюдо и посчитаю его состав.\n\
    💬 Опишите блюдо текстом — например, «овсянка с бананом и мёдом».\n\
    🎤 Продиктуйте блюдо голосовым сообщением.\n\n\
    После анализа можно уточнить состав кнопкой «Изменить» или удалить запись.\n\n\
    /stats — статистика за день\n\
    /set_goal — цель по калориям\n\
    /subscribe — подписка";

pub const PHOTO_RECEIVED: &str = "📸 Фото получено! Анализирую...";
pub const TEXT_RECEIVED: &str = "💬 Сообщение получено! Анализирую...";
pub const VOICE_RECEIVED: &str = "🎤 Голосовое сообщение получено! Распознаю...";

// Wording (misspelling included) matches the notice users already know
pub const ANALYSIS_FAILED: &str = "❗ Возникла ошибка при попытке распознования";
pub const NOT_FOOD: &str =
    "🤔 Не похоже, что это еда. Попробуйте отправить другое фото или описание.";
pub const VOICE_EMPTY: &str =
    "🎤 Не удалось распознать голосовое сообщение. Попробуйте ещё раз.";

pub const EDIT_PROMPT: &str = "✏️ Опишите, что нужно изменить в этом приёме пищи:";
pub const MEAL_DELETED: &str = "🗑 Приём пищи удалён";
pub const MEAL_NOT_FOUND: &str = "Приём пищи не найден";

pub const GOAL_PROMPT: &str = "🎯 Введите вашу цель по калориям на день (от 200 до 10000):";
pub const GOAL_INVALID: &str = "Пожалуйста, введите корректное число от 200 до 10000.";

pub const TIMEZONE_PROMPT: &str = "🕒 Выберите ваш часовой пояс:";
pub const TIMEZONE_SAVED: &str = "✅ Часовой пояс сохранён!";

pub const NO_DATA_FOR_DATE: &str = "Нет данных за эту дату";

pub const SUBSCRIPTION_REQUIRED: &str =
    "❌ Подписка не активна. Пожалуйста, оплатите подписку. /subscribe";

pub const CHOOSE_PLAN: &str = "💳 Выберите план подписки:";
pub const OFFER: &str = "📄 Публичная оферта\n\n\
    Оплачивая подписку, вы принимаете условия договора-оферты на использование \
    сервиса анализа питания. Подписка продлевает доступ к распознаванию блюд и \
    отчётам на выбранный срок. Оплата проходит через ЮKassa, данные карты боту \
    не передаются.";
pub const PAYMENT_CONFIRMED: &str = "✅ Платёж успешно подтверждён! Подписка активирована.";
pub const PAYMENT_PENDING: &str = "⏳ Платёж ещё не подтверждён. Попробуйте проверить позже.";
pub const PAYMENT_CANCELED: &str = "❌ Платёж отменён.";
pub const PAYMENT_NOT_FOUND: &str = "Платёж не найден";

pub const TRIAL_ENDING: &str = "⏳ Ваш пробный период заканчивается завтра!\n\
    Оформите подписку, чтобы не потерять доступ к анализу питания. /subscribe";

pub const GENERIC_ERROR: &str = "Что-то пошло не так. Попробуйте позже.";

/// Confirmation after the daily calorie goal was stored
pub fn format_goal_saved(goal: f64) -> String {
    format!("✅ Цель сохранена: {goal:.0} ккал в день")
}

/// Trial cap message with the configured limit and rolling window
pub fn format_trial_limit(limit: i64, window_hours: i64) -> String {
    format!(
        "⏳ Превышен лимит генерации отчётов: не более {limit} за {window_hours} ч.\n\
         Оформите подписку, чтобы снять ограничение. /subscribe"
    )
}

/// Subscription offer shown before handing out the payment link
pub fn format_payment_offer(plan_title: &str, price: f64, currency: &str) -> String {
    let currency = currency_sign(currency);
    format!(
        "💳 Подписка «{}» — {:.0} {}\n\nНажмите «Оплатить», а после оплаты — «Проверить оплату».",
        html::escape(plan_title),
        price,
        currency
    )
}

fn currency_sign(currency: &str) -> &str {
    match currency {
        "RUB" => "₽",
        other => other,
    }
}

/// Render a meal analysis as the report message shown to the user
pub fn format_meal_report(meal: &Meal, ingredients: &[Ingredient]) -> String {
    let mut report = format!(
        "🍽 <b>{}</b> — {:.0} г\n\n\
         🔥 Калории: {:.0} ккал\n\
         🥩 Белки: {:.1} г\n\
         🧈 Жиры: {:.1} г\n\
         🍞 Углеводы: {:.1} г\n\
         🌾 Клетчатка: {:.1} г",
        html::escape(&meal.name),
        meal.total_weight,
        meal.total_calories,
        meal.total_protein,
        meal.total_fat,
        meal.total_carbs,
        meal.total_fiber,
    );

    if !ingredients.is_empty() {
        report.push_str("\n\nСостав:");
        for ingredient in ingredients {
            report.push_str(&format!(
                "\n• {} ({:.0} г) — {:.0} ккал",
                html::escape(&ingredient.name),
                ingredient.weight,
                ingredient.calories
            ));
        }
    }

    report
}

/// Render the daily statistics message for one local calendar day
pub fn format_daily_stats(
    date: NaiveDate,
    report: Option<&DailyReport>,
    meals: &[DailyMeal],
    calorie_goal: f64,
) -> String {
    let (calories, protein, fat, carbs, fiber) = match report {
        Some(report) => (
            report.total_calories,
            report.total_protein,
            report.total_fat,
            report.total_carbs,
            report.total_fiber,
        ),
        None => (0.0, 0.0, 0.0, 0.0, 0.0),
    };

    let progress = calorie_progress_pct(calories, calorie_goal);
    let (protein_pct, fat_pct, carbs_pct) = macro_calorie_shares(protein, fat, carbs);

    let mut stats = format!(
        "📊 <b>Отчёт за {}</b>\n\n\
         🔥 Калории: {:.0} из {:.0} ккал ({}%)\n\
         🥩 Белки: {:.1} г ({}%)\n\
         🧈 Жиры: {:.1} г ({}%)\n\
         🍞 Углеводы: {:.1} г ({}%)\n\
         🌾 Клетчатка: {:.1} г",
        date.format("%d.%m.%Y"),
        calories,
        calorie_goal,
        progress,
        protein,
        protein_pct,
        fat,
        fat_pct,
        carbs,
        carbs_pct,
        fiber,
    );

    if meals.is_empty() {
        stats.push_str("\n\nЗа этот день приёмов пищи не записано.");
    } else {
        stats.push_str("\n\nПриёмы пищи:");
        for meal in meals {
            stats.push_str(&format!(
                "\n{}. {} — {:.0} ккал",
                meal.position,
                html::escape(&meal.name),
                meal.calories
            ));
        }
    }

    stats
}

/// Percentage of the daily calorie goal already consumed
pub fn calorie_progress_pct(calories: f64, goal: f64) -> u32 {
    if goal <= 0.0 {
        return 0;
    }
    (calories / goal * 100.0).round() as u32
}

/// Each macronutrient's share of calories, using 4/9/4 kcal per gram
pub fn macro_calorie_shares(protein_g: f64, fat_g: f64, carbs_g: f64) -> (u32, u32, u32) {
    let protein_kcal = protein_g * 4.0;
    let fat_kcal = fat_g * 9.0;
    let carbs_kcal = carbs_g * 4.0;
    let total = protein_kcal + fat_kcal + carbs_kcal;

    if total <= 0.0 {
        return (0, 0, 0);
    }

    (
        (protein_kcal / total * 100.0).round() as u32,
        (fat_kcal / total * 100.0).round() as u32,
        (carbs_kcal / total * 100.0).round() as u32,
    )
}
