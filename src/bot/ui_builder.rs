//! UI Builder module for creating keyboards

use chrono::NaiveDate;
use reqwest::Url;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup};

use crate::config::SubscriptionPlan;
use crate::users::TIMEZONE_CHOICES;

/// Placeholder shown in the message input while the main menu is up
const MENU_PLACEHOLDER: &str = "Фото, текст или голосовое с блюдом";

/// Persistent reply keyboard with the bot's main commands
pub fn main_menu_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new("/stats"), KeyboardButton::new("/help")],
        vec![
            KeyboardButton::new("/subscribe"),
            KeyboardButton::new("/set_goal"),
        ],
    ])
    .resize_keyboard()
    .input_field_placeholder(MENU_PLACEHOLDER)
}

/// Inline keyboard attached to every meal report message
pub fn meal_report_keyboard(meal_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("✏️ Редактировать", format!("edit:{meal_id}")),
        InlineKeyboardButton::callback("❌ Удалить", format!("delete:{meal_id}")),
    ]])
}

/// Navigation arrows under the daily stats message.
///
/// Arrows only appear for dates the user can actually move to, so the
/// keyboard disappears entirely when there is nowhere to go.
pub fn stats_navigation_keyboard(
    prev_date: Option<NaiveDate>,
    next_date: Option<NaiveDate>,
) -> InlineKeyboardMarkup {
    let mut row = Vec::new();

    if let Some(prev) = prev_date {
        row.push(InlineKeyboardButton::callback("⬅️", format!("stats:{prev}")));
    }
    if let Some(next) = next_date {
        row.push(InlineKeyboardButton::callback("➡️", format!("stats:{next}")));
    }

    if row.is_empty() {
        InlineKeyboardMarkup::new(Vec::<Vec<InlineKeyboardButton>>::new())
    } else {
        InlineKeyboardMarkup::new(vec![row])
    }
}

/// Timezone picker shown when stats are requested before a timezone is set
pub fn timezone_keyboard() -> InlineKeyboardMarkup {
    let mut buttons = Vec::new();

    for pair in TIMEZONE_CHOICES.chunks(2) {
        let row: Vec<InlineKeyboardButton> = pair
            .iter()
            .map(|(label, value)| {
                InlineKeyboardButton::callback(label.to_string(), format!("tz:{value}"))
            })
            .collect();
        buttons.push(row);
    }

    InlineKeyboardMarkup::new(buttons)
}

/// Subscription plan menu: the offer document plus one button per plan
pub fn subscription_plans_keyboard(plans: &[SubscriptionPlan]) -> InlineKeyboardMarkup {
    let mut buttons = vec![vec![InlineKeyboardButton::callback(
        "📄 Ознакомиться с офертой",
        "show_offer".to_string(),
    )]];

    for plan in plans {
        buttons.push(vec![InlineKeyboardButton::callback(
            format!("{} мес: – {:.0} руб.", plan.months, plan.price),
            format!("sub_duration:{}", plan.months),
        )]);
    }

    InlineKeyboardMarkup::new(buttons)
}

/// Pay / re-check pair sent with a freshly created payment
pub fn payment_keyboard(confirmation_url: &str, payment_id: i64) -> InlineKeyboardMarkup {
    let mut buttons = Vec::new();

    // An unparseable URL would make the whole message unsendable, so the
    // pay button is dropped instead and the user can still re-check
    if let Ok(url) = Url::parse(confirmation_url) {
        buttons.push(vec![InlineKeyboardButton::url("💳 Оплатить", url)]);
    }
    buttons.push(vec![InlineKeyboardButton::callback(
        "🔍 Проверить оплату",
        format!("pay_check:{payment_id}"),
    )]);

    InlineKeyboardMarkup::new(buttons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::InlineKeyboardButtonKind;

    fn callback_data(button: &InlineKeyboardButton) -> &str {
        match &button.kind {
            InlineKeyboardButtonKind::CallbackData(data) => data,
            other => panic!("expected callback button, got {other:?}"),
        }
    }

    #[test]
    fn test_meal_report_keyboard_carries_meal_id() {
        let keyboard = meal_report_keyboard(42);
        assert_eq!(keyboard.inline_keyboard.len(), 1);
        assert_eq!(callback_data(&keyboard.inline_keyboard[0][0]), "edit:42");
        assert_eq!(callback_data(&keyboard.inline_keyboard[0][1]), "delete:42");
    }

    #[test]
    fn test_stats_navigation_inside_history() {
        let prev = NaiveDate::from_ymd_opt(2025, 3, 9);
        let next = NaiveDate::from_ymd_opt(2025, 3, 11);
        let keyboard = stats_navigation_keyboard(prev, next);

        assert_eq!(keyboard.inline_keyboard[0].len(), 2);
        assert_eq!(
            callback_data(&keyboard.inline_keyboard[0][0]),
            "stats:2025-03-09"
        );
        assert_eq!(
            callback_data(&keyboard.inline_keyboard[0][1]),
            "stats:2025-03-11"
        );
    }

    #[test]
    fn test_stats_navigation_empty_without_targets() {
        let keyboard = stats_navigation_keyboard(None, None);
        assert!(keyboard.inline_keyboard.is_empty());
    }

    #[test]
    fn test_timezone_keyboard_covers_all_choices() {
        let keyboard = timezone_keyboard();
        let buttons: usize = keyboard.inline_keyboard.iter().map(Vec::len).sum();
        assert_eq!(buttons, TIMEZONE_CHOICES.len());
        assert_eq!(callback_data(&keyboard.inline_keyboard[0][0]), "tz:UTC+2");
    }

    #[test]
    fn test_subscription_plans_keyboard() {
        let plans = vec![
            SubscriptionPlan {
                months: 1,
                title: "Месячная".to_string(),
                price: 199.0,
            },
            SubscriptionPlan {
                months: 12,
                title: "Годовая".to_string(),
                price: 1499.0,
            },
        ];

        let keyboard = subscription_plans_keyboard(&plans);
        assert_eq!(keyboard.inline_keyboard.len(), 3);
        assert_eq!(callback_data(&keyboard.inline_keyboard[0][0]), "show_offer");
        assert_eq!(
            callback_data(&keyboard.inline_keyboard[1][0]),
            "sub_duration:1"
        );
        assert_eq!(keyboard.inline_keyboard[2][0].text, "12 мес: – 1499 руб.");
    }

    #[test]
    fn test_payment_keyboard_with_valid_url() {
        let keyboard = payment_keyboard("https://yoomoney.ru/checkout/payments/v2", 7);
        assert_eq!(keyboard.inline_keyboard.len(), 2);
        assert_eq!(
            callback_data(&keyboard.inline_keyboard[1][0]),
            "pay_check:7"
        );
    }

    #[test]
    fn test_payment_keyboard_drops_bad_url() {
        let keyboard = payment_keyboard("not a url", 7);
        assert_eq!(keyboard.inline_keyboard.len(), 1);
        assert_eq!(
            callback_data(&keyboard.inline_keyboard[0][0]),
            "pay_check:7"
        );
    }
}
