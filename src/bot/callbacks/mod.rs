//! Callback query handlers for the bot's inline keyboards

mod callback_handler;
mod meal_callbacks;
mod payment_callbacks;
mod stats_callbacks;

pub use callback_handler::callback_handler;
