//! Bot module for handling Telegram interactions
//!
//! This module is split into several submodules for better organization:
//! - `command_handlers`: Bot commands and the main menu keyboard
//! - `message_handler`: Routes incoming text, photo, and voice messages
//! - `media_handlers`: Downloads and dispatches photo and voice input
//! - `analysis_flow`: The analyze-persist-report pipeline shared by all inputs
//! - `dialogue_manager`: Text input while a dialogue state is active
//! - `callbacks`: All callback query handling (organized into submodules)
//! - `ui_builder`: Creates keyboards for every interactive message

pub mod analysis_flow;
pub mod callbacks;
pub mod command_handlers;
pub mod dialogue_manager;
pub mod media_handlers;
pub mod message_handler;
pub mod ui_builder;

use sqlx::postgres::PgPool;

use crate::analysis::AnalysisClient;
use crate::cache::RegistrationCache;
use crate::circuit_breaker::CircuitBreaker;
use crate::config::{PaymentsConfig, TrialConfig};
use crate::jobs::JobSender;
use crate::payments::PaymentsClient;
use crate::storage::PhotoStorage;

/// Shared dependencies handed to every handler through `dptree::deps`
pub struct AppContext {
    pub pool: PgPool,
    pub cache: RegistrationCache,
    pub analysis: AnalysisClient,
    pub breaker: CircuitBreaker,
    pub storage: PhotoStorage,
    pub payments: PaymentsClient,
    pub payments_config: PaymentsConfig,
    pub trial: TrialConfig,
    pub jobs: JobSender,
}

// Re-export main handler functions for use in main.rs
pub use callbacks::callback_handler;
pub use command_handlers::{handle_command, Command};
pub use message_handler::message_handler;
