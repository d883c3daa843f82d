//! # Application Error Types
//!
//! This module defines common error types used throughout the NutriLog application.
//! It provides structured error handling for various application components.

use std::fmt;

/// General application error type for consistent error handling
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Configuration validation errors
    Config(String),
    /// Validation errors (goal input, dates, callback payloads, etc.)
    Validation(String),
    /// Database operation errors
    Database(String),
    /// Meal analysis errors (external model calls)
    Analysis(String),
    /// Object storage errors
    Storage(String),
    /// Payment provider errors
    Payment(String),
    /// Telegram API errors
    Telegram(String),
    /// Network/communication errors
    Network(String),
    /// Internal application errors
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "[CONFIG] {}", msg),
            AppError::Validation(msg) => write!(f, "[VALIDATION] {}", msg),
            AppError::Database(msg) => write!(f, "[DATABASE] {}", msg),
            AppError::Analysis(msg) => write!(f, "[ANALYSIS] {}", msg),
            AppError::Storage(msg) => write!(f, "[STORAGE] {}", msg),
            AppError::Payment(msg) => write!(f, "[PAYMENT] {}", msg),
            AppError::Telegram(msg) => write!(f, "[TELEGRAM] {}", msg),
            AppError::Network(msg) => write!(f, "[NETWORK] {}", msg),
            AppError::Internal(msg) => write!(f, "[INTERNAL] {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<teloxide::RequestError> for AppError {
    fn from(err: teloxide::RequestError) -> Self {
        AppError::Telegram(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<crate::analysis_errors::AnalysisError> for AppError {
    fn from(err: crate::analysis_errors::AnalysisError) -> Self {
        AppError::Analysis(err.to_string())
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// Standardized error logging utilities for consistent error reporting across the application
pub mod error_logging {
    use tracing::error;

    /// Log meal analysis errors with model and input context
    pub fn log_analysis_error(
        error: &impl std::fmt::Display,
        operation: &str,
        user_id: Option<i64>,
        input_kind: &str,
        attempt_count: Option<u32>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            user_id = ?user_id,
            input_kind = %input_kind,
            attempt_count = ?attempt_count,
            "Meal analysis failed"
        );
    }

    /// Log payment provider errors with payment context
    pub fn log_payment_error(
        error: &impl std::fmt::Display,
        operation: &str,
        user_id: Option<i64>,
        payment_id: Option<i64>,
        provider_payment_id: Option<&str>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            user_id = ?user_id,
            payment_id = ?payment_id,
            provider_payment_id = ?provider_payment_id,
            "Payment operation failed"
        );
    }

    /// Log object storage errors with key and size context
    pub fn log_storage_error(
        error: &impl std::fmt::Display,
        operation: &str,
        user_id: Option<i64>,
        object_key: Option<&str>,
        payload_size: Option<u64>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            user_id = ?user_id,
            object_key = ?object_key,
            payload_size_bytes = ?payload_size,
            "Storage operation failed"
        );
    }

    /// Log Telegram API errors with chat context
    pub fn log_telegram_error(
        error: &impl std::fmt::Display,
        operation: &str,
        chat_id: Option<i64>,
        message_id: Option<i32>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            chat_id = ?chat_id,
            message_id = ?message_id,
            "Telegram API call failed"
        );
    }
}
