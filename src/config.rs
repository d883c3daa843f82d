//! # Application Configuration
//!
//! This module defines configuration structures for the bot's external
//! integrations (analysis model, object storage, payment provider) and the
//! trial paywall, loaded from environment variables with validated defaults.

use std::env;

// Constants for analysis configuration
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";
pub const DEFAULT_MAX_IMAGE_TOKENS: u32 = 1000;
pub const DEFAULT_MAX_DESCRIPTION_TOKENS: u32 = 300;

// Payment provider defaults
pub const DEFAULT_PAYMENTS_API_BASE: &str = "https://api.yookassa.ru/v3";
pub const DEFAULT_RETURN_URL: &str = "https://t.me/nutrilog_bot";
pub const DEFAULT_SUBSCRIPTION_PLANS: &str = "1:Месячная:199;3:Квартальная:499;12:Годовая:1499";

/// Maximum size accepted when downloading user media from Telegram
pub const MAX_DOWNLOAD_SIZE: u64 = 20 * 1024 * 1024; // 20MB

/// Recovery configuration for error handling on external model calls
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Base delay between retries in milliseconds
    pub base_retry_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_retry_delay_ms: u64,
    /// Timeout for analysis operations in seconds
    pub operation_timeout_secs: u64,
    /// Circuit breaker failure threshold
    pub circuit_breaker_threshold: u32,
    /// Circuit breaker reset timeout in seconds
    pub circuit_breaker_reset_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_retry_delay_ms: 1000,  // 1 second
            max_retry_delay_ms: 10000,  // 10 seconds
            operation_timeout_secs: 30, // 30 seconds
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_secs: 60, // 1 minute
        }
    }
}

impl RecoveryConfig {
    /// Validate recovery configuration parameters
    pub fn validate(&self) -> crate::errors::AppResult<()> {
        if self.max_retries == 0 {
            return Err(crate::errors::AppError::Config(
                "max_retries must be greater than 0".to_string(),
            ));
        }
        if self.base_retry_delay_ms == 0 {
            return Err(crate::errors::AppError::Config(
                "base_retry_delay_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_retry_delay_ms < self.base_retry_delay_ms {
            return Err(crate::errors::AppError::Config(format!(
                "max_retry_delay_ms ({}) must be >= base_retry_delay_ms ({})",
                self.max_retry_delay_ms, self.base_retry_delay_ms
            )));
        }
        if self.operation_timeout_secs == 0 {
            return Err(crate::errors::AppError::Config(
                "operation_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.circuit_breaker_threshold == 0 {
            return Err(crate::errors::AppError::Config(
                "circuit_breaker_threshold must be greater than 0".to_string(),
            ));
        }
        if self.circuit_breaker_reset_secs == 0 {
            return Err(crate::errors::AppError::Config(
                "circuit_breaker_reset_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the external meal-analysis model
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// API key for the model provider
    pub api_key: String,
    /// Base URL of the chat-completions/transcriptions API
    pub api_base: String,
    /// Chat model used for meal analysis (vision-capable)
    pub model: String,
    /// Transcription model used for voice messages
    pub transcription_model: String,
    /// Completion token cap for photo analysis
    pub max_image_tokens: u32,
    /// Completion token cap for text and voice analysis
    pub max_description_tokens: u32,
    /// Recovery and error handling configuration
    pub recovery: RecoveryConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            max_image_tokens: DEFAULT_MAX_IMAGE_TOKENS,
            max_description_tokens: DEFAULT_MAX_DESCRIPTION_TOKENS,
            recovery: RecoveryConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            api_base: env::var("OPENAI_API_BASE")
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
            model: env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            transcription_model: env::var("OPENAI_TRANSCRIPTION_MODEL")
                .unwrap_or_else(|_| DEFAULT_TRANSCRIPTION_MODEL.to_string()),
            max_image_tokens: env::var("MAX_IMAGE_TOKENS")
                .unwrap_or_else(|_| DEFAULT_MAX_IMAGE_TOKENS.to_string())
                .parse()
                .unwrap_or(DEFAULT_MAX_IMAGE_TOKENS),
            max_description_tokens: env::var("MAX_DESCRIPTION_TOKENS")
                .unwrap_or_else(|_| DEFAULT_MAX_DESCRIPTION_TOKENS.to_string())
                .parse()
                .unwrap_or(DEFAULT_MAX_DESCRIPTION_TOKENS),
            recovery: RecoveryConfig::default(),
        }
    }

    /// Validate analysis configuration parameters
    pub fn validate(&self) -> crate::errors::AppResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(crate::errors::AppError::Config(
                "OPENAI_API_KEY must be set".to_string(),
            ));
        }
        if !self.api_base.starts_with("http://") && !self.api_base.starts_with("https://") {
            return Err(crate::errors::AppError::Config(format!(
                "invalid analysis API base URL: {}",
                self.api_base
            )));
        }
        if self.model.trim().is_empty() {
            return Err(crate::errors::AppError::Config(
                "analysis model cannot be empty".to_string(),
            ));
        }
        if self.max_image_tokens == 0 || self.max_description_tokens == 0 {
            return Err(crate::errors::AppError::Config(
                "analysis token limits must be greater than 0".to_string(),
            ));
        }
        self.recovery.validate()?;
        Ok(())
    }
}

/// Configuration for S3-compatible object storage holding meal photos
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Endpoint URL of the S3-compatible service
    pub endpoint_url: String,
    /// Storage region
    pub region: String,
    /// Bucket for uploaded photos
    pub bucket: String,
    /// Access key id
    pub access_key: String,
    /// Secret access key
    pub secret_key: String,
    /// Public base URL prefixed to `{bucket}/{key}` for uploaded objects
    pub public_base_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint_url: String::new(),
            region: "ru-1".to_string(),
            bucket: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            public_base_url: String::new(),
        }
    }
}

impl StorageConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let endpoint_url = env::var("S3_ENDPOINT_URL").unwrap_or_default();
        Self {
            public_base_url: env::var("S3_PUBLIC_BASE_URL")
                .unwrap_or_else(|_| endpoint_url.clone()),
            endpoint_url,
            region: env::var("S3_REGION").unwrap_or_else(|_| "ru-1".to_string()),
            bucket: env::var("S3_BUCKET").unwrap_or_default(),
            access_key: env::var("S3_ACCESS_KEY").unwrap_or_default(),
            secret_key: env::var("S3_SECRET_KEY").unwrap_or_default(),
        }
    }

    /// Validate storage configuration parameters
    pub fn validate(&self) -> crate::errors::AppResult<()> {
        if self.endpoint_url.trim().is_empty() {
            return Err(crate::errors::AppError::Config(
                "S3_ENDPOINT_URL must be set".to_string(),
            ));
        }
        if !self.endpoint_url.starts_with("http://") && !self.endpoint_url.starts_with("https://")
        {
            return Err(crate::errors::AppError::Config(format!(
                "invalid S3 endpoint URL: {}",
                self.endpoint_url
            )));
        }
        if self.bucket.trim().is_empty() {
            return Err(crate::errors::AppError::Config(
                "S3_BUCKET must be set".to_string(),
            ));
        }
        if self.access_key.trim().is_empty() || self.secret_key.trim().is_empty() {
            return Err(crate::errors::AppError::Config(
                "S3_ACCESS_KEY and S3_SECRET_KEY must be set".to_string(),
            ));
        }
        Ok(())
    }
}

/// A purchasable subscription plan
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionPlan {
    /// Subscription length in months
    pub months: u32,
    /// Display title (also stored as the plan name on subscriptions)
    pub title: String,
    /// Price in the payment currency
    pub price: f64,
}

impl SubscriptionPlan {
    /// Price formatted the way the payment provider expects (two decimals)
    pub fn price_value(&self) -> String {
        format!("{:.2}", self.price)
    }
}

/// Parse subscription plans from a `months:title:price` triple list
/// Format: "1:Месячная:199;3:Квартальная:499"
pub fn parse_subscription_plans(raw: &str) -> Vec<SubscriptionPlan> {
    raw.split(';')
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(|entry| {
            let mut parts = entry.trim().splitn(3, ':');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(months), Some(title), Some(price)) => {
                    let months = months.trim().parse::<u32>().ok()?;
                    let price = price.trim().parse::<f64>().ok()?;
                    Some(SubscriptionPlan {
                        months,
                        title: title.trim().to_string(),
                        price,
                    })
                }
                _ => None,
            }
        })
        .collect()
}

/// Configuration for the payment provider (YooKassa)
#[derive(Debug, Clone)]
pub struct PaymentsConfig {
    /// Shop identifier for Basic auth
    pub shop_id: String,
    /// Secret key for Basic auth
    pub secret_key: String,
    /// Base URL of the payments API
    pub api_base: String,
    /// URL the user returns to after paying (the bot's t.me link)
    pub return_url: String,
    /// Raw plan table as configured
    plans_raw: String,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            shop_id: String::new(),
            secret_key: String::new(),
            api_base: DEFAULT_PAYMENTS_API_BASE.to_string(),
            return_url: DEFAULT_RETURN_URL.to_string(),
            plans_raw: DEFAULT_SUBSCRIPTION_PLANS.to_string(),
        }
    }
}

impl PaymentsConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            shop_id: env::var("YOOKASSA_SHOP_ID").unwrap_or_default(),
            secret_key: env::var("YOOKASSA_SECRET_KEY").unwrap_or_default(),
            api_base: env::var("YOOKASSA_API_BASE")
                .unwrap_or_else(|_| DEFAULT_PAYMENTS_API_BASE.to_string()),
            return_url: env::var("BOT_URL").unwrap_or_else(|_| DEFAULT_RETURN_URL.to_string()),
            plans_raw: env::var("SUBSCRIPTION_PLANS")
                .unwrap_or_else(|_| DEFAULT_SUBSCRIPTION_PLANS.to_string()),
        }
    }

    /// The configured plan table
    pub fn plans(&self) -> Vec<SubscriptionPlan> {
        parse_subscription_plans(&self.plans_raw)
    }

    /// Look up a plan by its duration in months
    pub fn plan_by_months(&self, months: u32) -> Option<SubscriptionPlan> {
        self.plans().into_iter().find(|plan| plan.months == months)
    }

    /// Validate payments configuration parameters
    pub fn validate(&self) -> crate::errors::AppResult<()> {
        if self.shop_id.trim().is_empty() || self.secret_key.trim().is_empty() {
            return Err(crate::errors::AppError::Config(
                "YOOKASSA_SHOP_ID and YOOKASSA_SECRET_KEY must be set".to_string(),
            ));
        }
        if !self.api_base.starts_with("http://") && !self.api_base.starts_with("https://") {
            return Err(crate::errors::AppError::Config(format!(
                "invalid payments API base URL: {}",
                self.api_base
            )));
        }
        let configured = self
            .plans_raw
            .split(';')
            .filter(|entry| !entry.trim().is_empty())
            .count();
        let plans = self.plans();
        if plans.is_empty() {
            return Err(crate::errors::AppError::Config(
                "SUBSCRIPTION_PLANS cannot be empty".to_string(),
            ));
        }
        if plans.len() != configured {
            return Err(crate::errors::AppError::Config(format!(
                "SUBSCRIPTION_PLANS has malformed entries: {}",
                self.plans_raw
            )));
        }
        for plan in &plans {
            if plan.months == 0 || plan.months > 36 {
                return Err(crate::errors::AppError::Config(format!(
                    "subscription plan duration out of range: {} months",
                    plan.months
                )));
            }
            if plan.price <= 0.0 {
                return Err(crate::errors::AppError::Config(format!(
                    "subscription plan price must be positive: {}",
                    plan.price
                )));
            }
        }
        Ok(())
    }
}

/// Configuration for the free trial and its usage cap
#[derive(Debug, Clone)]
pub struct TrialConfig {
    /// Trial length in days, counted from first registration
    pub period_days: i64,
    /// Analyses allowed per rolling window while on trial
    pub report_limit: i64,
    /// Rolling window length in hours
    pub report_window_hours: i64,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            period_days: 7,
            report_limit: 5,
            report_window_hours: 24,
        }
    }
}

impl TrialConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            period_days: env::var("TRIAL_PERIOD_DAYS")
                .unwrap_or_else(|_| "7".to_string())
                .parse()
                .unwrap_or(7),
            report_limit: env::var("TRIAL_REPORT_LIMIT")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            report_window_hours: env::var("TRIAL_REPORT_WINDOW_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .unwrap_or(24),
        }
    }

    /// Validate trial configuration parameters
    pub fn validate(&self) -> crate::errors::AppResult<()> {
        if self.period_days < 1 {
            return Err(crate::errors::AppError::Config(
                "TRIAL_PERIOD_DAYS must be at least 1".to_string(),
            ));
        }
        if self.report_limit < 1 {
            return Err(crate::errors::AppError::Config(
                "TRIAL_REPORT_LIMIT must be at least 1".to_string(),
            ));
        }
        if !(1..=168).contains(&self.report_window_hours) {
            return Err(crate::errors::AppError::Config(format!(
                "TRIAL_REPORT_WINDOW_HOURS out of range: {}",
                self.report_window_hours
            )));
        }
        Ok(())
    }
}

/// Bind configuration for the payment webhook server
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Interface to bind
    pub host: String,
    /// Port to bind
    pub port: u16,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl WebhookConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            host: env::var("WEBHOOK_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("WEBHOOK_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
        }
    }

    /// Validate webhook configuration parameters
    pub fn validate(&self) -> crate::errors::AppResult<()> {
        if self.host.trim().is_empty() {
            return Err(crate::errors::AppError::Config(
                "WEBHOOK_HOST cannot be empty".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(crate::errors::AppError::Config(
                "WEBHOOK_PORT cannot be 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Top-level application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub analysis: AnalysisConfig,
    pub storage: StorageConfig,
    pub payments: PaymentsConfig,
    pub trial: TrialConfig,
    pub webhook: WebhookConfig,
}

impl AppConfig {
    /// Load the full application configuration from the environment
    pub fn from_env() -> Self {
        Self {
            analysis: AnalysisConfig::from_env(),
            storage: StorageConfig::from_env(),
            payments: PaymentsConfig::from_env(),
            trial: TrialConfig::from_env(),
            webhook: WebhookConfig::from_env(),
        }
    }

    /// Validate all nested configurations
    pub fn validate(&self) -> crate::errors::AppResult<()> {
        self.analysis.validate()?;
        self.storage.validate()?;
        self.payments.validate()?;
        self.trial.validate()?;
        self.webhook.validate()?;
        Ok(())
    }
}
