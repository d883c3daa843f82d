use anyhow::Result;
use nutrilog::analysis::AnalysisClient;
use nutrilog::bot;
use nutrilog::cache::RegistrationCache;
use nutrilog::circuit_breaker::CircuitBreaker;
use nutrilog::config::AppConfig;
use nutrilog::db;
use nutrilog::dialogue::{ChatDialogue, ChatDialogueState};
use nutrilog::jobs;
use nutrilog::observability;
use nutrilog::payments::PaymentsClient;
use nutrilog::storage::PhotoStorage;
use nutrilog::webhook::{self, WebhookState};
use sqlx::postgres::PgPool;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{error, info};

/// Validate environment variables at startup
fn validate_environment_variables() -> Result<()> {
    // Validate TELEGRAM_BOT_TOKEN
    let bot_token = env::var("TELEGRAM_BOT_TOKEN")
        .map_err(|_| anyhow::anyhow!("TELEGRAM_BOT_TOKEN environment variable is required but not set. Please set it to your Telegram bot token."))?;

    if bot_token.trim().is_empty() {
        return Err(anyhow::anyhow!("TELEGRAM_BOT_TOKEN cannot be empty"));
    }

    // Basic bot token format validation (Telegram bot tokens have a specific format: numbers:letters)
    if !bot_token.contains(':') {
        return Err(anyhow::anyhow!("TELEGRAM_BOT_TOKEN format is invalid. Telegram bot tokens should contain a colon (:) character."));
    }

    let parts: Vec<&str> = bot_token.split(':').collect();
    if parts.len() != 2 {
        return Err(anyhow::anyhow!(
            "TELEGRAM_BOT_TOKEN format is invalid. Expected format: 'bot_id:bot_token'"
        ));
    }

    // Validate bot ID is numeric
    if parts[0].parse::<u64>().is_err() {
        return Err(anyhow::anyhow!("TELEGRAM_BOT_TOKEN bot ID must be numeric"));
    }

    if parts[1].len() < 20 {
        return Err(anyhow::anyhow!(
            "TELEGRAM_BOT_TOKEN appears to be too short. Please verify it's a valid bot token."
        ));
    }

    // Validate DATABASE_URL
    let database_url = env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required but not set. Please set it to your PostgreSQL connection string."))?;

    if database_url.trim().is_empty() {
        return Err(anyhow::anyhow!("DATABASE_URL cannot be empty"));
    }

    if !database_url.starts_with("postgresql://") && !database_url.starts_with("postgres://") {
        return Err(anyhow::anyhow!(
            "DATABASE_URL must start with 'postgresql://' or 'postgres://'"
        ));
    }

    info!("Environment variables validated successfully");
    Ok(())
}

/// Timeout for outgoing HTTP (Telegram, analysis model, payment provider)
fn http_client_timeout() -> Result<Duration> {
    let timeout_secs = env::var("HTTP_CLIENT_TIMEOUT_SECS")
        .unwrap_or_else(|_| "30".to_string())
        .parse::<u64>()
        .map_err(|_| anyhow::anyhow!("HTTP_CLIENT_TIMEOUT_SECS must be a valid number of seconds"))?;

    if timeout_secs == 0 {
        return Err(anyhow::anyhow!("HTTP_CLIENT_TIMEOUT_SECS cannot be 0"));
    }
    if timeout_secs > 300 {
        return Err(anyhow::anyhow!(
            "HTTP_CLIENT_TIMEOUT_SECS cannot be greater than 300 seconds (5 minutes)"
        ));
    }

    Ok(Duration::from_secs(timeout_secs))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file first
    dotenvy::dotenv().ok();

    // Validate environment variables early
    validate_environment_variables()?;

    let bot_token = env::var("TELEGRAM_BOT_TOKEN").expect("TELEGRAM_BOT_TOKEN must be set");
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    // Load and validate the full application configuration before
    // touching any external service
    let config = AppConfig::from_env();
    config.validate()?;

    let http_timeout = http_client_timeout()?;

    info!("Initializing database connection");

    // Create database connection pool and schema
    let pool = PgPool::connect(&database_url).await?;
    db::init_database_schema(&pool).await?;

    let shared_pool = Arc::new(pool.clone());

    // Initialize complete observability stack with health checks (metrics, tracing, logging)
    observability::init_observability_with_health_checks(
        Some(Arc::clone(&shared_pool)),
        Some(bot_token.clone()),
    )
    .await?;
    observability::start_system_metrics_recorder();

    // Shared HTTP client for Telegram, the analysis model and the payment provider
    let client = reqwest::Client::builder()
        .timeout(http_timeout)
        .build()
        .expect("Failed to create HTTP client");

    let bot = Bot::with_client(bot_token, client.clone());

    let analysis = AnalysisClient::new(client.clone(), config.analysis.clone());
    let breaker = CircuitBreaker::new(config.analysis.recovery.clone());
    let storage = PhotoStorage::from_config(&config.storage).await?;
    let payments = PaymentsClient::new(client, config.payments.clone());
    let cache = RegistrationCache::new();

    // Background worker for report recomputes and the daily trial sweep
    let job_sender = jobs::spawn_worker(pool.clone(), bot.clone(), config.trial.clone());
    jobs::spawn_daily_scheduler(job_sender.clone());

    // Payment webhook server runs beside the long-polling dispatcher
    let webhook_config = config.webhook.clone();
    let webhook_state = WebhookState {
        pool: pool.clone(),
        bot: bot.clone(),
    };
    tokio::spawn(async move {
        if let Err(e) = webhook::run_server(webhook_config, webhook_state).await {
            error!("Payment webhook server exited: {e:#}");
        }
    });

    let ctx = Arc::new(bot::AppContext {
        pool,
        cache,
        analysis,
        breaker,
        storage,
        payments,
        payments_config: config.payments.clone(),
        trial: config.trial.clone(),
        jobs: job_sender,
    });

    // Publish the command menu so clients show it next to the input field
    bot.set_my_commands(bot::Command::bot_commands()).await?;

    info!("Bot initialized, starting dispatcher");

    // Create shared dialogue storage
    let dialogue_storage = InMemStorage::<ChatDialogueState>::new();

    // Set up the dispatcher with command, message and callback branches
    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<bot::Command>()
                .endpoint({
                    let ctx = Arc::clone(&ctx);
                    let storage = dialogue_storage.clone();
                    move |bot: Bot, msg: Message, cmd: bot::Command| {
                        let ctx = Arc::clone(&ctx);
                        let dialogue = ChatDialogue::new(storage.clone(), msg.chat.id);
                        async move { bot::handle_command(bot, msg, cmd, ctx, dialogue).await }
                    }
                }),
        )
        .branch(Update::filter_message().endpoint({
            let ctx = Arc::clone(&ctx);
            let storage = dialogue_storage.clone();
            move |bot: Bot, msg: Message| {
                let ctx = Arc::clone(&ctx);
                let dialogue = ChatDialogue::new(storage.clone(), msg.chat.id);
                async move { bot::message_handler(bot, msg, ctx, dialogue).await }
            }
        }))
        .branch(Update::filter_callback_query().endpoint({
            let ctx = Arc::clone(&ctx);
            let storage = dialogue_storage.clone();
            move |bot: Bot, q: CallbackQuery| {
                let ctx = Arc::clone(&ctx);
                // Use the chat ID from the original message that contained the inline keyboard
                let chat_id = match &q.message {
                    Some(msg) => msg.chat().id,
                    None => ChatId::from(q.from.id),
                };
                let dialogue = ChatDialogue::new(storage.clone(), chat_id);
                async move { bot::callback_handler(bot, q, ctx, dialogue).await }
            }
        }));

    Dispatcher::builder(bot, handler)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
