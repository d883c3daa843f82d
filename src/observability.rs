//! Tracing, Prometheus metrics and the health-check server.
//!
//! One entry point wires the whole stack at startup: structured logging
//! (pretty in development, JSON elsewhere), the Prometheus recorder, an
//! optional OTLP trace pipeline, and a small hyper server exposing
//! `/metrics`, `/health/live` and `/health/ready`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use hyper::server::conn::http1;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::global;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use sqlx::PgPool;
use tokio::net::TcpListener;
use tracing_subscriber::prelude::*;

use crate::observability_config::ObservabilityConfig;

pub async fn init_observability_with_health_checks(
    db_pool: Option<Arc<PgPool>>,
    bot_token: Option<String>,
) -> Result<()> {
    let config = ObservabilityConfig::from_env();
    init_observability_with_health_checks_and_config(db_pool, bot_token, config).await
}

pub async fn init_observability_with_health_checks_and_config(
    db_pool: Option<Arc<PgPool>>,
    bot_token: Option<String>,
    config: ObservabilityConfig,
) -> Result<()> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid observability configuration: {e}"))?;

    init_tracing(&config)?;
    let metrics_handle = install_prometheus_recorder()?;
    init_otlp_pipeline(&config)?;
    start_metrics_server(metrics_handle, config.metrics_port, db_pool.clone(), bot_token).await?;

    tracing::info!(
        environment = %config.environment,
        has_db_pool = %db_pool.is_some(),
        "Observability stack initialized"
    );
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("nutrilog={}", config.log_level).parse()?)
        .add_directive("sqlx=warn".parse()?)
        .add_directive("teloxide=warn".parse()?);

    if let Ok(obs_log) = std::env::var("OBSERVABILITY_LOG_LEVEL") {
        filter = filter.add_directive(format!("nutrilog::observability={obs_log}").parse()?);
    }

    let pretty = config.is_development()
        || std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string()) == "pretty";

    if pretty {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty().with_target(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .init();
    }

    tracing::info!(
        environment = %config.environment,
        log_level = %config.log_level,
        "Tracing initialized"
    );
    Ok(())
}

fn install_prometheus_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    tracing::info!("Prometheus recorder installed");
    Ok(handle)
}

/// Set up OTLP trace export; a no-op when no endpoint is configured
fn init_otlp_pipeline(config: &ObservabilityConfig) -> Result<()> {
    let Some(endpoint) = &config.otlp_endpoint else {
        tracing::info!("OTLP trace export disabled (no endpoint configured)");
        return Ok(());
    };

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.clone())
        .build()?;

    let builder = SdkTracerProvider::builder().with_batch_exporter(exporter);
    let tracer_provider = if config.enable_trace_sampling {
        builder
            .with_sampler(Sampler::TraceIdRatioBased(config.trace_sampling_ratio))
            .build()
    } else {
        builder.build()
    };

    global::set_tracer_provider(tracer_provider);

    tracing::info!(
        otlp_endpoint = %endpoint,
        trace_sampling_enabled = %config.enable_trace_sampling,
        "OTLP trace export initialized"
    );
    Ok(())
}

async fn start_metrics_server(
    metrics_handle: PrometheusHandle,
    port: u16,
    db_pool: Option<Arc<PgPool>>,
    bot_token: Option<String>,
) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on {addr}");

    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::error!("Metrics server accept failed: {e}");
                    continue;
                }
            };

            let metrics_handle = metrics_handle.clone();
            let db_pool = db_pool.clone();
            let bot_token = bot_token.clone();

            tokio::spawn(async move {
                let service = hyper::service::service_fn(move |req| {
                    let metrics_handle = metrics_handle.clone();
                    let db_pool = db_pool.clone();
                    let bot_token = bot_token.clone();
                    async move {
                        Ok::<_, std::convert::Infallible>(
                            route_request(req, &metrics_handle, db_pool, bot_token).await,
                        )
                    }
                });

                if let Err(err) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    tracing::error!("Error serving metrics connection: {err:?}");
                }
            });
        }
    });

    Ok(())
}

async fn route_request(
    req: Request<hyper::body::Incoming>,
    metrics_handle: &PrometheusHandle,
    db_pool: Option<Arc<PgPool>>,
    bot_token: Option<String>,
) -> Response<String> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let mut response = Response::new(metrics_handle.render());
            response.headers_mut().insert(
                "content-type",
                hyper::header::HeaderValue::from_static(
                    "text/plain; version=0.0.4; charset=utf-8",
                ),
            );
            response
        }
        (&Method::GET, "/health/live") => Response::new("OK".to_string()),
        (&Method::GET, "/health/ready") => {
            match perform_readiness_checks(db_pool, bot_token).await {
                Ok(()) => Response::new("OK".to_string()),
                Err(e) => {
                    let mut response = Response::new(format!("NOT READY: {e}"));
                    *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
                    response
                }
            }
        }
        _ => {
            let mut response = Response::new("Not Found".to_string());
            *response.status_mut() = StatusCode::NOT_FOUND;
            response
        }
    }
}

/// Keep process-level gauges current on a fixed interval
pub fn start_system_metrics_recorder() {
    let started = std::time::Instant::now();

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
        loop {
            interval.tick().await;
            metrics::gauge!("uptime_seconds").set(started.elapsed().as_secs_f64());
        }
    });
}

/// Create a span for meal analysis operations
pub fn analysis_span(operation: &str) -> tracing::Span {
    tracing::info_span!("analysis_operation", operation = operation, component = "analysis")
}

/// Create a span for database operations
pub fn db_span(operation: &str, table: &str) -> tracing::Span {
    tracing::info_span!(
        "db_operation",
        operation = operation,
        table = table,
        component = "database"
    )
}

/// Create a span for Telegram bot operations
pub fn telegram_span(operation: &str, user_id: Option<i64>) -> tracing::Span {
    tracing::info_span!(
        "telegram_operation",
        operation = operation,
        user_id = user_id,
        component = "telegram"
    )
}

/// Record meal analysis metrics
pub fn record_analysis_metrics(input_kind: &str, success: bool, duration: std::time::Duration) {
    let input_kind = input_kind.to_string();
    metrics::counter!("analysis_operations_total", "input" => input_kind, "result" => if success { "success" } else { "failure" }).increment(1);
    metrics::histogram!("analysis_duration_seconds").record(duration.as_secs_f64());
}

/// Record database operation metrics
pub fn record_db_metrics(operation: &str, duration: std::time::Duration) {
    let operation = operation.to_string();
    metrics::counter!("db_operations_total", "operation" => operation).increment(1);
    metrics::histogram!("db_operation_duration_seconds").record(duration.as_secs_f64());
}

/// Record webhook request metrics
pub fn record_request_metrics(method: &str, status: u16, duration: std::time::Duration) {
    let method = method.to_string();
    let status = status.to_string();
    metrics::counter!("requests_total", "method" => method, "status" => status).increment(1);
    metrics::histogram!("request_duration_seconds").record(duration.as_secs_f64());
}

/// Update circuit breaker state metric
pub fn update_circuit_breaker_state(is_open: bool) {
    metrics::gauge!("circuit_breaker_state").set(if is_open { 1.0 } else { 0.0 });
}

/// Record Telegram message processing metrics
pub fn record_telegram_message(message_type: &str) {
    let message_type = message_type.to_string();
    metrics::counter!("telegram_messages_total", "type" => message_type).increment(1);
}

/// Record payment lifecycle metrics
pub fn record_payment_event(status: &str) {
    let status = status.to_string();
    metrics::counter!("payments_total", "status" => status).increment(1);
}

pub async fn perform_readiness_checks(
    db_pool: Option<Arc<PgPool>>,
    bot_token: Option<String>,
) -> Result<()> {
    if let Some(pool) = &db_pool {
        check_database_health(pool.as_ref()).await?;
    }

    if let Some(token) = &bot_token {
        check_bot_token_health(token)?;
    }

    Ok(())
}

/// Database connectivity probe used by the readiness endpoint
pub async fn check_database_health(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(|e| anyhow::anyhow!("Database health check failed: {e}"))?;

    tracing::debug!("Database health check passed");
    Ok(())
}

/// Shape check on the stored bot token; no Telegram call is made
pub fn check_bot_token_health(token: &str) -> Result<()> {
    if token.is_empty() {
        return Err(anyhow::anyhow!("Bot token is empty"));
    }
    if !token.contains(':') {
        return Err(anyhow::anyhow!("Bot token format is invalid"));
    }
    Ok(())
}
