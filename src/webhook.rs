//! # Payment Webhook Module
//!
//! HTTP endpoint receiving payment status notifications from the payment
//! provider. A succeeded notification settles the stored payment and tells
//! the user their subscription is active; a canceled notification records
//! the cancellation. The provider retries on connection failures, so the
//! endpoint always answers 200 with a JSON status body.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{extract::State, response::IntoResponse, routing::post, Json, Router};
use serde_json::json;
use sqlx::postgres::PgPool;
use teloxide::prelude::*;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::WebhookConfig;
use crate::db;
use crate::errors::error_logging;
use crate::observability;
use crate::payments::{self, WebhookNotification};
use crate::texts;

/// Shared state for webhook handlers
#[derive(Clone)]
pub struct WebhookState {
    pub pool: PgPool,
    pub bot: Bot,
}

/// Build the webhook router
pub fn build_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/api/yookassa/webhook", post(handle_payment_notification))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve the webhook endpoint until the process exits
pub async fn run_server(config: WebhookConfig, state: WebhookState) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind webhook listener on {addr}"))?;

    info!("Payment webhook listening on {addr}");

    axum::serve(listener, build_router(Arc::new(state)))
        .await
        .context("Payment webhook server failed")?;
    Ok(())
}

async fn handle_payment_notification(
    State(state): State<Arc<WebhookState>>,
    Json(notification): Json<WebhookNotification>,
) -> impl IntoResponse {
    let started = std::time::Instant::now();
    info!(event = %notification.event, "Received payment notification");

    let response = match process_notification(&state, &notification).await {
        Ok(true) => json!({ "status": "ok" }),
        Ok(false) => json!({ "status": "not found" }),
        Err(e) => {
            error_logging::log_payment_error(
                &format!("{e:#}"),
                "process_notification",
                None,
                None,
                Some(&notification.object.id),
            );
            json!({ "status": "error" })
        }
    };

    observability::record_request_metrics("POST", 200, started.elapsed());
    Json(response)
}

/// Payment status a notification event maps to, `None` for events we ignore
fn event_target_status(event: &str) -> Option<&'static str> {
    match event {
        payments::EVENT_PAYMENT_SUCCEEDED => Some(payments::STATUS_SUCCEEDED),
        payments::EVENT_PAYMENT_CANCELED => Some(payments::STATUS_CANCELED),
        _ => None,
    }
}

/// Returns false when the notification references a payment we never issued
async fn process_notification(
    state: &WebhookState,
    notification: &WebhookNotification,
) -> Result<bool> {
    let Some(target_status) = event_target_status(&notification.event) else {
        info!(event = %notification.event, "Ignoring unhandled payment event");
        return Ok(true);
    };

    if db::get_payment_by_provider_id(&state.pool, &notification.object.id)
        .await?
        .is_none()
    {
        warn!(
            provider_payment_id = %notification.object.id,
            "Payment notification for unknown payment"
        );
        return Ok(false);
    }

    // None here means a replayed notification for an already settled payment,
    // which must not trigger another user notice
    let updated =
        payments::apply_provider_status(&state.pool, &notification.object.id, target_status)
            .await?;

    if let Some(payment) = updated {
        if payment.status == payments::STATUS_SUCCEEDED {
            notify_payment_confirmed(state, payment.user_id).await;
        }
    }

    Ok(true)
}

/// Tell the user their payment went through; delivery failures are logged
/// because the payment itself is already settled
async fn notify_payment_confirmed(state: &WebhookState, user_id: i64) {
    let user = match db::get_user_by_id(&state.pool, user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            warn!(user_id = %user_id, "Settled payment references a missing user");
            return;
        }
        Err(e) => {
            error!("Failed to load user for payment confirmation: {e:#}");
            return;
        }
    };

    match state
        .bot
        .send_message(ChatId(user.telegram_id), texts::PAYMENT_CONFIRMED)
        .await
    {
        Ok(_) => observability::record_telegram_message("payment_confirmed"),
        Err(e) => warn!(
            "Failed to send payment confirmation to user {}: {e}",
            user.telegram_id
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_target_status_mapping() {
        assert_eq!(
            event_target_status("payment.succeeded"),
            Some(payments::STATUS_SUCCEEDED)
        );
        assert_eq!(
            event_target_status("payment.canceled"),
            Some(payments::STATUS_CANCELED)
        );
        assert_eq!(event_target_status("refund.succeeded"), None);
        assert_eq!(event_target_status(""), None);
    }

    #[test]
    fn test_notification_body_parses() {
        let body = r#"{
            "type": "notification",
            "event": "payment.succeeded",
            "object": {
                "id": "2c5f8a10-000f-5000-8000-18db351245c7",
                "status": "succeeded",
                "paid": true
            }
        }"#;
        let notification: WebhookNotification = serde_json::from_str(body).unwrap();
        assert_eq!(notification.event, "payment.succeeded");
        assert_eq!(notification.object.id, "2c5f8a10-000f-5000-8000-18db351245c7");
    }
}
