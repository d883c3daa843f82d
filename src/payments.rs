//! Payment provider integration and payment lifecycle.
//!
//! Talks to a YooKassa-compatible API: creating a payment returns a redirect
//! confirmation URL the user opens in the browser, after which the provider
//! either calls our webhook or the user asks the bot to re-check the status.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{PaymentsConfig, SubscriptionPlan};
use crate::db;
use crate::observability;
use crate::subscription;

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_SUCCEEDED: &str = "succeeded";
pub const STATUS_CANCELED: &str = "canceled";

pub const EVENT_PAYMENT_SUCCEEDED: &str = "payment.succeeded";
pub const EVENT_PAYMENT_CANCELED: &str = "payment.canceled";

pub const CURRENCY: &str = "RUB";

/// Monetary amount as the provider expects it ("199.00", "RUB")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAmount {
    pub value: String,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize)]
struct ConfirmationRequest {
    #[serde(rename = "type")]
    kind: String,
    return_url: String,
}

#[derive(Debug, Clone, Serialize)]
struct CreatePaymentRequest {
    amount: PaymentAmount,
    confirmation: ConfirmationRequest,
    capture: bool,
    description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmationResponse {
    #[serde(default)]
    pub confirmation_url: Option<String>,
}

/// Payment object as returned by the provider API
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderPayment {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub confirmation: Option<ConfirmationResponse>,
}

/// Webhook notification envelope
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookNotification {
    pub event: String,
    pub object: WebhookPaymentObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPaymentObject {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Everything the bot needs to hand a payment to the user
#[derive(Debug, Clone)]
pub struct PaymentTicket {
    pub payment_id: i64,
    pub confirmation_url: String,
}

/// HTTP client for the payment provider
#[derive(Debug, Clone)]
pub struct PaymentsClient {
    http: Client,
    config: PaymentsConfig,
}

impl PaymentsClient {
    pub fn new(http: Client, config: PaymentsConfig) -> Self {
        Self { http, config }
    }

    /// Register a payment with the provider and get the confirmation URL
    pub async fn create_payment(&self, plan: &SubscriptionPlan) -> Result<ProviderPayment> {
        let request = CreatePaymentRequest {
            amount: PaymentAmount {
                value: plan.price_value(),
                currency: CURRENCY.to_string(),
            },
            confirmation: ConfirmationRequest {
                kind: "redirect".to_string(),
                return_url: self.config.return_url.clone(),
            },
            capture: true,
            description: payment_description(plan),
        };

        debug!(plan = %plan.title, amount = %request.amount.value, "Creating provider payment");

        let response = self
            .http
            .post(format!("{}/payments", self.config.api_base))
            .basic_auth(&self.config.shop_id, Some(&self.config.secret_key))
            .header("Idempotence-Key", Uuid::new_v4().to_string())
            .json(&request)
            .send()
            .await
            .context("Failed to send payment creation request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Payment API returned {status}: {body}");
        }

        let payment: ProviderPayment = response
            .json()
            .await
            .context("Failed to parse payment creation response")?;

        info!(provider_payment_id = %payment.id, status = %payment.status, "Provider payment created");
        Ok(payment)
    }

    /// Fetch the current status of a payment from the provider
    pub async fn fetch_status(&self, provider_payment_id: &str) -> Result<String> {
        let response = self
            .http
            .get(format!(
                "{}/payments/{}",
                self.config.api_base, provider_payment_id
            ))
            .basic_auth(&self.config.shop_id, Some(&self.config.secret_key))
            .send()
            .await
            .context("Failed to send payment status request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Payment API returned {status}: {body}");
        }

        let payment: ProviderPayment = response
            .json()
            .await
            .context("Failed to parse payment status response")?;

        Ok(payment.status)
    }
}

/// Provider-facing description of a subscription purchase
fn payment_description(plan: &SubscriptionPlan) -> String {
    format!("Подписка {} {:.0} {}", plan.title, plan.price, CURRENCY)
}

/// Whether a stored payment may move to the incoming status
fn should_transition(current: &str, incoming: &str) -> bool {
    current == STATUS_PENDING
        && (incoming == STATUS_SUCCEEDED || incoming == STATUS_CANCELED)
}

/// Create the subscription period, its pending payment, and the provider payment.
///
/// The subscription row and the pending payment are stored first so a provider
/// failure leaves an auditable pending record instead of a charge we forgot.
pub async fn start_subscription_payment(
    pool: &PgPool,
    client: &PaymentsClient,
    user_id: i64,
    plan: &SubscriptionPlan,
    today: NaiveDate,
) -> Result<PaymentTicket> {
    let (start_date, end_date) = subscription::plan_period(today, plan.months);

    let (subscription_id, payment_id) = db::create_subscription_with_payment(
        pool,
        user_id,
        &plan.title,
        plan.price,
        CURRENCY,
        start_date,
        end_date,
    )
    .await?;

    let provider_payment = client.create_payment(plan).await?;
    db::set_payment_provider_id(pool, payment_id, &provider_payment.id).await?;

    let confirmation_url = provider_payment
        .confirmation
        .and_then(|confirmation| confirmation.confirmation_url)
        .context("Payment provider returned no confirmation URL")?;

    observability::record_payment_event(STATUS_PENDING);
    info!(
        user_id = %user_id,
        subscription_id = %subscription_id,
        payment_id = %payment_id,
        "Subscription payment started"
    );

    Ok(PaymentTicket {
        payment_id,
        confirmation_url,
    })
}

/// Apply a provider-reported status to the matching stored payment.
///
/// Returns the updated payment record when a transition happened, `None` when
/// the provider id is unknown or the payment is already settled.
pub async fn apply_provider_status(
    pool: &PgPool,
    provider_payment_id: &str,
    incoming_status: &str,
) -> Result<Option<db::PaymentRecord>> {
    let Some(payment) = db::get_payment_by_provider_id(pool, provider_payment_id).await? else {
        warn!(provider_payment_id = %provider_payment_id, "Status update for unknown payment");
        return Ok(None);
    };

    if !should_transition(&payment.status, incoming_status) {
        debug!(
            payment_id = %payment.id,
            current = %payment.status,
            incoming = %incoming_status,
            "Ignoring payment status update"
        );
        return Ok(None);
    }

    db::set_payment_status(pool, payment.id, incoming_status).await?;
    observability::record_payment_event(incoming_status);
    info!(payment_id = %payment.id, status = %incoming_status, "Payment status updated");

    Ok(Some(db::PaymentRecord {
        status: incoming_status.to_string(),
        ..payment
    }))
}

/// Re-check a pending payment against the provider, persisting any settlement.
///
/// Returns the payment's current status, or `None` when the payment id is
/// unknown.
pub async fn check_payment(
    pool: &PgPool,
    client: &PaymentsClient,
    payment_id: i64,
) -> Result<Option<String>> {
    let Some(payment) = db::get_payment(pool, payment_id).await? else {
        return Ok(None);
    };

    if payment.status != STATUS_PENDING {
        return Ok(Some(payment.status));
    }

    let Some(provider_payment_id) = payment.provider_payment_id.as_deref() else {
        // Provider never accepted this payment; nothing to re-check
        return Ok(Some(payment.status));
    };

    let provider_status = client.fetch_status(provider_payment_id).await?;

    if should_transition(&payment.status, &provider_status) {
        db::set_payment_status(pool, payment.id, &provider_status).await?;
        observability::record_payment_event(&provider_status);
        info!(payment_id = %payment.id, status = %provider_status, "Payment settled on re-check");
        return Ok(Some(provider_status));
    }

    Ok(Some(payment.status))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> SubscriptionPlan {
        SubscriptionPlan {
            months: 3,
            title: "Квартальная".to_string(),
            price: 499.0,
        }
    }

    #[test]
    fn test_payment_description() {
        assert_eq!(payment_description(&plan()), "Подписка Квартальная 499 RUB");
    }

    #[test]
    fn test_create_payment_request_shape() {
        let request = CreatePaymentRequest {
            amount: PaymentAmount {
                value: plan().price_value(),
                currency: CURRENCY.to_string(),
            },
            confirmation: ConfirmationRequest {
                kind: "redirect".to_string(),
                return_url: "https://t.me/test_bot".to_string(),
            },
            capture: true,
            description: payment_description(&plan()),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["amount"]["value"], "499.00");
        assert_eq!(value["amount"]["currency"], "RUB");
        assert_eq!(value["confirmation"]["type"], "redirect");
        assert_eq!(value["capture"], true);
    }

    #[test]
    fn test_provider_payment_parsing() {
        let raw = r#"{
            "id": "2d7f9a3c-000f-5000-8000-1a2b3c4d5e6f",
            "status": "pending",
            "confirmation": {
                "type": "redirect",
                "confirmation_url": "https://yoomoney.ru/checkout/payments/v2/contract?orderId=x"
            }
        }"#;

        let payment: ProviderPayment = serde_json::from_str(raw).unwrap();
        assert_eq!(payment.status, "pending");
        assert!(payment
            .confirmation
            .unwrap()
            .confirmation_url
            .unwrap()
            .starts_with("https://yoomoney.ru/"));
    }

    #[test]
    fn test_webhook_notification_parsing() {
        let raw = r#"{
            "type": "notification",
            "event": "payment.succeeded",
            "object": {
                "id": "2d7f9a3c-000f-5000-8000-1a2b3c4d5e6f",
                "status": "succeeded",
                "paid": true
            }
        }"#;

        let notification: WebhookNotification = serde_json::from_str(raw).unwrap();
        assert_eq!(notification.event, EVENT_PAYMENT_SUCCEEDED);
        assert_eq!(notification.object.status.as_deref(), Some("succeeded"));
    }

    #[test]
    fn test_status_transitions() {
        assert!(should_transition(STATUS_PENDING, STATUS_SUCCEEDED));
        assert!(should_transition(STATUS_PENDING, STATUS_CANCELED));
        assert!(!should_transition(STATUS_SUCCEEDED, STATUS_CANCELED));
        assert!(!should_transition(STATUS_CANCELED, STATUS_SUCCEEDED));
        assert!(!should_transition(STATUS_PENDING, "waiting_for_capture"));
    }
}
