//! Payment processor client: checkout sessions and webhook verification.

use crate::models::payment::{
    CheckoutSession, CheckoutSessionRequest, CheckoutStatus, Metadata, WebhookEvent,
};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed webhook payload.
pub const WEBHOOK_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Payment request failed: {0}")]
    RequestFailed(String),

    #[error("Payment processor returned error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid payment processor response: {0}")]
    InvalidResponse(String),

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("Webhook secret not configured")]
    WebhookNotConfigured,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentError>;

    async fn get_checkout_status(&self, session_id: &str) -> Result<CheckoutStatus, PaymentError>;

    async fn handle_webhook(&self, body: &[u8], signature: &str)
    -> Result<WebhookEvent, PaymentError>;
}

pub struct StripeGateway {
    api_key: String,
    webhook_secret: Option<String>,
    api_url: String,
    client: reqwest::Client,
}

impl StripeGateway {
    pub fn new(api_key: String, webhook_secret: Option<String>, api_url: String) -> Self {
        StripeGateway {
            api_key,
            webhook_secret,
            api_url: api_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn read_json<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, PaymentError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PaymentError::RequestFailed(e.to_string()))?;
        if !status.is_success() {
            let message = serde_json::from_str::<StripeErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(PaymentError::ApiError {
                status: status.as_u16(),
                message,
            });
        }
        serde_json::from_str(&body).map_err(|e| PaymentError::InvalidResponse(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct StripeSession {
    id: String,
    url: Option<String>,
    status: Option<String>,
    payment_status: Option<String>,
    amount_total: Option<i64>,
    currency: Option<String>,
    #[serde(default)]
    metadata: Metadata,
    payment_intent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: StripeSession,
}

/// Form fields for a one-line-item payment-mode checkout session.
pub fn checkout_form(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let unit_amount = (request.amount * 100.0).round() as i64;
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
        ("line_items[0][quantity]".to_string(), "1".to_string()),
        (
            "line_items[0][price_data][currency]".to_string(),
            request.currency.clone(),
        ),
        (
            "line_items[0][price_data][unit_amount]".to_string(),
            unit_amount.to_string(),
        ),
        (
            "line_items[0][price_data][product_data][name]".to_string(),
            request.product_name.clone(),
        ),
    ];
    form.extend(
        request
            .metadata
            .iter()
            .map(|(key, value)| (format!("metadata[{}]", key), value.clone())),
    );
    form
}

/// Endpoint of one checkout session; the id is always a single encoded path
/// segment.
pub fn session_url(api_url: &str, session_id: &str) -> Result<reqwest::Url, PaymentError> {
    let invalid = || PaymentError::RequestFailed(format!("invalid API URL: {}", api_url));
    let mut url = reqwest::Url::parse(api_url).map_err(|_| invalid())?;
    url.path_segments_mut()
        .map_err(|_| invalid())?
        .pop_if_empty()
        .extend(["v1", "checkout", "sessions", session_id]);
    Ok(url)
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_url))
            .bearer_auth(&self.api_key)
            .form(&checkout_form(request))
            .send()
            .await
            .map_err(|e| PaymentError::RequestFailed(e.to_string()))?;

        let session: StripeSession = Self::read_json(response).await?;
        let url = session
            .url
            .ok_or_else(|| PaymentError::InvalidResponse("checkout session has no url".to_string()))?;
        debug!(session_id = %session.id, "Created checkout session");

        Ok(CheckoutSession {
            url,
            session_id: session.id,
        })
    }

    async fn get_checkout_status(&self, session_id: &str) -> Result<CheckoutStatus, PaymentError> {
        let response = self
            .client
            .get(session_url(&self.api_url, session_id)?)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| PaymentError::RequestFailed(e.to_string()))?;

        let session: StripeSession = Self::read_json(response).await?;
        Ok(CheckoutStatus {
            status: session.status.unwrap_or_else(|| "open".to_string()),
            payment_status: session.payment_status.unwrap_or_else(|| "unpaid".to_string()),
            amount_total: session.amount_total.unwrap_or(0),
            currency: session.currency.unwrap_or_else(|| "usd".to_string()),
            metadata: session.metadata,
            payment_intent: session.payment_intent,
        })
    }

    async fn handle_webhook(
        &self,
        body: &[u8],
        signature: &str,
    ) -> Result<WebhookEvent, PaymentError> {
        let secret = self
            .webhook_secret
            .as_deref()
            .ok_or(PaymentError::WebhookNotConfigured)?;
        verify_signature(body, signature, secret, chrono::Utc::now().timestamp())?;

        let event: StripeEvent =
            serde_json::from_slice(body).map_err(|e| PaymentError::InvalidResponse(e.to_string()))?;
        let session = event.data.object;
        Ok(WebhookEvent {
            event_type: event.event_type,
            event_id: event.id,
            session_id: session.id,
            payment_status: session.payment_status.unwrap_or_default(),
            metadata: session.metadata,
        })
    }
}

/// Checks a `t=<unix>,v1=<hex hmac>` signature header against `payload`.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), PaymentError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| PaymentError::InvalidSignature("missing timestamp".to_string()))?;
    if (now - timestamp).abs() > WEBHOOK_TOLERANCE_SECS {
        return Err(PaymentError::InvalidSignature(
            "timestamp outside tolerance".to_string(),
        ));
    }

    for candidate in candidates {
        let Ok(expected) = hex::decode(candidate) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| PaymentError::InvalidSignature(e.to_string()))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        if mac.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }

    Err(PaymentError::InvalidSignature(
        "no matching signature".to_string(),
    ))
}
