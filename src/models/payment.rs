use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Metadata = BTreeMap<String, String>;

/// Share of each sale kept by the platform; the creator receives the rest.
pub const PLATFORM_FEE_RATE: f64 = 0.30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SopType {
    Marketplace,
    Personal,
    Group,
}

/// A purchasable SOP as known to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SopListing {
    pub id: String,
    pub title: String,
    pub creator_id: String,
    #[serde(rename = "type")]
    pub sop_type: SopType,
    /// Price in cents.
    pub price: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Expired,
}

impl TransactionStatus {
    /// Maps a checkout session status onto the stored transaction status.
    pub fn from_checkout_status(status: &str) -> Self {
        match status {
            "complete" => TransactionStatus::Completed,
            "expired" => TransactionStatus::Expired,
            _ => TransactionStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTransaction {
    pub session_id: String,
    /// Amount in dollars.
    pub amount: f64,
    pub currency: String,
    pub status: TransactionStatus,
    pub payment_status: Option<String>,
    pub payment_id: Option<String>,
    /// JSON-encoded checkout metadata.
    pub metadata: String,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub id: String,
    pub sop_id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub price: f64,
    pub platform_fee: f64,
    pub creator_revenue: f64,
    pub stripe_payment_id: String,
    pub created_at: DateTime<Utc>,
}

/// Splits a sale total into `(platform_fee, creator_revenue)`.
pub fn split_proceeds(total: f64) -> (f64, f64) {
    (total * PLATFORM_FEE_RATE, total * (1.0 - PLATFORM_FEE_RATE))
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCheckoutRequest {
    pub sop_id: String,
    pub origin_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CartItem {
    pub sop_id: String,
    pub sop_title: String,
    /// Price in cents.
    pub sop_price: f64,
    pub creator_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCartCheckoutRequest {
    pub user_id: String,
    pub origin_url: String,
    pub cart_items: Vec<CartItem>,
}

/// Parameters for opening a checkout session with the payment processor.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSessionRequest {
    /// Amount in dollars.
    pub amount: f64,
    pub currency: String,
    pub product_name: String,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub url: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutStatus {
    pub status: String,
    pub payment_status: String,
    /// Amount in cents.
    pub amount_total: i64,
    pub currency: String,
    pub metadata: Metadata,
    pub payment_intent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event_type: String,
    pub event_id: String,
    pub session_id: String,
    pub payment_status: String,
    pub metadata: Metadata,
}
