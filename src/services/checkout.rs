//! Checkout flows: opening sessions, syncing their status, recording purchases.

use crate::auth::UserContext;
use crate::models::payment::{
    CheckoutSession, CheckoutSessionRequest, CheckoutStatus, CreateCartCheckoutRequest,
    CreateCheckoutRequest, Metadata, PaymentTransaction, Purchase, SopType, TransactionStatus,
    split_proceeds,
};
use crate::services::payments::{PaymentError, PaymentGateway};
use crate::services::store::{PaymentStore, StoreError, TransactionUpdate};
use chrono::Utc;
use thiserror::Error;
use tracing::info;

pub const CURRENCY: &str = "usd";
pub const SESSION_COMPLETED_EVENT: &str = "checkout.session.completed";

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("SOP not found")]
    SopNotFound,

    #[error("SOP is not available for purchase")]
    NotForSale,

    #[error("SOP has no price set")]
    NoPrice,

    #[error("Cart total must be greater than 0")]
    EmptyCart,

    #[error("Cannot create checkout for another user's cart")]
    ForeignCart,

    #[error("Payment transaction not found")]
    TransactionNotFound,

    #[error("Missing Stripe-Signature header")]
    MissingSignature,

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn success_url(origin: &str) -> String {
    format!(
        "{}/purchase-success?session_id={{CHECKOUT_SESSION_ID}}",
        origin.trim_end_matches('/')
    )
}

fn cancel_url(origin: &str, page: &str) -> String {
    format!("{}/{}", origin.trim_end_matches('/'), page)
}

fn encode_metadata(metadata: &Metadata) -> String {
    serde_json::to_string(metadata).unwrap_or_else(|_| "{}".to_string())
}

/// Opens a checkout session for a single marketplace SOP. Guests may buy.
pub async fn create_sop_checkout(
    gateway: &dyn PaymentGateway,
    store: &dyn PaymentStore,
    request: &CreateCheckoutRequest,
    buyer: Option<&UserContext>,
) -> Result<CheckoutSession, CheckoutError> {
    let sop = store
        .find_sop(&request.sop_id)
        .await?
        .ok_or(CheckoutError::SopNotFound)?;
    if sop.sop_type != SopType::Marketplace {
        return Err(CheckoutError::NotForSale);
    }
    let price = sop.price.filter(|p| *p != 0).ok_or(CheckoutError::NoPrice)?;
    let amount = price as f64 / 100.0;

    let metadata = Metadata::from([
        ("sop_id".to_string(), sop.id.clone()),
        ("sop_title".to_string(), sop.title.clone()),
        ("creator_id".to_string(), sop.creator_id.clone()),
        ("source".to_string(), "web_checkout".to_string()),
    ]);

    let session = gateway
        .create_checkout_session(&CheckoutSessionRequest {
            amount,
            currency: CURRENCY.to_string(),
            product_name: sop.title.clone(),
            success_url: success_url(&request.origin_url),
            cancel_url: cancel_url(&request.origin_url, "marketplace"),
            metadata: metadata.clone(),
        })
        .await?;

    store
        .create_transaction(PaymentTransaction {
            session_id: session.session_id.clone(),
            amount,
            currency: CURRENCY.to_string(),
            status: TransactionStatus::Pending,
            payment_status: None,
            payment_id: None,
            metadata: encode_metadata(&metadata),
            user_id: buyer.map(|u| u.user_id.clone()),
            user_email: buyer.and_then(|u| u.email.clone()),
            created_at: Utc::now(),
        })
        .await?;

    info!(session_id = %session.session_id, sop_id = %sop.id, "Created checkout session");
    Ok(session)
}

/// Opens one checkout session covering every item in the caller's cart.
pub async fn create_cart_checkout(
    gateway: &dyn PaymentGateway,
    store: &dyn PaymentStore,
    request: &CreateCartCheckoutRequest,
    user: &UserContext,
) -> Result<CheckoutSession, CheckoutError> {
    let total = request.cart_items.iter().map(|item| item.sop_price).sum::<f64>() / 100.0;
    if total <= 0.0 {
        return Err(CheckoutError::EmptyCart);
    }
    if request.user_id != user.user_id {
        return Err(CheckoutError::ForeignCart);
    }

    let item_ids: Vec<&str> = request.cart_items.iter().map(|i| i.sop_id.as_str()).collect();
    let metadata = Metadata::from([
        ("user_id".to_string(), user.user_id.clone()),
        ("cart_items".to_string(), item_ids.join(",")),
        ("item_count".to_string(), request.cart_items.len().to_string()),
        ("source".to_string(), "cart_checkout".to_string()),
    ]);

    let session = gateway
        .create_checkout_session(&CheckoutSessionRequest {
            amount: total,
            currency: CURRENCY.to_string(),
            product_name: format!("{} SOPs", request.cart_items.len()),
            success_url: success_url(&request.origin_url),
            cancel_url: cancel_url(&request.origin_url, "cart"),
            metadata: metadata.clone(),
        })
        .await?;

    store
        .create_transaction(PaymentTransaction {
            session_id: session.session_id.clone(),
            amount: total,
            currency: CURRENCY.to_string(),
            status: TransactionStatus::Pending,
            payment_status: None,
            payment_id: None,
            metadata: encode_metadata(&metadata),
            user_id: Some(user.user_id.clone()),
            user_email: user.email.clone(),
            created_at: Utc::now(),
        })
        .await?;

    info!(
        session_id = %session.session_id,
        items = request.cart_items.len(),
        "Created cart checkout session"
    );
    Ok(session)
}

/// Pulls the session status from the processor, persists any change and
/// records the purchase for a completed, paid session.
pub async fn refresh_checkout_status(
    gateway: &dyn PaymentGateway,
    store: &dyn PaymentStore,
    session_id: &str,
    caller: Option<&UserContext>,
) -> Result<CheckoutStatus, CheckoutError> {
    let checkout = gateway.get_checkout_status(session_id).await?;
    let transaction = store
        .find_transaction(session_id)
        .await?
        .ok_or(CheckoutError::TransactionNotFound)?;

    let new_status = TransactionStatus::from_checkout_status(&checkout.status);
    if transaction.status != new_status {
        store
            .update_transaction(
                session_id,
                TransactionUpdate {
                    status: new_status,
                    payment_status: Some(checkout.payment_status.clone()),
                    payment_id: checkout.payment_intent.clone(),
                },
            )
            .await?;
    }

    // A webhook may already have completed the transaction; the purchase
    // lookup in `record_purchase` keeps this idempotent.
    if new_status == TransactionStatus::Completed && checkout.payment_status == "paid" {
        let buyer_id = caller
            .map(|u| u.user_id.clone())
            .or_else(|| transaction.user_id.clone());
        record_purchase(store, session_id, &checkout, buyer_id).await?;
    }

    Ok(checkout)
}

async fn record_purchase(
    store: &dyn PaymentStore,
    session_id: &str,
    checkout: &CheckoutStatus,
    buyer_id: Option<String>,
) -> Result<(), CheckoutError> {
    let (Some(sop_id), Some(creator_id)) = (
        checkout.metadata.get("sop_id"),
        checkout.metadata.get("creator_id"),
    ) else {
        return Ok(());
    };

    if store.find_purchase(sop_id, session_id).await?.is_some() {
        return Ok(());
    }

    let Some(buyer_id) = buyer_id else {
        info!(%sop_id, "Guest purchase completed; no purchase record created");
        return Ok(());
    };

    let total = checkout.amount_total as f64 / 100.0;
    let (platform_fee, creator_revenue) = split_proceeds(total);
    store
        .create_purchase(Purchase {
            id: uuid::Uuid::new_v4().to_string(),
            sop_id: sop_id.clone(),
            buyer_id: buyer_id.clone(),
            seller_id: creator_id.clone(),
            price: total,
            platform_fee,
            creator_revenue,
            stripe_payment_id: session_id.to_string(),
            created_at: Utc::now(),
        })
        .await?;

    info!(%sop_id, %buyer_id, "Purchase record created");
    Ok(())
}

/// Verifies and applies a processor webhook.
pub async fn handle_webhook(
    gateway: &dyn PaymentGateway,
    store: &dyn PaymentStore,
    body: &[u8],
    signature: Option<&str>,
) -> Result<(), CheckoutError> {
    let signature = signature.ok_or(CheckoutError::MissingSignature)?;
    let event = gateway.handle_webhook(body, signature).await?;
    info!(
        event_type = %event.event_type,
        session_id = %event.session_id,
        "Webhook received"
    );

    if event.event_type == SESSION_COMPLETED_EVENT {
        store
            .update_transaction(
                &event.session_id,
                TransactionUpdate {
                    status: TransactionStatus::Completed,
                    payment_status: Some(event.payment_status),
                    payment_id: None,
                },
            )
            .await?;
    }
    Ok(())
}
