use super::{ApiError, AppState};
use crate::auth::{AuthUser, MaybeUser};
use crate::models::payment::{
    CheckoutSession, CheckoutStatus, CreateCartCheckoutRequest, CreateCheckoutRequest,
};
use crate::services::checkout::{self, CheckoutError};
use crate::services::payments::PaymentError;
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use serde_json::{Value, json};
use tracing::error;

/// Maps a checkout failure to its HTTP reply; unexpected failures are logged
/// and reported under `context`.
fn checkout_error(err: CheckoutError, context: &str) -> ApiError {
    let status = match &err {
        CheckoutError::SopNotFound | CheckoutError::TransactionNotFound => StatusCode::NOT_FOUND,
        CheckoutError::NotForSale
        | CheckoutError::NoPrice
        | CheckoutError::EmptyCart
        | CheckoutError::MissingSignature
        | CheckoutError::Payment(PaymentError::InvalidSignature(_)) => StatusCode::BAD_REQUEST,
        CheckoutError::ForeignCart => StatusCode::FORBIDDEN,
        CheckoutError::Payment(_) | CheckoutError::Store(_) => {
            error!("{}: {}", context, err);
            return ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("{}: {}", context, err),
            );
        }
    };
    ApiError::new(status, err.to_string())
}

pub async fn create_checkout_session(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Json(request): Json<CreateCheckoutRequest>,
) -> Result<Json<CheckoutSession>, ApiError> {
    checkout::create_sop_checkout(
        state.payments.as_ref(),
        state.store.as_ref(),
        &request,
        user.as_ref(),
    )
    .await
    .map(Json)
    .map_err(|e| checkout_error(e, "Failed to create checkout session"))
}

pub async fn get_checkout_status(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(session_id): Path<String>,
) -> Result<Json<CheckoutStatus>, ApiError> {
    checkout::refresh_checkout_status(
        state.payments.as_ref(),
        state.store.as_ref(),
        &session_id,
        user.as_ref(),
    )
    .await
    .map(Json)
    .map_err(|e| checkout_error(e, "Failed to get checkout status"))
}

pub async fn create_cart_checkout(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<CreateCartCheckoutRequest>,
) -> Result<Json<CheckoutSession>, ApiError> {
    checkout::create_cart_checkout(state.payments.as_ref(), state.store.as_ref(), &request, &user)
        .await
        .map(Json)
        .map_err(|e| checkout_error(e, "Failed to create checkout session"))
}

pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok());

    checkout::handle_webhook(
        state.payments.as_ref(),
        state.store.as_ref(),
        &body,
        signature,
    )
    .await
    .map_err(|e| checkout_error(e, "Webhook error"))?;

    Ok(Json(json!({ "received": true })))
}

#[cfg(test)]
mod tests {
    use crate::api::router;
    use crate::api::tests::{JWT_SECRET, body_json, test_state};
    use crate::auth::{UserContext, issue_token};
    use crate::models::payment::SopType;
    use crate::services::checkout::tests::{FakeGateway, listing};
    use crate::services::llm::FakeProvider;
    use crate::services::store::InMemoryPaymentStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(store: Arc<InMemoryPaymentStore>) -> axum::Router {
        router(test_state(
            "http://127.0.0.1:9",
            FakeProvider::new(),
            FakeGateway::default(),
            store,
        ))
    }

    fn bearer(user_id: &str) -> String {
        let user = UserContext {
            user_id: user_id.to_string(),
            email: None,
            name: None,
            role: "user".to_string(),
        };
        format!(
            "Bearer {}",
            issue_token(&user, JWT_SECRET, Duration::from_secs(300)).unwrap()
        )
    }

    fn post_json(uri: &str) -> axum::http::request::Builder {
        Request::post(uri).header(header::CONTENT_TYPE, "application/json")
    }

    #[tokio::test]
    async fn guest_checkout_creates_session() {
        let store = Arc::new(InMemoryPaymentStore::with_catalog([listing(
            "sop-1",
            SopType::Marketplace,
            Some(2500),
        )]));
        let body = serde_json::json!({"sop_id": "sop-1", "origin_url": "https://app.test"});
        let response = app(store.clone())
            .oneshot(
                post_json("/api/stripe/create-checkout-session")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["session_id"], "cs_test_1");
        assert!(json["url"].as_str().unwrap().starts_with("https://checkout.test/"));
    }

    #[tokio::test]
    async fn unknown_sop_is_not_found() {
        let body = serde_json::json!({"sop_id": "missing", "origin_url": "https://app.test"});
        let response = app(Arc::new(InMemoryPaymentStore::new()))
            .oneshot(
                post_json("/api/stripe/create-checkout-session")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "SOP not found");
    }

    #[tokio::test]
    async fn cart_checkout_requires_token() {
        let body = serde_json::json!({
            "user_id": "u-1",
            "origin_url": "https://app.test",
            "cart_items": [{"sop_id": "a", "sop_title": "A", "sop_price": 900.0, "creator_id": "c"}]
        });

        let anonymous = app(Arc::new(InMemoryPaymentStore::new()))
            .oneshot(
                post_json("/api/stripe/create-cart-checkout")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(anonymous).await["error"],
            "Missing Authorization header"
        );

        let someone_else = app(Arc::new(InMemoryPaymentStore::new()))
            .oneshot(
                post_json("/api/stripe/create-cart-checkout")
                    .header(header::AUTHORIZATION, bearer("u-2"))
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(someone_else.status(), StatusCode::FORBIDDEN);

        let owner = app(Arc::new(InMemoryPaymentStore::new()))
            .oneshot(
                post_json("/api/stripe/create-cart-checkout")
                    .header(header::AUTHORIZATION, bearer("u-1"))
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(owner.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn webhook_without_signature_is_rejected() {
        let response = app(Arc::new(InMemoryPaymentStore::new()))
            .oneshot(
                Request::post("/api/stripe/webhook")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["error"],
            "Missing Stripe-Signature header"
        );
    }

    #[tokio::test]
    async fn failed_status_lookup_is_server_error() {
        let response = app(Arc::new(InMemoryPaymentStore::new()))
            .oneshot(
                Request::get("/api/stripe/checkout-status/cs_unknown")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert!(
            json["error"]
                .as_str()
                .unwrap()
                .starts_with("Failed to get checkout status")
        );
    }
}
