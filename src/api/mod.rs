pub mod documents;
pub mod proxy;
pub mod stripe;

use crate::config::ServerConfig;
use crate::services::llm::LlmProvider;
use crate::services::payments::PaymentGateway;
use crate::services::store::PaymentStore;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, FromRef},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Largest accepted request body (document uploads included).
const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub http: reqwest::Client,
    pub llm: Arc<dyn LlmProvider>,
    pub payments: Arc<dyn PaymentGateway>,
    pub store: Arc<dyn PaymentStore>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A JSON error reply with a fixed status.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/sops/generate-from-file",
            post(documents::generate_from_file),
        )
        .route(
            "/api/stripe/create-checkout-session",
            post(stripe::create_checkout_session),
        )
        .route(
            "/api/stripe/checkout-status/:session_id",
            get(stripe::get_checkout_status),
        )
        .route(
            "/api/stripe/create-cart-checkout",
            post(stripe::create_cart_checkout),
        )
        .route("/api/stripe/webhook", post(stripe::webhook))
        .fallback(proxy::proxy)
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(AllowMethods::any())
                .allow_headers(AllowHeaders::any()),
        )
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::services::checkout::tests::FakeGateway;
    use crate::services::llm::FakeProvider;
    use crate::services::store::InMemoryPaymentStore;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    pub(crate) const JWT_SECRET: &str = "router-test-secret";

    pub(crate) fn test_config(upstream_url: &str) -> ServerConfig {
        ServerConfig::from_lookup(|key| match key {
            "STRIPE_API_KEY" => Some("sk_test".to_string()),
            "JWT_SECRET" => Some(JWT_SECRET.to_string()),
            "UPSTREAM_URL" => Some(upstream_url.to_string()),
            "PROXY_TIMEOUT_SECS" => Some("2".to_string()),
            _ => None,
        })
        .unwrap()
    }

    pub(crate) fn test_state(
        upstream_url: &str,
        llm: FakeProvider,
        payments: FakeGateway,
        store: Arc<InMemoryPaymentStore>,
    ) -> AppState {
        AppState {
            config: Arc::new(test_config(upstream_url)),
            http: reqwest::Client::new(),
            llm: Arc::new(llm),
            payments: Arc::new(payments),
            store,
        }
    }

    pub(crate) async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_check_answers_ok() {
        let app = router(test_state(
            "http://127.0.0.1:9",
            FakeProvider::new(),
            FakeGateway::default(),
            Arc::new(InMemoryPaymentStore::new()),
        ));
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"OK");
    }
}
