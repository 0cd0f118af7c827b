//! Forwards everything not served locally to the upstream application server.

use super::AppState;
use crate::config::ServerConfig;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use http::header::{CONNECTION, HOST, TRANSFER_ENCODING};
use std::time::Duration;
use tracing::{error, info};

pub fn upstream_url(base: &str, uri: &Uri) -> String {
    match uri.path_and_query() {
        Some(path_and_query) => format!("{}{}", base, path_and_query),
        None => format!("{}{}", base, uri.path()),
    }
}

/// Long-running AI endpoints get the extended timeout.
pub fn timeout_for(url: &str, config: &ServerConfig) -> Duration {
    if url.contains("generate-from-file") || url.to_lowercase().contains("ai") {
        config.proxy_ai_timeout
    } else {
        config.proxy_timeout
    }
}

pub async fn proxy(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    mut headers: HeaderMap,
    body: Bytes,
) -> Response {
    let url = upstream_url(&state.config.upstream_url, &uri);
    info!("Proxying {} {}", method, url);

    headers.remove(HOST);
    let timeout = timeout_for(&url, &state.config);

    let result = state
        .http
        .request(method, &url)
        .headers(headers)
        .body(body)
        .timeout(timeout)
        .send()
        .await;

    let upstream = match result {
        Ok(response) => response,
        Err(e) => return proxy_error(e),
    };

    let status = upstream.status();
    let mut response_headers = upstream.headers().clone();
    response_headers.remove(TRANSFER_ENCODING);
    response_headers.remove(CONNECTION);

    match upstream.bytes().await {
        Ok(bytes) => (status, response_headers, bytes).into_response(),
        Err(e) => proxy_error(e),
    }
}

fn proxy_error(err: reqwest::Error) -> Response {
    error!("Error proxying request: {}", err);
    (StatusCode::BAD_GATEWAY, format!("Proxy error: {}", err)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::router;
    use crate::api::tests::{test_config, test_state};
    use crate::services::checkout::tests::FakeGateway;
    use crate::services::llm::FakeProvider;
    use crate::services::store::InMemoryPaymentStore;
    use axum::{Router, body::Body, http::Request};
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tower::ServiceExt;

    async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
        let host_forwarded = headers
            .get("x-original-host")
            .map(|v| v.to_str().unwrap_or_default().to_string())
            .unwrap_or_default();
        (
            StatusCode::CREATED,
            [("x-upstream", "yes")],
            format!(
                "{} {} {} {}",
                method,
                uri,
                String::from_utf8_lossy(&body),
                host_forwarded
            ),
        )
            .into_response()
    }

    async fn spawn_upstream() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().fallback(echo);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn builds_upstream_url_with_query() {
        let uri: Uri = "/api/sops?page=2".parse().unwrap();
        assert_eq!(
            upstream_url("http://localhost:3000", &uri),
            "http://localhost:3000/api/sops?page=2"
        );
    }

    #[test]
    fn picks_ai_timeout_for_ai_paths() {
        let config = test_config("http://localhost:3000");
        assert_eq!(
            timeout_for("http://localhost:3000/api/sops/generate-from-file", &config),
            config.proxy_ai_timeout
        );
        assert_eq!(
            timeout_for("http://localhost:3000/api/AI/suggest", &config),
            config.proxy_ai_timeout
        );
        assert_eq!(
            timeout_for("http://localhost:3000/api/sops", &config),
            config.proxy_timeout
        );
    }

    #[tokio::test]
    async fn forwards_method_path_and_body() {
        let upstream = spawn_upstream().await;
        let app = router(test_state(
            &upstream,
            FakeProvider::new(),
            FakeGateway::default(),
            Arc::new(InMemoryPaymentStore::new()),
        ));

        let response = app
            .oneshot(
                Request::builder()
                    .method("PATCH")
                    .uri("/api/comments/7?draft=true")
                    .header("host", "gateway.example")
                    .header("x-original-host", "kept")
                    .body(Body::from("hello"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-upstream"], "yes");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(
            String::from_utf8_lossy(&bytes),
            "PATCH /api/comments/7?draft=true hello kept"
        );
    }

    #[tokio::test]
    async fn unreachable_upstream_is_bad_gateway() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let app = router(test_state(
            &format!("http://{}", addr),
            FakeProvider::new(),
            FakeGateway::default(),
            Arc::new(InMemoryPaymentStore::new()),
        ));
        let response = app
            .oneshot(Request::get("/marketplace").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&bytes).starts_with("Proxy error: "));
    }
}
