use anyhow::Context;
use sop_gateway::{
    api::{self, AppState},
    config::ServerConfig,
    services::{llm, payments::StripeGateway, store::InMemoryPaymentStore},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let store = match &config.sop_catalog_path {
        Some(path) => InMemoryPaymentStore::from_catalog_file(path)
            .with_context(|| format!("Failed to load SOP catalog from {}", path.display()))?,
        None => InMemoryPaymentStore::new(),
    };

    let payments = StripeGateway::new(
        config.stripe_api_key.clone(),
        config.stripe_webhook_secret.clone(),
        config.stripe_api_url.clone(),
    );
    if config.stripe_webhook_secret.is_none() {
        tracing::warn!("STRIPE_WEBHOOK_SECRET not set; webhooks will be rejected");
    }
    if config.jwt_secret.is_none() {
        tracing::warn!("JWT_SECRET not set; authenticated routes will fail");
    }

    let llm: Arc<dyn llm::LlmProvider> = Arc::from(llm::create_provider(&config.pipeline));
    tracing::info!(
        "Using {} provider ({}), proxying to {}",
        llm.provider_name(),
        llm.model_name(),
        config.upstream_url
    );

    let bind_addr = config.bind_addr.clone();
    let state = AppState {
        config: Arc::new(config),
        http: reqwest::Client::new(),
        llm,
        payments: Arc::new(payments),
        store: Arc::new(store),
    };

    let app = api::router(state);

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
