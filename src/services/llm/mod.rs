//! Generative-model providers used to turn document text into SOP steps.

mod fake;
mod openai;

pub use fake::FakeProvider;
pub use openai::OpenAiProvider;

use crate::config::{PipelineConfig, ProviderKind};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Provider name reported for the production model.
pub const MODEL_PROVIDER: &str = "openai";
/// Model every generation request is pinned to.
pub const MODEL_ID: &str = "gpt-5";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API request failed: {0}")]
    RequestFailed(String),

    #[error("API returned error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    InvalidResponse(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

/// One chat exchange: a system instruction plus a single user message.
///
/// `session_id` isolates the exchange; callers generate a fresh one per
/// document and never reuse it.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub session_id: String,
    pub system_message: String,
    pub user_message: String,
}

#[async_trait]
pub trait LlmProvider: Send + Sync + fmt::Debug {
    /// Sends the request and returns the model's raw text reply.
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;

    fn provider_name(&self) -> &'static str;

    fn model_name(&self) -> &str;
}

pub fn create_provider(config: &PipelineConfig) -> Box<dyn LlmProvider> {
    match config.provider {
        ProviderKind::OpenAi => Box::new(OpenAiProvider::new(
            config.openai_api_key.clone(),
            config.llm_api_url.clone(),
        )),
        ProviderKind::Fake => Box::new(FakeProvider::with_sample_steps()),
    }
}
