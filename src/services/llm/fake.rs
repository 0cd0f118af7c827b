//! Deterministic provider for tests and offline runs.

use super::{ChatRequest, LlmError, LlmProvider};
use async_trait::async_trait;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Replies are matched by case-insensitive substring against the user message,
/// in registration order. Unmatched requests get the default reply, or an
/// error when none is set.
#[derive(Debug, Default)]
pub struct FakeProvider {
    responses: RwLock<Vec<(String, String)>>,
    default_response: Option<String>,
    calls: AtomicUsize,
    last_request: RwLock<Option<ChatRequest>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(message_contains: &str, response: &str) -> Self {
        let provider = Self::new();
        provider.add_response(message_contains, response);
        provider
    }

    pub fn with_default_response(mut self, response: &str) -> Self {
        self.default_response = Some(response.to_string());
        self
    }

    /// Canned three-step procedure, used when `LLM_PROVIDER=fake`.
    pub fn with_sample_steps() -> Self {
        Self::new().with_default_response(
            r#"[
  {"title": "Prepare the workspace", "description": "Clear and sanitize the work area.", "timerSeconds": 120},
  {"title": "Follow the documented procedure", "description": "Carry out the steps described in the source document."},
  {"title": "Record the outcome", "description": "Log results and sign off.", "references": ["Source document"]}
]"#,
        )
    }

    pub fn add_response(&self, message_contains: &str, response: &str) {
        if let Ok(mut responses) = self.responses.write() {
            responses.push((message_contains.to_lowercase(), response.to_string()));
        }
    }

    /// Number of `complete` calls received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.last_request.read().ok().and_then(|last| last.clone())
    }
}

#[async_trait]
impl LlmProvider for FakeProvider {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_request.write() {
            *last = Some(request.clone());
        }

        let message = request.user_message.to_lowercase();
        let responses = self
            .responses
            .read()
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;
        if let Some((_, response)) = responses
            .iter()
            .find(|(pattern, _)| message.contains(pattern.as_str()))
        {
            return Ok(response.clone());
        }

        self.default_response.clone().ok_or_else(|| {
            LlmError::RequestFailed(format!(
                "FakeProvider: no response configured for message (first 100 chars): {}",
                crate::utils::truncate_chars(&request.user_message, 100)
            ))
        })
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }

    fn model_name(&self) -> &str {
        "fake-model"
    }
}
