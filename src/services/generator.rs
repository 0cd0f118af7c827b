//! Prompt construction and the single model call per document.

use crate::models::ExtractedContent;
use crate::services::llm::{ChatRequest, LlmError, LlmProvider};
use crate::utils::truncate_chars;
use std::path::Path;
use tracing::info;

/// Characters of document text forwarded to the model.
pub const MAX_CONTENT_CHARS: usize = 8000;

const ROLE_PREAMBLE: &str = "You are an expert at creating Standard Operating Procedures (SOPs).
Your task is to analyze documents and convert them into clear, actionable SOP steps.";

const DEFAULT_INSTRUCTIONS: &str = r#"Each step should have:
- A clear, concise title (max 60 characters)
- Detailed description of what to do
- Optional timer in seconds if the step requires specific timing
- Optional references or notes

Return ONLY a valid JSON array of steps in this exact format:
[
  {
    "title": "Step title",
    "description": "Detailed description of what to do in this step",
    "timerSeconds": 300,
    "references": ["Reference 1", "Reference 2"]
  }
]

Important:
- Return ONLY the JSON array, no additional text
- Create 3-15 steps depending on complexity
- Be specific and actionable
- Include timing when relevant
- Make it easy to follow"#;

pub struct GenerationRequest<'a> {
    pub content: &'a ExtractedContent,
    /// Set for image uploads; selects the image prompt.
    pub source_path: Option<&'a Path>,
    /// Replaces the default step-format instructions when present.
    pub custom_prompt: Option<&'a str>,
    pub session_id: String,
}

/// Fresh conversation id for one document, unique across processes and calls.
pub fn new_session_id() -> String {
    format!(
        "sop-generation-{}-{}",
        std::process::id(),
        uuid::Uuid::new_v4()
    )
}

/// An empty custom prompt counts as absent.
pub fn system_message(custom_prompt: Option<&str>) -> String {
    format!(
        "{}\n\n{}",
        ROLE_PREAMBLE,
        custom_prompt
            .filter(|prompt| !prompt.is_empty())
            .unwrap_or(DEFAULT_INSTRUCTIONS)
    )
}

pub fn user_message(content: &ExtractedContent, source_path: Option<&Path>) -> String {
    match (content, source_path) {
        (ExtractedContent::Image(descriptor), Some(_)) => format!(
            "Analyze this image and create SOP steps based on what you see.

The image contains: {}

Please create detailed SOP steps that describe the process shown in the image.
Return ONLY the JSON array of steps.",
            descriptor
        ),
        _ => format!(
            "Analyze this document and create SOP steps:

{}

Please create detailed SOP steps based on this content.
Return ONLY the JSON array of steps.",
            truncate_chars(content.body(), MAX_CONTENT_CHARS)
        ),
    }
}

/// Sends one request to `provider` and returns its reply verbatim.
pub async fn generate(
    provider: &dyn LlmProvider,
    request: &GenerationRequest<'_>,
) -> Result<String, LlmError> {
    let chat = ChatRequest {
        session_id: request.session_id.clone(),
        system_message: system_message(request.custom_prompt),
        user_message: user_message(request.content, request.source_path),
    };

    info!(
        provider = provider.provider_name(),
        model = provider.model_name(),
        session_id = %chat.session_id,
        kind = ?request.content.kind(),
        "Generating SOP steps"
    );

    provider.complete(&chat).await
}
