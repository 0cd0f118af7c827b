//! Document → SOP steps: extract, generate, parse.
//!
//! [`run`] is the only place failures are turned into the fallback step list;
//! everything below it propagates errors with `?`.

use crate::models::{ExtractedContent, StepList, StepRecord};
use crate::services::extractor;
use crate::services::generator::{self, GenerationRequest};
use crate::services::llm::{LlmError, LlmProvider};
use crate::services::step_parser::{self, ParseError};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct DocumentRequest {
    pub file_path: PathBuf,
    pub mime_type: String,
    pub custom_prompt_file: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Extraction produced an error message (or nothing at all).
    #[error("{0}")]
    Extraction(String),

    #[error("Failed to read custom prompt: {0}")]
    Prompt(#[source] std::io::Error),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Extraction task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Processes one document, always yielding a well-formed step list.
pub async fn run(request: &DocumentRequest, provider: &dyn LlmProvider) -> StepList {
    match process_document(request, provider).await {
        Ok(steps) => {
            info!(path = %request.file_path.display(), steps = steps.len(), "Generated SOP steps");
            steps
        }
        Err(e) => {
            warn!(path = %request.file_path.display(), error = %e, "Document processing failed");
            fallback_steps(&e)
        }
    }
}

pub fn fallback_steps(err: &PipelineError) -> StepList {
    vec![StepRecord::processing_error(&err.to_string())]
}

pub async fn process_document(
    request: &DocumentRequest,
    provider: &dyn LlmProvider,
) -> Result<StepList, PipelineError> {
    let path = request.file_path.clone();
    let mime_type = request.mime_type.clone();
    let content =
        tokio::task::spawn_blocking(move || extractor::extract(&path, &mime_type)).await?;

    if let ExtractedContent::Text(text) = &content {
        if text.is_empty() || text.starts_with("Error") {
            return Err(PipelineError::Extraction(text.clone()));
        }
    }

    let custom_prompt = match &request.custom_prompt_file {
        Some(prompt_path) if tokio::fs::try_exists(prompt_path).await.unwrap_or(false) => Some(
            tokio::fs::read_to_string(prompt_path)
                .await
                .map_err(PipelineError::Prompt)?,
        )
        .filter(|prompt| !prompt.is_empty()),
        _ => None,
    };

    let source_path = match content {
        ExtractedContent::Image(_) => Some(request.file_path.as_path()),
        ExtractedContent::Text(_) => None,
    };

    let raw = generator::generate(
        provider,
        &GenerationRequest {
            content: &content,
            source_path,
            custom_prompt: custom_prompt.as_deref(),
            session_id: generator::new_session_id(),
        },
    )
    .await?;

    Ok(step_parser::parse_steps(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::llm::FakeProvider;
    use tempfile::TempDir;

    fn request_for(dir: &TempDir, name: &str, body: &[u8], mime: &str) -> DocumentRequest {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        DocumentRequest {
            file_path: path,
            mime_type: mime.to_string(),
            custom_prompt_file: None,
        }
    }

    #[tokio::test]
    async fn extraction_error_skips_generator() {
        let dir = TempDir::new().unwrap();
        let request = request_for(&dir, "broken.pdf", b"not a pdf", "application/pdf");
        let provider = FakeProvider::new().with_default_response("[]");

        let steps = run(&request, &provider).await;

        assert_eq!(provider.calls(), 0);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].id, "step-1");
        assert_eq!(steps[0].title(), Some("Error processing document"));
        assert!(
            steps[0]
                .description()
                .unwrap()
                .starts_with("Could not process the document: Error reading PDF")
        );
        assert_eq!(steps[0].timer_seconds(), Some(0));
    }

    #[tokio::test]
    async fn text_starting_with_error_is_fatal() {
        let dir = TempDir::new().unwrap();
        let request = request_for(&dir, "log.txt", b"Error: pump 3 offline", "text/plain");
        let provider = FakeProvider::new().with_default_response("[]");

        let err = process_document(&request, &provider).await.unwrap_err();
        assert!(matches!(err, PipelineError::Extraction(ref msg) if msg == "Error: pump 3 offline"));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn empty_document_is_fatal() {
        let dir = TempDir::new().unwrap();
        let request = request_for(&dir, "empty.txt", b"", "text/plain");
        let provider = FakeProvider::new().with_default_response("[]");

        let steps = run(&request, &provider).await;
        assert_eq!(steps[0].description(), Some("Could not process the document: "));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn generates_and_numbers_steps() {
        let dir = TempDir::new().unwrap();
        let request = request_for(&dir, "sop.txt", b"Calibrate the scale daily.", "text/plain");
        let provider = FakeProvider::with_response(
            "calibrate the scale",
            "```json\n[{\"title\":\"Zero the scale\",\"order\":5},{\"title\":\"Weigh reference mass\",\"timerSeconds\":30}]\n```",
        );

        let steps = process_document(&request, &provider).await.unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].order, 1);
        assert_eq!(steps[1].id, "step-2");
        assert_eq!(steps[1].timer_seconds(), Some(30));
    }

    #[tokio::test]
    async fn custom_prompt_file_is_used_when_present() {
        let dir = TempDir::new().unwrap();
        let mut request = request_for(&dir, "sop.txt", b"Rinse beakers.", "text/plain");
        let prompt_path = dir.path().join("prompt.txt");
        std::fs::write(&prompt_path, "Use imperative mood.").unwrap();
        request.custom_prompt_file = Some(prompt_path);

        let provider = FakeProvider::new().with_default_response(r#"[{"title":"Rinse"}]"#);
        let steps = run(&request, &provider).await;
        assert_eq!(steps[0].title(), Some("Rinse"));
    }

    #[tokio::test]
    async fn missing_custom_prompt_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let mut request = request_for(&dir, "sop.txt", b"Rinse beakers.", "text/plain");
        request.custom_prompt_file = Some(dir.path().join("absent.txt"));

        let provider = FakeProvider::new().with_default_response(r#"[{"title":"Rinse"}]"#);
        assert!(process_document(&request, &provider).await.is_ok());
    }

    #[tokio::test]
    async fn empty_custom_prompt_keeps_default_instructions() {
        let dir = TempDir::new().unwrap();
        let mut request = request_for(&dir, "sop.txt", b"Rinse beakers.", "text/plain");
        let prompt_path = dir.path().join("prompt.txt");
        std::fs::write(&prompt_path, "").unwrap();
        request.custom_prompt_file = Some(prompt_path);

        let provider = FakeProvider::new().with_default_response(r#"[{"title":"Rinse"}]"#);
        process_document(&request, &provider).await.unwrap();

        let sent = provider.last_request().unwrap();
        assert!(sent.system_message.contains("Return ONLY the JSON array"));
        assert!(sent.system_message.contains("Create 3-15 steps"));
    }

    #[tokio::test]
    async fn generator_and_parse_failures_degrade_to_fallback() {
        let dir = TempDir::new().unwrap();
        let request = request_for(&dir, "sop.txt", b"Label samples.", "text/plain");

        let unreachable = FakeProvider::new();
        let steps = run(&request, &unreachable).await;
        assert_eq!(steps.len(), 1);
        assert!(steps[0].description().unwrap().contains("FakeProvider"));

        let chatty = FakeProvider::new().with_default_response("I cannot help with that.");
        let steps = run(&request, &chatty).await;
        assert_eq!(
            steps[0].description(),
            Some("Could not process the document: Could not parse JSON from response: I cannot help with that.")
        );
    }
}
