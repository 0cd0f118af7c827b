use super::{ApiError, AppState};
use crate::services::pipeline::{self, DocumentRequest};
use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
};
use serde_json::{Value, json};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::info;

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

struct Upload {
    file_name: String,
    mime_type: String,
    bytes: axum::body::Bytes,
}

fn bad_request(err: impl std::fmt::Display) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, err.to_string())
}

/// Only the extension of the client's file name reaches the filesystem.
fn upload_suffix(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 16)
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default()
}

fn temp_file(prefix: &str, suffix: &str, bytes: &[u8]) -> Result<NamedTempFile, ApiError> {
    let write = || -> std::io::Result<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile()?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(file)
    };
    write().map_err(|e| {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to process file: {}", e),
        )
    })
}

/// Turns an uploaded document into SOP steps.
///
/// Expects multipart fields `file` and, optionally, `customPrompt`. Temporary
/// copies are removed when the request finishes.
pub async fn generate_from_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let mut upload = None;
    let mut custom_prompt = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let name = field.name().unwrap_or("unknown").to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let mime_type = field
                    .content_type()
                    .filter(|ct| !ct.is_empty())
                    .unwrap_or(DEFAULT_MIME_TYPE)
                    .to_string();
                let bytes = field.bytes().await.map_err(bad_request)?;
                upload = Some(Upload {
                    file_name,
                    mime_type,
                    bytes,
                });
            }
            "customPrompt" => {
                let text = field.text().await.map_err(bad_request)?;
                if !text.is_empty() {
                    custom_prompt = Some(text);
                }
            }
            _ => {}
        }
    }

    let upload =
        upload.ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, "No file provided"))?;
    info!(
        "File uploaded: {} ({})",
        upload.file_name, upload.mime_type
    );

    let document = temp_file("upload-", &upload_suffix(&upload.file_name), &upload.bytes)?;
    let prompt = custom_prompt
        .map(|text| temp_file("prompt-", ".txt", text.as_bytes()))
        .transpose()?;

    let request = DocumentRequest {
        file_path: document.path().to_path_buf(),
        mime_type: upload.mime_type,
        custom_prompt_file: prompt.as_ref().map(|p| p.path().to_path_buf()),
    };
    let steps = pipeline::run(&request, state.llm.as_ref()).await;

    Ok(Json(json!({ "success": true, "steps": steps })))
}
