//! Recovers an ordered step list from a model reply.

use crate::models::{StepList, StepRecord};
use crate::utils::truncate_chars;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;

/// Longest excerpt of the raw reply carried in a parse error.
pub const EXCERPT_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Response is not a JSON array")]
    NotAnArray,

    #[error("Step {position} is not a JSON object")]
    NotAnObject { position: usize },

    #[error("Could not parse JSON from response: {excerpt}")]
    Unrecoverable { excerpt: String },
}

fn array_span() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\[.*\]").expect("array pattern is valid"))
}

pub fn parse_steps(raw: &str) -> Result<StepList, ParseError> {
    let cleaned = strip_code_fence(raw.trim());

    match serde_json::from_str::<Value>(&cleaned) {
        Ok(Value::Array(items)) => number_steps(items),
        Ok(_) => Err(ParseError::NotAnArray),
        Err(_) => {
            let unrecoverable = || ParseError::Unrecoverable {
                excerpt: truncate_chars(raw, EXCERPT_CHARS).to_string(),
            };
            let span = array_span().find(raw).ok_or_else(unrecoverable)?;
            match serde_json::from_str::<Value>(span.as_str()) {
                Ok(Value::Array(items)) => number_steps(items),
                _ => Err(unrecoverable()),
            }
        }
    }
}

/// Drops the first and last lines of a fenced reply. Replies of two lines or
/// fewer are left alone.
fn strip_code_fence(text: &str) -> String {
    if !text.starts_with("```") {
        return text.to_string();
    }
    let lines: Vec<&str> = text.split('\n').collect();
    if lines.len() > 2 {
        lines[1..lines.len() - 1].join("\n")
    } else {
        text.to_string()
    }
}

fn number_steps(items: Vec<Value>) -> Result<StepList, ParseError> {
    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| match item {
            Value::Object(fields) => Ok(StepRecord::numbered(idx + 1, fields)),
            _ => Err(ParseError::NotAnObject { position: idx + 1 }),
        })
        .collect()
}
