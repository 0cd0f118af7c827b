pub mod payment;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Content pulled out of an uploaded document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedContent {
    /// Plain text, including captured `Error reading ...` messages.
    Text(String),
    /// Textual description of an image (format and pixel size).
    Image(String),
}

impl ExtractedContent {
    pub fn body(&self) -> &str {
        match self {
            ExtractedContent::Text(body) => body,
            ExtractedContent::Image(descriptor) => descriptor,
        }
    }

    pub fn kind(&self) -> ContentKind {
        match self {
            ExtractedContent::Text(_) => ContentKind::Text,
            ExtractedContent::Image(_) => ContentKind::Image,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Image,
}

/// One step of a generated procedure.
///
/// `id` and `order` are always assigned from the step's position. Every other
/// field the model produced (`title`, `description`, `timerSeconds`,
/// `references`, ...) is carried through untouched in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub id: String,
    pub order: usize,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

pub type StepList = Vec<StepRecord>;

impl StepRecord {
    /// Builds the record for 1-based `position`, discarding any `id`/`order`
    /// already present in `fields`.
    pub fn numbered(position: usize, mut fields: Map<String, Value>) -> Self {
        fields.remove("id");
        fields.remove("order");
        StepRecord {
            id: format!("step-{}", position),
            order: position,
            fields,
        }
    }

    /// The single synthetic step emitted when a document cannot be processed.
    pub fn processing_error(message: &str) -> Self {
        let mut fields = Map::new();
        fields.insert(
            "title".to_string(),
            Value::from("Error processing document"),
        );
        fields.insert(
            "description".to_string(),
            Value::from(format!("Could not process the document: {}", message)),
        );
        fields.insert("timerSeconds".to_string(), Value::from(0));
        StepRecord::numbered(1, fields)
    }

    pub fn title(&self) -> Option<&str> {
        self.fields.get("title").and_then(Value::as_str)
    }

    pub fn description(&self) -> Option<&str> {
        self.fields.get("description").and_then(Value::as_str)
    }

    pub fn timer_seconds(&self) -> Option<u64> {
        self.fields.get("timerSeconds").and_then(Value::as_u64)
    }

    pub fn references(&self) -> Option<Vec<&str>> {
        self.fields
            .get("references")
            .and_then(Value::as_array)
            .map(|refs| refs.iter().filter_map(Value::as_str).collect())
    }
}
