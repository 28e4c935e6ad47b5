//! Core data models shared by the prompt, inference, and indexing layers.
//!
//! Field names on the wire follow the extension's camelCase message and
//! storage contract (`questionText`, `rawText`, `fileStoreId`, ...).

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One answer option of a choice question, e.g. `{"letter": "a.", "text": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub letter: String,
    pub text: String,
}

/// An element to place in a matching question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchItem {
    pub text: String,
    #[serde(default, rename = "selectName", skip_serializing_if = "Option::is_none")]
    pub select_name: Option<String>,
}

/// A category label offered by every drop-down of a matching question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchChoice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub text: String,
}

/// Whether a choice question accepts one or several answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    #[default]
    Single,
    Multiple,
}

/// A normalized quiz question as extracted from the quiz page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Question {
    #[serde(rename = "multichoice")]
    Choice {
        #[serde(rename = "questionText", alias = "question")]
        text: String,
        #[serde(default)]
        subtype: SelectionMode,
        options: Vec<ChoiceOption>,
    },
    #[serde(rename = "match")]
    Matching {
        #[serde(rename = "questionText", alias = "question")]
        text: String,
        items: Vec<MatchItem>,
        choices: Vec<MatchChoice>,
    },
    #[serde(rename = "truefalse")]
    TrueFalse {
        #[serde(rename = "questionText", alias = "question")]
        text: String,
    },
}

impl Question {
    /// Decode a question received from a collaborator.
    ///
    /// An unknown or missing `type` tag yields
    /// [`Error::UnsupportedQuestionType`]; a known tag with a malformed body
    /// yields [`Error::InvalidQuestion`]. The decoded question is validated.
    pub fn from_value(value: serde_json::Value) -> Result<Question> {
        let tag = value
            .get("type")
            .and_then(|t| t.as_str())
            .map(str::to_string);
        match tag.as_deref() {
            Some("multichoice") | Some("match") | Some("truefalse") => {}
            Some(other) => return Err(Error::UnsupportedQuestionType(other.to_string())),
            None => return Err(Error::UnsupportedQuestionType("(missing)".to_string())),
        }

        let question: Question =
            serde_json::from_value(value).map_err(|e| Error::InvalidQuestion(e.to_string()))?;
        question.validate()?;
        Ok(question)
    }

    /// Check the structural invariants: non-empty text, and at least one
    /// option (choice) or one item and one category (matching).
    pub fn validate(&self) -> Result<()> {
        if self.text().trim().is_empty() {
            return Err(Error::InvalidQuestion("question text is empty".into()));
        }
        match self {
            Question::Choice { options, .. } if options.is_empty() => {
                Err(Error::InvalidQuestion("choice question has no options".into()))
            }
            Question::Matching { items, .. } if items.is_empty() => {
                Err(Error::InvalidQuestion("matching question has no items".into()))
            }
            Question::Matching { choices, .. } if choices.is_empty() => Err(
                Error::InvalidQuestion("matching question has no categories".into()),
            ),
            _ => Ok(()),
        }
    }

    /// The verbatim question text.
    pub fn text(&self) -> &str {
        match self {
            Question::Choice { text, .. }
            | Question::Matching { text, .. }
            | Question::TrueFalse { text } => text,
        }
    }

    /// The wire tag of this variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Question::Choice { .. } => "multichoice",
            Question::Matching { .. } => "match",
            Question::TrueFalse { .. } => "truefalse",
        }
    }
}

/// Parsed model output. Always fully populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceResult {
    pub answer: String,
    pub reasoning: String,
    #[serde(rename = "rawText")]
    pub raw_text: String,
}

/// Remote processing state of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    Processing,
    Active,
    Failed,
}

/// A file that went through the indexing workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedFile {
    /// Display name (the local file name).
    pub name: String,
    /// Store-relative resource name returned by the provider.
    pub uri: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub state: FileState,
}

/// Lifecycle of the corpus index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreStatus {
    #[default]
    Inactive,
    Indexing,
    Active,
}

/// The persisted result of an indexing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusIndex {
    #[serde(rename = "fileStoreId")]
    pub store_id: String,
    #[serde(rename = "fileStoreStatus", default)]
    pub status: StoreStatus,
    #[serde(rename = "fileStoreFiles", default)]
    pub files: Vec<IndexedFile>,
    #[serde(rename = "lastIndexDate")]
    pub last_index_date: DateTime<Utc>,
}

impl CorpusIndex {
    /// The store to ground generation on, if the index is usable.
    pub fn rag_store(&self) -> Option<&str> {
        if self.status == StoreStatus::Active && !self.files.is_empty() {
            Some(&self.store_id)
        } else {
            None
        }
    }
}

/// A file handed over for indexing, with base64 content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBlob {
    pub name: String,
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
    pub data: String,
    #[serde(default)]
    pub size: u64,
}

impl FileBlob {
    /// Build a blob from raw bytes.
    pub fn from_bytes(name: impl Into<String>, mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            size: bytes.len() as u64,
        }
    }

    /// Decode the base64 payload.
    pub fn decode(&self) -> Result<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(self.data.trim())
            .map_err(|e| Error::InvalidFileData {
                file: self.name.clone(),
                reason: e.to_string(),
            })
    }

    /// Declared MIME type, or one guessed from the extension.
    pub fn effective_mime_type(&self) -> String {
        if self.mime_type.trim().is_empty() {
            guess_mime_type(&self.name).to_string()
        } else {
            self.mime_type.clone()
        }
    }
}

/// MIME type for the supported course-file extensions.
pub fn guess_mime_type(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "md" => "text/markdown",
        _ => "application/octet-stream",
    }
}
