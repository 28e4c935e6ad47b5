//! Error types for the quiz assistant core.
//!
//! Every library operation returns [`Result`]. Variants map one-to-one onto
//! the failure classes callers must tell apart: a missing credential is
//! user-fixable, an unsupported question type is an integration bug, a remote
//! call error carries the HTTP status, and the indexing variants describe
//! per-file or whole-run outcomes.
//!
//! Response parsing never produces an error; see [`crate::parse`].

use thiserror::Error;

/// Result type alias for quiz assistant operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Quiz assistant errors.
#[derive(Debug, Error)]
pub enum Error {
    /// No API key is configured.
    #[error("API key not configured. Save one with `qa key set <KEY>` or the extension popup.")]
    MissingCredential,

    /// The question's `type` tag is not one of `multichoice`, `match`, `truefalse`.
    #[error("Unsupported question type: {0}")]
    UnsupportedQuestionType(String),

    /// The question is structurally unusable (empty text, no options, ...).
    #[error("Invalid question: {0}")]
    InvalidQuestion(String),

    /// The provider answered with a non-success HTTP status.
    #[error("API error {status}: {body}")]
    RemoteCall { status: u16, body: String },

    /// The request never produced an HTTP response.
    #[error("HTTP request error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered successfully but with an unexpected payload.
    #[error("Unexpected provider response: {0}")]
    Protocol(String),

    /// The provider reported that indexing this file failed.
    #[error("Indexing failed for '{file}': {reason}")]
    IndexingFailed { file: String, reason: String },

    /// The file did not reach a terminal state within the poll ceiling.
    #[error("Indexing timed out for '{file}' after {attempts} status checks")]
    IndexingTimeout { file: String, attempts: u32 },

    /// The file exceeds the upload size ceiling.
    #[error("File '{file}' is too large ({size} bytes, limit {limit} bytes)")]
    FileTooLarge { file: String, size: u64, limit: u64 },

    /// The file payload is not valid base64.
    #[error("File '{file}' has invalid data: {reason}")]
    InvalidFileData { file: String, reason: String },

    /// Every file in an indexing run failed.
    #[error("No file could be indexed ({} failed)", errors.len())]
    NoFilesIndexed { errors: Vec<FileError> },

    /// The operation was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration store or settings problem.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

/// A per-file failure collected during an indexing run.
#[derive(Debug)]
pub struct FileError {
    /// Display name of the file.
    pub file: String,
    /// What went wrong.
    pub error: Error,
}

impl std::fmt::Display for FileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.file, self.error)
    }
}

impl serde::Serialize for FileError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("FileError", 2)?;
        s.serialize_field("filename", &self.file)?;
        s.serialize_field("error", &self.error.to_string())?;
        s.end()
    }
}
