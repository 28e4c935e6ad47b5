//! Message port: the request/response contract with the extension.
//!
//! The content script and popup send JSON messages tagged by `action`; every
//! message gets exactly one reply of the shape
//! `{"success": true, "data": ...}` or `{"success": false, "error": "..."}`.
//!
//! | Action | Payload | Reply data |
//! |--------|---------|------------|
//! | `analyze` | `data`: question | `{answer, reasoning, rawText}` |
//! | `indexCourses` | `apiKey?`, `filesData` | `{storeId, filesCount, errors}` |
//! | `getStatus` | | `{apiKeyConfigured, corpus}` |
//! | `saveApiKey` | `apiKey` | `{saved: true}` |
//! | `resetCourses` | | `{reset: true}` |

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::analyze::Analyzer;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::gemini::{GeminiClient, ProviderApi};
use crate::indexing::Indexer;
use crate::models::FileBlob;
use crate::store::{reset_corpus, save_api_key, ConfigStore, JsonFileStore};

/// An inbound message.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action")]
pub enum Message {
    #[serde(rename = "analyze")]
    Analyze { data: Value },
    #[serde(rename = "indexCourses")]
    IndexCourses {
        #[serde(rename = "apiKey", default)]
        api_key: Option<String>,
        #[serde(rename = "filesData")]
        files_data: Vec<FileBlob>,
    },
    #[serde(rename = "getStatus")]
    GetStatus,
    #[serde(rename = "saveApiKey")]
    SaveApiKey {
        #[serde(rename = "apiKey")]
        api_key: String,
    },
    #[serde(rename = "resetCourses")]
    ResetCourses,
}

/// The single reply to a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reply {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

impl From<Result<Value>> for Reply {
    fn from(result: Result<Value>) -> Self {
        match result {
            Ok(data) => Reply::ok(data),
            Err(e) => Reply::err(e.to_string()),
        }
    }
}

/// Dispatches messages to the analysis and indexing components.
pub struct MessagePort {
    store: Arc<dyn ConfigStore>,
    analyzer: Analyzer,
    indexer: Indexer,
    shutdown: CancellationToken,
}

impl MessagePort {
    pub fn new(store: Arc<dyn ConfigStore>, api: Arc<dyn ProviderApi>, config: &Config) -> Self {
        let analyzer = Analyzer::new(
            Arc::clone(&store),
            Arc::clone(&api),
            config.prompt.clone(),
            config.generation.clone(),
        );
        let indexer = Indexer::new(api, &config.indexing);
        Self {
            store,
            analyzer,
            indexer,
            shutdown: CancellationToken::new(),
        }
    }

    /// Port backed by the JSON settings file and the Gemini HTTP client.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store: Arc<dyn ConfigStore> = Arc::new(JsonFileStore::new(&config.store.path));
        let api: Arc<dyn ProviderApi> = Arc::new(GeminiClient::new(&config.api)?);
        Ok(Self::new(store, api, config))
    }

    /// Token cancelling in-flight indexing runs; cancel it on shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Decode and handle a raw JSON message.
    pub async fn handle_value(&self, value: Value) -> Reply {
        match serde_json::from_value::<Message>(value) {
            Ok(message) => self.handle(message).await,
            Err(e) => Reply::err(format!("Invalid message: {}", e)),
        }
    }

    pub async fn handle(&self, message: Message) -> Reply {
        let result = match message {
            Message::Analyze { data } => self.analyze(data).await,
            Message::IndexCourses {
                api_key,
                files_data,
            } => self.index_courses(api_key, files_data).await,
            Message::GetStatus => self.status().await,
            Message::SaveApiKey { api_key } => save_api_key(self.store.as_ref(), &api_key)
                .await
                .map(|_| json!({ "saved": true })),
            Message::ResetCourses => reset_corpus(self.store.as_ref())
                .await
                .map(|_| json!({ "reset": true })),
        };
        if let Err(e) = &result {
            tracing::warn!(error = %e, "message failed");
        }
        result.into()
    }

    async fn analyze(&self, data: Value) -> Result<Value> {
        let result = self.analyzer.analyze_value(data).await?;
        Ok(serde_json::to_value(result)?)
    }

    async fn index_courses(&self, api_key: Option<String>, files: Vec<FileBlob>) -> Result<Value> {
        let api_key = match api_key.filter(|k| !k.trim().is_empty()) {
            Some(key) => {
                save_api_key(self.store.as_ref(), &key).await?;
                key
            }
            None => self
                .store
                .get()
                .await?
                .api_key()
                .map(str::to_string)
                .ok_or(Error::MissingCredential)?,
        };

        let cancel = self.shutdown.child_token();
        let report = self
            .indexer
            .index_and_persist(self.store.as_ref(), &api_key, files, &cancel)
            .await?;
        Ok(json!({
            "storeId": report.index.store_id,
            "filesCount": report.index.files.len(),
            "errors": report.errors,
        }))
    }

    async fn status(&self) -> Result<Value> {
        let settings = self.store.get().await?;
        Ok(json!({
            "apiKeyConfigured": settings.api_key().is_some(),
            "corpus": settings.corpus,
        }))
    }
}
