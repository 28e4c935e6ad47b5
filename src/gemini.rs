//! Gemini API wire layer.
//!
//! [`ProviderApi`] lists every outbound call the core makes; [`GeminiClient`]
//! implements it over HTTPS with `reqwest`. The trait is the seam where tests
//! substitute an in-process fake.
//!
//! # Endpoints (`v1beta`, key in the `x-goog-api-key` header)
//!
//! | Call | Method | Path |
//! |------|--------|------|
//! | generate | `POST` | `/v1beta/models/{model}:generateContent` |
//! | create store | `POST` | `/v1beta/fileSearchStores` |
//! | store upload | `POST` | `/upload/v1beta/{store}:uploadToFileSearchStore` |
//! | file upload | `POST` | `/upload/v1beta/files` |
//! | import | `POST` | `/v1beta/{store}:importFile` |
//! | poll | `GET` | `/v1beta/{operation or file name}` |
//!
//! Both uploads use the resumable handshake: a `start` command returns the
//! session URL in the `x-goog-upload-url` header, then the bytes are sent with
//! `upload, finalize`.
//!
//! Any non-2xx status becomes [`Error::RemoteCall`] with the response body.
//! Nothing here retries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::models::FileState;

const API_KEY_HEADER: &str = "x-goog-api-key";
const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";

// ============ Request types ============

/// Body of a `generateContent` call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationParams,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts: vec![Part { text: text.into() }],
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: None,
            parts: vec![Part { text: text.into() }],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Part {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub top_k: u32,
    pub top_p: f32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub file_search: FileSearch,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSearch {
    pub file_search_store_names: Vec<String>,
}

/// Bytes and metadata of one upload.
#[derive(Debug, Clone, Copy)]
pub struct FileUpload<'a> {
    pub display_name: &'a str,
    pub mime_type: &'a str,
    pub bytes: &'a [u8],
}

// ============ Response types ============

/// A long-running operation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub response: Option<Value>,
}

impl Operation {
    /// Document created by a finished upload or import, if reported.
    pub fn document_name(&self) -> Option<&str> {
        self.response
            .as_ref()
            .and_then(|r| r.get("documentName"))
            .and_then(|d| d.as_str())
    }

    /// Human-readable error message of a failed operation.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(status_message)
    }
}

/// The `message` of a provider `Status` object, or the whole object.
fn status_message(status: &Value) -> String {
    status
        .get("message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| status.to_string())
}

/// A resource of the generic files API.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub name: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl RemoteFile {
    /// Map the provider state string; unknown or missing states count as processing.
    pub fn file_state(&self) -> FileState {
        match self.state.as_deref() {
            Some("ACTIVE") => FileState::Active,
            Some("FAILED") => FileState::Failed,
            _ => FileState::Processing,
        }
    }

    /// Why processing failed, when the provider says.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(status_message)
    }
}

#[derive(Deserialize)]
struct FileEnvelope {
    file: RemoteFile,
}

#[derive(Deserialize)]
struct StoreResource {
    name: String,
}

// ============ Trait ============

/// Every outbound call to the generative-language provider.
#[async_trait]
pub trait ProviderApi: Send + Sync {
    /// `generateContent`; returns the raw JSON payload.
    async fn generate_content(&self, api_key: &str, request: &GenerateRequest) -> Result<Value>;

    /// Create a file-search store; returns its resource name.
    async fn create_store(&self, api_key: &str, display_name: &str) -> Result<String>;

    /// Upload straight into a store; returns the indexing operation.
    async fn upload_to_store(
        &self,
        api_key: &str,
        store: &str,
        upload: FileUpload<'_>,
    ) -> Result<Operation>;

    /// Upload through the generic files API; returns the file resource.
    async fn upload_file(&self, api_key: &str, upload: FileUpload<'_>) -> Result<RemoteFile>;

    /// Import an uploaded file into a store; returns the indexing operation.
    async fn import_file(&self, api_key: &str, store: &str, file_name: &str) -> Result<Operation>;

    /// Poll a long-running operation.
    async fn get_operation(&self, api_key: &str, name: &str) -> Result<Operation>;

    /// Poll a file resource.
    async fn get_file(&self, api_key: &str, name: &str) -> Result<RemoteFile>;
}

// ============ HTTP implementation ============

/// `reqwest`-backed Gemini client.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/v1beta/{}", self.base_url, path)
    }

    fn upload_url(&self, path: &str) -> String {
        format!("{}/upload/v1beta/{}", self.base_url, path)
    }

    /// Run the resumable handshake against `url` and return the final JSON body.
    async fn resumable_upload(
        &self,
        api_key: &str,
        url: &str,
        metadata: Value,
        upload: FileUpload<'_>,
    ) -> Result<Value> {
        let start = self
            .http
            .post(url)
            .header(API_KEY_HEADER, api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header(
                "X-Goog-Upload-Header-Content-Length",
                upload.bytes.len().to_string(),
            )
            .header("X-Goog-Upload-Header-Content-Type", upload.mime_type)
            .json(&metadata)
            .send()
            .await?;
        let start = ensure_success(start).await?;

        let session_url = start
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| Error::protocol("no upload URL returned"))?;

        tracing::debug!(file = upload.display_name, bytes = upload.bytes.len(), "sending upload bytes");

        let finish = self
            .http
            .post(&session_url)
            .header(API_KEY_HEADER, api_key)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(upload.bytes.to_vec())
            .send()
            .await?;
        let finish = ensure_success(finish).await?;
        Ok(finish.json().await?)
    }
}

/// Turn a non-2xx response into [`Error::RemoteCall`].
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(status = status.as_u16(), "provider returned an error");
    Err(Error::RemoteCall {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ProviderApi for GeminiClient {
    async fn generate_content(&self, api_key: &str, request: &GenerateRequest) -> Result<Value> {
        let url = self.api_url(&format!("models/{}:generateContent", self.model));
        let response = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, api_key)
            .json(request)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    async fn create_store(&self, api_key: &str, display_name: &str) -> Result<String> {
        let response = self
            .http
            .post(self.api_url("fileSearchStores"))
            .header(API_KEY_HEADER, api_key)
            .json(&json!({ "displayName": display_name }))
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let store: StoreResource = response.json().await?;
        Ok(store.name)
    }

    async fn upload_to_store(
        &self,
        api_key: &str,
        store: &str,
        upload: FileUpload<'_>,
    ) -> Result<Operation> {
        let url = self.upload_url(&format!("{}:uploadToFileSearchStore", store));
        let metadata = json!({
            "displayName": upload.display_name,
            "mimeType": upload.mime_type,
        });
        let body = self.resumable_upload(api_key, &url, metadata, upload).await?;
        Ok(serde_json::from_value(body)?)
    }

    async fn upload_file(&self, api_key: &str, upload: FileUpload<'_>) -> Result<RemoteFile> {
        let url = self.upload_url("files");
        let metadata = json!({ "file": { "displayName": upload.display_name } });
        let body = self.resumable_upload(api_key, &url, metadata, upload).await?;
        let envelope: FileEnvelope = serde_json::from_value(body)?;
        Ok(envelope.file)
    }

    async fn import_file(&self, api_key: &str, store: &str, file_name: &str) -> Result<Operation> {
        let response = self
            .http
            .post(self.api_url(&format!("{}:importFile", store)))
            .header(API_KEY_HEADER, api_key)
            .json(&json!({ "fileName": file_name }))
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    async fn get_operation(&self, api_key: &str, name: &str) -> Result<Operation> {
        let response = self
            .http
            .get(self.api_url(name))
            .header(API_KEY_HEADER, api_key)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    async fn get_file(&self, api_key: &str, name: &str) -> Result<RemoteFile> {
        let response = self
            .http
            .get(self.api_url(name))
            .header(API_KEY_HEADER, api_key)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }
}
