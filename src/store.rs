//! Key-value configuration store.
//!
//! Holds the API key and the corpus index under the extension's storage keys:
//!
//! | Key | Value |
//! |-----|-------|
//! | `apiKey` | API key |
//! | `fileStoreId` | store resource name |
//! | `fileStoreStatus` | `inactive` / `indexing` / `active` |
//! | `fileStoreFiles` | indexed files |
//! | `lastIndexDate` | ISO-8601 timestamp |
//!
//! Components receive a [`ConfigStore`] and read one snapshot per operation;
//! writes replace the whole record (last writer wins).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::models::{CorpusIndex, IndexedFile, StoreStatus};

/// Snapshot of everything the store holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub api_key: Option<String>,
    pub corpus: Option<CorpusIndex>,
}

impl Settings {
    /// The configured key, ignoring blank values.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }
}

/// Persistence seam for [`Settings`].
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Read the current settings; an empty store yields the defaults.
    async fn get(&self) -> Result<Settings>;

    /// Replace the stored settings.
    async fn set(&self, settings: &Settings) -> Result<()>;

    /// Remove everything.
    async fn clear(&self) -> Result<()>;
}

/// Store `key` as the API key, keeping the corpus index.
pub async fn save_api_key(store: &dyn ConfigStore, key: &str) -> Result<()> {
    let key = key.trim();
    if key.is_empty() {
        return Err(Error::config("API key must not be empty"));
    }
    let mut settings = store.get().await?;
    settings.api_key = Some(key.to_string());
    store.set(&settings).await
}

/// Remove the API key, keeping the corpus index.
pub async fn clear_api_key(store: &dyn ConfigStore) -> Result<()> {
    let mut settings = store.get().await?;
    settings.api_key = None;
    store.set(&settings).await
}

/// Overwrite the corpus index.
pub async fn save_corpus(store: &dyn ConfigStore, index: &CorpusIndex) -> Result<()> {
    let mut settings = store.get().await?;
    settings.corpus = Some(index.clone());
    store.set(&settings).await
}

/// Delete the corpus index, keeping the API key.
pub async fn reset_corpus(store: &dyn ConfigStore) -> Result<()> {
    let mut settings = store.get().await?;
    settings.corpus = None;
    store.set(&settings).await
}

/// Load a `rag_config.json` produced by `qa index` into the store.
pub async fn import_corpus(store: &dyn ConfigStore, path: &Path) -> Result<CorpusIndex> {
    let content = tokio::fs::read_to_string(path).await?;
    let index: CorpusIndex = serde_json::from_str(&content)?;
    if index.store_id.trim().is_empty() {
        return Err(Error::config("imported configuration has an empty fileStoreId"));
    }
    if index.files.is_empty() {
        return Err(Error::config("imported configuration lists no files"));
    }
    save_corpus(store, &index).await?;
    Ok(index)
}

// ============ On-disk record ============

/// Flat record matching the storage keys; every key is optional.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Record {
    #[serde(rename = "apiKey", default, skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
    #[serde(rename = "fileStoreId", default, skip_serializing_if = "Option::is_none")]
    store_id: Option<String>,
    #[serde(rename = "fileStoreStatus", default, skip_serializing_if = "Option::is_none")]
    status: Option<StoreStatus>,
    #[serde(rename = "fileStoreFiles", default, skip_serializing_if = "Option::is_none")]
    files: Option<Vec<IndexedFile>>,
    #[serde(rename = "lastIndexDate", default, skip_serializing_if = "Option::is_none")]
    last_index_date: Option<DateTime<Utc>>,
}

impl From<&Settings> for Record {
    fn from(settings: &Settings) -> Self {
        let mut record = Record {
            api_key: settings.api_key.clone(),
            ..Default::default()
        };
        if let Some(index) = &settings.corpus {
            record.store_id = Some(index.store_id.clone());
            record.status = Some(index.status);
            record.files = Some(index.files.clone());
            record.last_index_date = Some(index.last_index_date);
        }
        record
    }
}

impl From<Record> for Settings {
    fn from(record: Record) -> Self {
        let corpus = match (record.store_id, record.last_index_date) {
            (Some(store_id), Some(last_index_date)) => Some(CorpusIndex {
                store_id,
                status: record.status.unwrap_or_default(),
                files: record.files.unwrap_or_default(),
                last_index_date,
            }),
            _ => None,
        };
        Settings {
            api_key: record.api_key,
            corpus,
        }
    }
}

// ============ JSON file store ============

/// Settings persisted as one JSON object in a file.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigStore for JsonFileStore {
    async fn get(&self) -> Result<Settings> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Settings::default()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Settings::default());
        }
        let record: Record = serde_json::from_str(&content)?;
        Ok(record.into())
    }

    async fn set(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(&Record::from(settings))?;

        // Write-then-rename so readers never see a half-written record.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ============ In-memory store ============

/// Process-local store, used by tests and embedders.
#[derive(Default)]
pub struct MemoryStore {
    settings: RwLock<Settings>,
}

impl MemoryStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }

    pub fn with_api_key(key: &str) -> Self {
        Self::new(Settings {
            api_key: Some(key.to_string()),
            corpus: None,
        })
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn get(&self) -> Result<Settings> {
        Ok(self.settings.read().await.clone())
    }

    async fn set(&self, settings: &Settings) -> Result<()> {
        *self.settings.write().await = settings.clone();
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.settings.write().await = Settings::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileState;
    use tempfile::TempDir;

    fn index() -> CorpusIndex {
        CorpusIndex {
            store_id: "fileSearchStores/s1".into(),
            status: StoreStatus::Active,
            files: vec![IndexedFile {
                name: "marketing.pdf".into(),
                uri: "fileSearchStores/s1/documents/d1".into(),
                mime_type: "application/pdf".into(),
                state: FileState::Active,
            }],
            last_index_date: "2025-01-15T10:30:00Z".parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn file_store_round_trip_uses_storage_keys() {
        let tmp = TempDir::new().unwrap();
        let store = JsonFileStore::new(tmp.path().join("nested/settings.json"));

        assert_eq!(store.get().await.unwrap(), Settings::default());

        save_api_key(&store, "  AIzaTest  ").await.unwrap();
        save_corpus(&store, &index()).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["apiKey"], "AIzaTest");
        assert_eq!(raw["fileStoreId"], "fileSearchStores/s1");
        assert_eq!(raw["fileStoreStatus"], "active");
        assert_eq!(raw["lastIndexDate"], "2025-01-15T10:30:00Z");

        let settings = store.get().await.unwrap();
        assert_eq!(settings.api_key(), Some("AIzaTest"));
        assert_eq!(settings.corpus, Some(index()));
    }

    #[tokio::test]
    async fn reset_keeps_key_and_clear_removes_all() {
        let tmp = TempDir::new().unwrap();
        let store = JsonFileStore::new(tmp.path().join("settings.json"));
        save_api_key(&store, "k").await.unwrap();
        save_corpus(&store, &index()).await.unwrap();

        reset_corpus(&store).await.unwrap();
        let settings = store.get().await.unwrap();
        assert_eq!(settings.api_key(), Some("k"));
        assert!(settings.corpus.is_none());

        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.get().await.unwrap(), Settings::default());
    }

    #[tokio::test]
    async fn blank_key_is_rejected_and_ignored() {
        let store = MemoryStore::default();
        assert!(save_api_key(&store, "   ").await.is_err());

        store
            .set(&Settings {
                api_key: Some("  ".into()),
                corpus: None,
            })
            .await
            .unwrap();
        assert_eq!(store.get().await.unwrap().api_key(), None);

        clear_api_key(&store).await.unwrap();
        assert!(store.get().await.unwrap().api_key.is_none());
    }

    #[tokio::test]
    async fn import_validates_and_saves() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rag_config.json");
        std::fs::write(&path, serde_json::to_string(&index()).unwrap()).unwrap();

        let store = MemoryStore::with_api_key("k");
        let imported = import_corpus(&store, &path).await.unwrap();
        assert_eq!(imported.files.len(), 1);
        assert_eq!(store.get().await.unwrap().corpus, Some(index()));

        let mut empty = index();
        empty.files.clear();
        std::fs::write(&path, serde_json::to_string(&empty).unwrap()).unwrap();
        assert!(import_corpus(&store, &path).await.is_err());
    }

    #[test]
    fn record_without_date_has_no_corpus() {
        let record: Record =
            serde_json::from_str(r#"{"apiKey":"k","fileStoreId":"s"}"#).unwrap();
        let settings: Settings = record.into();
        assert!(settings.corpus.is_none());
        assert_eq!(settings.api_key(), Some("k"));
    }
}
