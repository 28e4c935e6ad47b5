//! Corpus indexing workflow.
//!
//! Builds a remote file-search store from a set of course files:
//!
//! 1. **Create store**: one request. Failure aborts the run.
//! 2. **Per file**: decode, check the size ceiling, upload, then poll until
//!    the provider reports a terminal state. Each file succeeds or fails on
//!    its own.
//! 3. **Aggregate**: succeeded files form the [`CorpusIndex`] in input order;
//!    failures are returned next to it. Zero successes is an error.
//!
//! ```text
//!  StoreOperation:  upload ──▶ operation ──poll──▶ done ──▶ ACTIVE | FAILED
//!  FilesApi:        upload ──▶ file ──poll──▶ ACTIVE ──▶ import ──▶ operation ──poll──▶ done
//! ```
//!
//! Polling sleeps [`RetryPolicy::interval`] between status checks and gives up
//! after [`RetryPolicy::max_attempts`] checks. Every sleep and network call
//! races the run's [`CancellationToken`].
//!
//! A re-run always creates a new store; the previous one is left untouched on
//! the provider side.

use chrono::Utc;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::IndexingConfig;
use crate::error::{Error, FileError, Result};
use crate::gemini::{FileUpload, Operation, ProviderApi, RemoteFile};
use crate::models::{CorpusIndex, FileBlob, FileState, IndexedFile, StoreStatus};
use crate::progress::{IndexProgressEvent, IndexProgressReporter, NoProgress};
use crate::store::{save_corpus, ConfigStore};

/// Bounded polling schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        IndexingConfig::default().retry_policy()
    }
}

/// How files reach the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadProtocol {
    /// Upload directly into the store and poll the returned operation.
    #[default]
    StoreOperation,
    /// Upload through the generic files API, poll the file, then import it.
    FilesApi,
}

/// Outcome of a run with at least one indexed file.
#[derive(Debug)]
pub struct IndexingReport {
    pub index: CorpusIndex,
    /// Files that failed, in input order.
    pub errors: Vec<FileError>,
}

/// Poll `check` until it yields a value.
///
/// Sleeps `policy.interval` before each check. After `policy.max_attempts`
/// checks without a value the file is reported as timed out.
pub async fn poll_until<T, F, Fut>(
    policy: RetryPolicy,
    cancel: &CancellationToken,
    file: &str,
    mut check: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    for attempt in 1..=policy.max_attempts {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(policy.interval) => {}
        }
        if let Some(done) = check().await? {
            tracing::debug!(file, attempt, "poll reached a terminal state");
            return Ok(done);
        }
    }
    Err(Error::IndexingTimeout {
        file: file.to_string(),
        attempts: policy.max_attempts,
    })
}

/// Drives indexing runs against a [`ProviderApi`].
pub struct Indexer {
    api: Arc<dyn ProviderApi>,
    policy: RetryPolicy,
    protocol: UploadProtocol,
    display_name: String,
    max_file_size: u64,
    concurrency: usize,
    progress: Arc<dyn IndexProgressReporter>,
}

impl Indexer {
    pub fn new(api: Arc<dyn ProviderApi>, config: &IndexingConfig) -> Self {
        Self {
            api,
            policy: config.retry_policy(),
            protocol: config.upload_protocol,
            display_name: config.store_display_name.clone(),
            max_file_size: config.max_file_size,
            concurrency: config.concurrency.max(1),
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn IndexProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Create a store and index `files` into it.
    pub async fn index_corpus(
        &self,
        api_key: &str,
        files: Vec<FileBlob>,
        cancel: &CancellationToken,
    ) -> Result<IndexingReport> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(Error::MissingCredential);
        }
        if files.is_empty() {
            return Err(Error::NoFilesIndexed { errors: Vec::new() });
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        self.progress.report(IndexProgressEvent::CreatingStore);
        let store = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            r = self.api.create_store(api_key, &self.display_name) => r?,
        };
        tracing::info!(store = %store, files = files.len(), "created file search store");
        self.progress.report(IndexProgressEvent::StoreCreated {
            store: store.clone(),
        });

        let worker = FileWorker {
            api: Arc::clone(&self.api),
            api_key: Arc::from(api_key),
            store: Arc::from(store.as_str()),
            policy: self.policy,
            protocol: self.protocol,
            max_file_size: self.max_file_size,
            cancel: cancel.clone(),
        };

        let total = files.len() as u64;
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        for (i, blob) in files.into_iter().enumerate() {
            let worker = worker.clone();
            let semaphore = Arc::clone(&semaphore);
            let progress = Arc::clone(&self.progress);
            tasks.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        progress.report(IndexProgressEvent::Uploading {
                            file: blob.name.clone(),
                            n: i as u64 + 1,
                            total,
                        });
                        worker.index_file(&blob).await
                    }
                    Err(_) => Err(Error::Cancelled),
                };
                (i, blob.name, outcome)
            });
        }

        let mut outcomes: Vec<Option<(String, Result<IndexedFile>)>> =
            (0..total).map(|_| None).collect();
        let mut finished = 0u64;
        while let Some(joined) = tasks.join_next().await {
            let (i, name, outcome) =
                joined.map_err(|e| Error::protocol(format!("indexing task aborted: {}", e)))?;
            finished += 1;
            match &outcome {
                Ok(_) => self.progress.report(IndexProgressEvent::Indexed {
                    file: name.clone(),
                    n: finished,
                    total,
                }),
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "file indexing failed");
                    self.progress.report(IndexProgressEvent::Failed {
                        file: name.clone(),
                        n: finished,
                        total,
                        error: e.to_string(),
                    });
                }
            }
            outcomes[i] = Some((name, outcome));
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut indexed = Vec::new();
        let mut errors = Vec::new();
        for (file, outcome) in outcomes.into_iter().flatten() {
            match outcome {
                Ok(entry) => indexed.push(entry),
                Err(error) => errors.push(FileError { file, error }),
            }
        }

        if indexed.is_empty() {
            return Err(Error::NoFilesIndexed { errors });
        }

        tracing::info!(
            store = %store,
            indexed = indexed.len(),
            failed = errors.len(),
            "indexing finished"
        );

        Ok(IndexingReport {
            index: CorpusIndex {
                store_id: store,
                status: StoreStatus::Active,
                files: indexed,
                last_index_date: Utc::now(),
            },
            errors,
        })
    }

    /// Run [`Indexer::index_corpus`] and overwrite the stored index with the
    /// result. A failed run leaves the stored index as it was.
    pub async fn index_and_persist(
        &self,
        store: &dyn ConfigStore,
        api_key: &str,
        files: Vec<FileBlob>,
        cancel: &CancellationToken,
    ) -> Result<IndexingReport> {
        let report = self.index_corpus(api_key, files, cancel).await?;
        save_corpus(store, &report.index).await?;
        Ok(report)
    }
}

/// Per-run state shared by the file tasks.
#[derive(Clone)]
struct FileWorker {
    api: Arc<dyn ProviderApi>,
    api_key: Arc<str>,
    store: Arc<str>,
    policy: RetryPolicy,
    protocol: UploadProtocol,
    max_file_size: u64,
    cancel: CancellationToken,
}

impl FileWorker {
    async fn index_file(&self, blob: &FileBlob) -> Result<IndexedFile> {
        let bytes = blob.decode()?;
        let size = bytes.len() as u64;
        if size > self.max_file_size {
            return Err(Error::FileTooLarge {
                file: blob.name.clone(),
                size,
                limit: self.max_file_size,
            });
        }

        let mime_type = blob.effective_mime_type();
        let upload = FileUpload {
            display_name: &blob.name,
            mime_type: &mime_type,
            bytes: &bytes,
        };

        let uri = match self.protocol {
            UploadProtocol::StoreOperation => {
                let op = self
                    .guard(self.api.upload_to_store(&self.api_key, &self.store, upload))
                    .await?;
                let op = self.await_operation(&blob.name, op).await?;
                op.document_name().map(str::to_string).unwrap_or(op.name)
            }
            UploadProtocol::FilesApi => {
                let file = self.guard(self.api.upload_file(&self.api_key, upload)).await?;
                let file_name = self.await_file(&blob.name, file).await?;
                let op = self
                    .guard(self.api.import_file(&self.api_key, &self.store, &file_name))
                    .await?;
                let op = self.await_operation(&blob.name, op).await?;
                op.document_name().map(str::to_string).unwrap_or(file_name)
            }
        };

        tracing::debug!(file = %blob.name, uri = %uri, "file active");
        Ok(IndexedFile {
            name: blob.name.clone(),
            uri,
            mime_type,
            state: FileState::Active,
        })
    }

    /// Poll a long-running operation until `done`; an operation error fails the file.
    async fn await_operation(&self, file: &str, op: Operation) -> Result<Operation> {
        let op = if op.done {
            op
        } else {
            let this = self;
            let name = op.name.as_str();
            poll_until(self.policy, &self.cancel, file, || async move {
                let op = this.api.get_operation(&this.api_key, name).await?;
                Ok(op.done.then_some(op))
            })
            .await?
        };

        match op.error_message() {
            Some(reason) => Err(Error::IndexingFailed {
                file: file.to_string(),
                reason,
            }),
            None => Ok(op),
        }
    }

    /// Poll a files-API resource until it leaves PROCESSING; returns its name.
    async fn await_file(&self, file: &str, remote: RemoteFile) -> Result<String> {
        let remote = if remote.file_state() == FileState::Processing {
            let this = self;
            let name = remote.name.as_str();
            poll_until(self.policy, &self.cancel, file, || async move {
                let polled = this.api.get_file(&this.api_key, name).await?;
                Ok((polled.file_state() != FileState::Processing).then_some(polled))
            })
            .await?
        } else {
            remote
        };

        match remote.file_state() {
            FileState::Active => Ok(remote.name),
            _ => Err(Error::IndexingFailed {
                file: file.to_string(),
                reason: remote
                    .error_message()
                    .unwrap_or_else(|| "provider reported FAILED".to_string()),
            }),
        }
    }

    async fn guard<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            r = call => r,
        }
    }
}
