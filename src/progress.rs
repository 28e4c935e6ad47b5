//! Indexing progress reporting.
//!
//! Reports observable progress during `qa index` so users see which file is
//! uploading, how many are left, and which ones failed. Progress is emitted on
//! **stderr** so stdout remains parseable for scripts.

use std::io::Write;
use std::sync::Arc;

/// A single progress event of an indexing run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexProgressEvent {
    /// The remote store is being created.
    CreatingStore,
    /// The store exists; files follow.
    StoreCreated { store: String },
    /// File `n` of `total` is uploading.
    Uploading { file: String, n: u64, total: u64 },
    /// A file reached the active state; `n` files are finished so far.
    Indexed { file: String, n: u64, total: u64 },
    /// A file failed; `n` files are finished so far.
    Failed {
        file: String,
        n: u64,
        total: u64,
        error: String,
    },
}

/// Reports indexing progress. Implementations write to stderr (human or JSON).
pub trait IndexProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the indexing workflow, possibly
    /// from several tasks at once.
    fn report(&self, event: IndexProgressEvent);
}

/// Human-friendly progress on stderr: "index  uploading  3 / 12  cours.pdf".
pub struct StderrProgress;

impl IndexProgressReporter for StderrProgress {
    fn report(&self, event: IndexProgressEvent) {
        let line = match &event {
            IndexProgressEvent::CreatingStore => "index  creating store...\n".to_string(),
            IndexProgressEvent::StoreCreated { store } => format!("index  store {}\n", store),
            IndexProgressEvent::Uploading { file, n, total } => format!(
                "index  uploading  {} / {}  {}\n",
                format_number(*n),
                format_number(*total),
                file
            ),
            IndexProgressEvent::Indexed { file, n, total } => format!(
                "index  active     {} / {}  {}\n",
                format_number(*n),
                format_number(*total),
                file
            ),
            IndexProgressEvent::Failed {
                file,
                n,
                total,
                error,
            } => format!(
                "index  failed     {} / {}  {}: {}\n",
                format_number(*n),
                format_number(*total),
                file,
                error
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JsonProgress {
    fn to_json(event: &IndexProgressEvent) -> serde_json::Value {
        match event {
            IndexProgressEvent::CreatingStore => serde_json::json!({
                "event": "progress",
                "phase": "creating_store"
            }),
            IndexProgressEvent::StoreCreated { store } => serde_json::json!({
                "event": "progress",
                "phase": "store_created",
                "store": store
            }),
            IndexProgressEvent::Uploading { file, n, total } => serde_json::json!({
                "event": "progress",
                "phase": "uploading",
                "file": file,
                "n": n,
                "total": total
            }),
            IndexProgressEvent::Indexed { file, n, total } => serde_json::json!({
                "event": "progress",
                "phase": "indexed",
                "file": file,
                "n": n,
                "total": total
            }),
            IndexProgressEvent::Failed {
                file,
                n,
                total,
                error,
            } => serde_json::json!({
                "event": "progress",
                "phase": "failed",
                "file": file,
                "n": n,
                "total": total,
                "error": error
            }),
        }
    }
}

impl IndexProgressReporter for JsonProgress {
    fn report(&self, event: IndexProgressEvent) {
        if let Ok(line) = serde_json::to_string(&Self::to_json(&event)) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IndexProgressReporter for NoProgress {
    fn report(&self, _event: IndexProgressEvent) {}
}

/// `1234567` → `"1,234,567"`.
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Arc<dyn IndexProgressReporter> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress),
            ProgressMode::Json => Arc::new(JsonProgress),
        }
    }
}
