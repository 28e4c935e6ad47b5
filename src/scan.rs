//! Course folder scanning for `qa index`.
//!
//! Walks a folder for `.pdf`, `.txt` and `.md` files (case-insensitive) and
//! loads each one as a [`FileBlob`]. Files over the size ceiling and files
//! whose content duplicates an earlier one are reported as skipped instead
//! of being uploaded twice.

use anyhow::{bail, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use walkdir::WalkDir;

use crate::models::{guess_mime_type, FileBlob};

const INCLUDE_GLOBS: &[&str] = &["**/*.pdf", "**/*.txt", "**/*.md"];
const EXCLUDE_GLOBS: &[&str] = &["**/.git/**", "**/node_modules/**", "**/.*"];

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Descend into subfolders.
    pub recursive: bool,
    pub max_file_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    TooLarge { size: u64, limit: u64 },
    Duplicate { of: String },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::TooLarge { size, limit } => {
                write!(f, "too large ({} bytes, limit {} bytes)", size, limit)
            }
            SkipReason::Duplicate { of } => write!(f, "same content as {}", of),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub name: String,
    pub reason: SkipReason,
}

#[derive(Debug, Default)]
pub struct ScanReport {
    /// Files to index, sorted by name.
    pub files: Vec<FileBlob>,
    pub skipped: Vec<SkippedFile>,
}

/// Scan `root` for course files.
///
/// Blob names are paths relative to `root` with `/` separators, which is the
/// bare file name unless `recursive` is set.
pub fn scan_folder(root: &Path, opts: &ScanOptions) -> Result<ScanReport> {
    if !root.is_dir() {
        bail!("Course folder does not exist: {}", root.display());
    }

    let include_set = build_globset(INCLUDE_GLOBS)?;
    let exclude_set = build_globset(EXCLUDE_GLOBS)?;

    let mut walker = WalkDir::new(root).sort_by_file_name();
    if !opts.recursive {
        walker = walker.max_depth(1);
    }

    let mut report = ScanReport::default();
    let mut seen: HashMap<Vec<u8>, String> = HashMap::new();

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if exclude_set.is_match(&name) || !include_set.is_match(&name) {
            continue;
        }

        let size = entry.metadata()?.len();
        if size > opts.max_file_size {
            tracing::warn!(file = %name, size, "skipping oversize file");
            report.skipped.push(SkippedFile {
                name,
                reason: SkipReason::TooLarge {
                    size,
                    limit: opts.max_file_size,
                },
            });
            continue;
        }

        let bytes = std::fs::read(path)?;
        let digest = Sha256::digest(&bytes).to_vec();
        if let Some(first) = seen.get(&digest) {
            tracing::info!(file = %name, duplicate_of = %first, "skipping duplicate content");
            report.skipped.push(SkippedFile {
                name,
                reason: SkipReason::Duplicate { of: first.clone() },
            });
            continue;
        }
        seen.insert(digest, name.clone());

        let mime_type = guess_mime_type(&name);
        report.files.push(FileBlob::from_bytes(name, mime_type, &bytes));
    }

    report.files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(report)
}

fn build_globset(patterns: &[&str]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(GlobBuilder::new(pattern).case_insensitive(true).build()?);
    }
    Ok(builder.build()?)
}
