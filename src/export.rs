//! Export the corpus index as `rag_config.json`.
//!
//! The file carries the same keys as the settings store (`fileStoreId`,
//! `fileStoreStatus`, `fileStoreFiles`, `lastIndexDate`) so it can be loaded
//! back with `qa import` or the extension popup.

use anyhow::Result;
use std::path::Path;

use crate::models::CorpusIndex;

/// Write `index` as pretty JSON.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes
/// to stdout for piping.
pub fn export_corpus(index: &CorpusIndex, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(index)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, &json)?;
            eprintln!(
                "Exported {} indexed files to {}",
                index.files.len(),
                path.display()
            );
        }
        None => {
            println!("{}", json);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileState, IndexedFile, StoreStatus};

    #[test]
    fn written_file_reloads() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("out/rag_config.json");
        let index = CorpusIndex {
            store_id: "fileSearchStores/s".into(),
            status: StoreStatus::Active,
            files: vec![IndexedFile {
                name: "a.pdf".into(),
                uri: "docs/a".into(),
                mime_type: "application/pdf".into(),
                state: FileState::Active,
            }],
            last_index_date: chrono::Utc::now(),
        };
        export_corpus(&index, Some(&path)).unwrap();

        let loaded: CorpusIndex =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, index);
    }
}
