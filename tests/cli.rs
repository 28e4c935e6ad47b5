use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    // Nothing listens on port 9; any provider call fails fast.
    let config_content = format!(
        r#"[api]
base_url = "http://127.0.0.1:9"
model = "gemini-test"
timeout_secs = 2

[store]
path = "{}/data/settings.json"
"#,
        root.display()
    );

    let config_path = config_dir.join("qa.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_qa(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_qa"))
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("GEMINI_API_KEY")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run qa binary: {}", e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn settings(tmp: &TempDir) -> serde_json::Value {
    let raw = fs::read_to_string(tmp.path().join("data/settings.json")).unwrap();
    serde_json::from_str(&raw).unwrap()
}

#[test]
fn test_status_on_fresh_install() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_qa(&config, &["status"]);
    assert!(success, "status failed: {}", stderr);
    assert!(stdout.contains("API key: not configured"));
    assert!(stdout.contains("Store:   none"));
}

#[test]
fn test_key_set_and_clear() {
    let (tmp, config) = setup_test_env();

    let (stdout, stderr, success) = run_qa(&config, &["key", "set", "  AIza-test  "]);
    assert!(success, "key set failed: {}", stderr);
    assert!(stdout.contains("API key saved."));
    assert_eq!(settings(&tmp)["apiKey"], "AIza-test");

    let (stdout, _, _) = run_qa(&config, &["status"]);
    assert!(stdout.contains("API key: configured"));

    let (_, stderr, success) = run_qa(&config, &["key", "clear"]);
    assert!(success, "key clear failed: {}", stderr);
    assert!(settings(&tmp).get("apiKey").is_none());
}

#[test]
fn test_blank_key_is_rejected() {
    let (_tmp, config) = setup_test_env();
    let (_, _, success) = run_qa(&config, &["key", "set", "   "]);
    assert!(!success);
}

#[test]
fn test_import_then_reset() {
    let (tmp, config) = setup_test_env();
    let rag = tmp.path().join("rag_config.json");
    fs::write(
        &rag,
        r#"{
  "fileStoreId": "fileSearchStores/cours-abc",
  "fileStoreStatus": "active",
  "fileStoreFiles": [
    {"name": "compta.pdf", "uri": "fileSearchStores/cours-abc/documents/1", "mimeType": "application/pdf", "state": "ACTIVE"}
  ],
  "lastIndexDate": "2025-11-02T10:00:00Z"
}"#,
    )
    .unwrap();

    let (stdout, stderr, success) = run_qa(&config, &["import", rag.to_str().unwrap()]);
    assert!(success, "import failed: {}", stderr);
    assert!(stdout.contains("Imported store fileSearchStores/cours-abc with 1 files."));

    let (stdout, _, _) = run_qa(&config, &["status"]);
    assert!(stdout.contains("fileSearchStores/cours-abc"));
    assert!(stdout.contains("compta.pdf [application/pdf]"));

    let (stdout, stderr, success) = run_qa(&config, &["reset"]);
    assert!(success, "reset failed: {}", stderr);
    assert!(stdout.contains("Corpus index removed."));
    assert!(settings(&tmp).get("fileStoreId").is_none());
}

#[test]
fn test_import_rejects_empty_file_list() {
    let (tmp, config) = setup_test_env();
    let rag = tmp.path().join("empty.json");
    fs::write(
        &rag,
        r#"{"fileStoreId": "fileSearchStores/x", "fileStoreFiles": [], "lastIndexDate": "2025-11-02T10:00:00Z"}"#,
    )
    .unwrap();

    let (_, stderr, success) = run_qa(&config, &["import", rag.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("lists no files"));
}

#[test]
fn test_analyze_without_key_fails() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, success) = run_qa(
        &config,
        &["analyze", "--text", "Le bilan est équilibré", "--true-false"],
    );
    assert!(!success);
    assert!(stderr.contains("API key not configured"));
}

#[test]
fn test_index_empty_folder_fails() {
    let (tmp, config) = setup_test_env();
    let folder = tmp.path().join("cours");
    fs::create_dir_all(&folder).unwrap();
    fs::write(folder.join("image.png"), b"\x89PNG").unwrap();

    let (_, stderr, success) = run_qa(
        &config,
        &["index", folder.to_str().unwrap(), "--api-key", "AIza-test"],
    );
    assert!(!success);
    assert!(stderr.contains("No .pdf, .txt or .md file to index"));
}

#[test]
fn test_completions() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, success) = run_qa(&config, &["completions", "bash"]);
    assert!(success);
    assert!(stdout.contains("qa"));
}
