use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::indexing::{RetryPolicy, UploadProtocol};
use crate::prompt::{PromptFormat, PromptOptions};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}
fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}

/// Sampling parameters sent with every generation request.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct GenerationConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            top_k: default_top_k(),
            top_p: default_top_p(),
        }
    }
}

fn default_temperature() -> f32 {
    0.7
}
fn default_max_output_tokens() -> u32 {
    1024
}
fn default_top_k() -> u32 {
    40
}
fn default_top_p() -> f32 {
    0.95
}

#[derive(Debug, Deserialize, Clone)]
pub struct PromptConfig {
    #[serde(default)]
    pub format: PromptFormat,
    #[serde(default = "default_persona")]
    pub persona: String,
    #[serde(default = "default_true_label")]
    pub true_label: String,
    #[serde(default = "default_false_label")]
    pub false_label: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            format: PromptFormat::default(),
            persona: default_persona(),
            true_label: default_true_label(),
            false_label: default_false_label(),
        }
    }
}

fn default_persona() -> String {
    "You are an expert in economics and business management. You always answer concisely \
     and precisely, and you take great care to give correct answers."
        .to_string()
}
fn default_true_label() -> String {
    "Vrai".to_string()
}
fn default_false_label() -> String {
    "Faux".to_string()
}

impl PromptConfig {
    pub fn options(&self) -> PromptOptions {
        PromptOptions {
            format: self.format,
            persona: self.persona.clone(),
            true_label: self.true_label.clone(),
            false_label: self.false_label.clone(),
            rag_active: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default = "default_store_display_name")]
    pub store_display_name: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default)]
    pub upload_protocol: UploadProtocol,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            store_display_name: default_store_display_name(),
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_attempts: default_max_poll_attempts(),
            max_file_size: default_max_file_size(),
            upload_protocol: UploadProtocol::default(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_store_display_name() -> String {
    "Quiz_Assist_Courses".to_string()
}
fn default_poll_interval_ms() -> u64 {
    2000
}
fn default_max_poll_attempts() -> u32 {
    60
}
fn default_max_file_size() -> u64 {
    50 * 1024 * 1024
}
fn default_concurrency() -> usize {
    1
}

impl IndexingConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.max_poll_attempts,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./data/settings.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

/// Load the configuration, or the defaults when `path` does not exist.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::default())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.api.base_url.trim().is_empty() {
        anyhow::bail!("api.base_url must not be empty");
    }
    if config.api.model.trim().is_empty() {
        anyhow::bail!("api.model must not be empty");
    }
    if config.api.timeout_secs == 0 {
        anyhow::bail!("api.timeout_secs must be > 0");
    }

    if !(0.0..=2.0).contains(&config.generation.temperature) {
        anyhow::bail!("generation.temperature must be in [0.0, 2.0]");
    }
    if !(0.0..=1.0).contains(&config.generation.top_p) {
        anyhow::bail!("generation.top_p must be in [0.0, 1.0]");
    }
    if config.generation.max_output_tokens == 0 {
        anyhow::bail!("generation.max_output_tokens must be > 0");
    }

    if config.prompt.true_label.trim().is_empty() || config.prompt.false_label.trim().is_empty() {
        anyhow::bail!("prompt.true_label and prompt.false_label must not be empty");
    }
    if config.prompt.true_label == config.prompt.false_label {
        anyhow::bail!("prompt.true_label and prompt.false_label must differ");
    }

    if config.indexing.max_poll_attempts == 0 {
        anyhow::bail!("indexing.max_poll_attempts must be >= 1");
    }
    if config.indexing.concurrency == 0 {
        anyhow::bail!("indexing.concurrency must be >= 1");
    }
    if config.indexing.max_file_size == 0 {
        anyhow::bail!("indexing.max_file_size must be > 0");
    }

    Ok(())
}
