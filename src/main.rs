//! # Quiz Assist CLI (`qa`)
//!
//! The `qa` binary drives the quiz assistant core from the terminal and
//! serves the message port the browser extension talks to.
//!
//! ## Usage
//!
//! ```bash
//! qa --config ./config/qa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `qa index <folder>` | Upload course files into a new file-search store |
//! | `qa import <file>` | Load a `rag_config.json` into the settings store |
//! | `qa analyze [question.json]` | Answer one question |
//! | `qa status` | Show the API key state and the corpus index |
//! | `qa key set <KEY>` / `qa key clear` | Manage the API key |
//! | `qa reset` | Forget the corpus index |
//! | `qa bench <questions.json>` | Measure answer accuracy |
//! | `qa serve` | Start the HTTP message port |
//! | `qa completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! # Index a folder of course PDFs
//! qa index ./cours --out rag_config.json
//!
//! # Ask a true/false question
//! qa analyze --true-false --text "Le bilan doit toujours être équilibré"
//!
//! # Ask a multiple-answer question
//! qa analyze --multiple --text "Quels sont des actifs ?" --option a=Stocks --option b=Capital
//! ```

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quiz_assist::analyze::Analyzer;
use quiz_assist::bench::{load_questions, run_bench, BenchStatus, BenchSummary};
use quiz_assist::config::{self, Config};
use quiz_assist::export::export_corpus;
use quiz_assist::gemini::{GeminiClient, ProviderApi};
use quiz_assist::indexing::Indexer;
use quiz_assist::models::{ChoiceOption, Question, SelectionMode};
use quiz_assist::progress::{format_number, ProgressMode};
use quiz_assist::scan::{scan_folder, ScanOptions};
use quiz_assist::server;
use quiz_assist::store::{
    clear_api_key, import_corpus, reset_corpus, save_api_key, save_corpus, ConfigStore,
    JsonFileStore, MemoryStore, Settings,
};

const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Quiz Assist CLI: answer quiz questions with Gemini, grounded on your
/// course documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means built-in defaults.
#[derive(Parser)]
#[command(
    name = "qa",
    about = "Quiz Assist: answer quiz questions with Gemini, grounded on your course documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/qa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a folder of course files into a new file-search store.
    ///
    /// Scans `.pdf`, `.txt` and `.md` files, uploads each one, waits for
    /// the provider to index it, then writes the resulting index.
    Index {
        /// Folder holding the course files.
        folder: PathBuf,

        /// API key; defaults to the stored key, then `GEMINI_API_KEY`.
        #[arg(long)]
        api_key: Option<String>,

        /// Where to write the index JSON.
        #[arg(long, default_value = "rag_config.json")]
        out: PathBuf,

        /// Descend into subfolders.
        #[arg(long)]
        recursive: bool,

        /// Do not save the new index in the settings store.
        #[arg(long)]
        no_persist: bool,

        /// Progress output on stderr. Defaults to `human` on a terminal.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Load a `rag_config.json` into the settings store.
    Import {
        /// Index file produced by `qa index`.
        file: PathBuf,
    },

    /// Answer one question.
    ///
    /// Either pass a question JSON file (the extension's message format) or
    /// describe the question with flags.
    Analyze {
        /// Question JSON file.
        file: Option<PathBuf>,

        /// Question text.
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,

        /// Answer option as `LABEL=TEXT`; repeat for each option.
        #[arg(long = "option", value_parser = parse_key_val)]
        options: Vec<(String, String)>,

        /// Several options may be correct.
        #[arg(long)]
        multiple: bool,

        /// Ask a true/false question instead of a choice question.
        #[arg(long, conflicts_with_all = ["options", "multiple"])]
        true_false: bool,

        /// Print the full result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the API key state and the corpus index.
    Status,

    /// Manage the stored API key.
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// Forget the corpus index. The remote store is left untouched.
    Reset,

    /// Run a question file and report answer accuracy.
    Bench {
        /// Questions file.
        file: PathBuf,

        /// Write detailed results as JSON.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Start the HTTP message port for the browser extension.
    Serve,

    /// Print shell completions.
    Completions {
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum KeyAction {
    /// Save an API key.
    Set { key: String },
    /// Remove the stored API key.
    Clear,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid LABEL=TEXT: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quiz_assist=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "qa", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_or_default(&cli.config)?;
    let store = JsonFileStore::new(&cfg.store.path);

    match cli.command {
        Commands::Index {
            folder,
            api_key,
            out,
            recursive,
            no_persist,
            progress,
        } => {
            run_index(
                &cfg,
                &store,
                &folder,
                api_key,
                &out,
                recursive,
                !no_persist,
                progress.unwrap_or_else(ProgressMode::default_for_tty),
            )
            .await?;
        }
        Commands::Import { file } => {
            let index = import_corpus(&store, &file).await?;
            println!(
                "Imported store {} with {} files.",
                index.store_id,
                index.files.len()
            );
        }
        Commands::Analyze {
            file,
            text,
            options,
            multiple,
            true_false,
            json,
        } => {
            let question = match (file, text) {
                (Some(path), _) => read_question(&path)?,
                (None, Some(text)) => question_from_flags(text, options, multiple, true_false),
                (None, None) => bail!("pass a question file or --text"),
            };
            let analyzer = build_analyzer(&cfg, &store).await?;
            let result = analyzer.analyze(&question).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Answer:    {}", result.answer);
                println!("Reasoning: {}", result.reasoning);
            }
        }
        Commands::Status => {
            let settings = store.get().await?;
            let key_state = if settings.api_key().is_some() {
                "configured"
            } else if env_api_key().is_some() {
                "from GEMINI_API_KEY"
            } else {
                "not configured"
            };
            println!("API key: {}", key_state);
            match settings.corpus {
                Some(index) => {
                    println!("Store:   {} ({:?})", index.store_id, index.status);
                    println!("Indexed: {}", index.last_index_date.to_rfc3339());
                    for file in &index.files {
                        println!("  - {} [{}]", file.name, file.mime_type);
                    }
                }
                None => println!("Store:   none"),
            }
        }
        Commands::Key { action } => match action {
            KeyAction::Set { key } => {
                save_api_key(&store, &key).await?;
                println!("API key saved.");
            }
            KeyAction::Clear => {
                clear_api_key(&store).await?;
                println!("API key removed.");
            }
        },
        Commands::Reset => {
            reset_corpus(&store).await?;
            println!("Corpus index removed.");
        }
        Commands::Bench { file, out } => {
            let questions = load_questions(&file)?;
            let analyzer = build_analyzer(&cfg, &store).await?;
            let results = run_bench(&analyzer, &questions).await;

            for r in &results {
                let mark = match (&r.status, r.is_correct) {
                    (BenchStatus::Error, _) => "ERROR",
                    (_, true) => "OK",
                    (_, false) => "WRONG",
                };
                println!(
                    "{:>4}  {:<5}  expected {:?}  got {:?}",
                    r.question_index,
                    mark,
                    r.expected_answer,
                    r.llm_answer.as_deref().unwrap_or_default()
                );
            }

            let summary = BenchSummary::from_results(&results);
            println!();
            println!(
                "{} correct, {} incorrect, {} errors out of {}: accuracy {:.1}%",
                summary.correct, summary.incorrect, summary.errors, summary.total, summary.accuracy
            );

            if let Some(path) = out {
                let json = serde_json::json!({ "summary": summary, "results": results });
                std::fs::write(&path, serde_json::to_string_pretty(&json)?)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                eprintln!("Results written to {}", path.display());
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Completions { .. } => unreachable!(),
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_index(
    cfg: &Config,
    store: &JsonFileStore,
    folder: &Path,
    api_key: Option<String>,
    out: &Path,
    recursive: bool,
    persist: bool,
    progress: ProgressMode,
) -> anyhow::Result<()> {
    let api_key = match api_key {
        Some(key) => key,
        None => resolve_api_key(store)
            .await?
            .context("No API key: pass --api-key, run `qa key set`, or set GEMINI_API_KEY")?,
    };

    let scan = scan_folder(
        folder,
        &ScanOptions {
            recursive,
            max_file_size: cfg.indexing.max_file_size,
        },
    )?;
    for skipped in &scan.skipped {
        eprintln!("skipped {}: {}", skipped.name, skipped.reason);
    }
    if scan.files.is_empty() {
        bail!("No .pdf, .txt or .md file to index in {}", folder.display());
    }
    let total_bytes: u64 = scan.files.iter().map(|f| f.size).sum();
    println!(
        "Uploading {} files ({} bytes)...",
        scan.files.len(),
        format_number(total_bytes)
    );

    let api: Arc<dyn ProviderApi> = Arc::new(GeminiClient::new(&cfg.api)?);
    let indexer = Indexer::new(api, &cfg.indexing).with_progress(progress.reporter());

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let report = indexer.index_corpus(&api_key, scan.files, &cancel).await?;
    export_corpus(&report.index, Some(out))?;
    if persist {
        save_corpus(store, &report.index).await?;
    }

    println!();
    println!("Store:         {}", report.index.store_id);
    println!("Indexed files: {}", report.index.files.len());
    if !report.errors.is_empty() {
        println!("Errors:        {}", report.errors.len());
        for e in &report.errors {
            println!("  - {}", e);
        }
    }
    println!("Index written: {}", out.display());
    if persist {
        println!("Saved in {}", store.path().display());
    }
    Ok(())
}

fn env_api_key() -> Option<String> {
    std::env::var(API_KEY_ENV)
        .ok()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}

async fn resolve_api_key(store: &JsonFileStore) -> anyhow::Result<Option<String>> {
    let settings = store.get().await?;
    Ok(settings.api_key().map(str::to_string).or_else(env_api_key))
}

/// Analyzer over the settings file, with `GEMINI_API_KEY` filling a missing key.
async fn build_analyzer(cfg: &Config, store: &JsonFileStore) -> anyhow::Result<Analyzer> {
    let settings = store.get().await?;
    let view: Arc<dyn ConfigStore> = match (settings.api_key(), env_api_key()) {
        (None, Some(key)) => Arc::new(MemoryStore::new(Settings {
            api_key: Some(key),
            corpus: settings.corpus,
        })),
        _ => Arc::new(JsonFileStore::new(store.path())),
    };
    let api: Arc<dyn ProviderApi> = Arc::new(GeminiClient::new(&cfg.api)?);
    Ok(Analyzer::new(
        view,
        api,
        cfg.prompt.clone(),
        cfg.generation.clone(),
    ))
}

fn read_question(path: &Path) -> anyhow::Result<Question> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read question file: {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)?;
    Ok(Question::from_value(value)?)
}

fn question_from_flags(
    text: String,
    options: Vec<(String, String)>,
    multiple: bool,
    true_false: bool,
) -> Question {
    if true_false {
        return Question::TrueFalse { text };
    }
    Question::Choice {
        text,
        subtype: if multiple {
            SelectionMode::Multiple
        } else {
            SelectionMode::Single
        },
        options: options
            .into_iter()
            .map(|(letter, text)| ChoiceOption { letter, text })
            .collect(),
    }
}
