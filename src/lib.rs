//! # Quiz Assist
//!
//! Core of a quiz assistant for learning-management-system pages.
//!
//! Given a normalized quiz question (multiple choice, matching, or
//! true/false), Quiz Assist builds a prompt, calls the Gemini API, optionally
//! grounded on an indexed corpus of course documents, and returns a parsed
//! `{answer, reasoning, rawText}`. It also runs the workflow that uploads the
//! course files into a remote file-search store.
//!
//! ## Architecture
//!
//! ```text
//!  ┌──────────────┐   ┌──────────┐   ┌───────────┐   ┌──────────┐
//!  │ Message port │──▶│ Analyzer │──▶│  Prompt   │──▶│ Gemini   │
//!  │ HTTP / CLI   │   │          │◀──│  Parser   │◀──│ API      │
//!  └──────┬───────┘   └────┬─────┘   └───────────┘   └────▲─────┘
//!         │                │ key + index                  │
//!         │           ┌────▼─────┐                        │
//!         └──────────▶│  Store   │◀──── Indexer ──────────┘
//!                     └──────────┘   (store, upload, poll)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! qa key set AIza...                 # save the API key
//! qa index ./cours --out rag_config.json
//! qa analyze question.json           # answer one question
//! qa serve                           # expose the message port to the extension
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Questions, results, corpus index |
//! | [`error`] | Error type |
//! | [`prompt`] | Prompt builder |
//! | [`parse`] | Response parser |
//! | [`gemini`] | Provider API trait and HTTP client |
//! | [`inference`] | Remote inference client |
//! | [`indexing`] | Corpus indexing workflow |
//! | [`analyze`] | Analysis orchestrator |
//! | [`store`] | Configuration store |
//! | [`port`] | Message port dispatch |
//! | [`server`] | HTTP server for the message port |
//! | [`scan`] | Course folder scanning |
//! | [`export`] | `rag_config.json` export |
//! | [`progress`] | Indexing progress reporting |
//! | [`bench`] | Answer-accuracy benchmark |

pub mod analyze;
pub mod bench;
pub mod config;
pub mod error;
pub mod export;
pub mod gemini;
pub mod indexing;
pub mod inference;
pub mod models;
pub mod parse;
pub mod port;
pub mod progress;
pub mod prompt;
pub mod scan;
pub mod server;
pub mod store;

pub use error::{Error, Result};
