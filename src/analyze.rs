//! Analysis orchestration: question in, parsed answer out.
//!
//! [`Analyzer::analyze`] reads one snapshot of the configuration store, then
//! runs prompt building, remote inference and response parsing in sequence.
//! The key check comes first so a missing credential never costs a network
//! call. Nothing is cached between requests.

use std::sync::Arc;

use crate::config::{GenerationConfig, PromptConfig};
use crate::error::{Error, Result};
use crate::gemini::ProviderApi;
use crate::inference::infer;
use crate::models::{InferenceResult, Question};
use crate::prompt::build_prompt;
use crate::store::{ConfigStore, Settings};

pub struct Analyzer {
    store: Arc<dyn ConfigStore>,
    api: Arc<dyn ProviderApi>,
    prompt: PromptConfig,
    generation: GenerationConfig,
}

impl Analyzer {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        api: Arc<dyn ProviderApi>,
        prompt: PromptConfig,
        generation: GenerationConfig,
    ) -> Self {
        Self {
            store,
            api,
            prompt,
            generation,
        }
    }

    /// Answer `question`.
    pub async fn analyze(&self, question: &Question) -> Result<InferenceResult> {
        let settings = self.store.get().await?;
        self.analyze_with(&settings, question).await
    }

    /// Decode a raw question payload, then answer it.
    pub async fn analyze_value(&self, value: serde_json::Value) -> Result<InferenceResult> {
        let settings = self.store.get().await?;
        // The key check precedes decoding so an unconfigured client sees the
        // credential error whatever it sends.
        if settings.api_key().is_none() {
            return Err(Error::MissingCredential);
        }
        let question = Question::from_value(value)?;
        self.analyze_with(&settings, &question).await
    }

    async fn analyze_with(
        &self,
        settings: &Settings,
        question: &Question,
    ) -> Result<InferenceResult> {
        let api_key = settings.api_key().ok_or(Error::MissingCredential)?;

        question.validate()?;

        let corpus = settings.corpus.as_ref();
        let mut options = self.prompt.options();
        options.rag_active = corpus.and_then(|c| c.rag_store()).is_some();

        let prompt = build_prompt(question, &options);
        tracing::info!(
            kind = question.kind(),
            rag = options.rag_active,
            "analyzing question"
        );

        infer(
            self.api.as_ref(),
            &prompt,
            api_key,
            corpus,
            &self.generation,
        )
        .await
    }
}
