//! Remote inference: one `generateContent` call per question.
//!
//! When the corpus index is active, the request is grounded on the indexed
//! course documents: a system instruction restricts the model to them and a
//! `fileSearch` tool names the store.

use crate::config::GenerationConfig;
use crate::error::Result;
use crate::gemini::{Content, FileSearch, GenerateRequest, GenerationParams, ProviderApi, Tool};
use crate::models::{CorpusIndex, InferenceResult};
use crate::parse::parse_generate_response;

/// Phrase the model must use when the course documents lack the information.
pub const RAG_REFUSAL: &str = "This information is not in the course documents.";

/// Build the request body for `prompt`, grounded on `corpus` when it is active.
pub fn build_request(
    prompt: &str,
    corpus: Option<&CorpusIndex>,
    generation: &GenerationConfig,
) -> GenerateRequest {
    let mut request = GenerateRequest {
        contents: vec![Content::user(prompt)],
        generation_config: GenerationParams {
            temperature: generation.temperature,
            max_output_tokens: generation.max_output_tokens,
            top_k: generation.top_k,
            top_p: generation.top_p,
        },
        system_instruction: None,
        tools: Vec::new(),
    };

    if let Some(store) = corpus.and_then(CorpusIndex::rag_store) {
        request.system_instruction = Some(Content::system(rag_instruction()));
        request.tools.push(Tool {
            file_search: FileSearch {
                file_search_store_names: vec![store.to_string()],
            },
        });
    }

    request
}

fn rag_instruction() -> String {
    format!(
        "You answer quiz questions using ONLY the course documents available through file search.\n\
         1. Use only information stated in those documents.\n\
         2. If the documents do not contain the information, say: \"{}\"\n\
         3. Never rely on general knowledge to fill gaps.\n\
         4. Keep the response format requested in the question.",
        RAG_REFUSAL
    )
}

/// Send `prompt` to the model and parse the reply.
///
/// Fails with [`crate::Error::RemoteCall`] on a non-success status and
/// [`crate::Error::Transport`] when no response arrived. A successful reply
/// without usable text still yields a result (see
/// [`parse_generate_response`]). No retry.
pub async fn infer(
    api: &dyn ProviderApi,
    prompt: &str,
    api_key: &str,
    corpus: Option<&CorpusIndex>,
    generation: &GenerationConfig,
) -> Result<InferenceResult> {
    let request = build_request(prompt, corpus, generation);
    tracing::debug!(
        grounded = !request.tools.is_empty(),
        prompt_chars = prompt.len(),
        "calling generateContent"
    );
    let payload = api.generate_content(api_key, &request).await?;
    Ok(parse_generate_response(&payload))
}
