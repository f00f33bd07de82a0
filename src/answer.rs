//! Answer synthesis: grounded prompts and graceful degradation.
//!
//! Retrieval hits become labeled context blocks in the prompt; when there
//! are none, the prompt says so and asks the model to answer from general
//! knowledge instead of failing the request. The caller never receives an
//! empty string as a successful answer.

use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::embedding::{Embedder, Metric};
use crate::error::Result;
use crate::llm::LanguageModel;
use crate::models::RetrievalHit;
use crate::retrieval::retrieve_top_k;

/// Separator between context blocks, visible in the prompt.
const BLOCK_SEPARATOR: &str = "\n\n---\n\n";

/// Returned instead of an empty model output.
pub const EMPTY_OUTPUT_FALLBACK: &str = "No text output returned by the model.";

/// Answer `question` grounded in the `k` nearest bug-fix records.
///
/// Degrades rather than fails: zero hits produce a context-free prompt,
/// and an empty model output is replaced by [`EMPTY_OUTPUT_FALLBACK`].
pub async fn answer(
    pool: &SqlitePool,
    embedder: &dyn Embedder,
    llm: &dyn LanguageModel,
    metric: Metric,
    question: &str,
    max_tokens: usize,
    k: usize,
) -> Result<String> {
    let hits = retrieve_top_k(pool, embedder, metric, question, max_tokens, k).await?;

    let prompt = if hits.is_empty() {
        debug!("no retrieval hits, answering without context");
        build_fallback_prompt(question)
    } else {
        build_context_prompt(question, &hits)
    };

    let output = llm.complete(&prompt).await?;
    let output = output.trim();

    if output.is_empty() {
        warn!(model = llm.model_name(), "empty model output, substituting fallback");
        return Ok(EMPTY_OUTPUT_FALLBACK.to_string());
    }
    Ok(output.to_string())
}

/// Prompt grounding the answer in retrieved examples: one labeled block per
/// hit, the user's question, and instructions to say what's missing when
/// the examples aren't enough.
pub fn build_context_prompt(question: &str, hits: &[RetrievalHit]) -> String {
    let context = hits
        .iter()
        .map(|hit| {
            format!(
                "INSTANCE_ID: {}\nREPO: {}\nPROBLEM_STATEMENT:\n{}\n\nPATCH:\n{}",
                hit.instance_id, hit.repo, hit.problem_statement, hit.patch
            )
        })
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR);

    format!(
        "You are a coding assistant for defect detection and fixing.\n\n\
         Task:\n\
         Use the retrieved examples to help answer the user question. If the \
         examples do not contain enough information, say what is missing and \
         propose the safest next step.\n\n\
         User question:\n{}\n\n\
         Retrieved examples (top {}):\n{}\n\n\
         Answer:\n",
        question,
        hits.len(),
        context
    )
}

/// Prompt for when retrieval found nothing: admit it and answer from
/// general knowledge.
pub fn build_fallback_prompt(question: &str) -> String {
    format!(
        "You are a coding assistant.\n\n\
         User question:\n{}\n\n\
         No retrieved examples were found in the database. Answer using \
         general best practices.\n",
        question
    )
}
