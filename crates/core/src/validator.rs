use crate::embeddings::Embedder;
use crate::index::VectorIndex;
use crate::models::RetrievalSettings;
use crate::prompts::validation_prompt;
use crate::retriever::{join_context, top_k};
use crate::traits::LanguageModel;
use crate::RagError;
use tracing::debug;

/// Retrieves with `retrieval_prompt` and answers `answer_prompt` against
/// that context. Lets prompt authors try both halves of an extraction
/// independently.
pub async fn validate_prompt(
    index: &VectorIndex,
    embedder: &dyn Embedder,
    model: &dyn LanguageModel,
    retrieval_prompt: &str,
    answer_prompt: &str,
    settings: RetrievalSettings,
) -> Result<String, RagError> {
    let contexts = top_k(index, embedder, retrieval_prompt, settings).await?;
    debug!(document = %index.name(), contexts = contexts.len(), "validating prompt pair");

    let prompt = validation_prompt(answer_prompt, &join_context(&contexts));
    Ok(model.complete(&prompt).await?)
}
