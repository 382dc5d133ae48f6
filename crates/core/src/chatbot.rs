use crate::embeddings::Embedder;
use crate::index::VectorIndex;
use crate::models::{ChatHistory, RetrievalSettings};
use crate::prompts::{chat_prompt, reformulation_prompt};
use crate::retriever::{join_context, top_k};
use crate::traits::{LanguageModel, TextStream};
use crate::RagError;
use tracing::debug;

/// User questions considered when reformulating a follow-up question.
pub const HISTORY_WINDOW: usize = 5;

/// Rewrites `question` so it stands on its own, using the last
/// [`HISTORY_WINDOW`] user questions. An empty history returns the question
/// unchanged without calling the model.
pub async fn reformulate_question(
    model: &dyn LanguageModel,
    question: &str,
    history: &ChatHistory,
) -> Result<String, RagError> {
    if history.is_empty() {
        return Ok(question.to_string());
    }

    let recent = history.recent_questions(HISTORY_WINDOW);
    let reformulated = model.complete(&reformulation_prompt(question, &recent)).await?;
    let reformulated = reformulated.trim();
    debug!(original = %question, reformulated = %reformulated, "question reformulated");

    if reformulated.is_empty() {
        Ok(question.to_string())
    } else {
        Ok(reformulated.to_string())
    }
}

/// Answers a chat question over `index`, streaming the model's reply.
pub async fn respond(
    index: &VectorIndex,
    embedder: &dyn Embedder,
    model: &dyn LanguageModel,
    question: &str,
    history: &ChatHistory,
    settings: RetrievalSettings,
) -> Result<TextStream, RagError> {
    let question = reformulate_question(model, question, history).await?;
    let contexts = top_k(index, embedder, &question, settings).await?;
    let prompt = chat_prompt(&question, &join_context(&contexts));

    Ok(model.stream(&prompt).await?)
}
