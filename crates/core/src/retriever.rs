use crate::embeddings::Embedder;
use crate::index::VectorIndex;
use crate::models::RetrievalSettings;
use crate::IndexError;
use tracing::{debug, warn};

/// Texts of the `top_k` chunks most similar to `query`, best first, picked
/// from `fetch_k` candidates. `top_k` above `fetch_k` is clamped.
pub async fn top_k(
    index: &VectorIndex,
    embedder: &dyn Embedder,
    query: &str,
    settings: RetrievalSettings,
) -> Result<Vec<String>, IndexError> {
    let effective = settings.effective_top_k();
    if effective < settings.top_k {
        warn!(
            top_k = settings.top_k,
            fetch_k = settings.fetch_k,
            "top_k exceeds fetch_k, clamping"
        );
    }

    let query_vector = embedder.embed_query(query).await?;
    let hits = index.search(&query_vector, effective, settings.fetch_k)?;

    debug!(
        document = %index.name(),
        hits = hits.len(),
        best_score = hits.first().map(|hit| hit.score).unwrap_or_default(),
        "retrieved context"
    );

    Ok(hits.into_iter().map(|hit| hit.chunk.text).collect())
}

/// Retrieved chunks joined by newlines, in retrieval order.
pub fn join_context(chunks: &[String]) -> String {
    chunks.join("\n")
}
