use crate::embeddings::cosine_similarity;
use crate::error::IndexError;
use crate::models::{DocumentChunk, DocumentFingerprint, ScoredChunk};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedChunk {
    pub chunk: DocumentChunk,
    pub embedding: Vec<f32>,
}

/// Chunk embeddings of a single document, searched by exact cosine similarity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorIndex {
    pub fingerprint: DocumentFingerprint,
    pub embedding_model: String,
    pub dimensions: usize,
    entries: Vec<IndexedChunk>,
}

impl VectorIndex {
    pub fn build(
        fingerprint: DocumentFingerprint,
        embedding_model: impl Into<String>,
        chunks: Vec<DocumentChunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self, IndexError> {
        if chunks.len() != embeddings.len() {
            return Err(IndexError::CountMismatch {
                chunks: chunks.len(),
                embeddings: embeddings.len(),
            });
        }

        let dimensions = embeddings.first().map(Vec::len).unwrap_or_default();
        if let Some(bad) = embeddings.iter().find(|embedding| embedding.len() != dimensions) {
            return Err(IndexError::DimensionMismatch {
                expected: dimensions,
                actual: bad.len(),
            });
        }

        let entries = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexedChunk { chunk, embedding })
            .collect();

        Ok(Self {
            fingerprint,
            embedding_model: embedding_model.into(),
            dimensions,
            entries,
        })
    }

    pub fn name(&self) -> &str {
        &self.fingerprint.name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &DocumentChunk> {
        self.entries.iter().map(|entry| &entry.chunk)
    }

    /// Ranks every chunk, keeps the `fetch_k` best candidates and returns the
    /// first `top_k` of them. Ties keep index order.
    pub fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        fetch_k: usize,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        if !self.entries.is_empty() && query_vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: query_vector.len(),
            });
        }

        let mut candidates = self
            .entries
            .iter()
            .map(|entry| (cosine_similarity(query_vector, &entry.embedding), entry))
            .collect::<Vec<_>>();

        candidates.sort_by(|left, right| right.0.total_cmp(&left.0));
        candidates.truncate(fetch_k);

        Ok(candidates
            .into_iter()
            .take(top_k)
            .map(|(score, entry)| ScoredChunk {
                chunk: entry.chunk.clone(),
                score,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: u64, text: &str) -> DocumentChunk {
        DocumentChunk {
            chunk_id: format!("chunk-{index}"),
            document_name: "doc".to_string(),
            page: 1,
            offset: 0,
            chunk_index: index,
            text: text.to_string(),
        }
    }

    fn fingerprint() -> DocumentFingerprint {
        DocumentFingerprint {
            name: "doc".to_string(),
            source_path: "/tmp/doc.pdf".to_string(),
            checksum: "abc".to_string(),
            ingested_at: chrono::Utc::now(),
        }
    }

    fn sample_index() -> VectorIndex {
        VectorIndex::build(
            fingerprint(),
            "test",
            vec![chunk(0, "x"), chunk(1, "y"), chunk(2, "xy")],
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
        )
        .expect("index should build")
    }

    #[test]
    fn search_orders_by_descending_similarity() {
        let hits = sample_index().search(&[1.0, 0.1], 3, 3).expect("search works");
        let texts = hits.iter().map(|hit| hit.chunk.text.as_str()).collect::<Vec<_>>();
        assert_eq!(texts, vec!["x", "xy", "y"]);
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn search_returns_top_k_of_fetch_k() {
        let index = sample_index();
        assert_eq!(index.search(&[1.0, 0.0], 2, 3).expect("search works").len(), 2);
        assert_eq!(index.search(&[1.0, 0.0], 3, 1).expect("search works").len(), 1);
    }

    #[test]
    fn ties_keep_index_order() {
        let index = VectorIndex::build(
            fingerprint(),
            "test",
            vec![chunk(0, "a"), chunk(1, "b")],
            vec![vec![1.0, 0.0], vec![1.0, 0.0]],
        )
        .expect("index should build");

        let hits = index.search(&[1.0, 0.0], 2, 2).expect("search works");
        assert_eq!(hits[0].chunk.text, "a");
        assert_eq!(hits[1].chunk.text, "b");
    }

    #[test]
    fn mismatched_inputs_are_rejected() {
        let counts = VectorIndex::build(fingerprint(), "test", vec![chunk(0, "a")], Vec::new());
        assert!(matches!(counts, Err(IndexError::CountMismatch { .. })));

        let dims = VectorIndex::build(
            fingerprint(),
            "test",
            vec![chunk(0, "a"), chunk(1, "b")],
            vec![vec![1.0], vec![1.0, 0.0]],
        );
        assert!(matches!(dims, Err(IndexError::DimensionMismatch { .. })));

        let query = sample_index().search(&[1.0, 0.0, 0.0], 1, 1);
        assert!(matches!(query, Err(IndexError::DimensionMismatch { .. })));
    }
}
