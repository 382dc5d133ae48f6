//! Fakes shared by unit tests.

use crate::embeddings::{CharacterNgramEmbedder, Embedder};
use crate::index::VectorIndex;
use crate::models::{DocumentChunk, DocumentFingerprint};
use crate::prompts::ChatPrompt;
use crate::traits::{LanguageModel, TextStream};
use crate::LlmError;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Answers with queued replies (falling back to `default`) and records
/// every prompt it receives.
pub(crate) struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    default: String,
    prompts: Mutex<Vec<ChatPrompt>>,
}

impl ScriptedModel {
    pub(crate) fn answering(default: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            default: default.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_replies<I, T>(replies: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            default: String::new(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn prompts(&self) -> Vec<ChatPrompt> {
        self.prompts.lock().expect("prompt log").clone()
    }

    fn next_reply(&self, prompt: &ChatPrompt) -> String {
        self.prompts.lock().expect("prompt log").push(prompt.clone());
        self.replies
            .lock()
            .expect("reply queue")
            .pop_front()
            .unwrap_or_else(|| self.default.clone())
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &ChatPrompt) -> Result<String, LlmError> {
        Ok(self.next_reply(prompt))
    }

    async fn stream(&self, prompt: &ChatPrompt) -> Result<TextStream, LlmError> {
        let reply = self.next_reply(prompt);
        let pieces = reply
            .split_inclusive(' ')
            .map(|piece| Ok(piece.to_string()))
            .collect::<Vec<_>>();
        Ok(stream::iter(pieces).boxed())
    }
}

/// Index with one chunk per text, embedded with the n-gram embedder.
pub(crate) async fn index_of(name: &str, texts: &[&str]) -> VectorIndex {
    let embedder = CharacterNgramEmbedder::default();
    let chunks = texts
        .iter()
        .enumerate()
        .map(|(position, text)| DocumentChunk {
            chunk_id: format!("{name}-{position}"),
            document_name: name.to_string(),
            page: position as u32 + 1,
            offset: 0,
            chunk_index: position as u64,
            text: text.to_string(),
        })
        .collect::<Vec<_>>();
    let texts = chunks.iter().map(|chunk| chunk.text.clone()).collect::<Vec<_>>();
    let embeddings = embedder.embed_documents(&texts).await.expect("embeddings");

    VectorIndex::build(
        DocumentFingerprint {
            name: name.to_string(),
            source_path: format!("/tmp/{name}.pdf"),
            checksum: "0000".to_string(),
            ingested_at: chrono::Utc::now(),
        },
        embedder.model_name(),
        chunks,
        embeddings,
    )
    .expect("index builds")
}
