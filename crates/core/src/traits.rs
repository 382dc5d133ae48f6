use crate::index::VectorIndex;
use crate::prompts::ChatPrompt;
use crate::{IndexError, LlmError};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Incremental text deltas of a streamed completion.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &ChatPrompt) -> Result<String, LlmError>;

    async fn stream(&self, prompt: &ChatPrompt) -> Result<TextStream, LlmError>;
}

/// Persistence of vector indices keyed by document name.
#[async_trait]
pub trait IndexStore: Send + Sync {
    async fn load(&self, name: &str) -> Result<Option<VectorIndex>, IndexError>;

    async fn save(&self, index: &VectorIndex) -> Result<(), IndexError>;

    /// Returns `false` when nothing was stored under `name`.
    async fn remove(&self, name: &str) -> Result<bool, IndexError>;

    async fn contains(&self, name: &str) -> Result<bool, IndexError>;
}
