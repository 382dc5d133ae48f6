pub mod cache;
pub mod chatbot;
pub mod chunking;
pub mod config;
pub mod definitions;
pub mod embeddings;
pub mod error;
pub mod evaluation;
pub mod extraction;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod prompts;
pub mod retriever;
pub mod stores;
pub mod traits;
pub mod validator;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheOutcome, CachedIndex, IndexCache};
pub use chatbot::{reformulate_question, respond, HISTORY_WINDOW};
pub use chunking::{build_chunks, split_text, ChunkingConfig};
pub use config::{load_secrets, DefinitionPaths, Provider, RagConfig};
pub use definitions::{load_references, load_variable_definitions, References};
pub use embeddings::{cosine_similarity, CharacterNgramEmbedder, Embedder, HttpEmbedder};
pub use error::{ConfigError, IndexError, IngestError, LlmError, RagError, Result};
pub use evaluation::{EvaluationReport, EvaluationRow, Evaluator, MetricScores};
pub use extraction::{extract_fields, ExtractionRun};
pub use extractor::{extract_page_texts, LopdfExtractor, PageText, PdfExtractor};
pub use index::VectorIndex;
pub use ingest::{discover_pdf_files, document_name, ingest_document, IngestedDocument};
pub use llm::{GenerationParams, HttpChatModel};
pub use models::{
    ChatHistory, ChatTurn, DocumentChunk, DocumentFingerprint, EvaluationSample, ExtractionResult,
    RetrievalSettings, ScoredChunk, VariableDefinition,
};
pub use orchestrator::{IndexingReport, SkippedPdf, TenderAssistant};
pub use retriever::{join_context, top_k};
pub use stores::{FsIndexStore, MemoryIndexStore};
pub use traits::{IndexStore, LanguageModel, TextStream};
pub use validator::validate_prompt;
