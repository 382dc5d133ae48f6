use crate::cache::{CacheOutcome, CachedIndex, IndexCache};
use crate::chatbot::respond;
use crate::config::{DefinitionPaths, RagConfig};
use crate::definitions::{load_references, load_variable_definitions};
use crate::embeddings::{Embedder, HttpEmbedder};
use crate::evaluation::{EvaluationReport, Evaluator, JUDGE_MAX_TOKENS};
use crate::extraction::{extract_fields, ExtractionRun};
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::ingest::discover_pdf_files;
use crate::llm::{GenerationParams, HttpChatModel, DEFAULT_TEMPERATURE};
use crate::models::{ChatHistory, EvaluationSample, RetrievalSettings};
use crate::stores::FsIndexStore;
use crate::traits::{IndexStore, LanguageModel, TextStream};
use crate::validator::validate_prompt;
use crate::{IngestError, RagError};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Default)]
pub struct IndexingReport {
    pub indexed: Vec<(String, CacheOutcome)>,
    pub skipped_files: Vec<SkippedPdf>,
}

/// Entry point for the extraction, chat, validation and evaluation flows
/// over cached per-document indices.
pub struct TenderAssistant<S> {
    retrieval: RetrievalSettings,
    pdf_dir: PathBuf,
    definitions: DefinitionPaths,
    cache: IndexCache<S>,
    extractor: Box<dyn PdfExtractor>,
    embedder: Box<dyn Embedder>,
    model: Box<dyn LanguageModel>,
    judge: Box<dyn LanguageModel>,
}

impl TenderAssistant<FsIndexStore> {
    /// Hosted models from `config`, indices under `config.index_dir`.
    pub fn from_config(config: &RagConfig) -> Self {
        let judge_params = GenerationParams {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: JUDGE_MAX_TOKENS,
        };

        Self::new(
            config,
            FsIndexStore::new(&config.index_dir),
            Box::new(HttpEmbedder::new(config.provider.clone(), &config.embedding_model)),
            Box::new(HttpChatModel::new(config.provider.clone(), &config.chat_model)),
            Box::new(HttpChatModel::with_params(
                config.provider.clone(),
                &config.judge_model,
                judge_params,
            )),
        )
    }
}

impl<S: IndexStore> TenderAssistant<S> {
    pub fn new(
        config: &RagConfig,
        store: S,
        embedder: Box<dyn Embedder>,
        model: Box<dyn LanguageModel>,
        judge: Box<dyn LanguageModel>,
    ) -> Self {
        Self {
            retrieval: config.retrieval,
            pdf_dir: config.pdf_dir.clone(),
            definitions: config.definitions.clone(),
            cache: IndexCache::new(store, config.chunking),
            extractor: Box::new(LopdfExtractor),
            embedder,
            model,
            judge,
        }
    }

    pub fn with_extractor(mut self, extractor: impl PdfExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    pub fn cache(&self) -> &IndexCache<S> {
        &self.cache
    }

    /// `<pdf_dir>/<document>.pdf`, the file behind a document name.
    pub fn document_path(&self, document: &str) -> PathBuf {
        self.pdf_dir.join(format!("{document}.pdf"))
    }

    pub async fn build_index(&self, pdf_path: &Path) -> Result<CachedIndex, RagError> {
        Ok(self
            .cache
            .load_or_build(pdf_path, self.extractor.as_ref(), self.embedder.as_ref())
            .await?)
    }

    /// Warms the cache for every PDF under `folder`. Files that fail are
    /// reported and skipped.
    pub async fn index_folder(&self, folder: &Path) -> Result<IndexingReport, RagError> {
        let files = discover_pdf_files(folder);
        if files.is_empty() {
            return Err(IngestError::InvalidArgument(format!(
                "no pdf files found in {}",
                folder.display()
            ))
            .into());
        }

        let mut report = IndexingReport::default();
        for path in files {
            match self.build_index(&path).await {
                Ok(cached) => report.indexed.push((cached.index.name().to_string(), cached.outcome)),
                Err(error) => {
                    warn!(path = %path.display(), error = %error, "skipping pdf");
                    report.skipped_files.push(SkippedPdf {
                        path,
                        reason: error.to_string(),
                    });
                }
            }
        }

        info!(
            indexed = report.indexed.len(),
            skipped = report.skipped_files.len(),
            "folder indexed"
        );
        Ok(report)
    }

    /// Extracts every configured variable from `pdf_path`. With a
    /// `ground_truth_key` the samples carry the references stored under it.
    pub async fn extract(
        &self,
        pdf_path: &Path,
        ground_truth_key: Option<&str>,
    ) -> Result<ExtractionRun, RagError> {
        let definitions = load_variable_definitions(&self.definitions)?;
        let references = ground_truth_key
            .map(|key| load_references(&self.definitions.ground_truth, key))
            .transpose()?;
        let cached = self.build_index(pdf_path).await?;

        extract_fields(
            &cached.index,
            self.embedder.as_ref(),
            self.model.as_ref(),
            &definitions,
            self.retrieval,
            references.as_ref(),
        )
        .await
    }

    pub async fn chat(
        &self,
        document: &str,
        question: &str,
        history: &ChatHistory,
    ) -> Result<TextStream, RagError> {
        let cached = self.build_index(&self.document_path(document)).await?;
        respond(
            &cached.index,
            self.embedder.as_ref(),
            self.model.as_ref(),
            question,
            history,
            self.retrieval,
        )
        .await
    }

    pub async fn validate(
        &self,
        document: &str,
        retrieval_prompt: &str,
        answer_prompt: &str,
    ) -> Result<String, RagError> {
        let cached = self.build_index(&self.document_path(document)).await?;
        validate_prompt(
            &cached.index,
            self.embedder.as_ref(),
            self.model.as_ref(),
            retrieval_prompt,
            answer_prompt,
            self.retrieval,
        )
        .await
    }

    pub async fn evaluate(&self, samples: &[EvaluationSample]) -> Result<EvaluationReport, RagError> {
        Evaluator::new(self.judge.as_ref(), self.embedder.as_ref())
            .evaluate(samples)
            .await
    }

    /// Deletes the persisted index of `document`; the next request rebuilds it.
    pub async fn invalidate_index(&self, document: &str) -> Result<(), RagError> {
        Ok(self.cache.invalidate(document).await?)
    }
}
