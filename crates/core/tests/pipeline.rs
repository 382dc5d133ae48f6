//! End-to-end extraction over a persisted index: three pages, one
//! variable, scripted model replies.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::{tempdir, TempDir};
use tender_rag_core::prompts::ChatPrompt;
use tender_rag_core::{
    CacheOutcome, CharacterNgramEmbedder, ChunkingConfig, DefinitionPaths, FsIndexStore,
    IngestError, LanguageModel, LlmError, PageText, PdfExtractor, Provider, RagConfig,
    RetrievalSettings, TenderAssistant, TextStream,
};

const PAGES: [&str; 3] = [
    "Objeto del contrato: suministro de mobiliario escolar para centros públicos.",
    "Presupuesto base de licitación: 84.700 euros, IVA incluido.",
    "Plazo de ejecución: seis meses a contar desde la formalización del contrato.",
];

struct ThreePages;

impl PdfExtractor for ThreePages {
    fn extract_pages(&self, _path: &Path) -> Result<Vec<PageText>, IngestError> {
        Ok(PAGES
            .iter()
            .enumerate()
            .map(|(position, text)| PageText {
                number: position as u32 + 1,
                text: text.to_string(),
            })
            .collect())
    }
}

struct FixedAnswer {
    answer: &'static str,
    prompts: Mutex<Vec<ChatPrompt>>,
}

impl FixedAnswer {
    fn new(answer: &'static str) -> Self {
        Self {
            answer,
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LanguageModel for FixedAnswer {
    fn model_name(&self) -> &str {
        "fixed"
    }

    async fn complete(&self, prompt: &ChatPrompt) -> Result<String, LlmError> {
        self.prompts.lock().expect("prompt log").push(prompt.clone());
        Ok(self.answer.to_string())
    }

    async fn stream(&self, prompt: &ChatPrompt) -> Result<TextStream, LlmError> {
        let answer = self.complete(prompt).await?;
        Ok(stream::iter([Ok(answer)]).boxed())
    }
}

fn write_fixtures(dir: &TempDir) -> Result<(RagConfig, PathBuf), std::io::Error> {
    let variables = dir.path().join("variables_to_extract.json");
    let queries = dir.path().join("variables_queries.json");
    let ground_truth = dir.path().join("validation.json");
    fs::write(
        &variables,
        r#"{"variables": [{"Presupuesto": "Importe máximo que la administración pagará por el contrato"}]}"#,
    )?;
    fs::write(&queries, r#"{"Presupuesto": "presupuesto base de licitación"}"#)?;
    fs::write(
        &ground_truth,
        r#"{"document_799.pdf": {"details": {"Presupuesto": "84.700 euros con IVA"}}}"#,
    )?;

    let pdf_dir = dir.path().join("pdf_files");
    fs::create_dir_all(&pdf_dir)?;
    let pdf = pdf_dir.join("document_799.pdf");
    fs::write(&pdf, b"%PDF-1.4\n%placeholder")?;

    let config = RagConfig {
        retrieval: RetrievalSettings::new(2, 3),
        provider: Provider::OpenAi {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: "unused".to_string(),
        },
        chat_model: "fixed".to_string(),
        judge_model: "fixed".to_string(),
        embedding_model: "char-trigram".to_string(),
        index_dir: dir.path().join("vectorstores"),
        pdf_dir,
        definitions: DefinitionPaths {
            variables,
            queries,
            ground_truth,
        },
        chunking: ChunkingConfig::default(),
    };
    Ok((config, pdf))
}

fn assistant(config: &RagConfig, answer: &'static str) -> TenderAssistant<FsIndexStore> {
    TenderAssistant::new(
        config,
        FsIndexStore::new(&config.index_dir),
        Box::new(CharacterNgramEmbedder::default()),
        Box::new(FixedAnswer::new(answer)),
        Box::new(FixedAnswer::new("{}")),
    )
    .with_extractor(ThreePages)
}

#[tokio::test]
async fn one_variable_yields_one_answer_and_one_sample() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let (config, pdf) = write_fixtures(&dir)?;
    let assistant = assistant(&config, "84.700 euros, IVA incluido");

    let index = assistant.build_index(&pdf).await?;
    assert_eq!(index.outcome, CacheOutcome::Built);
    assert_eq!(index.index.len(), 3);

    let run = assistant.extract(&pdf, Some("document_799.pdf")).await?;

    assert_eq!(run.result.len(), 1);
    assert_eq!(run.result.get("Presupuesto"), Some("84.700 euros, IVA incluido"));
    assert_eq!(
        serde_json::to_string(&run.result)?,
        r#"{"Presupuesto":"84.700 euros, IVA incluido"}"#
    );

    assert_eq!(run.samples.len(), 1);
    let sample = &run.samples[0];
    assert_eq!(sample.user_input, "presupuesto base de licitación");
    assert!(!sample.retrieved_contexts.is_empty());
    assert!(sample.retrieved_contexts.len() <= config.retrieval.top_k);
    assert!(sample.retrieved_contexts.iter().all(|context| PAGES.contains(&context.as_str())));
    assert_eq!(sample.response, "84.700 euros, IVA incluido");
    assert_eq!(sample.reference.as_deref(), Some("84.700 euros con IVA"));
    Ok(())
}

#[tokio::test]
async fn persisted_index_is_reused_by_a_new_assistant() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let (config, pdf) = write_fixtures(&dir)?;

    assistant(&config, "").build_index(&pdf).await?;
    assert!(config.index_dir.join("document_799").join("index.json").is_file());

    let reopened = assistant(&config, "").build_index(&pdf).await?;
    assert_eq!(reopened.outcome, CacheOutcome::Hit);
    assert_eq!(reopened.index.name(), "document_799");

    let fresh = assistant(&config, "");
    fresh.invalidate_index("document_799").await?;
    assert_eq!(fresh.build_index(&pdf).await?.outcome, CacheOutcome::Built);
    Ok(())
}

#[tokio::test]
async fn validation_answers_over_the_same_index() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let (config, _) = write_fixtures(&dir)?;
    let assistant = assistant(&config, "seis meses");

    let answer = assistant
        .validate("document_799", "plazo de ejecución", "¿Cuántos meses dura el contrato?")
        .await?;
    assert_eq!(answer, "seis meses");
    Ok(())
}
