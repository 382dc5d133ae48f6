use crate::chunking::ChunkingConfig;
use crate::error::{ConfigError, LlmError};
use crate::models::RetrievalSettings;
use reqwest::RequestBuilder;
use std::path::PathBuf;
use tracing::{debug, warn};
use url::Url;

pub const SECRETS_FILES: [&str; 2] = [".env.file", ".env.secrets"];

pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini-2024-07-18";
pub const DEFAULT_JUDGE_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-06-01";
pub const DEFAULT_INDEX_DIR: &str = "vectorstores";
pub const DEFAULT_PDF_DIR: &str = "pdf_files";
pub const DEFAULT_VARIABLES_FILE: &str = "backend/variables_to_extract.json";
pub const DEFAULT_QUERIES_FILE: &str = "backend/variables_queries.json";
pub const DEFAULT_GROUND_TRUTH_FILE: &str = "backend/validation.json";

/// Hosted model provider, selected by `LLM_MODEL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    OpenAi {
        base_url: String,
        api_key: String,
    },
    Azure {
        endpoint: String,
        api_key: String,
        api_version: String,
    },
}

impl Provider {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenAi { .. } => "openai",
            Self::Azure { .. } => "azure",
        }
    }

    pub fn embeddings_url(&self, model: &str) -> Result<Url, LlmError> {
        self.operation_url(model, "embeddings")
    }

    pub fn chat_url(&self, model: &str) -> Result<Url, LlmError> {
        self.operation_url(model, "chat/completions")
    }

    fn operation_url(&self, model: &str, operation: &str) -> Result<Url, LlmError> {
        match self {
            Self::OpenAi { base_url, .. } => Ok(with_trailing_slash(base_url)?.join(operation)?),
            Self::Azure {
                endpoint,
                api_version,
                ..
            } => {
                let mut url = with_trailing_slash(endpoint)?
                    .join(&format!("openai/deployments/{model}/{operation}"))?;
                url.query_pairs_mut().append_pair("api-version", api_version);
                Ok(url)
            }
        }
    }

    pub fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Self::OpenAi { api_key, .. } => request.bearer_auth(api_key),
            Self::Azure { api_key, .. } => request.header("api-key", api_key),
        }
    }
}

fn with_trailing_slash(base: &str) -> Result<Url, url::ParseError> {
    if base.ends_with('/') {
        Url::parse(base)
    } else {
        Url::parse(&format!("{base}/"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionPaths {
    pub variables: PathBuf,
    pub queries: PathBuf,
    pub ground_truth: PathBuf,
}

impl Default for DefinitionPaths {
    fn default() -> Self {
        Self {
            variables: PathBuf::from(DEFAULT_VARIABLES_FILE),
            queries: PathBuf::from(DEFAULT_QUERIES_FILE),
            ground_truth: PathBuf::from(DEFAULT_GROUND_TRUTH_FILE),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RagConfig {
    pub retrieval: RetrievalSettings,
    pub provider: Provider,
    pub chat_model: String,
    pub judge_model: String,
    pub embedding_model: String,
    pub index_dir: PathBuf,
    pub pdf_dir: PathBuf,
    pub definitions: DefinitionPaths,
    pub chunking: ChunkingConfig,
}

impl RagConfig {
    /// Loads the dotenv secrets files, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        load_secrets(&SECRETS_FILES);
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).map(|value| value.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| read(key).ok_or_else(|| ConfigError::Missing(key.to_string()));
        let or_default = |key: &str, default: &str| read(key).unwrap_or_else(|| default.to_string());

        let retrieval = RetrievalSettings::new(
            parse_count("DOCUMENTS_TO_FETCH", &required("DOCUMENTS_TO_FETCH")?)?,
            parse_count("DOCUMENTS_TO_RETRIEVE", &required("DOCUMENTS_TO_RETRIEVE")?)?,
        );
        if retrieval.top_k > retrieval.fetch_k {
            warn!(
                top_k = retrieval.top_k,
                fetch_k = retrieval.fetch_k,
                "DOCUMENTS_TO_FETCH exceeds DOCUMENTS_TO_RETRIEVE, results will be clamped"
            );
        }

        let selector = required("LLM_MODEL")?.to_lowercase();
        let provider = if selector.contains("azure") {
            Provider::Azure {
                endpoint: required("AZURE_OPENAI_ENDPOINT")?,
                api_key: required("AZURE_OPENAI_API_KEY")?,
                api_version: or_default("AZURE_OPENAI_API_VERSION", DEFAULT_AZURE_API_VERSION),
            }
        } else if selector.contains("openai") {
            Provider::OpenAi {
                base_url: or_default("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
                api_key: required("OPENAI_API_KEY")?,
            }
        } else {
            return Err(ConfigError::Invalid {
                key: "LLM_MODEL".to_string(),
                details: format!("expected an azure or openai model, got {selector}"),
            });
        };

        let defaults = DefinitionPaths::default();
        let definitions = DefinitionPaths {
            variables: read("VARIABLES_FILE").map(PathBuf::from).unwrap_or(defaults.variables),
            queries: read("QUERIES_FILE").map(PathBuf::from).unwrap_or(defaults.queries),
            ground_truth: read("GROUND_TRUTH_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.ground_truth),
        };

        Ok(Self {
            retrieval,
            provider,
            chat_model: or_default("LLM_CHAT_MODEL", DEFAULT_CHAT_MODEL),
            judge_model: or_default("LLM_JUDGE_MODEL", DEFAULT_JUDGE_MODEL),
            embedding_model: or_default("LLM_EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
            index_dir: PathBuf::from(or_default("VECTORSTORE_DIR", DEFAULT_INDEX_DIR)),
            pdf_dir: PathBuf::from(or_default("PDF_DIR", DEFAULT_PDF_DIR)),
            definitions,
            chunking: ChunkingConfig::default(),
        })
    }
}

fn parse_count(key: &str, raw: &str) -> Result<usize, ConfigError> {
    let value = raw.parse::<usize>().map_err(|error| ConfigError::Invalid {
        key: key.to_string(),
        details: error.to_string(),
    })?;

    if value == 0 {
        return Err(ConfigError::Invalid {
            key: key.to_string(),
            details: "must be greater than zero".to_string(),
        });
    }

    Ok(value)
}

/// Loads each dotenv file that exists. Variables already set win.
pub fn load_secrets(files: &[&str]) {
    for file in files {
        match dotenvy::from_filename(file) {
            Ok(path) => debug!(path = %path.display(), "loaded secrets file"),
            Err(error) if error.not_found() => {}
            Err(error) => warn!(file = %file, error = %error, "could not load secrets file"),
        }
    }
}
