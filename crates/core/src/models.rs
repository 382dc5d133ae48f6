use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentFingerprint {
    /// File stem; the key the index is persisted under.
    pub name: String,
    pub source_path: String,
    pub checksum: String,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentChunk {
    pub chunk_id: String,
    pub document_name: String,
    pub page: u32,
    /// Character offset of the chunk start inside its page text.
    pub offset: usize,
    pub chunk_index: u64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}

/// One field to extract from a tender document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VariableDefinition {
    pub name: String,
    pub definition: String,
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractedField {
    pub variable: String,
    pub answer: String,
}

/// Variable name to answer, kept in declared variable order.
///
/// Serializes as a JSON object whose keys follow that order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionResult {
    fields: Vec<ExtractedField>,
}

impl ExtractionResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the answer when the variable is already present.
    pub fn insert(&mut self, variable: impl Into<String>, answer: impl Into<String>) {
        let variable = variable.into();
        let answer = answer.into();
        match self.fields.iter_mut().find(|field| field.variable == variable) {
            Some(field) => field.answer = answer,
            None => self.fields.push(ExtractedField { variable, answer }),
        }
    }

    pub fn get(&self, variable: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|field| field.variable == variable)
            .map(|field| field.answer.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.variable.as_str())
    }

    pub fn fields(&self) -> &[ExtractedField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Rebuilds the result following `order`, dropping variables without an
    /// answer. A name listed twice keeps its first position.
    pub fn ordered_by<'a>(&self, order: impl IntoIterator<Item = &'a str>) -> Self {
        let mut ordered = Self::new();
        for name in order {
            if let Some(answer) = self.get(name) {
                ordered.insert(name, answer);
            }
        }
        ordered
    }
}

impl Serialize for ExtractionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for field in &self.fields {
            map.serialize_entry(&field.variable, &field.answer)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatHistory {
    pub turns: Vec<ChatTurn>,
}

impl ChatHistory {
    pub fn new(turns: Vec<ChatTurn>) -> Self {
        Self { turns }
    }

    /// Builds a history from the flat `[question, answer, question, ...]` list a
    /// chat front end keeps. A trailing question without answer is kept as a turn.
    pub fn from_alternating(messages: &[String]) -> Self {
        let turns = messages
            .chunks(2)
            .map(|pair| ChatTurn {
                question: pair[0].clone(),
                answer: pair.get(1).cloned().unwrap_or_default(),
            })
            .collect();
        Self { turns }
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn push(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.turns.push(ChatTurn {
            question: question.into(),
            answer: answer.into(),
        });
    }

    /// The last `limit` user questions, oldest first.
    pub fn recent_questions(&self, limit: usize) -> Vec<&str> {
        let skip = self.turns.len().saturating_sub(limit);
        self.turns
            .iter()
            .skip(skip)
            .map(|turn| turn.question.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationSample {
    pub user_input: String,
    pub retrieved_contexts: Vec<String>,
    pub response: String,
    pub reference: Option<String>,
}

/// Validated retrieval breadth: `top_k` results out of `fetch_k` candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub fetch_k: usize,
}

impl RetrievalSettings {
    pub fn new(top_k: usize, fetch_k: usize) -> Self {
        Self { top_k, fetch_k }
    }

    /// `top_k` bounded by `fetch_k`.
    pub fn effective_top_k(&self) -> usize {
        self.top_k.min(self.fetch_k)
    }
}
