//! Retrieval and answer quality scoring with an LLM judge.
//!
//! Five scores per sample:
//! - `semantic_similarity`: cosine between answer and reference embeddings
//! - `context_recall`: share of reference statements attributable to the contexts
//! - `context_precision`: average precision of the contexts judged useful for the reference
//! - `faithfulness`: share of answer statements supported by the contexts
//! - `response_relevancy`: similarity between the query and a question generated
//!   back from the answer, zero when the answer is noncommittal
//!
//! Scores that need a reference are `None` when the sample has none.

use crate::embeddings::{cosine_similarity, Embedder};
use crate::models::EvaluationSample;
use crate::prompts::{
    JUDGE_CONTEXT_PRECISION, JUDGE_CONTEXT_RECALL, JUDGE_FAITHFULNESS, JUDGE_RESPONSE_RELEVANCE,
    JUDGE_STATEMENTS,
};
use crate::retriever::join_context;
use crate::traits::LanguageModel;
use crate::{LlmError, RagError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{debug, info};

/// Completion budget for judge calls; statement lists outgrow the default.
pub const JUDGE_MAX_TOKENS: u32 = 2048;

pub const METRIC_NAMES: [&str; 5] = [
    "semantic_similarity",
    "context_recall",
    "context_precision",
    "faithfulness",
    "response_relevancy",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricScores {
    pub semantic_similarity: Option<f64>,
    pub context_recall: Option<f64>,
    pub context_precision: Option<f64>,
    pub faithfulness: Option<f64>,
    pub response_relevancy: Option<f64>,
}

impl MetricScores {
    pub fn values(&self) -> [Option<f64>; 5] {
        [
            self.semantic_similarity,
            self.context_recall,
            self.context_precision,
            self.faithfulness,
            self.response_relevancy,
        ]
    }

    fn from_values(values: [Option<f64>; 5]) -> Self {
        let [semantic_similarity, context_recall, context_precision, faithfulness, response_relevancy] =
            values;
        Self {
            semantic_similarity,
            context_recall,
            context_precision,
            faithfulness,
            response_relevancy,
        }
    }
}

/// One scored sample. Retrieved contexts are not kept in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRow {
    pub user_input: String,
    pub response: String,
    pub reference: Option<String>,
    #[serde(flatten)]
    pub scores: MetricScores,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub rows: Vec<EvaluationRow>,
}

impl EvaluationReport {
    /// Per-metric mean over the rows where the metric was computed.
    pub fn means(&self) -> MetricScores {
        let mut values = [None; 5];
        for (position, slot) in values.iter_mut().enumerate() {
            let scores = self
                .rows
                .iter()
                .filter_map(|row| row.scores.values()[position])
                .collect::<Vec<_>>();
            if !scores.is_empty() {
                *slot = Some(scores.iter().sum::<f64>() / scores.len() as f64);
            }
        }
        MetricScores::from_values(values)
    }

    /// Rows as a JSON array of flat records.
    pub fn to_records(&self) -> Result<Vec<Value>, serde_json::Error> {
        self.rows.iter().map(serde_json::to_value).collect()
    }

    /// Plain-text table of per-sample scores followed by the means.
    pub fn render_table(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<42}", "user_input")?;
        for name in METRIC_NAMES {
            write!(f, " {name:>19}")?;
        }
        writeln!(f)?;

        for row in &self.rows {
            write!(f, "{:<42}", truncate(&row.user_input, 40))?;
            write_scores(f, &row.scores)?;
            writeln!(f)?;
        }

        write!(f, "{:<42}", "mean")?;
        write_scores(f, &self.means())
    }
}

fn write_scores(f: &mut fmt::Formatter<'_>, scores: &MetricScores) -> fmt::Result {
    for value in scores.values() {
        match value {
            Some(value) => write!(f, " {value:>19.3}")?,
            None => write!(f, " {:>19}", "-")?,
        }
    }
    Ok(())
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut short = text.chars().take(max_chars - 1).collect::<String>();
    short.push('…');
    short
}

#[derive(Deserialize)]
struct RecallVerdicts {
    #[serde(default)]
    classifications: Vec<RecallClassification>,
}

#[derive(Deserialize)]
struct RecallClassification {
    attributed: Value,
}

#[derive(Deserialize)]
struct PrecisionVerdict {
    verdict: Value,
}

#[derive(Deserialize)]
struct AnswerStatements {
    #[serde(default)]
    statements: Vec<String>,
}

#[derive(Deserialize)]
struct FaithfulnessVerdicts {
    #[serde(default)]
    statements: Vec<StatementVerdict>,
}

#[derive(Deserialize)]
struct StatementVerdict {
    verdict: Value,
}

#[derive(Deserialize)]
struct GeneratedQuestion {
    question: String,
    noncommittal: Value,
}

/// Reads a 0/1 judge flag. Booleans and numeric strings are accepted too.
fn is_positive(flag: &Value) -> bool {
    match flag {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|number| number >= 0.5),
        Value::String(text) => {
            let text = text.trim();
            match text.parse::<f64>() {
                Ok(number) => number >= 0.5,
                Err(_) => matches!(text.to_lowercase().as_str(), "true" | "yes" | "sí" | "si"),
            }
        }
        _ => false,
    }
}

/// Parses the first JSON object in a judge reply. Prose or code fences around
/// it are ignored, braces included.
pub(crate) fn parse_judge_reply<T: DeserializeOwned>(reply: &str) -> Result<T, LlmError> {
    let mut last_error = None;
    for (start, _) in reply.match_indices('{') {
        match serde_json::Deserializer::from_str(&reply[start..]).into_iter::<T>().next() {
            Some(Ok(value)) => return Ok(value),
            Some(Err(error)) => last_error = Some(error),
            None => {}
        }
    }

    Err(LlmError::MalformedOutput(match last_error {
        Some(error) => format!("judge reply is not valid JSON: {error}"),
        None => format!("judge reply has no JSON object: {reply}"),
    }))
}

/// `sum_k(precision@k * v_k) / sum_k(v_k)`, zero when no context was useful.
pub fn average_precision(verdicts: &[bool]) -> f64 {
    let mut useful = 0usize;
    let mut weighted = 0.0;
    for (position, verdict) in verdicts.iter().enumerate() {
        if *verdict {
            useful += 1;
            weighted += useful as f64 / (position + 1) as f64;
        }
    }

    if useful == 0 {
        0.0
    } else {
        weighted / useful as f64
    }
}

fn ratio(positive: usize, total: usize) -> Option<f64> {
    (total > 0).then(|| positive as f64 / total as f64)
}

pub struct Evaluator<'a> {
    judge: &'a dyn LanguageModel,
    embedder: &'a dyn Embedder,
}

impl<'a> Evaluator<'a> {
    pub fn new(judge: &'a dyn LanguageModel, embedder: &'a dyn Embedder) -> Self {
        Self { judge, embedder }
    }

    /// Scores every sample in order. The first failure aborts the run.
    pub async fn evaluate(&self, samples: &[EvaluationSample]) -> Result<EvaluationReport, RagError> {
        info!(samples = samples.len(), judge = %self.judge.model_name(), "evaluating samples");

        let mut rows = Vec::with_capacity(samples.len());
        for sample in samples {
            let scores = self.score(sample).await?;
            rows.push(EvaluationRow {
                user_input: sample.user_input.clone(),
                response: sample.response.clone(),
                reference: sample.reference.clone(),
                scores,
            });
        }

        Ok(EvaluationReport { rows })
    }

    pub async fn score(&self, sample: &EvaluationSample) -> Result<MetricScores, RagError> {
        let scores = MetricScores {
            semantic_similarity: self.semantic_similarity(sample).await?,
            context_recall: self.context_recall(sample).await?,
            context_precision: self.context_precision(sample).await?,
            faithfulness: self.faithfulness(sample).await?,
            response_relevancy: Some(self.response_relevancy(sample).await?),
        };
        debug!(query = %sample.user_input, ?scores, "sample scored");
        Ok(scores)
    }

    pub async fn semantic_similarity(&self, sample: &EvaluationSample) -> Result<Option<f64>, RagError> {
        let Some(reference) = &sample.reference else {
            return Ok(None);
        };
        let vectors = self
            .embedder
            .embed_documents(&[sample.response.clone(), reference.clone()])
            .await?;
        match vectors.as_slice() {
            [answer, reference] => Ok(Some(f64::from(cosine_similarity(answer, reference)))),
            _ => Err(LlmError::MalformedOutput(format!("expected 2 embeddings, got {}", vectors.len())).into()),
        }
    }

    pub async fn context_recall(&self, sample: &EvaluationSample) -> Result<Option<f64>, RagError> {
        let Some(reference) = &sample.reference else {
            return Ok(None);
        };
        let context = join_context(&sample.retrieved_contexts);
        let prompt = JUDGE_CONTEXT_RECALL.render(&[
            ("question", &sample.user_input),
            ("context", &context),
            ("reference", reference),
        ]);
        let verdicts: RecallVerdicts = parse_judge_reply(&self.judge.complete(&prompt).await?)?;

        let attributed = verdicts
            .classifications
            .iter()
            .filter(|classification| is_positive(&classification.attributed))
            .count();
        Ok(ratio(attributed, verdicts.classifications.len()))
    }

    pub async fn context_precision(&self, sample: &EvaluationSample) -> Result<Option<f64>, RagError> {
        let Some(reference) = &sample.reference else {
            return Ok(None);
        };

        let mut verdicts = Vec::with_capacity(sample.retrieved_contexts.len());
        for context in &sample.retrieved_contexts {
            let prompt = JUDGE_CONTEXT_PRECISION.render(&[
                ("question", &sample.user_input),
                ("context", context),
                ("reference", reference),
            ]);
            let verdict: PrecisionVerdict = parse_judge_reply(&self.judge.complete(&prompt).await?)?;
            verdicts.push(is_positive(&verdict.verdict));
        }

        Ok(Some(average_precision(&verdicts)))
    }

    pub async fn faithfulness(&self, sample: &EvaluationSample) -> Result<Option<f64>, RagError> {
        let prompt = JUDGE_STATEMENTS.render(&[("question", &sample.user_input), ("answer", &sample.response)]);
        let statements: AnswerStatements = parse_judge_reply(&self.judge.complete(&prompt).await?)?;
        if statements.statements.is_empty() {
            return Ok(None);
        }

        let context = join_context(&sample.retrieved_contexts);
        let listed = Value::from(statements.statements).to_string();
        let prompt = JUDGE_FAITHFULNESS.render(&[("context", &context), ("statements", &listed)]);
        let verdicts: FaithfulnessVerdicts = parse_judge_reply(&self.judge.complete(&prompt).await?)?;

        let supported = verdicts
            .statements
            .iter()
            .filter(|statement| is_positive(&statement.verdict))
            .count();
        Ok(ratio(supported, verdicts.statements.len()))
    }

    pub async fn response_relevancy(&self, sample: &EvaluationSample) -> Result<f64, RagError> {
        let prompt = JUDGE_RESPONSE_RELEVANCE.render(&[("answer", &sample.response)]);
        let generated: GeneratedQuestion = parse_judge_reply(&self.judge.complete(&prompt).await?)?;
        if is_positive(&generated.noncommittal) {
            return Ok(0.0);
        }

        let query = self.embedder.embed_query(&sample.user_input).await?;
        let question = self.embedder.embed_query(&generated.question).await?;
        Ok(f64::from(cosine_similarity(&query, &question)))
    }
}
