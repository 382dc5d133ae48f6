use crate::definitions::References;
use crate::embeddings::Embedder;
use crate::index::VectorIndex;
use crate::models::{EvaluationSample, ExtractionResult, RetrievalSettings, VariableDefinition};
use crate::prompts::extraction_prompt;
use crate::retriever::{join_context, top_k};
use crate::traits::LanguageModel;
use crate::RagError;
use tracing::{debug, info};

/// Outcome of one extraction pass: the answers and one evaluation sample per
/// processed variable.
#[derive(Debug, Clone, Default)]
pub struct ExtractionRun {
    pub result: ExtractionResult,
    pub samples: Vec<EvaluationSample>,
}

/// Summarizes every declared variable from `index`.
///
/// Each variable is retrieved with its own query and answered with one
/// completion. The result keeps the declared variable order. Any retrieval or
/// model failure aborts the whole run.
pub async fn extract_fields(
    index: &VectorIndex,
    embedder: &dyn Embedder,
    model: &dyn LanguageModel,
    definitions: &[VariableDefinition],
    settings: RetrievalSettings,
    references: Option<&References>,
) -> Result<ExtractionRun, RagError> {
    info!(document = %index.name(), variables = definitions.len(), "extracting tender fields");

    let mut answers = ExtractionResult::new();
    let mut samples = Vec::with_capacity(definitions.len());

    for variable in definitions {
        let contexts = top_k(index, embedder, &variable.query, settings).await?;
        let prompt = extraction_prompt(&variable.name, &variable.definition, &join_context(&contexts));
        let answer = model.complete(&prompt).await?;
        debug!(variable = %variable.name, contexts = contexts.len(), answer_chars = answer.len(), "field extracted");

        samples.push(EvaluationSample {
            user_input: variable.query.clone(),
            retrieved_contexts: contexts,
            response: answer.clone(),
            reference: references.and_then(|references| references.get(&variable.name).cloned()),
        });
        answers.insert(variable.name.clone(), answer);
    }

    let result = answers.ordered_by(definitions.iter().map(|variable| variable.name.as_str()));
    Ok(ExtractionRun { result, samples })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::testing::{index_of, ScriptedModel};
    use std::collections::HashMap;

    fn definition(name: &str, query: &str) -> VariableDefinition {
        VariableDefinition {
            name: name.to_string(),
            definition: format!("Definición de {name}"),
            query: query.to_string(),
        }
    }

    #[tokio::test]
    async fn answers_follow_declared_order() -> Result<(), RagError> {
        let index = index_of("document_799", &["Plazo: doce meses.", "Presupuesto: cien mil euros."]).await;
        let model = ScriptedModel::with_replies(["12 meses", "100.000 EUR", "Abierto"]);
        let definitions = [
            definition("Plazo", "plazo de ejecución"),
            definition("Presupuesto", "presupuesto base"),
            definition("Procedimiento", "procedimiento de adjudicación"),
        ];

        let run = extract_fields(
            &index,
            &CharacterNgramEmbedder::default(),
            &model,
            &definitions,
            RetrievalSettings::new(1, 2),
            None,
        )
        .await?;

        assert_eq!(run.result.keys().collect::<Vec<_>>(), ["Plazo", "Presupuesto", "Procedimiento"]);
        assert_eq!(run.result.get("Presupuesto"), Some("100.000 EUR"));
        assert_eq!(
            serde_json::to_string(&run.result).expect("serializes"),
            r#"{"Plazo":"12 meses","Presupuesto":"100.000 EUR","Procedimiento":"Abierto"}"#
        );
        Ok(())
    }

    #[tokio::test]
    async fn each_variable_yields_one_sample() -> Result<(), RagError> {
        let index = index_of("document_799", &["Plazo: doce meses.", "Garantía: cinco por ciento."]).await;
        let model = ScriptedModel::answering("12 meses");
        let references = HashMap::from([("Plazo".to_string(), "Doce meses".to_string())]);
        let definitions = [definition("Plazo", "plazo de ejecución"), definition("Lotes", "número de lotes")];

        let run = extract_fields(
            &index,
            &CharacterNgramEmbedder::default(),
            &model,
            &definitions,
            RetrievalSettings::new(1, 2),
            Some(&references),
        )
        .await?;

        assert_eq!(run.samples.len(), 2);
        assert_eq!(run.samples[0].user_input, "plazo de ejecución");
        assert_eq!(run.samples[0].retrieved_contexts.len(), 1);
        assert_eq!(run.samples[0].reference.as_deref(), Some("Doce meses"));
        assert_eq!(run.samples[1].reference, None);

        let prompts = model.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].user.contains("Campo: Plazo"));
        assert!(prompts[0].user.contains(&run.samples[0].retrieved_contexts[0]));
        Ok(())
    }
}
