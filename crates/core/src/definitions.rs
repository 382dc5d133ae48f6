//! Variable definitions, retrieval queries and ground-truth references.
//!
//! File formats:
//! - variables: `{"variables": [{"<name>": "<definition>"}, ...]}`, one key per entry
//! - queries: `{"<name>": "<query>"}`
//! - ground truth: `{"<document file>": {"details": {"<name>": "<reference>"}}}`

use crate::config::DefinitionPaths;
use crate::error::ConfigError;
use crate::models::VariableDefinition;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Deserialize)]
struct VariablesFile {
    variables: Vec<Map<String, Value>>,
}

#[derive(Deserialize)]
struct GroundTruthEntry {
    details: HashMap<String, String>,
}

/// Reference answers of one document, keyed by variable name.
pub type References = HashMap<String, String>;

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Declared `(name, definition)` pairs, in file order.
pub fn parse_variables(file: &str) -> Result<Vec<(String, String)>, ConfigError> {
    let file: VariablesFile = serde_json::from_str(file).map_err(|source| ConfigError::Parse {
        path: "variables".to_string(),
        source,
    })?;
    variable_entries(file)
}

fn variable_entries(file: VariablesFile) -> Result<Vec<(String, String)>, ConfigError> {
    let mut seen = HashSet::new();
    file.variables
        .into_iter()
        .enumerate()
        .map(|(position, entry)| {
            if entry.len() != 1 {
                return Err(ConfigError::Definitions(format!(
                    "variable entry {position} must have exactly one key, found {}",
                    entry.len()
                )));
            }
            let Some((name, definition)) = entry.into_iter().next() else {
                return Err(ConfigError::Definitions(format!("variable entry {position} is empty")));
            };
            if !seen.insert(name.clone()) {
                return Err(ConfigError::Definitions(format!("variable {name} is declared twice")));
            }
            match definition {
                Value::String(definition) => Ok((name, definition)),
                other => Err(ConfigError::Definitions(format!(
                    "definition of {name} must be a string, found {other}"
                ))),
            }
        })
        .collect()
}

/// Pairs each declared variable with its retrieval query. Every declared
/// variable must have a query; extra queries are ignored.
pub fn merge_definitions(
    variables: Vec<(String, String)>,
    queries: &HashMap<String, String>,
) -> Result<Vec<VariableDefinition>, ConfigError> {
    variables
        .into_iter()
        .map(|(name, definition)| {
            let query = queries
                .get(&name)
                .cloned()
                .ok_or_else(|| ConfigError::Definitions(format!("no retrieval query for variable {name}")))?;
            Ok(VariableDefinition {
                name,
                definition,
                query,
            })
        })
        .collect()
}

pub fn load_variable_definitions(paths: &DefinitionPaths) -> Result<Vec<VariableDefinition>, ConfigError> {
    let variables = variable_entries(read_json(&paths.variables)?)?;
    let queries: HashMap<String, String> = read_json(&paths.queries)?;
    let definitions = merge_definitions(variables, &queries)?;

    debug!(variables = definitions.len(), path = %paths.variables.display(), "loaded variable definitions");
    Ok(definitions)
}

/// References for the document stored under `document_key` (a PDF file name
/// such as `document_799.pdf`).
pub fn load_references(path: &Path, document_key: &str) -> Result<References, ConfigError> {
    let mut entries: HashMap<String, GroundTruthEntry> = read_json(path)?;
    entries
        .remove(document_key)
        .map(|entry| entry.details)
        .ok_or_else(|| {
            ConfigError::Definitions(format!(
                "no ground truth for {document_key} in {}",
                path.display()
            ))
        })
}
