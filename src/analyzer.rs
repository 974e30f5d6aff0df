//! Query classification.
//!
//! The model is asked whether a query is in scope, whether it needs plain
//! vector retrieval (`RAG`) or graph-aware retrieval (`GraphRAG`), and which
//! regions/topic it mentions. Unparseable output never blocks a query: it
//! degrades to [`QueryAnalysis::fallback`], the simpler retrieval path.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::llm::TextGenerator;
use crate::model_output::{parse_object, RawText};
use crate::prompts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum QueryRoute {
    #[default]
    #[serde(rename = "RAG")]
    Rag,
    #[serde(rename = "GraphRAG")]
    GraphRag,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Entities {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub region: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub is_valid: bool,
    pub classification: QueryRoute,
    pub entities: Entities,
}

impl QueryAnalysis {
    /// `{is_valid: true, classification: "RAG", entities: {}}`
    pub fn fallback() -> Self {
        Self {
            is_valid: true,
            classification: QueryRoute::Rag,
            entities: Entities::default(),
        }
    }

    /// Read an analysis from model output.
    ///
    /// Any JSON object is accepted and missing or odd fields get their
    /// fallback values; text with no JSON object yields the fallback.
    pub fn from_model_output(text: &str) -> Self {
        match parse_object(text) {
            Ok(obj) => Self::from_object(&obj),
            Err(RawText(_)) => Self::fallback(),
        }
    }

    fn from_object(obj: &Map<String, Value>) -> Self {
        let is_valid = match obj.get("is_valid") {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => !matches!(s.trim().to_ascii_lowercase().as_str(), "no" | "false"),
            _ => true,
        };
        let classification = match obj.get("classification").and_then(Value::as_str) {
            Some(c) if c.trim().eq_ignore_ascii_case("graphrag") => QueryRoute::GraphRag,
            _ => QueryRoute::Rag,
        };

        let entities = obj.get("entities").and_then(Value::as_object);
        let region = match entities.and_then(|e| e.get("region")) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
            _ => Vec::new(),
        };
        let topic = entities
            .and_then(|e| e.get("topic"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        Self {
            is_valid,
            classification,
            entities: Entities { region, topic },
        }
    }
}

/// Classify `query` with the generation model.
pub async fn analyze_query(llm: &dyn TextGenerator, query: &str) -> Result<QueryAnalysis> {
    let output = llm
        .generate(&prompts::query_analysis(query))
        .await
        .context("query analysis failed")?;
    let analysis = QueryAnalysis::from_model_output(&output);
    tracing::debug!(route = ?analysis.classification, valid = analysis.is_valid, "query classified");
    Ok(analysis)
}
