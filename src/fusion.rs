//! Retrieval fusion: vector hits plus a one-hop graph neighbourhood.
//!
//! ```text
//! query ─► embed ─► vector search (top_k) ─► seed terms ─► graph expansion
//!                          │                                    │
//!                          └────────── summaries ──┬── evidence ┘
//!                                                  ▼
//!                                             synthesis
//! ```
//!
//! Seed terms are a cheap proxy for entity extraction: each hit's country
//! plus the first five words of its summary. Evidence is kept in retrieval
//! order and is not deduplicated across overlapping seeds.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::embedding::embed_query;
use crate::prompts::{self, truncate_chars};
use crate::traits::ToolContext;

const SUMMARY_SEED_WORDS: usize = 5;

/// Case-insensitive substring match on node names, with neighbours.
const EXPAND_CYPHER: &str = "MATCH (n) WHERE toLower(n.name) CONTAINS toLower($t) \
                             OPTIONAL MATCH (n)-[r]-(m) RETURN n, r, m LIMIT ";

#[derive(Debug, Clone, Serialize)]
pub struct FusionResult {
    /// Payloads of the vector hits, best first.
    pub vector_hits: Vec<Map<String, Value>>,
    /// Graph rows for every seed term, concatenated.
    pub graph: Vec<Value>,
    pub synthesis: String,
}

/// Run vector search, graph expansion and synthesis for `query`.
///
/// A failing vector search yields no hits rather than an error; graph and
/// model failures propagate so callers can fall back.
pub async fn retrieve(ctx: &ToolContext, query: &str, top_k: usize) -> Result<FusionResult> {
    let vector = embed_query(ctx.embedder.as_ref(), query)
        .await
        .context("query embedding failed")?;

    let hits = match ctx.vectors.search(&vector, top_k).await {
        Ok(hits) => hits,
        Err(e) => {
            tracing::warn!(error = %format!("{:#}", e), "vector search failed, continuing without hits");
            Vec::new()
        }
    };
    let payloads: Vec<Map<String, Value>> = hits.into_iter().map(|h| h.payload).collect();

    let seeds = seed_terms(&payloads);
    tracing::debug!(hits = payloads.len(), seeds = seeds.len(), "expanding graph");

    let limit = ctx.config.retrieval.neighbor_limit;
    let mut graph = Vec::new();
    for term in &seeds {
        let mut params = Map::new();
        params.insert("t".into(), Value::from(term.as_str()));
        let rows = ctx
            .graph
            .run(&format!("{}{}", EXPAND_CYPHER, limit), params)
            .await
            .with_context(|| format!("graph expansion failed for '{}'", term))?;
        graph.extend(rows);
    }

    let summaries = payloads
        .iter()
        .map(|p| p.get("summary").and_then(Value::as_str).unwrap_or(""))
        .collect::<Vec<_>>()
        .join("\n\n");
    let evidence = Value::Array(graph.clone()).to_string();
    let evidence = truncate_chars(&evidence, ctx.config.retrieval.graph_evidence_chars);

    let synthesis = ctx
        .llm
        .generate(&prompts::fusion_synthesis(&summaries, evidence))
        .await
        .context("fusion synthesis failed")?;

    Ok(FusionResult {
        vector_hits: payloads,
        graph,
        synthesis,
    })
}

/// Country and leading summary words of each hit, in hit order.
///
/// Country is read from the payload, falling back to its nested
/// `metadata.country`.
pub fn seed_terms(payloads: &[Map<String, Value>]) -> Vec<String> {
    let mut seeds = Vec::new();
    for payload in payloads {
        let country = payload
            .get("country")
            .and_then(Value::as_str)
            .or_else(|| {
                payload
                    .get("metadata")
                    .and_then(|m| m.get("country"))
                    .and_then(Value::as_str)
            })
            .filter(|c| !c.is_empty());
        if let Some(country) = country {
            seeds.push(country.to_string());
        }
        if let Some(summary) = payload.get("summary").and_then(Value::as_str) {
            seeds.extend(
                summary
                    .split_whitespace()
                    .take(SUMMARY_SEED_WORDS)
                    .map(str::to_string),
            );
        }
    }
    seeds
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn seeds_take_country_and_five_summary_words() {
        let seeds = seed_terms(&[payload(json!({
            "country": "Tunisia",
            "summary": "Motor third party liability insurance is compulsory"
        }))]);
        assert_eq!(
            seeds,
            vec!["Tunisia", "Motor", "third", "party", "liability", "insurance"]
        );
    }

    #[test]
    fn seeds_fall_back_to_nested_country() {
        let seeds = seed_terms(&[payload(json!({
            "metadata": { "country": "France" }
        }))]);
        assert_eq!(seeds, vec!["France"]);
    }

    #[test]
    fn seeds_keep_duplicates_in_hit_order() {
        let hit = payload(json!({ "country": "Europe", "summary": "Solvency" }));
        let seeds = seed_terms(&[hit.clone(), hit]);
        assert_eq!(seeds, vec!["Europe", "Solvency", "Europe", "Solvency"]);
    }
}
