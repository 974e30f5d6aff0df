//! Knowledge-graph access and the model-driven graph builder.
//!
//! The graph store is a secondary index: chunks are turned into Cypher by
//! the generation model, the output is validated statement by statement,
//! and whatever survives is executed. Retrieval fusion and `graph_compare`
//! read from the same store.
//!
//! Backends implement [`GraphStore`]:
//! - [`Neo4jHttp`]: Neo4j transactional HTTP endpoint
//!   (`POST {uri}/db/{database}/tx/commit`, basic auth).
//! - [`DisabledGraph`]: every call fails; used with `graph.backend = "disabled"`.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::config::GraphConfig;
use crate::llm::TextGenerator;
use crate::prompts::{self, GraphHints};
use crate::vector_store::VectorStore;

/// Runs Cypher and returns one JSON object per result row, keyed by column.
#[async_trait]
pub trait GraphStore: Send + Sync {
    fn kind(&self) -> &str;

    async fn run(&self, cypher: &str, params: Map<String, Value>) -> Result<Vec<Value>>;
}

pub fn create_graph_store(config: &GraphConfig) -> Result<Arc<dyn GraphStore>> {
    match config.backend.as_str() {
        "neo4j" => Ok(Arc::new(Neo4jHttp::new(config)?)),
        "disabled" => Ok(Arc::new(DisabledGraph)),
        other => bail!("Unknown graph backend: {}", other),
    }
}

pub struct DisabledGraph;

#[async_trait]
impl GraphStore for DisabledGraph {
    fn kind(&self) -> &str {
        "disabled"
    }

    async fn run(&self, _cypher: &str, _params: Map<String, Value>) -> Result<Vec<Value>> {
        bail!("Graph store is disabled (set [graph].backend)")
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Neo4j over HTTP
// ═══════════════════════════════════════════════════════════════════════

pub struct Neo4jHttp {
    endpoint: String,
    user: String,
    password: String,
    client: reqwest::Client,
}

impl Neo4jHttp {
    pub fn new(config: &GraphConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            endpoint: format!(
                "{}/db/{}/tx/commit",
                config.uri.trim_end_matches('/'),
                config.database
            ),
            user: config.user.clone(),
            password: config.password.clone(),
            client,
        })
    }
}

#[async_trait]
impl GraphStore for Neo4jHttp {
    fn kind(&self) -> &str {
        "neo4j"
    }

    async fn run(&self, cypher: &str, params: Map<String, Value>) -> Result<Vec<Value>> {
        let body = json!({
            "statements": [{ "statement": cypher, "parameters": params }]
        });
        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.user, Some(&self.password))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Neo4j connection error ({})", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let text: String = text.chars().take(500).collect();
            bail!("Neo4j API error {}: {}", status, text);
        }

        let json: Value = response.json().await?;
        parse_commit_response(&json)
    }
}

/// Map a `tx/commit` response to row objects, or fail on its `errors`.
fn parse_commit_response(json: &Value) -> Result<Vec<Value>> {
    if let Some(err) = json
        .get("errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first())
    {
        bail!(
            "Neo4j error {}: {}",
            err.get("code").and_then(Value::as_str).unwrap_or("unknown"),
            err.get("message").and_then(Value::as_str).unwrap_or("")
        );
    }

    let Some(result) = json
        .get("results")
        .and_then(Value::as_array)
        .and_then(|results| results.first())
    else {
        return Ok(Vec::new());
    };

    let columns: Vec<&str> = result
        .get("columns")
        .and_then(Value::as_array)
        .map(|cols| cols.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let rows = result
        .get("data")
        .and_then(Value::as_array)
        .map(|data| {
            data.iter()
                .filter_map(|d| d.get("row").and_then(Value::as_array))
                .map(|row| {
                    let obj: Map<String, Value> = columns
                        .iter()
                        .zip(row.iter())
                        .map(|(c, v)| (c.to_string(), v.clone()))
                        .collect();
                    Value::Object(obj)
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(rows)
}

// ═══════════════════════════════════════════════════════════════════════
// Cypher extraction
// ═══════════════════════════════════════════════════════════════════════

const VALID_KEYWORDS: &[&str] = &[
    "MERGE", "MATCH", "CREATE", "RETURN", "WITH", "WHERE", "SET", "UNWIND", "OPTIONAL",
];

const PROSE_PREFIXES: &[&str] = &["This ", "The ", "Here ", "Note:", "**"];

struct CypherPatterns {
    fence: Regex,
    bare_label: Regex,
    trailing_rel: Regex,
    chained_rel: Regex,
}

impl CypherPatterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            fence: Regex::new(r"```(?:cypher)?\s*")?,
            bare_label: Regex::new(r"MERGE\s+:(\w+)")?,
            trailing_rel: Regex::new(r"\)\s+:(\w+)\s*$")?,
            chained_rel: Regex::new(r"\}\s+:\w+\s+:")?,
        })
    }
}

fn patterns() -> Result<&'static CypherPatterns> {
    static PATTERNS: OnceLock<Result<CypherPatterns, regex::Error>> = OnceLock::new();
    PATTERNS
        .get_or_init(CypherPatterns::compile)
        .as_ref()
        .map_err(|e| anyhow!("invalid Cypher pattern: {}", e))
}

/// Pull executable statements out of model output.
///
/// Markdown fences are removed, the text is split on `;`, and only pieces
/// whose first word is a Cypher clause keyword are kept. Two common model
/// mistakes are repaired (`MERGE :Label`, a dangling `) :REL` suffix);
/// statements chaining relationships without arrows are dropped.
pub fn extract_cypher_statements(raw: &str) -> Result<Vec<String>> {
    let p = patterns()?;
    let cleaned = p.fence.replace_all(raw, "");

    Ok(cleaned
        .split(';')
        .map(str::trim)
        .filter(|s| is_valid_cypher(s))
        .filter_map(|s| {
            if PROSE_PREFIXES.iter().any(|prefix| s.starts_with(prefix)) {
                return None;
            }
            let fixed = p.bare_label.replace_all(s, "MERGE (:$1)");
            let fixed = p.trailing_rel.replace(&fixed, ")").into_owned();
            if p.chained_rel.is_match(&fixed) {
                return None;
            }
            Some(fixed)
        })
        .collect())
}

fn is_valid_cypher(statement: &str) -> bool {
    statement
        .split_whitespace()
        .next()
        .map(|word| VALID_KEYWORDS.contains(&word.to_ascii_uppercase().as_str()))
        .unwrap_or(false)
}

// ═══════════════════════════════════════════════════════════════════════
// Graph builder
// ═══════════════════════════════════════════════════════════════════════

/// Extract graph facts from `text` and write them.
///
/// Returns `true` when at least one statement executed. Individual
/// statement failures are logged and skipped; only a model failure is an
/// error.
pub async fn ingest_chunk(
    llm: &dyn TextGenerator,
    graph: &dyn GraphStore,
    text: &str,
    hints: &GraphHints,
) -> Result<bool> {
    let raw = llm
        .generate(&prompts::graph_extraction(text, hints))
        .await
        .context("graph extraction failed")?;

    let statements = extract_cypher_statements(&raw)?;
    if statements.is_empty() {
        tracing::debug!("no valid Cypher extracted");
        return Ok(false);
    }

    let mut applied = 0usize;
    for statement in &statements {
        match graph.run(statement, Map::new()).await {
            Ok(_) => applied += 1,
            Err(e) => {
                let msg: String = format!("{:#}", e).chars().take(100).collect();
                tracing::warn!(error = %msg, "graph statement failed");
            }
        }
    }

    tracing::debug!(applied, total = statements.len(), "graph statements executed");
    Ok(applied > 0)
}

/// Look up two `Regulation` nodes and any relationship between them.
///
/// The rows are returned stringified.
pub async fn compare(graph: &dyn GraphStore, policy_a: &str, policy_b: &str) -> Result<String> {
    let mut params = Map::new();
    params.insert("p1".into(), Value::from(policy_a));
    params.insert("p2".into(), Value::from(policy_b));

    let rows = graph
        .run(
            "MATCH (a:Regulation {name: $p1}) \
             MATCH (b:Regulation {name: $p2}) \
             OPTIONAL MATCH (a)-[r]-(b) \
             RETURN a, b, r",
            params,
        )
        .await?;
    Ok(Value::Array(rows).to_string())
}

/// Model-written summary of one regulation and the nodes attached to it.
///
/// `None` when no `Regulation` node has that name.
pub async fn summarize_regulation(
    graph: &dyn GraphStore,
    llm: &dyn TextGenerator,
    name: &str,
) -> Result<Option<String>> {
    let mut params = Map::new();
    params.insert("name".into(), Value::from(name));

    let rows = graph
        .run(
            "MATCH (r:Regulation {name: $name})<-[:REGULATED_BY|APPLIES_TO]-(n) \
             RETURN r, collect(n) AS related_nodes",
            params,
        )
        .await?;
    if rows.is_empty() {
        tracing::info!(regulation = name, "regulation not found in graph");
        return Ok(None);
    }

    let context = Value::Array(rows).to_string();
    let summary = llm
        .generate(&prompts::regulation_summary(name, &context))
        .await
        .context("regulation summary failed")?;
    Ok(Some(summary))
}

/// Model-written comparison of two regulations from their graph
/// neighbourhood (`CONFLICTS_WITH` and `SIMILAR_TO` edges).
pub async fn compare_regulations(
    graph: &dyn GraphStore,
    llm: &dyn TextGenerator,
    policy_a: &str,
    policy_b: &str,
) -> Result<String> {
    let mut params = Map::new();
    params.insert("r1".into(), Value::from(policy_a));
    params.insert("r2".into(), Value::from(policy_b));

    let rows = graph
        .run(
            "MATCH (r:Regulation) WHERE r.name IN [$r1, $r2] \
             OPTIONAL MATCH (r)-[rel:CONFLICTS_WITH|SIMILAR_TO]->(c) \
             RETURN r.name AS name, r, \
             [x IN collect({relation: type(rel), other: c}) WHERE x.other IS NOT NULL] AS relations",
            params,
        )
        .await?;
    tracing::debug!(rows = rows.len(), "regulation comparison rows");

    let context = Value::Array(rows).to_string();
    llm.generate(&prompts::regulation_comparison(policy_a, policy_b, &context))
        .await
        .context("regulation comparison failed")
}

/// Totals from a full vector-store → graph pass.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, PartialEq, Eq)]
pub struct GraphIngestReport {
    pub total: usize,
    pub ingested: usize,
}

/// Feed every stored chunk payload through the graph builder.
///
/// Payloads without text are skipped and not counted. Per-chunk failures
/// are logged and do not stop the pass.
pub async fn ingest_from_vectors(
    llm: &dyn TextGenerator,
    graph: &dyn GraphStore,
    vectors: &dyn VectorStore,
) -> Result<GraphIngestReport> {
    let payloads = vectors.scroll_all().await?;
    let mut report = GraphIngestReport::default();

    for payload in payloads {
        let text = ["original_text", "text"]
            .iter()
            .find_map(|k| payload.get(*k).and_then(Value::as_str))
            .filter(|t| !t.trim().is_empty());
        let Some(text) = text else {
            continue;
        };
        report.total += 1;

        let hints = GraphHints::from_metadata(&hint_source(&payload));
        match ingest_chunk(llm, graph, text, &hints).await {
            Ok(true) => report.ingested += 1,
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %format!("{:#}", e), "graph ingest failed for stored chunk"),
        }
    }

    tracing::info!(total = report.total, ingested = report.ingested, "graph ingest from vectors done");
    Ok(report)
}

/// Nested `metadata` overlaid with the top-level enrichment fields.
fn hint_source(payload: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = payload
        .get("metadata")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    for key in [
        "country",
        "policy_type",
        "clause_type",
        "summary",
        "keywords",
        "extracted_requirements",
    ] {
        if let Some(v) = payload.get(key) {
            merged.insert(key.to_string(), v.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn extracts_statements_from_fenced_output() {
        let raw = "```cypher\nMERGE (c:Country {name: \"France\"});\nMERGE (p:PolicyType {name: \"Auto\"});\n```";
        assert_eq!(
            extract_cypher_statements(raw).unwrap(),
            vec![
                "MERGE (c:Country {name: \"France\"})",
                "MERGE (p:PolicyType {name: \"Auto\"})"
            ]
        );
    }

    #[test]
    fn drops_prose_and_unknown_keywords() {
        let raw = "Here is the Cypher you asked for;\nmerge (a:Regulation {name: \"X\"});\nDELETE n";
        assert_eq!(
            extract_cypher_statements(raw).unwrap(),
            vec!["merge (a:Regulation {name: \"X\"})"]
        );
    }

    #[test]
    fn repairs_bare_labels_and_dangling_relationships() {
        assert_eq!(
            extract_cypher_statements("MERGE :Country").unwrap(),
            vec!["MERGE (:Country)"]
        );
        assert_eq!(
            extract_cypher_statements("MERGE (a:Regulation {name: \"X\"}) :APPLIES_TO").unwrap(),
            vec!["MERGE (a:Regulation {name: \"X\"})"]
        );
    }

    #[test]
    fn drops_arrowless_relationship_chains() {
        let raw = "MERGE (a:Regulation {name: \"X\"} :RELATED_TO :Concept)";
        assert!(extract_cypher_statements(raw).unwrap().is_empty());
    }

    #[test]
    fn commit_response_rows_are_keyed_by_column() {
        let json = json!({
            "results": [{
                "columns": ["a", "r"],
                "data": [{ "row": [{ "name": "X" }, null] }]
            }],
            "errors": []
        });
        let rows = parse_commit_response(&json).unwrap();
        assert_eq!(rows, vec![json!({ "a": { "name": "X" }, "r": null })]);
    }

    #[test]
    fn commit_response_errors_fail() {
        let json = json!({
            "results": [],
            "errors": [{ "code": "Neo.ClientError.Statement.SyntaxError", "message": "bad" }]
        });
        let err = parse_commit_response(&json).unwrap_err();
        assert!(err.to_string().contains("SyntaxError"));
    }

    struct FixedLlm(&'static str);

    #[async_trait]
    impl TextGenerator for FixedLlm {
        fn model_name(&self) -> &str {
            "fixed"
        }
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    /// Fails any statement containing `FAIL`, records the rest.
    #[derive(Default)]
    struct RecordingGraph(Mutex<Vec<String>>);

    #[async_trait]
    impl GraphStore for RecordingGraph {
        fn kind(&self) -> &str {
            "recording"
        }
        async fn run(&self, cypher: &str, _params: Map<String, Value>) -> Result<Vec<Value>> {
            if cypher.contains("FAIL") {
                bail!("constraint violation");
            }
            self.0.lock().unwrap().push(cypher.to_string());
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn partial_success_counts_as_success() {
        let llm = FixedLlm("MERGE (a:FAIL); MERGE (b:Country {name: \"Tunisia\"})");
        let graph = RecordingGraph::default();
        let ok = ingest_chunk(&llm, &graph, "text", &GraphHints::default())
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(graph.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn nothing_applied_is_failure() {
        let graph = RecordingGraph::default();
        let none = ingest_chunk(&FixedLlm("I cannot help."), &graph, "t", &GraphHints::default())
            .await
            .unwrap();
        assert!(!none);
        let all_fail = ingest_chunk(&FixedLlm("MERGE (a:FAIL)"), &graph, "t", &GraphHints::default())
            .await
            .unwrap();
        assert!(!all_fail);
    }

    #[test]
    fn cypher_patterns_compile() {
        assert!(patterns().is_ok());
    }

    /// Answers with the prompt it was given.
    struct EchoLlm;

    #[async_trait]
    impl TextGenerator for EchoLlm {
        fn model_name(&self) -> &str {
            "echo"
        }
        async fn generate(&self, prompt: &str) -> Result<String> {
            Ok(prompt.to_string())
        }
    }

    /// Returns the same rows for every statement.
    struct FixedRows(Vec<Value>);

    #[async_trait]
    impl GraphStore for FixedRows {
        fn kind(&self) -> &str {
            "fixed"
        }
        async fn run(&self, _cypher: &str, _params: Map<String, Value>) -> Result<Vec<Value>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn summary_is_none_for_unknown_regulation() {
        let out = summarize_regulation(&FixedRows(Vec::new()), &EchoLlm, "Law 92-24")
            .await
            .unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn summary_prompt_carries_graph_rows() {
        let rows = vec![json!({
            "r": { "name": "Law 92-24" },
            "related_nodes": [{ "name": "Auto" }]
        })];
        let out = summarize_regulation(&FixedRows(rows), &EchoLlm, "Law 92-24")
            .await
            .unwrap()
            .unwrap();
        assert!(out.contains("Law 92-24"));
        assert!(out.contains("\"related_nodes\""));
    }

    #[tokio::test]
    async fn comparison_prompt_names_both_regulations() {
        let rows = vec![json!({
            "name": "Law 92-24",
            "relations": [{ "relation": "CONFLICTS_WITH", "other": { "name": "Solvency II" } }]
        })];
        let out = compare_regulations(&FixedRows(rows), &EchoLlm, "Law 92-24", "Solvency II")
            .await
            .unwrap();
        assert!(out.contains("Law 92-24"));
        assert!(out.contains("Solvency II"));
        assert!(out.contains("CONFLICTS_WITH"));
    }

    #[test]
    fn hint_source_prefers_top_level_fields() {
        let payload = json!({
            "text": "x",
            "country": "France",
            "metadata": { "country": "Unknown", "filename": "france/a.pdf" }
        });
        let merged = hint_source(payload.as_object().unwrap());
        assert_eq!(merged["country"], "France");
        assert_eq!(merged["filename"], "france/a.pdf");
    }
}
