//! Prompt templates for the generation model.
//!
//! The wording is not part of any contract; only the requested output
//! shape matters, and every consumer tolerates the model ignoring it
//! (see [`crate::model_output`]).

use crate::models::EnrichedChunk;

/// Graph extraction sees at most this much chunk text...
pub const GRAPH_MAX_TEXT_CHARS: usize = 1500;
/// ...and this much of the chunk summary.
pub const GRAPH_MAX_SUMMARY_CHARS: usize = 500;

/// Truncate to at most `max` characters.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn summary(text: &str) -> String {
    format!(
        "Summarize the following insurance regulation text in a concise paragraph:\n\n{}",
        text
    )
}

pub fn keywords(text: &str) -> String {
    format!(
        "Extract the most important insurance and regulatory keywords from the following text. \
         Return ONLY a JSON array of strings.\n\n{}",
        text
    )
}

pub fn questions(text: &str) -> String {
    format!(
        "Write three to five questions that the following insurance regulation text answers. \
         Return ONLY a JSON array of question strings.\n\n{}",
        text
    )
}

pub fn requirements(text: &str) -> String {
    format!(
        "Extract any explicit requirements, obligations, or normative statements from the \
         following text. Return as a JSON array of requirement strings.\n\n{}",
        text
    )
}

pub fn classification(text: &str) -> String {
    format!(
        r#"Classify the following insurance regulation text.
policy_type must be one of: Auto, Health, Life, Property, General.
clause_type must be one of: Requirement, Coverage, Exclusion, Procedure, Definition.

Return ONLY a JSON object: {{"policy_type": "...", "clause_type": "..."}}

{}"#,
        text
    )
}

pub fn query_analysis(query: &str) -> String {
    format!(
        r#"You are a Gatekeeper and Analyzer AI.
Analyze the following user query:
"{}"

1. Validate intent: Is this related to insurance regulations? (Yes/No)
2. Classify:
   - "RAG" if it asks for specific facts.
   - "GraphRAG" if it asks for comparison, relationships, or complex reasoning (e.g., "compare", "how does X relate to Y").
3. Extract Entities: Region (e.g., Tunisia, Europe), Topic (e.g., Car, Health).

Return ONLY a valid JSON object:
{{
  "is_valid": true,
  "classification": "RAG" or "GraphRAG",
  "entities": {{
    "region": ["Region1"],
    "topic": "Topic"
  }}
}}"#,
        query
    )
}

pub fn summarize_results(query: &str, context: &str) -> String {
    format!(
        r#"You are an Expert Legal Summarizer.
User Query: "{}"

Context from Knowledge Base:
{}

Task:
Provide a clear, comprehensive answer.
If comparing, use a markdown table or bullet points.
Cite regulations where possible."#,
        query, context
    )
}

pub fn summarize_comparison(comparison_data: &str) -> String {
    format!(
        r#"You are an Expert Comparative Insurance Analyst.

Comparison Data:
{}

Task:
Summarize the key similarities and differences between the insurance policies or regulations.
Organize the summary with common requirements, requirements unique to each jurisdiction,
and key differences in coverage or obligations. Use markdown tables or structured lists."#,
        comparison_data
    )
}

pub fn summarize_gaps(reference: &str, analyzed: &str) -> String {
    format!(
        r#"You are an Expert Regulatory Gap Analyst.

Reference Policy (Baseline):
{}

Analyzed Policy:
{}

Task:
Identify gaps where the analyzed policy is missing requirements or coverage present in the
reference policy. Organize findings as critical gaps, secondary gaps, and strengths."#,
        reference, analyzed
    )
}

pub fn summarize_recommendations(analysis: &str, gaps: &str) -> String {
    format!(
        r#"You are an Expert Insurance Policy Advisor.

Current Policy Analysis:
{}

Identified Gaps:
{}

Task:
Provide actionable recommendations for policy improvements, grouped as
Priority 1 (critical), Priority 2 (important) and Priority 3 (optional).
Include specific language or clauses where possible."#,
        analysis, gaps
    )
}

/// Graph rows handed to the regulation summary and comparison prompts are
/// cut to this many characters.
pub const GRAPH_CONTEXT_MAX_CHARS: usize = 6000;

pub fn regulation_summary(name: &str, graph_rows: &str) -> String {
    format!(
        "Summarize the regulation \"{}\" based on the following knowledge-graph data. \
         Describe what it regulates, which policy types and clauses it applies to, and \
         its key obligations.\n\nGraph Data:\n{}",
        name,
        truncate_chars(graph_rows, GRAPH_CONTEXT_MAX_CHARS)
    )
}

pub fn regulation_comparison(policy_a: &str, policy_b: &str, graph_rows: &str) -> String {
    format!(
        "Compare the regulations \"{}\" and \"{}\" based on the knowledge-graph data \
         provided. Highlight conflicts and similarities.\n\nGraph Data:\n{}",
        policy_a,
        policy_b,
        truncate_chars(graph_rows, GRAPH_CONTEXT_MAX_CHARS)
    )
}

pub fn fusion_synthesis(summaries: &str, graph_evidence: &str) -> String {
    format!(
        "Given the following document summaries and graph evidence, produce a concise \
         comparison and identify gaps:\n\nDocument Summaries:\n{}\n\nGraph Evidence:\n{}\n\nAnswer:",
        summaries, graph_evidence
    )
}

/// Metadata the graph extractor uses to anchor nodes.
#[derive(Debug, Default, Clone)]
pub struct GraphHints {
    pub country: String,
    pub policy_type: String,
    pub clause_type: String,
    pub summary: String,
    pub keywords: Vec<String>,
    pub requirements: Vec<String>,
}

impl GraphHints {
    pub fn from_chunk(chunk: &EnrichedChunk) -> Self {
        Self {
            country: chunk.country.clone(),
            policy_type: chunk.policy_type.as_str().to_string(),
            clause_type: chunk.clause_type.as_str().to_string(),
            summary: chunk.summary.clone(),
            keywords: chunk.keywords.clone(),
            requirements: chunk.extracted_requirements.clone(),
        }
    }

    /// Read hints from a loose JSON metadata object, with defaults.
    pub fn from_metadata(meta: &serde_json::Map<String, serde_json::Value>) -> Self {
        let text = |key: &str, default: &str| {
            meta.get(key)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .unwrap_or(default)
                .to_string()
        };
        let list = |key: &str| -> Vec<String> {
            match meta.get(key) {
                Some(serde_json::Value::Array(items)) => items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
                Some(serde_json::Value::String(s)) if !s.is_empty() => vec![s.clone()],
                _ => Vec::new(),
            }
        };
        Self {
            country: text("country", "Unknown"),
            policy_type: text("policy_type", "General"),
            clause_type: text("clause_type", "Requirement"),
            summary: text("summary", ""),
            keywords: list("keywords"),
            requirements: list("extracted_requirements"),
        }
    }
}

pub fn graph_extraction(text: &str, hints: &GraphHints) -> String {
    let text = truncate_chars(text, GRAPH_MAX_TEXT_CHARS);
    let summary = truncate_chars(&hints.summary, GRAPH_MAX_SUMMARY_CHARS);
    format!(
        r#"You are a Neo4j Graph Agent. Output ONLY valid Cypher. No explanations, no markdown.

SCHEMA:
Node Labels: Regulation, Article, Obligation, Authority, Entity, Concept, PolicyType, Country, Requirement
Relationships: APPLIES_TO, REQUIRES, REGULATED_BY, RELATED_TO, COVERS, HAS_POLICY, MENTIONS

SYNTAX RULES (CRITICAL):
- Nodes MUST be in parentheses: MERGE (r:Regulation {{name: "X"}})
- Relationships use arrows: MERGE (a)-[:RELATED_TO]->(b)
- Use MERGE to avoid duplicates
- Separate statements with semicolons
- NO explanations, just Cypher

ENRICHED METADATA:
- Country: {country}
- Policy Type: {policy_type}
- Clause Type: {clause_type}
- Keywords: {keywords}
- Requirements: {requirements}

EXAMPLE OUTPUT:
MERGE (c:Country {{name: "{country}"}});
MERGE (p:PolicyType {{name: "{policy_type}"}});
MERGE (c)-[:HAS_POLICY]->(p);

INPUT TEXT (Summary):
{summary}

ORIGINAL TEXT (for context):
{text}

Generate Cypher:"#,
        country = hints.country,
        policy_type = hints.policy_type,
        clause_type = hints.clause_type,
        keywords = hints.keywords.join(", "),
        requirements = hints.requirements.join("; "),
        summary = summary,
        text = text,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_is_char_based() {
        assert_eq!(truncate_chars("éàü", 2), "éà");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn graph_prompt_truncates_text_and_summary() {
        let hints = GraphHints {
            summary: "s".repeat(900),
            ..Default::default()
        };
        let prompt = graph_extraction(&"t".repeat(4000), &hints);
        assert!(prompt.contains(&"t".repeat(GRAPH_MAX_TEXT_CHARS)));
        assert!(!prompt.contains(&"t".repeat(GRAPH_MAX_TEXT_CHARS + 1)));
        assert!(!prompt.contains(&"s".repeat(GRAPH_MAX_SUMMARY_CHARS + 1)));
    }

    #[test]
    fn hints_from_metadata_use_defaults() {
        let meta = serde_json::json!({ "country": "Tunisia", "keywords": ["prime", "sinistre"] });
        let hints = GraphHints::from_metadata(meta.as_object().unwrap());
        assert_eq!(hints.country, "Tunisia");
        assert_eq!(hints.policy_type, "General");
        assert_eq!(hints.clause_type, "Requirement");
        assert_eq!(hints.keywords, vec!["prime", "sinistre"]);
    }
}
