//! Per-chunk enrichment.
//!
//! Each chunk gets five independent model calls (summary, keywords,
//! questions, requirements, classification) followed by one embedding call.
//! Model output is parsed through [`crate::model_output`], so a badly
//! formatted answer degrades a field instead of failing the chunk; only
//! transport errors from the model or embedder propagate.

use anyhow::{Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::embedding::{embed_query, Embedder};
use crate::llm::TextGenerator;
use crate::model_output;
use crate::models::{EnrichedChunk, SourceRef, TextChunk};
use crate::prompts;

/// Deterministic vector-store key for a chunk.
///
/// Derived from `(filename, chunk_index, first 64 chars of text)`, then
/// shaped as a UUID because Qdrant only accepts integer or UUID point ids.
/// Re-ingesting unchanged input always yields the same key.
pub fn chunk_id(filename: &str, index: i64, text: &str) -> String {
    let prefix: String = text.chars().take(64).collect();
    let digest = Sha256::digest(format!("{}-{}-{}", filename, index, prefix).as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    uuid::Uuid::from_bytes(bytes).to_string()
}

/// Enrich and embed one chunk.
pub async fn enrich_chunk(
    chunk: &TextChunk,
    llm: &dyn TextGenerator,
    embedder: &dyn Embedder,
) -> Result<EnrichedChunk> {
    let text = chunk.text.as_str();
    let filename = chunk.filename().to_string();
    let index = chunk.index();

    let summary = llm
        .generate(&prompts::summary(text))
        .await
        .context("summary generation failed")?;
    let keywords = model_output::keywords(
        &llm.generate(&prompts::keywords(text))
            .await
            .context("keyword extraction failed")?,
    );
    let questions = model_output::questions(
        &llm.generate(&prompts::questions(text))
            .await
            .context("question generation failed")?,
    );
    let extracted_requirements = model_output::requirements(
        &llm.generate(&prompts::requirements(text))
            .await
            .context("requirement extraction failed")?,
    );
    let (policy_type, clause_type) = model_output::classification(
        &llm.generate(&prompts::classification(text))
            .await
            .context("classification failed")?,
    );

    let embedding = embed_query(embedder, text)
        .await
        .context("chunk embedding failed")?;

    let meta = &chunk.metadata;
    let country = meta
        .get("country")
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
        .to_string();
    let source = SourceRef {
        document: filename.clone(),
        page: meta.get("page").and_then(Value::as_u64).map(|p| p as u32),
        section: meta
            .get("section")
            .and_then(Value::as_str)
            .map(str::to_string),
    };

    tracing::debug!(
        file = %filename,
        chunk = index,
        keywords = keywords.len(),
        requirements = extracted_requirements.len(),
        "chunk enriched"
    );

    Ok(EnrichedChunk {
        chunk_id: chunk_id(&filename, index, text),
        text: text.to_string(),
        summary: summary.trim().to_string(),
        keywords,
        questions,
        country,
        policy_type,
        clause_type,
        extracted_requirements,
        source,
        embedding,
        metadata: meta.clone(),
    })
}
