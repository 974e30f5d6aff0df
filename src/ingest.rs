//! Per-document ingestion pipeline.
//!
//! One pending document goes through these stages, strictly in order:
//!
//! ```text
//! claim (pending → processing)
//!   → download → extract text → chunk
//!   → enrich + embed (per chunk, in chunk order)
//!   → vector upsert (keyed by chunk_id)
//!   → graph ingest (best effort)
//!   → processed + chunks_count
//! ```
//!
//! Any stage failure is caught at the document boundary: the record moves
//! to `error` with the message, and the caller moves on to the next
//! document. A crash mid-pipeline leaves the record in `processing`.
//!
//! Also hosts the legacy path (`process_new_files`), which keys progress on
//! the processed-files marker set instead of the metadata store.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::PathBuf;

use crate::chunk::chunk_document;
use crate::enrich::enrich_chunk;
use crate::extract::read_document_text;
use crate::graph;
use crate::metadata::MetadataUpdate;
use crate::models::{DocStatus, DocumentRecord, EnrichedChunk};
use crate::prompts::GraphHints;
use crate::rag;
use crate::storage::{discard_download, download_to, infer_country};
use crate::traits::ToolContext;

/// Result of running one document through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    Processed { chunks: usize },
    Failed { error: String },
    /// Another run claimed the document first.
    Skipped,
}

/// Claim `record` and run every stage, recording the outcome in the
/// metadata store.
pub async fn ingest_document(ctx: &ToolContext, record: &DocumentRecord) -> Result<DocumentOutcome> {
    if !ctx.metadata.claim(&record.id).await? {
        tracing::info!(file = %record.filename, "document already claimed, skipping");
        return Ok(DocumentOutcome::Skipped);
    }
    tracing::info!(file = %record.filename, stage = "processing", "ingesting document");

    match run_stages(ctx, record).await {
        Ok(chunks) => {
            let update = MetadataUpdate {
                status: Some(DocStatus::Processed),
                chunks_count: Some(chunks as i64),
                ..Default::default()
            };
            ctx.metadata.update(&record.id, update).await?;
            tracing::info!(file = %record.filename, chunks, stage = "processed", "document ingested");
            Ok(DocumentOutcome::Processed { chunks })
        }
        Err(e) => {
            let error = format!("{:#}", e);
            tracing::error!(file = %record.filename, error = %error, stage = "error", "document failed");
            let update = MetadataUpdate {
                status: Some(DocStatus::Error),
                error: Some(error.clone()),
                ..Default::default()
            };
            ctx.metadata.update(&record.id, update).await?;
            Ok(DocumentOutcome::Failed { error })
        }
    }
}

/// Download through vector upsert; returns the chunk count.
async fn run_stages(ctx: &ToolContext, record: &DocumentRecord) -> Result<usize> {
    let text = fetch_text(ctx, &record.filename).await?;

    let mut meta = Map::new();
    meta.insert("filename".into(), Value::from(record.filename.as_str()));
    meta.insert("country".into(), Value::from(record.country.as_str()));
    meta.insert("doc_type".into(), Value::from(record.doc_type.as_str()));

    let enriched = enrich_and_index(ctx, &record.filename, &text, &meta).await?;

    if ctx.config.graph.ingest_on_pipeline {
        ingest_graph(ctx, &record.filename, &enriched).await;
    }

    Ok(enriched.len())
}

/// Download `key` and extract its text; empty text is a failure.
async fn fetch_text(ctx: &ToolContext, key: &str) -> Result<String> {
    let path = download_to(
        ctx.storage.as_ref(),
        key,
        &ctx.config.storage.download_dir,
    )
    .await
    .context("Download failed")?;
    tracing::debug!(file = %key, stage = "downloaded", path = %path.display());

    let text = match read_document_text(&path).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(file = %key, error = %e, "text extraction failed");
            String::new()
        }
    };
    discard_download(&path).await;
    if text.trim().is_empty() {
        bail!("Empty or unreadable text");
    }
    tracing::debug!(file = %key, stage = "extracted", chars = text.chars().count());
    Ok(text)
}

/// Chunk, enrich every chunk in order, then upsert the batch.
async fn enrich_and_index(
    ctx: &ToolContext,
    filename: &str,
    text: &str,
    meta: &Map<String, Value>,
) -> Result<Vec<EnrichedChunk>> {
    let chunks = chunk_document(text, meta, &ctx.config.chunking);
    tracing::info!(file = %filename, chunks = chunks.len(), stage = "chunked");

    let mut enriched = Vec::with_capacity(chunks.len());
    for chunk in &chunks {
        let e = enrich_chunk(chunk, ctx.llm.as_ref(), ctx.embedder.as_ref())
            .await
            .with_context(|| format!("enrichment failed for chunk {}", chunk.index()))?;
        enriched.push(e);
    }
    tracing::debug!(file = %filename, stage = "enriched");

    rag::index_enriched(
        ctx.vectors.as_ref(),
        &enriched,
        ctx.config.vector.upsert_batch_size,
    )
    .await?;
    tracing::debug!(file = %filename, stage = "indexed");

    Ok(enriched)
}

/// Graph-ingest each chunk. Failures are logged and never fail the document.
async fn ingest_graph(ctx: &ToolContext, filename: &str, chunks: &[EnrichedChunk]) {
    let mut applied = 0usize;
    let mut failed = 0usize;

    for (i, chunk) in chunks.iter().enumerate() {
        if i % 10 == 0 {
            tracing::debug!(file = %filename, chunk = i + 1, total = chunks.len(), "graph ingest");
        }
        let hints = GraphHints::from_chunk(chunk);
        match graph::ingest_chunk(ctx.llm.as_ref(), ctx.graph.as_ref(), &chunk.text, &hints).await {
            Ok(true) => applied += 1,
            Ok(false) => failed += 1,
            Err(e) => {
                failed += 1;
                tracing::warn!(file = %filename, error = %format!("{:#}", e), "graph ingest failed");
            }
        }
    }

    tracing::info!(file = %filename, applied, failed, stage = "graph", "graph ingest done");
}

// ═══════════════════════════════════════════════════════════════════════
// Legacy processed-files path
// ═══════════════════════════════════════════════════════════════════════

/// Per-file result of [`process_new_files`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FileReport {
    pub status: String,
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks_indexed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Index every `.pdf` object not yet in the processed-files set.
///
/// Works independently of document status. A file that fails is reported
/// and left unmarked so the next run retries it.
pub async fn process_new_files(ctx: &ToolContext) -> Result<Vec<FileReport>> {
    let listing = ctx.storage.list().await?;
    let mut reports = Vec::new();

    for obj in listing {
        if !obj.filename.to_ascii_lowercase().ends_with(".pdf") {
            continue;
        }
        if ctx.metadata.is_file_processed(&obj.filename).await? {
            continue;
        }

        let report = match process_file(ctx, &obj.filename).await {
            Ok(Some(chunks)) => {
                ctx.metadata.mark_file_processed(&obj.filename).await?;
                FileReport {
                    status: "processed".into(),
                    file: obj.filename,
                    chunks_indexed: Some(chunks),
                    error: None,
                }
            }
            Ok(None) => FileReport {
                status: "no_docs".into(),
                file: obj.filename,
                chunks_indexed: None,
                error: None,
            },
            Err(e) => {
                let error = format!("{:#}", e);
                tracing::warn!(file = %obj.filename, error = %error, "legacy ingest failed");
                FileReport {
                    status: "error".into(),
                    file: obj.filename,
                    chunks_indexed: None,
                    error: Some(error),
                }
            }
        };
        reports.push(report);
    }

    Ok(reports)
}

/// `None` when the file has no extractable text.
async fn process_file(ctx: &ToolContext, key: &str) -> Result<Option<usize>> {
    let path: PathBuf = download_to(
        ctx.storage.as_ref(),
        key,
        &ctx.config.storage.download_dir,
    )
    .await
    .context("Download failed")?;

    let text = read_document_text(&path).await.unwrap_or_default();
    discard_download(&path).await;
    if text.trim().is_empty() {
        return Ok(None);
    }

    let meta = json!({ "filename": key, "country": infer_country(key).as_str() });
    let meta = meta.as_object().cloned().unwrap_or_default();
    let enriched = enrich_and_index(ctx, key, &text, &meta).await?;
    Ok(Some(enriched.len()))
}
