//! Query orchestration and the ingestion batch driver.
//!
//! A query moves through `Received → Classified → Retrieved → Summarized`
//! with no branching back. Classification only picks the retrieval path:
//!
//! | Route | Retrieval | Context prefix |
//! |-------|-----------|----------------|
//! | `RAG` | vector search, `rag_top_k` (3) | `RAG Context: ` |
//! | `GraphRAG` | retrieval fusion, `graph_top_k` (5); vector search on fusion failure | `GraphRAG Context: ` |
//!
//! The comparison phrasing of a query ("compare ...") does not change the
//! retrieval call.

use anyhow::Result;
use serde::Serialize;
use serde_json::{json, Value};

use crate::analyzer::{analyze_query, QueryAnalysis, QueryRoute};
use crate::fusion;
use crate::ingest::{ingest_document, DocumentOutcome};
use crate::rag;
use crate::summarizer::summarize_results;
use crate::traits::ToolContext;

#[derive(Debug, Clone, Serialize)]
pub struct PipelineAnswer {
    pub answer: String,
    pub analysis: QueryAnalysis,
    /// Character length of the assembled retrieval context.
    pub context_used: usize,
}

/// Answer one natural-language query.
pub async fn execute_pipeline(ctx: &ToolContext, query: &str) -> Result<PipelineAnswer> {
    tracing::info!(query, "planner: processing query");

    let analysis = analyze_query(ctx.llm.as_ref(), query).await?;

    let context = match analysis.classification {
        QueryRoute::GraphRag => {
            tracing::info!("planner: routing to GraphRAG");
            format!("GraphRAG Context: {}\n", graph_context(ctx, query).await?)
        }
        QueryRoute::Rag => {
            tracing::info!("planner: routing to RAG");
            let hits = rag::search(
                ctx.vectors.as_ref(),
                ctx.embedder.as_ref(),
                query,
                ctx.config.retrieval.rag_top_k,
            )
            .await?;
            format!("RAG Context: {}\n", serde_json::to_string(&hits)?)
        }
    };

    tracing::info!(context_chars = context.chars().count(), "planner: summarizing");
    let answer = summarize_results(ctx.llm.as_ref(), query, &context).await?;

    Ok(PipelineAnswer {
        answer,
        analysis,
        context_used: context.chars().count(),
    })
}

/// Fusion evidence for a GraphRAG query, or plain vector hits when fusion
/// is off or fails.
async fn graph_context(ctx: &ToolContext, query: &str) -> Result<String> {
    let top_k = ctx.config.retrieval.graph_top_k;

    if ctx.config.retrieval.graph_fusion {
        match fusion::retrieve(ctx, query, top_k).await {
            Ok(result) => {
                return Ok(json!({
                    "vector_hits": result.vector_hits,
                    "synthesis": result.synthesis,
                })
                .to_string());
            }
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "fusion failed, falling back to vector search");
            }
        }
    }

    let hits = rag::search(ctx.vectors.as_ref(), ctx.embedder.as_ref(), query, top_k).await?;
    Ok(serde_json::to_string(&hits)?)
}

/// Run every pending document through the ingestion pipeline.
///
/// Documents are processed in store order. One document's failure never
/// aborts the batch; each produces a `Processed <file>`, `Failed <file>` or
/// `Skipped <file>` entry.
pub async fn ingest_pending_documents(ctx: &ToolContext) -> Result<Value> {
    let pending = ctx.metadata.list_pending().await?;

    if pending.is_empty() {
        return Ok(json!({ "status": "No pending documents." }));
    }
    tracing::info!(documents = pending.len(), "planner: starting ingestion");

    let mut details = Vec::with_capacity(pending.len());
    for doc in &pending {
        let line = match ingest_document(ctx, doc).await {
            Ok(DocumentOutcome::Processed { .. }) => format!("Processed {}", doc.filename),
            Ok(DocumentOutcome::Skipped) => format!("Skipped {}", doc.filename),
            Ok(DocumentOutcome::Failed { .. }) => format!("Failed {}", doc.filename),
            Err(e) => {
                // The metadata store itself failed; the record may be left in `processing`.
                tracing::error!(file = %doc.filename, error = %format!("{:#}", e), "status update failed");
                format!("Failed {}", doc.filename)
            }
        };
        details.push(line);
    }

    Ok(json!({ "status": "Ingestion Complete", "details": details }))
}
