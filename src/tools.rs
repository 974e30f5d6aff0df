//! The built-in tool catalogue.
//!
//! Each tool is a thin adapter: it deserializes its bound parameters into a
//! `deny_unknown_fields` struct and delegates to the module that owns the
//! behaviour. Tools are grouped the way agents divide the work:
//!
//! | Group | Tools |
//! |-------|-------|
//! | Document access | `list_documents`, `get_document_content`, `read_document_text`, `sync_metadata`, `update_doc_metadata`, `list_metadata` |
//! | RAG | `rag_search`, `chunk_document`, `rag_ingest_chunks`, `rag_ingest` |
//! | GraphRAG | `graph_query`, `graph_compare`, `graph_compare_narrative`, `graph_summarize`, `graph_ingest_chunk`, `graph_ingest_from_qdrant`, `graph_retrieve_fusion` |
//! | Analyzer | `analyze_query`, `analyzer.process_new_files` |
//! | Summarizer | `summarize_results`, `summarize_comparison`, `summarize_gaps`, `summarize_recommendations` |
//! | Planner | `execute_pipeline`, `ingest_documents` |

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::analyzer::analyze_query;
use crate::chunk::chunk_document;
use crate::extract::read_document_text;
use crate::fusion;
use crate::graph;
use crate::ingest::process_new_files;
use crate::metadata::MetadataUpdate;
use crate::models::TextChunk;
use crate::planner;
use crate::prompts::GraphHints;
use crate::rag;
use crate::storage::download_to;
use crate::summarizer;
use crate::traits::{ParamKind, ParamSpec, Tool, ToolContext};

/// Every built-in tool, in registration order.
pub fn builtin_tools() -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(ListDocumentsTool),
        Box::new(GetDocumentContentTool),
        Box::new(ReadDocumentTextTool),
        Box::new(SyncMetadataTool),
        Box::new(UpdateDocMetadataTool),
        Box::new(ListMetadataTool),
        Box::new(RagSearchTool),
        Box::new(ChunkDocumentTool),
        Box::new(RagIngestChunksTool),
        Box::new(RagIngestTool),
        Box::new(GraphQueryTool),
        Box::new(GraphCompareTool),
        Box::new(GraphCompareNarrativeTool),
        Box::new(GraphSummarizeTool),
        Box::new(GraphIngestChunkTool),
        Box::new(GraphIngestFromQdrantTool),
        Box::new(GraphRetrieveFusionTool),
        Box::new(AnalyzeQueryTool),
        Box::new(ProcessNewFilesTool),
        Box::new(SummarizeResultsTool),
        Box::new(SummarizeComparisonTool),
        Box::new(SummarizeGapsTool),
        Box::new(SummarizeRecommendationsTool),
        Box::new(ExecutePipelineTool),
        Box::new(IngestDocumentsTool),
    ]
}

fn parse<T: DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params).context("invalid parameters")
}

const NO_PARAMS: &[ParamSpec] = &[];

/// Parameters of tools that take nothing.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Empty {}

// ═══════════════════════════════════════════════════════════════════════
// Document access
// ═══════════════════════════════════════════════════════════════════════

pub struct ListDocumentsTool;

#[async_trait]
impl Tool for ListDocumentsTool {
    fn name(&self) -> &str {
        "list_documents"
    }
    fn description(&self) -> &str {
        "List all regulatory documents available in object storage"
    }
    fn params(&self) -> &'static [ParamSpec] {
        NO_PARAMS
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let Empty {} = parse(params)?;
        Ok(serde_json::to_value(ctx.storage.list().await?)?)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FilenameParams {
    filename: String,
}

pub struct GetDocumentContentTool;

#[async_trait]
impl Tool for GetDocumentContentTool {
    fn name(&self) -> &str {
        "get_document_content"
    }
    fn description(&self) -> &str {
        "Download a document to a local path and return the path (empty on failure)"
    }
    fn params(&self) -> &'static [ParamSpec] {
        const PARAMS: &[ParamSpec] = &[ParamSpec::required(
            "filename",
            ParamKind::String,
            "Object key of the document",
        )];
        PARAMS
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let p: FilenameParams = parse(params)?;
        let dir = &ctx.config.storage.download_dir;
        match download_to(ctx.storage.as_ref(), &p.filename, dir).await {
            Ok(path) => Ok(Value::from(path.display().to_string())),
            Err(e) => {
                tracing::warn!(file = %p.filename, error = %format!("{:#}", e), "download failed");
                Ok(Value::from(""))
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FilePathParams {
    file_path: PathBuf,
}

pub struct ReadDocumentTextTool;

#[async_trait]
impl Tool for ReadDocumentTextTool {
    fn name(&self) -> &str {
        "read_document_text"
    }
    fn description(&self) -> &str {
        "Extract text from a local PDF, DOCX or text file (empty when unreadable)"
    }
    fn params(&self) -> &'static [ParamSpec] {
        const PARAMS: &[ParamSpec] = &[ParamSpec::required(
            "file_path",
            ParamKind::String,
            "Local file path",
        )];
        PARAMS
    }
    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<Value> {
        let p: FilePathParams = parse(params)?;
        match read_document_text(&p.file_path).await {
            Ok(text) => Ok(Value::from(text)),
            Err(e) => {
                tracing::warn!(path = %p.file_path.display(), error = %e, "could not read document");
                Ok(Value::from(""))
            }
        }
    }
}

pub struct SyncMetadataTool;

#[async_trait]
impl Tool for SyncMetadataTool {
    fn name(&self) -> &str {
        "sync_metadata"
    }
    fn description(&self) -> &str {
        "Sync the metadata store with object storage and return every record"
    }
    fn params(&self) -> &'static [ParamSpec] {
        NO_PARAMS
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let Empty {} = parse(params)?;
        let records = ctx.metadata.sync(ctx.storage.as_ref()).await?;
        Ok(serde_json::to_value(records)?)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateParams {
    doc_id: String,
    updates: MetadataUpdate,
}

pub struct UpdateDocMetadataTool;

#[async_trait]
impl Tool for UpdateDocMetadataTool {
    fn name(&self) -> &str {
        "update_doc_metadata"
    }
    fn description(&self) -> &str {
        "Merge fields into a document record; false if the id is unknown"
    }
    fn params(&self) -> &'static [ParamSpec] {
        const PARAMS: &[ParamSpec] = &[
            ParamSpec::required("doc_id", ParamKind::String, "Document id"),
            ParamSpec::required(
                "updates",
                ParamKind::Object,
                "Fields to set: country, doc_type, visibility, status, chunks_count, error",
            ),
        ];
        PARAMS
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let p: UpdateParams = parse(params)?;
        Ok(Value::from(ctx.metadata.update(&p.doc_id, p.updates).await?))
    }
}

pub struct ListMetadataTool;

#[async_trait]
impl Tool for ListMetadataTool {
    fn name(&self) -> &str {
        "list_metadata"
    }
    fn description(&self) -> &str {
        "List every document metadata record"
    }
    fn params(&self) -> &'static [ParamSpec] {
        NO_PARAMS
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let Empty {} = parse(params)?;
        Ok(serde_json::to_value(ctx.metadata.list().await?)?)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// RAG
// ═══════════════════════════════════════════════════════════════════════

const DEFAULT_TOOL_TOP_K: usize = 5;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchParams {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
}

const SEARCH_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("query", ParamKind::String, "Natural-language query"),
    ParamSpec::optional("top_k", ParamKind::Integer, "Number of hits (default 5)"),
];

pub struct RagSearchTool;

#[async_trait]
impl Tool for RagSearchTool {
    fn name(&self) -> &str {
        "rag_search"
    }
    fn description(&self) -> &str {
        "Semantic search over the indexed regulation chunks"
    }
    fn params(&self) -> &'static [ParamSpec] {
        SEARCH_PARAMS
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let p: SearchParams = parse(params)?;
        let hits = rag::search(
            ctx.vectors.as_ref(),
            ctx.embedder.as_ref(),
            &p.query,
            p.top_k.unwrap_or(DEFAULT_TOOL_TOP_K),
        )
        .await?;
        Ok(serde_json::to_value(hits)?)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TextParams {
    text: String,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

const TEXT_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("text", ParamKind::String, "Document or chunk text"),
    ParamSpec::optional("metadata", ParamKind::Object, "Metadata attached to every chunk"),
];

pub struct ChunkDocumentTool;

#[async_trait]
impl Tool for ChunkDocumentTool {
    fn name(&self) -> &str {
        "chunk_document"
    }
    fn description(&self) -> &str {
        "Split text into ordered chunks carrying the given metadata"
    }
    fn params(&self) -> &'static [ParamSpec] {
        TEXT_PARAMS
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let p: TextParams = parse(params)?;
        let chunks = chunk_document(
            &p.text,
            &p.metadata.unwrap_or_default(),
            &ctx.config.chunking,
        );
        Ok(serde_json::to_value(chunks)?)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ChunksParams {
    chunks: Vec<TextChunk>,
}

async fn index_chunks(ctx: &ToolContext, chunks: &[TextChunk]) -> Result<Value> {
    let ok = rag::ingest_chunks(
        ctx.vectors.as_ref(),
        ctx.embedder.as_ref(),
        chunks,
        ctx.config.vector.upsert_batch_size,
        ctx.config.embedding.batch_size,
    )
    .await?;
    Ok(Value::from(ok))
}

pub struct RagIngestChunksTool;

#[async_trait]
impl Tool for RagIngestChunksTool {
    fn name(&self) -> &str {
        "rag_ingest_chunks"
    }
    fn description(&self) -> &str {
        "Embed and index pre-chunked text"
    }
    fn params(&self) -> &'static [ParamSpec] {
        const PARAMS: &[ParamSpec] = &[ParamSpec::required(
            "chunks",
            ParamKind::Array,
            "Chunks as {text, metadata} objects",
        )];
        PARAMS
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let p: ChunksParams = parse(params)?;
        index_chunks(ctx, &p.chunks).await
    }
}

pub struct RagIngestTool;

#[async_trait]
impl Tool for RagIngestTool {
    fn name(&self) -> &str {
        "rag_ingest"
    }
    fn description(&self) -> &str {
        "Chunk text and index the chunks"
    }
    fn params(&self) -> &'static [ParamSpec] {
        TEXT_PARAMS
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let p: TextParams = parse(params)?;
        let chunks = chunk_document(
            &p.text,
            &p.metadata.unwrap_or_default(),
            &ctx.config.chunking,
        );
        index_chunks(ctx, &chunks).await
    }
}

// ═══════════════════════════════════════════════════════════════════════
// GraphRAG
// ═══════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CypherParams {
    cypher_query: String,
}

pub struct GraphQueryTool;

#[async_trait]
impl Tool for GraphQueryTool {
    fn name(&self) -> &str {
        "graph_query"
    }
    fn description(&self) -> &str {
        "Run a Cypher query against the knowledge graph"
    }
    fn params(&self) -> &'static [ParamSpec] {
        const PARAMS: &[ParamSpec] = &[ParamSpec::required(
            "cypher_query",
            ParamKind::String,
            "Cypher statement",
        )];
        PARAMS
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let p: CypherParams = parse(params)?;
        let rows = ctx.graph.run(&p.cypher_query, Map::new()).await?;
        Ok(Value::Array(rows))
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CompareParams {
    policy_a: String,
    policy_b: String,
}

pub struct GraphCompareTool;

#[async_trait]
impl Tool for GraphCompareTool {
    fn name(&self) -> &str {
        "graph_compare"
    }
    fn description(&self) -> &str {
        "Look up two Regulation nodes by name and any relationship between them"
    }
    fn params(&self) -> &'static [ParamSpec] {
        const PARAMS: &[ParamSpec] = &[
            ParamSpec::required("policy_a", ParamKind::String, "First regulation name"),
            ParamSpec::required("policy_b", ParamKind::String, "Second regulation name"),
        ];
        PARAMS
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let p: CompareParams = parse(params)?;
        let out = graph::compare(ctx.graph.as_ref(), &p.policy_a, &p.policy_b).await?;
        Ok(Value::from(out))
    }
}

pub struct GraphCompareNarrativeTool;

#[async_trait]
impl Tool for GraphCompareNarrativeTool {
    fn name(&self) -> &str {
        "graph_compare_narrative"
    }
    fn description(&self) -> &str {
        "Compare two regulations from their conflict and similarity edges, narrated by the model"
    }
    fn params(&self) -> &'static [ParamSpec] {
        const PARAMS: &[ParamSpec] = &[
            ParamSpec::required("policy_a", ParamKind::String, "First regulation name"),
            ParamSpec::required("policy_b", ParamKind::String, "Second regulation name"),
        ];
        PARAMS
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let p: CompareParams = parse(params)?;
        let out = graph::compare_regulations(
            ctx.graph.as_ref(),
            ctx.llm.as_ref(),
            &p.policy_a,
            &p.policy_b,
        )
        .await?;
        Ok(Value::from(out))
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RegulationParams {
    regulation_name: String,
}

pub struct GraphSummarizeTool;

#[async_trait]
impl Tool for GraphSummarizeTool {
    fn name(&self) -> &str {
        "graph_summarize"
    }
    fn description(&self) -> &str {
        "Summarize a regulation from its knowledge-graph neighbourhood (null when not found)"
    }
    fn params(&self) -> &'static [ParamSpec] {
        const PARAMS: &[ParamSpec] = &[ParamSpec::required(
            "regulation_name",
            ParamKind::String,
            "Name of the Regulation node",
        )];
        PARAMS
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let p: RegulationParams = parse(params)?;
        let summary =
            graph::summarize_regulation(ctx.graph.as_ref(), ctx.llm.as_ref(), &p.regulation_name)
                .await?;
        Ok(summary.map(Value::from).unwrap_or(Value::Null))
    }
}

pub struct GraphIngestChunkTool;

#[async_trait]
impl Tool for GraphIngestChunkTool {
    fn name(&self) -> &str {
        "graph_ingest_chunk"
    }
    fn description(&self) -> &str {
        "Extract entities and relationships from text into the knowledge graph"
    }
    fn params(&self) -> &'static [ParamSpec] {
        TEXT_PARAMS
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let p: TextParams = parse(params)?;
        let hints = GraphHints::from_metadata(&p.metadata.unwrap_or_default());
        let ok = graph::ingest_chunk(ctx.llm.as_ref(), ctx.graph.as_ref(), &p.text, &hints).await?;
        Ok(Value::from(ok))
    }
}

pub struct GraphIngestFromQdrantTool;

#[async_trait]
impl Tool for GraphIngestFromQdrantTool {
    fn name(&self) -> &str {
        "graph_ingest_from_qdrant"
    }
    fn description(&self) -> &str {
        "Feed every indexed chunk through the graph builder"
    }
    fn params(&self) -> &'static [ParamSpec] {
        NO_PARAMS
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let Empty {} = parse(params)?;
        let report = graph::ingest_from_vectors(
            ctx.llm.as_ref(),
            ctx.graph.as_ref(),
            ctx.vectors.as_ref(),
        )
        .await?;
        Ok(serde_json::to_value(report)?)
    }
}

pub struct GraphRetrieveFusionTool;

#[async_trait]
impl Tool for GraphRetrieveFusionTool {
    fn name(&self) -> &str {
        "graph_retrieve_fusion"
    }
    fn description(&self) -> &str {
        "Vector retrieval plus graph neighbourhood expansion, with a synthesis"
    }
    fn params(&self) -> &'static [ParamSpec] {
        SEARCH_PARAMS
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let p: SearchParams = parse(params)?;
        let result = fusion::retrieve(ctx, &p.query, p.top_k.unwrap_or(DEFAULT_TOOL_TOP_K)).await?;
        Ok(serde_json::to_value(result)?)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Analyzer
// ═══════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct QueryParams {
    query: String,
}

const QUERY_PARAMS: &[ParamSpec] = &[ParamSpec::required(
    "query",
    ParamKind::String,
    "Natural-language query",
)];

pub struct AnalyzeQueryTool;

#[async_trait]
impl Tool for AnalyzeQueryTool {
    fn name(&self) -> &str {
        "analyze_query"
    }
    fn description(&self) -> &str {
        "Validate a query and classify it as RAG or GraphRAG, extracting regions and topic"
    }
    fn params(&self) -> &'static [ParamSpec] {
        QUERY_PARAMS
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let p: QueryParams = parse(params)?;
        let analysis = analyze_query(ctx.llm.as_ref(), &p.query).await?;
        Ok(serde_json::to_value(analysis)?)
    }
}

pub struct ProcessNewFilesTool;

#[async_trait]
impl Tool for ProcessNewFilesTool {
    fn name(&self) -> &str {
        "analyzer.process_new_files"
    }
    fn description(&self) -> &str {
        "Index every PDF not yet in the processed-files set (legacy ingestion path)"
    }
    fn params(&self) -> &'static [ParamSpec] {
        NO_PARAMS
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let Empty {} = parse(params)?;
        Ok(serde_json::to_value(process_new_files(ctx).await?)?)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Summarizer
// ═══════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ResultsParams {
    query: String,
    context: String,
}

pub struct SummarizeResultsTool;

#[async_trait]
impl Tool for SummarizeResultsTool {
    fn name(&self) -> &str {
        "summarize_results"
    }
    fn description(&self) -> &str {
        "Answer a query from retrieved context"
    }
    fn params(&self) -> &'static [ParamSpec] {
        const PARAMS: &[ParamSpec] = &[
            ParamSpec::required("query", ParamKind::String, "User query"),
            ParamSpec::required("context", ParamKind::String, "Retrieved context"),
        ];
        PARAMS
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let p: ResultsParams = parse(params)?;
        let answer = summarizer::summarize_results(ctx.llm.as_ref(), &p.query, &p.context).await?;
        Ok(Value::from(answer))
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ComparisonParams {
    comparison_data: String,
}

pub struct SummarizeComparisonTool;

#[async_trait]
impl Tool for SummarizeComparisonTool {
    fn name(&self) -> &str {
        "summarize_comparison"
    }
    fn description(&self) -> &str {
        "Summarize similarities and differences between policies or jurisdictions"
    }
    fn params(&self) -> &'static [ParamSpec] {
        const PARAMS: &[ParamSpec] = &[ParamSpec::required(
            "comparison_data",
            ParamKind::String,
            "Comparison material",
        )];
        PARAMS
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let p: ComparisonParams = parse(params)?;
        let out = summarizer::summarize_comparison(ctx.llm.as_ref(), &p.comparison_data).await?;
        Ok(Value::from(out))
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GapsParams {
    reference: String,
    analyzed: String,
}

pub struct SummarizeGapsTool;

#[async_trait]
impl Tool for SummarizeGapsTool {
    fn name(&self) -> &str {
        "summarize_gaps"
    }
    fn description(&self) -> &str {
        "Identify gaps of an analyzed policy against a reference policy"
    }
    fn params(&self) -> &'static [ParamSpec] {
        const PARAMS: &[ParamSpec] = &[
            ParamSpec::required("reference", ParamKind::String, "Baseline policy"),
            ParamSpec::required("analyzed", ParamKind::String, "Policy under review"),
        ];
        PARAMS
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let p: GapsParams = parse(params)?;
        let out = summarizer::summarize_gaps(ctx.llm.as_ref(), &p.reference, &p.analyzed).await?;
        Ok(Value::from(out))
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RecommendationParams {
    analysis: String,
    gaps: String,
}

pub struct SummarizeRecommendationsTool;

#[async_trait]
impl Tool for SummarizeRecommendationsTool {
    fn name(&self) -> &str {
        "summarize_recommendations"
    }
    fn description(&self) -> &str {
        "Prioritized recommendations from a policy analysis and its gaps"
    }
    fn params(&self) -> &'static [ParamSpec] {
        const PARAMS: &[ParamSpec] = &[
            ParamSpec::required("analysis", ParamKind::String, "Current policy analysis"),
            ParamSpec::required("gaps", ParamKind::String, "Identified gaps"),
        ];
        PARAMS
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let p: RecommendationParams = parse(params)?;
        let out =
            summarizer::summarize_recommendations(ctx.llm.as_ref(), &p.analysis, &p.gaps).await?;
        Ok(Value::from(out))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Planner
// ═══════════════════════════════════════════════════════════════════════

pub struct ExecutePipelineTool;

#[async_trait]
impl Tool for ExecutePipelineTool {
    fn name(&self) -> &str {
        "execute_pipeline"
    }
    fn description(&self) -> &str {
        "Answer a query: classify, retrieve, summarize"
    }
    fn params(&self) -> &'static [ParamSpec] {
        QUERY_PARAMS
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let p: QueryParams = parse(params)?;
        let answer = planner::execute_pipeline(ctx, &p.query).await?;
        Ok(serde_json::to_value(answer)?)
    }
}

pub struct IngestDocumentsTool;

#[async_trait]
impl Tool for IngestDocumentsTool {
    fn name(&self) -> &str {
        "ingest_documents"
    }
    fn description(&self) -> &str {
        "Ingest every pending document and report per-document outcomes"
    }
    fn params(&self) -> &'static [ParamSpec] {
        NO_PARAMS
    }
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let Empty {} = parse(params)?;
        planner::ingest_pending_documents(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn names_are_unique() {
        let tools = builtin_tools();
        let mut names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        names.sort();
        let before = names.len();
        names.dedup();
        assert_eq!(before, names.len());
    }

    #[test]
    fn legacy_ingest_keeps_its_namespaced_name() {
        let tools = builtin_tools();
        let names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        assert!(names.contains(&"analyzer.process_new_files"));
        assert!(!names.contains(&"process_new_files"));
        assert!(names.contains(&"graph_summarize"));
        assert!(names.contains(&"graph_compare_narrative"));
    }

    #[test]
    fn params_reject_unknown_fields() {
        assert!(parse::<QueryParams>(json!({ "query": "q", "extra": 1 })).is_err());
        assert!(parse::<Empty>(json!({})).is_ok());
        assert!(parse::<Empty>(json!({ "x": 1 })).is_err());
    }

    #[test]
    fn optional_params_may_be_null() {
        let p: SearchParams = parse(json!({ "query": "q", "top_k": null })).unwrap();
        assert_eq!(p.top_k, None);
        let p: TextParams = parse(json!({ "text": "t" })).unwrap();
        assert!(p.metadata.is_none());
    }
}
