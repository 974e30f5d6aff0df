//! End-to-end tests over the library API with in-process fakes.

mod common;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use common::*;
use regulation_harness::analyzer::{QueryAnalysis, QueryRoute};
use regulation_harness::ingest::{ingest_document, process_new_files, DocumentOutcome};
use regulation_harness::metadata::{MetadataStore, MetadataUpdate};
use regulation_harness::models::{DocStatus, ObjectInfo};
use regulation_harness::planner::{execute_pipeline, ingest_pending_documents};
use regulation_harness::rpc::dispatch;
use regulation_harness::storage::ObjectStore;
use regulation_harness::traits::ToolRegistry;
use regulation_harness::vector_store::VectorStore;

const MOTOR_LAW: &str = "Article 1. Every owner of a motor vehicle registered in Tunisia \
    must hold an insurance policy covering third-party civil liability.\n\n\
    Article 2. The policy must remain valid for the whole registration period.";

const HEALTH_CODE: &str = "Article 10. Health insurers must publish the list of covered \
    treatments and the applicable reimbursement rates.";

// ============ Ingestion batch ============

#[tokio::test]
async fn batch_continues_past_a_failed_document() {
    let f = fixture(ScriptedLlm::routing("RAG"), RecordingGraph::default()).await;
    f.write_doc("a_motor_law.txt", MOTOR_LAW);
    f.write_doc("b_blank.txt", "   \n");
    f.write_doc("c_health_code.txt", HEALTH_CODE);

    let records = f.ctx.metadata.sync(f.ctx.storage.as_ref()).await.unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.status == DocStatus::Pending));

    let out = ingest_pending_documents(&f.ctx).await.unwrap();
    assert_eq!(out["status"], "Ingestion Complete");
    assert_eq!(
        out["details"],
        json!([
            "Processed a_motor_law.txt",
            "Failed b_blank.txt",
            "Processed c_health_code.txt"
        ])
    );

    let records = f.ctx.metadata.list().await.unwrap();
    let by_name = |name: &str| records.iter().find(|r| r.filename == name).unwrap().clone();

    let ok = by_name("a_motor_law.txt");
    assert_eq!(ok.status, DocStatus::Processed);
    assert_eq!(ok.chunks_count, Some(1));
    assert!(ok.last_updated.is_some());

    let failed = by_name("b_blank.txt");
    assert_eq!(failed.status, DocStatus::Error);
    assert!(failed
        .error
        .as_deref()
        .unwrap()
        .contains("Empty or unreadable text"));

    assert_eq!(by_name("c_health_code.txt").status, DocStatus::Processed);
    assert_eq!(point_count(&f.vectors).await, 2);

    // Graph facts are written for every processed chunk
    let statements = f.graph.statements.lock().unwrap().clone();
    assert_eq!(statements.len(), 2);
    assert!(statements.iter().all(|s| s.starts_with("MERGE")));
}

#[tokio::test]
async fn second_run_finds_nothing_pending() {
    let f = fixture(ScriptedLlm::routing("RAG"), RecordingGraph::default()).await;
    f.write_doc("motor.txt", MOTOR_LAW);
    f.ctx.metadata.sync(f.ctx.storage.as_ref()).await.unwrap();

    ingest_pending_documents(&f.ctx).await.unwrap();
    let out = ingest_pending_documents(&f.ctx).await.unwrap();
    assert_eq!(out, json!({ "status": "No pending documents." }));

    // Re-syncing never resets a processed record
    let records = f.ctx.metadata.sync(f.ctx.storage.as_ref()).await.unwrap();
    assert_eq!(records[0].status, DocStatus::Processed);
}

#[tokio::test]
async fn reingesting_a_document_overwrites_its_points() {
    let f = fixture(ScriptedLlm::routing("RAG"), RecordingGraph::default()).await;
    f.write_doc("motor.txt", MOTOR_LAW);
    f.write_doc("health.txt", HEALTH_CODE);
    f.ctx.metadata.sync(f.ctx.storage.as_ref()).await.unwrap();
    ingest_pending_documents(&f.ctx).await.unwrap();
    let before = point_count(&f.vectors).await;
    assert_eq!(before, 2);

    let records = f.ctx.metadata.list().await.unwrap();
    let motor = records.iter().find(|r| r.filename == "motor.txt").unwrap();
    assert!(f
        .ctx
        .metadata
        .update(&motor.id, MetadataUpdate::status(DocStatus::Pending))
        .await
        .unwrap());

    let outcome = ingest_document(&f.ctx, motor).await.unwrap();
    assert_eq!(outcome, DocumentOutcome::Processed { chunks: 1 });
    assert_eq!(point_count(&f.vectors).await, before);
}

#[tokio::test]
async fn downloads_are_removed_after_extraction() {
    let f = fixture(ScriptedLlm::routing("RAG"), RecordingGraph::default()).await;
    f.write_doc("france/motor.txt", MOTOR_LAW);
    f.write_doc("france_motor.txt", HEALTH_CODE);
    f.ctx.metadata.sync(f.ctx.storage.as_ref()).await.unwrap();

    let out = ingest_pending_documents(&f.ctx).await.unwrap();
    let mut details: Vec<String> =
        serde_json::from_value(out["details"].clone()).unwrap();
    details.sort();
    assert_eq!(
        details,
        vec!["Processed france/motor.txt", "Processed france_motor.txt"]
    );
    assert_eq!(point_count(&f.vectors).await, 2);

    let dir = &f.ctx.config.storage.download_dir;
    let leftover = std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0);
    assert_eq!(leftover, 0);
}

#[tokio::test]
async fn graph_outage_does_not_fail_the_document() {
    let f = fixture(ScriptedLlm::routing("RAG"), RecordingGraph::failing()).await;
    f.write_doc("motor.txt", MOTOR_LAW);
    f.ctx.metadata.sync(f.ctx.storage.as_ref()).await.unwrap();

    let out = ingest_pending_documents(&f.ctx).await.unwrap();
    assert_eq!(out["details"], json!(["Processed motor.txt"]));
    assert_eq!(point_count(&f.vectors).await, 1);
}

#[tokio::test]
async fn enriched_payload_is_stored() {
    let f = fixture(ScriptedLlm::routing("RAG"), RecordingGraph::default()).await;
    f.write_doc("motor.txt", MOTOR_LAW);
    f.ctx.metadata.sync(f.ctx.storage.as_ref()).await.unwrap();
    ingest_pending_documents(&f.ctx).await.unwrap();

    let payloads = f.ctx.vectors.scroll_all().await.unwrap();
    let p = &payloads[0];
    assert_eq!(p["keywords"], json!(["liability", "motor"]));
    assert_eq!(p["policy_type"], "Auto");
    assert_eq!(p["clause_type"], "Coverage");
    assert_eq!(p["source"]["document"], "motor.txt");
}

// ============ Metadata sync ============

struct BrokenStore;

#[async_trait]
impl ObjectStore for BrokenStore {
    fn kind(&self) -> &str {
        "broken"
    }
    async fn list(&self) -> Result<Vec<ObjectInfo>> {
        bail!("connection refused")
    }
    async fn fetch(&self, _key: &str) -> Result<Vec<u8>> {
        bail!("connection refused")
    }
}

#[tokio::test]
async fn sync_fails_loudly_when_listing_fails() {
    let f = fixture(ScriptedLlm::routing("RAG"), RecordingGraph::default()).await;
    f.write_doc("motor.txt", MOTOR_LAW);
    f.ctx.metadata.sync(f.ctx.storage.as_ref()).await.unwrap();

    let store: &MetadataStore = &f.ctx.metadata;
    assert!(store.sync(&BrokenStore).await.is_err());
    // Existing records are untouched
    assert_eq!(store.list().await.unwrap().len(), 1);
}

// ============ Legacy path ============

#[tokio::test]
async fn legacy_path_only_considers_pdfs() {
    let f = fixture(ScriptedLlm::routing("RAG"), RecordingGraph::default()).await;
    f.write_doc("notes.txt", MOTOR_LAW);
    f.write_doc("scan.pdf", "not really a pdf");

    let reports = process_new_files(&f.ctx).await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].file, "scan.pdf");
    assert_eq!(reports[0].status, "no_docs");

    // Not marked, so it is considered again next time
    assert!(!f.ctx.metadata.is_file_processed("scan.pdf").await.unwrap());
    assert_eq!(process_new_files(&f.ctx).await.unwrap().len(), 1);
}

// ============ Query pipeline ============

#[tokio::test]
async fn unparseable_analysis_falls_back_to_rag() {
    let f = fixture(
        ScriptedLlm::new("This looks like a motor insurance question."),
        RecordingGraph::default(),
    )
    .await;

    let answer = execute_pipeline(&f.ctx, "Is liability cover mandatory?")
        .await
        .unwrap();
    assert_eq!(answer.analysis, QueryAnalysis::fallback());
    assert_eq!(answer.answer, ANSWER);

    let summaries = f.llm.prompts_starting_with("You are an Expert Legal Summarizer");
    assert_eq!(summaries.len(), 1);
    assert!(summaries[0].contains("RAG Context: "));
    assert!(f.graph.statements.lock().unwrap().is_empty());
}

#[tokio::test]
async fn graph_route_uses_fusion() {
    let f = fixture(ScriptedLlm::routing("GraphRAG"), RecordingGraph::default()).await;
    f.write_doc("motor.txt", MOTOR_LAW);
    f.ctx.metadata.sync(f.ctx.storage.as_ref()).await.unwrap();
    ingest_pending_documents(&f.ctx).await.unwrap();
    f.graph.statements.lock().unwrap().clear();

    let answer = execute_pipeline(&f.ctx, "Compare motor liability rules")
        .await
        .unwrap();
    assert_eq!(answer.analysis.classification, QueryRoute::GraphRag);

    let summaries = f.llm.prompts_starting_with("You are an Expert Legal Summarizer");
    assert!(summaries[0].contains("GraphRAG Context: "));
    assert!(summaries[0].contains("Both sources agree"));
    assert!(!f.graph.statements.lock().unwrap().is_empty());
}

#[tokio::test]
async fn graph_route_degrades_to_vector_search() {
    let f = fixture(ScriptedLlm::routing("GraphRAG"), RecordingGraph::failing()).await;
    f.write_doc("motor.txt", MOTOR_LAW);
    f.ctx.metadata.sync(f.ctx.storage.as_ref()).await.unwrap();
    ingest_pending_documents(&f.ctx).await.unwrap();

    let answer = execute_pipeline(&f.ctx, "Compare motor liability rules")
        .await
        .unwrap();
    assert_eq!(answer.answer, ANSWER);

    let summaries = f.llm.prompts_starting_with("You are an Expert Legal Summarizer");
    assert!(summaries[0].contains("GraphRAG Context: "));
    assert!(!summaries[0].contains("Both sources agree"));
}

// ============ Dispatch ============

async fn rpc(f: &Fixture, body: Value) -> Value {
    let registry = ToolRegistry::with_builtins().unwrap();
    let bytes = serde_json::to_vec(&body).unwrap();
    serde_json::to_value(dispatch(&registry, &f.ctx, &bytes).await).unwrap()
}

#[tokio::test]
async fn unknown_method_echoes_null_id() {
    let f = fixture(ScriptedLlm::routing("RAG"), RecordingGraph::default()).await;
    let resp = rpc(&f, json!({ "jsonrpc": "2.0", "method": "nope", "id": null })).await;
    assert_eq!(resp["error"]["code"], -32601);
    assert_eq!(resp["id"], Value::Null);
    assert!(resp.get("result").is_none());
}

#[tokio::test]
async fn malformed_body_is_a_parse_error() {
    let f = fixture(ScriptedLlm::routing("RAG"), RecordingGraph::default()).await;
    let registry = ToolRegistry::with_builtins().unwrap();
    let resp = dispatch(&registry, &f.ctx, b"{\"method\": ").await;
    let err = resp.error.unwrap();
    assert_eq!(err.code, -32700);
    assert_eq!(resp.id, Value::Null);
}

#[tokio::test]
async fn positional_and_named_params_bind_alike() {
    let f = fixture(ScriptedLlm::routing("RAG"), RecordingGraph::default()).await;
    let named = rpc(
        &f,
        json!({
            "jsonrpc": "2.0",
            "method": "summarize_results",
            "params": { "query": "q", "context": "c" },
            "id": "a"
        }),
    )
    .await;
    let positional = rpc(
        &f,
        json!({
            "jsonrpc": "2.0",
            "method": "summarize_results",
            "params": ["q", "c"],
            "id": 2
        }),
    )
    .await;
    assert_eq!(named["result"], ANSWER);
    assert_eq!(positional["result"], ANSWER);
    assert_eq!(named["id"], "a");
    assert_eq!(positional["id"], 2);
}

#[tokio::test]
async fn tool_failure_is_a_generic_error() {
    let f = fixture(ScriptedLlm::routing("RAG"), RecordingGraph::failing()).await;
    let resp = rpc(
        &f,
        json!({
            "jsonrpc": "2.0",
            "method": "graph_query",
            "params": { "cypher_query": "MATCH (n) RETURN n" },
            "id": 9
        }),
    )
    .await;
    assert_eq!(resp["error"]["code"], -32000);
    assert!(resp["error"]["message"]
        .as_str()
        .unwrap()
        .contains("graph store unreachable"));
    assert_eq!(resp["id"], 9);
}

#[tokio::test]
async fn unknown_parameter_is_rejected() {
    let f = fixture(ScriptedLlm::routing("RAG"), RecordingGraph::default()).await;
    let resp = rpc(
        &f,
        json!({
            "jsonrpc": "2.0",
            "method": "rag_search",
            "params": { "query": "q", "limit": 3 },
            "id": 1
        }),
    )
    .await;
    assert_eq!(resp["error"]["code"], -32000);
}

#[tokio::test]
async fn rag_ingest_is_idempotent() {
    let f = fixture(ScriptedLlm::routing("RAG"), RecordingGraph::default()).await;
    let call = json!({
        "jsonrpc": "2.0",
        "method": "rag_ingest",
        "params": { "text": MOTOR_LAW, "metadata": { "filename": "motor.txt" } },
        "id": 1
    });

    assert_eq!(rpc(&f, call.clone()).await["result"], true);
    let first = point_count(&f.vectors).await;
    assert_eq!(rpc(&f, call).await["result"], true);
    assert_eq!(point_count(&f.vectors).await, first);

    let hits = rpc(
        &f,
        json!({
            "jsonrpc": "2.0",
            "method": "rag_search",
            "params": ["third-party civil liability", 1],
            "id": 2
        }),
    )
    .await;
    let hits = hits["result"].as_array().unwrap().clone();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["metadata"]["filename"], "motor.txt");
}

#[tokio::test]
async fn graph_summary_of_unknown_regulation_is_null() {
    let f = fixture(ScriptedLlm::routing("RAG"), RecordingGraph::default()).await;
    let resp = rpc(
        &f,
        json!({
            "jsonrpc": "2.0",
            "method": "graph_summarize",
            "params": ["Law 92-24"],
            "id": 1
        }),
    )
    .await;
    assert_eq!(resp["result"], Value::Null);
    assert!(resp.get("error").is_none());
    // No rows means no model call
    assert!(f.llm.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn narrated_comparison_goes_through_the_model() {
    let f = fixture(ScriptedLlm::routing("RAG"), RecordingGraph::default()).await;
    let resp = rpc(
        &f,
        json!({
            "jsonrpc": "2.0",
            "method": "graph_compare_narrative",
            "params": { "policy_a": "Law 92-24", "policy_b": "Solvency II" },
            "id": 2
        }),
    )
    .await;
    assert_eq!(resp["result"], ANSWER);

    let statements = f.graph.statements.lock().unwrap().clone();
    assert_eq!(statements.len(), 1);
    assert!(statements[0].contains("CONFLICTS_WITH|SIMILAR_TO"));
    let prompts = f.llm.prompts_starting_with("Compare the regulations");
    assert!(prompts[0].contains("\"Solvency II\""));
}

#[tokio::test]
async fn legacy_ingest_is_reachable_by_namespaced_method() {
    let f = fixture(ScriptedLlm::routing("RAG"), RecordingGraph::default()).await;
    f.write_doc("notes.txt", MOTOR_LAW);
    let resp = rpc(
        &f,
        json!({ "jsonrpc": "2.0", "method": "analyzer.process_new_files", "id": 3 }),
    )
    .await;
    assert_eq!(resp["result"], json!([]));
}

#[tokio::test]
async fn update_doc_metadata_reports_unknown_ids() {
    let f = fixture(ScriptedLlm::routing("RAG"), RecordingGraph::default()).await;
    f.write_doc("motor.txt", MOTOR_LAW);
    let records = f.ctx.metadata.sync(f.ctx.storage.as_ref()).await.unwrap();

    let resp = rpc(
        &f,
        json!({
            "jsonrpc": "2.0",
            "method": "update_doc_metadata",
            "params": [records[0].id, { "visibility": "hidden" }],
            "id": 1
        }),
    )
    .await;
    assert_eq!(resp["result"], true);

    let resp = rpc(
        &f,
        json!({
            "jsonrpc": "2.0",
            "method": "update_doc_metadata",
            "params": ["missing", { "visibility": "hidden" }],
            "id": 2
        }),
    )
    .await;
    assert_eq!(resp["result"], false);

    let record = f.ctx.metadata.get(&records[0].id).await.unwrap().unwrap();
    assert_eq!(record.visibility, "hidden");
}
