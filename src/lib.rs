//! # Regulation Harness
//!
//! Multi-agent question answering over insurance regulations.
//!
//! Regulatory documents are pulled from object storage, split into chunks,
//! enriched by a text-generation model (summary, keywords, questions,
//! requirements, classification), embedded and indexed into a vector
//! store, and optionally written into a knowledge graph. Queries are
//! classified as plain vector retrieval (`RAG`) or graph-aware retrieval
//! (`GraphRAG`), answered from the retrieved context, and served through a
//! JSON-RPC tool registry.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Object store │──▶│  Ingestion   │──▶│ Vector store │
//! │  S3 / local  │   │ chunk+enrich │   │ Qdrant / mem │
//! └──────────────┘   └──────┬───────┘   └──────┬───────┘
//!                           ▼                  │
//!                    ┌──────────────┐          │
//!                    │ Graph (Neo4j)│◀─────────┤ fusion
//!                    └──────────────┘          │
//!                                              ▼
//!          ┌──────────┐   ┌──────────┐   ┌──────────┐
//!          │ rh (CLI) │──▶│   RPC    │──▶│ Planner  │
//!          │ POST /mcp│   │ dispatch │   │ analyze→ │
//!          └──────────┘   └──────────┘   │ retrieve→│
//!                                        │ summarize│
//!                                        └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rh init                       # create the metadata database
//! rh sync                       # register documents found in the bucket
//! rh ingest                     # enrich and index pending documents
//! rh ask "Is third-party liability cover mandatory in Tunisia?"
//! rh serve                      # start the JSON-RPC server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`models`] | Core data types |
//! | [`metadata`] | Document lifecycle records |
//! | [`storage`] | Object storage backends |
//! | [`extract`] | Text extraction from PDF, DOCX and text files |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`llm`] | Text-generation provider abstraction |
//! | [`enrich`] | Per-chunk enrichment |
//! | [`vector_store`] | Vector database backends |
//! | [`graph`] | Knowledge graph backend and graph builder |
//! | [`rag`] | Vector retrieval and indexing |
//! | [`fusion`] | Vector + graph retrieval fusion |
//! | [`analyzer`] | Query classification |
//! | [`summarizer`] | Answer and report summaries |
//! | [`ingest`] | Per-document ingestion pipeline |
//! | [`planner`] | Query orchestration and ingestion batches |
//! | [`traits`] | Tool trait, service context, registry |
//! | [`tools`] | Built-in tool catalogue |
//! | [`rpc`] | JSON-RPC envelopes and dispatch |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod analyzer;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod enrich;
pub mod extract;
pub mod fusion;
pub mod graph;
pub mod http;
pub mod ingest;
pub mod llm;
pub mod metadata;
pub mod migrate;
pub mod model_output;
pub mod models;
pub mod planner;
pub mod prompts;
pub mod rag;
pub mod rpc;
pub mod server;
pub mod storage;
pub mod summarizer;
pub mod tools;
pub mod traits;
pub mod vector_store;
