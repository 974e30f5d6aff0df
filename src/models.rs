//! Core data models used throughout the regulation harness.
//!
//! These types represent the document records, chunks, and retrieval hits
//! that flow through the ingestion and query pipelines.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Jurisdiction a regulation document belongs to.
///
/// Inferred from the top-level folder of the object key on first sync
/// (`tunisia/…`, `france/…`, `europe/…`) and editable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Country {
    Tunisia,
    France,
    Europe,
    #[default]
    Unknown,
}

impl Country {
    pub fn as_str(&self) -> &'static str {
        match self {
            Country::Tunisia => "Tunisia",
            Country::France => "France",
            Country::Europe => "Europe",
            Country::Unknown => "Unknown",
        }
    }

    /// Case-insensitive match against the country vocabulary.
    pub fn from_folder(folder: &str) -> Self {
        match folder.trim().to_ascii_lowercase().as_str() {
            "tunisia" => Country::Tunisia,
            "france" => Country::France,
            "europe" => Country::Europe,
            _ => Country::Unknown,
        }
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ingestion lifecycle of a document record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocStatus {
    Pending,
    Processing,
    Processed,
    Error,
}

impl DocStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocStatus::Pending => "pending",
            DocStatus::Processing => "processing",
            DocStatus::Processed => "processed",
            DocStatus::Error => "error",
        }
    }
}

impl fmt::Display for DocStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DocStatus::Pending),
            "processing" => Ok(DocStatus::Processing),
            "processed" => Ok(DocStatus::Processed),
            "error" => Ok(DocStatus::Error),
            other => anyhow::bail!("unknown document status: {}", other),
        }
    }
}

/// One row of the metadata store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentRecord {
    pub id: String,
    pub filename: String,
    pub country: Country,
    pub doc_type: String,
    pub visibility: String,
    pub status: DocStatus,
    pub size: i64,
    pub last_modified_source: String,
    pub added_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// An object as reported by the document store listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectInfo {
    pub filename: String,
    pub size: i64,
    pub last_modified: String,
}

/// Insurance line a chunk is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PolicyType {
    Auto,
    Health,
    Life,
    Property,
    #[default]
    General,
}

impl PolicyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyType::Auto => "Auto",
            PolicyType::Health => "Health",
            PolicyType::Life => "Life",
            PolicyType::Property => "Property",
            PolicyType::General => "General",
        }
    }

    /// Case-insensitive parse; `None` for anything outside the vocabulary.
    pub fn parse_lenient(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "motor" | "car" => Some(PolicyType::Auto),
            "health" => Some(PolicyType::Health),
            "life" => Some(PolicyType::Life),
            "property" => Some(PolicyType::Property),
            "general" => Some(PolicyType::General),
            _ => None,
        }
    }
}

/// Kind of clause a chunk contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ClauseType {
    #[default]
    Requirement,
    Coverage,
    Exclusion,
    Procedure,
    Definition,
}

impl ClauseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClauseType::Requirement => "Requirement",
            ClauseType::Coverage => "Coverage",
            ClauseType::Exclusion => "Exclusion",
            ClauseType::Procedure => "Procedure",
            ClauseType::Definition => "Definition",
        }
    }

    pub fn parse_lenient(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "requirement" => Some(ClauseType::Requirement),
            "coverage" => Some(ClauseType::Coverage),
            "exclusion" => Some(ClauseType::Exclusion),
            "procedure" => Some(ClauseType::Procedure),
            "definition" => Some(ClauseType::Definition),
            _ => None,
        }
    }
}

/// A span of document text produced by the chunker.
///
/// `metadata` carries the document's metadata plus a local `chunk_id`
/// (the index of the chunk within its document).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextChunk {
    pub text: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl TextChunk {
    /// Index within the document, from `metadata.chunk_id`.
    pub fn index(&self) -> i64 {
        self.index_or(0)
    }

    /// `metadata.chunk_id`, or `fallback` when the chunk carries none.
    pub fn index_or(&self, fallback: i64) -> i64 {
        self.metadata
            .get("chunk_id")
            .and_then(Value::as_i64)
            .unwrap_or(fallback)
    }

    /// Source filename, from `metadata.filename`.
    pub fn filename(&self) -> &str {
        self.metadata
            .get("filename")
            .and_then(Value::as_str)
            .unwrap_or("")
    }
}

/// Where an enriched chunk came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SourceRef {
    pub document: String,
    pub page: Option<u32>,
    pub section: Option<String>,
}

/// A chunk with model-generated enrichment, ready to be indexed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrichedChunk {
    pub chunk_id: String,
    pub text: String,
    pub summary: String,
    pub keywords: Vec<String>,
    pub questions: Vec<String>,
    pub country: String,
    pub policy_type: PolicyType,
    pub clause_type: ClauseType,
    pub extracted_requirements: Vec<String>,
    pub source: SourceRef,
    /// Kept out of the stored payload; the vector store holds it separately.
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub metadata: Map<String, Value>,
}

/// A nearest-neighbour result from the vector store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
    pub payload: Map<String, Value>,
}
