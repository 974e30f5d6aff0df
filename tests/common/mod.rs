//! Shared fixtures: scripted model, hashing embedder, recording graph, and
//! a `ToolContext` over a temp directory.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use regulation_harness::config::Config;
use regulation_harness::embedding::Embedder;
use regulation_harness::graph::GraphStore;
use regulation_harness::llm::TextGenerator;
use regulation_harness::metadata::MetadataStore;
use regulation_harness::storage::LocalStore;
use regulation_harness::traits::ToolContext;
use regulation_harness::vector_store::{MemoryVectorStore, VectorStore};

pub const ANSWER: &str = "Third-party liability cover is mandatory.";

/// Answers by prompt prefix and records every prompt it sees.
pub struct ScriptedLlm {
    pub analysis: String,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new(analysis: &str) -> Self {
        Self {
            analysis: analysis.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn routing(route: &str) -> Self {
        Self::new(&json!({ "is_valid": true, "classification": route, "entities": {} }).to_string())
    }

    pub fn prompts_starting_with(&self, prefix: &str) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.starts_with(prefix))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TextGenerator for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        let out = if prompt.starts_with("Summarize the following") {
            "Motor insurers must cover third-party liability in Tunisia.".to_string()
        } else if prompt.starts_with("Extract the most important") {
            r#"["liability", "motor"]"#.to_string()
        } else if prompt.starts_with("Write three") {
            r#"["Is liability cover mandatory?"]"#.to_string()
        } else if prompt.starts_with("Extract any explicit") {
            r#"["Insurers must cover liability."]"#.to_string()
        } else if prompt.starts_with("Classify") {
            r#"{"policy_type": "Auto", "clause_type": "Coverage"}"#.to_string()
        } else if prompt.starts_with("You are a Gatekeeper") {
            self.analysis.clone()
        } else if prompt.starts_with("You are a Neo4j Graph Agent") {
            "MERGE (r:Regulation {name: \"Motor Law\"})".to_string()
        } else if prompt.starts_with("Given the following document summaries") {
            "Both sources agree on liability cover.".to_string()
        } else {
            ANSWER.to_string()
        };
        Ok(out)
    }
}

/// Deterministic bag-of-words embedder.
pub struct HashEmbedder;

pub const DIMS: usize = 16;

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; DIMS];
                for word in t.split_whitespace() {
                    let h = word
                        .to_lowercase()
                        .bytes()
                        .fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
                    v[h % DIMS] += 1.0;
                }
                v[0] += 0.01;
                v
            })
            .collect())
    }
}

/// Records every statement; optionally fails all of them.
#[derive(Default)]
pub struct RecordingGraph {
    pub statements: Mutex<Vec<String>>,
    pub fail: bool,
}

impl RecordingGraph {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl GraphStore for RecordingGraph {
    fn kind(&self) -> &str {
        "recording"
    }

    async fn run(&self, cypher: &str, _params: Map<String, Value>) -> Result<Vec<Value>> {
        self.statements.lock().unwrap().push(cypher.to_string());
        if self.fail {
            bail!("graph store unreachable");
        }
        if cypher.starts_with("MATCH (n)") {
            return Ok(vec![json!({ "n": { "name": "Motor Law" }, "r": null, "m": null })]);
        }
        Ok(Vec::new())
    }
}

pub struct Fixture {
    pub _tmp: TempDir,
    pub docs: PathBuf,
    pub llm: Arc<ScriptedLlm>,
    pub graph: Arc<RecordingGraph>,
    pub vectors: Arc<MemoryVectorStore>,
    pub ctx: Arc<ToolContext>,
}

impl Fixture {
    pub fn write_doc(&self, name: &str, text: &str) {
        let path = self.docs.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, text).unwrap();
    }
}

pub async fn fixture(llm: ScriptedLlm, graph: RecordingGraph) -> Fixture {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("bucket");
    fs::create_dir_all(&docs).unwrap();

    let mut config = Config::default();
    config.db.path = tmp.path().join("data/metadata.sqlite");
    config.storage.backend = "filesystem".into();
    config.storage.root = docs.clone();
    config.storage.download_dir = tmp.path().join("downloads");
    config.vector.backend = "memory".into();

    let llm = Arc::new(llm);
    let graph = Arc::new(graph);
    let vectors = Arc::new(MemoryVectorStore::default());

    let ctx = Arc::new(ToolContext {
        metadata: MetadataStore::open(&config).await.unwrap(),
        storage: Arc::new(LocalStore::new(docs.clone(), &[]).unwrap()),
        vectors: vectors.clone(),
        graph: graph.clone(),
        embedder: Arc::new(HashEmbedder),
        llm: llm.clone(),
        config: Arc::new(config),
    });

    Fixture {
        _tmp: tmp,
        docs,
        llm,
        graph,
        vectors,
        ctx,
    }
}

pub async fn point_count(vectors: &MemoryVectorStore) -> u64 {
    vectors.count().await.unwrap()
}
