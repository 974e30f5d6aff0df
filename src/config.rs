//! TOML configuration with environment overrides.
//!
//! Every section and field has a default, so the harness starts without a
//! config file. Values are resolved in this order:
//!
//! 1. environment variable (e.g. `QDRANT_URL`)
//! 2. the TOML file passed with `--config`
//! 3. the hardcoded default
//!
//! ```toml
//! [db]
//! path = "data/metadata.sqlite"
//!
//! [storage]
//! backend = "s3"
//! endpoint = "localhost:9000"
//! bucket = "regulations"
//!
//! [vector]
//! url = "http://localhost:6333"
//! collection = "regulations_chunks"
//!
//! [graph]
//! uri = "http://localhost:7474"
//!
//! [model]
//! provider = "huggingface"
//! model_id = "LiquidAI/LFM2-2.6B-Exp"
//!
//! [embedding]
//! provider = "ollama"
//! model = "all-minilm"
//! dims = 384
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub db: DbConfig,
    pub storage: StorageConfig,
    pub vector: VectorConfig,
    pub graph: GraphConfig,
    pub model: ModelConfig,
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DbConfig {
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/metadata.sqlite"),
        }
    }
}

/// Object storage holding the source regulation documents.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// `"s3"` (MinIO / S3-compatible) or `"filesystem"`.
    pub backend: String,
    /// Host and port of the S3-compatible endpoint, without scheme.
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub secure: bool,
    pub region: String,
    pub prefix: String,
    /// Empty means every object is listed.
    pub include_globs: Vec<String>,
    /// Root directory for the `filesystem` backend.
    pub root: PathBuf,
    /// Where `get_document_content` writes downloaded objects.
    pub download_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "s3".to_string(),
            endpoint: "localhost:9000".to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            bucket: "regulations".to_string(),
            secure: false,
            region: "us-east-1".to_string(),
            prefix: String::new(),
            include_globs: Vec::new(),
            root: PathBuf::from("data/documents"),
            download_dir: PathBuf::from("data/downloads"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VectorConfig {
    /// `"qdrant"` or `"memory"`.
    pub backend: String,
    pub url: String,
    pub collection: String,
    pub api_key: Option<String>,
    pub upsert_batch_size: usize,
    pub timeout_secs: u64,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: "qdrant".to_string(),
            url: "http://localhost:6333".to_string(),
            collection: "regulations_chunks".to_string(),
            api_key: None,
            upsert_batch_size: 50,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GraphConfig {
    /// `"neo4j"` or `"disabled"`.
    pub backend: String,
    /// Base URL of the Neo4j HTTP API.
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Run graph extraction for every chunk during document ingestion.
    pub ingest_on_pipeline: bool,
    pub timeout_secs: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            backend: "neo4j".to_string(),
            uri: "http://localhost:7474".to_string(),
            user: "neo4j".to_string(),
            password: "password".to_string(),
            database: "neo4j".to_string(),
            ingest_on_pipeline: true,
            timeout_secs: 30,
        }
    }
}

/// Text-generation model settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelConfig {
    /// `"huggingface"`, `"openai"`, `"ollama"` or `"disabled"`.
    pub provider: String,
    pub model_id: String,
    pub token: Option<String>,
    /// Overrides the provider's default endpoint.
    pub base_url: Option<String>,
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "huggingface".to_string(),
            model_id: "LiquidAI/LFM2-2.6B-Exp".to_string(),
            token: None,
            base_url: None,
            max_new_tokens: 512,
            temperature: 0.1,
            timeout_secs: 120,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `"openai"`, `"ollama"`, `"local"` or `"disabled"`.
    pub provider: String,
    pub model: Option<String>,
    pub dims: Option<usize>,
    pub url: Option<String>,
    pub batch_size: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: 800,
            overlap_tokens: 150,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    /// `top_k` for queries classified as plain RAG.
    pub rag_top_k: usize,
    /// `top_k` for queries classified as GraphRAG.
    pub graph_top_k: usize,
    /// Maximum neighbouring edges fetched per seed term.
    pub neighbor_limit: usize,
    /// Graph evidence is stringified and cut to this many characters.
    pub graph_evidence_chars: usize,
    /// Use retrieval fusion for GraphRAG queries instead of vector-only search.
    pub graph_fusion: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rag_top_k: 3,
            graph_top_k: 5,
            neighbor_limit: 50,
            graph_evidence_chars: 2000,
            graph_fusion: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

impl Config {
    /// Apply environment overrides using the given variable lookup.
    ///
    /// Taking the lookup as a closure keeps tests independent of the
    /// process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("RH_DB_PATH") {
            self.db.path = PathBuf::from(v);
        }
        if let Some(v) = var("RH_BIND") {
            self.server.bind = v;
        }

        if let Some(v) = var("STORAGE_BACKEND") {
            self.storage.backend = v;
        }
        if let Some(v) = var("MINIO_ENDPOINT") {
            self.storage.endpoint = v;
        }
        if let Some(v) = var("MINIO_ACCESS_KEY") {
            self.storage.access_key = v;
        }
        if let Some(v) = var("MINIO_SECRET_KEY") {
            self.storage.secret_key = v;
        }
        if let Some(v) = var("MINIO_BUCKET") {
            self.storage.bucket = v;
        }
        if let Some(v) = var("MINIO_SECURE") {
            self.storage.secure = parse_bool("MINIO_SECURE", &v)?;
        }

        if let Some(v) = var("QDRANT_URL") {
            self.vector.url = v;
        }
        if let Some(v) = var("QDRANT_COLLECTION") {
            self.vector.collection = v;
        }
        if let Some(v) = var("QDRANT_API_KEY") {
            self.vector.api_key = Some(v);
        }

        if let Some(v) = var("NEO4J_URI") {
            self.graph.uri = v;
        }
        if let Some(v) = var("NEO4J_USER") {
            self.graph.user = v;
        }
        if let Some(v) = var("NEO4J_PASSWORD") {
            self.graph.password = v;
        }

        if let Some(v) = var("MODEL_PROVIDER") {
            self.model.provider = v;
        }
        if let Some(v) = var("MODEL_ID") {
            self.model.model_id = v;
        }
        if let Some(v) = var("MODEL_BASE_URL") {
            self.model.base_url = Some(v);
        }
        if let Some(v) = var("HF_TOKEN") {
            self.model.token = Some(v);
        }

        if let Some(v) = var("EMBEDDING_PROVIDER") {
            self.embedding.provider = v;
        }
        if let Some(v) = var("EMBEDDING_MODEL") {
            self.embedding.model = Some(v);
        }
        if let Some(v) = var("EMBEDDING_URL") {
            self.embedding.url = Some(v);
        }

        Ok(())
    }

    /// Check ranges and provider names.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.max_tokens == 0 {
            bail!("chunking.max_tokens must be > 0");
        }
        if self.chunking.overlap_tokens >= self.chunking.max_tokens {
            bail!("chunking.overlap_tokens must be smaller than chunking.max_tokens");
        }
        if self.retrieval.rag_top_k == 0 || self.retrieval.graph_top_k == 0 {
            bail!("retrieval top_k values must be >= 1");
        }
        if self.vector.upsert_batch_size == 0 {
            bail!("vector.upsert_batch_size must be >= 1");
        }

        match self.storage.backend.as_str() {
            "s3" | "filesystem" => {}
            other => bail!(
                "Unknown storage backend: '{}'. Must be s3 or filesystem.",
                other
            ),
        }
        match self.vector.backend.as_str() {
            "qdrant" | "memory" => {}
            other => bail!(
                "Unknown vector backend: '{}'. Must be qdrant or memory.",
                other
            ),
        }
        match self.graph.backend.as_str() {
            "neo4j" | "disabled" => {}
            other => bail!(
                "Unknown graph backend: '{}'. Must be neo4j or disabled.",
                other
            ),
        }
        match self.model.provider.as_str() {
            "huggingface" | "openai" | "ollama" | "disabled" => {}
            other => bail!(
                "Unknown model provider: '{}'. Must be huggingface, openai, ollama, or disabled.",
                other
            ),
        }
        match self.embedding.provider.as_str() {
            "disabled" | "openai" | "ollama" | "local" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
                other
            ),
        }
        if matches!(self.embedding.provider.as_str(), "openai" | "ollama") {
            if self.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
        }

        Ok(())
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("{} must be a boolean, got '{}'", name, other),
    }
}

/// Parse the TOML file (if present) without applying overrides.
pub fn load_file(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "config file not found, using defaults");
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    toml::from_str(&content).with_context(|| "Failed to parse config file")
}

/// Load the config file, apply environment overrides, and validate.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = load_file(path)?;
    config.apply_overrides(|name| std::env::var(name).ok())?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.storage.bucket, "regulations");
        assert_eq!(cfg.vector.collection, "regulations_chunks");
        assert_eq!(cfg.retrieval.rag_top_k, 3);
        assert_eq!(cfg.retrieval.graph_top_k, 5);
    }

    #[test]
    fn file_values_override_defaults() {
        let cfg: Config = toml::from_str(
            r#"
[storage]
bucket = "docs"

[vector]
url = "http://qdrant:6333"
"#,
        )
        .unwrap();
        assert_eq!(cfg.storage.bucket, "docs");
        assert_eq!(cfg.storage.endpoint, "localhost:9000");
        assert_eq!(cfg.vector.url, "http://qdrant:6333");
    }

    #[test]
    fn env_overrides_file() {
        let mut cfg: Config = toml::from_str(
            r#"
[vector]
url = "http://from-file:6333"

[storage]
secure = false
"#,
        )
        .unwrap();
        let env: HashMap<&str, &str> = [
            ("QDRANT_URL", "http://from-env:6333"),
            ("MINIO_SECURE", "true"),
            ("HF_TOKEN", "hf_abc"),
            ("NEO4J_PASSWORD", ""),
        ]
        .into_iter()
        .collect();

        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(cfg.vector.url, "http://from-env:6333");
        assert!(cfg.storage.secure);
        assert_eq!(cfg.model.token.as_deref(), Some("hf_abc"));
        // Empty variables are ignored.
        assert_eq!(cfg.graph.password, "password");
    }

    #[test]
    fn invalid_bool_override_is_rejected() {
        let mut cfg = Config::default();
        let err = cfg
            .apply_overrides(|k| (k == "MINIO_SECURE").then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("MINIO_SECURE"));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let mut cfg = Config::default();
        cfg.vector.backend = "pinecone".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn embedding_provider_requires_model_and_dims() {
        let mut cfg = Config::default();
        cfg.embedding.provider = "openai".to_string();
        assert!(cfg.validate().is_err());
        cfg.embedding.model = Some("text-embedding-3-small".to_string());
        cfg.embedding.dims = Some(1536);
        cfg.validate().unwrap();
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = load_file(Path::new("/nonexistent/rh.toml")).unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:8000");
    }
}
