//! Tool trait, service context, and the tool registry.
//!
//! Every RPC method is a [`Tool`]: a name, a description, a declared
//! parameter list, and an async `execute`. Tools receive a [`ToolContext`]
//! holding the shared service handles (metadata store, object store, vector
//! store, graph store, embedder, generator), built once at startup and
//! injected, never looked up globally.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 ToolRegistry                 │
//! │  ┌──────────┐ ┌──────────┐ ┌──────────────┐  │
//! │  │ document │ │ rag /    │ │ analyzer /   │  │
//! │  │ access   │ │ graph    │ │ planner      │  │
//! │  └──────────┘ └──────────┘ └──────────────┘  │
//! └──────────────────────┬───────────────────────┘
//!                        ▼
//!        rpc::dispatch() → POST /mcp, `rh call`
//! ```
//!
//! # Usage
//!
//! ```rust
//! use regulation_harness::traits::ToolRegistry;
//!
//! let tools = ToolRegistry::with_builtins().unwrap();
//! assert!(tools.find("execute_pipeline").is_some());
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::graph::{create_graph_store, GraphStore};
use crate::llm::{create_generator, TextGenerator};
use crate::metadata::MetadataStore;
use crate::storage::{create_store, ObjectStore};
use crate::vector_store::{create_vector_store, VectorStore};

// ═══════════════════════════════════════════════════════════════════════
// Parameters
// ═══════════════════════════════════════════════════════════════════════

/// JSON type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Object,
    Array,
}

impl ParamKind {
    pub fn json_type(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
            ParamKind::Object => "object",
            ParamKind::Array => "array",
        }
    }
}

/// One declared parameter. Declaration order is the positional order.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
}

impl ParamSpec {
    pub const fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            description,
        }
    }

    pub const fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: false,
            description,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Tool Trait
// ═══════════════════════════════════════════════════════════════════════

/// A named operation exposed through RPC dispatch.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use anyhow::Result;
/// use serde_json::{json, Value};
/// use regulation_harness::traits::{ParamKind, ParamSpec, Tool, ToolContext};
///
/// pub struct EchoTool;
///
/// #[async_trait]
/// impl Tool for EchoTool {
///     fn name(&self) -> &str { "echo" }
///     fn description(&self) -> &str { "Return the input text" }
///     fn params(&self) -> &'static [ParamSpec] {
///         const PARAMS: &[ParamSpec] = &[ParamSpec::required("text", ParamKind::String, "Text")];
///         PARAMS
///     }
///     async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<Value> {
///         Ok(params["text"].clone())
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// The RPC method name (e.g. `"rag_search"`).
    fn name(&self) -> &str;

    /// One-line description for `GET /tools/list` and `rh tools`.
    fn description(&self) -> &str;

    /// Declared parameters, in positional order.
    fn params(&self) -> &'static [ParamSpec];

    /// JSON Schema for the parameters, derived from [`params`](Tool::params).
    fn parameters_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for p in self.params() {
            properties.insert(
                p.name.to_string(),
                json!({ "type": p.kind.json_type(), "description": p.description }),
            );
            if p.required {
                required.push(p.name);
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    /// Run the tool. `params` is always a JSON object whose keys are
    /// declared parameter names.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

// ═══════════════════════════════════════════════════════════════════════
// ToolContext
// ═══════════════════════════════════════════════════════════════════════

/// Service handles shared by every tool invocation.
///
/// Built once by [`ToolContext::connect`] (or assembled directly in tests)
/// and shared behind an `Arc` by the server and the CLI.
pub struct ToolContext {
    pub config: Arc<Config>,
    pub metadata: MetadataStore,
    pub storage: Arc<dyn ObjectStore>,
    pub vectors: Arc<dyn VectorStore>,
    pub graph: Arc<dyn GraphStore>,
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn TextGenerator>,
}

impl ToolContext {
    /// Open the metadata database and construct every backend from `config`.
    ///
    /// No network call is made here; remote services are contacted on
    /// first use.
    pub async fn connect(config: Config) -> Result<Self> {
        let metadata = MetadataStore::open(&config).await?;
        Ok(Self {
            storage: create_store(&config.storage)?,
            vectors: create_vector_store(&config.vector)?,
            graph: create_graph_store(&config.graph)?,
            embedder: create_embedder(&config.embedding)?,
            llm: create_generator(&config.model)?,
            metadata,
            config: Arc::new(config),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Summary of a registered tool, as served by `GET /tools/list`.
#[derive(Debug, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Process-wide method table, populated at startup and read-only afterwards.
///
/// Names are unique: registering a name twice is an error rather than a
/// silent overwrite.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty tool registry.
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// A registry holding the full built-in catalogue.
    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();
        for tool in crate::tools::builtin_tools() {
            registry.register(tool)?;
        }
        Ok(registry)
    }

    /// Register a tool; fails if the name is taken.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<()> {
        if self.find(tool.name()).is_some() {
            bail!("tool already registered: {}", tool.name());
        }
        self.tools.push(tool);
        Ok(())
    }

    /// Get all registered tools, in registration order.
    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    /// Find a tool by name.
    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    /// Registered method names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn infos(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
