//! JSON-RPC 2.0 envelopes and method dispatch.
//!
//! ```text
//! request  {"jsonrpc":"2.0","method":"rag_search","params":{"query":"..."},"id":1}
//! response {"jsonrpc":"2.0","result":[...],"id":1}
//!          {"jsonrpc":"2.0","error":{"code":-32601,"message":"..."},"id":1}
//! ```
//!
//! Dispatch never fails: every outcome, including a body that is not JSON
//! at all, becomes a response envelope. The request `id` is echoed as-is
//! (`null` when absent or unreadable).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::prompts::truncate_chars;
use crate::traits::{ParamSpec, ToolContext, ToolRegistry};

/// Longest error message returned to a caller.
const MAX_ERROR_CHARS: usize = 500;

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcErrorBody {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
    pub id: Value,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: Value, err: &RpcError) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(RpcErrorBody {
                code: err.code(),
                message: truncate_chars(&err.to_string(), MAX_ERROR_CHARS).to_string(),
            }),
            id,
        }
    }
}

/// Protocol-level failures.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// A tool failed or rejected its parameters. Carries the message only.
    #[error("{0}")]
    Tool(String),
}

impl RpcError {
    pub fn code(&self) -> i64 {
        match self {
            RpcError::Parse(_) => -32700,
            RpcError::MethodNotFound(_) => -32601,
            RpcError::Tool(_) => -32000,
        }
    }
}

/// Bind raw `params` to a tool's declared parameters.
///
/// A mapping binds by name, a sequence by declaration order, `null` or
/// absent means no arguments. The result is always an object keyed by
/// declared names.
pub fn bind_params(specs: &[ParamSpec], params: Option<Value>) -> Result<Value, RpcError> {
    let mut bound = Map::new();

    match params.unwrap_or(Value::Null) {
        Value::Null => {}
        Value::Object(map) => {
            for (key, value) in map {
                if !specs.iter().any(|s| s.name == key) {
                    return Err(RpcError::Tool(format!("unexpected parameter: {}", key)));
                }
                bound.insert(key, value);
            }
        }
        Value::Array(items) => {
            if items.len() > specs.len() {
                return Err(RpcError::Tool(format!(
                    "expected at most {} positional parameters, got {}",
                    specs.len(),
                    items.len()
                )));
            }
            for (spec, value) in specs.iter().zip(items) {
                bound.insert(spec.name.to_string(), value);
            }
        }
        other => {
            return Err(RpcError::Tool(format!(
                "params must be an object, an array or null, got {}",
                json_kind(&other)
            )));
        }
    }

    for spec in specs.iter().filter(|s| s.required) {
        if !bound.contains_key(spec.name) {
            return Err(RpcError::Tool(format!(
                "missing required parameter: {}",
                spec.name
            )));
        }
    }

    Ok(Value::Object(bound))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Decode one request body and run the named tool.
pub async fn dispatch(registry: &ToolRegistry, ctx: &ToolContext, body: &[u8]) -> RpcResponse {
    let raw: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "rpc: unparseable body");
            return RpcResponse::failure(Value::Null, &RpcError::Parse(e.to_string()));
        }
    };

    // Salvage the id before validating the envelope so it can be echoed.
    let id = raw.get("id").cloned().unwrap_or(Value::Null);

    let request: RpcRequest = match serde_json::from_value(raw) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "rpc: invalid envelope");
            return RpcResponse::failure(id, &RpcError::Parse(e.to_string()));
        }
    };
    if request.jsonrpc.as_deref().is_some_and(|v| v != "2.0") {
        tracing::debug!(version = ?request.jsonrpc, "rpc: non-2.0 version tag");
    }

    match call(registry, ctx, request.method.as_str(), request.params).await {
        Ok(result) => RpcResponse::success(request.id, result),
        Err(err) => RpcResponse::failure(request.id, &err),
    }
}

/// Look up and execute `method`; every failure maps to an [`RpcError`].
pub async fn call(
    registry: &ToolRegistry,
    ctx: &ToolContext,
    method: &str,
    params: Option<Value>,
) -> Result<Value, RpcError> {
    let tool = registry.find(method).ok_or_else(|| {
        tracing::warn!(method, "rpc: method not found");
        RpcError::MethodNotFound(method.to_string())
    })?;

    let bound = bind_params(tool.params(), params)?;

    tracing::info!(method, "rpc: dispatch");
    let started = std::time::Instant::now();
    match tool.execute(bound, ctx).await {
        Ok(value) => {
            tracing::info!(method, elapsed_ms = started.elapsed().as_millis() as u64, "rpc: ok");
            Ok(value)
        }
        Err(e) => {
            tracing::error!(method, error = %format!("{:#}", e), "rpc: tool failed");
            Err(RpcError::Tool(format!("{:#}", e)))
        }
    }
}
