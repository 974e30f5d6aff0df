//! HTTP transport for the tool registry.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/mcp` | JSON-RPC 2.0 dispatch into the registry |
//! | `GET`  | `/tools/list` | Registered tools with their parameter schemas |
//! | `GET`  | `/health` | `{"status":"ok","tools":[...]}` |
//!
//! `POST /mcp` reads the raw body rather than axum's `Json` extractor, so a
//! malformed body still gets a JSON-RPC `-32700` envelope. Every RPC
//! outcome is HTTP 200; errors live inside the envelope.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{body::Bytes, extract::State, routing::get, routing::post, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::rpc::{dispatch, RpcResponse};
use crate::traits::{ToolContext, ToolInfo, ToolRegistry};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    tools: Arc<ToolRegistry>,
    ctx: Arc<ToolContext>,
}

/// Start the server on `[server].bind` with the built-in catalogue.
///
/// Runs until the process is terminated.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let ctx = ToolContext::connect(config).await?;
    let tools = ToolRegistry::with_builtins()?;

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, tools = tools.len(), "server listening");
    println!("RPC server listening on http://{}/mcp", bind_addr);

    serve(listener, Arc::new(tools), Arc::new(ctx)).await
}

/// Serve on an already-bound listener.
pub async fn serve(
    listener: TcpListener,
    tools: Arc<ToolRegistry>,
    ctx: Arc<ToolContext>,
) -> anyhow::Result<()> {
    axum::serve(listener, router(tools, ctx)).await?;
    Ok(())
}

/// The application router, without a listener.
pub fn router(tools: Arc<ToolRegistry>, ctx: Arc<ToolContext>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/mcp", post(handle_rpc))
        .route("/tools/list", get(handle_list_tools))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { tools, ctx })
}

// ============ POST /mcp ============

async fn handle_rpc(State(state): State<AppState>, body: Bytes) -> Json<RpcResponse> {
    Json(dispatch(&state.tools, &state.ctx, &body).await)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    tools: Vec<String>,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        tools: state.tools.names(),
    })
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

/// Returns all registered tools with their JSON Schema parameter lists.
async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    Json(ToolListResponse {
        tools: state.tools.infos(),
    })
}
