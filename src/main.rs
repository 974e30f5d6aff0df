//! # Regulation Harness CLI (`rh`)
//!
//! ## Usage
//!
//! ```bash
//! rh --config ./config/rh.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rh init` | Create the SQLite metadata database |
//! | `rh serve` | Start the JSON-RPC HTTP server |
//! | `rh sync` | Sync document metadata with object storage |
//! | `rh ingest` | Ingest every pending document (`--legacy` for the processed-files path) |
//! | `rh ask "<query>"` | Answer a question through the full pipeline |
//! | `rh metadata` | List document metadata records |
//! | `rh tools` | List registered RPC methods |
//! | `rh call <method>` | Dispatch one RPC call locally |
//! | `rh completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! rh init
//! rh sync && rh ingest
//! rh ask "What are the motor insurance requirements in Tunisia?"
//! rh call rag_search --params '{"query": "flood cover", "top_k": 3}'
//! rh call graph_compare --params '["Law 92-24", "Code des assurances"]'
//! ```

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use regulation_harness::config;
use regulation_harness::traits::{ToolContext, ToolRegistry};
use regulation_harness::{ingest, migrate, planner, rpc, server};

/// Regulation Harness: multi-agent question answering over insurance
/// regulations.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rh.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rh",
    about = "Regulation Harness: question answering over insurance regulations",
    version,
    long_about = "Regulation Harness ingests regulatory documents from object storage, enriches and \
    indexes them into a vector store and a knowledge graph, and answers questions through a \
    JSON-RPC tool server."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/rh.toml`. A missing file means built-in
    /// defaults plus environment overrides.
    #[arg(long, global = true, default_value = "./config/rh.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the metadata database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Start the JSON-RPC server on `[server].bind`.
    Serve,

    /// Sync document metadata with the object store listing.
    ///
    /// New objects become `pending` records; existing records keep their
    /// status.
    Sync,

    /// Ingest every pending document.
    Ingest {
        /// Use the processed-files path instead of document status.
        #[arg(long)]
        legacy: bool,
    },

    /// Answer a question: classify, retrieve, summarize.
    Ask {
        query: String,

        /// Print the full result (analysis and context size) as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List document metadata records.
    Metadata,

    /// List registered RPC methods.
    Tools,

    /// Dispatch a single RPC call without starting the server.
    Call {
        method: String,

        /// Parameters as JSON: an object, an array, or null.
        #[arg(long)]
        params: Option<String>,

        /// Request id as JSON (default 1).
        #[arg(long, default_value = "1")]
        id: String,
    },

    /// Print shell completions to stdout.
    Completions { shell: Shell },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Commands that don't require config
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "rh", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Serve => {
            server::run_server(cfg).await?;
        }
        Commands::Sync => {
            let ctx = ToolContext::connect(cfg).await?;
            let records = ctx.metadata.sync(ctx.storage.as_ref()).await?;
            println!("{} documents tracked", records.len());
            for r in &records {
                println!("  {:<10} {:<8} {}", r.status.as_str(), r.country.as_str(), r.filename);
            }
        }
        Commands::Ingest { legacy } => {
            let ctx = ToolContext::connect(cfg).await?;
            let out = if legacy {
                serde_json::to_value(ingest::process_new_files(&ctx).await?)?
            } else {
                planner::ingest_pending_documents(&ctx).await?
            };
            print_json(&out)?;
        }
        Commands::Ask { query, json } => {
            let ctx = ToolContext::connect(cfg).await?;
            let answer = planner::execute_pipeline(&ctx, &query).await?;
            if json {
                print_json(&serde_json::to_value(&answer)?)?;
            } else {
                println!("{}", answer.answer);
            }
        }
        Commands::Metadata => {
            let ctx = ToolContext::connect(cfg).await?;
            print_json(&serde_json::to_value(ctx.metadata.list().await?)?)?;
        }
        Commands::Tools => {
            let registry = ToolRegistry::with_builtins()?;
            for t in registry.tools() {
                let params: Vec<String> = t
                    .params()
                    .iter()
                    .map(|p| {
                        if p.required {
                            p.name.to_string()
                        } else {
                            format!("{}?", p.name)
                        }
                    })
                    .collect();
                println!("{}({}) - {}", t.name(), params.join(", "), t.description());
            }
        }
        Commands::Call { method, params, id } => {
            let params: Value = match params {
                Some(raw) => serde_json::from_str(&raw).context("--params is not valid JSON")?,
                None => Value::Null,
            };
            let id: Value = serde_json::from_str(&id).context("--id is not valid JSON")?;
            let body = serde_json::to_vec(&json!({
                "jsonrpc": "2.0",
                "method": method,
                "params": params,
                "id": id,
            }))?;

            let registry = ToolRegistry::with_builtins()?;
            let ctx = ToolContext::connect(cfg).await?;
            let response = rpc::dispatch(&registry, &ctx, &body).await;
            print_json(&serde_json::to_value(&response)?)?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
