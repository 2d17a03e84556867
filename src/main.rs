//! # Concourse CLI
//!
//! | Command | Description |
//! |---------|-------------|
//! | `concourse serve` | Start the chat web server |
//! | `concourse ask "<question>"` | One-shot: ask the assistant from the terminal |
//! | `concourse data load --seed <file>` | Recreate and bulk-load the product datastore |
//! | `concourse data export` | Dump products and embeddings as JSON |
//! | `concourse data search "<query>"` | Embed a query and run the similarity search |
//!
//! All commands read `--config` (default `./config/concourse.toml`).
//! Secrets come from the environment: `OPENAI_API_KEY`, `DATABASE_URL`,
//! `CONCOURSE_SECRET_KEY`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use concourse::agent::Agent;
use concourse::backend::BackendClient;
use concourse::config;
use concourse::datastore;
use concourse::llm::LlmClient;
use concourse::models::base_history;
use concourse::server;
use concourse::tools::ToolRegistry;

/// Concourse: an LLM-backed airport assistant.
#[derive(Parser)]
#[command(
    name = "concourse",
    about = "An LLM-backed airport assistant with a product datastore",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/concourse.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the chat web server.
    ///
    /// Binds to `[server].bind` and serves the chat UI plus the
    /// `/chat`, `/reset`, and `/login/google` routes.
    Serve,

    /// Ask the assistant a single question from the terminal.
    ///
    /// Builds a throwaway agent with no prior history, runs one turn
    /// through the tool-use loop, and prints the answer.
    Ask {
        /// The question to ask.
        question: String,
    },

    /// Manage the product datastore (Postgres + pgvector).
    Data {
        #[command(subcommand)]
        action: DataAction,
    },
}

#[derive(Subcommand)]
enum DataAction {
    /// Drop, recreate, and bulk-load both tables from a seed file.
    Load {
        /// Path to the JSON seed file (products + embeddings).
        #[arg(long)]
        seed: PathBuf,
    },

    /// Export products and embeddings as JSON.
    Export {
        /// Write to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Embed a query and run the cosine similarity search.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results (defaults to `datastore.top_k`).
        #[arg(long)]
        top_k: Option<i64>,

        /// Minimum cosine similarity (defaults to `datastore.similarity_threshold`).
        #[arg(long)]
        threshold: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ask { question } => {
            let backend = BackendClient::new(&cfg.backend)?;
            let llm = Arc::new(LlmClient::new(&cfg.llm)?);
            let tools = Arc::new(ToolRegistry::with_builtins());
            let agent = Agent::new(backend, tools, llm, base_history(), cfg.llm.max_steps);

            let answer = agent.invoke(&question).await?;
            println!("{}", answer);
        }
        Commands::Data { action } => match action {
            DataAction::Load { seed } => {
                datastore::run_load(&cfg, &seed).await?;
            }
            DataAction::Export { output } => {
                datastore::run_export(&cfg, output.as_deref()).await?;
            }
            DataAction::Search {
                query,
                top_k,
                threshold,
            } => {
                datastore::run_search(&cfg, &query, top_k, threshold).await?;
            }
        },
    }

    Ok(())
}
