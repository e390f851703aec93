use anyhow::Result;
use clap::{Parser, Subcommand};
use curriculum_mcp::commands::{ingest_pdfs, list_history, search_once, serve_mcp};
use curriculum_mcp::config::{resolve_config_dir, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "curriculum-mcp")]
#[command(about = "PDF curriculum ingestion and similarity search with an MCP server")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the worksheet history
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Ingest the PDFs in a folder into the vector store
    Ingest {
        /// Folder to read PDFs from, overriding the configured one
        #[arg(long)]
        folder: Option<PathBuf>,
    },
    /// Run one curriculum search and print the result
    Search {
        /// Topic or question to look up
        query: String,
    },
    /// Start MCP server on stdio
    Serve,
    /// List recently saved worksheets
    History {
        /// Maximum number of worksheets to show
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout belongs to the MCP transport
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = resolve_config_dir(cli.config_dir.as_deref())?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config_dir)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Ingest { folder } => {
            ingest_pdfs(&config_dir, folder).await?;
        }
        Commands::Search { query } => {
            search_once(&config_dir, &query).await?;
        }
        Commands::Serve => {
            serve_mcp(&config_dir).await?;
        }
        Commands::History { limit } => {
            list_history(&config_dir, limit).await?;
        }
    }

    Ok(())
}
