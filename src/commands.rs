use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::RagError;
use crate::config::{Config, STORE_URI_ENV};
use crate::database::{ChunkStore, VectorStore, WorksheetHistory};
use crate::embeddings::{Embedder, OllamaClient};
use crate::extract::PdfToTextLoader;
use crate::ingest::{IngestOutcome, IngestionPipeline};
use crate::mcp::{McpServer, register_curriculum_tools};
use crate::retrieval::RetrievalTool;

const SERVER_INSTRUCTIONS: &str = "Use curriculum_search to look up facts in the official \
curricula before writing a worksheet, then save the finished worksheet with save_worksheet.";

/// Open the vector store named by the environment, or `None` when the
/// connection string is not set
async fn open_store(config: &Config) -> Result<Option<Arc<VectorStore>>> {
    let settings = match config.store_settings() {
        Ok(settings) => settings,
        Err(RagError::ConfigMissing(var)) => {
            warn!("{} is not set, vector store disabled", var);
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let store = VectorStore::open(&settings)
        .await
        .context("Failed to open vector store")?;
    Ok(Some(Arc::new(store)))
}

/// Close the store once every other handle has been dropped
fn close_store(store: Option<Arc<VectorStore>>) {
    if let Some(store) = store {
        match Arc::try_unwrap(store) {
            Ok(store) => store.close(),
            Err(_) => warn!("Vector store still in use at shutdown"),
        }
    }
}

fn as_chunk_store(store: Option<&Arc<VectorStore>>) -> Option<Arc<dyn ChunkStore>> {
    store.map(|s| Arc::clone(s) as Arc<dyn ChunkStore>)
}

fn embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let client = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
    Ok(Arc::new(client))
}

/// Ingest the PDFs in `folder_override` (or the configured folder) into the
/// vector store
#[inline]
pub async fn ingest_pdfs(config_dir: &Path, folder_override: Option<PathBuf>) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;
    let folder = folder_override.unwrap_or_else(|| config.ingestion.pdf_folder.clone());

    let store = open_store(&config).await?;
    let pipeline = IngestionPipeline::new(
        Arc::new(PdfToTextLoader::default()),
        embedder(&config)?,
        as_chunk_store(store.as_ref()),
        config.chunking.clone(),
        config.ollama.batch_size as usize,
    );

    let outcome = pipeline.run(&folder).await;
    drop(pipeline);
    close_store(store);

    match outcome {
        Ok(IngestOutcome::FolderCreated(path)) => {
            info!("Created empty PDF folder {}", path.display());
            Ok(())
        }
        Ok(IngestOutcome::Ingested(stats)) => {
            if stats.index_built {
                println!("Vector index refreshed.");
            }
            Ok(())
        }
        Err(RagError::ConfigMissing(var)) => {
            println!("Error: {} is not set in the environment.", var);
            println!("Set it to the vector store location and run again.");
            Ok(())
        }
        Err(RagError::NoDocumentsFound(message)) => {
            println!("{}", message);
            Ok(())
        }
        Err(e) => {
            error!("Ingestion failed: {}", e);
            Err(e).context("Ingestion failed")
        }
    }
}

/// Run a single query through the retrieval tool and print the result
#[inline]
pub async fn search_once(config_dir: &Path, query: &str) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    let store = open_store(&config).await?;
    let tool = RetrievalTool::new(
        embedder(&config)?,
        as_chunk_store(store.as_ref()),
        config.retrieval.top_k,
    );

    println!("{}", tool.run(query).await);

    drop(tool);
    close_store(store);
    Ok(())
}

/// Print the most recently saved worksheets
#[inline]
pub async fn list_history(config_dir: &Path, limit: u32) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;
    let history = WorksheetHistory::open(config.history_database_path())
        .await
        .context("Failed to open worksheet history")?;

    let worksheets = history.list_recent(limit).await?;
    let total = history.count().await?;
    history.close().await;

    if worksheets.is_empty() {
        println!("No worksheets saved yet.");
        println!("Worksheets are saved by agents through the save_worksheet tool.");
        return Ok(());
    }

    println!("📚 Saved Worksheets ({} of {})", worksheets.len(), total);
    println!("===================");
    for worksheet in &worksheets {
        println!();
        println!(
            "#{} {} ({})",
            worksheet.id, worksheet.topic, worksheet.subject
        );
        println!("   Student: {}", worksheet.student_profile);
        println!(
            "   Saved:   {}",
            worksheet.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        println!("   Length:  {} characters", worksheet.content.chars().count());
    }

    Ok(())
}

/// Start the MCP server on stdio
#[inline]
pub async fn serve_mcp(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;
    info!("Starting MCP server (config: {})", config_dir.display());

    let client = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
    match client.validate_model() {
        Ok(()) => info!(
            "Ollama connected at {}:{} with model {}",
            config.ollama.host, config.ollama.port, config.ollama.model
        ),
        Err(e) => warn!(
            "Ollama is not ready, curriculum searches will report errors: {:#}",
            e
        ),
    }

    let store = open_store(&config).await?;
    if store.is_none() {
        warn!(
            "{} is not set; curriculum_search will report the missing configuration",
            STORE_URI_ENV
        );
    }

    let history = Arc::new(
        WorksheetHistory::open(config.history_database_path())
            .await
            .context("Failed to open worksheet history")?,
    );
    let retrieval = Arc::new(RetrievalTool::new(
        Arc::new(client),
        as_chunk_store(store.as_ref()),
        config.retrieval.top_k,
    ));

    let server = Arc::new(
        McpServer::new(
            "curriculum-mcp".to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        )
        .with_instructions(SERVER_INSTRUCTIONS.to_string()),
    );
    register_curriculum_tools(&server, retrieval, Arc::clone(&history)).await;
    info!("Registered tools: {}", server.tool_names().await.join(", "));

    let result = tokio::select! {
        result = Arc::clone(&server).serve_stdio() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received interrupt signal, shutting down");
            Ok(())
        }
    };

    drop(server);
    history.close().await;
    close_store(store);
    info!("Shutdown complete");

    result
}
