// Ingestion pipeline
// PDFs in a folder -> page text -> overlapping chunks -> embeddings -> chunk store


use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::STORE_URI_ENV;
use crate::database::{ChunkRecord, ChunkStore};
use crate::embeddings::{ChunkingConfig, Embedder, chunk_pages};
use crate::extract::{DocumentLoader, DocumentPage, discover_pdfs};
use crate::{RagError, Result};

/// Counts reported after a successful run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestionStats {
    pub files: usize,
    pub pages: usize,
    pub chunks: usize,
    pub stored: usize,
    pub index_built: bool,
}

/// How a run ended when it did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The folder did not exist and was created empty
    FolderCreated(PathBuf),
    Ingested(IngestionStats),
}

pub struct IngestionPipeline {
    loader: Arc<dyn DocumentLoader>,
    embedder: Arc<dyn Embedder>,
    /// `None` when no store connection string is configured
    store: Option<Arc<dyn ChunkStore>>,
    chunking: ChunkingConfig,
    batch_size: usize,
}

impl IngestionPipeline {
    #[inline]
    pub fn new(
        loader: Arc<dyn DocumentLoader>,
        embedder: Arc<dyn Embedder>,
        store: Option<Arc<dyn ChunkStore>>,
        chunking: ChunkingConfig,
        batch_size: usize,
    ) -> Self {
        Self {
            loader,
            embedder,
            store,
            chunking,
            batch_size: batch_size.max(1),
        }
    }

    /// Ingest every PDF in `folder`.
    ///
    /// Returns `RagError::ConfigMissing` when no store is configured and
    /// `RagError::NoDocumentsFound` when the folder yields no pages. In both
    /// cases neither the embedder nor the store is called.
    pub async fn run(&self, folder: &Path) -> Result<IngestOutcome> {
        let Some(store) = &self.store else {
            return Err(RagError::ConfigMissing(STORE_URI_ENV));
        };

        println!("Starting PDF ingestion from {}", folder.display());

        if !folder.exists() {
            std::fs::create_dir_all(folder)?;
            println!(
                "Created folder {}. Add PDFs there and run again.",
                folder.display()
            );
            return Ok(IngestOutcome::FolderCreated(folder.to_path_buf()));
        }

        let (files, pages) = self.load_pages(folder)?;
        if pages.is_empty() {
            return Err(RagError::NoDocumentsFound(format!(
                "No PDFs found in folder: {}",
                folder.display()
            )));
        }

        let chunks = chunk_pages(&pages, &self.chunking);
        println!("Uploading {} chunks...", chunks.len());

        let bar = if console::user_attended_stderr() {
            ProgressBar::new(chunks.len() as u64).with_style(
                ProgressStyle::with_template("{bar:40} [{pos}/{len}] Embedding chunks")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            )
        } else {
            ProgressBar::hidden()
        };

        let mut stored = 0;
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = self.embedder.embed_documents(&texts)?;

            if vectors.len() != batch.len() {
                bar.abandon();
                return Err(RagError::EmbeddingFailure(format!(
                    "Expected {} vectors, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }

            let records: Vec<ChunkRecord> = batch
                .iter()
                .zip(vectors)
                .map(|(chunk, vector)| ChunkRecord::from_chunk(chunk, vector))
                .collect();

            stored += store.upsert(records).await?;
            bar.inc(batch.len() as u64);
            debug!("Stored {} of {} chunks", stored, chunks.len());
        }
        bar.finish_and_clear();

        let index_built = store.build_index().await?;

        let stats = IngestionStats {
            files,
            pages: pages.len(),
            chunks: chunks.len(),
            stored,
            index_built,
        };
        info!(
            "Ingested {} files, {} pages, {} chunks",
            stats.files, stats.pages, stats.chunks
        );
        println!("Ingestion complete: {} chunks stored.", stats.stored);

        Ok(IngestOutcome::Ingested(stats))
    }

    fn load_pages(&self, folder: &Path) -> Result<(usize, Vec<DocumentPage>)> {
        let pdfs = discover_pdfs(folder)?;
        let mut pages = Vec::new();

        for path in &pdfs {
            let name = path
                .file_name()
                .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
            println!("Processing: {}...", name);
            pages.extend(self.loader.load(path)?);
        }

        Ok((pdfs.len(), pages))
    }
}
