// Retrieval tool
// Embeds a query, asks the chunk store for its nearest chunks and renders the
// outcome as a single string for the orchestrating agent.


use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::RagError;
use crate::config::STORE_URI_ENV;
use crate::database::ChunkStore;
use crate::embeddings::Embedder;

pub const NAME: &str = "curriculum_search";

pub const DESCRIPTION: &str = "Searches the official curricula stored in the vector database. \
Use it to obtain precise facts about history or literature.";

pub const NO_RESULTS_MESSAGE: &str = "No relevant information was found in the documents.";

pub const DEFAULT_TOP_K: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetrievalError {
    #[error("{} is not set in the environment", STORE_URI_ENV)]
    ConfigMissing,

    #[error("no matching documents")]
    NoDocumentsFound,

    #[error("{0}")]
    StoreUnavailable(String),

    #[error("{0}")]
    EmbeddingFailure(String),
}

impl From<RagError> for RetrievalError {
    #[inline]
    fn from(error: RagError) -> Self {
        match error {
            RagError::ConfigMissing(_) => Self::ConfigMissing,
            RagError::NoDocumentsFound(_) => Self::NoDocumentsFound,
            RagError::EmbeddingFailure(detail) => Self::EmbeddingFailure(detail),
            RagError::StoreUnavailable(detail) => Self::StoreUnavailable(detail),
            other => Self::StoreUnavailable(other.to_string()),
        }
    }
}

impl RetrievalError {
    /// Whether the rendered string reports a failure rather than an empty answer
    #[inline]
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::NoDocumentsFound)
    }
}

/// Render a search outcome as the text handed back to the agent
#[inline]
pub fn render(result: &Result<Vec<String>, RetrievalError>) -> String {
    match result {
        Ok(texts) if texts.is_empty() => NO_RESULTS_MESSAGE.to_string(),
        Ok(texts) => texts.join("\n\n"),
        Err(RetrievalError::ConfigMissing) => {
            format!("Error: {}", RetrievalError::ConfigMissing)
        }
        Err(RetrievalError::NoDocumentsFound) => NO_RESULTS_MESSAGE.to_string(),
        Err(RetrievalError::StoreUnavailable(detail) | RetrievalError::EmbeddingFailure(detail)) => {
            format!("Vector search error: {}", detail)
        }
    }
}

/// Similarity search over the ingested curricula
#[derive(Clone)]
pub struct RetrievalTool {
    embedder: Arc<dyn Embedder>,
    /// `None` when no store connection string is configured
    store: Option<Arc<dyn ChunkStore>>,
    top_k: usize,
}

impl RetrievalTool {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Option<Arc<dyn ChunkStore>>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            top_k: top_k.max(1),
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        NAME
    }

    #[inline]
    pub fn description(&self) -> &'static str {
        DESCRIPTION
    }

    #[inline]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Chunk texts nearest to `query`, in store rank order
    pub async fn search(&self, query: &str) -> Result<Vec<String>, RetrievalError> {
        let Some(store) = &self.store else {
            warn!("Search requested but {} is not set", STORE_URI_ENV);
            return Err(RetrievalError::ConfigMissing);
        };

        debug!("Embedding query with {}", self.embedder.model());
        let vector = self.embedder.embed_query(query)?;

        let hits = store.similarity_search(&vector, self.top_k).await?;
        if hits.is_empty() {
            info!("No chunks matched the query");
            return Err(RetrievalError::NoDocumentsFound);
        }

        info!("Retrieved {} chunks", hits.len());
        Ok(hits
            .into_iter()
            .take(self.top_k)
            .map(|hit| hit.metadata.text)
            .collect())
    }

    /// Search and render in one step; never fails
    #[inline]
    pub async fn run(&self, query: &str) -> String {
        render(&self.search(query).await)
    }
}
