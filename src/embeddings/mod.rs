// Embeddings module
// Text splitting and the embedding provider seam

pub mod chunking;
pub mod ollama;

pub use chunking::{ChunkingConfig, ContentChunk, chunk_pages, split_text};
pub use ollama::OllamaClient;

use crate::{RagError, Result};

/// Produces embedding vectors for chunk and query text.
///
/// Ingestion and retrieval must share one implementation configured with the
/// same model, otherwise stored and query vectors are not comparable.
pub trait Embedder: Send + Sync {
    /// Name of the model producing the vectors
    fn model(&self) -> &str;

    /// Embed a batch of texts, returning one vector per input in input order
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query
    #[inline]
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_documents(&[text.to_string()])?
            .pop()
            .ok_or_else(|| RagError::EmbeddingFailure("provider returned no vector".to_string()))
    }
}
