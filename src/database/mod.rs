// Database module
// LanceDB holds chunk vectors, SQLite holds the worksheet history

pub mod lancedb;
pub mod sqlite;

pub use self::lancedb::{ChunkMetadata, ChunkRecord, SearchResult, VectorStore};
pub use sqlite::{NewWorksheet, Worksheet, WorksheetHistory};

use async_trait::async_trait;

use crate::Result;

/// Persistent collection of embedded chunks with nearest-neighbour search.
///
/// Failures surface as `RagError::StoreUnavailable`.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Insert or replace records keyed by id, returning how many were written
    async fn upsert(&self, records: Vec<ChunkRecord>) -> Result<usize>;

    /// Up to `k` stored chunks nearest to `query`, nearest first
    async fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>>;

    /// Number of stored chunks
    async fn count(&self) -> Result<u64>;

    /// Build or refresh the nearest-neighbour index, returning whether one was built
    async fn build_index(&self) -> Result<bool> {
        Ok(false)
    }
}
